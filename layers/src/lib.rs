//! Scheduling-Core Layers Library
//!
//! Implements the cell's scheduling core: slot-pattern timing structures,
//! the EESM error model with HARQ combining, beam-swept initial
//! association and the policy-driven resource-assignment engine.

pub mod mac;
pub mod phy;

use async_trait::async_trait;
use thiserror::Error;

use interfaces::message_types::SlotAllocInfo;

/// Common errors for the scheduling layers
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid slot pattern: {0}")]
    InvalidPattern(String),

    #[error("Processing error: {0}")]
    ProcessingError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// A component driven once per slot by the executor loop
#[async_trait]
pub trait SlotProcessor: Send {
    /// Advance to `slot` and return the allocations generated in it
    async fn process_slot(&mut self, slot: u64) -> Result<Vec<SlotAllocInfo>, LayerError>;
}
