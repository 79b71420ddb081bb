//! Scheduler / Slot-Executor Interface Library
//!
//! This crate defines the serialisable structures crossing the boundary
//! between the scheduling core and the slot executor driving it.

pub mod message_types;

use thiserror::Error;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("Invalid message format")]
    InvalidMessage,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
