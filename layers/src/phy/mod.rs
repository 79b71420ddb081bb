//! Physical-Layer Submodules
//!
//! Slot-pattern timing structures, the EESM link-to-system error model,
//! HARQ effective-SINR combining and beam-swept initial association.

pub mod association;
pub mod error_model;
pub mod harq;
pub mod pattern;

// Re-export commonly used types
pub use association::{AssociationConfig, BeamChoice, InitialAssociation, RsrpProbe};
pub use error_model::{BaseGraph, EesmErrorModel, TbDecodeStats};
pub use harq::{HarqCombiner, HarqMode};
pub use pattern::{generate_structures, DciMap, SlotStructures};
