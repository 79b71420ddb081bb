//! Medium Access Control Submodules
//!
//! Per-UE scheduling state, AMC transport-block sizing and the
//! policy-driven resource-assignment engine.

pub mod amc;
pub mod scheduler;
pub mod ue_info;

// Re-export commonly used types
pub use amc::Amc;
pub use scheduler::{Granularity, ResourceAssignmentEngine, SchedPoint};
pub use ue_info::{
    FtResources, ProportionalFairPolicy, RoundRobinPolicy, SchedulingPolicy, UeSchedulingState,
};
