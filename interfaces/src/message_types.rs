//! Message Types for the MAC / Slot-Executor Boundary
//!
//! Defines the control structures the scheduler hands to the slot executor
//! (DCIs, per-slot allocations) and the feedback it consumes back.

use serde::{Deserialize, Serialize};
use common::types::{BeamId, Mcs, Rnti};

use crate::InterfaceError;

/// Direction of a DCI grant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DciFormat {
    /// Downlink assignment
    Dl,
    /// Uplink grant
    Ul,
}

/// A scheduling grant for one UE inside a slot
///
/// The grant spans `num_sym` contiguous symbols starting at `sym_start`
/// and the resource-block groups flagged in `rbg_bitmask`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DciInfo {
    /// Target UE
    pub rnti: Rnti,
    /// Grant direction
    pub format: DciFormat,
    /// First OFDM symbol of the grant
    pub sym_start: u8,
    /// Number of symbols granted
    pub num_sym: u8,
    /// Modulation and coding scheme
    pub mcs: Mcs,
    /// Transport block size in bytes
    pub tb_size: u32,
    /// New-data indicator
    pub ndi: u8,
    /// Redundancy version
    pub rv: u8,
    /// RBG allocation mask, one entry per RBG of the carrier
    pub rbg_bitmask: Vec<bool>,
    /// Transmit power control command (TS 38.213 Table 7.1.1-1)
    pub tpc: u8,
}

/// All grants the scheduler produced for one slot
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlotAllocInfo {
    /// Absolute slot counter
    pub slot: u64,
    /// Total symbols consumed by data allocations
    pub num_sym_alloc: u32,
    /// Downlink grants, in symbol order
    pub dl_dci: Vec<DciInfo>,
    /// Uplink grants, in symbol order
    pub ul_dci: Vec<DciInfo>,
}

/// DL HARQ feedback reported by a UE for an earlier data slot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HarqFeedback {
    /// Reporting UE
    pub rnti: Rnti,
    /// Beam the UE is served on
    pub beam: BeamId,
    /// Slot (within the pattern) the feedback refers to
    pub data_slot: u32,
    /// Decoding outcome
    pub ack: bool,
}

impl SlotAllocInfo {
    /// Create an empty allocation for a slot
    pub fn new(slot: u64) -> Self {
        Self { slot, ..Default::default() }
    }

    /// Serialize for the executor transport
    pub fn encode(&self) -> Result<Vec<u8>, InterfaceError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from the executor transport
    pub fn decode(data: &[u8]) -> Result<Self, InterfaceError> {
        Ok(bincode::deserialize(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_alloc_codec() {
        let mut alloc = SlotAllocInfo::new(42);
        alloc.num_sym_alloc = 3;
        alloc.dl_dci.push(DciInfo {
            rnti: Rnti(1),
            format: DciFormat::Dl,
            sym_start: 1,
            num_sym: 3,
            mcs: Mcs(14),
            tb_size: 3422,
            ndi: 1,
            rv: 0,
            rbg_bitmask: vec![true; 5],
            tpc: 1,
        });

        let bytes = alloc.encode().unwrap();
        let back = SlotAllocInfo::decode(&bytes).unwrap();
        assert_eq!(back.slot, 42);
        assert_eq!(back.dl_dci.len(), 1);
        assert_eq!(back.dl_dci[0], alloc.dl_dci[0]);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(SlotAllocInfo::decode(&[0xff, 0x01]).is_err());
    }
}
