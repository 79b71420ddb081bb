//! Common Types for the RAN Simulation Core
//!
//! Defines fundamental identifiers and radio enums used throughout the stack

use serde::{Deserialize, Serialize};
use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt;
use std::str::FromStr;

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId(pub u16);

/// Beam identifier within a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BeamId(pub u16);

impl BeamId {
    /// Create a new beam id
    pub fn new(value: u16) -> Self {
        Self(value)
    }
}

/// Modulation and Coding Scheme index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mcs(pub u8);

impl Mcs {
    pub fn value(&self) -> u8 {
        self.0
    }
}

/// MCS table selector, TS 38.214 Tables 5.1.3.1-1 (up to 64QAM) and
/// 5.1.3.1-2 (up to 256QAM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum McsTable {
    /// Table 1: QPSK to 64QAM, 29 MCS entries
    #[default]
    Table1,
    /// Table 2: QPSK to 256QAM, 28 MCS entries
    Table2,
}

/// TDD slot type
///
/// The discriminant order matters: DCI-capable types compare `<= F`
/// (DL, S, F) and UL-feedback-capable types compare `>= S` (S, F, UL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
         FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SlotType {
    /// Downlink-only slot
    Dl = 0,
    /// Special slot (DL data, guard, UL control)
    S = 1,
    /// Flexible slot, usable in either direction
    F = 2,
    /// Uplink-only slot
    Ul = 3,
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotType::Dl => "DL",
            SlotType::S => "S",
            SlotType::F => "F",
            SlotType::Ul => "UL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SlotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "DL" => Ok(SlotType::Dl),
            "S" => Ok(SlotType::S),
            "F" => Ok(SlotType::F),
            "UL" => Ok(SlotType::Ul),
            other => Err(format!("Unknown slot type: {}", other)),
        }
    }
}

/// Parse a TDD pattern string such as "DL|S|UL|UL|DL|DL|S|UL|UL|DL"
pub fn parse_pattern(s: &str) -> Result<Vec<SlotType>, String> {
    s.split('|').map(SlotType::from_str).collect()
}

/// Duplex mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplexMode {
    /// Frequency Division Duplex
    Fdd,
    /// Time Division Duplex
    Tdd,
}
