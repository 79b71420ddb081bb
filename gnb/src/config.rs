//! TOML Scenario Configuration
//!
//! Structures describing one simulated cell: carrier geometry, the TDD
//! pattern and its timings, the scheduler selection and the attached UEs.

use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use common::types::{parse_pattern, McsTable, SlotType};
use layers::mac::Granularity;
use layers::phy::HarqMode;

/// Top-level scenario configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    /// Cell and carrier parameters
    pub cell: CellConfig,
    /// TDD pattern and its processing timings
    pub pattern: PatternConfig,
    /// Simulation driver parameters
    #[serde(default)]
    pub sim: SimConfig,
    /// Attached UEs
    #[serde(default)]
    pub ues: Vec<UeConfig>,
}

/// Cell and carrier parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellConfig {
    /// Carrier width in resource-block groups
    pub bandwidth_rbg: u32,
    /// Resource blocks per RBG
    #[serde(default = "default_rb_per_rbg")]
    pub rb_per_rbg: u32,
    /// Data subcarriers per resource block per symbol
    #[serde(default = "default_useful_sc")]
    pub useful_sc: u32,
    /// First data symbol of a DL slot (control symbols precede it)
    #[serde(default = "default_dl_sym_start")]
    pub dl_sym_start: u32,
    /// Data symbols available for scheduling per slot
    #[serde(default = "default_data_symbols")]
    pub data_symbols: u32,
    /// MCS table, "qam64" or "qam256"
    #[serde(default = "default_mcs_table")]
    pub mcs_table: String,
    /// Ranking policy, "rr" or "pf"
    #[serde(default = "default_scheduler")]
    pub scheduler: String,
    /// Resource granularity, "tdma" or "ofdma"
    #[serde(default = "default_granularity")]
    pub granularity: String,
    /// HARQ combining mode, "cc" or "ir"
    #[serde(default = "default_harq")]
    pub harq: String,
}

fn default_rb_per_rbg() -> u32 {
    1
}

fn default_useful_sc() -> u32 {
    12
}

fn default_dl_sym_start() -> u32 {
    1
}

fn default_data_symbols() -> u32 {
    12
}

fn default_mcs_table() -> String {
    "qam64".to_string()
}

fn default_scheduler() -> String {
    "rr".to_string()
}

fn default_granularity() -> String {
    "tdma".to_string()
}

fn default_harq() -> String {
    "cc".to_string()
}

/// TDD pattern and its processing timings, in slots
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternConfig {
    /// Pattern string such as "DL|S|UL|UL|DL|DL|S|UL|UL|DL"
    pub slots: String,
    /// DL DCI to DL data delay (K0)
    #[serde(default)]
    pub n0: u32,
    /// UL DCI to UL data delay (K2)
    #[serde(default = "default_n2")]
    pub n2: u32,
    /// DL data to HARQ feedback delay (K1)
    #[serde(default = "default_n1")]
    pub n1: u32,
    /// Scheduler processing latency
    #[serde(default = "default_latency")]
    pub latency: u32,
}

fn default_n2() -> u32 {
    2
}

fn default_n1() -> u32 {
    4
}

fn default_latency() -> u32 {
    2
}

/// Simulation driver parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Slots to simulate
    #[serde(default = "default_num_slots")]
    pub num_slots: u64,
    /// Wall-clock duration of one slot in milliseconds, 0 for free-running
    #[serde(default)]
    pub slot_ms: u64,
    /// Seed for the decode-outcome draws
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { num_slots: default_num_slots(), slot_ms: 0, seed: default_seed() }
    }
}

fn default_num_slots() -> u64 {
    20
}

fn default_seed() -> u64 {
    1
}

/// One attached UE
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UeConfig {
    pub rnti: u16,
    #[serde(default)]
    pub beam: u16,
    /// Pending DL bytes at simulation start
    #[serde(default)]
    pub dl_buffer: u32,
    /// Pending UL bytes at simulation start
    #[serde(default)]
    pub ul_buffer: u32,
    /// MCS used in both directions
    pub mcs: u8,
    /// Wideband DL SINR the UE observes, dB
    #[serde(default = "default_sinr_db")]
    pub sinr_db: f64,
}

fn default_sinr_db() -> f64 {
    15.0
}

impl ScenarioConfig {
    /// Load a scenario from a TOML file
    pub fn from_toml_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Reading scenario file {path}"))?;
        let config: ScenarioConfig =
            toml::from_str(&contents).with_context(|| format!("Parsing scenario file {path}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.cell.bandwidth_rbg == 0 {
            anyhow::bail!("cell.bandwidth_rbg must be positive");
        }
        if self.cell.data_symbols == 0 {
            anyhow::bail!("cell.data_symbols must be positive");
        }
        self.parsed_pattern()?;
        self.mcs_table()?;
        self.granularity()?;
        self.harq_mode()?;
        match self.cell.scheduler.as_str() {
            "rr" | "pf" => {}
            other => anyhow::bail!("Unknown scheduler policy: {other}"),
        }
        Ok(())
    }

    /// The TDD pattern as slot types
    pub fn parsed_pattern(&self) -> anyhow::Result<Vec<SlotType>> {
        parse_pattern(&self.pattern.slots).map_err(|e| anyhow::anyhow!(e))
    }

    /// The configured MCS table
    pub fn mcs_table(&self) -> anyhow::Result<McsTable> {
        match self.cell.mcs_table.as_str() {
            "qam64" => Ok(McsTable::Table1),
            "qam256" => Ok(McsTable::Table2),
            other => anyhow::bail!("Unknown MCS table: {other}"),
        }
    }

    /// The configured resource granularity
    pub fn granularity(&self) -> anyhow::Result<Granularity> {
        Granularity::from_str(&self.cell.granularity).map_err(|e| anyhow::anyhow!(e))
    }

    /// The configured HARQ combining mode
    pub fn harq_mode(&self) -> anyhow::Result<HarqMode> {
        HarqMode::from_str(&self.cell.harq).map_err(|e| anyhow::anyhow!(e))
    }
}
