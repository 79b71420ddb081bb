//! Adaptive Modulation and Coding
//!
//! Transport-block sizing and MCS selection on top of the EESM error
//! model's MCS tables.

use common::types::{Mcs, McsTable};

use crate::phy::error_model::EesmErrorModel;

/// AMC helper bound to one MCS table and one cell's RBG geometry
#[derive(Debug, Clone, Copy)]
pub struct Amc {
    model: EesmErrorModel,
    /// Data subcarriers per resource block per symbol
    useful_sc: u32,
    /// Resource blocks per resource-block group
    rb_per_rbg: u32,
}

impl Amc {
    pub fn new(table: McsTable, useful_sc: u32, rb_per_rbg: u32) -> Self {
        Self {
            model: EesmErrorModel::new(table),
            useful_sc,
            rb_per_rbg,
        }
    }

    /// Transport block size in bytes for a number of RBG-per-symbol cells
    pub fn tb_size(&self, mcs: Mcs, rbg_count: u32) -> u32 {
        self.model
            .payload_size(self.useful_sc, mcs, rbg_count * self.rb_per_rbg)
    }

    /// Highest MCS the active table supports
    pub fn max_mcs(&self) -> u8 {
        self.model.max_mcs()
    }

    /// Highest MCS whose spectral efficiency does not exceed the CQI's
    pub fn mcs_from_cqi(&self, cqi: u8) -> Mcs {
        let target = self.model.spectral_efficiency_for_cqi(cqi);
        let mut mcs = 0;
        for i in 0..=self.model.max_mcs() {
            if self.model.spectral_efficiency_for_mcs(Mcs(i)) <= target {
                mcs = i;
            }
        }
        Mcs(mcs)
    }

    /// Underlying error model, for decode-statistics queries
    pub fn error_model(&self) -> &EesmErrorModel {
        &self.model
    }
}
