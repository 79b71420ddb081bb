//! HARQ Effective-SINR Combining
//!
//! Combines successive receptions of the same transport block into a
//! single effective SINR, either by Chase Combining (per-RB linear SINR
//! accumulation) or Incremental Redundancy (coded-bits-weighted averaging
//! of per-reception effective SINRs), then evaluates the decode outcome
//! through the EESM error model.

use std::str::FromStr;

use rand::Rng;
use tracing::debug;

use common::types::{Mcs, McsTable};

use super::error_model::{EesmErrorModel, TbDecodeStats};

/// HARQ combining method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarqMode {
    /// Retransmissions carry the same coded bits; SINRs add per RB
    #[default]
    ChaseCombining,
    /// Retransmissions carry new parity; mutual information accumulates
    IncrementalRedundancy,
}

impl FromStr for HarqMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cc" | "CC" | "ChaseCombining" => Ok(Self::ChaseCombining),
            "ir" | "IR" | "IncrementalRedundancy" => Ok(Self::IncrementalRedundancy),
            other => Err(format!("Unknown HARQ combining mode: {other}")),
        }
    }
}

/// One past reception of the transport block under combination
#[derive(Debug, Clone)]
struct ReceptionRecord {
    /// Linear SINR at each allocated RB position of that reception
    sinr: Vec<f64>,
    /// Standalone effective SINR of that reception
    sinr_eff: f64,
    /// Coded bits that reception carried
    code_bits: f64,
}

/// HARQ combining state for one transport block
#[derive(Debug, Clone)]
pub struct HarqCombiner {
    model: EesmErrorModel,
    mode: HarqMode,
    history: Vec<ReceptionRecord>,
}

impl HarqCombiner {
    pub fn new(table: McsTable, mode: HarqMode) -> Self {
        Self {
            model: EesmErrorModel::new(table),
            mode,
            history: Vec::new(),
        }
    }

    /// Number of receptions combined so far
    pub fn receptions(&self) -> usize {
        self.history.len()
    }

    /// Forget the history when a new transport block starts
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Process one reception: combine it with the history, evaluate the
    /// decode statistics at the combined effective SINR, and record the
    /// reception for later combining.
    pub fn receive(
        &mut self,
        sinr: &[f64],
        map: &[usize],
        mcs: Mcs,
        tb_size_bit: u32,
    ) -> TbDecodeStats {
        let standalone_eff = self.model.sinr_eff(sinr, map, mcs);
        let code_bits = f64::from(tb_size_bit) / self.model.ecr(mcs);

        let combined_eff = match self.mode {
            HarqMode::ChaseCombining => self.chase_combine(sinr, map, mcs),
            HarqMode::IncrementalRedundancy => {
                self.ir_combine(standalone_eff, code_bits)
            }
        };

        // Decode statistics at the combined operating point; keep the raw
        // per-reception values in the record for the next round.
        let mut stats = self.model.tb_decode_stats(sinr, map, mcs, tb_size_bit);
        stats.sinr_eff = combined_eff;
        stats.tbler = self.model.tbler(combined_eff, mcs, tb_size_bit);

        self.history.push(ReceptionRecord {
            sinr: map.iter().map(|&rb| sinr[rb]).collect(),
            sinr_eff: standalone_eff,
            code_bits,
        });

        debug!(
            mode = ?self.mode,
            receptions = self.history.len(),
            sinr_eff = combined_eff,
            tbler = stats.tbler,
            "HARQ reception combined"
        );

        stats
    }

    /// Draw the decode outcome of a reception: success when a uniform
    /// draw lands at or above the block error rate
    pub fn decode_outcome<R: Rng>(&self, stats: &TbDecodeStats, rng: &mut R) -> bool {
        rng.gen::<f64>() >= stats.tbler
    }

    /// Per-position linear SINR sum of the current reception and every
    /// history entry, the latter extended cyclically when the allocation
    /// sizes differ; EESM over the summed vector.
    fn chase_combine(&self, sinr: &[f64], map: &[usize], mcs: Mcs) -> f64 {
        let combined: Vec<f64> = map
            .iter()
            .enumerate()
            .map(|(k, &rb)| {
                let hist: f64 = self
                    .history
                    .iter()
                    .map(|r| r.sinr[k % r.sinr.len()])
                    .sum();
                sinr[rb] + hist
            })
            .collect();

        let ident: Vec<usize> = (0..combined.len()).collect();
        self.model.sinr_eff(&combined, &ident, mcs)
    }

    /// Coded-bits-weighted mean of the standalone effective SINRs of all
    /// receptions, the current one included.
    fn ir_combine(&self, current_eff: f64, current_code_bits: f64) -> f64 {
        let mut weighted = current_eff * current_code_bits;
        let mut total_bits = current_code_bits;

        for r in &self.history {
            weighted += r.sinr_eff * r.code_bits;
            total_bits += r.code_bits;
        }

        weighted / total_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::{approx_eq, db_to_linear};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TOL: f64 = 0.001;

    fn to_linear(db: &[f64]) -> Vec<f64> {
        db.iter().map(|&v| db_to_linear(v)).collect()
    }

    const RX1_DB: [f64; 2] = [1.0, 3.5];
    const RX2_DB: [f64; 6] = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5];
    const TB_BITS: u32 = 2048;

    #[test]
    fn test_incremental_redundancy_sequence() {
        let mut harq =
            HarqCombiner::new(McsTable::Table1, HarqMode::IncrementalRedundancy);

        let rx1 = to_linear(&RX1_DB);
        let s1 = harq.receive(&rx1, &[0, 1], Mcs(5), TB_BITS);
        assert!(approx_eq(s1.sinr_eff, 1.67919, TOL), "eff = {}", s1.sinr_eff);

        let rx2 = to_linear(&RX2_DB);
        let s2 = harq.receive(&rx2, &[0, 1, 2, 3, 4, 5], Mcs(5), TB_BITS);
        assert!(approx_eq(s2.sinr_eff, 1.67907, TOL), "eff = {}", s2.sinr_eff);

        assert_eq!(harq.receptions(), 2);
    }

    #[test]
    fn test_chase_combining_sequence() {
        let mut harq = HarqCombiner::new(McsTable::Table1, HarqMode::ChaseCombining);

        let rx1 = to_linear(&RX1_DB);
        let s1 = harq.receive(&rx1, &[0, 1], Mcs(5), TB_BITS);
        assert!(approx_eq(s1.sinr_eff, 1.67919, TOL), "eff = {}", s1.sinr_eff);

        let rx2 = to_linear(&RX2_DB);
        let s2 = harq.receive(&rx2, &[0, 1, 2, 3, 4, 5], Mcs(5), TB_BITS);
        assert!(approx_eq(s2.sinr_eff, 3.3318, TOL), "eff = {}", s2.sinr_eff);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut harq = HarqCombiner::new(McsTable::Table1, HarqMode::ChaseCombining);
        let rx1 = to_linear(&RX1_DB);
        harq.receive(&rx1, &[0, 1], Mcs(5), TB_BITS);
        harq.reset();
        assert_eq!(harq.receptions(), 0);

        // After a reset the first reception is standalone again
        let s = harq.receive(&rx1, &[0, 1], Mcs(5), TB_BITS);
        assert!(approx_eq(s.sinr_eff, 1.67919, TOL));
    }

    #[test]
    fn test_decode_outcome_extremes() {
        let mut harq = HarqCombiner::new(McsTable::Table1, HarqMode::ChaseCombining);
        let mut rng = StdRng::seed_from_u64(7);

        // 10.5 dB sits above the MCS 14 curve: certain decode
        let clean = harq.receive(&[db_to_linear(10.5); 4], &[0, 1, 2, 3], Mcs(14), 3904);
        assert!(approx_eq(clean.tbler, 0.0, 1e-9));
        assert!(harq.decode_outcome(&clean, &mut rng));

        // 8.0 dB sits below it: certain loss
        harq.reset();
        let lost = harq.receive(&[db_to_linear(8.0); 4], &[0, 1, 2, 3], Mcs(14), 3904);
        assert!(approx_eq(lost.tbler, 1.0, 1e-9));
        assert!(!harq.decode_outcome(&lost, &mut rng));
    }

    #[test]
    fn test_decode_outcome_rate_mid_curve() {
        let mut harq = HarqCombiner::new(McsTable::Table1, HarqMode::ChaseCombining);
        // 9.0 dB on the 3840-bit MCS 14 curve: BLER 0.961174
        let stats = harq.receive(&[db_to_linear(9.0); 4], &[0, 1, 2, 3], Mcs(14), 3904);
        assert!(approx_eq(stats.tbler, 0.961174, 1e-9));

        let mut rng = StdRng::seed_from_u64(1);
        let acks = (0..1000)
            .filter(|_| harq.decode_outcome(&stats, &mut rng))
            .count();
        // Expectation is ~39 successes
        assert!(acks < 150, "acks = {acks}");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("cc".parse::<HarqMode>().unwrap(), HarqMode::ChaseCombining);
        assert_eq!(
            "IR".parse::<HarqMode>().unwrap(),
            HarqMode::IncrementalRedundancy
        );
        assert!("hybrid".parse::<HarqMode>().is_err());
    }
}
