//! EESM Link-Adaptation Error Model
//!
//! Effective Exponential SINR Mapping (EESM) over LDPC-coded transport
//! blocks, following TS 38.212 segmentation and TS 38.214 MCS tables.
//! Per-RB SINR vectors are reduced to a single effective SINR through a
//! per-MCS beta, then mapped to a block error rate via link-level BLER
//! curves simulated per (base graph, MCS, code-block size).

use tracing::trace;

use common::types::{Mcs, McsTable};
use common::utils::linear_to_db;

/// LDPC base graph (TS 38.212 Section 5.2.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseGraph {
    One,
    Two,
}

/// One simulated BLER curve: (base graph, MCS, code-block size) keyed
struct BlerRow {
    bg: BaseGraph,
    mcs: u8,
    cb_size: u32,
    sinr_db: &'static [f64],
    bler: &'static [f64],
}

/// The per-table reference data, immutable after process start
struct TableData {
    beta: &'static [f64],
    ecr: &'static [f64],
    qm: &'static [u8],
    se_mcs: &'static [f64],
    se_cqi: &'static [f64],
    bler: &'static [BlerRow],
}

/// Decoding statistics for one transport block reception
#[derive(Debug, Clone)]
pub struct TbDecodeStats {
    /// Transport block error rate
    pub tbler: f64,
    /// Per-RB linear SINR of this reception
    pub sinr: Vec<f64>,
    /// RB positions the transport block occupied
    pub map: Vec<usize>,
    /// Effective SINR (linear) of this reception
    pub sinr_eff: f64,
    /// Information bits carried
    pub info_bits: u32,
    /// Coded bits (info bits / effective code rate)
    pub code_bits: f64,
}

/// EESM error model bound to one MCS table variant
#[derive(Debug, Clone, Copy)]
pub struct EesmErrorModel {
    table: McsTable,
}

impl EesmErrorModel {
    pub fn new(table: McsTable) -> Self {
        Self { table }
    }

    fn data(&self) -> &'static TableData {
        match self.table {
            McsTable::Table1 => &TABLE1,
            McsTable::Table2 => &TABLE2,
        }
    }

    /// Highest MCS index supported by the active table
    pub fn max_mcs(&self) -> u8 {
        (self.data().ecr.len() - 1) as u8
    }

    /// Effective code rate for an MCS
    pub fn ecr(&self, mcs: Mcs) -> f64 {
        self.data().ecr[mcs.0 as usize]
    }

    /// Modulation order (bits per symbol) for an MCS
    pub fn modulation_order(&self, mcs: Mcs) -> u8 {
        self.data().qm[mcs.0 as usize]
    }

    /// Spectral efficiency for an MCS index
    pub fn spectral_efficiency_for_mcs(&self, mcs: Mcs) -> f64 {
        self.data().se_mcs[mcs.0 as usize]
    }

    /// Spectral efficiency for a CQI index (0..15)
    pub fn spectral_efficiency_for_cqi(&self, cqi: u8) -> f64 {
        self.data().se_cqi[cqi as usize]
    }

    /// Transport block payload in bytes for an allocation of `rb_num`
    /// resource blocks with `useful_sc` data subcarriers each
    pub fn payload_size(&self, useful_sc: u32, mcs: Mcs, rb_num: u32) -> u32 {
        let qm = f64::from(self.modulation_order(mcs));
        let bits = f64::from(useful_sc) * f64::from(rb_num) * qm * self.ecr(mcs);
        (bits / 8.0).floor() as u32
    }

    /// Largest code block, in bytes, the base graph of this MCS/TB admits
    pub fn max_cb_size(&self, mcs: Mcs, tb_size_bit: u32) -> u32 {
        match self.base_graph(tb_size_bit, mcs) {
            BaseGraph::One => MAX_LIFTING_SIZE * 22 / 8,
            BaseGraph::Two => MAX_LIFTING_SIZE * 10 / 8,
        }
    }

    /// Per-MCS beta used by the exponential mapping
    pub fn beta(&self, mcs: Mcs) -> f64 {
        self.data().beta[mcs.0 as usize]
    }

    /// Effective SINR (linear) over the allocated RB positions
    pub fn sinr_eff(&self, sinr: &[f64], map: &[usize], mcs: Mcs) -> f64 {
        assert!(!map.is_empty(), "Empty RB allocation map");
        let beta = self.beta(mcs);

        let sum: f64 = map.iter().map(|&rb| (-sinr[rb] / beta).exp()).sum();
        let eff = -beta * (sum / map.len() as f64).ln();

        trace!(eff, beta, rbs = map.len(), "EESM effective SINR");
        eff
    }

    /// Base graph selection (TS 38.212 Section 7.2.2)
    pub fn base_graph(&self, tb_size_bit: u32, mcs: Mcs) -> BaseGraph {
        let ecr = self.ecr(mcs);
        if tb_size_bit <= 292
            || ecr <= 0.25
            || (tb_size_bit <= 3824 && ecr <= 0.67)
        {
            BaseGraph::Two
        } else {
            BaseGraph::One
        }
    }

    /// Code-block segmentation (TS 38.212 Section 5.2.2): number of code
    /// blocks and the LDPC-expanded block size K in bits
    fn segment(&self, tb_size_bit: u32, bg: BaseGraph) -> (u32, u32) {
        let (kcb, kb_factor) = match bg {
            BaseGraph::One => (8448u32, 22u32),
            BaseGraph::Two => (3840u32, 10u32),
        };

        let b = tb_size_bit;
        let (c, b1) = if b <= kcb {
            (1, b)
        } else {
            let l = 24;
            let c = (f64::from(b) / f64::from(kcb - l)).ceil() as u32;
            (c, b + c * l)
        };
        let k1 = b1 / c;

        let kb = match bg {
            BaseGraph::One => 22,
            BaseGraph::Two => {
                if b >= 640 {
                    10
                } else if b >= 560 {
                    9
                } else if b >= 192 {
                    8
                } else {
                    6
                }
            }
        };

        let target = f64::from(k1) / f64::from(kb) + 0.001;
        let zc = LIFTING_SIZES
            .iter()
            .copied()
            .find(|&z| f64::from(z) > target)
            .unwrap_or(MAX_LIFTING_SIZE);

        (c, zc * kb_factor)
    }

    /// BLER for an effective SINR, MCS and code-block size.
    ///
    /// The curve with the largest simulated code-block size not above the
    /// query is used (the smallest one when the query is below them all).
    /// Operating points without a simulated curve behave as a single-point
    /// curve at 0 dB: BLER 1 below it, 0 at or above it.
    pub fn mapping_sinr_bler(&self, sinr_eff: f64, mcs: Mcs, cb_size_bit: u32) -> f64 {
        let sinr_db = linear_to_db(sinr_eff);
        let bg = self.base_graph(cb_size_bit, mcs);

        let rows: Vec<&BlerRow> = self
            .data()
            .bler
            .iter()
            .filter(|r| r.bg == bg && r.mcs == mcs.0)
            .collect();

        let Some(row) = rows
            .iter()
            .rev()
            .find(|r| r.cb_size <= cb_size_bit)
            .or_else(|| rows.first())
        else {
            return if sinr_db < 0.0 { 1.0 } else { 0.0 };
        };

        if row.sinr_db.is_empty() {
            return if sinr_db < 0.0 { 1.0 } else { 0.0 };
        }
        if sinr_db < row.sinr_db[0] {
            return 1.0;
        }
        if sinr_db > *row.sinr_db.last().unwrap() {
            return 0.0;
        }

        let index = row
            .sinr_db
            .partition_point(|&s| s <= sinr_db)
            .saturating_sub(1);
        row.bler[index]
    }

    /// Transport-block error rate at a given effective SINR, applying
    /// code-block segmentation
    pub fn tbler(&self, sinr_eff: f64, mcs: Mcs, tb_size_bit: u32) -> f64 {
        let bg = self.base_graph(tb_size_bit, mcs);
        let (c, k) = self.segment(tb_size_bit, bg);

        let cbler = self.mapping_sinr_bler(sinr_eff, mcs, k);
        if c == 1 {
            cbler
        } else {
            1.0 - (1.0 - cbler).powi(c as i32)
        }
    }

    /// Full decode statistics for one reception of a transport block
    pub fn tb_decode_stats(
        &self,
        sinr: &[f64],
        map: &[usize],
        mcs: Mcs,
        tb_size_bit: u32,
    ) -> TbDecodeStats {
        let sinr_eff = self.sinr_eff(sinr, map, mcs);
        let tbler = self.tbler(sinr_eff, mcs, tb_size_bit);

        TbDecodeStats {
            tbler,
            sinr: sinr.to_vec(),
            map: map.to_vec(),
            sinr_eff,
            info_bits: tb_size_bit,
            code_bits: f64::from(tb_size_bit) / self.ecr(mcs),
        }
    }
}

const MAX_LIFTING_SIZE: u32 = 384;

/// LDPC lifting sizes Zc (TS 38.212 Table 5.3.2-1)
const LIFTING_SIZES: [u32; 51] = [
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 18, 20, 22, 24, 26,
    28, 30, 32, 36, 40, 44, 48, 52, 56, 60, 64, 72, 80, 88, 96, 104, 112,
    120, 128, 144, 160, 176, 192, 208, 224, 240, 256, 288, 320, 352, 384,
];

/// Effective code rate per MCS, TS 38.214 Table 5.1.3.1-1
static MCS_ECR_TABLE1: [f64; 29] = [
    0.08, 0.1, 0.11, 0.15, 0.19, 0.24, 0.3, 0.37, 0.44, 0.51, 0.3, 0.33,
    0.37, 0.42, 0.48, 0.54, 0.6, 0.43, 0.45, 0.5, 0.55, 0.6, 0.65, 0.7,
    0.75, 0.8, 0.85, 0.89, 0.92,
];

/// Effective code rate per MCS, TS 38.214 Table 5.1.3.1-2
static MCS_ECR_TABLE2: [f64; 28] = [
    0.11, 0.18, 0.30, 0.43, 0.58, 0.36, 0.42, 0.47, 0.54, 0.60, 0.64, 0.45,
    0.50, 0.55, 0.60, 0.65, 0.70, 0.75, 0.80, 0.85, 0.66, 0.69, 0.73, 0.77,
    0.82, 0.86, 0.89, 0.92,
];

/// Modulation order per MCS, table 1
static MCS_M_TABLE1: [u8; 29] = [
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 4, 4, 4, 4, 4, 4, 4, 6, 6, 6, 6, 6, 6, 6,
    6, 6, 6, 6, 6,
];

/// Modulation order per MCS, table 2
static MCS_M_TABLE2: [u8; 28] = [
    2, 2, 2, 2, 2, 4, 4, 4, 4, 4, 4, 6, 6, 6, 6, 6, 6, 6, 6, 6, 8, 8, 8, 8,
    8, 8, 8, 8,
];

/// Spectral efficiency per MCS, table 1
static SE_MCS_TABLE1: [f64; 29] = [
    0.2344, 0.3066, 0.377, 0.4902, 0.616, 0.7402, 0.877, 1.0273, 1.1758,
    1.3262, 1.3281, 1.4766, 1.6953, 1.9141, 2.1602, 2.4063, 2.5703, 2.5664,
    2.7305, 3.0293, 3.3223, 3.6094, 3.9023, 4.2129, 4.5234, 4.8164, 5.1152,
    5.3320, 5.5547,
];

/// Spectral efficiency per MCS, table 2
static SE_MCS_TABLE2: [f64; 28] = [
    0.2344, 0.3770, 0.6016, 0.8770, 1.1758, 1.4766, 1.6953, 1.9141, 2.1602,
    2.4063, 2.5703, 2.7305, 3.0293, 3.3223, 3.6094, 3.9023, 4.2129, 4.5234,
    4.8164, 5.1152, 5.3320, 5.5547, 5.8906, 6.2266, 6.5703, 6.9141, 7.1602,
    7.4063,
];

/// Spectral efficiency per CQI, table 1
static SE_CQI_TABLE1: [f64; 16] = [
    0.0, 0.15, 0.23, 0.38, 0.6, 0.88, 1.18, 1.48, 1.91, 2.41, 2.73, 3.32,
    3.9, 4.52, 5.12, 5.55,
];

/// Spectral efficiency per CQI, table 2
static SE_CQI_TABLE2: [f64; 16] = [
    0.0, 0.15, 0.37, 0.87, 1.47, 1.91, 2.40, 2.73, 3.32, 3.90, 4.52, 5.11,
    5.55, 6.22, 6.91, 7.40,
];

/// EESM beta per MCS, table 1
static BETA_TABLE1: [f64; 29] = [
    1.6, 1.61, 1.63, 1.65, 1.67, 1.7, 1.73, 1.76, 1.79, 1.82, 3.97, 4.27,
    4.71, 5.16, 5.66, 6.16, 6.5, 9.95, 10.97, 12.92, 14.96, 17.06, 19.33,
    21.85, 24.51, 27.14, 29.94, 32.05, 34.28,
];

/// EESM beta per MCS, table 2
static BETA_TABLE2: [f64; 28] = [
    1.6, 1.63, 1.67, 1.7, 1.73, 3.97, 4.27, 4.71, 5.16, 5.66, 6.16, 9.95,
    10.97, 12.92, 14.96, 17.06, 19.33, 21.85, 24.51, 27.14, 27.5, 28.8,
    30.4, 32.1, 33.9, 35.7, 37.6, 39.5,
];

static SINR_MCS14_BG1: [f64; 5] = [8.5294, 8.8435, 9.1576, 9.4717, 9.7858];
static BLER_MCS14_CB3840: [f64; 5] = [1.0, 0.961174, 0.455197, 0.0222, 0.0001];
static BLER_MCS14_CB6272: [f64; 5] = [1.0, 0.992308, 0.543269, 0.0161, 0.0001];

static SINR_MCS18_BG2: [f64; 5] = [11.6728, 12.5486, 13.4245, 14.3004, 15.1763];
static BLER_MCS18_CB1736: [f64; 5] = [0.744913, 0.0015, 0.0, 0.0, 0.0];
static BLER_MCS18_CB3104: [f64; 5] = [0.964962, 0.0036, 0.0, 0.0, 0.0];
static BLER_MCS18_CB3496: [f64; 5] = [0.967803, 0.0038, 0.0, 0.0, 0.0];

/// Link-level BLER curves, table 1. Rows sorted by (bg, mcs, cb_size).
static BLER_TABLE1: [BlerRow; 5] = [
    BlerRow {
        bg: BaseGraph::One,
        mcs: 14,
        cb_size: 3840,
        sinr_db: &SINR_MCS14_BG1,
        bler: &BLER_MCS14_CB3840,
    },
    BlerRow {
        bg: BaseGraph::One,
        mcs: 14,
        cb_size: 6272,
        sinr_db: &SINR_MCS14_BG1,
        bler: &BLER_MCS14_CB6272,
    },
    BlerRow {
        bg: BaseGraph::Two,
        mcs: 18,
        cb_size: 1736,
        sinr_db: &SINR_MCS18_BG2,
        bler: &BLER_MCS18_CB1736,
    },
    BlerRow {
        bg: BaseGraph::Two,
        mcs: 18,
        cb_size: 3104,
        sinr_db: &SINR_MCS18_BG2,
        bler: &BLER_MCS18_CB3104,
    },
    BlerRow {
        bg: BaseGraph::Two,
        mcs: 18,
        cb_size: 3496,
        sinr_db: &SINR_MCS18_BG2,
        bler: &BLER_MCS18_CB3496,
    },
];

/// Link-level BLER curves, table 2
static BLER_TABLE2: [BlerRow; 5] = [
    BlerRow {
        bg: BaseGraph::One,
        mcs: 8,
        cb_size: 3840,
        sinr_db: &SINR_MCS14_BG1,
        bler: &BLER_MCS14_CB3840,
    },
    BlerRow {
        bg: BaseGraph::One,
        mcs: 8,
        cb_size: 6272,
        sinr_db: &SINR_MCS14_BG1,
        bler: &BLER_MCS14_CB6272,
    },
    BlerRow {
        bg: BaseGraph::Two,
        mcs: 11,
        cb_size: 1736,
        sinr_db: &SINR_MCS18_BG2,
        bler: &BLER_MCS18_CB1736,
    },
    BlerRow {
        bg: BaseGraph::Two,
        mcs: 11,
        cb_size: 3104,
        sinr_db: &SINR_MCS18_BG2,
        bler: &BLER_MCS18_CB3104,
    },
    BlerRow {
        bg: BaseGraph::Two,
        mcs: 11,
        cb_size: 3496,
        sinr_db: &SINR_MCS18_BG2,
        bler: &BLER_MCS18_CB3496,
    },
];

static TABLE1: TableData = TableData {
    beta: &BETA_TABLE1,
    ecr: &MCS_ECR_TABLE1,
    qm: &MCS_M_TABLE1,
    se_mcs: &SE_MCS_TABLE1,
    se_cqi: &SE_CQI_TABLE1,
    bler: &BLER_TABLE1,
};

static TABLE2: TableData = TableData {
    beta: &BETA_TABLE2,
    ecr: &MCS_ECR_TABLE2,
    qm: &MCS_M_TABLE2,
    se_mcs: &SE_MCS_TABLE2,
    se_cqi: &SE_CQI_TABLE2,
    bler: &BLER_TABLE2,
};

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::{approx_eq, db_to_linear};

    #[test]
    fn test_base_graph_selection() {
        let model = EesmErrorModel::new(McsTable::Table1);
        // Low code rate always lands on BG2
        assert_eq!(model.base_graph(4000, Mcs(5)), BaseGraph::Two);
        // Small blocks land on BG2 regardless of rate
        assert_eq!(model.base_graph(280, Mcs(28)), BaseGraph::Two);
        // Mid-size block, mid rate
        assert_eq!(model.base_graph(3104, Mcs(18)), BaseGraph::Two);
        // Large block, higher rate
        assert_eq!(model.base_graph(3904, Mcs(14)), BaseGraph::One);
    }

    #[test]
    fn test_sinr_eff_two_rb() {
        let model = EesmErrorModel::new(McsTable::Table1);
        let sinr = [db_to_linear(1.0), db_to_linear(3.5)];
        let eff = model.sinr_eff(&sinr, &[0, 1], Mcs(5));
        assert!(approx_eq(eff, 1.67919, 0.001), "eff = {eff}");
    }

    #[test]
    fn test_sinr_eff_uniform_is_identity() {
        let model = EesmErrorModel::new(McsTable::Table1);
        let sinr = [2.5; 8];
        let eff = model.sinr_eff(&sinr, &[0, 1, 2, 3, 4, 5, 6, 7], Mcs(14));
        assert!(approx_eq(eff, 2.5, 1e-9));
    }

    #[test]
    fn test_bler_lookup_mcs14() {
        let model = EesmErrorModel::new(McsTable::Table1);
        // cb 3900 selects the 3840 curve
        let b = model.mapping_sinr_bler(db_to_linear(9.5), Mcs(14), 3900);
        assert!(approx_eq(b, 0.0222, 1e-9), "bler = {b}");
        let b = model.mapping_sinr_bler(db_to_linear(9.0), Mcs(14), 3900);
        assert!(approx_eq(b, 0.961174, 1e-9), "bler = {b}");
        // Below the simulated range
        let b = model.mapping_sinr_bler(db_to_linear(8.0), Mcs(14), 3900);
        assert!(approx_eq(b, 1.0, 1e-9));
        // Above the simulated range
        let b = model.mapping_sinr_bler(db_to_linear(10.5), Mcs(14), 3900);
        assert!(approx_eq(b, 0.0, 1e-9));
        // cb 6300 selects the 6272 curve
        let b = model.mapping_sinr_bler(db_to_linear(9.5), Mcs(14), 6300);
        assert!(approx_eq(b, 0.0161, 1e-9), "bler = {b}");
        let b = model.mapping_sinr_bler(db_to_linear(9.0), Mcs(14), 6300);
        assert!(approx_eq(b, 0.992308, 1e-9), "bler = {b}");
    }

    #[test]
    fn test_bler_lookup_mcs18() {
        let model = EesmErrorModel::new(McsTable::Table1);
        let b = model.mapping_sinr_bler(db_to_linear(13.0), Mcs(18), 3200);
        assert!(approx_eq(b, 0.0036, 1e-9), "bler = {b}");
        let b = model.mapping_sinr_bler(db_to_linear(12.0), Mcs(18), 3200);
        assert!(approx_eq(b, 0.964962, 1e-9), "bler = {b}");
        let b = model.mapping_sinr_bler(db_to_linear(10.0), Mcs(18), 3200);
        assert!(approx_eq(b, 1.0, 1e-9));
        // A query below every simulated size falls back to the smallest
        // curve; 12.5 dB still sits on the first grid point (11.6728)
        let b = model.mapping_sinr_bler(db_to_linear(12.5), Mcs(18), 1000);
        assert!(approx_eq(b, 0.744913, 1e-9), "bler = {b}");
        let b = model.mapping_sinr_bler(db_to_linear(12.6), Mcs(18), 1000);
        assert!(approx_eq(b, 0.0015, 1e-9), "bler = {b}");
    }

    #[test]
    fn test_unsimulated_mcs_placeholder_curve() {
        let model = EesmErrorModel::new(McsTable::Table1);
        // No curve for MCS 5: the placeholder pivots at 0 dB
        assert_eq!(model.mapping_sinr_bler(db_to_linear(0.0), Mcs(5), 2080), 0.0);
        assert_eq!(model.mapping_sinr_bler(db_to_linear(-1.0), Mcs(5), 2080), 1.0);
    }

    #[test]
    fn test_segmentation_single_block() {
        let model = EesmErrorModel::new(McsTable::Table1);
        // 2048-bit TB at MCS 5 is one BG2 code block, Kb=10, Zc=208
        let (c, k) = model.segment(2048, BaseGraph::Two);
        assert_eq!(c, 1);
        assert_eq!(k, 2080);
    }

    #[test]
    fn test_segmentation_multi_block() {
        let model = EesmErrorModel::new(McsTable::Table1);
        // 16000 bits on BG1: two code blocks with 24 CRC bits each
        let (c, k) = model.segment(16000, BaseGraph::One);
        assert_eq!(c, 2);
        // K1 = (16000 + 48) / 2 = 8024; Zc = first size > 8024/22 = 384
        assert_eq!(k, 8448);
    }

    #[test]
    fn test_tb_decode_stats_code_bits() {
        let model = EesmErrorModel::new(McsTable::Table1);
        let sinr = vec![db_to_linear(5.0); 4];
        let stats = model.tb_decode_stats(&sinr, &[0, 1, 2, 3], Mcs(5), 2048);
        assert_eq!(stats.info_bits, 2048);
        assert!(approx_eq(stats.code_bits, 2048.0 / 0.24, 1e-6));
        assert_eq!(stats.tbler, 0.0);
    }

    #[test]
    fn test_payload_size() {
        let model = EesmErrorModel::new(McsTable::Table1);
        // 132 subcarriers, 10 RB, 16QAM at rate 0.48
        assert_eq!(model.payload_size(132, Mcs(14), 10), 316);
        // Zero resources carry nothing
        assert_eq!(model.payload_size(132, Mcs(14), 0), 0);
    }

    #[test]
    fn test_table_limits() {
        let t1 = EesmErrorModel::new(McsTable::Table1);
        let t2 = EesmErrorModel::new(McsTable::Table2);
        assert_eq!(t1.max_mcs(), 28);
        assert_eq!(t2.max_mcs(), 27);
        assert_eq!(t1.max_cb_size(Mcs(14), 8000), 384 * 22 / 8);
        assert_eq!(t1.max_cb_size(Mcs(5), 2048), 384 * 10 / 8);
        assert_eq!(t2.modulation_order(Mcs(25)), 8);
        assert!(approx_eq(t1.spectral_efficiency_for_cqi(15), 5.55, 1e-9));
        assert!(approx_eq(t2.spectral_efficiency_for_mcs(Mcs(27)), 7.4063, 1e-9));
    }
}
