//! Initial Cell Association
//!
//! Beam-swept RSRP search over candidate gNBs, handoff-margin based cell
//! selection, and interference-set ranking. The radio channel itself is
//! abstracted behind [`RsrpProbe`] so the resolver owns no propagation
//! model; probes are expected to evaluate a throwaway copy of the antenna
//! configuration so the search never perturbs the live arrays.

use rand::Rng;
use tracing::{debug, info};

use common::utils::{db_to_linear, linear_to_db};

/// Channel measurement access for the association search
pub trait RsrpProbe {
    /// Number of candidate gNBs
    fn num_gnbs(&self) -> usize;

    /// Number of selectable UE antenna panels
    fn num_panels(&self) -> usize;

    /// Linear received power spectral density over the SSB sub-band for a
    /// (gNB, carrier, UE panel, beam direction) tuple. `None` when the gNB
    /// is out of range of the UE.
    fn rx_power(
        &self,
        gnb: usize,
        carrier: usize,
        panel: usize,
        row_deg: f64,
        col_deg: f64,
    ) -> Option<f64>;

    /// Wideband path gain in dB towards a gNB, applied on top of the best
    /// beam's power spectral density
    fn path_gain_db(&self, gnb: usize) -> f64 {
        let _ = gnb;
        0.0
    }
}

/// Association procedure parameters
#[derive(Debug, Clone)]
pub struct AssociationConfig {
    /// RSRP window below the maximum inside which a gNB stays a candidate
    pub handoff_margin_db: f64,
    /// Carrier used for the RSRP measurements
    pub primary_carrier: usize,
    /// Fixed interferer count when relative-RSRP mode is off
    pub num_main_interferer_gnb: usize,
    /// Vertical beam sweep angles in degrees
    pub row_angles: Vec<f64>,
    /// Horizontal beam sweep angles in degrees
    pub col_angles: Vec<f64>,
    /// Carrier frequency in Hz, bounds the beam sweep size
    pub carrier_frequency_hz: f64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            handoff_margin_db: 0.0,
            primary_carrier: 0,
            num_main_interferer_gnb: 6,
            row_angles: vec![0.0, 90.0],
            col_angles: vec![0.0, 90.0],
            carrier_frequency_hz: 0.0,
        }
    }
}

/// Parse a vertical-bar-separated angle list such as "0|90|180"
pub fn parse_angles(s: &str) -> Result<Vec<f64>, String> {
    s.split('|')
        .map(|tok| {
            tok.trim()
                .parse::<f64>()
                .map_err(|e| format!("Invalid beam angle '{tok}': {e}"))
        })
        .collect()
}

/// The beam that produced the strongest measurement towards one gNB
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BeamChoice {
    pub row_deg: f64,
    pub col_deg: f64,
    pub panel: usize,
}

/// Association session state for one UE
#[derive(Debug)]
pub struct InitialAssociation<P: RsrpProbe> {
    probe: P,
    cfg: AssociationConfig,
    max_rsrps_db: Vec<f64>,
    best_beams: Vec<BeamChoice>,
    active_panel: usize,
    associated: Option<usize>,
    rsrp_assoc_db: f64,
    num_intf_gnbs: usize,
    intf_set: Vec<usize>,
    rsrp_ratio: f64,
}

impl<P: RsrpProbe> InitialAssociation<P> {
    pub fn new(probe: P, cfg: AssociationConfig) -> Self {
        Self {
            probe,
            cfg,
            max_rsrps_db: Vec::new(),
            best_beams: Vec::new(),
            active_panel: 0,
            associated: None,
            rsrp_assoc_db: 0.0,
            num_intf_gnbs: 0,
            intf_set: Vec::new(),
            rsrp_ratio: 0.0,
        }
    }

    /// Frequency-dependent ceiling on the beam sweep size. Callers must
    /// check this before running the search.
    pub fn check_num_beams_allowed(&self) -> bool {
        assert!(
            self.cfg.carrier_frequency_hz > 0.0,
            "Carrier frequency must be set before the association search"
        );

        let num_beams = self.cfg.row_angles.len() * self.cfg.col_angles.len();
        if self.cfg.carrier_frequency_hz <= 3e9 {
            num_beams <= 4
        } else if self.cfg.carrier_frequency_hz <= 6e9 {
            num_beams <= 8
        } else {
            num_beams <= 64
        }
    }

    /// Best beam sweep result towards one gNB, in linear power. Out-of-range
    /// (panel, beam) pairs are skipped; a gNB with no reachable beam yields
    /// zero power.
    fn compute_max_rsrp(&mut self, gnb: usize) -> f64 {
        let mut max_psd = 0.0_f64;
        let mut best = BeamChoice::default();
        let mut panel = self.active_panel;

        for k in 0..self.probe.num_panels() {
            for &row in &self.cfg.row_angles {
                for &col in &self.cfg.col_angles {
                    let Some(psd) = self.probe.rx_power(
                        gnb,
                        self.cfg.primary_carrier,
                        k,
                        row,
                        col,
                    ) else {
                        continue;
                    };
                    if psd > max_psd {
                        max_psd = psd;
                        best = BeamChoice { row_deg: row, col_deg: col, panel: k };
                        panel = k;
                    }
                }
            }
        }

        self.best_beams.push(best);
        self.active_panel = panel;
        db_to_linear(self.probe.path_gain_db(gnb)) * max_psd
    }

    /// Run the beam sweep for every candidate gNB and store the maxima in dB
    pub fn populate_rsrps(&mut self) {
        self.best_beams.clear();
        self.max_rsrps_db = (0..self.probe.num_gnbs())
            .map(|gnb| {
                let rsrp = self.compute_max_rsrp(gnb);
                linear_to_db(rsrp)
            })
            .collect();

        debug!(rsrps = ?self.max_rsrps_db, "Populated candidate RSRPs");
    }

    /// Pick the serving gNB: all candidates within the handoff margin of
    /// the maximum RSRP are eligible, one is drawn uniformly at random.
    /// Returns the gNB index and its RSRP in dB.
    pub fn find_associated_gnb<R: Rng>(&mut self, rng: &mut R) -> (usize, f64) {
        assert!(self.probe.num_gnbs() > 0, "No candidate gNBs to associate with");

        if self.max_rsrps_db.is_empty() {
            self.populate_rsrps();
        }

        let max_val = self
            .max_rsrps_db
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);

        let assoc_flag: Vec<bool> = self
            .max_rsrps_db
            .iter()
            .map(|&v| (max_val - v) <= self.cfg.handoff_margin_db)
            .collect();
        let num_possible = assoc_flag.iter().filter(|&&f| f).count();

        let value = rng.gen_range(1..=num_possible);
        let mut count = 0;
        for (i, &flag) in assoc_flag.iter().enumerate() {
            if flag {
                count += 1;
            }
            if count == value && flag {
                self.associated = Some(i);
                self.rsrp_assoc_db = self.max_rsrps_db[i];
                info!(
                    gnb = i,
                    rsrp_db = self.rsrp_assoc_db,
                    candidates = num_possible,
                    "Associated"
                );
                return (i, self.rsrp_assoc_db);
            }
        }

        unreachable!("A flagged candidate must have been drawn");
    }

    /// Rank the interferers of the associated gNB. With `use_rel_rsrp`
    /// the interferer count is shrunk to the smallest set whose residual
    /// power stays within `rel_rsrp_threshold` of the total interference;
    /// otherwise the configured fixed count is used. Returns the ratio of
    /// residual to main interference.
    pub fn initialize_intf_set(
        &mut self,
        use_rel_rsrp: bool,
        rel_rsrp_threshold: f64,
    ) -> f64 {
        assert!(!self.max_rsrps_db.is_empty(), "Populate RSRP values first");
        let associated = self.associated.expect("Association must complete first");

        self.num_intf_gnbs = self.cfg.num_main_interferer_gnb;

        let mut idx_val: Vec<usize> = (0..self.max_rsrps_db.len()).collect();
        idx_val.sort_by(|&i, &j| {
            self.max_rsrps_db[i]
                .partial_cmp(&self.max_rsrps_db[j])
                .unwrap()
        });

        // Cumulative linear power from the weakest candidate upward
        let mut cum_sum = Vec::with_capacity(idx_val.len());
        let mut acc = 0.0;
        for &i in &idx_val {
            acc += db_to_linear(self.max_rsrps_db[i]);
            cum_sum.push(acc);
        }

        let total_interference = acc - db_to_linear(self.rsrp_assoc_db);
        assert!(
            total_interference > 0.0,
            "Detected interferer power must be greater than zero"
        );

        if use_rel_rsrp {
            self.num_intf_gnbs =
                Self::num_intf_by_rel_rsrp(&cum_sum, rel_rsrp_threshold, total_interference);
        }

        assert!(self.num_intf_gnbs > 0, "Interferer count must be positive");
        assert!(
            self.num_intf_gnbs < self.max_rsrps_db.len(),
            "Interferer count must leave room for the serving gNB"
        );

        // Collect the strongest interferers, skipping the serving gNB
        self.intf_set.clear();
        let mut intf_rsrp = 0.0;
        let mut j = idx_val.len();
        while self.intf_set.len() < self.num_intf_gnbs {
            j -= 1;
            let gnb = idx_val[j];
            if gnb != associated {
                self.intf_set.push(gnb);
                intf_rsrp += db_to_linear(self.max_rsrps_db[gnb]);
            }
        }

        self.rsrp_ratio = (total_interference - intf_rsrp) / intf_rsrp;
        debug!(
            interferers = ?self.intf_set,
            ratio = self.rsrp_ratio,
            "Interference set initialised"
        );
        self.rsrp_ratio
    }

    fn num_intf_by_rel_rsrp(
        cum_sum: &[f64],
        rel_rsrp_threshold: f64,
        total_interference: f64,
    ) -> usize {
        let mut num = cum_sum.len() - 1;
        for (i, &c) in cum_sum.iter().enumerate() {
            // Equivalent to: residual below i stays within threshold of the
            // main interference (totalInterference - cumSum[i])
            if (1.0 + rel_rsrp_threshold) * c > rel_rsrp_threshold * total_interference {
                num -= i;
                break;
            }
        }
        num
    }

    /// RSRP of the serving gNB in dB
    pub fn associated_rsrp(&self) -> f64 {
        self.rsrp_assoc_db
    }

    /// Measured maximum RSRP per candidate, in dB
    pub fn max_rsrps(&self) -> &[f64] {
        &self.max_rsrps_db
    }

    /// Beam that produced the maximum towards a candidate
    pub fn best_beam(&self, gnb: usize) -> BeamChoice {
        self.best_beams[gnb]
    }

    /// Ranked interferer set, strongest first
    pub fn interferers(&self) -> &[usize] {
        &self.intf_set
    }

    /// Residual-to-main interference ratio from the last ranking
    pub fn rsrp_ratio(&self) -> f64 {
        self.rsrp_ratio
    }
}
