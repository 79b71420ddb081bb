//! Per-UE Scheduling State and Ranking Policies
//!
//! Mutable scheduling-cycle state for each attached UE, plus the pluggable
//! ranking policies the resource-assignment engine sorts candidates with:
//! Round-Robin (ascending RNTI, no throughput tracking) and
//! Proportional-Fair (exponentially smoothed average throughput with a
//! fairness exponent alpha).

use std::cmp::Ordering;
use std::ops::AddAssign;

use common::types::{BeamId, Mcs, Rnti};

use super::amc::Amc;

/// A (resource-block-group, symbol) resource amount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FtResources {
    pub rbg: u32,
    pub sym: u32,
}

impl FtResources {
    pub fn new(rbg: u32, sym: u32) -> Self {
        Self { rbg, sym }
    }
}

impl AddAssign for FtResources {
    fn add_assign(&mut self, rhs: Self) {
        self.rbg += rhs.rbg;
        self.sym += rhs.sym;
    }
}

/// Scheduling state of one UE, owned by the engine during a cycle.
///
/// `dl_rbg`/`ul_rbg` count RBG-per-symbol grant cells: a TDMA symbol grant
/// adds one cell per assignable RBG, an OFDMA RBG grant adds one cell per
/// beam symbol. Transport block sizes are in bytes, throughputs in bytes
/// per symbol.
#[derive(Debug, Clone)]
pub struct UeSchedulingState {
    pub rnti: Rnti,
    pub beam: BeamId,
    pub dl_mcs: Mcs,
    pub ul_mcs: Mcs,
    pub dl_rbg: u32,
    pub dl_sym: u32,
    pub ul_rbg: u32,
    pub ul_sym: u32,
    pub dl_tb_size: u32,
    pub ul_tb_size: u32,
    /// Pending DL bytes reported for this cycle
    pub dl_buffer: u32,
    /// Pending UL bytes reported for this cycle
    pub ul_buffer: u32,
    pub curr_tput_dl: f64,
    pub avg_tput_dl: f64,
    pub last_avg_tput_dl: f64,
    pub potential_tput_dl: f64,
    pub curr_tput_ul: f64,
    pub avg_tput_ul: f64,
    pub last_avg_tput_ul: f64,
    pub potential_tput_ul: f64,
}

impl UeSchedulingState {
    pub fn new(rnti: Rnti, beam: BeamId) -> Self {
        Self {
            rnti,
            beam,
            dl_mcs: Mcs(0),
            ul_mcs: Mcs(0),
            dl_rbg: 0,
            dl_sym: 0,
            ul_rbg: 0,
            ul_sym: 0,
            dl_tb_size: 0,
            ul_tb_size: 0,
            dl_buffer: 0,
            ul_buffer: 0,
            curr_tput_dl: 0.0,
            avg_tput_dl: 0.0,
            last_avg_tput_dl: 0.0,
            potential_tput_dl: 0.0,
            curr_tput_ul: 0.0,
            avg_tput_ul: 0.0,
            last_avg_tput_ul: 0.0,
            potential_tput_ul: 0.0,
        }
    }

    /// Zero the DL grant accumulators (start of cycle, or retry within one)
    pub fn reset_dl_metric(&mut self) {
        self.dl_rbg = 0;
        self.dl_sym = 0;
        self.dl_tb_size = 0;
    }

    pub fn reset_ul_metric(&mut self) {
        self.ul_rbg = 0;
        self.ul_sym = 0;
        self.ul_tb_size = 0;
    }

    /// Recompute the DL transport block size from the cells granted so far
    pub fn update_dl_metric(&mut self, amc: &Amc) {
        self.dl_tb_size = amc.tb_size(self.dl_mcs, self.dl_rbg);
    }

    pub fn update_ul_metric(&mut self, amc: &Amc) {
        self.ul_tb_size = amc.tb_size(self.ul_mcs, self.ul_rbg);
    }
}

/// Ranking and throughput-accounting hooks the engine drives.
///
/// `compare_*` returns `Less` when `a` outranks `b`; the engine sorts with
/// it and grants to the front. The assigned/not-assigned pair must be
/// invoked on every iteration for every active UE so that fairness
/// accounting advances uniformly.
pub trait SchedulingPolicy {
    /// Start-of-cycle reset for one UE
    fn reset_dl_sched_info(&self, ue: &mut UeSchedulingState) {
        ue.reset_dl_metric();
    }

    fn reset_ul_sched_info(&self, ue: &mut UeSchedulingState) {
        ue.reset_ul_metric();
    }

    /// Prime a UE with the resources assignable per iteration
    fn before_dl_sched(&self, ue: &mut UeSchedulingState, assignable: FtResources, amc: &Amc);

    fn before_ul_sched(&self, ue: &mut UeSchedulingState, assignable: FtResources, amc: &Amc);

    fn compare_dl(&self, a: &UeSchedulingState, b: &UeSchedulingState) -> Ordering;

    fn compare_ul(&self, a: &UeSchedulingState, b: &UeSchedulingState) -> Ordering;

    /// The UE won this iteration's grant
    fn assigned_dl_resources(
        &self,
        ue: &mut UeSchedulingState,
        assigned: FtResources,
        total: FtResources,
        amc: &Amc,
    );

    fn assigned_ul_resources(
        &self,
        ue: &mut UeSchedulingState,
        assigned: FtResources,
        total: FtResources,
        amc: &Amc,
    );

    /// The UE lost this iteration's grant
    fn not_assigned_dl_resources(
        &self,
        ue: &mut UeSchedulingState,
        not_assigned: FtResources,
        total: FtResources,
        amc: &Amc,
    );

    fn not_assigned_ul_resources(
        &self,
        ue: &mut UeSchedulingState,
        not_assigned: FtResources,
        total: FtResources,
        amc: &Amc,
    );
}

/// Round-Robin: the UE with the least resources granted this cycle goes
/// first, RNTI breaking ties; losers need no bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinPolicy;

impl SchedulingPolicy for RoundRobinPolicy {
    fn before_dl_sched(&self, _ue: &mut UeSchedulingState, _assignable: FtResources, _amc: &Amc) {}

    fn before_ul_sched(&self, _ue: &mut UeSchedulingState, _assignable: FtResources, _amc: &Amc) {}

    fn compare_dl(&self, a: &UeSchedulingState, b: &UeSchedulingState) -> Ordering {
        (a.dl_rbg, a.rnti).cmp(&(b.dl_rbg, b.rnti))
    }

    fn compare_ul(&self, a: &UeSchedulingState, b: &UeSchedulingState) -> Ordering {
        (a.ul_rbg, a.rnti).cmp(&(b.ul_rbg, b.rnti))
    }

    fn assigned_dl_resources(
        &self,
        ue: &mut UeSchedulingState,
        _assigned: FtResources,
        _total: FtResources,
        amc: &Amc,
    ) {
        ue.update_dl_metric(amc);
    }

    fn assigned_ul_resources(
        &self,
        ue: &mut UeSchedulingState,
        _assigned: FtResources,
        _total: FtResources,
        amc: &Amc,
    ) {
        ue.update_ul_metric(amc);
    }

    fn not_assigned_dl_resources(
        &self,
        _ue: &mut UeSchedulingState,
        _not_assigned: FtResources,
        _total: FtResources,
        _amc: &Amc,
    ) {
    }

    fn not_assigned_ul_resources(
        &self,
        _ue: &mut UeSchedulingState,
        _not_assigned: FtResources,
        _total: FtResources,
        _amc: &Amc,
    ) {
    }
}

/// Proportional-Fair: weight = potential^alpha / max(eps, average), with
/// the average exponentially smoothed over `window` iterations.
#[derive(Debug, Clone, Copy)]
pub struct ProportionalFairPolicy {
    /// Fairness exponent, 0 = throughput-blind, 1 = classic PF
    pub alpha: f64,
    /// Smoothing window W
    pub window: f64,
}

impl Default for ProportionalFairPolicy {
    fn default() -> Self {
        Self { alpha: 1.0, window: 99.0 }
    }
}

const PF_EPSILON: f64 = 1e-9;

impl ProportionalFairPolicy {
    fn dl_weight(&self, ue: &UeSchedulingState) -> f64 {
        ue.potential_tput_dl.powf(self.alpha) / PF_EPSILON.max(ue.avg_tput_dl)
    }

    fn ul_weight(&self, ue: &UeSchedulingState) -> f64 {
        ue.potential_tput_ul.powf(self.alpha) / PF_EPSILON.max(ue.avg_tput_ul)
    }

    fn update_dl_pf_metric(&self, ue: &mut UeSchedulingState, total: FtResources, amc: &Amc) {
        ue.update_dl_metric(amc);
        if total.sym > 0 {
            ue.curr_tput_dl = f64::from(ue.dl_tb_size) / f64::from(total.sym);
        }
        ue.avg_tput_dl = (1.0 - 1.0 / self.window) * ue.last_avg_tput_dl
            + (1.0 / self.window) * ue.curr_tput_dl;
    }

    fn update_ul_pf_metric(&self, ue: &mut UeSchedulingState, total: FtResources, amc: &Amc) {
        ue.update_ul_metric(amc);
        if total.sym > 0 {
            ue.curr_tput_ul = f64::from(ue.ul_tb_size) / f64::from(total.sym);
        }
        ue.avg_tput_ul = (1.0 - 1.0 / self.window) * ue.last_avg_tput_ul
            + (1.0 / self.window) * ue.curr_tput_ul;
    }
}

impl SchedulingPolicy for ProportionalFairPolicy {
    fn reset_dl_sched_info(&self, ue: &mut UeSchedulingState) {
        ue.last_avg_tput_dl = ue.avg_tput_dl;
        ue.avg_tput_dl = 0.0;
        ue.curr_tput_dl = 0.0;
        ue.potential_tput_dl = 0.0;
        ue.reset_dl_metric();
    }

    fn reset_ul_sched_info(&self, ue: &mut UeSchedulingState) {
        ue.last_avg_tput_ul = ue.avg_tput_ul;
        ue.avg_tput_ul = 0.0;
        ue.curr_tput_ul = 0.0;
        ue.potential_tput_ul = 0.0;
        ue.reset_ul_metric();
    }

    fn before_dl_sched(&self, ue: &mut UeSchedulingState, assignable: FtResources, amc: &Amc) {
        ue.potential_tput_dl =
            f64::from(amc.tb_size(ue.dl_mcs, assignable.rbg)) / f64::from(assignable.sym);
    }

    fn before_ul_sched(&self, ue: &mut UeSchedulingState, assignable: FtResources, amc: &Amc) {
        ue.potential_tput_ul =
            f64::from(amc.tb_size(ue.ul_mcs, assignable.rbg)) / f64::from(assignable.sym);
    }

    fn compare_dl(&self, a: &UeSchedulingState, b: &UeSchedulingState) -> Ordering {
        self.dl_weight(b)
            .partial_cmp(&self.dl_weight(a))
            .unwrap_or(Ordering::Equal)
    }

    fn compare_ul(&self, a: &UeSchedulingState, b: &UeSchedulingState) -> Ordering {
        self.ul_weight(b)
            .partial_cmp(&self.ul_weight(a))
            .unwrap_or(Ordering::Equal)
    }

    fn assigned_dl_resources(
        &self,
        ue: &mut UeSchedulingState,
        _assigned: FtResources,
        total: FtResources,
        amc: &Amc,
    ) {
        self.update_dl_pf_metric(ue, total, amc);
    }

    fn assigned_ul_resources(
        &self,
        ue: &mut UeSchedulingState,
        _assigned: FtResources,
        total: FtResources,
        amc: &Amc,
    ) {
        self.update_ul_pf_metric(ue, total, amc);
    }

    fn not_assigned_dl_resources(
        &self,
        ue: &mut UeSchedulingState,
        _not_assigned: FtResources,
        total: FtResources,
        amc: &Amc,
    ) {
        self.update_dl_pf_metric(ue, total, amc);
    }

    fn not_assigned_ul_resources(
        &self,
        ue: &mut UeSchedulingState,
        _not_assigned: FtResources,
        total: FtResources,
        amc: &Amc,
    ) {
        self.update_ul_pf_metric(ue, total, amc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::McsTable;
    use common::utils::approx_eq;

    fn amc() -> Amc {
        Amc::new(McsTable::Table1, 12, 1)
    }

    fn ue(rnti: u16) -> UeSchedulingState {
        UeSchedulingState::new(Rnti(rnti), BeamId(0))
    }

    #[test]
    fn test_rr_ranks_by_assigned_then_rnti() {
        let policy = RoundRobinPolicy;
        let a = ue(3);
        let b = ue(8);
        // Equal resources: RNTI breaks the tie
        assert_eq!(policy.compare_dl(&a, &b), Ordering::Less);
        assert_eq!(policy.compare_dl(&b, &a), Ordering::Greater);

        // A UE that has received less always ranks first
        let mut c = ue(1);
        c.dl_rbg = 5;
        assert_eq!(policy.compare_dl(&b, &c), Ordering::Less);
    }

    #[test]
    fn test_pf_weight_monotone_in_average() {
        let policy = ProportionalFairPolicy::default();
        let mut a = ue(1);
        let mut b = ue(2);
        a.potential_tput_dl = 100.0;
        b.potential_tput_dl = 100.0;
        a.avg_tput_dl = 10.0;
        b.avg_tput_dl = 50.0;
        // Equal potential, lower average ranks first
        assert_eq!(policy.compare_dl(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_pf_alpha_zero_ignores_potential() {
        let policy = ProportionalFairPolicy { alpha: 0.0, window: 99.0 };
        let mut a = ue(1);
        let mut b = ue(2);
        a.potential_tput_dl = 10.0;
        b.potential_tput_dl = 1000.0;
        a.avg_tput_dl = 5.0;
        b.avg_tput_dl = 5.0;
        assert_eq!(policy.compare_dl(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_pf_reset_rolls_average() {
        let policy = ProportionalFairPolicy::default();
        let mut u = ue(1);
        u.avg_tput_dl = 42.0;
        u.curr_tput_dl = 7.0;
        u.potential_tput_dl = 3.0;
        u.dl_rbg = 5;

        policy.reset_dl_sched_info(&mut u);
        assert!(approx_eq(u.last_avg_tput_dl, 42.0, 1e-12));
        assert_eq!(u.avg_tput_dl, 0.0);
        assert_eq!(u.curr_tput_dl, 0.0);
        assert_eq!(u.potential_tput_dl, 0.0);
        assert_eq!(u.dl_rbg, 0);
    }

    #[test]
    fn test_pf_average_update() {
        let policy = ProportionalFairPolicy::default();
        let amc = amc();
        let mut u = ue(1);
        u.dl_mcs = Mcs(14);
        u.last_avg_tput_dl = 10.0;
        u.dl_rbg = 4;

        policy.assigned_dl_resources(
            &mut u,
            FtResources::new(4, 1),
            FtResources::new(4, 2),
            &amc,
        );

        // tb_size(mcs14, 4 cells) = floor(12*4*4*0.48/8) = 11 bytes
        assert_eq!(u.dl_tb_size, 11);
        let current = 11.0 / 2.0;
        let expected = (1.0 - 1.0 / 99.0) * 10.0 + current / 99.0;
        assert!(approx_eq(u.avg_tput_dl, expected, 1e-12));
    }

    #[test]
    fn test_loser_average_decays() {
        let policy = ProportionalFairPolicy::default();
        let amc = amc();
        let mut u = ue(1);
        u.last_avg_tput_dl = 10.0;
        u.avg_tput_dl = 10.0;

        policy.not_assigned_dl_resources(
            &mut u,
            FtResources::new(4, 1),
            FtResources::new(4, 1),
            &amc,
        );

        // Nothing granted: the average decays towards zero
        assert!(u.avg_tput_dl < 10.0);
        assert!(approx_eq(u.avg_tput_dl, (1.0 - 1.0 / 99.0) * 10.0, 1e-12));
    }
}
