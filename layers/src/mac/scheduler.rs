//! Resource Assignment Engine
//!
//! Greedy symbol/RBG allocation across the active UEs of a cell, generic
//! over the ranking policy. TDMA grants whole symbols spanning the full
//! bandwidth; OFDMA first splits the slot's symbols across beams in
//! proportion to their buffered load, then grants RBG-wide stripes inside
//! each beam. DCI construction turns the accumulated grants into control
//! information for the slot executor, refusing allocations too small to
//! carry a useful payload.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use common::types::BeamId;
use interfaces::message_types::{DciFormat, DciInfo, SlotAllocInfo};

use super::amc::Amc;
use super::ue_info::{FtResources, SchedulingPolicy, UeSchedulingState};

/// Resource granularity of one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// Whole symbols, full bandwidth per grant
    #[default]
    Tdma,
    /// Per-beam symbol regions, one RBG stripe per grant
    Ofdma,
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tdma" | "TDMA" => Ok(Self::Tdma),
            "ofdma" | "OFDMA" => Ok(Self::Ofdma),
            other => Err(format!("Unknown scheduler granularity: {other}")),
        }
    }
}

/// Cursor in the slot's time/frequency grid during DCI construction
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedPoint {
    pub rbg: u32,
    pub sym: u32,
}

/// Buffers at or under this are treated as satisfied once covered, bytes
const MIN_SCHED_BYTES: u32 = 10;
/// Minimum DL transport block worth a DCI, bytes
const MIN_DL_TBS: u32 = 10;
/// Minimum UL transport block worth a DCI, bytes
const MIN_UL_TBS: u32 = 12;

/// The scheduling engine for one cell, both directions
#[derive(Debug, Clone)]
pub struct ResourceAssignmentEngine<P: SchedulingPolicy> {
    policy: P,
    amc: Amc,
    granularity: Granularity,
    bandwidth_rbg: u32,
}

impl<P: SchedulingPolicy> ResourceAssignmentEngine<P> {
    pub fn new(policy: P, amc: Amc, granularity: Granularity, bandwidth_rbg: u32) -> Self {
        assert!(bandwidth_rbg > 0, "Cell bandwidth must span at least one RBG");
        Self { policy, amc, granularity, bandwidth_rbg }
    }

    pub fn amc(&self) -> &Amc {
        &self.amc
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn bandwidth_rbg(&self) -> u32 {
        self.bandwidth_rbg
    }

    /// The shared greedy loop: while resources remain, rank the candidates,
    /// skip the ones whose transport block already covers their buffer,
    /// grant one unit to the front-runner and run the accounting hooks on
    /// everyone. Returns the units actually consumed.
    #[allow(clippy::too_many_arguments)]
    fn greedy_assign<FBuf, FGrant>(
        &self,
        ues: &mut [UeSchedulingState],
        candidates: &[usize],
        mut resources: u32,
        per_grant: FtResources,
        delta: FtResources,
        assigned: &mut FtResources,
        dl: bool,
        buffer_of: FBuf,
        mut grant: FGrant,
    ) -> u32
    where
        FBuf: Fn(&UeSchedulingState) -> (u32, u32),
        FGrant: FnMut(&mut UeSchedulingState),
    {
        let mut order: Vec<usize> = candidates.to_vec();
        let available = resources;

        while resources > 0 {
            order.sort_by(|&a, &b| {
                if dl {
                    self.policy.compare_dl(&ues[a], &ues[b])
                } else {
                    self.policy.compare_ul(&ues[a], &ues[b])
                }
            });

            let winner = order.iter().copied().find(|&i| {
                let (tbs, buf) = buffer_of(&ues[i]);
                tbs < buf.max(MIN_SCHED_BYTES)
            });
            let Some(w) = winner else {
                trace!("All candidate buffers satisfied, stopping early");
                break;
            };

            grant(&mut ues[w]);
            *assigned += delta;
            if dl {
                self.policy
                    .assigned_dl_resources(&mut ues[w], per_grant, *assigned, &self.amc);
            } else {
                self.policy
                    .assigned_ul_resources(&mut ues[w], per_grant, *assigned, &self.amc);
            }

            for &i in candidates {
                if i == w {
                    continue;
                }
                if dl {
                    self.policy.not_assigned_dl_resources(
                        &mut ues[i],
                        per_grant,
                        *assigned,
                        &self.amc,
                    );
                } else {
                    self.policy.not_assigned_ul_resources(
                        &mut ues[i],
                        per_grant,
                        *assigned,
                        &self.amc,
                    );
                }
            }

            resources -= 1;
        }

        available - resources
    }

    /// TDMA downlink assignment: each grant is one symbol spanning every
    /// assignable RBG. Returns the per-beam symbol totals.
    pub fn assign_dl_tdma(
        &self,
        ues: &mut [UeSchedulingState],
        sym_avail: u32,
        rbg_bitmask: &[bool],
    ) -> BTreeMap<BeamId, u32> {
        let num_assignable = count_assignable(rbg_bitmask);
        let candidates = active_dl(ues);
        let per_grant = FtResources::new(num_assignable, 1);

        for &i in &candidates {
            self.policy.before_dl_sched(&mut ues[i], per_grant, &self.amc);
        }

        let mut assigned = FtResources::default();
        let used = self.greedy_assign(
            ues,
            &candidates,
            sym_avail,
            per_grant,
            per_grant,
            &mut assigned,
            true,
            |ue| (ue.dl_tb_size, ue.dl_buffer),
            |ue| {
                ue.dl_rbg += num_assignable;
                ue.dl_sym += 1;
            },
        );
        debug!(used, sym_avail, "TDMA DL symbols assigned");

        let mut beams = BTreeMap::new();
        for ue in ues.iter() {
            if ue.dl_rbg > 0 {
                *beams.entry(ue.beam).or_insert(0) += ue.dl_rbg / num_assignable;
            }
        }
        beams
    }

    /// TDMA uplink assignment, structurally identical to DL
    pub fn assign_ul_tdma(
        &self,
        ues: &mut [UeSchedulingState],
        sym_avail: u32,
        rbg_bitmask: &[bool],
    ) -> BTreeMap<BeamId, u32> {
        let num_assignable = count_assignable(rbg_bitmask);
        let candidates = active_ul(ues);
        let per_grant = FtResources::new(num_assignable, 1);

        for &i in &candidates {
            self.policy.before_ul_sched(&mut ues[i], per_grant, &self.amc);
        }

        let mut assigned = FtResources::default();
        let used = self.greedy_assign(
            ues,
            &candidates,
            sym_avail,
            per_grant,
            per_grant,
            &mut assigned,
            false,
            |ue| (ue.ul_tb_size, ue.ul_buffer),
            |ue| {
                ue.ul_rbg += num_assignable;
                ue.ul_sym += 1;
            },
        );
        debug!(used, sym_avail, "TDMA UL symbols assigned");

        let mut beams = BTreeMap::new();
        for ue in ues.iter() {
            if ue.ul_rbg > 0 {
                *beams.entry(ue.beam).or_insert(0) += ue.ul_rbg / num_assignable;
            }
        }
        beams
    }

    /// Split the slot's data symbols across beams in proportion to their
    /// buffered load, remainders going one at a time to the beam holding
    /// the fewest symbols.
    fn sym_per_beam(beam_buf: &BTreeMap<BeamId, u64>, sym_avail: u32) -> BTreeMap<BeamId, u32> {
        let total: u64 = beam_buf.values().sum();
        let mut split: BTreeMap<BeamId, u32> = BTreeMap::new();

        if total == 0 {
            return split;
        }

        for (&beam, &buf) in beam_buf {
            split.insert(beam, (buf * u64::from(sym_avail) / total) as u32);
        }

        let mut leftover = sym_avail - split.values().sum::<u32>();
        while leftover > 0 {
            let min_beam = *split
                .iter()
                .min_by_key(|&(beam, &syms)| (syms, *beam))
                .map(|(beam, _)| beam)
                .expect("Beam map cannot be empty here");
            *split.get_mut(&min_beam).unwrap() += 1;
            leftover -= 1;
        }

        split
    }

    /// OFDMA downlink assignment: per beam, each grant is one RBG stripe
    /// spanning the beam's symbols. Returns the per-beam symbol split.
    pub fn assign_dl_ofdma(
        &self,
        ues: &mut [UeSchedulingState],
        sym_avail: u32,
        rbg_bitmask: &[bool],
    ) -> BTreeMap<BeamId, u32> {
        let num_assignable = count_assignable(rbg_bitmask);
        let candidates = active_dl(ues);

        let mut beam_buf: BTreeMap<BeamId, u64> = BTreeMap::new();
        for &i in &candidates {
            *beam_buf.entry(ues[i].beam).or_insert(0) += u64::from(ues[i].dl_buffer);
        }

        let split = Self::sym_per_beam(&beam_buf, sym_avail);

        for (&beam, &beam_sym) in &split {
            if beam_sym == 0 {
                continue;
            }
            let members: Vec<usize> =
                candidates.iter().copied().filter(|&i| ues[i].beam == beam).collect();

            // One RBG stripe over the beam's symbols per grant
            let per_grant = FtResources::new(beam_sym, beam_sym);
            for &i in &members {
                self.policy.before_dl_sched(&mut ues[i], per_grant, &self.amc);
            }

            let mut assigned = FtResources { rbg: 0, sym: beam_sym };
            let used = self.greedy_assign(
                ues,
                &members,
                num_assignable,
                per_grant,
                FtResources::new(1, 0),
                &mut assigned,
                true,
                |ue| (ue.dl_tb_size, ue.dl_buffer),
                |ue| {
                    ue.dl_rbg += beam_sym;
                    ue.dl_sym = beam_sym;
                },
            );
            debug!(?beam, beam_sym, rbg_used = used, "OFDMA DL beam assigned");
        }

        split
    }

    /// OFDMA uplink assignment, mirroring the DL pass
    pub fn assign_ul_ofdma(
        &self,
        ues: &mut [UeSchedulingState],
        sym_avail: u32,
        rbg_bitmask: &[bool],
    ) -> BTreeMap<BeamId, u32> {
        let num_assignable = count_assignable(rbg_bitmask);
        let candidates = active_ul(ues);

        let mut beam_buf: BTreeMap<BeamId, u64> = BTreeMap::new();
        for &i in &candidates {
            *beam_buf.entry(ues[i].beam).or_insert(0) += u64::from(ues[i].ul_buffer);
        }

        let split = Self::sym_per_beam(&beam_buf, sym_avail);

        for (&beam, &beam_sym) in &split {
            if beam_sym == 0 {
                continue;
            }
            let members: Vec<usize> =
                candidates.iter().copied().filter(|&i| ues[i].beam == beam).collect();

            let per_grant = FtResources::new(beam_sym, beam_sym);
            for &i in &members {
                self.policy.before_ul_sched(&mut ues[i], per_grant, &self.amc);
            }

            let mut assigned = FtResources { rbg: 0, sym: beam_sym };
            self.greedy_assign(
                ues,
                &members,
                num_assignable,
                per_grant,
                FtResources::new(1, 0),
                &mut assigned,
                false,
                |ue| (ue.ul_tb_size, ue.ul_buffer),
                |ue| {
                    ue.ul_rbg += beam_sym;
                    ue.ul_sym = beam_sym;
                },
            );
        }

        split
    }

    /// Build the DL DCI for one UE's accumulated grant, advancing the
    /// cursor. `None` when the transport block is too small to bother.
    pub fn create_dl_dci(
        &self,
        ue: &mut UeSchedulingState,
        spoint: &mut SchedPoint,
        max_sym: u32,
        rbg_bitmask: &[bool],
    ) -> Option<DciInfo> {
        let tbs = self.amc.tb_size(ue.dl_mcs, ue.dl_rbg);
        if tbs < MIN_DL_TBS {
            if ue.dl_rbg > 0 {
                debug!(
                    rnti = ?ue.rnti,
                    tbs,
                    cells = ue.dl_rbg,
                    "DL grant below minimum transport block, dropped"
                );
            }
            ue.dl_tb_size = 0;
            return None;
        }

        match self.granularity {
            Granularity::Tdma => {
                let num_assignable = count_assignable(rbg_bitmask);
                let num_sym = (ue.dl_rbg / num_assignable).max(1);
                assert!(
                    spoint.sym + num_sym <= max_sym,
                    "DL grant exceeds the slot's symbol budget"
                );

                let dci = self.build_dci(
                    ue,
                    DciFormat::Dl,
                    spoint.sym,
                    num_sym,
                    tbs,
                    rbg_bitmask.to_vec(),
                );
                spoint.rbg = 0;
                spoint.sym += num_sym;
                Some(dci)
            }
            Granularity::Ofdma => {
                let num_sym = ue.dl_sym;
                let rbg_num = ue.dl_rbg / num_sym;
                let mask = stripe_mask(rbg_bitmask, spoint.rbg, rbg_num);

                let dci = self.build_dci(ue, DciFormat::Dl, spoint.sym, num_sym, tbs, mask);
                spoint.rbg += rbg_num;
                Some(dci)
            }
        }
    }

    /// Build the UL DCI for one UE's accumulated grant. UL data occupies
    /// the tail of the slot, so symbols are taken walking backward from
    /// the cursor.
    pub fn create_ul_dci(
        &self,
        ue: &mut UeSchedulingState,
        spoint: &mut SchedPoint,
        max_sym: u32,
        rbg_bitmask: &[bool],
    ) -> Option<DciInfo> {
        let tbs = self.amc.tb_size(ue.ul_mcs, ue.ul_rbg);
        if tbs < MIN_UL_TBS {
            if ue.ul_rbg > 0 {
                debug!(
                    rnti = ?ue.rnti,
                    tbs,
                    cells = ue.ul_rbg,
                    "UL grant below minimum transport block, dropped"
                );
            }
            ue.ul_tb_size = 0;
            return None;
        }

        match self.granularity {
            Granularity::Tdma => {
                let num_assignable = count_assignable(rbg_bitmask);
                let num_sym = (ue.ul_rbg / num_assignable).max(1).min(max_sym);
                assert!(
                    spoint.sym >= num_sym,
                    "UL grant exceeds the remaining symbol budget"
                );
                spoint.sym -= num_sym;

                let dci = self.build_dci(
                    ue,
                    DciFormat::Ul,
                    spoint.sym,
                    num_sym,
                    tbs,
                    rbg_bitmask.to_vec(),
                );
                spoint.rbg = 0;
                Some(dci)
            }
            Granularity::Ofdma => {
                let num_sym = ue.ul_sym;
                assert!(
                    spoint.sym >= num_sym,
                    "UL grant exceeds the remaining symbol budget"
                );
                let rbg_num = ue.ul_rbg / num_sym;
                let mask = stripe_mask(rbg_bitmask, spoint.rbg, rbg_num);

                let dci = self.build_dci(
                    ue,
                    DciFormat::Ul,
                    spoint.sym - num_sym,
                    num_sym,
                    tbs,
                    mask,
                );
                spoint.rbg += rbg_num;
                Some(dci)
            }
        }
    }

    /// Move the cursor to the next beam's region (OFDMA only)
    pub fn change_dl_beam(&self, spoint: &mut SchedPoint, sym_of_beam: u32) {
        if self.granularity == Granularity::Ofdma {
            spoint.rbg = 0;
            spoint.sym += sym_of_beam;
        }
    }

    pub fn change_ul_beam(&self, spoint: &mut SchedPoint, sym_of_beam: u32) {
        if self.granularity == Granularity::Ofdma {
            spoint.rbg = 0;
            spoint.sym -= sym_of_beam;
        }
    }

    fn build_dci(
        &self,
        ue: &UeSchedulingState,
        format: DciFormat,
        sym_start: u32,
        num_sym: u32,
        tbs: u32,
        rbg_bitmask: Vec<bool>,
    ) -> DciInfo {
        assert!(tbs > 0 && num_sym > 0);
        let mcs = match format {
            DciFormat::Dl => ue.dl_mcs,
            DciFormat::Ul => ue.ul_mcs,
        };
        DciInfo {
            rnti: ue.rnti,
            format,
            sym_start: sym_start as u8,
            num_sym: num_sym as u8,
            mcs,
            tb_size: tbs,
            ndi: 1,
            rv: 0,
            rbg_bitmask,
            tpc: 1,
        }
    }

    /// Run one full DL scheduling cycle and emit the slot's allocations
    pub fn schedule_dl_slot(
        &self,
        ues: &mut [UeSchedulingState],
        slot: u64,
        sym_start: u32,
        sym_count: u32,
        rbg_bitmask: &[bool],
    ) -> SlotAllocInfo {
        for ue in ues.iter_mut() {
            self.policy.reset_dl_sched_info(ue);
        }

        let beams = match self.granularity {
            Granularity::Tdma => self.assign_dl_tdma(ues, sym_count, rbg_bitmask),
            Granularity::Ofdma => self.assign_dl_ofdma(ues, sym_count, rbg_bitmask),
        };

        let mut alloc = SlotAllocInfo::new(slot);
        let mut spoint = SchedPoint { rbg: 0, sym: sym_start };

        for (&beam, &sym_of_beam) in &beams {
            for ue in ues.iter_mut().filter(|u| u.beam == beam && u.dl_rbg > 0) {
                if let Some(dci) =
                    self.create_dl_dci(ue, &mut spoint, sym_start + sym_count, rbg_bitmask)
                {
                    ue.dl_tb_size = dci.tb_size;
                    alloc.dl_dci.push(dci);
                }
            }
            self.change_dl_beam(&mut spoint, sym_of_beam);
        }

        alloc.num_sym_alloc = alloc.dl_dci.iter().map(|d| u32::from(d.num_sym)).sum();
        alloc
    }

    /// Run one full UL scheduling cycle; symbols are carved backward from
    /// the end of the slot's data region.
    pub fn schedule_ul_slot(
        &self,
        ues: &mut [UeSchedulingState],
        slot: u64,
        sym_end: u32,
        sym_count: u32,
        rbg_bitmask: &[bool],
    ) -> SlotAllocInfo {
        for ue in ues.iter_mut() {
            self.policy.reset_ul_sched_info(ue);
        }

        let beams = match self.granularity {
            Granularity::Tdma => self.assign_ul_tdma(ues, sym_count, rbg_bitmask),
            Granularity::Ofdma => self.assign_ul_ofdma(ues, sym_count, rbg_bitmask),
        };

        let mut alloc = SlotAllocInfo::new(slot);
        let mut spoint = SchedPoint { rbg: 0, sym: sym_end };

        for (&beam, &sym_of_beam) in &beams {
            for ue in ues.iter_mut().filter(|u| u.beam == beam && u.ul_rbg > 0) {
                if let Some(dci) =
                    self.create_ul_dci(ue, &mut spoint, sym_count, rbg_bitmask)
                {
                    ue.ul_tb_size = dci.tb_size;
                    alloc.ul_dci.push(dci);
                }
            }
            self.change_ul_beam(&mut spoint, sym_of_beam);
        }

        alloc.num_sym_alloc = alloc.ul_dci.iter().map(|d| u32::from(d.num_sym)).sum();
        alloc
    }
}

/// Mark `count` assignable RBGs starting at the `start`-th assignable
/// position, skipping the notched entries of the carrier mask
fn stripe_mask(rbg_bitmask: &[bool], start: u32, count: u32) -> Vec<bool> {
    let mut mask = vec![false; rbg_bitmask.len()];
    let mut taken = 0;
    for (i, &assignable) in rbg_bitmask.iter().enumerate() {
        if !assignable {
            continue;
        }
        if taken >= start + count {
            break;
        }
        if taken >= start {
            mask[i] = true;
        }
        taken += 1;
    }
    mask
}

fn count_assignable(rbg_bitmask: &[bool]) -> u32 {
    let n = rbg_bitmask.iter().filter(|&&b| b).count() as u32;
    assert!(n > 0, "RBG bitmask must leave at least one assignable RBG");
    n
}

fn active_dl(ues: &[UeSchedulingState]) -> Vec<usize> {
    ues.iter()
        .enumerate()
        .filter(|(_, u)| u.dl_buffer > 0)
        .map(|(i, _)| i)
        .collect()
}

fn active_ul(ues: &[UeSchedulingState]) -> Vec<usize> {
    ues.iter()
        .enumerate()
        .filter(|(_, u)| u.ul_buffer > 0)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::ue_info::{ProportionalFairPolicy, RoundRobinPolicy};
    use common::types::{Mcs, McsTable, Rnti};

    fn amc() -> Amc {
        Amc::new(McsTable::Table1, 12, 1)
    }

    fn ue(rnti: u16, beam: u16, mcs: u8, buffer: u32) -> UeSchedulingState {
        let mut u = UeSchedulingState::new(Rnti(rnti), BeamId(beam));
        u.dl_mcs = Mcs(mcs);
        u.ul_mcs = Mcs(mcs);
        u.dl_buffer = buffer;
        u.ul_buffer = buffer;
        u
    }

    fn tdma_rr() -> ResourceAssignmentEngine<RoundRobinPolicy> {
        ResourceAssignmentEngine::new(RoundRobinPolicy, amc(), Granularity::Tdma, 5)
    }

    fn ofdma_rr() -> ResourceAssignmentEngine<RoundRobinPolicy> {
        ResourceAssignmentEngine::new(RoundRobinPolicy, amc(), Granularity::Ofdma, 5)
    }

    #[test]
    fn test_tdma_rr_splits_symbols_evenly() {
        let engine = tdma_rr();
        let mut ues = vec![ue(1, 0, 28, 100_000), ue(2, 0, 28, 100_000)];
        let mask = vec![true; 5];

        let beams = engine.assign_dl_tdma(&mut ues, 10, &mask);

        assert_eq!(ues[0].dl_sym, 5);
        assert_eq!(ues[1].dl_sym, 5);
        assert_eq!(ues[0].dl_rbg, 25);
        assert_eq!(beams[&BeamId(0)], 10);
    }

    #[test]
    fn test_tdma_resource_conservation() {
        let engine = tdma_rr();
        let mut ues = vec![
            ue(1, 0, 28, 100_000),
            ue(2, 0, 28, 100_000),
            ue(3, 1, 28, 100_000),
        ];
        let mask = vec![true; 5];

        let beams = engine.assign_dl_tdma(&mut ues, 9, &mask);

        let total_sym: u32 = ues.iter().map(|u| u.dl_sym).sum();
        assert_eq!(total_sym, 9);
        assert_eq!(beams.values().sum::<u32>(), 9);
    }

    #[test]
    fn test_tdma_early_termination_on_small_buffers() {
        let engine = tdma_rr();
        // One symbol at MCS 28 over 5 RBGs carries 41 bytes
        let mut ues = vec![ue(1, 0, 28, 30)];
        let mask = vec![true; 5];

        engine.assign_dl_tdma(&mut ues, 10, &mask);

        assert_eq!(ues[0].dl_sym, 1);
    }

    #[test]
    fn test_tdma_skips_satisfied_ue() {
        let engine = tdma_rr();
        // UE 1's 60 bytes take two symbols (41, then 82 >= 60); the
        // remaining symbols all flow to UE 2.
        let mut ues = vec![ue(1, 0, 28, 60), ue(2, 0, 28, 100_000)];
        let mask = vec![true; 5];

        engine.assign_dl_tdma(&mut ues, 10, &mask);

        assert_eq!(ues[0].dl_sym, 2);
        assert_eq!(ues[1].dl_sym, 8);
    }

    #[test]
    fn test_inactive_ue_gets_nothing() {
        let engine = tdma_rr();
        let mut ues = vec![ue(1, 0, 28, 0), ue(2, 0, 28, 100_000)];
        let mask = vec![true; 5];

        engine.assign_dl_tdma(&mut ues, 4, &mask);

        assert_eq!(ues[0].dl_sym, 0);
        assert_eq!(ues[1].dl_sym, 4);
    }

    #[test]
    fn test_dl_dci_construction_tdma() {
        let engine = tdma_rr();
        let mut ues = vec![ue(1, 0, 28, 100_000)];
        let mask = vec![true; 5];
        let alloc = engine.schedule_dl_slot(&mut ues, 3, 1, 10, &mask);

        assert_eq!(alloc.slot, 3);
        assert_eq!(alloc.dl_dci.len(), 1);
        let dci = &alloc.dl_dci[0];
        assert_eq!(dci.sym_start, 1);
        assert_eq!(dci.num_sym, 10);
        assert_eq!(dci.tb_size, ues[0].dl_tb_size);
        assert_eq!(dci.tpc, 1);
        assert_eq!(dci.ndi, 1);
        assert_eq!(dci.rv, 0);
        assert!(dci.rbg_bitmask.iter().all(|&b| b));
        assert_eq!(alloc.num_sym_alloc, 10);
    }

    #[test]
    fn test_min_tbs_rejection() {
        // MCS 0 over one RBG-symbol cell carries under four bytes; no DCI
        // may be emitted for it.
        let engine =
            ResourceAssignmentEngine::new(RoundRobinPolicy, amc(), Granularity::Tdma, 1);
        let mut u = ue(1, 0, 0, 100);
        u.dl_rbg = 1;
        u.dl_sym = 1;

        let mut spoint = SchedPoint::default();
        let dci = engine.create_dl_dci(&mut u, &mut spoint, 14, &[true]);
        assert!(dci.is_none());
        assert_eq!(u.dl_tb_size, 0);
        // The cursor must not advance for a dropped grant
        assert_eq!(spoint.sym, 0);
    }

    #[test]
    fn test_ul_dci_allocates_backward() {
        let engine = tdma_rr();
        let mut ues = vec![ue(1, 0, 28, 100_000)];
        let mask = vec![true; 5];
        let alloc = engine.schedule_ul_slot(&mut ues, 0, 14, 4, &mask);

        assert_eq!(alloc.ul_dci.len(), 1);
        let dci = &alloc.ul_dci[0];
        assert_eq!(dci.num_sym, 4);
        // Backward from symbol 14
        assert_eq!(dci.sym_start, 10);
    }

    #[test]
    fn test_pf_prefers_starved_ue() {
        let engine = ResourceAssignmentEngine::new(
            ProportionalFairPolicy::default(),
            amc(),
            Granularity::Tdma,
            5,
        );
        let mut ues = vec![ue(1, 0, 28, 100_000), ue(2, 0, 28, 100_000)];
        // UE 1 has been served heavily in past cycles
        ues[0].avg_tput_dl = 500.0;
        ues[0].last_avg_tput_dl = 500.0;
        ues[1].avg_tput_dl = 1.0;
        ues[1].last_avg_tput_dl = 1.0;

        let mask = vec![true; 5];
        engine.assign_dl_tdma(&mut ues, 1, &mask);

        assert_eq!(ues[0].dl_sym, 0);
        assert_eq!(ues[1].dl_sym, 1);
    }

    #[test]
    fn test_ofdma_beam_split_proportional() {
        let engine = ofdma_rr();
        let mut ues = vec![ue(1, 0, 28, 300), ue(2, 1, 28, 100)];
        let mask = vec![true; 5];

        let split = engine.assign_dl_ofdma(&mut ues, 8, &mask);

        assert_eq!(split[&BeamId(0)], 6);
        assert_eq!(split[&BeamId(1)], 2);
    }

    #[test]
    fn test_ofdma_leftover_symbols_to_lightest_beam() {
        let engine = ofdma_rr();
        // 7 symbols over equal loads: 3 each, remainder to the first beam
        let mut ues = vec![ue(1, 0, 28, 100), ue(2, 1, 28, 100)];
        let mask = vec![true; 5];

        let split = engine.assign_dl_ofdma(&mut ues, 7, &mask);

        assert_eq!(split[&BeamId(0)], 4);
        assert_eq!(split[&BeamId(1)], 3);
        assert_eq!(split.values().sum::<u32>(), 7);
    }

    #[test]
    fn test_ofdma_dci_contiguous_stripes() {
        let engine = ofdma_rr();
        let mut ues = vec![ue(1, 0, 28, 100_000), ue(2, 0, 28, 100_000)];
        let mask = vec![true; 5];
        let alloc = engine.schedule_dl_slot(&mut ues, 0, 1, 8, &mask);

        assert_eq!(alloc.dl_dci.len(), 2);
        let (a, b) = (&alloc.dl_dci[0], &alloc.dl_dci[1]);
        // Both UEs share the beam's symbols but occupy disjoint stripes
        assert_eq!(a.sym_start, 1);
        assert_eq!(a.sym_start, b.sym_start);
        assert_eq!(a.num_sym, 8);
        assert_eq!(a.num_sym, b.num_sym);
        let a_rbgs: Vec<usize> = a
            .rbg_bitmask
            .iter()
            .enumerate()
            .filter(|(_, &x)| x)
            .map(|(i, _)| i)
            .collect();
        let b_rbgs: Vec<usize> = b
            .rbg_bitmask
            .iter()
            .enumerate()
            .filter(|(_, &x)| x)
            .map(|(i, _)| i)
            .collect();
        assert!(a_rbgs.iter().all(|i| !b_rbgs.contains(i)));
        assert_eq!(a_rbgs.len() + b_rbgs.len(), 5);
    }

    #[test]
    fn test_ofdma_stripes_skip_notched_rbgs() {
        let engine =
            ResourceAssignmentEngine::new(RoundRobinPolicy, amc(), Granularity::Ofdma, 6);
        let mut ues = vec![ue(1, 0, 28, 100_000), ue(2, 0, 28, 100_000)];
        // RBGs 1 and 4 are not assignable
        let mask = vec![true, false, true, true, false, true];
        let alloc = engine.schedule_dl_slot(&mut ues, 0, 1, 8, &mask);

        assert_eq!(alloc.dl_dci.len(), 2);
        for dci in &alloc.dl_dci {
            assert!(!dci.rbg_bitmask[1]);
            assert!(!dci.rbg_bitmask[4]);
            assert_eq!(dci.rbg_bitmask.iter().filter(|&&b| b).count(), 2);
        }
        // Together the stripes cover every assignable RBG exactly once
        for i in 0..mask.len() {
            let claimed = alloc.dl_dci.iter().filter(|d| d.rbg_bitmask[i]).count();
            assert_eq!(claimed, usize::from(mask[i]), "rbg {i}");
        }
    }
}
