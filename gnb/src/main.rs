//! Scheduling-Core Simulation Driver
//!
//! Loads a TOML scenario, derives the slot-pattern timing structures once
//! and then drives the resource-assignment engine slot by slot, logging
//! the DCIs each control slot generates.

mod config;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use common::types::{BeamId, Mcs, Rnti, SlotType};
use common::utils::{db_to_linear, modulo};
use interfaces::message_types::{HarqFeedback, SlotAllocInfo};
use layers::mac::{
    Amc, ProportionalFairPolicy, ResourceAssignmentEngine, RoundRobinPolicy, SchedulingPolicy,
    UeSchedulingState,
};
use layers::phy::{generate_structures, HarqCombiner, SlotStructures};
use layers::{LayerError, SlotProcessor};

use config::ScenarioConfig;

/// Cell scheduling-core simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the scenario file
    #[arg(short, long, default_value = "scenario.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the scenario's TDD pattern, e.g. "DL|S|UL|UL|DL"
    #[arg(long)]
    pattern: Option<String>,

    /// Override the ranking policy (rr, pf)
    #[arg(long)]
    scheduler: Option<String>,

    /// Override the resource granularity (tdma, ofdma)
    #[arg(long)]
    granularity: Option<String>,

    /// Override the number of slots to simulate
    #[arg(long)]
    num_slots: Option<u64>,
}

/// One cell's scheduling state, advanced slot by slot
struct CellSlotDriver<P: SchedulingPolicy> {
    engine: ResourceAssignmentEngine<P>,
    structures: SlotStructures,
    pattern: Vec<SlotType>,
    ues: Vec<UeSchedulingState>,
    rbg_bitmask: Vec<bool>,
    dl_sym_start: u32,
    data_symbols: u32,
    /// HARQ combining state per UE
    combiners: BTreeMap<Rnti, HarqCombiner>,
    /// Per-UE wideband DL SINR, linear
    sinr: BTreeMap<Rnti, f64>,
    rng: StdRng,
}

impl<P: SchedulingPolicy> CellSlotDriver<P> {
    fn new(
        cfg: &ScenarioConfig,
        engine: ResourceAssignmentEngine<P>,
        structures: SlotStructures,
    ) -> Result<Self> {
        let ues = cfg
            .ues
            .iter()
            .map(|u| {
                let mut ue = UeSchedulingState::new(Rnti(u.rnti), BeamId(u.beam));
                ue.dl_mcs = Mcs(u.mcs);
                ue.ul_mcs = Mcs(u.mcs);
                ue.dl_buffer = u.dl_buffer;
                ue.ul_buffer = u.ul_buffer;
                ue
            })
            .collect();

        let table = cfg.mcs_table()?;
        let mode = cfg.harq_mode()?;
        let combiners = cfg
            .ues
            .iter()
            .map(|u| (Rnti(u.rnti), HarqCombiner::new(table, mode)))
            .collect();
        let sinr = cfg
            .ues
            .iter()
            .map(|u| (Rnti(u.rnti), db_to_linear(u.sinr_db)))
            .collect();

        Ok(Self {
            engine,
            structures,
            pattern: cfg.parsed_pattern()?,
            ues,
            rbg_bitmask: vec![true; cfg.cell.bandwidth_rbg as usize],
            dl_sym_start: cfg.cell.dl_sym_start,
            data_symbols: cfg.cell.data_symbols,
            combiners,
            sinr,
            rng: StdRng::seed_from_u64(cfg.sim.seed),
        })
    }

    /// Evaluate the decode outcome of every DL grant in the slot and
    /// build the feedback the UEs would report. A NACK keeps the HARQ
    /// history for combining with the retransmission.
    fn dl_feedback(&mut self, alloc: &SlotAllocInfo) -> Vec<HarqFeedback> {
        let mut reports = Vec::new();
        for dci in &alloc.dl_dci {
            let Some(beam) = self.ues.iter().find(|u| u.rnti == dci.rnti).map(|u| u.beam)
            else {
                continue;
            };
            let Some(combiner) = self.combiners.get_mut(&dci.rnti) else {
                continue;
            };

            let sinr_lin = self.sinr.get(&dci.rnti).copied().unwrap_or(1.0);
            let map: Vec<usize> = dci
                .rbg_bitmask
                .iter()
                .enumerate()
                .filter(|(_, &b)| b)
                .map(|(i, _)| i)
                .collect();
            let sinr = vec![sinr_lin; dci.rbg_bitmask.len()];

            let stats = combiner.receive(&sinr, &map, dci.mcs, dci.tb_size * 8);
            let ack = combiner.decode_outcome(&stats, &mut self.rng);
            if ack {
                combiner.reset();
            }

            reports.push(HarqFeedback {
                rnti: dci.rnti,
                beam,
                data_slot: modulo(alloc.slot as i64, self.pattern.len() as u32),
                ack,
            });
        }
        reports
    }

    /// Consume the granted bytes from the UE buffers
    fn drain_buffers(&mut self, alloc: &SlotAllocInfo) {
        for dci in &alloc.dl_dci {
            if let Some(ue) = self.ues.iter_mut().find(|u| u.rnti == dci.rnti) {
                ue.dl_buffer = ue.dl_buffer.saturating_sub(dci.tb_size);
            }
        }
        for dci in &alloc.ul_dci {
            if let Some(ue) = self.ues.iter_mut().find(|u| u.rnti == dci.rnti) {
                ue.ul_buffer = ue.ul_buffer.saturating_sub(dci.tb_size);
            }
        }
    }
}

#[async_trait]
impl<P: SchedulingPolicy + Send> SlotProcessor for CellSlotDriver<P> {
    async fn process_slot(&mut self, slot: u64) -> Result<Vec<SlotAllocInfo>, LayerError> {
        let pos = modulo(slot as i64, self.pattern.len() as u32);
        debug!("Slot {slot}: {}", self.pattern[pos as usize]);

        let mut allocs = Vec::new();

        if let Some(ks) = self.structures.generate_dl.get(&pos).cloned() {
            for k in ks {
                let alloc = self.engine.schedule_dl_slot(
                    &mut self.ues,
                    slot + u64::from(k),
                    self.dl_sym_start,
                    self.data_symbols,
                    &self.rbg_bitmask,
                );
                self.drain_buffers(&alloc);
                for fb in self.dl_feedback(&alloc) {
                    debug!(
                        rnti = fb.rnti.0,
                        beam = fb.beam.0,
                        data_slot = fb.data_slot,
                        ack = fb.ack,
                        "DL HARQ feedback"
                    );
                }
                allocs.push(alloc);
            }
        }

        if let Some(ks) = self.structures.generate_ul.get(&pos).cloned() {
            for k in ks {
                let alloc = self.engine.schedule_ul_slot(
                    &mut self.ues,
                    slot + u64::from(k),
                    self.dl_sym_start + self.data_symbols,
                    self.data_symbols,
                    &self.rbg_bitmask,
                );
                self.drain_buffers(&alloc);
                allocs.push(alloc);
            }
        }

        Ok(allocs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(env_filter).with_target(true).init();

    info!("Starting scheduling-core simulator");
    info!("Scenario file: {}", args.config);

    let mut cfg = ScenarioConfig::from_toml_file(&args.config)?;
    if let Some(pattern) = args.pattern {
        cfg.pattern.slots = pattern;
    }
    if let Some(scheduler) = args.scheduler {
        cfg.cell.scheduler = scheduler;
    }
    if let Some(granularity) = args.granularity {
        cfg.cell.granularity = granularity;
    }
    if let Some(num_slots) = args.num_slots {
        cfg.sim.num_slots = num_slots;
    }

    let pattern = cfg.parsed_pattern()?;
    info!("Pattern: {} ({} slots)", cfg.pattern.slots, pattern.len());
    info!(
        "Timings: N0={} N2={} N1={} latency={}",
        cfg.pattern.n0, cfg.pattern.n2, cfg.pattern.n1, cfg.pattern.latency
    );

    let structures = generate_structures(
        &pattern,
        cfg.pattern.n0,
        cfg.pattern.n2,
        cfg.pattern.n1,
        cfg.pattern.latency,
    );
    for (slot, k1) in &structures.dl_harq_fb {
        debug!("DL data slot {slot}: HARQ feedback after {k1} slots");
    }

    let amc = Amc::new(cfg.mcs_table()?, cfg.cell.useful_sc, cfg.cell.rb_per_rbg);
    let granularity = cfg.granularity()?;
    info!(
        "Scheduler: {} / {} over {} RBGs, {} attached UEs",
        cfg.cell.scheduler,
        cfg.cell.granularity,
        cfg.cell.bandwidth_rbg,
        cfg.ues.len()
    );

    match cfg.cell.scheduler.as_str() {
        "pf" => {
            let engine = ResourceAssignmentEngine::new(
                ProportionalFairPolicy::default(),
                amc,
                granularity,
                cfg.cell.bandwidth_rbg,
            );
            let driver = CellSlotDriver::new(&cfg, engine, structures)?;
            run(&cfg, driver).await
        }
        _ => {
            let engine = ResourceAssignmentEngine::new(
                RoundRobinPolicy,
                amc,
                granularity,
                cfg.cell.bandwidth_rbg,
            );
            let driver = CellSlotDriver::new(&cfg, engine, structures)?;
            run(&cfg, driver).await
        }
    }
}

/// Drive the processor through the configured number of slots
async fn run<S: SlotProcessor>(cfg: &ScenarioConfig, mut processor: S) -> Result<()> {
    let mut interval = (cfg.sim.slot_ms > 0)
        .then(|| tokio::time::interval(tokio::time::Duration::from_millis(cfg.sim.slot_ms)));

    for slot in 0..cfg.sim.num_slots {
        if let Some(interval) = interval.as_mut() {
            tokio::select! {
                _ = interval.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        for alloc in processor.process_slot(slot).await? {
            log_alloc(&alloc);
        }
    }

    info!("Simulation complete");
    Ok(())
}

fn log_alloc(alloc: &SlotAllocInfo) {
    for (dir, dcis) in [("DL", &alloc.dl_dci), ("UL", &alloc.ul_dci)] {
        for dci in dcis {
            info!(
                "{dir} slot {}: rnti={} sym={}+{} mcs={} tbs={}B rbg={}",
                alloc.slot,
                dci.rnti.0,
                dci.sym_start,
                dci.num_sym,
                dci.mcs.0,
                dci.tb_size,
                dci.rbg_bitmask.iter().filter(|&&b| b).count(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::ScenarioConfig;
    use interfaces::message_types::{DciFormat, DciInfo};

    const SCENARIO: &str = r#"
        [cell]
        bandwidth_rbg = 5

        [pattern]
        slots = "DL|S|UL|UL|DL|DL|S|UL|UL|DL"

        [[ues]]
        rnti = 1
        dl_buffer = 10000
        mcs = 14
    "#;

    fn driver(cfg: &ScenarioConfig) -> CellSlotDriver<RoundRobinPolicy> {
        let pattern = cfg.parsed_pattern().unwrap();
        let structures = generate_structures(
            &pattern,
            cfg.pattern.n0,
            cfg.pattern.n2,
            cfg.pattern.n1,
            cfg.pattern.latency,
        );
        let amc = Amc::new(cfg.mcs_table().unwrap(), cfg.cell.useful_sc, cfg.cell.rb_per_rbg);
        let engine = ResourceAssignmentEngine::new(
            RoundRobinPolicy,
            amc,
            cfg.granularity().unwrap(),
            cfg.cell.bandwidth_rbg,
        );
        CellSlotDriver::new(cfg, engine, structures).unwrap()
    }

    #[test]
    fn test_dl_grant_produces_harq_feedback() {
        let cfg: ScenarioConfig = toml::from_str(SCENARIO).unwrap();
        let mut driver = driver(&cfg);

        let mut alloc = SlotAllocInfo::new(4);
        alloc.dl_dci.push(DciInfo {
            rnti: Rnti(1),
            format: DciFormat::Dl,
            sym_start: 1,
            num_sym: 4,
            mcs: Mcs(14),
            tb_size: 488,
            ndi: 1,
            rv: 0,
            rbg_bitmask: vec![true; 5],
            tpc: 1,
        });

        let fb = driver.dl_feedback(&alloc);
        assert_eq!(fb.len(), 1);
        assert_eq!(fb[0].rnti, Rnti(1));
        assert_eq!(fb[0].data_slot, 4);
        // 15 dB sits above every MCS 14 BLER point: a certain ACK, and
        // the ACK flushes the combiner's history
        assert!(fb[0].ack);
        assert_eq!(driver.combiners[&Rnti(1)].receptions(), 0);
    }
}
