//! Headless workload runs.

use std::time::Duration;

use anyhow::Result;
use irqsim_core::config::Config;
use irqsim_core::core::simulator::Simulator;
use irqsim_core::core::workloads::{self, Workload};

use super::{observer, render};

pub fn run(config: Config, workload: Workload, pause_ms: u64) -> Result<()> {
    let (mut sim, rx) = Simulator::start_observed(config)?;
    let printer = observer::spawn_printer(rx)?;

    let summary = workloads::run(&sim, workload, Duration::from_millis(pause_ms));

    let stopped = sim.shutdown();
    let descriptors = sim.descriptors();
    let stats = sim.stats_snapshot();
    drop(sim);
    observer::finish(printer);
    stopped?;

    println!();
    println!("{}", render::idt_table(&descriptors));
    println!();
    println!("{}", render::stats(&stats));
    println!();
    println!(
        "{workload} workload: {} dispatched, {} rejected",
        summary.dispatched, summary.rejected
    );
    Ok(())
}
