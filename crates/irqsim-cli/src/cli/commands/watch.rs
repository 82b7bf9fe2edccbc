//! Timer-only mode: echo ticks until time runs out or Ctrl+C.

use std::time::Duration;

use anyhow::Result;
use irqsim_core::config::Config;
use irqsim_core::core::interrupt;
use irqsim_core::core::simulator::Simulator;
use irqsim_core::core::trace::LogLevel;

use super::{observer, render};

pub fn run(mut config: Config, seconds: u64) -> Result<()> {
    interrupt::init()?;

    config.log_level = LogLevel::UserOnly;
    config.show_timer_logs = true;
    let interval_ms = config.timer_interval_ms;

    let (mut sim, rx) = Simulator::start_observed(config)?;
    let printer = observer::spawn_printer(rx)?;
    sim.note(format!(
        "Watching the timer every {interval_ms} ms for {seconds} s (Ctrl+C to stop)"
    ));

    let interrupted = interrupt::wait_for_interrupt(Duration::from_secs(seconds));

    let stopped = sim.shutdown();
    let stats = sim.stats_snapshot();
    drop(sim);
    observer::finish(printer);
    stopped?;

    println!();
    println!("{}", render::stats(&stats));

    if interrupted {
        return Err(interrupt::InterruptedError.into());
    }
    Ok(())
}
