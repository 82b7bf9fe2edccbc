//! Prints echoed trace entries as they happen.

use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use irqsim_core::core::trace::TraceEntry;
use tokio::sync::broadcast::{self, error::RecvError};

/// Spawns a thread that prints every entry from `rx` to stdout.
///
/// The thread ends once every sender is gone, i.e. after the simulator is dropped.
pub fn spawn_printer(mut rx: broadcast::Receiver<TraceEntry>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("trace-printer".into())
        .spawn(move || {
            loop {
                match rx.blocking_recv() {
                    Ok(entry) => println!("{entry}"),
                    Err(RecvError::Lagged(skipped)) => {
                        eprintln!("({skipped} trace entries not shown, output fell behind)");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
        .context("spawn trace printer")
}

/// Waits for the printer to drain. Call after dropping the simulator.
pub fn finish(printer: JoinHandle<()>) {
    if printer.join().is_err() {
        tracing::warn!("trace printer panicked");
    }
}
