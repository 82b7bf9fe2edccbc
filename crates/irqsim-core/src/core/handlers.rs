//! Built-in interrupt service routines.
//!
//! Each routine writes a trace line and then simulates work with a bounded
//! sleep. They are plain [`Handler`] closures; nothing here is special to
//! the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Line;
use super::table::Handler;
use super::trace::TraceLog;

/// Which built-in routine to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Timer,
    Keyboard,
    Custom,
    Error,
}

impl HandlerKind {
    /// Default descriptor label when installing this routine on `line`.
    pub fn description(self, line: Line) -> String {
        match self {
            HandlerKind::Timer => "System timer".to_string(),
            HandlerKind::Keyboard => "Keyboard controller".to_string(),
            HandlerKind::Custom => format!("Custom ISR {line}"),
            HandlerKind::Error => format!("Error ISR {line}"),
        }
    }
}

/// Simulated work per routine, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerDelays {
    pub timer_us: u64,
    pub keyboard_us: u64,
    pub custom_us: u64,
    pub error_us: u64,
}

impl Default for HandlerDelays {
    fn default() -> Self {
        Self {
            timer_us: 10_000,
            keyboard_us: 5_000,
            custom_us: 8_000,
            error_us: 50_000,
        }
    }
}

impl HandlerDelays {
    pub fn for_kind(&self, kind: HandlerKind) -> Duration {
        let micros = match kind {
            HandlerKind::Timer => self.timer_us,
            HandlerKind::Keyboard => self.keyboard_us,
            HandlerKind::Custom => self.custom_us,
            HandlerKind::Error => self.error_us,
        };
        Duration::from_micros(micros)
    }
}

/// Factory for the built-in routines, sharing one trace log and tick counter.
#[derive(Debug, Clone)]
pub struct Builtins {
    trace: Arc<TraceLog>,
    ticks: Arc<AtomicU64>,
    delays: HandlerDelays,
}

impl Builtins {
    pub fn new(trace: Arc<TraceLog>, delays: HandlerDelays) -> Self {
        Self {
            trace,
            ticks: Arc::new(AtomicU64::new(0)),
            delays,
        }
    }

    /// Number of times the timer routine has run.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Builds the routine for `kind`.
    pub fn handler(&self, kind: HandlerKind) -> Handler {
        let trace = Arc::clone(&self.trace);
        let delay = self.delays.for_kind(kind);

        match kind {
            HandlerKind::Timer => {
                let ticks = Arc::clone(&self.ticks);
                Arc::new(move |line| {
                    let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                    trace.record_filtered(
                        format!("    TIMER ISR: system tick #{tick}"),
                        Some(line),
                        true,
                    );
                    thread::sleep(delay);
                })
            }
            HandlerKind::Keyboard => Arc::new(move |line| {
                trace.record_filtered(
                    "    KEYBOARD ISR: processing keyboard input",
                    Some(line),
                    false,
                );
                thread::sleep(delay);
            }),
            HandlerKind::Custom => Arc::new(move |line| {
                trace.record_filtered(
                    format!("    CUSTOM ISR: custom routine for IRQ {line}"),
                    Some(line),
                    false,
                );
                thread::sleep(delay);
            }),
            HandlerKind::Error => Arc::new(move |line| {
                trace.record_filtered(
                    format!("    ERROR ISR: handling error on IRQ {line}"),
                    Some(line),
                    false,
                );
                thread::sleep(delay);
            }),
        }
    }
}
