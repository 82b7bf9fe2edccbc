//! Canned dispatch sequences for exercising a running simulator.

use std::fmt;
use std::thread;
use std::time::Duration;

use super::handlers::HandlerKind;
use super::simulator::Simulator;

/// Which sequence to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Register custom routines on lines 2 and 3, then alternate between them.
    Sequence,
    /// Hit the timer and keyboard lines from two threads at once.
    Concurrent,
    /// Sweep every line, free ones included.
    Stress,
}

impl Workload {
    pub fn name(self) -> &'static str {
        match self {
            Workload::Sequence => "sequence",
            Workload::Concurrent => "concurrent",
            Workload::Stress => "stress",
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tally of a workload run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadSummary {
    /// Dispatches that ran a handler.
    pub dispatched: usize,
    /// Dispatches or registrations that were refused.
    pub rejected: usize,
}

impl WorkloadSummary {
    fn count<T, E>(&mut self, result: &Result<T, E>) {
        if result.is_ok() {
            self.dispatched += 1;
        } else {
            self.rejected += 1;
        }
    }
}

const SEQUENCE_LINES: [usize; 2] = [2, 3];
const SEQUENCE_ROUNDS: usize = 3;
const CONCURRENT_ROUNDS: usize = 5;
const STRESS_DISPATCHES: usize = 20;

/// Runs `workload`, sleeping `pause` between steps.
pub fn run(sim: &Simulator, workload: Workload, pause: Duration) -> WorkloadSummary {
    sim.note(format!("Running {workload} workload"));
    let summary = match workload {
        Workload::Sequence => sequence(sim, pause),
        Workload::Concurrent => concurrent(sim, pause),
        Workload::Stress => stress(sim, pause),
    };
    sim.note(format!(
        "{workload} workload done: {} dispatched, {} rejected",
        summary.dispatched, summary.rejected
    ));
    tracing::info!(%workload, ?summary, "workload finished");
    summary
}

fn sequence(sim: &Simulator, pause: Duration) -> WorkloadSummary {
    let mut summary = WorkloadSummary::default();

    for (n, line) in SEQUENCE_LINES.into_iter().enumerate() {
        let description = format!("Test ISR {}", n + 1);
        if sim
            .register(line, sim.builtin(HandlerKind::Custom), &description)
            .is_err()
        {
            summary.rejected += 1;
        }
    }

    for _ in 0..SEQUENCE_ROUNDS {
        for line in SEQUENCE_LINES {
            summary.count(&sim.dispatch(line));
            thread::sleep(pause);
        }
    }
    summary
}

fn concurrent(sim: &Simulator, pause: Duration) -> WorkloadSummary {
    let mut summary = WorkloadSummary::default();
    let lines = [sim.timer_line(), sim.keyboard_line()];

    for _ in 0..CONCURRENT_ROUNDS {
        let results = thread::scope(|scope| {
            let workers: Vec<_> = lines
                .iter()
                .map(|&line| scope.spawn(move || sim.dispatch(line)))
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join())
                .collect::<Vec<_>>()
        });
        for result in results {
            match result {
                Ok(dispatch) => summary.count(&dispatch),
                // A panicking handler has already been traced by the dispatcher.
                Err(_) => summary.rejected += 1,
            }
        }
        thread::sleep(pause);
    }
    summary
}

fn stress(sim: &Simulator, pause: Duration) -> WorkloadSummary {
    let mut summary = WorkloadSummary::default();
    for i in 0..STRESS_DISPATCHES {
        summary.count(&sim.dispatch(i % sim.lines()));
        thread::sleep(pause);
    }
    summary
}
