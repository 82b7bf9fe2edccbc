//! Dispatch statistics.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use super::Line;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub total: u64,
    pub timer: u64,
    pub keyboard: u64,
    pub custom: u64,
    /// Mean handler execution time in microseconds.
    pub mean_response_micros: f64,
    pub started_at: DateTime<Local>,
    /// Time since start, measured when the snapshot was taken.
    pub uptime: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    timer: u64,
    keyboard: u64,
    custom: u64,
    mean_response_micros: f64,
}

/// Running counters and incremental mean, updated once per completed dispatch.
///
/// Guarded by its own lock so accounting never contends with table state.
#[derive(Debug)]
pub struct Statistics {
    counters: Mutex<Counters>,
    timer_line: Line,
    keyboard_line: Line,
    started_at: DateTime<Local>,
    started: Instant,
}

impl Statistics {
    pub fn new(timer_line: Line, keyboard_line: Line) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            timer_line,
            keyboard_line,
            started_at: Local::now(),
            started: Instant::now(),
        }
    }

    /// Counts one completed dispatch of `line` that ran for `micros`.
    pub fn record_dispatch(&self, line: Line, micros: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.total += 1;

        if line == self.timer_line {
            counters.timer += 1;
        } else if line == self.keyboard_line {
            counters.keyboard += 1;
        } else {
            counters.custom += 1;
        }

        let n = counters.total as f64;
        counters.mean_response_micros =
            (counters.mean_response_micros * (n - 1.0) + micros as f64) / n;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        StatsSnapshot {
            total: counters.total,
            timer: counters.timer,
            keyboard: counters.keyboard,
            custom: counters.custom,
            mean_response_micros: counters.mean_response_micros,
            started_at: self.started_at,
            uptime: self.uptime(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_classifies_by_line() {
        let stats = Statistics::new(0, 1);
        stats.record_dispatch(0, 10);
        stats.record_dispatch(1, 10);
        stats.record_dispatch(1, 10);
        stats.record_dispatch(7, 10);

        let snap = stats.snapshot();
        assert_eq!(snap.total, 4);
        assert_eq!(snap.timer, 1);
        assert_eq!(snap.keyboard, 2);
        assert_eq!(snap.custom, 1);
    }

    /// Identical samples leave the mean at the sample value.
    #[test]
    fn test_mean_of_identical_samples() {
        let stats = Statistics::new(0, 1);
        for _ in 0..5 {
            stats.record_dispatch(3, 10_000);
        }
        let snap = stats.snapshot();
        assert!((snap.mean_response_micros - 10_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_incremental_mean() {
        let stats = Statistics::new(0, 1);
        stats.record_dispatch(2, 100);
        stats.record_dispatch(2, 200);
        stats.record_dispatch(2, 600);
        let snap = stats.snapshot();
        assert!((snap.mean_response_micros - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_fresh_snapshot_is_zeroed() {
        let stats = Statistics::new(0, 1);
        let snap = stats.snapshot();
        assert_eq!(snap.total, 0);
        assert!(snap.mean_response_micros.abs() < f64::EPSILON);
        assert!(snap.started_at <= Local::now());
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(Statistics::new(0, 1));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record_dispatch(t, 50);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.total, 1000);
        assert_eq!(snap.timer, 250);
        assert_eq!(snap.keyboard, 250);
        assert_eq!(snap.custom, 500);
        assert!((snap.mean_response_micros - 50.0).abs() < 1e-9);
    }
}
