//! Background timer thread.
//!
//! Sleeps a fixed interval, then dispatches the timer line, until stopped.
//! Ticks are never queued: if a dispatch is slow, the next interval simply
//! starts after it returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::Line;
use super::dispatch::Dispatcher;

const THREAD_NAME: &str = "irq-timer";

/// Handle to the running timer thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct TimerDriver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    line: Line,
    interval: Duration,
}

impl TimerDriver {
    /// Spawns the timer thread.
    ///
    /// # Errors
    /// Returns an error if the OS refuses to create the thread.
    pub fn spawn(dispatcher: Dispatcher, line: Line, interval: Duration) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(&dispatcher, line, interval, &flag))
            .context("spawn timer thread")?;

        tracing::debug!(line, interval_ms = interval.as_millis(), "timer started");
        Ok(Self {
            running,
            handle: Some(handle),
            line,
            interval,
        })
    }

    pub fn line(&self) -> Line {
        self.line
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.handle.is_some()
    }

    /// Clears the running flag, wakes the thread, and waits for it to exit.
    ///
    /// An in-flight dispatch always runs to completion first. Calling this
    /// twice is a no-op.
    ///
    /// # Errors
    /// Returns an error if the timer thread panicked.
    pub fn shutdown(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.thread().unpark();
        if handle.join().is_err() {
            anyhow::bail!("timer thread panicked");
        }
        tracing::debug!(line = self.line, "timer stopped");
        Ok(())
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!("{err:#}");
        }
    }
}

fn run(dispatcher: &Dispatcher, line: Line, interval: Duration, running: &AtomicBool) {
    let trace = dispatcher.trace();
    trace.record("Timer thread started", None);

    while sleep_while_running(interval, running) {
        // Rejections are already traced by the dispatcher.
        let _ = dispatcher.dispatch(line);
    }

    trace.record("Timer thread stopping", None);
}

/// Parks for `interval` unless stopped first. Returns whether still running.
fn sleep_while_running(interval: Duration, running: &AtomicBool) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        // Spurious wakeups just loop back around.
        thread::park_timeout(deadline - now);
    }
}
