//! Interrupt dispatcher.
//!
//! `dispatch` is the single entry point for running a handler, used both by
//! the timer thread and by callers on other threads. The sequence is:
//!
//! 1. validate the line,
//! 2. claim it (`Registered -> Executing`) under the table lock,
//! 3. run the handler with no lock held, timing it,
//! 4. release it (`Executing -> Registered`) and book the time,
//! 5. update statistics and trace.
//!
//! Two dispatches of the same line never run together: the second one sees
//! `Executing` and is rejected instead of waiting. Dispatches of different
//! lines run fully in parallel.
//!
//! Registration also goes through here so that every outcome, success or
//! rejection, leaves an entry in the trace.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Line;
use super::stats::Statistics;
use super::table::{DescriptorTable, Handler, LineState, RegistrationError};
use super::trace::TraceLog;

/// Why a dispatch did not run a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// Line is outside `[0, lines)`.
    InvalidLine { line: Line, lines: usize },
    /// Line is `Free` or already `Executing`.
    NotDispatchable { line: Line, state: LineState },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::InvalidLine { line, .. } => write!(f, "IRQ {line} out of range"),
            DispatchError::NotDispatchable {
                line,
                state: LineState::Executing,
            } => write!(f, "IRQ {line} is already executing"),
            DispatchError::NotDispatchable { line, .. } => {
                write!(f, "no ISR registered for IRQ {line}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Outcome of a dispatch that ran its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub line: Line,
    /// Value of the line's `call_count` for this dispatch.
    pub call_number: u64,
    pub elapsed: Duration,
}

/// Front door to the descriptor table. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<DescriptorTable>,
    trace: Arc<TraceLog>,
    stats: Arc<Statistics>,
    timer_line: Line,
}

impl Dispatcher {
    pub fn new(
        table: Arc<DescriptorTable>,
        trace: Arc<TraceLog>,
        stats: Arc<Statistics>,
        timer_line: Line,
    ) -> Self {
        Self {
            table,
            trace,
            stats,
            timer_line,
        }
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub fn trace(&self) -> &Arc<TraceLog> {
        &self.trace
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn timer_line(&self) -> Line {
        self.timer_line
    }

    /// Registers `handler` on `line` and traces the outcome.
    ///
    /// # Errors
    /// See [`DescriptorTable::register`].
    pub fn register(
        &self,
        line: Line,
        handler: Handler,
        description: &str,
    ) -> Result<(), RegistrationError> {
        match self.table.register(line, handler, description) {
            Ok(()) => {
                tracing::info!(line, description, "handler registered");
                self.trace.announce(
                    format!("ISR registered for IRQ {line}: {description}"),
                    Some(line),
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(line, %err, "registration rejected");
                self.trace_registration_error("register", err);
                Err(err)
            }
        }
    }

    /// Unregisters `line` and traces the outcome.
    ///
    /// # Errors
    /// See [`DescriptorTable::unregister`].
    pub fn unregister(&self, line: Line) -> Result<(), RegistrationError> {
        match self.table.unregister(line) {
            Ok(()) => {
                tracing::info!(line, "handler unregistered");
                self.trace
                    .announce(format!("ISR unregistered for IRQ {line}"), Some(line));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(line, %err, "unregistration rejected");
                self.trace_registration_error("unregister", err);
                Err(err)
            }
        }
    }

    fn trace_registration_error(&self, action: &str, err: RegistrationError) {
        let line = match err {
            RegistrationError::InvalidLine { .. } => None,
            RegistrationError::HandlerBusy { line } => Some(line),
        };
        self.trace
            .announce(format!("Error: cannot {action} ISR: {err}"), line);
    }

    /// Advisory: true iff `line` is valid and free.
    pub fn is_available(&self, line: Line) -> bool {
        self.table.is_available(line)
    }

    /// Runs the handler registered on `line`.
    ///
    /// Rejections are traced as well as returned. If the handler panics, the
    /// line is returned to `Registered` before the panic continues.
    ///
    /// # Errors
    /// `InvalidLine` for out-of-range lines, `NotDispatchable` for lines that
    /// are free or already executing. No handler runs in either case.
    pub fn dispatch(&self, line: Line) -> Result<DispatchReport, DispatchError> {
        let timer_related = line == self.timer_line;

        let claim = match self.table.claim(line) {
            Ok(claim) => claim,
            Err(err) => {
                tracing::debug!(line, %err, "dispatch rejected");
                match err {
                    DispatchError::InvalidLine { .. } => {
                        self.trace.record_filtered(format!("Error: {err}"), None, false);
                    }
                    DispatchError::NotDispatchable { .. } => {
                        self.trace
                            .record_filtered(format!("Error: {err}"), Some(line), timer_related);
                    }
                }
                return Err(err);
            }
        };

        self.trace.record_filtered(
            format!(
                ">>> DISPATCHING IRQ {line} ({}) - call #{}",
                claim.description, claim.call_count
            ),
            Some(line),
            timer_related,
        );

        let handler = claim.handler;
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(line)));
        let elapsed = started.elapsed();
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        self.table.release(line, micros);

        if let Err(payload) = outcome {
            tracing::warn!(line, micros, "handler panicked");
            self.trace.record_filtered(
                format!("!!! ISR for IRQ {line} panicked after {micros} μs"),
                Some(line),
                timer_related,
            );
            panic::resume_unwind(payload);
        }

        self.stats.record_dispatch(line, micros);
        self.trace.record_filtered(
            format!("<<< FINISHED IRQ {line} - back to main flow (time: {micros} μs)"),
            Some(line),
            timer_related,
        );

        Ok(DispatchReport {
            line,
            call_number: claim.call_count,
            elapsed,
        })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("lines", &self.table.lines())
            .field("timer_line", &self.timer_line)
            .finish_non_exhaustive()
    }
}
