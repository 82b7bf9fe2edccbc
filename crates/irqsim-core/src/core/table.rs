//! Interrupt descriptor table.
//!
//! One descriptor per line, allocated once. Each line follows
//! `Free -> Registered -> Executing -> Registered -> ...`, with
//! `Registered -> Free` on unregistration. A line is never freed while
//! executing and never executes while free.
//!
//! All access goes through a single table-wide lock that is only held for
//! O(1) reads and writes; handlers are always invoked outside of it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};

use super::Line;
use super::dispatch::DispatchError;
use super::trace::truncate_chars;

/// Default number of lines in the table.
pub const DEFAULT_LINES: usize = 16;

/// Largest table a config may ask for.
pub const MAX_LINES: usize = 256;

/// Descriptions longer than this (in characters) are truncated.
pub const MAX_DESCRIPTION_LEN: usize = 63;

/// An interrupt service routine. Receives the line it was dispatched on.
pub type Handler = Arc<dyn Fn(Line) + Send + Sync>;

/// Registration state of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Free,
    Registered,
    Executing,
}

impl LineState {
    pub fn label(self) -> &'static str {
        match self {
            LineState::Free => "FREE",
            LineState::Registered => "REGISTERED",
            LineState::Executing => "EXECUTING",
        }
    }
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors from `register` / `unregister`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    /// Line is outside `[0, lines)`.
    InvalidLine { line: Line, lines: usize },
    /// Line is executing its handler right now.
    HandlerBusy { line: Line },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::InvalidLine { line, lines } => {
                write!(f, "IRQ {line} out of range (0-{})", lines.saturating_sub(1))
            }
            RegistrationError::HandlerBusy { line } => {
                write!(f, "IRQ {line} is executing its handler")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

struct Descriptor {
    handler: Option<Handler>,
    state: LineState,
    call_count: u64,
    last_invoked_at: Option<DateTime<Local>>,
    total_execution_micros: u64,
    description: String,
}

impl Descriptor {
    fn free(line: Line) -> Self {
        Self {
            handler: None,
            state: LineState::Free,
            call_count: 0,
            last_invoked_at: None,
            total_execution_micros: 0,
            description: unassigned_description(line),
        }
    }
}

/// Read-only copy of a descriptor, without its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorView {
    pub line: Line,
    pub state: LineState,
    pub has_handler: bool,
    pub call_count: u64,
    pub last_invoked_at: Option<DateTime<Local>>,
    pub total_execution_micros: u64,
    pub description: String,
}

impl DescriptorView {
    pub fn total_execution_time(&self) -> Duration {
        Duration::from_micros(self.total_execution_micros)
    }
}

/// A line moved to `Executing` by [`DescriptorTable::claim`].
pub(crate) struct Claim {
    pub handler: Handler,
    pub call_count: u64,
    pub description: String,
}

/// The fixed-size descriptor table.
pub struct DescriptorTable {
    slots: Mutex<Box<[Descriptor]>>,
    lines: usize,
}

impl DescriptorTable {
    /// Creates a table with `lines` free descriptors.
    pub fn new(lines: usize) -> Self {
        let slots: Box<[Descriptor]> = (0..lines).map(Descriptor::free).collect();
        Self {
            slots: Mutex::new(slots),
            lines,
        }
    }

    /// Number of lines in the table.
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn is_valid(&self, line: Line) -> bool {
        line < self.lines
    }

    /// Installs `handler` on `line`, resetting its counters.
    ///
    /// Re-registering a `Registered` line replaces the handler.
    ///
    /// # Errors
    /// `InvalidLine` if out of range, `HandlerBusy` if the line is executing.
    pub fn register(
        &self,
        line: Line,
        handler: Handler,
        description: &str,
    ) -> Result<(), RegistrationError> {
        self.check_line(line)?;
        let mut description = description.to_string();
        truncate_chars(&mut description, MAX_DESCRIPTION_LEN);

        let mut slots = self.lock();
        let slot = &mut slots[line];
        if slot.state == LineState::Executing {
            return Err(RegistrationError::HandlerBusy { line });
        }

        slot.handler = Some(handler);
        slot.state = LineState::Registered;
        slot.call_count = 0;
        slot.total_execution_micros = 0;
        slot.description = description;
        Ok(())
    }

    /// Clears `line` back to `Free`.
    ///
    /// # Errors
    /// `InvalidLine` if out of range, `HandlerBusy` if the line is executing.
    pub fn unregister(&self, line: Line) -> Result<(), RegistrationError> {
        self.check_line(line)?;

        let mut slots = self.lock();
        let slot = &mut slots[line];
        if slot.state == LineState::Executing {
            return Err(RegistrationError::HandlerBusy { line });
        }

        *slot = Descriptor::free(line);
        Ok(())
    }

    /// Advisory check: true iff the line is valid and `Free`.
    ///
    /// Never use this in place of `register`'s own check.
    pub fn is_available(&self, line: Line) -> bool {
        self.is_valid(line) && self.lock()[line].state == LineState::Free
    }

    pub fn state(&self, line: Line) -> Option<LineState> {
        self.is_valid(line).then(|| self.lock()[line].state)
    }

    pub fn descriptor(&self, line: Line) -> Option<DescriptorView> {
        self.is_valid(line).then(|| view(line, &self.lock()[line]))
    }

    /// Copies every descriptor under one lock acquisition.
    pub fn snapshot(&self) -> Vec<DescriptorView> {
        self.lock()
            .iter()
            .enumerate()
            .map(|(line, slot)| view(line, slot))
            .collect()
    }

    /// Moves a `Registered` line to `Executing` and hands out its handler.
    pub(crate) fn claim(&self, line: Line) -> Result<Claim, DispatchError> {
        if !self.is_valid(line) {
            return Err(DispatchError::InvalidLine {
                line,
                lines: self.lines,
            });
        }

        let mut slots = self.lock();
        let slot = &mut slots[line];
        let handler = match (&slot.handler, slot.state) {
            (Some(handler), LineState::Registered) => Arc::clone(handler),
            (_, state) => return Err(DispatchError::NotDispatchable { line, state }),
        };

        slot.state = LineState::Executing;
        slot.call_count += 1;
        slot.last_invoked_at = Some(Local::now());
        Ok(Claim {
            handler,
            call_count: slot.call_count,
            description: slot.description.clone(),
        })
    }

    /// Returns a claimed line to `Registered` and books its execution time.
    pub(crate) fn release(&self, line: Line, elapsed_micros: u64) {
        let mut slots = self.lock();
        let slot = &mut slots[line];
        debug_assert_eq!(slot.state, LineState::Executing);
        slot.state = LineState::Registered;
        slot.total_execution_micros = slot.total_execution_micros.saturating_add(elapsed_micros);
    }

    fn check_line(&self, line: Line) -> Result<(), RegistrationError> {
        if self.is_valid(line) {
            Ok(())
        } else {
            Err(RegistrationError::InvalidLine {
                line,
                lines: self.lines,
            })
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<[Descriptor]>> {
        // Critical sections never call out, so a poisoned table is still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DescriptorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorTable")
            .field("lines", &self.lines)
            .finish_non_exhaustive()
    }
}

fn view(line: Line, slot: &Descriptor) -> DescriptorView {
    DescriptorView {
        line,
        state: slot.state,
        has_handler: slot.handler.is_some(),
        call_count: slot.call_count,
        last_invoked_at: slot.last_invoked_at,
        total_execution_micros: slot.total_execution_micros,
        description: slot.description.clone(),
    }
}

/// Placeholder description of a free line.
pub fn unassigned_description(line: Line) -> String {
    format!("IRQ {line} - unassigned")
}
