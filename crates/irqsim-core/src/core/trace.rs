//! Bounded trace log.
//!
//! Every dispatch-related event is persisted into a fixed-capacity ring.
//! Writing past capacity overwrites the oldest entry. Some writes are also
//! emitted to observers (the CLI prints them); which ones is decided by
//! [`Visibility`], a pure predicate over `(level, timer_related)`.
//!
//! Persistence and display are separate: visibility never affects what is
//! stored, only what is broadcast.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::Line;

/// Default number of slots in the trace ring.
pub const DEFAULT_TRACE_CAPACITY: usize = 100;

/// Largest ring a config may ask for.
pub const MAX_TRACE_CAPACITY: usize = 100_000;

/// Messages longer than this (in characters) are truncated on write.
pub const MAX_MESSAGE_LEN: usize = 255;

/// Buffered entries per observer before a slow observer starts lagging.
const OBSERVER_CHANNEL_CAPACITY: usize = 256;

/// A single persisted trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// Global write order, assigned under the trace lock.
    pub sequence: u64,
    pub timestamp: DateTime<Local>,
    pub message: String,
    /// Line the event refers to, if any.
    pub line: Option<Line>,
    /// Whether the event came from timer activity (used for filtering).
    pub timer_related: bool,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.timestamp.format("%H:%M:%S");
        match self.line {
            Some(line) => write!(f, "[{time}] [IRQ{line}] {}", self.message),
            None => write!(f, "[{time}] {}", self.message),
        }
    }
}

/// How much of the trace is echoed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Persist only, echo nothing.
    Silent,
    /// Echo user-initiated activity; timer activity only when enabled.
    #[default]
    UserOnly,
    /// Echo everything.
    Verbose,
}

impl LogLevel {
    /// Returns the config/CLI name for this level.
    pub fn display_name(self) -> &'static str {
        match self {
            LogLevel::Silent => "silent",
            LogLevel::UserOnly => "user_only",
            LogLevel::Verbose => "verbose",
        }
    }

    /// Returns a human-readable description of this level.
    pub fn description(self) -> &'static str {
        match self {
            LogLevel::Silent => "Silent (history only)",
            LogLevel::UserOnly => "User only (user actions)",
            LogLevel::Verbose => "Verbose (show everything)",
        }
    }

    /// Parses a level name, accepting `-` in place of `_`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "silent" => Some(LogLevel::Silent),
            "user_only" | "user" => Some(LogLevel::UserOnly),
            "verbose" => Some(LogLevel::Verbose),
            _ => None,
        }
    }

    /// Returns all levels for iteration (e.g., in menus).
    pub fn all() -> &'static [LogLevel] {
        &[LogLevel::Silent, LogLevel::UserOnly, LogLevel::Verbose]
    }

    fn to_u8(self) -> u8 {
        match self {
            LogLevel::Silent => 0,
            LogLevel::UserOnly => 1,
            LogLevel::Verbose => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LogLevel::Silent,
            2 => LogLevel::Verbose,
            _ => LogLevel::UserOnly,
        }
    }
}

/// Current echo settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Visibility {
    pub level: LogLevel,
    /// Echo timer activity while in `UserOnly` mode.
    pub show_timer: bool,
}

impl Visibility {
    /// Returns whether a filtered write should be echoed.
    pub fn allows(self, timer_related: bool) -> bool {
        match self.level {
            LogLevel::Silent => false,
            LogLevel::UserOnly => !timer_related || self.show_timer,
            LogLevel::Verbose => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Emit {
    Never,
    Always,
    Filtered,
}

struct Ring {
    entries: VecDeque<TraceEntry>,
    capacity: usize,
    next_sequence: u64,
}

impl Ring {
    fn push(&mut self, message: String, line: Option<Line>, timer_related: bool) -> TraceEntry {
        let entry = TraceEntry {
            sequence: self.next_sequence,
            timestamp: Local::now(),
            message,
            line,
            timer_related,
        };
        self.next_sequence += 1;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }
}

/// Thread-safe bounded trace log with an observer channel.
pub struct TraceLog {
    ring: Mutex<Ring>,
    level: AtomicU8,
    show_timer: AtomicBool,
    observers: broadcast::Sender<TraceEntry>,
}

impl TraceLog {
    /// Creates an empty log with room for `capacity` entries.
    ///
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize, visibility: Visibility) -> Self {
        let capacity = capacity.max(1);
        let (observers, _) = broadcast::channel(OBSERVER_CHANNEL_CAPACITY);
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                next_sequence: 0,
            }),
            level: AtomicU8::new(visibility.level.to_u8()),
            show_timer: AtomicBool::new(visibility.show_timer),
            observers,
        }
    }

    /// Persists an entry without echoing it.
    pub fn record(&self, message: impl Into<String>, line: Option<Line>) -> TraceEntry {
        self.write(message.into(), line, false, Emit::Never)
    }

    /// Persists an entry and always echoes it.
    pub fn announce(&self, message: impl Into<String>, line: Option<Line>) -> TraceEntry {
        self.write(message.into(), line, false, Emit::Always)
    }

    /// Persists an entry and echoes it if the current [`Visibility`] allows.
    pub fn record_filtered(
        &self,
        message: impl Into<String>,
        line: Option<Line>,
        timer_related: bool,
    ) -> TraceEntry {
        self.write(message.into(), line, timer_related, Emit::Filtered)
    }

    fn write(
        &self,
        mut message: String,
        line: Option<Line>,
        timer_related: bool,
        emit: Emit,
    ) -> TraceEntry {
        truncate_chars(&mut message, MAX_MESSAGE_LEN);
        let mut ring = self.lock();
        let entry = ring.push(message, line, timer_related);

        let echo = match emit {
            Emit::Never => false,
            Emit::Always => true,
            Emit::Filtered => self.visibility().allows(timer_related),
        };
        // Sent under the ring lock so observers see entries in sequence order.
        if echo {
            // No subscribers is fine; the entry is already persisted.
            let _ = self.observers.send(entry.clone());
        }
        drop(ring);
        entry
    }

    /// Returns the last `min(len, count)` entries, oldest first.
    pub fn recent(&self, count: usize) -> Vec<TraceEntry> {
        let ring = self.lock();
        let skip = ring.entries.len().saturating_sub(count);
        ring.entries.iter().skip(skip).cloned().collect()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Total number of writes since creation, including overwritten ones.
    pub fn total_written(&self) -> u64 {
        self.lock().next_sequence
    }

    /// Subscribes to echoed entries.
    pub fn subscribe(&self) -> broadcast::Receiver<TraceEntry> {
        self.observers.subscribe()
    }

    pub fn visibility(&self) -> Visibility {
        Visibility {
            level: LogLevel::from_u8(self.level.load(Ordering::SeqCst)),
            show_timer: self.show_timer.load(Ordering::SeqCst),
        }
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level.to_u8(), Ordering::SeqCst);
    }

    pub fn set_show_timer(&self, show: bool) {
        self.show_timer.store(show, Ordering::SeqCst);
    }

    /// Flips timer echo and returns the new setting.
    pub fn toggle_timer_visibility(&self) -> bool {
        !self.show_timer.fetch_xor(true, Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // Ring pushes cannot panic halfway, so a poisoned ring is still consistent.
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for TraceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("visibility", &self.visibility())
            .finish_non_exhaustive()
    }
}

/// Truncates `text` to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(text: &mut String, max: usize) {
    if let Some((idx, _)) = text.char_indices().nth(max) {
        text.truncate(idx);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn log(capacity: usize) -> TraceLog {
        TraceLog::new(capacity, Visibility::default())
    }

    /// Reading fewer entries than stored returns the newest ones, oldest first.
    #[test]
    fn test_recent_returns_chronological_tail() {
        let log = log(10);
        for i in 0..5 {
            log.record(format!("event {i}"), None);
        }

        let recent = log.recent(3);
        let messages: Vec<_> = recent.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["event 2", "event 3", "event 4"]);
    }

    #[test]
    fn test_recent_caps_at_stored_count() {
        let log = log(10);
        log.record("only", Some(4));

        let recent = log.recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].line, Some(4));
        assert!(log.recent(0).is_empty());
    }

    /// After W > M writes only the last M survive, in insertion order.
    #[test]
    fn test_wraparound_keeps_last_capacity_entries() {
        let log = log(100);
        for i in 0..250 {
            log.record(format!("event {i}"), None);
        }

        assert_eq!(log.len(), 100);
        assert_eq!(log.total_written(), 250);

        let all = log.recent(usize::MAX);
        assert_eq!(all.len(), 100);
        assert_eq!(all.first().unwrap().message, "event 150");
        assert_eq!(all.last().unwrap().message, "event 249");
        assert!(all.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));
    }

    #[test]
    fn test_visibility_predicate() {
        let silent = Visibility {
            level: LogLevel::Silent,
            show_timer: true,
        };
        assert!(!silent.allows(false));
        assert!(!silent.allows(true));

        let user = Visibility {
            level: LogLevel::UserOnly,
            show_timer: false,
        };
        assert!(user.allows(false));
        assert!(!user.allows(true));

        let user_timer = Visibility {
            show_timer: true,
            ..user
        };
        assert!(user_timer.allows(true));

        let verbose = Visibility {
            level: LogLevel::Verbose,
            show_timer: false,
        };
        assert!(verbose.allows(false));
        assert!(verbose.allows(true));
    }

    /// Filtered writes respect visibility; everything is still persisted.
    #[test]
    fn test_filtered_write_echoes_only_when_visible() {
        let log = log(10);
        let mut rx = log.subscribe();

        log.record_filtered("timer tick", Some(0), true);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        log.record_filtered("user action", Some(2), false);
        assert_eq!(rx.try_recv().unwrap().message, "user action");

        assert!(log.toggle_timer_visibility());
        log.record_filtered("timer tick", Some(0), true);
        assert_eq!(rx.try_recv().unwrap().message, "timer tick");

        log.set_level(LogLevel::Silent);
        log.record_filtered("hidden", Some(2), false);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(log.len(), 4);
    }

    #[test]
    fn test_silent_and_announced_writes() {
        let log = log(10);
        log.set_level(LogLevel::Silent);
        let mut rx = log.subscribe();

        log.record("quiet", None);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        let persisted = log.announce("loud", Some(1));
        let echoed = rx.try_recv().unwrap();
        assert_eq!(echoed, persisted);
        assert_eq!(log.recent(1)[0].timestamp, echoed.timestamp);
    }

    #[test]
    fn test_toggle_timer_visibility_flips() {
        let log = log(1);
        assert!(!log.visibility().show_timer);
        assert!(log.toggle_timer_visibility());
        assert!(!log.toggle_timer_visibility());
        assert!(!log.visibility().show_timer);
    }

    #[test]
    fn test_long_message_is_truncated() {
        let log = log(1);
        let entry = log.record("é".repeat(MAX_MESSAGE_LEN + 20), None);
        assert_eq!(entry.message.chars().count(), MAX_MESSAGE_LEN);
    }

    /// Concurrent writers never lose or duplicate sequence numbers.
    #[test]
    fn test_concurrent_writers_are_serialized() {
        let log = Arc::new(log(1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..50 {
                        log.record(format!("writer {t} event {i}"), Some(t));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let all = log.recent(usize::MAX);
        assert_eq!(all.len(), 400);
        let sequences: Vec<u64> = all.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (0..400).collect::<Vec<u64>>());
    }

    #[test]
    fn test_display_includes_line_tag() {
        let log = log(2);
        let tagged = log.record("hello", Some(3)).to_string();
        assert!(tagged.ends_with("[IRQ3] hello"));
        let untagged = log.record("plain", None).to_string();
        assert!(!untagged.contains("[IRQ"));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("verbose"), Some(LogLevel::Verbose));
        assert_eq!(LogLevel::parse("user-only"), Some(LogLevel::UserOnly));
        assert_eq!(LogLevel::parse(" Silent "), Some(LogLevel::Silent));
        assert_eq!(LogLevel::parse("loud"), None);
    }
}
