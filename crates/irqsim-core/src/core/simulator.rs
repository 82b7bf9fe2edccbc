//! The interrupt system as a single owned context.
//!
//! `Simulator` bundles the descriptor table, trace log, statistics, built-in
//! routines and the timer thread. It is the only thing the CLI talks to.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use super::Line;
use super::dispatch::{DispatchError, DispatchReport, Dispatcher};
use super::handlers::{Builtins, HandlerKind};
use super::stats::{Statistics, StatsSnapshot};
use super::table::{DescriptorTable, DescriptorView, Handler, RegistrationError};
use super::timer::TimerDriver;
use super::trace::{LogLevel, TraceEntry, TraceLog, Visibility};
use crate::config::Config;

#[derive(Debug)]
pub struct Simulator {
    config: Config,
    dispatcher: Dispatcher,
    builtins: Builtins,
    timer: Option<TimerDriver>,
}

impl Simulator {
    /// Builds the table, trace and statistics, installs the timer and
    /// keyboard routines on their reserved lines, and starts the timer.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the timer thread
    /// cannot be spawned. Nothing keeps running in that case.
    pub fn start(config: Config) -> Result<Self> {
        Self::start_inner(config, None)
    }

    /// Like [`Simulator::start`], but subscribes to echoed trace entries
    /// before anything is written, so startup messages are not missed.
    ///
    /// # Errors
    /// See [`Simulator::start`].
    pub fn start_observed(config: Config) -> Result<(Self, broadcast::Receiver<TraceEntry>)> {
        let mut observer = None;
        let simulator = Self::start_inner(config, Some(&mut observer))?;
        let observer = match observer {
            Some(rx) => rx,
            None => simulator.subscribe(),
        };
        Ok((simulator, observer))
    }

    fn start_inner(
        config: Config,
        observer: Option<&mut Option<broadcast::Receiver<TraceEntry>>>,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let trace = Arc::new(TraceLog::new(config.trace_capacity, config.visibility()));
        if let Some(slot) = observer {
            *slot = Some(trace.subscribe());
        }

        let table = Arc::new(DescriptorTable::new(config.lines));
        trace.announce(format!("IDT initialized with {} lines", config.lines), None);

        let stats = Arc::new(Statistics::new(config.timer_line, config.keyboard_line));
        let dispatcher = Dispatcher::new(table, Arc::clone(&trace), stats, config.timer_line);
        let builtins = Builtins::new(Arc::clone(&trace), config.handlers);

        for (line, kind) in [
            (config.timer_line, HandlerKind::Timer),
            (config.keyboard_line, HandlerKind::Keyboard),
        ] {
            dispatcher
                .register(line, builtins.handler(kind), &kind.description(line))
                .with_context(|| format!("install {kind:?} routine on IRQ {line}"))?;
        }

        let timer = TimerDriver::spawn(
            dispatcher.clone(),
            config.timer_line,
            config.timer_interval(),
        )
        .inspect_err(|_| {
            trace.announce("Error: could not create the timer thread", None);
        })?;

        trace.announce("Interrupt system started", None);
        tracing::info!(
            lines = config.lines,
            timer_line = config.timer_line,
            interval_ms = config.timer_interval_ms,
            "simulator started"
        );

        Ok(Self {
            config,
            dispatcher,
            builtins,
            timer: Some(timer),
        })
    }

    /// Stops the timer and waits for it to exit.
    ///
    /// # Errors
    /// Returns an error if the timer thread panicked.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(mut timer) = self.timer.take() else {
            return Ok(());
        };
        self.trace().announce("Shutting down interrupt system", None);
        timer.shutdown()?;
        tracing::info!("simulator stopped");
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lines(&self) -> usize {
        self.table().lines()
    }

    pub fn timer_line(&self) -> Line {
        self.config.timer_line
    }

    pub fn keyboard_line(&self) -> Line {
        self.config.keyboard_line
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.as_ref().is_some_and(TimerDriver::is_running)
    }

    /// Number of ticks the built-in timer routine has handled.
    pub fn timer_ticks(&self) -> u64 {
        self.builtins.ticks()
    }

    /// Handle for issuing dispatches from other threads.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Builds a built-in routine bound to this simulator's trace log.
    pub fn builtin(&self, kind: HandlerKind) -> Handler {
        self.builtins.handler(kind)
    }

    /// Registers `handler` on `line`.
    ///
    /// # Errors
    /// `InvalidLine` or `HandlerBusy`; see [`DescriptorTable::register`].
    pub fn register(
        &self,
        line: Line,
        handler: Handler,
        description: &str,
    ) -> Result<(), RegistrationError> {
        self.dispatcher.register(line, handler, description)
    }

    /// Registers a built-in routine with its default description.
    ///
    /// # Errors
    /// `InvalidLine` or `HandlerBusy`.
    pub fn register_builtin(&self, line: Line, kind: HandlerKind) -> Result<(), RegistrationError> {
        self.register(line, self.builtin(kind), &kind.description(line))
    }

    /// # Errors
    /// `InvalidLine` or `HandlerBusy`; see [`DescriptorTable::unregister`].
    pub fn unregister(&self, line: Line) -> Result<(), RegistrationError> {
        self.dispatcher.unregister(line)
    }

    /// # Errors
    /// `InvalidLine` or `NotDispatchable`; see [`Dispatcher::dispatch`].
    pub fn dispatch(&self, line: Line) -> Result<DispatchReport, DispatchError> {
        self.dispatcher.dispatch(line)
    }

    pub fn is_available(&self, line: Line) -> bool {
        self.dispatcher.is_available(line)
    }

    pub fn descriptor(&self, line: Line) -> Option<DescriptorView> {
        self.table().descriptor(line)
    }

    pub fn descriptors(&self) -> Vec<DescriptorView> {
        self.table().snapshot()
    }

    /// Last `count` trace entries, oldest first.
    pub fn recent_trace(&self, count: usize) -> Vec<TraceEntry> {
        self.trace().recent(count)
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats().snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TraceEntry> {
        self.trace().subscribe()
    }

    pub fn visibility(&self) -> Visibility {
        self.trace().visibility()
    }

    pub fn set_log_visibility(&self, level: LogLevel) {
        self.trace().set_level(level);
    }

    pub fn set_timer_trace_visibility(&self, show: bool) {
        self.trace().set_show_timer(show);
    }

    /// Flips timer echo and returns the new setting.
    pub fn toggle_timer_trace_visibility(&self) -> bool {
        self.trace().toggle_timer_visibility()
    }

    /// Records a user-facing note in the trace (always echoed).
    pub fn note(&self, message: impl Into<String>) -> TraceEntry {
        self.trace().announce(message, None)
    }

    fn table(&self) -> &DescriptorTable {
        self.dispatcher.table()
    }

    fn trace(&self) -> &TraceLog {
        self.dispatcher.trace()
    }

    fn stats(&self) -> &Statistics {
        self.dispatcher.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::core::handlers::HandlerDelays;
    use crate::core::table::LineState;

    fn quick_config(interval_ms: u64) -> Config {
        Config {
            timer_interval_ms: interval_ms,
            handlers: HandlerDelays {
                timer_us: 0,
                keyboard_us: 0,
                custom_us: 1_000,
                error_us: 0,
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_start_installs_reserved_routines() {
        let mut sim = Simulator::start(quick_config(60_000)).unwrap();
        assert!(sim.is_timer_running());

        let timer = sim.descriptor(0).unwrap();
        assert_eq!(timer.state, LineState::Registered);
        assert_eq!(timer.description, "System timer");
        let keyboard = sim.descriptor(1).unwrap();
        assert_eq!(keyboard.description, "Keyboard controller");

        assert!(!sim.is_available(0));
        assert!((2..16).all(|line| sim.is_available(line)));

        sim.shutdown().unwrap();
        assert!(!sim.is_timer_running());
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let config = Config {
            timer_line: 40,
            ..Config::default()
        };
        let err = Simulator::start(config).unwrap_err();
        assert!(format!("{err:#}").contains("invalid configuration"));
    }

    /// Startup and shutdown messages reach an observer attached at start.
    #[test]
    fn test_start_observed_sees_startup_messages() {
        let (mut sim, mut rx) = Simulator::start_observed(quick_config(60_000)).unwrap();
        sim.shutdown().unwrap();

        let mut messages = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(entry) => messages.push(entry.message),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => {}
            }
        }
        assert_eq!(messages.first().unwrap(), "IDT initialized with 16 lines");
        assert!(messages.iter().any(|m| m == "Interrupt system started"));
        assert_eq!(messages.last().unwrap(), "Shutting down interrupt system");
    }

    /// With a one-unit interval, ~3 timer dispatches after 3.5 units.
    #[test]
    fn test_timer_drives_reserved_line() {
        let mut sim = Simulator::start(quick_config(100)).unwrap();
        thread::sleep(Duration::from_millis(350));
        sim.shutdown().unwrap();

        let calls = sim.descriptor(0).unwrap().call_count;
        assert!((2..=4).contains(&calls), "calls was {calls}");
        assert_eq!(sim.timer_ticks(), calls);
        assert_eq!(sim.stats_snapshot().timer, calls);
    }

    #[test]
    fn test_custom_registration_and_dispatch() {
        let mut sim = Simulator::start(quick_config(60_000)).unwrap();

        sim.register_builtin(4, HandlerKind::Custom).unwrap();
        let report = sim.dispatch(4).unwrap();
        assert_eq!(report.call_number, 1);
        assert!(report.elapsed >= Duration::from_millis(1));

        let stats = sim.stats_snapshot();
        assert_eq!(stats.custom, 1);
        assert_eq!(stats.total, 1);

        sim.unregister(4).unwrap();
        assert!(sim.is_available(4));
        assert!(matches!(
            sim.dispatch(4),
            Err(DispatchError::NotDispatchable { line: 4, .. })
        ));

        let trace = sim.recent_trace(10);
        assert!(
            trace
                .iter()
                .any(|e| e.message == "    CUSTOM ISR: custom routine for IRQ 4")
        );
        sim.shutdown().unwrap();
    }

    #[test]
    fn test_visibility_controls() {
        let mut sim = Simulator::start(quick_config(60_000)).unwrap();
        assert_eq!(sim.visibility(), Visibility::default());

        sim.set_log_visibility(LogLevel::Verbose);
        assert!(sim.toggle_timer_trace_visibility());
        assert_eq!(
            sim.visibility(),
            Visibility {
                level: LogLevel::Verbose,
                show_timer: true
            }
        );
        sim.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_twice_is_noop() {
        let mut sim = Simulator::start(quick_config(60_000)).unwrap();
        sim.shutdown().unwrap();
        let written = sim.recent_trace(usize::MAX).len();
        sim.shutdown().unwrap();
        assert_eq!(sim.recent_trace(usize::MAX).len(), written);
    }
}
