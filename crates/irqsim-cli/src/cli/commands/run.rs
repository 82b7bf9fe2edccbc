//! Interactive menu.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use irqsim_core::config::{Config, paths};
use irqsim_core::core::handlers::HandlerKind;
use irqsim_core::core::interrupt;
use irqsim_core::core::simulator::Simulator;
use irqsim_core::core::trace::LogLevel;
use irqsim_core::core::workloads::{self, Workload};

use super::console::{ChannelLines, Console, LineSource};
use super::{observer, render};

const RECENT_TRACE: usize = 10;
const WORKLOAD_PAUSE: Duration = Duration::from_millis(500);
const TIMER_PREVIEW: Duration = Duration::from_secs(30);

pub fn run(config: Config) -> Result<()> {
    interrupt::init()?;
    println!("Starting interrupt simulator...");

    let (mut sim, rx) = Simulator::start_observed(config)?;
    let printer = observer::spawn_printer(rx)?;

    let outcome = ChannelLines::stdin().and_then(|input| {
        let console = Console::with_source(input, io::stdout());
        Menu::new(&sim, console, paths::config_path()).run()
    });

    // Ctrl+C lands here too: stop and join the timer before reporting it.
    let stopped = sim.shutdown();
    drop(sim);
    observer::finish(printer);

    stopped?;
    println!("Simulator stopped.");
    outcome
}

pub(crate) struct Menu<'a, S, W> {
    sim: &'a Simulator,
    console: Console<S, W>,
    config_path: PathBuf,
    pause: Duration,
    preview: Duration,
}

impl<'a, S: LineSource, W: Write> Menu<'a, S, W> {
    pub fn new(sim: &'a Simulator, console: Console<S, W>, config_path: PathBuf) -> Self {
        Self {
            sim,
            console,
            config_path,
            pause: WORKLOAD_PAUSE,
            preview: TIMER_PREVIEW,
        }
    }

    /// Runs until the user picks exit or input ends.
    ///
    /// # Errors
    /// [`interrupt::InterruptedError`] when the input source sees Ctrl+C.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.console.say(render::MAIN_MENU)?;
            let Some(choice) = self.console.read_number("Select an option: ", 0..=9)? else {
                break;
            };
            if choice == 0 {
                self.console.say("Shutting down...")?;
                break;
            }
            if !self.handle(choice)? || !self.console.wait_for_enter()? {
                break;
            }
        }
        Ok(())
    }

    /// Returns `false` when input ran out mid-action.
    fn handle(&mut self, choice: usize) -> Result<bool> {
        match choice {
            1 => return self.dispatch(),
            2 => return self.register_custom(),
            3 => self.console.say(render::idt_table(&self.sim.descriptors()))?,
            4 => self
                .console
                .say(render::recent_trace(&self.sim.recent_trace(RECENT_TRACE)))?,
            5 => {
                let summary = workloads::run(self.sim, Workload::Sequence, self.pause);
                self.console.say(format!(
                    "✓ Test sequence done: {} dispatched, {} rejected.",
                    summary.dispatched, summary.rejected
                ))?;
            }
            6 => return self.unregister(),
            7 => self.console.say(render::stats(&self.sim.stats_snapshot()))?,
            8 => return self.logging_menu(),
            9 => self.console.say(render::help(self.sim.config()))?,
            _ => self.console.say(format!("Invalid option: {choice}"))?,
        }
        Ok(true)
    }

    fn read_line_number(&mut self, prompt: &str) -> Result<Option<usize>> {
        let last = self.sim.lines() - 1;
        self.console
            .read_number(&format!("{prompt} (0-{last}): "), 0..=last)
    }

    fn dispatch(&mut self) -> Result<bool> {
        let Some(line) = self.read_line_number("IRQ number")? else {
            return Ok(false);
        };
        self.console.say(format!("Dispatching IRQ {line}..."))?;
        match self.sim.dispatch(line) {
            Ok(report) => self.console.say(format!(
                "✓ IRQ {line} handled in {} μs (call #{}).",
                report.elapsed.as_micros(),
                report.call_number
            ))?,
            Err(err) => self.console.say(format!("✗ {err}."))?,
        }
        Ok(true)
    }

    fn register_custom(&mut self) -> Result<bool> {
        let Some(line) = self.read_line_number("IRQ number for the custom ISR")? else {
            return Ok(false);
        };
        if let Some(owner) = self.reserved_for(line) {
            self.console
                .say(format!("✗ IRQ {line} is reserved for the {owner}."))?;
            return Ok(true);
        }
        match self.sim.register_builtin(line, HandlerKind::Custom) {
            Ok(()) => self
                .console
                .say(format!("✓ ISR registered for IRQ {line}."))?,
            Err(err) => self
                .console
                .say(format!("✗ Could not register ISR: {err}."))?,
        }
        Ok(true)
    }

    fn reserved_for(&self, line: usize) -> Option<&'static str> {
        if line == self.sim.timer_line() {
            Some("system timer")
        } else if line == self.sim.keyboard_line() {
            Some("keyboard controller")
        } else {
            None
        }
    }

    fn unregister(&mut self) -> Result<bool> {
        let Some(line) = self.read_line_number("IRQ number to unregister")? else {
            return Ok(false);
        };
        match self.sim.unregister(line) {
            Ok(()) => self
                .console
                .say(format!("✓ ISR unregistered for IRQ {line}."))?,
            Err(err) => self
                .console
                .say(format!("✗ Could not unregister ISR: {err}."))?,
        }
        Ok(true)
    }

    fn logging_menu(&mut self) -> Result<bool> {
        loop {
            let current = self.sim.visibility();
            self.console
                .say(render::logging_menu(current, self.preview.as_secs()))?;
            let Some(choice) = self.console.read_number("Select an option: ", 0..=6)? else {
                return Ok(false);
            };
            match choice {
                0 => return Ok(true),
                1..=3 => {
                    let level = LogLevel::all()[choice - 1];
                    self.sim.set_log_visibility(level);
                    self.console
                        .say(format!("Log level set to: {}", level.display_name()))?;
                }
                4 => {
                    let shown = self.sim.toggle_timer_trace_visibility();
                    self.console
                        .say(format!("Timer logs: {}", render::on_off(shown)))?;
                }
                5 => self.preview_timer_logs()?,
                _ => self.save_log_settings()?,
            }
        }
    }

    /// Echoes timer activity for a while, then restores the previous settings.
    fn preview_timer_logs(&mut self) -> Result<()> {
        let previous = self.sim.visibility();
        self.sim.set_log_visibility(LogLevel::UserOnly);
        self.sim.set_timer_trace_visibility(true);
        self.console.say(format!(
            "Showing timer logs for {} seconds (Ctrl+C to stop early)...",
            self.preview.as_secs()
        ))?;

        if interrupt::wait_for_interrupt(self.preview) {
            interrupt::reset();
        }

        self.sim.set_log_visibility(previous.level);
        self.sim.set_timer_trace_visibility(previous.show_timer);
        self.console.say("Back to the previous logging settings.")
    }

    fn save_log_settings(&mut self) -> Result<()> {
        let current = self.sim.visibility();
        match Config::save_log_settings_to(&self.config_path, current.level, current.show_timer) {
            Ok(()) => self.console.say(format!(
                "✓ Logging settings saved to {}.",
                self.config_path.display()
            )),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "saving log settings failed");
                self.console.say(format!("✗ Could not save settings: {err:#}"))
            }
        }
    }
}
