//! Line-oriented prompts for the interactive menu.
//!
//! Input comes from a [`LineSource`]. Stdin is read on its own thread so a
//! Ctrl+C ends a pending prompt right away instead of waiting for Enter.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::ops::RangeInclusive;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use irqsim_core::core::interrupt::{self, InterruptedError};
use tokio::sync::mpsc::{self, error::TryRecvError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Somewhere lines of user input come from.
pub trait LineSource {
    /// Next line without its terminator. `None` at end of input.
    ///
    /// # Errors
    /// Read failures, or [`InterruptedError`] if the source watches for Ctrl+C.
    fn next_line(&mut self) -> Result<Option<String>>;
}

/// Any buffered reader, read in place.
pub struct BufferedLines<R>(R);

impl<R: BufRead> LineSource for BufferedLines<R> {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut buf = String::new();
        let read = self.0.read_line(&mut buf).context("read input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Lines from a reader thread, polled alongside an interrupt check.
pub struct ChannelLines {
    rx: mpsc::UnboundedReceiver<io::Result<String>>,
    interrupted: fn() -> bool,
}

impl ChannelLines {
    /// Starts a thread reading stdin and stops on Ctrl+C.
    ///
    /// The reader thread is detached; it stays blocked on stdin until exit.
    pub fn stdin() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .context("spawn stdin reader")?;
        Ok(Self::new(rx, interrupt::is_interrupted))
    }

    fn new(rx: mpsc::UnboundedReceiver<io::Result<String>>, interrupted: fn() -> bool) -> Self {
        Self { rx, interrupted }
    }
}

impl LineSource for ChannelLines {
    fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if (self.interrupted)() {
                return Err(InterruptedError.into());
            }
            match self.rx.try_recv() {
                Ok(line) => return line.map(Some).context("read input"),
                Err(TryRecvError::Disconnected) => return Ok(None),
                Err(TryRecvError::Empty) => thread::sleep(POLL_INTERVAL),
            }
        }
    }
}

/// Why a line of input was not accepted as a menu choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChoiceError {
    NotANumber,
    OutOfRange,
}

impl fmt::Display for ChoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceError::NotANumber => write!(f, "Invalid input"),
            ChoiceError::OutOfRange => write!(f, "Number out of range"),
        }
    }
}

fn parse_choice(text: &str, range: &RangeInclusive<usize>) -> Result<usize, ChoiceError> {
    let Ok(value) = text.trim().parse::<usize>() else {
        return Err(ChoiceError::NotANumber);
    };
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ChoiceError::OutOfRange)
    }
}

pub struct Console<S, W> {
    input: S,
    output: W,
}

impl<R: BufRead, W: Write> Console<BufferedLines<R>, W> {
    pub fn new(input: R, output: W) -> Self {
        Self::with_source(BufferedLines(input), output)
    }
}

impl<S: LineSource, W: Write> Console<S, W> {
    pub fn with_source(input: S, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, text: impl fmt::Display) -> Result<()> {
        writeln!(self.output, "{text}").context("write to console")
    }

    /// Writes `text` without a newline and flushes.
    pub fn prompt(&mut self, text: impl fmt::Display) -> Result<()> {
        write!(self.output, "{text}").context("write to console")?;
        self.output.flush().context("flush console")
    }

    /// Prompts until the user enters a number within `range`.
    ///
    /// Returns `None` if input ends first.
    pub fn read_number(
        &mut self,
        prompt: &str,
        range: RangeInclusive<usize>,
    ) -> Result<Option<usize>> {
        self.prompt(prompt)?;
        loop {
            let Some(line) = self.input.next_line()? else {
                return Ok(None);
            };
            match parse_choice(&line, &range) {
                Ok(value) => return Ok(Some(value)),
                Err(err) => self.prompt(format!(
                    "{err}. Enter a number between {} and {}: ",
                    range.start(),
                    range.end()
                ))?,
            }
        }
    }

    /// Returns `false` if input ended instead.
    pub fn wait_for_enter(&mut self) -> Result<bool> {
        self.prompt("\nPress Enter to continue...")?;
        let more = self.input.next_line()?.is_some();
        self.say("")?;
        Ok(more)
    }
}
