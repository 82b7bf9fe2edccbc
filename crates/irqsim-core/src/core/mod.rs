//! Core module: the interrupt dispatch engine.
//!
//! This module contains:
//! - `trace`: Bounded trace ring and visibility filtering
//! - `stats`: Dispatch counters and mean response time
//! - `table`: Interrupt descriptor table and its state machine
//! - `dispatch`: Dispatcher and registration front door
//! - `timer`: Background timer thread
//! - `handlers`: Built-in interrupt service routines
//! - `simulator`: Context object owning everything above
//! - `workloads`: Canned dispatch sequences
//! - `interrupt`: Ctrl+C handling for long-running commands

pub mod dispatch;
pub mod handlers;
pub mod interrupt;
pub mod simulator;
pub mod stats;
pub mod table;
pub mod timer;
pub mod trace;
pub mod workloads;

/// Line index of an interrupt source (an IRQ number).
pub type Line = usize;
