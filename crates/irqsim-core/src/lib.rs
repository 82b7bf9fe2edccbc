//! Core irqsim library (descriptor table, dispatcher, timer, trace, config).

pub mod config;
pub mod core;
pub mod logging;
