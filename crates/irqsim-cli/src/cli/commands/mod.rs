pub mod config;
pub mod demo;
pub mod run;
pub mod watch;

mod console;
mod observer;
mod render;
