mod cli;

use std::process::ExitCode;

use irqsim_core::core::interrupt::InterruptedError;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        // Ctrl+C already stopped the simulator cleanly.
        Err(e) if e.is::<InterruptedError>() => ExitCode::from(130),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
