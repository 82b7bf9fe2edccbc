//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use irqsim_core::core::trace::LogLevel;
use irqsim_core::core::workloads::Workload;
use irqsim_core::{config, logging};

mod commands;

#[derive(Parser)]
#[command(name = "irqsim")]
#[command(version = "0.1")]
#[command(about = "Interrupt descriptor table and dispatch simulator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override the timer period from config (milliseconds)
    #[arg(long, value_name = "MS", env = "IRQSIM_TIMER_INTERVAL_MS", global = true)]
    interval_ms: Option<u64>,

    /// Override the echo level (silent, user_only, verbose)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Echo timer activity in user_only mode
    #[arg(long, global = true)]
    show_timer_logs: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the interactive menu (default)
    Run,
    /// Run a canned workload, then print the table and statistics
    Demo {
        /// Workload to run
        #[arg(value_enum)]
        workload: WorkloadArg,

        /// Pause between dispatches in milliseconds
        #[arg(long, default_value_t = 500)]
        pause_ms: u64,
    },
    /// Show timer activity until the time is up or Ctrl+C
    Watch {
        /// How long to watch
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum WorkloadArg {
    /// Alternate custom routines on lines 2 and 3
    Sequence,
    /// Hit the timer and keyboard lines from two threads
    Concurrent,
    /// Sweep every line, free ones included
    Stress,
}

impl From<WorkloadArg> for Workload {
    fn from(arg: WorkloadArg) -> Self {
        match arg {
            WorkloadArg::Sequence => Workload::Sequence,
            WorkloadArg::Concurrent => Workload::Concurrent,
            WorkloadArg::Stress => Workload::Stress,
        }
    }
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Print a fresh config generated from defaults
    Generate,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init()?;

    let mut config = config::Config::load().context("load config")?;

    if let Some(ms) = cli.interval_ms {
        config.timer_interval_ms = ms;
    }
    if let Some(level) = cli.log_level.as_deref() {
        config.log_level = LogLevel::parse(level).with_context(|| {
            format!("unknown log level '{level}' (expected silent, user_only or verbose)")
        })?;
    }
    if cli.show_timer_logs {
        config.show_timer_logs = true;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run::run(config),
        Commands::Demo { workload, pause_ms } => {
            commands::demo::run(config, workload.into(), pause_ms)
        }
        Commands::Watch { seconds } => commands::watch::run(config, seconds),
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Generate => commands::config::generate(),
        },
    }
}
