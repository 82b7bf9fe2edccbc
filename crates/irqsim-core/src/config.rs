//! Configuration management for irqsim.
//!
//! Loads configuration from ${IRQSIM_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::handlers::HandlerDelays;
use crate::core::table::{DEFAULT_LINES, MAX_LINES};
use crate::core::trace::{DEFAULT_TRACE_CAPACITY, LogLevel, MAX_TRACE_CAPACITY, Visibility};

pub mod paths {
    //! Path resolution for irqsim configuration.
    //!
    //! IRQSIM_HOME resolution order:
    //! 1. IRQSIM_HOME environment variable (if set)
    //! 2. ~/.config/irqsim (default)
    //! 3. ./.irqsim when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the irqsim home directory.
    pub fn irqsim_home() -> PathBuf {
        if let Ok(home) = std::env::var("IRQSIM_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".irqsim"),
            |h| h.join(".config").join("irqsim"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        irqsim_home().join("config.toml")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of lines in the descriptor table
    pub lines: usize,

    /// Slots in the trace ring
    pub trace_capacity: usize,

    /// Line served by the built-in timer routine
    pub timer_line: usize,

    /// Line served by the built-in keyboard routine
    pub keyboard_line: usize,

    /// Timer period in milliseconds
    pub timer_interval_ms: u64,

    /// Which trace events are echoed
    pub log_level: LogLevel,

    /// Echo timer events in `user_only` mode
    pub show_timer_logs: bool,

    /// Simulated work of the built-in routines
    #[serde(default)]
    pub handlers: HandlerDelays,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lines: DEFAULT_LINES,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            timer_line: Self::DEFAULT_TIMER_LINE,
            keyboard_line: Self::DEFAULT_KEYBOARD_LINE,
            timer_interval_ms: Self::DEFAULT_TIMER_INTERVAL_MS,
            log_level: LogLevel::default(),
            show_timer_logs: false,
            handlers: HandlerDelays::default(),
        }
    }
}

impl Config {
    const DEFAULT_TIMER_LINE: usize = 0;
    const DEFAULT_KEYBOARD_LINE: usize = 1;
    const DEFAULT_TIMER_INTERVAL_MS: u64 = 3000;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Checks that the table layout is usable.
    ///
    /// # Errors
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LINES).contains(&self.lines) {
            anyhow::bail!("lines = {} must be between 1 and {MAX_LINES}", self.lines);
        }
        if !(1..=MAX_TRACE_CAPACITY).contains(&self.trace_capacity) {
            anyhow::bail!(
                "trace_capacity = {} must be between 1 and {MAX_TRACE_CAPACITY}",
                self.trace_capacity
            );
        }
        if self.timer_interval_ms == 0 {
            anyhow::bail!("timer_interval_ms must be at least 1");
        }
        for (name, line) in [
            ("timer_line", self.timer_line),
            ("keyboard_line", self.keyboard_line),
        ] {
            if line >= self.lines {
                anyhow::bail!(
                    "{name} = {line} is outside the table (0-{})",
                    self.lines - 1
                );
            }
        }
        if self.timer_line == self.keyboard_line {
            anyhow::bail!(
                "timer_line and keyboard_line must differ (both are {})",
                self.timer_line
            );
        }
        Ok(())
    }

    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_interval_ms)
    }

    pub fn visibility(&self) -> Visibility {
        Visibility {
            level: self.log_level,
            show_timer: self.show_timer_logs,
        }
    }

    /// Creates the default config file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Generates a fresh config TOML from Rust defaults.
    ///
    /// Uses the embedded template for structure/comments and merges
    /// generated values from `Config::default()` into it.
    ///
    /// # Errors
    /// Returns an error if serialization or template parsing fails.
    pub fn generate() -> Result<String> {
        use toml_edit::DocumentMut;

        let generated_toml = toml::to_string(&Config::default())
            .context("Failed to serialize default config to TOML")?;

        let mut doc: DocumentMut = default_config_template()
            .parse()
            .context("Failed to parse default config template")?;
        let generated_doc: DocumentMut = generated_toml
            .parse()
            .context("Failed to parse generated config")?;

        merge_items(doc.as_table_mut(), generated_doc.as_table());

        Ok(doc.to_string())
    }

    /// Saves the logging settings to the default config file.
    ///
    /// # Errors
    /// See [`Config::save_log_settings_to`].
    pub fn save_log_settings(level: LogLevel, show_timer_logs: bool) -> Result<()> {
        Self::save_log_settings_to(&paths::config_path(), level, show_timer_logs)
    }

    /// Saves only the logging fields to a specific config file path.
    ///
    /// Creates the file from the template if it doesn't exist.
    /// Preserves existing fields and comments using toml_edit.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or written.
    pub fn save_log_settings_to(path: &Path, level: LogLevel, show_timer_logs: bool) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let contents = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["log_level"] = value(level.display_name());
        doc["show_timer_logs"] = value(show_timer_logs);

        Self::write_config(path, &doc.to_string())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Commented template shipped as `default_config.toml`.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Copies generated values over the template, descending into tables so
/// comments on `[handlers]` survive.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, item) in source.iter() {
        if let (Item::Table(table), Some(Item::Table(existing))) = (item, target.get_mut(key)) {
            merge_items(existing, table);
        } else if !item.is_none() {
            target[key] = item.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    /// Config loading: missing file returns defaults.
    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.lines, 16);
        assert_eq!(config.timer_interval(), Duration::from_secs(3));
    }

    /// Config loading: partial config merges with defaults.
    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(
            &config_path,
            "timer_interval_ms = 250\nlog_level = \"verbose\"\n[handlers]\ncustom_us = 1\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.timer_interval_ms, 250);
        assert_eq!(config.log_level, LogLevel::Verbose);
        assert_eq!(config.handlers.custom_us, 1);
        assert_eq!(config.handlers.timer_us, 10_000);
        assert_eq!(config.trace_capacity, 100);
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "log_level = \"loud\"\n").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_layouts() {
        let zero_lines = Config {
            lines: 0,
            ..Config::default()
        };
        assert!(zero_lines.validate().is_err());

        let huge_table = Config {
            lines: 100_000_000_000_000,
            ..Config::default()
        };
        let err = huge_table.validate().unwrap_err().to_string();
        assert!(err.contains("between 1 and 256"), "{err}");

        let widest = Config {
            lines: MAX_LINES,
            ..Config::default()
        };
        assert!(widest.validate().is_ok());

        let huge_ring = Config {
            trace_capacity: MAX_TRACE_CAPACITY + 1,
            ..Config::default()
        };
        let err = huge_ring.validate().unwrap_err().to_string();
        assert!(err.contains("trace_capacity"), "{err}");

        let outside = Config {
            lines: 4,
            keyboard_line: 4,
            ..Config::default()
        };
        let err = outside.validate().unwrap_err().to_string();
        assert!(err.contains("keyboard_line = 4"), "{err}");

        let same = Config {
            keyboard_line: 0,
            ..Config::default()
        };
        assert!(same.validate().is_err());

        let no_interval = Config {
            timer_interval_ms: 0,
            ..Config::default()
        };
        assert!(no_interval.validate().is_err());
    }

    #[test]
    fn test_init_creates_file_and_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.toml");

        Config::init(&config_path).unwrap();
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("timer_interval_ms = 3000"));
        assert!(contents.contains("# Number of interrupt lines"));

        let err = Config::init(&config_path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    /// The embedded template parses back to the Rust defaults.
    #[test]
    fn test_template_matches_defaults() {
        let from_template: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(from_template, Config::default());

        let generated: Config = toml::from_str(&Config::generate().unwrap()).unwrap();
        assert_eq!(generated, Config::default());
    }

    #[test]
    fn test_save_log_settings_preserves_other_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "# my settings\ntimer_interval_ms = 500\nlog_level = \"user_only\"\n",
        )
        .unwrap();

        Config::save_log_settings_to(&config_path, LogLevel::Silent, true).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("# my settings"));
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.timer_interval_ms, 500);
        assert_eq!(config.log_level, LogLevel::Silent);
        assert!(config.show_timer_logs);
    }
}
