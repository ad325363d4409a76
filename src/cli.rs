//! Command-line surface of the binary.

use crate::settings::UserSettings;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> bool {
        toggle == Toggle::On
    }
}

/// Keeps a small, steady CPU load on every logical core.
///
/// Runs until Ctrl+C. On unix, SIGHUP reloads the settings file.
#[derive(Debug, Parser)]
#[command(name = "cpu-idle-stabilizer", version, about)]
pub struct Cli {
    /// Aggregate CPU load target in percent (clamped to 1-10)
    #[arg(long, value_name = "PERCENT", allow_negative_numbers = true)]
    pub target: Option<f64>,

    /// Enable or disable eco mode (per-cycle jitter)
    #[arg(long, value_enum, value_name = "on|off")]
    pub eco: Option<Toggle>,

    /// Settings file to load and update [default: settings.json next to the executable]
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn settings_path(&self) -> PathBuf {
        self.settings.clone().unwrap_or_else(UserSettings::default_path)
    }

    /// True if any flag overrides a persisted setting.
    pub fn has_overrides(&self) -> bool {
        self.target.is_some() || self.eco.is_some()
    }

    /// Applies command-line overrides on top of `base`.
    pub fn apply_overrides(&self, base: UserSettings) -> UserSettings {
        UserSettings {
            target_total_percent: self.target.unwrap_or(base.target_total_percent),
            eco_mode: self.eco.map(bool::from).unwrap_or(base.eco_mode),
        }
    }
}
