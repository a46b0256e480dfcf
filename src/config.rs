//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/energy_probe.toml`)
//! 2. environment variables prefixed with `ENERGY_PROBE_`, nested keys
//!    separated by `__` (e.g. `ENERGY_PROBE_PROBE__DEVICE_ENTRY=/dev/ttyACM1`)
//!
//! # Example
//! ```no_run
//! use energy_probe::config::ProbeConfig;
//!
//! let config = ProbeConfig::load()?;
//! config.validate()?;
//! println!("Ports: {:?}", config.probe.site_labels());
//! # Ok::<(), energy_probe::error::ProbeError>(())
//! ```

use crate::capture::DEFAULT_RAW_FILE_NAME;
use crate::error::{ProbeError, ProbeResult};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/energy_probe.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Energy probe settings
    pub probe: ProbeSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// Energy probe port layout and capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Shunt resistor per port, in ohms.
    pub resistor_values: Vec<f64>,
    /// Site label per port. Defaults to `PORT_<index>`.
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    /// Serial device the probe is attached to.
    #[serde(default = "default_device_entry")]
    pub device_entry: String,
    /// Explicit path to the capture utility; searched in `PATH` when unset.
    #[serde(default)]
    pub capture_tool: Option<PathBuf>,
    /// Name of the raw file the capture utility writes.
    #[serde(default = "default_raw_file_name")]
    pub raw_file_name: String,
    /// Directory session output directories are created in; the system temp
    /// dir when unset.
    #[serde(default)]
    pub session_root: Option<PathBuf>,
}

// Default value functions
fn default_name() -> String {
    "energy-probe".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_entry() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_raw_file_name() -> String {
    DEFAULT_RAW_FILE_NAME.to_string()
}

impl ProbeSettings {
    /// Settings for the given resistors with every other field at its default.
    pub fn new(resistor_values: Vec<f64>) -> Self {
        Self {
            resistor_values,
            labels: None,
            device_entry: default_device_entry(),
            capture_tool: None,
            raw_file_name: default_raw_file_name(),
            session_root: None,
        }
    }

    /// Sets the site labels.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the serial device.
    pub fn with_device_entry(mut self, device_entry: impl Into<String>) -> Self {
        self.device_entry = device_entry.into();
        self
    }

    /// Sets an explicit capture utility path.
    pub fn with_capture_tool(mut self, path: impl Into<PathBuf>) -> Self {
        self.capture_tool = Some(path.into());
        self
    }

    /// Sets the directory capture sessions are created in.
    pub fn with_session_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_root = Some(path.into());
        self
    }

    /// Number of probe ports.
    pub fn ports(&self) -> usize {
        self.resistor_values.len()
    }

    /// Site label for each port, synthesizing `PORT_<index>` when none are set.
    pub fn site_labels(&self) -> Vec<String> {
        match &self.labels {
            Some(labels) => labels.clone(),
            None => (0..self.ports()).map(|i| format!("PORT_{}", i)).collect(),
        }
    }

    /// Validate the port layout
    pub fn validate(&self) -> ProbeResult<()> {
        if self.resistor_values.is_empty() {
            return Err(ProbeError::Configuration(
                "At least one resistor value is required".into(),
            ));
        }

        for (port, ohms) in self.resistor_values.iter().enumerate() {
            if !ohms.is_finite() || *ohms <= 0.0 {
                return Err(ProbeError::Configuration(format!(
                    "Invalid resistor value {} for port {}. Must be a positive number of ohms",
                    ohms, port
                )));
            }
        }

        if let Some(labels) = &self.labels {
            if labels.len() != self.resistor_values.len() {
                return Err(ProbeError::Configuration(format!(
                    "{} labels given for {} resistor values",
                    labels.len(),
                    self.resistor_values.len()
                )));
            }
            let mut seen = HashSet::new();
            for label in labels {
                if label.trim().is_empty() {
                    return Err(ProbeError::Configuration("Empty site label".into()));
                }
                if !seen.insert(label) {
                    return Err(ProbeError::Configuration(format!(
                        "Duplicate site label: {}",
                        label
                    )));
                }
            }
        }

        if self.device_entry.trim().is_empty() {
            return Err(ProbeError::Configuration("device_entry must not be empty".into()));
        }
        if self.raw_file_name.trim().is_empty() {
            return Err(ProbeError::Configuration("raw_file_name must not be empty".into()));
        }

        Ok(())
    }
}

impl ProbeConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> ProbeResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> ProbeResult<Self> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ENERGY_PROBE_").split("__"))
            .extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ProbeResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ProbeError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.probe.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_labels() {
        let settings = ProbeSettings::new(vec![0.01, 0.02]);
        assert_eq!(settings.site_labels(), vec!["PORT_0", "PORT_1"]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_label_count_must_match() {
        let settings = ProbeSettings::new(vec![0.01, 0.02]).with_labels(["A57"]);
        assert!(matches!(
            settings.validate(),
            Err(ProbeError::Configuration(_))
        ));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let settings = ProbeSettings::new(vec![0.01, 0.02]).with_labels(["A57", "A57"]);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_invalid_resistor_values() {
        assert!(ProbeSettings::new(vec![]).validate().is_err());
        assert!(ProbeSettings::new(vec![0.0]).validate().is_err());
        assert!(ProbeSettings::new(vec![-0.01]).validate().is_err());
        assert!(ProbeSettings::new(vec![f64::NAN]).validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"

[probe]
resistor_values = [0.01, 0.02]
labels = ["A57", "A53"]
device_entry = "/dev/ttyACM1"
"#
        )
        .unwrap();

        let config = ProbeConfig::load_from(file.path()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.name, "energy-probe");
        assert_eq!(config.probe.site_labels(), vec!["A57", "A53"]);
        assert_eq!(config.probe.device_entry, "/dev/ttyACM1");
        assert_eq!(config.probe.raw_file_name, DEFAULT_RAW_FILE_NAME);
        assert!(config.probe.capture_tool.is_none());
    }

    #[test]
    fn test_invalid_log_level() {
        let config = ProbeConfig {
            application: ApplicationConfig {
                name: "Test".to_string(),
                log_level: "verbose".to_string(),
            },
            probe: ProbeSettings::new(vec![0.01]),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_probe_section() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        assert!(matches!(
            ProbeConfig::load_from(file.path()),
            Err(ProbeError::Config(_))
        ));
    }
}
