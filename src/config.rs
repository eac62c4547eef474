//! Runtime configuration
//!
//! Configuration is read from a TOML file. Every key is optional; missing keys fall back to
//! the defaults below.
//!
//! ```toml
//! update_interval = 1.0
//! worker_threads = 2
//! text = """
//! load ${loadavg} ${membar}
//! ${template0 root /}
//! """
//!
//! [templates]
//! template0 = '\1: ${exec df -h \2 | tail -1}'
//!
//! [console]
//! bar_width = 20
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("invalid config value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Console rendering options for bars and gauges
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Width of a bar when the template does not give one
    pub bar_width: usize,
    /// Character for the filled part of a bar
    pub bar_fill: char,
    /// Character for the empty part of a bar
    pub bar_unfill: char,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            bar_width: 10,
            bar_fill: '#',
            bar_unfill: '_',
        }
    }
}

/// Configuration options for the template runtime
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seconds between two refresh ticks
    pub update_interval: f64,

    /// Maximum size in bytes of the template text and of one rendered frame
    pub max_user_text: usize,

    /// Maximum size in bytes of a single variable's text
    pub text_buffer_size: usize,

    /// Upper bound on template macro expansion passes
    pub max_template_passes: usize,

    /// Number of threads fetching provider data
    pub worker_threads: usize,

    /// Connect and read timeout, in seconds, for network probes
    pub net_timeout: f64,

    /// User templates `template0`..`template9`
    pub templates: BTreeMap<String, String>,

    /// Console presentation of numeric values
    pub console: ConsoleConfig,

    /// The template to render
    pub text: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            update_interval: 3.0,
            max_user_text: 16384,
            text_buffer_size: 256,
            max_template_passes: 32,
            worker_threads: 4,
            net_timeout: 5.0,
            templates: BTreeMap::new(),
            console: ConsoleConfig::default(),
            text: String::new(),
        }
    }
}

impl RuntimeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.update_interval.is_finite() && self.update_interval > 0.0) {
            return Err(ConfigError::Invalid {
                key: "update_interval",
                reason: format!("must be a positive number of seconds, got {}", self.update_interval),
            });
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid {
                key: "worker_threads",
                reason: "at least one worker thread is required".to_string(),
            });
        }
        if self.max_template_passes == 0 {
            return Err(ConfigError::Invalid {
                key: "max_template_passes",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.net_timeout.is_finite() && self.net_timeout > 0.0) {
            return Err(ConfigError::Invalid {
                key: "net_timeout",
                reason: format!("must be a positive number of seconds, got {}", self.net_timeout),
            });
        }
        Ok(())
    }

    /// The refresh tick as a duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.update_interval)
    }

    /// The network probe timeout as a duration
    pub fn net_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.net_timeout)
    }

    /// Set the refresh interval in seconds
    pub fn with_update_interval(mut self, seconds: f64) -> Self {
        self.update_interval = seconds;
        self
    }

    /// Set the maximum template and frame size
    pub fn with_max_user_text(mut self, bytes: usize) -> Self {
        self.max_user_text = bytes;
        self
    }

    /// Set the size of the worker pool
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the macro expansion bound
    pub fn with_max_template_passes(mut self, passes: usize) -> Self {
        self.max_template_passes = passes;
        self
    }

    /// Define a user template, e.g. `with_template("template1", "\\1 is ${\\2}")`
    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(name.into(), body.into());
        self
    }

    /// Set the console presentation options
    pub fn with_console(mut self, console: ConsoleConfig) -> Self {
        self.console = console;
        self
    }

    /// Set the template text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.update_interval, 3.0);
        assert_eq!(config.max_user_text, 16384);
        assert_eq!(config.text_buffer_size, 256);
        assert_eq!(config.max_template_passes, 32);
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.console.bar_width, 10);
        assert_eq!(config.console.bar_fill, '#');
        assert_eq!(config.console.bar_unfill, '_');
        assert!(config.templates.is_empty());
    }

    #[test]
    fn test_builder_pattern() {
        let config = RuntimeConfig::new()
            .with_update_interval(0.5)
            .with_worker_threads(2)
            .with_template("template0", "x");

        assert_eq!(config.update_interval, 0.5);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.templates.get("template0").map(String::as_str), Some("x"));
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_toml() {
        let config = RuntimeConfig::from_toml(
            r#"
            update_interval = 1.5
            text = "hello $USER"

            [templates]
            template1 = "\\1!"

            [console]
            bar_width = 4
            "#,
        )
        .expect("Should parse");

        assert_eq!(config.update_interval, 1.5);
        assert_eq!(config.text, "hello $USER");
        assert_eq!(config.templates.get("template1").map(String::as_str), Some("\\1!"));
        assert_eq!(config.console.bar_width, 4);
        assert_eq!(config.console.bar_fill, '#');
        assert_eq!(config.worker_threads, 4);
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let result = RuntimeConfig::from_toml("update_interval = 0.0");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                key: "update_interval",
                ..
            })
        ));
    }

    #[test]
    fn test_bad_toml_rejected() {
        let result = RuntimeConfig::from_toml("update_interval = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
