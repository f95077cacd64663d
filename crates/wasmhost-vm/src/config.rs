//! Host configuration.
//!
//! Loaded from TOML; every section falls back to its defaults when absent.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::HostError;
use crate::gas_metering::GasSchedule;
use crate::{DEFAULT_MAX_ARGS_LENGTH, MAX_CALL_DEPTH};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Frames allowed on one call stack, root included
    pub max_call_depth: usize,
    /// Argument bytes retained per ActionResult node
    pub max_args_length: usize,
    /// Whether a contract may be re-entered while already on the stack
    pub allow_reentrancy: bool,
    pub gas: GasSchedule,
    pub limits: InputLimits,
    pub logging: LoggingConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_call_depth: MAX_CALL_DEPTH,
            max_args_length: DEFAULT_MAX_ARGS_LENGTH,
            allow_reentrancy: true,
            gas: GasSchedule::default(),
            limits: InputLimits::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load configuration from file.
    /// Path is validated to prevent directory traversal attacks.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if path.to_string_lossy().contains("..") {
            anyhow::bail!("Invalid path: directory traversal detected");
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: HostConfig = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        if path.to_string_lossy().contains("..") {
            anyhow::bail!("Invalid path: directory traversal detected");
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| {
            anyhow::anyhow!("Failed to write config file '{}': {}", path.display(), e)
        })?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_call_depth == 0 {
            anyhow::bail!("max_call_depth must be at least 1");
        }
        if self.max_args_length == 0 {
            anyhow::bail!("max_args_length must be at least 1");
        }
        self.limits.validate()?;
        Ok(())
    }
}

/// Size bounds on byte inputs crossing the callback boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLimits {
    pub max_storage_key: usize,
    pub max_storage_value: usize,
    pub max_code: usize,
    /// Packed argument buffers
    pub max_args: usize,
    pub max_amount: usize,
    /// Method names, event names, debug messages and nonces
    pub max_string: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_storage_key: 128 * 1024,
            max_storage_value: 128 * 1024,
            max_code: 1024 * 1024,
            max_args: 10 * 1024,
            max_amount: 32,
            max_string: 4 * 1024,
        }
    }
}

impl InputLimits {
    fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("max_storage_key", self.max_storage_key),
            ("max_storage_value", self.max_storage_value),
            ("max_code", self.max_code),
            ("max_args", self.max_args),
            ("max_amount", self.max_amount),
            ("max_string", self.max_string),
        ];
        for (name, value) in fields {
            if value == 0 {
                anyhow::bail!("limits.{} cannot be 0", name);
            }
        }
        Ok(())
    }

    /// Reject `bytes` longer than `max`.
    pub fn check(what: &str, bytes: &[u8], max: usize) -> Result<(), HostError> {
        if bytes.len() > max {
            return Err(HostError::InvalidInput(format!(
                "{} too long: {} > {}",
                what,
                bytes.len(),
                max
            )));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `wasmhost_vm=debug`
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber described by this section.
    pub fn init(&self) -> anyhow::Result<()> {
        crate::telemetry::init_telemetry(&self.level, self.format == "json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.max_args_length, 100);
        assert!(config.allow_reentrancy);
        assert_eq!(config.limits.max_args, 10 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = HostConfig::default();
        config.max_call_depth = 0;
        assert!(config.validate().is_err());

        let mut config = HostConfig::default();
        config.limits.max_code = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("host.toml");

        let mut config = HostConfig::default();
        config.max_call_depth = 16;
        config.gas.transfer = 25;
        config.logging.format = "json".to_string();
        config.to_file(&path).unwrap();

        let loaded = HostConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: HostConfig = toml::from_str("max_args_length = 64\n[gas]\ntransfer = 3\n").unwrap();
        assert_eq!(config.max_args_length, 64);
        assert_eq!(config.gas.transfer, 3);
        assert_eq!(config.gas.storage_write_per_byte, 1);
        assert_eq!(config.max_call_depth, 64);
    }

    #[test]
    fn test_path_traversal_rejected() {
        let path = Path::new("../host.toml");
        assert!(HostConfig::from_file(path).is_err());
        assert!(HostConfig::default().to_file(path).is_err());
    }

    #[test]
    fn test_input_limit_check() {
        assert!(InputLimits::check("key", &[0u8; 4], 4).is_ok());
        let err = InputLimits::check("key", &[0u8; 5], 4).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: key too long: 5 > 4");
    }
}
