//! Courier configuration stored as TOML (default `courier.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::EscalationPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("serialize config toml: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
///
/// Missing sections and fields fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CourierConfig {
    pub scheduler: SchedulerConfig,
    pub policy: PolicyConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Passes allowed in flight at once.
    pub max_concurrent: usize,

    /// How often the control loop looks for admissible work.
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            poll_interval_ms: 500,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Hop budget for new tasks.
    pub ttl_max: u32,
    pub escalate_after_failures: u32,
    pub de_escalate_after_successes: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let escalation = EscalationPolicy::default();
        Self {
            ttl_max: 10,
            escalate_after_failures: escalation.escalate_after_failures,
            de_escalate_after_successes: escalation.de_escalate_after_successes,
        }
    }
}

impl PolicyConfig {
    pub fn escalation(&self) -> EscalationPolicy {
        EscalationPolicy {
            escalate_after_failures: self.escalate_after_failures,
            de_escalate_after_successes: self.de_escalate_after_successes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Root of the file store (`tasks/`, `dead-letter/`).
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".courier"),
        }
    }
}

impl CourierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.scheduler.max_concurrent == 0 {
            return invalid("scheduler.max_concurrent must be > 0");
        }
        if self.scheduler.poll_interval_ms == 0 {
            return invalid("scheduler.poll_interval_ms must be > 0");
        }
        if self.policy.ttl_max == 0 {
            return invalid("policy.ttl_max must be > 0");
        }
        if self.policy.escalate_after_failures == 0 {
            return invalid("policy.escalate_after_failures must be > 0");
        }
        if self.policy.de_escalate_after_successes == 0 {
            return invalid("policy.de_escalate_after_successes must be > 0");
        }
        if self.policy.escalate_after_failures > self.policy.ttl_max {
            return invalid("policy.escalate_after_failures must not exceed policy.ttl_max");
        }
        if self.store.dir.as_os_str().is_empty() {
            return invalid("store.dir must not be empty");
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let mut buf = toml::to_string_pretty(self)?;
        buf.push('\n');
        Ok(buf)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CourierConfig::default()`.
pub fn load_config(path: &Path) -> Result<CourierConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = CourierConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: CourierConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    cfg.validate()?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CourierConfig) -> Result<(), ConfigError> {
    cfg.validate()?;
    write_atomic(path, &cfg.to_toml()?)
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents).map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, CourierConfig::default());
        assert_eq!(cfg.scheduler.max_concurrent, 3);
        assert_eq!(cfg.policy.ttl_max, 10);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("courier.toml");
        let mut cfg = CourierConfig::default();
        cfg.scheduler.max_concurrent = 5;
        cfg.store.dir = temp.path().join("state");
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("courier.toml");
        fs::write(&path, "[policy]\nttl_max = 6\n").unwrap();

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.policy.ttl_max, 6);
        assert_eq!(cfg.policy.escalate_after_failures, 3);
        assert_eq!(cfg.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn unparsable_file_names_the_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("courier.toml");
        fs::write(&path, "[scheduler\nmax_concurrent = ").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("courier.toml"));
    }

    #[rstest]
    #[case::zero_cap("[scheduler]\nmax_concurrent = 0\n")]
    #[case::zero_ttl("[policy]\nttl_max = 0\n")]
    #[case::inverted("[policy]\nttl_max = 2\nescalate_after_failures = 3\n")]
    #[case::zero_recovery("[policy]\nde_escalate_after_successes = 0\n")]
    fn invalid_values_are_rejected(#[case] toml: &str) {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("courier.toml");
        fs::write(&path, toml).unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));
    }
}
