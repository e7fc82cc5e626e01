//! Engine configuration (TOML).
//!
//! Every section is `#[serde(default)]`, so a partial file only overrides
//! what it names.
//!
//! ```toml
//! [reminders]
//! default_style = "persistent"
//!
//! [lifecycle]
//! grace_minutes = 5
//! checklist_policy = "require_all_done"
//!
//! [cadence]
//! sweep_secs = 30
//! jobs = { briefing = 3600 }
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::{ConfigError, ReminderStyle, Strength};
use crate::escalation::AlertPolicy;
use crate::lifecycle::{ChecklistPolicy, LifecyclePolicy};

/// Name of the state-transition sweep job.
pub const SWEEP_JOB: &str = "sweep";

/// Upper bound for `lifecycle.grace_minutes`: one week.
pub const MAX_GRACE_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub reminders: ReminderConfig,
    pub briefing: BriefingConfig,
    pub lifecycle: LifecycleConfig,
    pub cadence: CadenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Used when a responsibility omits its own reminder style.
    pub default_style: ReminderStyle,
    pub upgrade_critical_to_full_screen: bool,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            default_style: Strength::Gentle,
            upgrade_critical_to_full_screen: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefingConfig {
    pub morning: bool,
    pub evening: bool,
}

impl BriefingConfig {
    pub fn any(&self) -> bool {
        self.morning || self.evening
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub grace_minutes: i64,
    pub checklist_policy: ChecklistPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub sweep_secs: u64,
    /// Cadence of every other named job, in seconds.
    pub jobs: BTreeMap<String, u64>,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            sweep_secs: 60,
            jobs: BTreeMap::new(),
        }
    }
}

impl CadenceConfig {
    /// Cadence of a named job; `None` when the job is not configured.
    pub fn period_of(&self, job: &str) -> Option<std::time::Duration> {
        let secs = if job == SWEEP_JOB {
            Some(self.sweep_secs)
        } else {
            self.jobs.get(job).copied()
        };
        secs.map(std::time::Duration::from_secs)
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save as TOML, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `~/.config/vigil/config.toml` (XDG aware).
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("vigil").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("vigil")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/vigil-config/config.toml")
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=MAX_GRACE_MINUTES).contains(&self.lifecycle.grace_minutes) {
            return Err(ConfigError::Invalid(format!(
                "lifecycle.grace_minutes must be within 0..={MAX_GRACE_MINUTES}, got {}",
                self.lifecycle.grace_minutes
            )));
        }
        if self.cadence.sweep_secs == 0 {
            return Err(ConfigError::Invalid("cadence.sweep_secs must be > 0".into()));
        }
        if let Some((name, _)) = self.cadence.jobs.iter().find(|(_, secs)| **secs == 0) {
            return Err(ConfigError::Invalid(format!(
                "cadence.jobs.{name} must be > 0"
            )));
        }
        Ok(())
    }

    pub fn alert_policy(&self) -> AlertPolicy {
        AlertPolicy {
            default_style: self.reminders.default_style,
            upgrade_critical_to_full_screen: self.reminders.upgrade_critical_to_full_screen,
        }
    }

    pub fn lifecycle_policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            grace: Duration::minutes(self.lifecycle.grace_minutes.clamp(0, MAX_GRACE_MINUTES)),
            checklist: self.lifecycle.checklist_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alert_policy().default_style, Strength::Gentle);
        assert_eq!(config.lifecycle_policy().grace, Duration::zero());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [reminders]
            default_style = "persistent"

            [lifecycle]
            checklist_policy = "require_all_done"

            [cadence]
            jobs = { briefing = 3600 }
            "#,
        )
        .unwrap();

        assert_eq!(config.reminders.default_style, Strength::Persistent);
        assert!(config.reminders.upgrade_critical_to_full_screen);
        assert_eq!(config.lifecycle.checklist_policy, ChecklistPolicy::RequireAllDone);
        assert_eq!(
            config.cadence.period_of(SWEEP_JOB),
            Some(std::time::Duration::from_secs(60))
        );
        assert_eq!(
            config.cadence.period_of("briefing"),
            Some(std::time::Duration::from_secs(3600))
        );
        assert_eq!(config.cadence.period_of("wellness"), None);
    }

    #[test]
    fn zero_cadence_is_rejected() {
        let err = EngineConfig::from_toml_str("[cadence]\nsweep_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_toml_str("[cadence.jobs]\nwellness = 0\n").unwrap_err();
        assert!(err.to_string().contains("wellness"));
    }

    #[test]
    fn negative_grace_is_rejected() {
        let err = EngineConfig::from_toml_str("[lifecycle]\ngrace_minutes = -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn oversized_grace_is_rejected() {
        let at_limit = format!("[lifecycle]\ngrace_minutes = {MAX_GRACE_MINUTES}\n");
        let config = EngineConfig::from_toml_str(&at_limit).unwrap();
        assert_eq!(
            config.lifecycle_policy().grace,
            Duration::minutes(MAX_GRACE_MINUTES)
        );

        let huge = format!("[lifecycle]\ngrace_minutes = {}\n", i64::MAX / 2);
        let err = EngineConfig::from_toml_str(&huge).unwrap_err();
        assert!(err.to_string().contains("grace_minutes"));
    }

    #[test]
    fn unvalidated_grace_is_clamped() {
        let mut config = EngineConfig::default();
        config.lifecycle.grace_minutes = i64::MAX;
        assert_eq!(
            config.lifecycle_policy().grace,
            Duration::minutes(MAX_GRACE_MINUTES)
        );
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let err = EngineConfig::from_toml_str("this is not valid toml {{{").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_nonexistent_returns_io_error() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/vigil/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn save_and_reload() {
        let dir = std::env::temp_dir().join(format!("vigil-config-{}", ulid::Ulid::new()));
        let path = dir.join("config.toml");

        let mut config = EngineConfig::default();
        config.briefing.morning = true;
        config.lifecycle.grace_minutes = 10;
        config.cadence.jobs.insert("briefing".into(), 900);
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = EngineConfig::default_config_path();
        assert!(path.ends_with("config.toml"));
        assert!(path.to_string_lossy().contains("vigil"));
    }
}
