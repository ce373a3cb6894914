//! Wait timing profiles
//!
//! ```yaml
//! defaults:
//!   timeout_secs: 600
//!   delay_secs: 10
//!   min_interval_secs: 10
//! profiles:
//!   subnet_create:
//!     stability: 3
//!   database_task:
//!     timeout_secs: 900
//!     delay_secs: 5
//!     min_interval_secs: 5
//! ```

use crate::error::{ConfigError, Result};
use cloudsettle_core::Timing;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Timing overrides for one call site; unset fields fall back to the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_interval_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<u32>,
}

impl WaitProfile {
    /// Apply the fields set in this profile on top of `base`
    pub fn apply(&self, base: Timing) -> Timing {
        Timing {
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.timeout),
            initial_delay: self
                .delay_secs
                .map(Duration::from_secs)
                .unwrap_or(base.initial_delay),
            min_poll_interval: self
                .min_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(base.min_poll_interval),
            stability: self.stability.unwrap_or(base.stability),
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: &str| ConfigError::InvalidProfile {
            profile: name.to_string(),
            reason: reason.to_string(),
        };

        if self.timeout_secs == Some(0) {
            return Err(invalid("timeout_secs must be greater than zero"));
        }
        if self.stability == Some(0) {
            return Err(invalid("stability must be at least 1"));
        }
        Ok(())
    }
}

/// Per-call-site wait timing loaded from `cloudsettle.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitSettings {
    #[serde(default)]
    pub defaults: WaitProfile,

    #[serde(default)]
    pub profiles: BTreeMap<String, WaitProfile>,
}

impl WaitSettings {
    pub fn from_yaml(source: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    /// Read and validate a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        settings.validate()?;
        tracing::debug!(
            path = %path.display(),
            profiles = settings.profiles.len(),
            "Loaded wait settings"
        );
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.defaults.validate("defaults")?;
        for (name, profile) in &self.profiles {
            profile.validate(name)?;
        }
        Ok(())
    }

    /// Resolve the timing of the call site `name`
    ///
    /// Built-in defaults, then `defaults`, then the named profile.
    pub fn timing(&self, name: &str) -> Timing {
        self.timing_or(name, Timing::default())
    }

    /// Resolve `name`, starting from a call-site specific fallback instead
    /// of the built-in defaults
    ///
    /// Lifecycle operations whose remote side has its own cadence (e.g. a
    /// database task polled every 5 s for 15 min) pass that cadence here so an
    /// empty settings file keeps it.
    pub fn timing_or(&self, name: &str, fallback: Timing) -> Timing {
        let base = self.defaults.apply(fallback);
        match self.profiles.get(name) {
            Some(profile) => profile.apply(base),
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_use_builtin_defaults() {
        let settings = WaitSettings::default();
        assert_eq!(settings.timing("anything"), Timing::default());
    }

    #[test]
    fn test_profile_overrides_defaults() {
        let settings = WaitSettings::from_yaml(
            r#"
defaults:
  timeout_secs: 300
profiles:
  subnet_create:
    stability: 3
    min_interval_secs: 5
"#,
        )
        .unwrap();

        let timing = settings.timing("subnet_create");
        assert_eq!(timing.timeout, Duration::from_secs(300));
        assert_eq!(timing.min_poll_interval, Duration::from_secs(5));
        assert_eq!(timing.initial_delay, Duration::from_secs(10));
        assert_eq!(timing.stability, 3);

        let other = settings.timing("instance_create");
        assert_eq!(other.timeout, Duration::from_secs(300));
        assert_eq!(other.stability, 1);
    }

    #[test]
    fn test_timing_or_keeps_fallback_for_unset_fields() {
        let fallback = Timing::new(Duration::from_secs(900))
            .with_initial_delay(Duration::from_secs(5))
            .with_min_poll_interval(Duration::from_secs(5));
        let settings = WaitSettings::from_yaml("profiles:\n  database_task:\n    timeout_secs: 1200\n").unwrap();

        let timing = settings.timing_or("database_task", fallback);
        assert_eq!(timing.timeout, Duration::from_secs(1200));
        assert_eq!(timing.min_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = WaitSettings::from_yaml("defaults:\n  timeout: 30\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_stability_is_invalid() {
        let settings = WaitSettings::from_yaml("profiles:\n  flaky:\n    stability: 0\n").unwrap();
        match settings.validate() {
            Err(ConfigError::InvalidProfile { profile, .. }) => assert_eq!(profile, "flaky"),
            other => panic!("expected InvalidProfile, got {:?}", other),
        }
    }
}
