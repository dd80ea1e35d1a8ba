//! Wizard configuration.
//!
//! Bundles the sub-component configurations into a single package, loadable
//! from TOML. Every field has a default so a partial file (or none at all)
//! yields the reference tuning: 200ms sampling, 0.045 stability threshold,
//! 1500ms hold, a 2-step countdown at 500ms per step.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::auto_capture::AutoCaptureConfig;
use crate::error::WizardError;
use crate::stability::StabilityConfig;
use crate::types::CaptureOptions;

/// Top-level wizard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    /// Interval requested from the motion source (milliseconds).
    pub sample_interval_ms: u64,

    /// Stability detector tuning.
    pub stability: StabilityConfig,

    /// Countdown tuning.
    pub auto_capture: AutoCaptureConfig,

    /// Options passed to the camera on every capture.
    pub capture: CaptureOptions,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 200,
            stability: StabilityConfig::default(),
            auto_capture: AutoCaptureConfig::default(),
            capture: CaptureOptions::default(),
        }
    }
}

impl WizardConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self, WizardError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, WizardError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, WizardError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every value is usable.
    ///
    /// # Errors
    ///
    /// Returns `WizardError::InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> Result<(), WizardError> {
        if self.sample_interval_ms == 0 {
            return Err(WizardError::invalid_config("sample_interval_ms must be > 0"));
        }
        let threshold = self.stability.threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(WizardError::invalid_config(format!(
                "stability.threshold must be a positive number, got {threshold}"
            )));
        }
        if self.auto_capture.countdown_start == 0 {
            return Err(WizardError::invalid_config(
                "auto_capture.countdown_start must be >= 1",
            ));
        }
        if self.auto_capture.tick_interval_ms == 0 {
            return Err(WizardError::invalid_config(
                "auto_capture.tick_interval_ms must be > 0",
            ));
        }
        let quality = self.capture.quality;
        if !(0.0..=1.0).contains(&quality) {
            return Err(WizardError::invalid_config(format!(
                "capture.quality must be within [0, 1], got {quality}"
            )));
        }
        Ok(())
    }
}
