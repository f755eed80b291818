//! Controller Configuration

use std::fmt;
use std::time::Duration;

use fos_dom::EventType;
use serde::{Deserialize, Serialize};

use crate::VolumeError;

/// Default desired volume on page load (percent)
pub const DEFAULT_VOLUME: u32 = 100;

/// Default DOM watcher debounce window
pub const DEFAULT_DEBOUNCE_MS: u64 = 180;

/// Highest selectable volume, per product variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum VolumeCeiling {
    /// 100%: attenuation only
    Unity,
    /// 200%
    Double,
    /// 400%
    Quadruple,
    /// 600%
    #[default]
    Sextuple,
}

impl VolumeCeiling {
    pub const fn percent(self) -> u32 {
        match self {
            Self::Unity => 100,
            Self::Double => 200,
            Self::Quadruple => 400,
            Self::Sextuple => 600,
        }
    }
}

impl TryFrom<u32> for VolumeCeiling {
    type Error = VolumeError;

    fn try_from(percent: u32) -> Result<Self, Self::Error> {
        match percent {
            100 => Ok(Self::Unity),
            200 => Ok(Self::Double),
            400 => Ok(Self::Quadruple),
            600 => Ok(Self::Sextuple),
            other => Err(VolumeError::InvalidConfig(format!(
                "ceiling must be 100, 200, 400 or 600, got {other}"
            ))),
        }
    }
}

impl From<VolumeCeiling> for u32 {
    fn from(ceiling: VolumeCeiling) -> Self {
        ceiling.percent()
    }
}

impl fmt::Display for VolumeCeiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Volume controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeConfig {
    /// Highest volume a set-volume request can reach
    pub ceiling: VolumeCeiling,

    /// Desired volume before the first set-volume request
    pub default_volume: u32,

    /// Quiet period the DOM watcher waits for before re-applying
    pub debounce_ms: u64,

    /// Input events that may unlock a suspended audio context
    pub gesture_events: Vec<EventType>,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            ceiling: VolumeCeiling::default(),
            default_volume: DEFAULT_VOLUME,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            gesture_events: vec![
                EventType::PointerDown,
                EventType::MouseDown,
                EventType::KeyDown,
                EventType::TouchEnd,
            ],
        }
    }
}

impl VolumeConfig {
    /// Configuration for a ceiling variant, other settings default
    pub fn with_ceiling(ceiling: VolumeCeiling) -> Self {
        Self {
            ceiling,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration. Missing fields take
    /// their defaults.
    pub fn from_json(json: &str) -> Result<Self, VolumeError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| VolumeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VolumeError> {
        if self.default_volume > self.ceiling.percent() {
            return Err(VolumeError::InvalidConfig(format!(
                "default volume {} exceeds ceiling {}",
                self.default_volume, self.ceiling
            )));
        }
        if !(1..=5000).contains(&self.debounce_ms) {
            return Err(VolumeError::InvalidConfig(format!(
                "debounce must be within 1..=5000 ms, got {}",
                self.debounce_ms
            )));
        }
        if let Some(event) = self.gesture_events.iter().find(|e| !e.is_activation_triggering()) {
            return Err(VolumeError::InvalidConfig(format!(
                "{event} cannot unlock audio playback"
            )));
        }
        if self.gesture_events.is_empty() {
            return Err(VolumeError::InvalidConfig("no gesture events configured".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Clamp a requested volume into `[0, ceiling]`, rounding to the
    /// nearest integer percent. NaN maps to 0.
    pub fn clamp_volume(&self, requested: f64) -> u32 {
        if requested.is_nan() {
            return 0;
        }
        requested.round().clamp(0.0, self.ceiling.percent() as f64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = VolumeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ceiling.percent(), 600);
        assert_eq!(config.debounce(), Duration::from_millis(180));
    }

    #[test]
    fn test_from_json() {
        let config = VolumeConfig::from_json(r#"{"ceiling": 200, "debounce_ms": 150}"#).unwrap();
        assert_eq!(config.ceiling, VolumeCeiling::Double);
        assert_eq!(config.debounce_ms, 150);
        assert_eq!(config.default_volume, DEFAULT_VOLUME);

        let config = VolumeConfig::from_json(r#"{"gesture_events": ["keydown"]}"#).unwrap();
        assert_eq!(config.gesture_events, vec![EventType::KeyDown]);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(VolumeConfig::from_json(r#"{"ceiling": 300}"#).is_err());
        assert!(VolumeConfig::from_json(r#"{"ceiling": 100, "default_volume": 150}"#).is_err());
        assert!(VolumeConfig::from_json(r#"{"debounce_ms": 0}"#).is_err());
        assert!(VolumeConfig::from_json(r#"{"gesture_events": ["play"]}"#).is_err());
        assert!(VolumeConfig::from_json(r#"{"gesture_events": []}"#).is_err());
        assert!(VolumeConfig::from_json(r#"{"volume": 5}"#).is_err());
    }

    #[test]
    fn test_clamp_volume() {
        let config = VolumeConfig::with_ceiling(VolumeCeiling::Quadruple);
        assert_eq!(config.clamp_volume(-20.0), 0);
        assert_eq!(config.clamp_volume(149.6), 150);
        assert_eq!(config.clamp_volume(1000.0), 400);
        assert_eq!(config.clamp_volume(f64::NAN), 0);
        assert_eq!(config.clamp_volume(f64::INFINITY), 400);
    }
}
