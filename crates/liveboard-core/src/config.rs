//! Board configuration.

use crate::layer::Rgb;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of live layers on a board.
pub const DEFAULT_MAX_LAYERS: usize = 100;
/// Width and height of a freshly inserted layer.
pub const DEFAULT_LAYER_SIZE: f64 = 100.0;
/// Maximum number of undo steps to keep.
pub const DEFAULT_MAX_UNDO_STEPS: usize = 100;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

/// Tunables for a board session. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Inserts beyond this many layers are ignored.
    pub max_layers: usize,
    /// Side length of layers placed with an insert tool.
    pub default_layer_size: f64,
    /// Oldest undo steps are dropped past this depth.
    pub max_undo_steps: usize,
    /// Pointer travel (canvas units) before a press on empty canvas becomes a marquee.
    pub selection_net_threshold: f64,
    /// Minimum distance between consecutive pencil points.
    pub pencil_min_distance: f64,
    /// Strokes with fewer points are discarded.
    pub min_path_points: usize,
    /// Fill used until the user picks a color.
    pub initial_fill: Rgb,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_layers: DEFAULT_MAX_LAYERS,
            default_layer_size: DEFAULT_LAYER_SIZE,
            max_undo_steps: DEFAULT_MAX_UNDO_STEPS,
            selection_net_threshold: 5.0,
            pencil_min_distance: 1.0,
            min_path_points: 2,
            initial_fill: Rgb::black(),
        }
    }
}

impl BoardConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_layers == 0 {
            return Err(ConfigError::Invalid {
                field: "max_layers",
                reason: "must be at least 1",
            });
        }
        if !(self.default_layer_size.is_finite() && self.default_layer_size > 0.0) {
            return Err(ConfigError::Invalid {
                field: "default_layer_size",
                reason: "must be a positive number",
            });
        }
        if [self.selection_net_threshold, self.pencil_min_distance]
            .iter()
            .any(|x| !(x.is_finite() && *x >= 0.0))
        {
            return Err(ConfigError::Invalid {
                field: "thresholds",
                reason: "must be a non-negative number",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BoardConfig::default();
        assert_eq!(config.max_layers, 100);
        assert!((config.default_layer_size - 100.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = BoardConfig::from_json(r#"{ "max_layers": 3 }"#).expect("Failed to parse");
        assert_eq!(config.max_layers, 3);
        assert_eq!(config.max_undo_steps, DEFAULT_MAX_UNDO_STEPS);
    }

    #[test]
    fn test_rejects_zero_cap() {
        let err = BoardConfig::from_json(r#"{ "max_layers": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_layers", .. }));
    }

    #[test]
    fn test_rejects_nan_thresholds() {
        let config = BoardConfig {
            selection_net_threshold: f64::NAN,
            ..BoardConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "thresholds", .. })));

        let config = BoardConfig {
            pencil_min_distance: f64::INFINITY,
            ..BoardConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(BoardConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(matches!(BoardConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
