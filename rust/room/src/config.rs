// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Evaluator configuration loaded from environment variables.

use crate::capture::CaptureKind;
use crate::scene::Color;

/// Action-space evaluation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Device kinds whose ranges count as coverage.
    pub capture_kinds: Vec<CaptureKind>,
    /// Color of the occluded part of a zone.
    pub occluded_tint: Color,
    /// Minimum triangle area kept in boolean results; also the floor for a
    /// capture range's volume.
    pub csg_epsilon: f64,
    /// Drop the previous result when no capture device remains.
    pub clear_stale_on_empty: bool,
}

impl EvaluatorConfig {
    pub const DEFAULT_OCCLUDED_TINT: Color = Color::new(0.6, 0.6, 0.6);
    pub const DEFAULT_CSG_EPSILON: f64 = 1e-9;

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let capture_kinds = lookup("STAGE_CAPTURE_KINDS")
            .map(|value| {
                value
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .filter_map(|s| {
                        let kind = CaptureKind::parse(s);
                        if kind.is_none() {
                            tracing::warn!(kind = s.trim(), "ignoring unknown capture kind");
                        }
                        kind
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or(defaults.capture_kinds);

        let occluded_tint = lookup("STAGE_OCCLUDED_TINT")
            .and_then(|value| parse_color(&value))
            .unwrap_or(defaults.occluded_tint);

        let csg_epsilon = lookup("STAGE_CSG_EPSILON")
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|eps| eps.is_finite() && *eps > 0.0)
            .unwrap_or(defaults.csg_epsilon);

        let clear_stale_on_empty = lookup("STAGE_CLEAR_STALE_RESULT")
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.clear_stale_on_empty);

        Self {
            capture_kinds,
            occluded_tint,
            csg_epsilon,
            clear_stale_on_empty,
        }
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            capture_kinds: CaptureKind::ALL.to_vec(),
            occluded_tint: Self::DEFAULT_OCCLUDED_TINT,
            csg_epsilon: Self::DEFAULT_CSG_EPSILON,
            clear_stale_on_empty: false,
        }
    }
}

/// `"r,g,b"` floats in 0..=1, or `#RRGGBB` / `0xRRGGBB`.
fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if let Some(hex) = value
        .strip_prefix('#')
        .or_else(|| value.strip_prefix("0x"))
    {
        return u32::from_str_radix(hex, 16).ok().map(Color::from_hex);
    }

    let parts: Vec<f32> = value
        .split(',')
        .map(|s| s.trim().parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [r, g, b] => Some(Color::new(*r, *g, *b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn config_from(pairs: &[(&str, &str)]) -> EvaluatorConfig {
        let vars: FxHashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EvaluatorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, EvaluatorConfig::default());
        assert_eq!(config.capture_kinds, vec![CaptureKind::Camera, CaptureKind::DepthSensor]);
        assert!(!config.clear_stale_on_empty);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("STAGE_CAPTURE_KINDS", "kinect, bogus"),
            ("STAGE_OCCLUDED_TINT", "#FF0000"),
            ("STAGE_CSG_EPSILON", "1e-6"),
            ("STAGE_CLEAR_STALE_RESULT", "true"),
        ]);
        assert_eq!(config.capture_kinds, vec![CaptureKind::DepthSensor]);
        assert_eq!(config.occluded_tint, Color::new(1.0, 0.0, 0.0));
        assert_eq!(config.csg_epsilon, 1e-6);
        assert!(config.clear_stale_on_empty);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("STAGE_OCCLUDED_TINT", "grey"),
            ("STAGE_CSG_EPSILON", "-1"),
        ]);
        assert_eq!(config.occluded_tint, EvaluatorConfig::DEFAULT_OCCLUDED_TINT);
        assert_eq!(config.csg_epsilon, EvaluatorConfig::DEFAULT_CSG_EPSILON);
    }

    #[test]
    fn test_rgb_triplet() {
        assert_eq!(parse_color("0.2, 0.4,0.6"), Some(Color::new(0.2, 0.4, 0.6)));
        assert_eq!(parse_color("0.2,0.4"), None);
    }
}
