//! Tunables for viseme scheduling.

use persona_animation_core::Easing;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VISEME_LAYER: &str = "Viseme";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipsyncConfig {
    /// Seconds to cross-fade from the current mouth shape to a new viseme.
    pub blend_duration: f32,
    pub easing: Easing,
    /// Seconds to ease back to neutral when a hold ends or playback stops.
    pub neutral_duration: f32,
    /// How long the last mark holds when it carries no duration.
    pub trailing_hold_ms: f64,
    /// Clock jumps beyond the tick length plus this are treated as seeks.
    pub seek_tolerance_ms: f64,
    pub layer_name: String,
}

impl Default for LipsyncConfig {
    fn default() -> Self {
        Self {
            blend_duration: 0.08,
            easing: Easing::QuadraticInOut,
            neutral_duration: 0.15,
            trailing_hold_ms: 150.0,
            seek_tolerance_ms: 100.0,
            layer_name: DEFAULT_VISEME_LAYER.to_string(),
        }
    }
}

impl LipsyncConfig {
    #[inline]
    pub fn with_blend_duration(mut self, seconds: f32) -> Self {
        self.blend_duration = seconds;
        self
    }

    #[inline]
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    #[inline]
    pub fn with_neutral_duration(mut self, seconds: f32) -> Self {
        self.neutral_duration = seconds;
        self
    }

    #[inline]
    pub fn with_layer_name(mut self, name: impl Into<String>) -> Self {
        self.layer_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: LipsyncConfig = serde_json::from_str(r#"{"blend_duration":0.05}"#).unwrap();
        assert_eq!(cfg.blend_duration, 0.05);
        assert_eq!(cfg.layer_name, "Viseme");
        assert_eq!(cfg.trailing_hold_ms, 150.0);
    }
}
