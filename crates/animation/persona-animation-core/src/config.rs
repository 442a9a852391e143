//! Configuration for animation features, layers and play requests.

use serde::{Deserialize, Serialize};

use crate::easing::Easing;

/// How a layer combines its states and how it lands on the layers beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Weighted replacement; state weights within the layer sum to at most 1.
    #[default]
    Override,
    /// Weighted deltas summed onto the result below.
    Additive,
}

/// Feature-wide defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Cross-fade duration in seconds when a play request does not specify one.
    pub transition_duration: f32,
    pub easing: Easing,
    /// Per-state weight clamp applied in additive layers.
    pub additive_range: [f32; 2],
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            transition_duration: 0.5,
            easing: Easing::QuadraticInOut,
            additive_range: [0.0, 1.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerOptions {
    #[serde(default)]
    pub blend_mode: BlendMode,
    /// Layer influence in [0,1].
    #[serde(default = "default_layer_weight")]
    pub weight: f32,
    /// Overrides `AnimationConfig::additive_range` for this layer.
    #[serde(default)]
    pub additive_range: Option<[f32; 2]>,
}

fn default_layer_weight() -> f32 {
    1.0
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::Override,
            weight: 1.0,
            additive_range: None,
        }
    }
}

impl LayerOptions {
    pub fn additive() -> Self {
        Self {
            blend_mode: BlendMode::Additive,
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    #[inline]
    pub fn with_additive_range(mut self, min: f32, max: f32) -> Self {
        self.additive_range = Some([min.min(max), max.max(min)]);
        self
    }
}

/// Options for `play_animation`; unset fields fall back to the state and config.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayOptions {
    #[serde(default)]
    pub looping: Option<bool>,
    #[serde(default)]
    pub transition_duration: Option<f32>,
    #[serde(default)]
    pub easing: Option<Easing>,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_loop(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    #[inline]
    pub fn with_transition(mut self, seconds: f32) -> Self {
        self.transition_duration = Some(seconds);
        self
    }

    #[inline]
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }
}
