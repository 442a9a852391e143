//! Channel weights produced by features each tick.
//!
//! A `Pose` maps a bone or morph-target channel name to a scalar weight.
//! Iteration follows insertion order so host output is reproducible across
//! runs given identical inputs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Linear interpolation for f32
#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose {
    channels: IndexMap<String, f32>,
}

impl Pose {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, channel: &str) -> Option<f32> {
        self.channels.get(channel).copied()
    }

    /// Weight of `channel`, treating missing channels as neutral (0.0).
    #[inline]
    pub fn weight(&self, channel: &str) -> f32 {
        self.get(channel).unwrap_or(0.0)
    }

    #[inline]
    pub fn set(&mut self, channel: impl Into<String>, weight: f32) {
        self.channels.insert(channel.into(), weight);
    }

    pub fn remove(&mut self, channel: &str) -> Option<f32> {
        self.channels.shift_remove(channel)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(|k| k.as_str())
    }

    /// Move every channel of `self` toward `other` by `t`; channels missing on
    /// either side read as 0.0.
    pub fn lerp_toward(&mut self, other: &Pose, t: f32) {
        for (channel, target) in other.iter() {
            let entry = self.channels.entry(channel.to_string()).or_insert(0.0);
            *entry = lerp_f32(*entry, target, t);
        }
        for (channel, value) in self.channels.iter_mut() {
            if !other.channels.contains_key(channel) {
                *value = lerp_f32(*value, 0.0, t);
            }
        }
    }

    /// Add `other * scale` channel-wise.
    pub fn add_scaled(&mut self, other: &Pose, scale: f32) {
        if scale == 0.0 {
            return;
        }
        for (channel, value) in other.iter() {
            *self.channels.entry(channel.to_string()).or_insert(0.0) += value * scale;
        }
    }

    pub fn scaled(&self, scale: f32) -> Pose {
        self.iter().map(|(k, v)| (k.to_string(), v * scale)).collect()
    }

    /// Overwrite channels of `self` with every channel present in `other`.
    pub fn overlay(&mut self, other: &Pose) {
        for (channel, value) in other.iter() {
            self.set(channel, value);
        }
    }
}

impl FromIterator<(String, f32)> for Pose {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self {
            channels: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<(&'a str, f32)> for Pose {
    fn from_iter<I: IntoIterator<Item = (&'a str, f32)>>(iter: I) -> Self {
        iter.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}
