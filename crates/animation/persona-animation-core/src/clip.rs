//! Animation clips and sampling.
//!
//! A clip is a set of scalar keyframe tracks, one per channel (bone or
//! morph target). Keyframe times are in seconds within `[0, duration]`;
//! sampling is linear between keys and holds the end keys outside them.

use persona_host_core::{lerp_f32, HostError, Pose, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipTrack {
    pub channel: String,
    pub keys: Vec<Keyframe>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub name: String,
    /// Seconds. Zero marks a static pose.
    pub duration: f32,
    pub tracks: Vec<ClipTrack>,
    /// Pose subtracted from samples when the clip plays in an additive layer.
    /// Missing channels read as 0, so by default clip values are deltas.
    #[serde(default)]
    pub reference: Option<Pose>,
}

impl Clip {
    pub fn new(name: impl Into<String>, duration: f32) -> Self {
        Self {
            name: name.into(),
            duration,
            tracks: Vec::new(),
            reference: None,
        }
    }

    /// A zero-length clip that always samples to `pose`.
    pub fn constant(name: impl Into<String>, pose: &Pose) -> Self {
        let tracks = pose
            .iter()
            .map(|(channel, value)| ClipTrack {
                channel: channel.to_string(),
                keys: vec![Keyframe { time: 0.0, value }],
            })
            .collect();
        Self {
            name: name.into(),
            duration: 0.0,
            tracks,
            reference: None,
        }
    }

    /// Append a track from `(time, value)` pairs.
    pub fn with_track(mut self, channel: impl Into<String>, keys: &[(f32, f32)]) -> Self {
        self.tracks.push(ClipTrack {
            channel: channel.into(),
            keys: keys
                .iter()
                .map(|&(time, value)| Keyframe { time, value })
                .collect(),
        });
        self
    }

    pub fn with_reference(mut self, reference: Pose) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Check finite, non-negative duration and ordered keys inside the clip.
    pub fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(HostError::Parse {
                reason: format!("clip '{}' has invalid duration {}", self.name, self.duration),
            });
        }
        for track in &self.tracks {
            let mut last = f32::NEG_INFINITY;
            for key in &track.keys {
                if !key.time.is_finite() || !key.value.is_finite() {
                    return Err(HostError::Parse {
                        reason: format!(
                            "clip '{}' track '{}' has a non-finite key",
                            self.name, track.channel
                        ),
                    });
                }
                if key.time < last || key.time > self.duration {
                    return Err(HostError::Parse {
                        reason: format!(
                            "clip '{}' track '{}' keys must be ordered within [0, {}]",
                            self.name, track.channel, self.duration
                        ),
                    });
                }
                last = key.time;
            }
        }
        Ok(())
    }

    /// Channels this clip animates, in track order.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.tracks
            .iter()
            .filter(|t| !t.keys.is_empty())
            .map(|t| t.channel.as_str())
    }

    pub fn sample(&self, time: f32) -> Pose {
        self.tracks
            .iter()
            .filter(|t| !t.keys.is_empty())
            .map(|t| (t.channel.as_str(), sample_track(t, time)))
            .collect()
    }

    /// `sample(time) - reference`, used by additive layers.
    pub fn sample_delta(&self, time: f32) -> Pose {
        let mut pose = self.sample(time);
        if let Some(reference) = &self.reference {
            pose.add_scaled(reference, -1.0);
        }
        pose
    }
}

/// Sample a single track at `time` seconds.
pub fn sample_track(track: &ClipTrack, time: f32) -> f32 {
    let keys = &track.keys;
    let n = keys.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 || time <= keys[0].time {
        return keys[0].value;
    }
    if time >= keys[n - 1].time {
        return keys[n - 1].value;
    }
    // First key strictly after `time`; keys are ordered so the segment is [i-1, i].
    let i = keys.partition_point(|k| k.time <= time);
    let (left, right) = (keys[i - 1], keys[i]);
    let span = (right.time - left.time).max(f32::EPSILON);
    lerp_f32(left.value, right.value, ((time - left.time) / span).clamp(0.0, 1.0))
}
