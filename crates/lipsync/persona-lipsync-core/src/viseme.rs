//! Viseme identifiers and their blend-shape targets.

use indexmap::IndexMap;
use persona_host_core::{HostError, Pose, Result};
use serde::{Deserialize, Serialize};

/// Canonical viseme ids in the order the default map lists them.
pub const DEFAULT_VISEMES: [&str; 15] = [
    "sil", "PP", "FF", "TH", "DD", "KK", "CH", "SS", "nn", "RR", "AA", "E", "IH", "OH", "OU",
];

/// Polly viseme symbols mapped onto canonical ids.
pub fn polly_alias(symbol: &str) -> Option<&'static str> {
    Some(match symbol {
        "p" => "PP",
        "f" => "FF",
        "T" => "TH",
        "t" => "DD",
        "k" => "KK",
        "S" => "CH",
        "s" => "SS",
        "r" => "RR",
        "a" | "@" => "AA",
        "e" | "E" => "E",
        "i" => "IH",
        "o" | "O" => "OH",
        "u" => "OU",
        "sil" => "sil",
        _ => return None,
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendTarget {
    pub blend_shape: String,
    #[serde(default = "full_intensity")]
    pub intensity: f32,
}

fn full_intensity() -> f32 {
    1.0
}

impl BlendTarget {
    pub fn new(blend_shape: impl Into<String>, intensity: f32) -> Self {
        Self {
            blend_shape: blend_shape.into(),
            intensity,
        }
    }
}

/// Viseme id → blend-shape targets. Iterates in insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisemeMap {
    entries: IndexMap<String, Vec<BlendTarget>>,
}

impl Default for VisemeMap {
    /// `viseme_<id>` at full intensity for every canonical id; `sil` is empty.
    fn default() -> Self {
        let entries = DEFAULT_VISEMES
            .iter()
            .map(|id| {
                let targets = if *id == "sil" {
                    Vec::new()
                } else {
                    vec![BlendTarget::new(format!("viseme_{id}"), 1.0)]
                };
                (id.to_string(), targets)
            })
            .collect();
        Self { entries }
    }
}

impl VisemeMap {
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let map: Self = serde_json::from_str(text)?;
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<()> {
        for (id, targets) in &self.entries {
            if id.is_empty() {
                return Err(HostError::Parse {
                    reason: "viseme map contains an empty id".into(),
                });
            }
            if let Some(bad) = targets.iter().find(|t| !t.intensity.is_finite()) {
                return Err(HostError::Parse {
                    reason: format!("viseme '{id}' target '{}' has a non-finite intensity", bad.blend_shape),
                });
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, id: impl Into<String>, targets: Vec<BlendTarget>) {
        self.entries.insert(id.into(), targets);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn targets(&self, id: &str) -> Option<&[BlendTarget]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    /// Canonical id for `viseme`: the id itself if mapped, else its Polly alias.
    pub fn resolve(&self, viseme: &str) -> Option<&str> {
        if let Some((id, _)) = self.entries.get_key_value(viseme) {
            return Some(id.as_str());
        }
        let alias = polly_alias(viseme)?;
        self.entries.get_key_value(alias).map(|(id, _)| id.as_str())
    }

    /// Blend-shape weights for `id` at full viseme weight.
    pub fn pose(&self, id: &str) -> Pose {
        let mut pose = Pose::new();
        for target in self.targets(id).unwrap_or_default() {
            let w = pose.weight(&target.blend_shape) + target.intensity;
            pose.set(target.blend_shape.as_str(), w);
        }
        pose
    }
}
