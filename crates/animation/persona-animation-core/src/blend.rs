//! Per-layer accumulation and cross-layer composition.
//!
//! Override layers combine their states as a running weighted average: each
//! state moves the layer result toward its pose by its share of the weight
//! accumulated so far, and the layer reports per-channel coverage (the summed
//! state weight). Additive layers sum weighted deltas.
//!
//! Layers are composed strictly in registration order onto the result of the
//! layers before them:
//! - override: `out = lerp(out, layer, layer_weight * coverage)`
//! - additive: `out += layer_weight * delta`

use persona_host_core::{lerp_f32, Pose};

use crate::config::BlendMode;

/// One layer's contribution for a tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerOutput {
    pub blend_mode: BlendMode,
    pub layer_weight: f32,
    /// Blended pose (override) or summed delta (additive).
    pub pose: Pose,
    /// Per-channel summed state weight, override layers only.
    pub coverage: Pose,
}

/// Running weighted average of state poses for an override layer.
#[derive(Debug, Default)]
pub struct OverrideAccumulator {
    pose: Pose,
    coverage: Pose,
}

impl OverrideAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: &Pose, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        for (channel, value) in sample.iter() {
            let accumulated = self.coverage.weight(channel);
            let total = accumulated + weight;
            let t = weight / total;
            let current = self.pose.get(channel).unwrap_or(value);
            self.pose.set(channel, lerp_f32(current, value, t));
            self.coverage.set(channel, total);
        }
    }

    pub fn finish(mut self, layer_weight: f32) -> LayerOutput {
        for channel in self.coverage.channels().map(str::to_string).collect::<Vec<_>>() {
            let w = self.coverage.weight(&channel);
            self.coverage.set(channel, w.min(1.0));
        }
        LayerOutput {
            blend_mode: BlendMode::Override,
            layer_weight,
            pose: self.pose,
            coverage: self.coverage,
        }
    }
}

/// Sum of weighted deltas for an additive layer.
#[derive(Debug, Default)]
pub struct AdditiveAccumulator {
    delta: Pose,
}

impl AdditiveAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, delta: &Pose, weight: f32) {
        self.delta.add_scaled(delta, weight);
    }

    /// Report `channels` even when nothing contributes to them, so a delta
    /// that fades out lands on 0 instead of vanishing from the output.
    pub fn register<'a>(&mut self, channels: impl IntoIterator<Item = &'a str>) {
        for channel in channels {
            if self.delta.get(channel).is_none() {
                self.delta.set(channel, 0.0);
            }
        }
    }

    pub fn finish(self, layer_weight: f32) -> LayerOutput {
        LayerOutput {
            blend_mode: BlendMode::Additive,
            layer_weight,
            pose: self.delta,
            coverage: Pose::new(),
        }
    }
}

/// Land `layer` on top of `out`.
pub fn compose_layer(out: &mut Pose, layer: &LayerOutput) {
    let layer_weight = layer.layer_weight.clamp(0.0, 1.0);
    if layer_weight <= 0.0 {
        return;
    }
    match layer.blend_mode {
        BlendMode::Override => {
            for (channel, value) in layer.pose.iter() {
                let t = layer_weight * layer.coverage.weight(channel);
                let below = out.weight(channel);
                out.set(channel, lerp_f32(below, value, t));
            }
        }
        BlendMode::Additive => out.add_scaled(&layer.pose, layer_weight),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) {
        assert!((a - b).abs() <= 1e-6, "left={a} right={b}");
    }

    fn pose(items: &[(&str, f32)]) -> Pose {
        items.iter().copied().collect()
    }

    #[test]
    fn override_cross_fade_is_weighted_average() {
        let mut acc = OverrideAccumulator::new();
        acc.add(&pose(&[("jaw", 0.0)]), 0.25);
        acc.add(&pose(&[("jaw", 1.0)]), 0.75);
        let out = acc.finish(1.0);
        approx(out.pose.weight("jaw"), 0.75);
        approx(out.coverage.weight("jaw"), 1.0);
    }

    #[test]
    fn partial_coverage_blends_with_layers_below() {
        let mut out = pose(&[("jaw", 1.0)]);
        let mut acc = OverrideAccumulator::new();
        acc.add(&pose(&[("jaw", 0.0)]), 0.5);
        compose_layer(&mut out, &acc.finish(1.0));
        approx(out.weight("jaw"), 0.5);
    }

    #[test]
    fn full_weight_override_replaces() {
        let mut out = pose(&[("jaw", 0.2), ("brow", 0.9)]);
        let mut acc = OverrideAccumulator::new();
        acc.add(&pose(&[("jaw", 0.7)]), 1.0);
        compose_layer(&mut out, &acc.finish(1.0));
        approx(out.weight("jaw"), 0.7);
        approx(out.weight("brow"), 0.9);
    }

    #[test]
    fn additive_sums_scaled_deltas() {
        let mut out = pose(&[("jaw", 0.2)]);
        let mut acc = AdditiveAccumulator::new();
        acc.add(&pose(&[("jaw", 0.4)]), 0.5);
        acc.add(&pose(&[("jaw", 0.2), ("lip", 1.0)]), 1.0);
        compose_layer(&mut out, &acc.finish(0.5));
        approx(out.weight("jaw"), 0.2 + 0.5 * (0.2 + 0.2));
        approx(out.weight("lip"), 0.5);
    }

    #[test]
    fn zero_layer_weight_is_ignored() {
        let mut out = pose(&[("jaw", 0.2)]);
        let mut acc = OverrideAccumulator::new();
        acc.add(&pose(&[("jaw", 1.0)]), 1.0);
        compose_layer(&mut out, &acc.finish(0.0));
        approx(out.weight("jaw"), 0.2);
    }
}
