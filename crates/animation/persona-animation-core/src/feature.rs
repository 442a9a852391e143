//! AnimationFeature: owns the layers of a host and composes them each tick.

use std::any::Any;

use indexmap::IndexMap;
use log::{debug, warn};
use persona_host_core::{
    Deferred, Feature, FeatureCore, FeatureState, HostError, Pose, Result,
};
use serde_json::json;

use crate::blend::compose_layer;
use crate::clip::Clip;
use crate::config::{AnimationConfig, LayerOptions, PlayOptions};
use crate::layer::{unique_name, AnimationLayer, Completion, LayerSignal};
use crate::state::AnimationState;

pub const ANIMATION_FEATURE_NAME: &str = "AnimationFeature";

pub const ANIMATION_PLAY_EVENT: &str = "animation.play";
pub const ANIMATION_STOP_EVENT: &str = "animation.stop";
pub const ANIMATION_PAUSE_EVENT: &str = "animation.pause";
pub const ANIMATION_RESUME_EVENT: &str = "animation.resume";
pub const ANIMATION_INTERRUPT_EVENT: &str = "animation.interrupt";
pub const ANIMATION_FINISHED_EVENT: &str = "animation.finished";

#[derive(Debug)]
pub struct AnimationFeature {
    core: FeatureCore,
    config: AnimationConfig,
    layers: IndexMap<String, AnimationLayer>,
    pose: Pose,
}

impl Default for AnimationFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationFeature {
    pub fn new() -> Self {
        Self::with_config(AnimationConfig::default())
    }

    pub fn with_config(config: AnimationConfig) -> Self {
        Self::named(ANIMATION_FEATURE_NAME, config)
    }

    /// Used by features that build on animation under their own name.
    pub fn named(name: impl Into<String>, config: AnimationConfig) -> Self {
        Self {
            core: FeatureCore::new(name),
            config,
            layers: IndexMap::new(),
            pose: Pose::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    fn ensure_usable(&self, operation: &str) -> Result<()> {
        if self.core.state() == FeatureState::Discarded {
            return Err(HostError::invalid_state(
                operation,
                format!("feature '{}' has been discarded", self.core.name()),
            ));
        }
        Ok(())
    }

    fn layer_ref(&self, layer: &str) -> Result<&AnimationLayer> {
        self.layers
            .get(layer)
            .ok_or_else(|| HostError::not_found("layer", layer))
    }

    fn layer_mut(&mut self, layer: &str) -> Result<&mut AnimationLayer> {
        self.layers
            .get_mut(layer)
            .ok_or_else(|| HostError::not_found("layer", layer))
    }

    fn emit_interrupt(&self, layer: &str, interrupted: Option<Option<String>>) {
        if let Some(state) = interrupted {
            self.core
                .emit(ANIMATION_INTERRUPT_EVENT, json!({ "layer": layer, "state": state }));
        }
    }

    /// Append a layer. A taken name gets a numeric suffix; the name used is returned.
    pub fn add_layer(&mut self, name: &str, options: LayerOptions) -> Result<String> {
        self.ensure_usable("add_layer")?;
        let assigned = unique_name(name, |n| self.layers.contains_key(n));
        if assigned != name {
            warn!(
                "{}: layer '{}' already exists, adding as '{}'",
                self.core.name(),
                name,
                assigned
            );
        }
        let layer = AnimationLayer::new(assigned.clone(), options, &self.config);
        self.layers.insert(assigned.clone(), layer);
        Ok(assigned)
    }

    /// Remove a layer, cancelling whatever request it had pending.
    pub fn remove_layer(&mut self, name: &str) -> Result<()> {
        self.ensure_usable("remove_layer")?;
        let mut layer = self
            .layers
            .shift_remove(name)
            .ok_or_else(|| HostError::not_found("layer", name))?;
        let interrupted = layer.cancel_pending();
        self.emit_interrupt(name, interrupted);
        Ok(())
    }

    pub fn layer(&self, name: &str) -> Option<&AnimationLayer> {
        self.layers.get(name)
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(|k| k.as_str())
    }

    pub fn set_layer_weight(&mut self, layer: &str, weight: f32) -> Result<()> {
        self.ensure_usable("set_layer_weight")?;
        self.layer_mut(layer)?.set_weight(weight);
        Ok(())
    }

    /// Add a state backed by `clip`. Returns the name used inside the layer.
    pub fn add_state(
        &mut self,
        layer: &str,
        name: &str,
        clip: Clip,
        looping: bool,
    ) -> Result<String> {
        self.ensure_usable("add_state")?;
        clip.validate()?;
        let target = self.layer_mut(layer)?;
        let assigned = target.add_state(AnimationState::new(name, clip, looping));
        debug!("layer '{}': added state '{}'", layer, assigned);
        Ok(assigned)
    }

    pub fn remove_state(&mut self, layer: &str, state: &str) -> Result<()> {
        self.ensure_usable("remove_state")?;
        self.layer_mut(layer)?.remove_state(state)?;
        Ok(())
    }

    /// Cross-fade `layer` to `state`. The Deferred resolves when the fade
    /// completes (looping) or when playback reaches the clip end (one-shot).
    pub fn play_animation(
        &mut self,
        layer: &str,
        state: &str,
        options: PlayOptions,
    ) -> Result<Deferred<Completion>> {
        self.ensure_usable("play_animation")?;
        let config = self.config.clone();
        let (deferred, interrupted) = self.layer_mut(layer)?.play(state, &options, &config)?;
        self.emit_interrupt(layer, interrupted);
        self.core
            .emit(ANIMATION_PLAY_EVENT, json!({ "layer": layer, "state": state }));
        Ok(deferred)
    }

    /// Fade the layer out over `fade` seconds (0 when `None`).
    pub fn stop_animation(&mut self, layer: &str, fade: Option<f32>) -> Result<Deferred<Completion>> {
        self.ensure_usable("stop_animation")?;
        let easing = self.config.easing;
        let target = self.layer_mut(layer)?;
        let stopping = target.current_state().map(str::to_string);
        let (deferred, interrupted) = target.stop(fade.unwrap_or(0.0), easing);
        self.emit_interrupt(layer, interrupted);
        self.core
            .emit(ANIMATION_STOP_EVENT, json!({ "layer": layer, "state": stopping }));
        Ok(deferred)
    }

    pub fn pause_animation(&mut self, layer: &str) -> Result<bool> {
        self.ensure_usable("pause_animation")?;
        let changed = self.layer_mut(layer)?.pause();
        if changed {
            self.core.emit(ANIMATION_PAUSE_EVENT, json!({ "layer": layer }));
        }
        Ok(changed)
    }

    pub fn resume_animation(&mut self, layer: &str) -> Result<bool> {
        self.ensure_usable("resume_animation")?;
        let changed = self.layer_mut(layer)?.resume();
        if changed {
            self.core.emit(ANIMATION_RESUME_EVENT, json!({ "layer": layer }));
        }
        Ok(changed)
    }

    /// Direct weight control, bypassing transitions.
    pub fn set_state_weight(&mut self, layer: &str, state: &str, weight: f32) -> Result<()> {
        self.ensure_usable("set_state_weight")?;
        self.layer_mut(layer)?.set_state_weight(state, weight)
    }

    pub fn current_state(&self, layer: &str) -> Result<Option<&str>> {
        Ok(self.layer_ref(layer)?.current_state())
    }

    pub fn state_weight(&self, layer: &str, state: &str) -> Result<f32> {
        self.layer_ref(layer)?
            .state(state)
            .map(AnimationState::weight)
            .ok_or_else(|| HostError::not_found("state", format!("{layer}/{state}")))
    }

    pub fn is_transitioning(&self, layer: &str) -> Result<bool> {
        Ok(self.layer_ref(layer)?.is_transitioning())
    }

    pub fn is_paused(&self, layer: &str) -> Result<bool> {
        Ok(self.layer_ref(layer)?.is_paused())
    }

    /// Composed result of the last tick.
    #[inline]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Advance every layer and recompose, without the lifecycle check.
    fn step(&mut self, dt: f32) {
        let mut signals = Vec::new();
        for layer in self.layers.values_mut() {
            if let Some(signal) = layer.update(dt) {
                signals.push(signal);
            }
        }

        self.pose.clear();
        for layer in self.layers.values() {
            compose_layer(&mut self.pose, &layer.resolve());
        }

        for signal in signals {
            match signal {
                LayerSignal::Finished(completion) => {
                    self.core.emit(ANIMATION_FINISHED_EVENT, json!(completion));
                }
                LayerSignal::Stopped(completion) => {
                    debug!(
                        "layer '{}': stop fade complete for {:?}",
                        completion.layer, completion.state
                    );
                }
            }
        }
    }
}

impl Feature for AnimationFeature {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FeatureCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_discard(&mut self) {
        for (name, layer) in self.layers.iter_mut() {
            if layer.cancel_pending().is_some() {
                debug!("{}: cancelled pending request on '{}'", self.core.name(), name);
            }
        }
    }

    fn updated(&mut self, dt: f32) -> Result<()> {
        self.step(dt);
        Ok(())
    }

    fn output(&self) -> Option<&Pose> {
        Some(&self.pose)
    }
}
