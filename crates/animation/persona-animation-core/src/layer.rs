//! AnimationLayer: a named, weighted blend of states resolved once per tick.
//!
//! At most one transition is in flight per layer. Starting a new play or stop
//! request cancels the Deferred of the request it supersedes before the new
//! transition begins.

use indexmap::IndexMap;
use persona_host_core::{lerp_f32, Deferred, HostError, Result};
use serde::{Deserialize, Serialize};

use crate::blend::{AdditiveAccumulator, LayerOutput, OverrideAccumulator};
use crate::config::{AnimationConfig, BlendMode, LayerOptions, PlayOptions};
use crate::easing::{ease, transition_ratio, Easing};
use crate::state::AnimationState;

/// Resolved value of play and stop Deferreds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub layer: String,
    /// The state that reached steady state, or the state that was stopped.
    pub state: Option<String>,
}

/// Cross-fade in progress. A transition with no target fades everything out.
#[derive(Clone, Debug)]
pub struct Transition {
    target: Option<String>,
    target_from: f32,
    outgoing: Vec<(String, f32)>,
    elapsed: f32,
    duration: f32,
    easing: Easing,
}

impl Transition {
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn easing(&self) -> Easing {
        self.easing
    }

    /// Elapsed / duration in [0,1].
    pub fn ratio(&self) -> f32 {
        transition_ratio(self.elapsed, self.duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettleWhen {
    TransitionDone,
    PlaybackDone,
    Stopped,
}

#[derive(Debug)]
struct PendingRequest {
    deferred: Deferred<Completion>,
    when: SettleWhen,
    state: Option<String>,
}

/// Reported by `update` when a request reached its completion condition.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerSignal {
    Finished(Completion),
    Stopped(Completion),
}

#[derive(Debug)]
pub struct AnimationLayer {
    name: String,
    options: LayerOptions,
    additive_range: [f32; 2],
    states: IndexMap<String, AnimationState>,
    current: Option<String>,
    transition: Option<Transition>,
    pending: Option<PendingRequest>,
    paused: bool,
}

impl AnimationLayer {
    pub fn new(name: impl Into<String>, options: LayerOptions, config: &AnimationConfig) -> Self {
        let additive_range = options.additive_range.unwrap_or(config.additive_range);
        Self {
            name: name.into(),
            options,
            additive_range,
            states: IndexMap::new(),
            current: None,
            transition: None,
            pending: None,
            paused: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn blend_mode(&self) -> BlendMode {
        self.options.blend_mode
    }

    #[inline]
    pub fn weight(&self) -> f32 {
        self.options.weight
    }

    pub(crate) fn set_weight(&mut self, weight: f32) {
        self.options.weight = if weight.is_finite() {
            weight.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    #[inline]
    pub fn current_state(&self) -> Option<&str> {
        self.current.as_deref()
    }

    #[inline]
    pub fn transition(&self) -> Option<&Transition> {
        self.transition.as_ref()
    }

    #[inline]
    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self, name: &str) -> Option<&AnimationState> {
        self.states.get(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &AnimationState> {
        self.states.values()
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(|k| k.as_str())
    }

    fn state_not_found(&self, state: &str) -> HostError {
        HostError::not_found("state", format!("{}/{}", self.name, state))
    }

    /// Insert a state, suffixing the name if it is taken. Returns the name used.
    pub(crate) fn add_state(&mut self, mut state: AnimationState) -> String {
        let name = unique_name(state.name(), |n| self.states.contains_key(n));
        state.set_name(name.clone());
        self.states.insert(name.clone(), state);
        name
    }

    pub(crate) fn remove_state(&mut self, name: &str) -> Result<AnimationState> {
        let removed = self
            .states
            .shift_remove(name)
            .ok_or_else(|| self.state_not_found(name))?;
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        if let Some(transition) = &mut self.transition {
            transition.outgoing.retain(|(n, _)| n != name);
            if transition.target.as_deref() == Some(name) {
                self.transition = None;
            }
        }
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.state.as_deref() == Some(name))
        {
            self.cancel_pending();
        }
        Ok(removed)
    }

    /// Cancel the in-flight request, returning the state it was waiting on.
    pub(crate) fn cancel_pending(&mut self) -> Option<Option<String>> {
        self.pending.take().map(|p| {
            p.deferred.cancel();
            p.state
        })
    }

    /// Set a state weight directly. Cancels nothing; an active transition
    /// overwrites the weights it drives on the next tick.
    pub(crate) fn set_state_weight(&mut self, name: &str, weight: f32) -> Result<()> {
        let range = self.additive_range;
        let mode = self.options.blend_mode;
        let state = self
            .states
            .get_mut(name)
            .ok_or_else(|| HostError::not_found("state", name))?;
        let clamped = match mode {
            BlendMode::Override => weight.clamp(0.0, 1.0),
            BlendMode::Additive => weight.clamp(range[0], range[1]),
        };
        state.set_weight(clamped);
        Ok(())
    }

    /// Begin a cross-fade toward `state_name`.
    pub(crate) fn play(
        &mut self,
        state_name: &str,
        options: &PlayOptions,
        config: &AnimationConfig,
    ) -> Result<(Deferred<Completion>, Option<Option<String>>)> {
        if !self.states.contains_key(state_name) {
            return Err(self.state_not_found(state_name));
        }
        let interrupted = self.cancel_pending();

        let was_current = self.current.as_deref() == Some(state_name);
        let state = self
            .states
            .get_mut(state_name)
            .ok_or_else(|| HostError::not_found("state", state_name))?;
        let looping = options.looping.unwrap_or(state.is_looping());
        state.set_looping(looping);
        // A state fading out keeps its time when it is brought back.
        if was_current || !state.is_active() || state.is_finished() {
            state.rewind();
        }
        let target_from = state.weight();

        let outgoing = self
            .states
            .iter()
            .filter(|(name, s)| name.as_str() != state_name && s.is_active())
            .map(|(name, s)| (name.clone(), s.weight()))
            .collect();

        self.transition = Some(Transition {
            target: Some(state_name.to_string()),
            target_from,
            outgoing,
            elapsed: 0.0,
            duration: options
                .transition_duration
                .unwrap_or(config.transition_duration)
                .max(0.0),
            easing: options.easing.unwrap_or(config.easing),
        });
        self.current = Some(state_name.to_string());
        self.paused = false;

        let deferred = Deferred::new();
        self.pending = Some(PendingRequest {
            deferred: deferred.clone(),
            when: if looping {
                SettleWhen::TransitionDone
            } else {
                SettleWhen::PlaybackDone
            },
            state: Some(state_name.to_string()),
        });
        Ok((deferred, interrupted))
    }

    /// Fade every active state to 0 over `fade` seconds, then deactivate.
    pub(crate) fn stop(
        &mut self,
        fade: f32,
        easing: Easing,
    ) -> (Deferred<Completion>, Option<Option<String>>) {
        let interrupted = self.cancel_pending();
        let stopped = self.current.take();
        let outgoing: Vec<(String, f32)> = self
            .states
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(name, s)| (name.clone(), s.weight()))
            .collect();
        self.paused = false;

        let completion = Completion {
            layer: self.name.clone(),
            state: stopped.clone(),
        };
        if outgoing.is_empty() {
            self.transition = None;
            return (Deferred::resolved(completion), interrupted);
        }

        self.transition = Some(Transition {
            target: None,
            target_from: 0.0,
            outgoing,
            elapsed: 0.0,
            duration: if fade.is_finite() { fade.max(0.0) } else { 0.0 },
            easing,
        });
        let deferred = Deferred::new();
        self.pending = Some(PendingRequest {
            deferred: deferred.clone(),
            when: SettleWhen::Stopped,
            state: stopped,
        });
        (deferred, interrupted)
    }

    pub(crate) fn pause(&mut self) -> bool {
        if self.paused || (self.current.is_none() && self.transition.is_none()) {
            return false;
        }
        self.paused = true;
        true
    }

    pub(crate) fn resume(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        self.paused = false;
        true
    }

    /// Advance state times and the transition, then settle the pending request.
    pub(crate) fn update(&mut self, dt: f32) -> Option<LayerSignal> {
        if self.paused {
            return None;
        }

        let target = self.transition.as_ref().and_then(|t| t.target.clone());
        for (name, state) in self.states.iter_mut() {
            let driven = target.as_deref() == Some(name.as_str());
            if state.is_active() || driven {
                state.advance(dt);
            }
        }

        if let Some(transition) = &mut self.transition {
            transition.elapsed += dt;
            let ratio = transition.ratio();
            let eased = ease(transition.easing, ratio);
            if let Some(target) = &transition.target {
                if let Some(state) = self.states.get_mut(target) {
                    state.set_weight(lerp_f32(transition.target_from, 1.0, eased));
                }
            }
            for (name, from) in &transition.outgoing {
                if let Some(state) = self.states.get_mut(name) {
                    state.set_weight(lerp_f32(*from, 0.0, eased));
                }
            }
            if ratio >= 1.0 {
                for (name, _) in &transition.outgoing {
                    if let Some(state) = self.states.get_mut(name) {
                        state.set_weight(0.0);
                        state.rewind();
                    }
                }
                self.transition = None;
            }
        }

        self.settle_pending()
    }

    fn settle_pending(&mut self) -> Option<LayerSignal> {
        let pending = self.pending.as_ref()?;
        if self.transition.is_some() {
            return None;
        }
        let done = match pending.when {
            SettleWhen::TransitionDone | SettleWhen::Stopped => true,
            SettleWhen::PlaybackDone => pending
                .state
                .as_deref()
                .and_then(|s| self.states.get(s))
                .map_or(true, AnimationState::is_finished),
        };
        if !done {
            return None;
        }
        let pending = self.pending.take()?;
        let completion = Completion {
            layer: self.name.clone(),
            state: pending.state,
        };
        pending.deferred.resolve(completion.clone());
        Some(match pending.when {
            SettleWhen::Stopped => LayerSignal::Stopped(completion),
            _ => LayerSignal::Finished(completion),
        })
    }

    /// Weights used for blending this tick. Override layers are normalised
    /// so they never sum above 1; additive weights are clamped to the layer
    /// range.
    pub fn contribution_weights(&self) -> Vec<(&str, f32)> {
        let active = self
            .states
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(name, s)| (name.as_str(), s.weight()));
        match self.options.blend_mode {
            BlendMode::Override => {
                let weights: Vec<(&str, f32)> =
                    active.map(|(n, w)| (n, w.clamp(0.0, 1.0))).collect();
                let total: f32 = weights.iter().map(|(_, w)| w).sum();
                if total > 1.0 {
                    weights.into_iter().map(|(n, w)| (n, w / total)).collect()
                } else {
                    weights
                }
            }
            BlendMode::Additive => {
                let [min, max] = self.additive_range;
                active.map(|(n, w)| (n, w.clamp(min, max))).collect()
            }
        }
    }

    pub fn resolve(&self) -> LayerOutput {
        let weights = self.contribution_weights();
        match self.options.blend_mode {
            BlendMode::Override => {
                let mut acc = OverrideAccumulator::new();
                for (name, weight) in weights {
                    if let Some(state) = self.states.get(name) {
                        acc.add(&state.sample(), weight);
                    }
                }
                acc.finish(self.options.weight)
            }
            BlendMode::Additive => {
                let mut acc = AdditiveAccumulator::new();
                for (name, weight) in weights {
                    if let Some(state) = self.states.get(name) {
                        acc.add(&state.sample_delta(), weight);
                    }
                }
                for state in self.states.values() {
                    acc.register(state.clip().channels());
                }
                acc.finish(self.options.weight)
            }
        }
    }
}

/// `base`, or `base_N` for the smallest N ≥ 1 not rejected by `taken`.
pub(crate) fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|i| format!("{base}_{i}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}
