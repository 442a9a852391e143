//! LipsyncFeature: drives an additive viseme layer from speech marks.
//!
//! The feature embeds an [`AnimationFeature`] registered under its own name.
//! Installing it creates one additive layer holding a zero-length state per
//! viseme of the active [`VisemeMap`]; every tick the scheduler's per-viseme
//! weights are written into those states before the embedded animation
//! resolves its layers.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn};
use persona_animation_core::{AnimationFeature, AnimationConfig, Clip, LayerOptions};
use persona_host_core::{
    Deferred, Feature, FeatureCore, FeatureState, HostError, Pose, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::clock::AudioClock;
use crate::config::LipsyncConfig;
use crate::scheduler::{PlaybackPhase, SchedulerEvent, VisemeScheduler};
use crate::speech_mark::{schedule_marks, SpeechMark};
use crate::viseme::VisemeMap;

pub const LIPSYNC_FEATURE_NAME: &str = "LipsyncFeature";

pub const LIPSYNC_PLAY_EVENT: &str = "lipsync.play";
pub const LIPSYNC_VISEME_EVENT: &str = "lipsync.viseme";
pub const LIPSYNC_STOP_EVENT: &str = "lipsync.stop";
pub const LIPSYNC_FINISHED_EVENT: &str = "lipsync.finished";
pub const LIPSYNC_ERROR_EVENT: &str = "lipsync.error";

/// Emitted by speech features when their audio is stopped.
pub const SPEECH_STOP_EVENT: &str = "speech.stop";

/// Resolved value of a `play_marks` Deferred.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LipsyncOutcome {
    Finished,
    Stopped,
}

/// Requests from bus listeners, applied on the next update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inbound {
    Stop,
}

pub struct LipsyncFeature {
    animation: AnimationFeature,
    config: LipsyncConfig,
    viseme_map: VisemeMap,
    scheduler: VisemeScheduler,
    clock: Option<Box<dyn AudioClock>>,
    pending: Option<Deferred<LipsyncOutcome>>,
    inbox: Rc<RefCell<Vec<Inbound>>>,
}

impl std::fmt::Debug for LipsyncFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LipsyncFeature")
            .field("state", &self.animation.state())
            .field("phase", &self.scheduler.phase())
            .field("visemes", &self.viseme_map.len())
            .field("has_clock", &self.clock.is_some())
            .finish()
    }
}

impl Default for LipsyncFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl LipsyncFeature {
    pub fn new() -> Self {
        Self::with_config(LipsyncConfig::default())
    }

    pub fn with_config(config: LipsyncConfig) -> Self {
        let animation_config = AnimationConfig {
            easing: config.easing,
            ..AnimationConfig::default()
        };
        Self {
            animation: AnimationFeature::named(LIPSYNC_FEATURE_NAME, animation_config),
            scheduler: VisemeScheduler::new(config.clone()),
            config,
            viseme_map: VisemeMap::default(),
            clock: None,
            pending: None,
            inbox: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Replace the map before installation.
    pub fn with_viseme_map(mut self, map: VisemeMap) -> Self {
        self.viseme_map = map;
        self
    }

    #[inline]
    pub fn config(&self) -> &LipsyncConfig {
        &self.config
    }

    #[inline]
    pub fn viseme_map(&self) -> &VisemeMap {
        &self.viseme_map
    }

    #[inline]
    pub fn phase(&self) -> PlaybackPhase {
        self.scheduler.phase()
    }

    #[inline]
    pub fn scheduler(&self) -> &VisemeScheduler {
        &self.scheduler
    }

    /// The embedded animation feature, e.g. to inspect the viseme layer.
    #[inline]
    pub fn animation(&self) -> &AnimationFeature {
        &self.animation
    }

    /// Current scheduler weight of a canonical viseme id.
    pub fn viseme_weight(&self, viseme: &str) -> f32 {
        self.scheduler.weight(viseme)
    }

    #[inline]
    pub fn pose(&self) -> &Pose {
        self.animation.pose()
    }

    fn build_layer(&mut self) -> Result<()> {
        let layer_name = self.config.layer_name.clone();
        if self.animation.layer(&layer_name).is_some() {
            self.animation.remove_layer(&layer_name)?;
        }
        let assigned = self.animation.add_layer(&layer_name, LayerOptions::additive())?;
        let ids: Vec<String> = self.viseme_map.ids().map(str::to_string).collect();
        for id in ids {
            let clip = Clip::constant(id.as_str(), &self.viseme_map.pose(&id));
            self.animation.add_state(&assigned, &id, clip, false)?;
        }
        debug!(
            "{}: built layer '{}' with {} visemes",
            LIPSYNC_FEATURE_NAME,
            assigned,
            self.viseme_map.len()
        );
        Ok(())
    }

    fn ensure_installed(&self, operation: &str) -> Result<()> {
        match self.animation.state() {
            FeatureState::Installed => Ok(()),
            state => Err(HostError::invalid_state(
                operation,
                format!("feature '{}' is {:?}", LIPSYNC_FEATURE_NAME, state),
            )),
        }
    }

    /// Swap the viseme map. Only allowed while no playback is active.
    pub fn set_viseme_map(&mut self, map: VisemeMap) -> Result<()> {
        if self.animation.state() == FeatureState::Discarded {
            return Err(HostError::invalid_state(
                "set_viseme_map",
                format!("feature '{LIPSYNC_FEATURE_NAME}' has been discarded"),
            ));
        }
        if self.scheduler.is_active() {
            return Err(HostError::invalid_state(
                "set_viseme_map",
                format!("playback is {:?}", self.scheduler.phase()),
            ));
        }
        map.validate()?;
        self.viseme_map = map;
        if self.animation.state() == FeatureState::Installed {
            self.scheduler.reset();
            self.build_layer()?;
        }
        Ok(())
    }

    /// Schedule `marks` against `clock`. The Deferred resolves with
    /// `Finished` when playback ends, `Stopped` on `stop`, is rejected when
    /// the clock fails and cancelled when another playback replaces it.
    /// Invalid marks are rejected here without touching the current playback.
    pub fn play_marks<C>(&mut self, marks: &[SpeechMark], clock: C) -> Result<Deferred<LipsyncOutcome>>
    where
        C: AudioClock + 'static,
    {
        self.ensure_installed("play_marks")?;
        let scheduled = schedule_marks(marks, &self.viseme_map)?;

        if self.scheduler.is_active() {
            self.scheduler.stop();
            if let Some(previous) = self.pending.take() {
                previous.cancel();
            }
            self.animation
                .core()
                .emit(LIPSYNC_STOP_EVENT, json!({ "reason": "replaced" }));
        }

        let count = scheduled.len();
        self.scheduler.load(scheduled)?;
        self.clock = Some(Box::new(clock));
        let deferred = Deferred::new();
        self.pending = Some(deferred.clone());
        info!("{LIPSYNC_FEATURE_NAME}: scheduled {count} marks");
        self.animation
            .core()
            .emit(LIPSYNC_PLAY_EVENT, json!({ "marks": count }));
        Ok(deferred)
    }

    /// Like `play_marks`, switching to `map` first.
    pub fn play_marks_with_map<C>(
        &mut self,
        marks: &[SpeechMark],
        clock: C,
        map: VisemeMap,
    ) -> Result<Deferred<LipsyncOutcome>>
    where
        C: AudioClock + 'static,
    {
        self.ensure_installed("play_marks")?;
        schedule_marks(marks, &map)?;
        if self.scheduler.is_active() {
            self.stop()?;
        }
        self.set_viseme_map(map)?;
        self.play_marks(marks, clock)
    }

    /// Stop the active playback, easing to neutral. Returns false when idle.
    pub fn stop(&mut self) -> Result<bool> {
        if self.animation.state() == FeatureState::Discarded {
            return Err(HostError::invalid_state(
                "stop",
                format!("feature '{LIPSYNC_FEATURE_NAME}' has been discarded"),
            ));
        }
        if !self.scheduler.stop() {
            return Ok(false);
        }
        self.clock = None;
        if let Some(pending) = self.pending.take() {
            pending.resolve(LipsyncOutcome::Stopped);
        }
        self.animation
            .core()
            .emit(LIPSYNC_STOP_EVENT, json!({ "reason": "stopped" }));
        Ok(true)
    }

    fn drain_inbox(&mut self) -> Result<()> {
        let requests: Vec<Inbound> = self.inbox.borrow_mut().drain(..).collect();
        for request in requests {
            match request {
                Inbound::Stop => {
                    if self.stop()? {
                        debug!("{LIPSYNC_FEATURE_NAME}: stopped by {SPEECH_STOP_EVENT}");
                    }
                }
            }
        }
        Ok(())
    }

    fn handle(&mut self, event: SchedulerEvent) {
        let core = self.animation.core();
        match event {
            SchedulerEvent::Started => debug!("{LIPSYNC_FEATURE_NAME}: playback started"),
            SchedulerEvent::Activated(mark) => {
                core.emit(
                    LIPSYNC_VISEME_EVENT,
                    json!({ "mark": mark.mark, "viseme": mark.viseme }),
                );
            }
            SchedulerEvent::Seeked { from_ms, to_ms } => {
                debug!("{LIPSYNC_FEATURE_NAME}: seek {from_ms}ms -> {to_ms}ms");
            }
            SchedulerEvent::Finished => {
                self.clock = None;
                if let Some(pending) = self.pending.take() {
                    pending.resolve(LipsyncOutcome::Finished);
                }
                core.emit(LIPSYNC_FINISHED_EVENT, json!({}));
            }
            SchedulerEvent::Failed(reason) => {
                warn!("{LIPSYNC_FEATURE_NAME}: audio failed: {reason}");
                self.clock = None;
                let error = HostError::upstream(reason);
                core.emit(LIPSYNC_ERROR_EVENT, json!({ "error": error }));
                if let Some(pending) = self.pending.take() {
                    pending.reject(error);
                }
            }
        }
    }

    fn write_weights(&mut self) -> Result<()> {
        let layer = self.config.layer_name.clone();
        let ids: Vec<String> = self.viseme_map.ids().map(str::to_string).collect();
        for id in ids {
            let weight = self.scheduler.weight(&id);
            self.animation.set_state_weight(&layer, &id, weight)?;
        }
        Ok(())
    }
}

impl Feature for LipsyncFeature {
    fn core(&self) -> &FeatureCore {
        self.animation.core()
    }

    fn core_mut(&mut self) -> &mut FeatureCore {
        self.animation.core_mut()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_install(&mut self) -> Result<()> {
        self.build_layer()?;
        let inbox = Rc::clone(&self.inbox);
        self.core_mut().listen(SPEECH_STOP_EVENT, move |_| {
            inbox.borrow_mut().push(Inbound::Stop);
            Ok(())
        })?;
        Ok(())
    }

    fn on_discard(&mut self) {
        self.scheduler.stop();
        self.clock = None;
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        self.inbox.borrow_mut().clear();
        self.animation.on_discard();
    }

    fn updated(&mut self, dt: f32) -> Result<()> {
        self.drain_inbox()?;
        let sample = self.clock.as_ref().map(|clock| clock.sample());
        let events = self.scheduler.tick(sample.as_ref(), dt);
        for event in events {
            self.handle(event);
        }
        self.write_weights()?;
        self.animation.updated(dt)
    }

    fn output(&self) -> Option<&Pose> {
        self.animation.output()
    }
}
