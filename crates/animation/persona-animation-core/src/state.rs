//! A named clip playing inside a layer.

use persona_host_core::Pose;

use crate::clip::Clip;

fn wrap(time: f32, duration: f32) -> f32 {
    let m = time % duration;
    if m < 0.0 {
        m + duration
    } else {
        m
    }
}

#[derive(Clone, Debug)]
pub struct AnimationState {
    name: String,
    clip: Clip,
    looping: bool,
    time: f32,
    weight: f32,
    finished: bool,
}

impl AnimationState {
    pub fn new(name: impl Into<String>, clip: Clip, looping: bool) -> Self {
        Self {
            name: name.into(),
            clip,
            looping,
            time: 0.0,
            weight: 0.0,
            finished: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn clip(&self) -> &Clip {
        &self.clip
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Playback time in seconds.
    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    #[inline]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Non-looping playback reached the end of its clip.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub(crate) fn set_weight(&mut self, weight: f32) {
        self.weight = if weight.is_finite() { weight } else { 0.0 };
    }

    pub(crate) fn rewind(&mut self) {
        self.time = 0.0;
        self.finished = false;
    }

    /// Advance by `dt`: wrap when looping, otherwise clamp and mark finished.
    pub(crate) fn advance(&mut self, dt: f32) {
        let duration = self.clip.duration;
        if duration <= 0.0 {
            self.time = 0.0;
            self.finished = !self.looping;
            return;
        }
        self.time += dt;
        if self.looping {
            self.time = wrap(self.time, duration);
        } else if self.time >= duration {
            self.time = duration;
            self.finished = true;
        }
    }

    pub fn sample(&self) -> Pose {
        self.clip.sample(self.time)
    }

    pub fn sample_delta(&self) -> Pose {
        self.clip.sample_delta(self.time)
    }
}
