//! Viseme scheduling over an audio clock.
//!
//! The scheduler is a plain state machine: it owns the sorted marks of one
//! playback and a set of per-viseme weights, and advances both from a clock
//! sample and the frame delta. It knows nothing about hosts, buses or layers.
//!
//! Weights cross-fade: activating a mark starts an interpolation from the
//! weights of the moment toward `{viseme: 1.0}`, and ending a hold eases
//! everything back toward neutral (no weights).

use hashbrown::HashMap;
use log::{debug, warn};
use persona_animation_core::{ease, transition_ratio};
use persona_host_core::{lerp_f32, HostError, Result};
use serde::{Deserialize, Serialize};

use crate::clock::{AudioStatus, ClockSample};
use crate::config::LipsyncConfig;
use crate::speech_mark::ScheduledMark;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackPhase {
    Idle,
    Scheduled,
    Playing,
    Finished,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SchedulerEvent {
    /// First tick of a scheduled playback.
    Started,
    Activated(ScheduledMark),
    /// The clock moved discontinuously; skipped marks were not replayed.
    Seeked { from_ms: f64, to_ms: f64 },
    Finished,
    Failed(String),
}

#[derive(Debug)]
struct Blend {
    from: HashMap<String, f32>,
    to: HashMap<String, f32>,
    elapsed: f32,
    duration: f32,
}

impl Blend {
    fn is_neutral(&self) -> bool {
        self.to.is_empty()
    }
}

#[derive(Debug)]
pub struct VisemeScheduler {
    config: LipsyncConfig,
    phase: PlaybackPhase,
    marks: Vec<ScheduledMark>,
    cursor: usize,
    held: Option<usize>,
    weights: HashMap<String, f32>,
    blend: Option<Blend>,
    last_time_ms: Option<f64>,
}

impl VisemeScheduler {
    pub fn new(config: LipsyncConfig) -> Self {
        Self {
            config,
            phase: PlaybackPhase::Idle,
            marks: Vec::new(),
            cursor: 0,
            held: None,
            weights: HashMap::new(),
            blend: None,
            last_time_ms: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &LipsyncConfig {
        &self.config
    }

    #[inline]
    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    /// Scheduled or Playing.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.phase, PlaybackPhase::Scheduled | PlaybackPhase::Playing)
    }

    pub fn marks(&self) -> &[ScheduledMark] {
        &self.marks
    }

    /// Index of the next mark to activate.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The mark currently shaping the mouth, if its hold is live.
    pub fn held_mark(&self) -> Option<&ScheduledMark> {
        self.held.and_then(|i| self.marks.get(i))
    }

    pub fn weights(&self) -> &HashMap<String, f32> {
        &self.weights
    }

    pub fn weight(&self, viseme: &str) -> f32 {
        self.weights.get(viseme).copied().unwrap_or(0.0)
    }

    /// No interpolation running and every weight at zero.
    pub fn is_at_rest(&self) -> bool {
        self.blend.is_none() && self.weights.values().all(|w| *w <= 0.0)
    }

    /// Idle/Finished → Scheduled with already validated, sorted marks.
    pub fn load(&mut self, marks: Vec<ScheduledMark>) -> Result<()> {
        if self.is_active() {
            return Err(HostError::invalid_state(
                "load",
                format!("playback is {:?}", self.phase),
            ));
        }
        debug!("viseme scheduler: loaded {} marks", marks.len());
        self.marks = marks;
        self.cursor = 0;
        self.held = None;
        self.last_time_ms = None;
        self.phase = PlaybackPhase::Scheduled;
        Ok(())
    }

    /// Scheduled/Playing → Finished, easing to neutral. Returns false otherwise.
    pub fn stop(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.finish();
        true
    }

    /// Drop marks and snap weights to neutral.
    pub fn reset(&mut self) {
        self.phase = PlaybackPhase::Idle;
        self.marks.clear();
        self.cursor = 0;
        self.held = None;
        self.weights.clear();
        self.blend = None;
        self.last_time_ms = None;
    }

    fn finish(&mut self) {
        self.phase = PlaybackPhase::Finished;
        self.held = None;
        self.ease_to_neutral();
    }

    /// Milliseconds at which mark `index` stops holding the mouth.
    fn hold_end(&self, index: usize) -> f64 {
        let mark = &self.marks[index];
        match mark.mark.duration_ms {
            Some(duration) => mark.time_ms() + duration,
            None => match self.marks.get(index + 1) {
                Some(next) => next.time_ms(),
                None => mark.time_ms() + self.config.trailing_hold_ms,
            },
        }
    }

    fn start_blend(&mut self, to: HashMap<String, f32>, duration: f32, elapsed: f32) {
        self.apply_blend();
        self.blend = Some(Blend {
            from: self.weights.clone(),
            to,
            elapsed,
            duration,
        });
    }

    fn ease_to_neutral(&mut self) {
        if self.blend.as_ref().is_some_and(Blend::is_neutral) || self.is_at_rest() {
            return;
        }
        self.start_blend(HashMap::new(), self.config.neutral_duration, 0.0);
    }

    fn activate(&mut self, index: usize, now_ms: f64, dt: f32) {
        let mark = &self.marks[index];
        let late = ((now_ms - mark.time_ms()) / 1000.0).max(0.0);
        let elapsed = late.min(f64::from(dt)) as f32;
        let mut target = HashMap::new();
        target.insert(mark.viseme.clone(), 1.0);
        self.start_blend(target, self.config.blend_duration, elapsed);
        self.held = Some(index);
    }

    /// Recompute weights from the running interpolation.
    fn apply_blend(&mut self) {
        let Some(blend) = &self.blend else {
            return;
        };
        let ratio = transition_ratio(blend.elapsed, blend.duration);
        let t = ease(self.config.easing, ratio);
        let mut weights = HashMap::with_capacity(blend.from.len() + blend.to.len());
        for key in blend.from.keys().chain(blend.to.keys()) {
            let from = blend.from.get(key).copied().unwrap_or(0.0);
            let to = blend.to.get(key).copied().unwrap_or(0.0);
            let w = lerp_f32(from, to, t);
            if w > 0.0 {
                weights.insert(key.clone(), w);
            }
        }
        self.weights = weights;
        if ratio >= 1.0 {
            self.blend = None;
        }
    }

    /// Reposition after a clock discontinuity. Returns the re-activated mark.
    fn seek(&mut self, now_ms: f64, dt: f32) -> Option<usize> {
        self.apply_blend();
        self.blend = None;
        self.held = None;
        let due = self.marks.partition_point(|m| m.time_ms() <= now_ms);
        self.cursor = due;
        if let Some(latest) = due.checked_sub(1) {
            if now_ms < self.hold_end(latest) {
                self.activate(latest, now_ms, dt);
                return Some(latest);
            }
        }
        self.ease_to_neutral();
        None
    }

    /// Advance one frame. `sample` is ignored unless playback is active.
    pub fn tick(&mut self, sample: Option<&ClockSample>, dt: f32) -> Vec<SchedulerEvent> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let mut events = Vec::new();
        if let Some(blend) = &mut self.blend {
            blend.elapsed += dt;
        }
        if let Some(sample) = sample.filter(|_| self.is_active()) {
            self.advance_playback(sample, dt, &mut events);
        }
        self.apply_blend();
        events
    }

    fn advance_playback(&mut self, sample: &ClockSample, dt: f32, events: &mut Vec<SchedulerEvent>) {
        if self.phase == PlaybackPhase::Scheduled {
            self.phase = PlaybackPhase::Playing;
            events.push(SchedulerEvent::Started);
        }
        if let AudioStatus::Failed(reason) = &sample.status {
            self.finish();
            events.push(SchedulerEvent::Failed(reason.clone()));
            return;
        }
        let now = sample.time_ms;
        if !now.is_finite() {
            return;
        }

        if let Some(last) = self.last_time_ms {
            let backward = now < last;
            let skipped = self.marks[self.cursor..]
                .iter()
                .take_while(|m| m.time_ms() <= now)
                .count();
            let jumped =
                now - last > f64::from(dt) * 1000.0 + self.config.seek_tolerance_ms && skipped > 1;
            if backward || jumped {
                warn!("viseme scheduler: clock jumped {last:.1}ms -> {now:.1}ms");
                events.push(SchedulerEvent::Seeked {
                    from_ms: last,
                    to_ms: now,
                });
                if let Some(index) = self.seek(now, dt) {
                    events.push(SchedulerEvent::Activated(self.marks[index].clone()));
                }
            }
        }
        self.last_time_ms = Some(now);

        while self.cursor < self.marks.len() && self.marks[self.cursor].time_ms() <= now {
            let index = self.cursor;
            self.activate(index, now, dt);
            events.push(SchedulerEvent::Activated(self.marks[index].clone()));
            self.cursor += 1;
        }

        if let Some(held) = self.held {
            if now >= self.hold_end(held) {
                self.held = None;
                self.ease_to_neutral();
            }
        }

        let exhausted = self.cursor == self.marks.len()
            && self
                .marks
                .len()
                .checked_sub(1)
                .map_or(true, |last| now >= self.hold_end(last));
        if sample.status == AudioStatus::Completed || exhausted {
            self.finish();
            events.push(SchedulerEvent::Finished);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech_mark::SpeechMark;

    fn marks(items: &[(f64, &str)]) -> Vec<ScheduledMark> {
        items
            .iter()
            .map(|&(t, v)| ScheduledMark {
                mark: SpeechMark::new(t, v),
                viseme: v.to_string(),
            })
            .collect()
    }

    fn playing(time_ms: f64) -> ClockSample {
        ClockSample {
            time_ms,
            status: AudioStatus::Playing,
        }
    }

    #[test]
    fn load_is_rejected_while_active() {
        let mut s = VisemeScheduler::new(LipsyncConfig::default());
        s.load(marks(&[(0.0, "AA")])).unwrap();
        assert!(s.load(Vec::new()).is_err());
        assert!(s.stop());
        assert!(!s.stop());
        s.load(Vec::new()).unwrap();
    }

    #[test]
    fn empty_playback_finishes_on_first_tick() {
        let mut s = VisemeScheduler::new(LipsyncConfig::default());
        s.load(Vec::new()).unwrap();
        let events = s.tick(Some(&playing(0.0)), 0.016);
        assert_eq!(events, vec![SchedulerEvent::Started, SchedulerEvent::Finished]);
        assert_eq!(s.phase(), PlaybackPhase::Finished);
    }

    #[test]
    fn explicit_duration_ends_hold_before_next_mark() {
        let mut s = VisemeScheduler::new(
            LipsyncConfig::default().with_blend_duration(0.0).with_neutral_duration(0.0),
        );
        let mut m = marks(&[(0.0, "AA"), (500.0, "PP")]);
        m[0].mark.duration_ms = Some(100.0);
        s.load(m).unwrap();
        s.tick(Some(&playing(0.0)), 0.05);
        assert_eq!(s.weight("AA"), 1.0);
        s.tick(Some(&playing(50.0)), 0.05);
        assert_eq!(s.weight("AA"), 1.0);
        s.tick(Some(&playing(100.0)), 0.05);
        assert!(s.held_mark().is_none());
        assert_eq!(s.weight("AA"), 0.0);
    }
}
