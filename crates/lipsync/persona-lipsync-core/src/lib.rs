//! persona-lipsync-core: speech-mark driven viseme animation for Persona hosts.
//!
//! Speech marks (for example Amazon Polly viseme marks) are validated against
//! a [`VisemeMap`], sorted, and scheduled against an [`AudioClock`]. The
//! [`VisemeScheduler`] turns clock readings into cross-faded per-viseme
//! weights; the [`LipsyncFeature`] writes those weights into an additive
//! animation layer on its host.

pub mod clock;
pub mod config;
pub mod feature;
pub mod scheduler;
pub mod speech_mark;
pub mod viseme;

pub use clock::{AudioClock, AudioStatus, ClockSample, ManualClock};
pub use config::{LipsyncConfig, DEFAULT_VISEME_LAYER};
pub use feature::{
    LipsyncFeature, LipsyncOutcome, LIPSYNC_ERROR_EVENT, LIPSYNC_FEATURE_NAME,
    LIPSYNC_FINISHED_EVENT, LIPSYNC_PLAY_EVENT, LIPSYNC_STOP_EVENT, LIPSYNC_VISEME_EVENT,
    SPEECH_STOP_EVENT,
};
pub use scheduler::{PlaybackPhase, SchedulerEvent, VisemeScheduler};
pub use speech_mark::{parse_polly_marks, schedule_marks, ScheduledMark, SpeechMark};
pub use viseme::{polly_alias, BlendTarget, VisemeMap, DEFAULT_VISEMES};
