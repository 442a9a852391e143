//! persona-animation-core: layered animation blending for Persona hosts.
//!
//! An [`AnimationFeature`] holds an ordered list of [`AnimationLayer`]s. Each
//! layer owns named [`AnimationState`]s (a [`Clip`] plus playback time and
//! weight) and resolves to one contribution per tick; layers are then
//! composed in registration order into the feature's output [`Pose`].
//!
//! ```
//! use persona_animation_core::{AnimationFeature, Clip, LayerOptions, PlayOptions};
//! use persona_host_core::HostEntity;
//!
//! let mut anim = AnimationFeature::new();
//! anim.add_layer("base", LayerOptions::default()).unwrap();
//! let idle = Clip::new("idle", 1.0).with_track("jaw", &[(0.0, 0.0), (1.0, 0.2)]);
//! anim.add_state("base", "idle", idle, true).unwrap();
//! anim.play_animation("base", "idle", PlayOptions::new().with_transition(0.0)).unwrap();
//!
//! let mut host = HostEntity::new("demo");
//! host.add_feature(anim).unwrap();
//! host.update(1.0 / 60.0);
//! assert!(host.pose().get("jaw").is_some());
//! ```
//!
//! [`Pose`]: persona_host_core::Pose

pub mod blend;
pub mod clip;
pub mod config;
pub mod easing;
pub mod feature;
pub mod layer;
pub mod state;

pub use blend::{compose_layer, AdditiveAccumulator, LayerOutput, OverrideAccumulator};
pub use clip::{sample_track, Clip, ClipTrack, Keyframe};
pub use config::{AnimationConfig, BlendMode, LayerOptions, PlayOptions};
pub use easing::{blend_weight, ease, transition_ratio, Easing};
pub use feature::{
    AnimationFeature, ANIMATION_FEATURE_NAME, ANIMATION_FINISHED_EVENT, ANIMATION_INTERRUPT_EVENT,
    ANIMATION_PAUSE_EVENT, ANIMATION_PLAY_EVENT, ANIMATION_RESUME_EVENT, ANIMATION_STOP_EVENT,
};
pub use layer::{AnimationLayer, Completion, LayerSignal, Transition};
pub use state::AnimationState;
