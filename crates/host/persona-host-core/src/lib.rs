//! persona-host-core: host entity, feature lifecycle and messaging (engine-agnostic)
//!
//! A [`HostEntity`] owns a name-keyed set of [`Feature`]s and a host-scoped
//! [`EventBus`]. The render loop calls [`HostEntity::update`] once per frame;
//! features advance in installation order and their outputs are combined
//! into one [`Pose`]. Long-running operations report back through
//! [`Deferred`] handles settled from inside the tick.

pub mod bus;
pub mod deferred;
pub mod error;
pub mod feature;
pub mod host;
pub mod pose;

pub use bus::{BusEvent, EmitReport, EventBus, SubscriptionHandle, LISTENER_ERROR_EVENT};
pub use deferred::{Deferred, DeferredState, Outcome};
pub use error::HostError;
pub use feature::{
    Feature, FeatureCore, FeatureState, HostBinding, FEATURE_DISCARDED_EVENT,
    FEATURE_INSTALLED_EVENT,
};
pub use host::{HostEntity, FEATURE_ERROR_EVENT, HOST_UPDATE_EVENT};
pub use pose::{lerp_f32, Pose};

/// Result type used across the Persona crates.
pub type Result<T> = std::result::Result<T, HostError>;
