//! HostEntity: aggregation root owning features, the bus and the tick cascade.

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::json;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::deferred::Deferred;
use crate::error::HostError;
use crate::feature::{Feature, FeatureState, HostBinding};
use crate::pose::Pose;
use crate::Result;

pub const HOST_UPDATE_EVENT: &str = "host.update";
pub const FEATURE_ERROR_EVENT: &str = "host.feature_error";

#[derive(Debug)]
struct Wait {
    remaining: f32,
    deferred: Deferred<f32>,
}

/// The character being driven. Features update in installation order.
pub struct HostEntity {
    id: Uuid,
    /// Emitter identity used for host-level events.
    emitter: String,
    name: String,
    bus: EventBus,
    features: IndexMap<String, Box<dyn Feature>>,
    waits: Vec<Wait>,
    elapsed: f32,
    pose: Pose,
}

impl std::fmt::Debug for HostEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEntity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("features", &self.features.keys().collect::<Vec<_>>())
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

impl HostEntity {
    pub fn new(name: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            emitter: id.to_string(),
            name: name.into(),
            bus: EventBus::new(),
            features: IndexMap::new(),
            waits: Vec::new(),
            elapsed: 0.0,
            pose: Pose::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host-scoped bus. Clones share the same listeners.
    #[inline]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Total seconds accumulated through `update`.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    fn binding(&self) -> HostBinding {
        HostBinding {
            host_id: self.id,
            bus: self.bus.clone(),
        }
    }

    /// Install `feature`, then discard any feature it replaces under the same name.
    pub fn add_feature<F: Feature>(&mut self, feature: F) -> Result<()> {
        self.add_boxed_feature(Box::new(feature))
    }

    pub fn add_boxed_feature(&mut self, mut feature: Box<dyn Feature>) -> Result<()> {
        if feature.state() != FeatureState::Uninstalled {
            return Err(HostError::invalid_state(
                "add_feature",
                format!("feature '{}' is {:?}", feature.name(), feature.state()),
            ));
        }
        let name = feature.name().to_string();
        // A failed install leaves the previous feature in place.
        feature.install(self.binding())?;
        if let Some(mut previous) = self.features.shift_remove(&name) {
            debug!("host '{}': replacing feature '{}'", self.name, name);
            previous.discard();
        }
        self.features.insert(name, feature);
        Ok(())
    }

    /// Discard and detach the named feature, handing it back to the caller.
    pub fn remove_feature(&mut self, name: &str) -> Result<Box<dyn Feature>> {
        let mut feature = self
            .features
            .shift_remove(name)
            .ok_or_else(|| HostError::not_found("feature", name))?;
        feature.discard();
        Ok(feature)
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(|k| k.as_str())
    }

    pub fn feature<T: Feature>(&self, name: &str) -> Option<&T> {
        self.features.get(name)?.as_any().downcast_ref::<T>()
    }

    pub fn feature_mut<T: Feature>(&mut self, name: &str) -> Option<&mut T> {
        self.features.get_mut(name)?.as_any_mut().downcast_mut::<T>()
    }

    /// Resolves with the host's elapsed time once `seconds` more have passed
    /// through `update`.
    pub fn wait(&mut self, seconds: f32) -> Deferred<f32> {
        let deferred = Deferred::new();
        self.waits.push(Wait {
            remaining: if seconds.is_finite() {
                seconds.max(0.0)
            } else {
                0.0
            },
            deferred: deferred.clone(),
        });
        deferred
    }

    /// Run one tick: every feature in installation order, then pending waits,
    /// then rebuild the combined pose.
    pub fn update(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.elapsed += dt;

        for (name, feature) in self.features.iter_mut() {
            if let Err(err) = feature.update(dt) {
                warn!("host '{}': feature '{}' failed: {}", self.name, name, err);
                self.bus.emit(
                    &self.emitter,
                    FEATURE_ERROR_EVENT,
                    json!({ "feature": name, "error": err }),
                );
            }
        }

        let elapsed = self.elapsed;
        self.waits.retain_mut(|wait| {
            if !wait.deferred.is_pending() {
                return false;
            }
            wait.remaining -= dt;
            if wait.remaining <= 0.0 {
                wait.deferred.resolve(elapsed);
                return false;
            }
            true
        });

        self.pose.clear();
        for feature in self.features.values() {
            if let Some(output) = feature.output() {
                self.pose.overlay(output);
            }
        }

        self.bus.emit(
            &self.emitter,
            HOST_UPDATE_EVENT,
            json!({ "dt": dt, "elapsed": elapsed }),
        );
    }

    /// Combined channel weights after the last `update`.
    #[inline]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }
}
