//! Feature lifecycle: Uninstalled → Installed → Discarded.
//!
//! Concrete features embed a [`FeatureCore`] and implement the hook methods
//! of [`Feature`]; the provided `install`, `update` and `discard` methods
//! enforce the lifecycle and emit the lifecycle events on the host bus.

use std::any::Any;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::bus::{BusEvent, EmitReport, EventBus, SubscriptionHandle};
use crate::error::HostError;
use crate::pose::Pose;
use crate::Result;

pub const FEATURE_INSTALLED_EVENT: &str = "feature.installed";
pub const FEATURE_DISCARDED_EVENT: &str = "feature.discarded";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureState {
    Uninstalled,
    Installed,
    Discarded,
}

/// Non-owning link from a feature back to its host.
#[derive(Clone, Debug)]
pub struct HostBinding {
    pub host_id: Uuid,
    pub bus: EventBus,
}

/// Lifecycle state shared by every feature.
#[derive(Debug)]
pub struct FeatureCore {
    name: String,
    state: FeatureState,
    host: Option<HostBinding>,
    subscriptions: Vec<SubscriptionHandle>,
}

impl FeatureCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: FeatureState::Uninstalled,
            host: None,
            subscriptions: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> FeatureState {
        self.state
    }

    pub fn host_id(&self) -> Option<Uuid> {
        self.host.as_ref().map(|h| h.host_id)
    }

    pub fn bus(&self) -> Option<&EventBus> {
        self.host.as_ref().map(|h| &h.bus)
    }

    /// Emit on the host bus with this feature as emitter. No-op when detached.
    pub fn emit(&self, event: &str, payload: JsonValue) -> Option<EmitReport> {
        self.bus().map(|bus| bus.emit(&self.name, event, payload))
    }

    /// Subscribe on the host bus; the subscription is released on discard.
    pub fn listen<F>(&mut self, event: &str, listener: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(&BusEvent) -> Result<()> + 'static,
    {
        let Some(bus) = self.bus() else {
            return Err(HostError::invalid_state(
                "listen",
                format!("feature '{}' is not installed", self.name),
            ));
        };
        let handle = bus.subscribe(event, listener);
        self.subscriptions.push(handle.clone());
        Ok(handle)
    }

    /// Returns false when already installed on the same host.
    fn attach(&mut self, binding: HostBinding) -> Result<bool> {
        match self.state {
            FeatureState::Discarded => Err(HostError::invalid_state(
                "install",
                format!("feature '{}' has been discarded", self.name),
            )),
            FeatureState::Installed => {
                if self.host_id() == Some(binding.host_id) {
                    Ok(false)
                } else {
                    Err(HostError::invalid_state(
                        "install",
                        format!("feature '{}' is installed on another host", self.name),
                    ))
                }
            }
            FeatureState::Uninstalled => {
                self.host = Some(binding);
                self.state = FeatureState::Installed;
                Ok(true)
            }
        }
    }

    fn release_subscriptions(&mut self) {
        if let Some(bus) = self.host.as_ref().map(|h| h.bus.clone()) {
            for handle in self.subscriptions.drain(..) {
                bus.unsubscribe(&handle);
            }
        }
        self.subscriptions.clear();
    }

    fn detach(&mut self) {
        self.release_subscriptions();
        self.host = None;
        self.state = FeatureState::Uninstalled;
    }

    fn lifecycle_payload(&self) -> JsonValue {
        json!({
            "feature": self.name,
            "host": self.host_id().map(|id| id.to_string()),
        })
    }
}

/// A capability attached to exactly one host.
pub trait Feature: Any {
    fn core(&self) -> &FeatureCore;
    fn core_mut(&mut self) -> &mut FeatureCore;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn state(&self) -> FeatureState {
        self.core().state()
    }

    /// Called after the host binding is stored; register listeners here.
    fn on_install(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called before listeners are released on discard.
    fn on_discard(&mut self) {}

    /// Advance internal state by `dt` seconds. Only called while Installed.
    fn updated(&mut self, _dt: f32) -> Result<()> {
        Ok(())
    }

    /// Channel weights this feature contributes to the host pose.
    fn output(&self) -> Option<&Pose> {
        None
    }

    fn install(&mut self, binding: HostBinding) -> Result<()> {
        if !self.core_mut().attach(binding)? {
            return Ok(());
        }
        if let Err(err) = self.on_install() {
            self.core_mut().detach();
            return Err(err);
        }
        debug!("feature '{}' installed", self.name());
        let payload = self.core().lifecycle_payload();
        self.core().emit(FEATURE_INSTALLED_EVENT, payload);
        Ok(())
    }

    fn update(&mut self, dt: f32) -> Result<()> {
        match self.state() {
            FeatureState::Installed => self.updated(dt),
            state => Err(HostError::invalid_state(
                "update",
                format!("feature '{}' is {:?}", self.name(), state),
            )),
        }
    }

    /// Idempotent; a second call emits nothing.
    fn discard(&mut self) {
        if self.state() == FeatureState::Discarded {
            return;
        }
        self.on_discard();
        let payload = self.core().lifecycle_payload();
        let core = self.core_mut();
        core.release_subscriptions();
        core.state = FeatureState::Discarded;
        core.emit(FEATURE_DISCARDED_EVENT, payload);
        core.host = None;
        debug!("feature '{}' discarded", core.name);
    }
}
