//! Controller construction

use super::{Controller, EngineHooks};
use crate::clock::{SystemTimeBase, TimeBase};
use crate::events::ControllerListener;
use crate::resource::ResourceArbiter;
use crate::utils::config::ControllerConfig;
use crate::utils::error::Result;
use std::sync::Arc;

/// Builder for [`Controller`]
///
/// Defaults to the process-wide [`ResourceArbiter`] and the system time base.
pub struct ControllerBuilder<H: EngineHooks> {
    handler: H,
    config: ControllerConfig,
    time_base: Option<Arc<dyn TimeBase>>,
    arbiter: Option<Arc<ResourceArbiter>>,
    listeners: Vec<Arc<dyn ControllerListener>>,
}

impl<H: EngineHooks> ControllerBuilder<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            config: ControllerConfig::default(),
            time_base: None,
            arbiter: None,
            listeners: Vec::new(),
        }
    }

    /// Set controller configuration
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific time base (tests drive a manual one)
    pub fn with_time_base(mut self, time_base: Arc<dyn TimeBase>) -> Self {
        self.time_base = Some(time_base);
        self
    }

    /// Arbitrate the engine resource against a specific arbiter
    pub fn with_arbiter(mut self, arbiter: Arc<ResourceArbiter>) -> Self {
        self.arbiter = Some(arbiter);
        self
    }

    /// Register a listener before any command can run
    pub fn with_listener<L: ControllerListener + 'static>(mut self, listener: L) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Spawn the controller's worker and event threads
    pub fn build(self) -> Result<Controller<H>> {
        Controller::spawn(
            self.handler,
            self.config,
            self.time_base.unwrap_or_else(SystemTimeBase::shared),
            self.arbiter.unwrap_or_else(ResourceArbiter::global),
            self.listeners,
        )
    }
}
