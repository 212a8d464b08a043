#![allow(dead_code)]

use std::sync::Arc;

use yard_core::config::SimConfig;
use yard_core::dispatch::DispatchAlgorithm;
use yard_core::entities::{ChargingStation, Container, Device, Fence, WorkInstruction};
use yard_core::runner::Engine;
use yard_core::store::{GlobalStore, StoreSnapshot};
use yard_core::systems::HandlerRegistry;
use yard_core::test_helpers::{test_config, test_physics};

/// Builder for small, hand-placed yards.
pub struct TestYardBuilder {
    snapshot: StoreSnapshot,
    config: SimConfig,
    handlers: Option<HandlerRegistry>,
    dispatcher: Option<Arc<dyn DispatchAlgorithm>>,
}

impl Default for TestYardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestYardBuilder {
    pub fn new() -> Self {
        Self {
            snapshot: StoreSnapshot::default(),
            config: test_config(),
            handlers: None,
            dispatcher: None,
        }
    }

    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    /// Disables the physics tick so only explicitly scheduled events run.
    pub fn without_tick(mut self) -> Self {
        self.config.physics_tick_ms = 0;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.snapshot.devices.push(device);
        self
    }

    pub fn with_fence(mut self, fence: Fence) -> Self {
        self.snapshot.fences.push(fence);
        self
    }

    pub fn with_station(mut self, station: ChargingStation) -> Self {
        self.snapshot.stations.push(station);
        self
    }

    pub fn with_instruction(mut self, instruction: WorkInstruction) -> Self {
        self.snapshot.instructions.push(instruction);
        self
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.snapshot.containers.push(container);
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn DispatchAlgorithm>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn build(self) -> Engine {
        let store = Arc::new(GlobalStore::from_snapshot(self.snapshot));
        let mut builder = Engine::builder(store, self.config, Arc::new(test_physics()));
        if let Some(handlers) = self.handlers {
            builder = builder.with_handlers(handlers);
        }
        if let Some(dispatcher) = self.dispatcher {
            builder = builder.with_dispatcher(dispatcher);
        }
        builder.build().expect("test yard should build")
    }
}
