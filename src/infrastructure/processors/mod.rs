//! Built-in payment processor modules.

pub mod dummy;
pub mod gateway;

use crate::application::processors::ProcessorRegistry;
use crate::domain::ports::SharedGateway;
use dummy::DummyProcessor;
use gateway::GatewayProcessor;

/// Registry with the `dummy` module and a `gateway` module bound to `client`.
pub fn default_registry(client: SharedGateway) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry
        .register(dummy::MODULE, DummyProcessor::factory)
        .register(gateway::MODULE, GatewayProcessor::factory(client));
    registry
}
