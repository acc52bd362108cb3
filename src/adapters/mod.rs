// Adapters layer: concrete implementations for the domain ports
// (registry checkpoint file, output sinks).

pub mod registry;
pub mod sink;
