// Domain layer: core models and ports (interfaces). No external dependencies beyond
// serde/chrono where the API payloads demand them.

pub mod model;
pub mod ports;
