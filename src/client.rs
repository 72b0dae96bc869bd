//! Unified gateway interface.
//!
//! Developer-friendly goal: keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
mod execution;
pub mod models;
pub mod signals;

pub use builder::GatewayBuilder;
pub use core::{Gateway, GenerationHandle};
pub use models::{ModelListShape, ModelsProbe};
pub use signals::{InflightSnapshot, SignalsSnapshot};
