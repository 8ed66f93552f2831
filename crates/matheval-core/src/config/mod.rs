//! Run configuration: the model registry and the price table
//!
//! All endpoint and pricing knowledge lives in an explicit [`ModelRegistry`]
//! passed into client construction at startup. Resolution failures (unknown
//! model, missing key) fail fast with a descriptive error instead of
//! defaulting.

pub mod pricing;
pub mod registry;

pub use pricing::{ModelPrice, compute_cost};
pub use registry::{ModelEntry, ModelRegistry, Provider};
