//! Client-side helpers for tests running against a fixture

pub mod kubectl;

pub use kubectl::{CommandOutput, KubeCtl};
