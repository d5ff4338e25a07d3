//! Shared types for the control-plane fixtures
//!
//! Holds the pieces every crate in the workspace agrees on: component
//! identifiers used to tag log events, the common error type for
//! configuration values, and tracing setup.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
