//! Ephemeral Control-Plane Fixtures
//!
//! Launches real `etcd` and `kube-apiserver` binaries as child processes for
//! integration tests, waits until they are ready, hands out their endpoints
//! and tears everything down again, removing any directory the fixtures
//! created along the way.
//!
//! ## Main Interface
//!
//! [`ControlPlane`] starts etcd, points an API server at it and exposes the
//! API server URL. [`Etcd`] and [`ApiServer`] can also be used on their own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use controlplane::*;
//! use std::time::Duration;
//!
//! # async fn example() -> FixtureResult<()> {
//! let config = ClusterConfig::builder()
//!     .api_server_arg("--disable-admission-plugins", "ServiceAccount")
//!     .start_timeout(Duration::from_secs(30))
//!     .build();
//!
//! let mut plane = ControlPlane::new(config);
//! plane.start().await?;
//!
//! let pods = plane.kubectl()?.with_args(["get", "pods"]).run().await?.ensure_success()?;
//! println!("{}", pods.stdout);
//!
//! plane.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Binaries are found through `TEST_ASSET_<NAME>`, `TEST_ASSETS_DIR`,
//! `./assets/bin` and finally `PATH`.

// Core modules
pub mod config;
pub mod error;
pub mod runtime;
pub mod testing;

// Main interfaces - re-exported at crate root for convenience
pub use config::{ApiServerConfig, ClusterConfig, ClusterConfigBuilder, EtcdConfig, ProcessConfig};
pub use error::{FixtureError, FixtureResult};
pub use runtime::apiserver::ApiServer;
pub use runtime::control_plane::{ClusterFixture, ControlPlane};
pub use runtime::etcd::Etcd;

// Supporting types
pub use runtime::output::{OutputSink, SharedBuffer};
pub use runtime::process::{ProcessStatus, Readiness};
pub use testing::{CommandOutput, KubeCtl};
