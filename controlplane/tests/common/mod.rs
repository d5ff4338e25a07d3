//! Common test utilities and infrastructure
//!
//! Fixtures here launch the `controlplane-standin` binary built alongside
//! the tests in place of real etcd and kube-apiserver binaries.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::TestHelpers;
