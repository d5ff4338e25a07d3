//! Core shared types and identifiers

use std::fmt;
use std::str::FromStr;

use crate::errors::SharedError;

/// Identifier for every component a test suite can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    /// The key-value store
    Etcd,
    /// The API server
    ApiServer,
    /// The composite fixture owning both servers
    ControlPlane,
    /// The command-line client
    KubeCtl,
}

impl ComponentId {
    /// Binary name used for asset lookup and log tagging
    pub fn binary_name(&self) -> &'static str {
        match self {
            ComponentId::Etcd => "etcd",
            ComponentId::ApiServer => "kube-apiserver",
            ComponentId::ControlPlane => "control-plane",
            ComponentId::KubeCtl => "kubectl",
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

impl FromStr for ComponentId {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "etcd" => Ok(ComponentId::Etcd),
            "kube-apiserver" | "apiserver" => Ok(ComponentId::ApiServer),
            "control-plane" => Ok(ComponentId::ControlPlane),
            "kubectl" => Ok(ComponentId::KubeCtl),
            _ => Err(SharedError::UnknownComponent { name: s.to_string() }),
        }
    }
}
