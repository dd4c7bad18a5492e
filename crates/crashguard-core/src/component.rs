//! Component identities and the host component registry

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a recovery surface, restart target or any other component
/// known to the host registry
///
/// For in-process code the identifier doubles as the module path its
/// frames originate from, which is what the conflict detector matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Read-only view of the host's component registry
pub trait ComponentRegistry {
    /// Components registered for `action`, in registration order
    fn query(&self, action: &str) -> Vec<ComponentId>;

    /// The process's own default entry point, if it can be determined
    fn default_entry_point(&self) -> Option<ComponentId>;
}
