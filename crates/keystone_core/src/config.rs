//! # Registry Configuration
//!
//! Tunables for a [`Registry`](crate::Registry), loaded once at startup.
//!
//! ```toml
//! duplicate_policy = "reject"
//! entity_capacity = 100000
//! storage_capacity = 1024
//! ```

use serde::Deserialize;

use crate::error::{EcsError, EcsResult};

/// What `emplace_component` does when the component is already attached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the existing value and report "not inserted".
    #[default]
    Ignore,
    /// Fail with [`EcsError::ComponentAlreadyAssigned`].
    Reject,
}

/// Configuration for a registry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Duplicate attachment policy, applied to every component type.
    pub duplicate_policy: DuplicatePolicy,
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
    /// Components reserved in every pool when it is created.
    pub storage_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Ignore,
            entity_capacity: 1024,
            storage_capacity: 64,
        }
    }
}

impl RegistryConfig {
    /// Parses a configuration from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] on malformed TOML, unknown keys, or
    /// wrongly typed values.
    pub fn from_toml_str(source: &str) -> EcsResult<Self> {
        toml::from_str(source).map_err(|err| EcsError::InvalidConfig(err.to_string()))
    }

    /// Returns a copy with strict duplicate rejection.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.duplicate_policy = DuplicatePolicy::Reject;
        self
    }
}
