//! Resolver configuration.
//!
//! Configuration is read from TOML. Every field has a default, so an empty
//! document is a valid configuration.
//!
//! ```toml
//! max_depth = 100
//! builtin_capabilities = ["Display", "Clone"]
//! inherent_redefinition = "error"
//! ufcs_fallback = true
//!
//! [capability_exclusions]
//! Clone = ["Socket"]
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{TypeExpr, DEFAULT_MAX_DEPTH};

/// Configuration for a registry and its queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Bound on alias expansion, substitution, equality and obligation recursion.
    pub max_depth: usize,

    /// Interfaces every type satisfies without an impl.
    pub builtin_capabilities: Vec<String>,

    /// Per capability, the type names that do not get it for free.
    pub capability_exclusions: IndexMap<String, Vec<String>>,

    /// What happens when an inherent method is defined again for the same type
    /// in a separate methods block.
    pub inherent_redefinition: RedefinitionPolicy,

    /// Fall back to free functions when no method is found.
    pub ufcs_fallback: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            builtin_capabilities: vec!["Display".to_string(), "Clone".to_string()],
            capability_exclusions: IndexMap::new(),
            inherent_redefinition: RedefinitionPolicy::Error,
            ufcs_fallback: true,
        }
    }
}

/// Policy for redefining an inherent method across methods blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedefinitionPolicy {
    /// Reject the later definition.
    #[default]
    Error,
    /// The later definition shadows the earlier one.
    LastWins,
}

impl ResolverConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Whether `ty` gets `interface` as a built-in capability.
    pub fn has_builtin_capability(&self, interface: &str, ty: &TypeExpr) -> bool {
        if !self.builtin_capabilities.iter().any(|c| c == interface) {
            return false;
        }
        match (self.capability_exclusions.get(interface), ty.head_name()) {
            (Some(excluded), Some(head)) => !excluded.iter().any(|e| e == head),
            _ => true,
        }
    }
}
