//! Error types for registration, resolution and configuration.
//!
//! Every variant carries the structured data needed to render its
//! diagnostic; callers never re-derive context.

use std::path::PathBuf;

use thiserror::Error;

use crate::decl::FnSig;
use crate::solver::ObligationChain;
use crate::types::TypeExpr;

/// An error raised while registering declarations.
///
/// A failed registration leaves the registry exactly as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// Two unnamed impls of one interface overlap and neither is more specific.
    #[error("conflicting unnamed impls of `{interface}` for `{type_a}` and `{type_b}`")]
    CoherenceConflict {
        interface: String,
        type_a: TypeExpr,
        type_b: TypeExpr,
    },

    /// An impl target does not have the shape the interface's self type requires.
    #[error("impl of `{interface}` for `{found}` does not match the interface self type `{expected}`")]
    ShapeMismatch {
        interface: String,
        expected: TypeExpr,
        found: TypeExpr,
    },

    /// An impl or bound names an interface that was never registered.
    #[error("unknown interface `{0}`")]
    UnknownInterface(String),

    /// An interface name was registered twice.
    #[error("interface `{0}` is already registered")]
    DuplicateInterface(String),

    /// Two impls share an explicit name.
    #[error("an impl named `{0}` is already registered")]
    DuplicateImplName(String),

    /// The same method name appears twice in one block.
    #[error("method `{method}` is defined more than once in {owner}")]
    DuplicateMethod { owner: String, method: String },

    /// An inherent method is defined again for the same type in another block.
    #[error("inherent method `{method}` is already defined for `{target}`")]
    InherentRedefinition { target: TypeExpr, method: String },

    /// An impl lacks a method the interface requires.
    #[error("{owner} is missing method `{method}`")]
    MissingMethod { owner: String, method: String },

    /// An impl method disagrees with the interface signature.
    #[error("{owner} method `{method}` expected signature `{expected}`, found `{found}`")]
    SignatureMismatch {
        owner: String,
        method: String,
        expected: FnSig,
        found: FnSig,
    },
}

/// An error returned by a resolution query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// Nothing provides `member` for `receiver`.
    #[error("no `{member}` found for `{receiver}`")]
    NotFound { receiver: TypeExpr, member: String },

    /// Several candidates are maximally specific.
    #[error("ambiguous `{member}` for `{receiver}`: {}", .candidates.join(", "))]
    Ambiguous {
        receiver: TypeExpr,
        member: String,
        candidates: Vec<String>,
    },

    /// Candidates matched but their obligations do not hold.
    #[error("constraint not satisfied: {0}")]
    ConstraintUnsatisfied(ObligationChain),
}

/// An error loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for [`crate::ResolverConfig`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
