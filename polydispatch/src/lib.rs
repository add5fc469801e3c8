//! Polydispatch: Interface Implementation Resolution
//!
//! Decides which implementation body runs for a receiver type and a
//! requested interface or method name, and proves the interface bounds that
//! generic implementations place on their parameters.
//!
//! # Components
//!
//! - [`types`]: type expressions, substitutions and alias expansion
//! - [`matcher`]: matching concrete types against implementation targets
//! - `solver`: discharging `T: Interface` obligations
//! - [`specificity`]: ordering candidates that match the same type
//! - [`registry`]: registration, coherence checking and dispatch queries
//!
//! # Example
//!
//! ```rust,ignore
//! use polydispatch::{RegistryBuilder, ResolverConfig, TypeExpr};
//!
//! let mut builder = RegistryBuilder::new(ResolverConfig::default());
//! builder.register_interface(show)?;
//! builder.register_impl(show_for_wrapper)?;
//! let registry = builder.freeze();
//!
//! let ty = TypeExpr::generic("Wrapper", vec![TypeExpr::simple("i32")]);
//! let method = registry.resolve_method(&ty, "show", None)?;
//! ```

pub mod config;
pub mod decl;
pub mod error;
pub mod matcher;
pub mod registry;
mod solver;
pub mod specificity;
pub mod types;

pub use config::{RedefinitionPolicy, ResolverConfig};
pub use decl::{
    BodyId, FnSig, FreeFunction, GenericDecl, GenericParam, ImplRecord, InterfaceConstraint,
    InterfaceDef, MethodDef, MethodSet, MethodSig, WhereClause,
};
pub use error::{ConfigError, RegistrationError, ResolutionError};
pub use matcher::TypeMatcher;
pub use registry::{BoundMethod, ImplId, ImplMatch, MethodSource, Registry, RegistryBuilder};
pub use solver::{Obligation, ObligationChain};
pub use specificity::{Specificity, SpecificityComparator};
pub use types::{AliasTable, Substitution, TypeAlias, TypeExpr};
