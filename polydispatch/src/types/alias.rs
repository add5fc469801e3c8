//! Type alias expansion.
//!
//! Expansion is cycle-guarded: an alias that is already being expanded is
//! left in place as an opaque name. Expansion deeper than the table's depth
//! bound also returns the remaining subtree unchanged, so expansion is total.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::warn;

use super::{structurally_equal, Substitution, TypeExpr, DEFAULT_MAX_DEPTH};

/// A type alias declaration: `type Name A B = target`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAlias {
    /// The alias name.
    pub name: String,
    /// Alias parameters, substituted positionally on use.
    pub params: Vec<String>,
    /// The aliased type.
    pub target: TypeExpr,
}

impl TypeAlias {
    /// Create a parameterless alias.
    pub fn new(name: impl Into<String>, target: TypeExpr) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            target,
        }
    }

    /// Create a parameterised alias.
    pub fn with_params(name: impl Into<String>, params: &[&str], target: TypeExpr) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            target,
        }
    }
}

/// The alias table of a registry.
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: IndexMap<String, TypeAlias>,
    max_depth: usize,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasTable {
    /// Create an empty table with the default depth bound.
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Create an empty table with a custom depth bound.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            aliases: IndexMap::new(),
            max_depth,
        }
    }

    /// The depth bound used by expansion and equality.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Add an alias, returning any alias it replaces.
    pub fn insert(&mut self, alias: TypeAlias) -> Option<TypeAlias> {
        self.aliases.insert(alias.name.clone(), alias)
    }

    /// Look up an alias by name.
    pub fn get(&self, name: &str) -> Option<&TypeAlias> {
        self.aliases.get(name)
    }

    /// Number of aliases.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Fully expand every alias reference in `ty`.
    pub fn expand(&self, ty: &TypeExpr) -> TypeExpr {
        if self.aliases.is_empty() {
            return ty.clone();
        }
        let mut seen = FxHashSet::default();
        self.expand_aliases(ty, &mut seen)
    }

    /// Expand aliases, treating names in `seen` as already being expanded.
    ///
    /// `seen` is restored to its original contents on return.
    pub fn expand_aliases(&self, ty: &TypeExpr, seen: &mut FxHashSet<String>) -> TypeExpr {
        self.expand_at(ty, seen, 0)
    }

    fn expand_at(&self, ty: &TypeExpr, seen: &mut FxHashSet<String>, depth: usize) -> TypeExpr {
        if depth > self.max_depth {
            warn!(ty = %ty, "alias expansion depth limit reached; leaving type opaque");
            return ty.clone();
        }
        let next = depth + 1;
        match ty {
            TypeExpr::Simple(name) => match self.aliases.get(name) {
                Some(alias) if alias.params.is_empty() && !seen.contains(name) => {
                    seen.insert(name.clone());
                    let expanded = self.expand_at(&alias.target, seen, next);
                    seen.remove(name);
                    expanded
                }
                _ => ty.clone(),
            },
            TypeExpr::Generic { base, args } => {
                let args: Vec<TypeExpr> = args
                    .iter()
                    .map(|a| self.expand_at(a, seen, next))
                    .collect();
                if let TypeExpr::Simple(name) = base.as_ref() {
                    if let Some(alias) = self.aliases.get(name) {
                        if !alias.params.is_empty()
                            && alias.params.len() == args.len()
                            && !seen.contains(name)
                        {
                            let subst = Substitution::from_pairs(
                                alias.params.iter().cloned().zip(args.iter().cloned()),
                            );
                            let body = subst.apply_bounded(&alias.target, self.max_depth);
                            seen.insert(name.clone());
                            let expanded = self.expand_at(&body, seen, next);
                            seen.remove(name);
                            return expanded;
                        }
                    }
                }
                let base = self.expand_at(base, seen, next);
                TypeExpr::apply(base, args)
            }
            TypeExpr::Nullable(inner) => TypeExpr::nullable(self.expand_at(inner, seen, next)),
            TypeExpr::Fallible(inner) => TypeExpr::fallible(self.expand_at(inner, seen, next)),
            TypeExpr::Function { params, ret } => TypeExpr::function(
                params.iter().map(|p| self.expand_at(p, seen, next)).collect(),
                self.expand_at(ret, seen, next),
            ),
            TypeExpr::Union(members) => {
                TypeExpr::union(members.iter().map(|m| self.expand_at(m, seen, next)).collect())
            }
            TypeExpr::Wildcard | TypeExpr::SelfRef => ty.clone(),
        }
    }

    /// Structural equality after alias expansion, bounded by the table's depth.
    pub fn structural_equals(&self, a: &TypeExpr, b: &TypeExpr) -> bool {
        structurally_equal(&self.expand(a), &self.expand(b), self.max_depth)
    }
}
