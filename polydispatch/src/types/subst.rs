//! Generic parameter substitutions.

use std::fmt;

use indexmap::IndexMap;

use super::{structurally_equal, TypeExpr, DEFAULT_MAX_DEPTH};

/// A mapping from generic parameter names to types.
///
/// `Self` is tracked separately: it is replaced only when the substitution
/// was explicitly bound to an implementing type with [`Substitution::with_self`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    bindings: IndexMap<String, TypeExpr>,
    self_ty: Option<TypeExpr>,
}

impl Substitution {
    /// Create an empty substitution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a substitution from `(name, type)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, TypeExpr)>) -> Self {
        Self {
            bindings: pairs.into_iter().collect(),
            self_ty: None,
        }
    }

    /// Bind `Self` to the implementing type.
    pub fn with_self(mut self, ty: TypeExpr) -> Self {
        self.self_ty = Some(ty);
        self
    }

    /// The type `Self` is bound to, if any.
    pub fn self_ty(&self) -> Option<&TypeExpr> {
        self.self_ty.as_ref()
    }

    /// Look up a binding.
    pub fn get(&self, name: &str) -> Option<&TypeExpr> {
        self.bindings.get(name)
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bind `name`, returning the previous binding.
    pub fn bind(&mut self, name: impl Into<String>, ty: TypeExpr) -> Option<TypeExpr> {
        self.bindings.insert(name.into(), ty)
    }

    /// Bind `name` unless it is already bound to a different type.
    ///
    /// Returns `false` on a conflicting binding, leaving the substitution unchanged.
    pub fn unify_binding(&mut self, name: &str, ty: &TypeExpr) -> bool {
        match self.bindings.get(name) {
            Some(existing) => structurally_equal(existing, ty, DEFAULT_MAX_DEPTH),
            None => {
                self.bindings.insert(name.to_string(), ty.clone());
                true
            }
        }
    }

    /// Number of generic bindings (excluding `Self`).
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no generic bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterate over bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeExpr)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Apply this substitution with the default depth bound.
    pub fn apply(&self, ty: &TypeExpr) -> TypeExpr {
        self.apply_bounded(ty, DEFAULT_MAX_DEPTH)
    }

    /// Apply this substitution.
    ///
    /// Replacement is a single pass: substituted types are not themselves
    /// rewritten. Subtrees deeper than `max_depth` are returned unchanged.
    pub fn apply_bounded(&self, ty: &TypeExpr, max_depth: usize) -> TypeExpr {
        self.apply_at(ty, 0, max_depth)
    }

    fn apply_at(&self, ty: &TypeExpr, depth: usize, max_depth: usize) -> TypeExpr {
        if depth > max_depth || (self.bindings.is_empty() && self.self_ty.is_none()) {
            return ty.clone();
        }
        let next = depth + 1;
        match ty {
            TypeExpr::Simple(name) => self
                .bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| ty.clone()),
            TypeExpr::Generic { base, args } => {
                let base = self.apply_at(base, next, max_depth);
                let args = args.iter().map(|a| self.apply_at(a, next, max_depth)).collect();
                TypeExpr::apply(base, args)
            }
            TypeExpr::Nullable(inner) => TypeExpr::nullable(self.apply_at(inner, next, max_depth)),
            TypeExpr::Fallible(inner) => TypeExpr::fallible(self.apply_at(inner, next, max_depth)),
            TypeExpr::Function { params, ret } => TypeExpr::function(
                params.iter().map(|p| self.apply_at(p, next, max_depth)).collect(),
                self.apply_at(ret, next, max_depth),
            ),
            TypeExpr::Union(members) => {
                TypeExpr::union(members.iter().map(|m| self.apply_at(m, next, max_depth)).collect())
            }
            TypeExpr::SelfRef => self.self_ty.clone().unwrap_or(TypeExpr::SelfRef),
            TypeExpr::Wildcard => TypeExpr::Wildcard,
        }
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        if let Some(self_ty) = &self.self_ty {
            write!(f, "Self = {}", self_ty)?;
            first = false;
        }
        for (name, ty) in &self.bindings {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", name, ty)?;
            first = false;
        }
        write!(f, "}}")
    }
}
