//! Type expressions as seen by implementation resolution.
//!
//! A [`TypeExpr`] is a closed sum type: every consumer (matcher, solver,
//! comparator) switches over it exhaustively. Values are immutable and are
//! compared structurally, normally after alias expansion through an
//! [`AliasTable`].
//!
//! Generic applications are kept flat: `HashMap K V` is a single
//! `Generic { base: HashMap, args: [K, V] }`, never a nested application of
//! `HashMap K` to `V`. [`TypeExpr::apply`] maintains this.

use std::fmt;

use rustc_hash::FxHashSet;

mod alias;
mod subst;

pub use alias::{AliasTable, TypeAlias};
pub use subst::Substitution;

/// Default bound for every recursive walk over type expressions.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// A type expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    /// A named type, generic parameter, or alias reference.
    Simple(String),
    /// A type constructor applied to arguments: `Array i32`.
    Generic {
        /// The constructor being applied.
        base: Box<TypeExpr>,
        /// The type arguments, in order.
        args: Vec<TypeExpr>,
    },
    /// `?T`
    Nullable(Box<TypeExpr>),
    /// `!T`
    Fallible(Box<TypeExpr>),
    /// `(A, B) -> R`
    Function {
        /// Parameter types.
        params: Vec<TypeExpr>,
        /// Return type.
        ret: Box<TypeExpr>,
    },
    /// `A | B | C`
    Union(Vec<TypeExpr>),
    /// `_`: an unconstrained argument position.
    Wildcard,
    /// `Self`: the implementing type inside an interface or impl.
    SelfRef,
}

impl TypeExpr {
    /// Create a named type.
    pub fn simple(name: impl Into<String>) -> Self {
        TypeExpr::Simple(name.into())
    }

    /// Create a generic application of a named constructor.
    pub fn generic(base: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        Self::apply(TypeExpr::Simple(base.into()), args)
    }

    /// Apply `base` to `args`, flattening nested applications.
    ///
    /// Applying to no arguments returns `base` unchanged.
    pub fn apply(base: TypeExpr, args: Vec<TypeExpr>) -> Self {
        if args.is_empty() {
            return base;
        }
        match base {
            TypeExpr::Generic { base: inner, args: mut leading } => {
                leading.extend(args);
                TypeExpr::Generic { base: inner, args: leading }
            }
            other => TypeExpr::Generic { base: Box::new(other), args },
        }
    }

    /// Create a nullable type.
    pub fn nullable(inner: TypeExpr) -> Self {
        TypeExpr::Nullable(Box::new(inner))
    }

    /// Create a fallible type.
    pub fn fallible(inner: TypeExpr) -> Self {
        TypeExpr::Fallible(Box::new(inner))
    }

    /// Create a function type.
    pub fn function(params: Vec<TypeExpr>, ret: TypeExpr) -> Self {
        TypeExpr::Function { params, ret: Box::new(ret) }
    }

    /// Create a union type.
    ///
    /// Nested unions are flattened and syntactic duplicates dropped. A union
    /// of a single member is that member.
    pub fn union(members: Vec<TypeExpr>) -> Self {
        let mut flat: Vec<TypeExpr> = Vec::with_capacity(members.len());
        for member in members {
            let parts = match member {
                TypeExpr::Union(inner) => inner,
                other => vec![other],
            };
            for part in parts {
                if !flat.contains(&part) {
                    flat.push(part);
                }
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(TypeExpr::Wildcard)
        } else {
            TypeExpr::Union(flat)
        }
    }

    /// The name at the head of this type: `Array` for `Array i32`.
    pub fn head_name(&self) -> Option<&str> {
        match self {
            TypeExpr::Simple(name) => Some(name),
            TypeExpr::Generic { base, .. } => base.head_name(),
            _ => None,
        }
    }

    /// Whether this is a union type.
    pub fn is_union(&self) -> bool {
        matches!(self, TypeExpr::Union(_))
    }

    /// The members of a union, or the type itself as a single member.
    pub fn union_members(&self) -> Vec<&TypeExpr> {
        match self {
            TypeExpr::Union(members) => members.iter().collect(),
            other => vec![other],
        }
    }

    /// Whether this is a constructor shape such as `F _`: an application
    /// whose arguments are all wildcards.
    pub fn is_constructor_shape(&self) -> bool {
        match self {
            TypeExpr::Generic { args, .. } => args.iter().all(|a| matches!(a, TypeExpr::Wildcard)),
            _ => false,
        }
    }

    /// Whether any `Simple` name in this type is one of `names`.
    pub fn mentions_any(&self, names: &FxHashSet<String>) -> bool {
        if names.is_empty() {
            return false;
        }
        match self {
            TypeExpr::Simple(name) => names.contains(name),
            TypeExpr::Generic { base, args } => {
                base.mentions_any(names) || args.iter().any(|a| a.mentions_any(names))
            }
            TypeExpr::Nullable(inner) | TypeExpr::Fallible(inner) => inner.mentions_any(names),
            TypeExpr::Function { params, ret } => {
                params.iter().any(|p| p.mentions_any(names)) || ret.mentions_any(names)
            }
            TypeExpr::Union(members) => members.iter().any(|m| m.mentions_any(names)),
            TypeExpr::Wildcard | TypeExpr::SelfRef => false,
        }
    }

    /// Whether a wildcard occurs anywhere in this type.
    pub fn contains_wildcard(&self) -> bool {
        match self {
            TypeExpr::Wildcard => true,
            TypeExpr::Generic { base, args } => {
                base.contains_wildcard() || args.iter().any(TypeExpr::contains_wildcard)
            }
            TypeExpr::Nullable(inner) | TypeExpr::Fallible(inner) => inner.contains_wildcard(),
            TypeExpr::Function { params, ret } => {
                params.iter().any(TypeExpr::contains_wildcard) || ret.contains_wildcard()
            }
            TypeExpr::Union(members) => members.iter().any(TypeExpr::contains_wildcard),
            TypeExpr::Simple(_) | TypeExpr::SelfRef => false,
        }
    }

    /// Whether this type needs parentheses when it appears as a generic argument.
    fn needs_parens_as_arg(&self) -> bool {
        matches!(
            self,
            TypeExpr::Generic { .. } | TypeExpr::Union(_) | TypeExpr::Function { .. }
        )
    }
}

/// Structural equality without alias expansion.
///
/// Unions compare as sets. Returns `false` once `max_depth` is exceeded.
pub fn structurally_equal(a: &TypeExpr, b: &TypeExpr, max_depth: usize) -> bool {
    equal_at(a, b, 0, max_depth)
}

fn equal_at(a: &TypeExpr, b: &TypeExpr, depth: usize, max_depth: usize) -> bool {
    if depth > max_depth {
        return false;
    }
    let next = depth + 1;
    match (a, b) {
        (TypeExpr::Simple(x), TypeExpr::Simple(y)) => x == y,
        (
            TypeExpr::Generic { base: a_base, args: a_args },
            TypeExpr::Generic { base: b_base, args: b_args },
        ) => {
            a_args.len() == b_args.len()
                && equal_at(a_base, b_base, next, max_depth)
                && a_args.iter().zip(b_args).all(|(x, y)| equal_at(x, y, next, max_depth))
        }
        (TypeExpr::Nullable(x), TypeExpr::Nullable(y))
        | (TypeExpr::Fallible(x), TypeExpr::Fallible(y)) => equal_at(x, y, next, max_depth),
        (
            TypeExpr::Function { params: a_params, ret: a_ret },
            TypeExpr::Function { params: b_params, ret: b_ret },
        ) => {
            a_params.len() == b_params.len()
                && a_params.iter().zip(b_params).all(|(x, y)| equal_at(x, y, next, max_depth))
                && equal_at(a_ret, b_ret, next, max_depth)
        }
        (TypeExpr::Union(a_members), TypeExpr::Union(b_members)) => {
            a_members
                .iter()
                .all(|x| b_members.iter().any(|y| equal_at(x, y, next, max_depth)))
                && b_members
                    .iter()
                    .all(|y| a_members.iter().any(|x| equal_at(x, y, next, max_depth)))
        }
        (TypeExpr::Wildcard, TypeExpr::Wildcard) => true,
        (TypeExpr::SelfRef, TypeExpr::SelfRef) => true,
        _ => false,
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Simple(name) => write!(f, "{}", name),
            TypeExpr::Generic { base, args } => {
                write!(f, "{}", base)?;
                for arg in args {
                    if arg.needs_parens_as_arg() {
                        write!(f, " ({})", arg)?;
                    } else {
                        write!(f, " {}", arg)?;
                    }
                }
                Ok(())
            }
            TypeExpr::Nullable(inner) => write_prefixed(f, '?', inner),
            TypeExpr::Fallible(inner) => write_prefixed(f, '!', inner),
            TypeExpr::Function { params, ret } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", ret)
            }
            TypeExpr::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    if matches!(member, TypeExpr::Function { .. }) {
                        write!(f, "({})", member)?;
                    } else {
                        write!(f, "{}", member)?;
                    }
                }
                Ok(())
            }
            TypeExpr::Wildcard => write!(f, "_"),
            TypeExpr::SelfRef => write!(f, "Self"),
        }
    }
}

fn write_prefixed(f: &mut fmt::Formatter<'_>, prefix: char, inner: &TypeExpr) -> fmt::Result {
    if matches!(inner, TypeExpr::Union(_) | TypeExpr::Function { .. }) {
        write!(f, "{}({})", prefix, inner)
    } else {
        write!(f, "{}{}", prefix, inner)
    }
}
