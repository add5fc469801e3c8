//! Matching concrete types against declared target patterns.
//!
//! A pattern is a [`TypeExpr`] in which some `Simple` names are the
//! declaration's generic parameters. Matching a concrete type against a
//! pattern either fails or yields the [`Substitution`] that binds those
//! parameters; applying the substitution to the pattern reproduces the
//! concrete type.
//!
//! # Rules
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | generic `T` | anything, binding `T` |
//! | `Name` | `Name`; also `Name ...` when matching a constructor self type |
//! | `Base a b` | an application with at least as many arguments |
//! | `_` | anything |
//! | `?T`, `!T` | the same wrapper |
//! | `(A) -> R` | a function of equal arity |
//! | `A \| B` | a member of the union, or a union of members |
//! | `Self` | `Self` |
//!
//! Applications match right-aligned: the pattern `F _` against
//! `HashMap K V` binds `F` to the partial application `HashMap K`. Only a
//! generic base may absorb leading arguments this way, and a wildcard
//! argument therefore only ever matches inside a constructor application,
//! never a bare type like `i32`.

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::types::{structurally_equal, AliasTable, Substitution, TypeExpr};

/// Matches concrete types against a declaration's target pattern.
pub struct TypeMatcher<'a> {
    /// Alias table used to canonicalise both sides.
    aliases: &'a AliasTable,
    /// The declaration's generic parameter names.
    generics: &'a FxHashSet<String>,
    /// Whether a bare top-level name may match any application of that name.
    constructor_self: bool,
}

impl<'a> TypeMatcher<'a> {
    /// Create a matcher for a declaration with the given generics.
    pub fn new(aliases: &'a AliasTable, generics: &'a FxHashSet<String>) -> Self {
        Self {
            aliases,
            generics,
            constructor_self: false,
        }
    }

    /// Treat a bare target name as a constructor of any arity.
    ///
    /// Used when the implemented interface declares a constructor self type
    /// (`for C _`), so `impl Enumerable for HashMap` matches `HashMap K V`.
    pub fn constructor_self(mut self, enabled: bool) -> Self {
        self.constructor_self = enabled;
        self
    }

    /// Match `concrete` against `pattern`.
    pub fn match_type(&self, pattern: &TypeExpr, concrete: &TypeExpr) -> Option<Substitution> {
        let mut subst = Substitution::new();
        if self.match_into(pattern, concrete, &mut subst) {
            Some(subst)
        } else {
            None
        }
    }

    /// Match `concrete` against `pattern`, extending `subst`.
    ///
    /// On failure `subst` is left untouched.
    pub fn match_into(
        &self,
        pattern: &TypeExpr,
        concrete: &TypeExpr,
        subst: &mut Substitution,
    ) -> bool {
        let pattern = self.aliases.expand(pattern);
        let concrete = self.aliases.expand(concrete);
        let matched = self.try_match(&pattern, &concrete, subst, 0);
        trace!(%pattern, %concrete, matched, "match");
        matched
    }

    fn try_match(
        &self,
        pattern: &TypeExpr,
        concrete: &TypeExpr,
        subst: &mut Substitution,
        depth: usize,
    ) -> bool {
        let mut trial = subst.clone();
        if self.match_at(pattern, concrete, &mut trial, depth) {
            *subst = trial;
            true
        } else {
            false
        }
    }

    fn match_at(
        &self,
        pattern: &TypeExpr,
        concrete: &TypeExpr,
        subst: &mut Substitution,
        depth: usize,
    ) -> bool {
        if depth > self.aliases.max_depth() {
            return false;
        }
        let next = depth + 1;
        match pattern {
            TypeExpr::Wildcard => true,

            TypeExpr::Simple(name) if self.generics.contains(name) => {
                subst.unify_binding(name, concrete)
            }

            TypeExpr::Simple(name) => match concrete {
                TypeExpr::Simple(other) => name == other,
                TypeExpr::Generic { .. } if self.constructor_self && depth == 0 => {
                    concrete.head_name() == Some(name.as_str())
                }
                _ => false,
            },

            TypeExpr::Generic { base, args } => {
                let TypeExpr::Generic { base: c_base, args: c_args } = concrete else {
                    return false;
                };
                if c_args.len() < args.len() {
                    return false;
                }
                let split = c_args.len() - args.len();
                let c_head = if split == 0 {
                    c_base.as_ref().clone()
                } else {
                    // Only a generic parameter can stand for a partial application.
                    if !matches!(base.as_ref(), TypeExpr::Simple(n) if self.generics.contains(n)) {
                        return false;
                    }
                    TypeExpr::apply(c_base.as_ref().clone(), c_args[..split].to_vec())
                };
                self.match_at(base, &c_head, subst, next)
                    && args
                        .iter()
                        .zip(&c_args[split..])
                        .all(|(p, c)| self.match_at(p, c, subst, next))
            }

            TypeExpr::Nullable(inner) => match concrete {
                TypeExpr::Nullable(c_inner) => self.match_at(inner, c_inner, subst, next),
                _ => false,
            },

            TypeExpr::Fallible(inner) => match concrete {
                TypeExpr::Fallible(c_inner) => self.match_at(inner, c_inner, subst, next),
                _ => false,
            },

            TypeExpr::Function { params, ret } => match concrete {
                TypeExpr::Function { params: c_params, ret: c_ret } => {
                    params.len() == c_params.len()
                        && params
                            .iter()
                            .zip(c_params)
                            .all(|(p, c)| self.match_at(p, c, subst, next))
                        && self.match_at(ret, c_ret, subst, next)
                }
                _ => false,
            },

            TypeExpr::Union(members) => match concrete {
                TypeExpr::Union(c_members) => self.match_members(members, c_members, subst, next),
                _ => self
                    .members_concrete_first(members)
                    .any(|p| self.try_match(p, concrete, subst, next)),
            },

            TypeExpr::SelfRef => matches!(concrete, TypeExpr::SelfRef),
        }
    }

    /// Assign every concrete member to some pattern member, backtracking
    /// until the bindings agree.
    fn match_members(
        &self,
        patterns: &[TypeExpr],
        concrete: &[TypeExpr],
        subst: &mut Substitution,
        depth: usize,
    ) -> bool {
        let Some((first, rest)) = concrete.split_first() else {
            return true;
        };
        self.members_concrete_first(patterns).any(|p| {
            let mut trial = subst.clone();
            if self.match_at(p, first, &mut trial, depth)
                && self.match_members(patterns, rest, &mut trial, depth)
            {
                *subst = trial;
                true
            } else {
                false
            }
        })
    }

    /// Pattern members that mention no generic parameter, then the rest.
    fn members_concrete_first<'p>(
        &self,
        members: &'p [TypeExpr],
    ) -> impl Iterator<Item = &'p TypeExpr> + 'p {
        let generics = self.generics;
        let (generic, fixed): (Vec<&TypeExpr>, Vec<&TypeExpr>) =
            members.iter().partition(|m| m.mentions_any(generics));
        fixed.into_iter().chain(generic)
    }
}

/// Whether two target patterns could both match some concrete type.
///
/// Generic parameters on either side are treated as matching anything,
/// without tracking binding consistency, so this over-approximates overlap.
///
/// With `constructor_self`, a bare top-level name also overlaps every
/// application of that name, as it does when matching targets of an
/// interface with a constructor self type.
pub fn patterns_overlap(
    aliases: &AliasTable,
    a: &TypeExpr,
    a_generics: &FxHashSet<String>,
    b: &TypeExpr,
    b_generics: &FxHashSet<String>,
    constructor_self: bool,
) -> bool {
    let sides = OverlapSides {
        a_generics,
        b_generics,
        constructor_self,
        max_depth: aliases.max_depth(),
    };
    sides.overlap(&aliases.expand(a), &aliases.expand(b), 0)
}

struct OverlapSides<'a> {
    a_generics: &'a FxHashSet<String>,
    b_generics: &'a FxHashSet<String>,
    constructor_self: bool,
    max_depth: usize,
}

impl OverlapSides<'_> {
    fn is_var(names: &FxHashSet<String>, ty: &TypeExpr) -> bool {
        matches!(ty, TypeExpr::Simple(n) if names.contains(n)) || matches!(ty, TypeExpr::Wildcard)
    }

    fn overlap(&self, a: &TypeExpr, b: &TypeExpr, depth: usize) -> bool {
        if depth > self.max_depth {
            return true;
        }
        if Self::is_var(self.a_generics, a) || Self::is_var(self.b_generics, b) {
            return true;
        }
        let next = depth + 1;
        match (a, b) {
            (TypeExpr::Union(members), _) => members.iter().any(|m| self.overlap(m, b, next)),
            (_, TypeExpr::Union(members)) => members.iter().any(|m| self.overlap(a, m, next)),
            (TypeExpr::Simple(x), TypeExpr::Simple(y)) => x == y,
            (
                TypeExpr::Generic { base: a_base, args: a_args },
                TypeExpr::Generic { base: b_base, args: b_args },
            ) => {
                if a_args.len() != b_args.len() {
                    let shorter_base = if a_args.len() < b_args.len() {
                        Self::is_var(self.a_generics, a_base)
                    } else {
                        Self::is_var(self.b_generics, b_base)
                    };
                    return shorter_base;
                }
                self.overlap(a_base, b_base, next)
                    && a_args.iter().zip(b_args).all(|(x, y)| self.overlap(x, y, next))
            }
            // A bare name stands for the constructor only at the top level.
            (TypeExpr::Simple(x), TypeExpr::Generic { .. }) => {
                self.constructor_self && depth == 0 && b.head_name() == Some(x.as_str())
            }
            (TypeExpr::Generic { .. }, TypeExpr::Simple(y)) => {
                self.constructor_self && depth == 0 && a.head_name() == Some(y.as_str())
            }
            (TypeExpr::Nullable(x), TypeExpr::Nullable(y))
            | (TypeExpr::Fallible(x), TypeExpr::Fallible(y)) => self.overlap(x, y, next),
            (
                TypeExpr::Function { params: a_params, ret: a_ret },
                TypeExpr::Function { params: b_params, ret: b_ret },
            ) => {
                a_params.len() == b_params.len()
                    && a_params.iter().zip(b_params).all(|(x, y)| self.overlap(x, y, next))
                    && self.overlap(a_ret, b_ret, next)
            }
            (TypeExpr::SelfRef, TypeExpr::SelfRef) => true,
            _ => false,
        }
    }
}

/// Whether pattern `a` is an instance of pattern `b`: `b` matches `a` when
/// `a`'s own generic parameters are held rigid.
///
/// Returns the renaming of `b`'s parameters in terms of `a`.
pub fn instance_of(
    aliases: &AliasTable,
    a: &TypeExpr,
    b: &TypeExpr,
    b_generics: &FxHashSet<String>,
) -> Option<Substitution> {
    TypeMatcher::new(aliases, b_generics).match_type(b, a)
}

/// Drop structurally equal duplicates, preserving first-seen order.
pub(crate) fn dedup_types(types: Vec<TypeExpr>, max_depth: usize) -> Vec<TypeExpr> {
    let mut out: Vec<TypeExpr> = Vec::with_capacity(types.len());
    for ty in types {
        if !out.iter().any(|o| structurally_equal(o, &ty, max_depth)) {
            out.push(ty);
        }
    }
    out
}
