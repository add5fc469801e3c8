//! Obligation checking: proving that a type satisfies an interface bound.
//!
//! An obligation `T: I` is discharged by, in order:
//!
//! 1. a built-in capability from the configuration,
//! 2. an inherent method set on `T` that provides every required method of `I`,
//! 3. an unnamed impl of `I` whose target matches `T` and whose own bounds
//!    hold recursively,
//! 4. for a union `T`, every member satisfying `I`.
//!
//! Base interfaces of `I` are then required as well. A failure is reported
//! as an [`ObligationChain`] from the innermost unmet obligation out to the
//! one originally asked about.

use std::fmt;

use tracing::{trace, warn};

use crate::decl::{GenericDecl, ImplRecord, InterfaceConstraint, InterfaceDef};
use crate::matcher::TypeMatcher;
use crate::registry::validate::signatures_compatible;
use crate::registry::Tables;
use crate::types::{Substitution, TypeExpr};

/// A single requirement: `ty` must implement `interface`.
#[derive(Debug, Clone, PartialEq)]
pub struct Obligation {
    /// The type under obligation.
    pub ty: TypeExpr,
    /// The required interface.
    pub interface: InterfaceConstraint,
}

impl Obligation {
    /// Create an obligation.
    pub fn new(ty: TypeExpr, interface: InterfaceConstraint) -> Self {
        Self { ty, interface }
    }
}

impl fmt::Display for Obligation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.ty, self.interface)
    }
}

/// Nested obligations left outstanding by a failed check, innermost first.
///
/// The query that started the check is kept apart as the root. It only
/// counts as part of the chain when it is itself the obligation that
/// failed, so `Wrapper (Wrapper Opaque): Show` yields the two nested
/// obligations `Opaque: Show` and `Wrapper Opaque: Show`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObligationChain {
    obligations: Vec<Obligation>,
    root: Option<Obligation>,
    truncated: bool,
}

impl ObligationChain {
    /// A chain holding one unmet obligation.
    pub fn single(obligation: Obligation) -> Self {
        Self {
            obligations: vec![obligation],
            root: None,
            truncated: false,
        }
    }

    /// A chain cut off by the recursion bound at `obligation`.
    pub fn truncated(obligation: Obligation) -> Self {
        Self {
            obligations: vec![obligation],
            root: None,
            truncated: true,
        }
    }

    /// Record the obligation that required this chain.
    pub fn within(mut self, outer: Obligation) -> Self {
        if let Some(root) = self.root.take() {
            self.obligations.push(root);
        }
        self.obligations.push(outer);
        self
    }

    /// Mark the outermost obligation as the query that started the check.
    pub(crate) fn rooted(mut self) -> Self {
        if self.root.is_none() && self.obligations.len() > 1 {
            self.root = self.obligations.pop();
        }
        self
    }

    /// Number of nested obligations, not counting the root query.
    pub fn len(&self) -> usize {
        self.obligations.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.obligations.is_empty()
    }

    /// Nested obligations, innermost first.
    pub fn iter(&self) -> impl Iterator<Item = &Obligation> {
        self.obligations.iter()
    }

    /// The obligation that actually failed.
    pub fn innermost(&self) -> Option<&Obligation> {
        self.obligations.first()
    }

    /// The obligation originally asked about.
    pub fn root(&self) -> Option<&Obligation> {
        self.root.as_ref().or_else(|| self.obligations.last())
    }

    /// Whether the recursion bound cut the check short.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl fmt::Display for ObligationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.obligations.iter();
        if let Some(first) = iter.next() {
            write!(f, "{} does not implement {}", first.ty, first.interface)?;
        }
        for outer in iter.chain(&self.root) {
            write!(f, ", required by {}", outer)?;
        }
        if self.truncated {
            write!(f, ", ... (depth limit reached)")?;
        }
        Ok(())
    }
}

/// Proves interface obligations against a registry snapshot.
pub(crate) struct ConstraintSolver<'a> {
    tables: &'a Tables,
}

impl<'a> ConstraintSolver<'a> {
    pub(crate) fn new(tables: &'a Tables) -> Self {
        Self { tables }
    }

    /// Check `ty: bound`.
    pub(crate) fn check(
        &self,
        ty: &TypeExpr,
        bound: &InterfaceConstraint,
    ) -> Result<(), ObligationChain> {
        self.satisfies(ty, bound, 0).map_err(ObligationChain::rooted)
    }

    fn satisfies(
        &self,
        ty: &TypeExpr,
        bound: &InterfaceConstraint,
        depth: usize,
    ) -> Result<(), ObligationChain> {
        let ty = self.tables.aliases.expand(ty);
        let obligation = Obligation::new(ty.clone(), bound.clone());
        trace!(%obligation, depth, "checking obligation");

        if depth >= self.tables.config.max_depth {
            warn!(%obligation, "obligation depth limit reached");
            return Err(ObligationChain::truncated(obligation));
        }
        let config = &self.tables.config;
        if bound.args.is_empty() && config.has_builtin_capability(&bound.interface, &ty) {
            return Ok(());
        }
        let Some(iface) = self.tables.interfaces.get(&bound.interface) else {
            return Err(ObligationChain::single(obligation));
        };
        if !self.fits_self_pattern(iface, &ty) {
            return Err(ObligationChain::single(obligation));
        }

        if let Err(inner) = self.discharge_direct(&ty, bound, iface, depth) {
            let members = match &ty {
                TypeExpr::Union(members) => members,
                _ => {
                    return Err(match inner {
                        Some(chain) => chain.within(obligation),
                        None => ObligationChain::single(obligation),
                    })
                }
            };
            for member in members {
                self.satisfies(member, bound, depth + 1)
                    .map_err(|chain| chain.within(obligation.clone()))?;
            }
        }

        self.bases_hold(&ty, bound, depth)
            .map_err(|chain| chain.within(obligation))
    }

    /// Check that `ty` satisfies every interface `bound` extends.
    pub(crate) fn bases_hold(
        &self,
        ty: &TypeExpr,
        bound: &InterfaceConstraint,
        depth: usize,
    ) -> Result<(), ObligationChain> {
        let Some(iface) = self.tables.interfaces.get(&bound.interface) else {
            return Ok(());
        };
        let base_subst = interface_arg_subst(iface, bound);
        for base in &iface.bases {
            let base = InterfaceConstraint::with_args(
                base.interface.clone(),
                base.args.iter().map(|a| base_subst.apply(a)).collect(),
            );
            self.satisfies(ty, &base, depth + 1)?;
        }
        Ok(())
    }

    /// Check everything an impl selected for `ty: bound` relies on: its
    /// own where-clauses under `subst`, then the bases of `bound`.
    ///
    /// The returned chain ends at `ty: bound` itself.
    pub(crate) fn impl_holds(
        &self,
        record: &ImplRecord,
        subst: &Substitution,
        ty: &TypeExpr,
        bound: &InterfaceConstraint,
    ) -> Result<(), ObligationChain> {
        self.obligations_hold(record, subst, 0)
            .and_then(|()| self.bases_hold(ty, bound, 0))
            .map_err(|chain| {
                chain
                    .within(Obligation::new(ty.clone(), bound.clone()))
                    .rooted()
            })
    }

    /// Try inherent methods, then unnamed impls.
    ///
    /// `Err(None)` means nothing matched; `Err(Some(chain))` carries the
    /// longest chain from a candidate whose own bounds failed.
    fn discharge_direct(
        &self,
        ty: &TypeExpr,
        bound: &InterfaceConstraint,
        iface: &InterfaceDef,
        depth: usize,
    ) -> Result<(), Option<ObligationChain>> {
        if self.inherent_provides(ty, bound, iface, depth) {
            trace!(%ty, interface = %bound, "discharged by inherent methods");
            return Ok(());
        }

        let mut best: Option<ObligationChain> = None;
        for (id, record) in self.tables.unnamed_impls(&bound.interface) {
            let Some(subst) = self.match_impl(record, ty, bound) else {
                continue;
            };
            match self.obligations_hold(record, &subst, depth) {
                Ok(()) => {
                    trace!(%ty, impl_id = id.index(), "discharged by impl");
                    return Ok(());
                }
                Err(chain) => {
                    if best.as_ref().map_or(true, |b| chain.len() > b.len()) {
                        best = Some(chain);
                    }
                }
            }
        }
        Err(best)
    }

    /// Whether inherent method sets on `ty` structurally provide every
    /// required method of `iface`. Marker interfaces are never discharged
    /// this way.
    fn inherent_provides(
        &self,
        ty: &TypeExpr,
        bound: &InterfaceConstraint,
        iface: &InterfaceDef,
        depth: usize,
    ) -> bool {
        let required: Vec<_> = iface.methods.iter().filter(|m| m.default_body.is_none()).collect();
        if required.is_empty() {
            return false;
        }
        let mut sets = Vec::new();
        for set in &self.tables.inherent {
            let generics = set.generic_names();
            let matcher = TypeMatcher::new(&self.tables.aliases, &generics);
            if let Some(subst) = matcher.match_type(&set.target, ty) {
                if self.obligations_hold(set, &subst, depth).is_ok() {
                    sets.push((set, subst.with_self(ty.clone())));
                }
            }
        }
        if sets.is_empty() {
            return false;
        }

        let iface_subst = interface_arg_subst(iface, bound).with_self(ty.clone());
        let max_depth = self.tables.config.max_depth;
        required.iter().all(|sig| {
            let expected = sig.sig.map_types(|t| iface_subst.apply_bounded(t, max_depth));
            sets.iter().any(|(set, subst)| {
                set.find_method(&sig.name).is_some_and(|found| {
                    let found = found.sig.map_types(|t| subst.apply_bounded(t, max_depth));
                    signatures_compatible(&self.tables.aliases, &expected, &found)
                })
            })
        })
    }

    /// Match an impl against `ty` and the bound's interface arguments.
    ///
    /// The returned substitution has `Self` bound to `ty`.
    pub(crate) fn match_impl(
        &self,
        record: &ImplRecord,
        ty: &TypeExpr,
        bound: &InterfaceConstraint,
    ) -> Option<Substitution> {
        let generics = record.generic_names();
        let constructor = self
            .tables
            .interfaces
            .get(&record.interface)
            .is_some_and(InterfaceDef::requires_constructor);
        let target_matcher =
            TypeMatcher::new(&self.tables.aliases, &generics).constructor_self(constructor);
        let mut subst = target_matcher.match_type(&record.target, ty)?;

        if !bound.args.is_empty() {
            if record.interface_args.len() != bound.args.len() {
                return None;
            }
            let arg_matcher = TypeMatcher::new(&self.tables.aliases, &generics);
            for (pattern, concrete) in record.interface_args.iter().zip(&bound.args) {
                if !arg_matcher.match_into(pattern, concrete, &mut subst) {
                    return None;
                }
            }
        }
        Some(subst.with_self(ty.clone()))
    }

    /// Check every bound a declaration places on its generic parameters,
    /// under `subst`.
    pub(crate) fn obligations_hold(
        &self,
        decl: &dyn GenericDecl,
        subst: &Substitution,
        depth: usize,
    ) -> Result<(), ObligationChain> {
        for (param, bounds) in decl.constraints() {
            let Some(ty) = subst.get(&param) else {
                trace!(
                    param = %param,
                    decl = %decl.description(),
                    "unbound parameter; bounds skipped"
                );
                continue;
            };
            for bound in &bounds {
                let bound = InterfaceConstraint::with_args(
                    bound.interface.clone(),
                    bound.args.iter().map(|a| subst.apply(a)).collect(),
                );
                self.satisfies(ty, &bound, depth + 1)?;
            }
        }
        Ok(())
    }

    /// Whether `ty` matches the interface's declared self-type pattern.
    fn fits_self_pattern(&self, iface: &InterfaceDef, ty: &TypeExpr) -> bool {
        let Some(pattern) = &iface.self_pattern else {
            return true;
        };
        let vars = iface.self_pattern_vars();
        TypeMatcher::new(&self.tables.aliases, &vars)
            .match_type(pattern, ty)
            .is_some()
    }
}

/// Bind the interface's own parameters to the arguments of `bound`.
pub(crate) fn interface_arg_subst(
    iface: &InterfaceDef,
    bound: &InterfaceConstraint,
) -> Substitution {
    Substitution::from_pairs(
        iface
            .generics
            .iter()
            .map(|g| g.name.clone())
            .zip(bound.args.iter().cloned()),
    )
}
