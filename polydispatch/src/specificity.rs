//! Partial ordering of candidates that match the same concrete type.
//!
//! The comparator decides, for two declarations whose targets both match
//! some receiver, whether one is strictly more specific. Rules are tried in
//! order and the first that decides wins:
//!
//! 1. A target that mentions no generic parameter beats one that does.
//! 2. If either target is a union, member sets are compared (a plain target
//!    counts as a one-member set). A strict subset wins, equal sets fall
//!    through, anything else is incomparable.
//! 3. A target that is a strict instance of the other wins (`Array T` over
//!    `T`). If neither is an instance of the other they are incomparable.
//! 4. For targets equal up to renaming, the bound sets per parameter decide.
//!    Each bound is closed over the interfaces it extends, so `T: Writable`
//!    outranks `T: Readable` when `Writable` extends `Readable`. One side
//!    must be a superset for every parameter and a strict superset for at
//!    least one; any disagreement between parameters is incomparable.
//!
//! Inherent methods outrank every impl, but that is decided by the
//! registry before candidates ever reach the comparator.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::decl::{GenericDecl, InterfaceConstraint, InterfaceDef};
use crate::matcher::{dedup_types, instance_of};
use crate::solver::interface_arg_subst;
use crate::types::{structurally_equal, AliasTable, Substitution, TypeExpr};

/// The outcome of comparing two candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Specificity {
    /// The first candidate is strictly more specific.
    MoreSpecific,
    /// The second candidate is strictly more specific.
    LessSpecific,
    /// Neither candidate dominates.
    Incomparable,
}

impl Specificity {
    /// The same relation seen from the other candidate.
    pub fn reverse(self) -> Self {
        match self {
            Specificity::MoreSpecific => Specificity::LessSpecific,
            Specificity::LessSpecific => Specificity::MoreSpecific,
            Specificity::Incomparable => Specificity::Incomparable,
        }
    }
}

/// Compares candidate declarations.
pub struct SpecificityComparator<'a> {
    aliases: &'a AliasTable,
    interfaces: &'a IndexMap<String, InterfaceDef>,
}

impl<'a> SpecificityComparator<'a> {
    /// Create a comparator over the given alias table and interface set.
    pub fn new(aliases: &'a AliasTable, interfaces: &'a IndexMap<String, InterfaceDef>) -> Self {
        Self { aliases, interfaces }
    }

    /// Compare `a` against `b`.
    pub fn compare(&self, a: &dyn GenericDecl, b: &dyn GenericDecl) -> Specificity {
        let result = self.compare_inner(a, b);
        trace!(a = %a.description(), b = %b.description(), ?result, "compared candidates");
        result
    }

    fn compare_inner(&self, a: &dyn GenericDecl, b: &dyn GenericDecl) -> Specificity {
        let a_target = self.aliases.expand(a.target());
        let b_target = self.aliases.expand(b.target());
        let a_generics = a.generic_names();
        let b_generics = b.generic_names();

        // Step 1: concrete beats generic.
        let a_generic = a_target.mentions_any(&a_generics);
        let b_generic = b_target.mentions_any(&b_generics);
        match (a_generic, b_generic) {
            (false, true) => return Specificity::MoreSpecific,
            (true, false) => return Specificity::LessSpecific,
            _ => {}
        }

        // Step 2: union member sets.
        if a_target.is_union() || b_target.is_union() {
            if let Some(decided) = self.compare_members(&a_target, &b_target) {
                return decided;
            }
        }

        // Step 3: instance ordering.
        let b_to_a = instance_of(self.aliases, &a_target, &b_target, &b_generics);
        let a_to_b = instance_of(self.aliases, &b_target, &a_target, &a_generics);
        let b_to_a = match (b_to_a, a_to_b) {
            (Some(_), None) => return Specificity::MoreSpecific,
            (None, Some(_)) => return Specificity::LessSpecific,
            (None, None) => return Specificity::Incomparable,
            (Some(renaming), Some(_)) => renaming,
        };

        // Step 4: bound sets per parameter.
        let a_bounds = self.bound_sets(a, None);
        let b_bounds = self.bound_sets(b, Some(&b_to_a));
        compare_bound_sets(&a_bounds, &b_bounds)
    }

    /// Indices of candidates that no other candidate dominates.
    pub fn find_maximal(&self, candidates: &[&dyn GenericDecl]) -> Vec<usize> {
        (0..candidates.len())
            .filter(|&i| {
                !(0..candidates.len()).any(|j| {
                    j != i
                        && self.compare(candidates[j], candidates[i])
                            == Specificity::MoreSpecific
                })
            })
            .collect()
    }

    fn members(&self, ty: &TypeExpr) -> Vec<TypeExpr> {
        dedup_types(
            ty.union_members().into_iter().cloned().collect(),
            self.aliases.max_depth(),
        )
    }

    fn is_subset(&self, small: &[TypeExpr], large: &[TypeExpr]) -> bool {
        let depth = self.aliases.max_depth();
        small
            .iter()
            .all(|s| large.iter().any(|l| structurally_equal(s, l, depth)))
    }

    /// `None` when the member sets are equal.
    fn compare_members(&self, a: &TypeExpr, b: &TypeExpr) -> Option<Specificity> {
        let a_members = self.members(a);
        let b_members = self.members(b);
        let a_in_b = self.is_subset(&a_members, &b_members);
        let b_in_a = self.is_subset(&b_members, &a_members);
        match (a_in_b, b_in_a) {
            (true, false) => Some(Specificity::MoreSpecific),
            (false, true) => Some(Specificity::LessSpecific),
            (true, true) => None,
            (false, false) => Some(Specificity::Incomparable),
        }
    }

    /// Bound sets keyed by parameter, optionally renamed into the other
    /// candidate's parameter names.
    fn bound_sets(
        &self,
        decl: &dyn GenericDecl,
        renaming: Option<&Substitution>,
    ) -> IndexMap<String, FxHashSet<String>> {
        let mut out: IndexMap<String, FxHashSet<String>> = IndexMap::new();
        for (param, bounds) in decl.constraints() {
            let key = match renaming.and_then(|r| r.get(&param)) {
                Some(TypeExpr::Simple(name)) => name.clone(),
                Some(other) => other.to_string(),
                None => param,
            };
            let set = out.entry(key).or_default();
            for bound in &bounds {
                self.close_over_bases(bound, set);
            }
        }
        out
    }

    /// Insert `bound` and every interface it transitively extends.
    fn close_over_bases(&self, bound: &InterfaceConstraint, set: &mut FxHashSet<String>) {
        let mut pending = vec![bound.clone()];
        let mut steps = 0;
        while let Some(current) = pending.pop() {
            steps += 1;
            if steps > self.aliases.max_depth() || !set.insert(current.to_string()) {
                continue;
            }
            if let Some(iface) = self.interfaces.get(&current.interface) {
                let subst = interface_arg_subst(iface, &current);
                for base in &iface.bases {
                    pending.push(InterfaceConstraint::with_args(
                        base.interface.clone(),
                        base.args.iter().map(|a| subst.apply(a)).collect(),
                    ));
                }
            }
        }
    }
}

fn compare_bound_sets(
    a: &IndexMap<String, FxHashSet<String>>,
    b: &IndexMap<String, FxHashSet<String>>,
) -> Specificity {
    let empty = FxHashSet::default();
    let mut a_covers = true;
    let mut b_covers = true;
    for key in a.keys().chain(b.keys()) {
        let a_set = a.get(key).unwrap_or(&empty);
        let b_set = b.get(key).unwrap_or(&empty);
        a_covers &= a_set.is_superset(b_set);
        b_covers &= b_set.is_superset(a_set);
    }
    match (a_covers, b_covers) {
        (true, false) => Specificity::MoreSpecific,
        (false, true) => Specificity::LessSpecific,
        _ => Specificity::Incomparable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::decl::{GenericParam, ImplRecord, WhereClause};

    fn t(name: &str) -> TypeExpr {
        TypeExpr::simple(name)
    }

    fn wrapper_impl(bounds: &[&str]) -> ImplRecord {
        let mut record = ImplRecord::new("Show", TypeExpr::generic("Wrapper", vec![t("T")]))
            .generic(GenericParam::new("T"));
        if !bounds.is_empty() {
            record = record.where_bound(WhereClause::new("T", bounds));
        }
        record
    }

    fn interfaces() -> IndexMap<String, InterfaceDef> {
        let mut map = IndexMap::new();
        map.insert("Readable".to_string(), InterfaceDef::new("Readable"));
        map.insert("Writable".to_string(), InterfaceDef::new("Writable"));
        map.insert("Stream".to_string(), InterfaceDef::new("Stream").extends("Readable"));
        map
    }

    #[test]
    fn test_concrete_beats_generic() {
        let aliases = AliasTable::new();
        let ifaces = interfaces();
        let cmp = SpecificityComparator::new(&aliases, &ifaces);
        let concrete = ImplRecord::new("Show", TypeExpr::generic("Wrapper", vec![t("i32")]));
        let generic = wrapper_impl(&["Readable", "Writable"]);
        assert_eq!(cmp.compare(&concrete, &generic), Specificity::MoreSpecific);
        assert_eq!(cmp.compare(&generic, &concrete), Specificity::LessSpecific);
    }

    #[test]
    fn test_instance_beats_blanket() {
        let aliases = AliasTable::new();
        let ifaces = interfaces();
        let cmp = SpecificityComparator::new(&aliases, &ifaces);
        let blanket =
            ImplRecord::new("Show", t("T")).generic(GenericParam::bounded("T", &["Readable"]));
        let array = ImplRecord::new("Show", TypeExpr::generic("Array", vec![t("U")]))
            .generic(GenericParam::new("U"));
        assert_eq!(cmp.compare(&array, &blanket), Specificity::MoreSpecific);
    }

    #[test]
    fn test_bound_superset() {
        let aliases = AliasTable::new();
        let ifaces = interfaces();
        let cmp = SpecificityComparator::new(&aliases, &ifaces);
        let one = wrapper_impl(&["Readable"]);
        let two = wrapper_impl(&["Readable", "Writable"]);
        assert_eq!(cmp.compare(&two, &one), Specificity::MoreSpecific);
        assert_eq!(cmp.compare(&one, &two), Specificity::LessSpecific);
        assert_eq!(cmp.compare(&one, &one.clone()), Specificity::Incomparable);
    }

    #[test]
    fn test_renamed_parameters_align() {
        let aliases = AliasTable::new();
        let ifaces = interfaces();
        let cmp = SpecificityComparator::new(&aliases, &ifaces);
        let a = wrapper_impl(&["Readable", "Writable"]);
        let b = ImplRecord::new("Show", TypeExpr::generic("Wrapper", vec![t("X")]))
            .generic(GenericParam::bounded("X", &["Readable"]));
        assert_eq!(cmp.compare(&a, &b), Specificity::MoreSpecific);
    }

    #[test]
    fn test_sub_interface_outranks_base() {
        let aliases = AliasTable::new();
        let ifaces = interfaces();
        let cmp = SpecificityComparator::new(&aliases, &ifaces);
        let base = wrapper_impl(&["Readable"]);
        let sub = wrapper_impl(&["Stream"]);
        assert_eq!(cmp.compare(&sub, &base), Specificity::MoreSpecific);
    }

    #[test]
    fn test_disagreeing_parameters_are_incomparable() {
        let aliases = AliasTable::new();
        let ifaces = interfaces();
        let cmp = SpecificityComparator::new(&aliases, &ifaces);
        let pair = TypeExpr::generic("Pair", vec![t("A"), t("B")]);
        let left = ImplRecord::new("Show", pair.clone())
            .generic(GenericParam::bounded("A", &["Readable", "Writable"]))
            .generic(GenericParam::bounded("B", &["Readable"]));
        let right = ImplRecord::new("Show", pair)
            .generic(GenericParam::bounded("A", &["Readable"]))
            .generic(GenericParam::bounded("B", &["Readable", "Writable"]));
        assert_eq!(cmp.compare(&left, &right), Specificity::Incomparable);
        assert_eq!(cmp.compare(&right, &left), Specificity::Incomparable);
    }

    #[test]
    fn test_union_subsets() {
        let aliases = AliasTable::new();
        let ifaces = interfaces();
        let cmp = SpecificityComparator::new(&aliases, &ifaces);
        let pair = ImplRecord::new("Show", TypeExpr::union(vec![t("Fancy"), t("Basic")]));
        let triple = ImplRecord::new(
            "Show",
            TypeExpr::union(vec![t("Fancy"), t("Basic"), t("Extra")]),
        );
        let other = ImplRecord::new("Show", TypeExpr::union(vec![t("Fancy"), t("Extra")]));
        let single = ImplRecord::new("Show", t("Fancy"));

        assert_eq!(cmp.compare(&pair, &triple), Specificity::MoreSpecific);
        assert_eq!(cmp.compare(&pair, &other), Specificity::Incomparable);
        assert_eq!(cmp.compare(&single, &pair), Specificity::MoreSpecific);
    }

    #[test]
    fn test_find_maximal() {
        let aliases = AliasTable::new();
        let ifaces = interfaces();
        let cmp = SpecificityComparator::new(&aliases, &ifaces);
        let pair = ImplRecord::new("Show", TypeExpr::union(vec![t("Fancy"), t("Basic")]));
        let triple = ImplRecord::new(
            "Show",
            TypeExpr::union(vec![t("Fancy"), t("Basic"), t("Extra")]),
        );
        let other = ImplRecord::new("Show", TypeExpr::union(vec![t("Fancy"), t("Extra")]));

        let candidates: Vec<&dyn GenericDecl> = vec![&triple, &pair];
        assert_eq!(cmp.find_maximal(&candidates), vec![1]);

        let candidates: Vec<&dyn GenericDecl> = vec![&triple, &pair, &other];
        assert_eq!(cmp.find_maximal(&candidates), vec![1, 2]);
    }
}
