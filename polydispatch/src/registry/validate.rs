//! Registration-time validation of impls and method blocks.

use rustc_hash::FxHashSet;

use crate::config::RedefinitionPolicy;
use crate::decl::{FnSig, GenericDecl, ImplRecord, InterfaceDef, MethodDef, MethodSet};
use crate::error::RegistrationError;
use crate::matcher::TypeMatcher;
use crate::solver::interface_arg_subst;
use crate::types::{AliasTable, Substitution, TypeExpr};

use super::Tables;

/// Whether `found` can stand in for `expected`.
///
/// Parameter counts must agree; each parameter and the return type must be
/// equal after alias expansion, with a wildcard on either side accepting
/// anything.
pub(crate) fn signatures_compatible(
    aliases: &AliasTable,
    expected: &FnSig,
    found: &FnSig,
) -> bool {
    let compatible = |a: &TypeExpr, b: &TypeExpr| {
        matches!(a, TypeExpr::Wildcard)
            || matches!(b, TypeExpr::Wildcard)
            || aliases.structural_equals(a, b)
    };
    expected.params.len() == found.params.len()
        && expected.params.iter().zip(&found.params).all(|(a, b)| compatible(a, b))
        && compatible(&expected.ret, &found.ret)
}

/// Reject a method name that appears twice in one block.
pub(crate) fn check_duplicate_methods(
    owner: &str,
    methods: &[MethodDef],
) -> Result<(), RegistrationError> {
    let mut seen = FxHashSet::default();
    for method in methods {
        if !seen.insert(method.name.as_str()) {
            return Err(RegistrationError::DuplicateMethod {
                owner: owner.to_string(),
                method: method.name.clone(),
            });
        }
    }
    Ok(())
}

/// Reject an interface that declares the same method twice.
pub(crate) fn check_duplicate_sigs(def: &InterfaceDef) -> Result<(), RegistrationError> {
    let mut seen = FxHashSet::default();
    for sig in &def.methods {
        if !seen.insert(sig.name.as_str()) {
            return Err(RegistrationError::DuplicateMethod {
                owner: format!("interface {}", def.name),
                method: sig.name.clone(),
            });
        }
    }
    Ok(())
}

/// Under [`RedefinitionPolicy::Error`], reject a method already defined
/// inherently for the same type by an earlier block.
pub(crate) fn check_inherent_redefinition(
    tables: &Tables,
    set: &MethodSet,
) -> Result<(), RegistrationError> {
    if tables.config.inherent_redefinition == RedefinitionPolicy::LastWins {
        return Ok(());
    }
    for earlier in &tables.inherent {
        if !tables.aliases.structural_equals(&earlier.target, &set.target) {
            continue;
        }
        if let Some(method) = set.methods.iter().find(|m| earlier.find_method(&m.name).is_some()) {
            return Err(RegistrationError::InherentRedefinition {
                target: set.target.clone(),
                method: method.name.clone(),
            });
        }
    }
    Ok(())
}

/// Check the impl target against the interface's self-type pattern.
///
/// A constructor self type (`for C _`) needs a bare constructor target such
/// as `Array`, or one applied only to wildcards. Any other declared pattern
/// must match the target.
pub(crate) fn check_shape(
    aliases: &AliasTable,
    iface: &InterfaceDef,
    record: &ImplRecord,
) -> Result<(), RegistrationError> {
    let Some(pattern) = &iface.self_pattern else {
        return Ok(());
    };
    let target = aliases.expand(&record.target);
    let fits = if iface.requires_constructor() {
        match &target {
            TypeExpr::Simple(name) => !record.generics.iter().any(|g| &g.name == name),
            other => other.is_constructor_shape(),
        }
    } else {
        let vars = iface.self_pattern_vars();
        TypeMatcher::new(aliases, &vars).match_type(pattern, &target).is_some()
    };
    if fits {
        Ok(())
    } else {
        Err(RegistrationError::ShapeMismatch {
            interface: iface.name.clone(),
            expected: pattern.clone(),
            found: record.target.clone(),
        })
    }
}

/// Check that an impl provides every required method with a compatible signature.
///
/// Interface signatures are instantiated with `Self` as the impl target and
/// the interface parameters as the impl's interface arguments.
pub(crate) fn check_impl_methods(
    aliases: &AliasTable,
    iface: &InterfaceDef,
    record: &ImplRecord,
) -> Result<(), RegistrationError> {
    let owner = record.description();
    let iface_subst =
        interface_arg_subst(iface, &record.constraint()).with_self(record.target.clone());
    let impl_subst = Substitution::new().with_self(record.target.clone());

    for sig in &iface.methods {
        match record.find_method(&sig.name) {
            Some(found) => {
                let expected = sig.sig.map_types(|t| iface_subst.apply(t));
                let found = found.sig.map_types(|t| impl_subst.apply(t));
                if !signatures_compatible(aliases, &expected, &found) {
                    return Err(RegistrationError::SignatureMismatch {
                        owner,
                        method: sig.name.clone(),
                        expected,
                        found,
                    });
                }
            }
            None if sig.default_body.is_none() => {
                return Err(RegistrationError::MissingMethod {
                    owner,
                    method: sig.name.clone(),
                });
            }
            None => {}
        }
    }
    Ok(())
}
