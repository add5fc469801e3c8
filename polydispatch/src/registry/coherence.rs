//! Coherence checking between unnamed impls of one interface.
//!
//! Two unnamed impls conflict when their targets can match a common type
//! and the specificity comparator cannot order them. Named impls never take
//! part. Impls over unions with different member sets are not rejected
//! here: whether they tie depends on the receiver, so resolution reports
//! the ambiguity for the receivers where it actually occurs.

use tracing::{debug, trace};

use crate::decl::{GenericDecl, ImplRecord, InterfaceDef};
use crate::error::RegistrationError;
use crate::matcher::patterns_overlap;
use crate::specificity::{Specificity, SpecificityComparator};
use crate::types::structurally_equal;

use super::Tables;

pub(crate) fn check_coherence(
    tables: &Tables,
    record: &ImplRecord,
) -> Result<(), RegistrationError> {
    if record.name.is_some() {
        return Ok(());
    }
    let comparator = SpecificityComparator::new(&tables.aliases, &tables.interfaces);
    let generics = record.generic_names();
    let constructor = tables
        .interfaces
        .get(&record.interface)
        .is_some_and(InterfaceDef::requires_constructor);

    for (id, existing) in tables.unnamed_impls(&record.interface) {
        let existing_generics = existing.generic_names();
        let overlaps = patterns_overlap(
            &tables.aliases,
            &record.target,
            &generics,
            &existing.target,
            &existing_generics,
            constructor,
        );
        if !overlaps {
            continue;
        }
        if !interface_args_overlap(tables, record, existing) {
            continue;
        }
        if comparator.compare(record, existing) != Specificity::Incomparable {
            trace!(impl_id = id.index(), "overlapping impl ordered by specificity");
            continue;
        }
        if union_tie_deferred(tables, record, existing) {
            debug!(
                existing = %existing.description(),
                new = %record.description(),
                "union impls overlap; ambiguity deferred to resolution"
            );
            continue;
        }
        return Err(RegistrationError::CoherenceConflict {
            interface: record.interface.clone(),
            type_a: existing.target.clone(),
            type_b: record.target.clone(),
        });
    }
    Ok(())
}

fn interface_args_overlap(tables: &Tables, a: &ImplRecord, b: &ImplRecord) -> bool {
    if a.interface_args.len() != b.interface_args.len() {
        return false;
    }
    let a_generics = a.generic_names();
    let b_generics = b.generic_names();
    a.interface_args
        .iter()
        .zip(&b.interface_args)
        .all(|(x, y)| patterns_overlap(&tables.aliases, x, &a_generics, y, &b_generics, false))
}

fn union_tie_deferred(tables: &Tables, a: &ImplRecord, b: &ImplRecord) -> bool {
    let a_target = tables.aliases.expand(&a.target);
    let b_target = tables.aliases.expand(&b.target);
    (a_target.is_union() || b_target.is_union())
        && !structurally_equal(&a_target, &b_target, tables.config.max_depth)
}
