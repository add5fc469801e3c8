//! Resolution queries over a frozen registry.
//!
//! Every query follows the same pipeline: collect candidates whose target
//! matches the receiver, drop those whose bounds do not hold, then keep the
//! candidates no other candidate is more specific than. One survivor is the
//! answer; several are reported as ambiguous.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::config::RedefinitionPolicy;
use crate::decl::{BodyId, GenericDecl, ImplRecord, InterfaceConstraint};
use crate::error::ResolutionError;
use crate::matcher::TypeMatcher;
use crate::solver::{ConstraintSolver, ObligationChain};
use crate::specificity::SpecificityComparator;
use crate::types::{Substitution, TypeExpr};

use super::{ImplId, Registry};

/// An impl selected for a receiver type.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplMatch<'r> {
    /// The impl's id.
    pub id: ImplId,
    /// The impl declaration.
    pub record: &'r ImplRecord,
    /// Bindings for the impl's generic parameters, with `Self` bound to the receiver.
    pub substitution: Substitution,
}

/// Where a resolved method body comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodSource {
    /// An inherent methods block.
    Inherent {
        /// The block's target pattern.
        target: TypeExpr,
    },
    /// A method body written in an impl.
    Impl {
        /// The impl's id.
        id: ImplId,
        /// The implemented interface.
        interface: String,
        /// The impl's name, if it was declared under one.
        name: Option<String>,
    },
    /// The interface's default body, reached through an impl.
    InterfaceDefault {
        /// The impl that did not override the default.
        id: ImplId,
        /// The interface declaring the default body.
        interface: String,
    },
    /// A free function called with method syntax.
    Ufcs {
        /// The function's name.
        function: String,
    },
}

/// A method resolved for a receiver type, ready to be called.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundMethod {
    /// The receiver type, aliases expanded.
    pub receiver: TypeExpr,
    /// The method name.
    pub method: String,
    /// The body to run.
    pub body: BodyId,
    /// Provenance of the body.
    pub source: MethodSource,
    /// Bindings for the declaring block's generic parameters.
    pub substitution: Substitution,
    /// Description of the declaring block, as used in diagnostics.
    pub description: String,
}

impl BoundMethod {
    /// Assemble the call's argument list with the receiver first.
    pub fn bind_arguments<V>(&self, receiver: V, args: impl IntoIterator<Item = V>) -> Vec<V> {
        std::iter::once(receiver).chain(args).collect()
    }
}

/// A candidate impl that survived matching and bound checking.
struct Viable<'r> {
    id: ImplId,
    record: &'r ImplRecord,
    substitution: Substitution,
}

impl Registry {
    /// Find the impl of `bound` that applies to `ty`.
    pub fn resolve_interface_impl(
        &self,
        bound: impl Into<InterfaceConstraint>,
        ty: &TypeExpr,
    ) -> Result<ImplMatch<'_>, ResolutionError> {
        let bound = bound.into();
        let tables = self.tables();
        let ty = tables.aliases.expand(ty);
        let solver = ConstraintSolver::new(tables);

        let mut viable = Vec::new();
        let mut unsatisfied: Option<ObligationChain> = None;
        for (id, record) in tables.unnamed_impls(&bound.interface) {
            let Some(substitution) = solver.match_impl(record, &ty, &bound) else {
                continue;
            };
            trace!(impl_id = id.index(), %substitution, "impl target matched");
            match solver.impl_holds(record, &substitution, &ty, &bound) {
                Ok(()) => viable.push(Viable {
                    id,
                    record,
                    substitution,
                }),
                Err(chain) => keep_longest(&mut unsatisfied, chain),
            }
        }

        if viable.is_empty() {
            let err = match unsatisfied {
                Some(chain) => ResolutionError::ConstraintUnsatisfied(chain),
                None => ResolutionError::NotFound {
                    receiver: ty,
                    member: bound.to_string(),
                },
            };
            debug!(%err, "interface impl not resolved");
            return Err(err);
        }

        let mut winners = self.most_specific(viable);
        if winners.len() > 1 {
            return Err(ambiguous(
                ty,
                bound.to_string(),
                winners.iter().map(|v| v.record),
            ));
        }
        let Some(Viable {
            id,
            record,
            substitution,
        }) = winners.pop()
        else {
            return Err(ResolutionError::NotFound {
                receiver: ty,
                member: bound.to_string(),
            });
        };
        debug!(impl_id = id.index(), receiver = %ty, interface = %bound, "resolved interface impl");
        Ok(ImplMatch {
            id,
            record,
            substitution,
        })
    }

    /// Find the named impl `name` and check it applies to `ty`.
    pub fn resolve_named_impl(
        &self,
        name: &str,
        ty: &TypeExpr,
    ) -> Result<ImplMatch<'_>, ResolutionError> {
        let tables = self.tables();
        let ty = tables.aliases.expand(ty);
        let not_found = || ResolutionError::NotFound {
            receiver: ty.clone(),
            member: name.to_string(),
        };
        let id = *tables.named_impls.get(name).ok_or_else(not_found)?;
        let record = tables.impls.get(id.index()).ok_or_else(not_found)?;

        let solver = ConstraintSolver::new(tables);
        let bound = InterfaceConstraint::new(record.interface.clone());
        let substitution = solver
            .match_impl(record, &ty, &bound)
            .ok_or_else(not_found)?;
        solver
            .impl_holds(record, &substitution, &ty, &impl_bound(record, &substitution))
            .map_err(ResolutionError::ConstraintUnsatisfied)?;
        debug!(name, receiver = %ty, "resolved named impl");
        Ok(ImplMatch { id, record, substitution })
    }

    /// Find the callable behind `receiver.method(...)`.
    ///
    /// Without a qualifier the search order is: inherent methods, then impls
    /// of any interface, then free functions whose first parameter accepts
    /// the receiver. A qualifier restricts the search to the named impl, or
    /// to the unnamed impls of the named interface.
    pub fn resolve_method(
        &self,
        receiver: &TypeExpr,
        method: &str,
        qualifier: Option<&str>,
    ) -> Result<BoundMethod, ResolutionError> {
        let receiver = self.tables().aliases.expand(receiver);
        let mut unsatisfied: Option<ObligationChain> = None;

        let found = match qualifier {
            Some(qualifier) => {
                self.resolve_qualified(&receiver, method, qualifier, &mut unsatisfied)?
            }
            None => {
                // Step 1: inherent methods always win.
                let mut found = self.resolve_inherent(&receiver, method, &mut unsatisfied)?;
                // Step 2: impls across every interface.
                if found.is_none() {
                    found = self.resolve_impl_method(&receiver, method, None, &mut unsatisfied)?;
                }
                // Step 3: uniform call syntax.
                if found.is_none() && self.config().ufcs_fallback {
                    found = self.resolve_ufcs(&receiver, method, &mut unsatisfied)?;
                }
                found
            }
        };

        match found {
            Some(bound) => {
                debug!(
                    receiver = %bound.receiver,
                    method,
                    source = ?bound.source,
                    "resolved method"
                );
                Ok(bound)
            }
            None => {
                let err = match unsatisfied {
                    Some(chain) => ResolutionError::ConstraintUnsatisfied(chain),
                    None => ResolutionError::NotFound {
                        receiver,
                        member: method.to_string(),
                    },
                };
                debug!(%err, "method not resolved");
                Err(err)
            }
        }
    }

    /// Check `ty: bound` for the type checker.
    pub fn check_constraint(
        &self,
        ty: &TypeExpr,
        bound: impl Into<InterfaceConstraint>,
    ) -> Result<(), ResolutionError> {
        let bound = bound.into();
        let result = ConstraintSolver::new(self.tables()).check(ty, &bound);
        debug!(%ty, %bound, satisfied = result.is_ok(), "checked constraint");
        result.map_err(ResolutionError::ConstraintUnsatisfied)
    }

    fn resolve_inherent(
        &self,
        receiver: &TypeExpr,
        method: &str,
        unsatisfied: &mut Option<ObligationChain>,
    ) -> Result<Option<BoundMethod>, ResolutionError> {
        let tables = self.tables();
        let solver = ConstraintSolver::new(tables);

        let mut viable = Vec::new();
        for set in &tables.inherent {
            let Some(def) = set.find_method(method) else {
                continue;
            };
            let generics = set.generic_names();
            let matcher = TypeMatcher::new(&tables.aliases, &generics);
            let Some(substitution) = matcher.match_type(&set.target, receiver) else {
                continue;
            };
            match solver.obligations_hold(set, &substitution, 0) {
                Ok(()) => viable.push((set, def, substitution)),
                Err(chain) => keep_longest(unsatisfied, chain),
            }
        }
        if viable.is_empty() {
            return Ok(None);
        }

        let comparator = SpecificityComparator::new(&tables.aliases, &tables.interfaces);
        let decls: Vec<&dyn GenericDecl> = viable
            .iter()
            .map(|(set, _, _)| *set as &dyn GenericDecl)
            .collect();
        let maximal = comparator.find_maximal(&decls);
        let chosen = match maximal.as_slice() {
            [single] => *single,
            // Later blocks shadow earlier ones.
            [.., last] if tables.config.inherent_redefinition == RedefinitionPolicy::LastWins => {
                *last
            }
            _ => {
                return Err(ambiguous_descriptions(
                    receiver.clone(),
                    method.to_string(),
                    maximal.iter().map(|&i| viable[i].0.description()),
                ))
            }
        };
        let (set, def, substitution) = viable.swap_remove(chosen);
        Ok(Some(BoundMethod {
            receiver: receiver.clone(),
            method: method.to_string(),
            body: def.body,
            source: MethodSource::Inherent {
                target: set.target.clone(),
            },
            substitution: substitution.with_self(receiver.clone()),
            description: set.description(),
        }))
    }

    fn resolve_impl_method(
        &self,
        receiver: &TypeExpr,
        method: &str,
        only_interface: Option<&str>,
        unsatisfied: &mut Option<ObligationChain>,
    ) -> Result<Option<BoundMethod>, ResolutionError> {
        let tables = self.tables();
        let solver = ConstraintSolver::new(tables);

        let mut by_interface: IndexMap<&str, Vec<Viable<'_>>> = IndexMap::new();
        for (id, record) in tables.all_unnamed_impls() {
            if only_interface.is_some_and(|i| i != record.interface)
                || !self.impl_provides(record, method)
            {
                continue;
            }
            let bound = InterfaceConstraint::new(record.interface.clone());
            let Some(substitution) = solver.match_impl(record, receiver, &bound) else {
                continue;
            };
            let holds = solver.impl_holds(
                record,
                &substitution,
                receiver,
                &impl_bound(record, &substitution),
            );
            match holds {
                Ok(()) => by_interface
                    .entry(record.interface.as_str())
                    .or_default()
                    .push(Viable {
                        id,
                        record,
                        substitution,
                    }),
                Err(chain) => keep_longest(unsatisfied, chain),
            }
        }

        let mut winners = Vec::new();
        for (_, group) in by_interface {
            let best = self.most_specific(group);
            if best.len() > 1 {
                return Err(ambiguous(
                    receiver.clone(),
                    method.to_string(),
                    best.iter().map(|v| v.record),
                ));
            }
            winners.extend(best);
        }
        // A sub-interface's method overrides the one it inherits.
        let overridden: Vec<bool> = winners
            .iter()
            .map(|w| {
                winners.iter().any(|other| {
                    other.record.interface != w.record.interface
                        && tables.interface_extends(&other.record.interface, &w.record.interface)
                })
            })
            .collect();
        let mut overridden = overridden.into_iter();
        winners.retain(|_| !overridden.next().unwrap_or(false));
        if winners.len() > 1 {
            trace!(interfaces = winners.len(), "method provided by several interfaces");
            return Err(ambiguous(
                receiver.clone(),
                method.to_string(),
                winners.iter().map(|v| v.record),
            ));
        }
        Ok(winners.pop().and_then(|winner| self.bind_impl_method(receiver, method, winner)))
    }

    fn resolve_qualified(
        &self,
        receiver: &TypeExpr,
        method: &str,
        qualifier: &str,
        unsatisfied: &mut Option<ObligationChain>,
    ) -> Result<Option<BoundMethod>, ResolutionError> {
        let tables = self.tables();
        if tables.named_impls.contains_key(qualifier) {
            return match self.resolve_named_impl(qualifier, receiver) {
                Ok(found) => {
                    let viable = Viable {
                        id: found.id,
                        record: found.record,
                        substitution: found.substitution,
                    };
                    Ok(self.bind_impl_method(receiver, method, viable))
                }
                Err(ResolutionError::ConstraintUnsatisfied(chain)) => {
                    keep_longest(unsatisfied, chain);
                    Ok(None)
                }
                Err(_) => Ok(None),
            };
        }
        if tables.interfaces.contains_key(qualifier) {
            return self.resolve_impl_method(receiver, method, Some(qualifier), unsatisfied);
        }
        Ok(None)
    }

    fn resolve_ufcs(
        &self,
        receiver: &TypeExpr,
        method: &str,
        unsatisfied: &mut Option<ObligationChain>,
    ) -> Result<Option<BoundMethod>, ResolutionError> {
        let tables = self.tables();
        let solver = ConstraintSolver::new(tables);

        let mut viable = Vec::new();
        for func in tables.functions.iter().filter(|f| f.name == method) {
            let Some(first) = func.sig.params.first() else {
                continue;
            };
            let generics = func.generic_names();
            let matcher = TypeMatcher::new(&tables.aliases, &generics);
            let Some(substitution) = matcher.match_type(first, receiver) else {
                continue;
            };
            match solver.obligations_hold(func, &substitution, 0) {
                Ok(()) => viable.push((func, substitution)),
                Err(chain) => keep_longest(unsatisfied, chain),
            }
        }
        if viable.is_empty() {
            return Ok(None);
        }

        let comparator = SpecificityComparator::new(&tables.aliases, &tables.interfaces);
        let decls: Vec<&dyn GenericDecl> =
            viable.iter().map(|(f, _)| *f as &dyn GenericDecl).collect();
        let maximal = comparator.find_maximal(&decls);
        let [chosen] = maximal.as_slice() else {
            return Err(ambiguous_descriptions(
                receiver.clone(),
                method.to_string(),
                maximal.iter().map(|&i| viable[i].0.description()),
            ));
        };
        let (func, substitution) = viable.swap_remove(*chosen);
        Ok(Some(BoundMethod {
            receiver: receiver.clone(),
            method: method.to_string(),
            body: func.body,
            source: MethodSource::Ufcs {
                function: func.name.clone(),
            },
            substitution,
            description: func.description(),
        }))
    }

    /// Whether the impl, or its interface's default, supplies `method`.
    fn impl_provides(&self, record: &ImplRecord, method: &str) -> bool {
        record.find_method(method).is_some()
            || self
                .interface(&record.interface)
                .and_then(|iface| iface.find_method(method))
                .is_some_and(|sig| sig.default_body.is_some())
    }

    fn bind_impl_method(
        &self,
        receiver: &TypeExpr,
        method: &str,
        winner: Viable<'_>,
    ) -> Option<BoundMethod> {
        let Viable { id, record, substitution } = winner;
        let (body, source) = match record.find_method(method) {
            Some(def) => (
                def.body,
                MethodSource::Impl {
                    id,
                    interface: record.interface.clone(),
                    name: record.name.clone(),
                },
            ),
            None => {
                let body = self
                    .interface(&record.interface)
                    .and_then(|iface| iface.find_method(method))
                    .and_then(|sig| sig.default_body)?;
                (
                    body,
                    MethodSource::InterfaceDefault {
                        id,
                        interface: record.interface.clone(),
                    },
                )
            }
        };
        Some(BoundMethod {
            receiver: receiver.clone(),
            method: method.to_string(),
            body,
            source,
            substitution,
            description: record.description(),
        })
    }

    /// Keep only the candidates no other candidate is more specific than.
    fn most_specific<'r>(&self, mut viable: Vec<Viable<'r>>) -> Vec<Viable<'r>> {
        if viable.len() < 2 {
            return viable;
        }
        let tables = self.tables();
        let comparator = SpecificityComparator::new(&tables.aliases, &tables.interfaces);
        let decls: Vec<&dyn GenericDecl> =
            viable.iter().map(|v| v.record as &dyn GenericDecl).collect();
        let maximal = comparator.find_maximal(&decls);
        let mut index = 0;
        viable.retain(|_| {
            let keep = maximal.contains(&index);
            index += 1;
            keep
        });
        viable
    }
}

/// The interface constraint an impl provides, under its substitution.
fn impl_bound(record: &ImplRecord, subst: &Substitution) -> InterfaceConstraint {
    InterfaceConstraint::with_args(
        record.interface.clone(),
        record.interface_args.iter().map(|a| subst.apply(a)).collect(),
    )
}

fn keep_longest(slot: &mut Option<ObligationChain>, chain: ObligationChain) {
    if slot.as_ref().map_or(true, |existing| chain.len() > existing.len()) {
        *slot = Some(chain);
    }
}

fn ambiguous<'r>(
    receiver: TypeExpr,
    member: String,
    records: impl Iterator<Item = &'r ImplRecord>,
) -> ResolutionError {
    ambiguous_descriptions(receiver, member, records.map(|r| r.description()))
}

fn ambiguous_descriptions(
    receiver: TypeExpr,
    member: String,
    descriptions: impl Iterator<Item = String>,
) -> ResolutionError {
    let mut candidates: Vec<String> = descriptions.collect();
    candidates.sort();
    let err = ResolutionError::Ambiguous {
        receiver,
        member,
        candidates,
    };
    debug!(%err, "ambiguous resolution");
    err
}
