//! The registry of interfaces, impls, inherent methods and free functions.
//!
//! Declarations are registered into a [`RegistryBuilder`] during the load
//! phase, in declaration order. [`RegistryBuilder::freeze`] then produces a
//! read-only [`Registry`] that answers resolution queries and can be shared
//! across threads.
//!
//! Every registration either succeeds completely or returns an error and
//! leaves the builder exactly as it was.

mod coherence;
mod resolve;
pub(crate) mod validate;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::decl::{FreeFunction, GenericDecl, ImplRecord, InterfaceDef, MethodSet};
use crate::error::RegistrationError;
use crate::types::{AliasTable, TypeAlias};

pub use resolve::{BoundMethod, ImplMatch, MethodSource};

/// Identifies a registered impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImplId(u32);

impl ImplId {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Registration index of the impl.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Storage shared by the builder and the frozen registry.
#[derive(Debug, Clone)]
pub(crate) struct Tables {
    pub(crate) config: ResolverConfig,
    pub(crate) aliases: AliasTable,
    pub(crate) interfaces: IndexMap<String, InterfaceDef>,
    pub(crate) impls: Vec<ImplRecord>,
    pub(crate) named_impls: IndexMap<String, ImplId>,
    pub(crate) inherent: Vec<MethodSet>,
    pub(crate) functions: Vec<FreeFunction>,
}

impl Tables {
    fn new(config: ResolverConfig) -> Self {
        Self {
            aliases: AliasTable::with_max_depth(config.max_depth),
            config,
            interfaces: IndexMap::new(),
            impls: Vec::new(),
            named_impls: IndexMap::new(),
            inherent: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Unnamed impls of `interface`, in registration order.
    pub(crate) fn unnamed_impls(
        &self,
        interface: &str,
    ) -> impl Iterator<Item = (ImplId, &ImplRecord)> + '_ {
        let interface = interface.to_string();
        self.all_unnamed_impls().filter(move |(_, r)| r.interface == interface)
    }

    /// Whether `sub` transitively extends `base`.
    pub(crate) fn interface_extends(&self, sub: &str, base: &str) -> bool {
        let mut seen = FxHashSet::default();
        let mut pending = vec![sub];
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(iface) = self.interfaces.get(current) else {
                continue;
            };
            for parent in &iface.bases {
                if parent.interface == base {
                    return true;
                }
                pending.push(parent.interface.as_str());
            }
        }
        false
    }

    /// Every unnamed impl, in registration order.
    pub(crate) fn all_unnamed_impls(&self) -> impl Iterator<Item = (ImplId, &ImplRecord)> + '_ {
        self.impls
            .iter()
            .enumerate()
            .filter(|(_, r)| r.name.is_none())
            .map(|(i, r)| (ImplId::new(i), r))
    }

    /// Whether `interface` names a registered interface or a built-in capability.
    fn knows_interface(&self, interface: &str) -> bool {
        self.interfaces.contains_key(interface)
            || self.config.builtin_capabilities.iter().any(|c| c == interface)
    }
}

/// The load-phase registry.
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    tables: Tables,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            tables: Tables::new(config),
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &ResolverConfig {
        &self.tables.config
    }

    /// Register an interface declaration.
    pub fn register_interface(&mut self, def: InterfaceDef) -> Result<(), RegistrationError> {
        if self.tables.interfaces.contains_key(&def.name) {
            return Err(RegistrationError::DuplicateInterface(def.name));
        }
        validate::check_duplicate_sigs(&def)?;
        debug!(interface = %def.name, methods = def.methods.len(), "registered interface");
        self.tables.interfaces.insert(def.name.clone(), def);
        Ok(())
    }

    /// Register a type alias. A later alias with the same name replaces the earlier one.
    pub fn register_alias(&mut self, alias: TypeAlias) {
        debug!(alias = %alias.name, target = %alias.target, "registered alias");
        self.tables.aliases.insert(alias);
    }

    /// Register an inherent methods block.
    pub fn register_inherent(&mut self, set: MethodSet) -> Result<(), RegistrationError> {
        validate::check_duplicate_methods(&set.description(), &set.methods)?;
        validate::check_inherent_redefinition(&self.tables, &set)?;
        debug!(target = %set.target, methods = set.methods.len(), "registered inherent methods");
        self.tables.inherent.push(set);
        Ok(())
    }

    /// Register an impl, returning its id.
    ///
    /// Checks, in order: the interface is known, the target fits the
    /// interface's self type, method names are unique, the methods agree with
    /// the interface, the impl name is unique, and the impl is coherent with
    /// every unnamed impl already registered.
    pub fn register_impl(&mut self, record: ImplRecord) -> Result<ImplId, RegistrationError> {
        let Some(iface) = self.tables.interfaces.get(&record.interface) else {
            return Err(RegistrationError::UnknownInterface(record.interface));
        };
        validate::check_shape(&self.tables.aliases, iface, &record)?;
        validate::check_duplicate_methods(&record.description(), &record.methods)?;
        validate::check_impl_methods(&self.tables.aliases, iface, &record)?;
        for bounds in record.constraints().values() {
            let unknown = bounds
                .iter()
                .find(|b| !self.tables.knows_interface(&b.interface));
            if let Some(unknown) = unknown {
                return Err(RegistrationError::UnknownInterface(unknown.interface.clone()));
            }
        }
        if let Some(name) = &record.name {
            if self.tables.named_impls.contains_key(name) {
                return Err(RegistrationError::DuplicateImplName(name.clone()));
            }
        }
        coherence::check_coherence(&self.tables, &record)?;

        let id = ImplId::new(self.tables.impls.len());
        debug!(impl_id = id.index(), description = %record.description(), "registered impl");
        if let Some(name) = &record.name {
            self.tables.named_impls.insert(name.clone(), id);
        }
        self.tables.impls.push(record);
        Ok(id)
    }

    /// Register a free function for uniform call syntax.
    pub fn register_function(&mut self, func: FreeFunction) {
        debug!(function = %func.description(), "registered function");
        self.tables.functions.push(func);
    }

    /// End the load phase.
    pub fn freeze(self) -> Registry {
        debug!(
            interfaces = self.tables.interfaces.len(),
            impls = self.tables.impls.len(),
            inherent = self.tables.inherent.len(),
            functions = self.tables.functions.len(),
            "registry frozen"
        );
        Registry { tables: self.tables }
    }
}

/// The read-only registry answering resolution queries.
///
/// All queries take `&self` and are pure functions of the registry contents.
#[derive(Debug, Clone)]
pub struct Registry {
    tables: Tables,
}

impl Registry {
    pub(crate) fn tables(&self) -> &Tables {
        &self.tables
    }

    /// The configuration in effect.
    pub fn config(&self) -> &ResolverConfig {
        &self.tables.config
    }

    /// Look up an interface.
    pub fn interface(&self, name: &str) -> Option<&InterfaceDef> {
        self.tables.interfaces.get(name)
    }

    /// Look up an impl by id.
    pub fn impl_record(&self, id: ImplId) -> Option<&ImplRecord> {
        self.tables.impls.get(id.index())
    }

    /// Number of registered impls, named and unnamed.
    pub fn impl_count(&self) -> usize {
        self.tables.impls.len()
    }
}
