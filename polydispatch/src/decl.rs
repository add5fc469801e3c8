//! Declarations consumed from the front end.
//!
//! These are already-parsed interface, impl, method-set and function
//! declarations. Method bodies are opaque [`BodyId`] handles owned by the
//! caller; the resolver only decides which handle runs.

use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::types::TypeExpr;

/// An opaque handle to a callable body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

impl BodyId {
    /// Create a body handle.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw index.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A required interface, possibly applied to type arguments: `Into i32`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceConstraint {
    /// The interface name.
    pub interface: String,
    /// Interface type arguments.
    pub args: Vec<TypeExpr>,
}

impl InterfaceConstraint {
    /// A constraint on an interface without arguments.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            args: Vec::new(),
        }
    }

    /// A constraint on an applied interface.
    pub fn with_args(interface: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        Self {
            interface: interface.into(),
            args,
        }
    }

    /// The constraint as a type expression, for rendering and keys.
    pub fn as_type(&self) -> TypeExpr {
        TypeExpr::generic(self.interface.clone(), self.args.clone())
    }
}

impl From<&str> for InterfaceConstraint {
    fn from(interface: &str) -> Self {
        Self::new(interface)
    }
}

impl From<String> for InterfaceConstraint {
    fn from(interface: String) -> Self {
        Self::new(interface)
    }
}

impl fmt::Display for InterfaceConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_type())
    }
}

/// A generic parameter with inline bounds: `T: Show + Clone`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    /// Parameter name.
    pub name: String,
    /// Inline interface bounds.
    pub bounds: Vec<InterfaceConstraint>,
}

impl GenericParam {
    /// An unbounded parameter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bounds: Vec::new(),
        }
    }

    /// A parameter bounded by the named interfaces.
    pub fn bounded(name: impl Into<String>, interfaces: &[&str]) -> Self {
        Self {
            name: name.into(),
            bounds: interfaces.iter().map(|i| InterfaceConstraint::new(*i)).collect(),
        }
    }
}

/// A where-clause entry: `where T: Show`.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    /// The constrained generic parameter.
    pub param: String,
    /// Required interfaces.
    pub bounds: Vec<InterfaceConstraint>,
}

impl WhereClause {
    /// A where-clause entry on the named interfaces.
    pub fn new(param: impl Into<String>, interfaces: &[&str]) -> Self {
        Self {
            param: param.into(),
            bounds: interfaces.iter().map(|i| InterfaceConstraint::new(*i)).collect(),
        }
    }
}

/// A function signature. The receiver, when present, is the first parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FnSig {
    /// Parameter types.
    pub params: Vec<TypeExpr>,
    /// Return type.
    pub ret: TypeExpr,
}

impl FnSig {
    /// Create a signature.
    pub fn new(params: Vec<TypeExpr>, ret: TypeExpr) -> Self {
        Self { params, ret }
    }

    /// A `(self: Self, ...params) -> ret` method signature.
    pub fn method(params: Vec<TypeExpr>, ret: TypeExpr) -> Self {
        let mut all = Vec::with_capacity(params.len() + 1);
        all.push(TypeExpr::SelfRef);
        all.extend(params);
        Self { params: all, ret }
    }

    /// Apply a type mapping to every parameter and the return type.
    pub fn map_types(&self, mut f: impl FnMut(&TypeExpr) -> TypeExpr) -> Self {
        Self {
            params: self.params.iter().map(&mut f).collect(),
            ret: f(&self.ret),
        }
    }
}

impl fmt::Display for FnSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// A method signature declared by an interface.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    /// Method name.
    pub name: String,
    /// Signature, with `Self` standing for the implementing type.
    pub sig: FnSig,
    /// Default body, if the interface provides one.
    pub default_body: Option<BodyId>,
}

impl MethodSig {
    /// A required method.
    pub fn required(name: impl Into<String>, sig: FnSig) -> Self {
        Self {
            name: name.into(),
            sig,
            default_body: None,
        }
    }

    /// A method with a default body.
    pub fn defaulted(name: impl Into<String>, sig: FnSig, body: BodyId) -> Self {
        Self {
            name: name.into(),
            sig,
            default_body: Some(body),
        }
    }
}

/// An interface declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDef {
    /// Interface name.
    pub name: String,
    /// Interface type parameters.
    pub generics: Vec<GenericParam>,
    /// Declared self-type pattern; `None` means any type (`_`).
    pub self_pattern: Option<TypeExpr>,
    /// Method signatures.
    pub methods: Vec<MethodSig>,
    /// Interfaces this one extends.
    pub bases: Vec<InterfaceConstraint>,
}

impl InterfaceDef {
    /// An interface with no parameters, methods or bases.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            self_pattern: None,
            methods: Vec::new(),
            bases: Vec::new(),
        }
    }

    /// Add an interface type parameter.
    pub fn generic(mut self, param: GenericParam) -> Self {
        self.generics.push(param);
        self
    }

    /// Declare the self-type pattern.
    pub fn self_pattern(mut self, pattern: TypeExpr) -> Self {
        self.self_pattern = Some(pattern);
        self
    }

    /// Add a method signature.
    pub fn method(mut self, method: MethodSig) -> Self {
        self.methods.push(method);
        self
    }

    /// Extend another interface.
    pub fn extends(mut self, base: impl Into<InterfaceConstraint>) -> Self {
        self.bases.push(base.into());
        self
    }

    /// Look up a method signature by name.
    pub fn find_method(&self, name: &str) -> Option<&MethodSig> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Whether the self-type pattern is a constructor shape such as `F _`.
    pub fn requires_constructor(&self) -> bool {
        self.self_pattern.as_ref().is_some_and(TypeExpr::is_constructor_shape)
    }

    /// Variables of the self-type pattern: the interface parameters, plus the
    /// head of a constructor shape (`F` in `F _`).
    pub fn self_pattern_vars(&self) -> FxHashSet<String> {
        let mut vars: FxHashSet<String> = self.generics.iter().map(|g| g.name.clone()).collect();
        if let Some(pattern) = &self.self_pattern {
            if pattern.is_constructor_shape() {
                if let Some(head) = pattern.head_name() {
                    vars.insert(head.to_string());
                }
            }
        }
        vars
    }
}

/// A concrete method with a body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Method name.
    pub name: String,
    /// Signature; the receiver is the first parameter.
    pub sig: FnSig,
    /// The body handle.
    pub body: BodyId,
}

impl MethodDef {
    /// Create a method.
    pub fn new(name: impl Into<String>, sig: FnSig, body: BodyId) -> Self {
        Self {
            name: name.into(),
            sig,
            body,
        }
    }
}

/// Anything that declares generic parameters over a target type.
///
/// Implemented by impls, inherent method sets and free functions so that
/// matching, obligation checking and specificity treat them uniformly.
pub trait GenericDecl {
    /// The type pattern a receiver must match.
    fn target(&self) -> &TypeExpr;
    /// Declared generic parameters.
    fn generics(&self) -> &[GenericParam];
    /// Where-clause entries.
    fn where_clause(&self) -> &[WhereClause];
    /// Human-readable description used in diagnostics.
    fn description(&self) -> String;

    /// Names of the declared generic parameters.
    fn generic_names(&self) -> FxHashSet<String> {
        self.generics().iter().map(|g| g.name.clone()).collect()
    }

    /// All bounds per generic parameter, inline bounds first, in declaration order.
    fn constraints(&self) -> IndexMap<String, Vec<InterfaceConstraint>> {
        let mut out: IndexMap<String, Vec<InterfaceConstraint>> = IndexMap::new();
        for param in self.generics() {
            if !param.bounds.is_empty() {
                out.entry(param.name.clone()).or_default().extend(param.bounds.iter().cloned());
            }
        }
        for clause in self.where_clause() {
            out.entry(clause.param.clone()).or_default().extend(clause.bounds.iter().cloned());
        }
        out
    }
}

/// Inherent methods declared directly on a type.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSet {
    /// The receiver pattern.
    pub target: TypeExpr,
    /// Generic parameters of the methods block.
    pub generics: Vec<GenericParam>,
    /// Where-clause entries.
    pub where_clause: Vec<WhereClause>,
    /// The methods.
    pub methods: Vec<MethodDef>,
}

impl MethodSet {
    /// An empty methods block for `target`.
    pub fn new(target: TypeExpr) -> Self {
        Self {
            target,
            generics: Vec::new(),
            where_clause: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Add a generic parameter.
    pub fn generic(mut self, param: GenericParam) -> Self {
        self.generics.push(param);
        self
    }

    /// Add a where-clause entry.
    pub fn where_bound(mut self, clause: WhereClause) -> Self {
        self.where_clause.push(clause);
        self
    }

    /// Add a method.
    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Look up a method by name.
    pub fn find_method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl GenericDecl for MethodSet {
    fn target(&self) -> &TypeExpr {
        &self.target
    }
    fn generics(&self) -> &[GenericParam] {
        &self.generics
    }
    fn where_clause(&self) -> &[WhereClause] {
        &self.where_clause
    }
    fn description(&self) -> String {
        format!("methods for {}", self.target)
    }
}

/// An implementation of an interface for a target pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplRecord {
    /// The implemented interface.
    pub interface: String,
    /// Interface type arguments: `impl Into i32 for ...`.
    pub interface_args: Vec<TypeExpr>,
    /// The target pattern.
    pub target: TypeExpr,
    /// Impl-level generic parameters.
    pub generics: Vec<GenericParam>,
    /// Where-clause entries.
    pub where_clause: Vec<WhereClause>,
    /// Explicit name; named impls are reachable only by qualification.
    pub name: Option<String>,
    /// Method bodies.
    pub methods: Vec<MethodDef>,
}

impl ImplRecord {
    /// An unnamed impl of `interface` for `target`.
    pub fn new(interface: impl Into<String>, target: TypeExpr) -> Self {
        Self {
            interface: interface.into(),
            interface_args: Vec::new(),
            target,
            generics: Vec::new(),
            where_clause: Vec::new(),
            name: None,
            methods: Vec::new(),
        }
    }

    /// Set the interface type arguments.
    pub fn interface_args(mut self, args: Vec<TypeExpr>) -> Self {
        self.interface_args = args;
        self
    }

    /// Add a generic parameter.
    pub fn generic(mut self, param: GenericParam) -> Self {
        self.generics.push(param);
        self
    }

    /// Add a where-clause entry.
    pub fn where_bound(mut self, clause: WhereClause) -> Self {
        self.where_clause.push(clause);
        self
    }

    /// Give the impl an explicit name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a method.
    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Look up a method by name.
    pub fn find_method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// The implemented interface as a constraint.
    pub fn constraint(&self) -> InterfaceConstraint {
        InterfaceConstraint::with_args(self.interface.clone(), self.interface_args.clone())
    }
}

impl GenericDecl for ImplRecord {
    fn target(&self) -> &TypeExpr {
        &self.target
    }
    fn generics(&self) -> &[GenericParam] {
        &self.generics
    }
    fn where_clause(&self) -> &[WhereClause] {
        &self.where_clause
    }
    fn description(&self) -> String {
        match &self.name {
            Some(name) => format!("{} = impl {} for {}", name, self.constraint(), self.target),
            None => format!("impl {} for {}", self.constraint(), self.target),
        }
    }
}

/// A free-standing function, reachable from method syntax through UFCS.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeFunction {
    /// Function name.
    pub name: String,
    /// Generic parameters.
    pub generics: Vec<GenericParam>,
    /// Where-clause entries.
    pub where_clause: Vec<WhereClause>,
    /// Signature; the first parameter receives the method-call receiver.
    pub sig: FnSig,
    /// The body handle.
    pub body: BodyId,
}

impl FreeFunction {
    /// Create a non-generic function.
    pub fn new(name: impl Into<String>, sig: FnSig, body: BodyId) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            where_clause: Vec::new(),
            sig,
            body,
        }
    }

    /// Add a generic parameter.
    pub fn generic(mut self, param: GenericParam) -> Self {
        self.generics.push(param);
        self
    }

    /// Add a where-clause entry.
    pub fn where_bound(mut self, clause: WhereClause) -> Self {
        self.where_clause.push(clause);
        self
    }
}

static NO_RECEIVER: TypeExpr = TypeExpr::Wildcard;

impl GenericDecl for FreeFunction {
    fn target(&self) -> &TypeExpr {
        self.sig.params.first().unwrap_or(&NO_RECEIVER)
    }
    fn generics(&self) -> &[GenericParam] {
        &self.generics
    }
    fn where_clause(&self) -> &[WhereClause] {
        &self.where_clause
    }
    fn description(&self) -> String {
        format!("fn {}{}", self.name, self.sig)
    }
}
