//! End-to-end resolution scenarios.
//!
//! Each test builds a fresh registry, freezes it, and checks what the
//! resolution queries return for it.

use pretty_assertions::assert_eq;
use tracing_subscriber::EnvFilter;

use polydispatch::{
    BodyId, FnSig, GenericParam, ImplRecord, InterfaceConstraint, InterfaceDef, MethodDef,
    MethodSet, MethodSig, MethodSource, Registry, RegistryBuilder, RegistrationError,
    ResolutionError, ResolverConfig, TypeAlias, TypeExpr, WhereClause,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn t(name: &str) -> TypeExpr {
    TypeExpr::simple(name)
}

fn wrapper(inner: TypeExpr) -> TypeExpr {
    TypeExpr::generic("Wrapper", vec![inner])
}

fn show_interface() -> InterfaceDef {
    InterfaceDef::new("Show").method(MethodSig::required(
        "show",
        FnSig::method(vec![], t("String")),
    ))
}

fn show_impl(target: TypeExpr, body: u32) -> ImplRecord {
    ImplRecord::new("Show", target).method(MethodDef::new(
        "show",
        FnSig::method(vec![], t("String")),
        BodyId::new(body),
    ))
}

/// `Show`, plus marker interfaces `Readable` and `Writable`.
fn base_builder() -> RegistryBuilder {
    init_tracing();
    let mut builder = RegistryBuilder::new(ResolverConfig::default());
    builder.register_interface(show_interface()).unwrap();
    builder.register_interface(InterfaceDef::new("Readable")).unwrap();
    builder.register_interface(InterfaceDef::new("Writable")).unwrap();
    builder
}

// ============================================================
// Coherence
// ============================================================

#[test]
fn test_identical_unnamed_impls_conflict() {
    let mut builder = base_builder();
    builder.register_impl(show_impl(t("Point"), 1)).unwrap();
    let err = builder.register_impl(show_impl(t("Point"), 2)).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"conflicting unnamed impls of `Show` for `Point` and `Point`"
    );
}

#[test]
fn test_bare_target_does_not_cover_applications() {
    let mut builder = base_builder();
    let bare = builder.register_impl(show_impl(t("Array"), 1)).unwrap();
    let applied = builder
        .register_impl(show_impl(TypeExpr::generic("Array", vec![t("i32")]), 2))
        .unwrap();
    let registry = builder.freeze();

    let array_i32 = TypeExpr::generic("Array", vec![t("i32")]);
    assert_eq!(registry.resolve_interface_impl("Show", &array_i32).unwrap().id, applied);
    assert_eq!(registry.resolve_interface_impl("Show", &t("Array")).unwrap().id, bare);
}

#[test]
fn test_named_impls_resolve_only_by_name() {
    let mut builder = base_builder();
    let verbose = builder.register_impl(show_impl(t("Point"), 1).named("Verbose")).unwrap();
    let terse = builder.register_impl(show_impl(t("Point"), 2).named("Terse")).unwrap();
    let registry = builder.freeze();

    assert!(matches!(
        registry.resolve_interface_impl("Show", &t("Point")),
        Err(ResolutionError::NotFound { .. })
    ));
    assert!(matches!(
        registry.resolve_method(&t("Point"), "show", None),
        Err(ResolutionError::NotFound { .. })
    ));

    assert_eq!(registry.resolve_named_impl("Verbose", &t("Point")).unwrap().id, verbose);
    assert_eq!(registry.resolve_named_impl("Terse", &t("Point")).unwrap().id, terse);

    let bound = registry.resolve_method(&t("Point"), "show", Some("Terse")).unwrap();
    assert_eq!(bound.body, BodyId::new(2));
    assert_eq!(bound.description, "Terse = impl Show for Point");
    assert_eq!(
        bound.source,
        MethodSource::Impl {
            id: terse,
            interface: "Show".to_string(),
            name: Some("Terse".to_string()),
        }
    );

    assert!(registry.resolve_named_impl("Verbose", &t("Line")).is_err());
}

// ============================================================
// Specificity
// ============================================================

fn bounded_wrapper_registry() -> (Registry, polydispatch::ImplId, polydispatch::ImplId) {
    let mut builder = base_builder();
    builder.register_impl(ImplRecord::new("Readable", t("Fancy"))).unwrap();
    builder.register_impl(ImplRecord::new("Writable", t("Fancy"))).unwrap();
    builder.register_impl(ImplRecord::new("Readable", t("Basic"))).unwrap();

    let readable = builder
        .register_impl(
            show_impl(wrapper(t("T")), 10)
                .generic(GenericParam::new("T"))
                .where_bound(WhereClause::new("T", &["Readable"])),
        )
        .unwrap();
    let both = builder
        .register_impl(
            show_impl(wrapper(t("T")), 20)
                .generic(GenericParam::new("T"))
                .where_bound(WhereClause::new("T", &["Readable", "Writable"])),
        )
        .unwrap();
    (builder.freeze(), readable, both)
}

#[test]
fn test_constraint_superset_wins() {
    let (registry, readable, both) = bounded_wrapper_registry();

    let fancy = registry.resolve_interface_impl("Show", &wrapper(t("Fancy"))).unwrap();
    assert_eq!(fancy.id, both);
    assert_eq!(fancy.substitution.get("T"), Some(&t("Fancy")));

    let basic = registry.resolve_interface_impl("Show", &wrapper(t("Basic"))).unwrap();
    assert_eq!(basic.id, readable);

    let method = registry.resolve_method(&wrapper(t("Fancy")), "show", None).unwrap();
    assert_eq!(method.body, BodyId::new(20));
}

#[test]
fn test_no_candidate_satisfies_bounds() {
    let (registry, _, _) = bounded_wrapper_registry();
    let err = registry.resolve_interface_impl("Show", &wrapper(t("Opaque"))).unwrap_err();
    let ResolutionError::ConstraintUnsatisfied(chain) = err else {
        panic!("expected unsatisfied constraint, got {err:?}");
    };
    assert_eq!(chain.innermost().map(|o| o.ty.clone()), Some(t("Opaque")));
    assert_eq!(chain.root().map(|o| o.ty.clone()), Some(wrapper(t("Opaque"))));
}

#[test]
fn test_union_subset_specificity() {
    let mut builder = base_builder();
    let pair = builder
        .register_impl(show_impl(TypeExpr::union(vec![t("Fancy"), t("Basic")]), 1))
        .unwrap();
    let triple = builder
        .register_impl(show_impl(TypeExpr::union(vec![t("Fancy"), t("Basic"), t("Extra")]), 2))
        .unwrap();
    let registry = builder.freeze();

    assert_eq!(registry.resolve_interface_impl("Show", &t("Extra")).unwrap().id, triple);
    assert_eq!(registry.resolve_interface_impl("Show", &t("Fancy")).unwrap().id, pair);
    assert_eq!(registry.resolve_interface_impl("Show", &t("Basic")).unwrap().id, pair);
}

#[test]
fn test_overlapping_unions_are_ambiguous() {
    let mut builder = base_builder();
    let first = builder
        .register_impl(show_impl(TypeExpr::union(vec![t("Fancy"), t("Basic")]), 1))
        .unwrap();
    builder
        .register_impl(show_impl(TypeExpr::union(vec![t("Fancy"), t("Extra")]), 2))
        .unwrap();
    let registry = builder.freeze();

    let err = registry.resolve_interface_impl("Show", &t("Fancy")).unwrap_err();
    assert_eq!(
        err,
        ResolutionError::Ambiguous {
            receiver: t("Fancy"),
            member: "Show".to_string(),
            candidates: vec![
                "impl Show for Fancy | Basic".to_string(),
                "impl Show for Fancy | Extra".to_string(),
            ],
        }
    );
    assert_eq!(registry.resolve_interface_impl("Show", &t("Basic")).unwrap().id, first);
}

#[test]
fn test_concrete_impl_beats_blanket() {
    let mut builder = base_builder();
    builder
        .register_impl(show_impl(t("T"), 1).generic(GenericParam::new("T")))
        .unwrap();
    let concrete = builder.register_impl(show_impl(wrapper(t("i32")), 2)).unwrap();
    let registry = builder.freeze();

    assert_eq!(registry.resolve_interface_impl("Show", &wrapper(t("i32"))).unwrap().id, concrete);
    let other = registry.resolve_method(&wrapper(t("i64")), "show", None).unwrap();
    assert_eq!(other.body, BodyId::new(1));
}

// ============================================================
// Inherent precedence
// ============================================================

#[test]
fn test_inherent_method_wins() {
    let mut builder = base_builder();
    builder
        .register_inherent(MethodSet::new(t("Point")).method(MethodDef::new(
            "show",
            FnSig::method(vec![], t("String")),
            BodyId::new(1),
        )))
        .unwrap();
    builder.register_impl(show_impl(t("Point"), 2)).unwrap();
    let registry = builder.freeze();

    let bound = registry.resolve_method(&t("Point"), "show", None).unwrap();
    assert_eq!(bound.body, BodyId::new(1));
    assert_eq!(bound.source, MethodSource::Inherent { target: t("Point") });

    // Qualification reaches the impl.
    let qualified = registry.resolve_method(&t("Point"), "show", Some("Show")).unwrap();
    assert_eq!(qualified.body, BodyId::new(2));
}

#[test]
fn test_generic_inherent_beats_concrete_impl() {
    let mut builder = base_builder();
    builder
        .register_interface(
            InterfaceDef::new("Len")
                .method(MethodSig::required("len", FnSig::method(vec![], t("usize")))),
        )
        .unwrap();
    builder
        .register_inherent(
            MethodSet::new(TypeExpr::generic("Array", vec![t("T")]))
                .generic(GenericParam::new("T"))
                .method(MethodDef::new("len", FnSig::method(vec![], t("usize")), BodyId::new(1))),
        )
        .unwrap();
    builder
        .register_impl(
            ImplRecord::new("Len", TypeExpr::generic("Array", vec![t("i32")]))
                .method(MethodDef::new("len", FnSig::method(vec![], t("usize")), BodyId::new(2))),
        )
        .unwrap();
    let registry = builder.freeze();

    let bound = registry
        .resolve_method(&TypeExpr::generic("Array", vec![t("i32")]), "len", None)
        .unwrap();
    assert_eq!(bound.body, BodyId::new(1));
    assert_eq!(bound.substitution.get("T"), Some(&t("i32")));
}

#[test]
fn test_inherent_redefinition_rejected_by_default() {
    let mut builder = base_builder();
    let norm = || MethodDef::new("norm", FnSig::method(vec![], t("f64")), BodyId::new(1));
    builder.register_inherent(MethodSet::new(t("Vec2")).method(norm())).unwrap();
    let err = builder
        .register_inherent(MethodSet::new(t("Vec2")).method(norm()))
        .unwrap_err();
    assert_eq!(
        err,
        RegistrationError::InherentRedefinition {
            target: t("Vec2"),
            method: "norm".to_string(),
        }
    );
}

// ============================================================
// Obligations
// ============================================================

fn recursive_wrapper_registry() -> Registry {
    let mut builder = base_builder();
    builder
        .register_impl(
            show_impl(wrapper(t("T")), 1)
                .generic(GenericParam::new("T"))
                .where_bound(WhereClause::new("T", &["Show"])),
        )
        .unwrap();
    builder.register_impl(show_impl(t("i32"), 2)).unwrap();
    builder.freeze()
}

#[test]
fn test_obligation_chain_innermost_first() {
    let registry = recursive_wrapper_registry();

    let err = registry.check_constraint(&wrapper(t("Opaque")), "Show").unwrap_err();
    let ResolutionError::ConstraintUnsatisfied(chain) = &err else {
        panic!("expected unsatisfied constraint, got {err:?}");
    };
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.root().map(|o| o.ty.clone()), Some(wrapper(t("Opaque"))));
    insta::assert_snapshot!(
        err.to_string(),
        @"constraint not satisfied: Opaque does not implement Show, required by Wrapper Opaque: Show"
    );

    let nested = registry
        .check_constraint(&wrapper(wrapper(t("Opaque"))), "Show")
        .unwrap_err();
    let ResolutionError::ConstraintUnsatisfied(chain) = nested else {
        panic!("expected unsatisfied constraint");
    };
    assert_eq!(chain.len(), 2);
    let types: Vec<TypeExpr> = chain.iter().map(|o| o.ty.clone()).collect();
    assert_eq!(types, vec![t("Opaque"), wrapper(t("Opaque"))]);
    assert_eq!(
        chain.to_string(),
        "Opaque does not implement Show, required by Wrapper Opaque: Show, \
         required by Wrapper (Wrapper Opaque): Show"
    );

    assert!(registry.check_constraint(&wrapper(wrapper(t("i32"))), "Show").is_ok());
}

#[test]
fn test_builtin_capabilities_from_config() {
    init_tracing();
    let config = ResolverConfig::from_toml_str(
        r#"
        builtin_capabilities = ["Clone"]

        [capability_exclusions]
        Clone = ["Socket"]
        "#,
    )
    .unwrap();
    let registry = RegistryBuilder::new(config).freeze();

    assert!(registry.check_constraint(&t("Point"), "Clone").is_ok());
    assert!(registry.check_constraint(&t("Socket"), "Clone").is_err());
    assert!(registry.check_constraint(&t("Point"), "Display").is_err());
}

// ============================================================
// Interfaces
// ============================================================

#[test]
fn test_constructor_self_type() {
    let mut builder = base_builder();
    builder
        .register_interface(
            InterfaceDef::new("Enumerable")
                .generic(GenericParam::new("A"))
                .self_pattern(TypeExpr::generic("C", vec![TypeExpr::Wildcard])),
        )
        .unwrap();
    let array = builder.register_impl(ImplRecord::new("Enumerable", t("Array"))).unwrap();
    builder.register_impl(ImplRecord::new("Enumerable", t("HashMap"))).unwrap();

    let err = builder
        .register_impl(ImplRecord::new("Enumerable", TypeExpr::generic("Array", vec![t("i32")])))
        .unwrap_err();
    assert!(matches!(err, RegistrationError::ShapeMismatch { .. }));

    let registry = builder.freeze();
    let map = TypeExpr::generic("HashMap", vec![t("String"), t("i32")]);
    assert!(registry.check_constraint(&map, "Enumerable").is_ok());
    assert_eq!(
        registry
            .resolve_interface_impl("Enumerable", &TypeExpr::generic("Array", vec![t("i32")]))
            .unwrap()
            .id,
        array
    );
    assert!(registry.check_constraint(&t("i32"), "Enumerable").is_err());
}

#[test]
fn test_base_interface_defaults_and_obligations() {
    init_tracing();
    let mut builder = RegistryBuilder::default();
    builder
        .register_interface(InterfaceDef::new("Readable").method(MethodSig::defaulted(
            "describe",
            FnSig::method(vec![], t("String")),
            BodyId::new(50),
        )))
        .unwrap();
    builder
        .register_interface(
            InterfaceDef::new("Stream")
                .extends("Readable")
                .method(MethodSig::required(
                    "next",
                    FnSig::method(vec![], TypeExpr::nullable(t("u8"))),
                )),
        )
        .unwrap();
    let next = || {
        MethodDef::new(
            "next",
            FnSig::method(vec![], TypeExpr::nullable(t("u8"))),
            BodyId::new(51),
        )
    };
    let readable = builder.register_impl(ImplRecord::new("Readable", t("File"))).unwrap();
    builder.register_impl(ImplRecord::new("Stream", t("File")).method(next())).unwrap();
    builder.register_impl(ImplRecord::new("Stream", t("Pipe")).method(next())).unwrap();
    let registry = builder.freeze();

    let describe = registry.resolve_method(&t("File"), "describe", None).unwrap();
    assert_eq!(describe.body, BodyId::new(50));
    assert_eq!(
        describe.source,
        MethodSource::InterfaceDefault {
            id: readable,
            interface: "Readable".to_string(),
        }
    );

    assert!(registry.check_constraint(&t("File"), "Stream").is_ok());
    let err = registry.check_constraint(&t("Pipe"), "Stream").unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"constraint not satisfied: Pipe does not implement Readable, required by Pipe: Stream"
    );
}

#[test]
fn test_dispatch_requires_base_interfaces() {
    init_tracing();
    let mut builder = RegistryBuilder::default();
    builder.register_interface(InterfaceDef::new("Readable")).unwrap();
    builder
        .register_interface(
            InterfaceDef::new("Writable")
                .extends("Readable")
                .method(MethodSig::required("write", FnSig::method(vec![t("u8")], t("Unit")))),
        )
        .unwrap();
    let write = || MethodDef::new("write", FnSig::method(vec![t("u8")], t("Unit")), BodyId::new(3));
    builder.register_impl(ImplRecord::new("Writable", t("Pipe")).method(write())).unwrap();
    let file = builder
        .register_impl(ImplRecord::new("Writable", t("File")).method(write()))
        .unwrap();
    builder.register_impl(ImplRecord::new("Readable", t("File"))).unwrap();
    let registry = builder.freeze();

    let checked = registry.check_constraint(&t("Pipe"), "Writable").unwrap_err();
    let resolved = registry.resolve_interface_impl("Writable", &t("Pipe")).unwrap_err();
    assert_eq!(resolved, checked);
    insta::assert_snapshot!(
        resolved.to_string(),
        @"constraint not satisfied: Pipe does not implement Readable, required by Pipe: Writable"
    );
    assert_eq!(registry.resolve_method(&t("Pipe"), "write", None).unwrap_err(), checked);

    assert!(registry.check_constraint(&t("File"), "Writable").is_ok());
    assert_eq!(registry.resolve_interface_impl("Writable", &t("File")).unwrap().id, file);
    assert_eq!(registry.resolve_method(&t("File"), "write", None).unwrap().body, BodyId::new(3));
}

#[test]
fn test_sub_interface_default_overrides_base() {
    init_tracing();
    let describe = |body| {
        MethodSig::defaulted("describe", FnSig::method(vec![], t("String")), BodyId::new(body))
    };
    let mut builder = RegistryBuilder::default();
    builder.register_interface(InterfaceDef::new("Base").method(describe(1))).unwrap();
    builder
        .register_interface(InterfaceDef::new("Sub").extends("Base").method(describe(2)))
        .unwrap();
    builder.register_interface(InterfaceDef::new("Leaf").extends("Sub")).unwrap();
    builder.register_impl(ImplRecord::new("Base", t("X"))).unwrap();
    let sub = builder.register_impl(ImplRecord::new("Sub", t("X"))).unwrap();
    builder.register_impl(ImplRecord::new("Leaf", t("X"))).unwrap();
    builder.register_impl(ImplRecord::new("Base", t("Y"))).unwrap();
    let registry = builder.freeze();

    let bound = registry.resolve_method(&t("X"), "describe", None).unwrap();
    assert_eq!(bound.body, BodyId::new(2));
    assert_eq!(
        bound.source,
        MethodSource::InterfaceDefault {
            id: sub,
            interface: "Sub".to_string(),
        }
    );
    assert_eq!(
        registry.resolve_method(&t("X"), "describe", Some("Base")).unwrap().body,
        BodyId::new(1)
    );
    assert_eq!(registry.resolve_method(&t("Y"), "describe", None).unwrap().body, BodyId::new(1));
}

#[test]
fn test_interface_arguments_select_impl() {
    init_tracing();
    let mut builder = RegistryBuilder::default();
    builder
        .register_interface(
            InterfaceDef::new("Into")
                .generic(GenericParam::new("T"))
                .method(MethodSig::required("into", FnSig::method(vec![], t("T")))),
        )
        .unwrap();
    let to_f64 = builder
        .register_impl(
            ImplRecord::new("Into", t("Meters"))
                .interface_args(vec![t("f64")])
                .method(MethodDef::new("into", FnSig::method(vec![], t("f64")), BodyId::new(1))),
        )
        .unwrap();
    let to_i64 = builder
        .register_impl(
            ImplRecord::new("Into", t("Meters"))
                .interface_args(vec![t("i64")])
                .method(MethodDef::new("into", FnSig::method(vec![], t("i64")), BodyId::new(2))),
        )
        .unwrap();
    let registry = builder.freeze();

    let f64_bound = InterfaceConstraint::with_args("Into", vec![t("f64")]);
    let i64_bound = InterfaceConstraint::with_args("Into", vec![t("i64")]);
    assert_eq!(registry.resolve_interface_impl(f64_bound, &t("Meters")).unwrap().id, to_f64);
    assert_eq!(
        registry.resolve_interface_impl(i64_bound.clone(), &t("Meters")).unwrap().id,
        to_i64
    );
    assert!(registry.check_constraint(&t("Meters"), i64_bound).is_ok());

    // Without the argument the method name alone cannot choose.
    assert!(matches!(
        registry.resolve_method(&t("Meters"), "into", None),
        Err(ResolutionError::Ambiguous { .. })
    ));
}

#[test]
fn test_aliases_resolve_to_targets() {
    let mut builder = base_builder();
    builder.register_alias(TypeAlias::new("Score", t("i32")));
    builder.register_alias(TypeAlias::new("Scores", TypeExpr::generic("Array", vec![t("Score")])));
    let id = builder
        .register_impl(show_impl(TypeExpr::generic("Array", vec![t("i32")]), 1))
        .unwrap();
    let registry = builder.freeze();

    assert_eq!(registry.resolve_interface_impl("Show", &t("Scores")).unwrap().id, id);
    let bound = registry.resolve_method(&t("Scores"), "show", None).unwrap();
    assert_eq!(bound.receiver, TypeExpr::generic("Array", vec![t("i32")]));
}

// ============================================================
// Concurrency
// ============================================================

#[test]
fn test_frozen_registry_shared_across_threads() {
    let (registry, readable, both) = bounded_wrapper_registry();
    let lookup = |inner: &str| {
        registry
            .resolve_interface_impl("Show", &wrapper(t(inner)))
            .map(|m| m.id)
    };
    std::thread::scope(|scope| {
        let fancy = scope.spawn(|| lookup("Fancy"));
        let basic = scope.spawn(|| lookup("Basic"));
        assert_eq!(fancy.join().unwrap(), Ok(both));
        assert_eq!(basic.join().unwrap(), Ok(readable));
    });
}
