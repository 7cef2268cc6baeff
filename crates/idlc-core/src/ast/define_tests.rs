use crate::annotations::Annotations;
use crate::ast::{Ast, NodeKind, NodeSpec, SemanticError};
use crate::expr::Expr;
use crate::ident::Identifier;
use crate::types::Type;
use crate::value::Value;

fn ident(s: &str) -> Identifier {
    s.into()
}

fn none() -> Annotations {
    Annotations::new()
}

#[test]
fn modules_reopen_into_a_chain() {
    let mut ast = Ast::new();
    let root = ast.root();
    let m1 = ast.define(root, Some(ident("M")), NodeSpec::Module, none()).unwrap();
    let m2 = ast.define(root, Some(ident("M")), NodeSpec::Module, none()).unwrap();
    assert_ne!(m1, m2);
    assert_eq!(ast.module_chain(m1), vec![m1, m2]);
    assert_eq!(ast.module_chain(m2), vec![m1, m2]);

    // names from the first opening are visible in the reopening
    let lit = Expr::literal(&ast, Type::Long, Value::Int(1)).unwrap();
    ast.define(m1, Some(ident("ONE")), NodeSpec::Const { ty: Type::Long, expr: lit }, none())
        .unwrap();
    assert!(ast.search_self(m2, &ident("ONE")).unwrap().is_some());
}

#[test]
fn lookup_is_case_insensitive_but_spelling_sensitive() {
    let mut ast = Ast::new();
    let root = ast.root();
    ast.define(root, Some(ident("Foo")), NodeSpec::Enum, none()).unwrap();
    let err = ast.search_self(root, &ident("foo")).unwrap_err();
    assert!(matches!(err, SemanticError::NameClash { .. }));
}

#[test]
fn conflicting_kinds_for_one_name_are_rejected() {
    let mut ast = Ast::new();
    let root = ast.root();
    ast.define(root, Some(ident("Thing")), NodeSpec::Enum, none()).unwrap();
    let err = ast
        .define(
            root,
            Some(ident("Thing")),
            NodeSpec::Struct { forward: false, exception: false },
            none(),
        )
        .unwrap_err();
    assert!(matches!(err, SemanticError::AlreadyIntroduced { .. }));
}

#[test]
fn forward_struct_completes_in_place() {
    let mut ast = Ast::new();
    let root = ast.root();
    let fwd = ast
        .define(root, Some(ident("S")), NodeSpec::Struct { forward: true, exception: false }, none())
        .unwrap();
    assert!(!ast.is_defined(fwd));
    let full = ast
        .define(root, Some(ident("S")), NodeSpec::Struct { forward: false, exception: false }, none())
        .unwrap();
    assert_eq!(fwd, full);
    ast.mark_defined(full);
    assert!(ast.is_defined(full));

    // a second full definition is an error
    let err = ast
        .define(root, Some(ident("S")), NodeSpec::Struct { forward: false, exception: false }, none())
        .unwrap_err();
    assert!(matches!(err, SemanticError::Redefinition { .. }));
}

#[test]
fn repeated_forward_declarations_reuse_the_node() {
    let mut ast = Ast::new();
    let root = ast.root();
    let spec = NodeSpec::Interface {
        forward: true,
        is_abstract: false,
        is_local: false,
        is_pseudo: false,
    };
    let a = ast.define(root, Some(ident("I")), spec.clone(), none()).unwrap();
    let b = ast.define(root, Some(ident("I")), spec, none()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn interface_attributes_must_match_the_forward_declaration() {
    let mut ast = Ast::new();
    let root = ast.root();
    ast.define(
        root,
        Some(ident("I")),
        NodeSpec::Interface { forward: true, is_abstract: false, is_local: true, is_pseudo: false },
        none(),
    )
    .unwrap();
    let err = ast
        .define(
            root,
            Some(ident("I")),
            NodeSpec::Interface {
                forward: false,
                is_abstract: false,
                is_local: false,
                is_pseudo: false,
            },
            none(),
        )
        .unwrap_err();
    assert!(matches!(err, SemanticError::InvalidBase { .. }));
}

#[test]
fn scope_policy_rejects_misplaced_declarations() {
    let mut ast = Ast::new();
    let root = ast.root();
    let err = ast
        .define(
            root,
            Some(ident("op")),
            NodeSpec::Operation { oneway: false, ret: Type::Void, raises: vec![] },
            none(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SemanticError::NotDefinable { kind: "operation", scope_kind: "module" }
    ));
}

#[test]
fn enumerators_are_visible_in_the_enclosing_scope() {
    let mut ast = Ast::new();
    let root = ast.root();
    let m = ast.define(root, Some(ident("M")), NodeSpec::Module, none()).unwrap();
    let e = ast.define(m, Some(ident("Color")), NodeSpec::Enum, none()).unwrap();
    let red = ast
        .define(m, Some(ident("RED")), NodeSpec::Enumerator { enum_node: e, value: 0 }, none())
        .unwrap();
    assert_eq!(ast.search_self(m, &ident("RED")).unwrap(), Some(red));
    assert_eq!(ast.enumerator_count(e), 1);
    assert_eq!(ast.scoped_name(red), "M::RED");
}

#[test]
fn resolution_walks_enclosing_scopes_and_caches() {
    let mut ast = Ast::new();
    let root = ast.root();
    let lit = Expr::literal(&ast, Type::Long, Value::Int(7)).unwrap();
    let c = ast
        .define(root, Some(ident("LIMIT")), NodeSpec::Const { ty: Type::Long, expr: lit }, none())
        .unwrap();
    let m = ast.define(root, Some(ident("M")), NodeSpec::Module, none()).unwrap();
    assert_eq!(ast.resolve(m, &ident("LIMIT")).unwrap(), Some(c));
    // cached into the inner scope, so a clashing spelling now errors there
    assert!(ast.search_self(m, &ident("limit")).is_err());
}

#[test]
fn includes_are_transparent_scopes() {
    let mut ast = Ast::new();
    let root = ast.root();
    let inc = ast
        .define(
            root,
            Some(ident("$INC:defs.idl")),
            NodeSpec::Include {
                filename: "defs.idl".into(),
                fullpath: "/x/defs.idl".into(),
                defined: true,
                preprocessed: false,
            },
            none(),
        )
        .unwrap();
    let e = ast.define(inc, Some(ident("Color")), NodeSpec::Enum, none()).unwrap();
    // the name lands in the enclosing module, the child under the include
    assert_eq!(ast.search_self(root, &ident("Color")).unwrap(), Some(e));
    assert!(ast.node(inc).children().contains(&e));
    assert_eq!(ast.scoped_name(e), "Color");
}

#[test]
fn repository_ids_derive_from_prefix_and_version() {
    let mut ast = Ast::new();
    let root = ast.root();
    ast.set_prefix(root, Some("acme.org")).unwrap();
    let m = ast.define(root, Some(ident("M")), NodeSpec::Module, none()).unwrap();
    let e = ast.define(m, Some(ident("Color")), NodeSpec::Enum, none()).unwrap();
    assert_eq!(ast.repository_id(e), "IDL:acme.org/M/Color:1.0");
    ast.set_repo_version(e, "2.3").unwrap();
    assert_eq!(ast.repository_id(e), "IDL:acme.org/M/Color:2.3");
    // an explicit id with a conflicting version is rejected
    assert!(ast.set_repo_id(e, "IDL:other/Color:9.9").is_err());
    ast.set_repo_id(e, "IDL:other/Color:2.3").unwrap();
    assert_eq!(ast.repository_id(e), "IDL:other/Color:2.3");
}

#[test]
fn include_prefixes_stay_within_the_include() {
    let mut ast = Ast::new();
    let root = ast.root();
    let inc = ast
        .define(
            root,
            Some(ident("$INC:defs.idl")),
            NodeSpec::Include {
                filename: "defs.idl".into(),
                fullpath: "/x/defs.idl".into(),
                defined: true,
                preprocessed: false,
            },
            none(),
        )
        .unwrap();
    ast.set_prefix(inc, Some("inner.org")).unwrap();
    let a = ast.define(inc, Some(ident("A")), NodeSpec::Enum, none()).unwrap();
    let b = ast.define(root, Some(ident("B")), NodeSpec::Enum, none()).unwrap();
    assert_eq!(ast.repository_id(a), "IDL:inner.org/A:1.0");
    assert_eq!(ast.repository_id(b), "IDL:B:1.0");
}

#[test]
fn invalid_repository_ids_are_rejected() {
    let mut ast = Ast::new();
    let root = ast.root();
    let e = ast.define(root, Some(ident("Color")), NodeSpec::Enum, none()).unwrap();
    assert!(matches!(
        ast.set_repo_id(e, "IDL:/bad id!/:1.0"),
        Err(SemanticError::InvalidRepoId { .. })
    ));
    assert!(ast.set_repo_id(e, "IDL:acme.org/Color:1.0").is_ok());
    // non-IDL formats carry no charset rules
    let d = ast.define(root, Some(ident("Other")), NodeSpec::Enum, none()).unwrap();
    assert!(ast.set_repo_id(d, "DCE:d62207a2-011e-11ce-88b4:1").is_ok());
}

#[test]
fn invalid_prefixes_are_rejected() {
    let mut ast = Ast::new();
    let root = ast.root();
    assert!(matches!(
        ast.set_prefix(root, Some("/leading")),
        Err(SemanticError::InvalidPrefix { .. })
    ));
    assert!(ast.set_prefix(root, Some("ok/path-1.x")).is_ok());
}

#[test]
fn anonymous_bitfields_are_allowed() {
    let mut ast = Ast::new();
    let root = ast.root();
    let bs = ast
        .define(root, Some(ident("Flags")), NodeSpec::BitSet { base: None }, none())
        .unwrap();
    ast.define(bs, Some(ident("a")), NodeSpec::BitField { bits: 3, ty: None }, none())
        .unwrap();
    let pad = ast
        .define(bs, None, NodeSpec::BitField { bits: 5, ty: None }, none())
        .unwrap();
    assert!(ast.node(pad).name.is_none());
    assert_eq!(ast.bitset_bits(bs), 8);
    match ast.node(pad).kind() {
        NodeKind::BitField(def) => assert_eq!(def.ty, Type::Int8),
        other => panic!("unexpected kind {other:?}"),
    }
}
