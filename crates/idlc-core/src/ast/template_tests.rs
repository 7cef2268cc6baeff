use crate::annotations::Annotations;
use crate::ast::{Ast, Concrete, NodeId, NodeKind, NodeSpec, SemanticError};
use crate::expr::Expr;
use crate::ident::Identifier;
use crate::types::{Bound, Type};
use crate::value::Value;

fn ident(s: &str) -> Identifier {
    s.into()
}

fn none() -> Annotations {
    Annotations::new()
}

/// `module Tmpl<typename T, const unsigned long MAX>` with a typedef,
/// a constant and an enum inside.
fn build_template(ast: &mut Ast) -> (NodeId, NodeId, NodeId) {
    let root = ast.root();
    let tmpl = ast
        .define(root, Some(ident("Tmpl")), NodeSpec::TemplateModule, none())
        .unwrap();
    let t = ast
        .define(tmpl, Some(ident("T")), NodeSpec::TemplateParam { ty: Type::Any }, none())
        .unwrap();
    let max = ast
        .define(
            tmpl,
            Some(ident("MAX")),
            NodeSpec::TemplateParam { ty: Type::Const(Box::new(Type::ULong)) },
            none(),
        )
        .unwrap();
    let seq = Type::Sequence {
        elem: Box::new(Type::ScopedName(t)),
        bound: Some(Bound::Param(max)),
    };
    ast.define(tmpl, Some(ident("Seq")), NodeSpec::Typedef { ty: seq }, none())
        .unwrap();
    let limit = Expr::scoped_name(ast, max).unwrap();
    ast.define(
        tmpl,
        Some(ident("LIMIT")),
        NodeSpec::Const { ty: Type::ULong, expr: limit },
        none(),
    )
    .unwrap();
    let mode = ast.define(tmpl, Some(ident("Mode")), NodeSpec::Enum, none()).unwrap();
    for (ix, name) in ["ON", "OFF"].iter().enumerate() {
        ast.define(
            tmpl,
            Some(ident(name)),
            NodeSpec::Enumerator { enum_node: mode, value: ix as u32 },
            none(),
        )
        .unwrap();
    }
    (tmpl, t, max)
}

fn args() -> Vec<Concrete> {
    let ast = Ast::new();
    vec![
        Concrete::Type(Type::Long),
        Concrete::Expr(Expr::literal(&ast, Type::ULong, Value::Int(4)).unwrap()),
    ]
}

#[test]
fn instantiation_substitutes_parameters() {
    let mut ast = Ast::new();
    let root = ast.root();
    let (tmpl, _, _) = build_template(&mut ast);
    let inst = ast
        .instantiate_template_module(root, ident("Inst"), tmpl, args(), none())
        .unwrap();

    let seq = ast.search_self(inst, &ident("Seq")).unwrap().unwrap();
    match ast.node(seq).kind() {
        NodeKind::Typedef(def) => assert_eq!(
            def.ty,
            Type::Sequence {
                elem: Box::new(Type::Long),
                bound: Some(Bound::Value(4)),
            }
        ),
        other => panic!("unexpected kind {other:?}"),
    }

    let limit = ast.search_self(inst, &ident("LIMIT")).unwrap().unwrap();
    match ast.node(limit).kind() {
        NodeKind::Const(def) => {
            assert_eq!(def.value, Some(Value::Int(4)));
            assert_eq!(def.ty, Type::ULong);
        }
        other => panic!("unexpected kind {other:?}"),
    }
    assert_eq!(ast.scoped_name(limit), "Inst::LIMIT");
}

#[test]
fn copied_nodes_are_relinked_to_their_copies() {
    let mut ast = Ast::new();
    let root = ast.root();
    let (tmpl, _, _) = build_template(&mut ast);
    let inst = ast
        .instantiate_template_module(root, ident("Inst"), tmpl, args(), none())
        .unwrap();

    let mode = ast.search_self(inst, &ident("Mode")).unwrap().unwrap();
    let on = ast.search_self(inst, &ident("ON")).unwrap().unwrap();
    assert_eq!(ast.node(on).parent, Some(inst));
    match ast.node(on).kind() {
        NodeKind::Enumerator(def) => assert_eq!(def.enum_node, mode),
        other => panic!("unexpected kind {other:?}"),
    }
    match ast.node(mode).kind() {
        NodeKind::Enum(def) => {
            assert_eq!(def.enumerators.len(), 2);
            assert!(def.enumerators.contains(&on));
        }
        other => panic!("unexpected kind {other:?}"),
    }
    assert_eq!(ast.enumerator_count(mode), 2);
}

#[test]
fn parameter_bindings_do_not_outlive_the_instantiation() {
    let mut ast = Ast::new();
    let root = ast.root();
    let (tmpl, t, max) = build_template(&mut ast);
    ast.instantiate_template_module(root, ident("Inst"), tmpl, args(), none())
        .unwrap();
    for param in [t, max] {
        match ast.node(param).kind() {
            NodeKind::TemplateParam(def) => assert!(def.concrete.is_none()),
            other => panic!("unexpected kind {other:?}"),
        }
    }
    // the same template can be instantiated again under another name
    ast.instantiate_template_module(root, ident("Inst2"), tmpl, args(), none())
        .unwrap();
}

#[test]
fn missing_and_surplus_arguments_are_rejected() {
    let mut ast = Ast::new();
    let root = ast.root();
    let (tmpl, _, _) = build_template(&mut ast);
    let err = ast
        .instantiate_template_module(
            root,
            ident("A"),
            tmpl,
            vec![Concrete::Type(Type::Long)],
            none(),
        )
        .unwrap_err();
    assert!(matches!(err, SemanticError::MissingTemplateParameter { .. }));

    let mut surplus = args();
    surplus.push(Concrete::Type(Type::Short));
    let err = ast
        .instantiate_template_module(root, ident("B"), tmpl, surplus, none())
        .unwrap_err();
    assert!(matches!(err, SemanticError::TemplateParamMismatch { .. }));
}

#[test]
fn argument_kinds_must_match_the_parameter() {
    let mut ast = Ast::new();
    let root = ast.root();
    let (tmpl, _, _) = build_template(&mut ast);
    // a constant where a type is expected
    let bad = vec![
        Concrete::Expr(Expr::literal(&ast, Type::ULong, Value::Int(1)).unwrap()),
        Concrete::Expr(Expr::literal(&ast, Type::ULong, Value::Int(4)).unwrap()),
    ];
    let err = ast
        .instantiate_template_module(root, ident("A"), tmpl, bad, none())
        .unwrap_err();
    assert!(matches!(err, SemanticError::TemplateParamMismatch { .. }));

    // a type where a constant is expected
    let bad = vec![Concrete::Type(Type::Long), Concrete::Type(Type::ULong)];
    let err = ast
        .instantiate_template_module(root, ident("B"), tmpl, bad, none())
        .unwrap_err();
    assert!(matches!(err, SemanticError::TemplateParamMismatch { .. }));

    // constant arguments still narrow to the declared type
    let bad = vec![
        Concrete::Type(Type::Long),
        Concrete::Expr(Expr::literal(&ast, Type::LongLong, Value::Int(-1)).unwrap()),
    ];
    let err = ast
        .instantiate_template_module(root, ident("C"), tmpl, bad, none())
        .unwrap_err();
    assert!(matches!(err, SemanticError::Expr(_)));
}

#[test]
fn anonymous_template_arguments_are_rejected() {
    let mut ast = Ast::new();
    let root = ast.root();
    let (tmpl, _, _) = build_template(&mut ast);
    let anon = vec![
        Concrete::Type(Type::sequence(Type::Long, None).unwrap()),
        Concrete::Expr(Expr::literal(&ast, Type::ULong, Value::Int(4)).unwrap()),
    ];
    let err = ast
        .instantiate_template_module(root, ident("A"), tmpl, anon, none())
        .unwrap_err();
    assert!(matches!(err, SemanticError::AnonymousTemplateArgument { .. }));
}

#[test]
fn sequence_parameters_check_their_bound_element() {
    let mut ast = Ast::new();
    let root = ast.root();
    let tmpl = ast
        .define(root, Some(ident("Tmpl")), NodeSpec::TemplateModule, none())
        .unwrap();
    let t = ast
        .define(tmpl, Some(ident("T")), NodeSpec::TemplateParam { ty: Type::Any }, none())
        .unwrap();
    ast.define(
        tmpl,
        Some(ident("S")),
        NodeSpec::TemplateParam {
            ty: Type::Sequence { elem: Box::new(Type::ScopedName(t)), bound: None },
        },
        none(),
    )
    .unwrap();

    let long_seq = ast
        .define(
            root,
            Some(ident("LongSeq")),
            NodeSpec::Typedef { ty: Type::sequence(Type::Long, None).unwrap() },
            none(),
        )
        .unwrap();
    let short_seq = ast
        .define(
            root,
            Some(ident("ShortSeq")),
            NodeSpec::Typedef { ty: Type::sequence(Type::Short, None).unwrap() },
            none(),
        )
        .unwrap();

    let good = vec![
        Concrete::Type(Type::Long),
        Concrete::Type(Type::ScopedName(long_seq)),
    ];
    ast.instantiate_template_module(root, ident("Good"), tmpl, good, none())
        .unwrap();

    let bad = vec![
        Concrete::Type(Type::Long),
        Concrete::Type(Type::ScopedName(short_seq)),
    ];
    let err = ast
        .instantiate_template_module(root, ident("Bad"), tmpl, bad, none())
        .unwrap_err();
    assert!(matches!(err, SemanticError::TemplateParamMismatch { .. }));
}

#[test]
fn template_references_expand_to_nested_instances() {
    let mut ast = Ast::new();
    let root = ast.root();
    let inner = ast
        .define(root, Some(ident("Inner")), NodeSpec::TemplateModule, none())
        .unwrap();
    let x = ast
        .define(inner, Some(ident("X")), NodeSpec::TemplateParam { ty: Type::Any }, none())
        .unwrap();
    ast.define(inner, Some(ident("Val")), NodeSpec::Typedef { ty: Type::ScopedName(x) }, none())
        .unwrap();

    let outer = ast
        .define(root, Some(ident("Outer")), NodeSpec::TemplateModule, none())
        .unwrap();
    let t = ast
        .define(outer, Some(ident("T")), NodeSpec::TemplateParam { ty: Type::Any }, none())
        .unwrap();
    ast.define(
        outer,
        Some(ident("Ref")),
        NodeSpec::TemplateModuleReference { template: inner, params: vec![t] },
        none(),
    )
    .unwrap();

    let inst = ast
        .instantiate_template_module(
            root,
            ident("Inst"),
            outer,
            vec![Concrete::Type(Type::Long)],
            none(),
        )
        .unwrap();

    // the reference became a module instance of Inner with T forwarded
    let r = ast.search_self(inst, &ident("Ref")).unwrap().unwrap();
    assert!(matches!(ast.node(r).kind(), NodeKind::Module(_)));
    let val = ast.search_self(r, &ident("Val")).unwrap().unwrap();
    match ast.node(val).kind() {
        NodeKind::Typedef(def) => assert_eq!(def.ty, Type::Long),
        other => panic!("unexpected kind {other:?}"),
    }
    assert_eq!(ast.scoped_name(val), "Inst::Ref::Val");
}

#[test]
fn only_template_modules_can_be_instantiated() {
    let mut ast = Ast::new();
    let root = ast.root();
    let m = ast.define(root, Some(ident("M")), NodeSpec::Module, none()).unwrap();
    let err = ast
        .instantiate_template_module(root, ident("A"), m, vec![], none())
        .unwrap_err();
    assert!(matches!(err, SemanticError::InvalidReference { .. }));
}
