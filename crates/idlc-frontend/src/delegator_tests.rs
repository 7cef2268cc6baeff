use std::fs;

use indoc::indoc;

use idlc_core::annotations::{Annotation, AnnotationValue, Annotations};
use idlc_core::ast::{CaseLabel, Concrete, NodeKind, ParamDirection, SemanticError};
use idlc_core::bootstrap::Snapshot;
use idlc_core::expr::{Expr, OpKind};
use idlc_core::ident::Identifier;
use idlc_core::types::{Bound, Type};
use idlc_core::value::Value;

use crate::delegator::{Delegator, InterfaceAttrs};
use crate::scanner::{Scanner, Token};
use crate::Error;

fn id(s: &str) -> Identifier {
    Identifier::from(s)
}

fn none() -> Annotations {
    Annotations::new()
}

fn ann(name: &str, value: AnnotationValue) -> Annotations {
    let mut a = Annotation::new(name);
    a.fields.insert("value".to_string(), value);
    let mut anns = Annotations::new();
    anns.push(a);
    anns
}

fn drain<D: crate::Directives>(scanner: &mut Scanner<D>) {
    loop {
        if scanner.next_token().unwrap().0 == Token::Eof {
            return;
        }
    }
}

#[test]
fn reopened_modules_share_their_names() {
    let mut d = Delegator::new();
    let m1 = d.define_module(id("M"), none()).unwrap();
    d.typedef(id("T"), Type::Long, none()).unwrap();
    d.end_module().unwrap();

    let m2 = d.define_module(id("M"), none()).unwrap();
    assert_ne!(m1, m2);
    // the typedef from the first opening is visible in the second
    let ty = d.scoped_name_type(&["T"]).unwrap();
    assert!(matches!(ty, Type::ScopedName(_)));
    d.end_module().unwrap();
}

#[test]
fn constants_keep_their_folded_value() {
    let mut d = Delegator::new();
    let seven = d.parse_literal(&Token::Integer(7)).unwrap();
    let c = d.define_const(id("LIMIT"), Type::Short, seven, none()).unwrap();
    match d.ast().node(c).kind() {
        NodeKind::Const(def) => assert_eq!(def.value, Some(Value::Int(7))),
        other => panic!("unexpected kind {}", other.name()),
    }

    // constants feed back into later expressions
    let limit = d.scoped_name_expr(&["LIMIT"]).unwrap();
    let one = d.parse_literal(&Token::Integer(1)).unwrap();
    let sum = Expr::binary(d.ast(), OpKind::Add, limit, one).unwrap();
    assert_eq!(sum.value(), Some(&Value::Int(8)));
}

#[test]
fn literals_get_the_smallest_integer_type() {
    let d = Delegator::new();
    let cases = [
        (200, Type::Octet),
        (300, Type::Short),
        (70_000, Type::Long),
        (3_000_000_000, Type::LongLong),
        (10_000_000_000_000_000_000, Type::ULongLong),
        (-1, Type::Short),
    ];
    for (value, ty) in cases {
        let e = d.parse_literal(&Token::Integer(value)).unwrap();
        assert_eq!(e.ty(), Some(&ty), "{value}");
    }
    assert!(d.parse_literal(&Token::Integer(i128::MAX)).is_err());
}

#[test]
fn non_integer_literals() {
    let d = Delegator::new();
    let e = d.parse_literal(&Token::Float(2.5)).unwrap();
    assert_eq!(e.ty(), Some(&Type::Double));
    let e = d.parse_literal(&Token::Fixed("123.45".to_string())).unwrap();
    assert_eq!(e.ty(), Some(&Type::Fixed { digits: Some(5), scale: Some(2) }));
    let e = d.parse_literal(&Token::Keyword("TRUE")).unwrap();
    assert_eq!(e.value(), Some(&Value::Bool(true)));
    assert!(d.parse_literal(&Token::Punct(';')).is_err());
}

#[test]
fn positive_int_bounds() {
    let mut d = Delegator::new();
    let four = d.parse_literal(&Token::Integer(4)).unwrap();
    assert_eq!(d.parse_positive_int(&four).unwrap(), 4);

    let zero = d.parse_literal(&Token::Integer(0)).unwrap();
    assert!(d.parse_positive_int(&zero).is_err());

    let truth = d.parse_literal(&Token::Keyword("TRUE")).unwrap();
    assert!(d.parse_positive_int(&truth).is_err());

    // a named constant works as a bound
    let c = d.parse_literal(&Token::Integer(16)).unwrap();
    d.define_const(id("DEPTH"), Type::ULong, c, none()).unwrap();
    let depth = d.scoped_name_expr(&["DEPTH"]).unwrap();
    assert_eq!(d.parse_positive_int(&depth).unwrap(), 16);
}

#[test]
fn forward_structs_complete_in_place() {
    let mut d = Delegator::new();
    let fwd = d.declare_struct(id("Node"), none()).unwrap();
    let def = d.define_struct(id("Node"), None, none()).unwrap();
    assert_eq!(fwd, def);

    let seq = Type::sequence(Type::ScopedName(def), None).unwrap();
    d.member(id("children"), seq, none()).unwrap();
    d.end_struct().unwrap();

    match d.ast().node(def).kind() {
        NodeKind::Struct(s) => {
            assert!(s.defined);
            assert!(s.recursive);
        }
        other => panic!("unexpected kind {}", other.name()),
    }
}

#[test]
fn annotations_are_rejected_on_forward_declarations() {
    let mut d = Delegator::new();
    let anns = ann("id", AnnotationValue::Literal(Value::Int(3)));
    let err = d.declare_struct(id("S"), anns).unwrap_err();
    assert!(matches!(
        err,
        Error::Semantic(SemanticError::AnnotationsOnForward { .. })
    ));
}

#[test]
fn trailing_annotations_attach_to_the_last_definition() {
    let mut d = Delegator::new();
    let t = d.typedef(id("Key"), Type::Long, none()).unwrap();
    let mut trailing = Annotations::new();
    trailing.push(Annotation::new("key"));
    d.annotate_last(trailing);
    assert!(d.ast().node(t).annotations.first_by_id("key").is_some());
}

#[test]
fn enumerators_live_in_the_enclosing_scope() {
    let mut d = Delegator::new();
    d.define_module(id("M"), none()).unwrap();
    let color = d.define_enum(id("Color"), none()).unwrap();
    d.enumerator(color, id("RED"), none()).unwrap();
    d.enumerator(color, id("GREEN"), none()).unwrap();
    d.end_module().unwrap();

    let green = d.resolve_scoped_name(&["M", "GREEN"]).unwrap();
    match d.ast().node(green).kind() {
        NodeKind::Enumerator(def) => {
            assert_eq!(def.value, 1);
            assert_eq!(def.enum_node, color);
        }
        other => panic!("unexpected kind {}", other.name()),
    }
}

#[test]
fn unions_validate_their_labels_on_end() {
    let mut d = Delegator::new();
    let color = d.define_enum(id("Color"), none()).unwrap();
    for name in ["RED", "GREEN", "BLUE"] {
        d.enumerator(color, id(name), none()).unwrap();
    }

    d.define_union(id("U"), none()).unwrap();
    d.union_switchtype(Type::ScopedName(color), none()).unwrap();
    let red = d.scoped_name_expr(&["RED"]).unwrap();
    d.union_member(id("a"), Type::Long, vec![CaseLabel::Value(red)], none())
        .unwrap();
    let blue = d.scoped_name_expr(&["BLUE"]).unwrap();
    d.union_member(id("b"), Type::Short, vec![CaseLabel::Value(blue)], none())
        .unwrap();
    let u = d.end_union().unwrap();

    // first unclaimed discriminator value is GREEN
    assert_eq!(d.ast().union_default_value(u).unwrap(), Some(Value::Int(1)));
}

#[test]
fn duplicate_union_defaults_fail_at_end() {
    let mut d = Delegator::new();
    d.define_union(id("U"), none()).unwrap();
    d.union_switchtype(Type::Long, none()).unwrap();
    d.union_member(id("a"), Type::Long, vec![CaseLabel::Default], none())
        .unwrap();
    d.union_member(id("b"), Type::Short, vec![CaseLabel::Default], none())
        .unwrap();
    let err = d.end_union().unwrap_err();
    assert!(matches!(
        err,
        Error::Semantic(SemanticError::DuplicateDefault)
    ));
}

#[test]
fn inherited_operations_cannot_be_redefined() {
    let mut d = Delegator::new();
    let a = d
        .define_interface(id("A"), InterfaceAttrs::default(), vec![], none())
        .unwrap();
    d.define_operation(id("poll"), false, Type::Void, vec![], none())
        .unwrap();
    d.end_operation().unwrap();
    d.end_interface().unwrap();

    d.define_interface(
        id("B"),
        InterfaceAttrs::default(),
        vec![Type::ScopedName(a)],
        none(),
    )
    .unwrap();
    let err = d
        .define_operation(id("poll"), false, Type::Void, vec![], none())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Semantic(SemanticError::CannotOverride { .. })
    ));
}

#[test]
fn interfaces_must_be_complete_before_use_as_base() {
    let mut d = Delegator::new();
    let fwd = d
        .declare_interface(id("A"), InterfaceAttrs::default(), none())
        .unwrap();
    let err = d
        .define_interface(
            id("B"),
            InterfaceAttrs::default(),
            vec![Type::ScopedName(fwd)],
            none(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Semantic(SemanticError::UndefinedBase { .. })
    ));
}

#[test]
fn valuetypes_carry_state_and_initializers() {
    let mut d = Delegator::new();
    let vt = d
        .define_valuetype(id("Event"), Default::default(), vec![], vec![], none())
        .unwrap();
    d.state_member(id("stamp"), Type::ULongLong, true, none())
        .unwrap();
    d.initializer(id("create"), vec![], none()).unwrap();
    d.parameter(id("stamp"), ParamDirection::In, Type::ULongLong, none())
        .unwrap();
    d.end_operation().unwrap();
    d.end_valuetype().unwrap();

    match d.ast().node(vt).kind() {
        NodeKind::Valuetype(def) => assert!(def.defined),
        other => panic!("unexpected kind {}", other.name()),
    }
}

#[test]
fn native_declarations_are_typedefs() {
    let mut d = Delegator::new();
    let n = d.define_native(id("Handle"), none()).unwrap();
    match d.ast().node(n).kind() {
        NodeKind::Typedef(def) => assert_eq!(def.ty, Type::Native),
        other => panic!("unexpected kind {}", other.name()),
    }
}

#[test]
fn context_phrases_are_not_supported() {
    let d = Delegator::new();
    assert!(matches!(
        d.context_phrase(),
        Err(Error::Semantic(SemanticError::ContextNotSupported))
    ));
}

#[test]
fn bit_bound_annotations_apply() {
    let mut d = Delegator::new();
    let e = d
        .define_enum(id("Flags"), ann("bit_bound", AnnotationValue::Literal(Value::Int(16))))
        .unwrap();
    match d.ast().node(e).kind() {
        NodeKind::Enum(def) => assert_eq!(def.bitbound, 16),
        other => panic!("unexpected kind {}", other.name()),
    }

    let err = d
        .define_enum(id("Wide"), ann("bit_bound", AnnotationValue::Literal(Value::Int(64))))
        .unwrap_err();
    assert!(matches!(err, Error::Semantic(SemanticError::BitBound { .. })));
}

#[test]
fn bitmasks_number_their_bitvalues() {
    let mut d = Delegator::new();
    let bm = d
        .define_bitmask(id("Caps"), ann("bit_bound", AnnotationValue::Literal(Value::Int(8))))
        .unwrap();
    d.declare_bitvalue(id("READ"), none()).unwrap();
    d.declare_bitvalue(id("WRITE"), none()).unwrap();
    d.end_bitmask().unwrap();

    match d.ast().node(bm).kind() {
        NodeKind::BitMask(def) => {
            assert_eq!(def.bitvalues.len(), 2);
            assert_eq!(def.bitbound, Some(8));
        }
        other => panic!("unexpected kind {}", other.name()),
    }
    let write = d.resolve_scoped_name(&["Caps", "WRITE"]).unwrap();
    match d.ast().node(write).kind() {
        NodeKind::BitValue(def) => assert_eq!(def.position, 1),
        other => panic!("unexpected kind {}", other.name()),
    }
}

#[test]
fn bitsets_sum_their_field_widths() {
    let mut d = Delegator::new();
    let bs = d.define_bitset(id("Header"), None, none()).unwrap();
    d.declare_bitfield(Some(id("version")), 3, None, none()).unwrap();
    d.declare_bitfield(None, 1, None, none()).unwrap();
    d.declare_bitfield(Some(id("length")), 12, Some(Type::UShort), none())
        .unwrap();
    d.end_bitset().unwrap();

    assert_eq!(d.ast().bitset_bits(bs), 16);
}

#[test]
fn template_modules_instantiate_through_the_delegator() {
    let mut d = Delegator::new();
    let tmpl = d.define_template_module(id("Tmpl"), none()).unwrap();
    let t = d.template_param(id("T"), Type::Any, none()).unwrap();
    d.template_param(id("MAX"), Type::Const(Box::new(Type::ULong)), none())
        .unwrap();
    let seq = Type::sequence(
        Type::ScopedName(t),
        Some(Bound::Param(d.resolve_scoped_name(&["MAX"]).unwrap())),
    )
    .unwrap();
    d.typedef(id("Seq"), seq, none()).unwrap();
    d.end_template_module().unwrap();

    let four = Expr::literal(d.ast(), Type::ULong, Value::Int(4)).unwrap();
    d.instantiate_template_module(
        id("Inst"),
        tmpl,
        vec![Concrete::Type(Type::Long), Concrete::Expr(four)],
        none(),
    )
    .unwrap();

    let inst_seq = d.resolve_scoped_name(&["Inst", "Seq"]).unwrap();
    match d.ast().node(inst_seq).kind() {
        NodeKind::Typedef(def) => assert_eq!(
            def.ty,
            Type::Sequence { elem: Box::new(Type::Long), bound: Some(Bound::Value(4)) }
        ),
        other => panic!("unexpected kind {}", other.name()),
    }
}

#[test]
fn root_relative_names_skip_local_scopes() {
    let mut d = Delegator::new();
    d.typedef(id("T"), Type::Long, none()).unwrap();
    d.define_module(id("M"), none()).unwrap();
    d.typedef(id("T"), Type::Short, none()).unwrap();

    let local = d.resolve_scoped_name(&["T"]).unwrap();
    let global = d.resolve_scoped_name(&["", "T"]).unwrap();
    assert_ne!(local, global);
    match d.ast().node(global).kind() {
        NodeKind::Typedef(def) => assert_eq!(def.ty, Type::Long),
        other => panic!("unexpected kind {}", other.name()),
    }
    d.end_module().unwrap();
}

#[test]
fn scoped_names_must_denote_types_when_used_as_types() {
    let mut d = Delegator::new();
    let seven = d.parse_literal(&Token::Integer(7)).unwrap();
    d.define_const(id("LIMIT"), Type::Short, seven, none()).unwrap();
    let err = d.scoped_name_type(&["LIMIT"]).unwrap_err();
    assert!(matches!(
        err,
        Error::Semantic(SemanticError::InvalidReference { .. })
    ));
    assert!(matches!(
        d.resolve_scoped_name(&["NOWHERE"]),
        Err(Error::Semantic(SemanticError::UnknownName { .. }))
    ));
}

#[test]
fn includes_register_once_per_fullpath() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("defs.idl"), "// shared definitions\n").unwrap();
    fs::write(
        dir.path().join("main.idl"),
        indoc! {r#"
            #include "defs.idl"
            #include "defs.idl"
        "#},
    )
    .unwrap();

    let mut scanner = Scanner::from_file(dir.path().join("main.idl"), Delegator::new()).unwrap();
    drain(&mut scanner);
    let d = scanner.into_directives();

    // the second #include resolves to the node of the first
    let root = d.ast().root();
    let children = d.ast().node(root).children().to_vec();
    assert_eq!(children.len(), 1);
    match d.ast().node(children[0]).kind() {
        NodeKind::Include(def) => {
            assert!(def.defined);
            assert!(def.fullpath.ends_with("defs.idl"));
        }
        other => panic!("unexpected kind {}", other.name()),
    }

    let snapshot = d.post_parse();
    assert_eq!(snapshot.includes.len(), 1);
}

#[test]
fn pragmas_flow_into_the_ast() {
    let mut d = Delegator::new();
    d.define_module(id("M"), none()).unwrap();
    d.end_module().unwrap();

    let text = indoc! {r#"
        #pragma ID M "IDL:acme.org/M:1.3"
        #pragma version M 1.3
    "#};
    let mut scanner = Scanner::new("pragmas.idl", text, d);
    drain(&mut scanner);
    let mut d = scanner.into_directives();

    let m = d.resolve_scoped_name(&["M"]).unwrap();
    assert_eq!(d.ast().node(m).repo_id(), Some("IDL:acme.org/M:1.3"));
    assert_eq!(d.ast().node(m).repo_version(), Some("1.3"));
}

#[test]
fn custom_pragma_handlers_run_in_order() {
    let mut d = Delegator::new();
    d.add_pragma_handler(Box::new(|ast, scope, text, _pos| {
        let Some(tag) = text.strip_prefix("note ") else {
            return Ok(false);
        };
        ast.node_mut(scope).annotations.push(Annotation::new(tag.trim()));
        Ok(true)
    }));

    let mut scanner = Scanner::new("t.idl", "#pragma note reviewed\n", d);
    drain(&mut scanner);
    let d = scanner.into_directives();

    let root = d.ast().root();
    assert!(d.ast().node(root).annotations.first_by_id("reviewed").is_some());
}

#[test]
fn snapshots_restore_the_symbol_table() {
    let mut d = Delegator::new();
    d.define_module(id("M"), none()).unwrap();
    let seven = d.parse_literal(&Token::Integer(7)).unwrap();
    d.define_const(id("LIMIT"), Type::Short, seven, none()).unwrap();
    d.end_module().unwrap();

    let bytes = d.post_parse().to_bytes().unwrap();

    let mut d = Delegator::new();
    d.pre_parse(Some(Snapshot::from_bytes(&bytes).unwrap()));
    let limit = d.resolve_scoped_name(&["M", "LIMIT"]).unwrap();
    match d.ast().node(limit).kind() {
        NodeKind::Const(def) => assert_eq!(def.value, Some(Value::Int(7))),
        other => panic!("unexpected kind {}", other.name()),
    }
}
