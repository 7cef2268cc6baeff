use crate::annotations::Annotations;
use crate::ast::{Ast, NodeId, NodeSpec, SemanticError};
use crate::ident::Identifier;
use crate::types::Type;

fn ident(s: &str) -> Identifier {
    s.into()
}

fn none() -> Annotations {
    Annotations::new()
}

fn interface(ast: &mut Ast, scope: NodeId, name: &str) -> NodeId {
    let id = ast
        .define(
            scope,
            Some(ident(name)),
            NodeSpec::Interface {
                forward: false,
                is_abstract: false,
                is_local: false,
                is_pseudo: false,
            },
            none(),
        )
        .unwrap();
    ast.mark_defined(id);
    id
}

fn operation(ast: &mut Ast, scope: NodeId, name: &str) -> NodeId {
    ast.define(
        scope,
        Some(ident(name)),
        NodeSpec::Operation { oneway: false, ret: Type::Void, raises: vec![] },
        none(),
    )
    .unwrap()
}

#[test]
fn bases_must_be_defined_interfaces() {
    let mut ast = Ast::new();
    let root = ast.root();
    let fwd = ast
        .define(
            root,
            Some(ident("Fwd")),
            NodeSpec::Interface {
                forward: true,
                is_abstract: false,
                is_local: false,
                is_pseudo: false,
            },
            none(),
        )
        .unwrap();
    let derived = interface(&mut ast, root, "Derived");
    let err = ast
        .add_interface_bases(derived, &[Type::Interface(fwd)])
        .unwrap_err();
    assert!(matches!(err, SemanticError::UndefinedBase { .. }));

    let e = ast.define(root, Some(ident("E")), NodeSpec::Enum, none()).unwrap();
    let err = ast.add_interface_bases(derived, &[Type::Enum(e)]).unwrap_err();
    assert!(matches!(err, SemanticError::InvalidBase { .. }));
}

#[test]
fn circular_inheritance_is_detected() {
    let mut ast = Ast::new();
    let root = ast.root();
    let a = interface(&mut ast, root, "A");
    let b = interface(&mut ast, root, "B");
    ast.add_interface_bases(b, &[Type::Interface(a)]).unwrap();
    let err = ast.add_interface_bases(a, &[Type::Interface(b)]).unwrap_err();
    assert!(matches!(err, SemanticError::CircularInheritance { .. }));
    let err = ast.add_interface_bases(a, &[Type::Interface(a)]).unwrap_err();
    assert!(matches!(err, SemanticError::CircularInheritance { .. }));
}

#[test]
fn duplicated_inherited_operations_are_rejected() {
    let mut ast = Ast::new();
    let root = ast.root();
    let a = interface(&mut ast, root, "A");
    operation(&mut ast, a, "poll");
    let b = interface(&mut ast, root, "B");
    operation(&mut ast, b, "poll");
    let c = interface(&mut ast, root, "C");
    ast.add_interface_bases(c, &[Type::Interface(a)]).unwrap();
    let err = ast.add_interface_bases(c, &[Type::Interface(b)]).unwrap_err();
    assert!(matches!(err, SemanticError::DuplicateInherited { .. }));
}

#[test]
fn diamond_inheritance_of_one_operation_is_fine() {
    let mut ast = Ast::new();
    let root = ast.root();
    let base = interface(&mut ast, root, "Base");
    operation(&mut ast, base, "poll");
    let left = interface(&mut ast, root, "Left");
    ast.add_interface_bases(left, &[Type::Interface(base)]).unwrap();
    let right = interface(&mut ast, root, "Right");
    ast.add_interface_bases(right, &[Type::Interface(base)]).unwrap();
    let bottom = interface(&mut ast, root, "Bottom");
    ast.add_interface_bases(bottom, &[Type::Interface(left), Type::Interface(right)])
        .unwrap();
    assert!(ast.has_ancestor(bottom, base));
}

#[test]
fn unrelated_inherited_names_are_ambiguous() {
    let mut ast = Ast::new();
    let root = ast.root();
    let a = interface(&mut ast, root, "A");
    ast.define(a, Some(ident("Mode")), NodeSpec::Enum, none()).unwrap();
    let b = interface(&mut ast, root, "B");
    ast.define(b, Some(ident("Mode")), NodeSpec::Enum, none()).unwrap();
    let c = interface(&mut ast, root, "C");
    ast.add_interface_bases(c, &[Type::Interface(a), Type::Interface(b)])
        .unwrap();
    let err = ast.search_self(c, &ident("Mode")).unwrap_err();
    assert!(matches!(err, SemanticError::AmbiguousName { .. }));
}

#[test]
fn inherited_operations_cannot_be_overridden() {
    let mut ast = Ast::new();
    let root = ast.root();
    let a = interface(&mut ast, root, "A");
    operation(&mut ast, a, "poll");
    let b = interface(&mut ast, root, "B");
    ast.add_interface_bases(b, &[Type::Interface(a)]).unwrap();
    let err = ast
        .define(
            b,
            Some(ident("poll")),
            NodeSpec::Operation { oneway: false, ret: Type::Void, raises: vec![] },
            none(),
        )
        .unwrap_err();
    assert!(matches!(err, SemanticError::CannotOverride { .. }));
}

#[test]
fn local_interfaces_cannot_be_inherited_by_unrestricted_ones() {
    let mut ast = Ast::new();
    let root = ast.root();
    let l = ast
        .define(
            root,
            Some(ident("L")),
            NodeSpec::Interface {
                forward: false,
                is_abstract: false,
                is_local: true,
                is_pseudo: false,
            },
            none(),
        )
        .unwrap();
    ast.mark_defined(l);
    let n = interface(&mut ast, root, "N");
    let err = ast.add_interface_bases(n, &[Type::Interface(l)]).unwrap_err();
    assert!(matches!(err, SemanticError::InvalidBase { .. }));
}

#[test]
fn abstract_interfaces_only_inherit_abstract_ones() {
    let mut ast = Ast::new();
    let root = ast.root();
    let concrete = interface(&mut ast, root, "Concrete");
    let a = ast
        .define(
            root,
            Some(ident("A")),
            NodeSpec::Interface {
                forward: false,
                is_abstract: true,
                is_local: false,
                is_pseudo: false,
            },
            none(),
        )
        .unwrap();
    ast.mark_defined(a);
    let err = ast
        .add_interface_bases(a, &[Type::Interface(concrete)])
        .unwrap_err();
    assert!(matches!(err, SemanticError::InvalidBase { .. }));
}

fn valuetype(ast: &mut Ast, scope: NodeId, name: &str, is_abstract: bool) -> NodeId {
    let id = ast
        .define(
            scope,
            Some(ident(name)),
            NodeSpec::Valuetype {
                forward: false,
                is_abstract,
                is_custom: false,
                is_truncatable: false,
                event: false,
            },
            none(),
        )
        .unwrap();
    ast.mark_defined(id);
    id
}

#[test]
fn concrete_valuetype_base_must_come_first() {
    let mut ast = Ast::new();
    let root = ast.root();
    let abs = valuetype(&mut ast, root, "Abs", true);
    let concrete = valuetype(&mut ast, root, "Base", false);
    let v = valuetype(&mut ast, root, "V", false);
    let err = ast
        .add_valuetype_bases(v, &[Type::Valuetype(abs), Type::Valuetype(concrete)])
        .unwrap_err();
    assert!(matches!(err, SemanticError::InvalidBase { .. }));
    let w = valuetype(&mut ast, root, "W", false);
    ast.add_valuetype_bases(w, &[Type::Valuetype(concrete), Type::Valuetype(abs)])
        .unwrap();
}

#[test]
fn struct_base_must_be_a_defined_struct() {
    let mut ast = Ast::new();
    let root = ast.root();
    let fwd = ast
        .define(root, Some(ident("B")), NodeSpec::Struct { forward: true, exception: false }, none())
        .unwrap();
    let s = ast
        .define(root, Some(ident("S")), NodeSpec::Struct { forward: false, exception: false }, none())
        .unwrap();
    assert!(matches!(
        ast.set_struct_base(s, &Type::Struct(fwd)),
        Err(SemanticError::UndefinedBase { .. })
    ));
    ast.mark_defined(fwd);
    ast.set_struct_base(s, &Type::Struct(fwd)).unwrap();
}

#[test]
fn components_support_interfaces_without_duplicates() {
    let mut ast = Ast::new();
    let root = ast.root();
    let i = interface(&mut ast, root, "Control");
    let comp = ast
        .define(
            root,
            Some(ident("Device")),
            NodeSpec::Component { forward: false, base: None, interfaces: vec![Type::Interface(i)] },
            none(),
        )
        .unwrap();
    ast.mark_defined(comp);
    let err = ast
        .add_supported_interfaces(comp, &[Type::Interface(i)])
        .unwrap_err();
    assert!(matches!(err, SemanticError::DuplicateBase { .. }));
}
