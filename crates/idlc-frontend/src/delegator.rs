//! Semantic actions behind the grammar.
//!
//! The delegator owns the AST under construction and exposes one method
//! per declaration form. A parser calls these as it reduces
//! productions; the scanner reaches it through the [`Directives`]
//! implementation for includes and pragmas.

use indexmap::IndexMap;

use idlc_core::annotations::{Annotation, AnnotationValue, Annotations};
use idlc_core::ast::{
    Ast, CaseLabel, Concrete, NodeId, NodeKind, NodeSpec, ParamDirection, PortKind, SemanticError,
};
use idlc_core::bootstrap::Snapshot;
use idlc_core::expr::Expr;
use idlc_core::ident::Identifier;
use idlc_core::pos::Position;
use idlc_core::types::Type;
use idlc_core::value::Value;

use crate::diagnostics::ParseError;
use crate::scanner::{Directives, Token};
use crate::{Error, Result};

/// Attributes of an interface header.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceAttrs {
    pub is_abstract: bool,
    pub is_local: bool,
    pub is_pseudo: bool,
}

/// Attributes of a valuetype or eventtype header.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValuetypeAttrs {
    pub is_abstract: bool,
    pub is_custom: bool,
    pub is_truncatable: bool,
    pub event: bool,
}

type PragmaHandler = Box<dyn FnMut(&mut Ast, NodeId, &str, &Position) -> Result<bool>>;

pub struct Delegator {
    ast: Ast,
    scopes: Vec<NodeId>,
    includes: IndexMap<String, NodeId>,
    last: Option<NodeId>,
    pragma_handlers: Vec<PragmaHandler>,
    /// Marks includes as preprocessed so consumers of the snapshot skip
    /// them when walking.
    preprocessing: bool,
}

impl Default for Delegator {
    fn default() -> Self {
        Delegator::new()
    }
}

impl Delegator {
    pub fn new() -> Self {
        Delegator {
            ast: Ast::new(),
            scopes: Vec::new(),
            includes: IndexMap::new(),
            last: None,
            pragma_handlers: Vec::new(),
            preprocessing: false,
        }
    }

    /// A delegator for a preprocessing run whose output is meant to be
    /// picked up via [`Delegator::post_parse`].
    pub fn preprocessor() -> Self {
        Delegator { preprocessing: true, ..Delegator::new() }
    }

    /// Starts a parse, optionally on top of an earlier run's snapshot.
    pub fn pre_parse(&mut self, snapshot: Option<Snapshot>) {
        if let Some(s) = snapshot {
            self.ast = s.ast;
            self.includes = s.includes;
        }
        self.scopes.clear();
        self.last = None;
    }

    /// Finishes the parse, yielding the result for persistence.
    pub fn post_parse(self) -> Snapshot {
        Snapshot::new(self.ast, self.includes)
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn into_ast(self) -> Ast {
        self.ast
    }

    pub fn current_scope(&self) -> NodeId {
        self.scopes.last().copied().unwrap_or(self.ast.root())
    }

    pub fn add_pragma_handler(&mut self, handler: PragmaHandler) {
        self.pragma_handlers.push(handler);
    }

    /// Appends `//@` comment annotations to the last defined node.
    pub fn annotate_last(&mut self, annotations: Annotations) {
        if let Some(last) = self.last {
            self.ast.node_mut(last).annotations.concat(annotations);
        }
    }

    fn defined(&mut self, id: NodeId) -> NodeId {
        self.last = Some(id);
        id
    }

    fn enter_scope(&mut self, id: NodeId) {
        self.scopes.push(id);
    }

    fn leave_scope(&mut self) -> Result<NodeId> {
        self.scopes
            .pop()
            .ok_or_else(|| Error::Parse(ParseError::new("unbalanced end of scope")))
    }

    // --- modules ---

    pub fn define_module(&mut self, name: Identifier, annotations: Annotations) -> Result<NodeId> {
        let id = self
            .ast
            .define(self.current_scope(), Some(name), NodeSpec::Module, annotations)?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn end_module(&mut self) -> Result<NodeId> {
        self.leave_scope()
    }

    // --- interfaces ---

    pub fn declare_interface(
        &mut self,
        name: Identifier,
        attrs: InterfaceAttrs,
        annotations: Annotations,
    ) -> Result<NodeId> {
        if !annotations.is_empty() {
            return Err(SemanticError::AnnotationsOnForward {
                name: name.as_str().to_string(),
            }
            .into());
        }
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Interface {
                forward: true,
                is_abstract: attrs.is_abstract,
                is_local: attrs.is_local,
                is_pseudo: attrs.is_pseudo,
            },
            Annotations::new(),
        )?;
        Ok(self.defined(id))
    }

    pub fn define_interface(
        &mut self,
        name: Identifier,
        attrs: InterfaceAttrs,
        bases: Vec<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Interface {
                forward: false,
                is_abstract: attrs.is_abstract,
                is_local: attrs.is_local,
                is_pseudo: attrs.is_pseudo,
            },
            annotations,
        )?;
        self.ast.add_interface_bases(id, &bases)?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn end_interface(&mut self) -> Result<NodeId> {
        let id = self.leave_scope()?;
        self.ast.mark_defined(id);
        Ok(id)
    }

    // --- components, homes, ports ---

    pub fn declare_component(
        &mut self,
        name: Identifier,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Component { forward: true, base: None, interfaces: Vec::new() },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn define_component(
        &mut self,
        name: Identifier,
        base: Option<Type>,
        interfaces: Vec<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Component { forward: false, base, interfaces },
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn end_component(&mut self) -> Result<NodeId> {
        let id = self.leave_scope()?;
        self.ast.mark_defined(id);
        Ok(id)
    }

    pub fn define_connector(
        &mut self,
        name: Identifier,
        base: Option<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Connector { base },
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn end_connector(&mut self) -> Result<NodeId> {
        self.leave_scope()
    }

    pub fn define_home(
        &mut self,
        name: Identifier,
        base: Option<Type>,
        interfaces: Vec<Type>,
        component: Type,
        primary_key: Option<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Home { base, interfaces, component, primary_key },
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn end_home(&mut self) -> Result<NodeId> {
        self.leave_scope()
    }

    pub fn define_porttype(&mut self, name: Identifier, annotations: Annotations) -> Result<NodeId> {
        let id = self
            .ast
            .define(self.current_scope(), Some(name), NodeSpec::Porttype, annotations)?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn end_porttype(&mut self) -> Result<NodeId> {
        self.leave_scope()
    }

    pub fn define_port(
        &mut self,
        name: Identifier,
        kind: PortKind,
        ty: Type,
        multiple: bool,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Port { kind, ty, multiple },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    // --- valuetypes ---

    pub fn declare_valuetype(
        &mut self,
        name: Identifier,
        is_abstract: bool,
        event: bool,
        annotations: Annotations,
    ) -> Result<NodeId> {
        if !annotations.is_empty() {
            return Err(SemanticError::AnnotationsOnForward {
                name: name.as_str().to_string(),
            }
            .into());
        }
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Valuetype {
                forward: true,
                is_abstract,
                is_custom: false,
                is_truncatable: false,
                event,
            },
            Annotations::new(),
        )?;
        Ok(self.defined(id))
    }

    pub fn define_valuetype(
        &mut self,
        name: Identifier,
        attrs: ValuetypeAttrs,
        bases: Vec<Type>,
        interfaces: Vec<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Valuetype {
                forward: false,
                is_abstract: attrs.is_abstract,
                is_custom: attrs.is_custom,
                is_truncatable: attrs.is_truncatable,
                event: attrs.event,
            },
            annotations,
        )?;
        self.ast.add_valuetype_bases(id, &bases)?;
        self.ast.add_valuetype_interfaces(id, &interfaces)?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn end_valuetype(&mut self) -> Result<NodeId> {
        let id = self.leave_scope()?;
        self.ast.mark_defined(id);
        Ok(id)
    }

    pub fn define_valuebox(
        &mut self,
        name: Identifier,
        ty: Type,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Valuebox { ty },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn state_member(
        &mut self,
        name: Identifier,
        ty: Type,
        is_public: bool,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::StateMember { ty, is_public },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn initializer(
        &mut self,
        name: Identifier,
        raises: Vec<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Initializer { raises },
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn finder(
        &mut self,
        name: Identifier,
        raises: Vec<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Finder { raises },
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    // --- constants and types ---

    pub fn define_const(
        &mut self,
        name: Identifier,
        ty: Type,
        expr: Expr,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Const { ty, expr },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn typedef(&mut self, name: Identifier, ty: Type, annotations: Annotations) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Typedef { ty },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn define_native(&mut self, name: Identifier, annotations: Annotations) -> Result<NodeId> {
        self.typedef(name, Type::Native, annotations)
    }

    pub fn declare_struct(&mut self, name: Identifier, annotations: Annotations) -> Result<NodeId> {
        if !annotations.is_empty() {
            return Err(SemanticError::AnnotationsOnForward {
                name: name.as_str().to_string(),
            }
            .into());
        }
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Struct { forward: true, exception: false },
            Annotations::new(),
        )?;
        Ok(self.defined(id))
    }

    pub fn define_struct(
        &mut self,
        name: Identifier,
        base: Option<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Struct { forward: false, exception: false },
            annotations,
        )?;
        if let Some(base) = base {
            self.ast.set_struct_base(id, &base)?;
        }
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn end_struct(&mut self) -> Result<NodeId> {
        let id = self.leave_scope()?;
        self.ast.mark_defined(id);
        Ok(id)
    }

    pub fn define_exception(
        &mut self,
        name: Identifier,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Struct { forward: false, exception: true },
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn end_exception(&mut self) -> Result<NodeId> {
        let id = self.leave_scope()?;
        self.ast.mark_defined(id);
        Ok(id)
    }

    pub fn member(&mut self, name: Identifier, ty: Type, annotations: Annotations) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Member { ty },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    // --- unions ---

    pub fn declare_union(&mut self, name: Identifier, annotations: Annotations) -> Result<NodeId> {
        if !annotations.is_empty() {
            return Err(SemanticError::AnnotationsOnForward {
                name: name.as_str().to_string(),
            }
            .into());
        }
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Union { forward: true },
            Annotations::new(),
        )?;
        Ok(self.defined(id))
    }

    pub fn define_union(&mut self, name: Identifier, annotations: Annotations) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Union { forward: false },
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn union_switchtype(&mut self, ty: Type, annotations: Annotations) -> Result<()> {
        let union = self.current_scope();
        self.ast.set_union_switchtype(union, ty, annotations)?;
        Ok(())
    }

    pub fn union_member(
        &mut self,
        name: Identifier,
        ty: Type,
        labels: Vec<CaseLabel>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::UnionMember { ty, labels },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn end_union(&mut self) -> Result<NodeId> {
        let id = self.leave_scope()?;
        self.ast.validate_union(id)?;
        self.ast.mark_defined(id);
        Ok(id)
    }

    // --- enums, bitmasks, bitsets ---

    pub fn define_enum(&mut self, name: Identifier, annotations: Annotations) -> Result<NodeId> {
        let id = self
            .ast
            .define(self.current_scope(), Some(name), NodeSpec::Enum, annotations)?;
        self.apply_bit_bound(id)?;
        Ok(self.defined(id))
    }

    /// Enumerators live in the enum's enclosing scope.
    pub fn enumerator(
        &mut self,
        enum_node: NodeId,
        name: Identifier,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let value = self.ast.enumerator_count(enum_node) as u32;
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Enumerator { enum_node, value },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn define_bitmask(&mut self, name: Identifier, annotations: Annotations) -> Result<NodeId> {
        let id = self
            .ast
            .define(self.current_scope(), Some(name), NodeSpec::BitMask, annotations)?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn declare_bitvalue(&mut self, name: Identifier, annotations: Annotations) -> Result<NodeId> {
        let bitmask = self.current_scope();
        let position = match self.ast.node(bitmask).kind() {
            NodeKind::BitMask(def) => def.bitvalues.len() as u16,
            _ => 0,
        };
        let position = annotations
            .first_by_id("position")
            .and_then(Annotation::value)
            .and_then(AnnotationValue::as_int)
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(position);
        let id = self.ast.define(
            bitmask,
            Some(name),
            NodeSpec::BitValue { position },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn end_bitmask(&mut self) -> Result<NodeId> {
        let id = self.leave_scope()?;
        self.apply_bit_bound(id)?;
        Ok(id)
    }

    pub fn define_bitset(
        &mut self,
        name: Identifier,
        base: Option<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::BitSet { base },
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn declare_bitfield(
        &mut self,
        name: Option<Identifier>,
        bits: u16,
        ty: Option<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            name,
            NodeSpec::BitField { bits, ty },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn end_bitset(&mut self) -> Result<NodeId> {
        self.leave_scope()
    }

    fn apply_bit_bound(&mut self, id: NodeId) -> Result<()> {
        let bits = self
            .ast
            .node(id)
            .annotations
            .first_by_id("bit_bound")
            .and_then(Annotation::value)
            .and_then(AnnotationValue::as_int);
        if let Some(bits) = bits {
            let bits = u16::try_from(bits).unwrap_or(u16::MAX);
            match self.ast.node(id).kind() {
                NodeKind::Enum(_) => self.ast.set_enum_bitbound(id, bits)?,
                NodeKind::BitMask(_) => self.ast.set_bitmask_bitbound(id, bits)?,
                _ => {}
            }
        }
        Ok(())
    }

    // --- operations and attributes ---

    pub fn define_operation(
        &mut self,
        name: Identifier,
        oneway: bool,
        ret: Type,
        raises: Vec<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Operation { oneway, ret, raises },
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn parameter(
        &mut self,
        name: Identifier,
        direction: ParamDirection,
        ty: Type,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Parameter { direction, ty },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    /// Closes an operation, initializer or finder scope.
    pub fn end_operation(&mut self) -> Result<NodeId> {
        self.leave_scope()
    }

    /// `context` phrases are accepted by the grammar but not supported.
    pub fn context_phrase(&self) -> Result<()> {
        Err(SemanticError::ContextNotSupported.into())
    }

    pub fn attribute(
        &mut self,
        name: Identifier,
        ty: Type,
        readonly: bool,
        get_raises: Vec<Type>,
        set_raises: Vec<Type>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::Attribute { ty, readonly, get_raises, set_raises },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    // --- template modules ---

    pub fn define_template_module(
        &mut self,
        name: Identifier,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::TemplateModule,
            annotations,
        )?;
        self.enter_scope(id);
        Ok(self.defined(id))
    }

    pub fn template_param(
        &mut self,
        name: Identifier,
        ty: Type,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::TemplateParam { ty },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    pub fn end_template_module(&mut self) -> Result<NodeId> {
        self.leave_scope()
    }

    pub fn instantiate_template_module(
        &mut self,
        name: Identifier,
        template: NodeId,
        args: Vec<Concrete>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let scope = self.current_scope();
        let id = self
            .ast
            .instantiate_template_module(scope, name, template, args, annotations)?;
        Ok(self.defined(id))
    }

    pub fn template_module_reference(
        &mut self,
        name: Identifier,
        template: NodeId,
        params: Vec<NodeId>,
        annotations: Annotations,
    ) -> Result<NodeId> {
        let id = self.ast.define(
            self.current_scope(),
            Some(name),
            NodeSpec::TemplateModuleReference { template, params },
            annotations,
        )?;
        Ok(self.defined(id))
    }

    // --- name resolution and literals ---

    /// Resolves `A::B::C` from the current scope; a leading empty part
    /// makes the lookup root-relative.
    pub fn resolve_scoped_name(&mut self, parts: &[&str]) -> Result<NodeId> {
        let full = parts.join("::");
        let (root_relative, parts) = match parts {
            ["", rest @ ..] => (true, rest),
            parts => (false, parts),
        };
        let (first, rest) = parts
            .split_first()
            .ok_or_else(|| SemanticError::InvalidReference { name: full.clone() })?;
        let first = Identifier::from(*first);
        let found = if root_relative {
            let root = self.ast.root();
            self.ast.search_self(root, &first)?
        } else {
            self.ast.resolve(self.current_scope(), &first)?
        };
        let mut node = found.ok_or_else(|| SemanticError::UnknownName { name: full.clone() })?;
        for part in rest {
            node = self
                .ast
                .search_self(node, &Identifier::from(*part))?
                .ok_or_else(|| SemanticError::UnknownName { name: full.clone() })?;
        }
        Ok(node)
    }

    /// A scoped name used where a type is expected.
    pub fn scoped_name_type(&mut self, parts: &[&str]) -> Result<Type> {
        let node = self.resolve_scoped_name(parts)?;
        if self.ast.node_type(node).is_none() {
            return Err(SemanticError::InvalidReference {
                name: self.ast.scoped_name(node),
            }
            .into());
        }
        Ok(Type::ScopedName(node))
    }

    /// A scoped name used where a constant is expected.
    pub fn scoped_name_expr(&mut self, parts: &[&str]) -> Result<Expr> {
        let node = self.resolve_scoped_name(parts)?;
        let expr = match self.ast.node(node).kind() {
            NodeKind::Enumerator(_) => Expr::enumerator(&self.ast, node)?,
            _ => Expr::scoped_name(&self.ast, node)?,
        };
        Ok(expr)
    }

    /// Types a literal token: integers get the smallest fitting integer
    /// type, floats default to double.
    pub fn parse_literal(&self, token: &Token) -> Result<Expr> {
        let (ty, value) = match token {
            Token::Integer(v) => {
                let ty = [Type::Octet, Type::Short, Type::Long, Type::LongLong, Type::ULongLong]
                    .into_iter()
                    .find(|t| {
                        t.integer_range()
                            .is_some_and(|(lo, hi)| *v >= lo && *v <= hi)
                    })
                    .ok_or_else(|| SemanticError::InvalidLiteral { literal: v.to_string() })?;
                (ty, Value::Int(*v))
            }
            Token::Float(v) => (Type::Double, Value::Float(*v)),
            Token::Fixed(digits) => (fixed_literal_type(digits)?, Value::Fixed(digits.clone())),
            Token::Char(c) => (Type::Char, Value::Char(*c)),
            Token::WChar(c) => (Type::WChar, Value::WChar(*c)),
            Token::Str(s) => (Type::String { bound: None }, Value::Str(s.clone())),
            Token::WStr(s) => (Type::WString { bound: None }, Value::WStr(s.clone())),
            Token::Keyword("TRUE") => (Type::Boolean, Value::Bool(true)),
            Token::Keyword("FALSE") => (Type::Boolean, Value::Bool(false)),
            other => {
                return Err(SemanticError::InvalidLiteral { literal: other.to_string() }.into());
            }
        };
        Ok(Expr::literal(&self.ast, ty, value)?)
    }

    /// A constant expression used as a bound or array size.
    pub fn parse_positive_int(&self, expr: &Expr) -> Result<u64> {
        let value = expr
            .value()
            .and_then(Value::as_int)
            .ok_or_else(|| SemanticError::InvalidLiteral {
                literal: "<non-constant bound>".to_string(),
            })?;
        u64::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                SemanticError::InvalidLiteral { literal: value.to_string() }.into()
            })
    }
}

/// Fixed literal digits give the type its digit and scale counts.
fn fixed_literal_type(digits: &str) -> Result<Type> {
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let int_digits = int_part.trim_start_matches('0').len();
    let total = (int_digits + frac_part.len()).max(1) as u16;
    let scale = frac_part.len() as u16;
    Ok(Type::fixed(Some(total), Some(scale))?)
}

impl Directives for Delegator {
    fn enter_include(&mut self, filename: &str, fullpath: &str) -> std::result::Result<bool, Error> {
        if self.includes.contains_key(fullpath) {
            return Ok(false);
        }
        let id = self.ast.define(
            self.current_scope(),
            Some(Identifier::from(filename)),
            NodeSpec::Include {
                filename: filename.to_string(),
                fullpath: fullpath.to_string(),
                defined: true,
                preprocessed: self.preprocessing,
            },
            Annotations::new(),
        )?;
        self.includes.insert(fullpath.to_string(), id);
        self.enter_scope(id);
        Ok(true)
    }

    fn leave_include(&mut self) -> std::result::Result<(), Error> {
        self.leave_scope()?;
        Ok(())
    }

    fn declare_include(&mut self, filename: &str, fullpath: &str) -> std::result::Result<(), Error> {
        self.ast.define(
            self.current_scope(),
            Some(Identifier::from(filename)),
            NodeSpec::Include {
                filename: filename.to_string(),
                fullpath: fullpath.to_string(),
                defined: false,
                preprocessed: self.preprocessing,
            },
            Annotations::new(),
        )?;
        Ok(())
    }

    fn pragma_id(&mut self, name: &str, id: &str, _pos: &Position) -> std::result::Result<(), Error> {
        let parts: Vec<&str> = name.split("::").collect();
        let node = self.resolve_scoped_name(&parts)?;
        self.ast.set_repo_id(node, id)?;
        Ok(())
    }

    fn pragma_version(
        &mut self,
        name: &str,
        version: &str,
        _pos: &Position,
    ) -> std::result::Result<(), Error> {
        let parts: Vec<&str> = name.split("::").collect();
        let node = self.resolve_scoped_name(&parts)?;
        self.ast.set_repo_version(node, version)?;
        Ok(())
    }

    fn pragma_prefix(&mut self, prefix: &str, _pos: &Position) -> std::result::Result<(), Error> {
        let scope = self.current_scope();
        self.ast.set_prefix(scope, Some(prefix))?;
        Ok(())
    }

    fn handle_pragma(&mut self, text: &str, pos: &Position) -> std::result::Result<bool, Error> {
        let scope = self.current_scope();
        for handler in &mut self.pragma_handlers {
            if handler(&mut self.ast, scope, text, pos)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
