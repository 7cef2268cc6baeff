//! The IDL type algebra.
//!
//! `Type` is a closed sum covering the primitive types, the constructed
//! anonymous types (bounded strings, sequences, arrays) and references to
//! named definitions in the AST arena. Named references carry a [`NodeId`];
//! every operation that needs to look through them takes the [`Ast`].

use serde::{Deserialize, Serialize};

use crate::ast::{Ast, Concrete, InstantiationContext, NodeId, NodeKind, SemanticError};
use crate::expr::ExprError;
use crate::value::Value;

/// A string/sequence bound or array dimension.
///
/// Inside a template module a bound may refer to a `const` template
/// parameter; instantiation replaces it with the concrete value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bound {
    Value(u64),
    Param(NodeId),
}

impl Bound {
    pub fn value(&self) -> Option<u64> {
        match self {
            Bound::Value(v) => Some(*v),
            Bound::Param(_) => None,
        }
    }

    pub fn is_param(&self) -> bool {
        matches!(self, Bound::Param(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Void,

    // integer family
    Octet,
    UInt8,
    Int8,
    UShort,
    Short,
    ULong,
    Long,
    ULongLong,
    LongLong,

    Boolean,
    Char,
    WChar,
    Float,
    Double,
    LongDouble,
    Fixed { digits: Option<u16>, scale: Option<u16> },

    String { bound: Option<Bound> },
    WString { bound: Option<Bound> },
    Sequence { elem: Box<Type>, bound: Option<Bound> },
    Array { elem: Box<Type>, sizes: Vec<Bound> },

    Any,
    Object,
    ValueBase,
    Native,

    // named definitions
    Interface(NodeId),
    Home(NodeId),
    Component(NodeId),
    Porttype(NodeId),
    TemplateModule(NodeId),
    Valuebox(NodeId),
    Valuetype(NodeId),
    Eventtype(NodeId),
    Struct(NodeId),
    Exception(NodeId),
    Union(NodeId),
    Enum(NodeId),
    BitMask(NodeId),
    BitSet(NodeId),

    /// Reference through a scoped name (typedef-transparent).
    ScopedName(NodeId),
    /// `const <type>`, only used for template parameters.
    Const(Box<Type>),
}

impl Type {
    /// Builds a sequence type, rejecting anonymous element types.
    pub fn sequence(elem: Type, bound: Option<Bound>) -> Result<Type, SemanticError> {
        if elem.is_anonymous() {
            return Err(SemanticError::AnonymousType { context: "sequence element".into() });
        }
        Ok(Type::Sequence { elem: Box::new(elem), bound })
    }

    /// Builds an array type, rejecting anonymous element types.
    pub fn array(elem: Type, sizes: Vec<Bound>) -> Result<Type, SemanticError> {
        if elem.is_anonymous() {
            return Err(SemanticError::AnonymousType { context: "array element".into() });
        }
        Ok(Type::Array { elem: Box::new(elem), sizes })
    }

    pub fn fixed(digits: Option<u16>, scale: Option<u16>) -> Result<Type, SemanticError> {
        if let Some(d) = digits {
            if d > 31 {
                return Err(SemanticError::InvalidFixedDigits { digits: d });
            }
        }
        Ok(Type::Fixed { digits, scale })
    }

    /// Inclusive value range of an integer type.
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        match self {
            Type::Octet | Type::UInt8 => Some((0, 0xFF)),
            Type::Int8 => Some((-0x80, 0x7F)),
            Type::UShort => Some((0, 0xFFFF)),
            Type::Short => Some((-0x8000, 0x7FFF)),
            Type::ULong => Some((0, 0xFFFF_FFFF)),
            Type::Long => Some((-0x8000_0000, 0x7FFF_FFFF)),
            Type::ULongLong => Some((0, u64::MAX as i128)),
            Type::LongLong => Some((i64::MIN as i128, i64::MAX as i128)),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.integer_range().is_some()
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self.integer_range(), Some((lo, _)) if lo == 0)
    }

    pub fn bits(&self) -> Option<u16> {
        match self {
            Type::Octet | Type::UInt8 | Type::Int8 => Some(8),
            Type::UShort | Type::Short => Some(16),
            Type::ULong | Type::Long => Some(32),
            Type::ULongLong | Type::LongLong => Some(64),
            _ => None,
        }
    }

    /// Smallest unsigned integer type holding `bits` bits (bitmask/bitset
    /// underlying type selection).
    pub fn unsigned_for_bits(bits: u16) -> Option<Type> {
        match bits {
            1..=8 => Some(Type::UInt8),
            9..=16 => Some(Type::UShort),
            17..=32 => Some(Type::ULong),
            33..=64 => Some(Type::ULongLong),
            _ => None,
        }
    }

    /// Default bitfield type for a field of `bits` bits.
    pub fn bitfield_for_bits(bits: u16) -> Option<Type> {
        match bits {
            1 => Some(Type::Boolean),
            2..=8 => Some(Type::Int8),
            9..=16 => Some(Type::Short),
            17..=32 => Some(Type::Long),
            33..=64 => Some(Type::LongLong),
            _ => None,
        }
    }

    /// Static name of the type shape, without looking at the arena.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::Octet => "octet",
            Type::UInt8 => "uint8",
            Type::Int8 => "int8",
            Type::UShort => "unsigned short",
            Type::Short => "short",
            Type::ULong => "unsigned long",
            Type::Long => "long",
            Type::ULongLong => "unsigned long long",
            Type::LongLong => "long long",
            Type::Boolean => "boolean",
            Type::Char => "char",
            Type::WChar => "wchar",
            Type::Float => "float",
            Type::Double => "double",
            Type::LongDouble => "long double",
            Type::Fixed { .. } => "fixed",
            Type::String { .. } => "string",
            Type::WString { .. } => "wstring",
            Type::Sequence { .. } => "sequence",
            Type::Array { .. } => "array",
            Type::Any => "any",
            Type::Object => "Object",
            Type::ValueBase => "ValueBase",
            Type::Native => "native",
            Type::Interface(_) => "interface",
            Type::Home(_) => "home",
            Type::Component(_) => "component",
            Type::Porttype(_) => "porttype",
            Type::TemplateModule(_) => "template module",
            Type::Valuebox(_) => "valuebox",
            Type::Valuetype(_) => "valuetype",
            Type::Eventtype(_) => "eventtype",
            Type::Struct(_) => "struct",
            Type::Exception(_) => "exception",
            Type::Union(_) => "union",
            Type::Enum(_) => "enum",
            Type::BitMask(_) => "bitmask",
            Type::BitSet(_) => "bitset",
            Type::ScopedName(_) => "scoped name",
            Type::Const(_) => "const",
        }
    }

    /// Readable name including referenced definition names.
    pub fn typename(&self, ast: &Ast) -> String {
        match self {
            Type::ScopedName(n) => ast.scoped_name(*n),
            Type::Interface(n)
            | Type::Home(n)
            | Type::Component(n)
            | Type::Porttype(n)
            | Type::TemplateModule(n)
            | Type::Valuebox(n)
            | Type::Valuetype(n)
            | Type::Eventtype(n)
            | Type::Struct(n)
            | Type::Exception(n)
            | Type::Union(n)
            | Type::Enum(n)
            | Type::BitMask(n)
            | Type::BitSet(n) => format!("{} {}", self.kind_name(), ast.scoped_name(*n)),
            Type::Sequence { elem, bound } => match bound {
                Some(Bound::Value(v)) => format!("sequence<{}, {v}>", elem.typename(ast)),
                Some(Bound::Param(p)) => {
                    format!("sequence<{}, {}>", elem.typename(ast), ast.scoped_name(*p))
                }
                None => format!("sequence<{}>", elem.typename(ast)),
            },
            Type::Array { elem, sizes } => {
                let mut s = elem.typename(ast);
                for sz in sizes {
                    match sz {
                        Bound::Value(v) => s.push_str(&format!("[{v}]")),
                        Bound::Param(p) => s.push_str(&format!("[{}]", ast.scoped_name(*p))),
                    }
                }
                s
            }
            Type::Const(inner) => format!("const {}", inner.typename(ast)),
            _ => self.kind_name().to_string(),
        }
    }

    /// Resolves typedef and scoped-name indirections to the underlying type.
    pub fn resolved(&self, ast: &Ast) -> Type {
        match self {
            Type::ScopedName(n) => match ast.node_type(*n) {
                Some(t) => t.resolved(ast),
                None => self.clone(),
            },
            _ => self.clone(),
        }
    }

    /// The referenced definition, looking through typedef chains but not
    /// through full resolution.
    pub fn resolved_node(&self, ast: &Ast) -> Option<NodeId> {
        match self {
            Type::ScopedName(n) => {
                if let NodeKind::Typedef(def) = ast.node(*n).kind() {
                    def.ty.resolved_node(ast)
                } else {
                    Some(*n)
                }
            }
            Type::Interface(n)
            | Type::Home(n)
            | Type::Component(n)
            | Type::Porttype(n)
            | Type::TemplateModule(n)
            | Type::Valuebox(n)
            | Type::Valuetype(n)
            | Type::Eventtype(n)
            | Type::Struct(n)
            | Type::Exception(n)
            | Type::Union(n)
            | Type::Enum(n)
            | Type::BitMask(n)
            | Type::BitSet(n) => Some(*n),
            Type::Const(inner) => inner.resolved_node(ast),
            _ => None,
        }
    }

    /// Whether the (typedef-transparently) referenced node satisfies `pred`.
    pub fn is_node(&self, ast: &Ast, pred: impl Fn(&NodeKind) -> bool) -> bool {
        match self.resolved_node(ast) {
            Some(id) => pred(ast.node(id).kind()),
            None => false,
        }
    }

    /// Whether this is a scoped-name reference to a template parameter.
    pub fn is_template_param(&self, ast: &Ast) -> bool {
        matches!(self, Type::ScopedName(n)
            if matches!(ast.node(*n).kind(), NodeKind::TemplateParam(_)))
    }

    pub fn is_complete(&self, ast: &Ast) -> bool {
        match self {
            Type::ScopedName(_) => self.resolved(ast).is_complete(ast),
            Type::Sequence { elem, .. } | Type::Array { elem, .. } => {
                elem.resolved(ast).is_complete(ast)
            }
            Type::Struct(n) | Type::Exception(n) | Type::Union(n) => ast.is_defined(*n),
            Type::Valuetype(n) | Type::Eventtype(n) => ast.is_defined(*n),
            Type::Const(inner) => inner.resolved(ast).is_complete(ast),
            _ => true,
        }
    }

    pub fn is_local(&self, ast: &Ast) -> bool {
        self.is_local_guarded(ast, &mut Vec::new())
    }

    pub(crate) fn is_local_guarded(&self, ast: &Ast, recurstk: &mut Vec<NodeId>) -> bool {
        match self {
            Type::ScopedName(_) => self.resolved(ast).is_local_guarded(ast, recurstk),
            Type::Sequence { elem, .. } | Type::Array { elem, .. } => {
                elem.resolved(ast).is_local_guarded(ast, recurstk)
            }
            Type::Interface(n) => ast.interface_is_local(*n),
            Type::Valuebox(n) | Type::Valuetype(n) | Type::Eventtype(n) => {
                ast.members_are_local(*n, recurstk)
            }
            Type::Struct(n) | Type::Exception(n) | Type::Union(n) => {
                ast.members_are_local(*n, recurstk)
            }
            Type::Const(inner) => inner.resolved(ast).is_local_guarded(ast, recurstk),
            _ => false,
        }
    }

    /// Bounded strings, sequences and arrays are anonymous type definitions.
    pub fn is_anonymous(&self) -> bool {
        match self {
            Type::String { bound } | Type::WString { bound } => bound.is_some(),
            Type::Sequence { .. } | Type::Array { .. } => true,
            Type::Const(inner) => inner.is_anonymous(),
            _ => false,
        }
    }

    /// Whether the type depends on template parameters.
    pub fn is_template(&self, ast: &Ast) -> bool {
        match self {
            Type::ScopedName(n) => ast.is_template_node(*n),
            Type::String { bound } | Type::WString { bound } => {
                bound.as_ref().is_some_and(Bound::is_param)
            }
            Type::Sequence { elem, bound } => {
                bound.as_ref().is_some_and(Bound::is_param) || elem.is_template(ast)
            }
            Type::Array { elem, sizes } => {
                sizes.iter().any(Bound::is_param) || elem.is_template(ast)
            }
            Type::Const(inner) => inner.is_template(ast),
            _ => false,
        }
    }

    /// Structural match used for template argument validation.
    pub fn matches(&self, ast: &Ast, other: &Type) -> bool {
        match (self, other) {
            (Type::String { bound: a }, Type::String { bound: b })
            | (Type::WString { bound: a }, Type::WString { bound: b }) => a == b,
            (
                Type::Sequence { elem: a, bound: ba },
                Type::Sequence { elem: b, bound: bb },
            ) => ba == bb && a.resolved(ast).matches(ast, &b.resolved(ast)),
            (Type::Array { elem: a, sizes: sa }, Type::Array { elem: b, sizes: sb }) => {
                sa == sb && a.resolved(ast).matches(ast, &b.resolved(ast))
            }
            (Type::Const(a), Type::Const(b)) => {
                a.resolved(ast).matches(ast, &b.resolved(ast))
            }
            _ => {
                if std::mem::discriminant(self) != std::mem::discriminant(other) {
                    return false;
                }
                match (self.resolved_node(ast), other.resolved_node(ast)) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                }
            }
        }
    }

    /// Validates a constant value against this type.
    pub fn narrow(&self, ast: &Ast, value: Value) -> Result<Value, ExprError> {
        let fail = |value: &Value| ExprError::Narrowing {
            value: value.to_string(),
            typename: self.typename(ast),
        };
        match self {
            Type::Void => Err(fail(&value)),
            _ if self.is_integer() => {
                let (lo, hi) = match self.integer_range() {
                    Some(r) => r,
                    None => return Err(fail(&value)),
                };
                match value {
                    Value::Int(v) if v >= lo && v <= hi => Ok(Value::Int(v)),
                    other => Err(fail(&other)),
                }
            }
            Type::Boolean => match value {
                Value::Bool(_) => Ok(value),
                other => Err(fail(&other)),
            },
            Type::Char => match value {
                Value::Char(_) => Ok(value),
                Value::Int(v) if (0..=255).contains(&v) => Ok(Value::Char(v as u8)),
                other => Err(fail(&other)),
            },
            Type::WChar => match value {
                Value::WChar(_) => Ok(value),
                Value::Char(c) => Ok(Value::WChar(char::from(c))),
                Value::Int(v) => u32::try_from(v)
                    .ok()
                    .and_then(char::from_u32)
                    .map(Value::WChar)
                    .ok_or_else(|| fail(&Value::Int(v))),
                other => Err(fail(&other)),
            },
            Type::Float | Type::Double | Type::LongDouble => match value {
                Value::Float(_) => Ok(value),
                other => Err(fail(&other)),
            },
            Type::Fixed { .. } => Ok(value),
            Type::String { bound } => match value {
                Value::Str(s) => match bound.as_ref().and_then(Bound::value) {
                    Some(b) if (s.chars().count() as u64) > b => Err(fail(&Value::Str(s))),
                    _ => Ok(Value::Str(s)),
                },
                other => Err(fail(&other)),
            },
            Type::WString { bound } => match value {
                Value::WStr(s) => match bound.as_ref().and_then(Bound::value) {
                    Some(b) if (s.chars().count() as u64) > b => Err(fail(&Value::WStr(s))),
                    _ => Ok(Value::WStr(s)),
                },
                other => Err(fail(&other)),
            },
            Type::Sequence { .. } | Type::Array { .. } => Err(ExprError::NotConstant {
                typename: self.typename(ast),
            }),
            Type::Enum(n) => {
                let count = ast.enumerator_count(*n) as i128;
                match value {
                    Value::Int(v) if (0..count).contains(&v) => Ok(Value::Int(v)),
                    other => Err(fail(&other)),
                }
            }
            Type::ScopedName(n) => match ast.node_type(*n) {
                Some(t) => t.narrow(ast, value),
                None => Err(fail(&value)),
            },
            Type::Const(inner) => inner.narrow(ast, value),
            _ => Ok(value),
        }
    }

    /// Smallest value of a union switch type.
    pub fn range_min(&self, ast: &Ast) -> Option<Value> {
        match self {
            Type::Boolean => Some(Value::Bool(false)),
            Type::Char => Some(Value::Char(0)),
            Type::Enum(n) => (ast.enumerator_count(*n) > 0).then_some(Value::Int(0)),
            _ if self.is_integer() => self.integer_range().map(|(lo, _)| Value::Int(lo)),
            _ => None,
        }
    }

    /// Successor of `v` in this type's range; `None` once `v` is the maximum.
    pub fn range_next(&self, ast: &Ast, v: &Value) -> Option<Value> {
        match self {
            Type::Boolean => match v {
                Value::Bool(false) => Some(Value::Bool(true)),
                _ => None,
            },
            Type::Char => match v {
                Value::Char(c) if *c < 255 => Some(Value::Char(c + 1)),
                _ => None,
            },
            Type::Enum(n) => match v {
                Value::Int(i) if i + 1 < ast.enumerator_count(*n) as i128 => {
                    Some(Value::Int(i + 1))
                }
                _ => None,
            },
            _ if self.is_integer() => {
                let (_, hi) = self.integer_range()?;
                match v {
                    Value::Int(i) if *i < hi => Some(Value::Int(i + 1)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Number of distinct values of a union switch type, when enumerable.
    pub fn range_length(&self, ast: &Ast) -> Option<u128> {
        match self {
            Type::Boolean => Some(2),
            Type::Char => Some(256),
            Type::Enum(n) => Some(ast.enumerator_count(*n) as u128),
            _ if self.is_integer() => self
                .integer_range()
                .map(|(lo, hi)| (hi - lo) as u128 + 1),
            _ => None,
        }
    }

    /// Rebuilds the type with template parameters replaced by concrete
    /// arguments.
    pub fn instantiate(
        &self,
        ctx: &InstantiationContext,
        ast: &mut Ast,
    ) -> Result<Type, SemanticError> {
        if !self.is_template(ast) {
            return Ok(self.clone());
        }
        match self {
            Type::ScopedName(n) => match ctx.concrete_for(ast, *n)? {
                Concrete::Type(t) => Ok(t),
                Concrete::Node(id) => Ok(Type::ScopedName(id)),
                Concrete::Expr(_) => Err(SemanticError::TemplateParamMismatch {
                    param: ast.scoped_name(*n),
                    reason: "expected a type argument, got a constant expression".into(),
                }),
            },
            Type::String { bound } => Ok(Type::String {
                bound: instantiate_bound(bound, ctx, ast)?,
            }),
            Type::WString { bound } => Ok(Type::WString {
                bound: instantiate_bound(bound, ctx, ast)?,
            }),
            Type::Sequence { elem, bound } => {
                let elem = elem.instantiate(ctx, ast)?;
                let bound = instantiate_bound(bound, ctx, ast)?;
                Type::sequence(elem, bound)
            }
            Type::Array { elem, sizes } => {
                let elem = elem.instantiate(ctx, ast)?;
                let mut concrete = Vec::with_capacity(sizes.len());
                for sz in sizes {
                    match instantiate_bound(&Some(sz.clone()), ctx, ast)? {
                        Some(b) => concrete.push(b),
                        None => {
                            return Err(SemanticError::TemplateParamMismatch {
                                param: "array size".into(),
                                reason: "missing concrete array dimension".into(),
                            });
                        }
                    }
                }
                Type::array(elem, concrete)
            }
            Type::Const(inner) => Ok(Type::Const(Box::new(inner.instantiate(ctx, ast)?))),
            _ => Ok(self.clone()),
        }
    }
}

fn instantiate_bound(
    bound: &Option<Bound>,
    ctx: &InstantiationContext,
    ast: &mut Ast,
) -> Result<Option<Bound>, SemanticError> {
    match bound {
        None => Ok(None),
        Some(Bound::Value(v)) => Ok(Some(Bound::Value(*v))),
        Some(Bound::Param(n)) => match ctx.concrete_for(ast, *n)? {
            Concrete::Expr(e) => {
                let v = e.value().and_then(|v| v.as_int()).ok_or_else(|| {
                    SemanticError::TemplateParamMismatch {
                        param: ast.scoped_name(*n),
                        reason: "bound argument must be an integer constant".into(),
                    }
                })?;
                u64::try_from(v).map(|v| Some(Bound::Value(v))).map_err(|_| {
                    SemanticError::TemplateParamMismatch {
                        param: ast.scoped_name(*n),
                        reason: format!("bound argument must be positive, got {v}"),
                    }
                })
            }
            _ => Err(SemanticError::TemplateParamMismatch {
                param: ast.scoped_name(*n),
                reason: "expected a constant expression for a bound".into(),
            }),
        },
    }
}
