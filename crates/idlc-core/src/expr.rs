//! Constant expression folding with type promotion.
//!
//! Expressions are folded eagerly: constructing an operation computes its
//! result type and value from the operands. The result type comes from a
//! per-operator applicability suite, ordered widest first; the result value
//! is kept exact and only narrowed when a declaration consumes it.
//!
//! Inside a template module operands may refer to template parameters. Such
//! expressions stay unfolded (type and value absent) until instantiation
//! substitutes concrete arguments and re-runs the fold.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Ast, Concrete, InstantiationContext, NodeId, NodeKind, SemanticError};
use crate::types::Type;
use crate::value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("{value} cannot be narrowed to {typename}")]
    Narrowing { value: String, typename: String },
    #[error("{typename} cannot be used in a constant expression")]
    NotConstant { typename: String },
    #[error("operator {op} cannot be applied to {typename}")]
    NotApplicable { op: &'static str, typename: String },
    #[error("operator {op} cannot combine boolean and integer operands")]
    BooleanMix { op: &'static str },
    #[error("arithmetic overflow in operator {op}")]
    Overflow { op: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("right operand of {op} must lie in 0...64, got {value}")]
    ShiftRange { op: &'static str, value: i128 },
    #[error("{name} is not a valid constant")]
    InvalidConstReference { name: String },
    #[error("{name} is not an enumerator")]
    InvalidEnumeratorReference { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    UnaryPlus,
    UnaryMinus,
    UnaryNot,
    Or,
    Xor,
    And,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl OpKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            OpKind::UnaryPlus => "unary +",
            OpKind::UnaryMinus => "unary -",
            OpKind::UnaryNot => "~",
            OpKind::Or => "|",
            OpKind::Xor => "^",
            OpKind::And => "&",
            OpKind::Shl => "<<",
            OpKind::Shr => ">>",
            OpKind::Add => "+",
            OpKind::Sub => "-",
            OpKind::Mul => "*",
            OpKind::Div => "/",
            OpKind::Mod => "%",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            OpKind::UnaryPlus | OpKind::UnaryMinus | OpKind::UnaryNot => 1,
            _ => 2,
        }
    }

    fn suite(&self) -> &'static [Tag] {
        match self {
            OpKind::Or | OpKind::Xor | OpKind::And => BOOLEAN_SUITE,
            OpKind::Shl | OpKind::Shr | OpKind::Mod | OpKind::UnaryNot => INTEGER_SUITE,
            _ => FLOAT_SUITE,
        }
    }
}

/// Promotion tag for the applicability suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Boolean,
    LongDouble,
    Double,
    Float,
    Fixed,
    LongLong,
    ULongLong,
    Long,
    ULong,
    Short,
    UShort,
    Octet,
}

const INTEGER_SUITE: &[Tag] = &[
    Tag::LongLong,
    Tag::ULongLong,
    Tag::Long,
    Tag::ULong,
    Tag::Short,
    Tag::UShort,
    Tag::Octet,
];

const BOOLEAN_SUITE: &[Tag] = &[
    Tag::Boolean,
    Tag::LongLong,
    Tag::ULongLong,
    Tag::Long,
    Tag::ULong,
    Tag::Short,
    Tag::UShort,
    Tag::Octet,
];

const FLOAT_SUITE: &[Tag] = &[
    Tag::LongDouble,
    Tag::Double,
    Tag::Float,
    Tag::Fixed,
    Tag::LongLong,
    Tag::ULongLong,
    Tag::Long,
    Tag::ULong,
    Tag::Short,
    Tag::UShort,
    Tag::Octet,
];

fn tag_of(ty: &Type) -> Option<Tag> {
    match ty {
        Type::Boolean => Some(Tag::Boolean),
        Type::LongDouble => Some(Tag::LongDouble),
        Type::Double => Some(Tag::Double),
        Type::Float => Some(Tag::Float),
        Type::Fixed { .. } => Some(Tag::Fixed),
        Type::LongLong => Some(Tag::LongLong),
        Type::ULongLong => Some(Tag::ULongLong),
        Type::Long => Some(Tag::Long),
        Type::ULong => Some(Tag::ULong),
        Type::Short => Some(Tag::Short),
        Type::UShort => Some(Tag::UShort),
        Type::Octet => Some(Tag::Octet),
        _ => None,
    }
}

fn tag_type(tag: Tag) -> Type {
    match tag {
        Tag::Boolean => Type::Boolean,
        Tag::LongDouble => Type::LongDouble,
        Tag::Double => Type::Double,
        Tag::Float => Type::Float,
        Tag::Fixed => Type::Fixed { digits: None, scale: None },
        Tag::LongLong => Type::LongLong,
        Tag::ULongLong => Type::ULongLong,
        Tag::Long => Type::Long,
        Tag::ULong => Type::ULong,
        Tag::Short => Type::Short,
        Tag::UShort => Type::UShort,
        Tag::Octet => Type::Octet,
    }
}

/// Re-selects signedness of an integer result type from the result value.
fn suite_sign(ty: Type, value: &Value) -> Type {
    let negative = matches!(value, Value::Int(v) if *v < 0);
    match ty {
        Type::LongLong | Type::ULongLong => {
            if negative { Type::LongLong } else { Type::ULongLong }
        }
        Type::Long | Type::ULong => {
            if negative { Type::Long } else { Type::ULong }
        }
        Type::Short | Type::UShort => {
            if negative { Type::Short } else { Type::UShort }
        }
        other => other,
    }
}

/// A folded constant expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Literal with its narrowed value.
    Value { ty: Type, value: Value },
    /// Reference to a `const` definition or a `const` template parameter.
    ScopedName { node: NodeId, ty: Type, value: Option<Value> },
    /// Reference to an enumerator; the value is its ordinal.
    Enumerator { node: NodeId, ty: Type, value: Value },
    Op(Box<OpExpr>),
}

/// An operator application. Type and value are absent while any operand
/// refers to an unbound template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpExpr {
    pub op: OpKind,
    pub operands: Vec<Expr>,
    pub ty: Option<Type>,
    pub value: Option<Value>,
}

impl Expr {
    /// Builds a literal, narrowing the value to the literal's type.
    pub fn literal(ast: &Ast, ty: Type, value: Value) -> Result<Expr, ExprError> {
        let value = ty.narrow(ast, value)?;
        Ok(Expr::Value { ty, value })
    }

    /// Builds a reference to a named constant.
    ///
    /// The node must be a `const` definition or a template parameter of
    /// `const` type; anything else is not usable in a constant expression.
    pub fn scoped_name(ast: &Ast, node: NodeId) -> Result<Expr, ExprError> {
        match ast.node(node).kind() {
            NodeKind::Const(def) => Ok(Expr::ScopedName {
                node,
                ty: def.ty.clone(),
                value: def.value.clone(),
            }),
            NodeKind::TemplateParam(def) if matches!(def.ty, Type::Const(_)) => {
                Ok(Expr::ScopedName { node, ty: def.ty.clone(), value: None })
            }
            _ => Err(ExprError::InvalidConstReference { name: ast.scoped_name(node) }),
        }
    }

    /// Builds a reference to an enumerator.
    pub fn enumerator(ast: &Ast, node: NodeId) -> Result<Expr, ExprError> {
        match ast.node(node).kind() {
            NodeKind::Enumerator(def) => Ok(Expr::Enumerator {
                node,
                ty: Type::ULong,
                value: Value::Int(def.value as i128),
            }),
            _ => Err(ExprError::InvalidEnumeratorReference { name: ast.scoped_name(node) }),
        }
    }

    pub fn unary(ast: &Ast, op: OpKind, operand: Expr) -> Result<Expr, ExprError> {
        Expr::apply(ast, op, vec![operand])
    }

    pub fn binary(ast: &Ast, op: OpKind, left: Expr, right: Expr) -> Result<Expr, ExprError> {
        Expr::apply(ast, op, vec![left, right])
    }

    fn apply(ast: &Ast, op: OpKind, operands: Vec<Expr>) -> Result<Expr, ExprError> {
        debug_assert_eq!(op.arity(), operands.len());
        let (ty, value) = fold(ast, op, &operands)?;
        Ok(Expr::Op(Box::new(OpExpr { op, operands, ty, value })))
    }

    pub fn ty(&self) -> Option<&Type> {
        match self {
            Expr::Value { ty, .. } | Expr::Enumerator { ty, .. } => Some(ty),
            Expr::ScopedName { ty, .. } => Some(ty),
            Expr::Op(op) => op.ty.as_ref(),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Expr::Value { value, .. } | Expr::Enumerator { value, .. } => Some(value),
            Expr::ScopedName { value, .. } => value.as_ref(),
            Expr::Op(op) => op.value.as_ref(),
        }
    }

    /// Whether the expression still depends on unbound template parameters.
    pub fn is_template(&self, ast: &Ast) -> bool {
        match self {
            Expr::Value { .. } | Expr::Enumerator { .. } => false,
            Expr::ScopedName { node, value, .. } => {
                value.is_none() && ast.is_template_node(*node)
            }
            Expr::Op(op) => op.value.is_none(),
        }
    }

    /// Replaces template parameter references with concrete arguments and
    /// re-folds the expression.
    pub fn instantiate(
        &self,
        ctx: &InstantiationContext,
        ast: &mut Ast,
    ) -> Result<Expr, SemanticError> {
        match self {
            Expr::Value { .. } | Expr::Enumerator { .. } => Ok(self.clone()),
            Expr::ScopedName { node, .. } => {
                if !ast.is_template_node(*node) {
                    return Ok(self.clone());
                }
                match ctx.concrete_for(ast, *node)? {
                    Concrete::Expr(e) => Ok(e),
                    Concrete::Node(id) => Ok(Expr::scoped_name(ast, id)?),
                    Concrete::Type(_) => Err(SemanticError::TemplateParamMismatch {
                        param: ast.scoped_name(*node),
                        reason: "expected a constant argument, got a type".into(),
                    }),
                }
            }
            Expr::Op(op) => {
                let mut operands = Vec::with_capacity(op.operands.len());
                for operand in &op.operands {
                    operands.push(operand.instantiate(ctx, ast)?);
                }
                Ok(Expr::apply(ast, op.op, operands)?)
            }
        }
    }
}

/// Computes result type and value; returns `(None, None)` while any operand
/// is still templated.
fn fold(ast: &Ast, op: OpKind, operands: &[Expr]) -> Result<(Option<Type>, Option<Value>), ExprError> {
    if operands.iter().any(|o| o.is_template(ast)) {
        return Ok((None, None));
    }

    let suite = op.suite();
    let mut tags = Vec::with_capacity(operands.len());
    for operand in operands {
        let ty = match operand.ty() {
            Some(t) => t.resolved(ast),
            None => return Ok((None, None)),
        };
        let tag = tag_of(&ty).filter(|t| suite.contains(t)).ok_or_else(|| {
            ExprError::NotApplicable { op: op.symbol(), typename: ty.typename(ast) }
        })?;
        tags.push(tag);
    }
    let restag = suite
        .iter()
        .copied()
        .find(|t| tags.contains(t))
        .ok_or_else(|| ExprError::NotApplicable {
            op: op.symbol(),
            typename: "void".into(),
        })?;
    let restype = tag_type(restag);

    let mut values = Vec::with_capacity(operands.len());
    for operand in operands {
        match operand.value() {
            Some(v) => values.push(v.clone()),
            None => return Ok((None, None)),
        }
    }

    let value = calculate(op, &restype, &values)?;
    let restype = suite_sign(restype, &value);
    Ok((Some(restype), Some(value)))
}

fn calculate(op: OpKind, restype: &Type, values: &[Value]) -> Result<Value, ExprError> {
    let sym = op.symbol();
    match op {
        OpKind::Or | OpKind::Xor | OpKind::And => {
            let bools: Vec<bool> = values.iter().filter_map(Value::as_bool).collect();
            if bools.len() == values.len() {
                let v = match op {
                    OpKind::Or => bools[0] | bools[1],
                    OpKind::Xor => bools[0] ^ bools[1],
                    _ => bools[0] & bools[1],
                };
                return Ok(Value::Bool(v));
            }
            let ints = int_operands(sym, values)?;
            let v = match op {
                OpKind::Or => ints[0] | ints[1],
                OpKind::Xor => ints[0] ^ ints[1],
                _ => ints[0] & ints[1],
            };
            Ok(Value::Int(v))
        }
        OpKind::Shl | OpKind::Shr => {
            let ints = int_operands(sym, values)?;
            let (lhs, rhs) = (ints[0], ints[1]);
            if !(0..64).contains(&rhs) {
                return Err(ExprError::ShiftRange { op: sym, value: rhs });
            }
            let v = if op == OpKind::Shl {
                lhs.checked_mul(1i128 << rhs).ok_or(ExprError::Overflow { op: sym })?
            } else {
                lhs >> rhs
            };
            Ok(Value::Int(v))
        }
        OpKind::Mod => {
            let ints = int_operands(sym, values)?;
            if ints[1] == 0 {
                return Err(ExprError::DivisionByZero);
            }
            Ok(Value::Int(floor_mod(ints[0], ints[1])))
        }
        OpKind::UnaryNot => {
            let ints = int_operands(sym, values)?;
            let v = if restype.is_unsigned() {
                let bits = restype.bits().unwrap_or(64);
                let mask: i128 = if bits >= 127 { i128::MAX } else { (1i128 << bits) - 1 };
                mask - ints[0]
            } else {
                !ints[0]
            };
            Ok(Value::Int(v))
        }
        OpKind::UnaryPlus => Ok(values[0].clone()),
        OpKind::UnaryMinus => match &values[0] {
            Value::Int(v) => v
                .checked_neg()
                .map(Value::Int)
                .ok_or(ExprError::Overflow { op: sym }),
            Value::Float(v) => Ok(Value::Float(-v)),
            other => {
                let v = other.as_float().ok_or(ExprError::NotApplicable {
                    op: sym,
                    typename: "value".into(),
                })?;
                Ok(numeric_result(restype, -v))
            }
        },
        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div => {
            if restype.is_integer() {
                let ints = int_operands(sym, values)?;
                let (a, b) = (ints[0], ints[1]);
                let v = match op {
                    OpKind::Add => a.checked_add(b),
                    OpKind::Sub => a.checked_sub(b),
                    OpKind::Mul => a.checked_mul(b),
                    _ => {
                        if b == 0 {
                            return Err(ExprError::DivisionByZero);
                        }
                        Some(floor_div(a, b))
                    }
                };
                v.map(Value::Int).ok_or(ExprError::Overflow { op: sym })
            } else {
                let a = float_operand(sym, &values[0])?;
                let b = float_operand(sym, &values[1])?;
                let v = match op {
                    OpKind::Add => a + b,
                    OpKind::Sub => a - b,
                    OpKind::Mul => a * b,
                    _ => {
                        if b == 0.0 {
                            return Err(ExprError::DivisionByZero);
                        }
                        a / b
                    }
                };
                Ok(numeric_result(restype, v))
            }
        }
    }
}

fn int_operands(op: &'static str, values: &[Value]) -> Result<Vec<i128>, ExprError> {
    let ints: Vec<i128> = values.iter().filter_map(Value::as_int).collect();
    if ints.len() != values.len() {
        return Err(ExprError::BooleanMix { op });
    }
    Ok(ints)
}

fn float_operand(op: &'static str, value: &Value) -> Result<f64, ExprError> {
    value.as_float().ok_or(ExprError::NotApplicable { op, typename: "value".into() })
}

fn numeric_result(restype: &Type, v: f64) -> Value {
    match restype {
        Type::Fixed { .. } => Value::Fixed(v.to_string()),
        _ => Value::Float(v),
    }
}

/// Division rounding toward negative infinity.
fn floor_div(a: i128, b: i128) -> i128 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q }
}

/// Modulo with the sign of the divisor.
fn floor_mod(a: i128, b: i128) -> i128 {
    let r = a % b;
    if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
}
