//! Member-level semantics: incomplete and recursive member types,
//! operation signatures, union case labels, bit-bound widths and port
//! expansion.

use serde::{Deserialize, Serialize};

use crate::annotations::{Annotation, AnnotationValue, Annotations};
use crate::expr::Expr;
use crate::types::Type;
use crate::value::Value;

use super::{Ast, AttributeDef, NodeId, NodeKind, PortDef, PortKind, SemanticError, StateMemberDef};

/// A union case label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaseLabel {
    Default,
    Value(Expr),
}

impl Ast {
    /// Validates a struct/union member type. Incomplete types are only
    /// allowed through a sequence, which marks the enclosing definition
    /// recursive.
    pub(crate) fn check_member(
        &mut self,
        scope: NodeId,
        ty: Type,
        name: &str,
    ) -> Result<Type, SemanticError> {
        if ty.is_node(self, |k| matches!(k, NodeKind::Exception(_))) {
            return Err(SemanticError::ExceptionAsType {
                typename: ty.typename(self),
                context: format!("member {name}"),
            });
        }
        if ty.is_template(self) {
            return Ok(ty);
        }
        if ty.resolved(self).is_complete(self) {
            return Ok(ty);
        }
        let (elem, via_sequence) = self.sequence_element(&ty);
        if via_sequence {
            if let Some(node) = elem.resolved_node(self) {
                self.mark_recursive_enclosure(scope, node);
            }
            return Ok(ty);
        }
        Err(SemanticError::IncompleteType {
            typename: ty.typename(self),
            context: format!("member {name}"),
        })
    }

    /// Validates a valuetype state member type. On top of the member rules,
    /// a valuetype may refer to itself and to incomplete valuetypes
    /// directly.
    pub(crate) fn check_state_member(
        &mut self,
        scope: NodeId,
        ty: Type,
        is_public: bool,
        name: &str,
    ) -> Result<StateMemberDef, SemanticError> {
        if ty.is_anonymous() {
            return Err(SemanticError::AnonymousType {
                context: format!("state member {name}"),
            });
        }
        if ty.is_node(self, |k| matches!(k, NodeKind::Exception(_))) {
            return Err(SemanticError::ExceptionAsType {
                typename: ty.typename(self),
                context: format!("state member {name}"),
            });
        }
        let mut def = StateMemberDef { ty: ty.clone(), is_public, is_recursive: false };
        if ty.is_template(self) || ty.resolved(self).is_complete(self) {
            return Ok(def);
        }
        let (elem, via_sequence) = self.sequence_element(&ty);
        if via_sequence {
            if let Some(node) = elem.resolved_node(self) {
                self.mark_recursive_enclosure(scope, node);
            }
            return Ok(def);
        }
        if let Some(node) = elem.resolved_node(self) {
            if matches!(
                self.node(node).kind(),
                NodeKind::Valuetype(_) | NodeKind::Eventtype(_)
            ) {
                if self.mark_recursive_enclosure(scope, node) {
                    def.is_recursive = true;
                }
                // incomplete valuetype state members are always allowed
                return Ok(def);
            }
        }
        Err(SemanticError::IncompleteType {
            typename: ty.typename(self),
            context: format!("state member {name}"),
        })
    }

    /// Peels sequence layers off a resolved type.
    fn sequence_element(&self, ty: &Type) -> (Type, bool) {
        let mut t = ty.resolved(self);
        let mut via_sequence = false;
        while let Type::Sequence { elem, .. } = t {
            via_sequence = true;
            t = elem.resolved(self);
        }
        (t, via_sequence)
    }

    /// Marks the enclosing definition recursive when `node` is one of the
    /// constructed types currently being defined around `scope`.
    fn mark_recursive_enclosure(&mut self, scope: NodeId, node: NodeId) -> bool {
        let mut cur = Some(scope);
        while let Some(enc) = cur {
            match self.node(enc).kind() {
                NodeKind::Struct(_)
                | NodeKind::Exception(_)
                | NodeKind::Union(_)
                | NodeKind::Valuetype(_)
                | NodeKind::Eventtype(_) => {
                    if enc == node {
                        match self.node_mut(enc).kind_mut() {
                            NodeKind::Struct(def) | NodeKind::Exception(def) => {
                                def.recursive = true;
                            }
                            NodeKind::Union(def) => def.recursive = true,
                            NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => {
                                def.recursive = true;
                            }
                            _ => {}
                        }
                        return true;
                    }
                    cur = self.node(enc).parent;
                }
                _ => cur = self.node(enc).parent,
            }
        }
        false
    }

    /// Checks an operation return or attribute type against its scope.
    pub(crate) fn check_operation_type(
        &self,
        scope: NodeId,
        ty: &Type,
        name: &str,
    ) -> Result<(), SemanticError> {
        if ty.is_template(self) {
            return Ok(());
        }
        if let NodeKind::Interface(def) = self.node(self.effective_scope(scope)).kind() {
            if !def.is_local && ty.is_local(self) {
                return Err(SemanticError::LocalType {
                    typename: ty.typename(self),
                    context: format!("operation {name} of an unrestricted interface"),
                });
            }
            if !matches!(ty, Type::Void) && !ty.resolved(self).is_complete(self) {
                return Err(SemanticError::IncompleteType {
                    typename: ty.typename(self),
                    context: format!("operation {name}"),
                });
            }
        }
        Ok(())
    }

    /// Validates an operation/initializer parameter type.
    pub(crate) fn check_parameter(
        &mut self,
        scope: NodeId,
        ty: Type,
        name: &str,
    ) -> Result<Type, SemanticError> {
        if ty.is_anonymous() {
            return Err(SemanticError::AnonymousType {
                context: format!("parameter {name}"),
            });
        }
        if ty.is_node(self, |k| matches!(k, NodeKind::Exception(_))) {
            return Err(SemanticError::ExceptionAsType {
                typename: ty.typename(self),
                context: format!("parameter {name}"),
            });
        }
        if ty.is_template(self) {
            return Ok(ty);
        }
        let iface = self.node(scope).parent.map(|p| self.effective_scope(p));
        if let Some(iface) = iface {
            if let NodeKind::Interface(def) = self.node(iface).kind() {
                if !def.is_local && ty.is_local(self) {
                    return Err(SemanticError::LocalType {
                        typename: ty.typename(self),
                        context: format!("parameter {name} of an unrestricted interface"),
                    });
                }
                if !ty.resolved(self).is_complete(self) {
                    return Err(SemanticError::IncompleteType {
                        typename: ty.typename(self),
                        context: format!("parameter {name}"),
                    });
                }
            }
        }
        Ok(ty)
    }

    /// Resolves a raises list; entries must be exceptions, natives or
    /// template parameters.
    pub(crate) fn check_raises(
        &self,
        raises: &[Type],
        name: &str,
    ) -> Result<Vec<NodeId>, SemanticError> {
        let mut out = Vec::with_capacity(raises.len());
        for ty in raises {
            if let Some(node) = ty.resolved_node(self) {
                if matches!(
                    self.node(node).kind(),
                    NodeKind::Exception(_) | NodeKind::TemplateParam(_)
                ) {
                    out.push(node);
                    continue;
                }
            }
            if let Type::ScopedName(n) = ty {
                if matches!(ty.resolved(self), Type::Native) {
                    out.push(*n);
                    continue;
                }
            }
            return Err(SemanticError::InvalidBase {
                name: name.to_string(),
                reason: format!("{} is not an exception", ty.typename(self)),
            });
        }
        Ok(out)
    }

    /// Validates a port declaration's type against the port category.
    pub(crate) fn check_port_type(
        &self,
        kind: PortKind,
        ty: &Type,
        name: &str,
    ) -> Result<(), SemanticError> {
        if ty.is_template_param(self) {
            return Ok(());
        }
        let ok = match kind {
            PortKind::Facet | PortKind::Receptacle => {
                matches!(ty, Type::Object)
                    || ty.is_node(self, |k| matches!(k, NodeKind::Interface(_)))
            }
            PortKind::Port | PortKind::MirrorPort => {
                ty.is_node(self, |k| matches!(k, NodeKind::Porttype))
            }
            PortKind::Emitter | PortKind::Publisher | PortKind::Consumer => {
                ty.is_node(self, |k| matches!(k, NodeKind::Eventtype(_)))
            }
        };
        if ok {
            Ok(())
        } else {
            Err(SemanticError::InvalidBase {
                name: name.to_string(),
                reason: format!("{} is not valid for this port", ty.typename(self)),
            })
        }
    }

    /// In and inout parameters of an operation, in declaration order.
    pub fn in_params(&self, op: NodeId) -> Vec<NodeId> {
        self.params_where(op, |d| {
            matches!(d, super::ParamDirection::In | super::ParamDirection::InOut)
        })
    }

    /// Out and inout parameters of an operation, in declaration order.
    pub fn out_params(&self, op: NodeId) -> Vec<NodeId> {
        self.params_where(op, |d| {
            matches!(d, super::ParamDirection::Out | super::ParamDirection::InOut)
        })
    }

    fn params_where(
        &self,
        op: NodeId,
        pred: impl Fn(super::ParamDirection) -> bool,
    ) -> Vec<NodeId> {
        self.node(op)
            .children()
            .iter()
            .copied()
            .filter(|c| match self.node(*c).kind() {
                NodeKind::Parameter(def) => pred(def.direction),
                _ => false,
            })
            .collect()
    }

    /// Sets the discriminator type of a union under definition.
    pub fn set_union_switchtype(
        &mut self,
        union: NodeId,
        ty: Type,
        annotations: Annotations,
    ) -> Result<(), SemanticError> {
        let valid = ty.is_template(self)
            || matches!(
                ty.resolved(self),
                Type::Boolean
                    | Type::Char
                    | Type::WChar
                    | Type::Enum(_)
                    | Type::Octet
                    | Type::UInt8
                    | Type::Int8
                    | Type::UShort
                    | Type::Short
                    | Type::ULong
                    | Type::Long
                    | Type::ULongLong
                    | Type::LongLong
            );
        if !valid {
            return Err(SemanticError::InvalidSwitchType {
                typename: ty.typename(self),
            });
        }
        self.node_mut(union).annotations.concat(annotations);
        if let NodeKind::Union(def) = self.node_mut(union).kind_mut() {
            def.switchtype = Some(ty);
        }
        Ok(())
    }

    pub fn union_switchtype(&self, union: NodeId) -> Option<&Type> {
        match self.node(union).kind() {
            NodeKind::Union(def) => def.switchtype.as_ref(),
            _ => None,
        }
    }

    fn union_member_labels(&self, union: NodeId) -> Vec<CaseLabel> {
        self.node(union)
            .children()
            .iter()
            .filter_map(|c| match self.node(*c).kind() {
                NodeKind::UnionMember(def) => Some(def.labels.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn union_has_default(&self, union: NodeId) -> bool {
        self.union_member_labels(union)
            .iter()
            .any(|l| matches!(l, CaseLabel::Default))
    }

    /// Narrowed values of all explicit case labels.
    fn union_label_values(&self, union: NodeId) -> Result<Vec<Value>, SemanticError> {
        let swtype = match self.union_switchtype(union) {
            Some(t) => t.resolved(self),
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for label in self.union_member_labels(union) {
            if let CaseLabel::Value(expr) = label {
                if let Some(v) = expr.value() {
                    out.push(swtype.narrow(self, v.clone())?);
                }
            }
        }
        Ok(out)
    }

    /// Validates the case labels of a completed union.
    pub fn validate_union(&self, union: NodeId) -> Result<(), SemanticError> {
        let labels = self.union_member_labels(union);
        let defaults = labels
            .iter()
            .filter(|l| matches!(l, CaseLabel::Default))
            .count();
        if defaults > 1 {
            return Err(SemanticError::DuplicateDefault);
        }
        let values = self.union_label_values(union)?;
        for (ix, v) in values.iter().enumerate() {
            if values[..ix].contains(v) {
                return Err(SemanticError::DuplicateCaseLabel { label: v.to_string() });
            }
        }
        if defaults == 1 {
            if let Some(swtype) = self.union_switchtype(union) {
                if let Some(len) = swtype.resolved(self).range_length(self) {
                    if len == values.len() as u128 {
                        return Err(SemanticError::SuperfluousDefault);
                    }
                }
            }
        }
        Ok(())
    }

    /// First discriminator value not claimed by an explicit label, for the
    /// default member. Wide char discriminators are not enumerable.
    pub fn union_default_value(&self, union: NodeId) -> Result<Option<Value>, SemanticError> {
        let swtype = match self.union_switchtype(union) {
            Some(t) => t.resolved(self),
            None => return Ok(None),
        };
        if matches!(swtype, Type::WChar) {
            return Ok(None);
        }
        let used = self.union_label_values(union)?;
        let mut candidate = swtype.range_min(self);
        while let Some(v) = candidate {
            if !used.contains(&v) {
                return Ok(Some(v));
            }
            candidate = swtype.range_next(self, &v);
        }
        Ok(None)
    }

    /// Applies an `@bit_bound` annotation to an enum.
    pub fn set_enum_bitbound(&mut self, id: NodeId, bits: u16) -> Result<(), SemanticError> {
        if bits == 0 || bits > 32 {
            return Err(SemanticError::BitBound { value: bits, max: 32 });
        }
        if let NodeKind::Enum(def) = self.node_mut(id).kind_mut() {
            def.bitbound = bits;
        }
        Ok(())
    }

    pub fn enum_underlying_type(&self, id: NodeId) -> Type {
        let bits = match self.node(id).kind() {
            NodeKind::Enum(def) => def.bitbound,
            _ => 32,
        };
        Type::unsigned_for_bits(bits).unwrap_or(Type::ULong)
    }

    /// Applies an `@bit_bound` annotation to a bitmask.
    pub fn set_bitmask_bitbound(&mut self, id: NodeId, bits: u16) -> Result<(), SemanticError> {
        if bits == 0 || bits > 64 {
            return Err(SemanticError::BitBound { value: bits, max: 64 });
        }
        if let NodeKind::BitMask(def) = self.node_mut(id).kind_mut() {
            def.bitbound = Some(bits);
        }
        Ok(())
    }

    /// Bit width of a bitmask; defaults to its number of bit values.
    pub fn bitmask_bits(&self, id: NodeId) -> u16 {
        match self.node(id).kind() {
            NodeKind::BitMask(def) => {
                def.bitbound.unwrap_or(def.bitvalues.len() as u16)
            }
            _ => 0,
        }
    }

    pub fn bitmask_underlying_type(&self, id: NodeId) -> Type {
        Type::unsigned_for_bits(self.bitmask_bits(id)).unwrap_or(Type::ULongLong)
    }

    /// Total bit width of a bitset including inherited fields.
    pub fn bitset_bits(&self, id: NodeId) -> u16 {
        let own: u16 = self
            .node(id)
            .children()
            .iter()
            .filter_map(|c| match self.node(*c).kind() {
                NodeKind::BitField(def) => Some(def.bits),
                _ => None,
            })
            .sum();
        let base = match self.node(id).kind() {
            NodeKind::BitSet(def) => def.base,
            _ => None,
        };
        own + base.map(|b| self.bitset_bits(b)).unwrap_or(0)
    }

    pub fn bitset_underlying_type(&self, id: NodeId) -> Type {
        Type::unsigned_for_bits(self.bitset_bits(id)).unwrap_or(Type::ULongLong)
    }
}

/// A port produced by expanding a `port`/`mirrorport` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedPort {
    pub name: String,
    pub def: PortDef,
    pub annotations: Annotations,
}

impl Ast {
    /// All ports of a component, connector or porttype, with `port` and
    /// `mirrorport` declarations expanded to their constituent ports.
    pub fn expanded_ports(&self, id: NodeId) -> Vec<ExpandedPort> {
        let mut out = Vec::new();
        for child in self.node(id).children() {
            let (name, def) = match self.node(*child).kind() {
                NodeKind::Port(def) => (self.node(*child).name_str().to_string(), def.clone()),
                _ => continue,
            };
            match def.kind {
                PortKind::Port | PortKind::MirrorPort => {
                    let mirror = def.kind == PortKind::MirrorPort;
                    let Some(porttype) = def.ty.resolved_node(self) else {
                        continue;
                    };
                    for sub in self.node(porttype).children() {
                        let NodeKind::Port(sub_def) = self.node(*sub).kind() else {
                            continue;
                        };
                        let sub_name = self.node(*sub).name_str();
                        let mut expanded = sub_def.clone();
                        if mirror {
                            expanded.kind = expanded.kind.mirror();
                        }
                        let mut fields = indexmap::IndexMap::new();
                        fields.insert(
                            "extended_port_name".to_string(),
                            AnnotationValue::Symbol(name.clone()),
                        );
                        fields.insert(
                            "base_name".to_string(),
                            AnnotationValue::Symbol(sub_name.to_string()),
                        );
                        fields.insert(
                            "mirror".to_string(),
                            AnnotationValue::Literal(Value::Bool(mirror)),
                        );
                        let mut annotations = Annotations::new();
                        annotations.push(Annotation::with_fields("ExtendedPortDef", fields));
                        out.push(ExpandedPort {
                            name: format!("{name}_{sub_name}"),
                            def: expanded,
                            annotations,
                        });
                    }
                }
                _ => out.push(ExpandedPort {
                    name,
                    def,
                    annotations: Annotations::new(),
                }),
            }
        }
        out
    }

    /// All attributes of a component, connector or porttype, with the
    /// attributes of `port`/`mirrorport` porttypes copied in under
    /// port-prefixed names.
    pub fn expanded_attributes(&self, id: NodeId) -> Vec<ExpandedAttribute> {
        let mut out = Vec::new();
        for child in self.node(id).children() {
            match self.node(*child).kind() {
                NodeKind::Attribute(def) => out.push(ExpandedAttribute {
                    name: self.node(*child).name_str().to_string(),
                    def: def.clone(),
                    annotations: self.node(*child).annotations.clone(),
                }),
                NodeKind::Port(def)
                    if matches!(def.kind, PortKind::Port | PortKind::MirrorPort) =>
                {
                    let name = self.node(*child).name_str().to_string();
                    let Some(porttype) = def.ty.resolved_node(self) else {
                        continue;
                    };
                    for sub in self.node(porttype).children() {
                        let NodeKind::Attribute(sub_def) = self.node(*sub).kind() else {
                            continue;
                        };
                        let sub_name = self.node(*sub).name_str();
                        out.push(ExpandedAttribute {
                            name: format!("{name}_{sub_name}"),
                            def: sub_def.clone(),
                            annotations: self.node(*sub).annotations.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
        out
    }
}

/// An attribute produced by expanding a `port`/`mirrorport` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedAttribute {
    pub name: String,
    pub def: AttributeDef,
    pub annotations: Annotations,
}
