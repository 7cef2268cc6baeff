//! Definition and name lookup: scope policy, introduction, redefinition.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::annotations::Annotations;
use crate::expr::Expr;
use crate::ident::Identifier;
use crate::types::Type;

use super::{
    Ast, AttributeDef, BitFieldDef, BitMaskDef, BitSetDef, BitValueDef, CaseLabel, ComponentDef,
    ConnectorDef, ConstDef, EnumDef, EnumeratorDef, HomeDef, IncludeDef, InitializerDef,
    InterfaceDef, MemberDef, ModuleDef, Node, NodeId, NodeKind, OperationDef, ParamDirection,
    ParameterDef, PortDef, PortKind, SemanticError, StructDef, TemplateModuleDef,
    TemplateModuleRefDef, TemplateParamDef, TypedefDef, UnionDef, UnionMemberDef, ValueboxDef,
    ValuetypeDef,
};

/// Constructor payload for [`Ast::define`].
///
/// Carries the parsed declaration attributes; `define` validates them
/// against the enclosing scope and builds the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeSpec {
    Module,
    TemplateModule,
    TemplateModuleReference { template: NodeId, params: Vec<NodeId> },
    TemplateParam { ty: Type },
    Include { filename: String, fullpath: String, defined: bool, preprocessed: bool },
    Interface { forward: bool, is_abstract: bool, is_local: bool, is_pseudo: bool },
    Home { base: Option<Type>, interfaces: Vec<Type>, component: Type, primary_key: Option<Type> },
    Component { forward: bool, base: Option<Type>, interfaces: Vec<Type> },
    Connector { base: Option<Type> },
    Porttype,
    Port { kind: PortKind, ty: Type, multiple: bool },
    Valuebox { ty: Type },
    Valuetype { forward: bool, is_abstract: bool, is_custom: bool, is_truncatable: bool, event: bool },
    StateMember { ty: Type, is_public: bool },
    Initializer { raises: Vec<Type> },
    Finder { raises: Vec<Type> },
    Const { ty: Type, expr: Expr },
    Struct { forward: bool, exception: bool },
    Member { ty: Type },
    Union { forward: bool },
    UnionMember { ty: Type, labels: Vec<CaseLabel> },
    Enum,
    Enumerator { enum_node: NodeId, value: u32 },
    BitMask,
    BitValue { position: u16 },
    BitSet { base: Option<Type> },
    BitField { bits: u16, ty: Option<Type> },
    Typedef { ty: Type },
    Operation { oneway: bool, ret: Type, raises: Vec<Type> },
    Parameter { direction: ParamDirection, ty: Type },
    Attribute { ty: Type, readonly: bool, get_raises: Vec<Type>, set_raises: Vec<Type> },
}

impl NodeSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeSpec::Module => "module",
            NodeSpec::TemplateModule => "template module",
            NodeSpec::TemplateModuleReference { .. } => "template module reference",
            NodeSpec::TemplateParam { .. } => "template parameter",
            NodeSpec::Include { .. } => "include",
            NodeSpec::Interface { .. } => "interface",
            NodeSpec::Home { .. } => "home",
            NodeSpec::Component { .. } => "component",
            NodeSpec::Connector { .. } => "connector",
            NodeSpec::Porttype => "porttype",
            NodeSpec::Port { .. } => "port",
            NodeSpec::Valuebox { .. } => "valuebox",
            NodeSpec::Valuetype { event: false, .. } => "valuetype",
            NodeSpec::Valuetype { event: true, .. } => "eventtype",
            NodeSpec::StateMember { .. } => "state member",
            NodeSpec::Initializer { .. } => "initializer",
            NodeSpec::Finder { .. } => "finder",
            NodeSpec::Const { .. } => "const",
            NodeSpec::Struct { exception: false, .. } => "struct",
            NodeSpec::Struct { exception: true, .. } => "exception",
            NodeSpec::Member { .. } => "member",
            NodeSpec::Union { .. } => "union",
            NodeSpec::UnionMember { .. } => "union member",
            NodeSpec::Enum => "enum",
            NodeSpec::Enumerator { .. } => "enumerator",
            NodeSpec::BitMask => "bitmask",
            NodeSpec::BitValue { .. } => "bitvalue",
            NodeSpec::BitSet { .. } => "bitset",
            NodeSpec::BitField { .. } => "bitfield",
            NodeSpec::Typedef { .. } => "typedef",
            NodeSpec::Operation { .. } => "operation",
            NodeSpec::Parameter { .. } => "parameter",
            NodeSpec::Attribute { .. } => "attribute",
        }
    }
}

/// Whether a declaration of the spec's kind may appear in the given scope.
fn definable_in(scope: &NodeKind, spec: &NodeSpec) -> bool {
    use NodeSpec as S;
    match scope {
        NodeKind::Module(_) | NodeKind::Include(_) => matches!(
            spec,
            S::Module
                | S::TemplateModule
                | S::Interface { .. }
                | S::Valuebox { .. }
                | S::Valuetype { .. }
                | S::Const { .. }
                | S::Struct { .. }
                | S::Union { .. }
                | S::Enum
                | S::Enumerator { .. }
                | S::Typedef { .. }
                | S::Include { .. }
                | S::Home { .. }
                | S::Porttype
                | S::Component { .. }
                | S::Connector { .. }
                | S::BitMask
                | S::BitValue { .. }
                | S::BitSet { .. }
                | S::BitField { .. }
        ),
        NodeKind::TemplateModule(_) => matches!(
            spec,
            S::Module
                | S::TemplateModule
                | S::TemplateModuleReference { .. }
                | S::TemplateParam { .. }
                | S::Interface { .. }
                | S::Valuebox { .. }
                | S::Valuetype { .. }
                | S::Const { .. }
                | S::Struct { .. }
                | S::Union { .. }
                | S::Enum
                | S::Enumerator { .. }
                | S::Typedef { .. }
                | S::Include { .. }
                | S::Home { .. }
                | S::Porttype
                | S::Component { .. }
                | S::Connector { .. }
        ),
        NodeKind::Interface(_) => matches!(
            spec,
            S::Const { .. }
                | S::Operation { .. }
                | S::Attribute { .. }
                | S::Struct { .. }
                | S::Union { .. }
                | S::Typedef { .. }
                | S::Enum
                | S::Enumerator { .. }
        ),
        NodeKind::Home(_) => matches!(
            spec,
            S::Const { .. }
                | S::Operation { .. }
                | S::Attribute { .. }
                | S::Initializer { .. }
                | S::Finder { .. }
                | S::Struct { .. }
                | S::Union { .. }
                | S::Typedef { .. }
                | S::Enum
                | S::Enumerator { .. }
        ),
        NodeKind::Component(_) | NodeKind::Connector(_) | NodeKind::Porttype => {
            matches!(spec, S::Attribute { .. } | S::Port { .. })
        }
        NodeKind::Valuetype(_) | NodeKind::Eventtype(_) => matches!(
            spec,
            S::Include { .. }
                | S::Const { .. }
                | S::Operation { .. }
                | S::Attribute { .. }
                | S::StateMember { .. }
                | S::Initializer { .. }
                | S::Struct { .. }
                | S::Union { .. }
                | S::Typedef { .. }
                | S::Enum
                | S::Enumerator { .. }
        ),
        NodeKind::Operation(_) | NodeKind::Initializer(_) | NodeKind::Finder(_) => {
            matches!(spec, S::Parameter { .. })
        }
        NodeKind::Struct(_) | NodeKind::Exception(_) => matches!(
            spec,
            S::Member { .. } | S::Struct { .. } | S::Union { .. } | S::Enum | S::Enumerator { .. }
        ),
        NodeKind::Union(_) => matches!(
            spec,
            S::UnionMember { .. } | S::Struct { .. } | S::Union { .. } | S::Enum | S::Enumerator { .. }
        ),
        NodeKind::BitMask(_) => matches!(spec, S::BitValue { .. }),
        NodeKind::BitSet(_) => matches!(spec, S::BitField { .. }),
        _ => false,
    }
}

impl Ast {
    /// First non-include enclosing scope; includes are transparent for
    /// name introduction and lookup.
    pub(crate) fn effective_scope(&self, mut id: NodeId) -> NodeId {
        while matches!(self.node(id).kind(), NodeKind::Include(_)) {
            match self.node(id).parent {
                Some(p) => id = p,
                None => break,
            }
        }
        id
    }

    /// Makes `name` visible in `scope`, erroring on a conflicting entry.
    pub(crate) fn introduce(
        &mut self,
        scope: NodeId,
        name: &Identifier,
        node: NodeId,
    ) -> Result<(), SemanticError> {
        let scope = self.effective_scope(scope);
        let key = name.key();
        if let Some(existing) = self.node(scope).introduced.get(&key).copied() {
            if existing != node {
                return Err(SemanticError::AlreadyIntroduced {
                    name: name.as_str().to_string(),
                    existing: format!(
                        "{} {}",
                        self.node(existing).kind().name(),
                        self.scoped_name(existing)
                    ),
                    scope: self.scoped_name(scope),
                });
            }
        }
        self.node_mut(scope).introduced.insert(key, node);
        Ok(())
    }

    /// Removes a node's visibility from a scope (and its module chain).
    pub(crate) fn undo_introduction(&mut self, scope: NodeId, node: NodeId) {
        let scope = self.effective_scope(scope);
        for link in self.module_chain(scope) {
            self.node_mut(link)
                .introduced
                .retain(|_, v| *v != node);
        }
    }

    /// Looks `name` up in this scope only (module chains count as one
    /// scope; derived scopes fall back to their ancestors).
    pub fn search_self(
        &self,
        scope: NodeId,
        name: &Identifier,
    ) -> Result<Option<NodeId>, SemanticError> {
        let scope = self.effective_scope(scope);
        let key = name.key();
        for link in self.module_chain(scope) {
            if let Some(found) = self.node(link).introduced.get(&key).copied() {
                let found_name = self.node(found).name_str();
                if found_name != name.as_str() && !found_name.is_empty() {
                    return Err(SemanticError::NameClash {
                        name: name.as_str().to_string(),
                        existing: found_name.to_string(),
                    });
                }
                return Ok(Some(found));
            }
        }
        match self.node(scope).kind() {
            NodeKind::Interface(_)
            | NodeKind::Valuetype(_)
            | NodeKind::Eventtype(_)
            | NodeKind::Home(_)
            | NodeKind::Component(_) => self.search_ancestors(scope, name),
            _ => Ok(None),
        }
    }

    /// Looks `name` up in this scope and all enclosing scopes.
    pub fn search_enclosure(
        &self,
        scope: NodeId,
        name: &Identifier,
    ) -> Result<Option<NodeId>, SemanticError> {
        if let Some(found) = self.search_self(scope, name)? {
            return Ok(Some(found));
        }
        match self.node(self.effective_scope(scope)).parent {
            Some(parent) => self.search_enclosure(parent, name),
            None => Ok(None),
        }
    }

    /// Resolves a name from a scope, caching the hit in that scope so
    /// later definitions of the same name there are flagged as clashes.
    pub fn resolve(
        &mut self,
        scope: NodeId,
        name: &Identifier,
    ) -> Result<Option<NodeId>, SemanticError> {
        let found = self.search_enclosure(scope, name)?;
        if let Some(node) = found {
            let cache = self.effective_scope(scope);
            self.node_mut(cache)
                .introduced
                .entry(name.key())
                .or_insert(node);
        }
        Ok(found)
    }

    /// Defines a declaration in a scope.
    ///
    /// Handles scope policy, name clashes and the kind-specific
    /// redefinition rules (module reopening, forward completion).
    pub fn define(
        &mut self,
        scope: NodeId,
        name: Option<Identifier>,
        spec: NodeSpec,
        annotations: Annotations,
    ) -> Result<NodeId, SemanticError> {
        let policy_scope = self.effective_scope(scope);
        if !definable_in(self.node(policy_scope).kind(), &spec) {
            return Err(SemanticError::NotDefinable {
                kind: spec.kind_name(),
                scope_kind: self.node(policy_scope).kind().name(),
            });
        }

        let name = match name {
            Some(n) => n,
            // anonymous bitfields are the only unnamed declarations
            None if matches!(spec, NodeSpec::BitField { .. }) => {
                return self.create_node(scope, None, spec, annotations);
            }
            None => {
                return Err(SemanticError::InvalidLiteral { literal: "<unnamed>".into() });
            }
        };

        if let Some(existing) = self.search_self(scope, &name)? {
            let local = {
                let parent = self.node(existing).parent;
                parent == Some(scope)
                    || parent.is_some_and(|p| self.module_chain(policy_scope).contains(&p))
            };
            if local {
                return self.redefine(scope, existing, name, spec, annotations);
            }
            // name inherited from a base scope
            match self.node(existing).kind() {
                NodeKind::Operation(_) | NodeKind::Attribute(_) => {
                    return Err(SemanticError::CannotOverride {
                        name: name.as_str().to_string(),
                        kind: self.node(existing).kind().name(),
                    });
                }
                NodeKind::StateMember(_) | NodeKind::Initializer(_) => {
                    return Err(SemanticError::CannotOverride {
                        name: name.as_str().to_string(),
                        kind: self.node(existing).kind().name(),
                    });
                }
                // shadowing an inherited name locally is allowed
                _ => {}
            }
        }

        self.create_node(scope, Some(name), spec, annotations)
    }

    fn create_node(
        &mut self,
        scope: NodeId,
        name: Option<Identifier>,
        spec: NodeSpec,
        annotations: Annotations,
    ) -> Result<NodeId, SemanticError> {
        let kind = self.build_kind(scope, name.as_ref(), &spec)?;
        // the immediate scope, so a prefix set on an include node stays
        // confined to the definitions of that include
        let prefix = self.node(scope).prefix.clone();
        let node = Node {
            name: name.clone(),
            parent: Some(scope),
            annotations,
            prefix,
            repo_id: None,
            repo_version: None,
            children: Vec::new(),
            introduced: IndexMap::new(),
            kind,
        };
        let id = self.alloc(node);
        if let Some(n) = &name {
            self.introduce(scope, n, id)?;
        }
        self.node_mut(scope).children.push(id);
        self.post_create(scope, id, &spec)?;
        Ok(id)
    }

    /// Builds the node kind, running the kind's declaration checks.
    fn build_kind(
        &mut self,
        scope: NodeId,
        name: Option<&Identifier>,
        spec: &NodeSpec,
    ) -> Result<NodeKind, SemanticError> {
        let named = || name.map(|n| n.as_str().to_string()).unwrap_or_default();
        Ok(match spec {
            NodeSpec::Module => NodeKind::Module(ModuleDef::default()),
            NodeSpec::TemplateModule => NodeKind::TemplateModule(TemplateModuleDef::default()),
            NodeSpec::TemplateModuleReference { template, params } => {
                self.check_template_reference(*template, params)?;
                NodeKind::TemplateModuleReference(TemplateModuleRefDef {
                    template: *template,
                    params: params.clone(),
                })
            }
            NodeSpec::TemplateParam { ty } => {
                NodeKind::TemplateParam(TemplateParamDef { ty: ty.clone(), concrete: None })
            }
            NodeSpec::Include { filename, fullpath, defined, preprocessed } => {
                NodeKind::Include(IncludeDef {
                    filename: filename.clone(),
                    fullpath: fullpath.clone(),
                    defined: *defined,
                    preprocessed: *preprocessed,
                })
            }
            NodeSpec::Interface { forward, is_abstract, is_local, is_pseudo } => {
                NodeKind::Interface(InterfaceDef {
                    forward: *forward,
                    defined: false,
                    is_abstract: *is_abstract,
                    is_local: *is_local,
                    is_pseudo: *is_pseudo,
                    bases: Vec::new(),
                })
            }
            NodeSpec::Home { .. } => NodeKind::Home(HomeDef::default()),
            NodeSpec::Component { forward, .. } => NodeKind::Component(ComponentDef {
                forward: *forward,
                defined: false,
                base: None,
                interfaces: Vec::new(),
            }),
            NodeSpec::Connector { .. } => NodeKind::Connector(ConnectorDef::default()),
            NodeSpec::Porttype => NodeKind::Porttype,
            NodeSpec::Port { kind, ty, multiple } => {
                self.check_port_type(*kind, ty, &named())?;
                NodeKind::Port(PortDef { kind: *kind, ty: ty.clone(), multiple: *multiple })
            }
            NodeSpec::Valuebox { ty } => {
                if ty.is_node(self, |k| {
                    matches!(k, NodeKind::Valuetype(_) | NodeKind::Eventtype(_))
                }) {
                    return Err(SemanticError::InvalidBase {
                        name: named(),
                        reason: "a valuebox cannot box a valuetype".into(),
                    });
                }
                NodeKind::Valuebox(ValueboxDef { ty: ty.clone() })
            }
            NodeSpec::Valuetype { forward, is_abstract, is_custom, is_truncatable, event } => {
                if *is_custom && *is_truncatable {
                    return Err(SemanticError::InvalidBase {
                        name: named(),
                        reason: "'custom' valuetype cannot be 'truncatable'".into(),
                    });
                }
                let def = ValuetypeDef {
                    forward: *forward,
                    defined: false,
                    is_abstract: *is_abstract,
                    is_custom: *is_custom,
                    is_truncatable: *is_truncatable,
                    bases: Vec::new(),
                    interfaces: Vec::new(),
                    recursive: false,
                };
                if *event { NodeKind::Eventtype(def) } else { NodeKind::Valuetype(def) }
            }
            NodeSpec::StateMember { ty, is_public } => {
                let def = self.check_state_member(scope, ty.clone(), *is_public, &named())?;
                NodeKind::StateMember(def)
            }
            NodeSpec::Initializer { raises } => {
                let raises = self.check_raises(raises, &named())?;
                NodeKind::Initializer(InitializerDef { raises })
            }
            NodeSpec::Finder { raises } => {
                let raises = self.check_raises(raises, &named())?;
                NodeKind::Finder(InitializerDef { raises })
            }
            NodeSpec::Const { ty, expr } => {
                if ty.is_anonymous() {
                    return Err(SemanticError::AnonymousType {
                        context: format!("const {}", named()),
                    });
                }
                if !ty.is_complete(self) {
                    return Err(SemanticError::IncompleteType {
                        typename: ty.typename(self),
                        context: format!("const {}", named()),
                    });
                }
                let value = if ty.is_template(self) || expr.is_template(self) {
                    None
                } else {
                    let v = expr.value().cloned().ok_or_else(|| {
                        SemanticError::InvalidLiteral { literal: named() }
                    })?;
                    Some(ty.narrow(self, v)?)
                };
                NodeKind::Const(ConstDef { ty: ty.clone(), expr: expr.clone(), value })
            }
            NodeSpec::Struct { forward, exception } => {
                let def = StructDef {
                    forward: *forward,
                    defined: false,
                    recursive: false,
                    base: None,
                };
                if *exception { NodeKind::Exception(def) } else { NodeKind::Struct(def) }
            }
            NodeSpec::Member { ty } => {
                let ty = self.check_member(scope, ty.clone(), &named())?;
                NodeKind::Member(MemberDef { ty })
            }
            NodeSpec::Union { forward } => NodeKind::Union(UnionDef {
                forward: *forward,
                defined: false,
                recursive: false,
                switchtype: None,
            }),
            NodeSpec::UnionMember { ty, labels } => {
                let ty = self.check_member(scope, ty.clone(), &named())?;
                NodeKind::UnionMember(UnionMemberDef { ty, labels: collapse_labels(labels) })
            }
            NodeSpec::Enum => NodeKind::Enum(EnumDef { enumerators: Vec::new(), bitbound: 32 }),
            NodeSpec::Enumerator { enum_node, value } => {
                NodeKind::Enumerator(EnumeratorDef { enum_node: *enum_node, value: *value })
            }
            NodeSpec::BitMask => NodeKind::BitMask(BitMaskDef::default()),
            NodeSpec::BitValue { position } => {
                NodeKind::BitValue(BitValueDef { position: *position })
            }
            NodeSpec::BitSet { base } => {
                let base = match base {
                    Some(ty) => {
                        let node = ty.resolved_node(self).filter(|n| {
                            matches!(self.node(*n).kind(), NodeKind::BitSet(_))
                        });
                        Some(node.ok_or_else(|| SemanticError::InvalidBase {
                            name: named(),
                            reason: format!("{} is not a bitset", ty.typename(self)),
                        })?)
                    }
                    None => None,
                };
                NodeKind::BitSet(BitSetDef { base })
            }
            NodeSpec::BitField { bits, ty } => {
                if *bits == 0 || *bits > 64 {
                    return Err(SemanticError::BitBound { value: *bits, max: 64 });
                }
                let ty = match ty {
                    Some(t) => t.clone(),
                    None => match Type::bitfield_for_bits(*bits) {
                        Some(t) => t,
                        None => return Err(SemanticError::BitBound { value: *bits, max: 64 }),
                    },
                };
                NodeKind::BitField(BitFieldDef { bits: *bits, ty })
            }
            NodeSpec::Typedef { ty } => NodeKind::Typedef(TypedefDef { ty: ty.clone() }),
            NodeSpec::Operation { oneway, ret, raises } => {
                self.check_operation_type(scope, ret, &named())?;
                let raises = self.check_raises(raises, &named())?;
                NodeKind::Operation(OperationDef { oneway: *oneway, ret: ret.clone(), raises })
            }
            NodeSpec::Parameter { direction, ty } => {
                let ty = self.check_parameter(scope, ty.clone(), &named())?;
                NodeKind::Parameter(ParameterDef { direction: *direction, ty })
            }
            NodeSpec::Attribute { ty, readonly, get_raises, set_raises } => {
                self.check_operation_type(scope, ty, &named())?;
                let get_raises = self.check_raises(get_raises, &named())?;
                let set_raises = self.check_raises(set_raises, &named())?;
                NodeKind::Attribute(AttributeDef {
                    ty: ty.clone(),
                    readonly: *readonly,
                    get_raises,
                    set_raises,
                })
            }
        })
    }

    /// Post-creation wiring that needs the allocated id.
    fn post_create(
        &mut self,
        scope: NodeId,
        id: NodeId,
        spec: &NodeSpec,
    ) -> Result<(), SemanticError> {
        match spec {
            NodeSpec::Enumerator { enum_node, .. } => {
                if let NodeKind::Enum(def) = self.node_mut(*enum_node).kind_mut() {
                    def.enumerators.push(id);
                }
            }
            NodeSpec::BitValue { .. } => {
                if let NodeKind::BitMask(def) = self.node_mut(scope).kind_mut() {
                    def.bitvalues.push(id);
                }
            }
            NodeSpec::TemplateParam { .. } => {
                if let NodeKind::TemplateModule(def) = self.node_mut(scope).kind_mut() {
                    def.template_params.push(id);
                }
            }
            NodeSpec::Home { base, interfaces, component, primary_key } => {
                self.wire_home(id, base, interfaces, component, primary_key)?;
            }
            NodeSpec::Component { base, interfaces, .. } => {
                if let Some(b) = base {
                    self.set_component_base(id, b)?;
                }
                self.add_supported_interfaces(id, interfaces)?;
            }
            NodeSpec::Connector { base } => {
                if let Some(b) = base {
                    self.set_component_base(id, b)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Kind-specific redefinition of an already-introduced name.
    fn redefine(
        &mut self,
        scope: NodeId,
        existing: NodeId,
        name: Identifier,
        spec: NodeSpec,
        annotations: Annotations,
    ) -> Result<NodeId, SemanticError> {
        let err_redefined = || SemanticError::Redefinition {
            name: name.as_str().to_string(),
        };
        let mismatch = |existing_kind: &'static str, scope_name: String| {
            SemanticError::AlreadyIntroduced {
                name: name.as_str().to_string(),
                existing: existing_kind.to_string(),
                scope: scope_name,
            }
        };

        match (self.node(existing).kind().clone(), &spec) {
            // module reopening extends the chain
            (NodeKind::Module(_), NodeSpec::Module) => {
                let kind = NodeKind::Module(ModuleDef {
                    anchor: Some(self.module_chain(existing)[0]),
                    next: None,
                    template: None,
                    template_args: Vec::new(),
                });
                let prefix = self.node(existing).prefix.clone();
                let node = Node {
                    name: Some(name.clone()),
                    parent: Some(scope),
                    annotations: Annotations::new(),
                    prefix,
                    repo_id: None,
                    repo_version: None,
                    children: Vec::new(),
                    introduced: IndexMap::new(),
                    kind,
                };
                let id = self.alloc(node);
                let chain = self.module_chain(existing);
                let last = chain[chain.len() - 1];
                if let NodeKind::Module(def) = self.node_mut(last).kind_mut() {
                    def.next = Some(id);
                }
                let anchor = chain[0];
                self.node_mut(anchor).annotations.concat(annotations);
                self.node_mut(scope).children.push(id);
                Ok(id)
            }
            // a file included twice resolves to the earlier include
            (NodeKind::Include(_), NodeSpec::Include { .. }) => Ok(existing),
            (NodeKind::Interface(old), NodeSpec::Interface { forward, is_abstract, is_local, is_pseudo }) => {
                if old.is_abstract != *is_abstract || old.is_local != *is_local {
                    return Err(SemanticError::InvalidBase {
                        name: name.as_str().to_string(),
                        reason: "interface attributes do not match forward declaration".into(),
                    });
                }
                if *forward {
                    return Ok(existing);
                }
                if !old.forward {
                    return Err(err_redefined());
                }
                self.complete_forward(existing, annotations);
                if let NodeKind::Interface(def) = self.node_mut(existing).kind_mut() {
                    def.forward = false;
                    def.is_pseudo = *is_pseudo;
                }
                Ok(existing)
            }
            (NodeKind::Component(old), NodeSpec::Component { forward, base, interfaces }) => {
                if *forward {
                    return Ok(existing);
                }
                if !old.forward {
                    return Err(err_redefined());
                }
                self.complete_forward(existing, annotations);
                if let NodeKind::Component(def) = self.node_mut(existing).kind_mut() {
                    def.forward = false;
                }
                if let Some(b) = base {
                    self.set_component_base(existing, b)?;
                }
                self.add_supported_interfaces(existing, interfaces)?;
                Ok(existing)
            }
            (
                NodeKind::Valuetype(old) | NodeKind::Eventtype(old),
                NodeSpec::Valuetype { forward, is_abstract, is_custom, is_truncatable, .. },
            ) => {
                if old.is_abstract != *is_abstract {
                    return Err(SemanticError::InvalidBase {
                        name: name.as_str().to_string(),
                        reason: "valuetype attributes do not match forward declaration".into(),
                    });
                }
                if *forward {
                    return Ok(existing);
                }
                if !old.forward {
                    return Err(err_redefined());
                }
                self.complete_forward(existing, annotations);
                match self.node_mut(existing).kind_mut() {
                    NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => {
                        def.forward = false;
                        def.is_custom = *is_custom;
                        def.is_truncatable = *is_truncatable;
                    }
                    _ => {}
                }
                Ok(existing)
            }
            (NodeKind::Struct(old), NodeSpec::Struct { forward, exception: false }) => {
                if *forward {
                    return Ok(existing);
                }
                if !old.forward {
                    return Err(err_redefined());
                }
                self.complete_forward(existing, annotations);
                if let NodeKind::Struct(def) = self.node_mut(existing).kind_mut() {
                    def.forward = false;
                }
                Ok(existing)
            }
            (NodeKind::Union(old), NodeSpec::Union { forward }) => {
                if *forward {
                    return Ok(existing);
                }
                if !old.forward {
                    return Err(err_redefined());
                }
                self.complete_forward(existing, annotations);
                if let NodeKind::Union(def) = self.node_mut(existing).kind_mut() {
                    def.forward = false;
                }
                Ok(existing)
            }
            (NodeKind::Operation(_), _) | (NodeKind::Attribute(_), _) => {
                Err(SemanticError::CannotOverride {
                    name: name.as_str().to_string(),
                    kind: self.node(existing).kind().name(),
                })
            }
            (old, _) => Err(mismatch(old.name(), self.scoped_name(scope))),
        }
    }

    fn complete_forward(&mut self, existing: NodeId, annotations: Annotations) {
        self.node_mut(existing).annotations.concat(annotations);
    }
}

/// A `default` label makes all other labels of the member redundant.
fn collapse_labels(labels: &[CaseLabel]) -> Vec<CaseLabel> {
    if labels.iter().any(|l| matches!(l, CaseLabel::Default)) {
        vec![CaseLabel::Default]
    } else {
        labels.to_vec()
    }
}
