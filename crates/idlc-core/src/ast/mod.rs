//! Arena-based AST and symbol table.
//!
//! All definitions live in one flat arena owned by [`Ast`]; nodes refer to
//! each other through [`NodeId`] handles. Name lookup, definition policy,
//! inheritance and template instantiation are implemented on `Ast` so every
//! operation has the whole arena at hand.

mod define;
mod error;
mod inherit;
mod members;
mod template;
mod visitor;

#[cfg(test)]
mod define_tests;
#[cfg(test)]
mod inherit_tests;
#[cfg(test)]
mod template_tests;

pub use define::NodeSpec;
pub use error::SemanticError;
pub use members::{CaseLabel, ExpandedAttribute, ExpandedPort};
pub use template::{Concrete, InstantiationContext};
pub use visitor::Visitor;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::annotations::Annotations;
use crate::expr::Expr;
use crate::ident::Identifier;
use crate::types::Type;
use crate::value::Value;

/// Handle into the AST arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Port categories of a `porttype`/`component` port declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    Facet,
    Receptacle,
    Emitter,
    Publisher,
    Consumer,
    Port,
    MirrorPort,
}

impl PortKind {
    /// The mirrored kind in a mirror port expansion.
    pub fn mirror(self) -> PortKind {
        match self {
            PortKind::Facet => PortKind::Receptacle,
            PortKind::Receptacle => PortKind::Facet,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDef {
    /// First reopening of this module, when reopened.
    pub anchor: Option<NodeId>,
    /// Next reopening in the chain.
    pub next: Option<NodeId>,
    /// Source template for instantiated modules.
    pub template: Option<NodeId>,
    pub template_args: Vec<Concrete>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateModuleDef {
    pub template_params: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateModuleRefDef {
    pub template: NodeId,
    pub params: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParamDef {
    pub ty: Type,
    pub concrete: Option<Concrete>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeDef {
    pub filename: String,
    pub fullpath: String,
    pub defined: bool,
    pub preprocessed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDef {
    /// Only forward-declared so far.
    pub forward: bool,
    /// Body complete.
    pub defined: bool,
    pub is_abstract: bool,
    pub is_local: bool,
    pub is_pseudo: bool,
    pub bases: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomeDef {
    pub base: Option<NodeId>,
    pub interfaces: Vec<NodeId>,
    pub component: Option<NodeId>,
    pub primary_key: Option<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    pub forward: bool,
    pub defined: bool,
    pub base: Option<NodeId>,
    pub interfaces: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDef {
    pub base: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDef {
    pub kind: PortKind,
    pub ty: Type,
    pub multiple: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueboxDef {
    pub ty: Type,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuetypeDef {
    pub forward: bool,
    pub defined: bool,
    pub is_abstract: bool,
    pub is_custom: bool,
    pub is_truncatable: bool,
    pub bases: Vec<NodeId>,
    pub interfaces: Vec<NodeId>,
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMemberDef {
    pub ty: Type,
    pub is_public: bool,
    pub is_recursive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitializerDef {
    pub raises: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDef {
    pub ty: Type,
    pub expr: Expr,
    /// Narrowed value; absent inside template modules.
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructDef {
    pub forward: bool,
    pub defined: bool,
    pub recursive: bool,
    pub base: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDef {
    pub ty: Type,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnionDef {
    pub forward: bool,
    pub defined: bool,
    pub recursive: bool,
    pub switchtype: Option<Type>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionMemberDef {
    pub ty: Type,
    pub labels: Vec<CaseLabel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub enumerators: Vec<NodeId>,
    /// Bit bound from `@bit_bound`, default 32.
    pub bitbound: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumeratorDef {
    pub enum_node: NodeId,
    pub value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BitMaskDef {
    pub bitvalues: Vec<NodeId>,
    /// Bit bound from `@bit_bound`; defaults to the number of bit values.
    pub bitbound: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitValueDef {
    pub position: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BitSetDef {
    pub base: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitFieldDef {
    pub bits: u16,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedefDef {
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDef {
    pub oneway: bool,
    pub ret: Type,
    pub raises: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub direction: ParamDirection,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub ty: Type,
    pub readonly: bool,
    pub get_raises: Vec<NodeId>,
    pub set_raises: Vec<NodeId>,
}

/// Closed sum of all definition kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Module(ModuleDef),
    TemplateModule(TemplateModuleDef),
    TemplateModuleReference(TemplateModuleRefDef),
    TemplateParam(TemplateParamDef),
    Include(IncludeDef),
    Interface(InterfaceDef),
    Home(HomeDef),
    Component(ComponentDef),
    Connector(ConnectorDef),
    Porttype,
    Port(PortDef),
    Valuebox(ValueboxDef),
    Valuetype(ValuetypeDef),
    Eventtype(ValuetypeDef),
    StateMember(StateMemberDef),
    Initializer(InitializerDef),
    Finder(InitializerDef),
    Const(ConstDef),
    Struct(StructDef),
    Exception(StructDef),
    Member(MemberDef),
    Union(UnionDef),
    UnionMember(UnionMemberDef),
    Enum(EnumDef),
    Enumerator(EnumeratorDef),
    BitMask(BitMaskDef),
    BitValue(BitValueDef),
    BitSet(BitSetDef),
    BitField(BitFieldDef),
    Typedef(TypedefDef),
    Operation(OperationDef),
    Parameter(ParameterDef),
    Attribute(AttributeDef),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Module(_) => "module",
            NodeKind::TemplateModule(_) => "template module",
            NodeKind::TemplateModuleReference(_) => "template module reference",
            NodeKind::TemplateParam(_) => "template parameter",
            NodeKind::Include(_) => "include",
            NodeKind::Interface(_) => "interface",
            NodeKind::Home(_) => "home",
            NodeKind::Component(_) => "component",
            NodeKind::Connector(_) => "connector",
            NodeKind::Porttype => "porttype",
            NodeKind::Port(_) => "port",
            NodeKind::Valuebox(_) => "valuebox",
            NodeKind::Valuetype(_) => "valuetype",
            NodeKind::Eventtype(_) => "eventtype",
            NodeKind::StateMember(_) => "state member",
            NodeKind::Initializer(_) => "initializer",
            NodeKind::Finder(_) => "finder",
            NodeKind::Const(_) => "const",
            NodeKind::Struct(_) => "struct",
            NodeKind::Exception(_) => "exception",
            NodeKind::Member(_) => "member",
            NodeKind::Union(_) => "union",
            NodeKind::UnionMember(_) => "union member",
            NodeKind::Enum(_) => "enum",
            NodeKind::Enumerator(_) => "enumerator",
            NodeKind::BitMask(_) => "bitmask",
            NodeKind::BitValue(_) => "bitvalue",
            NodeKind::BitSet(_) => "bitset",
            NodeKind::BitField(_) => "bitfield",
            NodeKind::Typedef(_) => "typedef",
            NodeKind::Operation(_) => "operation",
            NodeKind::Parameter(_) => "parameter",
            NodeKind::Attribute(_) => "attribute",
        }
    }
}

/// One definition in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Anonymous for the global root and unnamed bitfields.
    pub name: Option<Identifier>,
    pub parent: Option<NodeId>,
    pub annotations: Annotations,
    pub prefix: Option<String>,
    repo_id: Option<String>,
    repo_version: Option<String>,
    pub(crate) children: Vec<NodeId>,
    /// Names visible in this scope, keyed case-insensitively.
    pub(crate) introduced: IndexMap<String, NodeId>,
    kind: NodeKind,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn name_str(&self) -> &str {
        self.name.as_ref().map(Identifier::as_str).unwrap_or("")
    }

    pub(crate) fn key(&self) -> Option<String> {
        self.name.as_ref().map(Identifier::key)
    }

    pub fn repo_id(&self) -> Option<&str> {
        self.repo_id.as_deref()
    }

    pub fn repo_version(&self) -> Option<&str> {
        self.repo_version.as_deref()
    }
}

/// The AST arena plus the global root module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Ast {
    fn default() -> Self {
        Ast::new()
    }
}

impl Ast {
    pub fn new() -> Ast {
        let root = Node {
            name: None,
            parent: None,
            annotations: Annotations::new(),
            prefix: None,
            repo_id: None,
            repo_version: None,
            children: Vec::new(),
            introduced: IndexMap::new(),
            kind: NodeKind::Module(ModuleDef::default()),
        };
        Ast { nodes: vec![root], root: NodeId(0) }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Enclosing scope chain from the root down to `id`, named nodes only.
    /// Includes are transparent and do not contribute a scope.
    pub fn scopes(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = self.node(n);
            if node.name.is_some() && !matches!(node.kind, NodeKind::Include(_)) {
                out.push(n);
            }
            cur = node.parent;
        }
        out.reverse();
        out
    }

    /// Fully scoped name, `::`-separated. The root yields an empty string.
    pub fn scoped_name(&self, id: NodeId) -> String {
        self.scopes(id)
            .iter()
            .map(|n| self.node(*n).name_str())
            .collect::<Vec<_>>()
            .join("::")
    }

    /// Repository id, either the pragma override or the derived
    /// `IDL:[prefix/]scoped/name:version` form.
    pub fn repository_id(&self, id: NodeId) -> String {
        let node = self.node(id);
        if let Some(rid) = &node.repo_id {
            return rid.clone();
        }
        let scoped = self
            .scopes(id)
            .iter()
            .map(|n| self.node(*n).name_str())
            .collect::<Vec<_>>()
            .join("/");
        let version = node.repo_version.as_deref().unwrap_or("1.0");
        match &node.prefix {
            Some(p) if !p.is_empty() => format!("IDL:{p}/{scoped}:{version}"),
            _ => format!("IDL:{scoped}:{version}"),
        }
    }

    /// Sets an explicit repository id (`#pragma ID` / `@typeid`).
    /// IDL-format ids are checked against the allowed character set;
    /// other formats (`DCE:`, `LOCAL:`, ...) pass through untouched.
    pub fn set_repo_id(&mut self, id: NodeId, rid: &str) -> Result<(), SemanticError> {
        let name = self.scoped_name(id);
        if let Some(rest) = rid.strip_prefix("IDL:") {
            let body = rest.rsplit_once(':').map_or(rest, |(body, _)| body);
            let valid = !body.starts_with('/')
                && !body.ends_with('/')
                && body
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/'));
            if !valid {
                return Err(SemanticError::InvalidRepoId { name, id: rid.to_string() });
            }
        }
        let node = self.node_mut(id);
        if let Some(ver) = &node.repo_version {
            let id_ver = rid.rsplit(':').next().unwrap_or("");
            if id_ver != ver {
                return Err(SemanticError::RepoVersionConflict {
                    name,
                    id: rid.to_string(),
                    version: ver.clone(),
                });
            }
        }
        if let Some(existing) = &node.repo_id {
            if existing != rid {
                return Err(SemanticError::RepoIdConflict {
                    name,
                    existing: existing.clone(),
                    new_id: rid.to_string(),
                });
            }
        }
        node.repo_id = Some(rid.to_string());
        Ok(())
    }

    /// Sets the repository version (`#pragma version`).
    pub fn set_repo_version(&mut self, id: NodeId, version: &str) -> Result<(), SemanticError> {
        let name = self.scoped_name(id);
        let node = self.node_mut(id);
        if let Some(rid) = &node.repo_id {
            let id_ver = rid.rsplit(':').next().unwrap_or("");
            if id_ver != version {
                return Err(SemanticError::RepoVersionConflict {
                    name,
                    id: rid.clone(),
                    version: version.to_string(),
                });
            }
        }
        node.repo_version = Some(version.to_string());
        Ok(())
    }

    /// Sets the repository id prefix for a scope and everything below it.
    pub fn set_prefix(&mut self, id: NodeId, prefix: Option<&str>) -> Result<(), SemanticError> {
        if let Some(p) = prefix {
            let valid = !p.starts_with('/')
                && !p.ends_with('/')
                && p.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/'));
            if !valid {
                return Err(SemanticError::InvalidPrefix { prefix: p.to_string() });
            }
        }
        let chain = self.module_chain(id);
        for link in chain {
            self.replace_prefix(link, prefix);
        }
        Ok(())
    }

    fn replace_prefix(&mut self, id: NodeId, prefix: Option<&str>) {
        self.node_mut(id).prefix = prefix.map(str::to_string);
        let children = self.node(id).children.clone();
        for child in children {
            self.replace_prefix(child, prefix);
        }
    }

    /// All reopenings of a module, or just the node itself for non-modules.
    pub fn module_chain(&self, id: NodeId) -> Vec<NodeId> {
        let anchor = match self.node(id).kind() {
            NodeKind::Module(def) => def.anchor.unwrap_or(id),
            _ => return vec![id],
        };
        let mut out = vec![anchor];
        let mut cur = anchor;
        while let NodeKind::Module(def) = self.node(cur).kind() {
            match def.next {
                Some(next) => {
                    out.push(next);
                    cur = next;
                }
                None => break,
            }
        }
        out
    }

    /// The type a named definition stands for when referenced, if any.
    /// Typedefs and template parameters yield the aliased/declared type.
    pub fn node_type(&self, id: NodeId) -> Option<Type> {
        match self.node(id).kind() {
            NodeKind::Typedef(def) => Some(def.ty.clone()),
            NodeKind::TemplateParam(def) => Some(def.ty.clone()),
            NodeKind::Interface(_) => Some(Type::Interface(id)),
            NodeKind::Home(_) => Some(Type::Home(id)),
            NodeKind::Component(_) => Some(Type::Component(id)),
            NodeKind::Porttype => Some(Type::Porttype(id)),
            NodeKind::TemplateModule(_) => Some(Type::TemplateModule(id)),
            NodeKind::Valuebox(_) => Some(Type::Valuebox(id)),
            NodeKind::Valuetype(_) => Some(Type::Valuetype(id)),
            NodeKind::Eventtype(_) => Some(Type::Eventtype(id)),
            NodeKind::Struct(_) => Some(Type::Struct(id)),
            NodeKind::Exception(_) => Some(Type::Exception(id)),
            NodeKind::Union(_) => Some(Type::Union(id)),
            NodeKind::Enum(_) => Some(Type::Enum(id)),
            NodeKind::BitMask(_) => Some(Type::BitMask(id)),
            NodeKind::BitSet(_) => Some(Type::BitSet(id)),
            _ => None,
        }
    }

    pub fn is_template_node(&self, id: NodeId) -> bool {
        matches!(
            self.node(id).kind(),
            NodeKind::TemplateParam(_) | NodeKind::TemplateModule(_)
        )
    }

    /// Marks a forward-declarable definition's body complete.
    pub fn mark_defined(&mut self, id: NodeId) {
        match self.node_mut(id).kind_mut() {
            NodeKind::Interface(def) => def.defined = true,
            NodeKind::Component(def) => def.defined = true,
            NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => def.defined = true,
            NodeKind::Struct(def) | NodeKind::Exception(def) => def.defined = true,
            NodeKind::Union(def) => def.defined = true,
            NodeKind::Include(def) => def.defined = true,
            _ => {}
        }
    }

    /// Whether a forward-declarable definition has been completed.
    pub fn is_defined(&self, id: NodeId) -> bool {
        match self.node(id).kind() {
            NodeKind::Interface(def) => def.defined,
            NodeKind::Component(def) => def.defined,
            NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => def.defined,
            NodeKind::Struct(def) | NodeKind::Exception(def) => def.defined,
            NodeKind::Union(def) => def.defined,
            NodeKind::Include(def) => def.defined,
            _ => true,
        }
    }

    pub fn enumerator_count(&self, id: NodeId) -> u32 {
        match self.node(id).kind() {
            NodeKind::Enum(def) => def.enumerators.len() as u32,
            _ => 0,
        }
    }

    pub fn interface_is_local(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind(), NodeKind::Interface(def) if def.is_local)
    }

    /// Whether any member type of a constructed type is local, guarding
    /// against recursive type definitions.
    pub(crate) fn members_are_local(&self, id: NodeId, recurstk: &mut Vec<NodeId>) -> bool {
        if let NodeKind::Valuebox(def) = self.node(id).kind() {
            return def.ty.resolved(self).is_local_guarded(self, recurstk);
        }
        if recurstk.contains(&id) {
            return false;
        }
        recurstk.push(id);
        let mut local = false;
        for child in self.node(id).children.clone() {
            let ty = match self.node(child).kind() {
                NodeKind::Member(def) => def.ty.clone(),
                NodeKind::UnionMember(def) => def.ty.clone(),
                NodeKind::StateMember(def) => def.ty.clone(),
                _ => continue,
            };
            if ty.resolved(self).is_local_guarded(self, recurstk) {
                local = true;
                break;
            }
        }
        recurstk.pop();
        local
    }
}
