//! Inheritance: interface/valuetype bases, component supports, ancestor
//! lookup through derived scopes.

use crate::ident::Identifier;
use crate::types::Type;

use super::{Ast, NodeId, NodeKind, SemanticError};

impl Ast {
    /// Direct bases of a derived scope, supported interfaces included.
    pub fn direct_bases(&self, id: NodeId) -> Vec<NodeId> {
        match self.node(id).kind() {
            NodeKind::Interface(def) => def.bases.clone(),
            NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => {
                let mut out = def.bases.clone();
                out.extend(def.interfaces.iter().copied());
                out
            }
            NodeKind::Component(def) => {
                let mut out: Vec<NodeId> = def.base.into_iter().collect();
                out.extend(def.interfaces.iter().copied());
                out
            }
            NodeKind::Home(def) => {
                let mut out: Vec<NodeId> = def.base.into_iter().collect();
                out.extend(def.interfaces.iter().copied());
                out
            }
            NodeKind::Connector(def) => def.base.into_iter().collect(),
            NodeKind::BitSet(def) => def.base.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Whether `ancestor` appears anywhere in `id`'s inheritance graph.
    pub fn has_ancestor(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut visited = Vec::new();
        let mut stack = self.direct_bases(id);
        while let Some(base) = stack.pop() {
            if base == ancestor {
                return true;
            }
            if visited.contains(&base) {
                continue;
            }
            visited.push(base);
            stack.extend(self.direct_bases(base));
        }
        false
    }

    /// Searches a name through all ancestors of a derived scope. A name
    /// found in more than one unrelated ancestor is ambiguous; reaching the
    /// same definition through a diamond is not.
    pub(crate) fn search_ancestors(
        &self,
        scope: NodeId,
        name: &Identifier,
    ) -> Result<Option<NodeId>, SemanticError> {
        let mut found: Option<NodeId> = None;
        for base in self.direct_bases(scope) {
            if let Some(hit) = self.search_self(base, name)? {
                match found {
                    None => found = Some(hit),
                    Some(prev) if prev != hit => {
                        return Err(SemanticError::AmbiguousName {
                            name: name.as_str().to_string(),
                            first: self.scoped_name(prev),
                            second: self.scoped_name(hit),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(found)
    }

    /// Operations and attributes a scope contributes to its derived scopes,
    /// own and inherited.
    fn operations_and_attributes(&self, id: NodeId, traversed: &mut Vec<NodeId>) -> Vec<NodeId> {
        if traversed.contains(&id) {
            return Vec::new();
        }
        traversed.push(id);
        let mut out: Vec<NodeId> = self
            .node(id)
            .children()
            .iter()
            .copied()
            .filter(|c| {
                matches!(
                    self.node(*c).kind(),
                    NodeKind::Operation(_) | NodeKind::Attribute(_)
                )
            })
            .collect();
        for base in self.direct_bases(id) {
            out.extend(self.operations_and_attributes(base, traversed));
        }
        out
    }

    /// Rejects a base whose operations or attributes collide with names
    /// already visible in the derived scope.
    fn check_duplicate_members(
        &self,
        scope: NodeId,
        base: NodeId,
    ) -> Result<(), SemanticError> {
        for member in self.operations_and_attributes(base, &mut Vec::new()) {
            let name = match &self.node(member).name {
                Some(n) => n.clone(),
                None => continue,
            };
            if let Some(found) = self.search_self(scope, &name)? {
                if found != member
                    && matches!(
                        self.node(found).kind(),
                        NodeKind::Operation(_) | NodeKind::Attribute(_)
                    )
                {
                    return Err(SemanticError::DuplicateInherited {
                        name: self.scoped_name(scope),
                        base: self.scoped_name(base),
                    });
                }
            }
        }
        Ok(())
    }

    /// Adds inherited interfaces to an interface definition.
    pub fn add_interface_bases(
        &mut self,
        iface: NodeId,
        bases: &[Type],
    ) -> Result<(), SemanticError> {
        let name = self.scoped_name(iface);
        let (is_abstract, is_local, is_pseudo) = match self.node(iface).kind() {
            NodeKind::Interface(def) => (def.is_abstract, def.is_local, def.is_pseudo),
            _ => return Err(SemanticError::InvalidReference { name }),
        };
        for base_ty in bases {
            // unbound template parameters are checked at instantiation
            if base_ty.is_template_param(self) {
                if let Some(param) = base_ty.resolved_node(self) {
                    if let NodeKind::Interface(def) = self.node_mut(iface).kind_mut() {
                        def.bases.push(param);
                    }
                }
                continue;
            }
            let base = base_ty
                .resolved_node(self)
                .filter(|n| matches!(self.node(*n).kind(), NodeKind::Interface(_)))
                .ok_or_else(|| SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: format!("{} is not an interface", base_ty.typename(self)),
                })?;
            if base == iface || self.has_ancestor(base, iface) {
                return Err(SemanticError::CircularInheritance {
                    name: name.clone(),
                    base: self.scoped_name(base),
                });
            }
            if !self.is_defined(base) {
                return Err(SemanticError::UndefinedBase {
                    name: name.clone(),
                    base: self.scoped_name(base),
                });
            }
            let base_def = match self.node(base).kind() {
                NodeKind::Interface(def) => def.clone(),
                _ => unreachable!(),
            };
            if base_def.is_local && !is_local {
                return Err(SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: format!(
                        "local interface {} can only be inherited by a local interface",
                        self.scoped_name(base)
                    ),
                });
            }
            if base_def.is_pseudo && !is_pseudo {
                return Err(SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: format!(
                        "pseudo interface {} can only be inherited by a pseudo interface",
                        self.scoped_name(base)
                    ),
                });
            }
            if is_abstract && !base_def.is_abstract {
                return Err(SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: "an abstract interface can only inherit abstract interfaces".into(),
                });
            }
            if is_local && base_def.is_abstract {
                return Err(SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: "a local interface cannot inherit an abstract interface".into(),
                });
            }
            let already = match self.node(iface).kind() {
                NodeKind::Interface(def) => def.bases.contains(&base),
                _ => false,
            };
            if already {
                return Err(SemanticError::DuplicateBase {
                    name: name.clone(),
                    base: self.scoped_name(base),
                });
            }
            // diamonds are fine; fresh bases must not collide
            if !self.has_ancestor(iface, base) {
                self.check_duplicate_members(iface, base)?;
            }
            if let NodeKind::Interface(def) = self.node_mut(iface).kind_mut() {
                def.bases.push(base);
            }
        }
        Ok(())
    }

    /// Adds inherited valuetypes to a valuetype definition.
    pub fn add_valuetype_bases(
        &mut self,
        vt: NodeId,
        bases: &[Type],
    ) -> Result<(), SemanticError> {
        let name = self.scoped_name(vt);
        let (is_abstract, is_custom) = match self.node(vt).kind() {
            NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => {
                (def.is_abstract, def.is_custom)
            }
            _ => return Err(SemanticError::InvalidReference { name }),
        };
        for (ix, base_ty) in bases.iter().enumerate() {
            if base_ty.is_template_param(self) {
                if let Some(param) = base_ty.resolved_node(self) {
                    self.push_valuetype_base(vt, param);
                }
                continue;
            }
            let base = base_ty
                .resolved_node(self)
                .filter(|n| {
                    matches!(
                        self.node(*n).kind(),
                        NodeKind::Valuetype(_) | NodeKind::Eventtype(_)
                    )
                })
                .ok_or_else(|| SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: format!("{} is not a valuetype", base_ty.typename(self)),
                })?;
            if base == vt || self.has_ancestor(base, vt) {
                return Err(SemanticError::CircularInheritance {
                    name: name.clone(),
                    base: self.scoped_name(base),
                });
            }
            if !self.is_defined(base) {
                return Err(SemanticError::UndefinedBase {
                    name: name.clone(),
                    base: self.scoped_name(base),
                });
            }
            let (base_abstract, base_custom) = match self.node(base).kind() {
                NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => {
                    (def.is_abstract, def.is_custom)
                }
                _ => unreachable!(),
            };
            if is_abstract && !base_abstract {
                return Err(SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: "an abstract valuetype can only inherit abstract valuetypes".into(),
                });
            }
            if base_custom && !is_custom {
                return Err(SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: "only custom valuetypes can inherit a custom valuetype".into(),
                });
            }
            if !base_abstract && ix != 0 {
                return Err(SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: "a concrete base valuetype must be the first base".into(),
                });
            }
            let dup = match self.node(vt).kind() {
                NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => def.bases.contains(&base),
                _ => false,
            };
            if dup {
                return Err(SemanticError::DuplicateBase {
                    name: name.clone(),
                    base: self.scoped_name(base),
                });
            }
            self.push_valuetype_base(vt, base);
        }
        Ok(())
    }

    fn push_valuetype_base(&mut self, vt: NodeId, base: NodeId) {
        match self.node_mut(vt).kind_mut() {
            NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => def.bases.push(base),
            _ => {}
        }
    }

    /// Concrete (non-abstract) interface supported by a valuetype, if any.
    fn supported_concrete_interface(&self, vt: NodeId) -> Option<NodeId> {
        let interfaces = match self.node(vt).kind() {
            NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => def.interfaces.clone(),
            _ => return None,
        };
        interfaces.into_iter().find(|i| {
            matches!(self.node(*i).kind(), NodeKind::Interface(def) if !def.is_abstract)
        })
    }

    /// Adds supported interfaces to a valuetype definition.
    pub fn add_valuetype_interfaces(
        &mut self,
        vt: NodeId,
        interfaces: &[Type],
    ) -> Result<(), SemanticError> {
        let name = self.scoped_name(vt);
        for (ix, intf_ty) in interfaces.iter().enumerate() {
            if intf_ty.is_template_param(self) {
                if let Some(param) = intf_ty.resolved_node(self) {
                    match self.node_mut(vt).kind_mut() {
                        NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => {
                            def.interfaces.push(param);
                        }
                        _ => {}
                    }
                }
                continue;
            }
            let intf = intf_ty
                .resolved_node(self)
                .filter(|n| matches!(self.node(*n).kind(), NodeKind::Interface(_)))
                .ok_or_else(|| SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: format!("{} is not an interface", intf_ty.typename(self)),
                })?;
            if !self.is_defined(intf) {
                return Err(SemanticError::UndefinedBase {
                    name: name.clone(),
                    base: self.scoped_name(intf),
                });
            }
            let concrete = matches!(
                self.node(intf).kind(),
                NodeKind::Interface(def) if !def.is_abstract
            );
            if concrete {
                if ix != 0 {
                    return Err(SemanticError::InvalidBase {
                        name: name.clone(),
                        reason: "a supported concrete interface must be the first".into(),
                    });
                }
                // must be compatible with concrete interfaces inherited
                // through base valuetypes
                let bases = match self.node(vt).kind() {
                    NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => def.bases.clone(),
                    _ => Vec::new(),
                };
                for base in bases {
                    if let Some(inherited) = self.supported_concrete_interface(base) {
                        if intf != inherited && !self.has_ancestor(intf, inherited) {
                            return Err(SemanticError::InvalidBase {
                                name: name.clone(),
                                reason: format!(
                                    "supported interface {} is not derived from {}",
                                    self.scoped_name(intf),
                                    self.scoped_name(inherited)
                                ),
                            });
                        }
                    }
                }
            }
            let dup = match self.node(vt).kind() {
                NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => {
                    def.interfaces.contains(&intf)
                }
                _ => false,
            };
            if dup {
                return Err(SemanticError::DuplicateBase {
                    name: name.clone(),
                    base: self.scoped_name(intf),
                });
            }
            match self.node_mut(vt).kind_mut() {
                NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => def.interfaces.push(intf),
                _ => {}
            }
        }
        Ok(())
    }

    /// Sets the base of a component, connector or home; the base must be of
    /// the same kind and the inheritance acyclic.
    pub(crate) fn set_component_base(
        &mut self,
        id: NodeId,
        base_ty: &Type,
    ) -> Result<(), SemanticError> {
        let name = self.scoped_name(id);
        if base_ty.is_template_param(self) {
            if let Some(param) = base_ty.resolved_node(self) {
                self.store_component_base(id, param);
            }
            return Ok(());
        }
        let base = base_ty.resolved_node(self).ok_or_else(|| {
            SemanticError::InvalidBase {
                name: name.clone(),
                reason: format!("{} cannot be a base here", base_ty.typename(self)),
            }
        })?;
        let same_kind = matches!(
            (self.node(id).kind(), self.node(base).kind()),
            (NodeKind::Component(_), NodeKind::Component(_))
                | (NodeKind::Connector(_), NodeKind::Connector(_))
                | (NodeKind::Home(_), NodeKind::Home(_))
        );
        if !same_kind {
            return Err(SemanticError::InvalidBase {
                name: name.clone(),
                reason: format!(
                    "{} is not a {}",
                    self.scoped_name(base),
                    self.node(id).kind().name()
                ),
            });
        }
        if base == id || self.has_ancestor(base, id) {
            return Err(SemanticError::CircularInheritance {
                name: name.clone(),
                base: self.scoped_name(base),
            });
        }
        if matches!(self.node(id).kind(), NodeKind::Component(_)) && !self.is_defined(base) {
            return Err(SemanticError::UndefinedBase {
                name,
                base: self.scoped_name(base),
            });
        }
        self.store_component_base(id, base);
        Ok(())
    }

    fn store_component_base(&mut self, id: NodeId, base: NodeId) {
        match self.node_mut(id).kind_mut() {
            NodeKind::Component(def) => def.base = Some(base),
            NodeKind::Connector(def) => def.base = Some(base),
            NodeKind::Home(def) => def.base = Some(base),
            _ => {}
        }
    }

    /// Adds `supports` interfaces to a component or home.
    pub(crate) fn add_supported_interfaces(
        &mut self,
        id: NodeId,
        interfaces: &[Type],
    ) -> Result<(), SemanticError> {
        let name = self.scoped_name(id);
        for intf_ty in interfaces {
            if intf_ty.is_template_param(self) {
                if let Some(param) = intf_ty.resolved_node(self) {
                    self.store_supported_interface(id, param);
                }
                continue;
            }
            let intf = intf_ty
                .resolved_node(self)
                .filter(|n| matches!(self.node(*n).kind(), NodeKind::Interface(_)))
                .ok_or_else(|| SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: format!("{} is not an interface", intf_ty.typename(self)),
                })?;
            if !self.is_defined(intf) {
                return Err(SemanticError::UndefinedBase {
                    name: name.clone(),
                    base: self.scoped_name(intf),
                });
            }
            if let NodeKind::Interface(def) = self.node(intf).kind() {
                if def.is_local || def.is_pseudo {
                    return Err(SemanticError::InvalidBase {
                        name: name.clone(),
                        reason: format!(
                            "{} interface {} cannot be supported",
                            if def.is_local { "local" } else { "pseudo" },
                            self.scoped_name(intf)
                        ),
                    });
                }
            }
            let dup = match self.node(id).kind() {
                NodeKind::Component(def) => def.interfaces.contains(&intf),
                NodeKind::Home(def) => def.interfaces.contains(&intf),
                _ => false,
            };
            if dup {
                return Err(SemanticError::DuplicateBase {
                    name: name.clone(),
                    base: self.scoped_name(intf),
                });
            }
            self.check_duplicate_members(id, intf)?;
            self.store_supported_interface(id, intf);
        }
        Ok(())
    }

    fn store_supported_interface(&mut self, id: NodeId, intf: NodeId) {
        match self.node_mut(id).kind_mut() {
            NodeKind::Component(def) => def.interfaces.push(intf),
            NodeKind::Home(def) => def.interfaces.push(intf),
            _ => {}
        }
    }

    /// Wires a home's base, supports, managed component and primary key.
    pub(crate) fn wire_home(
        &mut self,
        home: NodeId,
        base: &Option<Type>,
        interfaces: &[Type],
        component: &Type,
        primary_key: &Option<Type>,
    ) -> Result<(), SemanticError> {
        let name = self.scoped_name(home);
        if let Some(b) = base {
            self.set_component_base(home, b)?;
        }
        self.add_supported_interfaces(home, interfaces)?;

        if component.is_template_param(self) {
            if let Some(param) = component.resolved_node(self) {
                if let NodeKind::Home(def) = self.node_mut(home).kind_mut() {
                    def.component = Some(param);
                }
            }
        } else {
            let comp = component
                .resolved_node(self)
                .filter(|n| matches!(self.node(*n).kind(), NodeKind::Component(_)))
                .ok_or_else(|| SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: format!("{} is not a component", component.typename(self)),
                })?;
            if !self.is_defined(comp) {
                return Err(SemanticError::UndefinedBase {
                    name: name.clone(),
                    base: self.scoped_name(comp),
                });
            }
            if let NodeKind::Home(def) = self.node_mut(home).kind_mut() {
                def.component = Some(comp);
            }
        }

        if let Some(pk) = primary_key {
            let key = pk
                .resolved_node(self)
                .filter(|n| {
                    matches!(
                        self.node(*n).kind(),
                        NodeKind::Valuetype(_) | NodeKind::Eventtype(_) | NodeKind::TemplateParam(_)
                    )
                })
                .ok_or_else(|| SemanticError::InvalidBase {
                    name: name.clone(),
                    reason: format!("primary key {} is not a valuetype", pk.typename(self)),
                })?;
            if let NodeKind::Home(def) = self.node_mut(home).kind_mut() {
                def.primary_key = Some(key);
            }
        }
        Ok(())
    }

    /// Sets single struct inheritance; the base must be a defined struct.
    pub fn set_struct_base(&mut self, id: NodeId, base_ty: &Type) -> Result<(), SemanticError> {
        let name = self.scoped_name(id);
        if base_ty.is_template_param(self) {
            if let Some(param) = base_ty.resolved_node(self) {
                if let NodeKind::Struct(def) = self.node_mut(id).kind_mut() {
                    def.base = Some(param);
                }
            }
            return Ok(());
        }
        let base = base_ty
            .resolved_node(self)
            .filter(|n| matches!(self.node(*n).kind(), NodeKind::Struct(_)))
            .ok_or_else(|| SemanticError::InvalidBase {
                name: name.clone(),
                reason: format!("{} is not a struct", base_ty.typename(self)),
            })?;
        if !self.is_defined(base) {
            return Err(SemanticError::UndefinedBase {
                name,
                base: self.scoped_name(base),
            });
        }
        if let NodeKind::Struct(def) = self.node_mut(id).kind_mut() {
            def.base = Some(base);
        }
        Ok(())
    }

    /// Validates a template module reference before it is recorded.
    pub(crate) fn check_template_reference(
        &self,
        template: NodeId,
        params: &[NodeId],
    ) -> Result<(), SemanticError> {
        if !matches!(self.node(template).kind(), NodeKind::TemplateModule(_)) {
            return Err(SemanticError::InvalidReference {
                name: self.scoped_name(template),
            });
        }
        for p in params {
            if !matches!(self.node(*p).kind(), NodeKind::TemplateParam(_)) {
                return Err(SemanticError::InvalidReference {
                    name: self.scoped_name(*p),
                });
            }
        }
        Ok(())
    }
}
