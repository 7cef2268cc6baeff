//! Template modules: parameter binding and module instantiation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::annotations::Annotations;
use crate::ident::Identifier;
use crate::types::Type;

use super::{
    Ast, ConstDef, ModuleDef, Node, NodeId, NodeKind, SemanticError,
};

/// A concrete template argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Concrete {
    Node(NodeId),
    Type(Type),
    Expr(crate::expr::Expr),
}

/// Bindings used while instantiating a template module: template
/// parameters to arguments, and template-internal nodes to their copies.
#[derive(Debug, Clone, Default)]
pub struct InstantiationContext {
    map: IndexMap<NodeId, Concrete>,
}

impl InstantiationContext {
    pub fn new() -> Self {
        InstantiationContext { map: IndexMap::new() }
    }

    pub fn bind(&mut self, param: NodeId, concrete: Concrete) {
        self.map.insert(param, concrete);
    }

    /// The concrete argument bound to a template parameter.
    pub fn concrete_for(&self, ast: &Ast, param: NodeId) -> Result<Concrete, SemanticError> {
        if let Some(c) = self.map.get(&param) {
            return Ok(c.clone());
        }
        if let NodeKind::TemplateParam(def) = ast.node(param).kind() {
            if let Some(c) = &def.concrete {
                return Ok(c.clone());
            }
        }
        Err(SemanticError::MissingTemplateParameter {
            param: ast.scoped_name(param),
        })
    }

    /// The copy of a template-internal node, when one was made.
    fn node_for(&self, id: NodeId) -> Option<NodeId> {
        match self.map.get(&id) {
            Some(Concrete::Node(n)) => Some(*n),
            _ => None,
        }
    }

    fn remap_id(&self, id: NodeId) -> NodeId {
        self.node_for(id).unwrap_or(id)
    }

    fn remap_ids(&self, ids: &[NodeId]) -> Vec<NodeId> {
        ids.iter().map(|i| self.remap_id(*i)).collect()
    }

    /// Rewrites node references inside a type to their instantiated copies.
    fn remap_type(&self, ty: Type) -> Type {
        match ty {
            Type::ScopedName(n) => Type::ScopedName(self.remap_id(n)),
            Type::Interface(n) => Type::Interface(self.remap_id(n)),
            Type::Home(n) => Type::Home(self.remap_id(n)),
            Type::Component(n) => Type::Component(self.remap_id(n)),
            Type::Porttype(n) => Type::Porttype(self.remap_id(n)),
            Type::TemplateModule(n) => Type::TemplateModule(self.remap_id(n)),
            Type::Valuebox(n) => Type::Valuebox(self.remap_id(n)),
            Type::Valuetype(n) => Type::Valuetype(self.remap_id(n)),
            Type::Eventtype(n) => Type::Eventtype(self.remap_id(n)),
            Type::Struct(n) => Type::Struct(self.remap_id(n)),
            Type::Exception(n) => Type::Exception(self.remap_id(n)),
            Type::Union(n) => Type::Union(self.remap_id(n)),
            Type::Enum(n) => Type::Enum(self.remap_id(n)),
            Type::BitMask(n) => Type::BitMask(self.remap_id(n)),
            Type::BitSet(n) => Type::BitSet(self.remap_id(n)),
            Type::Sequence { elem, bound } => Type::Sequence {
                elem: Box::new(self.remap_type(*elem)),
                bound,
            },
            Type::Array { elem, sizes } => Type::Array {
                elem: Box::new(self.remap_type(*elem)),
                sizes,
            },
            Type::Const(inner) => Type::Const(Box::new(self.remap_type(*inner))),
            other => other,
        }
    }
}

impl Ast {
    /// Whether a template parameter's bound argument matches a given type.
    pub fn concrete_matches(&self, param: NodeId, ty: &Type) -> bool {
        let concrete = match self.node(param).kind() {
            NodeKind::TemplateParam(def) => def.concrete.clone(),
            _ => None,
        };
        match concrete {
            Some(Concrete::Type(t)) => t.resolved(self).matches(self, &ty.resolved(self)),
            Some(Concrete::Node(n)) => ty.resolved_node(self) == Some(n),
            _ => false,
        }
    }

    /// Instantiates a template module: validates the arguments against the
    /// template's parameters, creates the instance module in `scope` and
    /// deep-copies the template's members into it.
    pub fn instantiate_template_module(
        &mut self,
        scope: NodeId,
        name: Identifier,
        template: NodeId,
        args: Vec<Concrete>,
        annotations: Annotations,
    ) -> Result<NodeId, SemanticError> {
        let params = match self.node(template).kind() {
            NodeKind::TemplateModule(def) => def.template_params.clone(),
            _ => {
                return Err(SemanticError::InvalidReference {
                    name: self.scoped_name(template),
                });
            }
        };
        if args.len() > params.len() {
            return Err(SemanticError::TemplateParamMismatch {
                param: self.scoped_name(template),
                reason: format!("expected {} arguments, got {}", params.len(), args.len()),
            });
        }

        let mut ctx = InstantiationContext::new();
        for (ix, param) in params.iter().enumerate() {
            let arg = args.get(ix).cloned().ok_or_else(|| {
                SemanticError::MissingTemplateParameter {
                    param: self.scoped_name(*param),
                }
            })?;
            let checked = self.check_template_argument(&ctx, *param, arg)?;
            if let NodeKind::TemplateParam(def) = self.node_mut(*param).kind_mut() {
                def.concrete = Some(checked.clone());
            }
            ctx.bind(*param, checked);
        }

        let instance = {
            let prefix = self.node(scope).prefix.clone();
            let node = Node {
                name: Some(name.clone()),
                parent: Some(scope),
                annotations,
                prefix,
                repo_id: None,
                repo_version: None,
                children: Vec::new(),
                introduced: IndexMap::new(),
                kind: NodeKind::Module(ModuleDef {
                    anchor: None,
                    next: None,
                    template: Some(template),
                    template_args: args,
                }),
            };
            let id = self.alloc(node);
            self.introduce(scope, &name, id)?;
            self.node_mut(scope).children.push(id);
            id
        };

        for child in self.node(template).children.clone() {
            if matches!(self.node(child).kind(), NodeKind::TemplateParam(_)) {
                continue;
            }
            self.copy_node(&mut ctx, child, instance)?;
        }

        self.fixup_copied_ids(&ctx);

        // the parameters only hold their bindings for this instantiation
        for param in params {
            if let NodeKind::TemplateParam(def) = self.node_mut(param).kind_mut() {
                def.concrete = None;
            }
        }
        Ok(instance)
    }

    /// Validates one template argument against its parameter declaration.
    fn check_template_argument(
        &mut self,
        ctx: &InstantiationContext,
        param: NodeId,
        arg: Concrete,
    ) -> Result<Concrete, SemanticError> {
        let param_ty = match self.node(param).kind() {
            NodeKind::TemplateParam(def) => def.ty.clone(),
            _ => {
                return Err(SemanticError::InvalidReference {
                    name: self.scoped_name(param),
                });
            }
        };
        let param_name = self.scoped_name(param);

        if let Type::Const(inner) = &param_ty {
            let expr = match arg {
                Concrete::Expr(e) => e,
                _ => {
                    return Err(SemanticError::TemplateParamMismatch {
                        param: param_name,
                        reason: "expected a constant expression".into(),
                    });
                }
            };
            let value = expr.value().cloned().ok_or_else(|| {
                SemanticError::TemplateParamMismatch {
                    param: param_name.clone(),
                    reason: "constant argument has no value".into(),
                }
            })?;
            inner.narrow(self, value)?;
            return Ok(Concrete::Expr(expr));
        }

        let arg_ty = match &arg {
            Concrete::Type(t) => t.clone(),
            Concrete::Node(n) => self.node_type(*n).ok_or_else(|| {
                SemanticError::TemplateParamMismatch {
                    param: param_name.clone(),
                    reason: "argument is not a type".into(),
                }
            })?,
            Concrete::Expr(_) => {
                return Err(SemanticError::TemplateParamMismatch {
                    param: param_name,
                    reason: "expected a type argument, got a constant expression".into(),
                });
            }
        };
        if arg_ty.is_anonymous() {
            return Err(SemanticError::AnonymousTemplateArgument { param: param_name });
        }
        match &param_ty {
            Type::Any => {}
            Type::Sequence { elem: meta_elem, .. } => {
                let resolved = arg_ty.resolved(self);
                let Type::Sequence { elem: arg_elem, .. } = &resolved else {
                    return Err(SemanticError::TemplateParamMismatch {
                        param: param_name,
                        reason: format!("{} is not a sequence", arg_ty.typename(self)),
                    });
                };
                if !matches!(**meta_elem, Type::Void) {
                    if let Type::ScopedName(p) = &**meta_elem {
                        let is_param =
                            matches!(self.node(*p).kind(), NodeKind::TemplateParam(_));
                        let bound = ctx.concrete_for(self, *p).ok().is_some_and(|c| match c {
                            Concrete::Type(t) => {
                                t.resolved(self).matches(self, &arg_elem.resolved(self))
                            }
                            Concrete::Node(n) => arg_elem.resolved_node(self) == Some(n),
                            Concrete::Expr(_) => false,
                        });
                        if is_param && !bound {
                            return Err(SemanticError::TemplateParamMismatch {
                                param: param_name,
                                reason: "sequence element does not match the bound parameter"
                                    .into(),
                            });
                        }
                    }
                }
            }
            other => {
                let resolved = arg_ty.resolved(self);
                if std::mem::discriminant(other) != std::mem::discriminant(&resolved) {
                    return Err(SemanticError::TemplateParamMismatch {
                        param: param_name,
                        reason: format!(
                            "expected a {}, got {}",
                            other.kind_name(),
                            resolved.typename(self)
                        ),
                    });
                }
            }
        }
        Ok(arg)
    }

    /// Re-runs id remapping over all copied nodes. Forward references
    /// (an enum's enumerator list, a bitmask's bit values) point at nodes
    /// copied after their parent, so a single pass over the kind at copy
    /// time is not enough.
    fn fixup_copied_ids(&mut self, ctx: &InstantiationContext) {
        let copies: Vec<NodeId> = ctx
            .map
            .values()
            .filter_map(|c| match c {
                Concrete::Node(n) => Some(*n),
                _ => None,
            })
            .collect();
        for id in copies {
            match self.node_mut(id).kind_mut() {
                NodeKind::Module(def) => {
                    def.anchor = def.anchor.map(|a| ctx.remap_id(a));
                    def.next = def.next.map(|n| ctx.remap_id(n));
                }
                NodeKind::Interface(def) => def.bases = ctx.remap_ids(&def.bases.clone()),
                NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => {
                    def.bases = ctx.remap_ids(&def.bases.clone());
                    def.interfaces = ctx.remap_ids(&def.interfaces.clone());
                }
                NodeKind::Home(def) => {
                    def.base = def.base.map(|b| ctx.remap_id(b));
                    def.interfaces = ctx.remap_ids(&def.interfaces.clone());
                    def.component = def.component.map(|c| ctx.remap_id(c));
                    def.primary_key = def.primary_key.map(|k| ctx.remap_id(k));
                }
                NodeKind::Component(def) => {
                    def.base = def.base.map(|b| ctx.remap_id(b));
                    def.interfaces = ctx.remap_ids(&def.interfaces.clone());
                }
                NodeKind::Connector(def) => def.base = def.base.map(|b| ctx.remap_id(b)),
                NodeKind::Enum(def) => def.enumerators = ctx.remap_ids(&def.enumerators.clone()),
                NodeKind::Enumerator(def) => def.enum_node = ctx.remap_id(def.enum_node),
                NodeKind::BitMask(def) => def.bitvalues = ctx.remap_ids(&def.bitvalues.clone()),
                NodeKind::BitSet(def) => def.base = def.base.map(|b| ctx.remap_id(b)),
                NodeKind::Operation(def) => def.raises = ctx.remap_ids(&def.raises.clone()),
                NodeKind::Initializer(def) | NodeKind::Finder(def) => {
                    def.raises = ctx.remap_ids(&def.raises.clone())
                }
                NodeKind::Attribute(def) => {
                    def.get_raises = ctx.remap_ids(&def.get_raises.clone());
                    def.set_raises = ctx.remap_ids(&def.set_raises.clone());
                }
                _ => {}
            }
        }
    }

    /// Deep-copies one template member into the instance module.
    fn copy_node(
        &mut self,
        ctx: &mut InstantiationContext,
        src: NodeId,
        into: NodeId,
    ) -> Result<NodeId, SemanticError> {
        // a reference to another template becomes a real instance of it,
        // with the forwarded parameters resolved to their arguments
        if let NodeKind::TemplateModuleReference(def) = self.node(src).kind() {
            let def = def.clone();
            if let Some(name) = self.node(src).name.clone() {
                let mut args = Vec::with_capacity(def.params.len());
                for param in &def.params {
                    args.push(ctx.concrete_for(self, *param)?);
                }
                let annotations = self.node(src).annotations.clone();
                let id =
                    self.instantiate_template_module(into, name, def.template, args, annotations)?;
                ctx.bind(src, Concrete::Node(id));
                return Ok(id);
            }
        }

        let kind = self.instantiate_kind(ctx, self.node(src).kind().clone())?;
        let node = Node {
            name: self.node(src).name.clone(),
            parent: Some(into),
            annotations: self.node(src).annotations.clone(),
            prefix: self.node(src).prefix.clone(),
            repo_id: self.node(src).repo_id().map(str::to_string),
            repo_version: self.node(src).repo_version().map(str::to_string),
            children: Vec::new(),
            introduced: IndexMap::new(),
            kind,
        };
        let name = node.name.clone();
        let id = self.alloc(node);
        if let Some(n) = &name {
            self.introduce(into, n, id)?;
        }
        self.node_mut(into).children.push(id);
        ctx.bind(src, Concrete::Node(id));

        for child in self.node(src).children.clone() {
            self.copy_node(ctx, child, id)?;
        }
        Ok(id)
    }

    /// Rewrites a copied node kind: instantiates contained types and
    /// expressions and remaps references to already-copied nodes.
    fn instantiate_kind(
        &mut self,
        ctx: &InstantiationContext,
        kind: NodeKind,
    ) -> Result<NodeKind, SemanticError> {
        let inst_ty = |ast: &mut Ast, ty: Type| -> Result<Type, SemanticError> {
            let t = ty.instantiate(ctx, ast)?;
            Ok(ctx.remap_type(t))
        };
        Ok(match kind {
            NodeKind::Module(def) => NodeKind::Module(ModuleDef {
                anchor: def.anchor.map(|a| ctx.remap_id(a)),
                next: def.next.map(|n| ctx.remap_id(n)),
                template: def.template,
                template_args: def.template_args,
            }),
            NodeKind::TemplateModule(def) => NodeKind::TemplateModule(def),
            NodeKind::TemplateModuleReference(def) => NodeKind::TemplateModuleReference(def),
            NodeKind::TemplateParam(def) => NodeKind::TemplateParam(def),
            NodeKind::Include(def) => NodeKind::Include(def),
            NodeKind::Interface(mut def) => {
                def.bases = ctx.remap_ids(&def.bases);
                NodeKind::Interface(def)
            }
            NodeKind::Home(mut def) => {
                def.base = def.base.map(|b| ctx.remap_id(b));
                def.interfaces = ctx.remap_ids(&def.interfaces);
                def.component = def.component.map(|c| ctx.remap_id(c));
                def.primary_key = def.primary_key.map(|k| ctx.remap_id(k));
                NodeKind::Home(def)
            }
            NodeKind::Component(mut def) => {
                def.base = def.base.map(|b| ctx.remap_id(b));
                def.interfaces = ctx.remap_ids(&def.interfaces);
                NodeKind::Component(def)
            }
            NodeKind::Connector(mut def) => {
                def.base = def.base.map(|b| ctx.remap_id(b));
                NodeKind::Connector(def)
            }
            NodeKind::Porttype => NodeKind::Porttype,
            NodeKind::Port(mut def) => {
                def.ty = inst_ty(self, def.ty)?;
                NodeKind::Port(def)
            }
            NodeKind::Valuebox(mut def) => {
                def.ty = inst_ty(self, def.ty)?;
                NodeKind::Valuebox(def)
            }
            NodeKind::Valuetype(mut def) => {
                def.bases = ctx.remap_ids(&def.bases);
                def.interfaces = ctx.remap_ids(&def.interfaces);
                NodeKind::Valuetype(def)
            }
            NodeKind::Eventtype(mut def) => {
                def.bases = ctx.remap_ids(&def.bases);
                def.interfaces = ctx.remap_ids(&def.interfaces);
                NodeKind::Eventtype(def)
            }
            NodeKind::StateMember(mut def) => {
                def.ty = inst_ty(self, def.ty)?;
                NodeKind::StateMember(def)
            }
            NodeKind::Initializer(mut def) => {
                def.raises = ctx.remap_ids(&def.raises);
                NodeKind::Initializer(def)
            }
            NodeKind::Finder(mut def) => {
                def.raises = ctx.remap_ids(&def.raises);
                NodeKind::Finder(def)
            }
            NodeKind::Const(def) => {
                let ty = inst_ty(self, def.ty)?;
                let expr = def.expr.instantiate(ctx, self)?;
                let value = match expr.value() {
                    Some(v) => Some(ty.narrow(self, v.clone())?),
                    None => None,
                };
                NodeKind::Const(ConstDef { ty, expr, value })
            }
            NodeKind::Struct(mut def) => {
                def.base = def.base.map(|b| ctx.remap_id(b));
                NodeKind::Struct(def)
            }
            NodeKind::Exception(mut def) => {
                def.base = def.base.map(|b| ctx.remap_id(b));
                NodeKind::Exception(def)
            }
            NodeKind::Member(mut def) => {
                def.ty = inst_ty(self, def.ty)?;
                NodeKind::Member(def)
            }
            NodeKind::Union(mut def) => {
                def.switchtype = match def.switchtype {
                    Some(t) => Some(inst_ty(self, t)?),
                    None => None,
                };
                NodeKind::Union(def)
            }
            NodeKind::UnionMember(mut def) => {
                def.ty = inst_ty(self, def.ty)?;
                let mut labels = Vec::with_capacity(def.labels.len());
                for label in def.labels {
                    labels.push(match label {
                        super::CaseLabel::Default => super::CaseLabel::Default,
                        super::CaseLabel::Value(e) => {
                            super::CaseLabel::Value(e.instantiate(ctx, self)?)
                        }
                    });
                }
                def.labels = labels;
                NodeKind::UnionMember(def)
            }
            NodeKind::Enum(mut def) => {
                def.enumerators = ctx.remap_ids(&def.enumerators);
                NodeKind::Enum(def)
            }
            NodeKind::Enumerator(mut def) => {
                def.enum_node = ctx.remap_id(def.enum_node);
                NodeKind::Enumerator(def)
            }
            NodeKind::BitMask(mut def) => {
                def.bitvalues = ctx.remap_ids(&def.bitvalues);
                NodeKind::BitMask(def)
            }
            NodeKind::BitValue(def) => NodeKind::BitValue(def),
            NodeKind::BitSet(mut def) => {
                def.base = def.base.map(|b| ctx.remap_id(b));
                NodeKind::BitSet(def)
            }
            NodeKind::BitField(mut def) => {
                def.ty = inst_ty(self, def.ty)?;
                NodeKind::BitField(def)
            }
            NodeKind::Typedef(mut def) => {
                def.ty = inst_ty(self, def.ty)?;
                NodeKind::Typedef(def)
            }
            NodeKind::Operation(mut def) => {
                def.ret = inst_ty(self, def.ret)?;
                def.raises = ctx.remap_ids(&def.raises);
                NodeKind::Operation(def)
            }
            NodeKind::Parameter(mut def) => {
                def.ty = inst_ty(self, def.ty)?;
                NodeKind::Parameter(def)
            }
            NodeKind::Attribute(mut def) => {
                def.ty = inst_ty(self, def.ty)?;
                def.get_raises = ctx.remap_ids(&def.get_raises);
                def.set_raises = ctx.remap_ids(&def.set_raises);
                NodeKind::Attribute(def)
            }
        })
    }
}
