//! Walking a parsed AST.

use super::{Ast, NodeId, NodeKind};

/// Callbacks for an AST walk. Every method has a no-op default; a consumer
/// overrides the ones it cares about.
#[allow(unused_variables)]
pub trait Visitor {
    /// When true, included files are walked as if their contents appeared
    /// in the including file; otherwise includes produce [`Visitor::visit_include`].
    fn expand_includes(&self) -> bool {
        false
    }

    fn enter_module(&mut self, ast: &Ast, node: NodeId) {}
    fn leave_module(&mut self, ast: &Ast, node: NodeId) {}
    fn enter_include(&mut self, ast: &Ast, node: NodeId) {}
    fn leave_include(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_include(&mut self, ast: &Ast, node: NodeId) {}
    fn enter_interface(&mut self, ast: &Ast, node: NodeId) {}
    fn leave_interface(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_interface_forward(&mut self, ast: &Ast, node: NodeId) {}
    fn enter_valuetype(&mut self, ast: &Ast, node: NodeId) {}
    fn leave_valuetype(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_valuetype_forward(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_valuebox(&mut self, ast: &Ast, node: NodeId) {}
    fn enter_component(&mut self, ast: &Ast, node: NodeId) {}
    fn leave_component(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_component_forward(&mut self, ast: &Ast, node: NodeId) {}
    fn enter_connector(&mut self, ast: &Ast, node: NodeId) {}
    fn leave_connector(&mut self, ast: &Ast, node: NodeId) {}
    fn enter_home(&mut self, ast: &Ast, node: NodeId) {}
    fn leave_home(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_port(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_const(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_struct(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_struct_forward(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_exception(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_union(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_union_forward(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_enum(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_bitmask(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_bitset(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_typedef(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_operation(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_attribute(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_state_member(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_initializer(&mut self, ast: &Ast, node: NodeId) {}
    fn visit_finder(&mut self, ast: &Ast, node: NodeId) {}
}

impl Ast {
    /// Walks the whole tree from the global root.
    pub fn accept<V: Visitor>(&self, visitor: &mut V) {
        self.walk_members(self.root(), visitor);
    }

    fn walk_members<V: Visitor>(&self, scope: NodeId, visitor: &mut V) {
        for child in self.node(scope).children() {
            self.walk_member(*child, visitor);
        }
    }

    fn walk_member<V: Visitor>(&self, node: NodeId, visitor: &mut V) {
        match self.node(node).kind() {
            NodeKind::Module(_) => {
                visitor.enter_module(self, node);
                self.walk_members(node, visitor);
                visitor.leave_module(self, node);
            }
            NodeKind::Include(def) => {
                if def.preprocessed {
                    return;
                }
                if visitor.expand_includes() {
                    visitor.enter_include(self, node);
                    self.walk_members(node, visitor);
                    visitor.leave_include(self, node);
                } else {
                    visitor.visit_include(self, node);
                }
            }
            NodeKind::Interface(def) => {
                if !def.defined {
                    visitor.visit_interface_forward(self, node);
                } else {
                    visitor.enter_interface(self, node);
                    self.walk_members(node, visitor);
                    visitor.leave_interface(self, node);
                }
            }
            NodeKind::Valuetype(def) | NodeKind::Eventtype(def) => {
                if !def.defined {
                    visitor.visit_valuetype_forward(self, node);
                } else {
                    visitor.enter_valuetype(self, node);
                    self.walk_members(node, visitor);
                    visitor.leave_valuetype(self, node);
                }
            }
            NodeKind::Valuebox(_) => visitor.visit_valuebox(self, node),
            NodeKind::Component(def) => {
                if !def.defined {
                    visitor.visit_component_forward(self, node);
                } else {
                    visitor.enter_component(self, node);
                    self.walk_members(node, visitor);
                    visitor.leave_component(self, node);
                }
            }
            NodeKind::Connector(_) => {
                visitor.enter_connector(self, node);
                self.walk_members(node, visitor);
                visitor.leave_connector(self, node);
            }
            NodeKind::Home(_) => {
                visitor.enter_home(self, node);
                self.walk_members(node, visitor);
                visitor.leave_home(self, node);
            }
            NodeKind::Port(_) => visitor.visit_port(self, node),
            NodeKind::Const(_) => visitor.visit_const(self, node),
            NodeKind::Struct(def) => {
                if !def.defined {
                    visitor.visit_struct_forward(self, node);
                } else {
                    visitor.visit_struct(self, node);
                }
            }
            NodeKind::Exception(_) => visitor.visit_exception(self, node),
            NodeKind::Union(def) => {
                if !def.defined {
                    visitor.visit_union_forward(self, node);
                } else {
                    visitor.visit_union(self, node);
                }
            }
            NodeKind::Enum(_) => visitor.visit_enum(self, node),
            NodeKind::BitMask(_) => visitor.visit_bitmask(self, node),
            NodeKind::BitSet(_) => visitor.visit_bitset(self, node),
            NodeKind::Typedef(_) => visitor.visit_typedef(self, node),
            NodeKind::Operation(_) => visitor.visit_operation(self, node),
            NodeKind::Attribute(_) => visitor.visit_attribute(self, node),
            NodeKind::StateMember(_) => visitor.visit_state_member(self, node),
            NodeKind::Initializer(_) => visitor.visit_initializer(self, node),
            NodeKind::Finder(_) => visitor.visit_finder(self, node),
            // template machinery and nested declarations are reached
            // through their owners, not the walk
            NodeKind::TemplateModule(_)
            | NodeKind::TemplateModuleReference(_)
            | NodeKind::TemplateParam(_)
            | NodeKind::Porttype
            | NodeKind::Member(_)
            | NodeKind::UnionMember(_)
            | NodeKind::Enumerator(_)
            | NodeKind::BitValue(_)
            | NodeKind::BitField(_)
            | NodeKind::Parameter(_) => {}
        }
    }
}
