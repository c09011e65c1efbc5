//! Tree construction
//!
//! `TreeBuilder` allocates nodes into the arena and classifies name
//! occurrences as definitions or references while doing so. Parent links are
//! computed once in `finish`; the resulting `ModuleTree` is immutable.

use crate::span::Span;
use crate::tree::*;
use std::path::PathBuf;

/// Builds one `ModuleTree`
#[derive(Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
    source: Option<String>,
}

impl TreeBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        TreeBuilder::default()
    }

    /// Attach raw source text to the finished tree (used for package
    /// detection on module files)
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
    }

    fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, span });
        id
    }

    /// Mark a target expression as a definition site: names directly, the
    /// attribute name of attribute targets, every element of tuple targets
    fn mark_definition(&mut self, id: NodeId) {
        match self.nodes[id.index()].kind.clone() {
            NodeKind::Name(_) => {
                if let NodeKind::Name(n) = &mut self.nodes[id.index()].kind {
                    n.is_definition = true;
                }
            }
            NodeKind::Attribute(a) => self.mark_definition(a.attr),
            NodeKind::Tuple(t) => {
                for element in t.elements {
                    self.mark_definition(element);
                }
            }
            _ => {}
        }
    }

    /// Integer literal
    pub fn int(&mut self, value: i64, span: Span) -> NodeId {
        self.push(NodeKind::Literal(Literal::Int(value)), span)
    }

    /// String literal
    pub fn str(&mut self, value: impl Into<String>, span: Span) -> NodeId {
        self.push(NodeKind::Literal(Literal::Str(value.into())), span)
    }

    /// Boolean literal
    pub fn bool(&mut self, value: bool, span: Span) -> NodeId {
        self.push(NodeKind::Literal(Literal::Bool(value)), span)
    }

    /// The `None` literal
    pub fn none(&mut self, span: Span) -> NodeId {
        self.push(NodeKind::Literal(Literal::None), span)
    }

    /// Name reference
    pub fn name(&mut self, name: impl Into<String>, span: Span) -> NodeId {
        self.push(
            NodeKind::Name(NameNode {
                name: name.into(),
                is_definition: false,
            }),
            span,
        )
    }

    /// Attribute access `value.attr`
    pub fn attribute(&mut self, value: NodeId, attr: impl Into<String>, span: Span) -> NodeId {
        let attr_name = self.name(attr, span);
        self.push(
            NodeKind::Attribute(AttributeNode {
                value,
                attr: attr_name,
            }),
            span,
        )
    }

    /// Call expression
    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::Call(CallNode { callee, args }), span)
    }

    /// Tuple display
    pub fn tuple(&mut self, elements: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::Tuple(TupleNode { elements }), span)
    }

    /// Assignment; targets are marked as definitions
    pub fn assign(&mut self, targets: Vec<NodeId>, value: NodeId, span: Span) -> NodeId {
        for &target in &targets {
            self.mark_definition(target);
        }
        self.push(NodeKind::Assign(AssignNode { targets, value }), span)
    }

    /// Return statement
    pub fn ret(&mut self, value: Option<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::Return(ReturnNode { value }), span)
    }

    /// Yield statement; `delegate` marks `yield from`
    pub fn yield_stmt(&mut self, value: Option<NodeId>, delegate: bool, span: Span) -> NodeId {
        self.push(NodeKind::Yield(YieldNode { value, delegate }), span)
    }

    /// For loop; targets are marked as definitions
    pub fn for_stmt(
        &mut self,
        targets: Vec<NodeId>,
        iter: NodeId,
        body: Vec<NodeId>,
        span: Span,
    ) -> NodeId {
        for &target in &targets {
            self.mark_definition(target);
        }
        self.push(NodeKind::For(ForNode { targets, iter, body }), span)
    }

    /// While loop
    pub fn while_stmt(&mut self, test: NodeId, body: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::While(WhileNode { test, body }), span)
    }

    /// If statement
    pub fn if_stmt(
        &mut self,
        test: NodeId,
        then_body: Vec<NodeId>,
        else_body: Vec<NodeId>,
        span: Span,
    ) -> NodeId {
        self.push(
            NodeKind::If(IfNode {
                test,
                then_body,
                else_body,
            }),
            span,
        )
    }

    /// Try statement
    pub fn try_stmt(
        &mut self,
        body: Vec<NodeId>,
        handlers: Vec<Vec<NodeId>>,
        final_body: Vec<NodeId>,
        span: Span,
    ) -> NodeId {
        self.push(
            NodeKind::Try(TryNode {
                body,
                handlers,
                final_body,
            }),
            span,
        )
    }

    /// Expression statement
    pub fn expr_stmt(&mut self, value: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::ExprStmt(ExprStmtNode { value }), span)
    }

    /// `from module import a, b`; the names are marked as definitions
    pub fn import_names(&mut self, module: impl Into<String>, names: Vec<NodeId>, span: Span) -> NodeId {
        for &name in &names {
            self.mark_definition(name);
        }
        self.push(
            NodeKind::Import(ImportNode {
                module: module.into(),
                names,
                is_star: false,
            }),
            span,
        )
    }

    /// `from module import *`
    pub fn import_star(&mut self, module: impl Into<String>, span: Span) -> NodeId {
        self.push(
            NodeKind::Import(ImportNode {
                module: module.into(),
                names: Vec::new(),
                is_star: true,
            }),
            span,
        )
    }

    /// `global a, b`; the names stay plain references here, the evaluation
    /// layer promotes them to definitions
    pub fn global_stmt(&mut self, names: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::Global(GlobalNode { names }), span)
    }

    /// Plain parameter
    pub fn param(&mut self, name: impl Into<String>, span: Span) -> NodeId {
        self.param_full(name, None, None, span)
    }

    /// Parameter with optional annotation and default
    pub fn param_full(
        &mut self,
        name: impl Into<String>,
        annotation: Option<NodeId>,
        default: Option<NodeId>,
        span: Span,
    ) -> NodeId {
        let name = self.name(name, span);
        self.mark_definition(name);
        self.push(
            NodeKind::Param(ParamNode {
                name,
                annotation,
                default,
            }),
            span,
        )
    }

    /// Decorator; `call_args` present for `@dec(...)` forms
    pub fn decorator(&mut self, callee: NodeId, call_args: Option<Vec<NodeId>>, span: Span) -> NodeId {
        self.push(NodeKind::Decorator(DecoratorNode { callee, call_args }), span)
    }

    /// Function definition; the name is marked as a definition
    pub fn function_def(
        &mut self,
        name: impl Into<String>,
        params: Vec<NodeId>,
        decorators: Vec<NodeId>,
        body: Vec<NodeId>,
        span: Span,
    ) -> NodeId {
        let name = self.name(name, span);
        self.mark_definition(name);
        self.push(
            NodeKind::Function(FunctionNode {
                name,
                params,
                decorators,
                body,
                return_annotation: None,
                is_lambda: false,
            }),
            span,
        )
    }

    /// Lambda: a function whose body is its single expression
    pub fn lambda_def(&mut self, params: Vec<NodeId>, body_expr: NodeId, span: Span) -> NodeId {
        let name = self.name("<lambda>", span);
        let body = vec![self.expr_stmt(body_expr, span)];
        self.push(
            NodeKind::Function(FunctionNode {
                name,
                params,
                decorators: Vec::new(),
                body,
                return_annotation: None,
                is_lambda: true,
            }),
            span,
        )
    }

    /// Class definition; `bases` is `None` when no argument list was written
    pub fn class_def(
        &mut self,
        name: impl Into<String>,
        bases: Option<Vec<NodeId>>,
        decorators: Vec<NodeId>,
        body: Vec<NodeId>,
        span: Span,
    ) -> NodeId {
        let name = self.name(name, span);
        self.mark_definition(name);
        self.push(
            NodeKind::Class(ClassNode {
                name,
                bases,
                decorators,
                body,
            }),
            span,
        )
    }

    /// Finish the tree with the given module body
    pub fn finish(
        mut self,
        body: Vec<NodeId>,
        path: Option<PathBuf>,
        doc: Option<String>,
    ) -> ModuleTree {
        let root = self.push(
            NodeKind::Module(ModuleNode { body, doc }),
            Span::synthetic(),
        );

        let mut parents = vec![None; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for child in self.nodes[id.index()].kind.children() {
                parents[child.index()] = Some(id);
                stack.push(child);
            }
        }

        ModuleTree {
            nodes: self.nodes,
            parents,
            root,
            path,
            source: self.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_marking() {
        let mut b = TreeBuilder::new();
        let span = Span::synthetic();
        let value = b.int(1, span);
        let target = b.name("x", span);
        b.assign(vec![target], value, span);
        let reference = b.name("x", span);
        let stmt = b.expr_stmt(reference, span);
        let tree = b.finish(vec![stmt], None, None);

        match tree.kind(target) {
            NodeKind::Name(n) => assert!(n.is_definition),
            _ => unreachable!(),
        }
        match tree.kind(reference) {
            NodeKind::Name(n) => assert!(!n.is_definition),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_lambda_shape() {
        let mut b = TreeBuilder::new();
        let span = Span::synthetic();
        let body = b.int(42, span);
        let lambda = b.lambda_def(vec![], body, span);
        let tree = b.finish(vec![lambda], None, None);

        match tree.kind(lambda) {
            NodeKind::Function(f) => {
                assert!(f.is_lambda);
                assert_eq!(f.body.len(), 1);
            }
            _ => unreachable!(),
        }
        assert!(!tree.is_generator(lambda));
    }
}
