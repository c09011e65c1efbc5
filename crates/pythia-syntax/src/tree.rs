//! Module tree and node model
//!
//! One `ModuleTree` per source module. Nodes live in a single arena and are
//! addressed by `NodeId`; structural parent links are computed once when the
//! tree is built. The tree is immutable after construction, so evaluation
//! state that depends on a different parent chain (e.g. one call activation
//! of a function) is kept in side-tables outside the tree.

use crate::span::Span;
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Unique identifier for a node within one `ModuleTree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Index into the tree's arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// A literal constant
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer literal
    Int(i64),
    /// String literal
    Str(String),
    /// Boolean literal
    Bool(bool),
    /// The `None` constant
    None,
}

/// Module scope node: the root of a tree
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleNode {
    /// Top-level statements
    pub body: Vec<NodeId>,
    /// Module docstring, if any
    pub doc: Option<String>,
}

/// Class definition
#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    /// The class name (a definition `Name` node)
    pub name: NodeId,
    /// Explicit base-argument list; `None` when no argument list was written
    pub bases: Option<Vec<NodeId>>,
    /// Decorators, outermost first (textual order)
    pub decorators: Vec<NodeId>,
    /// Class body statements
    pub body: Vec<NodeId>,
}

/// Function or lambda definition
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionNode {
    /// The function name (a definition `Name` node); synthesized for lambdas
    pub name: NodeId,
    /// Parameters in declaration order
    pub params: Vec<NodeId>,
    /// Decorators, outermost first (textual order)
    pub decorators: Vec<NodeId>,
    /// Body statements; a lambda body is a single expression statement
    pub body: Vec<NodeId>,
    /// Return annotation expression, if any
    pub return_annotation: Option<NodeId>,
    /// Whether this is a lambda (single-expression body, no decorators)
    pub is_lambda: bool,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamNode {
    /// Parameter name (a definition `Name` node)
    pub name: NodeId,
    /// Annotation expression, if any
    pub annotation: Option<NodeId>,
    /// Default value expression, if any
    pub default: Option<NodeId>,
}

/// A single decorator
#[derive(Debug, Clone, PartialEq)]
pub struct DecoratorNode {
    /// The decorator callable expression
    pub callee: NodeId,
    /// Trailing call arguments: `@dec(a, b)` carries `Some([a, b])`
    pub call_args: Option<Vec<NodeId>>,
}

/// Assignment statement
#[derive(Debug, Clone, PartialEq)]
pub struct AssignNode {
    /// Assignment targets (names or attribute accesses)
    pub targets: Vec<NodeId>,
    /// Right-hand side expression
    pub value: NodeId,
}

/// Return statement
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnNode {
    /// Returned expression; `None` for a bare `return`
    pub value: Option<NodeId>,
}

/// Yield statement
#[derive(Debug, Clone, PartialEq)]
pub struct YieldNode {
    /// Yielded expression; `None` for a bare `yield`
    pub value: Option<NodeId>,
    /// Whether this delegates to a sub-iterable (`yield from`)
    pub delegate: bool,
}

/// For loop
#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    /// Loop targets (definition `Name` nodes, or a tuple unpacking)
    pub targets: Vec<NodeId>,
    /// The iterated source expression
    pub iter: NodeId,
    /// Loop body statements
    pub body: Vec<NodeId>,
}

/// While loop
#[derive(Debug, Clone, PartialEq)]
pub struct WhileNode {
    /// Loop condition
    pub test: NodeId,
    /// Loop body statements
    pub body: Vec<NodeId>,
}

/// If statement
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    /// Condition expression
    pub test: NodeId,
    /// Then-branch statements
    pub then_body: Vec<NodeId>,
    /// Else-branch statements (possibly empty)
    pub else_body: Vec<NodeId>,
}

/// Try statement
#[derive(Debug, Clone, PartialEq)]
pub struct TryNode {
    /// Try-block statements
    pub body: Vec<NodeId>,
    /// One statement list per except handler
    pub handlers: Vec<Vec<NodeId>>,
    /// Finally-block statements (possibly empty)
    pub final_body: Vec<NodeId>,
}

/// Expression statement
#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmtNode {
    /// The expression
    pub value: NodeId,
}

/// Import statement (`import x`, `from x import a, b`, `from x import *`)
#[derive(Debug, Clone, PartialEq)]
pub struct ImportNode {
    /// Dotted module path being imported from/of
    pub module: String,
    /// Imported names (definition `Name` nodes); empty for star imports
    pub names: Vec<NodeId>,
    /// Whether this is a `from module import *`
    pub is_star: bool,
}

/// Global declaration
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalNode {
    /// Declared names (syntactically plain references)
    pub names: Vec<NodeId>,
}

/// A name leaf
#[derive(Debug, Clone, PartialEq)]
pub struct NameNode {
    /// The identifier text
    pub name: String,
    /// Whether this occurrence is a definition (assignment target, parameter,
    /// def/class name, import binding, loop target)
    pub is_definition: bool,
}

/// Attribute access: `value.attr`
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNode {
    /// The accessed object expression
    pub value: NodeId,
    /// The attribute name (a `Name` node; a definition when assigned to)
    pub attr: NodeId,
}

/// Call expression
#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    /// Callee expression
    pub callee: NodeId,
    /// Positional argument expressions
    pub args: Vec<NodeId>,
}

/// Tuple display
#[derive(Debug, Clone, PartialEq)]
pub struct TupleNode {
    /// Element expressions
    pub elements: Vec<NodeId>,
}

/// Node payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Module scope (the tree root)
    Module(ModuleNode),
    /// Class definition
    Class(ClassNode),
    /// Function or lambda definition
    Function(FunctionNode),
    /// Function parameter
    Param(ParamNode),
    /// Decorator
    Decorator(DecoratorNode),
    /// Assignment statement
    Assign(AssignNode),
    /// Return statement
    Return(ReturnNode),
    /// Yield statement
    Yield(YieldNode),
    /// For loop
    For(ForNode),
    /// While loop
    While(WhileNode),
    /// If statement
    If(IfNode),
    /// Try statement
    Try(TryNode),
    /// Expression statement
    ExprStmt(ExprStmtNode),
    /// Import statement
    Import(ImportNode),
    /// Global declaration
    Global(GlobalNode),
    /// Name leaf
    Name(NameNode),
    /// Attribute access
    Attribute(AttributeNode),
    /// Call expression
    Call(CallNode),
    /// Literal constant
    Literal(Literal),
    /// Tuple display
    Tuple(TupleNode),
}

impl NodeKind {
    /// Whether this node opens a lexical scope
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            NodeKind::Module(_) | NodeKind::Class(_) | NodeKind::Function(_)
        )
    }

    /// Child node ids in source order
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self {
            NodeKind::Module(m) => out.extend(&m.body),
            NodeKind::Class(c) => {
                out.extend(&c.decorators);
                out.push(c.name);
                if let Some(bases) = &c.bases {
                    out.extend(bases);
                }
                out.extend(&c.body);
            }
            NodeKind::Function(f) => {
                out.extend(&f.decorators);
                out.push(f.name);
                out.extend(&f.params);
                if let Some(ann) = f.return_annotation {
                    out.push(ann);
                }
                out.extend(&f.body);
            }
            NodeKind::Param(p) => {
                out.push(p.name);
                if let Some(ann) = p.annotation {
                    out.push(ann);
                }
                if let Some(default) = p.default {
                    out.push(default);
                }
            }
            NodeKind::Decorator(d) => {
                out.push(d.callee);
                if let Some(args) = &d.call_args {
                    out.extend(args);
                }
            }
            NodeKind::Assign(a) => {
                out.extend(&a.targets);
                out.push(a.value);
            }
            NodeKind::Return(r) => out.extend(r.value),
            NodeKind::Yield(y) => out.extend(y.value),
            NodeKind::For(f) => {
                out.extend(&f.targets);
                out.push(f.iter);
                out.extend(&f.body);
            }
            NodeKind::While(w) => {
                out.push(w.test);
                out.extend(&w.body);
            }
            NodeKind::If(i) => {
                out.push(i.test);
                out.extend(&i.then_body);
                out.extend(&i.else_body);
            }
            NodeKind::Try(t) => {
                out.extend(&t.body);
                for handler in &t.handlers {
                    out.extend(handler);
                }
                out.extend(&t.final_body);
            }
            NodeKind::ExprStmt(e) => out.push(e.value),
            NodeKind::Import(i) => out.extend(&i.names),
            NodeKind::Global(g) => out.extend(&g.names),
            NodeKind::Name(_) | NodeKind::Literal(_) => {}
            NodeKind::Attribute(a) => {
                out.push(a.value);
                out.push(a.attr);
            }
            NodeKind::Call(c) => {
                out.push(c.callee);
                out.extend(&c.args);
            }
            NodeKind::Tuple(t) => out.extend(&t.elements),
        }
        out
    }
}

/// A single node in the arena
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The payload
    pub kind: NodeKind,
    /// Source location
    pub span: Span,
}

/// An immutable syntax tree for one module
#[derive(Debug)]
pub struct ModuleTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) parents: Vec<Option<NodeId>>,
    pub(crate) root: NodeId,
    pub(crate) path: Option<PathBuf>,
    pub(crate) source: Option<String>,
}

impl ModuleTree {
    /// The module node id (root of the tree)
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The node stored at `id`
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// The payload stored at `id`
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// The span stored at `id`
    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    /// Structural parent, `None` for the root
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents[id.index()]
    }

    /// Source file path, if the module came from disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw module source text, when retained by the front end
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Module docstring
    pub fn doc(&self) -> Option<&str> {
        match self.kind(self.root) {
            NodeKind::Module(m) => m.doc.as_deref(),
            _ => None,
        }
    }

    /// The identifier text of a `Name` node
    pub fn name_text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Name(n) => Some(n.name.as_str()),
            _ => None,
        }
    }

    /// Walk up the parent chain until `pred` matches; includes `id` itself
    pub fn parent_until(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if pred(self.kind(node)) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// The nearest enclosing scope of `id`, excluding `id` itself
    pub fn enclosing_scope(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        self.parent_until(parent, NodeKind::is_scope)
    }

    /// Body statement list of a scope node
    pub fn scope_body(&self, scope: NodeId) -> &[NodeId] {
        match self.kind(scope) {
            NodeKind::Module(m) => &m.body,
            NodeKind::Class(c) => &c.body,
            NodeKind::Function(f) => &f.body,
            _ => &[],
        }
    }

    /// All statement nodes inside a scope, in source order, descending
    /// through control flow but not into nested scopes
    pub fn statements_in_scope(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_statements(self.scope_body(scope), &mut out);
        out
    }

    fn collect_statements(&self, body: &[NodeId], out: &mut Vec<NodeId>) {
        for &stmt in body {
            out.push(stmt);
            match self.kind(stmt) {
                NodeKind::For(f) => self.collect_statements(&f.body, out),
                NodeKind::While(w) => self.collect_statements(&w.body, out),
                NodeKind::If(i) => {
                    self.collect_statements(&i.then_body, out);
                    self.collect_statements(&i.else_body, out);
                }
                NodeKind::Try(t) => {
                    self.collect_statements(&t.body, out);
                    for handler in &t.handlers {
                        self.collect_statements(handler, out);
                    }
                    self.collect_statements(&t.final_body, out);
                }
                // Nested scopes keep their own statements to themselves.
                _ => {}
            }
        }
    }

    /// All `Return` statements of a scope, in source order
    pub fn returns_in(&self, scope: NodeId) -> Vec<NodeId> {
        self.statements_in_scope(scope)
            .into_iter()
            .filter(|&id| matches!(self.kind(id), NodeKind::Return(_)))
            .collect()
    }

    /// All `Yield` statements of a scope, in source order
    pub fn yields_in(&self, scope: NodeId) -> Vec<NodeId> {
        self.statements_in_scope(scope)
            .into_iter()
            .filter(|&id| matches!(self.kind(id), NodeKind::Yield(_)))
            .collect()
    }

    /// Nested class/function definitions of a scope (not recursing into them)
    pub fn sub_scopes(&self, scope: NodeId) -> Vec<NodeId> {
        self.statements_in_scope(scope)
            .into_iter()
            .filter(|&id| self.kind(id).is_scope())
            .collect()
    }

    /// Whether a function definition contains a yield (and is not a lambda)
    pub fn is_generator(&self, func: NodeId) -> bool {
        match self.kind(func) {
            NodeKind::Function(f) => !f.is_lambda && !self.yields_in(func).is_empty(),
            _ => false,
        }
    }

    /// The first parameter name of a function, if it has parameters
    pub fn first_param_name(&self, func: NodeId) -> Option<&str> {
        match self.kind(func) {
            NodeKind::Function(f) => {
                let first = f.params.first()?;
                match self.kind(*first) {
                    NodeKind::Param(p) => self.name_text(p.name),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// All nodes inside a scope, in source order, without entering nested
    /// scope interiors (their name and decorators are still visited)
    pub fn nodes_in_scope(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &stmt in self.scope_body(scope) {
            self.collect_scope_nodes(stmt, &mut out);
        }
        out
    }

    fn collect_scope_nodes(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        match self.kind(id) {
            NodeKind::Class(c) => {
                for &dec in &c.decorators {
                    self.collect_scope_nodes(dec, out);
                }
                out.push(c.name);
                if let Some(bases) = &c.bases {
                    for &base in bases {
                        self.collect_scope_nodes(base, out);
                    }
                }
            }
            NodeKind::Function(f) => {
                for &dec in &f.decorators {
                    self.collect_scope_nodes(dec, out);
                }
                out.push(f.name);
            }
            _ => {
                for child in self.kind(id).children() {
                    self.collect_scope_nodes(child, out);
                }
            }
        }
    }

    /// Name table of a scope: identifier text to all `Name` occurrences,
    /// excluding attribute-position names (those belong to the accessed
    /// object, not the scope)
    pub fn scope_names(&self, scope: NodeId) -> FxHashMap<String, Vec<NodeId>> {
        let mut attr_positions = Vec::new();
        let nodes = self.nodes_in_scope(scope);
        for &id in &nodes {
            if let NodeKind::Attribute(a) = self.kind(id) {
                attr_positions.push(a.attr);
            }
        }

        let mut table: FxHashMap<String, Vec<NodeId>> = FxHashMap::default();
        for id in nodes {
            if let NodeKind::Name(n) = self.kind(id) {
                if attr_positions.contains(&id) {
                    continue;
                }
                table.entry(n.name.clone()).or_default().push(id);
            }
        }
        table
    }

    /// Star-import statements of the module
    pub fn star_imports(&self) -> Vec<NodeId> {
        self.statements_in_scope(self.root)
            .into_iter()
            .filter(|&id| matches!(self.kind(id), NodeKind::Import(i) if i.is_star))
            .collect()
    }

    /// Names declared `global` anywhere in the module
    pub fn global_names(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for id in 0..self.nodes.len() {
            if let NodeKind::Global(g) = &self.nodes[id].kind {
                out.extend(&g.names);
            }
        }
        out
    }
}

/// A shared reference to a node: tree handle plus id
///
/// Equality and hashing are identity based (same tree, same id), which makes
/// `NodeRef` usable as a cache key across the evaluation layer.
#[derive(Clone)]
pub struct NodeRef {
    /// The owning tree
    pub tree: Rc<ModuleTree>,
    /// The node id inside `tree`
    pub id: NodeId,
}

impl NodeRef {
    /// Create a reference into `tree`
    pub fn new(tree: Rc<ModuleTree>, id: NodeId) -> Self {
        NodeRef { tree, id }
    }

    /// Reference to the root (module) node of `tree`
    pub fn root(tree: Rc<ModuleTree>) -> Self {
        let id = tree.root();
        NodeRef { tree, id }
    }

    /// The payload of the referenced node
    pub fn kind(&self) -> &NodeKind {
        self.tree.kind(self.id)
    }

    /// The span of the referenced node
    pub fn span(&self) -> Span {
        self.tree.span(self.id)
    }

    /// Structural parent as a `NodeRef`
    pub fn parent(&self) -> Option<NodeRef> {
        self.tree
            .parent(self.id)
            .map(|id| NodeRef::new(Rc::clone(&self.tree), id))
    }

    /// Children as `NodeRef`s, in source order
    pub fn children(&self) -> Vec<NodeRef> {
        self.kind()
            .children()
            .into_iter()
            .map(|id| NodeRef::new(Rc::clone(&self.tree), id))
            .collect()
    }

    /// Sibling reference into the same tree
    pub fn at(&self, id: NodeId) -> NodeRef {
        NodeRef::new(Rc::clone(&self.tree), id)
    }

    /// Identifier text when the node is a `Name`
    pub fn name_text(&self) -> Option<&str> {
        self.tree.name_text(self.id)
    }

    /// Stable cache key for this node
    pub fn key(&self) -> NodeKey {
        NodeKey {
            tree: Rc::as_ptr(&self.tree),
            id: self.id,
        }
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl Eq for NodeRef {}

impl std::hash::Hash for NodeRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.tree).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({})", self.id)
    }
}

/// Identity key for a node: owning-tree address plus id
///
/// Valid for as long as the referenced tree is alive, which the session's
/// wrappers guarantee for every key they store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    tree: *const ModuleTree,
    id: NodeId,
}
