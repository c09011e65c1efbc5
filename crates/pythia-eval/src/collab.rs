//! Collaborator contracts
//!
//! The evaluation layer never parses, imports or executes anything itself;
//! it asks collaborators. Each collaborator is a trait with a default
//! implementation wired into `Collaborators::default()`, so a bare session
//! is usable on its own: the defaults cover the structural cases (literal
//! and name evaluation, positional argument binding, straight-line
//! reachability) and stay conservatively empty everywhere else.

use crate::diagnostic::Diagnostic;
use crate::execution::FunctionExecution;
use crate::function::FunctionWrapper;
use crate::instance::InstanceWrapper;
use crate::module::ModuleWrapper;
use crate::names::Binding;
use crate::session::Session;
use crate::value::{NativeKind, NativeObject, Value, ValueSet};
use pythia_syntax::{Literal, NodeKind, NodeRef};
use std::rc::Rc;

/// Reachability classification of a statement within one activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// Definitely executed when the function runs
    Reachable,
    /// Definitely not executed
    Unreachable,
    /// May or may not be executed
    PossiblyReachable,
}

/// The context an expression is evaluated in
#[derive(Clone, Default)]
pub struct EvalContext {
    /// The call activation whose parameter bindings are in scope
    pub activation: Option<Rc<FunctionExecution>>,
    /// The instance whose projection is in scope
    pub instance: Option<Rc<InstanceWrapper>>,
}

impl EvalContext {
    /// Module/class-level context with no activation or instance
    pub fn module() -> Self {
        EvalContext::default()
    }

    /// Context inside a call activation
    pub fn in_activation(activation: Rc<FunctionExecution>) -> Self {
        EvalContext {
            instance: activation.function().bound_to().cloned(),
            activation: Some(activation),
        }
    }
}

/// One bound parameter of a call activation
#[derive(Debug, Clone)]
pub struct BoundParam {
    /// Parameter name
    pub name: String,
    /// Inferred value set for the parameter
    pub values: ValueSet,
}

/// Call-site arguments
///
/// Either unevaluated argument expressions from a call site, or value sets
/// that were already computed (the "execute evaluated" path used by
/// decorator application and protocol-method execution). The session-unique
/// id makes argument identity usable in instance cache keys.
pub struct Arguments {
    id: u64,
    kind: ArgumentsKind,
    ctx: EvalContext,
}

enum ArgumentsKind {
    None,
    Nodes(Vec<NodeRef>),
    Values(Vec<ValueSet>),
}

impl Arguments {
    /// No arguments
    pub fn none(session: &Session) -> Rc<Arguments> {
        Rc::new(Arguments {
            id: session.next_id(),
            kind: ArgumentsKind::None,
            ctx: EvalContext::module(),
        })
    }

    /// Arguments from call-site expressions, evaluated lazily in `ctx`
    pub fn from_nodes(session: &Session, nodes: Vec<NodeRef>, ctx: EvalContext) -> Rc<Arguments> {
        Rc::new(Arguments {
            id: session.next_id(),
            kind: ArgumentsKind::Nodes(nodes),
            ctx,
        })
    }

    /// Pre-evaluated arguments
    pub fn from_values(session: &Session, sets: Vec<ValueSet>) -> Rc<Arguments> {
        Rc::new(Arguments {
            id: session.next_id(),
            kind: ArgumentsKind::Values(sets),
            ctx: EvalContext::module(),
        })
    }

    /// Session-unique identity of this argument list
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether no arguments were passed
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            ArgumentsKind::None => true,
            ArgumentsKind::Nodes(nodes) => nodes.is_empty(),
            ArgumentsKind::Values(sets) => sets.is_empty(),
        }
    }

    /// Evaluate to one value set per argument, in argument order
    pub fn eval(&self, session: &Session) -> Vec<ValueSet> {
        match &self.kind {
            ArgumentsKind::None => Vec::new(),
            ArgumentsKind::Nodes(nodes) => nodes
                .iter()
                .map(|node| session.collab.evaluator.eval_expr(session, &self.ctx, node))
                .collect(),
            ArgumentsKind::Values(sets) => sets.clone(),
        }
    }
}

/// Evaluates expression nodes to value sets
pub trait ExpressionEvaluator {
    /// Evaluate `expr` in `ctx`
    fn eval_expr(&self, session: &Session, ctx: &EvalContext, expr: &NodeRef) -> ValueSet;
}

/// Binds call-site arguments to the parameters of a callable
pub trait ArgumentBinder {
    /// Bind `args` against `callee`'s parameter list
    fn bind(&self, session: &Session, callee: &Value, args: &Arguments) -> Vec<BoundParam>;
}

/// Classifies statement reachability inside one activation
pub trait ReachabilityClassifier {
    /// Classify `stmt` within `execution`
    fn classify(
        &self,
        session: &Session,
        execution: &FunctionExecution,
        stmt: &NodeRef,
    ) -> Reachability;
}

/// Supplies values for builtins that have no analyzable source
pub trait NativeBridge {
    /// The builtin `object` type
    fn object_type(&self) -> Value;
    /// The builtin `type` type
    fn type_type(&self) -> Value;
    /// The synthetic class of plain functions
    fn function_class(&self) -> Value;
    /// The synthetic class of bound methods
    fn method_class(&self) -> Value;
    /// The synthetic class of modules
    fn module_class(&self) -> Value;
    /// The `None` singleton
    fn none_object(&self) -> Value;
    /// A string instance with no known content
    fn str_instance(&self) -> Value;
}

/// Contributes declared return types (docstrings, annotations) to inference
pub trait ReturnHintProvider {
    /// Supplementary return-type values for `function`
    fn return_hints(&self, session: &Session, function: &Rc<FunctionWrapper>) -> ValueSet;
}

/// Receives constructor arguments of builtin container types
pub trait ContainerTracker {
    /// Record the construction of a builtin `list`/`set` instance
    fn track_construction(
        &self,
        session: &Session,
        instance: &Rc<InstanceWrapper>,
        args: &Arguments,
    );
}

/// Resolves module names for imports
pub trait ImportResolver {
    /// Resolve a dotted module name to its wrapper
    fn resolve(&self, session: &Session, module: &str) -> Option<Rc<ModuleWrapper>>;
}

/// Observes call activations without computing results
///
/// When observers are registered for a function, calling it binds the
/// parameters, feeds every observer and produces the empty set: the call is
/// being used to observe arguments, not to compute a value.
pub trait CallObserver {
    /// Called with the bound parameters of one activation
    fn on_call(&self, session: &Session, execution: &FunctionExecution, params: &[BoundParam]);
}

/// The collaborator bundle owned by a session
pub struct Collaborators {
    /// Expression evaluator
    pub evaluator: Box<dyn ExpressionEvaluator>,
    /// Argument binder
    pub binder: Box<dyn ArgumentBinder>,
    /// Reachability classifier
    pub reachability: Box<dyn ReachabilityClassifier>,
    /// Native-object bridge
    pub native: Box<dyn NativeBridge>,
    /// Return-hint providers, all consulted
    pub hints: Vec<Box<dyn ReturnHintProvider>>,
    /// Container element tracker
    pub containers: Box<dyn ContainerTracker>,
    /// Import resolver
    pub imports: Box<dyn ImportResolver>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Collaborators {
            evaluator: Box::new(BasicEvaluator),
            binder: Box::new(DefaultBinder),
            reachability: Box::new(DefaultReachability),
            native: Box::new(DefaultNativeBridge::new()),
            hints: Vec::new(),
            containers: Box::new(NullContainerTracker),
            imports: Box::new(NullImportResolver),
        }
    }
}

impl Value {
    /// Dispatch a call on this value
    pub fn call(
        &self,
        session: &Session,
        args: Rc<Arguments>,
    ) -> crate::error::EvalResult<ValueSet> {
        match self {
            Value::Class(c) => Ok(c.call(session, args)),
            Value::Function(f) => Ok(f.call(session, args)),
            Value::Instance(i) => i.call(session, args),
            // Calls on natives have no analyzable effect; stay unknown.
            Value::Native(_) => Ok(ValueSet::empty()),
            other => Err(crate::error::EvalError::NotCallable {
                on: other.describe(),
            }),
        }
    }

    /// Three-valued truthiness: instances are unknown, every other wrapper
    /// is truthy
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            Value::Instance(_) => None,
            _ => Some(true),
        }
    }
}

/// Default positional argument binder
///
/// Binds the owning instance to the first parameter of bound methods, then
/// zips remaining parameters with evaluated arguments; parameters without a
/// matching argument fall back to their default expression or stay unknown.
pub struct DefaultBinder;

impl ArgumentBinder for DefaultBinder {
    fn bind(&self, session: &Session, callee: &Value, args: &Arguments) -> Vec<BoundParam> {
        let function = match callee {
            Value::Function(f) => f,
            _ => return Vec::new(),
        };
        let params = function.params();
        let mut out = Vec::new();
        let mut arg_sets = args.eval(session).into_iter();
        let mut params = params.iter();

        if let Some(instance) = function.bound_to() {
            if let Some(param) = params.next() {
                if let Some(name) = param_name(param) {
                    out.push(BoundParam {
                        name,
                        values: ValueSet::single(Value::Instance(Rc::clone(instance))),
                    });
                }
            }
        }

        for param in params {
            let Some(name) = param_name(param) else { continue };
            let values = match arg_sets.next() {
                Some(values) => values,
                None => default_value(session, param),
            };
            out.push(BoundParam { name, values });
        }
        out
    }
}

fn param_name(param: &NodeRef) -> Option<String> {
    match param.kind() {
        NodeKind::Param(p) => param.at(p.name).name_text().map(str::to_string),
        _ => None,
    }
}

fn default_value(session: &Session, param: &NodeRef) -> ValueSet {
    match param.kind() {
        NodeKind::Param(p) => match p.default {
            Some(default) => session.collab.evaluator.eval_expr(
                session,
                &EvalContext::module(),
                &param.at(default),
            ),
            None => ValueSet::empty(),
        },
        _ => ValueSet::empty(),
    }
}

/// Default reachability: a statement sitting directly in the activation body
/// is reachable; anything nested under control flow may or may not run
pub struct DefaultReachability;

impl ReachabilityClassifier for DefaultReachability {
    fn classify(
        &self,
        _session: &Session,
        execution: &FunctionExecution,
        stmt: &NodeRef,
    ) -> Reachability {
        let funcdef = execution.function().node().id;
        let mut current = stmt.tree.parent(stmt.id);
        while let Some(node) = current {
            if node == funcdef {
                return Reachability::Reachable;
            }
            match stmt.tree.kind(node) {
                NodeKind::If(_) | NodeKind::While(_) | NodeKind::For(_) | NodeKind::Try(_) => {
                    return Reachability::PossiblyReachable;
                }
                _ => current = stmt.tree.parent(node),
            }
        }
        Reachability::PossiblyReachable
    }
}

/// Default native bridge with shared singletons
pub struct DefaultNativeBridge {
    object: Value,
    type_: Value,
    function: Value,
    method: Value,
    module: Value,
    none: Value,
    str_instance: Value,
}

impl DefaultNativeBridge {
    /// Create the bridge and its singleton objects
    pub fn new() -> Self {
        DefaultNativeBridge {
            object: Value::native(NativeObject::new(NativeKind::ObjectType, "object")),
            type_: Value::native(NativeObject::new(NativeKind::TypeType, "type")),
            function: Value::native(NativeObject::new(NativeKind::FunctionClass, "function")),
            method: Value::native(NativeObject::new(NativeKind::MethodClass, "method")),
            module: Value::native(NativeObject::new(NativeKind::ModuleClass, "module")),
            none: Value::native(NativeObject::new(NativeKind::NoneObject, "None")),
            str_instance: Value::native(NativeObject::new(NativeKind::StrInstance, "str")),
        }
    }
}

impl Default for DefaultNativeBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeBridge for DefaultNativeBridge {
    fn object_type(&self) -> Value {
        self.object.clone()
    }
    fn type_type(&self) -> Value {
        self.type_.clone()
    }
    fn function_class(&self) -> Value {
        self.function.clone()
    }
    fn method_class(&self) -> Value {
        self.method.clone()
    }
    fn module_class(&self) -> Value {
        self.module.clone()
    }
    fn none_object(&self) -> Value {
        self.none.clone()
    }
    fn str_instance(&self) -> Value {
        self.str_instance.clone()
    }
}

/// Container tracker that records nothing
pub struct NullContainerTracker;

impl ContainerTracker for NullContainerTracker {
    fn track_construction(
        &self,
        _session: &Session,
        _instance: &Rc<InstanceWrapper>,
        _args: &Arguments,
    ) {
    }
}

/// Import resolver that resolves nothing
pub struct NullImportResolver;

impl ImportResolver for NullImportResolver {
    fn resolve(&self, _session: &Session, _module: &str) -> Option<Rc<ModuleWrapper>> {
        None
    }
}

/// Minimal reference evaluator
///
/// Handles the structural core: literals, tuples, names (loop bindings,
/// activation parameters, enclosing-scope definitions), calls and attribute
/// access on instances and classes. Everything it does not understand
/// evaluates to the empty set.
pub struct BasicEvaluator;

impl ExpressionEvaluator for BasicEvaluator {
    fn eval_expr(&self, session: &Session, ctx: &EvalContext, expr: &NodeRef) -> ValueSet {
        match expr.kind() {
            NodeKind::Literal(lit) => eval_literal(session, lit),
            NodeKind::Tuple(t) => {
                let elements = t
                    .elements
                    .iter()
                    .map(|&e| self.eval_expr(session, ctx, &expr.at(e)))
                    .collect();
                ValueSet::single(Value::native(NativeObject::sequence("tuple", elements)))
            }
            NodeKind::Name(n) => resolve_name(session, ctx, expr, &n.name),
            NodeKind::Call(call) => {
                let callee = self.eval_expr(session, ctx, &expr.at(call.callee));
                let arg_nodes = call.args.iter().map(|&a| expr.at(a)).collect();
                let args = Arguments::from_nodes(session, arg_nodes, ctx.clone());
                let mut out = ValueSet::empty();
                for value in callee.iter() {
                    match value.call(session, Rc::clone(&args)) {
                        Ok(result) => out.extend(result),
                        Err(err) => session.report(
                            Diagnostic::from_eval_error(&err).with_span(expr.span()),
                        ),
                    }
                }
                out
            }
            NodeKind::Attribute(attr) => {
                let attr_name = match expr.at(attr.attr).name_text() {
                    Some(name) => name.to_string(),
                    None => return ValueSet::empty(),
                };
                let objects = self.eval_expr(session, ctx, &expr.at(attr.value));
                let mut out = ValueSet::empty();
                for object in objects.iter() {
                    out.extend(attribute_of(session, object, &attr_name));
                }
                out
            }
            _ => ValueSet::empty(),
        }
    }
}

fn eval_literal(session: &Session, lit: &Literal) -> ValueSet {
    let value = match lit {
        Literal::Int(_) => Value::native(NativeObject::new(NativeKind::Other, "int")),
        Literal::Str(_) => session.collab.native.str_instance(),
        Literal::Bool(_) => Value::native(NativeObject::new(NativeKind::Other, "bool")),
        Literal::None => session.collab.native.none_object(),
    };
    ValueSet::single(value)
}

fn attribute_of(session: &Session, object: &Value, name: &str) -> ValueSet {
    match object {
        Value::Instance(instance) => match instance.find_name(session, name) {
            Some(bindings) => ValueSet::union_all(
                bindings.iter().map(|b| resolve_binding(session, b)),
            ),
            None => ValueSet::empty(),
        },
        Value::Class(class) => match class.subscope(session, name) {
            Ok(value) => ValueSet::single(value),
            Err(err) => {
                session.report(Diagnostic::from_eval_error(&err));
                ValueSet::empty()
            }
        },
        _ => ValueSet::empty(),
    }
}

fn resolve_name(session: &Session, ctx: &EvalContext, expr: &NodeRef, name: &str) -> ValueSet {
    // Scope-local loop bindings take precedence: the yield machinery binds
    // loop variables per element while evaluating a recognized loop group.
    let mut current = expr.tree.parent(expr.id);
    while let Some(node) = current {
        if matches!(expr.tree.kind(node), NodeKind::For(_)) {
            if let Some(values) = session.loop_binding(&expr.at(node).key(), name) {
                return values;
            }
        }
        current = expr.tree.parent(node);
    }

    if let Some(activation) = &ctx.activation {
        if let Some(values) = activation.param_by_name(session, name) {
            return values;
        }
    }

    // Walk enclosing scopes outward and resolve the first definition found.
    let mut scope = expr.tree.enclosing_scope(expr.id);
    while let Some(scope_id) = scope {
        let table = expr.tree.scope_names(scope_id);
        if let Some(occurrences) = table.get(name) {
            let definitions: Vec<_> = occurrences
                .iter()
                .filter(|&&id| {
                    matches!(expr.tree.kind(id), NodeKind::Name(n) if n.is_definition)
                })
                .collect();
            if !definitions.is_empty() {
                return ValueSet::union_all(
                    definitions
                        .iter()
                        .map(|&&id| resolve_definition(session, ctx, &expr.at(id))),
                );
            }
        }
        scope = expr.tree.enclosing_scope(scope_id);
    }
    ValueSet::empty()
}

/// Resolve a definition name node to the values its definition site assigns
pub fn resolve_definition(session: &Session, ctx: &EvalContext, name_node: &NodeRef) -> ValueSet {
    let Some(parent) = name_node.parent() else {
        return ValueSet::empty();
    };
    match parent.kind() {
        NodeKind::Assign(a) => {
            session
                .collab
                .evaluator
                .eval_expr(session, ctx, &parent.at(a.value))
        }
        NodeKind::Attribute(_) => {
            // Attribute target of an assignment: resolve the assigned value.
            match parent.parent() {
                Some(grandparent) => match grandparent.kind() {
                    NodeKind::Assign(a) => session.collab.evaluator.eval_expr(
                        session,
                        ctx,
                        &grandparent.at(a.value),
                    ),
                    _ => ValueSet::empty(),
                },
                None => ValueSet::empty(),
            }
        }
        NodeKind::Function(f) if f.name == name_node.id => {
            let wrapper = session.function_wrapper(&parent, None);
            ValueSet::single(wrapper.decorated(session))
        }
        NodeKind::Class(c) if c.name == name_node.id => {
            ValueSet::single(Value::Class(session.class_wrapper(&parent)))
        }
        NodeKind::Param(_) => match &ctx.activation {
            Some(activation) => {
                let name = name_node.name_text().unwrap_or_default();
                activation
                    .param_by_name(session, name)
                    .unwrap_or_else(ValueSet::empty)
            }
            None => ValueSet::empty(),
        },
        NodeKind::Import(i) => match session.collab.imports.resolve(session, &i.module) {
            Some(module) => ValueSet::single(Value::Module(module)),
            None => ValueSet::empty(),
        },
        _ => ValueSet::empty(),
    }
}

/// Resolve a name binding to its value set
pub fn resolve_binding(session: &Session, binding: &Binding) -> ValueSet {
    use crate::names::{BindingSource, SyntheticKind};

    match &binding.source {
        BindingSource::Node(node) => {
            resolve_definition(session, &EvalContext::module(), node)
        }
        BindingSource::Element(element) => {
            let instance = element.instance();
            let ctx = EvalContext {
                activation: element.enclosing_activation(session),
                instance: Some(Rc::clone(instance)),
            };
            resolve_definition(session, &ctx, element.node())
        }
        BindingSource::Synthetic(SyntheticKind::ModuleAttr(value)) => {
            ValueSet::single(value.clone())
        }
        BindingSource::Synthetic(_) => ValueSet::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use pythia_syntax::{Span, TreeBuilder};

    fn make_span() -> Span {
        Span::synthetic()
    }

    #[test]
    fn test_literal_evaluation() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let lit = b.int(7, make_span());
        let stmt = b.expr_stmt(lit, make_span());
        let tree = Rc::new(b.finish(vec![stmt], None, None));

        let expr = pythia_syntax::NodeRef::new(Rc::clone(&tree), lit);
        let values = session
            .collab
            .evaluator
            .eval_expr(&session, &EvalContext::module(), &expr);
        assert_eq!(values.len(), 1);
        let value = values.any_one().unwrap();
        assert_eq!(value.as_native().unwrap().name(), "int");
    }

    #[test]
    fn test_tuple_evaluates_to_ordered_sequence() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let one = b.int(1, make_span());
        let two = b.int(2, make_span());
        let tuple = b.tuple(vec![one, two], make_span());
        let stmt = b.expr_stmt(tuple, make_span());
        let tree = Rc::new(b.finish(vec![stmt], None, None));

        let expr = pythia_syntax::NodeRef::new(Rc::clone(&tree), tuple);
        let values = session
            .collab
            .evaluator
            .eval_expr(&session, &EvalContext::module(), &expr);
        let value = values.any_one().unwrap();
        let native = value.as_native().unwrap();
        assert_eq!(native.elements().len(), 2);
    }

    #[test]
    fn test_name_resolves_module_assignment() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // x = 3
        // x
        let three = b.int(3, make_span());
        let target = b.name("x", make_span());
        let assign = b.assign(vec![target], three, make_span());
        let reference = b.name("x", make_span());
        let use_stmt = b.expr_stmt(reference, make_span());
        let tree = Rc::new(b.finish(vec![assign, use_stmt], None, None));

        let expr = pythia_syntax::NodeRef::new(Rc::clone(&tree), reference);
        let values = session
            .collab
            .evaluator
            .eval_expr(&session, &EvalContext::module(), &expr);
        assert_eq!(values.len(), 1);
        assert_eq!(values.any_one().unwrap().as_native().unwrap().name(), "int");
    }

    #[test]
    fn test_unknown_name_is_empty() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let reference = b.name("missing", make_span());
        let stmt = b.expr_stmt(reference, make_span());
        let tree = Rc::new(b.finish(vec![stmt], None, None));

        let expr = pythia_syntax::NodeRef::new(Rc::clone(&tree), reference);
        let values = session
            .collab
            .evaluator
            .eval_expr(&session, &EvalContext::module(), &expr);
        assert!(values.is_empty());
    }
}
