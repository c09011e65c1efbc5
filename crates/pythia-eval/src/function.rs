//! Function wrapper and decorator resolution
//!
//! A `FunctionWrapper` overlays a function definition (or lambda) with call
//! behavior. Decorator resolution reproduces application semantics: the
//! decorator textually nearest the definition is applied first, each outer
//! decorator wraps the previous result, and any resolution failure degrades
//! to the undecorated function with a warning rather than an error.

use crate::collab::{Arguments, EvalContext};
use crate::diagnostic::{codes, Diagnostic};
use crate::execution::FunctionExecution;
use crate::instance::InstanceWrapper;
use crate::names::{scope_layer, NameMap};
use crate::session::Session;
use crate::value::{Value, ValueSet};
use pythia_syntax::{NodeKind, NodeRef};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

enum DecoratedMemo {
    Empty,
    InProgress,
    Done(Value),
}

/// Evaluation wrapper around a function definition
pub struct FunctionWrapper {
    node: NodeRef,
    bound_to: Option<Rc<InstanceWrapper>>,
    decorated: RefCell<DecoratedMemo>,
    decorates: RefCell<Option<Rc<FunctionWrapper>>>,
}

impl FunctionWrapper {
    pub(crate) fn new(node: NodeRef, bound_to: Option<Rc<InstanceWrapper>>) -> Self {
        FunctionWrapper {
            node,
            bound_to,
            decorated: RefCell::new(DecoratedMemo::Empty),
            decorates: RefCell::new(None),
        }
    }

    /// The underlying function node
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// The instance this wrapper is bound to, for methods looked up through
    /// an instance
    pub fn bound_to(&self) -> Option<&Rc<InstanceWrapper>> {
        self.bound_to.as_ref()
    }

    /// The function name (`<lambda>` for lambdas)
    pub fn name(&self) -> String {
        match self.node.kind() {
            NodeKind::Function(f) => self
                .node
                .at(f.name)
                .name_text()
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }

    /// Whether the definition is a lambda
    pub fn is_lambda(&self) -> bool {
        matches!(self.node.kind(), NodeKind::Function(f) if f.is_lambda)
    }

    /// Whether the definition contains a yield
    pub fn is_generator(&self) -> bool {
        self.node.tree.is_generator(self.node.id)
    }

    /// Parameter nodes in declaration order
    pub fn params(&self) -> Vec<NodeRef> {
        match self.node.kind() {
            NodeKind::Function(f) => f.params.iter().map(|&p| self.node.at(p)).collect(),
            _ => Vec::new(),
        }
    }

    /// Declared annotations: parameter name to annotation expression, plus
    /// `"return"` for the return annotation when present
    pub fn annotations(&self) -> FxHashMap<String, NodeRef> {
        let mut out = FxHashMap::default();
        let NodeKind::Function(f) = self.node.kind() else {
            return out;
        };
        if let Some(ann) = f.return_annotation {
            out.insert("return".to_string(), self.node.at(ann));
        }
        for &param in &f.params {
            if let NodeKind::Param(p) = self.node.tree.kind(param) {
                if let (Some(name), Some(ann)) =
                    (self.node.tree.name_text(p.name), p.annotation)
                {
                    out.insert(name.to_string(), self.node.at(ann));
                }
            }
        }
        out
    }

    /// The original wrapper this one was produced from by a decorator
    pub fn decorates(&self) -> Option<Rc<FunctionWrapper>> {
        self.decorates.borrow().clone()
    }

    pub(crate) fn set_decorates(&self, original: Rc<FunctionWrapper>) {
        *self.decorates.borrow_mut() = Some(original);
    }

    /// The effective function after decorator application, memoized
    ///
    /// Failures are non-fatal: an unresolvable or empty-result decorator
    /// chain produces the undecorated function plus a warning.
    pub fn decorated(self: &Rc<Self>, session: &Session) -> Value {
        match &*self.decorated.borrow() {
            DecoratedMemo::Done(value) => return value.clone(),
            DecoratedMemo::InProgress => return Value::Function(Rc::clone(self)),
            DecoratedMemo::Empty => {}
        }
        *self.decorated.borrow_mut() = DecoratedMemo::InProgress;
        let result = self.resolve_decorators(session);
        *self.decorated.borrow_mut() = DecoratedMemo::Done(result.clone());
        result
    }

    fn resolve_decorators(self: &Rc<Self>, session: &Session) -> Value {
        let undecorated = Value::Function(Rc::clone(self));
        let decorators = match self.node.kind() {
            NodeKind::Function(f) if !f.is_lambda => f.decorators.clone(),
            _ => return undecorated,
        };
        if decorators.is_empty() {
            return undecorated;
        }

        let mut current = undecorated.clone();
        // Innermost decorator first: reversed textual order.
        for &dec_id in decorators.iter().rev() {
            let dec = self.node.at(dec_id);
            let NodeKind::Decorator(d) = dec.kind() else { continue };

            let mut dec_values = session.collab.evaluator.eval_expr(
                session,
                &EvalContext::module(),
                &dec.at(d.callee),
            );
            // A parenthesized decorator is itself called first; its results
            // are the actual decorators.
            if let Some(call_args) = &d.call_args {
                let nodes = call_args.iter().map(|&a| dec.at(a)).collect();
                let args = Arguments::from_nodes(session, nodes, EvalContext::module());
                let mut called = ValueSet::empty();
                for value in dec_values.iter() {
                    match value.call(session, Rc::clone(&args)) {
                        Ok(result) => called.extend(result),
                        Err(err) => session
                            .report(Diagnostic::from_eval_error(&err).with_span(dec.span())),
                    }
                }
                dec_values = called;
            }

            if dec_values.is_empty() {
                session.report(
                    Diagnostic::warning(format!(
                        "decorator on '{}' could not be resolved",
                        self.name()
                    ))
                    .with_code(codes::DECORATOR_UNRESOLVED)
                    .with_span(dec.span()),
                );
                return undecorated;
            }
            if dec_values.len() > 1 {
                session.report(
                    Diagnostic::warning(format!(
                        "multiple values for decorator on '{}'",
                        self.name()
                    ))
                    .with_code(codes::DECORATOR_AMBIGUOUS)
                    .with_span(dec.span()),
                );
            }
            let decorator = dec_values.any_one().cloned().unwrap_or(undecorated.clone());

            let args =
                Arguments::from_values(session, vec![ValueSet::single(current.clone())]);
            let wrappers = match decorator.call(session, args) {
                Ok(result) => result,
                Err(err) => {
                    session.report(Diagnostic::from_eval_error(&err).with_span(dec.span()));
                    ValueSet::empty()
                }
            };
            if wrappers.is_empty() {
                session.report(
                    Diagnostic::warning(format!(
                        "decorator on '{}' produced no result",
                        self.name()
                    ))
                    .with_code(codes::DECORATOR_NO_RESULT)
                    .with_span(dec.span()),
                );
                return undecorated;
            }
            if wrappers.len() > 1 {
                session.report(
                    Diagnostic::warning(format!(
                        "multiple wrappers for decorated '{}'",
                        self.name()
                    ))
                    .with_code(codes::DECORATOR_AMBIGUOUS)
                    .with_span(dec.span()),
                );
            }
            current = wrappers.any_one().cloned().unwrap_or(undecorated.clone());

            // The effective function records where it came from.
            match &current {
                Value::Function(f) if !Rc::ptr_eq(f, self) => {
                    f.set_decorates(Rc::clone(self));
                }
                Value::Instance(i) => i.set_decorates(Rc::clone(self)),
                _ => {}
            }
        }
        current
    }

    /// The synthetic class of this function: methods when the lexical parent
    /// scope is a class, plain functions otherwise
    pub fn class_of(&self, session: &Session) -> Value {
        let parent_scope = self.node.tree.enclosing_scope(self.node.id);
        match parent_scope.map(|s| self.node.tree.kind(s)) {
            Some(NodeKind::Class(_)) => session.collab.native.method_class(),
            _ => session.collab.native.function_class(),
        }
    }

    /// Call the function
    ///
    /// Generator definitions produce a generator value wrapping
    /// `(self, args)`; plain functions run a fresh activation's return-type
    /// inference.
    pub fn call(self: &Rc<Self>, session: &Session, args: Rc<Arguments>) -> ValueSet {
        if self.is_generator() {
            return ValueSet::single(Value::Generator(Rc::new(GeneratorValue::new(
                Rc::clone(self),
                args,
            ))));
        }
        let execution = FunctionExecution::new(session, Rc::clone(self), args);
        execution.return_types(session, false)
    }

    /// Layered namespace; functions contribute their own scope when searched
    /// globally and nothing analyzable otherwise (their class is native)
    pub fn name_layers(&self, search_global: bool) -> Vec<NameMap> {
        if search_global {
            vec![scope_layer(&self.node.tree, self.node.id)]
        } else {
            Vec::new()
        }
    }
}

impl fmt::Debug for FunctionWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name())
    }
}

/// A generator value: a generator function paired with call arguments
///
/// Iterating it runs the activation's yield inference.
pub struct GeneratorValue {
    function: Rc<FunctionWrapper>,
    args: Rc<Arguments>,
}

impl GeneratorValue {
    pub(crate) fn new(function: Rc<FunctionWrapper>, args: Rc<Arguments>) -> Self {
        GeneratorValue { function, args }
    }

    /// The generator function
    pub fn function(&self) -> &Rc<FunctionWrapper> {
        &self.function
    }

    /// Ordered element value sets produced by iterating the generator
    pub fn iterate(&self, session: &Session) -> Vec<ValueSet> {
        let execution =
            FunctionExecution::new(session, Rc::clone(&self.function), Rc::clone(&self.args));
        execution.yield_types(session)
    }
}

impl fmt::Debug for GeneratorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<generator of {}>", self.function.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pythia_syntax::{NodeId, Span, TreeBuilder};

    fn make_span() -> Span {
        Span::synthetic()
    }

    fn node(tree: &Rc<pythia_syntax::ModuleTree>, id: NodeId) -> NodeRef {
        NodeRef::new(Rc::clone(tree), id)
    }

    #[test]
    fn test_class_of_distinguishes_methods() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let method = b.function_def("m", vec![], vec![], vec![], make_span());
        let class = b.class_def("C", None, vec![], vec![method], make_span());
        let plain = b.function_def("f", vec![], vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![class, plain], None, None));

        let method_wrapper = session.function_wrapper(&node(&tree, method), None);
        let plain_wrapper = session.function_wrapper(&node(&tree, plain), None);

        assert_eq!(
            method_wrapper.class_of(&session),
            session.collab.native.method_class()
        );
        assert_eq!(
            plain_wrapper.class_of(&session),
            session.collab.native.function_class()
        );
    }

    #[test]
    fn test_identity_decorator_keeps_function() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // def identity(f): return f
        let param = b.param("f", make_span());
        let f_ref = b.name("f", make_span());
        let ret = b.ret(Some(f_ref), make_span());
        let identity = b.function_def("identity", vec![param], vec![], vec![ret], make_span());
        // @identity
        // def g(): return 1
        let dec_callee = b.name("identity", make_span());
        let dec = b.decorator(dec_callee, None, make_span());
        let one = b.int(1, make_span());
        let ret_g = b.ret(Some(one), make_span());
        let g = b.function_def("g", vec![], vec![dec], vec![ret_g], make_span());
        let tree = Rc::new(b.finish(vec![identity, g], None, None));

        let g_wrapper = session.function_wrapper(&node(&tree, g), None);
        let decorated = g_wrapper.decorated(&session);

        assert_eq!(decorated, Value::Function(Rc::clone(&g_wrapper)));
        // Call behavior is unchanged: g() still infers the integer.
        let result = decorated
            .call(&session, Arguments::none(&session))
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.any_one().unwrap().as_native().unwrap().name(), "int");
    }

    #[test]
    fn test_replacing_decorator_sets_back_link() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // def replacement(): return 'x'
        let x = b.str("x", make_span());
        let ret_r = b.ret(Some(x), make_span());
        let replacement = b.function_def("replacement", vec![], vec![], vec![ret_r], make_span());
        // def make(f): return replacement
        let param = b.param("f", make_span());
        let repl_ref = b.name("replacement", make_span());
        let ret_m = b.ret(Some(repl_ref), make_span());
        let make = b.function_def("make", vec![param], vec![], vec![ret_m], make_span());
        // @make
        // def g(): return 1
        let dec_callee = b.name("make", make_span());
        let dec = b.decorator(dec_callee, None, make_span());
        let one = b.int(1, make_span());
        let ret_g = b.ret(Some(one), make_span());
        let g = b.function_def("g", vec![], vec![dec], vec![ret_g], make_span());
        let tree = Rc::new(b.finish(vec![replacement, make, g], None, None));

        let g_wrapper = session.function_wrapper(&node(&tree, g), None);
        let decorated = g_wrapper.decorated(&session);

        let effective = decorated.as_function().expect("function expected");
        assert_eq!(effective.name(), "replacement");
        let back = effective.decorates().expect("back-link expected");
        assert!(Rc::ptr_eq(&back, &g_wrapper));

        // Call behavior now follows the replacement.
        let result = decorated
            .call(&session, Arguments::none(&session))
            .unwrap();
        assert_eq!(
            result.any_one().unwrap().as_native().unwrap().name(),
            "str"
        );
    }

    #[test]
    fn test_unresolved_decorator_degrades_gracefully() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let dec_callee = b.name("missing", make_span());
        let dec = b.decorator(dec_callee, None, make_span());
        let one = b.int(1, make_span());
        let ret = b.ret(Some(one), make_span());
        let g = b.function_def("g", vec![], vec![dec], vec![ret], make_span());
        let tree = Rc::new(b.finish(vec![g], None, None));

        let g_wrapper = session.function_wrapper(&node(&tree, g), None);
        let decorated = g_wrapper.decorated(&session);

        assert_eq!(decorated, Value::Function(g_wrapper));
        assert!(session.has_diagnostic("W4101"));
    }

    #[test]
    fn test_generator_call_produces_generator_value() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let one = b.int(1, make_span());
        let yield_stmt = b.yield_stmt(Some(one), false, make_span());
        let g = b.function_def("g", vec![], vec![], vec![yield_stmt], make_span());
        let tree = Rc::new(b.finish(vec![g], None, None));

        let wrapper = session.function_wrapper(&node(&tree, g), None);
        let result = wrapper.call(&session, Arguments::none(&session));
        assert_eq!(result.len(), 1);
        assert!(matches!(result.any_one().unwrap(), Value::Generator(_)));
    }
}
