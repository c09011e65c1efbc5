//! Function execution contexts
//!
//! One `FunctionExecution` models a single call activation: it carries the
//! bound arguments, the activation-local reparenting side-table, and the
//! return/yield inference for that activation. The shared syntax tree is
//! never copied or mutated; nodes whose effective lexical parent differs in
//! this activation are recorded in the side-table instead.
//!
//! Termination on recursive and mutually recursive functions comes from two
//! session-level mechanisms: the activation-result cache marks results as
//! in-progress while they are computed (reentrant requests observe the
//! empty set), and the recursion guard bounds simultaneous activations per
//! function definition.

use crate::collab::{Arguments, BoundParam, EvalContext, Reachability};
use crate::function::FunctionWrapper;
use crate::instance::iterate_values;
use crate::names::{scope_layer, NameMap};
use crate::session::{ActivationEntry, Session};
use crate::value::ValueSet;
use once_cell::unsync::OnceCell;
use pythia_syntax::{NodeId, NodeKind, NodeRef};
use rustc_hash::FxHashSet;
use std::fmt;
use std::rc::Rc;

/// The effective lexical parent of a node within one activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveParent {
    /// The activation itself (immediate children of the executed body)
    Activation,
    /// An ordinary tree node
    Node(NodeId),
    /// No parent (the tree root)
    Detached,
}

/// One call activation of a function
pub struct FunctionExecution {
    id: u64,
    function: Rc<FunctionWrapper>,
    args: Rc<Arguments>,
    reparented: FxHashSet<NodeId>,
    bound: OnceCell<Vec<BoundParam>>,
}

impl FunctionExecution {
    /// Create an activation of `function` with `args`
    pub fn new(
        session: &Session,
        function: Rc<FunctionWrapper>,
        args: Rc<Arguments>,
    ) -> Rc<Self> {
        let reparented = function
            .node()
            .tree
            .scope_body(function.node().id)
            .iter()
            .copied()
            .collect();
        Rc::new(FunctionExecution {
            id: session.next_id(),
            function,
            args,
            reparented,
            bound: OnceCell::new(),
        })
    }

    /// Session-unique activation id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The activated function
    pub fn function(&self) -> &Rc<FunctionWrapper> {
        &self.function
    }

    /// The activation's arguments
    pub fn args(&self) -> &Rc<Arguments> {
        &self.args
    }

    /// The effective lexical parent of `node` in this activation
    pub fn effective_parent(&self, node: &NodeRef) -> EffectiveParent {
        if self.reparented.contains(&node.id) {
            return EffectiveParent::Activation;
        }
        match node.tree.parent(node.id) {
            Some(parent) => EffectiveParent::Node(parent),
            None => EffectiveParent::Detached,
        }
    }

    /// Parameter bindings of this activation, memoized
    pub fn bound_params(&self, session: &Session) -> &[BoundParam] {
        self.bound.get_or_init(|| {
            session.collab.binder.bind(
                session,
                &crate::value::Value::Function(Rc::clone(&self.function)),
                &self.args,
            )
        })
    }

    /// The bound value set of one parameter
    pub fn param_by_name(&self, session: &Session, name: &str) -> Option<ValueSet> {
        self.bound_params(session)
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.values.clone())
    }

    /// The activation's own scope names
    pub fn name_layers(&self) -> Vec<NameMap> {
        vec![scope_layer(
            &self.function.node().tree,
            self.function.node().id,
        )]
    }

    /// Inferred return types of this activation
    ///
    /// Memoized per (function, arguments, `check_yields`); an in-progress or
    /// budget-exhausted request yields the empty set so that recursive
    /// definitions terminate instead of reentering.
    pub fn return_types(self: &Rc<Self>, session: &Session, check_yields: bool) -> ValueSet {
        let funcdef = self.function.node().key();
        let key = (funcdef, self.args.id(), check_yields);
        match session.activation_lookup(&key) {
            Some(ActivationEntry::Done(result)) => return result,
            Some(ActivationEntry::InProgress) => return ValueSet::empty(),
            None => {}
        }
        if !session.recursion_push(funcdef) {
            return ValueSet::empty();
        }
        session.activation_begin(key);
        let result = self.infer(session, check_yields);
        session.activation_finish(key, result.clone());
        session.recursion_pop(funcdef);
        result
    }

    fn infer(self: &Rc<Self>, session: &Session, check_yields: bool) -> ValueSet {
        let node = self.function.node();
        let ctx = EvalContext::in_activation(Rc::clone(self));

        // A lambda body is its single expression.
        if self.function.is_lambda() {
            if let Some(&stmt) = node.tree.scope_body(node.id).last() {
                if let NodeKind::ExprStmt(e) = node.tree.kind(stmt) {
                    return session
                        .collab
                        .evaluator
                        .eval_expr(session, &ctx, &node.at(e.value));
                }
            }
            return ValueSet::empty();
        }

        // Registered observers consume the bound parameters; the call is an
        // observation, not a computation.
        let observers = session.observers_for(node.key());
        if !observers.is_empty() {
            let params = self.bound_params(session).to_vec();
            for observer in observers {
                observer.on_call(session, self, &params);
            }
            return ValueSet::empty();
        }

        let statements = if check_yields {
            node.tree.yields_in(node.id)
        } else {
            node.tree.returns_in(node.id)
        };
        let mut types = if check_yields {
            ValueSet::empty()
        } else {
            ValueSet::union_all(
                session
                    .collab
                    .hints
                    .iter()
                    .map(|h| h.return_hints(session, &self.function)),
            )
        };

        for stmt_id in statements {
            let stmt = node.at(stmt_id);
            let reach = session.collab.reachability.classify(session, self, &stmt);
            if reach == Reachability::Unreachable {
                // Dead code is skipped without being evaluated.
                continue;
            }
            if check_yields {
                types.extend(ValueSet::union_all(self.eval_yield(session, &stmt)));
            } else if let NodeKind::Return(r) = stmt.kind() {
                match r.value {
                    Some(value) => types.extend(session.collab.evaluator.eval_expr(
                        session,
                        &ctx,
                        &stmt.at(value),
                    )),
                    None => types.insert(session.collab.native.none_object()),
                }
            }
            if reach == Reachability::Reachable {
                // Everything after an unconditional return is dead.
                break;
            }
        }
        types
    }

    /// Evaluate one yield statement to its sequence of element sets
    ///
    /// A delegating yield expands through the iteration protocol of its
    /// operand; a plain yield contributes the operand itself.
    fn eval_yield(self: &Rc<Self>, session: &Session, stmt: &NodeRef) -> Vec<ValueSet> {
        let NodeKind::Yield(y) = stmt.kind() else {
            return Vec::new();
        };
        let ctx = EvalContext::in_activation(Rc::clone(self));
        match y.value {
            None => vec![ValueSet::single(session.collab.native.none_object())],
            Some(value) => {
                let values =
                    session
                        .collab
                        .evaluator
                        .eval_expr(session, &ctx, &stmt.at(value));
                if y.delegate {
                    iterate_values(session, &values)
                } else {
                    vec![values]
                }
            }
        }
    }

    /// Ordered yield inference for generator activations
    ///
    /// Yields are grouped by their innermost enclosing simple single-target
    /// `for` loop when that loop sits directly in this function's body; each
    /// group is produced element by element with the loop variable bound to
    /// the element's value set. Any yield under more complex control flow
    /// degrades the whole activation to the unordered union.
    pub fn yield_types(self: &Rc<Self>, session: &Session) -> Vec<ValueSet> {
        let funcdef = self.function.node().key();
        if !session.recursion_push(funcdef) {
            return Vec::new();
        }
        let result = self.infer_yields(session);
        session.recursion_pop(funcdef);
        result
    }

    fn infer_yields(self: &Rc<Self>, session: &Session) -> Vec<ValueSet> {
        let node = self.function.node();
        let tree = &node.tree;

        enum Stop {
            Plain,
            Loop(NodeId),
            Complex,
        }

        let mut groups: Vec<(Option<NodeId>, Vec<NodeId>)> = Vec::new();
        let mut last_loop: Option<NodeId> = None;
        for yield_id in tree.yields_in(node.id) {
            let mut stop = Stop::Complex;
            let mut current = tree.parent(yield_id);
            while let Some(ancestor) = current {
                if ancestor == node.id {
                    stop = Stop::Plain;
                    break;
                }
                match tree.kind(ancestor) {
                    NodeKind::For(_) => {
                        stop = Stop::Loop(ancestor);
                        break;
                    }
                    NodeKind::While(_) | NodeKind::If(_) => {
                        stop = Stop::Complex;
                        break;
                    }
                    _ => current = tree.parent(ancestor),
                }
            }

            match stop {
                Stop::Plain => {
                    groups.push((None, vec![yield_id]));
                    last_loop = None;
                }
                Stop::Loop(loop_id) => {
                    let simple = tree.parent(loop_id) == Some(node.id)
                        && matches!(
                            tree.kind(loop_id),
                            NodeKind::For(f) if f.targets.len() == 1
                                && matches!(tree.kind(f.targets[0]), NodeKind::Name(_))
                        );
                    if !simple {
                        // Not a predictable loop; give up on ordering.
                        return vec![self.return_types(session, true)];
                    }
                    if last_loop == Some(loop_id) {
                        if let Some(last) = groups.last_mut() {
                            last.1.push(yield_id);
                        }
                    } else {
                        groups.push((Some(loop_id), vec![yield_id]));
                        last_loop = Some(loop_id);
                    }
                }
                Stop::Complex => {
                    return vec![self.return_types(session, true)];
                }
            }
        }

        let ctx = EvalContext::in_activation(Rc::clone(self));
        let mut out = Vec::new();
        for (loop_id, yields) in groups {
            match loop_id {
                None => {
                    for yield_id in yields {
                        out.extend(self.eval_yield(session, &node.at(yield_id)));
                    }
                }
                Some(loop_id) => {
                    let NodeKind::For(f) = tree.kind(loop_id) else { continue };
                    let Some(target) = tree.name_text(f.targets[0]).map(str::to_string)
                    else {
                        continue;
                    };
                    let source = session.collab.evaluator.eval_expr(
                        session,
                        &ctx,
                        &node.at(f.iter),
                    );
                    let loop_key = node.at(loop_id).key();
                    for element in iterate_values(session, &source) {
                        session.set_loop_binding(loop_key, &target, element);
                        for &yield_id in &yields {
                            out.extend(self.eval_yield(session, &node.at(yield_id)));
                        }
                        session.clear_loop_bindings(loop_key);
                    }
                }
            }
        }
        out
    }
}

impl fmt::Debug for FunctionExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<execution of {}>", self.function.name())
    }
}
