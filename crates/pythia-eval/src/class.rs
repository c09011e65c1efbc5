//! Class wrapper
//!
//! Overlays a class definition node with evaluation behavior: base
//! evaluation, method-resolution order, instantiation and attribute search.
//!
//! The MRO is the append-based simplification, not C3: the class itself,
//! then each base in declaration order followed by that base's own
//! linearization, with duplicates skipped. Bases that do not expose an MRO
//! (non-class values) are skipped silently.

use crate::collab::{Arguments, EvalContext};
use crate::error::{EvalError, EvalResult};
use crate::names::{scope_layer, NameMap};
use crate::session::Session;
use crate::value::{Value, ValueSet};
use pythia_syntax::{NodeKind, NodeRef};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

enum MroMemo {
    Empty,
    InProgress,
    Done(Vec<Value>),
}

/// Evaluation wrapper around a class definition
pub struct ClassWrapper {
    node: NodeRef,
    bases: RefCell<Option<Vec<Value>>>,
    mro: RefCell<MroMemo>,
}

impl ClassWrapper {
    pub(crate) fn new(node: NodeRef) -> Self {
        ClassWrapper {
            node,
            bases: RefCell::new(None),
            mro: RefCell::new(MroMemo::Empty),
        }
    }

    /// The underlying class node
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// The class name
    pub fn name(&self) -> String {
        match self.node.kind() {
            NodeKind::Class(c) => self
                .node
                .at(c.name)
                .name_text()
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }

    /// Base classes, memoized
    ///
    /// An explicit base-argument list is evaluated argument by argument and
    /// the resulting sets are flattened in declaration order; without one,
    /// the single base is the native `object` type.
    pub fn bases(&self, session: &Session) -> Vec<Value> {
        if let Some(bases) = &*self.bases.borrow() {
            return bases.clone();
        }
        let bases = match self.node.kind() {
            NodeKind::Class(c) => match &c.bases {
                Some(exprs) if !exprs.is_empty() => {
                    let nodes = exprs.iter().map(|&e| self.node.at(e)).collect();
                    let args = Arguments::from_nodes(session, nodes, EvalContext::module());
                    let mut out = Vec::new();
                    for set in args.eval(session) {
                        out.extend(set.into_iter());
                    }
                    out
                }
                _ => vec![session.collab.native.object_type()],
            },
            _ => Vec::new(),
        };
        *self.bases.borrow_mut() = Some(bases.clone());
        bases
    }

    /// Method-resolution order, memoized; always begins with this class
    pub fn mro(self: &Rc<Self>, session: &Session) -> Vec<Value> {
        match &*self.mro.borrow() {
            MroMemo::Done(mro) => return mro.clone(),
            // Reentrant request while linearizing (a class among its own
            // bases): degrade to the class alone.
            MroMemo::InProgress => return vec![Value::Class(Rc::clone(self))],
            MroMemo::Empty => {}
        }
        *self.mro.borrow_mut() = MroMemo::InProgress;

        let mut mro: Vec<Value> = vec![Value::Class(Rc::clone(self))];
        let mut add = |value: &Value, mro: &mut Vec<Value>| {
            if !mro.contains(value) {
                mro.push(value.clone());
            }
        };
        for base in self.bases(session) {
            let Some(base_mro) = mro_of(session, &base) else {
                // Not a class-like value; skipped, not an error.
                continue;
            };
            add(&base, &mut mro);
            for entry in base_mro {
                add(&entry, &mut mro);
            }
        }

        *self.mro.borrow_mut() = MroMemo::Done(mro.clone());
        mro
    }

    /// Instantiate: a singleton set with the instance for `(class, args)`
    pub fn call(self: &Rc<Self>, session: &Session, args: Rc<Arguments>) -> ValueSet {
        let instance = session.instance(self, args, false);
        ValueSet::single(Value::Instance(instance))
    }

    /// Find a method or nested class by name
    ///
    /// Searches the MRO in order; within each class its own sub-scopes in
    /// reverse declaration order, so redefinitions shadow earlier ones.
    pub fn subscope_node(self: &Rc<Self>, session: &Session, name: &str) -> EvalResult<NodeRef> {
        for entry in self.mro(session) {
            let Value::Class(class) = entry else { continue };
            for &sub in class.node.tree.sub_scopes(class.node.id).iter().rev() {
                let sub_name = match class.node.tree.kind(sub) {
                    NodeKind::Function(f) => class.node.tree.name_text(f.name),
                    NodeKind::Class(c) => class.node.tree.name_text(c.name),
                    _ => None,
                };
                if sub_name == Some(name) {
                    return Ok(class.node.at(sub));
                }
            }
        }
        Err(EvalError::SubscopeNotFound {
            name: name.to_string(),
            on: format!("class {}", self.name()),
        })
    }

    /// Find a sub-scope and wrap it as a value (unbound)
    pub fn subscope(self: &Rc<Self>, session: &Session, name: &str) -> EvalResult<Value> {
        let node = self.subscope_node(session, name)?;
        Ok(match node.kind() {
            NodeKind::Class(_) => Value::Class(session.class_wrapper(&node)),
            _ => Value::Function(session.function_wrapper(&node, None)),
        })
    }

    /// Parameters of `__init__`, empty for `object.__init__`
    pub fn init_params(self: &Rc<Self>, session: &Session) -> Vec<NodeRef> {
        match self.subscope_node(session, "__init__") {
            Ok(node) => match node.kind() {
                NodeKind::Function(f) => f.params.iter().map(|&p| node.at(p)).collect(),
                _ => Vec::new(),
            },
            Err(_) => Vec::new(),
        }
    }

    /// The class of a class is the native `type`
    pub fn class_of(&self, session: &Session) -> Value {
        session.collab.native.type_type()
    }

    /// Layered namespace of the class
    ///
    /// Searching globally yields only the class's own scope; otherwise one
    /// layer per MRO entry (native entries contribute nothing analyzable).
    pub fn name_layers(self: &Rc<Self>, session: &Session, search_global: bool) -> Vec<NameMap> {
        if search_global {
            return vec![scope_layer(&self.node.tree, self.node.id)];
        }
        self.mro(session)
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Class(class) => {
                    Some(scope_layer(&class.node.tree, class.node.id))
                }
                _ => None,
            })
            .collect()
    }
}

/// The linearization a base contributes, when it has one
fn mro_of(session: &Session, base: &Value) -> Option<Vec<Value>> {
    match base {
        Value::Class(class) => Some(class.mro(session)),
        Value::Native(native) if native.is_type() => Some(vec![base.clone()]),
        _ => None,
    }
}

impl fmt::Debug for ClassWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class {}>", self.name())
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
    fn test_mro_without_bases() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let class = b.class_def("C", None, vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![class], None, None));

        let wrapper = session.class_wrapper(&node(&tree, class));
        let mro = wrapper.mro(&session);

        assert_eq!(mro.len(), 2);
        assert_eq!(mro[0], Value::Class(Rc::clone(&wrapper)));
        assert_eq!(mro[1], session.collab.native.object_type());
    }

    #[test]
    fn test_mro_starts_with_self_and_deduplicates_diamond() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class A: pass
        // class B(A): pass
        // class C(A): pass
        // class D(B, C): pass
        let a = b.class_def("A", None, vec![], vec![], make_span());
        let a_ref1 = b.name("A", make_span());
        let bb = b.class_def("B", Some(vec![a_ref1]), vec![], vec![], make_span());
        let a_ref2 = b.name("A", make_span());
        let cc = b.class_def("C", Some(vec![a_ref2]), vec![], vec![], make_span());
        let b_ref = b.name("B", make_span());
        let c_ref = b.name("C", make_span());
        let dd = b.class_def("D", Some(vec![b_ref, c_ref]), vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![a, bb, cc, dd], None, None));

        let d_wrapper = session.class_wrapper(&node(&tree, dd));
        let mro = d_wrapper.mro(&session);

        assert_eq!(mro[0], Value::Class(Rc::clone(&d_wrapper)));
        // D, B, A, object, C with no duplicate entries.
        assert_eq!(mro.len(), 5);
        let mut seen = Vec::new();
        for entry in &mro {
            assert!(!seen.contains(entry), "duplicate mro entry {:?}", entry);
            seen.push(entry.clone());
        }
        let b_wrapper = session.class_wrapper(&node(&tree, bb));
        let c_wrapper = session.class_wrapper(&node(&tree, cc));
        let a_wrapper = session.class_wrapper(&node(&tree, a));
        assert!(mro.contains(&Value::Class(b_wrapper)));
        assert!(mro.contains(&Value::Class(c_wrapper)));
        assert!(mro.contains(&Value::Class(a_wrapper)));
    }

    #[test]
    fn test_non_class_bases_are_skipped() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class C(1): pass  -- the literal contributes no mro
        let one = b.int(1, make_span());
        let class = b.class_def("C", Some(vec![one]), vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![class], None, None));

        let wrapper = session.class_wrapper(&node(&tree, class));
        let mro = wrapper.mro(&session);
        assert_eq!(mro.len(), 1);
        assert_eq!(mro[0], Value::Class(wrapper));
    }

    #[test]
    fn test_subscope_prefers_later_definition() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let first = b.function_def("m", vec![], vec![], vec![], make_span());
        let second = b.function_def("m", vec![], vec![], vec![], make_span());
        let class = b.class_def("C", None, vec![], vec![first, second], make_span());
        let tree = Rc::new(b.finish(vec![class], None, None));

        let wrapper = session.class_wrapper(&node(&tree, class));
        let found = wrapper.subscope_node(&session, "m").unwrap();
        assert_eq!(found.id, second);
    }

    #[test]
    fn test_subscope_searches_ancestors() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let method = b.function_def("inherited", vec![], vec![], vec![], make_span());
        let base = b.class_def("Base", None, vec![], vec![method], make_span());
        let base_ref = b.name("Base", make_span());
        let derived = b.class_def("Derived", Some(vec![base_ref]), vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![base, derived], None, None));

        let wrapper = session.class_wrapper(&node(&tree, derived));
        let found = wrapper.subscope_node(&session, "inherited").unwrap();
        assert_eq!(found.id, method);

        let missing = wrapper.subscope_node(&session, "absent");
        assert!(matches!(
            missing,
            Err(EvalError::SubscopeNotFound { .. })
        ));
    }

    #[test]
    fn test_instantiation_identity() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let class = b.class_def("C", None, vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![class], None, None));

        let wrapper = session.class_wrapper(&node(&tree, class));
        let args = Arguments::none(&session);
        let first = wrapper.call(&session, Rc::clone(&args));
        let second = wrapper.call(&session, args);
        assert_eq!(first, second);

        // A different argument list produces a different instance.
        let other = wrapper.call(&session, Arguments::none(&session));
        assert_ne!(first, other);
    }
}
