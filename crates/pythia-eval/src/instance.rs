//! Instance wrapper and instance-element projection
//!
//! An `InstanceWrapper` models one instantiation of a class. Its namespace
//! is layered: attributes mined from `self.<attr>` assignments in the
//! class's own methods, then the mined attributes of every MRO ancestor,
//! then the class namespace projected through the instance. The first layer
//! that knows a name wins, which is what makes instance attributes shadow
//! class attributes and subclasses shadow bases.
//!
//! `InstanceElement` is a projection, not an owner: it rebinds a tree node
//! to the owning instance so that nested lookups (resolving `self` inside a
//! method body) see the instance as their lexical context. It exposes
//! exactly the operations the evaluation layer needs; nothing is forwarded
//! implicitly.

use crate::class::ClassWrapper;
use crate::collab::Arguments;
use crate::diagnostic::{codes, Diagnostic};
use crate::error::{EvalError, EvalResult};
use crate::execution::FunctionExecution;
use crate::function::FunctionWrapper;
use crate::names::{Binding, BindingSource, NameMap};
use crate::session::Session;
use crate::value::{NativeKind, Value, ValueSet};
use once_cell::unsync::OnceCell;
use pythia_syntax::{NodeKind, NodeRef};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Evaluation wrapper around one instantiation of a class
pub struct InstanceWrapper {
    id: u64,
    class: Rc<ClassWrapper>,
    args: Rc<Arguments>,
    is_generated: bool,
    decorates: RefCell<Option<Rc<FunctionWrapper>>>,
    self_names: OnceCell<NameMap>,
}

impl InstanceWrapper {
    pub(crate) fn new(
        id: u64,
        class: Rc<ClassWrapper>,
        args: Rc<Arguments>,
        is_generated: bool,
    ) -> Self {
        InstanceWrapper {
            id,
            class,
            args,
            is_generated,
            decorates: RefCell::new(None),
            self_names: OnceCell::new(),
        }
    }

    /// Session-unique instance id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The instantiated class
    pub fn class(&self) -> &Rc<ClassWrapper> {
        &self.class
    }

    /// The constructor arguments
    pub fn args(&self) -> Rc<Arguments> {
        Rc::clone(&self.args)
    }

    /// Whether this instance was produced by the engine itself rather than
    /// an analyzed construction site
    pub fn is_generated(&self) -> bool {
        self.is_generated
    }

    /// The original function this instance decorates, if it was produced by
    /// decorator application
    pub fn decorates(&self) -> Option<Rc<FunctionWrapper>> {
        self.decorates.borrow().clone()
    }

    pub(crate) fn set_decorates(&self, original: Rc<FunctionWrapper>) {
        *self.decorates.borrow_mut() = Some(original);
    }

    /// Post-construction effects, run once the wrapper is cached
    ///
    /// Builtin container constructions feed the element tracker instead of
    /// running `__init__`; for everything else an undecorated `__init__`
    /// gets an eager activation so that mining sees its parameter bindings.
    pub(crate) fn finish_construction(self: &Rc<Self>, session: &Session) {
        if session.is_builtin_container(&self.class) {
            session
                .collab
                .containers
                .track_construction(session, self, &self.args);
            return;
        }
        if self.is_generated {
            return;
        }
        if let Ok(node) = self.class.subscope_node(session, "__init__") {
            if matches!(node.kind(), NodeKind::Function(f) if f.decorators.is_empty() && !f.is_lambda)
            {
                session.method_execution(self, &node);
            }
        }
    }

    /// Attributes assigned on the first parameter (`self`) in the class's
    /// own methods, memoized
    pub fn self_attribute_names(self: &Rc<Self>, session: &Session) -> NameMap {
        self.self_names
            .get_or_init(|| self.mine_self_attributes(session))
            .clone()
    }

    fn mine_self_attributes(self: &Rc<Self>, session: &Session) -> NameMap {
        let mut names = NameMap::default();
        let class_node = self.class.node();
        let tree = &class_node.tree;

        for &sub in &tree.sub_scopes(class_node.id) {
            let NodeKind::Function(func) = tree.kind(sub) else {
                // Nested classes have their own `self`.
                continue;
            };
            let Some(self_name) = tree.first_param_name(sub).map(str::to_string) else {
                continue;
            };
            if tree.name_text(func.name) == Some("__init__")
                && !self.is_generated
                && func.decorators.is_empty()
            {
                // The eager activation makes injected parameter bindings
                // visible when these attributes are resolved. Decorated
                // `__init__` is mined statically only: following decorator
                // effects on `self` is out of reach.
                session.method_execution(self, &class_node.at(sub));
            }

            for node_id in tree.nodes_in_scope(sub) {
                let NodeKind::Attribute(attr) = tree.kind(node_id) else {
                    continue;
                };
                let receiver_is_self = matches!(
                    tree.kind(attr.value),
                    NodeKind::Name(n) if n.name == self_name
                );
                if !receiver_is_self {
                    continue;
                }
                if let NodeKind::Name(a) = tree.kind(attr.attr) {
                    if a.is_definition {
                        let element =
                            session.instance_element(self, &class_node.at(attr.attr), false);
                        if let Some(binding) = Binding::from_element(element) {
                            names.entry(a.name.clone()).or_default().push(binding);
                        }
                    }
                }
            }
        }
        names
    }

    /// The layered namespace of this instance
    ///
    /// Own mined attributes, then the mined attributes of each MRO ancestor
    /// (obtained by executing the ancestor), then the class namespace with
    /// every binding projected through this instance.
    pub fn name_layers(self: &Rc<Self>, session: &Session) -> Vec<NameMap> {
        let mut layers = vec![self.self_attribute_names(session)];

        for ancestor in self.class.mro(session).iter().skip(1) {
            let Value::Class(ancestor_class) = ancestor else {
                continue;
            };
            for value in session.execute_class(ancestor_class).iter() {
                if let Value::Instance(instance) = value {
                    layers.push(instance.self_attribute_names(session));
                }
            }
        }

        for layer in self.class.name_layers(session, false) {
            let mut projected = NameMap::default();
            for (name, bindings) in layer {
                let projected_bindings = bindings
                    .into_iter()
                    .filter_map(|binding| match binding.source {
                        BindingSource::Node(node) => {
                            let element = session.instance_element(self, &node, true);
                            Binding::from_element(element)
                        }
                        _ => Some(binding),
                    })
                    .collect();
                projected.insert(name, projected_bindings);
            }
            layers.push(projected);
        }
        layers
    }

    /// Look up a name through the instance layering; first layer wins
    pub fn find_name(self: &Rc<Self>, session: &Session, name: &str) -> Option<Vec<Binding>> {
        let layers = self.name_layers(session);
        crate::names::find_in_layers(&layers, name).map(|bindings| bindings.to_vec())
    }

    /// A method or nested class looked up through this instance
    ///
    /// Functions come back bound to the instance.
    pub fn subscope(self: &Rc<Self>, session: &Session, name: &str) -> EvalResult<Value> {
        let node = self.class.subscope_node(session, name)?;
        Ok(match node.kind() {
            NodeKind::Class(_) => Value::Class(session.class_wrapper(&node)),
            _ => Value::Function(session.function_wrapper(&node, Some(Rc::clone(self)))),
        })
    }

    /// Execute a method by name with pre-evaluated arguments
    pub fn execute_subscope(
        self: &Rc<Self>,
        session: &Session,
        name: &str,
        arg_sets: Vec<ValueSet>,
    ) -> EvalResult<ValueSet> {
        let method = self.subscope(session, name)?;
        method.call(session, Arguments::from_values(session, arg_sets))
    }

    /// Call the instance: proxies to `__call__`
    pub fn call(self: &Rc<Self>, session: &Session, args: Rc<Arguments>) -> EvalResult<ValueSet> {
        let method = self
            .subscope(session, "__call__")
            .map_err(|_| EvalError::NotCallable {
                on: format!("instance of {}", self.class.name()),
            })?;
        method.call(session, args)
    }

    /// Descriptor dispatch for this value found as an attribute
    ///
    /// When the value's class exposes `__get__`, invoke it with
    /// `(instance-or-none, owning class)` and return its result in place of
    /// the raw attribute; otherwise the attribute itself.
    pub fn descriptor_get(self: &Rc<Self>, session: &Session, accessor: &Value) -> ValueSet {
        let (first, second) = match accessor {
            Value::Instance(instance) => (
                Value::Instance(Rc::clone(instance)),
                Value::Class(Rc::clone(instance.class())),
            ),
            other => (session.collab.native.none_object(), other.clone()),
        };
        match self.execute_subscope(
            session,
            "__get__",
            vec![ValueSet::single(first), ValueSet::single(second)],
        ) {
            Ok(result) => result,
            Err(_) => ValueSet::single(Value::Instance(Rc::clone(self))),
        }
    }

    /// Iterate the instance through the user iteration protocol
    ///
    /// Executes `__iter__`; iterator instances are unwrapped one level
    /// through `__next__`, non-instance iterables recurse through their own
    /// iteration. A missing protocol method is a diagnostic, never an error.
    pub fn iterate(self: &Rc<Self>, session: &Session) -> Vec<ValueSet> {
        let method = match self.subscope(session, "__iter__") {
            Ok(method) => method,
            Err(_) => {
                session.report(
                    Diagnostic::warning(format!(
                        "no __iter__ on instance of {}",
                        self.class.name()
                    ))
                    .with_code(codes::MISSING_ITER),
                );
                return Vec::new();
            }
        };
        let iterators = match method.call(session, Arguments::from_values(session, Vec::new())) {
            Ok(result) => result,
            Err(err) => {
                session.report(Diagnostic::from_eval_error(&err));
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for value in iterators.iter() {
            match value {
                Value::Instance(iterator) => {
                    match iterator.execute_subscope(session, "__next__", Vec::new()) {
                        Ok(element) => out.push(element),
                        Err(_) => session.report(
                            Diagnostic::warning(format!(
                                "iterator of {} has no __next__",
                                self.class.name()
                            ))
                            .with_code(codes::MISSING_NEXT),
                        ),
                    }
                }
                other => out.extend(iterate_value(session, other)),
            }
        }
        out
    }

    /// Index the instance through `__getitem__`
    pub fn index(self: &Rc<Self>, session: &Session, key: Value) -> ValueSet {
        match self.execute_subscope(session, "__getitem__", vec![ValueSet::single(key)]) {
            Ok(result) => result,
            Err(_) => {
                session.report(
                    Diagnostic::warning(format!(
                        "no __getitem__ on instance of {}",
                        self.class.name()
                    ))
                    .with_code(codes::MISSING_GETITEM),
                );
                ValueSet::empty()
            }
        }
    }

    /// The instance's class
    pub fn class_of(&self) -> Value {
        Value::Class(Rc::clone(&self.class))
    }
}

impl fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<instance of {}>", self.class.name())
    }
}

/// Ordered element sets of any iterable value
pub fn iterate_value(session: &Session, value: &Value) -> Vec<ValueSet> {
    match value {
        Value::Instance(instance) => instance.iterate(session),
        Value::Generator(generator) => generator.iterate(session),
        Value::Native(native) if native.kind() == NativeKind::Sequence => {
            native.elements().to_vec()
        }
        _ => Vec::new(),
    }
}

/// Element-wise union of the iterations of every value in a set
///
/// Elements at the same position are united, so a set of several iterables
/// still produces one ordered sequence.
pub fn iterate_values(session: &Session, values: &ValueSet) -> Vec<ValueSet> {
    let mut merged: Vec<ValueSet> = Vec::new();
    for value in values.iter() {
        for (index, element) in iterate_value(session, value).into_iter().enumerate() {
            if index < merged.len() {
                merged[index].extend(element);
            } else {
                merged.push(element);
            }
        }
    }
    merged
}

/// The projected parent of an instance element
pub enum ElementParent {
    /// The chain reached the owning class; the instance takes its place
    Instance(Rc<InstanceWrapper>),
    /// An ordinary node, projected in turn
    Element(Rc<InstanceElement>),
    /// The chain ended (tree root)
    Detached,
}

/// A tree node rebound to an owning instance
pub struct InstanceElement {
    instance: Rc<InstanceWrapper>,
    node: NodeRef,
    is_class_var: bool,
}

impl InstanceElement {
    pub(crate) fn new(instance: Rc<InstanceWrapper>, node: NodeRef, is_class_var: bool) -> Self {
        InstanceElement {
            instance,
            node,
            is_class_var,
        }
    }

    /// The projected node
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// The owning instance
    pub fn instance(&self) -> &Rc<InstanceWrapper> {
        &self.instance
    }

    /// Whether the projection came through the class namespace
    pub fn is_class_var(&self) -> bool {
        self.is_class_var
    }

    /// Definition classification of the projected node
    pub fn is_definition(&self) -> bool {
        matches!(self.node.kind(), NodeKind::Name(n) if n.is_definition)
    }

    /// The projected lexical parent: reaching the owning class substitutes
    /// the instance
    pub fn parent(&self, session: &Session) -> ElementParent {
        match self.node.parent() {
            None => ElementParent::Detached,
            Some(parent) if parent.id == self.instance.class().node().id => {
                ElementParent::Instance(Rc::clone(&self.instance))
            }
            Some(parent) => ElementParent::Element(session.instance_element(
                &self.instance,
                &parent,
                self.is_class_var,
            )),
        }
    }

    /// Children of the projected node, each projected in turn
    pub fn children(&self, session: &Session) -> Vec<Rc<InstanceElement>> {
        self.node
            .children()
            .into_iter()
            .map(|child| session.instance_element(&self.instance, &child, self.is_class_var))
            .collect()
    }

    /// The method activation this element's node belongs to, when the
    /// session has created one for the owning instance
    pub fn enclosing_activation(&self, session: &Session) -> Option<Rc<FunctionExecution>> {
        let tree = &self.node.tree;
        let mut current = tree.parent(self.node.id);
        while let Some(node) = current {
            if matches!(tree.kind(node), NodeKind::Function(_)) {
                return session
                    .find_method_execution(self.instance.id(), self.node.at(node).key());
            }
            current = tree.parent(node);
        }
        None
    }
}

impl fmt::Debug for InstanceElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<element {:?} of {:?}>", self.node, self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::resolve_binding;
    use pythia_syntax::{NodeId, Span, TreeBuilder};

    fn make_span() -> Span {
        Span::synthetic()
    }

    fn node(tree: &Rc<pythia_syntax::ModuleTree>, id: NodeId) -> NodeRef {
        NodeRef::new(Rc::clone(tree), id)
    }

    fn instantiate(
        session: &Session,
        tree: &Rc<pythia_syntax::ModuleTree>,
        class: NodeId,
    ) -> Rc<InstanceWrapper> {
        let wrapper = session.class_wrapper(&node(tree, class));
        let result = wrapper.call(session, Arguments::none(session));
        result
            .any_one()
            .and_then(|v| v.as_instance().cloned())
            .expect("instantiation must produce an instance")
    }

    /// class C:
    ///     def __init__(self):
    ///         self.x = 1
    fn class_with_init_literal(b: &mut TreeBuilder) -> NodeId {
        let self_param = b.param("self", make_span());
        let self_ref = b.name("self", make_span());
        let attr = b.attribute(self_ref, "x", make_span());
        let one = b.int(1, make_span());
        let assign = b.assign(vec![attr], one, make_span());
        let init = b.function_def("__init__", vec![self_param], vec![], vec![assign], make_span());
        b.class_def("C", None, vec![], vec![init], make_span())
    }

    #[test]
    fn test_init_attribute_is_mined() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let class = class_with_init_literal(&mut b);
        let tree = Rc::new(b.finish(vec![class], None, None));

        let instance = instantiate(&session, &tree, class);
        let bindings = instance.find_name(&session, "x").expect("x must be found");
        assert_eq!(bindings.len(), 1);
        assert!(bindings[0].is_definition);

        let values = resolve_binding(&session, &bindings[0]);
        assert_eq!(values.len(), 1);
        assert_eq!(values.any_one().unwrap().as_native().unwrap().name(), "int");
    }

    #[test]
    fn test_init_attribute_sees_injected_parameters() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class C:
        //     def __init__(self, n):
        //         self.x = n
        let self_param = b.param("self", make_span());
        let n_param = b.param("n", make_span());
        let self_ref = b.name("self", make_span());
        let attr = b.attribute(self_ref, "x", make_span());
        let n_ref = b.name("n", make_span());
        let assign = b.assign(vec![attr], n_ref, make_span());
        let init = b.function_def(
            "__init__",
            vec![self_param, n_param],
            vec![],
            vec![assign],
            make_span(),
        );
        let class = b.class_def("C", None, vec![], vec![init], make_span());
        let tree = Rc::new(b.finish(vec![class], None, None));

        let passed = Value::native(crate::value::NativeObject::new(NativeKind::Other, "int"));
        let wrapper = session.class_wrapper(&node(&tree, class));
        let args = Arguments::from_values(&session, vec![ValueSet::single(passed.clone())]);
        let instance = wrapper
            .call(&session, args)
            .any_one()
            .and_then(|v| v.as_instance().cloned())
            .unwrap();

        let bindings = instance.find_name(&session, "x").unwrap();
        let values = resolve_binding(&session, &bindings[0]);
        assert!(values.contains(&passed));
    }

    #[test]
    fn test_non_init_method_attributes_are_mined() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class C:
        //     def configure(self):
        //         self.y = 'ready'
        let self_param = b.param("self", make_span());
        let self_ref = b.name("self", make_span());
        let attr = b.attribute(self_ref, "y", make_span());
        let text = b.str("ready", make_span());
        let assign = b.assign(vec![attr], text, make_span());
        let configure =
            b.function_def("configure", vec![self_param], vec![], vec![assign], make_span());
        let class = b.class_def("C", None, vec![], vec![configure], make_span());
        let tree = Rc::new(b.finish(vec![class], None, None));

        let instance = instantiate(&session, &tree, class);
        let bindings = instance.find_name(&session, "y").unwrap();
        let values = resolve_binding(&session, &bindings[0]);
        assert_eq!(values.any_one().unwrap().as_native().unwrap().name(), "str");
    }

    #[test]
    fn test_instance_attribute_shadows_class_attribute() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class C:
        //     x = 1
        //     def __init__(self):
        //         self.x = 'shadow'
        let class_target = b.name("x", make_span());
        let one = b.int(1, make_span());
        let class_assign = b.assign(vec![class_target], one, make_span());
        let self_param = b.param("self", make_span());
        let self_ref = b.name("self", make_span());
        let attr = b.attribute(self_ref, "x", make_span());
        let text = b.str("shadow", make_span());
        let init_assign = b.assign(vec![attr], text, make_span());
        let init = b.function_def(
            "__init__",
            vec![self_param],
            vec![],
            vec![init_assign],
            make_span(),
        );
        let class = b.class_def("C", None, vec![], vec![class_assign, init], make_span());
        let tree = Rc::new(b.finish(vec![class], None, None));

        let instance = instantiate(&session, &tree, class);
        let bindings = instance.find_name(&session, "x").unwrap();
        let values = resolve_binding(&session, &bindings[0]);
        assert_eq!(values.any_one().unwrap().as_native().unwrap().name(), "str");
    }

    #[test]
    fn test_ancestor_attributes_are_found() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class B:
        //     def __init__(self):
        //         self.b = 1
        // class C(B): pass
        let self_param = b.param("self", make_span());
        let self_ref = b.name("self", make_span());
        let attr = b.attribute(self_ref, "b", make_span());
        let one = b.int(1, make_span());
        let assign = b.assign(vec![attr], one, make_span());
        let init = b.function_def("__init__", vec![self_param], vec![], vec![assign], make_span());
        let base = b.class_def("B", None, vec![], vec![init], make_span());
        let base_ref = b.name("B", make_span());
        let derived = b.class_def("C", Some(vec![base_ref]), vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![base, derived], None, None));

        let instance = instantiate(&session, &tree, derived);
        let bindings = instance.find_name(&session, "b").unwrap();
        let values = resolve_binding(&session, &bindings[0]);
        assert_eq!(values.any_one().unwrap().as_native().unwrap().name(), "int");
    }

    #[test]
    fn test_descriptor_get_replaces_attribute() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class D:
        //     def __get__(self, obj, owner):
        //         return 1
        let self_param = b.param("self", make_span());
        let obj_param = b.param("obj", make_span());
        let owner_param = b.param("owner", make_span());
        let one = b.int(1, make_span());
        let ret = b.ret(Some(one), make_span());
        let get = b.function_def(
            "__get__",
            vec![self_param, obj_param, owner_param],
            vec![],
            vec![ret],
            make_span(),
        );
        let descriptor_class = b.class_def("D", None, vec![], vec![get], make_span());
        let plain_class = b.class_def("P", None, vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![descriptor_class, plain_class], None, None));

        let descriptor = instantiate(&session, &tree, descriptor_class);
        let accessor = instantiate(&session, &tree, plain_class);

        let replaced =
            descriptor.descriptor_get(&session, &Value::Instance(Rc::clone(&accessor)));
        assert_eq!(replaced.len(), 1);
        assert_eq!(
            replaced.any_one().unwrap().as_native().unwrap().name(),
            "int"
        );

        // No __get__: the raw attribute survives.
        let raw = accessor.descriptor_get(&session, &Value::Instance(Rc::clone(&descriptor)));
        assert_eq!(raw, ValueSet::single(Value::Instance(accessor)));
    }

    #[test]
    fn test_iterate_through_iter_and_next() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class R:
        //     def __next__(self):
        //         return 1
        // class C:
        //     def __iter__(self):
        //         return R()
        let self_param1 = b.param("self", make_span());
        let one = b.int(1, make_span());
        let ret_next = b.ret(Some(one), make_span());
        let next = b.function_def("__next__", vec![self_param1], vec![], vec![ret_next], make_span());
        let iterator_class = b.class_def("R", None, vec![], vec![next], make_span());

        let self_param2 = b.param("self", make_span());
        let r_ref = b.name("R", make_span());
        let r_call = b.call(r_ref, vec![], make_span());
        let ret_iter = b.ret(Some(r_call), make_span());
        let iter = b.function_def("__iter__", vec![self_param2], vec![], vec![ret_iter], make_span());
        let class = b.class_def("C", None, vec![], vec![iter], make_span());
        let tree = Rc::new(b.finish(vec![iterator_class, class], None, None));

        let instance = instantiate(&session, &tree, class);
        let elements = instance.iterate(&session);
        assert_eq!(elements.len(), 1);
        assert_eq!(
            elements[0].any_one().unwrap().as_native().unwrap().name(),
            "int"
        );
    }

    #[test]
    fn test_missing_iter_is_a_diagnostic_not_an_error() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let class = b.class_def("C", None, vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![class], None, None));

        let instance = instantiate(&session, &tree, class);
        let elements = instance.iterate(&session);
        assert!(elements.is_empty());
        assert!(session.has_diagnostic("W4104"));
    }

    #[test]
    fn test_index_via_getitem() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class C:
        //     def __getitem__(self, key):
        //         return 'v'
        let self_param = b.param("self", make_span());
        let key_param = b.param("key", make_span());
        let v = b.str("v", make_span());
        let ret = b.ret(Some(v), make_span());
        let getitem = b.function_def(
            "__getitem__",
            vec![self_param, key_param],
            vec![],
            vec![ret],
            make_span(),
        );
        let class = b.class_def("C", None, vec![], vec![getitem], make_span());
        let plain = b.class_def("P", None, vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![class, plain], None, None));

        let instance = instantiate(&session, &tree, class);
        let key = Value::native(crate::value::NativeObject::new(NativeKind::Other, "int"));
        let values = instance.index(&session, key);
        assert_eq!(values.any_one().unwrap().as_native().unwrap().name(), "str");

        let bare = instantiate(&session, &tree, plain);
        let key = Value::native(crate::value::NativeObject::new(NativeKind::Other, "int"));
        assert!(bare.index(&session, key).is_empty());
        assert!(session.has_diagnostic("W4106"));
    }

    #[test]
    fn test_call_proxies_to_dunder_call() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        // class C:
        //     def __call__(self):
        //         return 1
        let self_param = b.param("self", make_span());
        let one = b.int(1, make_span());
        let ret = b.ret(Some(one), make_span());
        let dunder =
            b.function_def("__call__", vec![self_param], vec![], vec![ret], make_span());
        let class = b.class_def("C", None, vec![], vec![dunder], make_span());
        let plain = b.class_def("P", None, vec![], vec![], make_span());
        let tree = Rc::new(b.finish(vec![class, plain], None, None));

        let callable = instantiate(&session, &tree, class);
        let result = callable
            .call(&session, Arguments::none(&session))
            .unwrap();
        assert_eq!(result.any_one().unwrap().as_native().unwrap().name(), "int");

        let bare = instantiate(&session, &tree, plain);
        let err = bare.call(&session, Arguments::none(&session));
        assert!(matches!(err, Err(EvalError::NotCallable { .. })));
    }

    #[test]
    fn test_element_parent_projects_to_instance() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let class = class_with_init_literal(&mut b);
        let tree = Rc::new(b.finish(vec![class], None, None));

        let instance = instantiate(&session, &tree, class);
        let init = instance
            .class()
            .clone()
            .subscope_node(&session, "__init__")
            .unwrap();
        let element = session.instance_element(&instance, &init, true);

        match element.parent(&session) {
            ElementParent::Instance(owner) => assert!(Rc::ptr_eq(&owner, &instance)),
            _ => panic!("expected the instance as projected parent"),
        }
    }
}
