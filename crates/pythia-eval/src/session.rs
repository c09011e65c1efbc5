//! Evaluation session
//!
//! The session owns every process-wide piece of evaluation state: identity
//! caches for wrappers, activation results, the recursion guard, the
//! scope-local loop binding table, the module registry, registered call
//! observers and the diagnostics sink. Everything is single-threaded and
//! mutated lazily behind interior mutability; `reset` drops all caches
//! atomically as a unit (the invalidation event for a source reparse or
//! session end).

use crate::class::ClassWrapper;
use crate::collab::{Arguments, CallObserver, Collaborators};
use crate::diagnostic::Diagnostic;
use crate::execution::FunctionExecution;
use crate::function::FunctionWrapper;
use crate::instance::{InstanceElement, InstanceWrapper};
use crate::module::ModuleWrapper;
use crate::value::ValueSet;
use pythia_syntax::{ModuleTree, NodeKey, NodeRef};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

/// Session-level configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Global module search path (used by namespace-package resolution)
    pub search_path: Vec<PathBuf>,
    /// Recognized module file suffixes
    pub module_suffixes: Vec<String>,
    /// How many simultaneous activations of one function definition are
    /// allowed before the guard cuts the recursion
    pub max_reentrant_activations: usize,
    /// Upper bound on the total depth of nested activations
    pub max_active_executions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            search_path: Vec::new(),
            module_suffixes: vec![".py".to_string()],
            max_reentrant_activations: 2,
            max_active_executions: 20,
        }
    }
}

/// State of one memoized activation result
#[derive(Clone)]
pub(crate) enum ActivationEntry {
    /// Evaluation has started and not finished (reentrant request)
    InProgress,
    /// Evaluation finished with this result
    Done(ValueSet),
}

#[derive(Default)]
struct RecursionState {
    active: FxHashMap<NodeKey, usize>,
    depth: usize,
}

/// The evaluation session
pub struct Session {
    /// Session configuration
    pub config: SessionConfig,
    /// Collaborator bundle
    pub collab: Collaborators,

    next_id: Cell<u64>,
    diagnostics: RefCell<Vec<Diagnostic>>,

    classes: RefCell<FxHashMap<NodeKey, Rc<ClassWrapper>>>,
    functions: RefCell<FxHashMap<(NodeKey, Option<u64>), Rc<FunctionWrapper>>>,
    instances: RefCell<FxHashMap<(NodeKey, u64), Rc<InstanceWrapper>>>,
    modules: RefCell<FxHashMap<NodeKey, Rc<ModuleWrapper>>>,
    elements: RefCell<FxHashMap<(u64, NodeKey), Rc<InstanceElement>>>,

    class_executions: RefCell<FxHashMap<NodeKey, ValueSet>>,
    method_executions: RefCell<FxHashMap<(u64, NodeKey), Rc<FunctionExecution>>>,
    activation_results: RefCell<FxHashMap<(NodeKey, u64, bool), ActivationEntry>>,

    recursion: RefCell<RecursionState>,
    loop_bindings: RefCell<FxHashMap<(NodeKey, String), ValueSet>>,

    registry: RefCell<FxHashMap<String, Rc<ModuleWrapper>>>,
    builtins_module: Cell<Option<NodeKey>>,
    observers: RefCell<FxHashMap<NodeKey, Vec<Rc<dyn CallObserver>>>>,
}

impl Session {
    /// Create a session with default configuration and collaborators
    pub fn new() -> Self {
        Session::with_parts(SessionConfig::default(), Collaborators::default())
    }

    /// Create a session with explicit configuration and collaborators
    pub fn with_parts(config: SessionConfig, collab: Collaborators) -> Self {
        Session {
            config,
            collab,
            next_id: Cell::new(1),
            diagnostics: RefCell::new(Vec::new()),
            classes: RefCell::new(FxHashMap::default()),
            functions: RefCell::new(FxHashMap::default()),
            instances: RefCell::new(FxHashMap::default()),
            modules: RefCell::new(FxHashMap::default()),
            elements: RefCell::new(FxHashMap::default()),
            class_executions: RefCell::new(FxHashMap::default()),
            method_executions: RefCell::new(FxHashMap::default()),
            activation_results: RefCell::new(FxHashMap::default()),
            recursion: RefCell::new(RecursionState::default()),
            loop_bindings: RefCell::new(FxHashMap::default()),
            registry: RefCell::new(FxHashMap::default()),
            builtins_module: Cell::new(None),
            observers: RefCell::new(FxHashMap::default()),
        }
    }

    /// Next session-unique id (arguments, instances, activations)
    pub fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Record a diagnostic
    pub fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// Snapshot of the recorded diagnostics
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    /// Whether a diagnostic with the given code was recorded
    pub fn has_diagnostic(&self, code: &str) -> bool {
        self.diagnostics
            .borrow()
            .iter()
            .any(|d| d.code.as_ref().map(|c| c.as_str()) == Some(code))
    }

    /// The class wrapper for a class node, identity-cached
    pub fn class_wrapper(&self, node: &NodeRef) -> Rc<ClassWrapper> {
        if let Some(found) = self.classes.borrow().get(&node.key()) {
            return Rc::clone(found);
        }
        let wrapper = Rc::new(ClassWrapper::new(node.clone()));
        self.classes
            .borrow_mut()
            .insert(node.key(), Rc::clone(&wrapper));
        wrapper
    }

    /// The function wrapper for a function node, identity-cached per
    /// (node, bound instance)
    pub fn function_wrapper(
        &self,
        node: &NodeRef,
        bound_to: Option<Rc<InstanceWrapper>>,
    ) -> Rc<FunctionWrapper> {
        let key = (node.key(), bound_to.as_ref().map(|i| i.id()));
        if let Some(found) = self.functions.borrow().get(&key) {
            return Rc::clone(found);
        }
        let wrapper = Rc::new(FunctionWrapper::new(node.clone(), bound_to));
        self.functions.borrow_mut().insert(key, Rc::clone(&wrapper));
        wrapper
    }

    /// The module wrapper for a tree, identity-cached by its root node
    pub fn module_wrapper(
        &self,
        tree: Rc<ModuleTree>,
        parent: Option<Rc<ModuleWrapper>>,
    ) -> Rc<ModuleWrapper> {
        let key = NodeRef::root(Rc::clone(&tree)).key();
        if let Some(found) = self.modules.borrow().get(&key) {
            return Rc::clone(found);
        }
        let wrapper = Rc::new(ModuleWrapper::new(tree, parent));
        self.modules.borrow_mut().insert(key, Rc::clone(&wrapper));
        wrapper
    }

    /// The instance wrapper for `(class, args)`, identity-cached by that pair
    pub fn instance(
        &self,
        class: &Rc<ClassWrapper>,
        args: Rc<Arguments>,
        is_generated: bool,
    ) -> Rc<InstanceWrapper> {
        let key = (class.node().key(), args.id());
        if let Some(found) = self.instances.borrow().get(&key) {
            return Rc::clone(found);
        }
        let instance = Rc::new(InstanceWrapper::new(
            self.next_id(),
            Rc::clone(class),
            args,
            is_generated,
        ));
        self.instances
            .borrow_mut()
            .insert(key, Rc::clone(&instance));
        // Post-construction effects (container tracking, eager `__init__`
        // activation) run after the cache insert so reentrant lookups for
        // the same pair observe the cached wrapper.
        instance.finish_construction(self);
        instance
    }

    /// The projection of `node` through `instance`, identity-cached
    pub fn instance_element(
        &self,
        instance: &Rc<InstanceWrapper>,
        node: &NodeRef,
        is_class_var: bool,
    ) -> Rc<InstanceElement> {
        let key = (instance.id(), node.key());
        if let Some(found) = self.elements.borrow().get(&key) {
            return Rc::clone(found);
        }
        let element = Rc::new(InstanceElement::new(
            Rc::clone(instance),
            node.clone(),
            is_class_var,
        ));
        self.elements.borrow_mut().insert(key, Rc::clone(&element));
        element
    }

    /// Execute a class with no arguments, cached per class
    ///
    /// Used for mining the self-attributes of MRO ancestors.
    pub fn execute_class(&self, class: &Rc<ClassWrapper>) -> ValueSet {
        let key = class.node().key();
        if let Some(found) = self.class_executions.borrow().get(&key) {
            return found.clone();
        }
        let result = class.call(self, Arguments::none(self));
        self.class_executions
            .borrow_mut()
            .insert(key, result.clone());
        result
    }

    /// The memoized method activation of `funcdef` bound to `instance`
    pub fn method_execution(
        &self,
        instance: &Rc<InstanceWrapper>,
        funcdef: &NodeRef,
    ) -> Rc<FunctionExecution> {
        let key = (instance.id(), funcdef.key());
        if let Some(found) = self.method_executions.borrow().get(&key) {
            return Rc::clone(found);
        }
        let function = self.function_wrapper(funcdef, Some(Rc::clone(instance)));
        let execution = FunctionExecution::new(self, function, instance.args());
        self.method_executions
            .borrow_mut()
            .insert(key, Rc::clone(&execution));
        execution
    }

    /// The method activation for `(instance, funcdef)` if one was created
    pub fn find_method_execution(
        &self,
        instance_id: u64,
        funcdef: NodeKey,
    ) -> Option<Rc<FunctionExecution>> {
        self.method_executions
            .borrow()
            .get(&(instance_id, funcdef))
            .cloned()
    }

    pub(crate) fn activation_lookup(
        &self,
        key: &(NodeKey, u64, bool),
    ) -> Option<ActivationEntry> {
        self.activation_results.borrow().get(key).cloned()
    }

    pub(crate) fn activation_begin(&self, key: (NodeKey, u64, bool)) {
        self.activation_results
            .borrow_mut()
            .insert(key, ActivationEntry::InProgress);
    }

    pub(crate) fn activation_finish(&self, key: (NodeKey, u64, bool), result: ValueSet) {
        self.activation_results
            .borrow_mut()
            .insert(key, ActivationEntry::Done(result));
    }

    /// Try to enter an activation of `funcdef`; `false` means the recursion
    /// budget is exhausted and the caller must produce the empty set
    pub(crate) fn recursion_push(&self, funcdef: NodeKey) -> bool {
        let mut state = self.recursion.borrow_mut();
        let active = state.active.get(&funcdef).copied().unwrap_or(0);
        if active >= self.config.max_reentrant_activations
            || state.depth >= self.config.max_active_executions
        {
            return false;
        }
        *state.active.entry(funcdef).or_insert(0) += 1;
        state.depth += 1;
        true
    }

    /// Leave an activation previously entered with `recursion_push`
    pub(crate) fn recursion_pop(&self, funcdef: NodeKey) {
        let mut state = self.recursion.borrow_mut();
        if let Some(count) = state.active.get_mut(&funcdef) {
            *count = count.saturating_sub(1);
        }
        state.depth = state.depth.saturating_sub(1);
    }

    /// Bind a loop variable for the duration of one element evaluation
    pub fn set_loop_binding(&self, loop_node: NodeKey, name: &str, values: ValueSet) {
        self.loop_bindings
            .borrow_mut()
            .insert((loop_node, name.to_string()), values);
    }

    /// Clear every binding attached to `loop_node`
    pub fn clear_loop_bindings(&self, loop_node: NodeKey) {
        self.loop_bindings
            .borrow_mut()
            .retain(|(key, _), _| *key != loop_node);
    }

    /// The current binding of `name` for `loop_node`, if any
    pub fn loop_binding(&self, loop_node: &NodeKey, name: &str) -> Option<ValueSet> {
        self.loop_bindings
            .borrow()
            .get(&(*loop_node, name.to_string()))
            .cloned()
    }

    /// Register a module under its dotted name
    pub fn register_module(&self, name: impl Into<String>, module: &Rc<ModuleWrapper>) {
        self.registry
            .borrow_mut()
            .insert(name.into(), Rc::clone(module));
    }

    /// The registered name of a module wrapper
    pub fn module_name_of(&self, module: &Rc<ModuleWrapper>) -> Option<String> {
        self.registry
            .borrow()
            .iter()
            .find(|(_, m)| Rc::ptr_eq(m, module))
            .map(|(name, _)| name.clone())
    }

    /// A registered module by name
    pub fn registered_module(&self, name: &str) -> Option<Rc<ModuleWrapper>> {
        self.registry.borrow().get(name).cloned()
    }

    /// Mark a module as the builtins module (home of `list`/`set`)
    pub fn set_builtins_module(&self, module: &Rc<ModuleWrapper>) {
        self.builtins_module.set(Some(module.node_key()));
    }

    /// Whether a class is one of the specially-tracked builtin containers
    pub fn is_builtin_container(&self, class: &ClassWrapper) -> bool {
        let Some(builtins) = self.builtins_module.get() else {
            return false;
        };
        let module_key = NodeRef::root(Rc::clone(&class.node().tree)).key();
        module_key == builtins && matches!(class.name().as_str(), "list" | "set")
    }

    /// Register a call observer for a function definition
    pub fn add_observer(&self, funcdef: &NodeRef, observer: Rc<dyn CallObserver>) {
        self.observers
            .borrow_mut()
            .entry(funcdef.key())
            .or_default()
            .push(observer);
    }

    /// The observers registered for a function definition
    pub fn observers_for(&self, funcdef: NodeKey) -> Vec<Rc<dyn CallObserver>> {
        self.observers
            .borrow()
            .get(&funcdef)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop every cache as a single invalidation event
    ///
    /// Recorded diagnostics survive; they are a sink, not a cache.
    pub fn reset(&self) {
        self.classes.borrow_mut().clear();
        self.functions.borrow_mut().clear();
        self.instances.borrow_mut().clear();
        self.modules.borrow_mut().clear();
        self.elements.borrow_mut().clear();
        self.class_executions.borrow_mut().clear();
        self.method_executions.borrow_mut().clear();
        self.activation_results.borrow_mut().clear();
        *self.recursion.borrow_mut() = RecursionState::default();
        self.loop_bindings.borrow_mut().clear();
        self.registry.borrow_mut().clear();
        self.builtins_module.set(None);
        self.observers.borrow_mut().clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}
