//! Name bindings
//!
//! A binding is a name occurrence annotated with whether it defines the name
//! and with its owning context. Most bindings point at tree nodes; instance
//! attribute bindings are projected through an `InstanceElement`; module
//! dunder attributes, promoted `global` declarations and discovered
//! submodules are synthesized.

use crate::instance::InstanceElement;
use crate::value::Value;
use pythia_syntax::{ModuleTree, NodeId, NodeRef};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// One layer of a namespace: name text to its bindings
pub type NameMap = FxHashMap<String, Vec<Binding>>;

/// Synthetic binding payloads
#[derive(Debug, Clone)]
pub enum SyntheticKind {
    /// A module dunder attribute (`__file__`, `__name__`, ...) carrying a
    /// generic string-valued entity
    ModuleAttr(Value),
    /// A name promoted to a definition by a `global` declaration
    Global,
    /// A submodule or subpackage discovered in the package directory
    Submodule,
}

/// Where a binding comes from
#[derive(Debug, Clone)]
pub enum BindingSource {
    /// A plain name node in some tree
    Node(NodeRef),
    /// A name node projected through an owning instance
    Element(Rc<InstanceElement>),
    /// A constructed binding with no single tree node
    Synthetic(SyntheticKind),
}

/// A name binding
#[derive(Debug, Clone)]
pub struct Binding {
    /// The bound name
    pub name: String,
    /// Whether this occurrence defines the name
    pub is_definition: bool,
    /// The binding's origin
    pub source: BindingSource,
}

impl Binding {
    /// Binding for a plain tree name, definition flag taken from the node
    pub fn from_node(node: NodeRef) -> Option<Binding> {
        match node.kind() {
            pythia_syntax::NodeKind::Name(n) => Some(Binding {
                name: n.name.clone(),
                is_definition: n.is_definition,
                source: BindingSource::Node(node.clone()),
            }),
            _ => None,
        }
    }

    /// Binding projected through an instance
    pub fn from_element(element: Rc<InstanceElement>) -> Option<Binding> {
        let node = element.node().clone();
        match node.kind() {
            pythia_syntax::NodeKind::Name(n) => Some(Binding {
                name: n.name.clone(),
                is_definition: n.is_definition,
                source: BindingSource::Element(element),
            }),
            _ => None,
        }
    }

    /// Synthetic binding, always a definition
    pub fn synthetic(name: impl Into<String>, kind: SyntheticKind) -> Binding {
        Binding {
            name: name.into(),
            is_definition: true,
            source: BindingSource::Synthetic(kind),
        }
    }

    /// The projected instance element, if this binding came through one
    pub fn element(&self) -> Option<&Rc<InstanceElement>> {
        match &self.source {
            BindingSource::Element(e) => Some(e),
            _ => None,
        }
    }

    /// The underlying tree node, when there is one
    pub fn node(&self) -> Option<&NodeRef> {
        match &self.source {
            BindingSource::Node(n) => Some(n),
            BindingSource::Element(e) => Some(e.node()),
            BindingSource::Synthetic(_) => None,
        }
    }
}

/// The name table of one scope as a binding layer
pub fn scope_layer(tree: &Rc<ModuleTree>, scope: NodeId) -> NameMap {
    let mut layer = NameMap::default();
    for (name, occurrences) in tree.scope_names(scope) {
        let bindings = occurrences
            .into_iter()
            .filter_map(|id| Binding::from_node(NodeRef::new(Rc::clone(tree), id)))
            .collect();
        layer.insert(name, bindings);
    }
    layer
}

/// Search layered namespaces in order; the first layer that knows the name
/// wins (instance before class, subclass before base)
pub fn find_in_layers<'a>(layers: &'a [NameMap], name: &str) -> Option<&'a [Binding]> {
    for layer in layers {
        if let Some(bindings) = layer.get(name) {
            return Some(bindings.as_slice());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_search_order() {
        let mut first = NameMap::default();
        first.insert(
            "x".to_string(),
            vec![Binding::synthetic("x", SyntheticKind::Global)],
        );
        let mut second = NameMap::default();
        second.insert(
            "x".to_string(),
            vec![Binding::synthetic("x", SyntheticKind::Submodule)],
        );
        second.insert(
            "y".to_string(),
            vec![Binding::synthetic("y", SyntheticKind::Submodule)],
        );

        let layers = vec![first, second];
        let x = find_in_layers(&layers, "x").unwrap();
        assert!(matches!(
            x[0].source,
            BindingSource::Synthetic(SyntheticKind::Global)
        ));
        assert!(find_in_layers(&layers, "y").is_some());
        assert!(find_in_layers(&layers, "z").is_none());
    }
}
