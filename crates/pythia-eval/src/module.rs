//! Module wrapper
//!
//! Overlays a module tree with import-system behavior: identity within the
//! session registry, package and namespace-package path resolution,
//! star-import flattening and the layered module namespace (own names,
//! synthesized dunder attributes, star-imported names, promoted `global`
//! declarations, discovered submodules).

use crate::diagnostic::{codes, Diagnostic};
use crate::error::{EvalError, EvalResult};
use crate::names::{scope_layer, Binding, BindingSource, NameMap, SyntheticKind};
use crate::session::Session;
use crate::value::Value;
use once_cell::unsync::OnceCell;
use pythia_syntax::{ModuleTree, NodeKey, NodeKind, NodeRef};
use rustc_hash::FxHashSet;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// Source markers that declare a namespace package; their textual presence
/// in an `__init__` file is what triggers search-path merging, the
/// declaration is never executed
const NAMESPACE_PATTERNS: [&str; 2] = ["declare_namespace(__name__)", "extend_path(__path__"];

/// Evaluation wrapper around a module
pub struct ModuleWrapper {
    tree: Rc<ModuleTree>,
    parent_module: Option<Rc<ModuleWrapper>>,
    star_cache: OnceCell<Vec<Rc<ModuleWrapper>>>,
}

impl ModuleWrapper {
    pub(crate) fn new(tree: Rc<ModuleTree>, parent_module: Option<Rc<ModuleWrapper>>) -> Self {
        ModuleWrapper {
            tree,
            parent_module,
            star_cache: OnceCell::new(),
        }
    }

    /// The underlying module tree
    pub fn tree(&self) -> &Rc<ModuleTree> {
        &self.tree
    }

    /// Identity key of the module's root node
    pub fn node_key(&self) -> NodeKey {
        NodeRef::root(Rc::clone(&self.tree)).key()
    }

    /// The module's dotted name from the session registry, `__main__` when
    /// unregistered
    pub fn name(self: &Rc<Self>, session: &Session) -> String {
        session
            .module_name_of(self)
            .unwrap_or_else(|| "__main__".to_string())
    }

    /// Absolute source path; `None` for synthetic modules
    pub fn file(&self) -> Option<PathBuf> {
        let path = self.tree.path()?;
        Some(std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()))
    }

    /// The module docstring
    pub fn doc(&self) -> Option<&str> {
        self.tree.doc()
    }

    /// The package directory, when this module is a package (`__init__`
    /// with a recognized suffix)
    pub fn init_directory(&self, session: &Session) -> Option<PathBuf> {
        let file = self.file()?;
        let file_name = file.file_name()?.to_str()?;
        for suffix in &session.config.module_suffixes {
            if file_name == format!("__init__{}", suffix) {
                return file.parent().map(|p| p.to_path_buf());
            }
        }
        None
    }

    /// Whether this module is a package
    pub fn is_package(&self, session: &Session) -> bool {
        self.init_directory(session).is_some()
    }

    /// The owning package name: the module name itself for packages, the
    /// name with its last dotted component stripped otherwise
    pub fn package(self: &Rc<Self>, session: &Session) -> String {
        let name = self.name(session);
        if self.is_package(session) {
            return name;
        }
        match name.rsplit_once('.') {
            Some((prefix, _)) => prefix.to_string(),
            None => String::new(),
        }
    }

    /// The package search path
    ///
    /// Only valid on packages. An ordinary package contributes its own
    /// directory. A namespace package (detected by the textual presence of
    /// a namespace-declaration pattern in the `__init__` source) instead
    /// contributes every same-named subdirectory of the effective search
    /// path: the parent package's own path, or the configured global search
    /// path at the root.
    pub fn path(self: &Rc<Self>, session: &Session) -> EvalResult<Vec<PathBuf>> {
        let Some(init_dir) = self.init_directory(session) else {
            return Err(EvalError::NotAPackage {
                on: format!("module {}", self.name(session)),
            });
        };

        if let Some(source) = self.tree.source() {
            if NAMESPACE_PATTERNS.iter().any(|p| source.contains(p)) {
                let search_path = match &self.parent_module {
                    Some(parent) => parent.path(session)?,
                    None => session.config.search_path.clone(),
                };
                let name = self.name(session);
                let short_name = name.rsplit('.').next().unwrap_or(&name).to_string();
                let mut paths = Vec::new();
                for dir in search_path {
                    let candidate = dir.join(&short_name);
                    if candidate.is_dir() && !paths.contains(&candidate) {
                        paths.push(candidate);
                    }
                }
                return Ok(paths);
            }
        }
        Ok(vec![init_dir])
    }

    /// The flattened closure of star-imported modules, memoized
    ///
    /// Follows every `from X import *`, resolving targets through the
    /// import collaborator and recursively flattening their own star
    /// imports. A visited set guards against import cycles.
    pub fn star_imports(self: &Rc<Self>, session: &Session) -> Vec<Rc<ModuleWrapper>> {
        self.star_cache
            .get_or_init(|| {
                let mut visited = FxHashSet::default();
                visited.insert(self.node_key());
                let mut out = Vec::new();
                self.collect_star_imports(session, &mut visited, &mut out);
                out
            })
            .clone()
    }

    fn collect_star_imports(
        self: &Rc<Self>,
        session: &Session,
        visited: &mut FxHashSet<NodeKey>,
        out: &mut Vec<Rc<ModuleWrapper>>,
    ) {
        for import_id in self.tree.star_imports() {
            let NodeKind::Import(import) = self.tree.kind(import_id) else {
                continue;
            };
            match session.collab.imports.resolve(session, &import.module) {
                Some(module) => {
                    if visited.insert(module.node_key()) {
                        out.push(Rc::clone(&module));
                        module.collect_star_imports(session, visited, out);
                    }
                }
                None => session.report(
                    Diagnostic::warning(format!(
                        "star-import target '{}' could not be resolved",
                        import.module
                    ))
                    .with_code(codes::STAR_IMPORT_UNRESOLVED)
                    .with_span(self.tree.span(import_id)),
                ),
            }
        }
    }

    /// The layered module namespace
    pub fn name_layers(self: &Rc<Self>, session: &Session) -> Vec<NameMap> {
        let mut layers = vec![scope_layer(&self.tree, self.tree.root())];
        layers.push(self.module_attributes(session));
        for star_module in self.star_imports(session) {
            layers.push(scope_layer(&star_module.tree, star_module.tree.root()));
        }
        layers.push(self.global_declarations());
        layers.push(self.sub_modules(session));
        layers
    }

    /// Look up a name through the module layering; first layer wins
    pub fn find_name(self: &Rc<Self>, session: &Session, name: &str) -> Option<Vec<Binding>> {
        let layers = self.name_layers(session);
        crate::names::find_in_layers(&layers, name).map(|bindings| bindings.to_vec())
    }

    /// Synthesized dunder attributes, each a generic string-valued entity
    fn module_attributes(&self, session: &Session) -> NameMap {
        let mut layer = NameMap::default();
        for name in ["__file__", "__package__", "__doc__", "__name__"] {
            layer.insert(
                name.to_string(),
                vec![Binding::synthetic(
                    name,
                    SyntheticKind::ModuleAttr(session.collab.native.str_instance()),
                )],
            );
        }
        layer
    }

    /// Names declared `global`, promoted to definitions
    fn global_declarations(&self) -> NameMap {
        let mut layer = NameMap::default();
        for name_id in self.tree.global_names() {
            if let Some(text) = self.tree.name_text(name_id) {
                layer.entry(text.to_string()).or_default().push(Binding {
                    name: text.to_string(),
                    is_definition: true,
                    source: BindingSource::Node(NodeRef::new(Rc::clone(&self.tree), name_id)),
                });
            }
        }
        layer
    }

    /// Modules and packages discovered in the package directory
    fn sub_modules(&self, session: &Session) -> NameMap {
        let mut layer = NameMap::default();
        let Some(dir) = self.init_directory(session) else {
            return layer;
        };
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return layer;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let sub_name = if path.is_dir() {
                let is_package = session
                    .config
                    .module_suffixes
                    .iter()
                    .any(|suffix| path.join(format!("__init__{}", suffix)).is_file());
                if !is_package {
                    continue;
                }
                Some(file_name.to_string())
            } else {
                session.config.module_suffixes.iter().find_map(|suffix| {
                    file_name
                        .strip_suffix(suffix.as_str())
                        .filter(|stem| !stem.is_empty() && *stem != "__init__")
                        .map(str::to_string)
                })
            };
            if let Some(sub_name) = sub_name {
                layer
                    .entry(sub_name.clone())
                    .or_default()
                    .push(Binding::synthetic(sub_name, SyntheticKind::Submodule));
            }
        }
        layer
    }

    /// The class of a module is the native module class
    pub fn class_of(&self, session: &Session) -> Value {
        session.collab.native.module_class()
    }
}

impl fmt::Debug for ModuleWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tree.path() {
            Some(path) => write!(f, "<module {}>", path.display()),
            None => write!(f, "<module>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{resolve_binding, ImportResolver};
    use pythia_syntax::{Span, TreeBuilder};
    use rustc_hash::FxHashMap;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn make_span() -> Span {
        Span::synthetic()
    }

    static SCRATCH: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pythia-module-{}-{}-{}",
            tag,
            std::process::id(),
            SCRATCH.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn empty_module(path: Option<PathBuf>, source: Option<&str>) -> Rc<ModuleTree> {
        let mut b = TreeBuilder::new();
        if let Some(source) = source {
            b.set_source(source);
        }
        Rc::new(b.finish(vec![], path, None))
    }

    #[test]
    fn test_dunder_attributes_are_string_valued() {
        let session = Session::new();
        let module = session.module_wrapper(empty_module(None, None), None);

        let bindings = module.find_name(&session, "__name__").unwrap();
        assert!(bindings[0].is_definition);
        let values = resolve_binding(&session, &bindings[0]);
        assert_eq!(values.any_one().unwrap().as_native().unwrap().name(), "str");
    }

    #[test]
    fn test_unregistered_module_is_main() {
        let session = Session::new();
        let module = session.module_wrapper(empty_module(None, None), None);
        assert_eq!(module.name(&session), "__main__");

        session.register_module("pkg.mod", &module);
        assert_eq!(module.name(&session), "pkg.mod");
        assert_eq!(module.package(&session), "pkg");
    }

    #[test]
    fn test_global_declarations_become_definitions() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let g = b.name("counter", make_span());
        let global_stmt = b.global_stmt(vec![g], make_span());
        let tree = Rc::new(b.finish(vec![global_stmt], None, None));
        let module = session.module_wrapper(tree, None);

        let bindings = module.find_name(&session, "counter").unwrap();
        assert!(bindings[0].is_definition);
    }

    struct MapResolver {
        map: RefCell<FxHashMap<String, Rc<ModuleWrapper>>>,
    }

    impl ImportResolver for MapResolver {
        fn resolve(&self, _session: &Session, module: &str) -> Option<Rc<ModuleWrapper>> {
            self.map.borrow().get(module).cloned()
        }
    }

    #[test]
    fn test_star_import_closure_guards_cycles() {
        let mut session = Session::new();

        // a:  from b import *
        //     x = 1
        let mut ba = TreeBuilder::new();
        let star_a = ba.import_star("b", make_span());
        let one = ba.int(1, make_span());
        let target = ba.name("x", make_span());
        let assign = ba.assign(vec![target], one, make_span());
        let tree_a = Rc::new(ba.finish(vec![star_a, assign], None, None));

        // b:  from a import *
        //     y = 2
        let mut bb = TreeBuilder::new();
        let star_b = bb.import_star("a", make_span());
        let two = bb.int(2, make_span());
        let target_y = bb.name("y", make_span());
        let assign_y = bb.assign(vec![target_y], two, make_span());
        let tree_b = Rc::new(bb.finish(vec![star_b, assign_y], None, None));

        let module_a = session.module_wrapper(tree_a, None);
        let module_b = session.module_wrapper(tree_b, None);

        let mut map = FxHashMap::default();
        map.insert("a".to_string(), Rc::clone(&module_a));
        map.insert("b".to_string(), Rc::clone(&module_b));
        session.collab.imports = Box::new(MapResolver {
            map: RefCell::new(map),
        });

        let closure = module_a.star_imports(&session);
        assert_eq!(closure.len(), 1);
        assert!(Rc::ptr_eq(&closure[0], &module_b));

        // Star-imported names are visible through the module layering.
        let bindings = module_a.find_name(&session, "y").unwrap();
        let values = resolve_binding(&session, &bindings[0]);
        assert_eq!(values.any_one().unwrap().as_native().unwrap().name(), "int");
    }

    #[test]
    fn test_unresolved_star_import_is_a_diagnostic() {
        let session = Session::new();
        let mut b = TreeBuilder::new();
        let star = b.import_star("nowhere", make_span());
        let tree = Rc::new(b.finish(vec![star], None, None));
        let module = session.module_wrapper(tree, None);

        assert!(module.star_imports(&session).is_empty());
        assert!(session.has_diagnostic("W4107"));
    }

    #[test]
    fn test_ordinary_package_path_is_its_directory() {
        let session = Session::new();
        let dir = scratch_dir("pkg");
        let init = dir.join("__init__.py");
        std::fs::write(&init, "").unwrap();

        let module = session.module_wrapper(empty_module(Some(init), None), None);
        assert!(module.is_package(&session));
        let paths = module.path(&session).unwrap();
        assert_eq!(paths, vec![std::path::absolute(&dir).unwrap()]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_path_on_non_package_is_structural_misuse() {
        let session = Session::new();
        let module = session.module_wrapper(
            empty_module(Some(PathBuf::from("plain.py")), None),
            None,
        );
        assert!(matches!(
            module.path(&session),
            Err(EvalError::NotAPackage { .. })
        ));
    }

    #[test]
    fn test_namespace_package_unions_search_path_matches() {
        let mut session = Session::new();
        let root1 = scratch_dir("ns1");
        let root2 = scratch_dir("ns2");
        let root3 = scratch_dir("ns3");
        std::fs::create_dir_all(root1.join("pkg")).unwrap();
        std::fs::create_dir_all(root2.join("pkg")).unwrap();
        // root3 has no pkg subdirectory and must not contribute.
        let init = root1.join("pkg").join("__init__.py");
        let source = "__import__('pkg_resources').declare_namespace(__name__)\n";
        std::fs::write(&init, source).unwrap();

        session.config.search_path =
            vec![root1.clone(), root2.clone(), root3.clone()];
        let module = session.module_wrapper(
            empty_module(Some(init), Some(source)),
            None,
        );
        session.register_module("pkg", &module);

        let paths = module.path(&session).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&root1.join("pkg")));
        assert!(paths.contains(&root2.join("pkg")));

        for root in [root1, root2, root3] {
            std::fs::remove_dir_all(&root).ok();
        }
    }

    #[test]
    fn test_submodules_are_discovered() {
        let session = Session::new();
        let dir = scratch_dir("subs");
        let init = dir.join("__init__.py");
        std::fs::write(&init, "").unwrap();
        std::fs::write(dir.join("helper.py"), "").unwrap();
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested").join("__init__.py"), "").unwrap();
        std::fs::create_dir_all(dir.join("not_a_package")).unwrap();

        let module = session.module_wrapper(empty_module(Some(init), None), None);
        let helper = module.find_name(&session, "helper").unwrap();
        assert!(matches!(
            helper[0].source,
            BindingSource::Synthetic(SyntheticKind::Submodule)
        ));
        assert!(module.find_name(&session, "nested").is_some());
        assert!(module.find_name(&session, "not_a_package").is_none());
        assert!(module.find_name(&session, "__init__").is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
