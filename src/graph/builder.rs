use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::ComposerJson;
use crate::model::{
    symbol_key, BaseFileAnalysis, CodebaseAnalysis, DependencyGraph, EdgeType, GraphNode, ImportKind,
    ImportRef, Language, MethodInfo, NodeKind, ReferenceKind, SymbolReference, UsageKind,
};
use crate::resolver::SymbolResolver;

/// Graph key of a method node. JS classes have no namespace, so their
/// methods are keyed per file.
pub fn method_key(base: &BaseFileAnalysis, method: &MethodInfo) -> String {
    match (&method.owner, base.language) {
        (Some(owner), Language::JavaScript) => {
            symbol_key::method(&base.path, None, &format!("{}.{}", owner, method.name))
        }
        (owner, _) => symbol_key::method(&base.path, owner.as_deref(), &method.name),
    }
}

/// Key for a JS/template class declaration.
pub fn class_key(base: &BaseFileAnalysis, fqcn: &str) -> String {
    match base.language {
        Language::JavaScript => format!("class:{}#{}", base.path.display(), fqcn),
        _ => symbol_key::class(fqcn),
    }
}

pub fn edge_usage_kind(edge_type: EdgeType) -> UsageKind {
    match edge_type {
        EdgeType::Imports => UsageKind::Import,
        EdgeType::Depends => UsageKind::Depends,
        EdgeType::References => UsageKind::Reference,
    }
}

/// A resolved reference from one file to a graph node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub node: String,
    pub edge_type: EdgeType,
    pub line: u32,
    pub route_bound: bool,
}

/// Pass one: every declared name mapped to its file.
pub fn index_symbols(analysis: &CodebaseAnalysis, composer: Option<&ComposerJson>) -> SymbolResolver {
    let mut resolver = SymbolResolver::new(analysis.root.clone(), composer);
    for base in analysis.files() {
        resolver.add_file(&base.path);
        if matches!(base.language, Language::Php | Language::Route) {
            for class in &base.classes {
                resolver.add_class(&class.fqcn, &base.path);
            }
        }
    }
    for template in &analysis.templates {
        if let Some(view) = &template.view_name {
            resolver.add_view(view, &template.base.path);
        }
    }
    resolver
}

/// PHP free functions by lower-cased name.
fn function_index(analysis: &CodebaseAnalysis) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    for file in &analysis.php_files {
        for method in file.base.methods.iter().filter(|m| m.owner.is_none()) {
            index
                .entry(method.name.to_ascii_lowercase())
                .or_default()
                .push(method_key(&file.base, method));
        }
    }
    index
}

pub struct GraphBuilder<'a> {
    analysis: &'a CodebaseAnalysis,
    resolver: &'a SymbolResolver,
    functions: HashMap<String, Vec<String>>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(analysis: &'a CodebaseAnalysis, resolver: &'a SymbolResolver) -> Self {
        Self {
            analysis,
            resolver,
            functions: function_index(analysis),
        }
    }

    /// Declared FQCN and file of a class name, case-insensitively.
    fn declared_class(&self, fqcn: &str) -> Option<(PathBuf, Option<String>)> {
        let path = self.resolver.resolve_class(fqcn)?;
        let wanted = fqcn.trim_start_matches('\\');
        let declared = self.analysis.file(&path).and_then(|f| {
            f.classes
                .iter()
                .find(|c| c.fqcn.eq_ignore_ascii_case(wanted))
                .map(|c| c.fqcn.clone())
        });
        Some((path, declared))
    }

    fn class_node(&self, fqcn: &str) -> Option<String> {
        self.declared_class(fqcn).map(|(path, declared)| match declared {
            Some(fqcn) => symbol_key::class(&fqcn),
            None => symbol_key::file(&path),
        })
    }

    fn view_node(&self, name: &str) -> Option<String> {
        self.resolver.resolve_view(name).map(|path| {
            let dotted = name.replace('/', ".");
            let declared = self
                .analysis
                .templates
                .iter()
                .any(|t| t.base.path == path && t.view_name.as_deref() == Some(dotted.as_str()));
            if declared {
                symbol_key::view(&dotted)
            } else {
                symbol_key::file(&path)
            }
        })
    }

    fn import_targets(&self, base: &BaseFileAnalysis, import: &ImportRef) -> Vec<String> {
        match import.kind {
            ImportKind::Class => self.class_node(&import.symbol).into_iter().collect(),
            ImportKind::Function => {
                let short = import.symbol.rsplit('\\').next().unwrap_or(&import.symbol);
                self.functions
                    .get(&short.to_ascii_lowercase())
                    .cloned()
                    .unwrap_or_default()
            }
            ImportKind::Const => Vec::new(),
            ImportKind::Stylesheet => import
                .source
                .as_deref()
                .and_then(|s| self.resolver.resolve_stylesheet(s, &base.path))
                .map(|p| symbol_key::file(&p))
                .into_iter()
                .collect(),
            ImportKind::Named | ImportKind::Default | ImportKind::Namespace | ImportKind::SideEffect => import
                .source
                .as_deref()
                .and_then(|s| self.resolver.resolve_script(s, &base.path))
                .map(|p| symbol_key::file(&p))
                .into_iter()
                .collect(),
        }
    }

    fn reference_targets(&self, base: &BaseFileAnalysis, reference: &SymbolReference) -> Vec<(String, EdgeType)> {
        match reference.kind {
            ReferenceKind::Class => self
                .class_node(&reference.name)
                .map(|n| vec![(n, EdgeType::References)])
                .unwrap_or_default(),
            ReferenceKind::Extends | ReferenceKind::Implements | ReferenceKind::TraitUse => {
                if base.language == Language::JavaScript {
                    return Vec::new();
                }
                self.class_node(&reference.name)
                    .map(|n| vec![(n, EdgeType::Depends)])
                    .unwrap_or_default()
            }
            ReferenceKind::Function => self
                .functions
                .get(&reference.name.rsplit('\\').next().unwrap_or(&reference.name).to_ascii_lowercase())
                .map(|keys| keys.iter().map(|k| (k.clone(), EdgeType::References)).collect())
                .unwrap_or_default(),
            ReferenceKind::View => self
                .view_node(&reference.name)
                .map(|n| vec![(n, EdgeType::References)])
                .unwrap_or_default(),
            ReferenceKind::Layout | ReferenceKind::Include => self
                .view_node(&reference.name)
                .map(|n| vec![(n, EdgeType::Imports)])
                .unwrap_or_default(),
            ReferenceKind::Component => {
                let mut out: Vec<(String, EdgeType)> = Vec::new();
                for path in self.resolver.resolve_component(&reference.name) {
                    let node = self
                        .analysis
                        .templates
                        .iter()
                        .find(|t| t.base.path == path)
                        .and_then(|t| t.view_name.as_deref().map(symbol_key::view))
                        .or_else(|| {
                            self.analysis
                                .file(&path)
                                .and_then(|f| f.classes.first())
                                .map(|c| symbol_key::class(&c.fqcn))
                        })
                        .unwrap_or_else(|| symbol_key::file(&path));
                    out.push((node, EdgeType::References));
                }
                out
            }
            ReferenceKind::Script => self
                .resolver
                .resolve_script(&reference.name, &base.path)
                .map(|p| vec![(symbol_key::file(&p), EdgeType::Imports)])
                .unwrap_or_default(),
            ReferenceKind::Stylesheet => self
                .resolver
                .resolve_stylesheet(&reference.name, &base.path)
                .or_else(|| self.resolver.resolve_script(&reference.name, &base.path))
                .map(|p| vec![(symbol_key::file(&p), EdgeType::Imports)])
                .unwrap_or_default(),
            ReferenceKind::Asset => self
                .resolver
                .resolve_asset(&reference.name, &base.path)
                .map(|p| vec![(symbol_key::file(&p), EdgeType::References)])
                .unwrap_or_default(),
            ReferenceKind::RouteAction => {
                let Some((controller, action)) = reference.name.rsplit_once("::") else {
                    return Vec::new();
                };
                match self.declared_class(controller) {
                    Some((path, Some(owner))) => {
                        vec![(symbol_key::method(&path, Some(&owner), action), EdgeType::References)]
                    }
                    Some((path, None)) => vec![(symbol_key::file(&path), EdgeType::References)],
                    None => Vec::new(),
                }
            }
            ReferenceKind::CssClass => Vec::new(),
        }
    }

    /// Every resolved outgoing reference of one file.
    pub fn targets(&self, base: &BaseFileAnalysis) -> Vec<Target> {
        let mut out = Vec::new();
        for import in &base.imports {
            for node in self.import_targets(base, import) {
                out.push(Target {
                    node,
                    edge_type: EdgeType::Imports,
                    line: import.line,
                    route_bound: false,
                });
            }
        }
        for reference in &base.references {
            for (node, edge_type) in self.reference_targets(base, reference) {
                out.push(Target {
                    node,
                    edge_type,
                    line: reference.line,
                    route_bound: reference.kind == ReferenceKind::RouteAction,
                });
            }
        }
        out
    }

    fn add_declarations(&self, graph: &mut DependencyGraph, base: &BaseFileAnalysis) {
        graph.add_node(GraphNode::file(&base.path).with_meta("language", base.language.as_str()));
        for class in &base.classes {
            graph.add_node(
                GraphNode::new(class_key(base, &class.fqcn), NodeKind::Class)
                    .declared_in(&base.path)
                    .with_meta("line", class.line.to_string()),
            );
        }
        for method in &base.methods {
            let kind = if method.owner.is_some() {
                NodeKind::Method
            } else {
                NodeKind::Function
            };
            graph.add_node(
                GraphNode::new(method_key(base, method), kind)
                    .declared_in(&base.path)
                    .with_meta("line", method.line.to_string()),
            );
        }
    }

    /// Pass two: nodes for every declaration, then one edge per resolved
    /// reference. Unresolved names (vendor classes, packages) add nothing.
    pub fn build(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();

        for base in self.analysis.files() {
            self.add_declarations(&mut graph, base);
        }
        for template in &self.analysis.templates {
            if let Some(view) = &template.view_name {
                graph.add_node(
                    GraphNode::new(symbol_key::view(view), NodeKind::View).declared_in(&template.base.path),
                );
                if let Some(component) = view.strip_prefix("components.") {
                    graph.add_node(
                        GraphNode::new(symbol_key::component(component), NodeKind::Component)
                            .declared_in(&template.base.path),
                    );
                }
            }
        }
        for route_file in &self.analysis.route_files {
            for route in &route_file.routes {
                let id = format!("route:{} {}", route.verb, route.uri);
                let mut node = GraphNode::new(id.clone(), NodeKind::Route).declared_in(&route_file.base.path);
                if let Some(name) = &route.name {
                    node = node.with_meta("name", name.clone());
                }
                graph.add_node(node);
                graph.add_edge(&symbol_key::file(&route_file.base.path), &id, EdgeType::Depends);
            }
        }

        for base in self.analysis.files() {
            let from = symbol_key::file(&base.path);
            for target in self.targets(base) {
                graph.add_edge(&from, &target.node, target.edge_type);
            }
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "dependency graph built"
        );
        graph
    }
}

pub fn build_dependency_graph(analysis: &CodebaseAnalysis, resolver: &SymbolResolver) -> DependencyGraph {
    GraphBuilder::new(analysis, resolver).build()
}

/// The file that declares `node`, if any.
pub fn declaring_file<'g>(graph: &'g DependencyGraph, node: &str) -> Option<&'g Path> {
    graph.node(node).and_then(|n| n.file.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ClassInfo, ClassKind, FileAnalysis, JsFileAnalysis, PhpFileAnalysis, PhpRole, RouteAnalysis,
        RouteDefinition, TemplateAnalysis, Visibility,
    };

    fn php(path: &str, fqcn: Option<&str>) -> PhpFileAnalysis {
        let mut base = BaseFileAnalysis::new(path, Language::Php, 100, 10);
        if let Some(fqcn) = fqcn {
            base.classes.push(ClassInfo {
                name: fqcn.rsplit('\\').next().unwrap().to_string(),
                fqcn: fqcn.to_string(),
                kind: ClassKind::Class,
                line: 3,
                extends: None,
                implements: vec![],
            });
        }
        PhpFileAnalysis {
            base,
            namespace: None,
            role: PhpRole::Other,
        }
    }

    fn method(owner: &str, name: &str) -> MethodInfo {
        MethodInfo {
            name: name.to_string(),
            owner: Some(owner.to_string()),
            visibility: Visibility::Public,
            is_static: false,
            line: 5,
            start_line: 5,
            end_line: 7,
            parameters: vec![],
            body: String::new(),
        }
    }

    fn sample() -> CodebaseAnalysis {
        let mut analysis = CodebaseAnalysis::new("/p");

        let mut controller = php("/p/app/Http/Controllers/ShopController.php", Some("App\\Http\\Controllers\\ShopController"));
        controller
            .base
            .methods
            .push(method("App\\Http\\Controllers\\ShopController", "index"));
        controller.base.imports.push(ImportRef::new("App\\Models\\Product", "Product", 2, ImportKind::Class));
        controller
            .base
            .references
            .push(SymbolReference::new("shop.index", 6, ReferenceKind::View));
        analysis.add(FileAnalysis::Php(controller));
        analysis.add(FileAnalysis::Php(php("/p/app/Models/Product.php", Some("App\\Models\\Product"))));
        analysis.add(FileAnalysis::Php(php("/p/app/Models/Unused.php", Some("App\\Models\\Unused"))));

        let mut routes = RouteAnalysis {
            base: BaseFileAnalysis::new("/p/routes/web.php", Language::Route, 50, 4),
            routes: vec![RouteDefinition {
                verb: "GET".into(),
                uri: "/shop".into(),
                controller: Some("App\\Http\\Controllers\\ShopController".into()),
                action: Some("index".into()),
                name: Some("shop".into()),
                view: None,
                line: 3,
            }],
        };
        routes.base.references.push(SymbolReference::new(
            "App\\Http\\Controllers\\ShopController::index",
            3,
            ReferenceKind::RouteAction,
        ));
        analysis.add(FileAnalysis::Route(routes));

        analysis.add(FileAnalysis::Template(TemplateAnalysis {
            base: BaseFileAnalysis::new("/p/resources/views/shop/index.blade.php", Language::Template, 80, 8),
            view_name: Some("shop.index".into()),
            sections: vec![],
            components_used: vec![],
            css_classes_used: vec![],
            fragments: vec![],
        }));

        let mut js = JsFileAnalysis {
            base: BaseFileAnalysis::new("/p/resources/js/app.js", Language::JavaScript, 40, 3),
            exports: vec![],
        };
        js.base.imports.push(
            ImportRef::new("default", "cart", 1, ImportKind::Default).with_source("./cart"),
        );
        js.base.imports.push(ImportRef::new("default", "axios", 2, ImportKind::Default).with_source("axios"));
        analysis.add(FileAnalysis::JavaScript(js));
        analysis.add(FileAnalysis::JavaScript(JsFileAnalysis {
            base: BaseFileAnalysis::new("/p/resources/js/cart.js", Language::JavaScript, 40, 3),
            exports: vec!["default".into()],
        }));
        analysis
    }

    fn build(analysis: &CodebaseAnalysis) -> DependencyGraph {
        let resolver = index_symbols(analysis, None);
        build_dependency_graph(analysis, &resolver)
    }

    #[test]
    fn test_import_edges_point_at_class_nodes() {
        let analysis = sample();
        let graph = build(&analysis);
        assert!(graph.has_edge(
            "file:/p/app/Http/Controllers/ShopController.php",
            "class:App\\Models\\Product",
            EdgeType::Imports
        ));
        let inbound = graph.inbound_to_file(Path::new("/p/app/Models/Product.php"));
        assert_eq!(inbound.len(), 1);
        assert!(graph.inbound_to_file(Path::new("/p/app/Models/Unused.php")).is_empty());
    }

    #[test]
    fn test_route_action_and_view_edges() {
        let analysis = sample();
        let graph = build(&analysis);
        assert!(graph.has_edge(
            "file:/p/routes/web.php",
            "method:App\\Http\\Controllers\\ShopController::index",
            EdgeType::References
        ));
        assert!(graph.has_edge(
            "file:/p/app/Http/Controllers/ShopController.php",
            "view:shop.index",
            EdgeType::References
        ));
        assert!(graph.node("route:GET /shop").is_some());
    }

    #[test]
    fn test_js_relative_imports_and_external_packages() {
        let analysis = sample();
        let graph = build(&analysis);
        assert!(graph.has_edge(
            "file:/p/resources/js/app.js",
            "file:/p/resources/js/cart.js",
            EdgeType::Imports
        ));
        assert_eq!(graph.neighbors("file:/p/resources/js/app.js").len(), 1);
    }

    #[test]
    fn test_method_keys() {
        let base = BaseFileAnalysis::new("/p/a.js", Language::JavaScript, 1, 1);
        let m = method("Widget", "render");
        assert_eq!(method_key(&base, &m), "function:/p/a.js#Widget.render");
        let base = BaseFileAnalysis::new("/p/a.php", Language::Php, 1, 1);
        assert_eq!(method_key(&base, &method("App\\A", "x")), "method:App\\A::x");
    }
}
