use std::path::Path;

use super::lexer::{self, Flavor, TokenKind};
use super::php::{self, PhpScan};
use super::LanguageAnalyzer;
use crate::error::Result;
use crate::model::{
    FileAnalysis, ImportRef, Language, ReferenceKind, RouteAnalysis, RouteDefinition,
    SymbolReference,
};

const HTTP_VERBS: &[&str] = &["get", "post", "put", "patch", "delete", "options", "any"];

const RESOURCE_ACTIONS: &[(&str, &str, &str)] = &[
    ("index", "GET", ""),
    ("create", "GET", "/create"),
    ("store", "POST", ""),
    ("show", "GET", "/{id}"),
    ("edit", "GET", "/{id}/edit"),
    ("update", "PUT", "/{id}"),
    ("destroy", "DELETE", "/{id}"),
];

const DEFAULT_CONTROLLER_NAMESPACE: &str = "App\\Http\\Controllers";

pub struct RouteAnalyzer;

struct Call {
    name: String,
    open: usize,
    close: usize,
}

struct ControllerGroup {
    controller: String,
    open: usize,
    close: usize,
}

struct RouteExtractor<'a, 's> {
    scan: &'a PhpScan<'s>,
    groups: Vec<ControllerGroup>,
    routes: Vec<RouteDefinition>,
}

impl<'a, 's> RouteExtractor<'a, 's> {
    fn text(&self, i: usize) -> &'s str {
        self.scan.sig.get(i).map(|t| t.text).unwrap_or("")
    }

    fn string_at(&self, i: usize) -> Option<String> {
        let t = self.scan.sig.get(i)?;
        (t.kind == TokenKind::Str).then(|| t.unquoted().to_string())
    }

    fn run(&mut self) {
        for i in 0..self.scan.sig.len() {
            let t = self.scan.sig[i];
            if t.kind == TokenKind::Ident && t.text == "Route" && self.text(i + 1) == "::" {
                self.chain(i);
            }
        }
    }

    fn calls(&self, start: usize) -> Vec<Call> {
        let mut calls = Vec::new();
        let mut j = start;
        loop {
            let is_call = self
                .scan
                .sig
                .get(j)
                .map(|t| t.kind == TokenKind::Ident)
                .unwrap_or(false)
                && self.text(j + 1) == "(";
            if !is_call {
                break;
            }
            let close = match lexer::matching_close(&self.scan.sig, j + 1) {
                Some(c) => c,
                None => break,
            };
            calls.push(Call {
                name: self.text(j).to_ascii_lowercase(),
                open: j + 1,
                close,
            });
            j = close + 1;
            if matches!(self.text(j), "->" | "?->") {
                j += 1;
            } else {
                break;
            }
        }
        calls
    }

    /// Top-level argument ranges `[start, end)` between a call's parentheses.
    fn args(&self, call: &Call) -> Vec<(usize, usize)> {
        let mut args = Vec::new();
        let mut depth = 0i32;
        let mut start = call.open + 1;
        for k in call.open + 1..call.close {
            match self.text(k) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                "," if depth == 0 => {
                    args.push((start, k));
                    start = k + 1;
                }
                _ => {}
            }
        }
        if start < call.close {
            args.push((start, call.close));
        }
        args
    }

    /// `Foo::class` at `i`, fully qualified.
    fn class_constant(&self, i: usize, end: usize) -> Option<String> {
        let mut name = String::new();
        let mut j = i;
        while j < end && (self.scan.sig[j].kind == TokenKind::Ident || self.text(j) == "\\") {
            name.push_str(self.text(j));
            j += 1;
        }
        let is_class_constant = self
            .scan
            .sig
            .get(j + 1)
            .map(|t| t.is_keyword("class"))
            .unwrap_or(false);
        if name.is_empty() || self.text(j) != "::" || !is_class_constant {
            return None;
        }
        Some(self.scan.resolve_class(&name))
    }

    fn string_list(&self, (start, end): (usize, usize)) -> Vec<String> {
        (start..end).filter_map(|k| self.string_at(k)).collect()
    }

    fn action(&self, (start, end): (usize, usize), at: usize) -> (Option<String>, Option<String>) {
        if self.text(start) == "[" {
            let controller = self.class_constant(start + 1, end);
            let method = (start..end).find_map(|k| self.string_at(k));
            return (controller, method);
        }
        if let Some(text) = self.string_at(start) {
            if let Some((controller, method)) = text.split_once('@') {
                let controller = if controller.contains('\\') {
                    controller.trim_start_matches('\\').to_string()
                } else {
                    format!("{}\\{}", DEFAULT_CONTROLLER_NAMESPACE, controller)
                };
                return (Some(controller), Some(method.to_string()));
            }
            let group = self
                .groups
                .iter()
                .filter(|g| g.open < at && at < g.close)
                .last();
            return match group {
                Some(g) => (Some(g.controller.clone()), Some(text)),
                None => (None, None),
            };
        }
        match self.class_constant(start, end) {
            Some(controller) => (Some(controller), Some("__invoke".to_string())),
            None => (None, None),
        }
    }

    fn chain(&mut self, start: usize) {
        let line = self.scan.sig[start].line;
        let calls = self.calls(start + 2);

        let controller = calls
            .iter()
            .find(|c| c.name == "controller")
            .and_then(|c| self.class_constant(c.open + 1, c.close));
        if let (Some(controller), Some(group)) = (controller, calls.iter().find(|c| c.name == "group")) {
            self.groups.push(ControllerGroup {
                controller,
                open: group.open,
                close: group.close,
            });
        }

        let route_name = calls
            .iter()
            .find(|c| c.name == "name")
            .and_then(|c| self.string_at(c.open + 1));
        let has_group = calls.iter().any(|c| c.name == "group");

        for call in &calls {
            let args = self.args(call);
            let verb = call.name.as_str();
            let name = if has_group { None } else { route_name.clone() };

            if HTTP_VERBS.contains(&verb) && args.len() >= 2 {
                let (controller, action) = self.action(args[1], call.open);
                self.routes.push(RouteDefinition {
                    verb: verb.to_ascii_uppercase(),
                    uri: self.string_at(args[0].0).unwrap_or_default(),
                    controller,
                    action,
                    name,
                    view: None,
                    line,
                });
            } else if verb == "match" && args.len() >= 3 {
                let (controller, action) = self.action(args[2], call.open);
                self.routes.push(RouteDefinition {
                    verb: self
                        .string_list(args[0])
                        .iter()
                        .map(|v| v.to_ascii_uppercase())
                        .collect::<Vec<_>>()
                        .join("|"),
                    uri: self.string_at(args[1].0).unwrap_or_default(),
                    controller,
                    action,
                    name,
                    view: None,
                    line,
                });
            } else if verb == "view" && args.len() >= 2 {
                self.routes.push(RouteDefinition {
                    verb: "GET".to_string(),
                    uri: self.string_at(args[0].0).unwrap_or_default(),
                    controller: None,
                    action: None,
                    name,
                    view: self.string_at(args[1].0),
                    line,
                });
            } else if (verb == "resource" || verb == "apiresource") && args.len() >= 2 {
                self.resource(&calls, &args, verb == "apiresource", line);
            }
        }
    }

    fn resource(&mut self, calls: &[Call], args: &[(usize, usize)], api: bool, line: u32) {
        let resource = match self.string_at(args[0].0) {
            Some(name) => name,
            None => return,
        };
        let controller = self.class_constant(args[1].0, args[1].1).or_else(|| {
            self.string_at(args[1].0)
                .map(|c| format!("{}\\{}", DEFAULT_CONTROLLER_NAMESPACE, c))
        });
        let filter = |name: &str| -> Vec<String> {
            calls
                .iter()
                .filter(|c| c.name == name)
                .flat_map(|c| {
                    let inner = self.args(c);
                    inner
                        .into_iter()
                        .flat_map(|a| self.string_list(a))
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        let only = filter("only");
        let except = filter("except");
        let base_uri = format!("/{}", resource.trim_matches('/'));

        let mut routes = Vec::new();
        for (action, verb, suffix) in RESOURCE_ACTIONS {
            if api && matches!(*action, "create" | "edit") {
                continue;
            }
            if !only.is_empty() && !only.iter().any(|o| o == action) {
                continue;
            }
            if except.iter().any(|e| e == action) {
                continue;
            }
            routes.push(RouteDefinition {
                verb: verb.to_string(),
                uri: format!("{}{}", base_uri, suffix),
                controller: controller.clone(),
                action: Some(action.to_string()),
                name: Some(format!("{}.{}", resource.replace('/', "."), action)),
                view: None,
                line,
            });
        }
        self.routes.extend(routes);
    }
}

pub(crate) fn extract_routes(scan: &PhpScan<'_>) -> Vec<RouteDefinition> {
    let mut extractor = RouteExtractor {
        scan,
        groups: Vec::new(),
        routes: Vec::new(),
    };
    extractor.run();
    extractor.routes
}

fn route_references(routes: &[RouteDefinition]) -> Vec<SymbolReference> {
    let mut refs = Vec::new();
    for route in routes {
        if let (Some(controller), Some(action)) = (&route.controller, &route.action) {
            refs.push(SymbolReference::new(controller.clone(), route.line, ReferenceKind::Class));
            refs.push(SymbolReference::new(
                format!("{}::{}", controller, action),
                route.line,
                ReferenceKind::RouteAction,
            ));
        }
        if let Some(view) = &route.view {
            refs.push(SymbolReference::new(view.clone(), route.line, ReferenceKind::View));
        }
    }
    refs
}

impl LanguageAnalyzer for RouteAnalyzer {
    fn language(&self) -> Language {
        Language::Route
    }

    fn flavor(&self) -> Flavor {
        Flavor::Php
    }

    fn analyze_source(&self, path: &Path, source: &str) -> Result<FileAnalysis> {
        self.validate_syntax(path, source)?;
        let scanned = php::scan(source);
        let mut base = scanned.base(path, source, Language::Route);
        let routes = extract_routes(&scanned);
        base.references.extend(route_references(&routes));
        Ok(FileAnalysis::Route(RouteAnalysis { base, routes }))
    }

    fn validate_syntax(&self, path: &Path, source: &str) -> Result<()> {
        php::validate(path, source)
    }

    fn symbols_case_insensitive(&self) -> bool {
        true
    }

    fn rewrite_without_imports(&self, _path: &Path, source: &str, imports: &[ImportRef]) -> Result<String> {
        Ok(php::remove_imports(source, imports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEB: &str = r#"<?php

use App\Http\Controllers\PhotoController;
use App\Http\Controllers\UserController;
use Illuminate\Support\Facades\Route;

Route::get('/', [UserController::class, 'index'])->name('home');
Route::post('/legacy', 'LegacyController@store');
Route::get('/invoke', \App\Http\Controllers\ShowDashboard::class);
Route::view('/about', 'pages.about');
Route::match(['get', 'post'], '/search', [UserController::class, 'search']);
Route::resource('photos', PhotoController::class)->only(['index', 'show']);
Route::apiResource('users', UserController::class);

Route::controller(OrderController::class)->group(function () {
    Route::get('/orders', 'index');
});

Route::get('/closure', function () {
    return 'ok';
});
"#;

    fn analyze() -> RouteAnalysis {
        match RouteAnalyzer
            .analyze_source(Path::new("/p/routes/web.php"), WEB)
            .unwrap()
        {
            FileAnalysis::Route(r) => r,
            _ => unreachable!(),
        }
    }

    fn find<'a>(routes: &'a [RouteDefinition], uri: &str) -> &'a RouteDefinition {
        routes.iter().find(|r| r.uri == uri).unwrap()
    }

    #[test]
    fn test_array_action_with_name() {
        let a = analyze();
        let home = find(&a.routes, "/");
        assert_eq!(home.verb, "GET");
        assert_eq!(home.controller.as_deref(), Some("App\\Http\\Controllers\\UserController"));
        assert_eq!(home.action.as_deref(), Some("index"));
        assert_eq!(home.name.as_deref(), Some("home"));
    }

    #[test]
    fn test_string_and_invokable_actions() {
        let a = analyze();
        let legacy = find(&a.routes, "/legacy");
        assert_eq!(legacy.controller.as_deref(), Some("App\\Http\\Controllers\\LegacyController"));
        assert_eq!(legacy.action.as_deref(), Some("store"));
        let invoke = find(&a.routes, "/invoke");
        assert_eq!(invoke.controller.as_deref(), Some("App\\Http\\Controllers\\ShowDashboard"));
        assert_eq!(invoke.action.as_deref(), Some("__invoke"));
    }

    #[test]
    fn test_view_and_match_routes() {
        let a = analyze();
        assert_eq!(find(&a.routes, "/about").view.as_deref(), Some("pages.about"));
        assert_eq!(find(&a.routes, "/search").verb, "GET|POST");
    }

    #[test]
    fn test_resource_expansion() {
        let a = analyze();
        let photos: Vec<_> = a
            .routes
            .iter()
            .filter(|r| r.uri.starts_with("/photos"))
            .map(|r| r.action.clone().unwrap())
            .collect();
        assert_eq!(photos, vec!["index".to_string(), "show".to_string()]);
        let users = a.routes.iter().filter(|r| r.uri.starts_with("/users")).count();
        assert_eq!(users, 5);
    }

    #[test]
    fn test_controller_group_context() {
        let a = analyze();
        let orders = find(&a.routes, "/orders");
        assert_eq!(orders.controller.as_deref(), Some("OrderController"));
        assert_eq!(orders.action.as_deref(), Some("index"));
    }

    #[test]
    fn test_closure_route_has_no_action() {
        let a = analyze();
        let closure = find(&a.routes, "/closure");
        assert!(closure.controller.is_none());
    }

    #[test]
    fn test_route_action_references() {
        let a = analyze();
        assert!(a.base.references.iter().any(|r| r.kind == ReferenceKind::RouteAction
            && r.name == "App\\Http\\Controllers\\UserController::search"));
        assert!(a
            .base
            .references
            .iter()
            .any(|r| r.kind == ReferenceKind::View && r.name == "pages.about"));
    }
}
