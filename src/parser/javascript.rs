use std::collections::BTreeSet;
use std::path::Path;

use swc_common::{input::StringInput, sync::Lrc, BytePos, FileName, SourceFile, SourceMap, Span, Spanned};
use swc_ecma_ast::{
    BlockStmt, Callee, Class, Decl, DefaultDecl, ExportSpecifier, Expr, Function, ImportDecl,
    ImportSpecifier, Lit, Module, ModuleDecl, ModuleExportName, ModuleItem, Pat, Prop,
    PropName, PropOrSpread, Stmt, UnaryOp, VarDecl,
};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, Syntax};

use super::lexer::{self, Flavor, TokenKind};
use super::LanguageAnalyzer;
use crate::error::{CleanupError, Result};
use crate::model::{
    BaseFileAnalysis, ClassInfo, ClassKind, FileAnalysis, ImportKind, ImportRef, JsFileAnalysis,
    Language, MethodInfo, ReferenceKind, SymbolReference, VariableInfo, Visibility,
};
use crate::safety::dynamic;

pub struct JsAnalyzer;

struct ParsedModule {
    cm: Lrc<SourceMap>,
    file: Lrc<SourceFile>,
    module: Module,
}

fn parse_module(path: &Path, source: &str) -> Result<ParsedModule> {
    let cm: Lrc<SourceMap> = Default::default();
    let file = cm.new_source_file(
        Lrc::new(FileName::Real(path.to_path_buf())),
        source.to_string(),
    );

    let syntax = Syntax::Es(EsSyntax {
        jsx: true,
        decorators: true,
        ..Default::default()
    });
    let lexer = Lexer::new(
        syntax,
        swc_ecma_ast::EsVersion::EsNext,
        StringInput::from(&*file),
        None,
    );
    let mut parser = Parser::new_from(lexer);

    let syntax_error = |e: swc_ecma_parser::error::Error| {
        let line = cm.lookup_char_pos(e.span().lo).line;
        CleanupError::syntax(path, format!("line {}: {}", line, e.kind().msg()))
    };

    let module = parser.parse_module().map_err(syntax_error)?;
    if let Some(e) = parser.take_errors().into_iter().next() {
        return Err(syntax_error(e));
    }

    Ok(ParsedModule { cm, file, module })
}

fn atom_to_string(atom: &swc_atoms::Atom) -> String {
    format!("{}", atom)
}

fn wtf8_to_string(wtf8: &swc_atoms::Wtf8Atom) -> String {
    wtf8.as_str().unwrap_or_default().to_string()
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(id) => atom_to_string(&id.sym),
        ModuleExportName::Str(s) => wtf8_to_string(&s.value),
    }
}

fn import_refs(decl: &ImportDecl, line: u32) -> Vec<ImportRef> {
    let specifier = wtf8_to_string(&decl.src.value);
    if decl.specifiers.is_empty() {
        return vec![ImportRef::new(specifier.clone(), specifier.clone(), line, ImportKind::SideEffect)
            .with_source(specifier)];
    }
    decl.specifiers
        .iter()
        .map(|spec| {
            let (symbol, local, kind) = match spec {
                ImportSpecifier::Named(named) => {
                    let local = atom_to_string(&named.local.sym);
                    let symbol = named
                        .imported
                        .as_ref()
                        .map(export_name)
                        .unwrap_or_else(|| local.clone());
                    (symbol, local, ImportKind::Named)
                }
                ImportSpecifier::Default(default) => (
                    "default".to_string(),
                    atom_to_string(&default.local.sym),
                    ImportKind::Default,
                ),
                ImportSpecifier::Namespace(ns) => {
                    ("*".to_string(), atom_to_string(&ns.local.sym), ImportKind::Namespace)
                }
            };
            ImportRef::new(symbol, local, line, kind).with_source(specifier.clone())
        })
        .collect()
}

/// Initialisers that can be dropped without losing an observable effect.
fn is_pure(expr: &Expr) -> bool {
    match expr {
        Expr::Lit(_) | Expr::Ident(_) | Expr::Arrow(_) | Expr::Fn(_) => true,
        Expr::Array(array) => array
            .elems
            .iter()
            .flatten()
            .all(|e| e.spread.is_none() && is_pure(&e.expr)),
        Expr::Object(object) => object.props.iter().all(|prop| match prop {
            PropOrSpread::Prop(prop) => match &**prop {
                Prop::KeyValue(kv) => !matches!(kv.key, PropName::Computed(_)) && is_pure(&kv.value),
                Prop::Shorthand(_) | Prop::Method(_) | Prop::Getter(_) | Prop::Setter(_) => true,
                _ => false,
            },
            PropOrSpread::Spread(_) => false,
        }),
        Expr::Tpl(tpl) => tpl.exprs.iter().all(|e| is_pure(e)),
        Expr::Unary(unary) => unary.op != UnaryOp::Delete && is_pure(&unary.arg),
        Expr::Bin(bin) => is_pure(&bin.left) && is_pure(&bin.right),
        Expr::Paren(paren) => is_pure(&paren.expr),
        Expr::Cond(cond) => is_pure(&cond.test) && is_pure(&cond.cons) && is_pure(&cond.alt),
        _ => false,
    }
}

struct VarSite {
    name: String,
    line: u32,
    end_line: u32,
    removable: bool,
}

struct Collector<'a> {
    cm: &'a SourceMap,
    file_start: BytePos,
    source: &'a str,
    lines: Vec<&'a str>,
    classes: Vec<ClassInfo>,
    methods: Vec<MethodInfo>,
    var_sites: Vec<VarSite>,
    exports: BTreeSet<String>,
    references: Vec<SymbolReference>,
}

impl<'a> Collector<'a> {
    fn offset(&self, pos: BytePos) -> usize {
        (pos.0.saturating_sub(self.file_start.0) as usize).min(self.source.len())
    }

    fn line(&self, pos: BytePos) -> u32 {
        self.cm.lookup_char_pos(pos).line as u32
    }

    fn end_line(&self, span: Span) -> u32 {
        let hi = if span.hi.0 > span.lo.0 { BytePos(span.hi.0 - 1) } else { span.hi };
        self.line(hi)
    }

    /// Whether the span starts and ends its lines, give or take a semicolon.
    fn owns_lines(&self, span: Span) -> bool {
        let lo = self.offset(span.lo);
        let hi = self.offset(span.hi);
        let line_start = self.source[..lo].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = self.source[hi..].find('\n').map(|i| hi + i).unwrap_or(self.source.len());
        self.source[line_start..lo].trim().is_empty()
            && self.source[hi..line_end].trim().trim_start_matches(';').trim().is_empty()
    }

    fn function(&mut self, name: String, owner: Option<String>, span: Span, function: &Function, is_static: bool) {
        let line = self.line(span.lo);
        let params = function
            .params
            .iter()
            .filter_map(|p| match &p.pat {
                Pat::Ident(id) => Some(atom_to_string(&id.id.sym)),
                _ => None,
            })
            .collect();
        self.push_method(name, owner, span, line, params, function.body.as_ref(), is_static);
    }

    #[allow(clippy::too_many_arguments)]
    fn push_method(
        &mut self,
        name: String,
        owner: Option<String>,
        span: Span,
        line: u32,
        parameters: Vec<String>,
        body: Option<&BlockStmt>,
        is_static: bool,
    ) {
        let body = match body {
            Some(body) => body,
            None => return,
        };
        for stmt in &body.stmts {
            match stmt {
                Stmt::Decl(Decl::Var(var)) => self.var_decl(var, false),
                other => self.stmt_references(other),
            }
        }
        let body_text = self.source[self.offset(body.span.lo)..self.offset(body.span.hi)].to_string();
        self.methods.push(MethodInfo {
            name,
            owner,
            visibility: Visibility::Public,
            is_static,
            line,
            start_line: lexer::leading_comment_start(&self.lines, line),
            end_line: self.end_line(span),
            parameters,
            body: body_text,
        });
    }

    fn class(&mut self, name: String, span: Span, class: &Class) {
        let mut extends = None;
        if let Some(sup) = &class.super_class {
            if let Expr::Ident(id) = &**sup {
                let parent = atom_to_string(&id.sym);
                self.references
                    .push(SymbolReference::new(parent.clone(), self.line(span.lo), ReferenceKind::Extends));
                extends = Some(parent);
            }
        }
        self.classes.push(ClassInfo {
            name: name.clone(),
            fqcn: name.clone(),
            kind: ClassKind::Class,
            line: self.line(span.lo),
            extends,
            implements: Vec::new(),
        });

        for member in &class.body {
            match member {
                swc_ecma_ast::ClassMember::Method(method) => {
                    if let PropName::Ident(key) = &method.key {
                        self.function(
                            atom_to_string(&key.sym),
                            Some(name.clone()),
                            method.span,
                            &method.function,
                            method.is_static,
                        );
                    }
                }
                swc_ecma_ast::ClassMember::Constructor(ctor) => {
                    let line = self.line(ctor.span.lo);
                    self.push_method(
                        "constructor".to_string(),
                        Some(name.clone()),
                        ctor.span,
                        line,
                        Vec::new(),
                        ctor.body.as_ref(),
                        false,
                    );
                }
                _ => {}
            }
        }
    }

    fn var_decl(&mut self, var: &VarDecl, exported: bool) {
        let single = var.decls.len() == 1;
        for declarator in &var.decls {
            let name = match &declarator.name {
                Pat::Ident(id) => atom_to_string(&id.id.sym),
                _ => continue,
            };
            if exported {
                self.exports.insert(name.clone());
            }
            let pure = declarator.init.as_deref().map(is_pure).unwrap_or(true);
            self.var_sites.push(VarSite {
                name,
                line: self.line(var.span.lo),
                end_line: self.end_line(var.span),
                removable: single && pure && !exported && self.owns_lines(var.span),
            });
        }
        for declarator in &var.decls {
            if let Some(init) = &declarator.init {
                self.expr_references(init);
            }
        }
    }

    fn decl(&mut self, decl: &Decl, span: Span, exported: bool) {
        match decl {
            Decl::Fn(f) => {
                let name = atom_to_string(&f.ident.sym);
                if exported {
                    self.exports.insert(name.clone());
                }
                self.function(name, None, span, &f.function, false);
            }
            Decl::Class(c) => {
                let name = atom_to_string(&c.ident.sym);
                if exported {
                    self.exports.insert(name.clone());
                }
                self.class(name, span, &c.class);
            }
            Decl::Var(v) => self.var_decl(v, exported),
            _ => {}
        }
    }

    fn module(&mut self, module: &Module) {
        for item in &module.body {
            match item {
                ModuleItem::ModuleDecl(decl) => self.module_decl(decl),
                ModuleItem::Stmt(Stmt::Decl(decl)) => {
                    let span = match decl {
                        Decl::Fn(f) => f.function.span,
                        Decl::Class(c) => c.class.span,
                        Decl::Var(v) => v.span,
                        _ => continue,
                    };
                    self.decl(decl, span, false);
                }
                ModuleItem::Stmt(stmt) => self.stmt_references(stmt),
            }
        }
    }

    fn module_decl(&mut self, decl: &ModuleDecl) {
        match decl {
            ModuleDecl::Import(import) => {
                self.references.push(SymbolReference::new(
                    wtf8_to_string(&import.src.value),
                    self.line(import.span.lo),
                    ReferenceKind::Script,
                ));
            }
            ModuleDecl::ExportDecl(export) => self.decl(&export.decl, export.span, true),
            ModuleDecl::ExportDefaultDecl(default) => {
                self.exports.insert("default".to_string());
                match &default.decl {
                    DefaultDecl::Fn(f) => {
                        let name = f
                            .ident
                            .as_ref()
                            .map(|i| atom_to_string(&i.sym))
                            .unwrap_or_else(|| "default".to_string());
                        self.exports.insert(name.clone());
                        self.function(name, None, default.span, &f.function, false);
                    }
                    DefaultDecl::Class(c) => {
                        let name = c
                            .ident
                            .as_ref()
                            .map(|i| atom_to_string(&i.sym))
                            .unwrap_or_else(|| "default".to_string());
                        self.exports.insert(name.clone());
                        self.class(name, default.span, &c.class);
                    }
                    _ => {}
                }
            }
            ModuleDecl::ExportDefaultExpr(expr) => {
                self.exports.insert("default".to_string());
                if let Expr::Ident(id) = &*expr.expr {
                    self.exports.insert(atom_to_string(&id.sym));
                }
            }
            ModuleDecl::ExportNamed(named) => {
                if let Some(src) = &named.src {
                    self.references.push(SymbolReference::new(
                        wtf8_to_string(&src.value),
                        self.line(named.span.lo),
                        ReferenceKind::Script,
                    ));
                } else {
                    for spec in &named.specifiers {
                        if let ExportSpecifier::Named(named) = spec {
                            self.exports.insert(export_name(&named.orig));
                        }
                    }
                }
            }
            ModuleDecl::ExportAll(all) => {
                self.references.push(SymbolReference::new(
                    wtf8_to_string(&all.src.value),
                    self.line(all.span.lo),
                    ReferenceKind::Script,
                ));
            }
            _ => {}
        }
    }

    fn stmt_references(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr_stmt) => self.expr_references(&expr_stmt.expr),
            Stmt::Decl(Decl::Var(var_decl)) => {
                for decl in &var_decl.decls {
                    if let Some(init) = &decl.init {
                        self.expr_references(init);
                    }
                }
            }
            Stmt::Block(block) => {
                for stmt in &block.stmts {
                    self.stmt_references(stmt);
                }
            }
            Stmt::If(if_stmt) => {
                self.stmt_references(&if_stmt.cons);
                if let Some(alt) = &if_stmt.alt {
                    self.stmt_references(alt);
                }
            }
            Stmt::Return(ret) => {
                if let Some(arg) = &ret.arg {
                    self.expr_references(arg);
                }
            }
            _ => {}
        }
    }

    /// `import('x')` and `require('x')` with literal specifiers.
    fn expr_references(&mut self, expr: &Expr) {
        match expr {
            Expr::Call(call) => {
                let loads_module = match &call.callee {
                    Callee::Import(_) => true,
                    Callee::Expr(callee) => {
                        matches!(&**callee, Expr::Ident(id) if &*id.sym == "require")
                    }
                    _ => false,
                };
                if loads_module {
                    if let Some(arg) = call.args.first() {
                        if let Expr::Lit(Lit::Str(s)) = &*arg.expr {
                            self.references.push(SymbolReference::new(
                                wtf8_to_string(&s.value),
                                self.line(call.span.lo),
                                ReferenceKind::Script,
                            ));
                        }
                    }
                } else {
                    if let Callee::Expr(callee) = &call.callee {
                        self.expr_references(callee);
                    }
                    for arg in &call.args {
                        self.expr_references(&arg.expr);
                    }
                }
            }
            Expr::Member(member) => self.expr_references(&member.obj),
            Expr::Arrow(arrow) => {
                if let swc_ecma_ast::BlockStmtOrExpr::Expr(e) = &*arrow.body {
                    self.expr_references(e);
                }
            }
            Expr::Await(await_expr) => self.expr_references(&await_expr.arg),
            Expr::Paren(paren) => self.expr_references(&paren.expr),
            _ => {}
        }
    }
}

fn import_ranges(parsed: &ParsedModule, source: &str) -> Vec<(usize, usize)> {
    let start = parsed.file.start_pos.0;
    parsed
        .module
        .body
        .iter()
        .filter_map(|item| match item {
            ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => Some((
                (import.span.lo.0.saturating_sub(start) as usize).min(source.len()),
                (import.span.hi.0.saturating_sub(start) as usize).min(source.len()),
            )),
            _ => None,
        })
        .collect()
}

fn render_import(keep: &[&ImportSpecifier], src_text: &str, semicolon: bool) -> String {
    let mut parts = Vec::new();
    let mut named = Vec::new();
    for spec in keep {
        match spec {
            ImportSpecifier::Default(d) => parts.push(atom_to_string(&d.local.sym)),
            ImportSpecifier::Namespace(ns) => parts.push(format!("* as {}", atom_to_string(&ns.local.sym))),
            ImportSpecifier::Named(n) => {
                let local = atom_to_string(&n.local.sym);
                named.push(match &n.imported {
                    Some(imported) if export_name(imported) != local => {
                        format!("{} as {}", export_name(imported), local)
                    }
                    _ => local,
                });
            }
        }
    }
    if !named.is_empty() {
        parts.push(format!("{{ {} }}", named.join(", ")));
    }
    format!(
        "import {} from {}{}",
        parts.join(", "),
        src_text,
        if semicolon { ";" } else { "" }
    )
}

fn specifier_matches(spec: &ImportSpecifier, import: &ImportRef) -> bool {
    let (local, kind) = match spec {
        ImportSpecifier::Named(n) => (atom_to_string(&n.local.sym), ImportKind::Named),
        ImportSpecifier::Default(d) => (atom_to_string(&d.local.sym), ImportKind::Default),
        ImportSpecifier::Namespace(ns) => (atom_to_string(&ns.local.sym), ImportKind::Namespace),
    };
    local == import.local_name && kind == import.kind
}

pub(crate) fn remove_imports(path: &Path, source: &str, imports: &[ImportRef]) -> Result<String> {
    let parsed = parse_module(path, source)?;
    let start = parsed.file.start_pos.0;
    let offset = |pos: BytePos| (pos.0.saturating_sub(start) as usize).min(source.len());

    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    for item in &parsed.module.body {
        let decl = match item {
            ModuleItem::ModuleDecl(ModuleDecl::Import(decl)) => decl,
            _ => continue,
        };
        let specifier = wtf8_to_string(&decl.src.value);
        let targets: Vec<&ImportRef> = imports
            .iter()
            .filter(|i| i.source.as_deref().map(|s| s == specifier).unwrap_or(true))
            .collect();
        if decl.specifiers.is_empty() || targets.is_empty() {
            continue;
        }
        let keep: Vec<&ImportSpecifier> = decl
            .specifiers
            .iter()
            .filter(|s| !targets.iter().any(|t| specifier_matches(s, t)))
            .collect();
        if keep.len() == decl.specifiers.len() {
            continue;
        }
        let (lo, hi) = (offset(decl.span.lo), offset(decl.span.hi));
        if keep.is_empty() {
            edits.push((lo, hi, String::new()));
            continue;
        }
        let src_text = &source[offset(decl.src.span.lo)..offset(decl.src.span.hi)];
        let semicolon = source[lo..hi].trim_end().ends_with(';');
        edits.push((lo, hi, render_import(&keep, src_text, semicolon)));
    }

    let mut out = source.to_string();
    for (lo, hi, replacement) in edits.into_iter().rev() {
        out = lexer::splice(&out, lo, hi, &replacement);
    }
    Ok(out)
}

fn analyze(path: &Path, source: &str) -> Result<JsFileAnalysis> {
    let parsed = parse_module(path, source)?;
    let mut collector = Collector {
        cm: &parsed.cm,
        file_start: parsed.file.start_pos,
        source,
        lines: source.lines().collect(),
        classes: Vec::new(),
        methods: Vec::new(),
        var_sites: Vec::new(),
        exports: BTreeSet::new(),
        references: Vec::new(),
    };
    collector.module(&parsed.module);

    let mut base = BaseFileAnalysis::new(
        path,
        Language::JavaScript,
        source.len() as u64,
        source.lines().count() as u32,
    );
    for item in &parsed.module.body {
        if let ModuleItem::ModuleDecl(ModuleDecl::Import(decl)) = item {
            base.imports
                .extend(import_refs(decl, collector.line(decl.span.lo)));
        }
    }

    let ranges = import_ranges(&parsed, source);
    let lexed = lexer::lex(source, Flavor::JavaScript);
    base.tokens = lexer::count_tokens(&lexed.tokens, &ranges);

    let outside_imports = |start: usize| !ranges.iter().any(|&(s, e)| start >= s && start < e);
    base.variables = collector
        .var_sites
        .iter()
        .map(|site| {
            let lines: Vec<u32> = lexed
                .tokens
                .iter()
                .filter(|t| t.kind == TokenKind::Ident && t.text == site.name && outside_imports(t.start))
                .map(|t| t.line)
                .collect();
            VariableInfo {
                name: site.name.clone(),
                lines,
                declaration_line: Some(site.line),
                declaration_end_line: Some(site.end_line),
                removable: site.removable,
                is_parameter: false,
            }
        })
        .collect();

    base.classes = collector.classes;
    base.methods = collector.methods;
    base.references = collector.references;
    base.dynamic_references = dynamic::scan(source, Language::JavaScript);

    Ok(JsFileAnalysis {
        base,
        exports: collector.exports.into_iter().collect(),
    })
}

impl LanguageAnalyzer for JsAnalyzer {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn flavor(&self) -> Flavor {
        Flavor::JavaScript
    }

    fn analyze_source(&self, path: &Path, source: &str) -> Result<FileAnalysis> {
        analyze(path, source).map(FileAnalysis::JavaScript)
    }

    fn validate_syntax(&self, path: &Path, source: &str) -> Result<()> {
        parse_module(path, source).map(|_| ())
    }

    fn find_unused_methods(&self, analysis: &FileAnalysis) -> Vec<MethodInfo> {
        let exports = match analysis {
            FileAnalysis::JavaScript(js) => js.exports.as_slice(),
            _ => &[],
        };
        let base = analysis.base();
        base.methods
            .iter()
            .filter(|m| !super::is_lifecycle_method(m))
            .filter(|m| match &m.owner {
                None => !exports.contains(&m.name),
                Some(owner) => !exports.contains(owner),
            })
            .filter(|m| self.occurrences(base, &m.name) <= 1)
            .cloned()
            .collect()
    }

    fn find_unused_variables(&self, analysis: &FileAnalysis) -> Vec<VariableInfo> {
        let exports = match analysis {
            FileAnalysis::JavaScript(js) => js.exports.as_slice(),
            _ => &[],
        };
        analysis
            .base()
            .variables
            .iter()
            .filter(|v| v.removable && v.lines.len() == 1 && !exports.contains(&v.name))
            .cloned()
            .collect()
    }

    fn rewrite_without_imports(&self, path: &Path, source: &str, imports: &[ImportRef]) -> Result<String> {
        remove_imports(path, source, imports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const APP: &str = r#"import axios from 'axios';
import { debounce, throttle as limit } from 'lodash';
import * as utils from './utils';
import './bootstrap';

const unused = 42;
const used = [1, 2];
let started = init();

/**
 * Boots the page.
 */
function boot() {
    const local = 'x';
    return axios.get('/api', used);
}

class Widget extends Base {
    constructor() {
        super();
    }

    render() {
        return debounce(() => null);
    }

    orphan() {
        return require('./legacy');
    }
}

export function api() {
    return import('./lazy');
}
"#;

    fn analyze_app() -> JsFileAnalysis {
        analyze(&PathBuf::from("app.js"), APP).unwrap()
    }

    #[test]
    fn test_imports_by_kind() {
        let a = analyze_app();
        let imports: Vec<_> = a
            .base
            .imports
            .iter()
            .map(|i| (i.symbol.as_str(), i.local_name.as_str(), i.kind))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("default", "axios", ImportKind::Default),
                ("debounce", "debounce", ImportKind::Named),
                ("throttle", "limit", ImportKind::Named),
                ("*", "utils", ImportKind::Namespace),
                ("./bootstrap", "./bootstrap", ImportKind::SideEffect),
            ]
        );
    }

    #[test]
    fn test_unused_imports() {
        let analysis = FileAnalysis::JavaScript(analyze_app());
        let unused: Vec<_> = JsAnalyzer
            .find_unused_imports(&analysis)
            .into_iter()
            .map(|i| i.local_name)
            .collect();
        assert_eq!(unused, vec!["limit".to_string(), "utils".to_string()]);
    }

    #[test]
    fn test_methods_and_exports() {
        let a = analyze_app();
        let names: Vec<_> = a.base.methods.iter().map(|m| m.qualified_name()).collect();
        assert_eq!(
            names,
            vec!["boot", "Widget::constructor", "Widget::render", "Widget::orphan", "api"]
        );
        let boot = &a.base.methods[0];
        assert_eq!(boot.start_line, 10);
        assert_eq!(boot.line, 13);
        assert_eq!(boot.end_line, 16);
        assert!(a.exports.contains(&"api".to_string()));

        let analysis = FileAnalysis::JavaScript(a);
        let unused: Vec<_> = JsAnalyzer
            .find_unused_methods(&analysis)
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(unused, vec!["boot".to_string(), "render".to_string(), "orphan".to_string()]);
    }

    #[test]
    fn test_unused_variables_require_pure_init() {
        let analysis = FileAnalysis::JavaScript(analyze_app());
        let unused: Vec<_> = JsAnalyzer
            .find_unused_variables(&analysis)
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(unused, vec!["unused".to_string(), "local".to_string()]);
    }

    #[test]
    fn test_module_references() {
        let a = analyze_app();
        let scripts: Vec<_> = a
            .base
            .references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Script)
            .map(|r| r.name.as_str())
            .collect();
        for expected in ["axios", "lodash", "./utils", "./bootstrap", "./legacy", "./lazy"] {
            assert!(scripts.contains(&expected), "{}", expected);
        }
        assert!(a
            .base
            .references
            .iter()
            .any(|r| r.kind == ReferenceKind::Extends && r.name == "Base"));
    }

    #[test]
    fn test_remove_imports_rewrites_partial_statement() {
        let path = PathBuf::from("app.js");
        let a = analyze_app();
        let analysis = FileAnalysis::JavaScript(a);
        let unused = JsAnalyzer.find_unused_imports(&analysis);
        let out = remove_imports(&path, APP, &unused).unwrap();
        assert!(out.starts_with("import axios from 'axios';\nimport { debounce } from 'lodash';\nimport './bootstrap';\n"));
        assert_eq!(remove_imports(&path, &out, &unused).unwrap(), out);
    }

    #[test]
    fn test_syntax_error() {
        let err = JsAnalyzer
            .validate_syntax(Path::new("a.js"), "function (")
            .unwrap_err();
        assert!(matches!(err, CleanupError::Syntax { .. }));
    }

    #[test]
    fn test_recoverable_errors_fail_validation() {
        for source in [
            "return 5;\n",
            "class A { constructor() {} constructor() {} }\n",
            "const x = a ?? b || c;\n",
        ] {
            let err = JsAnalyzer.validate_syntax(Path::new("a.js"), source).unwrap_err();
            assert!(matches!(err, CleanupError::Syntax { .. }), "{}", source);
        }
        assert!(JsAnalyzer
            .validate_syntax(Path::new("a.js"), "export const x = a ?? (b || c);\n")
            .is_ok());
    }
}
