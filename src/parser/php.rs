use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::assets::asset_references;
use super::lexer::{self, Flavor, Lexed, Token, TokenKind};
use super::{path_in_dir, LanguageAnalyzer};
use crate::error::{CleanupError, Result};
use crate::model::{
    BaseFileAnalysis, ClassInfo, ClassKind, FileAnalysis, ImportKind, ImportRef, Language,
    MethodInfo, PhpFileAnalysis, PhpRole, ReferenceKind, SymbolReference, VariableInfo, Visibility,
};
use crate::safety::dynamic;

static INTERPOLATED_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap());

const MODIFIERS: &[&str] = &[
    "public", "protected", "private", "static", "abstract", "final", "readonly", "var",
];

const BUILTIN_TYPES: &[&str] = &[
    "self", "static", "parent", "array", "int", "integer", "float", "double", "string", "bool",
    "boolean", "void", "mixed", "callable", "iterable", "object", "null", "false", "true",
    "never", "resource",
];

const KEYWORDS: &[&str] = &[
    "abstract", "and", "array", "as", "break", "callable", "case", "catch", "class", "clone",
    "const", "continue", "declare", "default", "die", "do", "echo", "else", "elseif", "empty",
    "enddeclare", "endfor", "endforeach", "endif", "endswitch", "endwhile", "enum", "eval",
    "exit", "extends", "final", "finally", "fn", "for", "foreach", "function", "global", "goto",
    "if", "implements", "include", "include_once", "instanceof", "insteadof", "interface",
    "isset", "list", "match", "namespace", "new", "or", "print", "private", "protected",
    "public", "readonly", "require", "require_once", "return", "static", "switch", "throw",
    "trait", "try", "unset", "use", "var", "while", "xor", "yield",
];

const SUPERGLOBALS: &[&str] = &[
    "$this", "$GLOBALS", "$_SERVER", "$_GET", "$_POST", "$_FILES", "$_COOKIE", "$_SESSION",
    "$_REQUEST", "$_ENV", "$http_response_header", "$argc", "$argv",
];

/// Calls that read or write local variables by name.
const SCOPE_INTROSPECTION: &[&str] = &[
    "compact", "extract", "get_defined_vars", "func_get_args", "func_get_arg", "eval",
];

/// Tokens that make an assignment's right-hand side observable.
const IMPURE: &[&str] = &[
    "(", "new", "++", "--", "=", "+=", "-=", "*=", "/=", ".=", "%=", "??=", "**=", "|=", "&=",
    "^=", "->", "?->", "&", "`", "$", "${", "yield", "await", "include", "include_once",
    "require", "require_once", "clone", "print", "echo", "throw",
];

pub struct PhpAnalyzer;

#[derive(Debug, Clone)]
pub(crate) struct UseClause {
    pub symbol: String,
    pub alias: Option<String>,
    pub kind: ImportKind,
    pub start: usize,
    pub end: usize,
    pub line: u32,
}

impl UseClause {
    pub fn local_name(&self) -> &str {
        self.alias
            .as_deref()
            .unwrap_or_else(|| self.symbol.rsplit('\\').next().unwrap_or(&self.symbol))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UseStatement {
    pub start: usize,
    pub end: usize,
    pub clauses: Vec<UseClause>,
}

#[derive(Debug, Default)]
struct VarTrack {
    lines: Vec<u32>,
    decl: Option<(u32, u32, bool)>,
}

#[derive(Debug)]
struct FnScope {
    name: String,
    owner: Option<String>,
    register: bool,
    visibility: Visibility,
    is_static: bool,
    line: u32,
    start_line: u32,
    params: Vec<String>,
    open_depth: i32,
    body_start: usize,
    vars: BTreeMap<String, VarTrack>,
    dynamic_scope: bool,
}

#[derive(Debug)]
struct ClassScope {
    open_depth: i32,
}

/// Everything extracted from one PHP source in a single token walk.
pub(crate) struct PhpScan<'s> {
    pub lexed: Lexed<'s>,
    pub sig: Vec<Token<'s>>,
    pub namespace: Option<String>,
    aliases: HashMap<String, String>,
    pub classes: Vec<ClassInfo>,
    pub methods: Vec<MethodInfo>,
    pub variables: Vec<VariableInfo>,
    pub imports: Vec<ImportRef>,
    pub references: Vec<SymbolReference>,
    pub use_statements: Vec<UseStatement>,
}

impl<'s> PhpScan<'s> {
    /// Fully qualifies a class name against the file's imports and namespace.
    pub fn resolve_class(&self, name: &str) -> String {
        if let Some(stripped) = name.strip_prefix('\\') {
            return stripped.to_string();
        }
        let (first, rest) = match name.split_once('\\') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name, None),
        };
        if let Some(symbol) = self.aliases.get(&first.to_ascii_lowercase()) {
            return match rest {
                Some(rest) => format!("{}\\{}", symbol, rest),
                None => symbol.clone(),
            };
        }
        match &self.namespace {
            Some(ns) => format!("{}\\{}", ns, name),
            None => name.to_string(),
        }
    }

    fn import_ranges(&self) -> Vec<(usize, usize)> {
        self.use_statements.iter().map(|s| (s.start, s.end)).collect()
    }

    pub fn base(&self, path: &Path, source: &str, language: Language) -> BaseFileAnalysis {
        let mut base = BaseFileAnalysis::new(
            path,
            language,
            source.len() as u64,
            source.lines().count() as u32,
        );
        base.classes = self.classes.clone();
        base.methods = self.methods.clone();
        base.variables = self.variables.clone();
        base.imports = self.imports.clone();
        base.references = self.references.clone();
        base.references.extend(asset_references(source));
        base.dynamic_references = dynamic::scan(source, Language::Php);
        base.tokens = lexer::count_tokens(&self.lexed.tokens, &self.import_ranges());
        base
    }
}

struct Scanner<'s> {
    source: &'s str,
    lines: Vec<&'s str>,
    sig: Vec<Token<'s>>,
    depth: i32,
    fn_stack: Vec<FnScope>,
    class_stack: Vec<ClassScope>,
    namespace: Option<String>,
    aliases: HashMap<String, String>,
    classes: Vec<ClassInfo>,
    methods: Vec<MethodInfo>,
    variables: Vec<VariableInfo>,
    imports: Vec<ImportRef>,
    references: Vec<SymbolReference>,
    use_statements: Vec<UseStatement>,
}

pub(crate) fn scan(source: &str) -> PhpScan<'_> {
    let lexed = lexer::lex(source, Flavor::Php);
    let sig = lexed.significant();
    let mut scanner = Scanner {
        source,
        lines: source.lines().collect(),
        sig: sig.clone(),
        depth: 0,
        fn_stack: Vec::new(),
        class_stack: Vec::new(),
        namespace: None,
        aliases: HashMap::new(),
        classes: Vec::new(),
        methods: Vec::new(),
        variables: Vec::new(),
        imports: Vec::new(),
        references: Vec::new(),
        use_statements: Vec::new(),
    };
    scanner.run();

    PhpScan {
        lexed,
        sig,
        namespace: scanner.namespace,
        aliases: scanner.aliases,
        classes: scanner.classes,
        methods: scanner.methods,
        variables: scanner.variables,
        imports: scanner.imports,
        references: scanner.references,
        use_statements: scanner.use_statements,
    }
}

impl<'s> Scanner<'s> {
    fn run(&mut self) {
        let mut i = 0;
        while i < self.sig.len() {
            let token = self.sig[i];
            i = match token.kind {
                TokenKind::Punct => self.punct(i),
                TokenKind::Ident => self.ident(i),
                TokenKind::Variable => self.variable(i),
                TokenKind::Str => {
                    self.interpolated(token);
                    i + 1
                }
                _ => i + 1,
            };
        }
    }

    fn text(&self, i: usize) -> &'s str {
        self.sig.get(i).map(|t| t.text).unwrap_or("")
    }

    fn prev_text(&self, i: usize, back: usize) -> &'s str {
        i.checked_sub(back).map(|j| self.text(j)).unwrap_or("")
    }

    fn is_kw(&self, i: usize, kw: &str) -> bool {
        self.sig.get(i).map(|t| t.is_keyword(kw)).unwrap_or(false)
    }

    fn punct(&mut self, i: usize) -> usize {
        match self.sig[i].text {
            "{" | "${" => {
                self.depth += 1;
                i + 1
            }
            "}" => {
                self.close_brace(i);
                i + 1
            }
            "\\" if self.sig.get(i + 1).map(|t| t.kind == TokenKind::Ident).unwrap_or(false) => {
                self.name_reference(i)
            }
            _ => i + 1,
        }
    }

    fn close_brace(&mut self, i: usize) {
        let token = self.sig[i];
        if self.fn_stack.last().map(|f| f.open_depth == self.depth).unwrap_or(false) {
            if let Some(scope) = self.fn_stack.pop() {
                self.finish_function(scope, token);
            }
        }
        if self
            .class_stack
            .last()
            .map(|c| c.open_depth == self.depth)
            .unwrap_or(false)
        {
            self.class_stack.pop();
        }
        self.depth -= 1;
    }

    fn in_class_body(&self) -> bool {
        self.fn_stack.is_empty()
            && self
                .class_stack
                .last()
                .map(|c| c.open_depth == self.depth)
                .unwrap_or(false)
    }

    fn ident(&mut self, i: usize) -> usize {
        let token = self.sig[i];
        let prev = self.prev_text(i, 1);

        if token.is_keyword("namespace") && self.fn_stack.is_empty() && self.class_stack.is_empty() {
            let (name, end) = self.read_name(i + 1);
            if !name.is_empty() {
                self.namespace = Some(name);
                return end;
            }
            return i + 1;
        }

        if token.is_keyword("use") {
            if self.in_class_body() {
                return self.trait_use(i);
            }
            if self.fn_stack.is_empty() && self.class_stack.is_empty() && self.text(i + 1) != "(" {
                return self.use_statement(i);
            }
            return i + 1;
        }

        let is_type_keyword = ["class", "interface", "trait", "enum"]
            .iter()
            .any(|kw| token.is_keyword(kw));
        if is_type_keyword
            && prev != "::"
            && !self.is_kw(i.wrapping_sub(1), "new")
            && self.sig.get(i + 1).map(|t| t.kind == TokenKind::Ident).unwrap_or(false)
        {
            return self.class_header(i);
        }

        if token.is_keyword("function") && prev != "->" && prev != "::" {
            return self.function(i);
        }

        let introspects = SCOPE_INTROSPECTION.iter().any(|f| token.is_keyword(f)) && self.text(i + 1) == "(";
        if introspects {
            if let Some(scope) = self.fn_stack.last_mut() {
                scope.dynamic_scope = true;
            }
        }

        self.name_reference(i)
    }

    /// Reads a qualified name (`\A\B`, `A\B`) starting at `i`.
    fn read_name(&self, i: usize) -> (String, usize) {
        let mut name = String::new();
        let mut j = i;
        while let Some(t) = self.sig.get(j) {
            let part = match t.kind {
                TokenKind::Ident => !name.ends_with(|c: char| c.is_alphanumeric() || c == '_'),
                TokenKind::Punct if t.text == "\\" => true,
                _ => false,
            };
            if !part {
                break;
            }
            name.push_str(t.text);
            j += 1;
        }
        (name, j)
    }

    fn add_class_ref(&mut self, name: &str, line: u32, kind: ReferenceKind) {
        let bare = name.trim_start_matches('\\');
        if bare.is_empty() || BUILTIN_TYPES.contains(&bare.to_ascii_lowercase().as_str()) {
            return;
        }
        let fqcn = self.resolve(name);
        self.references.push(SymbolReference::new(fqcn, line, kind));
    }

    fn resolve(&self, name: &str) -> String {
        if let Some(stripped) = name.strip_prefix('\\') {
            return stripped.to_string();
        }
        let (first, rest) = match name.split_once('\\') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name, None),
        };
        if let Some(symbol) = self.aliases.get(&first.to_ascii_lowercase()) {
            return match rest {
                Some(rest) => format!("{}\\{}", symbol, rest),
                None => symbol.clone(),
            };
        }
        match &self.namespace {
            Some(ns) => format!("{}\\{}", ns, name),
            None => name.to_string(),
        }
    }

    fn name_reference(&mut self, i: usize) -> usize {
        let (name, end) = self.read_name(i);
        if name.is_empty() {
            return i + 1;
        }
        let line = self.sig[i].line;
        let lower = name.trim_start_matches('\\').to_ascii_lowercase();
        let prev = self.prev_text(i, 1);
        let next = self.text(end);

        if matches!(prev, "->" | "?->" | "::" | "function" | "const")
            || (KEYWORDS.contains(&lower.as_str()) && !self.is_kw(i.wrapping_sub(1), "new"))
        {
            return end;
        }

        if self.is_kw(i.wrapping_sub(1), "new") || self.is_kw(i.wrapping_sub(1), "instanceof") || prev == "#[" {
            if !matches!(lower.as_str(), "static" | "self" | "parent" | "class") {
                self.add_class_ref(&name, line, ReferenceKind::Class);
            }
            return end;
        }

        if next == "(" {
            if lower == "view" {
                if let Some(view) = self.string_arg(end + 1) {
                    self.references.push(SymbolReference::new(view, line, ReferenceKind::View));
                }
            }
            if BUILTIN_TYPES.contains(&lower.as_str()) {
                return end;
            }
            self.references.push(SymbolReference::new(
                name.trim_start_matches('\\'),
                line,
                ReferenceKind::Function,
            ));
            return end;
        }

        if next == "::" {
            if !matches!(lower.as_str(), "static" | "self" | "parent") {
                self.add_class_ref(&name, line, ReferenceKind::Class);
            }
            if lower == "view" && self.is_kw(end + 1, "make") && self.text(end + 2) == "(" {
                if let Some(view) = self.string_arg(end + 3) {
                    self.references.push(SymbolReference::new(view, line, ReferenceKind::View));
                }
            }
            return end;
        }

        let next_is_var = self.sig.get(end).map(|t| t.kind == TokenKind::Variable).unwrap_or(false)
            || (matches!(next, "&" | "...")
                && self.sig.get(end + 1).map(|t| t.kind == TokenKind::Variable).unwrap_or(false));
        let return_type = (prev == ":" && self.prev_text(i, 2) == ")")
            || (prev == "?" && self.prev_text(i, 2) == ":" && self.prev_text(i, 3) == ")");
        let union_member = (prev == "|" || next == "|")
            && name
                .trim_start_matches('\\')
                .starts_with(|c: char| c.is_ascii_uppercase());

        if next_is_var || return_type || union_member {
            self.add_class_ref(&name, line, ReferenceKind::Class);
        }

        end
    }

    fn string_arg(&self, i: usize) -> Option<String> {
        let t = self.sig.get(i)?;
        if t.kind == TokenKind::Str && !t.text.starts_with("<<<") {
            Some(t.unquoted().to_string())
        } else {
            None
        }
    }

    fn use_statement(&mut self, i: usize) -> usize {
        let start = self.sig[i].start;
        let mut j = i + 1;
        let mut kind = ImportKind::Class;
        if self.is_kw(j, "function") {
            kind = ImportKind::Function;
            j += 1;
        } else if self.is_kw(j, "const") {
            kind = ImportKind::Const;
            j += 1;
        }

        let mut clauses = Vec::new();
        loop {
            let clause_start = match self.sig.get(j) {
                Some(t) => t.start,
                None => break,
            };
            let (name, end) = self.read_name(j);
            if name.is_empty() {
                break;
            }
            j = end;

            if self.text(j) == "{" {
                let prefix = name.trim_end_matches('\\').trim_start_matches('\\').to_string();
                j += 1;
                while j < self.sig.len() && self.text(j) != "}" {
                    let inner_start = self.sig[j].start;
                    let mut inner_kind = kind;
                    if self.is_kw(j, "function") {
                        inner_kind = ImportKind::Function;
                        j += 1;
                    } else if self.is_kw(j, "const") {
                        inner_kind = ImportKind::Const;
                        j += 1;
                    }
                    let (inner, inner_end) = self.read_name(j);
                    if inner.is_empty() {
                        j += 1;
                        continue;
                    }
                    let line = self.sig[j].line;
                    j = inner_end;
                    let mut alias = None;
                    if self.is_kw(j, "as") {
                        alias = self.sig.get(j + 1).map(|t| t.text.to_string());
                        j += 2;
                    }
                    let clause_end = self.sig[j - 1].end;
                    clauses.push(UseClause {
                        symbol: format!("{}\\{}", prefix, inner.trim_start_matches('\\')),
                        alias,
                        kind: inner_kind,
                        start: inner_start,
                        end: clause_end,
                        line,
                    });
                    if self.text(j) == "," {
                        j += 1;
                    }
                }
                j += 1;
            } else {
                let line = self.sig[end - 1].line;
                let mut alias = None;
                if self.is_kw(j, "as") {
                    alias = self.sig.get(j + 1).map(|t| t.text.to_string());
                    j += 2;
                }
                let clause_end = self.sig[j - 1].end;
                clauses.push(UseClause {
                    symbol: name.trim_start_matches('\\').to_string(),
                    alias,
                    kind,
                    start: clause_start,
                    end: clause_end,
                    line,
                });
            }

            if self.text(j) == "," {
                j += 1;
                continue;
            }
            break;
        }

        let end = match self.sig.get(j) {
            Some(t) if t.text == ";" => t.end,
            Some(t) => t.start,
            None => self.source.len(),
        };

        for clause in &clauses {
            let local = clause.local_name().to_string();
            if clause.kind == ImportKind::Class {
                self.aliases
                    .insert(local.to_ascii_lowercase(), clause.symbol.clone());
            }
            self.imports
                .push(ImportRef::new(clause.symbol.clone(), local, clause.line, clause.kind));
        }
        self.use_statements.push(UseStatement { start, end, clauses });

        j + 1
    }

    fn trait_use(&mut self, i: usize) -> usize {
        let mut j = i + 1;
        while j < self.sig.len() {
            match self.text(j) {
                ";" => return j + 1,
                "{" => {
                    return lexer::matching_close(&self.sig, j)
                        .map(|c| c + 1)
                        .unwrap_or(j + 1)
                }
                "," => j += 1,
                _ => {
                    let (name, end) = self.read_name(j);
                    if name.is_empty() {
                        j += 1;
                    } else {
                        let line = self.sig[j].line;
                        self.add_class_ref(&name, line, ReferenceKind::TraitUse);
                        j = end;
                    }
                }
            }
        }
        j
    }

    fn class_header(&mut self, i: usize) -> usize {
        let token = self.sig[i];
        let kind = match token.text.to_ascii_lowercase().as_str() {
            "interface" => ClassKind::Interface,
            "trait" => ClassKind::Trait,
            "enum" => ClassKind::Enum,
            _ => ClassKind::Class,
        };
        let name = self.sig[i + 1].text.to_string();
        let fqcn = match &self.namespace {
            Some(ns) => format!("{}\\{}", ns, name),
            None => name.clone(),
        };

        let mut extends = None;
        let mut implements = Vec::new();
        let mut mode = "";
        let mut j = i + 2;
        while j < self.sig.len() && self.text(j) != "{" {
            let t = self.sig[j];
            if t.is_keyword("extends") || t.is_keyword("implements") {
                mode = if t.is_keyword("extends") { "extends" } else { "implements" };
                j += 1;
                continue;
            }
            let (ref_name, end) = self.read_name(j);
            if ref_name.is_empty() || mode.is_empty() {
                j += 1;
                continue;
            }
            let resolved = self.resolve(&ref_name);
            if mode == "extends" && kind != ClassKind::Interface && extends.is_none() {
                extends = Some(resolved.clone());
                self.references
                    .push(SymbolReference::new(resolved, t.line, ReferenceKind::Extends));
            } else {
                implements.push(resolved.clone());
                let ref_kind = if mode == "extends" {
                    ReferenceKind::Extends
                } else {
                    ReferenceKind::Implements
                };
                self.references.push(SymbolReference::new(resolved, t.line, ref_kind));
            }
            j = end;
        }

        self.classes.push(ClassInfo {
            name,
            fqcn,
            kind,
            line: token.line,
            extends,
            implements,
        });
        self.class_stack.push(ClassScope {
            open_depth: self.depth + 1,
        });
        j
    }

    fn function(&mut self, i: usize) -> usize {
        let mut j = i + 1;
        if self.text(j) == "&" {
            j += 1;
        }
        let named = self.sig.get(j).map(|t| t.kind == TokenKind::Ident).unwrap_or(false)
            && self.text(j + 1) == "(";
        if !named {
            return i + 1;
        }

        let name_token = self.sig[j];
        let paren = j + 1;
        let close = match lexer::matching_close(&self.sig, paren) {
            Some(c) => c,
            None => return paren,
        };

        let mut k = close + 1;
        while k < self.sig.len() && !matches!(self.text(k), "{" | ";") {
            k += 1;
        }
        if self.text(k) != "{" {
            return paren;
        }

        let owner = if self.in_class_body() {
            self.classes.last().map(|c| c.fqcn.clone())
        } else {
            None
        };
        let register = self.fn_stack.is_empty() && (owner.is_some() || self.class_stack.is_empty());

        let mut first = i;
        let mut visibility = Visibility::Public;
        let mut is_static = false;
        while first > 0 {
            let t = self.sig[first - 1];
            if !MODIFIERS.iter().any(|m| t.is_keyword(m)) {
                break;
            }
            if t.is_keyword("private") {
                visibility = Visibility::Private;
            } else if t.is_keyword("protected") {
                visibility = Visibility::Protected;
            } else if t.is_keyword("static") {
                is_static = true;
            }
            first -= 1;
        }
        let start_line = lexer::leading_comment_start(&self.lines, self.sig[first].line);

        let params = self.sig[paren + 1..close]
            .iter()
            .filter(|t| t.kind == TokenKind::Variable)
            .map(|t| t.text.to_string())
            .collect();

        self.fn_stack.push(FnScope {
            name: name_token.text.to_string(),
            owner,
            register,
            visibility,
            is_static,
            line: name_token.line,
            start_line,
            params,
            open_depth: self.depth + 1,
            body_start: self.sig[k].start,
            vars: BTreeMap::new(),
            dynamic_scope: false,
        });

        paren
    }

    fn finish_function(&mut self, scope: FnScope, close: Token<'s>) {
        let FnScope {
            name,
            owner,
            register,
            visibility,
            is_static,
            line,
            start_line,
            params,
            body_start,
            vars,
            dynamic_scope,
            ..
        } = scope;

        for (var, track) in vars {
            if SUPERGLOBALS.contains(&var.as_str()) {
                continue;
            }
            let is_parameter = params.contains(&var);
            let (declaration_line, declaration_end_line, pure) = match track.decl {
                Some((l, e, p)) => (Some(l), Some(e), p),
                None => (None, None, false),
            };
            self.variables.push(VariableInfo {
                name: var,
                lines: track.lines,
                declaration_line,
                declaration_end_line,
                removable: pure && !dynamic_scope && !is_parameter,
                is_parameter,
            });
        }

        if register {
            self.methods.push(MethodInfo {
                name,
                owner,
                visibility,
                is_static,
                line,
                start_line,
                end_line: close.line,
                parameters: params,
                body: self.source[body_start..close.end].to_string(),
            });
        }
    }

    fn variable(&mut self, i: usize) -> usize {
        let token = self.sig[i];
        let prev = if i > 0 { Some(self.sig[i - 1]) } else { None };

        let declaration = self.declaration_at(i);
        let scope = match self.fn_stack.last_mut() {
            Some(scope) => scope,
            None => return i + 1,
        };

        if prev.map(|p| p.is_punct("$")).unwrap_or(false) {
            scope.dynamic_scope = true;
        }

        let track = scope.vars.entry(token.text.to_string()).or_default();
        track.lines.push(token.line);
        if track.decl.is_none() && track.lines.len() == 1 {
            track.decl = declaration;
        }
        i + 1
    }

    /// `$x = <expr>;` occupying whole lines, with its end line and whether the
    /// right-hand side is free of side effects.
    fn declaration_at(&self, i: usize) -> Option<(u32, u32, bool)> {
        let token = self.sig[i];
        let prev = self.sig.get(i.checked_sub(1)?)?;
        if !matches!(prev.text, ";" | "{" | "}") || prev.kind != TokenKind::Punct || prev.line >= token.line {
            return None;
        }
        if !self.sig.get(i + 1)?.is_punct("=") {
            return None;
        }

        let mut nesting = 0i32;
        let mut pure = true;
        let mut j = i + 2;
        while let Some(t) = self.sig.get(j) {
            if t.kind == TokenKind::Punct {
                match t.text {
                    "(" | "[" | "{" | "#[" | "${" => nesting += 1,
                    ")" | "]" | "}" => {
                        nesting -= 1;
                        if nesting < 0 {
                            return None;
                        }
                    }
                    ";" if nesting == 0 => break,
                    _ => {}
                }
            }
            if IMPURE.iter().any(|p| t.text.eq_ignore_ascii_case(p)) && t.kind != TokenKind::Str {
                pure = false;
            }
            j += 1;
        }
        let end = self.sig.get(j)?;
        let own_lines = self
            .sig
            .get(j + 1)
            .map(|next| next.line > end.line)
            .unwrap_or(true);
        Some((token.line, end.line, pure && own_lines))
    }

    fn interpolated(&mut self, token: Token<'s>) {
        let interpolates = token.text.starts_with('"')
            || (token.text.starts_with("<<<") && !token.text[3..].trim_start().starts_with('\''));
        if !interpolates {
            return;
        }
        let scope = match self.fn_stack.last_mut() {
            Some(scope) => scope,
            None => return,
        };
        for cap in INTERPOLATED_VAR_RE.captures_iter(token.text) {
            let offset = cap.get(0).map(|m| m.start()).unwrap_or(0);
            let line = token.line + token.text[..offset].matches('\n').count() as u32;
            scope
                .vars
                .entry(format!("${}", &cap[1]))
                .or_default()
                .lines
                .push(line);
        }
    }
}

pub fn classify_role(path: &Path, classes: &[ClassInfo]) -> PhpRole {
    let by_dir = [
        ("database/migrations", PhpRole::Migration),
        ("database/seeders", PhpRole::Seeder),
        ("database/seeds", PhpRole::Seeder),
        ("app/Providers", PhpRole::Provider),
        ("app/Http/Middleware", PhpRole::Middleware),
        ("app/Console/Commands", PhpRole::Command),
        ("app/Http/Controllers", PhpRole::Controller),
        ("app/Models", PhpRole::Model),
        ("config", PhpRole::Config),
        ("tests", PhpRole::Test),
    ];
    for (dir, role) in by_dir {
        if path_in_dir(path, dir) {
            return role;
        }
    }

    let parent = classes
        .first()
        .and_then(|c| c.extends.as_deref())
        .map(|e| e.rsplit('\\').next().unwrap_or(e));
    match parent {
        Some("Controller") => PhpRole::Controller,
        Some("Model") | Some("Authenticatable") | Some("Pivot") => PhpRole::Model,
        Some("Migration") => PhpRole::Migration,
        Some("Seeder") => PhpRole::Seeder,
        Some("ServiceProvider") => PhpRole::Provider,
        Some("Command") => PhpRole::Command,
        Some("TestCase") => PhpRole::Test,
        _ => PhpRole::Other,
    }
}

pub(crate) fn validate(path: &Path, source: &str) -> Result<()> {
    let lexed = lexer::lex(source, Flavor::Php);
    if let Some(err) = lexed.errors.first() {
        return Err(CleanupError::syntax(path, err.to_string()));
    }
    lexer::check_balance(&lexed.significant())
        .map_err(|err| CleanupError::syntax(path, err.to_string()))
}

fn clause_matches(clause: &UseClause, import: &ImportRef) -> bool {
    clause
        .symbol
        .trim_start_matches('\\')
        .eq_ignore_ascii_case(import.symbol.trim_start_matches('\\'))
        && clause.local_name().eq_ignore_ascii_case(&import.local_name)
}

/// Drops the given imports from `use` statements, rewriting grouped and
/// comma-separated statements that keep other clauses.
pub(crate) fn remove_imports(source: &str, imports: &[ImportRef]) -> String {
    let scanned = scan(source);
    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    for statement in &scanned.use_statements {
        let keep: Vec<&UseClause> = statement
            .clauses
            .iter()
            .filter(|c| !imports.iter().any(|i| clause_matches(c, i)))
            .collect();
        if keep.len() == statement.clauses.len() {
            continue;
        }
        if keep.is_empty() {
            edits.push((statement.start, statement.end, String::new()));
            continue;
        }
        let (first, last) = match (statement.clauses.first(), statement.clauses.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => continue,
        };
        let prefix = &source[statement.start..first.start];
        let suffix = &source[last.end..statement.end];
        let kept: Vec<&str> = keep.iter().map(|c| &source[c.start..c.end]).collect();
        edits.push((
            statement.start,
            statement.end,
            format!("{}{}{}", prefix, kept.join(", "), suffix),
        ));
    }

    let mut out = source.to_string();
    for (start, end, replacement) in edits.into_iter().rev() {
        out = lexer::splice(&out, start, end, &replacement);
    }
    out
}

impl LanguageAnalyzer for PhpAnalyzer {
    fn language(&self) -> Language {
        Language::Php
    }

    fn analyze_source(&self, path: &Path, source: &str) -> Result<FileAnalysis> {
        self.validate_syntax(path, source)?;
        let scanned = scan(source);
        let base = scanned.base(path, source, Language::Php);
        let role = classify_role(path, &scanned.classes);
        Ok(FileAnalysis::Php(PhpFileAnalysis {
            base,
            namespace: scanned.namespace,
            role,
        }))
    }

    fn validate_syntax(&self, path: &Path, source: &str) -> Result<()> {
        validate(path, source)
    }

    fn symbols_case_insensitive(&self) -> bool {
        true
    }

    fn flavor(&self) -> Flavor {
        Flavor::Php
    }

    fn rewrite_without_imports(&self, _path: &Path, source: &str, imports: &[ImportRef]) -> Result<String> {
        Ok(remove_imports(source, imports))
    }
}
