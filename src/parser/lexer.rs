use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_\-]*").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Php,
    JavaScript,
    Css,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Variable,
    Number,
    Str,
    Comment,
    Punct,
    InlineHtml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub line: u32,
    pub start: usize,
    pub end: usize,
}

impl<'a> Token<'a> {
    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Ident && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Comment | TokenKind::InlineHtml)
    }

    /// String literal contents without quotes; heredocs are returned whole.
    pub fn unquoted(&self) -> &'a str {
        if self.kind != TokenKind::Str || self.text.len() < 2 {
            return self.text;
        }
        let first = self.text.as_bytes()[0];
        if matches!(first, b'\'' | b'"' | b'`') && self.text.ends_with(first as char) {
            &self.text[1..self.text.len() - 1]
        } else {
            self.text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: u32,
    pub message: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Default)]
pub struct Lexed<'a> {
    pub tokens: Vec<Token<'a>>,
    pub errors: Vec<LexError>,
}

impl<'a> Lexed<'a> {
    /// Tokens without comments and inline HTML.
    pub fn significant(&self) -> Vec<Token<'a>> {
        self.tokens.iter().filter(|t| !t.is_trivia()).copied().collect()
    }
}

const PUNCTS: &[&str] = &[
    "...", "===", "!==", "??=", "?->", "<=>", "**=", "::", "->", "=>", "==", "!=", "<=", ">=",
    "&&", "||", "??", "++", "--", "+=", "-=", "*=", "/=", ".=", "%=", "|=", "&=", "^=", "**",
    "#[", "${",
];

const REGEX_PRECEDERS: &[&str] = &[
    "(", ",", "=", ":", "[", "!", "&", "|", "?", "{", "}", ";", "+", "-", "*", "%", "<", ">", "~",
    "^", "&&", "||", "??", "==", "===", "!=", "!==", "=>", "+=", "-=", "return", "typeof",
    "case", "do", "else", "in", "of", "new", "delete", "void", "throw", "instanceof", "yield",
    "await",
];

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    flavor: Flavor,
    out: Lexed<'a>,
}

pub fn lex(source: &str, flavor: Flavor) -> Lexed<'_> {
    let mut lexer = Lexer {
        src: source,
        bytes: source.as_bytes(),
        pos: 0,
        line: 1,
        flavor,
        out: Lexed::default(),
    };
    lexer.run();
    lexer.out
}

impl<'a> Lexer<'a> {
    fn run(&mut self) {
        if self.flavor == Flavor::Php {
            self.inline_html();
        }

        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            match c {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0c => self.pos += 1,
                b'?' if self.flavor == Flavor::Php && self.peek_is(b"?>") => {
                    self.pos += 2;
                    self.inline_html();
                }
                b'/' if self.peek_is(b"/*") => self.block_comment(),
                b'/' if self.peek_is(b"//") && self.line_comment_allowed() => self.line_comment(),
                b'#' if self.flavor == Flavor::Php && !self.peek_is(b"#[") => self.line_comment(),
                b'/' if self.flavor == Flavor::JavaScript && self.regex_allowed() => self.regex(),
                b'\'' | b'"' => self.string(c),
                b'`' if self.flavor == Flavor::JavaScript => self.template(),
                b'<' if self.flavor == Flavor::Php && self.peek_is(b"<<<") => self.heredoc(),
                b'$' if self.flavor == Flavor::Php && self.ident_start_at(self.pos + 1) => {
                    let start = self.pos;
                    self.pos += 1;
                    self.consume_ident();
                    self.push(TokenKind::Variable, start, self.line);
                }
                b'0'..=b'9' => self.number(),
                b'.' if self.digit_at(self.pos + 1) => self.number(),
                b'-' if self.flavor == Flavor::Css && self.ident_start_at(self.pos + 1) => {
                    let start = self.pos;
                    self.pos += 1;
                    self.consume_ident();
                    self.push(TokenKind::Ident, start, self.line);
                }
                _ if self.ident_start_at(self.pos) => {
                    let start = self.pos;
                    self.consume_ident();
                    self.push(TokenKind::Ident, start, self.line);
                }
                _ => self.punct(),
            }
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: u32) {
        self.out.tokens.push(Token {
            kind,
            text: &self.src[start..self.pos],
            line,
            start,
            end: self.pos,
        });
    }

    fn error(&mut self, line: u32, message: impl Into<String>) {
        self.out.errors.push(LexError {
            line,
            message: message.into(),
        });
    }

    fn peek_is(&self, s: &[u8]) -> bool {
        self.bytes[self.pos..].starts_with(s)
    }

    fn ident_start_at(&self, i: usize) -> bool {
        self.bytes
            .get(i)
            .map(|&b| b.is_ascii_alphabetic() || b == b'_' || b >= 0x80 || (b == b'$' && self.flavor == Flavor::JavaScript))
            .unwrap_or(false)
    }

    fn digit_at(&self, i: usize) -> bool {
        self.bytes.get(i).map(u8::is_ascii_digit).unwrap_or(false)
    }

    fn consume_ident(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            let ok = b.is_ascii_alphanumeric()
                || b == b'_'
                || b >= 0x80
                || (b == b'$' && self.flavor == Flavor::JavaScript)
                || (b == b'-' && self.flavor == Flavor::Css);
            if !ok {
                break;
            }
            self.pos += 1;
        }
    }

    fn count_newlines(&mut self, from: usize, to: usize) {
        self.line += self.bytes[from..to].iter().filter(|&&b| b == b'\n').count() as u32;
    }

    fn inline_html(&mut self) {
        let start = self.pos;
        let line = self.line;
        let rest = &self.src[self.pos..];
        let (html_len, tag_len) = match (rest.find("<?php"), rest.find("<?=")) {
            (Some(a), Some(b)) if b < a => (b, 3),
            (Some(a), _) => (a, 5),
            (None, Some(b)) => (b, 3),
            (None, None) => (rest.len(), 0),
        };
        self.pos += html_len;
        self.count_newlines(start, self.pos);
        if html_len > 0 {
            self.push(TokenKind::InlineHtml, start, line);
        }
        self.pos += tag_len;
    }

    fn line_comment_allowed(&self) -> bool {
        if self.flavor != Flavor::Css {
            return true;
        }
        // `//` inside an unquoted url() is not a comment.
        match self.pos.checked_sub(1).map(|i| self.bytes[i]) {
            None => true,
            Some(b) => matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b';' | b'{' | b'}'),
        }
    }

    fn line_comment(&mut self) {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            if self.flavor == Flavor::Php && self.peek_is(b"?>") {
                break;
            }
            self.pos += 1;
        }
        self.push(TokenKind::Comment, start, self.line);
    }

    fn block_comment(&mut self) {
        let start = self.pos;
        let line = self.line;
        match self.src[self.pos + 2..].find("*/") {
            Some(offset) => self.pos += 2 + offset + 2,
            None => {
                self.error(line, "unterminated block comment");
                self.pos = self.bytes.len();
            }
        }
        self.count_newlines(start, self.pos);
        self.push(TokenKind::Comment, start, line);
    }

    fn string(&mut self, quote: u8) {
        let start = self.pos;
        let line = self.line;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b == b'\\' {
                self.pos += 2;
                continue;
            }
            if b == quote {
                self.pos += 1;
                self.count_newlines(start, self.pos);
                self.push(TokenKind::Str, start, line);
                return;
            }
            if b == b'\n' && self.flavor == Flavor::Css {
                // CSS bad-string: ends at the newline without an error.
                self.count_newlines(start, self.pos);
                self.push(TokenKind::Str, start, line);
                return;
            }
            self.pos += 1;
        }
        self.pos = self.pos.min(self.bytes.len());
        self.count_newlines(start, self.pos);
        self.error(line, "unterminated string literal");
        self.push(TokenKind::Str, start, line);
    }

    fn template(&mut self) {
        let start = self.pos;
        let line = self.line;
        let mut depth = 0usize;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => {
                    self.pos += 2;
                    continue;
                }
                b'$' if depth == 0 && self.peek_is(b"${") => {
                    depth += 1;
                    self.pos += 2;
                    continue;
                }
                b'{' if depth > 0 => depth += 1,
                b'}' if depth > 0 => depth -= 1,
                b'`' if depth == 0 => {
                    self.pos += 1;
                    self.count_newlines(start, self.pos);
                    self.push(TokenKind::Str, start, line);
                    return;
                }
                _ => {}
            }
            self.pos += 1;
        }
        self.pos = self.bytes.len();
        self.count_newlines(start, self.pos);
        self.error(line, "unterminated template literal");
        self.push(TokenKind::Str, start, line);
    }

    fn heredoc(&mut self) {
        let start = self.pos;
        let line = self.line;
        let header_end = self.src[self.pos..]
            .find('\n')
            .map(|i| self.pos + i)
            .unwrap_or(self.bytes.len());
        let label: String = self.src[self.pos + 3..header_end]
            .trim()
            .trim_matches(|c| c == '\'' || c == '"')
            .to_string();

        if label.is_empty() || !label.chars().all(|c| c.is_alphanumeric() || c == '_') {
            self.punct();
            return;
        }

        let mut cursor = header_end;
        while cursor < self.bytes.len() {
            let line_start = cursor + 1;
            let line_end = self.src[line_start.min(self.bytes.len())..]
                .find('\n')
                .map(|i| line_start + i)
                .unwrap_or(self.bytes.len());
            let text = self.src[line_start..line_end].trim_start();
            if let Some(after) = text.strip_prefix(label.as_str()) {
                if !after.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
                    self.pos = line_end - after.len();
                    self.count_newlines(start, self.pos);
                    self.push(TokenKind::Str, start, line);
                    return;
                }
            }
            cursor = line_end;
        }

        self.pos = self.bytes.len();
        self.count_newlines(start, self.pos);
        self.error(line, format!("unterminated heredoc <<<{}", label));
        self.push(TokenKind::Str, start, line);
    }

    fn regex_allowed(&self) -> bool {
        match self.out.tokens.iter().rev().find(|t| t.kind != TokenKind::Comment) {
            None => true,
            Some(t) => match t.kind {
                TokenKind::Punct => REGEX_PRECEDERS.contains(&t.text),
                TokenKind::Ident => REGEX_PRECEDERS.contains(&t.text),
                _ => false,
            },
        }
    }

    fn regex(&mut self) {
        let start = self.pos;
        let line = self.line;
        let mut in_class = false;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => {
                    self.pos += 2;
                    continue;
                }
                b'[' => in_class = true,
                b']' => in_class = false,
                b'/' if !in_class => {
                    self.pos += 1;
                    while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_alphabetic() {
                        self.pos += 1;
                    }
                    self.push(TokenKind::Str, start, line);
                    return;
                }
                b'\n' => break,
                _ => {}
            }
            self.pos += 1;
        }
        // Not a regex after all; fall back to a plain slash.
        self.pos = start + 1;
        self.push(TokenKind::Punct, start, line);
    }

    fn number(&mut self) {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, start, self.line);
    }

    fn punct(&mut self) {
        let start = self.pos;
        let len = PUNCTS
            .iter()
            .find(|p| self.peek_is(p.as_bytes()))
            .map(|p| p.len())
            .unwrap_or_else(|| utf8_len(self.bytes[self.pos]));
        self.pos = (self.pos + len).min(self.bytes.len());
        self.push(TokenKind::Punct, start, self.line);
    }
}

fn utf8_len(first: u8) -> usize {
    match first {
        0xF0..=0xFF => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

/// Verifies `()[]{}` pairing; `#[` and `${` open like their bracket.
pub fn check_balance(tokens: &[Token<'_>]) -> Result<(), LexError> {
    let mut stack: Vec<(char, u32)> = Vec::new();
    for token in tokens.iter().filter(|t| t.kind == TokenKind::Punct) {
        let open = match token.text {
            "(" => Some('('),
            "[" | "#[" => Some('['),
            "{" | "${" => Some('{'),
            _ => None,
        };
        if let Some(open) = open {
            stack.push((open, token.line));
            continue;
        }
        let expected = match token.text {
            ")" => '(',
            "]" => '[',
            "}" => '{',
            _ => continue,
        };
        match stack.pop() {
            Some((open, _)) if open == expected => {}
            Some((open, line)) => {
                return Err(LexError {
                    line: token.line,
                    message: format!("'{}' closes '{}' opened on line {}", token.text, open, line),
                })
            }
            None => {
                return Err(LexError {
                    line: token.line,
                    message: format!("unexpected '{}'", token.text),
                })
            }
        }
    }
    match stack.pop() {
        Some((open, line)) => Err(LexError {
            line,
            message: format!("unclosed '{}'", open),
        }),
        None => Ok(()),
    }
}

/// Index of the token closing the bracket opened at `open_idx`.
pub fn matching_close(tokens: &[Token<'_>], open_idx: usize) -> Option<usize> {
    let (open, close) = match tokens.get(open_idx)?.text {
        "(" => ("(", ")"),
        "[" | "#[" => ("[", "]"),
        "{" | "${" => ("{", "}"),
        _ => return None,
    };
    let mut depth = 0i32;
    for (i, token) in tokens.iter().enumerate().skip(open_idx) {
        if token.kind != TokenKind::Punct {
            continue;
        }
        if token.text == open || (i == open_idx) || (open == "[" && token.text == "#[") || (open == "{" && token.text == "${") {
            depth += 1;
        } else if token.text == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Adds every word in free text, plus the parts of dashed words.
pub fn count_words(text: &str, counts: &mut BTreeMap<String, u32>) {
    for m in WORD_RE.find_iter(text) {
        let word = m.as_str().trim_end_matches('-');
        if word.is_empty() {
            continue;
        }
        *counts.entry(word.to_string()).or_insert(0) += 1;
        if word.contains('-') {
            for part in word.split('-').filter(|p| !p.is_empty()) {
                *counts.entry(part.to_string()).or_insert(0) += 1;
            }
        }
    }
}

/// Identifier occurrence counts, skipping tokens inside `excluded` byte
/// ranges. Comments and strings contribute their words.
pub fn count_tokens(tokens: &[Token<'_>], excluded: &[(usize, usize)]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for token in tokens {
        if excluded.iter().any(|&(s, e)| token.start >= s && token.end <= e) {
            continue;
        }
        match token.kind {
            TokenKind::Ident if token.text.contains('-') => count_words(token.text, &mut counts),
            TokenKind::Ident | TokenKind::Variable => {
                *counts.entry(token.text.to_string()).or_insert(0) += 1;
            }
            TokenKind::Str | TokenKind::Comment | TokenKind::InlineHtml => {
                count_words(token.text, &mut counts);
            }
            TokenKind::Number | TokenKind::Punct => {}
        }
    }
    counts
}

/// First line of the doc comment or attribute block directly above
/// `decl_line`, or `decl_line` itself.
pub fn leading_comment_start(lines: &[&str], decl_line: u32) -> u32 {
    if decl_line == 0 || decl_line as usize > lines.len() {
        return decl_line;
    }
    let mut start = decl_line;
    let mut idx = decl_line as usize - 1;
    while idx > 0 {
        let text = lines[idx - 1].trim();
        if text.ends_with("*/") {
            let mut j = idx - 1;
            loop {
                let t = lines[j].trim();
                if t.starts_with("/*") {
                    break;
                }
                if j == 0 {
                    return start;
                }
                j -= 1;
            }
            if !lines[j].trim().starts_with("/**") {
                break;
            }
            start = j as u32 + 1;
            idx = j;
            continue;
        }
        let attribute = text.starts_with("#[") && text.ends_with(']');
        let decorator = text.starts_with('@') && !text.contains('{');
        if attribute || decorator || text.starts_with("//") {
            start = idx as u32;
            idx -= 1;
            continue;
        }
        break;
    }
    start
}

/// Removes `source[start..end]`, inserting `replacement`. When the edited
/// line ends up blank the whole line goes, newline included.
pub fn splice(source: &str, start: usize, end: usize, replacement: &str) -> String {
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[end..]
        .find('\n')
        .map(|i| end + i + 1)
        .unwrap_or(source.len());

    let mut line = String::new();
    line.push_str(&source[line_start..start]);
    line.push_str(replacement);
    line.push_str(&source[end..line_end]);

    let mut out = String::with_capacity(source.len());
    out.push_str(&source[..line_start]);
    if !line.trim().is_empty() {
        out.push_str(&line);
    }
    out.push_str(&source[line_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str, flavor: Flavor) -> Vec<(TokenKind, String)> {
        lex(source, flavor)
            .tokens
            .iter()
            .map(|t| (t.kind, t.text.to_string()))
            .collect()
    }

    #[test]
    fn test_php_inline_html_and_variables() {
        let toks = kinds("<h1>x</h1><?php $name = 'a'; ?>tail", Flavor::Php);
        assert_eq!(toks[0].0, TokenKind::InlineHtml);
        assert_eq!(toks[1], (TokenKind::Variable, "$name".to_string()));
        assert_eq!(toks.last().unwrap().0, TokenKind::InlineHtml);
    }

    #[test]
    fn test_php_hash_comment_vs_attribute() {
        let toks = kinds("<?php\n# note\n#[Route('/')]\nfunction a() {}", Flavor::Php);
        assert_eq!(toks[0].0, TokenKind::Comment);
        assert_eq!(toks[1], (TokenKind::Punct, "#[".to_string()));
    }

    #[test]
    fn test_heredoc_is_single_string() {
        let src = "<?php\n$a = <<<EOT\nhello {$name}\nEOT;\n$b = 1;";
        let lexed = lex(src, Flavor::Php);
        assert!(lexed.errors.is_empty());
        let strs: Vec<_> = lexed.tokens.iter().filter(|t| t.kind == TokenKind::Str).collect();
        assert_eq!(strs.len(), 1);
        let b = lexed.tokens.iter().find(|t| t.text == "$b").unwrap();
        assert_eq!(b.line, 5);
    }

    #[test]
    fn test_unterminated_string_reported() {
        let lexed = lex("<?php\n$a = 'oops;\n", Flavor::Php);
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].line, 2);
    }

    #[test]
    fn test_js_regex_and_division() {
        let toks = kinds("const r = /a'b/g; const d = x / 2;", Flavor::JavaScript);
        assert!(toks.contains(&(TokenKind::Str, "/a'b/g".to_string())));
        assert!(toks.contains(&(TokenKind::Punct, "/".to_string())));
    }

    #[test]
    fn test_css_idents_keep_dashes() {
        let toks = kinds(".btn-primary { color: red } /* c */", Flavor::Css);
        assert!(toks.contains(&(TokenKind::Ident, "btn-primary".to_string())));
    }

    #[test]
    fn test_balance() {
        let lexed = lex("<?php function a() { if (x) { } }", Flavor::Php);
        assert!(check_balance(&lexed.tokens).is_ok());
        let lexed = lex("<?php function a() { if (x) { }", Flavor::Php);
        assert!(check_balance(&lexed.tokens).is_err());
        let lexed = lex("<?php $a = [1, 2);", Flavor::Php);
        assert!(check_balance(&lexed.tokens).is_err());
    }

    #[test]
    fn test_count_tokens_includes_comments_and_strings() {
        let lexed = lex("<?php\n// uses Helper\n$x = 'btn-primary';", Flavor::Php);
        let counts = count_tokens(&lexed.tokens, &[]);
        assert_eq!(counts.get("Helper"), Some(&1));
        assert_eq!(counts.get("btn-primary"), Some(&1));
        assert_eq!(counts.get("primary"), Some(&1));
        assert_eq!(counts.get("$x"), Some(&1));
    }

    #[test]
    fn test_leading_comment_start() {
        let src = "class A {\n    /**\n     * Doc\n     */\n    #[Attr]\n    public function a() {}\n}";
        let lines: Vec<&str> = src.lines().collect();
        assert_eq!(leading_comment_start(&lines, 6), 2);
        assert_eq!(leading_comment_start(&lines, 1), 1);
    }

    #[test]
    fn test_splice_drops_blank_line() {
        let src = "a\nuse X;\nb\n";
        let start = src.find("use").unwrap();
        let end = start + "use X;".len();
        assert_eq!(splice(src, start, end, ""), "a\nb\n");
        assert_eq!(splice(src, start, end, "use Y;"), "a\nuse Y;\nb\n");
    }
}
