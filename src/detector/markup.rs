use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::MarkupFragment;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<(/?)([A-Za-z][A-Za-z0-9\-:.]*)((?:\s+[^\s>/="']+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>"']+))?)*)\s*(/?)>"#,
    )
    .unwrap()
});
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([^\s>/="']+)(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>"']+))?"#).unwrap());
static MASK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!--.*?-->|\{\{--.*?--\}\}|<script\b.*?</script\s*>|<style\b.*?</style\s*>").unwrap()
});

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track",
    "wbr",
];

struct Open {
    tag: String,
    attrs: Vec<String>,
    start: usize,
    end_of_open: usize,
    children: Vec<String>,
    count: usize,
}

struct Closed {
    skeleton: String,
    count: usize,
}

/// Comments, scripts and styles replaced by spaces, newlines kept, so byte
/// offsets still map onto the original source.
fn mask(source: &str) -> String {
    let mut out = source.to_string();
    for m in MASK_RE.find_iter(source) {
        let blanked: String = m
            .as_str()
            .chars()
            .map(|c| if c == '\n' { "\n".to_string() } else { " ".repeat(c.len_utf8()) })
            .collect();
        out.replace_range(m.range(), &blanked);
    }
    out
}

fn attribute_names(raw: &str) -> Vec<String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|c| c[1].to_ascii_lowercase())
        .collect()
}

fn shape(tag: &str, attrs: &[String], children: &[String]) -> String {
    let mut out = tag.to_string();
    if !attrs.is_empty() {
        out.push('[');
        out.push_str(&attrs.join(","));
        out.push(']');
    }
    if !children.is_empty() {
        out.push('(');
        out.push_str(&children.join(","));
        out.push(')');
    }
    out
}

struct Lines {
    starts: Vec<usize>,
}

impl Lines {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> u32 {
        match self.starts.binary_search(&offset) {
            Ok(i) => i as u32 + 1,
            Err(i) => i as u32,
        }
    }
}

/// The element starts its line and ends its line.
fn is_whole_line(source: &str, start: usize, end: usize) -> bool {
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[end..].find('\n').map(|i| end + i).unwrap_or(source.len());
    source[line_start..start].trim().is_empty() && source[end..line_end].trim().is_empty()
}

/// Source lines `first..=last` with their common indentation removed.
pub fn dedent(source: &str, first: u32, last: u32) -> String {
    let lines: Vec<&str> = source
        .lines()
        .skip(first.saturating_sub(1) as usize)
        .take((last.saturating_sub(first) + 1) as usize)
        .collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Element subtrees of a template that occupy whole lines and hold at
/// least two elements, in document order of their closing tags.
pub fn extract_fragments(source: &str) -> Vec<MarkupFragment> {
    let masked = mask(source);
    let lines = Lines::new(source);
    let mut stack: Vec<Open> = Vec::new();
    let mut fragments = Vec::new();

    let attach = |stack: &mut Vec<Open>, closed: Closed| {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(closed.skeleton);
            parent.count += closed.count;
        }
    };

    for cap in TAG_RE.captures_iter(&masked) {
        let whole = cap.get(0).map(|m| m.range()).unwrap_or(0..0);
        let closing = !cap[1].is_empty();
        let tag = cap[2].to_ascii_lowercase();
        let self_closing = !cap[4].is_empty();

        if !closing {
            let attrs = attribute_names(&cap[3]);
            if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
                let leaf = Closed {
                    skeleton: shape(&tag, &attrs, &[]),
                    count: 1,
                };
                attach(&mut stack, leaf);
            } else {
                stack.push(Open {
                    tag,
                    attrs,
                    start: whole.start,
                    end_of_open: whole.end,
                    children: Vec::new(),
                    count: 1,
                });
            }
            continue;
        }

        if !stack.iter().any(|o| o.tag == tag) {
            continue;
        }
        // Unclosed inner elements become leaves of their parent.
        while let Some(open) = stack.pop() {
            let closed = Closed {
                skeleton: shape(&open.tag, &open.attrs, &open.children),
                count: open.count,
            };
            if open.tag != tag {
                attach(&mut stack, closed);
                continue;
            }
            let line = lines.line_of(open.start);
            let end_line = lines.line_of(whole.end.saturating_sub(1).max(open.end_of_open));
            if closed.count >= 2 && end_line > line && is_whole_line(source, open.start, whole.end) {
                fragments.push(MarkupFragment {
                    root_tag: open.tag.clone(),
                    line,
                    end_line,
                    element_count: closed.count,
                    skeleton: closed.skeleton.clone(),
                    text: dedent(source, line, end_line),
                });
            }
            attach(&mut stack, closed);
            break;
        }
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARDS: &str = r#"<div class="grid">
    <div class="card">
        <h2 class="title">{{ $a }}</h2>
        <p>First</p>
    </div>
    <div class="card">
        <h2 class="title">{{ $b }}</h2>
        <p>Second</p>
    </div>
</div>
"#;

    #[test]
    fn test_nested_fragments_with_lines() {
        let fragments = extract_fragments(CARDS);
        assert_eq!(fragments.len(), 3);
        let cards: Vec<_> = fragments.iter().filter(|f| f.element_count == 3).collect();
        assert_eq!(cards.len(), 2);
        assert_eq!((cards[0].line, cards[0].end_line), (2, 5));
        assert_eq!((cards[1].line, cards[1].end_line), (6, 9));
        assert_eq!(cards[0].skeleton, cards[1].skeleton);
        assert_eq!(cards[0].skeleton, "div[class](h2[class],p)");
        assert!(cards[0].text.starts_with("<div class=\"card\">\n    <h2"));

        let grid = fragments.iter().find(|f| f.element_count == 7).unwrap();
        assert_eq!((grid.line, grid.end_line), (1, 10));
        assert!(grid.contains(cards[0]));
    }

    #[test]
    fn test_void_and_self_closing_elements() {
        let source = "<form>\n    <input name=\"q\">\n    <x-icon name=\"search\" />\n    <br>\n</form>\n";
        let fragments = extract_fragments(source);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].element_count, 4);
        assert_eq!(fragments[0].skeleton, "form(input[name],x-icon[name],br)");
    }

    #[test]
    fn test_scripts_comments_and_inline_elements_skipped() {
        let source = "<p>Hi <b>there</b> <i>x</i></p>\n<!-- <div>\n<span></span>\n</div> -->\n<script>\nlet a = '<div><p></p></div>';\n</script>\n";
        assert!(extract_fragments(source).is_empty());
    }

    #[test]
    fn test_unclosed_children_fold_into_parent() {
        let source = "<ul>\n    <li>One\n    <li>Two\n</ul>\n";
        let fragments = extract_fragments(source);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].root_tag, "ul");
        assert_eq!(fragments[0].element_count, 3);
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("  <a>\n    <b>\n  </a>\n", 1, 3), "<a>\n  <b>\n</a>");
    }
}
