use std::path::Path;

use crate::error::{CleanupError, Result};
use crate::model::{FileModificationPlan, ModificationKind};

/// Whole-line edit; `replacement` of `None` deletes the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEdit {
    pub start: u32,
    pub end: u32,
    pub replacement: Option<String>,
    pub kind: ModificationKind,
    pub target: String,
}

impl LineEdit {
    pub fn remove(start: u32, end: u32, kind: ModificationKind, target: impl Into<String>) -> Self {
        Self {
            start,
            end: end.max(start),
            replacement: None,
            kind,
            target: target.into(),
        }
    }

    fn contains(&self, other: &LineEdit) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    fn kind_str(&self) -> &'static str {
        match self.kind {
            ModificationKind::RemoveMethod => "method",
            ModificationKind::RemoveVariable => "variable",
            ModificationKind::ReplaceFragment => "fragment",
            _ => "edit",
        }
    }
}

/// Method and variable removals of a file plan.
pub fn member_edits(plan: &FileModificationPlan) -> Vec<LineEdit> {
    let methods = plan.methods.iter().map(|m| {
        let target = match &m.owner {
            Some(owner) => format!("{}::{}", owner, m.name),
            None => m.name.clone(),
        };
        LineEdit::remove(m.start_line, m.end_line, ModificationKind::RemoveMethod, target)
    });
    let variables = plan
        .variables
        .iter()
        .map(|v| LineEdit::remove(v.line, v.end_line, ModificationKind::RemoveVariable, v.name.clone()));
    methods.chain(variables).collect()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Applies `edits` bottom-up so earlier line numbers stay valid. Edits nested
/// in another edit are absorbed by it; partial overlaps are an error.
pub fn apply_line_edits(path: &Path, source: &str, edits: &[LineEdit]) -> Result<String> {
    let mut lines: Vec<String> = source.split_inclusive('\n').map(str::to_string).collect();
    let total = lines.len() as u32;

    let mut sorted: Vec<&LineEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut outer: Vec<&LineEdit> = Vec::new();
    for edit in sorted {
        if edit.start == 0 || edit.end > total {
            return Err(CleanupError::parse(
                path,
                format!("{} {} targets lines {}-{} of {}", edit.kind_str(), edit.target, edit.start, edit.end, total),
            ));
        }
        match outer.last() {
            Some(last) if last.contains(edit) => continue,
            Some(last) if edit.start <= last.end => {
                return Err(CleanupError::parse(
                    path,
                    format!("overlapping edits at lines {}-{} and {}-{}", last.start, last.end, edit.start, edit.end),
                ));
            }
            _ => outer.push(edit),
        }
    }

    for edit in outer.iter().rev() {
        let start = edit.start as usize - 1;
        let end = edit.end as usize;
        let last = &lines[end - 1];
        let newline = if last.ends_with("\r\n") {
            "\r\n"
        } else if last.ends_with('\n') {
            "\n"
        } else {
            ""
        };
        match &edit.replacement {
            Some(text) => {
                lines.splice(start..end, std::iter::once(format!("{}{}", text, newline)));
            }
            None => {
                lines.drain(start..end);
                // Collapse the blank line left between two neighbours.
                if start < lines.len() && is_blank(&lines[start]) && (start == 0 || is_blank(&lines[start - 1])) {
                    lines.remove(start);
                }
            }
        }
    }

    Ok(lines.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MethodTarget, VariableTarget};

    const CLASS: &str = "<?php\nclass A\n{\n    public function keep()\n    {\n        $unused = 1;\n        return 2;\n    }\n\n    /**\n     * Gone.\n     */\n    private function gone()\n    {\n        return 3;\n    }\n\n    public function last()\n    {\n        return 4;\n    }\n}\n";

    fn apply(edits: &[LineEdit]) -> String {
        apply_line_edits(Path::new("A.php"), CLASS, edits).unwrap()
    }

    #[test]
    fn test_method_and_variable_removal() {
        let mut plan = FileModificationPlan::new("A.php");
        plan.methods.push(MethodTarget {
            owner: Some("A".into()),
            name: "gone".into(),
            line: 13,
            start_line: 10,
            end_line: 16,
        });
        plan.variables.push(VariableTarget {
            name: "$unused".into(),
            line: 6,
            end_line: 6,
        });
        let out = apply(&member_edits(&plan));
        assert_eq!(
            out,
            "<?php\nclass A\n{\n    public function keep()\n    {\n        return 2;\n    }\n\n    public function last()\n    {\n        return 4;\n    }\n}\n"
        );
    }

    #[test]
    fn test_nested_edit_absorbed() {
        let method = LineEdit::remove(4, 8, ModificationKind::RemoveMethod, "keep");
        let variable = LineEdit::remove(6, 6, ModificationKind::RemoveVariable, "$unused");
        let out = apply_line_edits(Path::new("A.php"), CLASS, &[variable, method]).unwrap();
        assert!(!out.contains("keep"));
        assert!(!out.contains("$unused"));
        assert!(out.starts_with("<?php\nclass A\n{\n\n    /**"));
    }

    #[test]
    fn test_replacement_keeps_line_ending() {
        let source = "<main>\r\n  <div>\r\n    <p>x</p>\r\n  </div>\r\n</main>\r\n";
        let edit = LineEdit {
            start: 2,
            end: 4,
            replacement: Some("  <x-box />".into()),
            kind: ModificationKind::ReplaceFragment,
            target: "box".into(),
        };
        let out = apply_line_edits(Path::new("a.blade.php"), source, &[edit]).unwrap();
        assert_eq!(out, "<main>\r\n  <x-box />\r\n</main>\r\n");
    }

    #[test]
    fn test_out_of_range_and_overlap_rejected() {
        let far = LineEdit::remove(40, 42, ModificationKind::RemoveMethod, "far");
        assert!(apply_line_edits(Path::new("A.php"), CLASS, &[far]).is_err());

        let a = LineEdit::remove(4, 8, ModificationKind::RemoveMethod, "a");
        let b = LineEdit::remove(7, 12, ModificationKind::RemoveMethod, "b");
        assert!(apply_line_edits(Path::new("A.php"), CLASS, &[a, b]).is_err());
    }
}
