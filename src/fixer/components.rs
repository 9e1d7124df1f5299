use crate::backup::BackupSession;
use crate::detector::markup::dedent;
use crate::error::Result;
use crate::model::{
    AppliedModification, ComponentExtractionSuggestion, FileModificationResult, FragmentReplacement,
    ModificationKind,
};
use crate::source::SourceTree;

use super::members::LineEdit;

pub fn component_tag(name: &str) -> String {
    format!("<x-{} />", name)
}

fn indentation(source: &str, line: u32) -> &str {
    let text = source.lines().nth(line.saturating_sub(1) as usize).unwrap_or("");
    &text[..text.len() - text.trim_start().len()]
}

/// Swaps the fragment's lines for the component tag at the same indent.
pub fn fragment_edit(source: &str, replacement: &FragmentReplacement) -> LineEdit {
    LineEdit {
        start: replacement.start_line,
        end: replacement.end_line,
        replacement: Some(format!(
            "{}{}",
            indentation(source, replacement.start_line),
            component_tag(&replacement.component)
        )),
        kind: ModificationKind::ReplaceFragment,
        target: replacement.component.clone(),
    }
}

/// Whether the lines still hold the markup the component was cut from.
pub fn fragment_is_current(source: &str, replacement: &FragmentReplacement, content: &str) -> bool {
    let total = source.lines().count() as u32;
    if replacement.start_line == 0 || replacement.end_line > total {
        return false;
    }
    dedent(source, replacement.start_line, replacement.end_line).trim_end() == content.trim_end()
}

/// Writes the component view. Never overwrites an existing file.
pub fn create_component(
    source: &dyn SourceTree,
    session: Option<&BackupSession>,
    component: &ComponentExtractionSuggestion,
) -> FileModificationResult {
    let path = &component.component_path;
    let mut result = FileModificationResult::new(path);
    if source.exists(path) {
        result.record_error(format!("{} already exists", path.display()));
        return result;
    }

    let written: Result<()> = (|| {
        if let Some(session) = session {
            session.record_created(path)?;
        }
        source.write(path, component.content.as_bytes())
    })();

    match written {
        Ok(()) => {
            result.bytes_after = component.content.len() as u64;
            result.lines_after = component.content.lines().count() as u32;
            result.record(AppliedModification::now(
                ModificationKind::CreateComponent,
                component.name.clone(),
                None,
            ));
            tracing::debug!(component = %component.name, path = %path.display(), "component created");
        }
        Err(err) => result.record_error(err.to_string()),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleanupConfig;
    use crate::fixer::members::apply_line_edits;
    use crate::model::{CodeLocation, DuplicateClassification, Effort};
    use crate::source::FsSourceTree;
    use std::path::Path;
    use tempfile::TempDir;

    const VIEW: &str = "<main>\n    <div class=\"notice\">\n        <p>Hi</p>\n    </div>\n</main>\n";

    fn replacement() -> FragmentReplacement {
        FragmentReplacement {
            start_line: 2,
            end_line: 4,
            component: "notice".into(),
        }
    }

    #[test]
    fn test_fragment_replaced_at_indent() {
        let edit = fragment_edit(VIEW, &replacement());
        let out = apply_line_edits(Path::new("a.blade.php"), VIEW, &[edit]).unwrap();
        assert_eq!(out, "<main>\n    <x-notice />\n</main>\n");
    }

    #[test]
    fn test_fragment_currency() {
        let content = "<div class=\"notice\">\n    <p>Hi</p>\n</div>\n";
        assert!(fragment_is_current(VIEW, &replacement(), content));
        let changed = VIEW.replace("Hi", "Bye");
        assert!(!fragment_is_current(&changed, &replacement(), content));
        let short = FragmentReplacement {
            end_line: 40,
            ..replacement()
        };
        assert!(!fragment_is_current(VIEW, &short, content));
    }

    #[test]
    fn test_create_component_once() {
        let temp = TempDir::new().unwrap();
        let tree = FsSourceTree::new(temp.path(), &CleanupConfig::default()).unwrap();
        let component = ComponentExtractionSuggestion {
            name: "notice".into(),
            root_tag: "div".into(),
            occurrences: vec![CodeLocation::new("a", 2, 4), CodeLocation::new("b", 2, 4)],
            element_count: 2,
            line_savings: 4,
            similarity: 1.0,
            classification: DuplicateClassification::ExactDuplicate,
            effort: Effort::Low,
            priority: 8.0,
            auto_applicable: true,
            component_path: temp.path().join("resources/views/components/notice.blade.php"),
            content: "<div class=\"notice\">\n    <p>Hi</p>\n</div>\n".into(),
            refactoring_steps: vec![],
        };

        let first = create_component(&tree, None, &component);
        assert!(first.success());
        assert_eq!(first.count(ModificationKind::CreateComponent), 1);
        assert_eq!(
            std::fs::read_to_string(&component.component_path).unwrap(),
            component.content
        );

        let second = create_component(&tree, None, &component);
        assert!(!second.success());
    }
}
