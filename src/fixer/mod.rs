mod components;
mod executor;
mod imports;
mod members;

pub use components::{component_tag, create_component, fragment_edit, fragment_is_current};
pub use executor::{CancellationToken, ExecutionOutcome, Executor, ProgressCallback};
pub use imports::{import_is_current, remove_imports};
pub use members::{apply_line_edits, member_edits, LineEdit};
