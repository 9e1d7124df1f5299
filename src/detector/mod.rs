pub mod duplicates;
pub mod markup;
pub mod similarity;
pub mod usage;

pub use duplicates::{detect_duplicates, find_component_candidates, DuplicateFindings};
pub use usage::{detect_usage, TokenIndex, UsageDetector};
