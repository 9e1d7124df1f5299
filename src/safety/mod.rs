pub mod dynamic;
mod tests;
mod validator;

pub use dynamic::DynamicPatterns;
pub use tests::{CommandTestRunner, TestRunner};
pub use validator::{
    check_dynamic_references, is_constructor, validate_cleanup_safety, SafetyValidator, ValidationOutcome,
    PROTECTED_PATTERNS,
};
