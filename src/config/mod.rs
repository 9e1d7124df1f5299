mod loader;
mod schema;

pub use loader::{
    find_config_file, generate_default_config, load_config, load_config_file, parse_config,
    validate_config,
};
pub use schema::{
    Autoload, CleanupConfig, ComposerJson, ConventionsConfig, ImplicitMethodRule, PolicyConfig,
    Psr4Paths, ResolvedConfig, SimilarityConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_FILE_SIZE,
};
