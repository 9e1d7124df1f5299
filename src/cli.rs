use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::CleanupConfig;
use crate::model::OperationKind;

#[derive(Parser, Debug, Clone)]
#[command(name = "sweeper")]
#[command(author, version, about = "Safe dead code removal for Laravel/Vite projects")]
#[command(after_help = "Examples:
  sweeper analyze                      Analyze current directory
  sweeper analyze ./shop --watch       Re-analyze on every change
  sweeper execute --apply              Apply the approved plan
  sweeper execute --apply --only imports,variables
  sweeper report --format html -o cleanup.html")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(default_value = ".")]
    pub path: PathBuf,

    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Analyze the project and show what a cleanup would do
    Analyze {
        #[command(flatten)]
        project: ProjectArgs,

        /// Accepted for symmetry with execute; analysis never writes
        #[arg(long)]
        dry_run: bool,

        /// Only analyze files matching these globs (relative to the root)
        #[arg(long = "filter", value_name = "GLOB")]
        filters: Vec<String>,

        /// Only analyze these file types
        #[arg(long = "type", value_delimiter = ',')]
        types: Option<Vec<FileType>>,

        #[arg(long, short, default_value = "pretty")]
        format: OutputFormat,

        #[arg(long, short)]
        watch: bool,
    },

    /// Analyze, plan, validate and apply
    Execute {
        #[command(flatten)]
        project: ProjectArgs,

        /// Simulate only (the default unless the config says otherwise)
        #[arg(long, conflicts_with = "apply")]
        dry_run: bool,

        /// Write changes to disk
        #[arg(long)]
        apply: bool,

        #[arg(long)]
        no_backup: bool,

        #[arg(long)]
        no_tests: bool,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Restrict the run to these operations
        #[arg(long, value_delimiter = ',')]
        only: Option<Vec<Operation>>,

        #[arg(long, short, default_value = "pretty")]
        format: OutputFormat,
    },

    /// Render the report of the last execute run
    Report {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(long, short, default_value = "json")]
        format: ReportFormat,

        /// Write here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Report file to read (defaults to .sweeper/last-report.json)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Write a default sweeper.json
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long, default_value = "json")]
        format: ConfigFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    Php,
    Blade,
    Js,
    Css,
    Assets,
}

impl FileType {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileType::Php => &["php"],
            FileType::Blade => &["blade.php"],
            FileType::Js => &["js", "mjs", "cjs", "jsx"],
            FileType::Css => &["css", "scss"],
            FileType::Assets => &[
                "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "eot",
            ],
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Files,
    Imports,
    Methods,
    Variables,
    Duplicates,
    Components,
}

impl From<Operation> for OperationKind {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Files => OperationKind::Files,
            Operation::Imports => OperationKind::Imports,
            Operation::Methods => OperationKind::Methods,
            Operation::Variables => OperationKind::Variables,
            Operation::Duplicates => OperationKind::Duplicates,
            Operation::Components => OperationKind::Components,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Default, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(ValueEnum, Clone, Debug, Default, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Json,
    Html,
}

#[derive(ValueEnum, Clone, Debug, Default, Copy)]
pub enum ConfigFormat {
    #[default]
    Json,
    Jsonc,
}

impl Commands {
    /// Folds command-line flags over the loaded configuration.
    pub fn apply_overrides(&self, config: &mut CleanupConfig) {
        match self {
            Commands::Analyze { filters, types, .. } => {
                if !filters.is_empty() {
                    config.include_paths = filters.clone();
                }
                if let Some(types) = types {
                    config.include_file_types = types
                        .iter()
                        .flat_map(|t| t.extensions().iter().map(|e| e.to_string()))
                        .collect();
                }
            }
            Commands::Execute {
                dry_run,
                apply,
                no_backup,
                no_tests,
                batch_size,
                only,
                ..
            } => {
                if *dry_run {
                    config.dry_run = true;
                }
                if *apply {
                    config.dry_run = false;
                }
                if *no_backup {
                    config.create_backup = false;
                }
                if *no_tests {
                    config.run_tests = false;
                }
                if let Some(size) = batch_size {
                    config.batch_size = *size;
                }
                if let Some(only) = only {
                    let kinds: Vec<OperationKind> = only.iter().map(|&op| op.into()).collect();
                    config.restrict_to(&kinds);
                }
            }
            Commands::Report { .. } | Commands::Init { .. } => {}
        }
    }
}
