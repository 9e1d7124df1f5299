use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde_json::json;

use sweeper::cli::{Cli, Commands, ConfigFormat, OutputFormat, ProjectArgs, ReportFormat};
use sweeper::config::{generate_default_config, load_config, ResolvedConfig};
use sweeper::model::{CleanupPlan, CleanupReport, CodebaseAnalysis};
use sweeper::report::{last_report_path, load_report, render_html};
use sweeper::watch::{watch, WatchConfig};
use sweeper::CleanupOrchestrator;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "sweeper=debug" } else { "sweeper=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve(project: &ProjectArgs, command: &Commands) -> Result<ResolvedConfig> {
    if !project.path.exists() {
        anyhow::bail!("Path does not exist: {}", project.path.display());
    }
    let mut resolved = load_config(&project.path, project.config.as_deref())
        .with_context(|| format!("loading configuration for {}", project.path.display()))?;
    command.apply_overrides(&mut resolved.config);
    Ok(resolved)
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Analyze {
            project,
            format,
            watch: watch_mode,
            ..
        } => {
            let resolved = resolve(project, &cli.command)?;
            if *watch_mode {
                run_watch_mode(resolved, *format)
            } else {
                run_analysis(&CleanupOrchestrator::new(resolved), *format)
            }
        }
        Commands::Execute { project, format, .. } => {
            let resolved = resolve(project, &cli.command)?;
            run_execute(resolved, *format)
        }
        Commands::Report {
            project,
            format,
            output,
            input,
        } => run_report(project, *format, output.as_deref(), input.as_deref()),
        Commands::Init { path, format } => run_init(path, *format),
    }
}

fn banner(action: &str) {
    println!(
        "{} {} - {}\n",
        "Sweeper".green().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed(),
        action
    );
}

fn run_watch_mode(resolved: ResolvedConfig, format: OutputFormat) -> Result<()> {
    let root = resolved.root.clone();
    let watch_config = WatchConfig::from_cleanup(&resolved.config);
    let orchestrator = CleanupOrchestrator::new(resolved);

    watch(&root, watch_config, move |changed_files| {
        print!("\x1B[2J\x1B[1;1H");
        if !changed_files.is_empty() && format == OutputFormat::Pretty {
            println!("Files changed:");
            for file in changed_files.iter().take(5) {
                println!("   {}", file.display().dimmed());
            }
            if changed_files.len() > 5 {
                println!("   ... and {} more", changed_files.len() - 5);
            }
            println!();
        }

        if let Err(e) = run_analysis(&orchestrator, format) {
            eprintln!("{} {:#}", "error:".red().bold(), e);
        }

        if format == OutputFormat::Pretty {
            println!("\nWatching for changes...");
        }
        Ok(())
    })
}

fn run_analysis(orchestrator: &CleanupOrchestrator, format: OutputFormat) -> Result<()> {
    let start = Instant::now();
    if format == OutputFormat::Pretty {
        banner("Analyzing project...");
    }

    let analysis = orchestrator.analyze_codebase().context("analysis failed")?;
    let plan = orchestrator.generate_cleanup_plan(&analysis)?;

    match format {
        OutputFormat::Pretty => print_analysis(&analysis, &plan, start),
        OutputFormat::Json => print_analysis_json(&analysis, &plan)?,
    }
    Ok(())
}

fn relative<'a>(analysis: &CodebaseAnalysis, path: &'a Path) -> std::path::Display<'a> {
    analysis.relative(path).display()
}

fn print_analysis(analysis: &CodebaseAnalysis, plan: &CleanupPlan, start: Instant) {
    if !analysis.failures.is_empty() {
        println!("Failed to parse ({})", analysis.failures.len().to_string().red());
        for failure in &analysis.failures {
            println!("   {} {}", relative(analysis, &failure.path).dimmed(), failure.error);
        }
        println!();
    }

    if !plan.files_to_delete.is_empty() {
        println!("Unused files ({})", plan.files_to_delete.len().to_string().yellow());
        for deletion in &plan.files_to_delete {
            println!("   {} ({})", relative(analysis, &deletion.path).dimmed(), deletion.reason);
        }
        println!();
    }

    if !plan.imports_to_remove.is_empty() {
        println!("Unused imports ({})", plan.imports_to_remove.len().to_string().yellow());
        for removal in &plan.imports_to_remove {
            println!(
                "   {}:{} - {}",
                relative(analysis, &removal.file).dimmed(),
                removal.import.line,
                removal.import.symbol.cyan()
            );
        }
        println!();
    }

    if !plan.methods_to_remove.is_empty() {
        println!("Unused methods ({})", plan.methods_to_remove.len().to_string().yellow());
        for removal in &plan.methods_to_remove {
            println!(
                "   {}:{} - {}",
                relative(analysis, &removal.file).dimmed(),
                removal.line,
                removal.display_name().cyan()
            );
        }
        println!();
    }

    if !plan.variables_to_remove.is_empty() {
        println!("Unused variables ({})", plan.variables_to_remove.len().to_string().yellow());
        for removal in &plan.variables_to_remove {
            println!(
                "   {}:{} - {}",
                relative(analysis, &removal.file).dimmed(),
                removal.line,
                removal.name.cyan()
            );
        }
        println!();
    }

    if !plan.duplicates_to_refactor.is_empty() {
        println!("Duplicate methods ({})", plan.duplicates_to_refactor.len().to_string().yellow());
        for dup in &plan.duplicates_to_refactor {
            println!(
                "   {}:{} ~ {}:{} ({:.0}%)",
                relative(analysis, &dup.first.file).dimmed(),
                dup.first.line,
                relative(analysis, &dup.second.file).dimmed(),
                dup.second.line,
                dup.similarity * 100.0
            );
        }
        println!();
    }

    if !plan.components_to_create.is_empty() {
        println!("Component candidates ({})", plan.components_to_create.len().to_string().yellow());
        for component in &plan.components_to_create {
            let mode = if component.auto_applicable { "auto" } else { "manual" };
            println!(
                "   {} x{} saves ~{} lines [{}]",
                component.tag().cyan(),
                component.occurrences.len(),
                component.line_savings,
                mode.dimmed()
            );
        }
        println!();
    }

    if !plan.manual_review.is_empty() {
        println!("Needs manual review ({})", plan.manual_review.len().to_string().yellow());
        for item in &plan.manual_review {
            println!(
                "   {} {} - {}",
                relative(analysis, &item.file).dimmed(),
                item.target,
                item.reason.dimmed()
            );
        }
        println!();
    }

    let usage = &analysis.usage;
    if !usage.unused_css_selectors.is_empty() || !usage.unused_assets.is_empty() {
        println!(
            "Advisory: {} unused CSS selectors, {} unreferenced assets\n",
            usage.unused_css_selectors.len().to_string().yellow(),
            usage.unused_assets.len().to_string().yellow()
        );
    }

    let total = plan.total_operations();
    if total == 0 {
        println!("{}", "Nothing to clean up!".green().bold());
    } else {
        println!("{}", "Summary".bold());
        for (kind, count) in plan.counts() {
            if count > 0 {
                println!("   {:<12} {}", format!("{}:", kind), count.to_string().yellow());
            }
        }
        println!("   Estimated:   {:.3} MB", plan.estimated_size_reduction);
        println!("   Total:       {} operations", total.to_string().red().bold());
    }
    println!();
    println!(
        "Completed in {} (analyzed {} files)",
        format!("{}ms", start.elapsed().as_millis()).green(),
        analysis.total_files()
    );
    if total > 0 {
        println!("\nRun {} to apply", "sweeper execute --apply".cyan());
    }
}

fn print_analysis_json(analysis: &CodebaseAnalysis, plan: &CleanupPlan) -> Result<()> {
    let output = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "root": analysis.root.display().to_string(),
        "stats": {
            "filesAnalyzed": analysis.total_files(),
            "failures": analysis.failures,
            "skipped": analysis.skipped.len(),
            "durationMs": analysis.duration_ms,
        },
        "usage": {
            "orphanedFiles": analysis.usage.orphaned_files,
            "entryPoints": analysis.usage.entry_points.len(),
            "unusedAssets": analysis.usage.unused_assets,
            "unusedCssSelectors": analysis.usage.unused_css_selectors.iter().map(|(path, selector)| json!({
                "path": path.display().to_string(),
                "selector": selector.name,
                "line": selector.line,
            })).collect::<Vec<_>>(),
        },
        "plan": plan,
        "totalOperations": plan.total_operations(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_execute(resolved: ResolvedConfig, format: OutputFormat) -> Result<()> {
    let dry_run = resolved.config.dry_run;
    let pretty = format == OutputFormat::Pretty;
    if pretty {
        banner(if dry_run { "Dry run" } else { "Applying cleanup" });
    }

    let mut orchestrator = CleanupOrchestrator::new(resolved);
    let bar = ProgressBar::hidden();
    if pretty && !dry_run {
        bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
                .context("progress template")?
                .progress_chars("#>-"),
        );
        let progress = bar.clone();
        orchestrator = orchestrator.with_progress(Arc::new(move |done, total| {
            progress.set_length(total as u64);
            progress.set_position(done as u64);
        }));
    }

    let report = orchestrator.execute_cleanup().context("cleanup failed")?;
    bar.finish_and_clear();

    match format {
        OutputFormat::Pretty => print_report(&report),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

fn print_report(report: &CleanupReport) {
    let summary = report.execution_summary();
    let counts = report.counts();

    if summary.rolled_back {
        println!(
            "{} {}\n",
            "Rolled back:".red().bold(),
            summary.rollback_reason.as_deref().unwrap_or("")
        );
    }
    for warning in &summary.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
    if !summary.warnings.is_empty() {
        println!();
    }
    if !summary.rejected.is_empty() {
        println!("Rejected by safety checks ({})", summary.rejected.len().to_string().yellow());
        for rejection in &summary.rejected {
            println!(
                "   {} {} - {}",
                rejection.file.display().dimmed(),
                rejection.target,
                rejection.reason.as_str()
            );
        }
        println!();
    }

    let verb = if summary.dry_run { "planned" } else { "applied" };
    println!("{}", "Summary".bold());
    let rows = [
        ("Files", counts.files_removed),
        ("Imports", counts.imports_removed),
        ("Methods", counts.methods_removed),
        ("Variables", counts.variables_removed),
        ("Fragments", counts.duplicates_refactored),
        ("Components", counts.components_created),
    ];
    for (label, count) in rows.iter().filter(|(_, n)| *n > 0) {
        println!("   {:<12} {} {}", format!("{}:", label), count.to_string().yellow(), verb);
    }
    println!("   Lines:       {}", counts.lines_removed);
    println!("   Size:        {:.3} MB", report.size_reduction_mb());
    println!("   Success:     {:.1}%", report.success_rate());

    if !report.risk_assessments().is_empty() {
        println!("\n{}", "Risks".bold());
        for risk in report.risk_assessments() {
            println!("   [{}] {} - {}", risk.score, risk.title.red(), risk.description);
        }
    }
    if !report.maintenance_recommendations().is_empty() {
        println!("\n{}", "Recommendations".bold());
        for rec in report.maintenance_recommendations() {
            println!("   {} - {}", rec.title.cyan(), rec.description);
        }
    }
    println!(
        "\nCompleted in {}",
        format!("{}ms", summary.duration_ms).green()
    );
    if summary.dry_run && counts.total() > 0 {
        println!("Run {} to apply", "sweeper execute --apply".cyan());
    }
}

fn run_report(project: &ProjectArgs, format: ReportFormat, output: Option<&Path>, input: Option<&Path>) -> Result<()> {
    let input: PathBuf = match input {
        Some(path) => path.to_path_buf(),
        None => last_report_path(&project.path),
    };
    let report = load_report(&input)
        .with_context(|| format!("no report at {} (run `sweeper execute` first)", input.display()))?;

    let rendered = match format {
        ReportFormat::Json => report.to_json()?,
        ReportFormat::Html => render_html(&report),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("writing {}", path.display()))?;
            println!("{} Wrote {}", "✓".green(), path.display().to_string().green());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn run_init(path: &Path, format: ConfigFormat) -> Result<()> {
    let filename = match format {
        ConfigFormat::Json => "sweeper.json",
        ConfigFormat::Jsonc => "sweeper.jsonc",
    };

    let target = path.join(filename);
    if target.exists() {
        anyhow::bail!("Config file already exists: {}", target.display());
    }

    println!("Generating default configuration...");

    let config = generate_default_config();
    let content = serde_json::to_string_pretty(&config)?;

    std::fs::write(&target, content).with_context(|| format!("writing {}", target.display()))?;
    println!("{} Created {}", "✓".green(), target.display().to_string().green());
    Ok(())
}
