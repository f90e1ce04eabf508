use anyhow::{Context, Result};
use c_instrument::catalog;
use c_instrument::config::{
    load_from_path, InstrumentMode, MutationTarget, PassName, RunConfig,
};
use c_instrument::pipeline::{FileReport, FileStatus, Pipeline, RunReport};
use c_instrument::{Category, SourceGuard};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "c-instrument")]
#[command(about = "Rule-driven source-to-source instrumentation of C programs", long_about = None)]
#[command(version)]
struct Cli {
    /// Log rule and pass activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Instrument C sources in place
    Run {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Dry run - show what would change without writing files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report what a run would do, without writing anything
    Check {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available passes and instrumentation modes
    List,
}

#[derive(Args)]
struct TargetArgs {
    /// C files or directories to instrument (directories are walked for *.c)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Source root; nothing outside it is rewritten (default: current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Directories under the root to leave alone
    #[arg(long = "exclude")]
    excluded: Vec<PathBuf>,

    /// TOML run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct ConfigOverrides {
    /// Passes to run, in order (e.g. braces,stack-to-heap,instrument)
    #[arg(long, value_delimiter = ',')]
    passes: Option<Vec<PassName>>,

    /// Value-flow logging mode for the instrument pass
    #[arg(long)]
    mode: Option<InstrumentMode>,

    /// Mutation targets for the mutate pass
    #[arg(long, value_delimiter = ',')]
    targets: Option<Vec<MutationTarget>>,

    /// Percent chance (0-100) that an eligible array moves to the heap
    #[arg(long = "mutate-prob", value_name = "N")]
    probability: Option<u32>,

    /// Seed for the relocation coin
    #[arg(long)]
    seed: Option<u64>,

    /// Do not free relocated arrays before returns
    #[arg(long)]
    no_free: bool,

    /// Re-parse rewritten files and warn about new syntax errors
    #[arg(long)]
    validate: bool,
}

impl ConfigOverrides {
    fn apply(self, config: &mut RunConfig) {
        if let Some(passes) = self.passes {
            config.run.passes = passes;
        }
        if self.mode.is_some() {
            config.instrument.mode = self.mode;
        }
        if let Some(targets) = self.targets {
            config.mutate.targets = targets;
        }
        if let Some(probability) = self.probability {
            config.stack_to_heap.probability = probability;
        }
        if let Some(seed) = self.seed {
            config.stack_to_heap.seed = seed;
        }
        if self.no_free {
            config.stack_to_heap.free_on_return = false;
        }
        if self.validate {
            config.output.validate = true;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            target,
            overrides,
            dry_run,
            diff,
        } => cmd_run(target, overrides, dry_run, diff),

        Commands::Check {
            target,
            overrides,
            json,
        } => cmd_check(target, overrides, json),

        Commands::List => cmd_list(),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "c_instrument=debug" } else { "c_instrument=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file (or defaults), then command-line overrides, then validation.
fn resolve_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<RunConfig> {
    let mut config = match path {
        Some(path) => load_from_path(path)?,
        None => RunConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Source files named on the command line, confined to the source root.
fn resolve_sources(target: &TargetArgs) -> Result<(SourceGuard, Vec<PathBuf>)> {
    let root = match &target.root {
        Some(root) => root.clone(),
        None => env::current_dir().context("cannot read current directory")?,
    };
    let guard = target
        .excluded
        .iter()
        .fold(SourceGuard::new(&root)?, |guard, dir| guard.exclude(dir));

    let sources = guard.discover(&target.paths)?;
    if sources.is_empty() {
        anyhow::bail!("No C sources found under {}", guard.root().display());
    }
    debug!(count = sources.len(), root = %guard.root().display(), "discovered sources");
    Ok((guard, sources))
}

fn build_pipeline(config: &RunConfig, dry_run: bool) -> Pipeline {
    Pipeline::builder()
        .passes(catalog::passes_for(config))
        .validate_output(config.output.validate)
        .dry_run(dry_run)
        .build()
}

/// Helper: Show unified diff between original and instrumented content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (instrumented)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn display_path<'a>(root: &Path, path: &'a Path) -> std::path::Display<'a> {
    path.strip_prefix(root).unwrap_or(path).display()
}

fn print_file(root: &Path, file: &FileReport, dry_run: bool) {
    let shown = display_path(root, &file.path);
    match &file.status {
        FileStatus::Rewritten => {
            let verb = if dry_run { "Would rewrite" } else { "Rewrote" };
            println!("{} {} {} ({} edits)", "✓".green(), verb, shown, file.edits);
        }
        FileStatus::Unchanged => {
            println!("{} {}: Unchanged", "⊙".yellow(), shown);
        }
        FileStatus::Abandoned { reason } => {
            eprintln!("{} {}: Abandoned - {}", "✗".red(), shown, reason);
        }
        FileStatus::WriteFailed { reason } => {
            eprintln!("{} {}: Write failed - {}", "✗".red(), shown, reason);
        }
    }
    if file.skipped_matches > 0 {
        println!(
            "  {} {} match(es) skipped",
            "⊘".cyan(),
            file.skipped_matches
        );
    }
    if file.introduced_errors > 0 {
        eprintln!(
            "  {}",
            format!("{} syntax error(s) introduced", file.introduced_errors).yellow()
        );
    }
}

fn print_summary(report: &RunReport) {
    let unchanged = report
        .files
        .iter()
        .filter(|f| f.status == FileStatus::Unchanged)
        .count();
    let failed = report.files.iter().filter(|f| f.status.is_failure()).count();

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} rewritten", format!("{}", report.rewritten_count()).green());
    println!("  {} unchanged", format!("{}", unchanged).yellow());
    println!("  {} failed", format!("{}", failed).red());

    let counts: Vec<String> = Category::ALL
        .iter()
        .filter_map(|c| {
            let n = report.counters.count(*c);
            (n > 0).then(|| format!("{c}={n}"))
        })
        .collect();
    if !counts.is_empty() {
        println!("  markers: {}", counts.join(" ").dimmed());
    }
}

fn cmd_run(target: TargetArgs, overrides: ConfigOverrides, dry_run: bool, show_diff: bool) -> Result<()> {
    let config = resolve_config(target.config.as_deref(), overrides)?;
    let (guard, sources) = resolve_sources(&target)?;

    let mut pipeline = build_pipeline(&config, dry_run);
    println!("Root: {}", guard.root().display());
    println!("Passes: {}", pipeline.pass_names().join(", "));
    if dry_run {
        println!("{}", "[DRY RUN - no files will be written]".cyan());
    }
    println!();

    let report = pipeline.run_files(&sources)?;

    for file in &report.files {
        print_file(guard.root(), file, dry_run);
        if show_diff {
            if let Some(rewritten) = &file.rewritten {
                display_diff(&file.path, &file.original, rewritten);
            }
        }
    }

    print_summary(&report);

    if report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(target: TargetArgs, overrides: ConfigOverrides, json: bool) -> Result<()> {
    let config = resolve_config(target.config.as_deref(), overrides)?;
    let (guard, sources) = resolve_sources(&target)?;

    let mut pipeline = build_pipeline(&config, true);
    let report = pipeline.run_files(&sources)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", "Instrumentation Check".bold());
        println!("Root: {}", guard.root().display());
        println!("Passes: {}", report.passes.join(", "));
        println!();
        for file in &report.files {
            print_file(guard.root(), file, true);
        }
        print_summary(&report);
    }

    if report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list() -> Result<()> {
    println!("{}", "Passes:".bold());
    for (name, description) in catalog::describe() {
        println!("  {:<14} {}", name.to_string().green(), description);
    }

    println!();
    println!("{}", "Instrument modes:".bold());
    for mode in InstrumentMode::ALL {
        println!("  {}", mode);
    }

    println!();
    println!("{}", "Mutation targets:".bold());
    for target in MutationTarget::ALL {
        println!("  {}", target);
    }
    Ok(())
}
