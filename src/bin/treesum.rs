//! # Treesum CLI - checksums for directory trees
//!
//! Command-line front end for the treesum library.
//!
//! ## Features
//! - Write a `.shasum` into every directory, or one tree-wide digest file
//! - Verify a tree, or a copy of it, and get a graded status and exit code
//! - Resume interrupted runs on large trees
//! - Keep digest files out of the source tree with `--shadow-dir`
//! - Back up, restore or remove the `.shasum` files of a tree
//!
//! ## Usage
//! ```bash
//! # Digest every directory under ./photos
//! treesum -r create ./photos
//!
//! # One tree-wide file, then verify a backup copy with it
//! treesum -r --mode monolithic create ./photos
//! treesum -r --output ./photos/checksums.sha256 verify /mnt/backup/photos
//!
//! # Refresh digests after intentional edits
//! treesum -r update ./photos
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use treesum::utils::{format_bytes, make_relative};
use treesum::{
    DigestFileManager, DigestMode, DirectoryOutcome, FailureReason, GenerationTotals,
    HashAlgorithm, LineEndingPolicy, ManageReport, RunTotals, Treesum, TreesumBuilder,
    TreesumError, VerificationResult,
};

/// Treesum CLI - generate and verify checksums for directory trees
#[derive(Parser)]
#[command(name = "treesum")]
#[command(version)]
#[command(about = "Generate, verify and update checksum files for directory trees")]
#[command(long_about = None)]
struct Cli {
    /// Hash algorithm
    #[arg(short, long, value_enum, default_value = "sha256", global = true)]
    algorithm: AlgorithmArg,

    /// Line-ending handling for text files
    #[arg(long, value_enum, default_value = "auto", global = true)]
    line_endings: LineEndingArg,

    /// Descend into subdirectories
    #[arg(short, long, global = true)]
    recursive: bool,

    /// Enter symlinked directories
    #[arg(long, global = true)]
    follow_symlinks: bool,

    /// Only process files matching this glob (repeatable)
    #[arg(long, global = true)]
    include: Vec<String>,

    /// Skip files matching this glob (repeatable)
    #[arg(long, global = true)]
    exclude: Vec<String>,

    /// Which digest files to write
    #[arg(long, value_enum, default_value = "individual", global = true)]
    mode: ModeArg,

    /// Tree-wide digest file (implies tree-wide verification)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Keep digest files in this parallel directory tree
    #[arg(long, global = true)]
    shadow_dir: Option<PathBuf>,

    /// Skip directories a previous run already completed
    #[arg(long, global = true)]
    resume: bool,

    /// Overwrite existing output and confirm removals
    #[arg(short = 'y', long = "yes", global = true)]
    yes: bool,

    /// Use the platform's hashing tool when available
    #[arg(long, global = true)]
    native: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Also list files that verified
    #[arg(long, global = true)]
    show_all: bool,

    /// Show a progress spinner
    #[arg(long, global = true)]
    progress: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Write a detailed debug log to this file
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate digest files
    #[command(alias = "generate")]
    Create {
        /// Directory to process (defaults to current)
        dir: Option<PathBuf>,
    },

    /// Verify files against their digest files
    #[command(alias = "check")]
    Verify {
        /// Directory to verify (defaults to current)
        dir: Option<PathBuf>,
    },

    /// Rewrite per-directory digest files that no longer match
    Update {
        /// Directory to process (defaults to current)
        dir: Option<PathBuf>,
    },

    /// List, back up, restore or remove .shasum files
    Manage {
        /// Operation
        #[arg(value_enum)]
        action: ManageAction,

        /// Directory to manage (defaults to current)
        dir: Option<PathBuf>,

        /// Backup location for backup and restore
        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// Show what would be done without doing it
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum AlgorithmArg {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl From<AlgorithmArg> for HashAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Md5 => HashAlgorithm::Md5,
            AlgorithmArg::Sha1 => HashAlgorithm::Sha1,
            AlgorithmArg::Sha256 => HashAlgorithm::Sha256,
            AlgorithmArg::Sha512 => HashAlgorithm::Sha512,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LineEndingArg {
    Auto,
    Unix,
    Windows,
    Preserve,
}

impl From<LineEndingArg> for LineEndingPolicy {
    fn from(arg: LineEndingArg) -> Self {
        match arg {
            LineEndingArg::Auto => LineEndingPolicy::Auto,
            LineEndingArg::Unix => LineEndingPolicy::Unix,
            LineEndingArg::Windows => LineEndingPolicy::Windows,
            LineEndingArg::Preserve => LineEndingPolicy::Preserve,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Individual,
    Monolithic,
    Both,
}

impl From<ModeArg> for DigestMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Individual => DigestMode::Individual,
            ModeArg::Monolithic => DigestMode::Monolithic,
            ModeArg::Both => DigestMode::Both,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ManageAction {
    List,
    Backup,
    Restore,
    Remove,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log.as_deref()) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }

    // Disable colors if needed
    if std::env::var_os("NO_COLOR").is_some() || cli.json {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            match e.downcast_ref::<TreesumError>() {
                Some(err) => eprintln!("{}: {}", "Error".red().bold(), err.user_message()),
                None => eprintln!("{}: {:#}", "Error".red().bold(), e),
            }
            std::process::exit(1);
        }
    }
}

/// Console logging on stderr, plus an optional debug-level file log
fn init_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("cannot create log file {:?}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry().with(console).with(file_layer).init();
    Ok(())
}

/// Main command runner, returns the process exit code
fn run(cli: Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Create { dir } => cmd_create(&cli, dir_or_current(dir)),
        Commands::Verify { dir } => cmd_verify(&cli, dir_or_current(dir)),
        Commands::Update { dir } => cmd_update(&cli, dir_or_current(dir)),
        Commands::Manage {
            action,
            dir,
            backup_dir,
            dry_run,
        } => cmd_manage(&cli, *action, dir_or_current(dir), backup_dir.as_deref(), *dry_run),
    }
}

fn dir_or_current(dir: &Option<PathBuf>) -> PathBuf {
    dir.clone().unwrap_or_else(|| PathBuf::from("."))
}

fn build_treesum(cli: &Cli, dir: &Path) -> anyhow::Result<Treesum> {
    let mut builder = TreesumBuilder::new()
        .algorithm(cli.algorithm.into())
        .line_endings(cli.line_endings.into())
        .mode(cli.mode.into())
        .recursive(cli.recursive)
        .follow_symlinks(cli.follow_symlinks)
        .include_patterns(cli.include.clone())
        .exclude_patterns(cli.exclude.clone())
        .resume(cli.resume)
        .overwrite(cli.yes)
        .native_tool(cli.native);
    if let Some(output) = &cli.output {
        builder = builder.output(output.clone());
    }
    if let Some(shadow) = &cli.shadow_dir {
        builder = builder.shadow_dir(shadow.clone());
    }
    Ok(builder.build(dir)?)
}

/// Line printer that stays out of the spinner's way
struct Reporter {
    progress: Option<ProgressBar>,
    quiet: bool,
    show_all: bool,
    root: PathBuf,
}

impl Reporter {
    fn new(cli: &Cli, root: &Path, message: &str) -> Self {
        let progress = (cli.progress && !cli.quiet && !cli.json).then(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message(message.to_string());
            pb
        });
        Self {
            progress,
            quiet: cli.quiet || cli.json,
            show_all: cli.show_all,
            root: root.to_path_buf(),
        }
    }

    fn line(&self, text: String) {
        if self.quiet {
            return;
        }
        match &self.progress {
            Some(pb) => pb.println(text),
            None => println!("{}", text),
        }
    }

    fn tick(&self, dir: &Path) {
        if let Some(pb) = &self.progress {
            pb.set_message(self.display(dir, ""));
        }
    }

    fn finish(&self) {
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
    }

    fn display(&self, dir: &Path, name: &str) -> String {
        let relative = make_relative(dir, &self.root).unwrap_or_else(|_| dir.to_path_buf());
        let path = if name.is_empty() { relative } else { relative.join(name) };
        let shown = path.display().to_string();
        if shown.is_empty() {
            ".".to_string()
        } else {
            shown
        }
    }

    fn outcome(&self, outcome: &DirectoryOutcome) {
        self.tick(&outcome.directory);
        if outcome.resumed {
            if self.show_all {
                self.line(format!("{} {}", "RESUMED".dimmed(), self.display(&outcome.directory, "")));
            }
            return;
        }
        for failure in &outcome.failures {
            self.line(format!(
                "{} {}: {}",
                "ERROR".red().bold(),
                self.display(&outcome.directory, &failure.name),
                failure.message
            ));
        }
        if let Some(error) = &outcome.write_error {
            self.line(format!(
                "{} {}: {}",
                "WRITE FAILED".red().bold(),
                self.display(&outcome.directory, ""),
                error
            ));
        }
        if self.show_all {
            for entry in &outcome.entries {
                self.line(format!(
                    "{} {}",
                    entry.hash.dimmed(),
                    self.display(&outcome.directory, &entry.relative_name)
                ));
            }
        }
    }

    fn result(&self, result: &VerificationResult) {
        self.tick(&result.location);
        let dir = &result.location;
        if let Some(problem) = &result.error {
            let is_missing = matches!(problem, treesum::DigestFileProblem::NotFound { .. });
            if !is_missing {
                self.line(format!("{} {}", "BAD DIGEST FILE".red().bold(), problem));
            } else if self.show_all {
                self.line(format!("{} {}", "NO DIGEST".dimmed(), self.display(dir, "")));
            }
            return;
        }
        if self.show_all {
            for name in &result.verified {
                self.line(format!("{} {}", "OK".green(), self.display(dir, name)));
            }
        }
        for failed in &result.failed {
            let detail = match &failed.reason {
                FailureReason::Mismatch { expected, actual } => {
                    format!("expected {}, got {}", expected, actual)
                }
                FailureReason::Io { message, .. } => message.clone(),
            };
            self.line(format!(
                "{} {} ({})",
                "FAILED".red().bold(),
                self.display(dir, &failed.name),
                detail
            ));
        }
        for name in &result.missing {
            self.line(format!("{} {}", "MISSING".yellow().bold(), self.display(dir, name)));
        }
        for name in &result.extra {
            self.line(format!("{} {}", "EXTRA".cyan(), self.display(dir, name)));
        }
    }
}

fn rounded(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}

/// Generate digest files
fn cmd_create(cli: &Cli, dir: PathBuf) -> anyhow::Result<i32> {
    let treesum = build_treesum(cli, &dir)?;
    let reporter = Reporter::new(cli, treesum.root(), "Hashing...");
    if !reporter.quiet {
        println!(
            "{} {} ({})",
            "Generating checksums for".blue().bold(),
            treesum.root().display(),
            treesum.config().algorithm
        );
    }

    let generated = treesum.generate_with(|outcome| reporter.outcome(outcome));
    reporter.finish();
    let totals = generated?;

    print_generation(cli, "Created", &totals)?;
    Ok(if totals.has_failures() { 1 } else { 0 })
}

/// Rewrite stale per-directory digest files
fn cmd_update(cli: &Cli, dir: PathBuf) -> anyhow::Result<i32> {
    let treesum = build_treesum(cli, &dir)?;
    let reporter = Reporter::new(cli, treesum.root(), "Updating...");

    let updated = treesum.update_with(|outcome| {
        if outcome.digest_file.is_some() && !outcome.unchanged {
            reporter.line(format!("{} {}", "UPDATED".green(), reporter.display(&outcome.directory, "")));
        }
        reporter.outcome(outcome);
    });
    reporter.finish();
    let totals = updated?;

    print_generation(cli, "Updated", &totals)?;
    Ok(if totals.has_failures() { 1 } else { 0 })
}

fn print_generation(cli: &Cli, verb: &str, totals: &GenerationTotals) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(totals)?);
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    let mark = if totals.has_failures() { "!".yellow().bold() } else { "✓".green().bold() };
    println!(
        "{} {} {} digest files",
        mark,
        verb,
        totals.directories_written.to_string().cyan()
    );
    println!("  Directories: {}", totals.directories_processed.to_string().cyan());
    if totals.directories_resumed > 0 {
        println!("  Resumed: {}", totals.directories_resumed.to_string().cyan());
    }
    if totals.directories_unchanged > 0 {
        println!("  Unchanged: {}", totals.directories_unchanged.to_string().cyan());
    }
    println!("  Files: {}", totals.files_processed.to_string().cyan());
    if totals.monolithic_entries > 0 {
        println!("  Tree-wide entries: {}", totals.monolithic_entries.to_string().cyan());
    }
    if totals.files_skipped > 0 {
        println!("  Skipped: {}", totals.files_skipped.to_string().yellow());
    }
    if totals.has_failures() {
        println!(
            "  Failed: {} files, {} directories",
            totals.files_failed.to_string().red(),
            totals.directories_failed.to_string().red()
        );
    }
    println!(
        "  Size: {} ({}/s)",
        format_bytes(totals.bytes).cyan(),
        format_bytes(totals.throughput() as u64)
    );
    println!("  Time: {}", format_duration(rounded(totals.elapsed)).to_string().cyan());
    Ok(())
}

/// Verify a tree
fn cmd_verify(cli: &Cli, dir: PathBuf) -> anyhow::Result<i32> {
    let treesum = build_treesum(cli, &dir)?;
    let reporter = Reporter::new(cli, treesum.root(), "Verifying...");

    let mut results = Vec::new();
    let verified = treesum.verify_with(|result| {
        reporter.result(result);
        if cli.json {
            results.push(result.clone());
        }
    });
    reporter.finish();
    let totals = verified?;
    let status = totals.status();

    if cli.json {
        let report = json!({
            "root": treesum.root(),
            "status": status,
            "totals": totals,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        print_verification(&totals);
    }
    Ok(status.exit_code)
}

fn print_verification(totals: &RunTotals) {
    let status = totals.status();
    let label = status.to_string();
    let label = match status.exit_code {
        0 => label.green().bold(),
        2 | 3 => label.yellow().bold(),
        _ => label.red().bold(),
    };
    println!("{} {}", "Status:".bold(), label);
    println!(
        "  Directories: {} ({} ok, {} partial, {} failed, {} without digests)",
        totals.directories_processed.to_string().cyan(),
        totals.directories_success,
        totals.directories_partial,
        totals.directories_failed,
        totals.directories_no_digest
    );
    if totals.digest_files_unusable > 0 {
        println!(
            "  {} digest files could not be used",
            totals.digest_files_unusable.to_string().red().bold()
        );
    }
    println!(
        "  Files: {} verified, {} failed, {} missing, {} extra",
        totals.files_verified.to_string().green(),
        totals.files_failed.to_string().red(),
        totals.files_missing.to_string().yellow(),
        totals.files_extra.to_string().cyan()
    );
    println!("  Data: {}", format_bytes(totals.bytes_verified).cyan());
    println!(
        "  Time: {} ({:.1} files/s)",
        format_duration(rounded(totals.elapsed)).to_string().cyan(),
        totals.throughput()
    );
}

/// Housekeeping on .shasum files
fn cmd_manage(
    cli: &Cli,
    action: ManageAction,
    dir: PathBuf,
    backup_dir: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<i32> {
    let root = cli.shadow_dir.clone().unwrap_or(dir);
    let manager = DigestFileManager::new(root.clone()).dry_run(dry_run);

    let report = match action {
        ManageAction::List => {
            let listing = manager.list()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(0);
            }
            if listing.is_empty() {
                println!("{}", "No digest files found.".yellow());
            }
            for item in &listing {
                let entries = item
                    .entries
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{}  {:>6} entries  {:>10}  {}",
                    item.modified.format("%Y-%m-%d %H:%M:%S"),
                    entries,
                    format_bytes(item.size),
                    item.path.display()
                );
            }
            return Ok(0);
        }
        ManageAction::Backup => {
            let target = backup_dir.context("backup requires --backup-dir")?;
            manager.backup(target)?
        }
        ManageAction::Restore => {
            let source = backup_dir.context("restore requires --backup-dir")?;
            manager.restore(source)?
        }
        ManageAction::Remove => manager.remove(cli.yes)?,
    };

    print_manage(cli, action, &report)?;
    Ok(if report.is_ok() { 0 } else { 1 })
}

fn print_manage(cli: &Cli, action: ManageAction, report: &ManageReport) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let verb = match action {
        ManageAction::List => "Listed",
        ManageAction::Backup => "Backed up",
        ManageAction::Restore => "Restored",
        ManageAction::Remove => "Removed",
    };
    let prefix = if report.dry_run { "[dry run] " } else { "" };
    if cli.show_all || report.dry_run {
        for path in &report.processed {
            println!("  {}{}", prefix.dimmed(), path.display());
        }
    }
    println!(
        "{} {}{} {} digest files",
        "✓".green().bold(),
        prefix,
        verb,
        report.processed.len().to_string().cyan()
    );
    for (path, error) in &report.errors {
        eprintln!("  {} {}: {}", "ERROR".red().bold(), path.display(), error);
    }
    Ok(())
}
