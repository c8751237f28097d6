//! # CLI Module
//!
//! Command-line interface for the media archiver.
//!
//! ## Usage
//! ```bash
//! # Archive a card into ~/Archive (inventory kept at ~/Archive/.media-inventory.jsonl)
//! media-archiver organize /Volumes/CARD ~/Archive
//!
//! # Count duplicates without copying them, SQLite inventory
//! media-archiver organize /Volumes/CARD ~/Archive --duplicates skip --inventory ~/archive.db
//!
//! # See where everything would go, write nothing
//! media-archiver organize /Volumes/CARD ~/Archive --dry-run
//!
//! # JSON report for scripting
//! media-archiver organize /Volumes/CARD ~/Archive --output json
//!
//! # Inspect an inventory
//! media-archiver inventory ~/Archive
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use media_archiver::core::inventory::{
    default_inventory_path, open_inventory, InMemoryInventory, InventoryBackend, InventoryStats,
};
use media_archiver::core::organize::{Archiver, DuplicateAction, FileOutcome, RunReport};
use media_archiver::error::{ArchiveError, Result};
use media_archiver::events::{Event, EventChannel, OrganizeEvent, RunEvent, ScanEvent};
use std::path::{Path, PathBuf};
use std::thread;

/// Media Archiver - file photos and videos by when they were taken, once
#[derive(Parser, Debug)]
#[command(name = "media-archiver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy new media from SOURCE into DEST/YEAR/MONTH
    Organize {
        /// Tree to read from (never modified)
        source: PathBuf,

        /// Archive root
        destination: PathBuf,

        /// Inventory file; `.db`/`.sqlite`/`.sqlite3` selects SQLite
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Quarantine directory (default: DEST/_quarantine)
        #[arg(long)]
        quarantine: Option<PathBuf>,

        /// What to do with files whose content is already archived
        #[arg(long, default_value = "copy")]
        duplicates: DuplicateMode,

        /// Trust fingerprint matches without comparing full content
        #[arg(long)]
        no_verify: bool,

        /// Worker threads (default: one per core)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Include hidden files
        #[arg(long)]
        include_hidden: bool,

        /// Show where files would go without copying or recording anything
        #[arg(long)]
        dry_run: bool,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show what an inventory contains
    Inventory {
        /// Inventory file, or an archive root holding the default one
        path: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DuplicateMode {
    /// Copy into DEST/_duplicates/YEAR/MONTH (default)
    Copy,
    /// Count but do not copy
    Skip,
}

impl From<DuplicateMode> for DuplicateAction {
    fn from(mode: DuplicateMode) -> Self {
        match mode {
            DuplicateMode::Copy => DuplicateAction::Copy,
            DuplicateMode::Skip => DuplicateAction::Skip,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

struct OrganizeArgs {
    source: PathBuf,
    destination: PathBuf,
    inventory: Option<PathBuf>,
    quarantine: Option<PathBuf>,
    duplicates: DuplicateMode,
    no_verify: bool,
    workers: Option<usize>,
    include_hidden: bool,
    dry_run: bool,
    output: OutputFormat,
    verbose: bool,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Organize {
            source,
            destination,
            inventory,
            quarantine,
            duplicates,
            no_verify,
            workers,
            include_hidden,
            dry_run,
            output,
            verbose,
        } => {
            media_archiver::init_tracing(verbose);
            run_organize(OrganizeArgs {
                source,
                destination,
                inventory,
                quarantine,
                duplicates,
                no_verify,
                workers,
                include_hidden,
                dry_run,
                output,
                verbose,
            })
        }
        Commands::Inventory { path, output } => {
            media_archiver::init_tracing(false);
            run_inventory(&path, output)
        }
    }
}

/// Report an error that stopped the run before or during setup
pub fn print_fatal(error: &ArchiveError) {
    Term::stderr()
        .write_line(&format!("{} {}", style("error:").red().bold(), error))
        .ok();
}

fn run_organize(args: OrganizeArgs) -> Result<()> {
    let term = Term::stderr();
    let pretty = matches!(args.output, OutputFormat::Pretty);

    if pretty {
        term.write_line(&format!(
            "{} {}",
            style("Media Archiver").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let inventory_path = args
        .inventory
        .unwrap_or_else(|| default_inventory_path(&args.destination));
    // A dry run must not create an inventory that does not exist yet
    let inventory: Box<dyn InventoryBackend> = if args.dry_run && !inventory_path.exists() {
        Box::new(InMemoryInventory::new())
    } else {
        open_inventory(&inventory_path)?
    };

    let mut builder = Archiver::builder()
        .source(&args.source)
        .destination(&args.destination)
        .duplicate_action(args.duplicates.into())
        .verify_duplicates(!args.no_verify)
        .include_hidden(args.include_hidden)
        .dry_run(args.dry_run)
        .inventory(inventory);
    if let Some(quarantine) = args.quarantine {
        builder = builder.quarantine(quarantine);
    }
    if let Some(workers) = args.workers {
        builder = builder.workers(workers);
    }
    let archiver = builder.build();

    // Set up event handling
    let (sender, receiver) = EventChannel::new();

    let progress = if pretty {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();
    let verbose = args.verbose;

    // Handle events in a separate thread
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            let Some(ref pb) = progress_clone else {
                continue;
            };
            match event {
                Event::Run(RunEvent::PhaseChanged { phase }) => {
                    pb.set_message(phase.to_string());
                }
                Event::Scan(ScanEvent::Error { path, message }) => {
                    pb.println(format!(
                        "  {} {}: {}",
                        style("!").yellow(),
                        path.display(),
                        message
                    ));
                }
                Event::Organize(OrganizeEvent::Started { total_files }) => {
                    pb.set_length(total_files as u64);
                }
                Event::Organize(OrganizeEvent::FileDone { source, outcome }) => {
                    if verbose {
                        pb.set_message(format!(
                            "{} {}",
                            outcome.label(),
                            source.file_name().unwrap_or_default().to_string_lossy()
                        ));
                    }
                }
                Event::Organize(OrganizeEvent::Progress { processed, .. }) => {
                    pb.set_position(processed as u64);
                }
                Event::Organize(OrganizeEvent::Completed { .. }) | Event::Run(RunEvent::Error { .. }) => {
                    pb.finish_and_clear();
                }
                _ => {}
            }
        }
    });

    let result = archiver.run_with_events(&sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();

    let report = result?;

    match args.output {
        OutputFormat::Pretty => print_pretty_report(&term, &report, &inventory_path, args.verbose),
        OutputFormat::Json => print_json(&report)?,
    }

    Ok(())
}

fn run_inventory(path: &Path, output: OutputFormat) -> Result<()> {
    let path = if path.is_dir() {
        default_inventory_path(path)
    } else {
        path.to_path_buf()
    };
    if !path.exists() {
        return Err(ArchiveError::Config(format!(
            "no inventory at {}",
            path.display()
        )));
    }

    let inventory = open_inventory(&path)?;
    let stats = inventory.stats()?;

    match output {
        OutputFormat::Pretty => print_pretty_inventory(&Term::stdout(), &path, &stats),
        OutputFormat::Json => print_json(&serde_json::json!({
            "path": path,
            "stats": stats,
        }))?,
    }
    Ok(())
}

fn print_pretty_report(term: &Term, report: &RunReport, inventory: &Path, verbose: bool) {
    let stats = &report.stats;

    if report.dry_run {
        term.write_line(&format!(
            "{} Dry run: nothing was copied or recorded",
            style("✓").green().bold()
        ))
        .ok();
    } else {
        term.write_line(&format!("{} Archive Complete", style("✓").green().bold()))
            .ok();
    }
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} media files scanned in {:.1}s",
        style(stats.scanned).cyan(),
        stats.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!("  {} originals placed", style(stats.originals).cyan()))
        .ok();
    term.write_line(&format!("  {} duplicates found", style(stats.duplicates).cyan()))
        .ok();
    term.write_line(&format!(
        "  {} quarantined",
        if stats.quarantined > 0 {
            style(stats.quarantined).yellow()
        } else {
            style(stats.quarantined).cyan()
        }
    ))
    .ok();
    term.write_line(&format!(
        "  {} already archived",
        style(stats.already_archived).dim()
    ))
    .ok();
    term.write_line(&format!(
        "  {} {}",
        style(format_bytes(stats.bytes_copied)).yellow(),
        if report.dry_run { "would be copied" } else { "copied" }
    ))
    .ok();

    if stats.fingerprint_collisions > 0 {
        term.write_line(&format!(
            "  {} fingerprint collisions (kept as separate originals)",
            style(stats.fingerprint_collisions).yellow()
        ))
        .ok();
    }
    if stats.no_embedded_date > 0 {
        term.write_line(&format!(
            "  {} dated from filesystem timestamps",
            style(stats.no_embedded_date).dim()
        ))
        .ok();
    }
    if stats.skipped_non_media > 0 {
        term.write_line(&format!(
            "  {} non-media files skipped",
            style(stats.skipped_non_media).dim()
        ))
        .ok();
    }
    if stats.scan_errors > 0 {
        term.write_line(&format!(
            "  {} unreadable directories",
            style(stats.scan_errors).red()
        ))
        .ok();
    }
    if stats.placement_retries > 0 && verbose {
        term.write_line(&format!(
            "  {} placement retries",
            style(stats.placement_retries).dim()
        ))
        .ok();
    }

    let quarantined: Vec<_> = report
        .files
        .iter()
        .filter_map(|f| match &f.outcome {
            FileOutcome::Quarantined { reason, .. } => Some((&f.source, reason)),
            _ => None,
        })
        .collect();

    if !quarantined.is_empty() {
        term.write_line("").ok();
        term.write_line(&format!("{}", style("Quarantined:").bold().underlined()))
            .ok();
        for (source, reason) in quarantined {
            term.write_line(&format!("  {} {}", style("○").yellow(), source.display()))
                .ok();
            if verbose {
                term.write_line(&format!("    {}", style(reason).dim())).ok();
            }
        }
    }

    if verbose && !report.scan_errors.is_empty() {
        term.write_line("").ok();
        term.write_line(&format!("{}", style("Scan errors:").bold().underlined()))
            .ok();
        for error in &report.scan_errors {
            term.write_line(&format!("  {} {}", style("!").red(), error)).ok();
        }
    }

    term.write_line("").ok();
    term.write_line(&format!(
        "{}",
        style(format!(
            "Source untouched. Inventory: {}",
            inventory.display()
        ))
        .dim()
    ))
    .ok();
}

fn print_pretty_inventory(term: &Term, path: &Path, stats: &InventoryStats) {
    term.write_line(&format!(
        "{} {}",
        style("Inventory").bold().cyan(),
        style(path.display()).dim()
    ))
    .ok();
    term.write_line("").ok();
    term.write_line(&format!("  {} records", style(stats.total_records).cyan()))
        .ok();
    term.write_line(&format!(
        "  {} placed, {} recovered",
        style(stats.placed).cyan(),
        style(stats.recovered).dim()
    ))
    .ok();
    term.write_line(&format!("  {} runs", style(stats.runs).cyan())).ok();

    if let (Some(oldest), Some(newest)) = (stats.oldest_record, stats.newest_record) {
        term.write_line(&format!(
            "  first {}  last {}",
            oldest.format("%Y-%m-%d %H:%M"),
            newest.format("%Y-%m-%d %H:%M")
        ))
        .ok();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ArchiveError::Config(format!("could not encode output: {e}")))?;
    println!("{json}");
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_organize_options() {
        let cli = Cli::try_parse_from([
            "media-archiver",
            "organize",
            "/card",
            "/archive",
            "--duplicates",
            "skip",
            "--no-verify",
            "--dry-run",
            "--output",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Organize {
                duplicates,
                no_verify,
                dry_run,
                output,
                ..
            } => {
                assert!(matches!(duplicates, DuplicateMode::Skip));
                assert!(no_verify);
                assert!(dry_run);
                assert!(matches!(output, OutputFormat::Json));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn organize_requires_source_and_destination() {
        assert!(Cli::try_parse_from(["media-archiver", "organize", "/card"]).is_err());
    }

    #[test]
    fn format_bytes_uses_binary_units() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
