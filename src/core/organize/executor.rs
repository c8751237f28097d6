//! Run orchestration: scan, analyse, classify, place, record.

use super::placement::{files_identical, place, preview, Placement};
use super::stats::StatsRecorder;
use super::types::*;
use crate::core::fingerprint::{fingerprint_file, Fingerprint};
use crate::core::inventory::{InMemoryInventory, InventoryBackend, InventoryRecord, RecordOutcome};
use crate::core::metadata::{
    CaptureDate, DateResolution, DateResolver, DateSource, PlausibleWindow,
};
use crate::core::router::{Classification, Route, Router};
use crate::core::scanner::{MediaScanner, ScanConfig, SourceFile, WalkDirScanner};
use crate::error::{ArchiveError, PlacementError, ReadError};
use crate::events::{null_sender, Event, EventSender, OrganizeEvent, RunEvent, RunPhase};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Builder for an [`Archiver`]
pub struct ArchiverBuilder {
    config: ArchiveConfig,
    inventory: Option<Box<dyn InventoryBackend>>,
    date_sources: Option<Vec<Box<dyn DateSource>>>,
    window: Option<PlausibleWindow>,
}

impl ArchiverBuilder {
    /// Create a new archiver builder
    pub fn new() -> Self {
        Self {
            config: ArchiveConfig::default(),
            inventory: None,
            date_sources: None,
            window: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ArchiveConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the tree to archive from
    pub fn source(mut self, source: impl Into<PathBuf>) -> Self {
        self.config.source = source.into();
        self
    }

    /// Set the archive root
    pub fn destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.config.destination = destination.into();
        self
    }

    /// Put quarantined files somewhere other than `DEST/_quarantine`
    pub fn quarantine(mut self, quarantine: impl Into<PathBuf>) -> Self {
        self.config.quarantine = Some(quarantine.into());
        self
    }

    pub fn duplicate_action(mut self, action: DuplicateAction) -> Self {
        self.config.duplicate_action = action;
        self
    }

    /// Compare full content before trusting a fingerprint match
    pub fn verify_duplicates(mut self, verify: bool) -> Self {
        self.config.verify_duplicates = verify;
        self
    }

    /// Size of the worker pool
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = Some(workers);
        self
    }

    /// Include hidden files
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.config.include_hidden = include;
        self
    }

    /// Replace the built-in media extension list
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.config.extensions = Some(extensions);
        self
    }

    /// Earliest year accepted as a capture date
    pub fn min_year(mut self, year: i32) -> Self {
        self.config.min_year = year;
        self
    }

    /// Report where everything would go without writing anything
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Set the inventory backend
    pub fn inventory(mut self, inventory: Box<dyn InventoryBackend>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Replace the EXIF, QuickTime, filesystem date chain
    pub fn date_sources(mut self, sources: Vec<Box<dyn DateSource>>) -> Self {
        self.date_sources = Some(sources);
        self
    }

    /// Fix the accepted date range instead of deriving it from `min_year` and now
    pub fn plausible_window(mut self, window: PlausibleWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Build the archiver
    pub fn build(self) -> Archiver {
        let window = self
            .window
            .unwrap_or_else(|| PlausibleWindow::until_now(self.config.min_year));
        let resolver = match self.date_sources {
            Some(sources) => DateResolver::new(sources, window),
            None => DateResolver::standard(window),
        };

        let mut router = Router::new(&self.config.destination);
        if let Some(ref quarantine) = self.config.quarantine {
            router = router.with_quarantine(quarantine);
        }

        Archiver {
            config: self.config,
            inventory: self
                .inventory
                .unwrap_or_else(|| Box::new(InMemoryInventory::new())),
            resolver,
            router,
        }
    }
}

impl Default for ArchiverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The incremental archiving engine
pub struct Archiver {
    config: ArchiveConfig,
    inventory: Box<dyn InventoryBackend>,
    resolver: DateResolver,
    router: Router,
}

/// Per-file work done before placement; safe to run in any order
struct Analysis {
    file: SourceFile,
    fingerprint: Result<Fingerprint, ReadError>,
    /// `None` when date resolution was not needed
    resolution: Option<DateResolution>,
}

impl Analysis {
    /// Earliest capture date first; files already on record ahead of everything
    fn order_key(&self) -> (u8, i32, u32, &Path) {
        let (rank, year, month) = match &self.resolution {
            None => (0, 0, 0),
            Some(DateResolution::Resolved(date)) => (1, date.year, date.month),
            Some(DateResolution::Unresolved { .. }) => (2, 0, 0),
        };
        (rank, year, month, self.file.path.as_path())
    }
}

/// Shared state for one run
struct RunContext<'a> {
    run_id: Uuid,
    started: Instant,
    stats: StatsRecorder,
    events: &'a EventSender,
    /// Destination paths written (or, in a dry run, claimed) by this run,
    /// with the source that took each
    written: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl RunContext<'_> {
    fn note_written(&self, path: &Path, source: &Path) {
        if let Ok(mut written) = self.written.lock() {
            written.insert(path.to_path_buf(), source.to_path_buf());
        }
    }

    /// An identical file found at `path` came from an earlier file of this run
    fn written_this_run(&self, path: &Path) -> bool {
        self.written
            .lock()
            .map(|written| written.contains_key(path))
            .unwrap_or(false)
    }

    fn finish(&self, file: &SourceFile, outcome: FileOutcome) -> FileReport {
        debug!(path = %file.path.display(), outcome = outcome.label(), destination = ?outcome.destination(), "File done");

        let crossed = self.stats.record_outcome(&outcome);
        self.events.send(Event::Organize(OrganizeEvent::FileDone {
            source: file.path.clone(),
            outcome: outcome.clone(),
        }));

        if let Some(percent) = crossed {
            let stats = self.stats.snapshot(self.started.elapsed().as_millis() as u64);
            self.events.send(Event::Organize(OrganizeEvent::Progress {
                percent,
                processed: self.stats.processed(),
                total: stats.scanned,
                stats,
            }));
        }

        FileReport {
            source: file.path.clone(),
            outcome,
        }
    }
}

impl Archiver {
    /// Create a new archiver builder
    pub fn builder() -> ArchiverBuilder {
        ArchiverBuilder::new()
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn inventory(&self) -> &dyn InventoryBackend {
        self.inventory.as_ref()
    }

    /// Run without events
    pub fn run(&self) -> Result<RunReport, ArchiveError> {
        self.run_with_events(&null_sender())
    }

    /// Run with event reporting.
    ///
    /// Per-file problems never fail the run; they end as quarantine outcomes.
    /// Errors are returned only for unusable source or destination roots and
    /// for inventory failures.
    pub fn run_with_events(&self, events: &EventSender) -> Result<RunReport, ArchiveError> {
        let result = self.execute(events);
        if let Err(ref e) = result {
            events.send(Event::Run(RunEvent::Error {
                message: e.to_string(),
            }));
        }
        result
    }

    fn execute(&self, events: &EventSender) -> Result<RunReport, ArchiveError> {
        let ctx = RunContext {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            stats: StatsRecorder::new(),
            events,
            written: Mutex::new(HashMap::new()),
        };

        events.send(Event::Run(RunEvent::Started));
        info!(
            run_id = %ctx.run_id,
            source = %self.config.source.display(),
            destination = %self.config.destination.display(),
            dry_run = self.config.dry_run,
            "Starting archive run"
        );

        let destination = self.prepare_destination()?;

        // Phase 1: Scanning
        events.send(Event::Run(RunEvent::PhaseChanged {
            phase: RunPhase::Scanning,
        }));

        let mut exclude = vec![destination];
        if let Some(quarantine) = self.config.quarantine.as_ref().and_then(|q| fs::canonicalize(q).ok()) {
            exclude.push(quarantine);
        }
        let scanner = WalkDirScanner::new(ScanConfig {
            follow_symlinks: false,
            include_hidden: self.config.include_hidden,
            extensions: self.config.extensions.clone(),
            exclude,
        });
        let scan = scanner.scan_with_events(&self.config.source, events)?;

        let scan_errors: Vec<String> = scan.errors.iter().map(|e| e.to_string()).collect();
        ctx.stats
            .set_scan_totals(scan.files.len(), scan.skipped_non_media, scan_errors.len());

        // Phase 2: Fingerprints and dates, fully parallel
        events.send(Event::Run(RunEvent::PhaseChanged {
            phase: RunPhase::Analyzing,
        }));
        events.send(Event::Organize(OrganizeEvent::Started {
            total_files: scan.files.len(),
        }));

        let analyses: Vec<Analysis> = self.in_pool(|| {
            scan.files
                .into_par_iter()
                .map(|file| self.analyze(file))
                .collect()
        })?;

        // Phase 3: one worker per fingerprint, so a fingerprint is committed at most once
        events.send(Event::Run(RunEvent::PhaseChanged {
            phase: RunPhase::Placing,
        }));

        let mut unreadable = Vec::new();
        let mut by_fingerprint: HashMap<Fingerprint, Vec<Analysis>> = HashMap::new();
        for analysis in analyses {
            match analysis.fingerprint {
                Ok(fingerprint) => by_fingerprint.entry(fingerprint).or_default().push(analysis),
                Err(_) => unreadable.push(analysis),
            }
        }
        let mut groups: Vec<(Fingerprint, Vec<Analysis>)> = by_fingerprint.into_iter().collect();
        for (_, group) in &mut groups {
            group.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        }

        let (placed, quarantined) = self.in_pool(|| {
            rayon::join(
                || {
                    groups
                        .into_par_iter()
                        .map(|(fingerprint, group)| self.process_group(fingerprint, group, &ctx))
                        .collect::<Result<Vec<Vec<FileReport>>, ArchiveError>>()
                },
                || {
                    // Sequential: unreadable files often share a name and (empty) content
                    unreadable
                        .into_iter()
                        .map(|analysis| {
                            let reason = match &analysis.fingerprint {
                                Err(e) => e.to_string(),
                                Ok(_) => String::from("unreadable"),
                            };
                            let outcome = self.quarantine_file(&analysis.file, reason, &ctx);
                            ctx.finish(&analysis.file, outcome)
                        })
                        .collect::<Vec<FileReport>>()
                },
            )
        })?;

        let mut files: Vec<FileReport> = placed?.into_iter().flatten().collect();
        files.extend(quarantined);
        files.sort_by(|a, b| a.source.cmp(&b.source));

        let stats = ctx.stats.snapshot(ctx.started.elapsed().as_millis() as u64);
        events.send(Event::Organize(OrganizeEvent::Completed {
            stats: stats.clone(),
        }));

        info!(
            run_id = %ctx.run_id,
            scanned = stats.scanned,
            originals = stats.originals,
            duplicates = stats.duplicates,
            quarantined = stats.quarantined,
            already_archived = stats.already_archived,
            scan_errors = stats.scan_errors,
            duration_ms = stats.duration_ms,
            "Archive run complete"
        );

        Ok(RunReport {
            run_id: ctx.run_id,
            dry_run: self.config.dry_run,
            stats,
            files,
            scan_errors,
        })
    }

    /// Create the destination root and return its canonical path
    fn prepare_destination(&self) -> Result<PathBuf, ArchiveError> {
        let destination = &self.config.destination;
        let unusable = |reason: String| ArchiveError::Destination {
            path: destination.clone(),
            reason,
        };

        if destination.as_os_str().is_empty() {
            return Err(ArchiveError::Config("destination root is not set".into()));
        }
        if self.config.dry_run && !destination.exists() {
            return Ok(destination.clone());
        }
        if !self.config.dry_run {
            fs::create_dir_all(destination).map_err(|e| unusable(e.to_string()))?;
        }
        let canonical = fs::canonicalize(destination).map_err(|e| unusable(e.to_string()))?;
        if !canonical.is_dir() {
            return Err(unusable("not a directory".into()));
        }
        Ok(canonical)
    }

    /// Run `op` on a dedicated pool when a worker count is configured
    fn in_pool<T, F>(&self, op: F) -> Result<T, ArchiveError>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        match self.config.workers {
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers.max(1))
                    .build()
                    .map_err(|e| ArchiveError::Config(format!("worker pool: {e}")))?;
                Ok(pool.install(op))
            }
            None => Ok(op()),
        }
    }

    fn analyze(&self, file: SourceFile) -> Analysis {
        let fingerprint = fingerprint_file(&file.path);

        let resolution = match &fingerprint {
            Err(e) => {
                debug!(path = %file.path.display(), "Unreadable: {e}");
                None
            }
            Ok(fingerprint) => {
                let archived_here = matches!(
                    self.inventory.lookup(fingerprint),
                    Ok(Some(ref record)) if record.source == file.path
                );
                (!archived_here).then(|| self.resolver.resolve(&file))
            }
        };

        Analysis {
            file,
            fingerprint,
            resolution,
        }
    }

    /// Files sharing one fingerprint, earliest first. The first unseen one becomes the original.
    fn process_group(
        &self,
        fingerprint: Fingerprint,
        group: Vec<Analysis>,
        ctx: &RunContext<'_>,
    ) -> Result<Vec<FileReport>, ArchiveError> {
        let mut reports = Vec::with_capacity(group.len());
        // Dry runs commit nothing; the group's would-be record lives here instead
        let mut planned = None;
        for analysis in group {
            let outcome = self.process_file(fingerprint, &analysis, &mut planned, ctx)?;
            reports.push(ctx.finish(&analysis.file, outcome));
        }
        Ok(reports)
    }

    fn process_file(
        &self,
        fingerprint: Fingerprint,
        analysis: &Analysis,
        planned: &mut Option<InventoryRecord>,
        ctx: &RunContext<'_>,
    ) -> Result<FileOutcome, ArchiveError> {
        let file = &analysis.file;
        let seen = match self.inventory.lookup(&fingerprint)? {
            Some(record) => Some(record),
            None => planned.clone(),
        };

        if let Some(record) = seen.as_ref().filter(|r| r.source == file.path) {
            return Ok(FileOutcome::AlreadyArchived {
                destination: record.destination.clone(),
            });
        }

        let resolution = match &analysis.resolution {
            Some(resolution) => resolution.clone(),
            None => self.resolver.resolve(file),
        };
        let route = self.router.route(file.file_name(), &resolution, seen.as_ref());

        let (date, record) = match (resolution, route.classification, seen) {
            (DateResolution::Unresolved { failures }, _, _) => {
                let reason = format!("no plausible capture date ({})", failures.join("; "));
                return Ok(self.quarantine_file(file, reason, ctx));
            }
            (DateResolution::Resolved(date), Classification::Duplicate, Some(record)) => {
                (date, Some(record))
            }
            (DateResolution::Resolved(date), _, _) => (date, None),
        };
        ctx.stats.record_date_origin(date.origin);

        match record {
            Some(record) => Ok(self.place_duplicate(file, &route, &record, date, ctx)),
            None => self.place_original(file, &route, fingerprint, date, planned, ctx),
        }
    }

    fn place_original(
        &self,
        file: &SourceFile,
        route: &Route,
        fingerprint: Fingerprint,
        date: CaptureDate,
        planned: &mut Option<InventoryRecord>,
        ctx: &RunContext<'_>,
    ) -> Result<FileOutcome, ArchiveError> {
        let placement = match self.place_with_retry(file, route, ctx) {
            Ok(placement) => placement,
            Err(e) => return Ok(self.quarantine_file(file, e.to_string(), ctx)),
        };

        let (destination, outcome) = match placement {
            Placement::Written { path, bytes } => {
                ctx.stats.record_bytes(bytes);
                (path, RecordOutcome::Placed)
            }
            Placement::AlreadyPresent { path } => {
                info!(path = %path.display(), "Recovered unrecorded copy from an earlier run");
                (path, RecordOutcome::Recovered)
            }
        };

        let record = InventoryRecord {
            fingerprint,
            date,
            destination: destination.clone(),
            source: file.path.clone(),
            outcome,
            recorded_at: Utc::now(),
            run_id: ctx.run_id,
        };
        if self.config.dry_run {
            *planned = Some(record);
        } else {
            // Last step for this file: the record only exists once the bytes do
            self.inventory.commit(record)?;
        }

        Ok(match outcome {
            RecordOutcome::Placed => FileOutcome::Original { destination, date },
            RecordOutcome::Recovered => FileOutcome::Recovered { destination, date },
        })
    }

    fn place_duplicate(
        &self,
        file: &SourceFile,
        route: &Route,
        record: &InventoryRecord,
        date: CaptureDate,
        ctx: &RunContext<'_>,
    ) -> FileOutcome {
        if self.config.verify_duplicates {
            // A planned original is not on disk yet; its source holds the same bytes
            let canonical = if self.config.dry_run && !record.destination.exists() {
                &record.source
            } else {
                &record.destination
            };
            match files_identical(&file.path, canonical) {
                Ok(true) => {}
                Ok(false) => return self.place_collision(file, record, date, ctx),
                Err(e) => debug!(
                    canonical = %record.destination.display(),
                    "Canonical copy unavailable, trusting inventory: {e}"
                ),
            }
        }

        if self.config.duplicate_action == DuplicateAction::Skip {
            return FileOutcome::Duplicate {
                destination: None,
                original: record.destination.clone(),
                date,
            };
        }

        match self.place_with_retry(file, route, ctx) {
            Ok(Placement::Written { path, bytes }) => {
                ctx.stats.record_bytes(bytes);
                FileOutcome::Duplicate {
                    destination: Some(path),
                    original: record.destination.clone(),
                    date,
                }
            }
            Ok(Placement::AlreadyPresent { path }) if ctx.written_this_run(&path) => {
                FileOutcome::Duplicate {
                    destination: Some(path),
                    original: record.destination.clone(),
                    date,
                }
            }
            Ok(Placement::AlreadyPresent { path }) => FileOutcome::AlreadyArchived { destination: path },
            Err(e) => self.quarantine_file(file, e.to_string(), ctx),
        }
    }

    /// Same fingerprint, different bytes: keep it as an original, unrecorded
    fn place_collision(
        &self,
        file: &SourceFile,
        record: &InventoryRecord,
        date: CaptureDate,
        ctx: &RunContext<'_>,
    ) -> FileOutcome {
        warn!(
            path = %file.path.display(),
            canonical = %record.destination.display(),
            fingerprint = %record.fingerprint,
            "Fingerprint collision: content differs from the archived file"
        );

        let route = self.router.original(file.file_name(), &date);
        match self.place_with_retry(file, &route, ctx) {
            Ok(Placement::Written { path, bytes }) => {
                ctx.stats.record_bytes(bytes);
                FileOutcome::Collision {
                    destination: path,
                    canonical: record.destination.clone(),
                    date,
                }
            }
            Ok(Placement::AlreadyPresent { path }) if ctx.written_this_run(&path) => {
                FileOutcome::Collision {
                    destination: path,
                    canonical: record.destination.clone(),
                    date,
                }
            }
            Ok(Placement::AlreadyPresent { path }) => FileOutcome::AlreadyArchived { destination: path },
            Err(e) => self.quarantine_file(file, e.to_string(), ctx),
        }
    }

    /// Copy into the quarantine bucket. Never fails; a failed copy is noted in the reason.
    fn quarantine_file(&self, file: &SourceFile, reason: String, ctx: &RunContext<'_>) -> FileOutcome {
        debug!(path = %file.path.display(), "Quarantining: {reason}");
        let route = self.router.quarantine(file.file_name());

        match self.place_with_retry(file, &route, ctx) {
            Ok(Placement::Written { path, bytes }) => {
                ctx.stats.record_bytes(bytes);
                FileOutcome::Quarantined {
                    destination: Some(path),
                    reason,
                }
            }
            Ok(Placement::AlreadyPresent { path }) if ctx.written_this_run(&path) => {
                FileOutcome::Quarantined {
                    destination: Some(path),
                    reason,
                }
            }
            Ok(Placement::AlreadyPresent { path }) => FileOutcome::AlreadyArchived { destination: path },
            Err(e) => {
                error!(path = %file.path.display(), "Could not copy into quarantine: {e}");
                FileOutcome::Quarantined {
                    destination: None,
                    reason: format!("{reason}; quarantine copy failed: {e}"),
                }
            }
        }
    }

    /// One retry, then give up
    fn place_with_retry(
        &self,
        file: &SourceFile,
        route: &Route,
        ctx: &RunContext<'_>,
    ) -> Result<Placement, PlacementError> {
        if self.config.dry_run {
            // Held across the preview so two files cannot claim one slot
            let mut claimed = ctx.written.lock().map_err(|_| PlacementError::Copy {
                from: file.path.clone(),
                to: route.preferred(),
                source: std::io::Error::other("dry-run plan lock poisoned"),
            })?;
            let placement = preview(&file.path, route, &claimed)?;
            if let Placement::Written { ref path, .. } = placement {
                claimed.insert(path.clone(), file.path.clone());
            }
            return Ok(placement);
        }
        let placement = place(&file.path, route, file.modified).or_else(|e| {
            warn!(path = %file.path.display(), "Placement failed, retrying once: {e}");
            ctx.stats.record_retry();
            place(&file.path, route, file.modified)
        })?;
        if let Placement::Written { ref path, .. } = placement {
            ctx.note_written(path, &file.path);
        }
        Ok(placement)
    }
}
