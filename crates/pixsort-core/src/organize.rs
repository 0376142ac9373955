//! The run itself: count, process file by file, clean up.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::cleanup::{self, ProtectedPaths};
use crate::config::{OrganizeOptions, TransferMode};
use crate::error::{OrganizeError, TransferError};
use crate::geo::{GeoResolver, Place};
use crate::layout::{PathBuilder, Subject};
use crate::media::MediaKind;
use crate::metadata::MetadataExtractor;
use crate::naming::NameBuilder;
use crate::writer::{self, Transferred};
use crate::{
    paths, scan, CancellationToken, Context, EventCallback, LogLevel, ProcessControl, Reporter,
    RunOutcome, RunSummary, TransferResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Counting,
    Processing,
    Cleaning,
    Done,
    Cancelled,
}

enum FileOutcome {
    Success,
    Failed,
    Cancelled,
}

/// Where files of this run end up.
enum Target {
    /// Classified under a separate destination root.
    Destination(PathBuf),
    /// Classified below each source folder (or renamed next to itself).
    InPlace,
    /// Everything gathered, unrenamed, into one bucket directory.
    Flat(PathBuf),
}

pub(crate) fn run(
    options: &OrganizeOptions,
    context: &Context,
    control: &ProcessControl,
    callback: &EventCallback,
) -> Result<RunSummary, OrganizeError> {
    let reporter = Reporter::new(callback);
    let token = control.cancel_token.clone().unwrap_or_default();

    if let Err(e) = options.validate() {
        reporter.log(LogLevel::Error, format!("invalid configuration: {e}"));
        return Err(e.into());
    }
    if let Some(destination) = &options.destination {
        for folder in &options.folders {
            if paths::is_within(destination, &folder.path) {
                reporter.log(
                    LogLevel::Error,
                    format!(
                        "destination {} is inside source folder {}; nothing was done",
                        destination.display(),
                        folder.path.display()
                    ),
                );
                return Err(OrganizeError::DestinationInsideSource {
                    destination: destination.clone(),
                    source_folder: folder.path.clone(),
                });
            }
        }
    }

    let mut run = Run::new(options, context, &token, &reporter);
    let summary = run.execute();
    if let Some(store) = &context.geocode_store {
        if let Err(e) = store.flush() {
            reporter.log(LogLevel::Warning, format!("could not save geocode cache: {e}"));
        }
    }
    reporter.finished(summary.clone());
    Ok(summary)
}

struct Run<'a> {
    options: &'a OrganizeOptions,
    token: &'a CancellationToken,
    reporter: &'a Reporter<'a>,
    target: Target,
    extractor: MetadataExtractor<'a>,
    geo: GeoResolver<'a>,
    paths: PathBuilder<'a>,
    names: NameBuilder<'a>,
    mode: TransferMode,
    stage: Stage,
    counts: TransferResult,
    /// Source directories files were moved out of.
    touched: HashSet<PathBuf>,
}

impl<'a> Run<'a> {
    fn new(
        options: &'a OrganizeOptions,
        context: &'a Context,
        token: &'a CancellationToken,
        reporter: &'a Reporter<'a>,
    ) -> Self {
        let target = match &options.destination {
            Some(destination) => Target::Destination(destination.clone()),
            None if options.is_flat_extraction() => {
                // validate() guarantees at least one folder
                let first = &options.folders[0].path;
                Target::Flat(first.join(&options.labels.flat_bucket))
            }
            None => Target::InPlace,
        };
        // Flat extraction duplicates; it never moves originals.
        let mode = match target {
            Target::Flat(_) => TransferMode::Copy,
            _ => options.mode,
        };
        Self {
            options,
            token,
            reporter,
            target,
            extractor: MetadataExtractor::new(context.exiftool.as_ref(), options.time_policy),
            geo: GeoResolver::new(context.boundaries.as_deref(), context.geocode_store.as_deref()),
            paths: PathBuilder::new(options.effective_levels(), &options.labels),
            names: NameBuilder::new(&options.name_tags, options.separator, &options.labels),
            mode,
            stage: Stage::Idle,
            counts: TransferResult::default(),
            touched: HashSet::new(),
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!(from = ?self.stage, to = ?stage, "stage");
        self.stage = stage;
    }

    fn execute(&mut self) -> RunSummary {
        if self.token.is_cancelled() {
            return self.cancelled();
        }

        self.enter(Stage::Counting);
        let Some(batches) = self.count() else {
            return self.cancelled();
        };
        self.counts.total_count = batches.iter().map(|(_, files)| files.len() as u64).sum();
        self.reporter.log(
            LogLevel::Info,
            format!(
                "found {} files in {} folders",
                self.counts.total_count,
                self.options.folders.len()
            ),
        );
        if self.options.uses_geography() && !self.geo.has_boundaries() {
            self.reporter.log(
                LogLevel::Warning,
                "no boundary datasets configured, locations will be unknown",
            );
        }

        self.enter(Stage::Processing);
        self.reporter.progress(0);
        for (root, files) in &batches {
            if self.token.is_cancelled() {
                return self.cancelled();
            }
            tracing::info!(folder = %root.display(), files = files.len(), "processing folder");
            for file in files {
                if self.token.is_cancelled() {
                    return self.cancelled();
                }
                match self.process_file(root, file) {
                    FileOutcome::Success => self.counts.success_count += 1,
                    FileOutcome::Failed => self.counts.fail_count += 1,
                    FileOutcome::Cancelled => return self.cancelled(),
                }
                self.counts.processed_count += 1;
                self.reporter.progress(self.percent());
            }
        }

        let mut removed_dirs = 0;
        if matches!(self.target, Target::InPlace) && self.mode == TransferMode::Move {
            self.enter(Stage::Cleaning);
            let roots: Vec<PathBuf> = self.options.folders.iter().map(|f| f.path.clone()).collect();
            let protected = ProtectedPaths::from_environment(&roots);
            removed_dirs = cleanup::cleanup(&self.touched, &roots, &protected, self.reporter);
            if removed_dirs > 0 {
                self.reporter
                    .log(LogLevel::Info, format!("removed {removed_dirs} empty folders"));
            }
        }

        self.enter(Stage::Done);
        if self.options.uses_geography() {
            self.reporter.log(
                LogLevel::Debug,
                format!("resolved {} distinct locations", self.geo.cached()),
            );
        }
        self.reporter.progress(100);
        self.reporter.log(
            LogLevel::Info,
            format!(
                "done: {} processed, {} succeeded, {} failed",
                self.counts.processed_count, self.counts.success_count, self.counts.fail_count
            ),
        );
        RunSummary {
            outcome: RunOutcome::Completed,
            counts: self.counts,
            removed_dirs,
        }
    }

    /// Below 100 until the run is complete.
    fn percent(&self) -> u8 {
        if self.counts.total_count == 0 {
            return 0;
        }
        let percent = self.counts.processed_count * 100 / self.counts.total_count;
        percent.min(99) as u8
    }

    fn cancelled(&mut self) -> RunSummary {
        self.enter(Stage::Cancelled);
        self.reporter.log(
            LogLevel::Warning,
            format!(
                "cancelled after {} of {} files",
                self.counts.processed_count, self.counts.total_count
            ),
        );
        RunSummary {
            outcome: RunOutcome::Cancelled,
            counts: self.counts,
            removed_dirs: 0,
        }
    }

    /// Walk every folder once. A file reachable from two folders is only
    /// listed under the first.
    fn count(&self) -> Option<Vec<(PathBuf, Vec<PathBuf>)>> {
        let exclude = match &self.target {
            Target::Flat(bucket) => Some(bucket.as_path()),
            _ => None,
        };
        let mut seen = HashSet::new();
        let mut batches = Vec::with_capacity(self.options.folders.len());
        for folder in &self.options.folders {
            if self.token.is_cancelled() {
                return None;
            }
            let files = scan::list_files(folder, exclude, self.token, self.reporter).ok()?;
            let files: Vec<PathBuf> = files
                .into_iter()
                .filter(|f| seen.insert(paths::resolve(f)))
                .collect();
            batches.push((folder.path.clone(), files));
        }
        Some(batches)
    }

    fn process_file(&mut self, root: &Path, file: &Path) -> FileOutcome {
        let record = match self.extractor.extract(file, self.token, self.reporter) {
            Ok(record) => record,
            Err(e) => {
                self.reporter
                    .log(LogLevel::Error, format!("cannot read {}: {}", file.display(), e));
                return FileOutcome::Failed;
            }
        };
        let kind = MediaKind::detect(file);
        let place = match record.coordinates() {
            Some((lat, lon)) if self.options.uses_geography() => self.geo.resolve(lat, lon),
            _ => Place::default(),
        };
        let subject = Subject {
            record: &record,
            place: &place,
            kind,
            original: file,
        };

        let target_dir = match &self.target {
            Target::Destination(destination) => self.paths.build(destination, &subject),
            Target::Flat(bucket) => bucket.clone(),
            Target::InPlace if !self.options.effective_levels().is_empty() => {
                self.paths.build(root, &subject)
            }
            Target::InPlace => file.parent().unwrap_or(root).to_path_buf(),
        };
        let stem = match self.target {
            Target::Flat(_) => subject.original_stem(),
            _ => self.names.build(&subject),
        };
        let extension = file.extension().map(|e| e.to_string_lossy().into_owned());

        match writer::transfer(file, &target_dir, &stem, extension.as_deref(), self.mode, self.token) {
            Ok(Transferred::Written(target)) => {
                self.reporter.log(
                    LogLevel::Debug,
                    format!("{} -> {}", file.display(), target.display()),
                );
                if self.mode == TransferMode::Move {
                    if let Some(parent) = file.parent() {
                        self.touched.insert(parent.to_path_buf());
                    }
                }
                FileOutcome::Success
            }
            Ok(Transferred::InPlace) => {
                self.reporter
                    .log(LogLevel::Debug, format!("{} already in place", file.display()));
                FileOutcome::Success
            }
            Err(TransferError::Cancelled) => FileOutcome::Cancelled,
            Err(e) => {
                self.reporter.log(
                    LogLevel::Error,
                    format!("failed to transfer {}: {}", file.display(), e),
                );
                FileOutcome::Failed
            }
        }
    }
}
