//! File scanning on a worker pool.
//!
//! A scan checks a list of files with one compiled checker inside the
//! context it was built in. Workers pull files from a shared queue and check
//! the [`CancellationToken`] before each one; results are only returned once
//! every worker has finished, so a cancelled or timed-out scan publishes
//! nothing.

mod problem;

pub use problem::{Problem, Severity};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::checker::{CompiledChecker, IdentityGuard};
use crate::config::ScanConfig;
use crate::context::ExecutionContext;
use crate::error::{ContextMixError, HostError, HostResult};

/// Options for one scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Tab stop width for column numbers
    pub tab_width: usize,
    /// Worker threads
    pub workers: usize,
    /// Abandon the scan after this long
    pub timeout: Option<Duration>,
    /// Leave unreadable files out of the result
    pub suppress_errors: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for ScanOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            tab_width: config.tab_width,
            workers: config.worker_count(),
            timeout: config.timeout(),
            suppress_errors: config.suppress_errors,
        }
    }
}

/// Cooperative cancellation shared between a caller and running scans.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<(Instant, Duration)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also fires once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(timeout)
    }

    /// Same cancellation flag, with a deadline no later than `timeout` from now.
    #[must_use]
    pub fn with_deadline(&self, timeout: Duration) -> Self {
        let candidate = (Instant::now() + timeout, timeout);
        let deadline = match self.deadline {
            Some(existing) if existing.0 <= candidate.0 => existing,
            _ => candidate,
        };
        Self { cancelled: Arc::clone(&self.cancelled), deadline: Some(deadline) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err` once cancelled or past the deadline.
    pub fn check(&self) -> HostResult<()> {
        if self.is_cancelled() {
            return Err(HostError::Cancelled);
        }
        match self.deadline {
            Some((at, timeout)) if Instant::now() >= at => Err(HostError::TimedOut(timeout.as_secs())),
            _ => Ok(()),
        }
    }
}

/// A file that could not be checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of a completed scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    /// Problems per file; files without problems are absent
    pub problems: BTreeMap<PathBuf, Vec<Problem>>,
    pub failures: Vec<FileFailure>,
    pub files_scanned: usize,
}

impl ScanResult {
    pub fn problem_count(&self) -> usize {
        self.problems.values().map(Vec::len).sum()
    }

    /// Whether any problem has error severity.
    pub fn has_errors(&self) -> bool {
        self.problems.values().flatten().any(|p| p.severity == Severity::Error)
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: ScanResult) {
        for (path, problems) in other.problems {
            let entry = self.problems.entry(path).or_default();
            entry.extend(problems);
            entry.sort_by_key(|p| (p.line, p.column));
        }
        self.failures.extend(other.failures);
        self.files_scanned = self.files_scanned.max(other.files_scanned);
    }
}

enum FileOutcome {
    Problems(PathBuf, Vec<Problem>),
    Failed(FileFailure),
}

/// Runs compiled checkers over files.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    options: ScanOptions,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Check `files` with `checker` inside `context`.
    ///
    /// The checker must have been built in `context`; anything else is a
    /// [`ContextMixError`] before a single file is read.
    pub fn scan(
        &self,
        context: &ExecutionContext,
        checker: &CompiledChecker,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> HostResult<ScanResult> {
        IdentityGuard::verify(checker, context)?;

        let token = match self.options.timeout {
            Some(timeout) => cancel.with_deadline(timeout),
            None => cancel.clone(),
        };
        token.check()?;

        let started = Instant::now();
        let workers = self.options.workers.clamp(1, files.len().max(1));
        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<FileOutcome>();

        let worker_results: Vec<HostResult<()>> = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let tx = tx.clone();
                    let (next, stop, token) = (&next, &stop, &token);
                    s.spawn(move || {
                        let result = self.work(context, checker, files, next, stop, token, &tx);
                        if result.is_err() {
                            stop.store(true, Ordering::SeqCst);
                        }
                        result
                    })
                })
                .collect();
            drop(tx);
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        if let Some(err) = worker_results.into_iter().find_map(Result::err) {
            tracing::warn!(error = %err, checker = %checker.location(), "Scan abandoned");
            return Err(err);
        }

        let mut result = ScanResult { files_scanned: files.len(), ..ScanResult::default() };
        for outcome in rx {
            match outcome {
                FileOutcome::Problems(path, problems) => {
                    if !problems.is_empty() {
                        result.problems.insert(path, problems);
                    }
                }
                FileOutcome::Failed(failure) => result.failures.push(failure),
            }
        }
        result.failures.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!(
            files = result.files_scanned,
            problems = result.problem_count(),
            failures = result.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan complete"
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn work(
        &self,
        context: &ExecutionContext,
        checker: &CompiledChecker,
        files: &[PathBuf],
        next: &AtomicUsize,
        stop: &AtomicBool,
        token: &CancellationToken,
        tx: &mpsc::Sender<FileOutcome>,
    ) -> HostResult<()> {
        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(());
            }
            token.check()?;

            let index = next.fetch_add(1, Ordering::SeqCst);
            let Some(path) = files.get(index) else {
                return Ok(());
            };

            let content = match read_source(path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Unable to read file");
                    if !self.options.suppress_errors {
                        let failure = FileFailure { path: path.clone(), message: e.to_string() };
                        let _ = tx.send(FileOutcome::Failed(failure));
                    }
                    continue;
                }
            };

            let problems = context
                .engine()
                .check(checker.object(), path, &content, self.options.tab_width)
                .map_err(|foreign| {
                    ContextMixError::new(foreign.origin, checker.generation(), foreign.engine, context.generation())
                })?;
            let _ = tx.send(FileOutcome::Problems(path.clone(), problems));
        }
    }
}

/// File content as text; invalid UTF-8 is replaced rather than rejected.
fn read_source(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}
