//! Project discovery and change detection.
//!
//! Discovery lists every indexable file under the project root. A detector
//! then narrows that list to the files whose content differs from the
//! ledger. Git narrows the candidate set cheaply; every candidate is still
//! confirmed against its stored fingerprint, so a pass over an unchanged tree
//! reports nothing regardless of which detector ran.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ignore::WalkBuilder;

use crate::error::ChangeDetectionError;
use crate::languages::is_indexable;
use crate::state::{FileState, IndexState, normalize_path};

/// Files present on disk, keyed by normalized project-relative path.
pub type ProjectFiles = BTreeMap<String, PathBuf>;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub respect_gitignore: bool,
    pub include_hidden: bool,
    /// Larger files are skipped.
    pub max_file_bytes: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_bytes: 1024 * 1024,
        }
    }
}

/// Walk `root` and collect indexable files.
#[must_use]
pub fn discover_files(root: &Path, config: &DiscoveryConfig) -> ProjectFiles {
    let walker = WalkBuilder::new(root)
        .hidden(!config.include_hidden)
        .git_ignore(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .ignore(config.respect_gitignore)
        .require_git(false)
        .build();

    let mut files = ProjectFiles::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if !is_indexable(path) {
            continue;
        }
        if let Ok(meta) = entry.metadata()
            && meta.len() > config.max_file_bytes
        {
            tracing::debug!(file = %path.display(), bytes = meta.len(), "skipping oversized file");
            continue;
        }
        files.insert(normalize_path(root, path), path.to_path_buf());
    }
    files
}

/// blake3 hex digest used as the file fingerprint.
#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Files modified this recently are never trusted by mtime alone.
const RACY_WINDOW_MS: u64 = 2_000;

#[must_use]
pub fn modified_ms(meta: &std::fs::Metadata) -> Option<u64> {
    let elapsed = meta.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(elapsed.as_millis()).ok()
}

/// mtime worth recording in the ledger, or `None` while it is still inside
/// the racy window: a rewrite within the same clock tick would otherwise
/// keep the recorded mtime and be skipped.
#[must_use]
pub fn settled_modified_ms(meta: &std::fs::Metadata) -> Option<u64> {
    let modified = modified_ms(meta)?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let now = u64::try_from(now.as_millis()).ok()?;
    (now.saturating_sub(modified) >= RACY_WINDOW_MS).then_some(modified)
}

/// Outcome of change detection for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Revision the pass corresponds to; `None` outside version control.
    pub revision: Option<String>,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Computes what changed since the ledger was last written.
pub trait ChangeDetector: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when this detector cannot operate on `root`; callers
    /// are expected to fall back to another detector.
    fn detect(
        &self,
        root: &Path,
        state: &IndexState,
        present: &ProjectFiles,
    ) -> impl Future<Output = Result<ChangeSet, ChangeDetectionError>> + Send;
}

/// Compares every present file against its stored fingerprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintChangeDetector;

impl FingerprintChangeDetector {
    #[must_use]
    pub fn scan(self, state: &IndexState, present: &ProjectFiles) -> ChangeSet {
        classify_candidates(state, present, present.keys())
    }
}

impl ChangeDetector for FingerprintChangeDetector {
    async fn detect(
        &self,
        _root: &Path,
        state: &IndexState,
        present: &ProjectFiles,
    ) -> Result<ChangeSet, ChangeDetectionError> {
        Ok(self.scan(state, present))
    }
}

/// Uses the `git` CLI to limit fingerprint checks to files git reports as
/// touched since the last indexed revision, plus files whose mtime no longer
/// matches the ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitChangeDetector;

impl GitChangeDetector {
    async fn git(root: &Path, args: &[&str]) -> Result<String, ChangeDetectionError> {
        let output = tokio::process::Command::new("git")
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .current_dir(root)
            .output()
            .await
            .map_err(ChangeDetectionError::GitUnavailable)?;
        if !output.status.success() {
            return Err(ChangeDetectionError::GitFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Paths git reports as touched since `prev`: committed and uncommitted
    /// edits plus untracked files.
    async fn changed_since(root: &Path, prev: &str) -> Result<Vec<String>, ChangeDetectionError> {
        let diff = Self::git(root, &["diff", "--name-only", "--relative", prev]).await?;
        let untracked = Self::git(root, &["ls-files", "--others", "--exclude-standard"]).await?;
        Ok(diff
            .lines()
            .chain(untracked.lines())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

impl ChangeDetector for GitChangeDetector {
    async fn detect(
        &self,
        root: &Path,
        state: &IndexState,
        present: &ProjectFiles,
    ) -> Result<ChangeSet, ChangeDetectionError> {
        let revision = Self::git(root, &["rev-parse", "HEAD"]).await?.trim().to_owned();

        let mut candidates = BTreeSet::new();
        match state.last_revision.as_deref() {
            None => candidates.extend(present.keys().cloned()),
            Some(prev) => match Self::changed_since(root, prev).await {
                Ok(paths) => {
                    candidates.extend(paths);
                    // Files git cannot see as changed, such as an indexed
                    // edit that was later reverted, still show a new mtime.
                    candidates.extend(
                        present
                            .iter()
                            .filter(|(path, abs)| {
                                state.file(path).is_none_or(|entry| stat_differs(abs, entry))
                            })
                            .map(|(path, _)| path.clone()),
                    );
                }
                Err(e) => {
                    // A full scan is authoritative, so the pass can still
                    // record HEAD and later passes diff against it.
                    tracing::warn!(revision = %prev, error = %e, "cannot diff against indexed revision, comparing all fingerprints");
                    candidates.extend(present.keys().cloned());
                }
            },
        }

        tracing::debug!(revision = %revision, candidates = candidates.len(), "git change candidates");
        let mut changes = classify_candidates(state, present, candidates.iter());
        changes.revision = Some(revision);
        Ok(changes)
    }
}

/// Detector selected from configuration; revision-based detection falls
/// back to fingerprint comparison when git cannot be used.
#[derive(Debug, Clone, Copy)]
pub enum AnyChangeDetector {
    Git(GitChangeDetector),
    Fingerprint(FingerprintChangeDetector),
}

impl AnyChangeDetector {
    #[must_use]
    pub fn new(use_git: bool) -> Self {
        if use_git {
            Self::Git(GitChangeDetector)
        } else {
            Self::Fingerprint(FingerprintChangeDetector)
        }
    }

    pub async fn detect(&self, root: &Path, state: &IndexState, present: &ProjectFiles) -> ChangeSet {
        match self {
            Self::Git(git) => match git.detect(root, state, present).await {
                Ok(changes) => changes,
                Err(e) => {
                    tracing::warn!(error = %e, "revision-based change detection unavailable, comparing fingerprints");
                    FingerprintChangeDetector.scan(state, present)
                }
            },
            Self::Fingerprint(fp) => fp.scan(state, present),
        }
    }
}

fn classify_candidates<'a>(
    state: &IndexState,
    present: &ProjectFiles,
    candidates: impl IntoIterator<Item = &'a String>,
) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for path in candidates {
        let Some(abs) = present.get(path) else {
            continue;
        };
        match state.file(path) {
            None => changes.added.push(path.clone()),
            Some(prev) => match content_changed(abs, prev) {
                Ok(true) => changes.modified.push(path.clone()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(file = %path, error = %e, "cannot fingerprint file, treating as unchanged");
                }
            },
        }
    }
    changes.deleted = state
        .files
        .keys()
        .filter(|path| !present.contains_key(*path))
        .cloned()
        .collect();
    changes
}

/// Whether the recorded mtime no longer vouches for the file.
fn stat_differs(abs: &Path, prev: &FileState) -> bool {
    prev.modified.is_none()
        || std::fs::metadata(abs).map_or(true, |meta| modified_ms(&meta) != prev.modified)
}

fn content_changed(abs: &Path, prev: &FileState) -> std::io::Result<bool> {
    let meta = std::fs::metadata(abs)?;
    if prev.modified.is_some() && modified_ms(&meta) == prev.modified {
        return Ok(false);
    }
    let bytes = std::fs::read(abs)?;
    Ok(fingerprint_bytes(&bytes) != prev.fingerprint)
}
