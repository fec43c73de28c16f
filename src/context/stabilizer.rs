//! Extra-classpath stabilisation.
//!
//! Artifacts that live inside the project tree can be rebuilt while an engine
//! context still reads them. When enabled, such entries are copied into a
//! private directory and the copies are used instead.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Longest flattened name kept readable; longer names are hashed.
const MAX_NAME_LEN: usize = 50;

/// Copies project-internal classpath entries to a stable location.
#[derive(Debug, Clone)]
pub struct ClasspathStabilizer {
    project_root: PathBuf,
    copy_dir: PathBuf,
}

impl ClasspathStabilizer {
    pub fn new(project_root: impl Into<PathBuf>, copy_dir: impl Into<PathBuf>) -> Self {
        Self { project_root: project_root.into(), copy_dir: copy_dir.into() }
    }

    /// Replace project-internal file entries with stable copies.
    ///
    /// Entries outside the project, directories and entries that fail to copy
    /// are returned unchanged.
    pub fn stabilize(&self, entries: &[PathBuf]) -> Vec<PathBuf> {
        entries
            .iter()
            .map(|entry| match self.stabilize_entry(entry) {
                Ok(Some(copy)) => copy,
                Ok(None) => entry.clone(),
                Err(e) => {
                    tracing::warn!(entry = %entry.display(), error = %e, "Failed to stabilise classpath entry");
                    entry.clone()
                }
            })
            .collect()
    }

    fn stabilize_entry(&self, entry: &Path) -> std::io::Result<Option<PathBuf>> {
        if !entry.is_file() {
            return Ok(None);
        }
        let Ok(relative) = entry.strip_prefix(&self.project_root) else {
            return Ok(None);
        };

        let target = self.copy_dir.join(target_name(relative));
        if needs_update(entry, &target)? {
            fs::create_dir_all(&self.copy_dir)?;
            fs::copy(entry, &target)?;
            tracing::debug!(from = %entry.display(), to = %target.display(), "Copied classpath entry");
        }
        Ok(Some(target))
    }
}

fn target_name(relative: &Path) -> String {
    let flattened: String = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_");

    if flattened.len() <= MAX_NAME_LEN {
        return flattened;
    }

    let mut hasher = Sha256::new();
    hasher.update(flattened.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    match relative.extension() {
        Some(ext) => format!("{}.{}", &digest[..32], ext.to_string_lossy()),
        None => digest[..32].to_string(),
    }
}

fn needs_update(source: &Path, target: &Path) -> std::io::Result<bool> {
    let Ok(existing) = fs::metadata(target) else {
        return Ok(true);
    };
    let original = fs::metadata(source)?;
    if existing.len() != original.len() {
        return Ok(true);
    }
    match (original.modified(), existing.modified()) {
        (Ok(source_time), Ok(target_time)) => Ok(source_time > target_time),
        _ => Ok(true),
    }
}
