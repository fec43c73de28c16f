//! `$PROJECT_DIR$` tokenising for file locations.

use std::path::{Component, Path, PathBuf};

use crate::project::Project;

/// Placeholder for the project root in stored paths.
pub const PROJECT_DIR_TOKEN: &str = "$PROJECT_DIR$";

/// Replace a leading project root with [`PROJECT_DIR_TOKEN`].
pub fn tokenise(project: &Project, path: &str) -> String {
    let path = path.trim();
    if path.starts_with(PROJECT_DIR_TOKEN) {
        return normalise_separators(path);
    }
    match project.root().and_then(|root| Path::new(path).strip_prefix(root).ok()) {
        Some(rest) => join_token(rest),
        None => normalise_separators(path),
    }
}

/// Replace [`PROJECT_DIR_TOKEN`] with the project root.
///
/// Without a known root the token resolves against the current directory.
pub fn detokenise(project: &Project, raw: &str) -> PathBuf {
    match raw.strip_prefix(PROJECT_DIR_TOKEN) {
        Some(rest) => {
            let root = project.root().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
            let rest = rest.trim_start_matches(['/', '\\']);
            if rest.is_empty() {
                root
            } else {
                root.join(rest)
            }
        }
        None => PathBuf::from(raw),
    }
}

/// Stored form of a project-relative location.
///
/// Absolute paths are made relative to the project root, climbing out of it
/// with `..` segments when they lie elsewhere.
pub fn project_relative(project: &Project, path: &str) -> String {
    let path = path.trim();
    if path.starts_with(PROJECT_DIR_TOKEN) {
        return normalise_separators(path);
    }
    let candidate = Path::new(path);
    match project.root() {
        Some(root) if candidate.is_absolute() => match relative_path(root, candidate) {
            Some(relative) => join_token(&relative),
            None => normalise_separators(path),
        },
        Some(_) => join_token(candidate),
        None => normalise_separators(path),
    }
}

/// Path of `target` relative to `base`; both must be absolute.
pub fn relative_path(base: &Path, target: &Path) -> Option<PathBuf> {
    if !base.is_absolute() || !target.is_absolute() {
        return None;
    }
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = target.components().collect();
    if base.first() != target.first() {
        return None;
    }

    let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();
    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component.as_os_str());
    }
    Some(relative)
}

fn join_token(rest: &Path) -> String {
    let parts: Vec<String> = rest.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    if parts.is_empty() {
        PROJECT_DIR_TOKEN.to_string()
    } else {
        format!("{}/{}", PROJECT_DIR_TOKEN, parts.join("/"))
    }
}

fn normalise_separators(path: &str) -> String {
    if cfg!(windows) {
        path.replace('\\', "/")
    } else {
        path.to_string()
    }
}
