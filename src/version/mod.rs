//! Engine version registry.
//!
//! Answers which engine versions this build can host, which one is the
//! default, and how identifiers from older settings map onto supported ones.

mod manifest;
mod ordering;

pub use manifest::{VersionManifest, EMBEDDED_MANIFEST};
pub use ordering::{compare_versions, SupportedVersion};

use std::path::{Path, PathBuf};

use crate::error::{HostError, HostResult};

/// Read-only view over a validated [`VersionManifest`].
#[derive(Debug, Clone)]
pub struct VersionRegistry {
    manifest: VersionManifest,
}

impl VersionRegistry {
    pub fn new(manifest: VersionManifest) -> Self {
        Self { manifest }
    }

    /// Registry over the embedded manifest, or `path` when given.
    pub fn load(path: Option<&Path>) -> HostResult<Self> {
        let manifest = match path {
            Some(path) => VersionManifest::load(path)?,
            None => VersionManifest::embedded()?,
        };
        Ok(Self::new(manifest))
    }

    /// All supported versions, ascending.
    pub fn list_supported_versions(&self) -> Vec<SupportedVersion> {
        self.manifest.supported().cloned().collect()
    }

    pub fn default_version(&self) -> &SupportedVersion {
        self.manifest.default_version()
    }

    pub fn is_supported(&self, version: &str) -> bool {
        self.manifest.is_supported(version)
    }

    /// Map a requested identifier onto a supported version.
    ///
    /// Supported identifiers are returned as-is, retired ones through the
    /// replacement table; anything else falls back to the default.
    pub fn resolve_version(&self, requested: Option<&str>) -> SupportedVersion {
        let Some(requested) = requested.map(str::trim).filter(|v| !v.is_empty()) else {
            return self.default_version().clone();
        };
        if self.is_supported(requested) {
            return SupportedVersion::new(requested);
        }
        match self.manifest.replacement_for(requested) {
            Some(replacement) => {
                tracing::info!(requested, replacement = %replacement, "Replacing retired engine version");
                replacement.clone()
            }
            None => {
                tracing::warn!(requested, default = %self.default_version(), "Unknown engine version, using default");
                self.default_version().clone()
            }
        }
    }

    /// Like [`resolve_version`](Self::resolve_version) but refuses unknown identifiers.
    pub fn require(&self, requested: &str) -> HostResult<SupportedVersion> {
        let requested = requested.trim();
        if self.is_supported(requested) {
            return Ok(SupportedVersion::new(requested));
        }
        self.manifest
            .replacement_for(requested)
            .cloned()
            .ok_or_else(|| HostError::UnsupportedVersion(requested.to_string()))
    }

    /// Artifact paths for a version; empty when no artifact root is configured.
    pub fn artifact_paths(&self, version: &SupportedVersion, root: Option<&Path>) -> HostResult<Vec<PathBuf>> {
        match root {
            Some(root) => self.manifest.artifact_paths(version, root),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> VersionRegistry {
        VersionRegistry::new(
            VersionManifest::from_toml_str(
                "[versions]\nsupported = [\"8.45.1\", \"9.3\"]\n[replacements]\n\"8.0\" = \"8.45.1\"\n",
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_resolve_supported() {
        assert_eq!(registry().resolve_version(Some("8.45.1")).as_str(), "8.45.1");
    }

    #[test]
    fn test_resolve_replacement() {
        assert_eq!(registry().resolve_version(Some("8.0")).as_str(), "8.45.1");
    }

    #[test]
    fn test_resolve_unknown_falls_back_to_default() {
        assert_eq!(registry().resolve_version(Some("1.0")).as_str(), "9.3");
        assert_eq!(registry().resolve_version(None).as_str(), "9.3");
        assert_eq!(registry().resolve_version(Some("  ")).as_str(), "9.3");
    }

    #[test]
    fn test_require_rejects_unknown() {
        let registry = registry();
        assert_eq!(registry.require("8.0").unwrap().as_str(), "8.45.1");
        assert!(matches!(registry.require("1.0"), Err(HostError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_no_artifact_root_means_no_artifacts() {
        let registry = registry();
        let paths = registry.artifact_paths(&SupportedVersion::from("9.3"), None).unwrap();
        assert!(paths.is_empty());
    }
}
