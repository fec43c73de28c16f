//! Version manifest.
//!
//! The manifest is a TOML document listing the supported engine versions,
//! the default version, a replacement table for retired identifiers, the
//! artifacts each version loads, and a substitution table for artifacts that
//! several versions share.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ordering::SupportedVersion;
use crate::error::{HostError, HostResult};

/// Manifest compiled into the binary.
pub const EMBEDDED_MANIFEST: &str = include_str!("../../resources/versions.toml");

#[derive(Debug, Deserialize)]
struct RawManifest {
    versions: RawVersions,
    #[serde(default)]
    replacements: BTreeMap<String, String>,
    #[serde(default)]
    artifacts: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    shared: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawVersions {
    #[serde(default)]
    supported: Vec<String>,
    default: Option<String>,
}

/// Validated version manifest.
#[derive(Debug, Clone)]
pub struct VersionManifest {
    supported: BTreeSet<SupportedVersion>,
    default: SupportedVersion,
    replacements: BTreeMap<String, SupportedVersion>,
    artifacts: BTreeMap<SupportedVersion, Vec<String>>,
    shared: BTreeMap<String, String>,
}

impl VersionManifest {
    /// The manifest shipped with this build.
    pub fn embedded() -> HostResult<Self> {
        Self::from_toml_str(EMBEDDED_MANIFEST)
    }

    /// Load a manifest from a file.
    pub fn load(path: &Path) -> HostResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HostError::Configuration(format!("cannot read version manifest {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a manifest.
    pub fn from_toml_str(content: &str) -> HostResult<Self> {
        if content.trim().is_empty() {
            return Err(HostError::Configuration("version manifest is empty".to_string()));
        }

        let raw: RawManifest = toml::from_str(content)
            .map_err(|e| HostError::Configuration(format!("invalid version manifest: {}", e)))?;

        let mut supported = BTreeSet::new();
        for id in &raw.versions.supported {
            if id.trim().is_empty() {
                return Err(HostError::Configuration(
                    "version manifest contains a blank version".to_string(),
                ));
            }
            supported.insert(SupportedVersion::new(id.trim()));
        }

        let Some(highest) = supported.iter().next_back().cloned() else {
            return Err(HostError::Configuration(
                "version manifest lists no supported versions".to_string(),
            ));
        };

        let default = match raw.versions.default {
            Some(id) => {
                let version = SupportedVersion::new(id.trim());
                if !supported.contains(&version) {
                    return Err(HostError::Configuration(format!(
                        "default version {} is not a supported version",
                        version
                    )));
                }
                version
            }
            None => highest,
        };

        let mut replacements = BTreeMap::new();
        for (from, to) in raw.replacements {
            let target = SupportedVersion::new(to.trim());
            if !supported.contains(&target) {
                return Err(HostError::Configuration(format!(
                    "replacement {} -> {}: target is not a supported version",
                    from, target
                )));
            }
            if supported.contains(&SupportedVersion::new(from.trim())) {
                return Err(HostError::Configuration(format!(
                    "replacement {} -> {}: source is itself a supported version",
                    from, target
                )));
            }
            replacements.insert(from.trim().to_string(), target);
        }

        let artifacts =
            raw.artifacts.into_iter().map(|(version, names)| (SupportedVersion::new(version), names)).collect();

        Ok(Self { supported, default, replacements, artifacts, shared: raw.shared })
    }

    /// Supported versions in ascending order.
    pub fn supported(&self) -> impl Iterator<Item = &SupportedVersion> {
        self.supported.iter()
    }

    pub fn is_supported(&self, version: &str) -> bool {
        self.supported.contains(&SupportedVersion::new(version))
    }

    pub fn default_version(&self) -> &SupportedVersion {
        &self.default
    }

    /// The supported version replacing a retired identifier, if any.
    pub fn replacement_for(&self, version: &str) -> Option<&SupportedVersion> {
        self.replacements.get(version)
    }

    /// Resolve the artifact paths for a version below `root`.
    ///
    /// Artifacts listed in the shared table resolve to their shared location
    /// instead of the per-version directory.
    pub fn artifact_paths(&self, version: &SupportedVersion, root: &Path) -> HostResult<Vec<PathBuf>> {
        let names = self.artifacts.get(version).map(Vec::as_slice).unwrap_or_default();
        let mut paths = Vec::with_capacity(names.len());
        for name in names {
            let path = match self.shared.get(name) {
                Some(shared) => root.join(shared),
                None => root.join(version.as_str()).join(name),
            };
            if !path.exists() {
                return Err(HostError::Artifact { version: version.to_string(), path });
            }
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
        [versions]
        supported = ["9.3", "8.45.1", "10.12.4"]

        [replacements]
        "8.0" = "8.45.1"

        [artifacts]
        "9.3" = ["engine-9.3.jar", "common.jar"]

        [shared]
        "common.jar" = "shared/common.jar"
    "#;

    #[test]
    fn test_embedded_manifest_is_valid() {
        let manifest = VersionManifest::embedded().unwrap();
        assert!(manifest.is_supported(manifest.default_version().as_str()));
    }

    #[test]
    fn test_default_is_highest_when_omitted() {
        let manifest = VersionManifest::from_toml_str(MANIFEST).unwrap();
        assert_eq!(manifest.default_version().as_str(), "10.12.4");
    }

    #[test]
    fn test_supported_is_ordered() {
        let manifest = VersionManifest::from_toml_str(MANIFEST).unwrap();
        let ids: Vec<&str> = manifest.supported().map(SupportedVersion::as_str).collect();
        assert_eq!(ids, vec!["8.45.1", "9.3", "10.12.4"]);
    }

    #[test]
    fn test_empty_manifest_fails() {
        assert!(matches!(VersionManifest::from_toml_str("  "), Err(HostError::Configuration(_))));
        let none = "[versions]\nsupported = []\n";
        assert!(matches!(VersionManifest::from_toml_str(none), Err(HostError::Configuration(_))));
    }

    #[test]
    fn test_unknown_default_fails() {
        let bad = "[versions]\nsupported = [\"9.3\"]\ndefault = \"9.4\"\n";
        let err = VersionManifest::from_toml_str(bad).unwrap_err();
        assert!(err.to_string().contains("9.4"));
    }

    #[test]
    fn test_replacement_rules() {
        let bad_target = "[versions]\nsupported = [\"9.3\"]\n[replacements]\n\"9.0\" = \"9.1\"\n";
        assert!(VersionManifest::from_toml_str(bad_target).is_err());

        let supported_source = "[versions]\nsupported = [\"9.3\", \"9.0\"]\n[replacements]\n\"9.0\" = \"9.3\"\n";
        assert!(VersionManifest::from_toml_str(supported_source).is_err());

        let manifest = VersionManifest::from_toml_str(MANIFEST).unwrap();
        assert_eq!(manifest.replacement_for("8.0").map(SupportedVersion::as_str), Some("8.45.1"));
    }

    #[test]
    fn test_artifact_paths_use_shared_table() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("9.3")).unwrap();
        std::fs::create_dir_all(temp.path().join("shared")).unwrap();
        std::fs::write(temp.path().join("9.3/engine-9.3.jar"), b"engine").unwrap();
        std::fs::write(temp.path().join("shared/common.jar"), b"common").unwrap();

        let manifest = VersionManifest::from_toml_str(MANIFEST).unwrap();
        let paths = manifest.artifact_paths(&SupportedVersion::from("9.3"), temp.path()).unwrap();
        assert_eq!(paths[1], temp.path().join("shared/common.jar"));
    }

    #[test]
    fn test_missing_artifact_fails() {
        let temp = TempDir::new().unwrap();
        let manifest = VersionManifest::from_toml_str(MANIFEST).unwrap();
        let err = manifest.artifact_paths(&SupportedVersion::from("9.3"), temp.path()).unwrap_err();
        assert!(matches!(err, HostError::Artifact { .. }));
    }
}
