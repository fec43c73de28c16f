//! Projects and their persisted engine settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};
use crate::location::LocationDescriptor;

/// A project the host serves.
///
/// Contexts, locations and caches are all scoped per project name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Project {
    name: String,
    root: Option<PathBuf>,
}

impl Project {
    pub fn new(name: impl Into<String>, root: Option<PathBuf>) -> Self {
        Self { name: name.into(), root }
    }

    /// Project rooted at `root`, named after its directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "default".to_string());
        Self { name, root: Some(root) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

/// Engine settings persisted per project.
///
/// The host only reads these; writing them back is the caller's business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Engine version, possibly a retired identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Configured locations
    pub locations: Vec<LocationDescriptor>,

    /// Extra classpath entries, possibly `$PROJECT_DIR$`-tokenised
    pub extra_classpath: Vec<String>,
}

impl ProjectSettings {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> HostResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| HostError::Configuration(format!("invalid project settings {}: {}", path.display(), e)))
    }

    /// Save settings as pretty JSON.
    pub fn save(&self, path: &Path) -> HostResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| HostError::Configuration(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::ConfigurationType;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_project_named_after_directory() {
        let project = Project::at("/work/billing-service");
        assert_eq!(project.name(), "billing-service");
        assert_eq!(project.root(), Some(Path::new("/work/billing-service")));
    }

    #[test]
    fn test_settings_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".rulehost").join("settings.json");
        let settings = ProjectSettings {
            version: Some("8.0".to_string()),
            locations: vec![LocationDescriptor {
                kind: ConfigurationType::ProjectRelative,
                location: "$PROJECT_DIR$/config/rules.xml".to_string(),
                description: Some("Team rules".to_string()),
                scope: None,
                properties: BTreeMap::from([("maxLen".to_string(), Some("120".to_string()))]),
            }],
            extra_classpath: vec!["$PROJECT_DIR$/lib/checks.jar".to_string()],
        };

        settings.save(&path).unwrap();
        assert_eq!(ProjectSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_fields_default() {
        let settings: ProjectSettings = serde_json::from_str(r#"{"version": "9.3"}"#).unwrap();
        assert!(settings.locations.is_empty());
        assert!(settings.extra_classpath.is_empty());
    }
}
