//! Configuration locations.
//!
//! A location names where a configuration document comes from and carries
//! the user's property values for it. Locations are shared, long-lived
//! objects: their identity is the pair `(type, raw location)` and the
//! [`LocationFactory`] hands out one instance per identity.

mod bundled;
mod factory;
pub(crate) mod paths;
mod properties;
mod source;

pub use bundled::BundledConfig;
pub use factory::{sort_locations, LocationFactory, LocationHandle, LocationSettings};
pub use paths::PROJECT_DIR_TOKEN;
pub use properties::{discover_properties, merge_discovered, non_empty, PropertyMap};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::ResolutionError;
use crate::project::Project;
use source::ContentSource;

/// How long a failing location is skipped by batch scans.
pub const BLOCK_TIME: Duration = Duration::from_secs(60);

/// Kind of configuration location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConfigurationType {
    LocalFile,
    ProjectRelative,
    HttpUrl,
    InsecureHttpUrl,
    EmbeddedResource,
    Bundled,
}

impl ConfigurationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalFile => "LOCAL_FILE",
            Self::ProjectRelative => "PROJECT_RELATIVE",
            Self::HttpUrl => "HTTP_URL",
            Self::InsecureHttpUrl => "INSECURE_HTTP_URL",
            Self::EmbeddedResource => "EMBEDDED_RESOURCE",
            Self::Bundled => "BUNDLED",
        }
    }

    /// Parse a type name; case-insensitive, spaces and dashes read as underscores.
    pub fn parse(value: &str) -> Option<Self> {
        let normalised = value.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match normalised.as_str() {
            "LOCAL_FILE" | "FILE" => Some(Self::LocalFile),
            "PROJECT_RELATIVE" | "RELATIVE_FILE" => Some(Self::ProjectRelative),
            "HTTP_URL" => Some(Self::HttpUrl),
            "INSECURE_HTTP_URL" => Some(Self::InsecureHttpUrl),
            "EMBEDDED_RESOURCE" | "CLASSPATH" | "PLUGIN_CLASSPATH" => Some(Self::EmbeddedResource),
            "BUNDLED" => Some(Self::Bundled),
            _ => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::LocalFile | Self::ProjectRelative)
    }
}

impl fmt::Display for ConfigurationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigurationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown configuration type '{}'", s))
    }
}

impl TryFrom<String> for ConfigurationType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConfigurationType> for String {
    fn from(value: ConfigurationType) -> Self {
        value.as_str().to_string()
    }
}

/// Identity of a location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationKey {
    pub kind: ConfigurationType,
    /// Stored form of the location (tokenised for files)
    pub raw_location: String,
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.raw_location)
    }
}

/// Serialisable description of a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDescriptor {
    #[serde(rename = "type")]
    pub kind: ConfigurationType,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub properties: PropertyMap,
}

#[derive(Debug)]
struct LocationState {
    description: String,
    scope: Option<String>,
    properties: PropertyMap,
    properties_checked: bool,
    blocked_until: Option<Instant>,
}

/// A configuration location.
pub struct ConfigurationLocation {
    key: LocationKey,
    project: Project,
    source: ContentSource,
    state: Mutex<LocationState>,
}

impl fmt::Debug for ConfigurationLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationLocation")
            .field("key", &self.key)
            .field("project", &self.project.name())
            .field("description", &self.state.lock().description)
            .finish()
    }
}

impl PartialEq for ConfigurationLocation {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ConfigurationLocation {}

impl Hash for ConfigurationLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for ConfigurationLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.key)
    }
}

impl ConfigurationLocation {
    pub(crate) fn new(project: Project, key: LocationKey, description: String, source: ContentSource) -> Self {
        Self {
            key,
            project,
            source,
            state: Mutex::new(LocationState {
                description,
                scope: None,
                properties: PropertyMap::new(),
                properties_checked: false,
                blocked_until: None,
            }),
        }
    }

    pub fn key(&self) -> &LocationKey {
        &self.key
    }

    pub fn kind(&self) -> ConfigurationType {
        self.key.kind
    }

    /// Stored form of the location.
    pub fn raw_location(&self) -> &str {
        &self.key.raw_location
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Filesystem path for file locations, `$PROJECT_DIR$` expanded.
    pub fn file_path(&self) -> Option<PathBuf> {
        self.kind().is_file().then(|| paths::detokenise(&self.project, &self.key.raw_location))
    }

    /// Directory relative references in the document resolve against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.file_path().and_then(|p| p.parent().map(|d| d.to_path_buf()))
    }

    /// Private copy of the last remote download.
    pub fn local_copy(&self) -> Option<PathBuf> {
        self.source.local_copy()
    }

    pub fn bundled(&self) -> Option<BundledConfig> {
        match self.source {
            ContentSource::Bundled(config) => Some(config),
            _ => None,
        }
    }

    pub fn description(&self) -> String {
        self.state.lock().description.clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.state.lock().description = description.into();
    }

    /// Name of the file set the location applies to, if restricted.
    pub fn scope(&self) -> Option<String> {
        self.state.lock().scope.clone()
    }

    pub fn set_scope(&self, scope: Option<String>) {
        self.state.lock().scope = scope;
    }

    pub fn properties(&self) -> PropertyMap {
        self.state.lock().properties.clone()
    }

    /// Replace the property values; the next resolution re-runs discovery.
    pub fn set_properties(&self, properties: PropertyMap) {
        let mut state = self.state.lock();
        state.properties = properties;
        state.properties_checked = false;
    }

    pub fn properties_checked(&self) -> bool {
        self.state.lock().properties_checked
    }

    /// Fetch the document through the generic resolution path.
    ///
    /// Bundled configurations have no generic path and fail with
    /// [`ResolutionError::Unsupported`]; use [`load`](Self::load) for them.
    pub fn resolve(&self, context: &ExecutionContext) -> Result<Vec<u8>, ResolutionError> {
        if self.bundled().is_some() {
            return Err(ResolutionError::Unsupported(self.key.to_string()));
        }
        self.load(context)
    }

    /// Fetch the document, materialising bundled configurations through the engine.
    ///
    /// The first successful read of a session discovers the document's
    /// properties and merges them into the location's map.
    pub fn load(&self, context: &ExecutionContext) -> Result<Vec<u8>, ResolutionError> {
        let bytes = self.source.read(&self.project, &self.key.raw_location, context)?;
        if !self.properties_checked() {
            self.apply_discovery(&bytes)?;
        }
        Ok(bytes)
    }

    /// Make sure discovery has run this session.
    pub fn ensure_properties_up_to_date(&self, context: &ExecutionContext) -> Result<(), ResolutionError> {
        if self.properties_checked() {
            return Ok(());
        }
        self.load(context).map(|_| ())
    }

    fn apply_discovery(&self, bytes: &[u8]) -> Result<(), ResolutionError> {
        let discovered = discover_properties(bytes).map_err(|reason| ResolutionError::Malformed {
            location: self.key.to_string(),
            reason,
        })?;

        let mut state = self.state.lock();
        merge_discovered(&mut state.properties, discovered);
        state.properties_checked = true;
        tracing::debug!(location = %self.key, properties = state.properties.len(), "Discovered properties");
        Ok(())
    }

    /// Skip this location in batch scans for [`BLOCK_TIME`].
    pub fn block(&self) {
        self.state.lock().blocked_until = Some(Instant::now() + BLOCK_TIME);
        tracing::warn!(location = %self.key, "Blocking configuration location");
    }

    pub fn unblock(&self) {
        self.state.lock().blocked_until = None;
    }

    pub fn is_blocked(&self) -> bool {
        self.state.lock().blocked_until.is_some_and(|until| Instant::now() < until)
    }

    /// Seconds until the block lapses.
    pub fn blocked_for_secs(&self) -> u64 {
        self.state
            .lock()
            .blocked_until
            .map(|until| until.saturating_duration_since(Instant::now()).as_secs())
            .unwrap_or(0)
    }

    /// Forget session state: rediscover properties, unblock, drop cached content.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.properties_checked = false;
            state.blocked_until = None;
        }
        self.source.clear_cache();
    }

    pub fn to_descriptor(&self) -> LocationDescriptor {
        let state = self.state.lock();
        LocationDescriptor {
            kind: self.key.kind,
            location: self.key.raw_location.clone(),
            description: Some(state.description.clone()),
            scope: state.scope.clone(),
            properties: state.properties.clone(),
        }
    }

    /// `TYPE:location:description`, the form [`LocationFactory::parse`] reads.
    pub fn to_string_representation(&self) -> String {
        format!("{}:{}:{}", self.key.kind, self.key.raw_location, self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_parse_is_lenient() {
        assert_eq!(ConfigurationType::parse("local file"), Some(ConfigurationType::LocalFile));
        assert_eq!(ConfigurationType::parse("FILE"), Some(ConfigurationType::LocalFile));
        assert_eq!(ConfigurationType::parse("insecure-http-url"), Some(ConfigurationType::InsecureHttpUrl));
        assert_eq!(ConfigurationType::parse("plugin_classpath"), Some(ConfigurationType::EmbeddedResource));
        assert_eq!(ConfigurationType::parse("ftp"), None);
    }

    #[test]
    fn test_type_serde_uses_names() {
        let json = serde_json::to_string(&ConfigurationType::HttpUrl).unwrap();
        assert_eq!(json, "\"HTTP_URL\"");
        let parsed: ConfigurationType = serde_json::from_str("\"file\"").unwrap();
        assert_eq!(parsed, ConfigurationType::LocalFile);
    }
}
