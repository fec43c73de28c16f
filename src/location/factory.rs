//! Location factory with a weak instance cache.
//!
//! Every request for the same `(project, type, raw location)` yields the same
//! shared instance for as long as any caller keeps it alive; once the last
//! handle is dropped the entry dies with it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::bundled::BundledConfig;
use super::paths;
use super::source::{redact, ContentSource};
use super::{ConfigurationLocation, ConfigurationType, LocationDescriptor, LocationKey};
use crate::config::HostConfig;
use crate::error::{HostError, HostResult};
use crate::project::Project;

/// Shared handle to a location.
pub type LocationHandle = Arc<ConfigurationLocation>;

/// Settings applied to newly created locations.
#[derive(Debug, Clone)]
pub struct LocationSettings {
    /// Timeout for remote fetches
    pub http_timeout: Duration,
    /// How long fetched content is reused
    pub content_ttl: Duration,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self { http_timeout: Duration::from_secs(5), content_ttl: Duration::from_secs(2) }
    }
}

impl From<&HostConfig> for LocationSettings {
    fn from(config: &HostConfig) -> Self {
        Self { http_timeout: config.network.timeout(), content_ttl: config.cache.content_ttl() }
    }
}

type InstanceKey = (String, LocationKey);

/// Creates and de-duplicates locations.
#[derive(Debug, Default)]
pub struct LocationFactory {
    settings: LocationSettings,
    instances: Mutex<HashMap<InstanceKey, Weak<ConfigurationLocation>>>,
}

impl LocationFactory {
    pub fn new(settings: LocationSettings) -> Self {
        Self { settings, instances: Mutex::new(HashMap::new()) }
    }

    /// The location for `(kind, location)`, creating it on first request.
    ///
    /// An existing instance is returned unchanged; `description` only
    /// applies to new instances and defaults to the location itself.
    pub fn create(
        &self,
        project: &Project,
        kind: ConfigurationType,
        location: &str,
        description: Option<&str>,
    ) -> HostResult<LocationHandle> {
        let location = location.trim();
        if location.is_empty() {
            return Err(HostError::InvalidLocation(format!("{} location is blank", kind)));
        }

        let (raw_location, source, default_description) = match kind {
            ConfigurationType::LocalFile => {
                let raw = paths::tokenise(project, location);
                (raw, ContentSource::File, location.to_string())
            }
            ConfigurationType::ProjectRelative => {
                let raw = paths::project_relative(project, location);
                (raw, ContentSource::File, location.to_string())
            }
            ConfigurationType::HttpUrl | ConfigurationType::InsecureHttpUrl => {
                let lower = location.to_ascii_lowercase();
                if !lower.starts_with("http://") && !lower.starts_with("https://") {
                    return Err(HostError::InvalidLocation(format!("{} is not an http(s) URL", redact(location))));
                }
                let source = ContentSource::remote(
                    kind == ConfigurationType::InsecureHttpUrl,
                    self.settings.http_timeout,
                    self.settings.content_ttl,
                );
                (location.to_string(), source, redact(location))
            }
            ConfigurationType::EmbeddedResource => {
                let raw = location.trim_start_matches('/').to_string();
                (raw, ContentSource::embedded(self.settings.content_ttl), location.to_string())
            }
            ConfigurationType::Bundled => {
                let config = BundledConfig::from_id(location)
                    .ok_or_else(|| HostError::InvalidLocation(format!("unknown bundled configuration '{}'", location)))?;
                (config.id().to_string(), ContentSource::Bundled(config), config.description().to_string())
            }
        };

        let key = LocationKey { kind, raw_location };
        let description = description.map(str::trim).filter(|d| !d.is_empty()).map(str::to_string);
        Ok(self.intern(project, key, || description.unwrap_or(default_description), source))
    }

    /// The location of a bundled configuration.
    pub fn create_bundled(&self, project: &Project, config: BundledConfig) -> LocationHandle {
        let key = LocationKey { kind: ConfigurationType::Bundled, raw_location: config.id().to_string() };
        self.intern(project, key, || config.description().to_string(), ContentSource::Bundled(config))
    }

    /// The live instance for `key`, or a new one; dead entries are purged first.
    fn intern(
        &self,
        project: &Project,
        key: LocationKey,
        description: impl FnOnce() -> String,
        source: ContentSource,
    ) -> LocationHandle {
        let instance_key = (project.name().to_string(), key.clone());

        let mut instances = self.instances.lock();
        instances.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = instances.get(&instance_key).and_then(Weak::upgrade) {
            return existing;
        }

        let created = Arc::new(ConfigurationLocation::new(project.clone(), key, description(), source));
        instances.insert(instance_key, Arc::downgrade(&created));
        tracing::debug!(location = %created.key(), project = project.name(), "Created configuration location");
        created
    }

    /// The location a persisted descriptor describes, with its stored state applied.
    pub fn from_descriptor(&self, project: &Project, descriptor: &LocationDescriptor) -> HostResult<LocationHandle> {
        let location = self.create(project, descriptor.kind, &descriptor.location, descriptor.description.as_deref())?;
        if let Some(description) = descriptor.description.as_deref().filter(|d| !d.trim().is_empty()) {
            location.set_description(description);
        }
        location.set_scope(descriptor.scope.clone());
        location.set_properties(descriptor.properties.clone());
        Ok(location)
    }

    /// Parse `TYPE:location:description`.
    ///
    /// The location may itself contain colons; the type ends at the first
    /// colon and the description starts after the last one.
    pub fn parse(&self, project: &Project, representation: &str) -> HostResult<LocationHandle> {
        let invalid = || HostError::InvalidLocation(format!("cannot parse '{}'", redact(representation)));

        let (kind, rest) = representation.split_once(':').ok_or_else(invalid)?;
        let kind = ConfigurationType::parse(kind).ok_or_else(invalid)?;
        let (location, description) = rest.rsplit_once(':').ok_or_else(invalid)?;

        if kind == ConfigurationType::Bundled {
            let config = BundledConfig::from_id(location)
                .or_else(|| BundledConfig::ALL.into_iter().find(|c| c.description() == description.trim()))
                .ok_or_else(invalid)?;
            return Ok(self.create_bundled(project, config));
        }

        self.create(project, kind, location, Some(description))
    }

    /// Add any missing bundled configurations to the front of `locations`.
    pub fn ensure_bundled_defaults(&self, project: &Project, locations: &mut Vec<LocationHandle>) {
        for config in BundledConfig::ALL.into_iter().rev() {
            if !locations.iter().any(|l| l.bundled() == Some(config)) {
                locations.insert(0, self.create_bundled(project, config));
            }
        }
    }

    /// Live locations of a project.
    pub fn live_locations(&self, project: &Project) -> Vec<LocationHandle> {
        self.instances
            .lock()
            .iter()
            .filter(|((name, _), _)| name == project.name())
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    /// Number of live instances.
    pub fn live_instances(&self) -> usize {
        self.instances.lock().values().filter(|weak| weak.strong_count() > 0).count()
    }
}

/// Bundled locations first in fixed order, then by description, location and type.
pub fn sort_locations(locations: &mut [LocationHandle]) {
    locations.sort_by(|a, b| match (a.bundled(), b.bundled()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a
            .description()
            .to_lowercase()
            .cmp(&b.description().to_lowercase())
            .then_with(|| a.raw_location().cmp(b.raw_location()))
            .then_with(|| a.kind().cmp(&b.kind())),
    });
}
