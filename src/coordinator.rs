//! The engine coordinator.
//!
//! One [`EngineCoordinator`] is built at startup and owns every piece of
//! process-wide state: the version registry, the context loader, the
//! location factory, the checker cache and the scanner. Callers pass it by
//! reference to whatever needs the engine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::checker::{content_fingerprint, CheckerCache, CompiledChecker};
use crate::config::HostConfig;
use crate::context::{Activation, ContextLoader, ExecutionContext, ResourceScope, ScopeRoot};
use crate::engine::{BuiltinEngineFactory, EngineFactory};
use crate::error::{HostError, HostResult};
use crate::location::paths::detokenise;
use crate::location::{
    sort_locations, ConfigurationLocation, ConfigurationType, LocationFactory, LocationHandle, LocationKey,
    LocationSettings,
};
use crate::project::{Project, ProjectSettings};
use crate::scan::{CancellationToken, ScanOptions, ScanResult, Scanner};
use crate::version::{SupportedVersion, VersionRegistry};

/// What to drop from the checker cache.
#[derive(Debug, Clone, Copy)]
pub enum Invalidation<'a> {
    /// Checkers compiled from one location; the location also forgets its session state
    Location(&'a ConfigurationLocation),
    /// Everything
    All,
}

/// Outcome of one location in a batch scan.
#[derive(Debug)]
pub enum LocationOutcome {
    Scanned(ScanResult),
    /// Blocked by an earlier failure
    Skipped { blocked_for_secs: u64 },
    /// Resolution or compilation failed; the location is now blocked
    Failed(HostError),
}

/// Result of scanning files against several locations.
#[derive(Debug, Default)]
pub struct BatchScan {
    pub outcomes: Vec<(LocationHandle, LocationOutcome)>,
}

impl BatchScan {
    /// All problems from every scanned location.
    pub fn merged(&self) -> ScanResult {
        let mut merged = ScanResult::default();
        for (_, outcome) in &self.outcomes {
            if let LocationOutcome::Scanned(result) = outcome {
                merged.merge(result.clone());
            }
        }
        merged
    }

    pub fn failures(&self) -> impl Iterator<Item = (&LocationHandle, &HostError)> {
        self.outcomes.iter().filter_map(|(location, outcome)| match outcome {
            LocationOutcome::Failed(err) => Some((location, err)),
            _ => None,
        })
    }
}

/// Persisted project settings turned into live objects.
#[derive(Debug)]
pub struct LoadedSettings {
    pub context: Arc<ExecutionContext>,
    /// Configured locations plus the bundled defaults, sorted
    pub locations: Vec<LocationHandle>,
}

/// Owner of all engine-hosting state.
pub struct EngineCoordinator {
    config: HostConfig,
    registry: Arc<VersionRegistry>,
    loader: ContextLoader,
    locations: LocationFactory,
    checkers: CheckerCache,
    scanner: Scanner,
}

impl std::fmt::Debug for EngineCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCoordinator")
            .field("loader", &self.loader)
            .field("cached_checkers", &self.checkers.len())
            .finish()
    }
}

impl EngineCoordinator {
    /// Coordinator running the built-in engine.
    pub fn new(config: HostConfig) -> HostResult<Self> {
        Self::with_factory(config, Arc::new(BuiltinEngineFactory))
    }

    /// Coordinator running engines from `factory`.
    ///
    /// Fails with [`HostError::Configuration`] when the version manifest is unusable.
    pub fn with_factory(config: HostConfig, factory: Arc<dyn EngineFactory>) -> HostResult<Self> {
        let registry = Arc::new(VersionRegistry::load(config.engine.manifest.as_deref())?);

        let host_roots = config.engine.host_resources.iter().map(ScopeRoot::for_path).collect();
        let host_scope = Arc::new(ResourceScope::new("host", host_roots));
        let loader = ContextLoader::new(Arc::clone(&registry), factory, host_scope, config.engine.clone());

        tracing::debug!(
            versions = registry.list_supported_versions().len(),
            default = %registry.default_version(),
            "Engine coordinator ready"
        );
        Ok(Self {
            locations: LocationFactory::new(LocationSettings::from(&config)),
            checkers: CheckerCache::new(config.cache.checker_idle()),
            scanner: Scanner::new(ScanOptions::from(&config.scan)),
            registry,
            loader,
            config,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    pub fn locations(&self) -> &LocationFactory {
        &self.locations
    }

    pub fn checkers(&self) -> &CheckerCache {
        &self.checkers
    }

    /// Scan options from the host configuration.
    pub fn scan_options(&self) -> ScanOptions {
        self.scanner.options().clone()
    }

    pub fn list_supported_versions(&self) -> Vec<SupportedVersion> {
        self.registry.list_supported_versions()
    }

    pub fn default_version(&self) -> &SupportedVersion {
        self.registry.default_version()
    }

    /// Make `version` the project's active version.
    ///
    /// Retired identifiers map onto their replacement; unknown ones fail.
    /// Nothing is reloaded when the project already runs this key.
    pub fn activate_version(
        &self,
        project: &Project,
        version: &str,
        extra_classpath: &[PathBuf],
    ) -> HostResult<Arc<ExecutionContext>> {
        let version = self.registry.require(version)?;
        let Activation { context, replaced } = self.loader.activate_version(project, &version, extra_classpath)?;
        self.drop_generations(&replaced);
        Ok(context)
    }

    /// The project's active context, activating the default version if needed.
    pub fn active_context(&self, project: &Project) -> HostResult<Arc<ExecutionContext>> {
        self.loader.active_context(project)
    }

    /// Drop the project's contexts, their checkers and its locations' session state.
    ///
    /// Checkers already handed out stay usable only until they meet the
    /// identity guard against a newer context.
    pub fn reset_project(&self, project: &Project) -> usize {
        let removed = self.loader.reset(project);
        self.drop_generations(&removed);
        for location in self.locations.live_locations(project) {
            location.reset();
        }
        removed.len()
    }

    pub fn create_location(
        &self,
        project: &Project,
        kind: ConfigurationType,
        location: &str,
        description: Option<&str>,
    ) -> HostResult<LocationHandle> {
        self.locations.create(project, kind, location, description)
    }

    /// A checker for `location` with `properties` in the project's active context.
    pub fn resolve_and_compile(
        &self,
        location: &ConfigurationLocation,
        properties: &BTreeMap<String, String>,
    ) -> HostResult<Arc<CompiledChecker>> {
        let context = self.active_context(location.project())?;
        self.checkers.get(&context, location, properties)
    }

    /// Check `files` with `checker` in the project's active context.
    ///
    /// A checker from any other context fails with [`HostError::ContextMix`].
    pub fn scan(
        &self,
        project: &Project,
        checker: &CompiledChecker,
        files: &[PathBuf],
        options: &ScanOptions,
        cancel: &CancellationToken,
    ) -> HostResult<ScanResult> {
        let context = self.active_context(project)?;
        Scanner::new(options.clone()).scan(&context, checker, files, cancel)
    }

    /// Check `files` against each location independently.
    ///
    /// A location that cannot be resolved or compiled is blocked and reported
    /// without stopping the others; blocked locations are skipped. Context
    /// mixes, cancellation and timeouts abort the whole batch.
    pub fn scan_locations(
        &self,
        project: &Project,
        locations: &[LocationHandle],
        files: &[PathBuf],
        options: &ScanOptions,
        cancel: &CancellationToken,
    ) -> HostResult<BatchScan> {
        let mut batch = BatchScan::default();
        for location in locations {
            cancel.check()?;
            if location.is_blocked() {
                tracing::debug!(location = %location.key(), "Skipping blocked location");
                let outcome = LocationOutcome::Skipped { blocked_for_secs: location.blocked_for_secs() };
                batch.outcomes.push((Arc::clone(location), outcome));
                continue;
            }

            let outcome = match self.scan_location(project, location, files, options, cancel) {
                Ok(result) => LocationOutcome::Scanned(result),
                Err(err) if err.aborts_batch() => return Err(err),
                Err(err) => {
                    tracing::warn!(location = %location.key(), error = %err, "Configuration location failed");
                    location.block();
                    LocationOutcome::Failed(err)
                }
            };
            batch.outcomes.push((Arc::clone(location), outcome));
        }
        Ok(batch)
    }

    fn scan_location(
        &self,
        project: &Project,
        location: &ConfigurationLocation,
        files: &[PathBuf],
        options: &ScanOptions,
        cancel: &CancellationToken,
    ) -> HostResult<ScanResult> {
        let checker = self.resolve_and_compile(location, &BTreeMap::new())?;
        self.scan(project, &checker, files, options, cancel)
    }

    /// Drop cached checkers; returns how many went.
    pub fn invalidate(&self, what: Invalidation<'_>) -> usize {
        match what {
            Invalidation::Location(location) => {
                location.reset();
                self.invalidate_key(location.key())
            }
            Invalidation::All => {
                let dropped = self.checkers.invalidate_all();
                tracing::info!(dropped, "Cleared checker cache");
                dropped
            }
        }
    }

    /// Drop the location's checkers compiled from content it no longer serves.
    ///
    /// Checkers whose document is unchanged stay cached; returns how many went.
    pub fn refresh_location(&self, location: &ConfigurationLocation) -> HostResult<usize> {
        let context = self.active_context(location.project())?;
        let content = location.load(&context)?;
        let dropped = self.checkers.drop_changed(location.key(), &content_fingerprint(&content));
        if dropped > 0 {
            tracing::debug!(location = %location.key(), dropped, "Dropped checkers of changed content");
        }
        Ok(dropped)
    }

    fn invalidate_key(&self, key: &LocationKey) -> usize {
        let dropped = self.checkers.invalidate(key);
        tracing::debug!(location = %key, dropped, "Invalidated checkers");
        dropped
    }

    /// Activate a project's persisted settings.
    ///
    /// Unknown versions fall back to the default, unusable location
    /// descriptors are skipped, and missing bundled defaults are re-added.
    pub fn load_settings(&self, project: &Project, settings: &ProjectSettings) -> HostResult<LoadedSettings> {
        let version = self.registry.resolve_version(settings.version.as_deref());
        let extra_classpath: Vec<PathBuf> =
            settings.extra_classpath.iter().map(|entry| detokenise(project, entry.trim())).collect();

        let Activation { context, replaced } = self.loader.activate_version(project, &version, &extra_classpath)?;
        self.drop_generations(&replaced);

        let mut locations = Vec::with_capacity(settings.locations.len() + 2);
        for descriptor in &settings.locations {
            match self.locations.from_descriptor(project, descriptor) {
                Ok(location) if !locations.contains(&location) => locations.push(location),
                Ok(_) => {}
                Err(e) => tracing::warn!(location = %descriptor.location, error = %e, "Skipping configuration location"),
            }
        }
        self.locations.ensure_bundled_defaults(project, &mut locations);
        sort_locations(&mut locations);

        Ok(LoadedSettings { context, locations })
    }

    /// [`load_settings`](Self::load_settings) from a settings file.
    pub fn load_settings_file(&self, project: &Project, path: &Path) -> HostResult<LoadedSettings> {
        self.load_settings(project, &ProjectSettings::load(path)?)
    }

    fn drop_generations(&self, contexts: &[Arc<ExecutionContext>]) {
        for context in contexts {
            let dropped = self.checkers.invalidate_generation(context.generation());
            tracing::debug!(context = %context.identity(), dropped, "Dropped checkers of replaced context");
        }
    }
}
