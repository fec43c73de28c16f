//! Context loading and registry.
//!
//! The loader guarantees at most one live context per
//! `(project, version, extra classpath)` and hands out generation numbers
//! that only ever increase. Contexts are built without holding any lock;
//! when two threads race to build the same context the first one registered
//! wins and the other is dropped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::scope::{ResourceScope, ScopeRoot};
use super::stabilizer::ClasspathStabilizer;
use super::{ContextKey, ExecutionContext};
use crate::config::{EngineConfig, HostConfig};
use crate::engine::EngineFactory;
use crate::error::{HostError, HostResult};
use crate::project::Project;
use crate::version::{SupportedVersion, VersionRegistry};

type ExtraScopeKey = (String, Vec<PathBuf>);

/// Result of activating a version for a project.
#[derive(Debug)]
pub struct Activation {
    /// The context now active for the project
    pub context: Arc<ExecutionContext>,
    /// Contexts dropped by the switch
    pub replaced: Vec<Arc<ExecutionContext>>,
}

/// Builds and tracks execution contexts.
pub struct ContextLoader {
    registry: Arc<VersionRegistry>,
    factory: Arc<dyn EngineFactory>,
    host_scope: Arc<ResourceScope>,
    settings: EngineConfig,
    generation: AtomicU64,
    contexts: Mutex<HashMap<ContextKey, Arc<ExecutionContext>>>,
    active: Mutex<HashMap<String, ContextKey>>,
    extra_scopes: Mutex<HashMap<ExtraScopeKey, Arc<ResourceScope>>>,
}

impl std::fmt::Debug for ContextLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLoader")
            .field("contexts", &self.contexts.lock().len())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}

impl ContextLoader {
    pub fn new(
        registry: Arc<VersionRegistry>,
        factory: Arc<dyn EngineFactory>,
        host_scope: Arc<ResourceScope>,
        settings: EngineConfig,
    ) -> Self {
        Self {
            registry,
            factory,
            host_scope,
            settings,
            generation: AtomicU64::new(0),
            contexts: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            extra_scopes: Mutex::new(HashMap::new()),
        }
    }

    /// The context for a project, version and extra classpath, loading it on first use.
    pub fn context_for(
        &self,
        project: &Project,
        version: &SupportedVersion,
        extra_classpath: &[PathBuf],
    ) -> HostResult<Arc<ExecutionContext>> {
        if !self.registry.is_supported(version.as_str()) {
            return Err(HostError::UnsupportedVersion(version.to_string()));
        }

        let key = ContextKey {
            project: project.name().to_string(),
            version: version.clone(),
            extra_classpath: extra_classpath.to_vec(),
        };

        if let Some(existing) = self.contexts.lock().get(&key) {
            return Ok(Arc::clone(existing));
        }

        let built = Arc::new(self.build(project, key.clone())?);

        let mut contexts = self.contexts.lock();
        if let Some(winner) = contexts.get(&key) {
            tracing::debug!(
                discarded = %built.identity(),
                kept = %winner.identity(),
                "Discarding context built concurrently"
            );
            return Ok(Arc::clone(winner));
        }
        contexts.insert(key, Arc::clone(&built));
        tracing::info!(project = project.name(), context = %built.identity(), "Loaded engine context");
        Ok(built)
    }

    /// Make `version` the project's active version.
    ///
    /// Idempotent when the key is unchanged; otherwise the new context is
    /// loaded first and only then are the project's other contexts dropped.
    /// A failed load leaves the previous activation in place.
    pub fn activate_version(
        &self,
        project: &Project,
        version: &SupportedVersion,
        extra_classpath: &[PathBuf],
    ) -> HostResult<Activation> {
        let key = ContextKey {
            project: project.name().to_string(),
            version: version.clone(),
            extra_classpath: extra_classpath.to_vec(),
        };

        let loaded = self.context_for(project, version, extra_classpath)?;

        let mut active = self.active.lock();
        let mut contexts = self.contexts.lock();
        let changed = active.get(project.name()) != Some(&key);
        active.insert(project.name().to_string(), key.clone());

        // A concurrent switch may have dropped the context between loading and committing.
        let context = Arc::clone(contexts.entry(key.clone()).or_insert(loaded));

        let replaced: Vec<Arc<ExecutionContext>> = if changed {
            let stale: Vec<ContextKey> =
                contexts.keys().filter(|k| k.project == project.name() && **k != key).cloned().collect();
            stale.iter().filter_map(|k| contexts.remove(k)).collect()
        } else {
            Vec::new()
        };
        drop(contexts);
        drop(active);

        if !replaced.is_empty() {
            tracing::info!(project = project.name(), version = %version, replaced = replaced.len(), "Switched engine version");
        }
        Ok(Activation { context, replaced })
    }

    /// The project's active context, activating the default version when none is set.
    pub fn active_context(&self, project: &Project) -> HostResult<Arc<ExecutionContext>> {
        let key = self.active.lock().get(project.name()).cloned();
        match key {
            Some(key) => self.context_for(project, &key.version, &key.extra_classpath),
            None => {
                let version = self.registry.default_version().clone();
                Ok(self.activate_version(project, &version, &[])?.context)
            }
        }
    }

    /// Drop every context of a project so the next request loads a fresh one.
    ///
    /// Holders of the old contexts keep them alive until they let go.
    pub fn reset(&self, project: &Project) -> Vec<Arc<ExecutionContext>> {
        let removed: Vec<Arc<ExecutionContext>> = {
            let mut contexts = self.contexts.lock();
            let keys: Vec<ContextKey> = contexts.keys().filter(|k| k.project == project.name()).cloned().collect();
            keys.iter().filter_map(|k| contexts.remove(k)).collect()
        };
        self.extra_scopes.lock().retain(|(name, _), _| name != project.name());

        tracing::info!(project = project.name(), dropped = removed.len(), "Reset engine contexts");
        removed
    }

    /// Live contexts of a project.
    pub fn contexts_for(&self, project: &Project) -> Vec<Arc<ExecutionContext>> {
        self.contexts.lock().values().filter(|c| c.project() == project.name()).cloned().collect()
    }

    /// Highest generation handed out so far.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn build(&self, project: &Project, key: ContextKey) -> HostResult<ExecutionContext> {
        let artifacts = self.registry.artifact_paths(&key.version, self.settings.artifacts_dir.as_deref())?;

        let mut roots: Vec<ScopeRoot> = artifacts.iter().map(ScopeRoot::for_path).collect();
        roots.push(ScopeRoot::Embedded(self.factory.embedded_resources(&key.version)));

        let extra = self.extra_scope(project, &key.extra_classpath);
        let scope = Arc::new(ResourceScope::child(
            format!("engine-{}", key.version),
            roots,
            extra,
            Arc::clone(&self.host_scope),
        ));

        let engine = self.factory.instantiate(&key.version, Arc::clone(&scope))?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ExecutionContext::new(key, generation, artifacts, scope, engine))
    }

    /// Scope over the project's extra classpath, built once per entry list.
    fn extra_scope(&self, project: &Project, entries: &[PathBuf]) -> Option<Arc<ResourceScope>> {
        if entries.is_empty() {
            return None;
        }
        let cache_key = (project.name().to_string(), entries.to_vec());
        if let Some(scope) = self.extra_scopes.lock().get(&cache_key) {
            return Some(Arc::clone(scope));
        }

        let resolved = match (self.settings.copy_libs, project.root()) {
            (true, Some(root)) => ClasspathStabilizer::new(root, self.copy_dir(project)).stabilize(entries),
            _ => entries.to_vec(),
        };
        let scope = Arc::new(ResourceScope::new(
            format!("extra-classpath-{}", project.name()),
            resolved.into_iter().map(ScopeRoot::for_path).collect(),
        ));

        let mut scopes = self.extra_scopes.lock();
        Some(Arc::clone(scopes.entry(cache_key).or_insert(scope)))
    }

    fn copy_dir(&self, project: &Project) -> PathBuf {
        self.settings
            .copy_dir
            .clone()
            .or_else(HostConfig::cache_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join(project.name())
            .join("libs")
    }
}
