//! Isolated execution contexts.
//!
//! An execution context is one loaded engine version for one project: its
//! artifacts, its child-first resource scope and the engine instance itself.
//! Contexts are immutable once built; a reload replaces the context with a
//! new one carrying a higher generation number.

mod loader;
mod scope;
mod stabilizer;

pub use loader::{Activation, ContextLoader};
pub use scope::{Resource, ResourceScope, ScopeRoot};
pub use stabilizer::ClasspathStabilizer;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::engine::Engine;
use crate::version::SupportedVersion;

/// What a context was loaded for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub project: String,
    pub version: SupportedVersion,
    pub extra_classpath: Vec<PathBuf>,
}

/// Identity of the context an object was built in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextTag {
    pub id: Uuid,
    pub generation: u64,
    pub version: SupportedVersion,
}

impl fmt::Display for ContextTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#g{}/{}", self.version, self.generation, self.id)
    }
}

/// One loaded engine version.
pub struct ExecutionContext {
    tag: ContextTag,
    key: ContextKey,
    artifacts: Vec<PathBuf>,
    scope: Arc<ResourceScope>,
    engine: Arc<dyn Engine>,
    created_at: Instant,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("identity", &self.tag.to_string())
            .field("project", &self.key.project)
            .field("artifacts", &self.artifacts)
            .finish()
    }
}

impl ExecutionContext {
    pub(crate) fn new(
        key: ContextKey,
        generation: u64,
        artifacts: Vec<PathBuf>,
        scope: Arc<ResourceScope>,
        engine: Arc<dyn Engine>,
    ) -> Self {
        let tag = ContextTag { id: Uuid::new_v4(), generation, version: key.version.clone() };
        Self { tag, key, artifacts, scope, engine, created_at: Instant::now() }
    }

    pub fn tag(&self) -> &ContextTag {
        &self.tag
    }

    pub fn id(&self) -> Uuid {
        self.tag.id
    }

    pub fn generation(&self) -> u64 {
        self.tag.generation
    }

    pub fn version(&self) -> &SupportedVersion {
        &self.key.version
    }

    pub fn key(&self) -> &ContextKey {
        &self.key
    }

    pub fn project(&self) -> &str {
        &self.key.project
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn scope(&self) -> &Arc<ResourceScope> {
        &self.scope
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Human-readable identity, e.g. `10.12.4#g3/<uuid>`.
    pub fn identity(&self) -> String {
        self.tag.to_string()
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
