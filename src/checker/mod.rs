//! Compiled checkers and their cache.
//!
//! A compiled checker is the engine's ready-to-run form of one configuration
//! document with one set of property values, built inside one execution
//! context. It records the context it came from so [`IdentityGuard`] can
//! refuse it anywhere else.

mod cache;
mod fingerprint;
mod guard;

pub use cache::CheckerCache;
pub use fingerprint::{checker_fingerprint, content_fingerprint};
pub use guard::IdentityGuard;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use crate::context::ContextTag;
use crate::engine::EngineObject;
use crate::location::LocationKey;

/// A configuration compiled inside an execution context.
pub struct CompiledChecker {
    tag: ContextTag,
    location: LocationKey,
    properties: BTreeMap<String, String>,
    fingerprint: String,
    content_fingerprint: String,
    object: EngineObject,
    created_at: Instant,
}

impl fmt::Debug for CompiledChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledChecker")
            .field("context", &self.tag.to_string())
            .field("location", &self.location.to_string())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl CompiledChecker {
    pub(crate) fn new(
        tag: ContextTag,
        location: LocationKey,
        properties: BTreeMap<String, String>,
        fingerprint: String,
        content_fingerprint: String,
        object: EngineObject,
    ) -> Self {
        Self { tag, location, properties, fingerprint, content_fingerprint, object, created_at: Instant::now() }
    }

    /// Context the checker was built in.
    pub fn tag(&self) -> &ContextTag {
        &self.tag
    }

    pub fn generation(&self) -> u64 {
        self.tag.generation
    }

    pub fn location(&self) -> &LocationKey {
        &self.location
    }

    /// Effective property values it was compiled with.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn content_fingerprint(&self) -> &str {
        &self.content_fingerprint
    }

    /// Engine-side handle; only the building engine can use it.
    pub fn object(&self) -> &EngineObject {
        &self.object
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
