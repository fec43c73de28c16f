//! Engine API seam.
//!
//! The host never touches rule implementations directly. Each execution
//! context owns one [`Engine`] instantiated for its version by an
//! [`EngineFactory`], and every object the engine hands out is opaque to the
//! host ([`EngineObject`]).

mod builtin;
mod document;
mod rules;

pub use builtin::{BuiltinEngine, BuiltinEngineFactory};
pub use document::{parse_modules, ModuleNode, PropertyNode};
pub use rules::RuleSet;

use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::context::ResourceScope;
use crate::error::HostResult;
use crate::location::BundledConfig;
use crate::scan::Problem;
use crate::version::SupportedVersion;

/// An object created inside an engine; only that engine can use it.
pub type EngineObject = Arc<dyn Any + Send + Sync>;

/// An engine was handed an object it did not create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignObject {
    /// Engine that received the object
    pub engine: String,
    /// What the object claims to come from
    pub origin: String,
}

/// One loaded engine version.
pub trait Engine: Send + Sync {
    /// Version this engine implements.
    fn version(&self) -> &SupportedVersion;

    /// Compile a configuration document; failures are returned as diagnostic text.
    fn compile(&self, document: &[u8], properties: &BTreeMap<String, String>) -> Result<EngineObject, String>;

    /// Content of a configuration shipped with the engine.
    fn bundled_config(&self, config: BundledConfig) -> Option<Vec<u8>>;

    /// Check one file with a compiled checker.
    fn check(
        &self,
        checker: &EngineObject,
        path: &Path,
        content: &str,
        tab_width: usize,
    ) -> Result<Vec<Problem>, ForeignObject>;
}

/// Creates engines for supported versions.
pub trait EngineFactory: Send + Sync {
    /// Resources the engine expects to find in its own scope.
    fn embedded_resources(&self, _version: &SupportedVersion) -> BTreeMap<String, &'static [u8]> {
        BTreeMap::new()
    }

    /// Load the engine for `version` inside `scope`.
    fn instantiate(&self, version: &SupportedVersion, scope: Arc<ResourceScope>) -> HostResult<Arc<dyn Engine>>;
}
