//! The rule engine compiled into this binary.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use super::document::parse_modules;
use super::rules::{compile, RuleSet};
use super::{Engine, EngineFactory, EngineObject, ForeignObject};
use crate::context::ResourceScope;
use crate::error::HostResult;
use crate::location::BundledConfig;
use crate::scan::Problem;
use crate::version::SupportedVersion;

const SUN_CHECKS: &[u8] = include_bytes!("../../resources/bundled/sun_checks.xml");
const GOOGLE_CHECKS: &[u8] = include_bytes!("../../resources/bundled/google_checks.xml");

/// Creates [`BuiltinEngine`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEngineFactory;

impl EngineFactory for BuiltinEngineFactory {
    fn embedded_resources(&self, _version: &SupportedVersion) -> BTreeMap<String, &'static [u8]> {
        BTreeMap::from([
            (BundledConfig::SunChecks.resource_name().to_string(), SUN_CHECKS),
            (BundledConfig::GoogleChecks.resource_name().to_string(), GOOGLE_CHECKS),
        ])
    }

    fn instantiate(&self, version: &SupportedVersion, scope: Arc<ResourceScope>) -> HostResult<Arc<dyn Engine>> {
        let engine = BuiltinEngine { id: Uuid::new_v4(), version: version.clone(), scope };
        tracing::debug!(version = %version, engine = %engine.id, "Instantiated built-in engine");
        Ok(Arc::new(engine))
    }
}

/// Built-in engine instance for one version.
pub struct BuiltinEngine {
    id: Uuid,
    version: SupportedVersion,
    scope: Arc<ResourceScope>,
}

impl fmt::Debug for BuiltinEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinEngine").field("id", &self.id).field("version", &self.version).finish()
    }
}

impl BuiltinEngine {
    fn identity(&self) -> String {
        format!("{}/{}", self.version, self.id)
    }
}

impl Engine for BuiltinEngine {
    fn version(&self) -> &SupportedVersion {
        &self.version
    }

    fn compile(&self, document: &[u8], properties: &BTreeMap<String, String>) -> Result<EngineObject, String> {
        let root = parse_modules(document)?;
        let rules = compile(&root, properties, &self.version, self.id)?;
        Ok(Arc::new(rules))
    }

    fn bundled_config(&self, config: BundledConfig) -> Option<Vec<u8>> {
        match self.scope.read(config.resource_name()) {
            Some(Ok(bytes)) => Some(bytes),
            Some(Err(e)) => {
                tracing::warn!(config = %config, error = %e, "Failed to read bundled configuration");
                None
            }
            None => None,
        }
    }

    fn check(
        &self,
        checker: &EngineObject,
        path: &Path,
        content: &str,
        tab_width: usize,
    ) -> Result<Vec<Problem>, ForeignObject> {
        let Some(rules) = checker.downcast_ref::<RuleSet>() else {
            return Err(ForeignObject { engine: self.identity(), origin: "an unknown engine type".to_string() });
        };
        if rules.engine_id != self.id {
            return Err(ForeignObject { engine: self.identity(), origin: format!("engine {}", rules.engine_id) });
        }
        Ok(rules.check(path, content, tab_width))
    }
}
