//! Checker cache keyed by fingerprint.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::fingerprint::{checker_fingerprint, content_fingerprint};
use super::CompiledChecker;
use crate::context::ExecutionContext;
use crate::error::{CompilationError, HostResult};
use crate::location::{non_empty, ConfigurationLocation, LocationKey};

/// Properties every document may reference without the user setting them.
const PROJECT_PROPERTIES: [&str; 3] = ["basedir", "project_loc", "workspace_loc"];
const LOCATION_PROPERTIES: [&str; 2] = ["config_loc", "samedir"];

#[derive(Debug)]
struct Entry {
    checker: Arc<CompiledChecker>,
    last_used: Instant,
}

/// Compiled checkers shared across scans.
///
/// Failed compilations are never stored; the next request tries again.
#[derive(Debug, Default)]
pub struct CheckerCache {
    idle: Option<Duration>,
    entries: Mutex<HashMap<String, Entry>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    compilations: AtomicUsize,
}

impl CheckerCache {
    /// Cache that drops checkers unused for longer than `idle`.
    pub fn new(idle: Option<Duration>) -> Self {
        Self { idle, ..Self::default() }
    }

    /// The checker for `location` with `overrides`, compiling it in `context` on a miss.
    pub fn get(
        &self,
        context: &ExecutionContext,
        location: &ConfigurationLocation,
        overrides: &BTreeMap<String, String>,
    ) -> HostResult<Arc<CompiledChecker>> {
        location.ensure_properties_up_to_date(context)?;

        let properties = effective_properties(location, overrides);
        let fingerprint = checker_fingerprint(location.key(), &properties, context.tag());

        if let Some(hit) = self.lookup(&fingerprint, context) {
            return Ok(hit);
        }

        // One compile per fingerprint; latecomers wait and take the result.
        let gate = Arc::clone(self.gates.lock().entry(fingerprint.clone()).or_default());
        let _compiling = gate.lock();
        if let Some(hit) = self.lookup(&fingerprint, context) {
            return Ok(hit);
        }

        let result = self.compile(context, location, properties, fingerprint.clone());
        if let Ok(checker) = &result {
            let entry = Entry { checker: Arc::clone(checker), last_used: Instant::now() };
            self.entries.lock().insert(fingerprint.clone(), entry);
        }
        // Publish before releasing the gate.
        self.gates.lock().remove(&fingerprint);
        result
    }

    fn lookup(&self, fingerprint: &str, context: &ExecutionContext) -> Option<Arc<CompiledChecker>> {
        let mut entries = self.entries.lock();
        if let Some(idle) = self.idle {
            entries.retain(|_, entry| entry.last_used.elapsed() < idle);
        }
        let entry = entries.get_mut(fingerprint)?;
        if entry.checker.tag() != context.tag() {
            return None;
        }
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.checker))
    }

    fn compile(
        &self,
        context: &ExecutionContext,
        location: &ConfigurationLocation,
        properties: BTreeMap<String, String>,
        fingerprint: String,
    ) -> HostResult<Arc<CompiledChecker>> {
        let content = location.load(context)?;
        let started = Instant::now();
        let object = context
            .engine()
            .compile(&content, &properties)
            .map_err(|diagnostic| CompilationError::new(location.description(), diagnostic))?;
        self.compilations.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            location = %location.key(),
            context = %context.identity(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compiled checker"
        );
        Ok(Arc::new(CompiledChecker::new(
            context.tag().clone(),
            location.key().clone(),
            properties,
            fingerprint,
            content_fingerprint(&content),
            object,
        )))
    }

    /// Drop every checker compiled from `location`.
    pub fn invalidate(&self, location: &LocationKey) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.checker.location() != location);
        before - entries.len()
    }

    /// Drop checkers of `location` compiled from content other than `content_fingerprint`.
    pub fn drop_changed(&self, location: &LocationKey, content_fingerprint: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.checker.location() != location || entry.checker.content_fingerprint() == content_fingerprint
        });
        before - entries.len()
    }

    pub fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        dropped
    }

    /// Drop every checker built in a context of `generation`.
    pub fn invalidate_generation(&self, generation: u64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.checker.generation() != generation);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful compilations so far.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }
}

/// Location properties with values, overlaid by `overrides`, plus the implicit path properties.
fn effective_properties(
    location: &ConfigurationLocation,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut properties = non_empty(&location.properties());
    properties.extend(overrides.iter().map(|(name, value)| (name.clone(), value.clone())));

    let project_root = location.project().root().map(|root| root.display().to_string());
    let base_dir = location.base_dir().map(|dir| dir.display().to_string()).or_else(|| project_root.clone());

    let implicit = PROJECT_PROPERTIES
        .iter()
        .map(|name| (*name, &project_root))
        .chain(LOCATION_PROPERTIES.iter().map(|name| (*name, &base_dir)));
    for (name, value) in implicit {
        if let Some(value) = value {
            properties.entry(name.to_string()).or_insert_with(|| value.clone());
        }
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::{ContextLoader, ResourceScope};
    use crate::engine::BuiltinEngineFactory;
    use crate::error::{CompilationErrorKind, HostError};
    use crate::location::{ConfigurationType, LocationFactory, LocationHandle};
    use crate::project::Project;
    use crate::version::{SupportedVersion, VersionManifest, VersionRegistry};
    use std::thread;
    use tempfile::TempDir;

    const RULES: &str = r#"<module name="Checker">
    <module name="LineLength"><property name="max" value="${maxLen}"/></module>
</module>"#;

    struct Fixture {
        _dir: TempDir,
        project: Project,
        loader: ContextLoader,
        location: LocationHandle,
        _factory: LocationFactory,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("rules.xml"), RULES).unwrap();
        let project = Project::new("demo", Some(dir.path().to_path_buf()));

        let manifest = VersionManifest::from_toml_str("[versions]\nsupported = [\"9.3\", \"10.12.4\"]\n").unwrap();
        let loader = ContextLoader::new(
            Arc::new(VersionRegistry::new(manifest)),
            Arc::new(BuiltinEngineFactory),
            Arc::new(ResourceScope::new("host", Vec::new())),
            EngineConfig::default(),
        );
        let factory = LocationFactory::default();
        let location = factory.create(&project, ConfigurationType::ProjectRelative, "rules.xml", None).unwrap();
        Fixture { _dir: dir, project, loader, location, _factory: factory }
    }

    fn props(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_missing_property_is_not_cached() {
        let f = fixture();
        let cache = CheckerCache::default();
        let context = f.loader.active_context(&f.project).unwrap();

        let err = cache.get(&context, &f.location, &BTreeMap::new()).unwrap_err();
        match err {
            HostError::Compilation(e) => {
                assert_eq!(e.kind, CompilationErrorKind::MissingProperty { name: "maxLen".to_string() })
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(cache.is_empty());
        assert!(f.location.properties().contains_key("maxLen"));
    }

    #[test]
    fn test_hit_returns_same_instance() {
        let f = fixture();
        let cache = CheckerCache::default();
        let context = f.loader.active_context(&f.project).unwrap();

        let first = cache.get(&context, &f.location, &props(&[("maxLen", "120")])).unwrap();
        let second = cache.get(&context, &f.location, &props(&[("maxLen", "120")])).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.compilations(), 1);

        let third = cache.get(&context, &f.location, &props(&[("maxLen", "100")])).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_location_properties_feed_the_fingerprint() {
        let f = fixture();
        let cache = CheckerCache::default();
        let context = f.loader.active_context(&f.project).unwrap();
        let _ = f.location.ensure_properties_up_to_date(&context);

        let mut stored = f.location.properties();
        stored.insert("maxLen".to_string(), Some("80".to_string()));
        f.location.set_properties(stored);

        let checker = cache.get(&context, &f.location, &BTreeMap::new()).unwrap();
        assert_eq!(checker.properties().get("maxLen").map(String::as_str), Some("80"));
        assert!(checker.properties().contains_key("basedir"));
        assert!(checker.properties().contains_key("config_loc"));
    }

    #[test]
    fn test_new_generation_misses() {
        let f = fixture();
        let cache = CheckerCache::default();
        let old = f.loader.active_context(&f.project).unwrap();
        let before = cache.get(&old, &f.location, &props(&[("maxLen", "120")])).unwrap();

        f.loader.reset(&f.project);
        let new = f.loader.active_context(&f.project).unwrap();
        let after = cache.get(&new, &f.location, &props(&[("maxLen", "120")])).unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(cache.invalidate_generation(old.generation()), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_location() {
        let f = fixture();
        let cache = CheckerCache::default();
        let context = f.loader.active_context(&f.project).unwrap();
        cache.get(&context, &f.location, &props(&[("maxLen", "120")])).unwrap();
        cache.get(&context, &f.location, &props(&[("maxLen", "90")])).unwrap();

        assert_eq!(cache.invalidate(f.location.key()), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_idle_entries_expire() {
        let f = fixture();
        let cache = CheckerCache::new(Some(Duration::ZERO));
        let context = f.loader.active_context(&f.project).unwrap();
        let first = cache.get(&context, &f.location, &props(&[("maxLen", "120")])).unwrap();
        let second = cache.get(&context, &f.location, &props(&[("maxLen", "120")])).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_requests_compile_once() {
        let f = fixture();
        let cache = CheckerCache::default();
        let context = f.loader.active_context(&f.project).unwrap();
        let overrides = props(&[("maxLen", "120")]);

        let checkers: Vec<Arc<CompiledChecker>> = thread::scope(|s| {
            let handles: Vec<_> =
                (0..8).map(|_| s.spawn(|| cache.get(&context, &f.location, &overrides).unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(checkers.iter().all(|c| Arc::ptr_eq(c, &checkers[0])));
        assert_eq!(cache.compilations(), 1);
    }

    #[test]
    fn test_gates_are_released_after_publishing() {
        let f = fixture();
        let cache = CheckerCache::default();
        let context = f.loader.active_context(&f.project).unwrap();

        assert!(cache.get(&context, &f.location, &BTreeMap::new()).is_err());
        assert!(cache.gates.lock().is_empty());

        let checker = cache.get(&context, &f.location, &props(&[("maxLen", "120")])).unwrap();
        assert!(cache.gates.lock().is_empty());
        assert!(Arc::ptr_eq(&checker, &cache.entries.lock()[checker.fingerprint()].checker));
    }

    #[test]
    fn test_drop_changed_keeps_current_content() {
        let f = fixture();
        let cache = CheckerCache::default();
        let context = f.loader.active_context(&f.project).unwrap();
        let checker = cache.get(&context, &f.location, &props(&[("maxLen", "120")])).unwrap();

        assert_eq!(cache.drop_changed(f.location.key(), checker.content_fingerprint()), 0);
        assert_eq!(cache.drop_changed(f.location.key(), &content_fingerprint(b"<module name=\"Checker\"/>")), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_version_is_recorded() {
        let f = fixture();
        let cache = CheckerCache::default();
        let context = f.loader.activate_version(&f.project, &SupportedVersion::from("9.3"), &[]).unwrap().context;
        let checker = cache.get(&context, &f.location, &props(&[("maxLen", "120")])).unwrap();
        assert_eq!(checker.tag().version.as_str(), "9.3");
    }
}
