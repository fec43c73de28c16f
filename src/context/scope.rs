//! Child-first resource scopes.
//!
//! A scope owns an ordered list of roots. Lookups search the scope's own
//! roots first, then the project's extra classpath, and only then delegate to
//! the parent (host) scope, so an engine always sees its own copy of a
//! resource even when the host ships one with the same name.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// One place a scope can find resources in.
#[derive(Clone)]
pub enum ScopeRoot {
    /// Every file below a directory.
    Directory(PathBuf),
    /// A single file, found by its file name.
    File(PathBuf),
    /// Resources compiled into the binary.
    Embedded(BTreeMap<String, &'static [u8]>),
}

impl fmt::Debug for ScopeRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(path) => f.debug_tuple("Directory").field(path).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Embedded(entries) => f.debug_tuple("Embedded").field(&entries.keys().collect::<Vec<_>>()).finish(),
        }
    }
}

impl ScopeRoot {
    /// Root for a classpath-style entry: directories are searched, files matched by name.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            Self::Directory(path)
        } else {
            Self::File(path)
        }
    }

    fn locate(&self, name: &str) -> Option<ResourceData> {
        match self {
            Self::Directory(dir) => {
                let candidate = dir.join(name);
                candidate.is_file().then_some(ResourceData::Path(candidate))
            }
            Self::File(file) => {
                let matches = file.file_name().is_some_and(|f| f.to_string_lossy() == name);
                (matches && file.is_file()).then(|| ResourceData::Path(file.clone()))
            }
            Self::Embedded(entries) => entries.get(name).map(|bytes| ResourceData::Embedded(*bytes)),
        }
    }
}

#[derive(Debug, Clone)]
enum ResourceData {
    Path(PathBuf),
    Embedded(&'static [u8]),
}

/// A resource found in a scope.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Name of the scope that supplied it.
    pub scope: String,
    data: ResourceData,
}

impl Resource {
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.data {
            ResourceData::Path(path) => std::fs::read(path),
            ResourceData::Embedded(bytes) => Ok(bytes.to_vec()),
        }
    }

    /// Filesystem location, when the resource is not embedded.
    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            ResourceData::Path(path) => Some(path),
            ResourceData::Embedded(_) => None,
        }
    }
}

/// Resource lookup scope.
#[derive(Debug)]
pub struct ResourceScope {
    name: String,
    roots: Vec<ScopeRoot>,
    extra: Option<Arc<ResourceScope>>,
    parent: Option<Arc<ResourceScope>>,
}

impl ResourceScope {
    /// A root scope with no parent.
    pub fn new(name: impl Into<String>, roots: Vec<ScopeRoot>) -> Self {
        Self { name: name.into(), roots, extra: None, parent: None }
    }

    /// A scope that searches `roots`, then `extra`, then `parent`.
    pub fn child(
        name: impl Into<String>,
        roots: Vec<ScopeRoot>,
        extra: Option<Arc<ResourceScope>>,
        parent: Arc<ResourceScope>,
    ) -> Self {
        Self { name: name.into(), roots, extra, parent: Some(parent) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ResourceScope>> {
        self.parent.as_ref()
    }

    /// Find a resource by name, child first.
    ///
    /// Names are relative; a leading `/` is ignored and names that would
    /// escape a root are rejected.
    pub fn locate(&self, name: &str) -> Option<Resource> {
        let name = normalize(name)?;
        self.locate_normalized(&name)
    }

    fn locate_normalized(&self, name: &str) -> Option<Resource> {
        let own = self
            .roots
            .iter()
            .find_map(|root| root.locate(name))
            .map(|data| Resource { scope: self.name.clone(), data });

        own.or_else(|| self.extra.as_ref().and_then(|extra| extra.locate_normalized(name)))
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.locate_normalized(name)))
    }

    /// Read a resource's bytes, if it exists.
    pub fn read(&self, name: &str) -> Option<std::io::Result<Vec<u8>>> {
        self.locate(name).map(|resource| resource.read())
    }
}

fn normalize(name: &str) -> Option<String> {
    let trimmed = name.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let escapes = Path::new(trimmed)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    (!escapes).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn embedded(name: &str, bytes: &'static [u8]) -> ScopeRoot {
        ScopeRoot::Embedded(BTreeMap::from([(name.to_string(), bytes)]))
    }

    #[test]
    fn test_child_resources_shadow_host() {
        let host = Arc::new(ResourceScope::new("host", vec![embedded("rules.xml", b"host")]));
        let child = ResourceScope::child("engine", vec![embedded("rules.xml", b"engine")], None, host);

        let resource = child.locate("rules.xml").unwrap();
        assert_eq!(resource.scope, "engine");
        assert_eq!(resource.read().unwrap(), b"engine");
    }

    #[test]
    fn test_falls_back_to_host() {
        let host = Arc::new(ResourceScope::new("host", vec![embedded("only-host.xml", b"host")]));
        let child = ResourceScope::child("engine", Vec::new(), None, host);
        assert_eq!(child.locate("/only-host.xml").unwrap().scope, "host");
        assert!(child.locate("missing.xml").is_none());
    }

    #[test]
    fn test_extra_classpath_before_host() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("shared.xml"), b"extra").unwrap();

        let host = Arc::new(ResourceScope::new("host", vec![embedded("shared.xml", b"host")]));
        let extra = Arc::new(ResourceScope::new("extra", vec![ScopeRoot::for_path(temp.path())]));
        let child = ResourceScope::child("engine", Vec::new(), Some(extra), host);

        assert_eq!(child.read("shared.xml").unwrap().unwrap(), b"extra");
    }

    #[test]
    fn test_file_root_matches_by_name() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("checks.xml");
        std::fs::write(&file, b"<module/>").unwrap();

        let scope = ResourceScope::new("files", vec![ScopeRoot::for_path(&file)]);
        assert_eq!(scope.locate("checks.xml").unwrap().path(), Some(file.as_path()));
        assert!(scope.locate("other.xml").is_none());
    }

    #[test]
    fn test_rejects_escaping_names() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("inner");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(temp.path().join("secret.txt"), b"no").unwrap();

        let scope = ResourceScope::new("dir", vec![ScopeRoot::for_path(&inner)]);
        assert!(scope.locate("../secret.txt").is_none());
    }
}
