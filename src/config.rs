//! Configuration management for rulehost.
//!
//! Handles loading host configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Engine loading settings
    pub engine: EngineConfig,

    /// Remote location settings
    pub network: NetworkConfig,

    /// Cache lifetimes
    pub cache: CacheConfig,

    /// Scan defaults
    pub scan: ScanConfig,
}

/// Engine loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Version manifest to use instead of the embedded one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,

    /// Root directory of versioned engine artifacts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,

    /// Copy project-internal extra classpath entries before loading them
    pub copy_libs: bool,

    /// Where copied classpath entries go
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_dir: Option<PathBuf>,

    /// Directory forming the host resource scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_resources: Option<PathBuf>,
}

/// Remote location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connect and read timeout for remote configurations
    pub timeout_secs: u64,
}

/// Cache lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Drop compiled checkers unused for this long (0 keeps them)
    pub checker_idle_secs: u64,

    /// How long fetched remote or embedded content is reused
    pub content_cache_secs: u64,
}

/// Scan defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Worker threads (0 = one per CPU)
    pub workers: usize,

    /// Abandon scans that run longer than this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Tab stop width used for column numbers
    pub tab_width: usize,

    /// Drop per-file read failures instead of reporting them
    pub suppress_errors: bool,
}

impl HostConfig {
    /// Load configuration from default locations.
    pub fn load() -> anyhow::Result<Self> {
        // Try local config first
        let local_config = PathBuf::from(".rulehost.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        // Try global config
        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.engine.expand_paths()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("rulehost"))
    }

    /// Get the cache directory path (for copied classpath entries).
    pub fn cache_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("rulehost"))
    }
}

impl EngineConfig {
    fn expand_paths(&mut self) -> anyhow::Result<()> {
        for path in [&mut self.manifest, &mut self.artifacts_dir, &mut self.copy_dir, &mut self.host_resources]
            .into_iter()
            .flatten()
        {
            let expanded = expand_path(&path.to_string_lossy())?;
            *path = expanded;
        }
        Ok(())
    }
}

/// Expand `~` and environment variables in a path.
pub fn expand_path(raw: &str) -> anyhow::Result<PathBuf> {
    Ok(PathBuf::from(shellexpand::full(raw)?.into_owned()))
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl CacheConfig {
    pub fn checker_idle(&self) -> Option<Duration> {
        (self.checker_idle_secs > 0).then(|| Duration::from_secs(self.checker_idle_secs))
    }

    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_cache_secs)
    }
}

impl ScanConfig {
    /// Effective worker count.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { manifest: None, artifacts_dir: None, copy_libs: cfg!(windows), copy_dir: None, host_resources: None }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { checker_idle_secs: 60, content_cache_secs: 2 }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { workers: 0, timeout_secs: None, tab_width: 8, suppress_errors: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.network.timeout_secs, 5);
        assert_eq!(config.cache.checker_idle(), Some(Duration::from_secs(60)));
        assert_eq!(config.scan.tab_width, 8);
        assert!(config.engine.artifacts_dir.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&HostConfig::default()).unwrap();
        assert!(toml_str.contains("[network]"));
        assert!(toml_str.contains("[scan]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [network]
            timeout_secs = 10

            [cache]
            checker_idle_secs = 0

            [scan]
            workers = 3
            suppress_errors = true
        "#;

        let config: HostConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.network.timeout(), Duration::from_secs(10));
        assert_eq!(config.cache.checker_idle(), None);
        assert_eq!(config.cache.content_cache_secs, 2);
        assert_eq!(config.scan.worker_count(), 3);
        assert!(config.scan.suppress_errors);
    }

    #[test]
    fn test_load_from_file_expands_paths() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[engine]\nartifacts_dir = \"~/engines\"\n").unwrap();

        let config = HostConfig::load_from_file(&path).unwrap();
        let artifacts = config.engine.artifacts_dir.unwrap();
        assert!(!artifacts.to_string_lossy().starts_with('~'));
        assert!(artifacts.ends_with("engines"));
    }

    #[test]
    fn test_worker_count_auto() {
        assert!(ScanConfig::default().worker_count() >= 1);
    }
}
