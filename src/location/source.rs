//! Where each kind of location reads its content from.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tempfile::NamedTempFile;

use super::bundled::BundledConfig;
use super::paths;
use crate::context::ExecutionContext;
use crate::error::ResolutionError;
use crate::project::Project;

/// Content fetched earlier and reused for a short while.
#[derive(Debug, Clone)]
struct CachedContent {
    bytes: Vec<u8>,
    /// Context generation the content was read through; `None` when it does not depend on one
    generation: Option<u64>,
    fetched_at: Instant,
}

impl CachedContent {
    fn new(bytes: Vec<u8>, generation: Option<u64>) -> Self {
        Self { bytes, generation, fetched_at: Instant::now() }
    }

    fn fresh(&self, ttl: Duration, generation: Option<u64>) -> bool {
        self.generation == generation && self.fetched_at.elapsed() < ttl
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    /// Private copy of the last download, kept for the life of the location
    file: Option<NamedTempFile>,
    cached: Option<CachedContent>,
}

/// Per-kind content source of a location.
#[derive(Debug)]
pub(crate) enum ContentSource {
    File,
    Remote { insecure: bool, timeout: Duration, ttl: Duration, state: Mutex<RemoteState> },
    Embedded { ttl: Duration, cached: Mutex<Option<CachedContent>> },
    Bundled(BundledConfig),
}

impl ContentSource {
    pub(crate) fn remote(insecure: bool, timeout: Duration, ttl: Duration) -> Self {
        Self::Remote { insecure, timeout, ttl, state: Mutex::new(RemoteState::default()) }
    }

    pub(crate) fn embedded(ttl: Duration) -> Self {
        Self::Embedded { ttl, cached: Mutex::new(None) }
    }

    /// Read the content named by `raw`.
    pub(crate) fn read(
        &self,
        project: &Project,
        raw: &str,
        context: &ExecutionContext,
    ) -> Result<Vec<u8>, ResolutionError> {
        match self {
            Self::File => read_file(&paths::detokenise(project, raw), raw),
            Self::Remote { insecure, timeout, ttl, state } => {
                if let Some(hit) = state.lock().cached.as_ref().filter(|c| c.fresh(*ttl, None)) {
                    return Ok(hit.bytes.clone());
                }

                let bytes = fetch(raw, *insecure, *timeout)?;

                let mut state = state.lock();
                keep_private_copy(&mut state.file, &bytes, raw)?;
                state.cached = Some(CachedContent::new(bytes.clone(), None));
                Ok(bytes)
            }
            Self::Embedded { ttl, cached } => {
                let generation = Some(context.generation());
                if let Some(hit) = cached.lock().as_ref().filter(|c| c.fresh(*ttl, generation)) {
                    return Ok(hit.bytes.clone());
                }

                let resource =
                    context.scope().locate(raw).ok_or_else(|| ResolutionError::NotFound(raw.to_string()))?;
                let bytes = resource
                    .read()
                    .map_err(|source| ResolutionError::Io { location: raw.to_string(), source })?;

                *cached.lock() = Some(CachedContent::new(bytes.clone(), generation));
                Ok(bytes)
            }
            Self::Bundled(config) => context
                .engine()
                .bundled_config(*config)
                .ok_or_else(|| ResolutionError::NotFound(config.id().to_string())),
        }
    }

    /// Path of the private copy of remote content, once fetched.
    pub(crate) fn local_copy(&self) -> Option<PathBuf> {
        match self {
            Self::Remote { state, .. } => state.lock().file.as_ref().map(|f| f.path().to_path_buf()),
            _ => None,
        }
    }

    pub(crate) fn clear_cache(&self) {
        match self {
            Self::Remote { state, .. } => state.lock().cached = None,
            Self::Embedded { cached, .. } => *cached.lock() = None,
            Self::File | Self::Bundled(_) => {}
        }
    }
}

fn read_file(path: &std::path::Path, raw: &str) -> Result<Vec<u8>, ResolutionError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ResolutionError::NotFound(path.display().to_string()))
        }
        Err(source) => Err(ResolutionError::Io { location: raw.to_string(), source }),
    }
}

/// Write `bytes` to the location's private copy, creating it on first use.
///
/// The copy stays in `slot` even when the write fails.
fn keep_private_copy(slot: &mut Option<NamedTempFile>, bytes: &[u8], raw: &str) -> Result<(), ResolutionError> {
    let io_error = |source| ResolutionError::Io { location: raw.to_string(), source };
    if slot.is_none() {
        let created = tempfile::Builder::new().prefix("rulehost-").suffix(".xml").tempfile().map_err(io_error)?;
        *slot = Some(created);
    }
    let Some(file) = slot.as_mut() else {
        return Ok(());
    };
    file.as_file_mut().set_len(0).map_err(io_error)?;
    let mut handle = file.reopen().map_err(io_error)?;
    handle.write_all(bytes).map_err(io_error)?;
    handle.flush().map_err(io_error)?;
    Ok(())
}

#[cfg(feature = "http")]
fn fetch(url: &str, insecure: bool, timeout: Duration) -> Result<Vec<u8>, ResolutionError> {
    let network = |source: reqwest::Error| ResolutionError::Network {
        location: redact(url),
        source: Box::new(source),
    };

    let mut parsed = reqwest::Url::parse(url).map_err(|e| ResolutionError::Malformed {
        location: redact(url),
        reason: e.to_string(),
    })?;
    let credentials = (!parsed.username().is_empty()).then(|| {
        let user = decode(parsed.username());
        let password = parsed.password().map(decode);
        (user, password)
    });
    // Credentials travel as a header, never in the request line.
    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(format!("rulehost/{}", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(insecure)
        .build()
        .map_err(network)?;

    let mut request = client.get(parsed);
    if let Some((user, password)) = credentials {
        request = request.basic_auth(user, password);
    }

    tracing::info!(url = %redact(url), insecure, "Fetching remote configuration");
    let response = request.send().and_then(|r| r.error_for_status()).map_err(network)?;
    let bytes = response.bytes().map_err(network)?;
    Ok(bytes.to_vec())
}

#[cfg(not(feature = "http"))]
fn fetch(url: &str, _insecure: bool, _timeout: Duration) -> Result<Vec<u8>, ResolutionError> {
    Err(ResolutionError::Unsupported(redact(url)))
}

#[cfg(feature = "http")]
fn decode(value: &str) -> String {
    urlencoding::decode(value).map(|v| v.into_owned()).unwrap_or_else(|_| value.to_string())
}

/// URL with any user-info removed, for logs and errors.
pub(crate) fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://{}", scheme, &rest[at + 1..]),
        None => url.to_string(),
    }
}
