//! Error types for the engine host.
//!
//! Every failure a caller can observe maps onto one [`HostError`] variant.
//! Resolution, compilation and context-mix failures carry their own structured
//! types so callers can report them without string matching.

use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Errors that can occur while hosting engine versions.
#[derive(Debug, Error)]
pub enum HostError {
    /// The version manifest or startup configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A configuration location could not produce content.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The engine rejected a configuration document.
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    /// A compiled checker was handed to a context it was not built in.
    #[error(transparent)]
    ContextMix(#[from] ContextMixError),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// The operation exceeded its deadline.
    #[error("Operation timed out after {0} seconds")]
    TimedOut(u64),

    /// A version was requested that the manifest does not list.
    #[error("Engine version '{0}' is not supported")]
    UnsupportedVersion(String),

    /// An engine artifact listed by the manifest is missing.
    #[error("Cannot find engine artifact for version {version}: {path}")]
    Artifact { version: String, path: PathBuf },

    /// A location descriptor could not be turned into a location.
    #[error("Invalid configuration location: {0}")]
    InvalidLocation(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Whether the failure should abort a whole batch rather than one location.
    ///
    /// Context-loading failures concern every location alike.
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            Self::ContextMix(_)
                | Self::Cancelled
                | Self::TimedOut(_)
                | Self::Configuration(_)
                | Self::Artifact { .. }
                | Self::UnsupportedVersion(_)
        )
    }
}

/// Failure to obtain content from a configuration location.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The file or resource does not exist.
    #[error("Configuration not found: {0}")]
    NotFound(String),

    /// A remote fetch failed.
    #[error("Unable to fetch {location}: {source}")]
    Network {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The content is not a well-formed configuration document.
    #[error("Malformed configuration {location}: {reason}")]
    Malformed { location: String, reason: String },

    /// The location cannot be resolved through this path.
    #[error("Location {0} cannot be resolved directly")]
    Unsupported(String),

    /// Reading local content failed.
    #[error("Unable to read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

/// What kind of problem a compilation diagnostic describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationErrorKind {
    /// A `${name}` reference had no value.
    MissingProperty { name: String },
    /// A module named by the configuration could not be created.
    Instantiation { module: String },
    /// Anything else; reported verbatim.
    Other,
}

static MISSING_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Property '?\$\{([^}]+)\}'? has not been set").expect("valid regex")
});

static INSTANTIATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Unable to instantiate '([^']+)'").expect("valid regex"));

/// The engine rejected a configuration.
#[derive(Debug, Clone, Error)]
#[error("{}", self.friendly_message())]
pub struct CompilationError {
    /// Location the document came from.
    pub location: String,
    /// Raw diagnostic text produced by the engine.
    pub diagnostic: String,
    /// Classification of the diagnostic.
    pub kind: CompilationErrorKind,
}

impl CompilationError {
    /// Classify an engine diagnostic.
    pub fn new(location: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        let kind = if let Some(caps) = MISSING_PROPERTY.captures(&diagnostic) {
            CompilationErrorKind::MissingProperty { name: caps[1].to_string() }
        } else if let Some(caps) = INSTANTIATION.captures(&diagnostic) {
            CompilationErrorKind::Instantiation { module: caps[1].to_string() }
        } else {
            CompilationErrorKind::Other
        };
        Self { location: location.into(), diagnostic, kind }
    }

    /// A message suitable for showing to a user.
    pub fn friendly_message(&self) -> String {
        match &self.kind {
            CompilationErrorKind::MissingProperty { name } => format!(
                "The configuration {} requires the property '{}', which has no value. \
                 Set it in the location's properties.",
                self.location, name
            ),
            CompilationErrorKind::Instantiation { module } => format!(
                "The configuration {} uses the module '{}', which this engine version cannot \
                 create. Check the module name or choose a different engine version.",
                self.location, module
            ),
            CompilationErrorKind::Other => self.diagnostic.clone(),
        }
    }
}

/// A checker built in one execution context was used with another.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Checker belongs to a different engine context. Expected: {expected}, actual: {actual}")]
pub struct ContextMixError {
    /// Identity of the context the object was built in.
    pub expected: String,
    /// Identity of the context it was handed to.
    pub actual: String,
    /// Generation of the building context.
    pub expected_generation: u64,
    /// Generation of the receiving context.
    pub actual_generation: u64,
}

impl ContextMixError {
    pub fn new(
        expected: impl fmt::Display,
        expected_generation: u64,
        actual: impl fmt::Display,
        actual_generation: u64,
    ) -> Self {
        Self {
            expected: expected.to_string(),
            actual: actual.to_string(),
            expected_generation,
            actual_generation,
        }
    }
}
