#![allow(clippy::needless_collect)]
#![allow(clippy::unused_self)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::or_fun_call)]
#![allow(clippy::should_implement_trait)]

//! # Rulehost
//!
//! Host many mutually incompatible versions of a static-analysis rule engine
//! side by side.
//!
//! Rulehost loads the requested engine version on demand into an isolated
//! execution context, compiles rule configurations into checkers inside that
//! context, reuses them across scans, and refuses any checker that outlived
//! the context it was built in.
//!
//! ## Features
//!
//! - **Version registry**: supported versions, a default, and replacements for retired identifiers
//! - **Execution contexts**: child-first resource scopes with monotonically increasing generations
//! - **Configuration locations**: local, project-relative, remote, embedded and bundled documents
//! - **Checker cache**: fingerprinted, invalidated when content, properties or context change
//! - **Identity guard**: stale checkers fail with a context-mix error instead of undefined behavior
//!
//! ## Quick Start
//!
//! ```bash
//! # List the engine versions this build hosts
//! rulehost versions
//!
//! # Check sources against a configuration
//! rulehost check --config config/rules.xml src/
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::use_self)]

pub mod checker;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod location;
pub mod project;
pub mod scan;
pub mod version;

// Re-export commonly used types
pub use checker::{CheckerCache, CompiledChecker, IdentityGuard};
pub use config::HostConfig;
pub use context::{ContextTag, ExecutionContext};
pub use coordinator::{BatchScan, EngineCoordinator, Invalidation, LoadedSettings, LocationOutcome};
pub use engine::{BuiltinEngineFactory, Engine, EngineFactory, EngineObject};
pub use error::{CompilationError, CompilationErrorKind, ContextMixError, HostError, HostResult, ResolutionError};
pub use location::{BundledConfig, ConfigurationLocation, ConfigurationType, LocationDescriptor, LocationHandle};
pub use project::{Project, ProjectSettings};
pub use scan::{CancellationToken, Problem, ScanOptions, ScanResult, Severity};
pub use version::{compare_versions, SupportedVersion, VersionRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "rulehost";
