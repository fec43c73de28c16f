//! Rulehost - host multiple rule-engine versions side by side.
//!
//! Lists the engine versions this build hosts, inspects configuration
//! documents, and checks source files against them.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

use rulehost::{
    BundledConfig, CancellationToken, ConfigurationType, EngineCoordinator, HostConfig, LocationHandle, Project,
    ScanResult,
};

/// Host multiple rule-engine versions side by side
#[derive(Parser)]
#[command(name = "rulehost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Host configuration file (defaults to .rulehost.toml, then the user config)
    #[arg(long, global = true, env = "RULEHOST_CONFIG")]
    host_config: Option<PathBuf>,

    /// Project root
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported engine versions
    Versions {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the configurations bundled with every engine version
    Bundled,

    /// Show the properties a configuration references
    Properties {
        /// Configuration location (path, URL or bundled id)
        #[arg(short, long)]
        config: String,

        /// Location type (inferred when omitted)
        #[arg(short = 't', long = "type")]
        kind: Option<ConfigurationType>,
    },

    /// Check files against a configuration
    Check {
        /// Configuration location (path, URL or bundled id)
        #[arg(short, long)]
        config: String,

        /// Location type (inferred when omitted)
        #[arg(short = 't', long = "type")]
        kind: Option<ConfigurationType>,

        /// Engine version (defaults to the newest supported)
        #[arg(short = 'e', long)]
        engine_version: Option<String>,

        /// Property values (name=value)
        #[arg(short = 'p', long = "property")]
        properties: Vec<String>,

        /// Extra classpath entries
        #[arg(long)]
        classpath: Vec<PathBuf>,

        /// Only check files with these extensions
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Abandon the check after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Files or directories to check
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RULEHOST_LOG wins over --verbose
    let filter = EnvFilter::try_from_env("RULEHOST_LOG")
        .unwrap_or_else(|_| if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") });

    tracing_subscriber::registry().with(fmt::layer().with_target(false).with_writer(io::stderr)).with(filter).init();

    match cli.command {
        Commands::Versions { format } => cmd_versions(cli.host_config.as_deref(), &format),
        Commands::Bundled => {
            cmd_bundled();
            Ok(())
        }
        Commands::Properties { config, kind } => {
            cmd_properties(cli.host_config.as_deref(), &cli.project, &config, kind)
        }
        Commands::Check { config, kind, engine_version, properties, classpath, extensions, timeout, format, paths } => {
            let request = CheckRequest {
                config,
                kind,
                engine_version,
                properties,
                classpath,
                extensions,
                timeout,
                format,
                paths,
            };
            let has_errors = cmd_check(cli.host_config.as_deref(), &cli.project, request)?;
            if has_errors {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
        Commands::Config { path } => cmd_config(cli.host_config.as_deref(), path),
    }
}

fn load_config(path: Option<&Path>) -> Result<HostConfig> {
    match path {
        Some(path) => HostConfig::load_from_file(path),
        None => HostConfig::load(),
    }
}

fn coordinator(config_path: Option<&Path>) -> Result<EngineCoordinator> {
    let config = load_config(config_path)?;
    EngineCoordinator::new(config).context("Failed to start engine host")
}

fn project_at(root: &Path) -> Result<Project> {
    let root = root.canonicalize().with_context(|| format!("Project directory {} not found", root.display()))?;
    Ok(Project::at(root))
}

/// List supported versions.
fn cmd_versions(config_path: Option<&Path>, format: &str) -> Result<()> {
    let coordinator = coordinator(config_path)?;
    let versions = coordinator.list_supported_versions();
    let default = coordinator.default_version();

    match format {
        "json" => {
            let json = serde_json::json!({ "supported": versions, "default": default });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            for version in &versions {
                let marker = if version == default { " (default)" } else { "" };
                println!("{version}{marker}");
            }
        }
    }
    Ok(())
}

fn cmd_bundled() {
    for config in BundledConfig::ALL {
        println!("{:<24} {}", config.id(), config.description());
    }
}

/// Print the properties a configuration references.
fn cmd_properties(
    config_path: Option<&Path>,
    project_root: &Path,
    location: &str,
    kind: Option<ConfigurationType>,
) -> Result<()> {
    let coordinator = coordinator(config_path)?;
    let project = project_at(project_root)?;
    let location = create_location(&coordinator, &project, location, kind)?;

    let context = coordinator.active_context(&project)?;
    location.ensure_properties_up_to_date(&context)?;

    let properties = location.properties();
    if properties.is_empty() {
        println!("{} references no properties", location.description());
        return Ok(());
    }
    for (name, value) in &properties {
        match value {
            Some(value) => println!("{name} = {value}"),
            None => println!("{name} (unset)"),
        }
    }
    Ok(())
}

struct CheckRequest {
    config: String,
    kind: Option<ConfigurationType>,
    engine_version: Option<String>,
    properties: Vec<String>,
    classpath: Vec<PathBuf>,
    extensions: Vec<String>,
    timeout: Option<u64>,
    format: String,
    paths: Vec<PathBuf>,
}

/// Check files; returns whether any error-severity problem was found.
fn cmd_check(config_path: Option<&Path>, project_root: &Path, request: CheckRequest) -> Result<bool> {
    let coordinator = coordinator(config_path)?;
    let project = project_at(project_root)?;

    let version = request.engine_version.unwrap_or_else(|| coordinator.default_version().to_string());
    let context = coordinator.activate_version(&project, &version, &request.classpath)?;
    tracing::info!(context = %context.identity(), "Using engine context");

    let properties = parse_properties(&request.properties)?;
    let location = create_location(&coordinator, &project, &request.config, request.kind)?;
    let checker = coordinator.resolve_and_compile(&location, &properties)?;

    let files = collect_files(&request.paths, &request.extensions)?;

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %e, "Unable to install Ctrl-C handler");
    }

    let mut options = coordinator.scan_options();
    if let Some(secs) = request.timeout {
        options.timeout = Some(Duration::from_secs(secs));
    }
    let result = coordinator.scan(&project, &checker, &files, &options, &cancel)?;

    match request.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }
    Ok(result.has_errors())
}

fn print_text(result: &ScanResult) {
    for (path, problems) in &result.problems {
        for problem in problems {
            println!("{}: {}", path.display(), problem);
        }
    }
    for failure in &result.failures {
        eprintln!("{}: {}", failure.path.display(), failure.message);
    }
    println!("\nChecked {} files: {} problems", result.files_scanned, result.problem_count());
}

/// Location for a command-line argument, inferring the type when not given.
fn create_location(
    coordinator: &EngineCoordinator,
    project: &Project,
    location: &str,
    kind: Option<ConfigurationType>,
) -> Result<LocationHandle> {
    let kind = kind.unwrap_or_else(|| infer_type(location));
    let location = match kind {
        ConfigurationType::LocalFile => absolute(location)?.to_string_lossy().into_owned(),
        _ => location.to_string(),
    };
    Ok(coordinator.create_location(project, kind, &location, None)?)
}

fn infer_type(location: &str) -> ConfigurationType {
    let lower = location.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        ConfigurationType::HttpUrl
    } else if BundledConfig::from_id(location).is_some() {
        ConfigurationType::Bundled
    } else {
        ConfigurationType::LocalFile
    }
}

fn absolute(path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(std::env::current_dir()?.join(path))
}

fn parse_properties(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|entry| {
            let (name, value) =
                entry.split_once('=').with_context(|| format!("Property '{entry}' must be name=value"))?;
            Ok((name.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Files named directly plus every file under named directories.
fn collect_files(paths: &[PathBuf], extensions: &[String]) -> Result<Vec<PathBuf>> {
    let wanted = |path: &Path| {
        extensions.is_empty()
            || path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(e)))
    };

    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.exists() {
            anyhow::bail!("{} does not exist", path.display());
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && wanted(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "rulehost", &mut io::stdout());
}

/// Show configuration.
fn cmd_config(config_path: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        if let Some(path) = HostConfig::config_dir() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = load_config(config_path)?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}
