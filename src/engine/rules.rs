//! Built-in rules and configuration compilation.
//!
//! Compiling walks the module tree, substitutes `${name}` references from the
//! supplied properties, checks every module against the engine version it is
//! compiled for, and produces a [`RuleSet`] that can check files.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use uuid::Uuid;

use super::document::{ModuleNode, PropertyNode};
use crate::scan::{Problem, Severity};
use crate::version::SupportedVersion;

static PROPERTY_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").expect("valid regex"));

/// First version where `LineLength` belongs to `Checker` instead of `TreeWalker`.
const LINE_LENGTH_MOVED: &str = "8.24";

/// Where a module may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Checker,
    TreeWalker,
}

impl Placement {
    fn name(self) -> &'static str {
        match self {
            Self::Checker => "Checker",
            Self::TreeWalker => "TreeWalker",
        }
    }
}

struct RuleDef {
    name: &'static str,
    since: &'static str,
    properties: &'static [&'static str],
}

const COMMON_PROPERTIES: &[&str] = &["severity", "id", "fileExtensions"];

const RULES: &[RuleDef] = &[
    RuleDef { name: "LineLength", since: "3.0", properties: &["max", "ignorePattern"] },
    RuleDef { name: "FileTabCharacter", since: "5.0", properties: &["eachLine"] },
    RuleDef { name: "NewlineAtEndOfFile", since: "3.1", properties: &["lineSeparator"] },
    RuleDef { name: "FileLength", since: "3.2", properties: &["max"] },
    RuleDef { name: "RegexpSingleline", since: "5.0", properties: &["format", "message", "ignoreCase", "minimum", "maximum"] },
    RuleDef { name: "TodoComment", since: "3.0", properties: &["format"] },
];

const CHECKER_PROPERTIES: &[&str] =
    &["severity", "charset", "fileExtensions", "tabWidth", "localeCountry", "localeLanguage", "basedir", "haltOnException"];

const TREE_WALKER_PROPERTIES: &[&str] = &["severity", "tabWidth", "fileExtensions", "id"];

/// A compiled rule.
#[derive(Debug, Clone)]
enum Rule {
    LineLength { max: usize, ignore: Option<Regex> },
    FileTabCharacter { each_line: bool },
    NewlineAtEndOfFile { separator: LineSeparator },
    FileLength { max: usize },
    RegexpSingleline { format: Regex, message: Option<String> },
    TodoComment { format: Regex },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineSeparator {
    Lf,
    CrLf,
    Cr,
    Any,
}

#[derive(Debug, Clone)]
struct ActiveRule {
    id: String,
    severity: Severity,
    file_extensions: Vec<String>,
    rule: Rule,
}

/// Rules compiled from one configuration by one engine instance.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Engine instance that compiled these rules
    pub(crate) engine_id: Uuid,
    rules: Vec<ActiveRule>,
    tab_width: Option<usize>,
    file_extensions: Vec<String>,
}

impl RuleSet {
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Check one file's content.
    pub fn check(&self, path: &Path, content: &str, default_tab_width: usize) -> Vec<Problem> {
        if !matches_extension(path, &self.file_extensions) {
            return Vec::new();
        }
        let tab_width = self.tab_width.unwrap_or(default_tab_width).max(1);
        let lines: Vec<&str> = content.lines().collect();

        let mut problems = Vec::new();
        for active in &self.rules {
            if !matches_extension(path, &active.file_extensions) {
                continue;
            }
            for (line, column, message) in active.rule.check(content, &lines, tab_width) {
                problems.push(Problem {
                    rule: active.id.clone(),
                    severity: active.severity,
                    line,
                    column,
                    message,
                });
            }
        }
        problems.sort_by(|a, b| (a.line, a.column).cmp(&(b.line, b.column)));
        problems
    }
}

/// Compile a parsed configuration for `version`.
pub fn compile(
    root: &ModuleNode,
    properties: &BTreeMap<String, String>,
    version: &SupportedVersion,
    engine_id: Uuid,
) -> Result<RuleSet, String> {
    let root_name = canonical_name(&root.name);
    if root_name != "Checker" {
        return Err(instantiation_failure(&root_name, &root.name));
    }

    let root_props = resolve_properties(root, &root_name, CHECKER_PROPERTIES, properties)?;
    let severity = severity_of(&root_props, &root_name, Severity::Error)?;
    let mut set = RuleSet {
        engine_id,
        rules: Vec::new(),
        tab_width: root_props.get("tabWidth").map(|v| parse_number(&root_name, "tabWidth", v)).transpose()?,
        file_extensions: extensions(&root_props),
    };

    for child in &root.children {
        let name = canonical_name(&child.name);
        if name == "TreeWalker" {
            let walker_props = resolve_properties(child, &name, TREE_WALKER_PROPERTIES, properties)?;
            let walker_severity = severity_of(&walker_props, &name, severity)?;
            if let Some(width) = walker_props.get("tabWidth") {
                set.tab_width = Some(parse_number(&name, "tabWidth", width)?);
            }
            for check in &child.children {
                add_rule(&mut set, check, Placement::TreeWalker, walker_severity, properties, version)?;
            }
        } else {
            add_rule(&mut set, child, Placement::Checker, severity, properties, version)?;
        }
    }

    Ok(set)
}

fn add_rule(
    set: &mut RuleSet,
    node: &ModuleNode,
    parent: Placement,
    inherited: Severity,
    properties: &BTreeMap<String, String>,
    version: &SupportedVersion,
) -> Result<(), String> {
    let name = canonical_name(&node.name);
    let Some(def) = RULES.iter().find(|def| def.name == name) else {
        return Err(instantiation_failure(parent.name(), &node.name));
    };
    if version < &SupportedVersion::from(def.since) {
        return Err(instantiation_failure(parent.name(), &node.name));
    }
    if placement_for(def.name, version) != parent {
        return Err(format!(
            "cannot initialize module {parent} - {parent} is not allowed as a parent of {name} \
             Please review 'Parent Module' section for this Check in web documentation if Check is standard.",
            parent = parent.name(),
            name = def.name
        ));
    }

    let allowed: Vec<&str> = COMMON_PROPERTIES.iter().chain(def.properties).copied().collect();
    let props = resolve_properties(node, def.name, &allowed, properties)?;
    let severity = severity_of(&props, def.name, inherited)?;
    if severity == Severity::Ignore {
        return Ok(());
    }

    let rule = build_rule(def.name, &props)?;
    set.rules.push(ActiveRule {
        id: props.get("id").cloned().unwrap_or_else(|| def.name.to_string()),
        severity,
        file_extensions: extensions(&props),
        rule,
    });
    Ok(())
}

fn placement_for(name: &str, version: &SupportedVersion) -> Placement {
    match name {
        "TodoComment" => Placement::TreeWalker,
        "LineLength" if version < &SupportedVersion::from(LINE_LENGTH_MOVED) => Placement::TreeWalker,
        _ => Placement::Checker,
    }
}

fn build_rule(name: &str, props: &BTreeMap<String, String>) -> Result<Rule, String> {
    let rule = match name {
        "LineLength" => Rule::LineLength {
            max: props.get("max").map(|v| parse_number(name, "max", v)).transpose()?.unwrap_or(80),
            ignore: props.get("ignorePattern").map(|v| parse_regex(name, "ignorePattern", v, false)).transpose()?,
        },
        "FileTabCharacter" => Rule::FileTabCharacter {
            each_line: props.get("eachLine").map(|v| parse_bool(name, "eachLine", v)).transpose()?.unwrap_or(false),
        },
        "NewlineAtEndOfFile" => Rule::NewlineAtEndOfFile {
            separator: match props.get("lineSeparator").map(|v| v.trim().to_ascii_lowercase()).as_deref() {
                None | Some("lf_cr_crlf") => LineSeparator::Any,
                Some("lf") => LineSeparator::Lf,
                Some("crlf") => LineSeparator::CrLf,
                Some("cr") => LineSeparator::Cr,
                Some("system") if cfg!(windows) => LineSeparator::CrLf,
                Some("system") => LineSeparator::Lf,
                Some(other) => return Err(illegal_value(name, "lineSeparator", other)),
            },
        },
        "FileLength" => Rule::FileLength {
            max: props.get("max").map(|v| parse_number(name, "max", v)).transpose()?.unwrap_or(2000),
        },
        "RegexpSingleline" => {
            let ignore_case =
                props.get("ignoreCase").map(|v| parse_bool(name, "ignoreCase", v)).transpose()?.unwrap_or(false);
            let format = props.get("format").map(String::as_str).unwrap_or("$.");
            Rule::RegexpSingleline {
                format: parse_regex(name, "format", format, ignore_case)?,
                message: props.get("message").filter(|m| !m.is_empty()).cloned(),
            }
        }
        "TodoComment" => Rule::TodoComment {
            format: parse_regex(name, "format", props.get("format").map(String::as_str).unwrap_or("TODO:"), false)?,
        },
        other => return Err(instantiation_failure("Checker", other)),
    };
    Ok(rule)
}

impl Rule {
    fn check(&self, content: &str, lines: &[&str], tab_width: usize) -> Vec<(usize, usize, String)> {
        let mut found = Vec::new();
        match self {
            Self::LineLength { max, ignore } => {
                for (idx, line) in lines.iter().enumerate() {
                    let width = expanded_width(line, line.len(), tab_width);
                    if width > *max && !ignore.as_ref().is_some_and(|re| re.is_match(line)) {
                        found.push((
                            idx + 1,
                            1,
                            format!("Line is longer than {} characters (found {}).", max, width),
                        ));
                    }
                }
            }
            Self::FileTabCharacter { each_line } => {
                for (idx, line) in lines.iter().enumerate() {
                    if let Some(pos) = line.find('\t') {
                        let column = expanded_width(line, pos, tab_width) + 1;
                        if *each_line {
                            found.push((idx + 1, column, "Line contains a tab character.".to_string()));
                        } else {
                            found.push((
                                idx + 1,
                                column,
                                "File contains tab characters (this is the first instance).".to_string(),
                            ));
                            break;
                        }
                    }
                }
            }
            Self::NewlineAtEndOfFile { separator } => {
                let ok = content.is_empty()
                    || match separator {
                        LineSeparator::Any => content.ends_with('\n') || content.ends_with('\r'),
                        LineSeparator::Lf => content.ends_with('\n') && !content.ends_with("\r\n"),
                        LineSeparator::CrLf => content.ends_with("\r\n"),
                        LineSeparator::Cr => content.ends_with('\r'),
                    };
                if !ok {
                    found.push((1, 1, "File does not end with a newline.".to_string()));
                }
            }
            Self::FileLength { max } => {
                if lines.len() > *max {
                    found.push((1, 1, format!("File length is {} lines (max allowed is {}).", lines.len(), max)));
                }
            }
            Self::RegexpSingleline { format, message } => {
                for (idx, line) in lines.iter().enumerate() {
                    if let Some(m) = format.find(line) {
                        let text = message
                            .clone()
                            .unwrap_or_else(|| format!("Line matches the illegal pattern '{}'.", format.as_str()));
                        found.push((idx + 1, expanded_width(line, m.start(), tab_width) + 1, text));
                    }
                }
            }
            Self::TodoComment { format } => {
                for (idx, line) in lines.iter().enumerate() {
                    let Some(start) = line.find("//").or_else(|| line.find("/*")) else {
                        continue;
                    };
                    if format.is_match(&line[start + 2..]) {
                        found.push((
                            idx + 1,
                            expanded_width(line, start, tab_width) + 1,
                            format!("Comment matches to-do format '{}'.", format.as_str()),
                        ));
                    }
                }
            }
        }
        found
    }
}

/// Display width of `line[..end]` with tabs expanded to `tab_width` stops.
fn expanded_width(line: &str, end: usize, tab_width: usize) -> usize {
    line[..end].chars().fold(0, |width, c| if c == '\t' { (width / tab_width + 1) * tab_width } else { width + 1 })
}

/// Resolve a module's properties, substituting `${name}` references.
fn resolve_properties(
    node: &ModuleNode,
    module: &str,
    allowed: &[&str],
    properties: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, String> {
    let mut resolved = BTreeMap::new();
    for property in &node.properties {
        if !allowed.contains(&property.name.as_str()) {
            return Err(format!(
                "cannot initialize module {} - Property '{}' does not exist, please check the documentation",
                module, property.name
            ));
        }
        resolved.insert(property.name.clone(), substitute(property, properties)?);
    }
    Ok(resolved)
}

fn substitute(property: &PropertyNode, properties: &BTreeMap<String, String>) -> Result<String, String> {
    let mut missing: Option<String> = None;
    let value = PROPERTY_REFERENCE.replace_all(&property.value, |caps: &regex::Captures<'_>| {
        match properties.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    match (missing, &property.default) {
        (None, _) => Ok(value.into_owned()),
        (Some(_), Some(default)) => Ok(default.clone()),
        (Some(name), None) => Err(format!("Property ${{{}}} has not been set", name)),
    }
}

fn severity_of(props: &BTreeMap<String, String>, module: &str, inherited: Severity) -> Result<Severity, String> {
    match props.get("severity") {
        Some(value) => value.parse().map_err(|_| illegal_value(module, "severity", value)),
        None => Ok(inherited),
    }
}

fn extensions(props: &BTreeMap<String, String>) -> Vec<String> {
    props
        .get("fileExtensions")
        .map(|v| {
            v.split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
}

/// Accepts short names, `...Check` class names and fully qualified names.
fn canonical_name(name: &str) -> String {
    let short = name.trim().rsplit('.').next().unwrap_or_default();
    match short.strip_suffix("Check") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => short.to_string(),
    }
}

fn instantiation_failure(parent: &str, name: &str) -> String {
    format!("cannot initialize module {} - Unable to instantiate '{}' class", parent, name)
}

fn illegal_value(module: &str, property: &str, value: &str) -> String {
    format!("cannot initialize module {} - illegal value '{}' for property '{}'", module, value, property)
}

fn parse_number(module: &str, property: &str, value: &str) -> Result<usize, String> {
    value.trim().parse().map_err(|_| illegal_value(module, property, value))
}

fn parse_bool(module: &str, property: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        _ => Err(illegal_value(module, property, value)),
    }
}

fn parse_regex(module: &str, property: &str, value: &str, ignore_case: bool) -> Result<Regex, String> {
    RegexBuilder::new(value).case_insensitive(ignore_case).build().map_err(|_| illegal_value(module, property, value))
}
