//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Get the binary to test.
fn rulehost() -> Command {
    let mut cmd = Command::cargo_bin("rulehost").unwrap();
    cmd.env_remove("RULEHOST_CONFIG");
    cmd
}

const RULES: &str = r#"<module name="Checker">
  <module name="LineLength">
    <property name="max" value="${maxLen}"/>
  </module>
  <module name="FileTabCharacter"/>
</module>
"#;

fn workspace() -> assert_fs::TempDir {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("rules.xml").write_str(RULES).unwrap();
    temp.child("src/Short.java").write_str("class Short {\n}\n").unwrap();
    temp.child("src/Long.java")
        .write_str("class Long {\n    String s = \"a rather long string literal that goes on\";\n}\n")
        .unwrap();
    temp.child("src/notes.txt").write_str("\tindented with a tab\n").unwrap();
    temp
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    rulehost()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("rule-engine versions"));
}

#[test]
fn test_version_flag() {
    rulehost()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_subcommand_fails() {
    rulehost().arg("frobnicate").assert().failure();
}

// ============================================================================
// Versions & Bundled Tests
// ============================================================================

#[test]
fn test_versions_marks_default() {
    rulehost().arg("versions").assert().success().stdout(predicate::str::contains("(default)"));
}

#[test]
fn test_versions_json() {
    rulehost()
        .args(["versions", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"supported\"").and(predicate::str::contains("\"default\"")));
}

#[test]
fn test_bundled_lists_ids() {
    rulehost()
        .arg("bundled")
        .assert()
        .success()
        .stdout(predicate::str::contains("bundled-sun-checks").and(predicate::str::contains("Google Checks")));
}

// ============================================================================
// Properties Tests
// ============================================================================

#[test]
fn test_properties_lists_references() {
    let temp = workspace();
    rulehost()
        .current_dir(temp.path())
        .args(["properties", "--config", "rules.xml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("maxLen (unset)"));
}

#[test]
fn test_properties_for_missing_file_fails() {
    let temp = workspace();
    rulehost()
        .current_dir(temp.path())
        .args(["properties", "--config", "nope.xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// ============================================================================
// Check Tests
// ============================================================================

#[test]
fn test_check_reports_missing_property() {
    let temp = workspace();
    rulehost()
        .current_dir(temp.path())
        .args(["check", "--config", "rules.xml", "src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("maxLen"));
}

#[test]
fn test_check_finds_long_lines() {
    let temp = workspace();
    rulehost()
        .current_dir(temp.path())
        .args(["check", "--config", "rules.xml", "-p", "maxLen=40", "--ext", "java", "src"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Long.java").and(predicate::str::contains("Line is longer than 40")))
        .stdout(predicate::str::contains("Checked 2 files"));
}

#[test]
fn test_check_clean_files_succeeds() {
    let temp = workspace();
    rulehost()
        .current_dir(temp.path())
        .args(["check", "--config", "rules.xml", "-p", "maxLen=200", "src/Short.java"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 problems"));
}

#[test]
fn test_check_json_output() {
    let temp = workspace();
    let output = rulehost()
        .current_dir(temp.path())
        .args(["check", "--config", "rules.xml", "-p", "maxLen=40", "--format", "json", "src"])
        .output()
        .unwrap();

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["files_scanned"], 3);
    let problems = json["problems"].as_object().unwrap();
    assert!(problems.keys().any(|k| k.ends_with("notes.txt")));
}

#[test]
fn test_check_with_bundled_config() {
    let temp = workspace();
    temp.child("src/Tabs.java").write_str("class Tabs {\n\tint x;\n\tint y;\n}\n").unwrap();
    rulehost()
        .current_dir(temp.path())
        .args(["check", "--config", "bundled-google-checks", "src/Tabs.java", "src/notes.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Line contains a tab character").count(2))
        .stdout(predicate::str::contains("notes.txt").not());
}

#[test]
fn test_check_with_retired_version() {
    let temp = workspace();
    rulehost()
        .current_dir(temp.path())
        .args(["check", "--config", "rules.xml", "-e", "9.0", "-p", "maxLen=200", "src/Short.java"])
        .assert()
        .success();
}

#[test]
fn test_check_with_unknown_version_fails() {
    let temp = workspace();
    rulehost()
        .current_dir(temp.path())
        .args(["check", "--config", "rules.xml", "-e", "1.0", "src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported"));
}

#[test]
fn test_check_requires_paths() {
    rulehost().args(["check", "--config", "rules.xml"]).assert().failure();
}

// ============================================================================
// Config & Completions Tests
// ============================================================================

#[test]
fn test_config_reads_local_file() {
    let temp = workspace();
    temp.child(".rulehost.toml").write_str("[scan]\ntab_width = 4\n").unwrap();
    rulehost()
        .current_dir(temp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("tab_width = 4"));
}

#[test]
fn test_completions_bash() {
    rulehost().args(["completions", "bash"]).assert().success().stdout(predicate::str::contains("rulehost"));
}
