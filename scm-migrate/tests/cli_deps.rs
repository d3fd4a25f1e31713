use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn capture(dir: &Path, source: &Path) -> PathBuf {
    let graph = dir.join("graph.json");
    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir)
        .arg("capture")
        .arg("--source")
        .arg(source)
        .arg("--output")
        .arg(&graph)
        .assert()
        .success();
    graph
}

#[test]
fn deps_orders_prerequisites_first() {
    let dir = tempdir().expect("tempdir");
    let graph = capture(dir.path(), &fixture("fixtures/source_snapshot.json"));

    let output = Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("deps")
        .arg(&graph)
        .arg("--format")
        .arg("json")
        .output()
        .expect("deps output");
    assert!(output.status.success(), "deps should succeed");

    let report: Value = serde_json::from_slice(&output.stdout).expect("json parse");
    let order: Vec<String> = report["order"]
        .as_array()
        .expect("order array")
        .iter()
        .map(|k| format!("{}:{}", k["entity_type"].as_str().unwrap_or(""), k["name"].as_str().unwrap_or("")))
        .collect();
    assert_eq!(order.len(), 11);
    let pos = |wanted: &str| {
        order
            .iter()
            .position(|k| k == wanted)
            .unwrap_or_else(|| panic!("{wanted} missing from order"))
    };
    assert!(pos("tag:prod") < pos("address:web-1"));
    assert!(pos("address:web-1") < pos("address-group:web-servers"));
    assert!(pos("address-group:web-servers") < pos("security-rule:allow-web"));
    assert!(pos("security-profile-group:web-profiles") < pos("security-rule:allow-web"));
    assert_eq!(report["edges"].as_array().map(Vec::len), Some(9));
    assert_eq!(report["unresolved"].as_array().map(Vec::len), Some(0));
}

#[test]
fn deps_impact_lists_transitive_dependents() {
    let dir = tempdir().expect("tempdir");
    let graph = capture(dir.path(), &fixture("fixtures/source_snapshot.json"));

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("deps")
        .arg(&graph)
        .arg("--impact")
        .arg("tag:prod@Shared")
        .assert()
        .success()
        .stdout(predicate::str::contains("impact of tag:prod@folder:Shared: 4 dependents"))
        .stdout(predicate::str::contains("- security-rule:allow-web@folder:Texas"));

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("deps")
        .arg(&graph)
        .arg("--impact")
        .arg("tag:missing@Shared")
        .assert()
        .failure()
        .stderr(predicate::str::contains("tag:missing@folder:Shared is not in"));
}

#[test]
fn deps_fails_on_cycle_and_names_members() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("source.json");
    fs::write(
        &source,
        r#"{
            "containers": [{"name": "Shared", "kind": "folder"}],
            "records": {
                "address-group": [
                    {"name": "X", "folder": "Shared", "static": ["Y"]},
                    {"name": "Y", "folder": "Shared", "static": ["X"]}
                ]
            }
        }"#,
    )
    .expect("write source");
    let graph = capture(dir.path(), &source);

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("deps")
        .arg(&graph)
        .assert()
        .failure()
        .stderr(predicate::str::contains("dependency cycle"))
        .stderr(predicate::str::contains("address-group:X@folder:Shared"))
        .stderr(predicate::str::contains("address-group:Y@folder:Shared"));
}

#[test]
fn deps_rejects_unreadable_graph() {
    let dir = tempdir().expect("tempdir");
    let graph = dir.path().join("graph.json");
    fs::write(&graph, "not json").expect("write graph");

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("deps")
        .arg(&graph)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load graph"));
}

#[test]
fn classify_lists_defaults_with_reasons() {
    let dir = tempdir().expect("tempdir");
    let graph = capture(dir.path(), &fixture("fixtures/source_snapshot.json"));

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("classify")
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("defaults=1 custom=10"))
        .stdout(predicate::str::contains(
            "DEFAULT anti-spyware-profile:best-practice@folder:Shared (known default name)",
        ))
        .stdout(predicate::str::contains("CUSTOM  address:web-1@folder:Shared"));

    let output = Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("classify")
        .arg(&graph)
        .arg("--format")
        .arg("json")
        .output()
        .expect("classify output");
    assert!(output.status.success(), "classify should succeed");
    let rows: Value = serde_json::from_slice(&output.stdout).expect("json parse");
    let default_row = rows
        .as_array()
        .expect("rows array")
        .iter()
        .find(|r| r["is_default"] == true)
        .expect("one default row");
    assert_eq!(default_row["reason"], "known_name");
    assert_eq!(default_row["key"]["name"], "best-practice");
}
