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

fn capture(dir: &Path) -> PathBuf {
    let graph = dir.join("graph.json");
    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir)
        .arg("capture")
        .arg("--source")
        .arg(fixture("fixtures/source_snapshot.json"))
        .arg("--output")
        .arg(&graph)
        .assert()
        .success();
    graph
}

#[test]
fn plan_skips_conflicts_by_default() {
    let dir = tempdir().expect("tempdir");
    let graph = capture(dir.path());

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("plan")
        .arg(&graph)
        .arg("--target")
        .arg(fixture("fixtures/target_snapshot.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "records=10 create=8 skip=2 overwrite=0 rename=0 unresolved=0",
        ))
        .stdout(predicate::str::contains("= SKIP      address:web-1@folder:Shared"))
        .stdout(predicate::str::contains("+ CREATE    address-group:web-servers@folder:Shared"))
        .stdout(predicate::str::contains(
            "anti-spyware-profile:best-practice@folder:Shared is required by the selection but not selected",
        ));
}

#[test]
fn plan_rename_rewrites_dependents_and_writes_json() {
    let dir = tempdir().expect("tempdir");
    let graph = capture(dir.path());
    let plan_path = dir.path().join("plan.json");

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("plan")
        .arg(&graph)
        .arg("--target")
        .arg(fixture("fixtures/target_snapshot.json"))
        .arg("--strategy")
        .arg("rename")
        .arg("--output")
        .arg(&plan_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("rename=2"))
        .stdout(predicate::str::contains(
            "~ RENAME    address:web-1@folder:Shared -> address:web-1-1@folder:Shared",
        ))
        .stdout(predicate::str::contains("static: web-1 -> web-1-1"));

    let plan: Value = serde_json::from_slice(&fs::read(&plan_path).expect("read plan")).expect("json parse");
    let records = plan["records"].as_array().expect("records array");
    assert_eq!(records.len(), 10);
    let group = records
        .iter()
        .find(|r| r["key"]["name"] == "web-servers")
        .expect("group record");
    assert_eq!(group["resolution"], "create");
    assert_eq!(
        group["candidate"]["fields"]["static"],
        serde_json::json!(["web-1-1", "web-2"])
    );
}

#[test]
fn plan_conflict_shows_field_differences() {
    let dir = tempdir().expect("tempdir");
    let graph = capture(dir.path());

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("plan")
        .arg(&graph)
        .arg("--target")
        .arg(fixture("fixtures/target_snapshot.json"))
        .arg("--strategy")
        .arg("overwrite")
        .assert()
        .success()
        .stdout(predicate::str::contains("~ OVERWRITE address:web-1@folder:Shared"))
        .stdout(predicate::str::contains("~ ip_netmask"))
        .stdout(predicate::str::contains("+ tag"));
}

#[test]
fn plan_defer_leaves_conflicts_unresolved() {
    let dir = tempdir().expect("tempdir");
    let graph = capture(dir.path());

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("plan")
        .arg(&graph)
        .arg("--target")
        .arg(fixture("fixtures/target_snapshot.json"))
        .arg("--strategy")
        .arg("defer")
        .assert()
        .success()
        .stdout(predicate::str::contains("unresolved=2"))
        .stdout(predicate::str::contains("! UNRESOLVED tag:prod@folder:Shared"));
}

#[test]
fn plan_uses_strategy_from_config() {
    let dir = tempdir().expect("tempdir");
    let graph = capture(dir.path());
    let config = dir.path().join("engine.toml");
    fs::write(&config, "[push]\nstrategy = \"rename\"\n").expect("write config");

    Command::new(assert_cmd::cargo::cargo_bin!("scm-migrate"))
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("plan")
        .arg(&graph)
        .arg("--target")
        .arg(fixture("fixtures/target_snapshot.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("rename=2"));
}
