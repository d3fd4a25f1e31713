use std::fs;
use std::path::PathBuf;

use entity_fields::{
    diff, diff_with_options, format_summary, format_text, parse, DiffOptions, FieldDiff, Fields,
};

fn fixture(path: &str) -> Fields {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join(path);
    parse(&fs::read(path).expect("read fixture")).expect("parse fixture")
}

#[test]
fn diff_detects_changes_additions_and_removals() {
    let current = fixture("fixtures/simple_a.json");
    let proposed = fixture("fixtures/simple_b.json");

    let entries = diff(&current, &proposed);

    let changed = entries
        .iter()
        .filter(|e| matches!(e, FieldDiff::Changed { .. }))
        .count();
    assert!(changed >= 3);
    assert!(entries
        .iter()
        .any(|e| matches!(e, FieldDiff::Removed { path, .. } if path == "tag")));
    assert!(entries
        .iter()
        .any(|e| matches!(e, FieldDiff::Added { path, .. } if path == "color")));

    let text = format_text(&entries);
    assert!(text.contains("~ settings.log_setting: default-logging -> siem-logging"));
    assert!(text.contains("+ color: blue"));
    assert!(format_summary(&entries).starts_with(&format!("changed={changed} added=")));
}

#[test]
fn ignore_paths_skips_named_fields() {
    let current = fixture("fixtures/simple_a.json");
    let proposed = fixture("fixtures/simple_b.json");

    let opts = DiffOptions {
        ignore_paths: vec!["version".to_string(), "settings.log_setting".to_string()],
        ..DiffOptions::default()
    };

    let entries = diff_with_options(&current, &proposed, &opts);

    assert!(!entries.iter().any(|e| e.path() == "version"));
    assert!(!entries.iter().any(|e| e.path().starts_with("settings")));
    assert!(entries.iter().any(|e| e.path() == "description"));
}

#[test]
fn diff_rows_serialize_with_snake_case_tags() {
    let current = parse(br#"{"ip_netmask": "10.0.0.1/32"}"#).expect("parse");
    let proposed = parse(br#"{"ip_netmask": "10.0.0.2/32"}"#).expect("parse");

    let json = serde_json::to_value(diff(&current, &proposed)).expect("serialize");
    assert_eq!(json[0]["type"], "changed");
    assert_eq!(json[0]["path"], "ip_netmask");
    assert_eq!(json[0]["proposed"], "10.0.0.2/32");
}
