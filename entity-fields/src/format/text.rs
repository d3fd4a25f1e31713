use crate::diff::result::FieldDiff;

/// One line per difference:
///
/// ```text
/// ~ ip_netmask: 10.0.0.1/32 -> 10.0.0.2/32
/// - description: old
/// + tag: ["prod"]
/// ! static: was string, now list
/// ```
pub fn format_text(entries: &[FieldDiff]) -> String {
    entries
        .iter()
        .map(|entry| match entry {
            FieldDiff::Changed {
                path,
                current,
                proposed,
            } => format!("~ {path}: {current} -> {proposed}"),
            FieldDiff::Removed { path, value } => format!("- {path}: {value}"),
            FieldDiff::Added { path, value } => format!("+ {path}: {value}"),
            FieldDiff::Structural { path, description } => format!("! {path}: {description}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `changed=N added=N removed=N structural=N`
pub fn format_summary(entries: &[FieldDiff]) -> String {
    let (mut changed, mut added, mut removed, mut structural) = (0, 0, 0, 0);
    for entry in entries {
        match entry {
            FieldDiff::Changed { .. } => changed += 1,
            FieldDiff::Added { .. } => added += 1,
            FieldDiff::Removed { .. } => removed += 1,
            FieldDiff::Structural { .. } => structural += 1,
        }
    }
    format!("changed={changed} added={added} removed={removed} structural={structural}")
}
