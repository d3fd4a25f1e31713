use serde::Serialize;

use crate::FieldValue;

/// One difference between a current record and a proposed replacement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldDiff {
    /// Scalar present on both sides with different values.
    Changed {
        path: String,
        current: String,
        proposed: String,
    },
    /// Present only in the current record; the proposal drops it.
    Removed { path: String, value: FieldValue },
    /// Present only in the proposed record.
    Added { path: String, value: FieldValue },
    /// Value kinds differ, such as a string on one side and a list on the other.
    Structural { path: String, description: String },
}

impl FieldDiff {
    pub fn path(&self) -> &str {
        match self {
            Self::Changed { path, .. }
            | Self::Removed { path, .. }
            | Self::Added { path, .. }
            | Self::Structural { path, .. } => path,
        }
    }
}
