//! Ordered field trees, JSON parsing/writing, and structural diffing used by
//! higher-level migration tools.

pub mod diff;
pub mod format;
pub mod parser;
pub mod tree;
pub mod writer;

pub use diff::{diff, diff_with_options, DiffOptions, FieldDiff};
pub use format::{format_summary, format_text};
pub use parser::{parse, ParseError};
pub use tree::{FieldValue, Fields};
pub use writer::{write, WriteError};
