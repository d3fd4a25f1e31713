//! Human-readable diff rendering.

pub mod text;

pub use text::{format_summary, format_text};
