use thiserror::Error;

use crate::tree::Fields;

/// Errors that can occur while writing JSON from a [`Fields`] tree.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to serialize JSON bytes.
    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a [`Fields`] tree into pretty-printed JSON bytes.
pub fn write(fields: &Fields) -> Result<Vec<u8>, WriteError> {
    let mut bytes = serde_json::to_vec_pretty(fields)?;
    bytes.push(b'\n');
    Ok(bytes)
}
