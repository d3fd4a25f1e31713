use thiserror::Error;

use crate::tree::Fields;

/// Errors that can occur while parsing JSON into a [`Fields`] tree.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Input could not be tokenized or decoded as JSON.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Structural issue in the document.
    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Parse JSON bytes whose top-level value is an object into a [`Fields`] tree.
pub fn parse(json: &[u8]) -> Result<Fields, ParseError> {
    let trimmed = json.iter().position(|b| !b.is_ascii_whitespace());
    match trimmed.map(|idx| json[idx]) {
        Some(b'{') => Ok(serde_json::from_slice(json)?),
        Some(_) => Err(ParseError::Malformed(
            "top-level value must be an object".to_string(),
        )),
        None => Err(ParseError::Malformed("empty document".to_string())),
    }
}
