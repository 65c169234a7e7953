//! Decode error taxonomy.

use thiserror::Error;

/// Result alias for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Reasons a reply could not be decoded. All of them are terminal for the
/// decode call that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bytes are not a syntactically valid JSON object.
    #[error("received invalid JSON: {0}")]
    InvalidInput(String),

    /// A top-level key outside the reply vocabulary.
    #[error("unknown response value: {0:?}")]
    UnknownField(String),

    /// The `fields` key held neither an array of names nor a name/value object.
    #[error("unknown field type")]
    UnknownFieldType,
}
