use std::fmt;

use crate::storage::Tier;

/// Failure taxonomy for the sync core.
///
/// None of these are fatal: the tiers and the codec convert them into
/// "empty" at their boundary, so the worst outcome is a fully expanded tree.
#[derive(Debug)]
pub enum Error {
    Json(serde_json::Error),
    /// Malformed token at some stage of the decode pipeline
    Decode(String),
    /// A storage tier refused the operation (quota, privacy mode, ...)
    StorageUnavailable { tier: Tier, reason: String },
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Decode(msg) => write!(f, "Decode error: {}", msg),
            Error::StorageUnavailable { tier, reason } => {
                write!(f, "Storage unavailable ({}): {}", tier, reason)
            }
            Error::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}
