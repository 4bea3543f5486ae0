//! Common types used throughout driveconnect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a file stored in Google Drive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    /// Create a new FileId from a string.
    ///
    /// Surrounding whitespace is stripped.
    ///
    /// # Errors
    /// - Returns error if the id is empty
    /// - Returns error if the id contains a path separator or query delimiter
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidInput(
                "FileId cannot be empty".to_string(),
            ));
        }
        if trimmed.contains(&['/', '?', '#'][..]) {
            return Err(crate::Error::InvalidInput(format!(
                "FileId contains invalid characters: {}",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
