//! File-based persistence of the OAuth2 token pair.

use chrono::{DateTime, Utc};
use oauth2::{AccessToken, RefreshToken};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use driveconnect_common::Result;

use super::auth::Tokens;

/// On-disk layout of the token file.
///
/// `timestamp` holds seconds since the Unix epoch encoded as a string.
#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    access_token: String,
    refresh_token: String,
    #[serde(with = "epoch_seconds")]
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
}

mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.timestamp().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = match Raw::deserialize(d)? {
            Raw::Text(text) => text.trim().parse::<i64>().map_err(de::Error::custom)?,
            Raw::Number(n) => n,
        };
        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", secs)))
    }
}

/// Token file in the working directory, used when no path is given.
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Serializer for [`Tokens`]; judging freshness is left to the caller.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted tokens.
    ///
    /// A missing or malformed file yields `None`.
    pub fn load(&self) -> Option<Tokens> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) => {
                debug!(path = %self.path.display(), "No cached tokens: {}", e);
                return None;
            }
        };

        let file: TokenFile = match serde_json::from_str(&data) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), "Ignoring unreadable token file: {}", e);
                return None;
            }
        };

        if file.access_token.is_empty() {
            warn!(path = %self.path.display(), "Ignoring token file without access token");
            return None;
        }

        Some(Tokens {
            access_token: AccessToken::new(file.access_token),
            refresh_token: RefreshToken::new(file.refresh_token),
            issued_at: file.timestamp,
            token_type: file.token_type,
            expires_in: file.expires_in,
        })
    }

    /// Stamp `tokens` with the current time and persist them.
    ///
    /// The file is written next to its final location and renamed over it.
    /// On Unix the file is readable by the owner only.
    ///
    /// # Errors
    /// - I/O errors creating, writing or renaming the file
    pub fn save(&self, mut tokens: Tokens) -> Result<Tokens> {
        tokens.issued_at = Utc::now();

        let file = TokenFile {
            access_token: tokens.access_token.secret().clone(),
            refresh_token: tokens.refresh_token.secret().clone(),
            timestamp: tokens.issued_at,
            token_type: tokens.token_type.clone(),
            expires_in: tokens.expires_in,
        };
        let data = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let staging = self.staging_path();
        std::fs::write(&staging, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), "Tokens saved");

        Ok(tokens)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_TOKEN_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_FILE)
    }
}
