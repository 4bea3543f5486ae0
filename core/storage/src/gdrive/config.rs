//! OAuth2 client configuration for Google Drive.
//!
//! Reads the `client_secret.json` document issued by the Google Cloud
//! console for an "installed" (desktop) application.

use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl};
use serde::Deserialize;
use std::path::Path;

use driveconnect_common::{Error, Result};

/// The only scope requested: full Drive access.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Layout of the downloaded client secret file.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    #[serde(default)]
    installed: Option<ClientSection>,
    #[serde(default)]
    web: Option<ClientSection>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

/// Static OAuth2 client settings, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// OAuth2 client ID.
    pub client_id: ClientId,
    /// OAuth2 client secret.
    pub client_secret: ClientSecret,
    /// Authorization endpoint.
    pub auth_url: AuthUrl,
    /// Token endpoint.
    pub token_url: TokenUrl,
    /// Redirect URI registered for the client.
    pub redirect_url: RedirectUrl,
    /// Requested scope.
    pub scope: Scope,
}

impl ClientConfig {
    /// Build a configuration from individual values.
    ///
    /// # Errors
    /// - `Error::Config` if any endpoint is not a valid URL
    pub fn new(
        client_id: &str,
        client_secret: &str,
        auth_uri: &str,
        token_uri: &str,
        redirect_uri: &str,
    ) -> Result<Self> {
        Ok(Self {
            client_id: ClientId::new(client_id.to_string()),
            client_secret: ClientSecret::new(client_secret.to_string()),
            auth_url: AuthUrl::new(auth_uri.to_string())
                .map_err(|e| Error::Config(format!("Invalid auth_uri: {}", e)))?,
            token_url: TokenUrl::new(token_uri.to_string())
                .map_err(|e| Error::Config(format!("Invalid token_uri: {}", e)))?,
            redirect_url: RedirectUrl::new(redirect_uri.to_string())
                .map_err(|e| Error::Config(format!("Invalid redirect_uri: {}", e)))?,
            scope: Scope::new(DRIVE_SCOPE.to_string()),
        })
    }

    /// Parse a client secret document.
    ///
    /// The `installed` section is preferred; `web` is accepted as a fallback.
    /// The first redirect URI is used.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Unable to parse config file: {}", e)))?;

        let section = file.installed.or(file.web).ok_or_else(|| {
            Error::Config("Config file has no \"installed\" or \"web\" section".to_string())
        })?;

        let redirect_uri = section
            .redirect_uris
            .first()
            .ok_or_else(|| Error::Config("Config file lists no redirect_uris".to_string()))?;

        Self::new(
            &section.client_id,
            &section.client_secret,
            &section.auth_uri,
            &section.token_uri,
            redirect_uri,
        )
    }

    /// Load a client secret document from disk.
    ///
    /// # Errors
    /// - `Error::Config` if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Unable to open config file {}: {}", path.display(), e))
        })?;

        let config = Self::from_json(&json)?;
        tracing::debug!(
            client_id = config.client_id.as_str(),
            "Loaded client configuration"
        );
        Ok(config)
    }
}
