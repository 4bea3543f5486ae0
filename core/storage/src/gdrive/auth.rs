//! OAuth2 authentication and token management for Google Drive.
//!
//! [`CredentialManager`] drives the authorization-code flow for first-time
//! authentication and the refresh flow for renewal. It owns the token pair;
//! Drive operations only borrow the access token from it.

use chrono::{DateTime, Utc};
use oauth2::{AccessToken, RefreshToken};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use driveconnect_common::{Error, Result};

use super::config::ClientConfig;
use super::token_store::TokenStore;
use crate::exchange::{Exchange, ExchangeRequest, HttpExchange};

/// Seconds an access token is trusted after issue.
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Length of a consent-page validation code.
pub const VALIDATION_CODE_LEN: usize = 45;

/// OAuth2 token pair with issue-time tracking.
#[derive(Debug, Clone)]
pub struct Tokens {
    /// Access token for API requests.
    pub access_token: AccessToken,
    /// Refresh token for obtaining new access tokens.
    pub refresh_token: RefreshToken,
    /// When the access token was obtained or last renewed.
    pub issued_at: DateTime<Utc>,
    /// Token type reported by the provider.
    pub token_type: Option<String>,
    /// Provider-reported lifetime in seconds (informational only).
    pub expires_in: Option<u64>,
}

impl Tokens {
    /// Check whether the access token is still trusted at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        (now - self.issued_at).num_seconds() < TOKEN_LIFETIME_SECS
    }

    /// Check whether the access token is still trusted.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

/// Observable state of the credential lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// No token pair is held.
    Unauthenticated,
    /// A fresh access token is held.
    Authenticated,
    /// A token pair is held but the access token is past its lifetime.
    Stale,
}

/// Result of [`CredentialManager::get_token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The held token was still fresh; nothing was requested.
    AlreadyValid,
    /// A new token pair was obtained and saved.
    Authenticated,
    /// The user entered nothing at the validation code prompt.
    Cancelled,
}

/// The user-facing side of the authorization-code flow.
pub trait ConsentPrompt {
    /// Show the consent page URL the user must visit.
    fn present_consent_url(&mut self, url: &str);

    /// Read one validation code attempt. An empty string cancels the flow.
    fn read_validation_code(&mut self) -> Result<String>;

    /// Tell the user an attempt had the wrong length.
    fn reject_code(&mut self, length: usize);
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

fn form_body(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Parse a token endpoint body, requiring a non-empty access token.
fn parse_token_response(step: &'static str, response: Exchange) -> Result<TokenResponse> {
    let parsed: TokenResponse = serde_json::from_str(&response.body)
        .map_err(|e| Error::Serialization(format!("{} returned an unreadable body: {}", step, e)))?;

    if parsed.access_token.is_empty() {
        return Err(Error::Protocol {
            step,
            status: response.status,
            body: response.body,
        });
    }
    Ok(parsed)
}

/// OAuth2 credential lifecycle manager.
pub struct CredentialManager {
    config: ClientConfig,
    store: TokenStore,
    exchange: HttpExchange,
    tokens: Option<Tokens>,
}

impl CredentialManager {
    /// Create a manager, reusing persisted tokens when still fresh.
    ///
    /// A stale or unreadable token file leaves the manager unauthenticated.
    pub fn new(config: ClientConfig, store: TokenStore, exchange: HttpExchange) -> Self {
        let tokens = match store.load() {
            Some(tokens) if tokens.is_fresh() => {
                info!(issued_at = %tokens.issued_at, "Reusing cached credentials");
                Some(tokens)
            }
            Some(tokens) => {
                info!(issued_at = %tokens.issued_at, "Cached credentials have expired");
                None
            }
            None => None,
        };

        Self {
            config,
            store,
            exchange,
            tokens,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CredentialState {
        self.state_at(Utc::now())
    }

    /// Lifecycle state as judged at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> CredentialState {
        match &self.tokens {
            None => CredentialState::Unauthenticated,
            Some(t) if t.is_fresh_at(now) => CredentialState::Authenticated,
            Some(_) => CredentialState::Stale,
        }
    }

    /// Held token pair, if any.
    pub fn tokens(&self) -> Option<&Tokens> {
        self.tokens.as_ref()
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Lend the current access token for an authorized request.
    ///
    /// A stale token is lent as is; renewing it is the caller's decision.
    ///
    /// # Errors
    /// - `Error::NotAuthenticated` if no token is held
    pub fn access_token(&self) -> Result<&AccessToken> {
        let tokens = self.tokens.as_ref().ok_or_else(|| {
            Error::NotAuthenticated("No access token held; authenticate first".to_string())
        })?;

        if !tokens.is_fresh() {
            warn!(issued_at = %tokens.issued_at, "Using an access token past its lifetime");
        }

        Ok(&tokens.access_token)
    }

    /// Obtain a token pair through the authorization-code flow.
    ///
    /// # Postconditions
    /// - On `Authenticated` the new pair is held; a failed write of the
    ///   token file is logged and does not undo it
    /// - On `Cancelled` or error the held state is unchanged
    ///
    /// # Errors
    /// - `Error::Protocol` if the authorization request is not answered with
    ///   302 or the code exchange is not answered with 200
    /// - `Error::Transport` on network failure
    /// - `Error::Serialization` if the token response cannot be parsed
    pub async fn get_token<P>(&mut self, prompt: &mut P) -> Result<AuthOutcome>
    where
        P: ConsentPrompt + ?Sized,
    {
        if self.state() == CredentialState::Authenticated {
            info!("Current credentials are still valid");
            return Ok(AuthOutcome::AlreadyValid);
        }

        info!("Authenticating");
        let consent_url = self.request_consent_url().await?;
        prompt.present_consent_url(&consent_url);

        let code = loop {
            let attempt = prompt.read_validation_code()?;
            let attempt = attempt.trim();
            if attempt.is_empty() {
                info!("Authentication cancelled");
                return Ok(AuthOutcome::Cancelled);
            }
            if attempt.len() != VALIDATION_CODE_LEN {
                prompt.reject_code(attempt.len());
                continue;
            }
            break attempt.to_string();
        };

        self.exchange_code(&code).await?;
        Ok(AuthOutcome::Authenticated)
    }

    /// Ask the authorization endpoint for the consent page URL.
    ///
    /// # Errors
    /// - `Error::Protocol` unless the endpoint answers 302
    pub async fn request_consent_url(&self) -> Result<String> {
        let body = form_body(&[
            ("scope", self.config.scope.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
        ]);

        let response = self
            .exchange
            .send(ExchangeRequest::post(self.config.auth_url.as_str(), body).form_encoded())
            .await
            .expect_status(StatusCode::FOUND, "Authorization request")?;

        Ok(response.body)
    }

    /// Exchange a validation code for a token pair and persist it.
    ///
    /// # Errors
    /// - `Error::Protocol` unless the endpoint answers 200 with a non-empty
    ///   access token and a refresh token
    pub async fn exchange_code(&mut self, code: &str) -> Result<()> {
        const STEP: &str = "Token exchange";

        let body = form_body(&[
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.secret().as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ]);

        let response = self
            .exchange
            .send(ExchangeRequest::post(self.config.token_url.as_str(), body).form_encoded())
            .await
            .expect_status(StatusCode::OK, STEP)?;

        let status = response.status;
        let body = response.body.clone();
        let parsed = parse_token_response(STEP, response)?;
        let refresh_token = match parsed.refresh_token {
            Some(t) if !t.is_empty() => t,
            _ => {
                return Err(Error::Protocol {
                    step: STEP,
                    status,
                    body,
                })
            }
        };

        self.hold(Tokens {
            access_token: AccessToken::new(parsed.access_token),
            refresh_token: RefreshToken::new(refresh_token),
            issued_at: Utc::now(),
            token_type: parsed.token_type,
            expires_in: parsed.expires_in,
        });
        info!("Authenticated");
        Ok(())
    }

    /// Obtain a new access token with the held refresh token.
    ///
    /// The refresh token held before the call is kept, since the provider's
    /// renewal response does not carry one.
    ///
    /// # Errors
    /// - `Error::NotAuthenticated` if no refresh token is held
    /// - `Error::Protocol` unless the endpoint answers 200 with a non-empty
    ///   access token
    /// - On any error the held tokens are left untouched
    pub async fn renew_token(&mut self) -> Result<()> {
        const STEP: &str = "Token refresh";

        let current = self.tokens.as_ref().ok_or_else(|| {
            Error::NotAuthenticated("No refresh token held; authenticate first".to_string())
        })?;
        let refresh_token = current.refresh_token.clone();

        info!("Renewing access token");

        let body = form_body(&[
            ("refresh_token", refresh_token.secret().as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.secret().as_str()),
            ("grant_type", "refresh_token"),
        ]);

        let response = self
            .exchange
            .send(ExchangeRequest::post(self.config.token_url.as_str(), body).form_encoded())
            .await
            .expect_status(StatusCode::OK, STEP)?;

        let parsed = parse_token_response(STEP, response)?;

        self.hold(Tokens {
            access_token: AccessToken::new(parsed.access_token),
            refresh_token,
            issued_at: Utc::now(),
            token_type: parsed.token_type,
            expires_in: parsed.expires_in,
        });
        info!("Token renewed");
        Ok(())
    }

    /// Keep a newly issued pair, then persist it.
    ///
    /// A failed write is logged; the pair stays usable for this process.
    fn hold(&mut self, tokens: Tokens) {
        let tokens = match self.store.save(tokens.clone()) {
            Ok(stamped) => stamped,
            Err(e) => {
                warn!(path = %self.store.path().display(), "Failed to persist tokens: {}", e);
                tokens
            }
        };
        debug!(issued_at = %tokens.issued_at, "Holding new credentials");
        self.tokens = Some(tokens);
    }

    /// Renew the access token if it is stale.
    ///
    /// Returns whether a renewal took place.
    ///
    /// # Errors
    /// - `Error::NotAuthenticated` if no token pair is held
    /// - Errors of [`renew_token`](Self::renew_token)
    pub async fn ensure_fresh(&mut self) -> Result<bool> {
        match self.state() {
            CredentialState::Authenticated => Ok(false),
            CredentialState::Stale => {
                self.renew_token().await?;
                Ok(true)
            }
            CredentialState::Unauthenticated => Err(Error::NotAuthenticated(
                "No credentials to renew; authenticate first".to_string(),
            )),
        }
    }
}
