//! Google Drive backend.
//!
//! - OAuth2 installed-application flow with manual code entry
//! - Token pair persisted to a JSON file
//! - Resumable single-request uploads and streamed downloads

pub mod auth;
pub mod client;
pub mod config;
pub mod token_store;

pub use auth::{
    AuthOutcome, ConsentPrompt, CredentialManager, CredentialState, Tokens, TOKEN_LIFETIME_SECS,
    VALIDATION_CODE_LEN,
};
pub use client::{
    DownloadReport, DriveClient, Endpoints, FileEntry, FileLookup, FileMetadata, UploadReport,
    UploadSession, UPLOAD_CONTENT_TYPE,
};
pub use config::{ClientConfig, DRIVE_SCOPE};
pub use token_store::{TokenStore, DEFAULT_TOKEN_FILE};
