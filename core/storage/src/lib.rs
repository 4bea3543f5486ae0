//! Google Drive transfer layer for DriveConnect.
//!
//! This crate provides:
//! - A single-request HTTP exchange unit that captures status, body and headers
//! - File persistence of the OAuth2 token pair
//! - The credential lifecycle manager (consent, code exchange, renewal)
//! - Drive file operations (list, lookup, metadata, download, upload)
//!
//! All network I/O is async, but operations are awaited one at a time by
//! the caller.

pub mod exchange;
pub mod gdrive;

pub use exchange::{Exchange, ExchangeRequest, HttpExchange, TRANSPORT_FAILURE};
pub use gdrive::{
    AuthOutcome, ClientConfig, ConsentPrompt, CredentialManager, CredentialState, DriveClient,
    Endpoints, FileEntry, FileLookup, FileMetadata, TokenStore, Tokens,
};
