//! Google Drive API client.

use oauth2::AccessToken;
use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::{Body, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use driveconnect_common::{Error, FileId, Result};

use crate::exchange::{ExchangeRequest, HttpExchange};

/// Google APIs host.
const GOOGLE_APIS_BASE: &str = "https://www.googleapis.com";

/// Content type announced for every upload.
pub const UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// Drive endpoints used by [`DriveClient`].
///
/// Listing goes through the v2 API (for `title`/`originalFilename`); search,
/// metadata, media and uploads go through v3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// v2 file listing.
    pub list: String,
    /// v3 files collection (search, metadata, media).
    pub files: String,
    /// v3 upload collection.
    pub upload: String,
}

impl Endpoints {
    /// The production Google endpoints.
    pub fn google() -> Self {
        Self::rooted_at(GOOGLE_APIS_BASE)
    }

    /// The same endpoint paths under another host.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            list: format!("{}/drive/v2/files", base),
            files: format!("{}/drive/v3/files", base),
            upload: format!("{}/upload/drive/v3/files", base),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::google()
    }
}

/// One entry of the file listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// File ID.
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Name of the file when it was uploaded.
    #[serde(default)]
    pub original_filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    items: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    files: Vec<SearchHit>,
}

/// File metadata from the v3 API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// File ID.
    pub id: String,
    /// File name.
    pub name: String,
    /// MIME type.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Result of looking a file up by exact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup {
    /// Exactly one file matched.
    Found(FileId),
    /// No file has this name.
    NotFound,
    /// Several files share the name.
    Ambiguous(usize),
}

impl FileLookup {
    /// The matched ID, or an empty string when there is no single match.
    pub fn id(&self) -> &str {
        match self {
            FileLookup::Found(id) => id.as_str(),
            _ => "",
        }
    }
}

/// Target of a single whole-file upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Session URI assigned by the provider.
    pub target_uri: String,
    /// Size of the file in bytes.
    pub content_length: u64,
    /// Content type of the transfer.
    pub content_type: &'static str,
}

impl UploadSession {
    /// Build a session from the initiation response headers.
    ///
    /// The `Location` value is taken verbatim, minus any line terminator.
    pub fn from_headers(headers: &HeaderMap, content_length: u64) -> Option<Self> {
        let location = headers.get(header::LOCATION)?.to_str().ok()?;
        let target_uri = location.trim_end_matches(&['\r', '\n'][..]);
        if target_uri.is_empty() {
            return None;
        }

        Some(Self {
            target_uri: target_uri.to_string(),
            content_length,
            content_type: UPLOAD_CONTENT_TYPE,
        })
    }
}

/// Outcome of a download.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    /// Where the file was written.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
    /// HTTP status of the media request.
    pub status: i32,
}

/// Outcome of an upload transfer.
#[derive(Debug, Clone)]
pub struct UploadReport {
    /// HTTP status of the transfer.
    pub status: i32,
    /// ID of the created file, when the response reports it.
    pub file_id: Option<String>,
    /// Bytes sent.
    pub bytes: u64,
    /// Wall time of the transfer request.
    pub elapsed: Duration,
}

impl UploadReport {
    /// Average transfer speed.
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Suffix of a download in progress.
const PARTIAL_SUFFIX: &str = ".part";

async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), "Failed to remove partial download: {}", e);
    }
}

/// Build the Drive query matching an exact file name.
fn name_query(name: &str) -> String {
    format!("name=\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Google Drive API client.
///
/// Every call borrows the access token from its caller and never renews it.
#[derive(Clone)]
pub struct DriveClient {
    exchange: HttpExchange,
    endpoints: Endpoints,
}

impl DriveClient {
    /// Create a client against the production endpoints.
    pub fn new(exchange: HttpExchange) -> Self {
        Self::with_endpoints(exchange, Endpoints::google())
    }

    /// Create a client against custom endpoints.
    pub fn with_endpoints(exchange: HttpExchange, endpoints: Endpoints) -> Self {
        Self {
            exchange,
            endpoints,
        }
    }

    /// Endpoints in use.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// List the files visible to the account.
    ///
    /// # Errors
    /// - `Error::Protocol` unless the listing answers 200
    /// - `Error::Serialization` if the listing cannot be parsed
    pub async fn list_files(&self, token: &AccessToken) -> Result<Vec<FileEntry>> {
        let response = self
            .exchange
            .send(ExchangeRequest::get(&self.endpoints.list).bearer(token))
            .await
            .expect_status(StatusCode::OK, "List files")?;

        let list: FileListResponse = serde_json::from_str(&response.body)
            .map_err(|e| Error::Serialization(format!("Error parsing file list: {}", e)))?;

        debug!(count = list.items.len(), "Listed files");
        Ok(list.items)
    }

    /// Find the ID of the file with exactly this name.
    ///
    /// # Errors
    /// - `Error::Protocol` unless the search answers 200
    /// - `Error::Serialization` if the search result cannot be parsed
    pub async fn get_file_id(&self, token: &AccessToken, name: &str) -> Result<FileLookup> {
        let response = self
            .exchange
            .send(
                ExchangeRequest::get(&self.endpoints.files)
                    .query("q", name_query(name))
                    .bearer(token),
            )
            .await
            .expect_status(StatusCode::OK, "File search")?;

        let search: SearchResponse = serde_json::from_str(&response.body)
            .map_err(|e| Error::Serialization(format!("Error parsing search result: {}", e)))?;

        let lookup = match search.files.len() {
            0 => {
                info!(name, "No files found with this name");
                FileLookup::NotFound
            }
            1 => {
                let hit = search.files.into_iter().next().map(|h| h.id).unwrap_or_default();
                FileLookup::Found(FileId::new(hit)?)
            }
            n => {
                info!(name, matches = n, "Several files match this name");
                FileLookup::Ambiguous(n)
            }
        };

        Ok(lookup)
    }

    /// Fetch the metadata of a file.
    ///
    /// Returns `None` when the body cannot be parsed as file metadata.
    ///
    /// # Errors
    /// - `Error::Transport` on network failure
    /// - `Error::Protocol` unless the request answers 200
    pub async fn get_file_metadata(
        &self,
        token: &AccessToken,
        id: &FileId,
    ) -> Result<Option<FileMetadata>> {
        let url = format!("{}/{}", self.endpoints.files, id);
        let response = self
            .exchange
            .send(ExchangeRequest::get(url).bearer(token))
            .await
            .expect_status(StatusCode::OK, "File metadata")?;

        match serde_json::from_str(&response.body) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                warn!(id = %id, "Unreadable file metadata: {}", e);
                Ok(None)
            }
        }
    }

    /// Download a file into `dest_dir`, named after its Drive name.
    ///
    /// The body is streamed to `<name>.part` next to the destination and
    /// renamed over it once complete. On failure only the partial file is
    /// removed; an existing local file of the same name is left as it was.
    ///
    /// # Errors
    /// - `Error::NotFound` if the metadata cannot be read; no media is requested
    /// - `Error::Transport` if the transfer breaks off
    /// - `Error::Protocol` unless the media request answers 2xx
    pub async fn get_file_by_id(
        &self,
        token: &AccessToken,
        id: &FileId,
        dest_dir: &Path,
    ) -> Result<DownloadReport> {
        let metadata = self
            .get_file_metadata(token, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Error retrieving file id {}", id)))?;

        let file_name = Path::new(&metadata.name).file_name().ok_or_else(|| {
            Error::InvalidInput(format!("File {} has no usable name: {:?}", id, metadata.name))
        })?;
        let dest = dest_dir.join(file_name);

        info!(id = %id, path = %dest.display(), "Downloading file");

        let mut part_name = file_name.to_os_string();
        part_name.push(PARTIAL_SUFFIX);
        let partial = dest_dir.join(part_name);

        let url = format!("{}/{}", self.endpoints.files, id);
        let mut file = File::create(&partial).await?;
        let exchange = self
            .exchange
            .send_to_writer(
                ExchangeRequest::get(url).query("alt", "media").bearer(token),
                &mut file,
            )
            .await;
        drop(file);

        let exchange = match exchange.expect_success("Download") {
            Ok(e) => e,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial, &dest).await {
            discard_partial(&partial).await;
            return Err(e.into());
        }

        let bytes = tokio::fs::metadata(&dest).await?.len();
        info!(path = %dest.display(), bytes, "Download complete");

        Ok(DownloadReport {
            path: dest,
            bytes,
            status: exchange.status,
        })
    }

    /// Open a resumable upload session.
    ///
    /// # Errors
    /// - `Error::Protocol` unless the request answers 200 with a `Location`
    pub async fn start_resumable_upload(
        &self,
        token: &AccessToken,
        name: &str,
        total_size: u64,
    ) -> Result<UploadSession> {
        const STEP: &str = "Upload initiation";

        let metadata = serde_json::json!({ "name": name }).to_string();

        let response = self
            .exchange
            .send(
                ExchangeRequest::post(&self.endpoints.upload, metadata)
                    .query("uploadType", "resumable")
                    .bearer(token)
                    .header(header::CONTENT_TYPE, "application/json; charset=UTF-8")
                    .header(
                        HeaderName::from_static("x-upload-content-type"),
                        UPLOAD_CONTENT_TYPE,
                    )
                    .header(
                        HeaderName::from_static("x-upload-content-length"),
                        total_size.to_string(),
                    ),
            )
            .await
            .expect_status(StatusCode::OK, STEP)?;

        UploadSession::from_headers(&response.headers, total_size).ok_or_else(|| {
            Error::Protocol {
                step: STEP,
                status: response.status,
                body: "response carried no Location header".to_string(),
            }
        })
    }

    /// Send a whole file to an upload session in one request.
    ///
    /// # Errors
    /// - `Error::Transport` if the connection drops; the session is lost
    /// - `Error::Protocol` unless the transfer answers 2xx
    pub async fn upload_to_session(
        &self,
        session: &UploadSession,
        file: File,
    ) -> Result<UploadReport> {
        let body = Body::wrap_stream(ReaderStream::new(file));

        let started = Instant::now();
        let response = self
            .exchange
            .send(
                ExchangeRequest::put(&session.target_uri, body)
                    .header(header::CONTENT_TYPE, session.content_type)
                    .header(header::CONTENT_LENGTH, session.content_length.to_string()),
            )
            .await;
        let elapsed = started.elapsed();

        let response = response.expect_success("Upload transfer")?;

        let file_id = serde_json::from_str::<serde_json::Value>(&response.body)
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from));

        let report = UploadReport {
            status: response.status,
            file_id,
            bytes: session.content_length,
            elapsed,
        };

        info!(
            "Speed: {:.3} bytes/sec during {:.3} seconds",
            report.bytes_per_sec(),
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }

    /// Upload a local file: open a session, then send the file in one PUT.
    ///
    /// The file is named after the last component of `path`.
    ///
    /// # Errors
    /// - `Error::Io` if the file cannot be opened
    /// - Errors of [`start_resumable_upload`](Self::start_resumable_upload)
    ///   and [`upload_to_session`](Self::upload_to_session)
    pub async fn put_file(&self, token: &AccessToken, path: &Path) -> Result<UploadReport> {
        info!(path = %path.display(), "Uploading file");

        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::InvalidInput(format!("Cannot name upload for {}", path.display()))
            })?;

        let session = self.start_resumable_upload(token, name, size).await?;
        debug!(uri = %session.target_uri, "Upload session opened");

        self.upload_to_session(&session, file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    fn client_for(server: &Server) -> DriveClient {
        DriveClient::with_endpoints(
            HttpExchange::new().unwrap(),
            Endpoints::rooted_at(&server.url()),
        )
    }

    fn token() -> AccessToken {
        AccessToken::new("ya29.test".to_string())
    }

    #[test]
    fn test_google_endpoints() {
        let endpoints = Endpoints::google();
        assert_eq!(endpoints.list, "https://www.googleapis.com/drive/v2/files");
        assert_eq!(endpoints.files, "https://www.googleapis.com/drive/v3/files");
        assert_eq!(
            endpoints.upload,
            "https://www.googleapis.com/upload/drive/v3/files"
        );
    }

    #[test]
    fn test_name_query_escaping() {
        assert_eq!(name_query("report.pdf"), "name=\"report.pdf\"");
        assert_eq!(name_query("say \"hi\""), "name=\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_file_lookup_id() {
        assert_eq!(FileLookup::Found(FileId::new("abc").unwrap()).id(), "abc");
        assert_eq!(FileLookup::NotFound.id(), "");
        assert_eq!(FileLookup::Ambiguous(3).id(), "");
    }

    #[tokio::test]
    async fn test_list_files_single_entry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/drive/v2/files")
            .match_header("authorization", "Bearer ya29.test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items":[{"id":"abc","title":"x","originalFilename":"x.txt"}]}"#)
            .create_async()
            .await;

        let files = client_for(&server).list_files(&token()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "abc");
        assert_eq!(files[0].title, "x");
        assert_eq!(files[0].original_filename.as_deref(), Some("x.txt"));
    }

    #[tokio::test]
    async fn test_list_files_rejects_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/drive/v2/files")
            .with_status(401)
            .with_body(r#"{"error": {"code": 401, "message": "Invalid Credentials"}}"#)
            .create_async()
            .await;

        let err = client_for(&server).list_files(&token()).await.unwrap_err();

        match err {
            Error::Protocol { status, body, .. } => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid Credentials"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_files_rejects_garbage() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/drive/v2/files")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let err = client_for(&server).list_files(&token()).await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    async fn search_mock(server: &mut Server, name: &str, body: &str) -> mockito::Mock {
        server
            .mock("GET", "/drive/v3/files")
            .match_query(Matcher::UrlEncoded("q".into(), name_query(name)))
            .match_header("authorization", "Bearer ya29.test")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_get_file_id_not_found() {
        let mut server = Server::new_async().await;
        let _mock = search_mock(&mut server, "missing.txt", r#"{"files": []}"#).await;

        let lookup = client_for(&server)
            .get_file_id(&token(), "missing.txt")
            .await
            .unwrap();

        assert_eq!(lookup, FileLookup::NotFound);
        assert_eq!(lookup.id(), "");
    }

    #[tokio::test]
    async fn test_get_file_id_ambiguous() {
        let mut server = Server::new_async().await;
        let _mock = search_mock(
            &mut server,
            "notes.txt",
            r#"{"files": [{"id": "one", "name": "notes.txt"}, {"id": "two", "name": "notes.txt"}]}"#,
        )
        .await;

        let lookup = client_for(&server)
            .get_file_id(&token(), "notes.txt")
            .await
            .unwrap();

        assert_eq!(lookup, FileLookup::Ambiguous(2));
        assert_eq!(lookup.id(), "");
    }

    #[tokio::test]
    async fn test_get_file_id_found() {
        let mut server = Server::new_async().await;
        let mock = search_mock(
            &mut server,
            "say \"hi\".txt",
            r#"{"kind": "drive#fileList", "files": [{"id": "0B1x-yZ_9", "name": "say \"hi\".txt"}]}"#,
        )
        .await;

        let lookup = client_for(&server)
            .get_file_id(&token(), "say \"hi\".txt")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(lookup.id(), "0B1x-yZ_9");
    }

    #[tokio::test]
    async fn test_get_file_metadata_unparsable_is_none() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/drive/v3/files/abc")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let id = FileId::new("abc").unwrap();
        let metadata = client_for(&server)
            .get_file_metadata(&token(), &id)
            .await
            .unwrap();

        assert!(metadata.is_none());
    }

    #[tokio::test]
    async fn test_get_file_by_id_streams_to_named_file() {
        let mut server = Server::new_async().await;
        let _meta = server
            .mock("GET", "/drive/v3/files/abc")
            .with_status(200)
            .with_body(r#"{"kind": "drive#file", "id": "abc", "name": "report.txt", "mimeType": "text/plain"}"#)
            .create_async()
            .await;
        let media = server
            .mock("GET", "/drive/v3/files/abc")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("authorization", "Bearer ya29.test")
            .with_status(200)
            .with_body("quarterly numbers")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let id = FileId::new("abc").unwrap();
        let report = client_for(&server)
            .get_file_by_id(&token(), &id, dir.path())
            .await
            .unwrap();

        media.assert_async().await;
        assert_eq!(report.path, dir.path().join("report.txt"));
        assert_eq!(report.bytes, 17);
        assert_eq!(report.status, 200);
        assert_eq!(
            std::fs::read_to_string(&report.path).unwrap(),
            "quarterly numbers"
        );
    }

    #[tokio::test]
    async fn test_get_file_by_id_metadata_failure_skips_media() {
        let mut server = Server::new_async().await;
        let _meta = server
            .mock("GET", "/drive/v3/files/gone")
            .with_status(404)
            .with_body(r#"{"error": {"code": 404, "message": "File not found: gone."}}"#)
            .create_async()
            .await;
        let media = server
            .mock("GET", "/drive/v3/files/gone")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let id = FileId::new("gone").unwrap();
        let err = client_for(&server)
            .get_file_by_id(&token(), &id, dir.path())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        media.assert_async().await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_get_file_by_id_media_failure_removes_file() {
        let mut server = Server::new_async().await;
        let _meta = server
            .mock("GET", "/drive/v3/files/abc")
            .with_status(200)
            .with_body(r#"{"id": "abc", "name": "report.txt"}"#)
            .create_async()
            .await;
        let _media = server
            .mock("GET", "/drive/v3/files/abc")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(403)
            .with_body(r#"{"error": {"code": 403, "message": "cannotDownloadFile"}}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let id = FileId::new("abc").unwrap();
        let err = client_for(&server)
            .get_file_by_id(&token(), &id, dir.path())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(403));
        assert!(!dir.path().join("report.txt").exists());
    }

    async fn report_mocks(server: &mut Server, media_status: usize, media_body: &str) {
        server
            .mock("GET", "/drive/v3/files/abc")
            .with_status(200)
            .with_body(r#"{"id": "abc", "name": "report.txt"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/drive/v3/files/abc")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(media_status)
            .with_body(media_body)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_failed_download_keeps_existing_local_file() {
        let mut server = Server::new_async().await;
        report_mocks(&mut server, 403, r#"{"error": {"code": 403}}"#).await;

        let dir = TempDir::new().unwrap();
        let local = dir.path().join("report.txt");
        std::fs::write(&local, "local edits").unwrap();

        let id = FileId::new("abc").unwrap();
        let err = client_for(&server)
            .get_file_by_id(&token(), &id, dir.path())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(403));
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "local edits");
        assert!(!dir.path().join("report.txt.part").exists());
    }

    #[tokio::test]
    async fn test_successful_download_replaces_local_file() {
        let mut server = Server::new_async().await;
        report_mocks(&mut server, 200, "fresh copy").await;

        let dir = TempDir::new().unwrap();
        let local = dir.path().join("report.txt");
        std::fs::write(&local, "older and longer content").unwrap();

        let id = FileId::new("abc").unwrap();
        let report = client_for(&server)
            .get_file_by_id(&token(), &id, dir.path())
            .await
            .unwrap();

        assert_eq!(report.bytes, 10);
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "fresh copy");
        assert!(!dir.path().join("report.txt.part").exists());
    }

    #[tokio::test]
    async fn test_get_file_by_id_strips_directories_from_name() {
        let mut server = Server::new_async().await;
        let _meta = server
            .mock("GET", "/drive/v3/files/abc")
            .with_status(200)
            .with_body(r#"{"id": "abc", "name": "../../etc/passwd"}"#)
            .create_async()
            .await;
        let _media = server
            .mock("GET", "/drive/v3/files/abc")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(200)
            .with_body("x")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let id = FileId::new("abc").unwrap();
        let report = client_for(&server)
            .get_file_by_id(&token(), &id, dir.path())
            .await
            .unwrap();

        assert_eq!(report.path, dir.path().join("passwd"));
    }

    #[tokio::test]
    async fn test_start_resumable_upload_extracts_location() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "resumable".into()))
            .match_header("authorization", "Bearer ya29.test")
            .match_header("content-type", "application/json; charset=UTF-8")
            .match_header("x-upload-content-type", "application/octet-stream")
            .match_header("x-upload-content-length", "5")
            .match_body(Matcher::Json(serde_json::json!({ "name": "hello.txt" })))
            .with_status(200)
            .with_header("location", "https://upload.example/session123")
            .with_header("content-length", "0")
            .create_async()
            .await;

        let session = client_for(&server)
            .start_resumable_upload(&token(), "hello.txt", 5)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(session.target_uri, "https://upload.example/session123");
        assert_eq!(session.content_length, 5);
        assert_eq!(session.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_start_resumable_upload_requires_ok() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error": {"code": 403, "message": "storageQuotaExceeded"}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .start_resumable_upload(&token(), "hello.txt", 5)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_start_resumable_upload_requires_location() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let err = client_for(&server)
            .start_resumable_upload(&token(), "hello.txt", 5)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Location"));
    }

    #[tokio::test]
    async fn test_put_file_initiates_then_sends_whole_file() {
        let mut server = Server::new_async().await;
        let session_uri = format!("{}/upload/session123", server.url());
        let init = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "resumable".into()))
            .match_header("x-upload-content-length", "11")
            .match_body(Matcher::Json(serde_json::json!({ "name": "hello.txt" })))
            .with_status(200)
            .with_header("location", &session_uri)
            .create_async()
            .await;
        let transfer = server
            .mock("PUT", "/upload/session123")
            .match_header("content-type", "application/octet-stream")
            .match_header("content-length", "11")
            .match_body("hello world")
            .with_status(200)
            .with_body(r#"{"kind": "drive#file", "id": "new-id", "name": "hello.txt"}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello world").unwrap();

        let report = client_for(&server).put_file(&token(), &path).await.unwrap();

        init.assert_async().await;
        transfer.assert_async().await;
        assert_eq!(report.status, 200);
        assert_eq!(report.bytes, 11);
        assert_eq!(report.file_id.as_deref(), Some("new-id"));
    }

    #[tokio::test]
    async fn test_put_file_missing_source_sends_nothing() {
        let mut server = Server::new_async().await;
        let init = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let err = client_for(&server)
            .put_file(&token(), &dir.path().join("absent.bin"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        init.assert_async().await;
    }

    #[test]
    fn test_upload_report_speed() {
        let report = UploadReport {
            status: 200,
            file_id: None,
            bytes: 2048,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(report.bytes_per_sec(), 1024.0);

        let instant = UploadReport {
            elapsed: Duration::ZERO,
            ..report
        };
        assert_eq!(instant.bytes_per_sec(), 0.0);
    }
}
