//! File server REST connector
//!
//! Implements [`FileServer`] over the server's JSON + multipart API.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::file_server::{
    FileServer, RemoteFileEntry, RemoteTrack, UploadMetadata, UploadReceipt,
};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartUpload};
use bridge_traits::storage::ByteStream;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::FileServerError;
use crate::types::{SyncStatusItem, TrackMetadataResponse, TrackResource};

const STATUS_PATH: &str = "/api/sync/status";
const TRACKS_PATH: &str = "/api/tracks";
const UPLOAD_PATH: &str = "/api/tracks/upload";

/// Multipart field carrying the file body
const UPLOAD_FIELD: &str = "file";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Body fragments the server uses to report a duplicate `file_hash` on insert.
const DUPLICATE_MARKERS: &[&str] = &["unique constraint", "already exists"];

/// REST connector for the content-addressable file server
///
/// # Example
///
/// ```ignore
/// use provider_file_server::FileServerConnector;
/// use bridge_traits::FileServer;
///
/// let server = FileServerConnector::new(http_client, "https://music.example.net", token);
/// let listing = server.list_status().await?;
/// ```
pub struct FileServerConnector {
    http_client: Arc<dyn HttpClient>,

    /// Base address without a trailing slash
    base_url: String,

    access_token: String,

    /// Deadline for listing and delete calls
    request_timeout: Duration,

    /// Deadline for upload and download calls
    transfer_timeout: Duration,

    /// Upload body chunk size in bytes
    chunk_size: usize,
}

impl FileServerConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            request_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(600),
            chunk_size: 64 * 1024,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn track_endpoint(&self, identifier: &str, suffix: &str) -> String {
        format!(
            "{}{}/{}{}",
            self.base_url,
            TRACKS_PATH,
            urlencoding::encode(identifier),
            suffix
        )
    }

    fn request(&self, method: HttpMethod, url: String, timeout: Duration) -> HttpRequest {
        HttpRequest::new(method, url)
            .bearer_token(self.access_token.as_str())
            .header("Accept", "application/json")
            .timeout(timeout)
    }

    /// Translate a non-success status into the provider taxonomy.
    fn status_error(status: u16, body: &str) -> FileServerError {
        let message = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            body.to_string()
        };
        let lowered = body.to_ascii_lowercase();

        match status {
            401 | 403 => FileServerError::AuthenticationFailed(message),
            404 => FileServerError::NotFound { resource: message },
            409 => FileServerError::DuplicateContent(message),
            500..=599 if DUPLICATE_MARKERS.iter().any(|m| lowered.contains(m)) => {
                FileServerError::DuplicateContent(message)
            }
            _ => FileServerError::ApiError {
                status_code: status,
                message,
            },
        }
    }

    fn ensure_success(response: HttpResponse) -> std::result::Result<HttpResponse, FileServerError> {
        if response.is_success() {
            return Ok(response);
        }
        let body = String::from_utf8_lossy(&response.body);
        warn!(status = response.status, "File server request failed");
        Err(Self::status_error(response.status, &body))
    }

    fn parse<T: DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| {
            FileServerError::ParseError(format!("Failed to parse {}: {}", what, e)).into()
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let request = self.request(HttpMethod::Get, self.endpoint(path), self.request_timeout);
        let response = self.http_client.execute(request).await?;
        let response = Self::ensure_success(response)?;
        Self::parse(&response, what)
    }
}

#[async_trait]
impl FileServer for FileServerConnector {
    #[instrument(skip(self))]
    async fn list_status(&self) -> Result<Vec<RemoteFileEntry>> {
        let items: Vec<SyncStatusItem> = self.get_json(STATUS_PATH, "sync status").await?;
        debug!(count = items.len(), "Fetched sync status");
        Ok(items.into_iter().map(RemoteFileEntry::from).collect())
    }

    #[instrument(skip(self, metadata, body), fields(file = %metadata.filename))]
    async fn upload(
        &self,
        metadata: UploadMetadata,
        body: ByteStream,
        size_hint: Option<u64>,
    ) -> Result<UploadReceipt> {
        let mut fields = Vec::new();
        if let Some(title) = metadata.title {
            fields.push(("title".to_string(), title));
        }
        if let Some(artist) = metadata.artist {
            fields.push(("artist".to_string(), artist));
        }
        if let Some(album) = metadata.album {
            fields.push(("album".to_string(), album));
        }
        if let Some(duration) = metadata.duration_secs {
            fields.push(("duration".to_string(), duration.to_string()));
        }

        let upload = MultipartUpload {
            field_name: UPLOAD_FIELD.to_string(),
            file_name: metadata.filename,
            content_type: metadata
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            fields,
            body,
            content_length: size_hint,
            chunk_size: self.chunk_size,
        };

        let request = self.request(
            HttpMethod::Post,
            self.endpoint(UPLOAD_PATH),
            self.transfer_timeout,
        );
        let response = self.http_client.upload_multipart(request, upload).await?;
        let response = Self::ensure_success(response)?;
        let meta: TrackMetadataResponse = Self::parse(&response, "upload response")?;

        info!(content_hash = %meta.file_hash, "Upload accepted by server");
        Ok(meta.into())
    }

    #[instrument(skip(self))]
    async fn list_tracks(&self) -> Result<Vec<RemoteTrack>> {
        let tracks: Vec<TrackResource> = self.get_json(TRACKS_PATH, "track list").await?;
        debug!(count = tracks.len(), "Fetched track list");
        Ok(tracks.into_iter().map(RemoteTrack::from).collect())
    }

    #[instrument(skip(self))]
    async fn download(&self, identifier: &str) -> Result<ByteStream> {
        let request = self.request(
            HttpMethod::Get,
            self.track_endpoint(identifier, "/file"),
            self.transfer_timeout,
        );

        self.http_client
            .download_stream(request)
            .await
            .map_err(|e| match e {
                BridgeError::HttpStatus { status, message } => {
                    Self::status_error(status, &message).into()
                }
                other => other,
            })
    }

    #[instrument(skip(self))]
    async fn delete(&self, identifier: &str) -> Result<bool> {
        let request = self.request(
            HttpMethod::Delete,
            self.track_endpoint(identifier, ""),
            self.request_timeout,
        );
        let response = self.http_client.execute(request).await?;

        if response.status == 404 {
            debug!("Delete target already absent");
            return Ok(false);
        }
        Self::ensure_success(response)?;
        Ok(true)
    }
}
