//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartUpload},
    storage::ByteStream,
};
use futures_util::TryStreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, warn};

/// Timeouts applied to every request issued by [`ReqwestHttpClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS establishment
    pub connect: Duration,
    /// Maximum idle time between two reads
    pub read: Duration,
    /// Whole request, unless the request carries its own timeout
    pub overall: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            read: Duration::from_secs(60),
            overall: Duration::from_secs(300),
        }
    }
}

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - Connect, read and overall timeouts
/// - Streamed response bodies and streamed multipart uploads
/// - TLS via rustls
///
/// No retries happen at this layer; retry decisions belong to the sync engine.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default timeouts
    pub fn new() -> Result<Self> {
        Self::with_timeouts(HttpTimeouts::default())
    }

    /// Create a new HTTP client with custom timeouts
    pub fn with_timeouts(timeouts: HttpTimeouts) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeouts.overall)
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .pool_max_idle_per_host(4)
            .user_agent(concat!("music-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response.bytes().await.map_err(classify_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Map a reqwest failure onto the bridge transport taxonomy.
pub(crate) fn classify_error(e: reqwest::Error) -> BridgeError {
    if e.is_timeout() {
        return BridgeError::Timeout(e.to_string());
    }
    if e.is_connect() {
        return BridgeError::ConnectionFailed(e.to_string());
    }
    match io_kind(&e) {
        Some(io::ErrorKind::TimedOut) => BridgeError::Timeout(e.to_string()),
        Some(kind) if is_connection_kind(kind) => BridgeError::ConnectionFailed(e.to_string()),
        _ => BridgeError::OperationFailed(e.to_string()),
    }
}

/// Body-stream errors surface as `io::Error`; keep the transport class in the kind.
fn stream_error(e: reqwest::Error) -> io::Error {
    let kind = if e.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        match io_kind(&e) {
            Some(kind) if kind == io::ErrorKind::TimedOut || is_connection_kind(kind) => kind,
            _ if e.is_connect() => io::ErrorKind::ConnectionReset,
            _ => io::ErrorKind::Other,
        }
    };
    io::Error::new(kind, e)
}

fn io_kind(e: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = err.source();
    }
    None
}

fn is_connection_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = ?request.method, url = %request.url, "Executing HTTP request");

        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "HTTP request failed");
                classify_error(e)
            })?;

        Self::into_response(response).await
    }

    async fn download_stream(&self, request: HttpRequest) -> Result<ByteStream> {
        debug!(url = %request.url, "Opening download stream");

        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(classify_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::HttpStatus { status, message });
        }

        let stream = response.bytes_stream().map_err(stream_error);
        let reader = StreamReader::new(stream);

        Ok(Box::new(reader))
    }

    async fn upload_multipart(
        &self,
        request: HttpRequest,
        upload: MultipartUpload,
    ) -> Result<HttpResponse> {
        debug!(
            url = %request.url,
            file_name = %upload.file_name,
            content_length = ?upload.content_length,
            chunk_size = upload.chunk_size,
            "Starting multipart upload"
        );

        let chunks = ReaderStream::with_capacity(upload.body, upload.chunk_size.max(1));
        let body = reqwest::Body::wrap_stream(chunks);
        let part = match upload.content_length {
            Some(length) => Part::stream_with_length(body, length),
            None => Part::stream(body),
        }
        .file_name(upload.file_name)
        .mime_str(&upload.content_type)
        .map_err(|e| BridgeError::OperationFailed(format!("Invalid content type: {}", e)))?;

        let mut form = Form::new();
        for (name, value) in upload.fields {
            form = form.text(name, value);
        }
        let form = form.part(upload.field_name, part);

        let response = self
            .build_request(request)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Multipart upload failed");
                classify_error(e)
            })?;

        Self::into_response(response).await
    }
}
