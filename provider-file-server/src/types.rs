//! File server API response types
//!
//! Wire shapes of the REST endpoints. Field names follow the server's
//! snake_case JSON.

use bridge_traits::file_server::{RemoteFileEntry, RemoteTrack, UploadReceipt};
use serde::{Deserialize, Serialize};

/// One row of `GET /api/sync/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusItem {
    pub file_hash: String,
    pub filename: String,
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

impl From<SyncStatusItem> for RemoteFileEntry {
    fn from(item: SyncStatusItem) -> Self {
        Self {
            content_hash: item.file_hash.to_ascii_lowercase(),
            filename: item.filename,
            uploaded_at: item.uploaded_at,
        }
    }
}

/// One row of `GET /api/tracks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackResource {
    pub id: String,
    pub file_hash: String,
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
}

impl From<TrackResource> for RemoteTrack {
    fn from(track: TrackResource) -> Self {
        Self {
            identifier: track.id,
            content_hash: track.file_hash.to_ascii_lowercase(),
            filename: track.filename,
        }
    }
}

/// Response body of `POST /api/tracks/upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMetadataResponse {
    pub id: String,
    pub file_hash: String,
    pub filename: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl From<TrackMetadataResponse> for UploadReceipt {
    fn from(meta: TrackMetadataResponse) -> Self {
        Self {
            content_hash: meta.file_hash.to_ascii_lowercase(),
            filename: meta.filename,
            file_size_bytes: meta.file_size,
            identifier: Some(meta.id),
        }
    }
}
