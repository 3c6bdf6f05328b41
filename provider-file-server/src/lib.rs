//! # File Server Provider
//!
//! REST binding of the content-addressable [`FileServer`](bridge_traits::FileServer)
//! protocol.
//!
//! ## Overview
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | List status | `GET /api/sync/status` |
//! | Upload | `POST /api/tracks/upload` (multipart, field `file`) |
//! | Identifier lookup | `GET /api/tracks` |
//! | Download | `GET /api/tracks/{id}/file` |
//! | Delete | `DELETE /api/tracks/{id}` |
//!
//! Every request carries `Authorization: Bearer <token>`. Upload bodies are
//! streamed in fixed-size chunks and download bodies are handed back as a
//! stream; neither is buffered whole in memory.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::FileServerConnector;
pub use error::{FileServerError, Result};
