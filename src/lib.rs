//! Workspace umbrella crate.
//!
//! Re-exports the [`core_service`] façade so host applications can depend on
//! `music-sync-workspace` alone and pick bridges through its feature flags.

pub use core_service::*;
