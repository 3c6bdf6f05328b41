//! # Work Queue Diff
//!
//! Turns two inventories into the ordered list of transfers for one run.
//!
//! Uploads cover every local hash the server does not list, in local walk
//! order. Downloads cover every listed hash missing locally, in listing
//! order. All uploads come before all downloads. The plan is computed once
//! per run and never recomputed mid-run.

use crate::hasher::ContentHash;
use crate::local_catalog::{LocalFile, LocalInventory};
use crate::remote_catalog::RemoteInventory;

/// One unit of transfer work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Upload(LocalFile),
    Download {
        content_hash: ContentHash,
        filename: String,
    },
}

impl WorkItem {
    pub fn content_hash(&self) -> &ContentHash {
        match self {
            WorkItem::Upload(file) => &file.content_hash,
            WorkItem::Download { content_hash, .. } => content_hash,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            WorkItem::Upload(file) => &file.filename,
            WorkItem::Download { filename, .. } => filename,
        }
    }

    pub fn direction(&self) -> &'static str {
        match self {
            WorkItem::Upload(_) => "upload",
            WorkItem::Download { .. } => "download",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    items: Vec<WorkItem>,
    uploads: usize,
}

impl SyncPlan {
    pub fn compute(local: &LocalInventory, remote: &RemoteInventory) -> Self {
        let mut items: Vec<WorkItem> = local
            .iter()
            .filter(|file| !remote.contains(&file.content_hash))
            .cloned()
            .map(WorkItem::Upload)
            .collect();
        let uploads = items.len();

        items.extend(
            remote
                .iter()
                .filter(|file| !local.contains(&file.content_hash))
                .map(|file| WorkItem::Download {
                    content_hash: file.content_hash.clone(),
                    filename: file.filename.clone(),
                }),
        );

        Self { items, uploads }
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
    }

    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    pub fn download_count(&self) -> usize {
        self.items.len() - self.uploads
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
