//! # Local File Catalog
//!
//! Enumerates and hashes the audio files in the user's music folder.
//!
//! ## Overview
//!
//! The catalog walks the folder recursively in pre-order, visiting the
//! entries of each directory sorted by file name so the walk order is
//! deterministic. Only files whose extension is in the supported set are
//! hashed. A file that cannot be read is logged and skipped; so is a
//! subdirectory that cannot be listed. When two files share a digest, the
//! first one reached in walk order is kept.
//!
//! A missing root is created and reported as an empty inventory, which lets
//! a fresh device download the whole remote library. A root that exists but
//! cannot be listed is an error.

use crate::hasher::{ContentHash, ContentHasher};
use crate::{Result, SyncError};
use bridge_traits::FileSystemAccess;
use core_runtime::logging::strip_path;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// One hashed file in the music folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub filename: String,
    pub content_hash: ContentHash,
    pub size_bytes: u64,
}

/// Distinct-digest view of the music folder, in walk order.
#[derive(Debug, Clone, Default)]
pub struct LocalInventory {
    files: Vec<LocalFile>,
    index: HashMap<ContentHash, usize>,
}

impl LocalInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file unless its digest is already present.
    ///
    /// Returns `false` when an earlier file with the same digest won.
    pub fn insert(&mut self, file: LocalFile) -> bool {
        if self.index.contains_key(&file.content_hash) {
            return false;
        }
        self.index.insert(file.content_hash.clone(), self.files.len());
        self.files.push(file);
        true
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.index.contains_key(hash)
    }

    pub fn get(&self, hash: &ContentHash) -> Option<&LocalFile> {
        self.index.get(hash).map(|&i| &self.files[i])
    }

    /// Files in walk order.
    pub fn iter(&self) -> impl Iterator<Item = &LocalFile> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<LocalFile> for LocalInventory {
    fn from_iter<I: IntoIterator<Item = LocalFile>>(iter: I) -> Self {
        let mut inventory = LocalInventory::new();
        for file in iter {
            inventory.insert(file);
        }
        inventory
    }
}

pub struct LocalFileCatalog {
    file_system: Arc<dyn FileSystemAccess>,
    root: PathBuf,
    extensions: Vec<String>,
    hasher: ContentHasher,
}

impl LocalFileCatalog {
    pub fn new(
        file_system: Arc<dyn FileSystemAccess>,
        root: impl Into<PathBuf>,
        extensions: &[String],
        hasher: ContentHasher,
    ) -> Self {
        Self {
            file_system,
            root: root.into(),
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            hasher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the path has one of the supported audio extensions.
    pub fn is_supported(&self, path: &Path) -> bool {
        has_audio_extension(path, &self.extensions)
    }

    /// Walk and hash the music folder.
    #[instrument(skip(self, cancel), fields(root = %strip_path(&self.root.to_string_lossy())))]
    pub async fn scan(&self, cancel: &CancellationToken) -> Result<LocalInventory> {
        let fs = &self.file_system;

        if !fs.exists(&self.root).await? {
            info!("Music folder does not exist yet, creating it");
            fs.create_dir_all(&self.root)
                .await
                .map_err(|e| SyncError::local_io(self.root.display(), e))?;
            return Ok(LocalInventory::new());
        }

        let root_entries = fs
            .list_directory(&self.root)
            .await
            .map_err(|e| SyncError::local_io(self.root.display(), e))?;

        let mut inventory = LocalInventory::new();
        let mut stack: Vec<PathBuf> = sorted_by_name(root_entries).into_iter().rev().collect();
        let mut skipped = 0usize;

        while let Some(path) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let metadata = match fs.metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(file = %strip_path(&path.to_string_lossy()), error = %e, "Skipping unreadable entry");
                    skipped += 1;
                    continue;
                }
            };

            if metadata.is_directory {
                match fs.list_directory(&path).await {
                    // Reversed so the smallest name is popped next.
                    Ok(children) => stack.extend(sorted_by_name(children).into_iter().rev()),
                    Err(e) => {
                        warn!(dir = %strip_path(&path.to_string_lossy()), error = %e, "Skipping unreadable directory");
                        skipped += 1;
                    }
                }
                continue;
            }
            if !self.is_supported(&path) {
                continue;
            }

            match self.hash_file(&path, cancel).await {
                Ok(file) => {
                    let hash = file.content_hash.clone();
                    let name = file.filename.clone();
                    if !inventory.insert(file) {
                        debug!(file = %name, content_hash = %hash.short(), "Duplicate content, keeping first file");
                    }
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(file = %strip_path(&path.to_string_lossy()), error = %e, "Skipping unreadable file");
                    skipped += 1;
                }
            }
        }

        info!(files = inventory.len(), skipped, "Local catalog built");
        Ok(inventory)
    }

    async fn hash_file(&self, path: &Path, cancel: &CancellationToken) -> Result<LocalFile> {
        let label = path.display().to_string();
        let stream = self
            .file_system
            .open_read_stream(path)
            .await
            .map_err(|e| SyncError::local_io(&label, e))?;
        let (content_hash, size_bytes) = self.hasher.hash_stream(stream, &label, cancel).await?;

        Ok(LocalFile {
            path: path.to_path_buf(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            content_hash,
            size_bytes,
        })
    }
}

/// Audio extensions synchronized when none are configured.
pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "aac"];

pub fn default_audio_extensions() -> Vec<String> {
    DEFAULT_AUDIO_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

/// Case-insensitive extension check shared by the scan and by downloads, so
/// every file the engine writes is one the next scan will find.
pub fn has_audio_extension(path: impl AsRef<Path>, extensions: &[String]) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn sorted_by_name(mut entries: Vec<PathBuf>) -> Vec<PathBuf> {
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::{BridgeError, ByteSink, ByteStream, FileMetadata};
    use bytes::Bytes;
    use tempfile::TempDir;

    fn extensions() -> Vec<String> {
        default_audio_extensions()
    }

    /// Real file system that refuses access to chosen entry names.
    struct DenyingFileSystem {
        inner: TokioFileSystem,
        unreadable_files: Vec<&'static str>,
        unlistable_dirs: Vec<&'static str>,
        no_metadata: Vec<&'static str>,
    }

    impl DenyingFileSystem {
        fn named(path: &Path, names: &[&str]) -> bool {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| names.contains(&n))
                .unwrap_or(false)
        }

        fn denied() -> BridgeError {
            BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "permission denied",
            ))
        }
    }

    #[async_trait]
    impl FileSystemAccess for DenyingFileSystem {
        async fn exists(&self, path: &Path) -> bridge_traits::Result<bool> {
            self.inner.exists(path).await
        }
        async fn metadata(&self, path: &Path) -> bridge_traits::Result<FileMetadata> {
            if Self::named(path, &self.no_metadata) {
                return Err(Self::denied());
            }
            self.inner.metadata(path).await
        }
        async fn create_dir_all(&self, path: &Path) -> bridge_traits::Result<()> {
            self.inner.create_dir_all(path).await
        }
        async fn read_file(&self, path: &Path) -> bridge_traits::Result<Bytes> {
            self.inner.read_file(path).await
        }
        async fn write_file(&self, path: &Path, data: Bytes) -> bridge_traits::Result<()> {
            self.inner.write_file(path, data).await
        }
        async fn delete_file(&self, path: &Path) -> bridge_traits::Result<()> {
            self.inner.delete_file(path).await
        }
        async fn list_directory(&self, path: &Path) -> bridge_traits::Result<Vec<PathBuf>> {
            if Self::named(path, &self.unlistable_dirs) {
                return Err(Self::denied());
            }
            self.inner.list_directory(path).await
        }
        async fn open_read_stream(&self, path: &Path) -> bridge_traits::Result<ByteStream> {
            if Self::named(path, &self.unreadable_files) {
                return Err(Self::denied());
            }
            self.inner.open_read_stream(path).await
        }
        async fn open_write_stream(&self, path: &Path) -> bridge_traits::Result<ByteSink> {
            self.inner.open_write_stream(path).await
        }
    }

    fn catalog(root: &Path) -> LocalFileCatalog {
        LocalFileCatalog::new(
            Arc::new(TokioFileSystem::new()),
            root,
            &extensions(),
            ContentHasher::new(),
        )
    }

    #[tokio::test]
    async fn test_scan_filters_and_recurses() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"alpha").unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"image").unwrap();
        std::fs::create_dir(dir.path().join("album")).unwrap();
        std::fs::write(dir.path().join("album").join("b.FLAC"), b"bravo").unwrap();

        let inventory = catalog(dir.path())
            .scan(&CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<_> = inventory.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.mp3", "b.FLAC"]);
        assert!(inventory.contains(&ContentHasher::hash_bytes(b"alpha")));
        assert_eq!(
            inventory
                .get(&ContentHasher::hash_bytes(b"bravo"))
                .unwrap()
                .size_bytes,
            5
        );
    }

    #[tokio::test]
    async fn test_duplicate_content_keeps_first_in_walk_order() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("a_dir")).unwrap();
        std::fs::write(dir.path().join("a_dir").join("z.mp3"), b"same").unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"same").unwrap();

        let inventory = catalog(dir.path())
            .scan(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(inventory.len(), 1);
        let kept = inventory.get(&ContentHasher::hash_bytes(b"same")).unwrap();
        assert_eq!(kept.filename, "z.mp3");
    }

    #[tokio::test]
    async fn test_missing_root_is_created_empty() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Music");

        let inventory = catalog(&root)
            .scan(&CancellationToken::new())
            .await
            .unwrap();

        assert!(inventory.is_empty());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_cancelled_scan() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"alpha").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = catalog(dir.path()).scan(&token).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unreadable_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"alpha").unwrap();
        std::fs::write(dir.path().join("locked.mp3"), b"locked").unwrap();
        std::fs::write(dir.path().join("vanished.flac"), b"vanished").unwrap();
        std::fs::create_dir(dir.path().join("private")).unwrap();
        std::fs::write(dir.path().join("private").join("p.mp3"), b"private").unwrap();
        std::fs::create_dir(dir.path().join("public")).unwrap();
        std::fs::write(dir.path().join("public").join("z.ogg"), b"zulu").unwrap();

        let fs = DenyingFileSystem {
            inner: TokioFileSystem::new(),
            unreadable_files: vec!["locked.mp3"],
            unlistable_dirs: vec!["private"],
            no_metadata: vec!["vanished.flac"],
        };
        let inventory = LocalFileCatalog::new(
            Arc::new(fs),
            dir.path(),
            &extensions(),
            ContentHasher::new(),
        )
        .scan(&CancellationToken::new())
        .await
        .unwrap();

        let names: Vec<_> = inventory.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.mp3", "z.ogg"]);
        assert!(!inventory.contains(&ContentHasher::hash_bytes(b"locked")));
        assert!(!inventory.contains(&ContentHasher::hash_bytes(b"private")));
    }

    #[test]
    fn test_download_names_match_scan_filter() {
        let extensions = extensions();
        assert!(has_audio_extension("Song.FLAC", &extensions));
        assert!(!has_audio_extension("cover.opus", &extensions));
        assert!(!has_audio_extension("0123abcd.bin", &extensions));
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let catalog = catalog(Path::new("/music"));
        assert!(catalog.is_supported(Path::new("x/Song.MP3")));
        assert!(catalog.is_supported(Path::new("track.ogg")));
        assert!(!catalog.is_supported(Path::new("notes.txt")));
        assert!(!catalog.is_supported(Path::new("mp3")));
    }
}
