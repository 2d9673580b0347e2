//! File export
//!
//! A [`DownloadSink`] receives finished blobs (PNG stills, recorded
//! containers) under a generated file name. Each save hands back a
//! [`DownloadHandle`] that must be released once the consumer is done with it;
//! photos release immediately, recordings after a short delay.

use crate::error::{MediaError, MediaResult};
use bytes::Bytes;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// In-memory payload with its MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Bytes,
}

impl Blob {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Concatenate chunks in order
    pub fn from_chunks(mime_type: impl Into<String>, chunks: &[Bytes]) -> Self {
        let total = chunks.iter().map(Bytes::len).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in chunks {
            data.extend_from_slice(chunk);
        }
        Self::new(mime_type, data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Opaque reference to a saved download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadHandle(u64);

impl DownloadHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Summary of a completed save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDownload {
    pub filename: String,
    pub size: usize,
    pub mime_type: String,
}

/// Destination for exported files
pub trait DownloadSink: Send + Sync {
    /// Persist `blob` under `filename`
    fn save(&self, filename: &str, blob: &Blob) -> MediaResult<DownloadHandle>;

    /// Drop any resources held for `handle`; unknown handles are ignored
    fn release(&self, handle: DownloadHandle);
}

/// `<prefix>-YYYYMMDD-HHMMSS.<extension>` in local time
pub fn timestamped_filename(prefix: &str, extension: &str, at: &DateTime<Local>) -> String {
    format!("{}-{}.{}", prefix, at.format("%Y%m%d-%H%M%S"), extension)
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> DownloadHandle {
    DownloadHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
}

/// Writes downloads into a directory
#[derive(Debug)]
pub struct DirectoryDownloadSink {
    dir: PathBuf,
    pending: Mutex<HashMap<DownloadHandle, PathBuf>>,
}

impl DirectoryDownloadSink {
    /// Sink rooted at `dir` (created if missing)
    pub fn new(dir: impl Into<PathBuf>) -> MediaResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Handles not yet released
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl DownloadSink for DirectoryDownloadSink {
    fn save(&self, filename: &str, blob: &Blob) -> MediaResult<DownloadHandle> {
        let path = self.dir.join(filename);
        std::fs::write(&path, &blob.data).map_err(|e| MediaError::Download {
            filename: filename.to_string(),
            reason: e.to_string(),
        })?;

        let handle = next_handle();
        self.pending.lock().insert(handle, path.clone());
        info!(path = %path.display(), size = blob.len(), "Saved download");
        Ok(handle)
    }

    fn release(&self, handle: DownloadHandle) {
        if let Some(path) = self.pending.lock().remove(&handle) {
            debug!(path = %path.display(), "Released download handle");
        }
    }
}

/// Keeps downloads in memory; used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryDownloadSink {
    saved: Mutex<Vec<(String, Blob)>>,
    live: Mutex<Vec<DownloadHandle>>,
    released: Mutex<Vec<DownloadHandle>>,
}

impl MemoryDownloadSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every saved `(filename, blob)` pair, in save order
    pub fn downloads(&self) -> Vec<(String, Blob)> {
        self.saved.lock().clone()
    }

    pub fn download_count(&self) -> usize {
        self.saved.lock().len()
    }

    /// Handles released so far
    pub fn released(&self) -> Vec<DownloadHandle> {
        self.released.lock().clone()
    }

    /// Handles saved but not yet released
    pub fn outstanding(&self) -> usize {
        self.live.lock().len()
    }
}

impl DownloadSink for MemoryDownloadSink {
    fn save(&self, filename: &str, blob: &Blob) -> MediaResult<DownloadHandle> {
        let handle = next_handle();
        self.saved.lock().push((filename.to_string(), blob.clone()));
        self.live.lock().push(handle);
        Ok(handle)
    }

    fn release(&self, handle: DownloadHandle) {
        let mut live = self.live.lock();
        if let Some(pos) = live.iter().position(|h| *h == handle) {
            live.remove(pos);
            self.released.lock().push(handle);
        }
    }
}
