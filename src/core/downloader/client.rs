use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use sha1::{Digest, Sha1};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::HttpTransport;
use crate::core::progress::{scaled_percent, DownloadEvent, EventSink, InstallerEvent};

/// A single file to download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Bare file name, no directories.
    pub filename: String,
    pub headers: Vec<(String, String)>,
    /// Lowercase hex SHA-1 the body must hash to.
    pub sha1: Option<String>,
}

/// Task directories untouched for this long are left over from a process
/// that never got to drop them.
pub const STALE_TASK_DIR_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const TASK_DIR_PREFIX: &str = "dl-";
/// A body that delivers nothing for this long is abandoned.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

impl DownloadRequest {
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            headers: Vec::new(),
            sha1: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_sha1(mut self, sha1: Option<String>) -> Self {
        self.sha1 = sha1.map(|hash| hash.to_ascii_lowercase());
        self
    }
}

/// Snapshot of an in-flight download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTask {
    pub id: Uuid,
    pub url: String,
    pub filename: String,
    pub total_bytes: Option<u64>,
    pub bytes_transferred: u64,
}

struct ActiveTask {
    task: DownloadTask,
    token: CancellationToken,
}

type ActiveMap = Arc<Mutex<HashMap<Uuid, ActiveTask>>>;

/// Removes the task from the active set however the download ends,
/// including when its future is dropped.
struct ActiveGuard {
    active: ActiveMap,
    id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.id);
        }
    }
}

/// A finished download living in its own scoped temp directory.
/// Dropping it without persisting deletes the file.
#[derive(Debug)]
pub struct DownloadedFile {
    id: Uuid,
    path: PathBuf,
    dir: TempDir,
}

impl DownloadedFile {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the file to `dest`, replacing what is there. Falls back to
    /// copy when rename crosses filesystems.
    pub async fn persist_to(self, dest: &Path) -> LauncherResult<PathBuf> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        if tokio::fs::rename(&self.path, dest).await.is_err() {
            tokio::fs::copy(&self.path, dest)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
        }

        debug!("Moved {:?} -> {:?}", self.path, dest);
        drop(self.dir);
        Ok(dest.to_path_buf())
    }
}

/// Streaming downloader with per-task cancellation.
pub struct Downloader {
    transport: Arc<dyn HttpTransport>,
    work_root: PathBuf,
    /// Maximum number of parallel downloads in `download_multiple`.
    concurrency: usize,
    idle_timeout: Duration,
    active: ActiveMap,
}

impl Downloader {
    pub fn new(transport: Arc<dyn HttpTransport>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            work_root: work_root.into(),
            concurrency: 4,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    // ── Single file download ────────────────────────────

    /// Downloads one file, reporting its lifecycle events to `sink`.
    pub async fn download(
        &self,
        request: DownloadRequest,
        sink: &dyn EventSink,
    ) -> LauncherResult<DownloadedFile> {
        self.download_observed(request, sink, &|_, _| {}).await
    }

    /// Like [`download`](Self::download), with events going to `sink` and
    /// `on_progress(bytes_downloaded, total_bytes)` called after every chunk.
    pub async fn download_observed(
        &self,
        request: DownloadRequest,
        sink: &dyn EventSink,
        on_progress: &(dyn Fn(u64, Option<u64>) + Send + Sync),
    ) -> LauncherResult<DownloadedFile> {
        validate_filename(&request.filename)?;

        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        self.register(id, &request, token.clone())?;
        let _guard = ActiveGuard {
            active: self.active.clone(),
            id,
        };

        sink.emit(InstallerEvent::Download(DownloadEvent::Started {
            id,
            url: request.url.clone(),
            filename: request.filename.clone(),
        }));

        let dir = self.task_dir().await?;
        let dest = dir.path().join(&request.filename);

        match self
            .stream_to_file(id, &request, &dest, &token, sink, on_progress)
            .await
        {
            Ok(()) => {
                debug!("Downloaded: {} -> {:?}", request.url, dest);
                sink.emit(InstallerEvent::Download(DownloadEvent::Complete {
                    id,
                    filename: request.filename.clone(),
                    path: dest.clone(),
                }));
                Ok(DownloadedFile {
                    id,
                    path: dest,
                    dir,
                })
            }
            Err(err) => {
                // partial data never outlives the failure
                let _ = tokio::fs::remove_file(&dest).await;
                drop(dir);

                let event = if matches!(err, LauncherError::Cancelled { .. }) {
                    info!("Download cancelled: {}", request.url);
                    DownloadEvent::Cancelled {
                        id,
                        filename: request.filename.clone(),
                    }
                } else {
                    warn!("Download failed: {} ({})", request.url, err);
                    DownloadEvent::Error {
                        id,
                        filename: request.filename.clone(),
                        reason: err.to_string(),
                    }
                };
                sink.emit(InstallerEvent::Download(event));
                Err(err)
            }
        }
    }

    async fn stream_to_file(
        &self,
        id: Uuid,
        request: &DownloadRequest,
        dest: &Path,
        token: &CancellationToken,
        sink: &dyn EventSink,
        on_progress: &(dyn Fn(u64, Option<u64>) + Send + Sync),
    ) -> LauncherResult<()> {
        let mut body = tokio::select! {
            _ = token.cancelled() => return Err(LauncherError::Cancelled { id }),
            body = self.transport.get_stream(&request.url, &request.headers) => body?,
        };
        let total = body.content_length;
        self.update(id, |task| task.total_bytes = total);

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| LauncherError::io(dest, e))?;
        let mut downloaded: u64 = 0;
        let mut hasher = request.sha1.as_ref().map(|_| Sha1::new());

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(LauncherError::Cancelled { id }),
                next = tokio::time::timeout(self.idle_timeout, body.chunks.next()) => {
                    next.map_err(|_| LauncherError::Stalled {
                        url: request.url.clone(),
                        idle_secs: self.idle_timeout.as_secs(),
                    })?
                }
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            file.write_all(&chunk)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
            downloaded += chunk.len() as u64;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }

            self.update(id, |task| task.bytes_transferred = downloaded);
            on_progress(downloaded, total);
            sink.emit(InstallerEvent::Download(DownloadEvent::Progress {
                id,
                filename: request.filename.clone(),
                bytes_downloaded: downloaded,
                total_bytes: total,
                percent: scaled_percent(downloaded, total, 100),
            }));
        }

        file.flush().await.map_err(|e| LauncherError::io(dest, e))?;
        // handle must be closed before the file is moved on Windows
        drop(file);

        if token.is_cancelled() {
            return Err(LauncherError::Cancelled { id });
        }
        if let (Some(expected), Some(hasher)) = (&request.sha1, hasher) {
            let actual = hex::encode(hasher.finalize());
            if &actual != expected {
                return Err(LauncherError::Sha1Mismatch {
                    url: request.url.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Downloads every request, at most `concurrency` at a time. Results
    /// keep the request order. The first failure drops every other file.
    pub async fn download_multiple(
        &self,
        requests: Vec<DownloadRequest>,
        sink: &dyn EventSink,
    ) -> LauncherResult<Vec<DownloadedFile>> {
        info!(
            "Starting batch download: {} files, concurrency={}",
            requests.len(),
            self.concurrency
        );

        stream::iter(requests)
            .map(|request| self.download(request, sink))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    // ── Task control ────────────────────────────────────

    /// Signals cancellation. Returns false for unknown or finished tasks.
    pub fn cancel(&self, id: Uuid) -> bool {
        let Ok(active) = self.active.lock() else {
            return false;
        };
        match active.get(&id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_tasks(&self) -> Vec<DownloadTask> {
        self.active
            .lock()
            .map(|active| active.values().map(|entry| entry.task.clone()).collect())
            .unwrap_or_default()
    }

    /// Removes task directories abandoned by earlier runs. Ones younger
    /// than [`STALE_TASK_DIR_AGE`] may belong to a live download and stay.
    pub async fn cleanup(&self) -> LauncherResult<usize> {
        self.remove_task_dirs_older_than(STALE_TASK_DIR_AGE).await
    }

    async fn remove_task_dirs_older_than(&self, age: Duration) -> LauncherResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.work_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(LauncherError::io(&self.work_root, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LauncherError::io(&self.work_root, e))?
        {
            if !entry.file_name().to_string_lossy().starts_with(TASK_DIR_PREFIX) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let idle = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .unwrap_or_default();
            if !metadata.is_dir() || idle < age {
                continue;
            }

            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove stale {:?}: {}", entry.path(), e),
            }
        }

        if removed > 0 {
            info!("Removed {} stale download dir(s) from {:?}", removed, self.work_root);
        }
        Ok(removed)
    }

    // ── Internals ───────────────────────────────────────

    fn register(
        &self,
        id: Uuid,
        request: &DownloadRequest,
        token: CancellationToken,
    ) -> LauncherResult<()> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| LauncherError::Other("download registry poisoned".into()))?;
        active.insert(
            id,
            ActiveTask {
                task: DownloadTask {
                    id,
                    url: request.url.clone(),
                    filename: request.filename.clone(),
                    total_bytes: None,
                    bytes_transferred: 0,
                },
                token,
            },
        );
        Ok(())
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut DownloadTask)) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(entry) = active.get_mut(&id) {
                f(&mut entry.task);
            }
        }
    }

    async fn task_dir(&self) -> LauncherResult<TempDir> {
        tokio::fs::create_dir_all(&self.work_root)
            .await
            .map_err(|e| LauncherError::io(&self.work_root, e))?;
        tempfile::Builder::new()
            .prefix(TASK_DIR_PREFIX)
            .tempdir_in(&self.work_root)
            .map_err(|e| LauncherError::io(&self.work_root, e))
    }
}

fn validate_filename(filename: &str) -> LauncherResult<()> {
    let bare = Path::new(filename)
        .file_name()
        .map(|name| name == filename)
        .unwrap_or(false);
    if bare {
        Ok(())
    } else {
        Err(LauncherError::Other(format!(
            "download filename must be a bare file name: {filename:?}"
        )))
    }
}
