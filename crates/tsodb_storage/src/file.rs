//! File-based backing store.

use crate::backend::{AppNamespace, BackingStore, ObjectKey};
use crate::batch::WriteBatch;
use crate::error::{StorageError, StorageResult};
use crate::frame::{Frame, FrameRead};
use crate::memory::InMemoryBackend;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Statistics returned by [`FileBackend::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Live records written to the new log.
    pub records: usize,
}

#[derive(Debug)]
struct LogFile {
    file: File,
    size: u64,
}

/// A file-based backing store.
///
/// Every applied batch and every namespace wipe is appended to a single log
/// file as a checksummed frame. On open the log is replayed into an
/// in-memory index that serves all reads.
///
/// # Durability
///
/// - `apply()` writes the whole frame and flushes it to the OS before the
///   batch becomes visible to readers
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Recovery
///
/// A frame cut short by a crash at the end of the log is discarded and the
/// file truncated to the last complete frame. Only a frame with an intact
/// header qualifies. A damaged header anywhere, or a damaged payload
/// before the last frame, is reported as [`StorageError::Corrupted`] and
/// nothing is truncated.
///
/// # Thread Safety
///
/// Appends are serialized by an internal mutex that is held until the batch
/// is visible in the index, so log order always matches visibility order.
/// The file is locked exclusively for the lifetime of the backend.
///
/// # Example
///
/// ```no_run
/// use tsodb_storage::{BackingStore, FileBackend, WriteBatch};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("world.log")).unwrap();
/// let mut batch = WriteBatch::new();
/// batch.put([1; 16], b"persistent data".to_vec());
/// backend.apply(1, &batch).unwrap();
/// backend.sync().unwrap();  // Ensure data is durable
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    log: Mutex<LogFile>,
    index: InMemoryBackend,
}

impl FileBackend {
    /// Opens or creates a log at the given path and replays it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// process, or holds a corrupted frame before its tail.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive().map_err(|_| StorageError::Locked)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let index = InMemoryBackend::new();
        let (valid_end, frames) = replay(&data, &index)?;
        if valid_end < data.len() {
            tracing::warn!(
                path = %path.display(),
                discarded = data.len() - valid_end,
                "truncating torn frame at end of log"
            );
            file.set_len(valid_end as u64)?;
            file.sync_all()?;
        }
        tracing::info!(
            path = %path.display(),
            frames,
            records = index.total_count(),
            "recovered backing store log"
        );

        Ok(Self {
            path: path.to_path_buf(),
            log: Mutex::new(LogFile {
                file,
                size: valid_end as u64,
            }),
            index,
        })
    }

    /// Opens or creates a log, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the log cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current size of the log in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.log.lock().size
    }

    /// Returns every namespace that holds at least one record.
    #[must_use]
    pub fn namespaces(&self) -> Vec<AppNamespace> {
        self.index.namespaces()
    }

    /// Rewrites the log so it holds exactly one frame per live namespace.
    ///
    /// The new log is written, synced and locked under a temporary name
    /// before it is renamed over the old one, and the open handle is swapped
    /// in right after the rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the new log cannot be written or renamed; the
    /// old log stays authoritative in that case. An error syncing the
    /// parent directory is reported after the swap, when the new log is
    /// already in use.
    pub fn compact(&self) -> StorageResult<CompactionStats> {
        let mut log = self.log.lock();
        let bytes_before = log.size;

        let mut content = Vec::new();
        let mut records = 0;
        for app in self.index.namespaces() {
            let mut batch = WriteBatch::new();
            for (key, bytes) in self.index.snapshot(app) {
                batch.put(key, bytes);
                records += 1;
            }
            content.extend(Frame::Batch { app, batch }.encode()?);
        }

        let tmp_path = self.path.with_extension("compact");
        let file = match write_compacted(&tmp_path, &content) {
            Ok(file) => file,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            drop(file);
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        *log = LogFile {
            file,
            size: content.len() as u64,
        };
        sync_parent_dir(&self.path)?;

        tracing::info!(
            path = %self.path.display(),
            bytes_before,
            bytes_after = log.size,
            records,
            "compacted backing store log"
        );
        Ok(CompactionStats {
            bytes_before,
            bytes_after: log.size,
            records,
        })
    }

    fn append_frame(&self, frame: &Frame, publish: impl FnOnce()) -> StorageResult<()> {
        let bytes = frame.encode()?;
        let mut log = self.log.lock();
        let start = log.size;

        if let Err(e) = write_at(&mut log.file, start, &bytes) {
            // Drop whatever part of the frame made it to the file
            let _ = log.file.set_len(start);
            return Err(e.into());
        }
        log.size = start + bytes.len() as u64;
        publish();
        Ok(())
    }
}

/// Writes a complete, synced and locked replacement log.
fn write_compacted(path: &Path, content: &[u8]) -> StorageResult<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.try_lock_exclusive().map_err(|_| StorageError::Locked)?;
    file.write_all(content)?;
    file.sync_all()?;
    Ok(file)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

// Directories cannot be opened for syncing here.
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> StorageResult<()> {
    Ok(())
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.flush()
}

fn replay(data: &[u8], index: &InMemoryBackend) -> StorageResult<(usize, usize)> {
    let mut offset = 0;
    let mut frames = 0;
    while offset < data.len() {
        match Frame::read(data, offset)? {
            FrameRead::Complete(frame, next) => {
                match frame {
                    Frame::Batch { app, batch } => index.apply_in_memory(app, &batch),
                    Frame::Clear { app } => {
                        index.clear_in_memory(app);
                    }
                }
                frames += 1;
                offset = next;
            }
            FrameRead::Torn => break,
        }
    }
    Ok((offset, frames))
}

impl BackingStore for FileBackend {
    fn read(&self, app: AppNamespace, key: &ObjectKey) -> StorageResult<Option<Vec<u8>>> {
        self.index.read(app, key)
    }

    fn contains(&self, app: AppNamespace, key: &ObjectKey) -> StorageResult<bool> {
        self.index.contains(app, key)
    }

    fn apply(&self, app: AppNamespace, batch: &WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let frame = Frame::Batch {
            app,
            batch: batch.clone(),
        };
        self.append_frame(&frame, || self.index.apply_in_memory(app, batch))
    }

    fn clear(&self, app: AppNamespace) -> StorageResult<usize> {
        let mut removed = 0;
        self.append_frame(&Frame::Clear { app }, || {
            removed = self.index.clear_in_memory(app);
        })?;
        Ok(removed)
    }

    fn count(&self, app: AppNamespace) -> StorageResult<usize> {
        self.index.count(app)
    }

    fn keys(&self, app: AppNamespace) -> StorageResult<Vec<ObjectKey>> {
        self.index.keys(app)
    }

    fn sync(&self) -> StorageResult<()> {
        self.log.lock().file.sync_all()?;
        Ok(())
    }
}
