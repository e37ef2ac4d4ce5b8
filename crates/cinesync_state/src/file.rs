//! File-backed state store.
//!
//! All cursors live in a single JSON document:
//!
//! ```text
//! <state dir>/
//! ├─ state.json        # {"<stream>": {"last_seen_timestamp": ..., "last_seen_id": ...}}
//! ├─ state.json.tmp    # Only exists while a write is in flight
//! └─ state.json.lock   # Advisory lock, one process per state file
//! ```

use crate::cursor::SyncCursor;
use crate::error::{StateError, StateResult};
use crate::store::StateStore;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// A state store persisted to a JSON file.
///
/// Every `set` rewrites the whole document using the write-then-rename
/// pattern, so a crash leaves either the previous or the new document on
/// disk. Reads are served from an in-memory copy that is only updated after
/// the file has been durably replaced.
///
/// # Thread Safety
///
/// The store holds an exclusive advisory lock on `<file>.lock` for its whole
/// lifetime. A second store (in this or another process) on the same file
/// fails with [`StateError::Locked`].
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    temp_path: PathBuf,
    cursors: RwLock<BTreeMap<String, SyncCursor>>,
    _lock_file: File,
}

impl FileStateStore {
    /// Opens the state file at `path`, creating parent directories as needed.
    ///
    /// A missing or empty file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another store holds the lock (`Locked`)
    /// - The file exists but is not a valid cursor document (`Corrupted`)
    /// - I/O errors occur
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_path = sibling(&path, "lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StateError::Locked(path));
        }

        let temp_path = sibling(&path, "tmp");
        // A leftover temp file is a write that never reached its rename.
        if temp_path.exists() {
            tracing::warn!(path = %temp_path.display(), "discarding unfinished state write");
            fs::remove_file(&temp_path)?;
        }

        let cursors = load(&path)?;
        tracing::debug!(path = %path.display(), streams = cursors.len(), "opened state file");

        Ok(Self {
            path,
            temp_path,
            cursors: RwLock::new(cursors),
            _lock_file: lock_file,
        })
    }

    /// Returns the path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `cursors` to disk atomically.
    ///
    /// 1. Write to the temporary file
    /// 2. Sync the temporary file
    /// 3. Rename it over the state file
    /// 4. Sync the directory so the rename is durable
    fn persist(&self, cursors: &BTreeMap<String, SyncCursor>) -> StateResult<()> {
        let data = serde_json::to_vec_pretty(cursors)?;

        let mut file = File::create(&self.temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StateResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StateResult<()> {
        // NTFS journals the rename; there is no directory handle to sync.
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get(&self, stream: &str) -> StateResult<Option<SyncCursor>> {
        Ok(self.cursors.read().get(stream).copied())
    }

    fn set(&self, stream: &str, cursor: SyncCursor) -> StateResult<()> {
        let mut cursors = self.cursors.write();
        let mut next = cursors.clone();
        next.insert(stream.to_string(), cursor);
        self.persist(&next)?;
        *cursors = next;
        Ok(())
    }

    fn remove(&self, stream: &str) -> StateResult<bool> {
        let mut cursors = self.cursors.write();
        if !cursors.contains_key(stream) {
            return Ok(false);
        }
        let mut next = cursors.clone();
        next.remove(stream);
        self.persist(&next)?;
        *cursors = next;
        Ok(true)
    }

    fn entries(&self) -> StateResult<Vec<(String, SyncCursor)>> {
        Ok(self
            .cursors
            .read()
            .iter()
            .map(|(name, cursor)| (name.clone(), *cursor))
            .collect())
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

fn load(path: &Path) -> StateResult<BTreeMap<String, SyncCursor>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }

    serde_json::from_slice(&data).map_err(|e| StateError::Corrupted {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
