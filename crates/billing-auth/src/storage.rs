//! Durable key/value storage for credentials
//!
//! `FileStorage` keeps a flat JSON object on disk. All writes use atomic
//! temp-file + rename so a crash mid-write never leaves a truncated file, and
//! the file is created 0600 on unix since it holds bearer credentials.
//! Operations are synchronous: the token store must be able to read and write
//! without crossing a suspension point.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Minimal string key/value store (`get` / `set` / `remove`).
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Storage backed by a JSON file.
///
/// The Mutex serializes read-modify-write cycles so concurrent mutations from
/// login and refresh cannot interleave their file writes.
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the storage file at `path`.
    ///
    /// A missing file is a cold start with no stored credentials; the file is
    /// created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::Storage(format!("reading {}: {e}", path.display())))?;
            let entries: BTreeMap<String, String> = if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)
                    .map_err(|e| Error::Storage(format!("parsing {}: {e}", path.display())))?
            };
            info!(path = %path.display(), keys = entries.len(), "opened credential storage");
            entries
        } else {
            info!(path = %path.display(), "credential storage not found, starting empty");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        state.insert(key.to_string(), value.to_string());
        debug!(key, "stored value");
        write_atomic(&self.path, &state)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        if state.remove(key).is_some() {
            debug!(key, "removed value");
            write_atomic(&self.path, &state)?;
        }
        Ok(())
    }
}

/// In-process storage with no persistence.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with the given entries.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let state = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Write the map to `path` atomically with owner-only permissions.
fn write_atomic(path: &Path, data: &BTreeMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Storage(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| Error::Storage(format!("creating {}: {e}", dir.display())))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    // Owner-only from creation, before any credential bytes hit the disk
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(&tmp_path)
        .map_err(|e| Error::Storage(format!("creating temp credential file: {e}")))?;

    // A leftover temp file from an earlier run keeps its old mode
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Storage(format!("setting credential file permissions: {e}")))?;
    }

    file.write_all(json.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::Storage(format!("writing temp credential file: {e}")))?;
    drop(file);

    std::fs::rename(&tmp_path, path)
        .map_err(|e| Error::Storage(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
