//! Per-path lock registry and atomic file replacement.
//!
//! The registry hands out one reader/writer lock per normalized absolute
//! path. The phase planner guarantees that in the common case only one
//! writer touches a path per phase; the locks defend the remaining cases,
//! namely the sequential fallback schedule and races across turns.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Registry of per-path reader/writer locks, lazily populated.
///
/// Entries live for the process lifetime. Equal paths resolve to the same
/// lock object; concurrent first accesses are serialized by the registry's
/// own mutex, so two workers can never mint distinct locks for one path.
#[derive(Default)]
pub struct LockRegistry {
    inner: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Race-free get-or-create of the lock guarding `path`.
    pub fn lock_for(&self, path: &Path) -> Arc<RwLock<()>> {
        let mut map = self.inner.lock().expect("lock registry poisoned");
        Arc::clone(map.entry(path.to_path_buf()).or_default())
    }
}

/// Write `data` to `path` atomically.
///
/// The bytes land in a temporary file in the target's own directory, are
/// flushed and fsynced, and the temp file is renamed over the target. The
/// temp file must share the target's directory: rename is only atomic
/// within one filesystem. Readers observe either the old contents or the
/// new ones, never a truncation. Missing parent directories are created
/// with mode 0o755.
pub async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "target path has no parent")
    })?;
    let mut dirs = fs::DirBuilder::new();
    dirs.recursive(true);
    #[cfg(unix)]
    dirs.mode(0o755);
    dirs.create(parent).await?;

    let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4().simple()));
    let written = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    written
}
