//! Advisory file locking and atomic persistence.
//!
//! All shared state files are guarded by a sibling `.lock` file so peer
//! processes can coordinate without ever truncating the data file while a
//! reader holds it. Writes always go through a temporary sibling followed
//! by a rename.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use agent_deck_core::{Error, Result};

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))
        .map_err(|e| Error::LockFailure(format!("{}: {e}", path.display())))
}

/// Acquire an exclusive advisory lock for `path`. The lock is released when
/// the returned file handle drops.
pub fn acquire_exclusive(path: &Path) -> Result<File> {
    let file = open_lock_file(path)?;
    file.lock_exclusive()
        .map_err(|e| Error::LockFailure(format!("{}: {e}", path.display())))?;
    Ok(file)
}

/// Acquire a shared advisory lock for `path`.
pub fn acquire_shared(path: &Path) -> Result<File> {
    let file = open_lock_file(path)?;
    file.lock_shared()
        .map_err(|e| Error::LockFailure(format!("{}: {e}", path.display())))?;
    Ok(file)
}

/// Write `contents` to `path` atomically: temp sibling, fsync, rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::StoreIo(e.to_string()))?;
    }

    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp).map_err(|e| Error::StoreIo(e.to_string()))?;
        file.write_all(contents)
            .map_err(|e| Error::StoreIo(e.to_string()))?;
        file.sync_all().map_err(|e| Error::StoreIo(e.to_string()))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| Error::StoreIo(e.to_string()))?;
    Ok(())
}
