//! Output storage.
//!
//! [`Storage`] is the small slice of file-system behaviour the export engine
//! needs: create a uniquely named run directory, write one file, and delete a
//! run directory recursively. [`FileSystemStorage`] implements it on the
//! local disk.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Attempts at finding an unused directory name before giving up.
const MAX_NAME_ATTEMPTS: usize = 8;

/// Storage used by the export engine.
pub trait Storage: Send + Sync {
    /// Create a new, empty directory under `parent` whose name starts with
    /// `prefix`, creating `parent` if needed. Returns the new directory.
    fn create_unique_directory(&self, parent: &Path, prefix: &str) -> io::Result<PathBuf>;

    /// Write `bytes` to a new file at `path`. The parent directory must
    /// already exist.
    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Delete `path` and everything below it. Deleting a missing directory
    /// succeeds.
    fn remove_directory(&self, path: &Path) -> io::Result<()>;
}

/// [`Storage`] on the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemStorage;

impl Storage for FileSystemStorage {
    fn create_unique_directory(&self, parent: &Path, prefix: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(parent)?;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let candidate = parent.join(format!("{prefix}-{}", Uuid::new_v4().simple()));
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(error) if error.kind() == ErrorKind::AlreadyExists => continue,
                Err(error) => return Err(error),
            }
        }
        Err(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no unused directory name under {}", parent.display()),
        ))
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    fn remove_directory(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
