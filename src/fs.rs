//! Pluggable file-system interface
//!
//! A narrowed, synchronous adaptation of the teacher's `FileSystem` trait
//! (`src/fs/types.rs`/`src/fs/in_memory_fs.rs`): kept to the read-oriented
//! surface the value engine actually needs for `FileReference`,
//! `AllowFileReference`, `MustExist`, and env-file fallback (§4.2, §6).
//! Synchronous rather than `async_trait`-based because §5 specifies an
//! explicitly single-threaded, synchronously-blocking execution model for
//! the core, unlike the teacher's fully async bash interpreter.

use std::io::Read;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FsError {
    #[error("ENOENT: no such file or directory, {operation} '{path}'")]
    NotFound { path: String, operation: String },

    #[error("EISDIR: illegal operation on a directory, {operation} '{path}'")]
    IsDirectory { path: String, operation: String },

    #[error("EPERM: operation not permitted, {operation} '{path}'")]
    PermissionDenied { path: String, operation: String },

    #[error("{message}")]
    Other { message: String },
}

/// The read-only file-system surface the value engine depends on.
pub trait FileSystem: Send + Sync {
    /// Read `path` as UTF-8 text. The name `"-"` reads from stdin, per §6.
    fn read_to_string(&self, path: &str) -> Result<String, FsError>;

    fn exists(&self, path: &str) -> bool;

    fn is_file(&self, path: &str) -> bool;
}

/// The default implementation: the real process file system plus the `"-"`
/// stdin convention.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl FileSystem for OsFs {
    fn read_to_string(&self, path: &str) -> Result<String, FsError> {
        if path == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| FsError::Other { message: e.to_string() })?;
            return Ok(buf);
        }
        let p = PathBuf::from(path);
        std::fs::read_to_string(&p).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                FsError::NotFound { path: path.to_string(), operation: "read".to_string() }
            }
            std::io::ErrorKind::PermissionDenied => {
                FsError::PermissionDenied { path: path.to_string(), operation: "read".to_string() }
            }
            _ => FsError::Other { message: e.to_string() },
        })
    }

    fn exists(&self, path: &str) -> bool {
        if path == "-" {
            return true;
        }
        PathBuf::from(path).exists()
    }

    fn is_file(&self, path: &str) -> bool {
        if path == "-" {
            return true;
        }
        PathBuf::from(path).is_file()
    }
}

/// An in-memory file system for tests, mirroring the teacher's
/// `InMemoryFs` in spirit but limited to this crate's read-only surface.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFs {
    files: std::collections::HashMap<String, String>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        InMemoryFs::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl FileSystem for InMemoryFs {
    fn read_to_string(&self, path: &str) -> Result<String, FsError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound { path: path.to_string(), operation: "read".to_string() })
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn is_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_fs_round_trips_file_content() {
        let fs = InMemoryFs::new().with_file("/etc/app.conf", "hello");
        assert!(fs.exists("/etc/app.conf"));
        assert_eq!(fs.read_to_string("/etc/app.conf").unwrap(), "hello");
    }

    #[test]
    fn in_memory_fs_reports_not_found() {
        let fs = InMemoryFs::new();
        assert!(fs.read_to_string("/nope").is_err());
    }
}
