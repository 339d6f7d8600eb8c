//! # Snapshot Writer
//! Atomic JSON persistence: serialize to a sibling temp file, then rename
//! over the destination. A reader concurrently fetching the file sees either
//! the previous complete document or the new complete one, never a truncated
//! mix, and a crash mid-write leaves the previous file authoritative.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// The only fatal error class in a run: if the artifact cannot be durably
/// written the previous snapshot stays in place untouched.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("serializing {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    pub fn code(&self) -> &'static str {
        "write_failed"
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), WriteError> {
    let mut body = serde_json::to_vec_pretty(value).map_err(|source| WriteError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    body.push(b'\n');

    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    // Temp file lives in the destination directory so the rename cannot
    // cross filesystems.
    let tmp = temp_path(path);
    std::fs::write(&tmp, &body).map_err(io_err)?;
    if let Err(source) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(source));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_and_replaces_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data").join("live.json");

        write_json_atomic(&path, &json!({"version": 1})).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(first.contains("\"version\": 1"));

        write_json_atomic(&path, &json!({"version": 2})).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert!(second.contains("\"version\": 2"));
        assert!(!second.contains("\"version\": 1"));

        // No temp file left behind.
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn failed_write_leaves_previous_file_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("live.json");
        write_json_atomic(&path, &json!({"version": 7})).unwrap();

        // A destination whose parent is a regular file cannot be written.
        let blocked = path.join("nested.json");
        let err = write_json_atomic(&blocked, &json!({"version": 8})).unwrap_err();
        assert_eq!(err.code(), "write_failed");

        let kept = std::fs::read_to_string(&path).unwrap();
        assert!(kept.contains("\"version\": 7"));
    }
}
