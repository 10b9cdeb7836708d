//! File persistence helpers shared by config snapshots and checkpoints.
//!
//! Writes go to a `.tmp` sibling which is then renamed over the target, so a
//! reader never observes a half-written file.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// The `.tmp` sibling used while writing `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("unnamed"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write bytes to a temporary sibling, then rename onto `path`.
///
/// Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Serialize `data` as compact JSON and write it atomically.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_vec(data).map_err(io::Error::other)?;
    atomic_write(path, &json)
}

/// Move `from` onto `to`, replacing whatever `to` held.
pub fn replace(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::rename(from, to)
}

/// Read and deserialize a JSON file.
///
/// A missing file is an `io::ErrorKind::NotFound` error; malformed content is
/// `io::ErrorKind::InvalidData`.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<T> {
    let data = std::fs::read(path)?;
    serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        epoch: usize,
        loss: f64,
    }

    #[test]
    fn test_temp_path_appends_suffix() {
        let path = Path::new("/runs/model_best.pth.tar");
        assert_eq!(temp_path(path), PathBuf::from("/runs/model_best.pth.tar.tmp"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let data = Snapshot {
            epoch: 4,
            loss: 0.25,
        };

        atomic_write_json(&path, &data).unwrap();
        let loaded: Snapshot = read_json(&path).unwrap();
        assert_eq!(loaded, data);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let err = read_json::<Snapshot>(Path::new("/nonexistent/state.json")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_read_garbage_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.json");
        std::fs::write(&path, b"not json").unwrap();
        let err = read_json::<Snapshot>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_replace_overwrites() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"new").unwrap();
        std::fs::write(&b, b"old").unwrap();
        replace(&a, &b).unwrap();
        assert!(!a.exists());
        assert_eq!(std::fs::read(&b).unwrap(), b"new");
    }
}
