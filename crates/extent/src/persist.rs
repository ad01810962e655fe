//! On-disk layout for persisted extents.
//!
//! One file per extent in a flat directory. The file name is the extent hash
//! and the file holds a single-element JSON array wrapping the content:
//!
//! ```text
//! {extent_dir}/
//! ├── 3a7bd3e2360a3d29eea436fcfb7e44c735d117c42d1c1835420b6b9942dd4f1b
//! │       ["aGVsbG8g"]
//! └── 2c27...
//! ```
//!
//! Files are written to `<hash>.tmp` and renamed into place, so a reader never
//! sees a half-written extent under its final name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::extent::{Extent, ExtentData};
use crate::hash::ExtentHash;

/// Suffix of in-flight files; they are ignored on load.
pub const TEMP_SUFFIX: &str = ".tmp";

/// A failure to read or write persisted extents.
///
/// Individual file failures are logged and collected, never fatal to the
/// surrounding load or flush.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("failed to read extent directory {}: {source}", path.display())]
    ReadDir { path: PathBuf, source: io::Error },

    #[error("I/O error on extent file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to decode extent file {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("extent file {} holds {count} entries, expected 1", path.display())]
    Shape { path: PathBuf, count: usize },

    #[error("extent file {} does not hash to its name", path.display())]
    HashMismatch { path: PathBuf },

    #[error("{} is not named by an extent hash", path.display())]
    NotAnExtent { path: PathBuf },
}

/// Create the extent directory if absent; fail if the path exists but is not a directory.
pub fn ensure_extent_dir(path: &Path) -> Result<(), PersistenceError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(io_error(path))?;
    }
    if !path.is_dir() {
        return Err(PersistenceError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Path of the file holding `hash` inside `dir`.
pub fn extent_path(dir: &Path, hash: &ExtentHash) -> PathBuf {
    dir.join(hash.as_str())
}

/// Serialize extent content into the persisted file format.
pub fn encode(content: &[u8]) -> Vec<u8> {
    // A Vec of base64 strings cannot fail to serialize.
    serde_json::to_vec(&[ExtentData::from(content)]).unwrap_or_default()
}

/// Parse a persisted file body back into its content.
pub fn decode(path: &Path, body: &[u8]) -> Result<ExtentData, PersistenceError> {
    let mut entries: Vec<ExtentData> =
        serde_json::from_slice(body).map_err(|source| PersistenceError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    if entries.len() != 1 {
        return Err(PersistenceError::Shape {
            path: path.to_path_buf(),
            count: entries.len(),
        });
    }
    Ok(entries.remove(0))
}

/// Write (or overwrite) the file for one extent.
pub fn write_extent(dir: &Path, hash: &ExtentHash, content: &[u8]) -> Result<(), PersistenceError> {
    let final_path = extent_path(dir, hash);
    let temp_path = dir.join(format!("{}{}", hash.as_str(), TEMP_SUFFIX));

    fs::write(&temp_path, encode(content)).map_err(io_error(&temp_path))?;
    fs::rename(&temp_path, &final_path).map_err(io_error(&final_path))?;
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PersistenceError {
    let path = path.to_path_buf();
    move |source| PersistenceError::Io { path, source }
}

/// Read and verify one extent file. The file name must be the hash of the content.
pub fn read_extent(path: &Path) -> Result<Extent, PersistenceError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PersistenceError::NotAnExtent {
            path: path.to_path_buf(),
        })?;
    let expected: ExtentHash = name.parse().map_err(|_| PersistenceError::NotAnExtent {
        path: path.to_path_buf(),
    })?;

    let body = fs::read(path).map_err(io_error(path))?;
    let extent = Extent::new(decode(path, &body)?.into_bytes());

    if extent.hash() != &expected {
        return Err(PersistenceError::HashMismatch {
            path: path.to_path_buf(),
        });
    }
    Ok(extent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_creates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("extents");
        ensure_extent_dir(&dir).unwrap();
        assert!(dir.is_dir());
        // Second call is a no-op
        ensure_extent_dir(&dir).unwrap();
    }

    #[test]
    fn ensure_rejects_a_regular_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();
        let err = ensure_extent_dir(&file).unwrap_err();
        assert!(matches!(err, PersistenceError::NotADirectory { .. }));
    }

    #[test]
    fn file_body_is_single_element_array() {
        let body = encode(b"hello ");
        assert_eq!(body, br#"["aGVsbG8g"]"#.to_vec());
    }

    #[test]
    fn write_then_read() {
        let temp = TempDir::new().unwrap();
        let hash = ExtentHash::of(b"persisted");
        write_extent(temp.path(), &hash, b"persisted").unwrap();

        let path = extent_path(temp.path(), &hash);
        assert!(path.exists());
        assert!(!temp.path().join(format!("{hash}{TEMP_SUFFIX}")).exists());

        let extent = read_extent(&path).unwrap();
        assert_eq!(extent.content().as_ref(), b"persisted");
    }

    #[test]
    fn read_rejects_mismatched_name() {
        let temp = TempDir::new().unwrap();
        let wrong = ExtentHash::of(b"other");
        fs::write(extent_path(temp.path(), &wrong), encode(b"content")).unwrap();

        let err = read_extent(&extent_path(temp.path(), &wrong)).unwrap_err();
        assert!(matches!(err, PersistenceError::HashMismatch { .. }));
    }

    #[test]
    fn read_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let hash = ExtentHash::of(b"garbage");
        let path = extent_path(temp.path(), &hash);
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            read_extent(&path).unwrap_err(),
            PersistenceError::Decode { .. }
        ));

        fs::write(&path, br#"["YQ==","Yg=="]"#).unwrap();
        assert!(matches!(
            read_extent(&path).unwrap_err(),
            PersistenceError::Shape { count: 2, .. }
        ));
    }

    #[test]
    fn read_rejects_foreign_file_names() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("README");
        fs::write(&path, encode(b"x")).unwrap();
        assert!(matches!(
            read_extent(&path).unwrap_err(),
            PersistenceError::NotAnExtent { .. }
        ));
    }
}
