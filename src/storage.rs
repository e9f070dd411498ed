//! Storage module to manage processed-image files keyed by identifier.
//!
//! Files are stored under a directory tree derived from the identifier so a
//! large number of derivatives does not pile up in a single directory.
//! Identifiers are unique per job, so writes to distinct identifiers never
//! touch the same path.

use std::{
    fs,
    path::PathBuf,
    str::FromStr,
};
use uuid::Uuid;

/// Opaque identifier naming a job and its eventual stored output.
///
/// Generated before the job is handed off, so callers can be told the
/// identifier while processing is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ImageId(Uuid);

impl ImageId {
    /// Generates a fresh, globally unique identifier.
    pub fn generate() -> ImageId {
        ImageId(Uuid::new_v4())
    }

    /// First bytes of the identifier, used to derive the shard directory.
    fn shard_bytes(&self) -> (u8, u8) {
        let bytes = self.0.as_bytes();
        (bytes[0], bytes[1])
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ImageId {
    type Err = ImageIdParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value)
            .map(ImageId)
            .map_err(|_| ImageIdParseError)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("image id must be a valid UUID")]
pub struct ImageIdParseError;

#[derive(Debug, Clone)]
pub struct Storage {
    root_path: PathBuf,
}

impl Storage {
    /// Creates a new `Storage` instance with the specified root path.
    ///
    /// # Arguments
    /// * `root` - Root directory path where all files will be stored.
    pub fn new(root: PathBuf) -> Storage {
        Storage { root_path: root }
    }

    /// Writes processed image bytes under the given identifier.
    ///
    /// Writing the same identifier twice overwrites the previous content.
    /// Identifiers are unique per job, so this only happens when a caller
    /// reuses an identifier on purpose.
    ///
    /// # Arguments
    ///
    /// * `id` - Identifier the bytes are keyed by.
    /// * `bytes` - The encoded image to persist.
    ///
    /// # Errors
    /// - `StorageError::WriteFailed` if directory creation or the write fails.
    pub fn put(&self, id: &ImageId, bytes: &[u8]) -> Result<(), StorageError> {
        let dir_path = self.derive_abs_dir(id);
        fs::create_dir_all(&dir_path).map_err(StorageError::WriteFailed)?;

        let filepath = dir_path.join(self.derive_filename(id));
        fs::write(filepath, bytes).map_err(StorageError::WriteFailed)?;

        Ok(())
    }

    /// Reads back the bytes stored under the given identifier.
    ///
    /// # Errors
    /// - `StorageError::NotFound` if nothing was stored under `id`. A job that
    ///   is still pending or has failed reads the same way as one that never
    ///   existed.
    /// - `StorageError::ReadFailed` on any other I/O error.
    pub fn get(&self, id: &ImageId) -> Result<Vec<u8>, StorageError> {
        let filepath = self.derive_abs_dir(id).join(self.derive_filename(id));

        match fs::read(&filepath) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound { id: *id })
            }
            Err(e) => Err(StorageError::ReadFailed(e)),
        }
    }

    /// Derives a relative directory path from the identifier (for sharding).
    /// Example: `01/23/`
    fn derive_dir(&self, id: &ImageId) -> PathBuf {
        let (a, b) = id.shard_bytes();
        PathBuf::from(format!("{:02x}/{:02x}/", a, b))
    }

    /// Derives the absolute directory path on the filesystem.
    fn derive_abs_dir(&self, id: &ImageId) -> PathBuf {
        self.root_path.join(self.derive_dir(id))
    }

    /// Generates a filename for the identifier. Derivatives are always
    /// re-encoded as JPEG, so the extension is fixed.
    fn derive_filename(&self, id: &ImageId) -> PathBuf {
        PathBuf::from(format!("{}.jpg", id))
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No bytes are stored under the identifier.
    #[error("no stored image for id {id}")]
    NotFound { id: ImageId },

    /// Filesystem error while persisting bytes.
    #[error("failed to write stored image: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// Filesystem error while reading bytes back.
    #[error("failed to read stored image: {0}")]
    ReadFailed(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use crate::storage::{ImageId, ImageIdParseError, Storage, StorageError};
    use std::{path::PathBuf, str::FromStr};
    use tempfile::TempDir;

    #[test]
    fn test_id_parse_round_trip() {
        let id = ImageId::generate();
        assert_eq!(Ok(id), ImageId::from_str(&id.to_string()));

        assert_eq!(Err(ImageIdParseError), ImageId::from_str("not-a-uuid"));
    }

    #[test]
    fn test_paths_follow_shard_scheme() {
        let storage = Storage::new("/root".into());
        let id = ImageId::from_str("329435e5-e66b-e809-0000-000000000000").unwrap();

        assert_eq!(PathBuf::from("32/94/"), storage.derive_dir(&id));
        assert_eq!(PathBuf::from("/root/32/94/"), storage.derive_abs_dir(&id));
    }

    #[test]
    fn test_put_get_round_trip() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());

        let id = ImageId::generate();
        let bytes = vec![0xde, 0xad, 0xbe, 0xef];

        storage.put(&id, &bytes).unwrap();

        assert_eq!(bytes, storage.get(&id).unwrap());
    }

    #[test]
    fn test_put_overwrites_same_id() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());

        let id = ImageId::generate();
        storage.put(&id, b"first").unwrap();
        storage.put(&id, b"second").unwrap();

        assert_eq!(b"second".to_vec(), storage.get(&id).unwrap());
    }

    #[test]
    fn test_get_unknown_id_is_not_found() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());

        let id = ImageId::generate();
        let result = storage.get(&id);
        let Err(StorageError::NotFound { id: missing }) = result else {
            panic!("expected NotFound error, but got {:?}", result);
        };

        assert_eq!(id, missing);
    }

    #[test]
    fn test_distinct_ids_do_not_interfere() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());

        let a = ImageId::generate();
        let b = ImageId::generate();

        storage.put(&a, b"image a").unwrap();
        storage.put(&b, b"image b").unwrap();

        assert_eq!(b"image a".to_vec(), storage.get(&a).unwrap());
        assert_eq!(b"image b".to_vec(), storage.get(&b).unwrap());
    }
}
