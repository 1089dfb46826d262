// crates/dropgate-server/src/blob_fs.rs
// ============================================================================
// Module: Filesystem Blob Store
// Description: Blob store rooted at a local directory.
// Purpose: Persist product chunks and manifests on disk with atomic writes.
// Dependencies: dropgate-core
// ============================================================================

//! ## Overview
//! Each key maps to a file below the configured root. Writes land in a
//! hidden sibling file and are renamed into place, so readers never observe
//! a partial chunk. Resolved paths must stay inside the canonical root even
//! when directories are symlinked.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use dropgate_core::BlobError;
use dropgate_core::BlobStore;

use crate::blob_keys::validate_key;
use crate::blob_keys::validate_prefix;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Blob store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    /// Canonical root directory.
    root: PathBuf,
}

impl FilesystemBlobStore {
    /// Opens (creating when needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Io`] when the root cannot be created or resolved.
    pub fn open(root: &Path) -> Result<Self, BlobError> {
        fs::create_dir_all(root)
            .map_err(|err| BlobError::Io(format!("unable to create blob root: {err}")))?;
        let root = root
            .canonicalize()
            .map_err(|err| BlobError::Io(format!("unable to resolve blob root: {err}")))?;
        Ok(Self {
            root,
        })
    }

    /// Resolves the parent directory for `key`, creating it when asked.
    ///
    /// Returns `None` when the parent does not exist and `create` is false.
    fn resolve_parent(&self, key: &str, create: bool) -> Result<Option<PathBuf>, BlobError> {
        validate_key(key)?;
        let joined = self.root.join(key);
        let parent =
            joined.parent().ok_or_else(|| BlobError::InvalidKey("key missing parent".to_string()))?;
        if create {
            fs::create_dir_all(parent)
                .map_err(|err| BlobError::Io(format!("unable to create blob directory: {err}")))?;
        }
        let parent = match parent.canonicalize() {
            Ok(parent) => parent,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(BlobError::Io(format!("unable to resolve blob path: {err}"))),
        };
        if !parent.starts_with(&self.root) {
            return Err(BlobError::InvalidKey("key escapes blob root".to_string()));
        }
        Ok(Some(parent))
    }

    /// Returns the final file name segment of a validated key.
    fn file_name(key: &str) -> &str {
        key.rsplit('/').next().unwrap_or(key)
    }
}

impl BlobStore for FilesystemBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let Some(parent) = self.resolve_parent(key, true)? else {
            return Err(BlobError::Io("blob directory vanished".to_string()));
        };
        let name = Self::file_name(key);
        let target = parent.join(name);
        let staging = parent.join(format!(".{name}.partial"));
        let mut file = fs::File::create(&staging)
            .map_err(|err| BlobError::Io(format!("unable to create blob: {err}")))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|err| BlobError::Io(format!("unable to write blob: {err}")))?;
        drop(file);
        fs::rename(&staging, &target)
            .map_err(|err| BlobError::Io(format!("unable to commit blob: {err}")))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let Some(parent) = self.resolve_parent(key, false)? else {
            return Ok(None);
        };
        match fs::read(parent.join(Self::file_name(key))) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BlobError::Io(format!("unable to read blob: {err}"))),
        }
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        let Some(parent) = self.resolve_parent(key, false)? else {
            return Ok(());
        };
        match fs::remove_file(parent.join(Self::file_name(key))) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BlobError::Io(format!("unable to delete blob: {err}"))),
        }
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        validate_prefix(prefix)?;
        let start_dir = prefix.rfind('/').map_or("", |index| &prefix[.. index]);
        let start = self.root.join(start_dir);
        let mut keys = Vec::new();
        if start.is_dir() {
            collect_keys(&start, start_dir, &mut keys)?;
        }
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Recursively collects blob keys below `dir`, skipping hidden entries.
fn collect_keys(dir: &Path, key_prefix: &str, keys: &mut Vec<String>) -> Result<(), BlobError> {
    let entries =
        fs::read_dir(dir).map_err(|err| BlobError::Io(format!("unable to list blobs: {err}")))?;
    for entry in entries {
        let entry = entry.map_err(|err| BlobError::Io(format!("unable to list blobs: {err}")))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let key = if key_prefix.is_empty() { name } else { format!("{key_prefix}/{name}") };
        let file_type = entry
            .file_type()
            .map_err(|err| BlobError::Io(format!("unable to list blobs: {err}")))?;
        if file_type.is_dir() {
            collect_keys(&entry.path(), &key, keys)?;
        } else if file_type.is_file() {
            keys.push(key);
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test assertions use expect for clarity."
    )]

    use dropgate_core::BlobError;
    use dropgate_core::BlobStore;

    use super::FilesystemBlobStore;

    #[test]
    fn put_get_delete_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemBlobStore::open(dir.path()).expect("open");
        store.put("products/p-1/chunks/000000", b"alpha").expect("put");
        store.put("products/p-1/chunks/000000", b"beta").expect("overwrite");
        assert_eq!(store.get("products/p-1/chunks/000000").expect("get"), Some(b"beta".to_vec()));
        store.delete("products/p-1/chunks/000000").expect("delete");
        assert_eq!(store.get("products/p-1/chunks/000000").expect("get"), None);
        store.delete("products/p-1/chunks/000000").expect("delete missing");
    }

    #[test]
    fn missing_directories_read_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemBlobStore::open(dir.path()).expect("open");
        assert_eq!(store.get("products/none/manifest.json").expect("get"), None);
        assert!(store.list_prefix("products/none/").expect("list").is_empty());
    }

    #[test]
    fn list_prefix_is_sorted_and_skips_staging_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemBlobStore::open(dir.path()).expect("open");
        store.put("products/p-1/chunks/000001", b"b").expect("put");
        store.put("products/p-1/chunks/000000", b"a").expect("put");
        store.put("products/p-1/manifest.json", b"{}").expect("put");
        store.put("products/p-2/chunks/000000", b"c").expect("put");
        std::fs::write(dir.path().join("products/p-1/chunks/.000002.partial"), b"x")
            .expect("stray");
        let keys = store.list_prefix("products/p-1/").expect("list");
        assert_eq!(
            keys,
            vec![
                "products/p-1/chunks/000000".to_string(),
                "products/p-1/chunks/000001".to_string(),
                "products/p-1/manifest.json".to_string(),
            ]
        );
        assert_eq!(store.list_prefix("products/p-").expect("list").len(), 4);
    }

    #[test]
    fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemBlobStore::open(dir.path()).expect("open");
        assert!(matches!(store.put("../escape", b"x"), Err(BlobError::InvalidKey(_))));
        assert!(matches!(store.get("/etc/passwd"), Err(BlobError::InvalidKey(_))));
    }
}
