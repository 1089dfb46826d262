// crates/dropgate-server/src/blob_s3.rs
// ============================================================================
// Module: S3 Blob Store
// Description: Blob store backed by S3 or an S3-compatible service.
// Purpose: Persist product chunks and manifests in durable object storage.
// Dependencies: aws-config, aws-sdk-s3, dropgate-core, tokio
// ============================================================================

//! ## Overview
//! [`S3BlobStore`] adapts the synchronous [`BlobStore`] seam onto the async
//! S3 SDK. Keys are validated before every call and prefixed with the
//! configured root prefix. Object storage is untrusted: reads stop at
//! [`MAX_OBJECT_BYTES`] and missing objects read as absent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
#[cfg(test)]
use std::sync::Mutex;

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use dropgate_config::S3BlobConfig;
use dropgate_core::BlobError;
use dropgate_core::BlobStore;
use tokio::io::AsyncReadExt;
use tokio::runtime::Runtime;

use crate::blob_keys::MAX_KEY_LENGTH;
use crate::blob_keys::normalize_prefix;
use crate::blob_keys::validate_key;
use crate::blob_keys::validate_prefix;
use crate::blocking::block_on_with_runtime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Largest object read back from storage.
pub const MAX_OBJECT_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Object Client
// ============================================================================

/// Minimal object-store client abstraction over full object keys.
trait ObjectClient: Send + Sync {
    /// Writes one object.
    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError>;
    /// Reads one object with a size limit.
    fn get(&self, key: &str, max_bytes: usize) -> Result<Option<Vec<u8>>, BlobError>;
    /// Deletes one object.
    fn delete(&self, key: &str) -> Result<(), BlobError>;
    /// Lists every object key under a prefix.
    fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError>;
}

/// S3 SDK client with its owned runtime.
struct S3ObjectClient {
    /// Underlying S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Runtime driving SDK futures outside an ambient runtime.
    runtime: Option<Arc<Runtime>>,
}

impl Drop for S3ObjectClient {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl S3ObjectClient {
    /// Builds an S3 client from configuration.
    fn new(config: &S3BlobConfig) -> Result<Self, BlobError> {
        let runtime = Runtime::new().map_err(|err| BlobError::Io(err.to_string()))?;
        let region = config.region.clone();
        let endpoint = config.endpoint.clone();
        let shared_config = block_on_with_runtime(&runtime, async move {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region));
            }
            if let Some(endpoint) = endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            loader.load().await
        })
        .map_err(BlobError::Io)?;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        Ok(Self {
            client: Client::from_conf(s3_builder.build()),
            bucket: config.bucket.clone(),
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Returns the runtime or an error if shut down.
    fn runtime(&self) -> Result<&Runtime, BlobError> {
        self.runtime
            .as_ref()
            .map(AsRef::as_ref)
            .ok_or_else(|| BlobError::Io("object store runtime closed".to_string()))
    }

    /// Drives one SDK future to completion.
    fn run<F, T>(&self, future: F) -> Result<T, BlobError>
    where
        F: Future<Output = Result<T, BlobError>> + Send + 'static,
        T: Send + 'static,
    {
        block_on_with_runtime(self.runtime()?, future).map_err(BlobError::Io)?
    }
}

impl ObjectClient for S3ObjectClient {
    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();
        self.run(async move {
            client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(bytes))
                .send()
                .await
                .map_err(|err| BlobError::Backend(err.to_string()))?;
            Ok(())
        })
    }

    fn get(&self, key: &str, max_bytes: usize) -> Result<Option<Vec<u8>>, BlobError> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();
        self.run(async move {
            let output = match client.get_object().bucket(bucket).key(key.clone()).send().await {
                Ok(output) => output,
                Err(err) => {
                    let service = err.into_service_error();
                    if service.is_no_such_key() {
                        return Ok(None);
                    }
                    return Err(BlobError::Backend(service.to_string()));
                }
            };
            if let Some(length) = output.content_length() {
                let actual = usize::try_from(length).unwrap_or(usize::MAX);
                if actual > max_bytes {
                    return Err(BlobError::Backend(format!(
                        "object too large: {key} ({actual} > {max_bytes})"
                    )));
                }
            }
            let mut reader = output.body.into_async_read();
            let mut buffer = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                let read =
                    reader.read(&mut chunk).await.map_err(|err| BlobError::Io(err.to_string()))?;
                if read == 0 {
                    break;
                }
                if buffer.len() + read > max_bytes {
                    return Err(BlobError::Backend(format!(
                        "object too large: {key} (> {max_bytes})"
                    )));
                }
                buffer.extend_from_slice(&chunk[.. read]);
            }
            Ok(Some(buffer))
        })
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();
        self.run(async move {
            client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| BlobError::Backend(err.to_string()))?;
            Ok(())
        })
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = prefix.to_string();
        self.run(async move {
            let mut keys = Vec::new();
            let mut continuation: Option<String> = None;
            loop {
                let output = client
                    .list_objects_v2()
                    .bucket(bucket.clone())
                    .prefix(prefix.clone())
                    .set_continuation_token(continuation.take())
                    .send()
                    .await
                    .map_err(|err| BlobError::Backend(err.to_string()))?;
                keys.extend(
                    output.contents().iter().filter_map(|object| object.key().map(str::to_string)),
                );
                match output.next_continuation_token() {
                    Some(token) if output.is_truncated().unwrap_or(false) => {
                        continuation = Some(token.to_string());
                    }
                    _ => break,
                }
            }
            Ok(keys)
        })
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Blob store backed by an S3 bucket.
pub struct S3BlobStore {
    /// Object client implementation.
    client: Arc<dyn ObjectClient>,
    /// Root prefix prepended to every key.
    root_prefix: String,
}

impl S3BlobStore {
    /// Connects to the configured bucket.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] when the prefix is invalid or the client cannot
    /// be initialized.
    pub fn new(config: &S3BlobConfig) -> Result<Self, BlobError> {
        if config.bucket.trim().is_empty() {
            return Err(BlobError::Backend("s3 bucket must be set".to_string()));
        }
        let root_prefix = normalize_prefix(config.prefix.as_deref().unwrap_or(""))?;
        Ok(Self {
            client: Arc::new(S3ObjectClient::new(config)?),
            root_prefix,
        })
    }

    /// Builds a store over an in-memory client.
    #[cfg(test)]
    fn in_memory(root_prefix: &str) -> Result<Self, BlobError> {
        Ok(Self {
            client: Arc::new(InMemoryObjectClient::default()),
            root_prefix: normalize_prefix(root_prefix)?,
        })
    }

    /// Returns the full object key for a blob key.
    fn object_key(&self, key: &str) -> Result<String, BlobError> {
        validate_key(key)?;
        let full = format!("{}{key}", self.root_prefix);
        if full.len() > MAX_KEY_LENGTH {
            return Err(BlobError::InvalidKey("object key exceeds length limit".to_string()));
        }
        Ok(full)
    }
}

impl BlobStore for S3BlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        if bytes.len() > MAX_OBJECT_BYTES {
            return Err(BlobError::Backend(format!(
                "object too large: {key} ({} > {MAX_OBJECT_BYTES})",
                bytes.len()
            )));
        }
        self.client.put(&self.object_key(key)?, bytes.to_vec())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        self.client.get(&self.object_key(key)?, MAX_OBJECT_BYTES)
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.client.delete(&self.object_key(key)?)
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        validate_prefix(prefix)?;
        let full_prefix = format!("{}{prefix}", self.root_prefix);
        let mut keys: Vec<String> = self
            .client
            .list(&full_prefix)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.root_prefix).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// ============================================================================
// SECTION: In-Memory Test Client
// ============================================================================

/// Object client holding objects in memory.
#[cfg(test)]
#[derive(Default)]
struct InMemoryObjectClient {
    /// Objects keyed by full object key.
    objects: Mutex<std::collections::BTreeMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl InMemoryObjectClient {
    /// Locks the object map.
    fn objects(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, std::collections::BTreeMap<String, Vec<u8>>>, BlobError>
    {
        self.objects.lock().map_err(|_| BlobError::Io("object store lock poisoned".to_string()))
    }
}

#[cfg(test)]
impl ObjectClient for InMemoryObjectClient {
    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        self.objects()?.insert(key.to_string(), bytes);
        Ok(())
    }

    fn get(&self, key: &str, max_bytes: usize) -> Result<Option<Vec<u8>>, BlobError> {
        let objects = self.objects()?;
        match objects.get(key) {
            Some(bytes) if bytes.len() > max_bytes => {
                Err(BlobError::Backend(format!("object too large: {key}")))
            }
            Some(bytes) => Ok(Some(bytes.clone())),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.objects()?.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        Ok(self.objects()?.keys().filter(|key| key.starts_with(prefix)).cloned().collect())
    }
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

    use super::S3BlobStore;

    #[test]
    fn keys_round_trip_under_root_prefix() {
        let store = S3BlobStore::in_memory("tenant-a/").expect("store");
        store.put("products/p-1/chunks/000000", b"chunk").expect("put");
        assert_eq!(store.get("products/p-1/chunks/000000").expect("get"), Some(b"chunk".to_vec()));
        assert_eq!(
            store.list_prefix("products/p-1/").expect("list"),
            vec!["products/p-1/chunks/000000".to_string()]
        );
        store.delete("products/p-1/chunks/000000").expect("delete");
        assert_eq!(store.get("products/p-1/chunks/000000").expect("get"), None);
    }

    #[test]
    fn invalid_keys_never_reach_the_client() {
        let store = S3BlobStore::in_memory("").expect("store");
        assert!(matches!(store.put("../x", b"x"), Err(BlobError::InvalidKey(_))));
        assert!(matches!(store.list_prefix("/abs/"), Err(BlobError::InvalidKey(_))));
    }

    #[test]
    fn absolute_root_prefix_is_rejected() {
        assert!(S3BlobStore::in_memory("/root").is_err());
    }
}
