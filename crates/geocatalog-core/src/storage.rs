//! Object storage access for item discovery.
//!
//! The ingestion pipeline only needs three things from storage: whether a
//! bucket URI is supported, a filtered listing of object URIs under a prefix,
//! and the bytes of a single object (sidecar documents). [`StorageClient`]
//! captures that contract; [`ObjectStoreClient`] implements it over
//! `object_store`, driving the async API from a private current-thread
//! runtime so callers stay synchronous.

use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use log::{debug, warn};
use object_store::ObjectStore;
use object_store::path::Path;
use regex::Regex;
use tokio::runtime::Runtime;
use url::Url;

use crate::error::StorageError;

/// URI schemes with a storage client.
pub const SUPPORTED_SCHEMES: &[&str] = &[
    "gs", "s3", "s3a", "az", "adl", "azure", "abfs", "abfss", "file", "memory",
];

/// Returns `true` if `uri` uses a scheme with a storage client.
///
/// # Examples
///
/// ```
/// use geocatalog_core::storage::is_supported_uri;
///
/// assert!(is_supported_uri("gs://imagery-bucket"));
/// assert!(!is_supported_uri("ftp://imagery-bucket"));
/// assert!(!is_supported_uri("imagery-bucket"));
/// ```
#[must_use]
pub fn is_supported_uri(uri: &str) -> bool {
    Url::parse(uri).is_ok_and(|url| SUPPORTED_SCHEMES.contains(&url.scheme()))
}

/// Narrow storage contract used by the ingestion pipeline and resolvers.
pub trait StorageClient {
    /// Returns `true` if this client can serve `uri`.
    fn is_supported_uri(&self, uri: &str) -> bool;

    /// Lists object URIs under `prefix` whose file name matches `pattern`
    /// (a regular expression), sorted by location.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the pattern is invalid or the listing
    /// fails.
    fn list_objects(&self, prefix: &str, pattern: &str) -> Result<Vec<String>, StorageError>;

    /// Fetches the full contents of the object at `uri`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the URI is not served by this client or
    /// the request fails.
    fn fetch(&self, uri: &str) -> Result<Bytes, StorageError>;
}

/// [`StorageClient`] backed by an `object_store` implementation.
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    base: Url,
    root: Path,
    runtime: Runtime,
}

impl std::fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("store", &self.store.to_string())
            .field("base", &self.base.as_str())
            .field("root", &self.root.as_ref())
            .finish_non_exhaustive()
    }
}

impl ObjectStoreClient {
    /// Opens a client for a bucket URI such as `gs://bucket` or
    /// `s3://bucket/root`.
    ///
    /// `key` is an optional credential reference. For `gs://` buckets it is
    /// the path of a service-account file; other providers read their
    /// credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsupportedBucket`] for an unrecognized
    /// scheme, before any request is made.
    pub fn for_bucket(bucket: &str, key: Option<&str>) -> Result<Self, StorageError> {
        if !is_supported_uri(bucket) {
            return Err(StorageError::UnsupportedBucket {
                bucket: bucket.to_string(),
            });
        }
        let url = parse_uri(bucket)?;

        let mut options: Vec<(&str, String)> = Vec::new();
        if let Some(key) = key {
            if url.scheme() == "gs" {
                options.push(("google_service_account", key.to_string()));
            } else {
                warn!(
                    "Ignoring credential key for {bucket}: {} reads credentials from the environment",
                    url.scheme()
                );
            }
        }

        let (store, root) =
            object_store::parse_url_opts(&url, options).map_err(|source| StorageError::Backend {
                uri: bucket.to_string(),
                source,
            })?;

        Self::build(Arc::from(store), url, root)
    }

    /// Wraps an existing store. Object URIs are formed from `base`, e.g.
    /// `memory:///` or `s3://bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidUri`] if `base` is not a URI.
    pub fn with_store(store: Arc<dyn ObjectStore>, base: &str) -> Result<Self, StorageError> {
        let url = parse_uri(base)?;
        let root = Path::from_url_path(url.path()).map_err(|err| StorageError::InvalidUri {
            uri: base.to_string(),
            reason: err.to_string(),
        })?;
        Self::build(store, url, root)
    }

    fn build(store: Arc<dyn ObjectStore>, base: Url, root: Path) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StorageError::Runtime)?;
        Ok(Self {
            store,
            base,
            root,
            runtime,
        })
    }

    /// Builds the URI of an object location in this store.
    fn object_uri(&self, location: &Path) -> String {
        format!("{}://{}/{location}", self.base.scheme(), authority(&self.base))
    }

    /// Returns `true` if `url` names an object in this store.
    fn serves(&self, url: &Url) -> bool {
        url.scheme() == self.base.scheme() && authority(url) == authority(&self.base)
    }

    /// Maps an object URI back to a location in this store.
    fn location(&self, uri: &str) -> Result<Path, StorageError> {
        let url = parse_uri(uri)?;
        if !self.serves(&url) {
            return Err(StorageError::InvalidUri {
                uri: uri.to_string(),
                reason: format!("not served by {}", self.base),
            });
        }
        Path::from_url_path(url.path()).map_err(|err| StorageError::InvalidUri {
            uri: uri.to_string(),
            reason: err.to_string(),
        })
    }
}

impl StorageClient for ObjectStoreClient {
    fn is_supported_uri(&self, uri: &str) -> bool {
        Url::parse(uri).is_ok_and(|url| self.serves(&url))
    }

    fn list_objects(&self, prefix: &str, pattern: &str) -> Result<Vec<String>, StorageError> {
        let matcher = Regex::new(pattern).map_err(|source| StorageError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let prefix_path = prefix
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.child(part));
        debug!("Listing {} under '{prefix_path}'", self.base);

        let mut objects = self
            .runtime
            .block_on(self.store.list(Some(&prefix_path)).try_collect::<Vec<_>>())
            .map_err(|source| StorageError::Backend {
                uri: self.object_uri(&prefix_path),
                source,
            })?;
        objects.sort_by(|a, b| a.location.cmp(&b.location));

        Ok(objects
            .iter()
            .filter(|meta| {
                meta.location
                    .filename()
                    .is_some_and(|name| matcher.is_match(name))
            })
            .map(|meta| self.object_uri(&meta.location))
            .collect())
    }

    fn fetch(&self, uri: &str) -> Result<Bytes, StorageError> {
        let location = self.location(uri)?;
        let backend = |source| StorageError::Backend {
            uri: uri.to_string(),
            source,
        };
        self.runtime.block_on(async {
            let result = self.store.get(&location).await.map_err(backend)?;
            result.bytes().await.map_err(backend)
        })
    }
}

/// Opens the storage client for a bucket URI.
///
/// # Errors
///
/// Returns [`StorageError::UnsupportedBucket`] if no client matches.
pub fn client_for(bucket: &str, key: Option<&str>) -> Result<Box<dyn StorageClient>, StorageError> {
    Ok(Box::new(ObjectStoreClient::for_bucket(bucket, key)?))
}

/// `user@host:port` part of a URI. Azure URIs carry the container as the
/// user, e.g. `abfss://container@account.dfs.core.windows.net`.
fn authority(url: &Url) -> String {
    let mut authority = String::new();
    if !url.username().is_empty() {
        authority.push_str(url.username());
        authority.push('@');
    }
    authority.push_str(url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        authority.push_str(&format!(":{port}"));
    }
    authority
}

fn parse_uri(uri: &str) -> Result<Url, StorageError> {
    Url::parse(uri).map_err(|err| StorageError::InvalidUri {
        uri: uri.to_string(),
        reason: err.to_string(),
    })
}

/// Returns the directory part and file name of an object URI.
///
/// # Examples
///
/// ```
/// use geocatalog_core::storage::split_uri;
///
/// assert_eq!(
///     split_uri("gs://bucket/spot/IMG_1.tif"),
///     ("gs://bucket/spot", "IMG_1.tif")
/// );
/// ```
#[must_use]
pub fn split_uri(uri: &str) -> (&str, &str) {
    match uri.rfind('/') {
        Some(idx) => (&uri[..idx], &uri[idx + 1..]),
        None => ("", uri),
    }
}
