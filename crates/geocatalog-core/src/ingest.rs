//! Item discovery and resolution for one collection.
//!
//! A collection's sources are listed in configuration order; each listed URI
//! is classified and resolved into a [`MetadataRecord`]. A URI that fails
//! either step is recorded as an [`ItemFailure`] and skipped so that one bad
//! object never aborts a collection load. Storage-level failures (unsupported
//! bucket, failed listing) are not item-scoped and are returned as errors.

use std::path::Path;

use log::{info, warn};

use crate::config::{CollectionConfig, ItemSource};
use crate::error::{ResolveError, Result, StorageError};
use crate::resolvers::{self, ResolveContext};
use crate::storage::{self, StorageClient};
use crate::types::MetadataRecord;

/// A URI that could not be turned into a record.
#[derive(Debug)]
pub struct ItemFailure {
    /// The object URI
    pub uri: String,
    /// Why it was skipped
    pub error: ResolveError,
}

/// Records and failures accumulated for a collection.
#[derive(Debug, Default)]
pub struct Collected {
    /// Resolved records, in source then listing order
    pub records: Vec<MetadataRecord>,
    /// Skipped URIs, in the same order
    pub failures: Vec<ItemFailure>,
}

impl Collected {
    /// Appends another result, preserving order.
    pub fn append(&mut self, mut other: Collected) {
        self.records.append(&mut other.records);
        self.failures.append(&mut other.failures);
    }
}

/// Classifies and resolves one URI.
///
/// # Errors
///
/// Returns [`ResolveError::Unclassified`] if no resolver recognizes the name,
/// or the resolver's error.
pub fn resolve_uri(context: &ResolveContext<'_>, uri: &str) -> std::result::Result<MetadataRecord, ResolveError> {
    let kind = resolvers::classify(uri).ok_or_else(|| ResolveError::Unclassified {
        uri: uri.to_string(),
    })?;
    resolvers::resolve(kind, context, uri)
}

/// Lists and resolves the items of one source through an open client.
///
/// # Errors
///
/// Returns a [`StorageError`] if the listing fails. Per-item failures are
/// reported in [`Collected::failures`] instead.
pub fn collect_from(
    client: &dyn StorageClient,
    source: &ItemSource,
    local_dir: Option<&Path>,
) -> std::result::Result<Collected, StorageError> {
    let uris = client.list_objects(&source.prefix, &source.pattern)?;
    info!(
        "Found {} candidate item(s) in {}/{}",
        uris.len(),
        source.bucket,
        source.prefix
    );

    let context = ResolveContext::new(client).with_local_dir(local_dir);
    let mut collected = Collected::default();
    for uri in uris {
        match resolve_uri(&context, &uri) {
            Ok(record) => collected.records.push(record),
            Err(error) => {
                warn!("Skipping {uri}: {error}");
                collected.failures.push(ItemFailure { uri, error });
            },
        }
    }
    Ok(collected)
}

/// Opens the storage client for a source and collects its items.
///
/// # Errors
///
/// Returns [`StorageError::UnsupportedBucket`] before any listing if the
/// bucket scheme has no client, or a listing error.
pub fn collect(source: &ItemSource, local_dir: Option<&Path>) -> Result<Collected> {
    let client = storage::client_for(&source.bucket, source.key.as_deref())?;
    Ok(collect_from(client.as_ref(), source, local_dir)?)
}

/// Collects every source of a collection, opening clients with `open`.
///
/// # Errors
///
/// Returns the first storage error; no further sources are listed.
pub fn collect_collection_with<F>(
    collection: &CollectionConfig,
    local_dir: Option<&Path>,
    mut open: F,
) -> Result<Collected>
where
    F: FnMut(&ItemSource) -> std::result::Result<Box<dyn StorageClient>, StorageError>,
{
    let mut collected = Collected::default();
    for source in &collection.items {
        let client = open(source)?;
        collected.append(collect_from(client.as_ref(), source, local_dir)?);
    }
    Ok(collected)
}

/// Collects every source of a collection using the default storage clients.
///
/// # Errors
///
/// As [`collect_collection_with`].
pub fn collect_collection(
    collection: &CollectionConfig,
    local_dir: Option<&Path>,
) -> Result<Collected> {
    collect_collection_with(collection, local_dir, |source| {
        storage::client_for(&source.bucket, source.key.as_deref())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use crate::error::CatalogError;
    use bytes::Bytes;
    use std::collections::BTreeMap;

    /// Listing and fetching over a fixed URI → body map.
    struct FixedStorage {
        objects: BTreeMap<String, String>,
    }

    impl FixedStorage {
        fn new(objects: &[(&str, &str)]) -> Self {
            Self {
                objects: objects
                    .iter()
                    .map(|(uri, body)| (uri.to_string(), body.to_string()))
                    .collect(),
            }
        }
    }

    impl StorageClient for FixedStorage {
        fn is_supported_uri(&self, uri: &str) -> bool {
            uri.starts_with("s3://bucket/")
        }

        fn list_objects(&self, prefix: &str, pattern: &str) -> std::result::Result<Vec<String>, StorageError> {
            let matcher = regex::Regex::new(pattern).unwrap();
            Ok(self
                .objects
                .keys()
                .filter(|uri| uri.starts_with(&format!("s3://bucket/{prefix}")))
                .filter(|uri| matcher.is_match(uri))
                .cloned()
                .collect())
        }

        fn fetch(&self, uri: &str) -> std::result::Result<Bytes, StorageError> {
            self.objects
                .get(uri)
                .map(|body| Bytes::from(body.clone()))
                .ok_or_else(|| StorageError::InvalidUri {
                    uri: uri.to_string(),
                    reason: "not found".to_string(),
                })
        }
    }

    fn sidecar(id: &str) -> String {
        format!(
            r#"{{ "id": "{id}", "bbox": [10, 20, 11, 21],
                  "properties": {{ "datetime": "2019-05-01T10:30:12Z", "platform": "sat-1",
                                   "gsd": 10.0, "proj:epsg": 32632 }} }}"#
        )
    }

    fn source(prefix: &str) -> ItemSource {
        ItemSource {
            bucket: "s3://bucket".to_string(),
            prefix: prefix.to_string(),
            pattern: r"\.tif$".to_string(),
            key: None,
        }
    }

    #[test]
    fn test_unresolvable_item_is_skipped() {
        let a_sidecar = sidecar("a");
        let storage = FixedStorage::new(&[
            ("s3://bucket/IMG_SPOT6_MS_a.tif", ""),
            ("s3://bucket/IMG_SPOT6_MS_a.json", &a_sidecar),
            ("s3://bucket/b.tif", ""),
        ]);

        let collected = collect_from(&storage, &source(""), None).unwrap();
        assert_eq!(collected.records.len(), 1);
        assert_eq!(collected.records[0].id, "a");
        assert_eq!(collected.records[0].platform, "sat-1");
        assert_eq!(collected.records[0].projection, 32632);

        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].uri, "s3://bucket/b.tif");
        assert!(matches!(
            collected.failures[0].error,
            ResolveError::Unclassified { .. }
        ));
    }

    #[test]
    fn test_k_resolvable_plus_one_broken() {
        let bodies: Vec<(String, String)> = (0..5)
            .flat_map(|i| {
                [
                    (format!("s3://bucket/IMG_PHR1A_P_{i}.tif"), String::new()),
                    (format!("s3://bucket/IMG_PHR1A_P_{i}_item.json"), sidecar(&i.to_string())),
                ]
            })
            .chain([(
                "s3://bucket/IMG_PHR1A_P_broken.tif".to_string(),
                String::new(),
            )])
            .collect();
        let refs: Vec<(&str, &str)> =
            bodies.iter().map(|(u, b)| (u.as_str(), b.as_str())).collect();
        let storage = FixedStorage::new(&refs);

        let collected = collect_from(&storage, &source(""), None).unwrap();
        assert_eq!(collected.records.len(), 5);
        assert_eq!(collected.failures.len(), 1);
        assert!(matches!(
            collected.failures[0].error,
            ResolveError::Sidecar { .. }
        ));
    }

    #[test]
    fn test_blank_sidecar_id_skips_only_that_item() {
        let mut bodies: Vec<(String, String)> = (0..4)
            .flat_map(|i| {
                [
                    (format!("s3://bucket/IMG_SPOT7_P_{i}.tif"), String::new()),
                    (format!("s3://bucket/IMG_SPOT7_P_{i}.json"), sidecar(&i.to_string())),
                ]
            })
            .collect();
        bodies.push(("s3://bucket/IMG_SPOT7_P_blank.tif".to_string(), String::new()));
        bodies.push(("s3://bucket/IMG_SPOT7_P_blank.json".to_string(), sidecar("")));
        let refs: Vec<(&str, &str)> =
            bodies.iter().map(|(u, b)| (u.as_str(), b.as_str())).collect();
        let storage = FixedStorage::new(&refs);

        let collected = collect_from(&storage, &source(""), None).unwrap();
        assert_eq!(collected.records.len(), 4);
        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].uri, "s3://bucket/IMG_SPOT7_P_blank.tif");
        assert!(matches!(
            collected.failures[0].error,
            ResolveError::MissingProperty { ref property, .. } if property == "id"
        ));

        // The surviving records compile into one statement.
        let statement = crate::writer::compile_insert(
            "imagery",
            "scenes",
            &crate::types::FieldDescriptor::catalog(),
            &collected.records,
        )
        .unwrap();
        assert_eq!(statement.len(), 4);
    }

    #[test]
    fn test_collection_preserves_source_order() {
        let first = sidecar("first");
        let second = sidecar("second");
        let collection = CollectionConfig {
            name: None,
            out: OutputConfig {
                schema: "imagery".to_string(),
                table: "scenes".to_string(),
            },
            items: vec![source("z"), source("a")],
        };

        let objects = [
            ("s3://bucket/z/IMG_SPOT7_P_1.tif", ""),
            ("s3://bucket/z/IMG_SPOT7_P_1.json", first.as_str()),
            ("s3://bucket/a/IMG_SPOT7_P_2.tif", ""),
            ("s3://bucket/a/IMG_SPOT7_P_2.json", second.as_str()),
        ];
        let collected = collect_collection_with(&collection, None, |_| {
            Ok(Box::new(FixedStorage::new(&objects)) as Box<dyn StorageClient>)
        })
        .unwrap();

        let ids: Vec<&str> = collected.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_unsupported_bucket_aborts_before_listing() {
        let mut bad = source("");
        bad.bucket = "ftp://bucket".to_string();
        let err = collect(&bad, None).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Storage(StorageError::UnsupportedBucket { .. })
        ));
    }
}
