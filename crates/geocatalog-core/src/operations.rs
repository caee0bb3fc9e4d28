//! Catalog load operations.
//!
//! This module wires configuration, ingestion and the catalog writer
//! together. Each collection is loaded independently: a failure is reported
//! for that collection and the remaining collections still run.

use std::path::Path;

use log::{error, info};

use crate::config::{CatalogConfig, CollectionConfig};
use crate::database::DatabaseGateway;
use crate::error::{CatalogError, Result};
use crate::ingest::{self, Collected, ItemFailure};
use crate::types::FieldDescriptor;
use crate::writer;

/// Outcome of loading one collection.
#[derive(Debug)]
pub struct CollectionReport {
    /// Collection display name
    pub collection: String,
    /// Destination `schema.table`
    pub target: String,
    /// Rows inserted
    pub inserted: usize,
    /// Items skipped during resolution
    pub skipped: Vec<ItemFailure>,
    /// Set when the collection failed as a whole
    pub error: Option<CatalogError>,
}

impl CollectionReport {
    /// Returns `true` if the collection was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Loads one collection: collect its items, then reload its table.
///
/// # Errors
///
/// Returns the storage, validation or database error that stopped the load.
/// Per-item resolution failures are returned in [`Collected::failures`].
pub fn load_collection(
    gateway: &DatabaseGateway,
    collection: &CollectionConfig,
    local_dir: Option<&Path>,
) -> Result<(usize, Collected)> {
    let collected = ingest::collect_collection(collection, local_dir)?;
    info!(
        "Collected {} record(s) for {} ({} skipped)",
        collected.records.len(),
        collection.display_name(),
        collected.failures.len()
    );

    let inserted = writer::write_collection(
        gateway,
        &collection.out.schema,
        &collection.out.table,
        &FieldDescriptor::catalog(),
        &collected.records,
    )?;
    Ok((inserted, collected))
}

/// Loads every collection in the configuration, in order.
///
/// `local_dir` is the local sidecar override directory, normally the
/// configuration file's directory.
#[must_use]
pub fn load_catalog(config: &CatalogConfig, local_dir: Option<&Path>) -> Vec<CollectionReport> {
    let gateway = DatabaseGateway::new(config.server.descriptor());

    config
        .collections()
        .map(|collection| {
            let name = collection.display_name();
            let target = format!("{}.{}", collection.out.schema, collection.out.table);
            info!("Loading collection {name} into {target}");

            match load_collection(&gateway, collection, local_dir) {
                Ok((inserted, collected)) => CollectionReport {
                    collection: name,
                    target,
                    inserted,
                    skipped: collected.failures,
                    error: None,
                },
                Err(err) => {
                    error!("Collection {name} failed: {err}");
                    CollectionReport {
                        collection: name,
                        target,
                        inserted: 0,
                        skipped: Vec::new(),
                        error: Some(err),
                    }
                },
            }
        })
        .collect()
}
