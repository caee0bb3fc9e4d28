//! Display utilities for formatting CLI output.
//!
//! This module provides table row structures and formatting functions
//! for presenting resolvers, load reports and catalog tables.

use tabled::{Table, Tabled};

use geocatalog_core::operations::CollectionReport;
use geocatalog_core::resolvers::Resolver;

/// Table row representation for displaying resolver information.
#[derive(Tabled)]
pub struct ResolverRow {
    /// Short name of the resolver (e.g., `SPOT`).
    #[tabled(rename = "Short Name")]
    pub short_name: String,
    /// Descriptive name of the products it handles.
    #[tabled(rename = "Long Name")]
    pub long_name: String,
    /// File name tokens that select the resolver.
    #[tabled(rename = "Sensors")]
    pub sensors: String,
    /// Suffix of the sidecar document next to each image.
    #[tabled(rename = "Sidecar")]
    pub sidecar: String,
}

impl From<&Resolver> for ResolverRow {
    fn from(resolver: &Resolver) -> Self {
        Self {
            short_name: resolver.short_name.to_string(),
            long_name: resolver.long_name.to_string(),
            sensors: resolver.sensor_tokens(),
            sidecar: format!("<stem>{}", resolver.sidecar_suffix),
        }
    }
}

/// Table row representation for one collection of a catalog load.
#[derive(Tabled)]
pub struct ReportRow {
    /// Collection display name.
    #[tabled(rename = "Collection")]
    pub collection: String,
    /// Destination `schema.table`.
    #[tabled(rename = "Table")]
    pub target: String,
    /// Rows inserted.
    #[tabled(rename = "Inserted")]
    pub inserted: usize,
    /// Items skipped.
    #[tabled(rename = "Skipped")]
    pub skipped: usize,
    /// `OK`, or the error that stopped the collection.
    #[tabled(rename = "Status")]
    pub status: String,
}

impl From<&CollectionReport> for ReportRow {
    fn from(report: &CollectionReport) -> Self {
        Self {
            collection: report.collection.clone(),
            target: report.target.clone(),
            inserted: report.inserted,
            skipped: report.skipped.len(),
            status: report
                .error
                .as_ref()
                .map_or_else(|| "OK".to_string(), |err| err.user_message()),
        }
    }
}

/// Table row representation for a skipped item.
#[derive(Tabled)]
pub struct SkippedRow {
    /// Object URI.
    #[tabled(rename = "Item")]
    pub uri: String,
    /// Why the item was skipped.
    #[tabled(rename = "Reason")]
    pub reason: String,
}

/// Table row representation for a catalog table.
#[derive(Tabled)]
pub struct TableRow {
    /// Table name.
    #[tabled(rename = "Table")]
    pub table: String,
    /// Row count, or `N/A` if it could not be read.
    #[tabled(rename = "Rows")]
    pub rows: String,
}

/// Prints the resolver registry.
pub fn display_resolvers(resolvers: &[&Resolver]) {
    let rows: Vec<ResolverRow> = resolvers.iter().map(|r| ResolverRow::from(*r)).collect();
    println!("{}", Table::new(rows));
}

/// Prints a summary of a catalog load, followed by the skipped items.
pub fn display_reports(reports: &[CollectionReport]) {
    let rows: Vec<ReportRow> = reports.iter().map(ReportRow::from).collect();
    println!("{}", Table::new(rows));

    let skipped: Vec<SkippedRow> = reports
        .iter()
        .flat_map(|report| &report.skipped)
        .map(|failure| SkippedRow {
            uri: failure.uri.clone(),
            reason: failure.error.to_string(),
        })
        .collect();

    if !skipped.is_empty() {
        println!("\n=== Skipped Items ===");
        println!("{}", Table::new(skipped));
    }
}

/// Prints the tables of a schema with their row counts.
///
/// `counts` is parallel to `tables`.
pub fn display_tables(schema: &str, tables: &[String], counts: &[Option<i64>]) {
    println!("\nSchema: {schema}");
    if tables.is_empty() {
        println!("No tables found.");
        return;
    }

    let rows: Vec<TableRow> = tables
        .iter()
        .zip(counts)
        .map(|(table, count)| TableRow {
            table: table.clone(),
            rows: count.map_or_else(|| "N/A".to_string(), |n| n.to_string()),
        })
        .collect();
    println!("{}", Table::new(rows));
}
