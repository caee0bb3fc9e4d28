//! `geocatalog-core` is the core library for `GeoCatalog`, which loads imagery
//! item metadata discovered in object storage into PostGIS catalog tables.
//!
//! This crate includes:
//! - **Database Gateway** (`database`): connection handling, query/command execution and
//!   schema/table lifecycle.
//! - **Metadata Resolvers** (`resolvers`): a registry of sensor-specific strategies that turn an
//!   image URI into a normalized record.
//! - **Ingestion** (`ingest`): listing, classification and resolution of a collection's items,
//!   with per-item failure tolerance.
//! - **Catalog Writer** (`writer`): table reload and batched INSERT compilation (`sql`).
//! - **Operations** (`operations`): the configuration-driven catalog load.

pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod operations;
pub mod resolvers;
pub mod sql;
pub mod storage;
pub mod types;
pub mod writer;
