//! Database integration tests.
//!
//! These need a PostGIS server and are ignored by default. Point them at a
//! scratch database with `GEOCATALOG_TEST_PG_HOST`, `GEOCATALOG_TEST_PG_PORT`,
//! `GEOCATALOG_TEST_PG_DATABASE`, `GEOCATALOG_TEST_PG_USER` and
//! `GEOCATALOG_TEST_PG_PASSWORD`, then run `cargo test -- --ignored`.

use std::env;
use std::sync::Arc;

use futures::executor::block_on;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use geocatalog_core::config::ItemSource;
use geocatalog_core::database::{CommandMode, ConnectionDescriptor, DatabaseGateway};
use geocatalog_core::error::{CatalogError, DatabaseError};
use geocatalog_core::ingest;
use geocatalog_core::storage::ObjectStoreClient;
use geocatalog_core::types::{FieldDescriptor, FieldType};
use geocatalog_core::writer;

fn gateway() -> DatabaseGateway {
    let host = env::var("GEOCATALOG_TEST_PG_HOST").unwrap_or_else(|_| "localhost".to_string());
    let database = env::var("GEOCATALOG_TEST_PG_DATABASE").unwrap_or_else(|_| "gis".to_string());
    let mut descriptor = ConnectionDescriptor::new(host, database);
    if let Ok(port) = env::var("GEOCATALOG_TEST_PG_PORT") {
        descriptor = descriptor.with_port(port.parse().unwrap());
    }
    if let Ok(user) = env::var("GEOCATALOG_TEST_PG_USER") {
        descriptor = descriptor.with_user(user);
    }
    if let Ok(password) = env::var("GEOCATALOG_TEST_PG_PASSWORD") {
        descriptor = descriptor.with_password(password);
    }
    DatabaseGateway::new(descriptor)
}

/// Creates a fresh schema for one test.
fn scratch_schema(gateway: &DatabaseGateway, name: &str) -> String {
    let schema = format!("geocatalog_test_{name}");
    gateway.drop_schema(&schema).unwrap();
    gateway.create_schema(&schema).unwrap();
    schema
}

#[test]
#[ignore = "requires a PostGIS server"]
fn test_create_table_matches_descriptor() {
    let gateway = gateway();
    let schema = scratch_schema(&gateway, "create");
    let fields = FieldDescriptor::catalog();

    assert!(!gateway.table_exists(&schema, "scenes").unwrap());
    gateway.create_table(&schema, "scenes", &fields).unwrap();
    assert!(gateway.table_exists(&schema, "scenes").unwrap());
    assert!(gateway.schema_exists(&schema).unwrap());
    assert!(gateway.column_exists(&schema, "scenes", "GEOM").unwrap());

    let columns: Vec<String> = gateway
        .list_columns(&schema, "scenes")
        .unwrap()
        .into_iter()
        .filter(|c| c != "id")
        .collect();
    assert_eq!(columns, fields.value_columns());

    gateway.drop_schema(&schema).unwrap();
    assert!(!gateway.schema_exists(&schema).unwrap());
}

#[test]
#[ignore = "requires a PostGIS server"]
fn test_replace_table_is_idempotent_and_empty() {
    let gateway = gateway();
    let schema = scratch_schema(&gateway, "replace");
    let fields = FieldDescriptor::new([("id", FieldType::Serial), ("name", FieldType::Text)])
        .unwrap();

    gateway.create_table(&schema, "scenes", &fields).unwrap();
    gateway
        .execute_command(
            &format!("INSERT INTO {schema}.scenes ( name ) VALUES ( 'a' ), ( 'b' )"),
            CommandMode::default(),
        )
        .unwrap();
    assert_eq!(gateway.record_count(&schema, "scenes").unwrap(), Some(2));

    gateway.create_or_replace_table(&schema, "scenes", &fields).unwrap();
    gateway.create_or_replace_table(&schema, "scenes", &fields).unwrap();
    assert!(gateway.table_exists(&schema, "scenes").unwrap());
    assert_eq!(gateway.record_count(&schema, "scenes").unwrap(), Some(0));

    gateway.drop_schema(&schema).unwrap();
}

#[test]
#[ignore = "requires a PostGIS server"]
fn test_invalid_command_leaves_state_unchanged() {
    let gateway = gateway();
    let schema = scratch_schema(&gateway, "invalid");
    let fields = FieldDescriptor::new([("name", FieldType::Text)]).unwrap();
    gateway.create_table(&schema, "scenes", &fields).unwrap();

    // The first statement is valid; the batch still rolls back as a whole.
    let err = gateway
        .execute_command(
            &format!("INSERT INTO {schema}.scenes ( name ) VALUES ( 'a' ); SELEKT 1"),
            CommandMode::default(),
        )
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Command { .. }));
    assert!(err.command_message().is_some_and(|m| m.contains("SELEKT")));
    assert_eq!(gateway.record_count(&schema, "scenes").unwrap(), Some(0));

    // Reads degrade to an empty result.
    assert!(gateway.execute_query("SELEKT 1", &[]).unwrap().is_empty());
    assert_eq!(gateway.record_count(&schema, "missing").unwrap(), None);

    gateway.drop_schema(&schema).unwrap();
}

#[test]
#[ignore = "requires a PostGIS server"]
fn test_list_and_vacuum_tables() {
    let gateway = gateway();
    let schema = scratch_schema(&gateway, "vacuum");
    let fields = FieldDescriptor::new([("name", FieldType::Text)]).unwrap();
    for table in ["spot_2019", "spot_2020", "pleiades"] {
        gateway.create_table(&schema, table, &fields).unwrap();
    }

    assert_eq!(
        gateway.list_tables(&schema, None).unwrap(),
        vec!["pleiades", "spot_2019", "spot_2020"]
    );
    assert_eq!(
        gateway.list_tables(&schema, Some("^spot")).unwrap(),
        vec!["spot_2019", "spot_2020"]
    );
    assert!(gateway.list_schemas(Some(&schema)).unwrap().contains(&schema));

    gateway.vacuum_table(&schema, "pleiades").unwrap();
    assert_eq!(gateway.vacuum_all_tables(&schema, Some("spot")).unwrap(), 2);
    assert_eq!(gateway.vacuum_all_tables(&schema, None).unwrap(), 3);

    gateway.drop_schema(&schema).unwrap();
}

#[test]
#[ignore = "requires a PostGIS server"]
fn test_vacuum_all_tables_stops_at_first_failure() {
    let gateway = gateway();
    let schema = scratch_schema(&gateway, "vacuum_fail");
    let fields = FieldDescriptor::new([("name", FieldType::Text)]).unwrap();
    gateway.create_table(&schema, "a_first", &fields).unwrap();
    gateway.create_table(&schema, "c_last", &fields).unwrap();
    // Mixed-case quoted name: the unquoted VACUUM target folds to b_bad.
    gateway
        .execute_command(
            &format!("CREATE TABLE {schema}.\"b_Bad\" ( name TEXT )"),
            CommandMode::default(),
        )
        .unwrap();
    assert_eq!(
        gateway.list_tables(&schema, None).unwrap(),
        vec!["a_first", "b_Bad", "c_last"]
    );

    let err = gateway.vacuum_all_tables(&schema, None).unwrap_err();
    match err {
        CatalogError::Database(err) => {
            assert!(err.command_message().is_some_and(|m| m.contains("b_bad")));
        },
        other => panic!("unexpected error: {other}"),
    }

    let rows = gateway
        .execute_query(
            "SELECT last_vacuum IS NULL FROM pg_stat_user_tables \
             WHERE schemaname = $1 AND relname = 'c_last'",
            &[&schema],
        )
        .unwrap();
    assert!(rows[0].get::<_, bool>(0), "c_last was vacuumed");

    // Filtering out the failing table lets the rest through.
    assert_eq!(gateway.vacuum_all_tables(&schema, Some("_l")).unwrap(), 1);

    gateway.drop_schema(&schema).unwrap();
}

#[test]
#[ignore = "requires a PostGIS server"]
fn test_load_scenes_end_to_end() {
    let store = Arc::new(InMemory::new());
    let objects = [
        ("imagery/IMG_SPOT6_MS_a.tif", String::new()),
        (
            "imagery/IMG_SPOT6_MS_a.json",
            r#"{ "id": "a", "bbox": [10, 20, 11, 21],
                 "properties": { "datetime": "2019-05-01T10:30:12Z", "proj:epsg": 32632 } }"#
                .to_string(),
        ),
        ("imagery/b.tif", String::new()),
    ];
    for (location, body) in objects {
        block_on(store.put(&Path::from(location), PutPayload::from(body))).unwrap();
    }
    let client = ObjectStoreClient::with_store(store, "memory:///").unwrap();

    let source = ItemSource {
        bucket: "memory:///".to_string(),
        prefix: "imagery".to_string(),
        pattern: r"\.tif$".to_string(),
        key: None,
    };
    let collected = ingest::collect_from(&client, &source, None).unwrap();
    assert_eq!(collected.records.len(), 1);
    assert_eq!(collected.records[0].id, "a");
    assert_eq!(collected.records[0].platform, "spot-6");
    assert_eq!(collected.failures.len(), 1);

    let gateway = gateway();
    let fields = FieldDescriptor::catalog();
    let inserted =
        writer::write_collection(&gateway, "imagery", "scenes", &fields, &collected.records)
            .unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(gateway.record_count("imagery", "scenes").unwrap(), Some(1));

    let rows = gateway
        .execute_query(
            "SELECT name, ST_SRID(geom) FROM imagery.scenes",
            &[],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<_, String>(0), "a");
    assert_eq!(rows[0].get::<_, i32>(1), 4326);

    // Reloading with no records leaves an empty table.
    assert_eq!(
        writer::write_collection(&gateway, "imagery", "scenes", &fields, &[]).unwrap(),
        0
    );
    assert_eq!(gateway.record_count("imagery", "scenes").unwrap(), Some(0));

    gateway.drop_table("imagery", "scenes").unwrap();
}

