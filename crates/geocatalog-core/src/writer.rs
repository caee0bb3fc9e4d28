//! Catalog table writer.
//!
//! Reloads a catalog table from a list of records: the table is dropped and
//! recreated from the field descriptor, then every record is inserted with a
//! single batched `INSERT`.

use log::info;

use crate::database::{CommandMode, DatabaseGateway};
use crate::error::{Result, ValidationError};
use crate::sql::InsertStatement;
use crate::types::{FieldDescriptor, MetadataRecord};

/// Compiles the batched INSERT for `records`.
///
/// Values are taken from each record in descriptor order.
///
/// # Errors
///
/// Returns a [`ValidationError`] if a record has no value for a column or a
/// value does not fit its column. Nothing is sent to the database.
pub fn compile_insert(
    schema: &str,
    table: &str,
    fields: &FieldDescriptor,
    records: &[MetadataRecord],
) -> std::result::Result<InsertStatement, ValidationError> {
    let mut statement = InsertStatement::new(schema, table, fields)?;
    for (row, record) in records.iter().enumerate() {
        let values = fields
            .value_fields()
            .map(|field| {
                record
                    .column_value(&field.name)
                    .ok_or_else(|| ValidationError::EmptyValue {
                        row,
                        column: field.name.clone(),
                    })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        statement.push_row(&values)?;
    }
    Ok(statement)
}

/// Replaces `schema.table` with the given records.
///
/// The statement is compiled before the table is touched, so a malformed
/// record leaves the existing table in place. An empty record list still
/// recreates the (empty) table but sends no INSERT. Returns the number of
/// rows inserted.
///
/// # Errors
///
/// Returns a [`ValidationError`] for malformed records, or the
/// [`DatabaseError`](crate::error::DatabaseError) reported by the gateway.
pub fn write_collection(
    gateway: &DatabaseGateway,
    schema: &str,
    table: &str,
    fields: &FieldDescriptor,
    records: &[MetadataRecord],
) -> Result<usize> {
    let statement = compile_insert(schema, table, fields, records)?;

    gateway.create_schema(schema)?;
    gateway.create_or_replace_table(schema, table, fields)?;

    let Some(command) = statement.to_sql() else {
        info!("No records for {schema}.{table}; skipping insert");
        return Ok(0);
    };

    gateway.execute_command(&command, CommandMode::default())?;
    info!("Inserted {} record(s) into {schema}.{table}", statement.len());
    Ok(statement.len())
}
