//! SQL statement compilation.
//!
//! Catalog DDL and the batched INSERT are built here rather than by string
//! formatting at the call sites. Schema, table and column names must be plain
//! identifiers, literals are escaped per column type, and every value tuple
//! is checked against the statement's column list before it is accepted.

use chrono::{DateTime, Utc};
use geo_types::Rect;

use crate::error::ValidationError;
use crate::types::{FieldDescriptor, FieldType, IDENTIFIER_COLUMN};

/// CRS of stored footprint envelopes.
pub const ENVELOPE_SRID: i32 = 4326;

/// Timestamp layout for catalog `datetime` values (second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Checks that `name` is a plain, unquoted SQL identifier.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdentifier`] unless `name` matches
/// `[A-Za-z_][A-Za-z0-9_]*`.
///
/// # Examples
///
/// ```
/// use geocatalog_core::sql::validate_identifier;
///
/// assert!(validate_identifier("scenes_2019").is_ok());
/// assert!(validate_identifier("scenes; DROP TABLE x").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<&str, ValidationError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(ValidationError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// Returns `schema.table` after validating both parts.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdentifier`] for an invalid part.
pub fn qualified_name(schema: &str, table: &str) -> Result<String, ValidationError> {
    Ok(format!(
        "{}.{}",
        validate_identifier(schema)?,
        validate_identifier(table)?
    ))
}

/// Quotes a text literal, doubling embedded single quotes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `CREATE TABLE IF NOT EXISTS` for a field descriptor.
///
/// The identifier column is always `id SERIAL PRIMARY KEY` and always comes
/// first, wherever the `SERIAL` field sits in the descriptor.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdentifier`] for an invalid name.
pub fn create_table(
    schema: &str,
    table: &str,
    fields: &FieldDescriptor,
) -> Result<String, ValidationError> {
    let mut columns = vec![format!(
        "{IDENTIFIER_COLUMN} {} PRIMARY KEY",
        FieldType::Serial.as_sql()
    )];
    columns.extend(
        fields
            .value_fields()
            .map(|f| format!("{} {}", f.name, f.field_type.as_sql())),
    );

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ( {} )",
        qualified_name(schema, table)?,
        columns.join(", ")
    ))
}

/// `DROP TABLE IF EXISTS`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdentifier`] for an invalid name.
pub fn drop_table(schema: &str, table: &str) -> Result<String, ValidationError> {
    Ok(format!(
        "DROP TABLE IF EXISTS {}",
        qualified_name(schema, table)?
    ))
}

/// `CREATE SCHEMA IF NOT EXISTS`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdentifier`] for an invalid name.
pub fn create_schema(schema: &str) -> Result<String, ValidationError> {
    Ok(format!(
        "CREATE SCHEMA IF NOT EXISTS {}",
        validate_identifier(schema)?
    ))
}

/// `DROP SCHEMA IF EXISTS ... CASCADE`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdentifier`] for an invalid name.
pub fn drop_schema(schema: &str) -> Result<String, ValidationError> {
    Ok(format!(
        "DROP SCHEMA IF EXISTS {} CASCADE",
        validate_identifier(schema)?
    ))
}

/// `VACUUM ANALYZE` for one table.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdentifier`] for an invalid name.
pub fn vacuum_table(schema: &str, table: &str) -> Result<String, ValidationError> {
    Ok(format!("VACUUM ANALYZE {}", qualified_name(schema, table)?))
}

/// `SELECT COUNT(*)` for one table.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdentifier`] for an invalid name.
pub fn count_rows(schema: &str, table: &str) -> Result<String, ValidationError> {
    Ok(format!("SELECT COUNT(*) FROM {}", qualified_name(schema, table)?))
}

/// A typed value destined for one INSERT column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Text literal
    Text(String),
    /// Floating point literal
    Float(f64),
    /// Integer literal
    Int(i64),
    /// Timestamp, written as text at second precision
    Timestamp(DateTime<Utc>),
    /// Footprint envelope in EPSG:4326
    Envelope(Rect<f64>),
}

impl SqlValue {
    /// Renders the value as a literal for a column of `field_type`.
    fn render(&self, field_type: FieldType, row: usize, column: &str) -> Result<String, ValidationError> {
        let non_finite = || ValidationError::NonFinite {
            row,
            column: column.to_string(),
        };

        match (field_type, self) {
            (FieldType::Text, SqlValue::Text(text)) => {
                if text.is_empty() {
                    return Err(ValidationError::EmptyValue {
                        row,
                        column: column.to_string(),
                    });
                }
                Ok(quote_literal(text))
            },
            (FieldType::Text, SqlValue::Timestamp(ts)) => {
                Ok(quote_literal(&ts.format(TIMESTAMP_FORMAT).to_string()))
            },
            (FieldType::Float, SqlValue::Float(value)) => {
                if value.is_finite() {
                    Ok(format!("{value}"))
                } else {
                    Err(non_finite())
                }
            },
            (FieldType::Float | FieldType::Int, SqlValue::Int(value)) => Ok(value.to_string()),
            (FieldType::Geometry, SqlValue::Envelope(rect)) => {
                let (min, max) = (rect.min(), rect.max());
                if [min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
                    Ok(format!(
                        "ST_MakeEnvelope( {}, {}, {}, {}, {ENVELOPE_SRID} )",
                        min.x, min.y, max.x, max.y
                    ))
                } else {
                    Err(non_finite())
                }
            },
            _ => Err(ValidationError::TypeMismatch {
                row,
                column: column.to_string(),
                expected: field_type.as_sql().to_string(),
            }),
        }
    }
}

/// A multi-row `INSERT` under construction.
///
/// Columns are the descriptor's non-identifier fields in declaration order.
/// Rows are rendered as they are pushed so that a bad value is reported
/// against its row before any SQL is produced.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    target: String,
    columns: Vec<(String, FieldType)>,
    tuples: Vec<String>,
}

impl InsertStatement {
    /// Starts an INSERT into `schema.table` for the given descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidIdentifier`] for an invalid name.
    pub fn new(
        schema: &str,
        table: &str,
        fields: &FieldDescriptor,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            target: qualified_name(schema, table)?,
            columns: fields
                .value_fields()
                .map(|f| (f.name.clone(), f.field_type))
                .collect(),
            tuples: Vec::new(),
        })
    }

    /// Appends one value tuple.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the tuple's arity differs from the
    /// column list or a value does not fit its column.
    pub fn push_row(&mut self, values: &[SqlValue]) -> Result<(), ValidationError> {
        let row = self.tuples.len();
        if values.len() != self.columns.len() {
            return Err(ValidationError::Arity {
                row,
                expected: self.columns.len(),
                found: values.len(),
            });
        }

        let literals = self
            .columns
            .iter()
            .zip(values)
            .map(|((name, field_type), value)| value.render(*field_type, row, name))
            .collect::<Result<Vec<_>, _>>()?;

        self.tuples.push(format!("( {} )", literals.join(", ")));
        Ok(())
    }

    /// Column names, in statement order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of value tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Returns `true` when no tuple has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Renders the statement, or `None` when there is nothing to insert.
    #[must_use]
    pub fn to_sql(&self) -> Option<String> {
        if self.tuples.is_empty() {
            return None;
        }
        Some(format!(
            "INSERT INTO {} ( {} ) VALUES {}",
            self.target,
            self.columns().join(", "),
            self.tuples.join(", ")
        ))
    }
}
