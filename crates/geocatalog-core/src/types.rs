//! Data types for catalog loads.
//!
//! This module defines the table field descriptor that drives DDL and INSERT
//! compilation, and the normalized metadata record produced for every
//! resolved imagery item.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use geo_types::Rect;

use crate::error::ValidationError;
use crate::sql::{SqlValue, validate_identifier};

/// Name of the primary key column created for every catalog table.
pub const IDENTIFIER_COLUMN: &str = "id";

/// Column type tokens understood by the catalog writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Auto-increment identifier assigned by the database.
    Serial,
    /// Free text.
    Text,
    /// Double precision floating point.
    Float,
    /// Integer.
    Int,
    /// PostGIS geometry.
    Geometry,
}

impl FieldType {
    /// Returns the SQL type token used in DDL.
    ///
    /// # Examples
    ///
    /// ```
    /// use geocatalog_core::types::FieldType;
    ///
    /// assert_eq!(FieldType::Geometry.as_sql(), "GEOMETRY");
    /// assert_eq!(FieldType::Float.as_sql(), "FLOAT");
    /// ```
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            FieldType::Serial => "SERIAL",
            FieldType::Text => "TEXT",
            FieldType::Float => "FLOAT",
            FieldType::Int => "INT",
            FieldType::Geometry => "GEOMETRY",
        }
    }

    /// Returns `true` for the database-assigned identifier type.
    #[must_use]
    pub fn is_identifier(&self) -> bool {
        matches!(self, FieldType::Serial)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SERIAL" => Ok(FieldType::Serial),
            "TEXT" => Ok(FieldType::Text),
            "FLOAT" => Ok(FieldType::Float),
            "INT" => Ok(FieldType::Int),
            "GEOMETRY" => Ok(FieldType::Geometry),
            other => Err(format!("unknown field type '{other}'")),
        }
    }
}

/// A single named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Column name
    pub name: String,
    /// Column type
    pub field_type: FieldType,
}

/// Ordered description of a catalog table's columns.
///
/// Order is significant: it is the column order of the generated DDL and the
/// value order of every INSERT tuple. At most one field may be
/// [`FieldType::Serial`]; it stands for the `id` primary key and never
/// appears in an INSERT column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    fields: Vec<Field>,
}

impl FieldDescriptor {
    /// Builds a descriptor, validating names and the single-identifier rule.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if a name is not a plain SQL identifier,
    /// a name is repeated, a non-identifier field is named `id`, or more than
    /// one field is `SERIAL`.
    ///
    /// # Examples
    ///
    /// ```
    /// use geocatalog_core::types::{FieldDescriptor, FieldType};
    ///
    /// let fields = FieldDescriptor::new([
    ///     ("gid", FieldType::Serial),
    ///     ("name", FieldType::Text),
    /// ])
    /// .unwrap();
    /// assert_eq!(fields.value_columns(), vec!["name"]);
    /// ```
    pub fn new<I, S>(fields: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        let fields: Vec<Field> = fields
            .into_iter()
            .map(|(name, field_type)| Field {
                name: name.into(),
                field_type,
            })
            .collect();

        for (idx, field) in fields.iter().enumerate() {
            validate_identifier(&field.name)?;
            if fields[..idx]
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&field.name))
            {
                return Err(ValidationError::DuplicateField {
                    name: field.name.clone(),
                });
            }
            if !field.field_type.is_identifier()
                && field.name.eq_ignore_ascii_case(IDENTIFIER_COLUMN)
            {
                return Err(ValidationError::DuplicateField {
                    name: field.name.clone(),
                });
            }
        }

        let serials: Vec<&str> = fields
            .iter()
            .filter(|f| f.field_type.is_identifier())
            .map(|f| f.name.as_str())
            .collect();
        if serials.len() > 1 {
            return Err(ValidationError::MultipleIdentifiers {
                fields: serials.join(", "),
            });
        }

        Ok(Self { fields })
    }

    /// The descriptor used for imagery catalog tables.
    #[must_use]
    pub fn catalog() -> Self {
        use FieldType::{Float, Geometry, Int, Serial, Text};

        let fields = [
            ("gid", Serial),
            ("name", Text),
            ("platform", Text),
            ("gsd", Float),
            ("projection", Int),
            ("datetime", Text),
            ("geom", Geometry),
            ("link", Text),
        ]
        .into_iter()
        .map(|(name, field_type)| Field {
            name: name.to_string(),
            field_type,
        })
        .collect();

        Self { fields }
    }

    /// All fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The identifier field, if one is declared.
    #[must_use]
    pub fn identifier(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_type.is_identifier())
    }

    /// Fields that receive explicit values, in declaration order.
    pub fn value_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.field_type.is_identifier())
    }

    /// Names of the fields that receive explicit values.
    #[must_use]
    pub fn value_columns(&self) -> Vec<&str> {
        self.value_fields().map(|f| f.name.as_str()).collect()
    }
}

/// Normalized metadata for one imagery item.
///
/// The bounding box is in EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    /// Item identifier
    pub id: String,
    /// Acquisition platform (e.g. `spot-6`)
    pub platform: String,
    /// Ground sample distance in metres
    pub gsd: f64,
    /// EPSG code of the image projection
    pub projection: i32,
    /// Acquisition time
    pub datetime: DateTime<Utc>,
    /// Footprint envelope
    pub bbox: Rect<f64>,
    /// Link to the image asset
    pub link: String,
}

impl MetadataRecord {
    /// Returns the value stored in the named catalog column.
    ///
    /// Column names follow [`FieldDescriptor::catalog`]; `None` means the
    /// record has nothing to put in that column.
    #[must_use]
    pub fn column_value(&self, column: &str) -> Option<SqlValue> {
        let value = match column {
            "name" => SqlValue::Text(self.id.clone()),
            "platform" => SqlValue::Text(self.platform.clone()),
            "gsd" => SqlValue::Float(self.gsd),
            "projection" => SqlValue::Int(i64::from(self.projection)),
            "datetime" => SqlValue::Timestamp(self.datetime),
            "geom" => SqlValue::Envelope(self.bbox),
            "link" => SqlValue::Text(self.link.clone()),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo_types::coord;

    #[test]
    fn test_catalog_descriptor_order() {
        let fields = FieldDescriptor::catalog();
        assert_eq!(
            fields.value_columns(),
            vec!["name", "platform", "gsd", "projection", "datetime", "geom", "link"]
        );
        assert_eq!(fields.identifier().map(|f| f.name.as_str()), Some("gid"));
    }

    #[test]
    fn test_descriptor_rejects_two_serials() {
        let err = FieldDescriptor::new([("a", FieldType::Serial), ("b", FieldType::Serial)])
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MultipleIdentifiers {
                fields: "a, b".to_string()
            }
        );
    }

    #[test]
    fn test_descriptor_rejects_bad_names() {
        assert!(FieldDescriptor::new([("name; DROP TABLE x", FieldType::Text)]).is_err());
        assert!(FieldDescriptor::new([("name", FieldType::Text), ("NAME", FieldType::Int)]).is_err());
        assert!(FieldDescriptor::new([("id", FieldType::Text)]).is_err());
    }

    #[test]
    fn test_field_type_parse() {
        assert_eq!("serial".parse::<FieldType>(), Ok(FieldType::Serial));
        assert_eq!("GEOMETRY".parse::<FieldType>(), Ok(FieldType::Geometry));
        assert!("BLOB".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_record_column_values() {
        let record = MetadataRecord {
            id: "a".to_string(),
            platform: "sat-1".to_string(),
            gsd: 10.0,
            projection: 32632,
            datetime: Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap(),
            bbox: Rect::new(coord! { x: 10.0, y: 20.0 }, coord! { x: 11.0, y: 21.0 }),
            link: "s3://bucket/a.tif".to_string(),
        };
        assert_eq!(record.column_value("name"), Some(SqlValue::Text("a".to_string())));
        assert_eq!(record.column_value("projection"), Some(SqlValue::Int(32632)));
        assert_eq!(record.column_value("cloud_cover"), None);
    }
}
