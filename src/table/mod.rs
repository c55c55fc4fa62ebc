//! Long-form epochs table model
//!
//! A long-form table has one row per (epoch, time) combination and columns
//! for channel measurements and trial-level covariates. Two identifying
//! columns are required: a time key and an epoch id, both integer or string
//! typed. [`validate`] checks that every time partition sees the identical
//! epoch-id sequence before an [`crate::Epochs`] container is built.

pub(crate) mod validate;

use crate::{Error, Result};
use arrow::array::{Array, Float32Array, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conventional time column name, for callers that follow the default layout
pub const DEFAULT_TIME: &str = "time";

/// Conventional epoch-id column name, for callers that follow the default layout
pub const DEFAULT_EPOCH_ID: &str = "epoch_id";

/// Names of the two identifying columns of a long-form table.
///
/// There is no process-wide default; construct one explicitly, e.g.
/// `TableConfig::new(DEFAULT_TIME, DEFAULT_EPOCH_ID)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Time-key column name
    pub time: String,
    /// Epoch-id column name
    pub epoch_id: String,
}

impl TableConfig {
    /// Create a config from the two identifying column names
    pub fn new(time: impl Into<String>, epoch_id: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            epoch_id: epoch_id.into(),
        }
    }
}

/// Opaque key value: an epoch id or a time key.
///
/// Keys hash, compare and order by value; time keys rely on the ordering,
/// epoch ids on hashing and equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Integer key
    Int(i64),
    /// String key
    Str(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// One typed column of a long-form table
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// 64-bit float values
    Float64(Vec<f64>),
    /// 64-bit integer values
    Int64(Vec<i64>),
    /// String values
    Utf8(Vec<String>),
}

impl Column {
    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Utf8(v) => v.len(),
        }
    }

    /// True if the column has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable type name, used in error reports
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Float64(_) => "float64",
            Self::Int64(_) => "int64",
            Self::Utf8(_) => "utf8",
        }
    }

    /// Value at `row` as a [`Key`], if the column is key-typed
    pub(crate) fn key_at(&self, row: usize) -> Option<Key> {
        match self {
            Self::Int64(v) => Some(Key::Int(v[row])),
            Self::Utf8(v) => Some(Key::Str(v[row].clone())),
            Self::Float64(_) => None,
        }
    }

    /// Value at `row` as f64, if the column is numeric
    pub(crate) fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            Self::Float64(v) => Some(v[row]),
            #[allow(clippy::cast_precision_loss)]
            Self::Int64(v) => Some(v[row] as f64),
            Self::Utf8(_) => None,
        }
    }
}

/// In-memory long-form table: named columns of uniform length
#[derive(Debug, Clone)]
pub struct EpochsTable {
    columns: Vec<(String, Column)>,
    num_rows: usize,
}

impl EpochsTable {
    /// Create a table from named columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyTable`] if no columns or no rows are given, and
    /// [`Error::ColumnLength`] if column lengths disagree.
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self> {
        let num_rows = columns.first().map_or(0, |(_, c)| c.len());
        if num_rows == 0 {
            return Err(Error::EmptyTable);
        }
        for (name, column) in &columns {
            if column.len() != num_rows {
                return Err(Error::ColumnLength {
                    name: name.clone(),
                    expected: num_rows,
                    actual: column.len(),
                });
            }
        }
        Ok(Self { columns, num_rows })
    }

    /// Build a table from Arrow record batches.
    ///
    /// Batches are concatenated in order; Int32/Float32 columns are widened
    /// to Int64/Float64.
    ///
    /// # Errors
    ///
    /// Returns an error on schema mismatch between batches, unsupported
    /// column types, or an empty result.
    pub fn from_batches(batches: &[RecordBatch]) -> Result<Self> {
        let first = batches
            .first()
            .ok_or(Error::EmptyTable)?;
        let schema = first.schema();
        for batch in batches {
            if batch.schema() != schema {
                return Err(Error::Storage(format!(
                    "schema mismatch between record batches: expected {:?}, got {:?}",
                    schema,
                    batch.schema()
                )));
            }
        }

        let mut columns = Vec::with_capacity(schema.fields().len());
        for (idx, field) in schema.fields().iter().enumerate() {
            let mut column = match field.data_type() {
                DataType::Float64 | DataType::Float32 => Column::Float64(Vec::new()),
                DataType::Int64 | DataType::Int32 => Column::Int64(Vec::new()),
                DataType::Utf8 => Column::Utf8(Vec::new()),
                other => {
                    return Err(Error::Storage(format!(
                        "unsupported column type {other:?} for column '{}'",
                        field.name()
                    )))
                }
            };
            for batch in batches {
                append_arrow_column(&mut column, batch.column(idx).as_ref(), field.name())?;
            }
            columns.push((field.name().clone(), column));
        }

        Self::new(columns)
    }

    /// Number of rows
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Column names, in table order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Look up a column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// True if the table has a column with the given name
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

fn append_arrow_column(column: &mut Column, array: &dyn Array, name: &str) -> Result<()> {
    if array.null_count() > 0 {
        return Err(Error::Storage(format!(
            "column '{name}' contains nulls, which are not supported"
        )));
    }
    match column {
        Column::Float64(values) => {
            if let Some(a) = array.as_any().downcast_ref::<Float64Array>() {
                values.extend(a.values().iter().copied());
            } else if let Some(a) = array.as_any().downcast_ref::<Float32Array>() {
                values.extend(a.values().iter().map(|v| f64::from(*v)));
            } else {
                return Err(Error::Storage(format!(
                    "column '{name}' could not be read as float"
                )));
            }
        }
        Column::Int64(values) => {
            if let Some(a) = array.as_any().downcast_ref::<Int64Array>() {
                values.extend(a.values().iter().copied());
            } else if let Some(a) = array.as_any().downcast_ref::<Int32Array>() {
                values.extend(a.values().iter().map(|v| i64::from(*v)));
            } else {
                return Err(Error::Storage(format!(
                    "column '{name}' could not be read as integer"
                )));
            }
        }
        Column::Utf8(values) => {
            let Some(a) = array.as_any().downcast_ref::<StringArray>() else {
                return Err(Error::Storage(format!(
                    "column '{name}' could not be read as utf8"
                )));
            };
            values.extend(a.iter().map(|v| v.unwrap_or_default().to_string()));
        }
    }
    Ok(())
}

/// Borrowed view of one time partition of an [`EpochsTable`].
///
/// This is what a fitting callable receives: all rows of one timepoint, in
/// epoch-index order, with typed access to any table column. The view is
/// read-only; callables cannot mutate the underlying table.
#[derive(Clone, Copy)]
pub struct Snapshot<'a> {
    table: &'a EpochsTable,
    time: &'a Key,
    rows: &'a [usize],
    epoch_col: &'a Column,
}

impl<'a> Snapshot<'a> {
    pub(crate) const fn new(
        table: &'a EpochsTable,
        time: &'a Key,
        rows: &'a [usize],
        epoch_col: &'a Column,
    ) -> Self {
        Self {
            table,
            time,
            rows,
            epoch_col,
        }
    }

    /// Time key of this partition
    #[must_use]
    pub const fn time(&self) -> &Key {
        self.time
    }

    /// Number of rows (= number of epochs)
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// True if the underlying table has the named column
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.table.has_column(name)
    }

    /// Underlying column type name, if present
    #[must_use]
    pub fn column_type(&self, name: &str) -> Option<&'static str> {
        self.table.column(name).map(Column::type_name)
    }

    /// Epoch ids of this partition, in row order
    #[must_use]
    pub fn epoch_ids(&self) -> Vec<Key> {
        self.rows
            .iter()
            .filter_map(|&row| self.epoch_col.key_at(row))
            .collect()
    }

    /// Gather a numeric column (float or integer, widened to f64).
    ///
    /// # Errors
    ///
    /// Returns an error if the column is absent or string-typed.
    pub fn f64_column(&self, name: &str) -> Result<Vec<f64>> {
        let column = self
            .table
            .column(name)
            .ok_or_else(|| Error::MissingChannels {
                missing: vec![name.to_string()],
            })?;
        self.rows
            .iter()
            .map(|&row| {
                column.f64_at(row).ok_or(Error::ColumnType {
                    name: name.to_string(),
                    expected: "float64 or int64",
                    actual: column.type_name(),
                })
            })
            .collect()
    }

    /// Gather a string column.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is absent or not string-typed.
    pub fn utf8_column(&self, name: &str) -> Result<Vec<&'a str>> {
        let column = self
            .table
            .column(name)
            .ok_or_else(|| Error::MissingChannels {
                missing: vec![name.to_string()],
            })?;
        let Column::Utf8(values) = column else {
            return Err(Error::ColumnType {
                name: name.to_string(),
                expected: "utf8",
                actual: column.type_name(),
            });
        };
        Ok(self.rows.iter().map(|&row| values[row].as_str()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_table_rejects_ragged_columns() {
        let err = EpochsTable::new(vec![
            ("a".to_string(), Column::Int64(vec![1, 2, 3])),
            ("b".to_string(), Column::Float64(vec![1.0])),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            Error::ColumnLength { expected: 3, actual: 1, .. }
        ));
    }

    #[test]
    fn test_table_rejects_empty() {
        assert!(matches!(
            EpochsTable::new(vec![]).unwrap_err(),
            Error::EmptyTable
        ));
    }

    #[test]
    fn test_from_batches_widens_types() {
        use arrow::datatypes::{Field, Schema};

        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("value", DataType::Float32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![1, 2])),
                Arc::new(Float32Array::from(vec![0.5, 1.5])),
            ],
        )
        .unwrap();

        let table = EpochsTable::from_batches(&[batch]).unwrap();
        assert_eq!(table.column("id"), Some(&Column::Int64(vec![1, 2])));
        assert_eq!(table.column("value"), Some(&Column::Float64(vec![0.5, 1.5])));
    }

    #[test]
    fn test_key_ordering_and_display() {
        assert!(Key::Int(1) < Key::Int(2));
        assert_eq!(Key::Int(7).to_string(), "7");
        assert_eq!(Key::from("e1").to_string(), "e1");
    }
}
