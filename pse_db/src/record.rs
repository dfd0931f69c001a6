//! ABOUTME: Dynamically typed result rows decoded from PostgreSQL
//! ABOUTME: Collectors scan these into their own label/field shapes

use chrono::{DateTime, Utc};
use pse_core::{Error, Result};
use sqlx::postgres::{types::Oid, PgRow};
use sqlx::{Column, Row, TypeInfo};

/// A single decoded column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row, columns kept in query order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn require(&self, column: &str) -> Result<&Value> {
        self.get(column)
            .ok_or_else(|| Error::Scan(format!("missing column '{}'", column)))
    }

    /// Column rendered as a label value
    pub fn label(&self, column: &str) -> Result<String> {
        match self.require(column)? {
            Value::Text(s) => Ok(s.clone()),
            Value::Int(n) => Ok(n.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Timestamp(ts) => Ok(ts.to_rfc3339()),
            Value::Null => Err(Error::Scan(format!(
                "column '{}' is NULL, expected a label value",
                column
            ))),
        }
    }

    /// Column as a sample value; timestamps become Unix epoch seconds
    pub fn number(&self, column: &str) -> Result<f64> {
        match self.require(column)? {
            Value::Int(n) => Ok(*n as f64),
            Value::Float(f) => Ok(*f),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Timestamp(ts) => Ok(ts.timestamp_millis() as f64 / 1000.0),
            Value::Text(_) => Err(Error::Scan(format!(
                "column '{}' is text, expected a number",
                column
            ))),
            Value::Null => Err(Error::Scan(format!(
                "column '{}' is NULL, expected a number",
                column
            ))),
        }
    }

    /// Decode every column of a driver row
    pub fn from_pg_row(row: &PgRow) -> Result<Self> {
        let mut record = Record::new();
        for column in row.columns() {
            let value = decode_column(row, column.ordinal(), column.type_info().name())
                .map_err(|e| Error::Scan(format!("column '{}': {}", column.name(), e)))?;
            record.push(column.name(), value);
        }
        Ok(record)
    }
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> std::result::Result<Value, String> {
    let decoded = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx).map(Value::from),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map(|v| Value::from(v.map(i64::from))),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map(|v| Value::from(v.map(i64::from))),
        "INT8" => row.try_get::<Option<i64>, _>(idx).map(Value::from),
        "OID" => row
            .try_get::<Option<Oid>, _>(idx)
            .map(|v| Value::from(v.map(|oid| i64::from(oid.0)))),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map(|v| Value::from(v.map(f64::from))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx).map(Value::from),
        "TEXT" | "NAME" | "VARCHAR" | "BPCHAR" => {
            row.try_get::<Option<String>, _>(idx).map(Value::from)
        }
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .map(Value::from),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .map(|v| Value::from(v.map(|ts| ts.and_utc()))),
        other => return Err(format!("unsupported column type {}", other)),
    };

    decoded.map_err(|e| e.to_string())
}
