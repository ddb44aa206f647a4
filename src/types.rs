//! Core data types used throughout the pipeline
//!
//! # Key Types
//!
//! - **`ProductId`**: Identifier of the product whose users are counted
//! - **`Value`**: A positional parameter or column value
//! - **`Row`**: A single result row returned by the store
//! - **`DayRange`**: Half-open range of calendar days `[from, to)`
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use dau_pipeline::types::DayRange;
//!
//! let from = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
//! let to = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
//! let range = DayRange::new(from, to).unwrap();
//! assert_eq!(range.len_days(), 2);
//! ```

use crate::error::{Error, ExecutionError};
use chrono::NaiveDate;
use std::fmt;

/// Identifier of a product
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductId(pub String);

impl ProductId {
    /// Create a product id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A positional parameter or column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// UTF-8 text
    Text(String),
    /// 64-bit signed integer
    Int(i64),
    /// Calendar date without time zone
    Date(NaiveDate),
}

impl Value {
    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Int(_) => "int",
            Value::Date(_) => "date",
        }
    }

    /// Integer payload, if any
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Date payload, if any
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Int(v) => write!(f, "{}", v),
            Value::Date(d) => write!(f, "'{}'", d),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&ProductId> for Value {
    fn from(p: &ProductId) -> Self {
        Value::Text(p.0.clone())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

/// A single result row
///
/// Columns keep the order the store returned them in. Lookups are linear,
/// which is fine for the handful of columns an aggregate query returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push((column.into(), value.into()));
        self
    }

    /// Look up a column by name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Read an integer column
    pub fn get_i64(&self, column: &str) -> std::result::Result<i64, ExecutionError> {
        let value = self
            .get(column)
            .ok_or_else(|| ExecutionError::MissingColumn {
                column: column.to_string(),
            })?;
        value.as_i64().ok_or_else(|| ExecutionError::TypeMismatch {
            column: column.to_string(),
            expected: "int",
        })
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Half-open range of calendar days `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DayRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DayRange {
    /// Create a range, rejecting `from > to`
    ///
    /// `from == to` is a valid empty range.
    pub fn new(from: NaiveDate, to_exclusive: NaiveDate) -> Result<Self, Error> {
        if from > to_exclusive {
            return Err(Error::InvalidRange {
                from,
                to: to_exclusive,
            });
        }
        Ok(Self {
            from,
            to: to_exclusive,
        })
    }

    /// Inclusive start
    pub fn from(&self) -> NaiveDate {
        self.from
    }

    /// Exclusive end
    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Number of days in the range
    pub fn len_days(&self) -> usize {
        (self.to - self.from).num_days().max(0) as usize
    }

    /// True when the range covers no day
    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    /// Days in ascending order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |d| *d < to)
    }
}

impl fmt::Display for DayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}
