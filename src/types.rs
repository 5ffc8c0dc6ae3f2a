//! Core types shared across the crate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the library
pub type Timestamp = DateTime<Utc>;

/// A single trading session (calendar day label)
pub type Session = NaiveDate;

/// Unique identifier for assets
pub type AssetId = u64;

/// Data types that can be held by columns and computed by terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// Boolean values (filters)
    Bool,
    /// 64-bit integer (classifier labels)
    Int64,
    /// 64-bit float (factors and raw data)
    Float64,
}

impl DType {
    /// Whether this dtype supports arithmetic adjustments (add/multiply)
    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::Int64 | DType::Float64)
    }

    /// The conventional missing value for this dtype
    pub fn default_missing(&self) -> MissingValue {
        match self {
            DType::Bool => MissingValue::Bool(false),
            DType::Int64 => MissingValue::Int64(-1),
            DType::Float64 => MissingValue::Float64(f64::NAN),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DType::Bool => write!(f, "bool"),
            DType::Int64 => write!(f, "int64"),
            DType::Float64 => write!(f, "float64"),
        }
    }
}

/// Value substituted for cells with no data, typed to match its column
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum MissingValue {
    Bool(bool),
    Int64(i64),
    Float64(f64),
}

impl MissingValue {
    pub fn dtype(&self) -> DType {
        match self {
            MissingValue::Bool(_) => DType::Bool,
            MissingValue::Int64(_) => DType::Int64,
            MissingValue::Float64(_) => DType::Float64,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MissingValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MissingValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MissingValue::Float64(v) => Some(*v),
            _ => None,
        }
    }
}

// NaN is a legitimate float missing value, so float comparison treats
// NaN == NaN as equal here.
impl PartialEq for MissingValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MissingValue::Bool(a), MissingValue::Bool(b)) => a == b,
            (MissingValue::Int64(a), MissingValue::Int64(b)) => a == b,
            (MissingValue::Float64(a), MissingValue::Float64(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            _ => false,
        }
    }
}
