//! Fitted-model contract and built-in fitters
//!
//! The grid engine never looks inside a fitted model: cells are trait
//! objects implementing [`FitResult`], which exposes attributes by name on
//! demand. The built-in OLS fitter lives in [`ols`]; anything else (mixed
//! effects, GLMs, ...) enters as a user callable returning its own
//! [`FitResult`] implementation.

pub(crate) mod formula;
pub mod ols;

pub use ols::OlsFit;

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A scalar attribute value extracted from a fitted-model object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Floating-point value
    Float(f64),
    /// Integer value
    Int(i64),
    /// String value
    Str(String),
}

impl AttrValue {
    /// The value as f64, widening integers; `None` for strings
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Contract every fitted-model object must satisfy to live in a grid cell.
///
/// Attribute lookup is by name and on demand; an implementation returns
/// `None` for names it does not expose, and the grid turns that into a
/// descriptive error at first extraction, not at fit time.
pub trait FitResult: Send + Sync {
    /// Kind tag identifying the fitted-model family (e.g. `"ols"`).
    ///
    /// Persisted grids dispatch on this tag when reloading.
    fn kind(&self) -> &str;

    /// Scalar attribute by name, if this model exposes it
    fn scalar_attr(&self, name: &str) -> Option<AttrValue>;

    /// Labeled-vector attribute by name (e.g. per-coefficient values)
    fn vector_attr(&self, name: &str) -> Option<Vec<(String, f64)>>;

    /// Serialize the model for grid persistence.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be represented as JSON.
    fn to_value(&self) -> Result<Value>;
}

/// Fallback cell used when a persisted grid's kind tag is unknown.
///
/// Wraps the raw JSON the original cell serialized to and answers attribute
/// lookups against it, so a reloaded grid of foreign cells still extracts
/// exactly what the original grid did.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericFit {
    kind: String,
    value: Value,
}

impl GenericFit {
    /// Wrap a serialized cell of the given kind
    #[must_use]
    pub const fn new(kind: String, value: Value) -> Self {
        Self { kind, value }
    }
}

impl FitResult for GenericFit {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn scalar_attr(&self, name: &str) -> Option<AttrValue> {
        match self.value.get(name)? {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(AttrValue::Int(i))
                } else {
                    n.as_f64().map(AttrValue::Float)
                }
            }
            Value::String(s) => Some(AttrValue::Str(s.clone())),
            _ => None,
        }
    }

    fn vector_attr(&self, name: &str) -> Option<Vec<(String, f64)>> {
        match self.value.get(name)? {
            // Vec<(String, f64)> serializes as an array of [label, value] pairs
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    let pair = item.as_array()?;
                    let label = pair.first()?.as_str()?;
                    let value = pair.get(1)?.as_f64()?;
                    Some((label.to_string(), value))
                })
                .collect(),
            Value::Object(map) => map
                .iter()
                .map(|(label, v)| Some((label.clone(), v.as_f64()?)))
                .collect(),
            _ => None,
        }
    }

    fn to_value(&self) -> Result<Value> {
        Ok(self.value.clone())
    }
}
