//! Response shape normalization
//!
//! Upstream endpoints answer in three shapes: a plain array of records, a
//! wrapper object holding the array under a well-known key, or a columnar
//! object that maps field names to parallel value arrays. Everything funnels
//! into one flat record form before field mapping.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// One upstream record, flattened to field name -> raw value
pub type FlatRecord = Map<String, Value>;

/// Wrapper keys probed in order when the response is a plain object
const WRAPPER_KEYS: [&str; 8] = [
    "productList",
    "inventoryItemList",
    "partyList",
    "orderList",
    "items",
    "results",
    "data",
    "list",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("Unrecognized response shape: {detail}")]
    UnrecognizedShape { detail: String },
}

/// Normalize one page body into flat records
///
/// Column-format objects are transposed row by row. Columns may disagree on
/// length: the record count is the longest column and shorter columns simply
/// stop contributing. Scalar values next to the columns are metadata and are
/// ignored.
pub fn normalize(body: &Value) -> Result<Vec<FlatRecord>, NormalizeError> {
    match body {
        Value::Array(elements) => normalize_array(elements),
        Value::Object(fields) => normalize_object(fields),
        other => Err(NormalizeError::UnrecognizedShape {
            detail: format!("top-level {}", type_name(other)),
        }),
    }
}

fn normalize_array(elements: &[Value]) -> Result<Vec<FlatRecord>, NormalizeError> {
    let mut records = Vec::with_capacity(elements.len());
    let mut skipped = 0usize;

    for element in elements {
        match element {
            Value::Object(fields) => records.push(fields.clone()),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("⚠️ Dropped {} non-object array elements", skipped);
    }

    Ok(records)
}

fn normalize_object(fields: &Map<String, Value>) -> Result<Vec<FlatRecord>, NormalizeError> {
    // A known wrapper key wins over column interpretation, so a payload like
    // {"items": [...], "count": 3} is never mistaken for columns.
    for key in WRAPPER_KEYS {
        if let Some(inner) = fields.get(key) {
            return match inner {
                Value::Array(elements) => normalize_array(elements),
                Value::Object(_) => normalize(inner),
                other => Err(NormalizeError::UnrecognizedShape {
                    detail: format!("wrapper '{}' holds {}", key, type_name(other)),
                }),
            };
        }
    }

    transpose_columns(fields)
}

/// Turn {"sku": [a, b], "stock": [1, 2]} into row records
fn transpose_columns(fields: &Map<String, Value>) -> Result<Vec<FlatRecord>, NormalizeError> {
    let columns: Vec<(&String, &Vec<Value>)> = fields
        .iter()
        .filter_map(|(key, value)| value.as_array().map(|arr| (key, arr)))
        .collect();

    if columns.is_empty() {
        return Err(NormalizeError::UnrecognizedShape {
            detail: "object with no record array".to_string(),
        });
    }

    let row_count = columns.iter().map(|(_, arr)| arr.len()).max().unwrap_or(0);

    let mut records = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let mut record = Map::new();
        for (key, arr) in &columns {
            if let Some(value) = arr.get(row) {
                record.insert((*key).clone(), value.clone());
            }
        }
        records.push(record);
    }

    Ok(records)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
