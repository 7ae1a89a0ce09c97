// Candidate row normalization
//
// The service has shipped several generations of row shapes; every known
// field alias is accepted and malformed values are coerced rather than rejected.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::models::{CandidateRow, VendorCode};

const ID_KEYS: &[&str] = &["entry_id", "entryId", "row_index", "id"];
const VENDOR_CODE_KEYS: &[&str] = &["vendor_code", "vendorCode", "vendorId", "vendor_id"];
const VENDOR_NAME_KEYS: &[&str] = &["vendor_name", "vendorName", "processor_name"];
const ITEM_NAME_KEYS: &[&str] = &["item_name", "itemName", "product_name"];
const INITIAL_INDEX_KEYS: &[&str] = &["initial_index", "initialIndex"];

/// Policy re-pointing an unset or zero initial index to a named default label.
///
/// Kept separate from normalization so it can be switched off by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DefaultLabelPolicy {
    label: Option<String>,
}

impl DefaultLabelPolicy {
    pub fn new(label: Option<String>) -> Self {
        Self {
            label: label.filter(|l| !l.is_empty()),
        }
    }

    pub fn disabled() -> Self {
        Self { label: None }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns the index to use instead of `raw_index`, if the policy applies.
    pub fn repoint(&self, raw_index: Option<i64>, options: &[String]) -> Option<usize> {
        let label = self.label.as_deref()?;
        if !matches!(raw_index, None | Some(0)) {
            return None;
        }
        options.iter().position(|o| o == label)
    }
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// Scalars become strings; null, arrays and objects do not.
fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_vendor_code(value: Option<&Value>) -> VendorCode {
    match value {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => VendorCode::Number(i),
            None => VendorCode::Text(n.to_string()),
        },
        Some(other) => VendorCode::Text(coerce_string(other).unwrap_or_default()),
        None => VendorCode::default(),
    }
}

/// Parse a raw initial index; `None` means unset or unreadable.
fn parse_raw_index(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn coerce_options(value: Option<&Value>, entry_id: &str) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(coerce_string).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            log::warn!(
                "Row {}: options is not a list ({}), treating as empty",
                entry_id,
                other
            );
            Vec::new()
        }
    }
}

/// Clamp into `[0, len - 1]`, or 0 for an empty option list.
pub fn clamp_initial_index(raw: i64, len: usize) -> usize {
    if len == 0 || raw <= 0 {
        return 0;
    }
    (raw as usize).min(len - 1)
}

/// The row's own identifier, if it carries a usable one.
fn explicit_id(obj: &Map<String, Value>) -> Option<String> {
    first_present(obj, ID_KEYS)
        .and_then(coerce_string)
        .filter(|id| !id.trim().is_empty())
}

/// Normalize one row; `None` when the value is not a row at all.
pub fn normalize_row(
    value: &Value,
    position: usize,
    policy: &DefaultLabelPolicy,
) -> Option<CandidateRow> {
    let obj = value.as_object()?;

    let entry_id = explicit_id(obj).unwrap_or_else(|| position.to_string());

    let vendor_code = coerce_vendor_code(first_present(obj, VENDOR_CODE_KEYS));
    let vendor_name = first_present(obj, VENDOR_NAME_KEYS)
        .and_then(coerce_string)
        .unwrap_or_default();
    let item_name = first_present(obj, ITEM_NAME_KEYS)
        .and_then(coerce_string)
        .unwrap_or_default();
    let detail = obj.get("detail").and_then(coerce_string);
    let options = coerce_options(obj.get("options"), &entry_id);

    let raw_index = parse_raw_index(first_present(obj, INITIAL_INDEX_KEYS));
    let initial_index = match policy.repoint(raw_index, &options) {
        Some(index) => index,
        None => clamp_initial_index(raw_index.unwrap_or(0), options.len()),
    };

    Some(CandidateRow {
        entry_id,
        vendor_code,
        vendor_name,
        item_name,
        detail,
        options,
        initial_index,
    })
}

/// Normalize all rows, dropping (with a logged skip) anything unusable.
pub fn normalize_rows(values: &[Value], policy: &DefaultLabelPolicy) -> Vec<CandidateRow> {
    // Positional ids must not shadow an id another row states explicitly
    let explicit: HashSet<String> = values
        .iter()
        .filter_map(|v| v.as_object().and_then(explicit_id))
        .collect();
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(values.len());

    for (position, value) in values.iter().enumerate() {
        let Some(mut row) = normalize_row(value, position, policy) else {
            log::warn!("Skipping row {}: not an object ({})", position, value);
            continue;
        };
        let positional = value.as_object().and_then(explicit_id).is_none();
        if positional && explicit.contains(&row.entry_id) {
            let mut id = format!("row-{}", position);
            let mut suffix = 1;
            while explicit.contains(&id) {
                id = format!("row-{}-{}", position, suffix);
                suffix += 1;
            }
            log::debug!("Row {} has no id; using {}", position, id);
            row.entry_id = id;
        }
        if !seen.insert(row.entry_id.clone()) {
            log::warn!(
                "Skipping row {}: duplicate entry id {}",
                position,
                row.entry_id
            );
            continue;
        }
        rows.push(row);
    }

    rows
}
