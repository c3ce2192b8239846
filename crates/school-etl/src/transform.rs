//! Transformer stage
//!
//! Turns one `RawPage` into a `CleanDataset`. Pure: no I/O, same input gives
//! the same output. The steps, in order:
//!
//! 1. Unwrap the records array from the page envelope
//! 2. Keep records whose status contains the marker and whose category matches
//! 3. Derive the composite address (`name + " - " + street`)
//! 4. Coerce latitude/longitude to `f64` (`NaN` when unparsable)
//! 5. Drop rows with a non-finite coordinate
//!
//! Steps 2 and 5 are row-level quality drops and never fail the transform.

use school_etl_common::{EtlError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::models::{Cell, CleanDataset, CleanRow, RawPage};

/// Field names and filter values applied by the transformer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRules {
    /// Envelope key holding the records array
    pub records_key: String,
    pub status_field: String,
    /// Substring the status must contain
    pub status_marker: String,
    pub category_field: String,
    /// Exact category value to keep
    pub target_category: String,
    pub name_field: String,
    pub street_field: String,
    /// Column receiving `name + " - " + street`
    pub derived_field: String,
    pub latitude_field: String,
    pub longitude_field: String,
}

impl Default for TransformRules {
    fn default() -> Self {
        Self {
            records_key: "dataSekolah".to_string(),
            status_field: "status".to_string(),
            status_marker: "N".to_string(),
            category_field: "bentuk".to_string(),
            target_category: "SMA".to_string(),
            name_field: "sekolah".to_string(),
            street_field: "alamat_jalan".to_string(),
            derived_field: "school_address".to_string(),
            latitude_field: "lintang".to_string(),
            longitude_field: "bujur".to_string(),
        }
    }
}

/// Row counts for one transform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub records_fetched: usize,
    /// Dropped by the status/category filter
    pub filtered_out: usize,
    /// Dropped because a coordinate did not coerce to a finite number
    pub invalid_coordinates: usize,
    pub rows_kept: usize,
}

/// Transformer stage
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    rules: TransformRules,
}

impl Transformer {
    pub fn new(rules: TransformRules) -> Self {
        Self { rules }
    }

    pub fn transform(&self, page: &RawPage) -> Result<CleanDataset> {
        self.transform_with_summary(page).map(|(dataset, _)| dataset)
    }

    pub fn transform_with_summary(&self, page: &RawPage) -> Result<(CleanDataset, TransformSummary)> {
        let rules = &self.rules;
        let records = self.unwrap_records(page)?;
        let mut columns = collect_columns(&records);

        let derived_index = match columns.iter().position(|c| *c == rules.derived_field) {
            Some(index) => index,
            None => {
                columns.push(rules.derived_field.clone());
                columns.len() - 1
            },
        };
        let latitude_index = columns.iter().position(|c| *c == rules.latitude_field);
        let longitude_index = columns.iter().position(|c| *c == rules.longitude_field);

        let mut summary = TransformSummary {
            records_fetched: records.len(),
            ..Default::default()
        };

        // Filter and derive first: a missing name/street on a kept record fails the
        // whole transform even if its coordinates would have dropped it later.
        let mut derived = Vec::new();
        for (index, record) in records.iter().enumerate() {
            if !self.keep(record) {
                summary.filtered_out += 1;
                continue;
            }
            let address = self.composite_address(record, index)?;
            derived.push((*record, address));
        }

        let mut rows = Vec::with_capacity(derived.len());
        for (record, address) in derived {
            let latitude = coerce_numeric(record.get(&rules.latitude_field));
            let longitude = coerce_numeric(record.get(&rules.longitude_field));

            if !latitude.is_finite() || !longitude.is_finite() {
                summary.invalid_coordinates += 1;
                debug!(
                    latitude = ?record.get(&rules.latitude_field),
                    longitude = ?record.get(&rules.longitude_field),
                    "Dropping record with unusable coordinates"
                );
                continue;
            }

            let mut cells: Vec<Cell> = columns
                .iter()
                .map(|column| record.get(column).map(Cell::from_json).unwrap_or(Cell::Null))
                .collect();
            cells[derived_index] = Cell::Text(address);
            if let Some(i) = latitude_index {
                cells[i] = Cell::Float(latitude);
            }
            if let Some(i) = longitude_index {
                cells[i] = Cell::Float(longitude);
            }

            rows.push(CleanRow::new(cells));
        }

        summary.rows_kept = rows.len();

        info!(
            fetched = summary.records_fetched,
            filtered_out = summary.filtered_out,
            invalid_coordinates = summary.invalid_coordinates,
            kept = summary.rows_kept,
            "Transformed page"
        );

        Ok((CleanDataset::new(columns, rows)?, summary))
    }

    fn unwrap_records<'a>(&self, page: &'a RawPage) -> Result<Vec<&'a Map<String, Value>>> {
        let key = &self.rules.records_key;

        let envelope = page.body().as_object().ok_or_else(|| {
            EtlError::SchemaMismatch("page body is not a JSON object".to_string())
        })?;

        let records = envelope
            .get(key)
            .ok_or_else(|| EtlError::SchemaMismatch(format!("envelope key '{}' is absent", key)))?
            .as_array()
            .ok_or_else(|| EtlError::SchemaMismatch(format!("'{}' is not an array", key)))?;

        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                record.as_object().ok_or_else(|| {
                    EtlError::SchemaMismatch(format!("{}[{}] is not an object", key, index))
                })
            })
            .collect()
    }

    fn keep(&self, record: &Map<String, Value>) -> bool {
        let rules = &self.rules;

        let status_matches = record
            .get(&rules.status_field)
            .and_then(Value::as_str)
            .is_some_and(|status| status.contains(rules.status_marker.as_str()));

        let category_matches = record
            .get(&rules.category_field)
            .and_then(Value::as_str)
            .is_some_and(|category| category == rules.target_category);

        status_matches && category_matches
    }

    fn composite_address(&self, record: &Map<String, Value>, index: usize) -> Result<String> {
        let name = required_text(record, &self.rules.name_field, index)?;
        let street = required_text(record, &self.rules.street_field, index)?;
        Ok(format!("{} - {}", name, street))
    }
}

/// Union of record keys in first-appearance order
fn collect_columns(records: &[&Map<String, Value>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn required_text(record: &Map<String, Value>, field: &str, index: usize) -> Result<String> {
    record
        .get(field)
        .map(Cell::from_json)
        .and_then(|cell| cell.to_text())
        .ok_or_else(|| EtlError::field_missing(field, index))
}

/// Parse a coordinate; anything unparsable becomes `NaN`
pub fn coerce_numeric(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}
