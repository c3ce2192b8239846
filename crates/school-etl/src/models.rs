//! Data handed between pipeline stages
//!
//! `RawPage` flows from the extractor to the transformer, `CleanDataset` from
//! the transformer to the loader, `LoadResult` back out of the loader.

use school_etl_common::{EtlError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of the source API, exactly as decoded from the response body.
///
/// No structure is enforced here. The envelope is unwrapped (and validated)
/// by the transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPage(Value);

impl RawPage {
    pub fn new(body: Value) -> Self {
        Self(body)
    }

    pub fn body(&self) -> &Value {
        &self.0
    }
}

/// One value in a clean row
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Cell {
    /// Convert a raw JSON field value.
    ///
    /// Booleans, arrays and objects are not part of the source schema; they
    /// are kept as their JSON text rather than rejected.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::String(s) => Cell::Text(s.clone()),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Cell::Integer(i),
                (None, Some(f)) if n.is_f64() => Cell::Float(f),
                _ => Cell::Text(n.to_string()),
            },
            other => Cell::Text(other.to_string()),
        }
    }

    /// Text form used by the destination table (every column is TEXT)
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Integer(i) => Some(i.to_string()),
            Cell::Float(f) => Some(f.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(f) => Some(*f),
            Cell::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// One row of a `CleanDataset`, one cell per dataset column
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRow {
    cells: Vec<Cell>,
}

impl CleanRow {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }
}

/// Rectangular output of the transformer: every row has one cell per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CleanDataset {
    columns: Vec<String>,
    rows: Vec<CleanRow>,
}

impl CleanDataset {
    /// Build a dataset, rejecting rows whose width differs from the column list
    pub fn new(columns: Vec<String>, rows: Vec<CleanRow>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.cells.len() != columns.len())
        {
            return Err(EtlError::SchemaMismatch(format!(
                "row {} has {} cells but the dataset has {} columns",
                index,
                row.cells.len(),
                columns.len()
            )));
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[CleanRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` for the named column
    pub fn value(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.cell(index)
    }
}

/// What the loader did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
    /// Qualified destination, e.g. `"hijir"."target_table"`
    pub table: String,
    /// Columns written, in table order
    pub columns: Vec<String>,
    pub rows_written: u64,
    /// Number of INSERT statements issued inside the replace transaction
    pub batches: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_from_json() {
        assert_eq!(Cell::from_json(&json!(null)), Cell::Null);
        assert_eq!(Cell::from_json(&json!("SMA")), Cell::Text("SMA".to_string()));
        assert_eq!(Cell::from_json(&json!(42)), Cell::Integer(42));
        assert_eq!(Cell::from_json(&json!(-6.25)), Cell::Float(-6.25));
        assert_eq!(Cell::from_json(&json!(true)), Cell::Text("true".to_string()));
    }

    #[test]
    fn test_cell_to_text() {
        assert_eq!(Cell::Null.to_text(), None);
        assert_eq!(Cell::Integer(7).to_text().as_deref(), Some("7"));
        assert_eq!(Cell::Float(-6.2).to_text().as_deref(), Some("-6.2"));
        assert_eq!(Cell::Float(106.0).to_text().as_deref(), Some("106"));
    }

    #[test]
    fn test_dataset_rejects_ragged_rows() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            CleanRow::new(vec![Cell::Integer(1), Cell::Text("a".into())]),
            CleanRow::new(vec![Cell::Integer(2)]),
        ];

        let err = CleanDataset::new(columns, rows).unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");
    }

    #[test]
    fn test_dataset_value_lookup() {
        let dataset = CleanDataset::new(
            vec!["id".to_string(), "name".to_string()],
            vec![CleanRow::new(vec![Cell::Integer(1), Cell::Text("SMAN 1".into())])],
        )
        .unwrap();

        assert_eq!(dataset.value(0, "name").and_then(Cell::as_str), Some("SMAN 1"));
        assert!(dataset.value(0, "missing").is_none());
        assert!(dataset.value(1, "id").is_none());
    }

    #[test]
    fn test_raw_page_is_transparent() {
        let page = RawPage::new(json!({"dataSekolah": []}));
        let encoded = serde_json::to_value(&page).unwrap();
        assert_eq!(encoded, json!({"dataSekolah": []}));
    }
}
