//! Ordered-row, named-column tables.
//!
//! Every table in the pipeline, from the twelve solver inputs through the
//! derived structural tables to the five solver outputs, shares this shape.
//! Column order is insertion order; only the leading index columns of each
//! table carry positional meaning.

use crate::error::{CalibError, CalibResult};
use std::collections::BTreeSet;

/// A single cell. The wire format distinguishes exactly two kinds of field:
/// bare numerics and quoted text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Text(String),
}

impl Value {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    /// Integral numeric key (agent/zone/type/market id).
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Value::Num(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<S: Into<String>>(header: Vec<S>) -> Self {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.header.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// All values of one column as integral ids, in row order.
    /// Fails with a schema error if any cell is not an integral numeric.
    pub fn id_column(&self, col: usize, table: &str) -> CalibResult<Vec<i64>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.get(col).and_then(Value::as_id).ok_or_else(|| CalibError::Schema {
                    table: table.to_string(),
                    detail: format!("row {i}, column {col}: expected an integral id"),
                })
            })
            .collect()
    }

    /// Distinct integral ids of one column.
    pub fn distinct_ids(&self, col: usize, table: &str) -> CalibResult<BTreeSet<i64>> {
        Ok(self.id_column(col, table)?.into_iter().collect())
    }

    /// All values of one column as numerics, in row order.
    pub fn num_column(&self, col: usize, table: &str) -> CalibResult<Vec<f64>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.get(col).and_then(Value::as_num).ok_or_else(|| CalibError::Schema {
                    table: table.to_string(),
                    detail: format!("row {i}, column {col}: expected a numeric value"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_extraction_rejects_fractional_and_text() {
        assert_eq!(Value::Num(7.0).as_id(), Some(7));
        assert_eq!(Value::Num(7.5).as_id(), None);
        assert_eq!(Value::Text("7".into()).as_id(), None);
    }

    #[test]
    fn distinct_ids_deduplicates() {
        let mut t = Table::new(vec!["ID"]);
        t.push_row(vec![1.into()]);
        t.push_row(vec![2.into()]);
        t.push_row(vec![1.into()]);
        let ids = t.distinct_ids(0, "t").unwrap();
        assert_eq!(ids.len(), 2);
    }
}
