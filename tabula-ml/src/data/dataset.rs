//! In-memory tabular dataset.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};

use crate::error::PipelineError;

/// Stable identifier of a record, assigned when the dataset is built.
pub type RecordId = usize;

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Category(String),
    Missing,
}

/// Strip surrounding whitespace and one pair of enclosing double quotes,
/// turning each doubled quote inside them into a single one.
pub(crate) fn unquote(cell: &str) -> Cow<'_, str> {
    let trimmed = cell.trim();
    match trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) if inner.contains("\"\"") => Cow::Owned(inner.replace("\"\"", "\"")),
        Some(inner) => Cow::Borrowed(inner),
        None => Cow::Borrowed(trimmed),
    }
}

impl Value {
    /// Parse a raw text cell. Empty, `NA` and `NaN` cells are missing.
    pub fn parse(cell: &str) -> Self {
        let unquoted = unquote(cell);
        let cell = unquoted.trim();
        if cell.is_empty() || cell == "NA" || cell.eq_ignore_ascii_case("nan") {
            return Self::Missing;
        }
        match cell.parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Category(cell.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text form used for categories and labels.
    pub fn as_label(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.to_string()),
            Self::Category(s) => Some(s.clone()),
            Self::Missing => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Category(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Category(s)
    }
}

/// One row of a dataset. `values` is aligned with [`Dataset::columns`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub values: Vec<Value>,
}

/// Ordered records sharing one column schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset from rows, assigning ids by position.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, PipelineError> {
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(id, values)| Record { id, values })
            .collect();
        Self::from_records(columns, records)
    }

    /// Build a dataset from records that already carry ids.
    pub fn from_records(columns: Vec<String>, records: Vec<Record>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(PipelineError::schema(format!("duplicate column '{column}'")));
            }
        }
        for record in &records {
            if record.values.len() != columns.len() {
                return Err(PipelineError::schema(format!(
                    "record {} has {} values, expected {}",
                    record.id,
                    record.values.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Position of `column`, or a schema error naming it.
    pub fn column_index(&self, column: &str) -> Result<usize, PipelineError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| PipelineError::schema(format!("column '{column}' not found")))
    }

    /// All values of one column, in record order.
    pub fn column(&self, column: &str) -> Result<Vec<&Value>, PipelineError> {
        let idx = self.column_index(column)?;
        Ok(self.records.iter().map(|r| &r.values[idx]).collect())
    }

    /// Sorted distinct non-missing values of a column, as text.
    pub fn categories(&self, column: &str) -> Result<Vec<String>, PipelineError> {
        let set: BTreeSet<String> = self
            .column(column)?
            .into_iter()
            .filter_map(Value::as_label)
            .collect();
        Ok(set.into_iter().collect())
    }

    /// Labels of every record. A missing label is an error, not a class.
    pub fn labels(&self, column: &str) -> Result<Vec<String>, PipelineError> {
        let idx = self.column_index(column)?;
        self.records
            .iter()
            .map(|r| {
                r.values[idx]
                    .as_label()
                    .ok_or_else(|| PipelineError::missing_value(column, r.id))
            })
            .collect()
    }

    /// New dataset holding the records at the given positions, in that order.
    pub fn subset(&self, positions: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            records: positions
                .iter()
                .filter_map(|&p| self.records.get(p).cloned())
                .collect(),
        }
    }

    /// Remove records with a missing value in any of `columns`.
    ///
    /// This is the only operation that drops rows; preprocessing never does.
    pub fn drop_missing(&self, columns: &[&str]) -> Result<Self, PipelineError> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>, _>>()?;
        let records: Vec<Record> = self
            .records
            .iter()
            .filter(|r| indices.iter().all(|&i| !r.values[i].is_missing()))
            .cloned()
            .collect();
        let dropped = self.records.len() - records.len();
        if dropped > 0 {
            tracing::debug!(dropped, "dropped records with missing values");
        }
        Ok(Self {
            columns: self.columns.clone(),
            records,
        })
    }
}
