//! Schema definition and type inference for datasets.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::data::dataset::{Dataset, Value};
use crate::error::PipelineError;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Categorical,
    /// Every value is missing.
    Empty,
}

/// Schema definition for a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
}

impl SchemaDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Schema for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
}

/// Statistics for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStats {
    pub name: String,
    pub dtype: ColumnType,
    pub missing_count: usize,
    pub unique_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

/// Count, mean and sample standard deviation of a numeric sample.
///
/// The standard deviation is `None` below two observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: Option<f64>,
}

impl NumericSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = (values.len() > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        });
        Some(Self {
            count: values.len(),
            mean,
            std_dev,
        })
    }
}

/// Infer column type from its values.
pub fn infer_column_type(values: &[&Value]) -> ColumnType {
    let mut has_number = false;
    for v in values {
        match v {
            Value::Category(_) => return ColumnType::Categorical,
            Value::Number(_) => has_number = true,
            Value::Missing => {}
        }
    }
    if has_number {
        ColumnType::Numeric
    } else {
        ColumnType::Empty
    }
}

/// Infer the schema of a dataset.
pub fn infer_schema(dataset: &Dataset) -> SchemaDefinition {
    let columns = dataset
        .columns()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values: Vec<&Value> = dataset.records().iter().map(|r| &r.values[i]).collect();
            ColumnSchema {
                name: name.clone(),
                dtype: infer_column_type(&values),
                nullable: values.iter().any(|v| v.is_missing()),
            }
        })
        .collect();
    SchemaDefinition { columns }
}

/// Numeric values of a column, skipping missing cells.
///
/// Categorical text in the column is a schema error.
pub fn numeric_values(dataset: &Dataset, column: &str) -> Result<Vec<f64>, PipelineError> {
    let mut out = Vec::with_capacity(dataset.len());
    for (record, value) in dataset.records().iter().zip(dataset.column(column)?) {
        match value {
            Value::Number(n) => out.push(*n),
            Value::Missing => {}
            Value::Category(s) => {
                return Err(PipelineError::schema(format!(
                    "column '{column}' is not numeric: record {} holds '{s}'",
                    record.id
                )));
            }
        }
    }
    Ok(out)
}

/// Compute descriptive statistics for one column.
pub fn column_stats(dataset: &Dataset, column: &str) -> Result<ColumnStats, PipelineError> {
    let values = dataset.column(column)?;
    let dtype = infer_column_type(&values);
    let missing_count = values.iter().filter(|v| v.is_missing()).count();
    let unique_count = values
        .iter()
        .filter_map(|v| v.as_label())
        .collect::<HashSet<_>>()
        .len();

    let (min, max, mean, std_dev) = if dtype == ColumnType::Numeric {
        let nums = numeric_values(dataset, column)?;
        let summary = NumericSummary::from_values(&nums);
        (
            nums.iter().copied().reduce(f64::min),
            nums.iter().copied().reduce(f64::max),
            summary.map(|s| s.mean),
            summary.and_then(|s| s.std_dev),
        )
    } else {
        (None, None, None, None)
    };

    Ok(ColumnStats {
        name: column.to_string(),
        dtype,
        missing_count,
        unique_count,
        min,
        max,
        mean,
        std_dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn penguins() -> Dataset {
        Dataset::new(
            vec!["bill".into(), "island".into(), "empty".into()],
            vec![
                vec![39.1.into(), "Torgersen".into(), Value::Missing],
                vec![Value::Missing, "Dream".into(), Value::Missing],
                vec![46.5.into(), "Dream".into(), Value::Missing],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_infer_schema() {
        let schema = infer_schema(&penguins());
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.columns[0].dtype, ColumnType::Numeric);
        assert!(schema.columns[0].nullable);
        assert_eq!(schema.columns[1].dtype, ColumnType::Categorical);
        assert!(!schema.columns[1].nullable);
        assert_eq!(schema.column("empty").unwrap().dtype, ColumnType::Empty);
    }

    #[test]
    fn test_numeric_summary() {
        let s = NumericSummary::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.count, 8);
        assert!((s.mean - 5.0).abs() < 1e-12);
        assert!((s.std_dev.unwrap() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!(NumericSummary::from_values(&[1.0]).unwrap().std_dev.is_none());
        assert!(NumericSummary::from_values(&[]).is_none());
    }

    #[test]
    fn test_column_stats() {
        let stats = column_stats(&penguins(), "bill").unwrap();
        assert_eq!(stats.missing_count, 1);
        assert_eq!(stats.unique_count, 2);
        assert_eq!(stats.min, Some(39.1));
        assert_eq!(stats.max, Some(46.5));

        let island = column_stats(&penguins(), "island").unwrap();
        assert_eq!(island.unique_count, 2);
        assert!(island.mean.is_none());
    }

    #[test]
    fn test_numeric_values_rejects_text() {
        let err = numeric_values(&penguins(), "island").unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }
}
