//! Preprocessing: centering/scaling and one-hot encoding fit on training data only.
//!
//! A [`FittedTransform`] is produced from the training side of one split and
//! then applied, unchanged, to both sides. `apply` takes `&self`, so nothing
//! seen at apply time can leak back into the fitted statistics.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::PreprocessConfig;
use crate::data::dataset::{Dataset, Record, RecordId, Value};
use crate::data::schema::{NumericSummary, numeric_values};
use crate::error::PipelineError;

/// What to do with a categorical value absent from the fitted vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnseenCategoryPolicy {
    /// Route it to a dedicated `<column>__unknown` indicator.
    #[default]
    Unknown,
    /// Fail with [`PipelineError::UnseenCategory`].
    Reject,
}

/// What to do with a missing cell in a declared feature column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Numeric: training mean. Categorical: the unknown bucket.
    #[default]
    Impute,
    /// Fail with [`PipelineError::MissingValue`].
    Reject,
}

/// Declared feature columns plus the policies used when fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    #[serde(default)]
    pub unseen_category: UnseenCategoryPolicy,
    #[serde(default)]
    pub missing_values: MissingValuePolicy,
}

impl Preprocessor {
    pub fn new(numeric_columns: &[&str], categorical_columns: &[&str]) -> Self {
        Self {
            numeric_columns: numeric_columns.iter().map(|c| c.to_string()).collect(),
            categorical_columns: categorical_columns.iter().map(|c| c.to_string()).collect(),
            unseen_category: UnseenCategoryPolicy::default(),
            missing_values: MissingValuePolicy::default(),
        }
    }

    pub fn with_policies(mut self, config: &PreprocessConfig) -> Self {
        self.unseen_category = config.unseen_category;
        self.missing_values = config.missing_values;
        self
    }

    /// Fit scaling statistics and vocabularies from `training`.
    pub fn fit(&self, training: &Dataset) -> Result<FittedTransform, PipelineError> {
        let mut declared = HashSet::new();
        for column in self.numeric_columns.iter().chain(&self.categorical_columns) {
            if !declared.insert(column.as_str()) {
                return Err(PipelineError::invalid_configuration(format!(
                    "column '{column}' declared more than once"
                )));
            }
        }

        let mut numeric = Vec::with_capacity(self.numeric_columns.len());
        for column in &self.numeric_columns {
            let values = numeric_values(training, column)?;
            let scaling = match NumericSummary::from_values(&values) {
                Some(summary) => NumericScaling {
                    column: column.clone(),
                    mean: summary.mean,
                    scale: summary
                        .std_dev
                        .filter(|sd| *sd > f64::EPSILON)
                        .unwrap_or(1.0),
                },
                None => {
                    tracing::warn!(column = %column, "no observed values in training data");
                    NumericScaling {
                        column: column.clone(),
                        mean: 0.0,
                        scale: 1.0,
                    }
                }
            };
            numeric.push(scaling);
        }

        let categorical = self
            .categorical_columns
            .iter()
            .map(|column| {
                Ok(CategoryVocabulary {
                    column: column.clone(),
                    levels: training.categories(column)?,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let fitted = FittedTransform {
            numeric,
            categorical,
            unseen_category: self.unseen_category,
            missing_values: self.missing_values,
        };

        let mut produced = HashSet::new();
        for name in fitted.output_columns(training.columns()) {
            if !produced.insert(name.clone()) {
                return Err(PipelineError::schema(format!(
                    "encoded column '{name}' collides with another column; \
                     rename the category level or the column"
                )));
            }
        }

        tracing::debug!(
            rows = training.len(),
            numeric = fitted.numeric.len(),
            categorical = fitted.categorical.len(),
            "fitted preprocessor"
        );
        Ok(fitted)
    }
}

/// Fit a transform with the default policies.
pub fn fit_preprocessor(
    training: &Dataset,
    numeric_columns: &[&str],
    categorical_columns: &[&str],
) -> Result<FittedTransform, PipelineError> {
    Preprocessor::new(numeric_columns, categorical_columns).fit(training)
}

/// Centering/scaling statistics for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaling {
    pub column: String,
    pub mean: f64,
    /// Sample standard deviation, or 1.0 when it is zero or undefined.
    pub scale: f64,
}

/// Categories observed in training for one column, sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub column: String,
    pub levels: Vec<String>,
}

impl CategoryVocabulary {
    fn indicator_names(&self, policy: UnseenCategoryPolicy) -> Vec<String> {
        let mut names: Vec<String> = self
            .levels
            .iter()
            .map(|level| format!("{}_{}", self.column, level))
            .collect();
        if policy == UnseenCategoryPolicy::Unknown {
            names.push(format!("{}__unknown", self.column));
        }
        names
    }
}

/// A fitted, immutable preprocessing transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransform {
    pub numeric: Vec<NumericScaling>,
    pub categorical: Vec<CategoryVocabulary>,
    pub unseen_category: UnseenCategoryPolicy,
    pub missing_values: MissingValuePolicy,
}

enum ColumnPlan<'a> {
    Scale(&'a NumericScaling),
    Encode(&'a CategoryVocabulary),
    Keep,
}

impl FittedTransform {
    /// Names of the model-facing feature columns produced by [`apply`](Self::apply).
    pub fn feature_names(&self) -> Vec<String> {
        self.numeric
            .iter()
            .map(|n| n.column.clone())
            .chain(
                self.categorical
                    .iter()
                    .flat_map(|c| c.indicator_names(self.unseen_category)),
            )
            .collect()
    }

    /// Columns `apply` produces for a dataset with the given input columns.
    fn output_columns(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .flat_map(|name| match self.categorical.iter().find(|c| &c.column == name) {
                Some(vocab) => vocab.indicator_names(self.unseen_category),
                None => vec![name.clone()],
            })
            .collect()
    }

    /// Apply the transform. Undeclared columns pass through untouched.
    pub fn apply(&self, dataset: &Dataset) -> Result<Dataset, PipelineError> {
        for column in self
            .numeric
            .iter()
            .map(|n| &n.column)
            .chain(self.categorical.iter().map(|c| &c.column))
        {
            dataset.column_index(column)?;
        }

        let plans: Vec<ColumnPlan<'_>> = dataset
            .columns()
            .iter()
            .map(|name| {
                if let Some(n) = self.numeric.iter().find(|n| &n.column == name) {
                    ColumnPlan::Scale(n)
                } else if let Some(c) = self.categorical.iter().find(|c| &c.column == name) {
                    ColumnPlan::Encode(c)
                } else {
                    ColumnPlan::Keep
                }
            })
            .collect();

        let columns = self.output_columns(dataset.columns());

        let records = dataset
            .records()
            .iter()
            .map(|record| {
                let mut values = Vec::with_capacity(columns.len());
                for (value, plan) in record.values.iter().zip(&plans) {
                    match plan {
                        ColumnPlan::Scale(s) => values.push(self.scale(s, value, record.id)?),
                        ColumnPlan::Encode(v) => {
                            values.extend(self.encode(v, value, record.id)?)
                        }
                        ColumnPlan::Keep => values.push(value.clone()),
                    }
                }
                Ok(Record {
                    id: record.id,
                    values,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        Dataset::from_records(columns, records)
    }

    /// Apply the transform and extract the numeric feature matrix.
    pub fn transform_features(&self, dataset: &Dataset) -> Result<FeatureMatrix, PipelineError> {
        let transformed = self.apply(dataset)?;
        FeatureMatrix::from_dataset(&transformed, &self.feature_names())
    }

    fn scale(
        &self,
        scaling: &NumericScaling,
        value: &Value,
        record: RecordId,
    ) -> Result<Value, PipelineError> {
        match value {
            Value::Number(x) => Ok(Value::Number((x - scaling.mean) / scaling.scale)),
            Value::Missing => match self.missing_values {
                MissingValuePolicy::Impute => Ok(Value::Number(0.0)),
                MissingValuePolicy::Reject => {
                    Err(PipelineError::missing_value(&scaling.column, record))
                }
            },
            Value::Category(s) => Err(PipelineError::schema(format!(
                "column '{}' is not numeric: record {record} holds '{s}'",
                scaling.column
            ))),
        }
    }

    fn encode(
        &self,
        vocab: &CategoryVocabulary,
        value: &Value,
        record: RecordId,
    ) -> Result<Vec<Value>, PipelineError> {
        let width = vocab.levels.len()
            + usize::from(self.unseen_category == UnseenCategoryPolicy::Unknown);
        let mut indicators = vec![Value::Number(0.0); width];

        let hot = match value.as_label() {
            Some(label) => match vocab.levels.binary_search(&label) {
                Ok(idx) => idx,
                Err(_) => match self.unseen_category {
                    UnseenCategoryPolicy::Unknown => vocab.levels.len(),
                    UnseenCategoryPolicy::Reject => {
                        return Err(PipelineError::unseen_category(&vocab.column, label));
                    }
                },
            },
            None => match (self.missing_values, self.unseen_category) {
                (MissingValuePolicy::Impute, UnseenCategoryPolicy::Unknown) => vocab.levels.len(),
                _ => return Err(PipelineError::missing_value(&vocab.column, record)),
            },
        };
        indicators[hot] = Value::Number(1.0);
        Ok(indicators)
    }
}

/// Dense numeric features, one row per record, ready for a learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub ids: Vec<RecordId>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Extract `feature_names` from an all-numeric dataset.
    pub fn from_dataset(dataset: &Dataset, feature_names: &[String]) -> Result<Self, PipelineError> {
        let indices = feature_names
            .iter()
            .map(|name| dataset.column_index(name))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = dataset
            .records()
            .iter()
            .map(|record| {
                indices
                    .iter()
                    .zip(feature_names)
                    .map(|(&i, name)| match &record.values[i] {
                        Value::Number(x) => Ok(*x),
                        Value::Missing => Err(PipelineError::missing_value(name, record.id)),
                        Value::Category(s) => Err(PipelineError::schema(format!(
                            "feature '{name}' is not numeric: record {} holds '{s}'",
                            record.id
                        ))),
                    })
                    .collect::<Result<Vec<f64>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            feature_names: feature_names.to_vec(),
            ids: dataset.ids(),
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.feature_names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn training() -> Dataset {
        Dataset::new(
            vec!["bill".into(), "island".into(), "species".into()],
            vec![
                vec![39.0.into(), "Torgersen".into(), "Adelie".into()],
                vec![41.0.into(), "Dream".into(), "Adelie".into()],
                vec![47.0.into(), "Biscoe".into(), "Gentoo".into()],
                vec![49.0.into(), "Biscoe".into(), "Gentoo".into()],
            ],
        )
        .unwrap()
    }

    fn unseen() -> Dataset {
        Dataset::new(
            vec!["bill".into(), "island".into(), "species".into()],
            vec![
                vec![100.0.into(), "Anvers".into(), "Chinstrap".into()],
                vec![Value::Missing, Value::Missing, "Adelie".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_training_is_standardized() {
        let ds = training();
        let transform = fit_preprocessor(&ds, &["bill"], &["island"]).unwrap();
        let features = transform.transform_features(&ds).unwrap();
        let col: Vec<f64> = features.rows.iter().map(|r| r[0]).collect();
        let summary = NumericSummary::from_values(&col).unwrap();
        assert!(summary.mean.abs() < 1e-12);
        assert!((summary.std_dev.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_one_hot_columns_and_passthrough() {
        let ds = training();
        let transform = fit_preprocessor(&ds, &["bill"], &["island"]).unwrap();
        let out = transform.apply(&ds).unwrap();
        assert_eq!(
            out.columns(),
            &[
                "bill",
                "island_Biscoe",
                "island_Dream",
                "island_Torgersen",
                "island__unknown",
                "species"
            ]
        );
        assert_eq!(out.records()[1].values[2], Value::Number(1.0));
        assert_eq!(out.records()[1].values[5], Value::Category("Adelie".into()));
        assert_eq!(out.ids(), ds.ids());
    }

    #[test]
    fn test_unseen_and_missing_go_to_unknown_bucket() {
        let transform = fit_preprocessor(&training(), &["bill"], &["island"]).unwrap();
        let features = transform.transform_features(&unseen()).unwrap();
        // bill, Biscoe, Dream, Torgersen, unknown
        assert_eq!(features.rows[0][1..], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(features.rows[1][0], 0.0);
        assert_eq!(features.rows[1][4], 1.0);
    }

    #[test]
    fn test_reject_policies() {
        let config = PreprocessConfig {
            unseen_category: UnseenCategoryPolicy::Reject,
            missing_values: MissingValuePolicy::Impute,
        };
        let transform = Preprocessor::new(&["bill"], &["island"])
            .with_policies(&config)
            .fit(&training())
            .unwrap();
        assert!(!transform.feature_names().contains(&"island__unknown".to_string()));
        let err = transform.apply(&unseen()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnseenCategory { ref column, ref value } if column == "island" && value == "Anvers"
        ));

        let config = PreprocessConfig {
            unseen_category: UnseenCategoryPolicy::Unknown,
            missing_values: MissingValuePolicy::Reject,
        };
        let transform = Preprocessor::new(&["bill"], &["island"])
            .with_policies(&config)
            .fit(&training())
            .unwrap();
        let err = transform.apply(&unseen()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingValue { record: 1, .. }));
    }

    #[test]
    fn test_apply_does_not_touch_fitted_statistics() {
        let transform = fit_preprocessor(&training(), &["bill"], &["island"]).unwrap();
        let before = transform.clone();
        transform.apply(&unseen()).unwrap();
        assert_eq!(transform, before);
        assert_eq!(transform.numeric[0].mean, 44.0);
    }

    #[test]
    fn test_missing_declared_column() {
        let err = fit_preprocessor(&training(), &["flipper"], &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));

        let transform = fit_preprocessor(&training(), &["bill"], &[]).unwrap();
        let other = Dataset::new(vec!["species".into()], vec![vec!["Adelie".into()]]).unwrap();
        assert!(matches!(
            transform.apply(&other).unwrap_err(),
            PipelineError::Schema(_)
        ));
    }

    #[test]
    fn test_text_in_numeric_column() {
        let err = fit_preprocessor(&training(), &["island"], &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_constant_column_is_centered_only() {
        let ds = Dataset::new(
            vec!["x".into()],
            vec![vec![5.0.into()], vec![5.0.into()]],
        )
        .unwrap();
        let transform = fit_preprocessor(&ds, &["x"], &[]).unwrap();
        assert_eq!(transform.numeric[0].scale, 1.0);
        let features = transform.transform_features(&ds).unwrap();
        assert_eq!(features.rows, vec![vec![0.0], vec![0.0]]);
    }

    #[test]
    fn test_level_named_unknown_keeps_its_own_column() {
        let ds = Dataset::new(
            vec!["x".into(), "status".into()],
            vec![
                vec![1.0.into(), "known".into()],
                vec![2.0.into(), "unknown".into()],
                vec![3.0.into(), "unknown".into()],
            ],
        )
        .unwrap();
        let transform = fit_preprocessor(&ds, &["x"], &["status"]).unwrap();
        let out = transform.apply(&ds).unwrap();
        assert_eq!(
            out.columns(),
            &["x", "status_known", "status_unknown", "status__unknown"]
        );
        let features = transform.transform_features(&ds).unwrap();
        assert_eq!(features.rows[1][1..], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_indicator_colliding_with_column_is_rejected() {
        let ds = Dataset::new(
            vec!["site".into(), "site_a".into()],
            vec![vec!["a".into(), 1.0.into()], vec!["b".into(), 2.0.into()]],
        )
        .unwrap();
        let err = fit_preprocessor(&ds, &["site_a"], &["site"]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(ref msg) if msg.contains("site_a")));
    }
}
