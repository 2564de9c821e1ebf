use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::PreprocessError;
use crate::dataset::{CATEGORICAL_COLUMNS, LeadFrame, LeadRecord, NUMERIC_COLUMNS, REQUIRED_COLUMNS};

/// Raw columns consumed and processed feature names produced, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub raw_columns: Vec<String>,
    pub feature_names: Vec<String>,
}

impl FeatureSchema {
    pub fn width(&self) -> usize {
        self.feature_names.len()
    }
}

/// Median imputation followed by standard scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericState {
    pub column: String,
    pub median: f64,
    pub mean: f64,
    pub scale: f64,
}

/// Most-frequent imputation followed by one-hot expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalState {
    pub column: String,
    /// `None` when the column had no values at fit time.
    pub most_frequent: Option<String>,
    /// Sorted categories seen at fit time; one indicator each.
    pub categories: Vec<String>,
}

/// Fitted impute, encode and scale pipeline.
///
/// Output layout is the scaled numeric columns followed by the one-hot
/// segments. Categories unseen at fit time encode as an all-zero segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransform {
    schema: FeatureSchema,
    numeric: Vec<NumericState>,
    categorical: Vec<CategoricalState>,
}

impl FittedTransform {
    /// Derive imputation, scaling and category state from training rows.
    pub fn fit(frame: &LeadFrame) -> Result<Self, PreprocessError> {
        let rows = frame.rows();
        let mut numeric = Vec::with_capacity(NUMERIC_COLUMNS.len());
        for column in NUMERIC_COLUMNS {
            let mut present = Vec::with_capacity(rows.len());
            for (row, record) in rows.iter().enumerate() {
                match record.numeric(column) {
                    Some(v) if v.is_infinite() => {
                        return Err(PreprocessError::NonFinite { column, row });
                    }
                    Some(v) if !v.is_nan() => present.push(v),
                    _ => {}
                }
            }
            let median = median(&mut present).unwrap_or(0.0);
            let imputed: Vec<f64> = rows
                .iter()
                .map(|record| {
                    record
                        .numeric(column)
                        .filter(|v| !v.is_nan())
                        .unwrap_or(median)
                })
                .collect();
            let (mean, std) = mean_std(&imputed);
            let scale = if std > 0.0 && std.is_finite() { std } else { 1.0 };
            numeric.push(NumericState {
                column: column.to_string(),
                median,
                mean,
                scale,
            });
        }

        let mut categorical = Vec::with_capacity(CATEGORICAL_COLUMNS.len());
        for column in CATEGORICAL_COLUMNS {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for record in rows {
                if let Some(value) = normalize_category(record.categorical(column)) {
                    *counts.entry(value).or_insert(0) += 1;
                }
            }
            // BTreeMap order plus strict `>` keeps the smallest value on ties.
            let mut most_frequent: Option<(&String, usize)> = None;
            for (value, &count) in &counts {
                if most_frequent.is_none_or(|(_, best)| count > best) {
                    most_frequent = Some((value, count));
                }
            }
            categorical.push(CategoricalState {
                column: column.to_string(),
                most_frequent: most_frequent.map(|(value, _)| value.clone()),
                categories: counts.keys().cloned().collect(),
            });
        }

        let feature_names = numeric
            .iter()
            .map(|state| state.column.clone())
            .chain(categorical.iter().flat_map(|state| {
                state
                    .categories
                    .iter()
                    .map(move |category| format!("{}_{category}", state.column))
            }))
            .collect();
        Ok(Self {
            schema: FeatureSchema {
                raw_columns: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
                feature_names,
            },
            numeric,
            categorical,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn feature_names(&self) -> &[String] {
        &self.schema.feature_names
    }

    pub fn numeric_states(&self) -> &[NumericState] {
        &self.numeric
    }

    pub fn categorical_states(&self) -> &[CategoricalState] {
        &self.categorical
    }

    /// Encode every row of `frame`.
    pub fn transform(&self, frame: &LeadFrame) -> Result<Vec<Vec<f64>>, PreprocessError> {
        frame
            .rows()
            .iter()
            .enumerate()
            .map(|(row, record)| self.encode(record, row))
            .collect()
    }

    /// Encode one record; infinite numeric values are rejected.
    pub fn transform_record(&self, record: &LeadRecord) -> Result<Vec<f64>, PreprocessError> {
        self.encode(record, 0)
    }

    fn encode(&self, record: &LeadRecord, row: usize) -> Result<Vec<f64>, PreprocessError> {
        let mut out = Vec::with_capacity(self.schema.width());
        for (state, column) in self.numeric.iter().zip(NUMERIC_COLUMNS) {
            let value = match record.numeric(column) {
                Some(v) if v.is_infinite() => {
                    return Err(PreprocessError::NonFinite { column, row });
                }
                Some(v) if !v.is_nan() => v,
                _ => state.median,
            };
            out.push((value - state.mean) / state.scale);
        }
        for (state, column) in self.categorical.iter().zip(CATEGORICAL_COLUMNS) {
            let value = normalize_category(record.categorical(column))
                .or_else(|| state.most_frequent.clone());
            for category in &state.categories {
                let hot = value.as_deref() == Some(category.as_str());
                out.push(if hot { 1.0 } else { 0.0 });
            }
        }
        Ok(out)
    }
}

fn normalize_category(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_lowercase())
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Mean and population standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
