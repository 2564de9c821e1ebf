//! CSV loader for labeled lead datasets.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use super::{COMPANY_NAME_COLUMN, LABEL_COLUMN, LeadFrame, LeadRecord};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing label column `{0}`")]
    MissingLabel(&'static str),
    #[error("invalid label {value:?} on data row {row}")]
    InvalidLabel { row: usize, value: String },
}

/// Feature frame plus the aligned conversion labels.
#[derive(Debug, Clone)]
pub struct LabeledFrame {
    pub features: LeadFrame,
    pub labels: Vec<bool>,
}

/// Load a labeled CSV dataset from disk.
pub fn load_csv(path: &Path) -> Result<LabeledFrame, DatasetError> {
    let file = std::fs::File::open(path)?;
    let loaded = read_csv(file)?;
    debug!(
        "Loaded {} leads from {}",
        loaded.features.len(),
        path.display()
    );
    Ok(loaded)
}

/// Parse a labeled CSV dataset from any reader.
///
/// Empty or unparsable feature cells become missing values; the label column
/// must exist and every label must parse.
pub fn read_csv<R: Read>(reader: R) -> Result<LabeledFrame, DatasetError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name, idx))
        .collect();
    let label_idx = *index
        .get(LABEL_COLUMN)
        .ok_or(DatasetError::MissingLabel(LABEL_COLUMN))?;

    let mut rows = Vec::new();
    let mut labels = Vec::new();
    let mut unparsable = 0usize;
    for (row_idx, result) in rdr.records().enumerate() {
        let record = result?;
        let cell = |column: &str| {
            index
                .get(column)
                .and_then(|&idx| record.get(idx))
                .filter(|value| !value.is_empty())
        };
        let mut number = |column: &str| {
            let raw = cell(column)?;
            match raw.parse::<f64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    unparsable += 1;
                    None
                }
            }
        };
        let lead = LeadRecord {
            company_size: number("company_size"),
            annual_revenue: number("annual_revenue"),
            num_employees: number("num_employees"),
            past_interactions: number("past_interactions"),
            company_name: cell(COMPANY_NAME_COLUMN).map(str::to_string),
            industry: cell("industry").map(str::to_string),
            lead_source: cell("lead_source").map(str::to_string),
        };
        let raw_label = record.get(label_idx).unwrap_or("");
        let label = parse_label(raw_label).ok_or_else(|| DatasetError::InvalidLabel {
            row: row_idx + 1,
            value: raw_label.to_string(),
        })?;
        rows.push(lead);
        labels.push(label);
    }
    if unparsable > 0 {
        warn!("{unparsable} numeric cells could not be parsed and will be imputed");
    }

    let columns = headers
        .iter()
        .filter(|name| *name != LABEL_COLUMN)
        .map(str::to_string)
        .collect::<Vec<_>>();
    Ok(LabeledFrame {
        features: LeadFrame::new(columns, rows),
        labels,
    })
}

fn parse_label(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" => Some(true),
        "0" | "0.0" | "false" | "no" => Some(false),
        _ => None,
    }
}
