use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{COMPANY_NAME_COLUMN, REQUIRED_COLUMNS};

/// Raw lead attributes as received; any modeling field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_size: Option<f64>,
    #[serde(default)]
    pub annual_revenue: Option<f64>,
    #[serde(default)]
    pub num_employees: Option<f64>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub lead_source: Option<String>,
    #[serde(default)]
    pub past_interactions: Option<f64>,
}

impl LeadRecord {
    /// Value of a numeric modeling column, if present.
    pub fn numeric(&self, column: &str) -> Option<f64> {
        match column {
            "company_size" => self.company_size,
            "annual_revenue" => self.annual_revenue,
            "num_employees" => self.num_employees,
            "past_interactions" => self.past_interactions,
            _ => None,
        }
    }

    /// Value of a categorical modeling column, if present.
    pub fn categorical(&self, column: &str) -> Option<&str> {
        match column {
            "industry" => self.industry.as_deref(),
            "lead_source" => self.lead_source.as_deref(),
            _ => None,
        }
    }
}

/// Rows plus the set of raw columns their source declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFrame {
    columns: BTreeSet<String>,
    rows: Vec<LeadRecord>,
}

impl LeadFrame {
    /// Build a frame from an explicit column set.
    pub fn new<I, S>(columns: I, rows: Vec<LeadRecord>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Build a frame from typed records; every modeling column counts as present.
    pub fn from_records(rows: Vec<LeadRecord>) -> Self {
        let columns = REQUIRED_COLUMNS
            .iter()
            .copied()
            .chain(std::iter::once(COMPANY_NAME_COLUMN));
        Self::new(columns, rows)
    }

    /// Single-row frame used on the serving path.
    pub fn single(record: LeadRecord) -> Self {
        Self::from_records(vec![record])
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn rows(&self) -> &[LeadRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Required columns absent from this frame, in declaration order.
    pub fn missing_columns(&self) -> Vec<&'static str> {
        REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|column| !self.columns.contains(*column))
            .collect()
    }

    /// New frame with the given rows (by index) and the same column set.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&idx| self.rows.get(idx).cloned())
                .collect(),
        }
    }
}
