//! Typed input boundary for leads arriving from callers.
//!
//! Range and enumeration checks live here rather than in the preprocessor,
//! which only validates structure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::LeadRecord;

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("company_name must not be empty")]
    EmptyCompanyName,
    #[error("{field} must be greater than 0 (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be non-negative (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },
    #[error("Industry must be one of: {}", Industry::names().join(", "))]
    UnknownIndustry(String),
}

/// Industries accepted at the input boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Logistics,
    Manufacturing,
    Retail,
    Technology,
    Finance,
}

impl Industry {
    pub const ALL: [Industry; 5] = [
        Industry::Logistics,
        Industry::Manufacturing,
        Industry::Retail,
        Industry::Technology,
        Industry::Finance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Industry::Logistics => "logistics",
            Industry::Manufacturing => "manufacturing",
            Industry::Retail => "retail",
            Industry::Technology => "technology",
            Industry::Finance => "finance",
        }
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|industry| industry.as_str()).collect()
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Industry {
    type Err = InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|industry| industry.as_str() == normalized)
            .ok_or_else(|| InputError::UnknownIndustry(value.to_string()))
    }
}

/// Lead payload as accepted from an API caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadInput {
    pub company_name: String,
    pub company_size: i64,
    pub annual_revenue: f64,
    pub num_employees: i64,
    pub industry: String,
    pub lead_source: String,
    #[serde(default)]
    pub past_interactions: i64,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
}

impl LeadInput {
    /// Check ranges and the industry enumeration, producing a modeling record.
    pub fn into_record(self) -> Result<LeadRecord, InputError> {
        if self.company_name.trim().is_empty() {
            return Err(InputError::EmptyCompanyName);
        }
        positive("company_size", self.company_size as f64)?;
        if !self.annual_revenue.is_finite() {
            return Err(InputError::NonFinite {
                field: "annual_revenue",
            });
        }
        positive("annual_revenue", self.annual_revenue)?;
        positive("num_employees", self.num_employees as f64)?;
        if self.past_interactions < 0 {
            return Err(InputError::Negative {
                field: "past_interactions",
                value: self.past_interactions as f64,
            });
        }
        let industry: Industry = self.industry.parse()?;
        Ok(LeadRecord {
            company_name: Some(self.company_name),
            company_size: Some(self.company_size as f64),
            annual_revenue: Some(self.annual_revenue),
            num_employees: Some(self.num_employees as f64),
            industry: Some(industry.as_str().to_string()),
            lead_source: Some(self.lead_source),
            past_interactions: Some(self.past_interactions as f64),
        })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), InputError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(InputError::NotPositive { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> LeadInput {
        LeadInput {
            company_name: "Acme Freight".into(),
            company_size: 500,
            annual_revenue: 2_000_000.0,
            num_employees: 480,
            industry: "Technology".into(),
            lead_source: "referral".into(),
            past_interactions: 3,
            contact_email: None,
            contact_phone: None,
        }
    }

    #[test]
    fn valid_input_lowercases_industry() {
        let record = input().into_record().unwrap();
        assert_eq!(record.industry.as_deref(), Some("technology"));
        assert_eq!(record.company_size, Some(500.0));
        assert_eq!(record.past_interactions, Some(3.0));
    }

    #[test]
    fn rejects_unknown_industry() {
        let mut lead = input();
        lead.industry = "aerospace".into();
        assert_eq!(
            lead.into_record(),
            Err(InputError::UnknownIndustry("aerospace".into()))
        );
    }

    #[test]
    fn rejects_non_positive_sizes_and_negative_interactions() {
        let mut lead = input();
        lead.company_size = 0;
        assert!(matches!(
            lead.into_record(),
            Err(InputError::NotPositive {
                field: "company_size",
                ..
            })
        ));

        let mut lead = input();
        lead.past_interactions = -1;
        assert!(matches!(
            lead.into_record(),
            Err(InputError::Negative { .. })
        ));
    }

    #[test]
    fn past_interactions_defaults_to_zero_when_omitted() {
        let json = r#"{"company_name":"Acme","company_size":10,"annual_revenue":1000.0,
            "num_employees":9,"industry":"retail","lead_source":"web"}"#;
        let lead: LeadInput = serde_json::from_str(json).unwrap();
        assert_eq!(lead.past_interactions, 0);
        assert!(lead.into_record().is_ok());
    }
}
