//! Human feedback on past predictions.
//!
//! Feedback enters through [`FeedbackInput::validate`], which produces an
//! immutable [`FeedbackRecord`]. Sinks append records and can return them by
//! prediction reference; nothing is ever rewritten.

mod jsonl;
mod memory;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use jsonl::JsonlFeedbackLog;
pub use memory::MemoryFeedbackSink;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("accuracy_rating must be between 1 and 5 (got {0})")]
    InvalidRating(u8),
    #[error("prediction_score must be within [0, 1] (got {0})")]
    ScoreOutOfRange(f64),
    #[error("prediction reference must not be empty")]
    EmptyReference,
    #[error("submitter must not be empty")]
    EmptySubmitter,
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reviewer rating of prediction accuracy, 1 (poor) to 5 (excellent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AccuracyRating(u8);

impl AccuracyRating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, FeedbackError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(FeedbackError::InvalidRating(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for AccuracyRating {
    type Error = FeedbackError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccuracyRating> for u8 {
    fn from(rating: AccuracyRating) -> Self {
        rating.0
    }
}

impl fmt::Display for AccuracyRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

/// Feedback payload as accepted from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackInput {
    /// Prediction id (or lead id) the feedback refers to.
    pub lead_id: String,
    pub prediction_score: f64,
    pub actual_outcome: bool,
    #[serde(default)]
    pub feedback_notes: Option<String>,
    pub accuracy_rating: u8,
    pub submitted_by: String,
}

impl FeedbackInput {
    /// Check ranges and stamp an id and submission time.
    pub fn validate(self) -> Result<FeedbackRecord, FeedbackError> {
        let prediction_ref = self.lead_id.trim();
        if prediction_ref.is_empty() {
            return Err(FeedbackError::EmptyReference);
        }
        if !(0.0..=1.0).contains(&self.prediction_score) {
            return Err(FeedbackError::ScoreOutOfRange(self.prediction_score));
        }
        let accuracy_rating = AccuracyRating::new(self.accuracy_rating)?;
        let submitted_by = self.submitted_by.trim();
        if submitted_by.is_empty() {
            return Err(FeedbackError::EmptySubmitter);
        }
        Ok(FeedbackRecord {
            feedback_id: Uuid::new_v4(),
            prediction_ref: prediction_ref.to_string(),
            prediction_score: self.prediction_score,
            actual_outcome: self.actual_outcome,
            accuracy_rating,
            notes: self.feedback_notes.filter(|notes| !notes.trim().is_empty()),
            submitted_by: submitted_by.to_string(),
            submitted_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        })
    }
}

/// Validated, append-only feedback entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    feedback_id: Uuid,
    prediction_ref: String,
    prediction_score: f64,
    actual_outcome: bool,
    accuracy_rating: AccuracyRating,
    #[serde(default)]
    notes: Option<String>,
    submitted_by: String,
    submitted_at: i64,
}

impl FeedbackRecord {
    pub fn feedback_id(&self) -> Uuid {
        self.feedback_id
    }

    pub fn prediction_ref(&self) -> &str {
        &self.prediction_ref
    }

    pub fn prediction_score(&self) -> f64 {
        self.prediction_score
    }

    pub fn actual_outcome(&self) -> bool {
        self.actual_outcome
    }

    pub fn accuracy_rating(&self) -> AccuracyRating {
        self.accuracy_rating
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn submitted_by(&self) -> &str {
        &self.submitted_by
    }

    /// Unix timestamp (seconds, UTC).
    pub fn submitted_at(&self) -> i64 {
        self.submitted_at
    }

    /// Whether the thresholded prediction agreed with the observed outcome.
    pub fn prediction_was_correct(&self) -> bool {
        (self.prediction_score > 0.5) == self.actual_outcome
    }
}

/// Acknowledgment returned for an accepted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReceipt {
    pub feedback_id: Uuid,
}

/// Durable append-only destination for feedback.
pub trait FeedbackSink: Send + Sync {
    /// Append `record`; accepted records are never rejected for content.
    fn submit(&self, record: FeedbackRecord) -> Result<FeedbackReceipt, FeedbackError>;

    /// Every record submitted for `prediction_ref`, in submission order.
    fn find_by_prediction(&self, prediction_ref: &str) -> Result<Vec<FeedbackRecord>, FeedbackError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> FeedbackInput {
        FeedbackInput {
            lead_id: "3f2a".into(),
            prediction_score: 0.82,
            actual_outcome: true,
            feedback_notes: Some("closed in two weeks".into()),
            accuracy_rating: 5,
            submitted_by: "sales-ops".into(),
        }
    }

    #[test]
    fn valid_input_becomes_record() {
        let record = input().validate().unwrap();
        assert_eq!(record.prediction_ref(), "3f2a");
        assert_eq!(record.accuracy_rating().get(), 5);
        assert!(record.prediction_was_correct());
        assert_eq!(record.notes(), Some("closed in two weeks"));
    }

    #[test]
    fn rating_outside_one_to_five_is_rejected() {
        for rating in [0u8, 6] {
            let mut bad = input();
            bad.accuracy_rating = rating;
            assert!(matches!(
                bad.validate(),
                Err(FeedbackError::InvalidRating(r)) if r == rating
            ));
        }
        assert!(serde_json::from_str::<AccuracyRating>("6").is_err());
        assert_eq!(serde_json::from_str::<AccuracyRating>("3").unwrap().get(), 3);
    }

    #[test]
    fn score_and_identity_are_checked() {
        let mut bad = input();
        bad.prediction_score = 1.2;
        assert!(matches!(bad.validate(), Err(FeedbackError::ScoreOutOfRange(_))));
        let mut bad = input();
        bad.lead_id = "  ".into();
        assert!(matches!(bad.validate(), Err(FeedbackError::EmptyReference)));
        let mut bad = input();
        bad.submitted_by = String::new();
        assert!(matches!(bad.validate(), Err(FeedbackError::EmptySubmitter)));
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = input().validate().unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"accuracy_rating\":5"));
        let restored: FeedbackRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, record);
    }
}
