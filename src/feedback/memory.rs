use std::sync::Mutex;

use super::{FeedbackError, FeedbackReceipt, FeedbackRecord, FeedbackSink};

/// In-process feedback sink for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryFeedbackSink {
    records: Mutex<Vec<FeedbackRecord>>,
}

impl MemoryFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FeedbackRecord> {
        self.records
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

impl FeedbackSink for MemoryFeedbackSink {
    fn submit(&self, record: FeedbackRecord) -> Result<FeedbackReceipt, FeedbackError> {
        let receipt = FeedbackReceipt {
            feedback_id: record.feedback_id(),
        };
        self.records
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(record);
        Ok(receipt)
    }

    fn find_by_prediction(&self, prediction_ref: &str) -> Result<Vec<FeedbackRecord>, FeedbackError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .iter()
            .filter(|record| record.prediction_ref() == prediction_ref)
            .cloned()
            .collect())
    }
}
