use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use super::{FeedbackError, FeedbackReceipt, FeedbackRecord, FeedbackSink};

/// Feedback sink appending one JSON object per line to a file.
///
/// Every append is synced before it is acknowledged. Appends from this
/// process are serialized by an internal lock.
#[derive(Debug)]
pub struct JsonlFeedbackLog {
    path: PathBuf,
    append: Mutex<()>,
}

impl JsonlFeedbackLog {
    /// Open (creating parent directories) a log at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FeedbackError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| FeedbackError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(Self {
            path,
            append: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every readable record in the log, in append order.
    ///
    /// Lines that fail to parse (for example a torn final write) are skipped.
    pub fn read_all(&self) -> Result<Vec<FeedbackRecord>, FeedbackError> {
        let io_err = |source: std::io::Error| FeedbackError::Io {
            path: self.path.clone(),
            source,
        };
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(err)),
        };
        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedbackRecord>(&line) {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    "Skipping unreadable feedback line {} in {}: {err}",
                    line_no + 1,
                    self.path.display()
                ),
            }
        }
        Ok(records)
    }
}

impl FeedbackSink for JsonlFeedbackLog {
    fn submit(&self, record: FeedbackRecord) -> Result<FeedbackReceipt, FeedbackError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let io_err = |source: std::io::Error| FeedbackError::Io {
            path: self.path.clone(),
            source,
        };
        let _guard = self.append.lock().unwrap_or_else(|err| err.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        if ends_mid_line(&mut file).map_err(io_err)? {
            warn!("Terminating a torn line in {}", self.path.display());
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes()).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;
        info!(
            "Recorded feedback {} for prediction {} (outcome {}, rating {})",
            record.feedback_id(),
            record.prediction_ref(),
            record.actual_outcome(),
            record.accuracy_rating()
        );
        Ok(FeedbackReceipt {
            feedback_id: record.feedback_id(),
        })
    }

    fn find_by_prediction(&self, prediction_ref: &str) -> Result<Vec<FeedbackRecord>, FeedbackError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|record| record.prediction_ref() == prediction_ref)
            .collect())
    }
}

/// Whether the last byte of a non-empty file is something other than `\n`.
fn ends_mid_line(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackInput;
    use tempfile::tempdir;

    fn record(reference: &str, rating: u8) -> FeedbackRecord {
        FeedbackInput {
            lead_id: reference.into(),
            prediction_score: 0.4,
            actual_outcome: false,
            feedback_notes: None,
            accuracy_rating: rating,
            submitted_by: "reviewer".into(),
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn appends_are_durable_and_queryable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback").join("feedback.jsonl");
        let log = JsonlFeedbackLog::open(&path).unwrap();
        let first = log.submit(record("a", 4)).unwrap();
        log.submit(record("b", 2)).unwrap();
        log.submit(record("a", 1)).unwrap();

        let reopened = JsonlFeedbackLog::open(&path).unwrap();
        let found = reopened.find_by_prediction("a").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].feedback_id(), first.feedback_id);
        assert_eq!(found[1].accuracy_rating().get(), 1);
        assert_eq!(reopened.read_all().unwrap().len(), 3);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let log = JsonlFeedbackLog::open(dir.path().join("none.jsonl")).unwrap();
        assert!(log.find_by_prediction("a").unwrap().is_empty());
    }

    #[test]
    fn torn_line_is_skipped_and_later_appends_survive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let log = JsonlFeedbackLog::open(&path).unwrap();
        log.submit(record("a", 3)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"feedback_id\":").unwrap();
        assert_eq!(log.read_all().unwrap().len(), 1);

        let after = log.submit(record("b", 4)).unwrap();
        let found = log.find_by_prediction("b").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].feedback_id(), after.feedback_id);
        assert_eq!(log.read_all().unwrap().len(), 2);
    }
}
