mod support;

use std::sync::Arc;

use leadscore::config::{self, ScoringConfig};
use leadscore::feedback::{
    FeedbackError, FeedbackInput, FeedbackSink, JsonlFeedbackLog, MemoryFeedbackSink,
};
use leadscore::scoring::{LeadScorer, ScoreRequest};
use leadscore::storage::{ArtifactStore, MemoryArtifactStore};
use leadscore::training::ModelTrainer;
use support::leadscore_env::LeadscoreEnvGuard;
use support::synthetic::{concrete_lead, synthetic_leads};
use tempfile::tempdir;

fn feedback_for(reference: &str, score: f64, rating: u8) -> FeedbackInput {
    FeedbackInput {
        lead_id: reference.to_string(),
        prediction_score: score,
        actual_outcome: true,
        feedback_notes: Some("signed after the demo".into()),
        accuracy_rating: rating,
        submitted_by: "sales-ops".into(),
    }
}

#[test]
fn feedback_is_tied_to_a_served_prediction() {
    let dir = tempdir().unwrap();
    let _env = LeadscoreEnvGuard::set_home(dir.path().to_path_buf());
    let config = config::load_or_default().unwrap();

    let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
    let (frame, labels) = synthetic_leads(150, 21);
    ModelTrainer::new(Arc::clone(&store), config.clone())
        .train(&frame, &labels)
        .unwrap();
    let outcome = LeadScorer::new(store, &config)
        .score(&concrete_lead(), &ScoreRequest::default())
        .unwrap();
    let prediction = outcome.result().expect("scored").clone();

    let log_path = config.resolve_feedback_log().unwrap();
    assert!(log_path.starts_with(dir.path()));
    let log = JsonlFeedbackLog::open(&log_path).unwrap();
    let reference = prediction.prediction_id.to_string();
    let record = feedback_for(&reference, prediction.score, 4)
        .validate()
        .unwrap();
    let receipt = log.submit(record).unwrap();

    let found = log.find_by_prediction(&reference).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].feedback_id(), receipt.feedback_id);
    assert_eq!(found[0].prediction_score(), prediction.score);
    assert_eq!(found[0].accuracy_rating().get(), 4);
    assert!(log.find_by_prediction("unrelated").unwrap().is_empty());
}

#[test]
fn out_of_range_ratings_never_reach_the_sink() {
    let sink = MemoryFeedbackSink::new();
    for rating in [0u8, 6] {
        let err = feedback_for("lead-1", 0.4, rating).validate().unwrap_err();
        assert!(matches!(err, FeedbackError::InvalidRating(r) if r == rating));
    }
    let json = r#"{"lead_id":"lead-1","prediction_score":0.4,"actual_outcome":false,
        "accuracy_rating":9,"submitted_by":"ops"}"#;
    let input: FeedbackInput = serde_json::from_str(json).unwrap();
    assert!(input.validate().is_err());
    assert!(sink.records().is_empty());

    let accepted = feedback_for("lead-1", 0.4, 1).validate().unwrap();
    sink.submit(accepted).unwrap();
    assert_eq!(sink.records().len(), 1);
}

#[test]
fn concurrent_appends_are_all_durable() {
    let dir = tempdir().unwrap();
    let log = JsonlFeedbackLog::open(dir.path().join("nested").join("feedback.jsonl")).unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let log = &log;
            scope.spawn(move || {
                for i in 0..25 {
                    let reference = format!("lead-{worker}-{i}");
                    let record = feedback_for(&reference, 0.6, 3).validate().unwrap();
                    log.submit(record).unwrap();
                }
            });
        }
    });

    let reopened = JsonlFeedbackLog::open(log.path()).unwrap();
    let records = reopened.read_all().unwrap();
    assert_eq!(records.len(), 100);
    assert_eq!(reopened.find_by_prediction("lead-2-7").unwrap().len(), 1);
}

#[test]
fn config_file_under_home_override_is_honored() {
    let dir = tempdir().unwrap();
    let _env = LeadscoreEnvGuard::set_home(dir.path().to_path_buf());
    let custom = ScoringConfig {
        review_threshold: 0.8,
        feedback_log: Some(dir.path().join("custom.jsonl")),
        ..ScoringConfig::default()
    };
    config::save_to_path(&custom, &config::config_path().unwrap()).unwrap();

    let loaded = config::load_or_default().unwrap();
    assert_eq!(loaded, custom);
    assert_eq!(
        loaded.resolve_feedback_log().unwrap(),
        dir.path().join("custom.jsonl")
    );
}
