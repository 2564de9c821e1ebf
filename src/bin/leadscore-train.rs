//! Developer utility to train, select and publish a lead scoring model.

use std::path::PathBuf;
use std::sync::Arc;

use leadscore::config::{self, ScoringConfig, SelectionRule};
use leadscore::dataset::LabeledFrame;
use leadscore::logging::{self, LogOptions};
use leadscore::storage::FsArtifactStore;
use leadscore::training::ModelTrainer;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let log_options = if options.quiet {
        LogOptions::file_only()
    } else {
        LogOptions::default()
    };
    if let Err(err) = logging::init(&log_options) {
        eprintln!("Logging unavailable: {err}");
    }
    let mut config = match &options.config {
        Some(path) => config::load_from(path),
        None => config::load_or_default(),
    }
    .map_err(|err| err.to_string())?;
    if let Some(dir) = &options.artifact_dir {
        config.artifact_dir = Some(dir.clone());
    }
    if let Some(seed) = options.seed {
        config.seed = seed;
    }
    if options.holdout_selection {
        config.selection = SelectionRule::Holdout;
    }
    let config = config.normalized();
    let artifact_dir = config
        .resolve_artifact_dir()
        .map_err(|err| err.to_string())?;
    let store = FsArtifactStore::open(&artifact_dir).map_err(|err| err.to_string())?;
    let trainer = ModelTrainer::new(Arc::new(store), config.clone());

    let loaded = trainer
        .load_data(&options.dataset)
        .map_err(|err| err.to_string())?;
    let (train, test) = split_test(loaded, options.test_fraction, config.seed);

    let trained = trainer
        .train(&train.features, &train.labels)
        .map_err(|err| err.to_string())?;
    println!("run: {}", trained.run_id);
    for candidate in &trained.value.candidate_scores {
        println!(
            "candidate {:<20} score={:.4}",
            candidate.candidate.name(),
            candidate.score
        );
    }
    println!(
        "selected: {} ({:?}, score={:.4})",
        trained.value.candidate.name(),
        trained.value.selection_rule,
        trained.value.selection_score
    );
    println!("artifacts: {}", artifact_dir.display());

    if let Some(test) = test {
        let metrics = trainer
            .evaluate(&test.features, &test.labels)
            .map_err(|err| err.to_string())?;
        println!("test accuracy:  {:.4}", metrics.accuracy);
        println!("test precision: {:.4}", metrics.precision);
        println!("test recall:    {:.4}", metrics.recall);
        println!("test f1:        {:.4}", metrics.f1);
        match metrics.roc_auc {
            Some(auc) => println!("test roc_auc:   {auc:.4}"),
            None => println!("test roc_auc:   n/a (single class)"),
        }
    }

    let importance = trainer
        .preprocessor()
        .feature_importance()
        .map_err(|err| err.to_string())?;
    if let Some(importance) = importance {
        let mut ranked: Vec<(String, f64)> = importance.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        println!("top feature importances:");
        for (name, value) in ranked.into_iter().take(options.top_features) {
            println!("  {name:<28} {value:.4}");
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct CliOptions {
    dataset: PathBuf,
    config: Option<PathBuf>,
    artifact_dir: Option<PathBuf>,
    test_fraction: f64,
    seed: Option<u64>,
    holdout_selection: bool,
    top_features: usize,
    quiet: bool,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut dataset: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut artifact_dir: Option<PathBuf> = None;
    let mut test_fraction = 0.2f64;
    let mut seed: Option<u64> = None;
    let mut holdout_selection = false;
    let mut top_features = 10usize;
    let mut quiet = false;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--data" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--data requires a value".to_string())?;
                dataset = Some(PathBuf::from(value));
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--artifacts" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--artifacts requires a value".to_string())?;
                artifact_dir = Some(PathBuf::from(value));
            }
            "--test-fraction" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--test-fraction requires a value".to_string())?;
                test_fraction = value
                    .parse::<f64>()
                    .ok()
                    .filter(|v| (0.0..1.0).contains(v))
                    .ok_or_else(|| format!("Invalid --test-fraction value: {value}"))?;
            }
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            "--holdout-selection" => {
                holdout_selection = true;
            }
            "--top" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--top requires a value".to_string())?;
                top_features = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --top value: {value}"))?;
            }
            "--quiet" => {
                quiet = true;
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let dataset = dataset.ok_or_else(help_text)?;
    Ok(CliOptions {
        dataset,
        config,
        artifact_dir,
        test_fraction,
        seed,
        holdout_selection,
        top_features,
        quiet,
    })
}

fn help_text() -> String {
    [
        "leadscore-train",
        "",
        "Trains every candidate classifier on a labeled lead CSV, publishes the winner",
        "and reports held-out metrics.",
        "",
        "Usage:",
        "  leadscore-train --data <leads.csv> [options]",
        "",
        "Options:",
        "  --data <file>            Labeled CSV with a `converted` column (required).",
        "  --config <file>          Config file (default: <root>/leadscore.toml).",
        "  --artifacts <dir>        Artifact directory (overrides config).",
        "  --test-fraction <f64>    Rows held out for evaluation, 0 disables (default: 0.2).",
        "  --seed <u64>             RNG seed (overrides config).",
        "  --holdout-selection      Select the winner on a held-out split.",
        "  --top <n>                Feature importances to print (default: 10).",
        "  --quiet                  Log to the launch file only.",
    ]
    .join("\n")
}

struct Split {
    features: leadscore::dataset::LeadFrame,
    labels: Vec<bool>,
}

/// Seeded shuffle into train and optional test portions.
fn split_test(
    loaded: LabeledFrame,
    test_fraction: f64,
    seed: u64,
) -> (Split, Option<Split>) {
    let n = loaded.labels.len();
    let held = ((n as f64) * test_fraction).round() as usize;
    if held == 0 || held >= n {
        return (
            Split {
                features: loaded.features,
                labels: loaded.labels,
            },
            None,
        );
    }
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let (test_idx, train_idx) = indices.split_at(held);
    let pick = |idx: &[usize]| Split {
        features: loaded.features.select(idx),
        labels: idx.iter().map(|&i| loaded.labels[i]).collect(),
    };
    (pick(train_idx), Some(pick(test_idx)))
}
