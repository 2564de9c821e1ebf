use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::ml::TrainDataset;

/// Rows used to fit candidates and rows used to score them.
pub(super) struct SelectionSplit {
    pub fit: TrainDataset,
    pub score: TrainDataset,
}

/// Seeded shuffle split holding out `fraction` of the rows.
///
/// Returns `None` when the data is too small to leave rows on both sides.
pub(super) fn holdout_split(data: &TrainDataset, fraction: f64, seed: u64) -> Option<SelectionSplit> {
    let n = data.x.len();
    if n < 2 {
        return None;
    }
    let held = ((n as f64) * fraction).round() as usize;
    let held = held.clamp(1, n - 1);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let (score_idx, fit_idx) = indices.split_at(held);
    Some(SelectionSplit {
        fit: subset(data, fit_idx),
        score: subset(data, score_idx),
    })
}

fn subset(data: &TrainDataset, indices: &[usize]) -> TrainDataset {
    TrainDataset {
        x: indices.iter().map(|&i| data.x[i].clone()).collect(),
        y: indices.iter().map(|&i| data.y[i]).collect(),
    }
}
