use float_ord::FloatOrd;
use ndarray::ArrayView2;
use tracing::instrument;

use crate::{vocab::Vocabulary, TextLine};

/// Index and value of the largest entry; the lowest index wins ties.
fn argmax<'a>(row: impl IntoIterator<Item = &'a f32>) -> Option<(usize, f32)> {
    row.into_iter()
        .copied()
        .enumerate()
        .max_by(|(i, a), (j, b)| FloatOrd(*a).cmp(&FloatOrd(*b)).then(j.cmp(i)))
}

/// Greedy CTC decoding of a `(timesteps, classes)` score matrix.
///
/// Takes the best class per timestep, merges runs of the same class, and maps
/// what is left through `vocab`, dropping blank/padding classes. Each kept
/// symbol is scored with the best value seen in its run.
#[instrument(level = "trace", skip(scores, vocab), fields(dim = ?scores.dim()))]
pub fn greedy_decode(scores: ArrayView2<f32>, vocab: &Vocabulary) -> TextLine {
    let mut runs: Vec<(usize, f32)> = Vec::new();
    for (index, score) in scores.outer_iter().filter_map(|row| argmax(row.iter())) {
        match runs.last_mut() {
            Some((last, best)) if *last == index => *best = best.max(score),
            _ => runs.push((index, score)),
        }
    }

    let (text, character_scores) = runs
        .into_iter()
        .filter_map(|(index, score)| Some((vocab.get(index)?, score)))
        .fold(
            (String::new(), Vec::new()),
            |(mut text, mut scores), (symbol, score)| {
                text.push_str(symbol);
                scores.push(score);
                (text, scores)
            },
        );

    TextLine {
        text,
        character_scores,
    }
}
