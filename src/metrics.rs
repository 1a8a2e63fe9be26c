use tracing::instrument;

use crate::ErrorRate;

/// Levenshtein distance with unit costs for insertion, deletion and substitution.
pub fn edit_distance<T: PartialEq>(prediction: &[T], reference: &[T]) -> usize {
    let (n, m) = (prediction.len(), reference.len());
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in dp[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..=n {
        for j in 1..=m {
            dp[i][j] = if prediction[i - 1] == reference[j - 1] {
                dp[i - 1][j - 1]
            } else {
                1 + dp[i - 1][j].min(dp[i][j - 1]).min(dp[i - 1][j - 1])
            };
        }
    }
    dp[n][m]
}

/// Character edit distance between two strings.
pub fn char_distance(prediction: &str, reference: &str) -> usize {
    let prediction = prediction.chars().collect::<Vec<_>>();
    let reference = reference.chars().collect::<Vec<_>>();
    edit_distance(&prediction, &reference)
}

/// Character error rate of a single prediction.
pub fn cer(prediction: &str, reference: &str) -> f64 {
    char_error_rate([(prediction, reference)]).rate
}

/// Character error rate over a batch: summed distances over summed reference
/// lengths. An empty reference set gives a rate of `0.0`, see
/// [`ErrorRate::is_degenerate`].
#[instrument(level = "debug", skip(pairs))]
pub fn char_error_rate<P, R>(pairs: impl IntoIterator<Item = (P, R)>) -> ErrorRate
where
    P: AsRef<str>,
    R: AsRef<str>,
{
    let (errors, reference_length) =
        pairs
            .into_iter()
            .fold((0, 0), |(errors, length), (prediction, reference)| {
                let reference = reference.as_ref();
                (
                    errors + char_distance(prediction.as_ref(), reference),
                    length + reference.chars().count(),
                )
            });
    ErrorRate::new(errors, reference_length)
}

/// Word error rate over a batch, splitting on whitespace.
#[instrument(level = "debug", skip(pairs))]
pub fn word_error_rate<P, R>(pairs: impl IntoIterator<Item = (P, R)>) -> ErrorRate
where
    P: AsRef<str>,
    R: AsRef<str>,
{
    let (errors, reference_length) =
        pairs
            .into_iter()
            .fold((0, 0), |(errors, length), (prediction, reference)| {
                let prediction = prediction.as_ref().split_whitespace().collect::<Vec<_>>();
                let reference = reference.as_ref().split_whitespace().collect::<Vec<_>>();
                (
                    errors + edit_distance(&prediction, &reference),
                    length + reference.len(),
                )
            });
    ErrorRate::new(errors, reference_length)
}
