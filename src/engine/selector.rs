//! Latest-prediction selection.

use crate::types::Prediction;

/// Index of the most recent prediction, or `None` for an empty history.
///
/// Linear scan keeping the strictly newest timestamp. On an exact
/// timestamp tie the earlier element in input order wins; callers should
/// not depend on that.
pub fn latest_index(predictions: &[Prediction]) -> Option<usize> {
    let mut iter = predictions.iter().enumerate();
    let (mut newest_idx, mut newest) = iter.next()?;

    for (idx, prediction) in iter {
        if prediction.created_at > newest.created_at {
            newest_idx = idx;
            newest = prediction;
        }
    }

    Some(newest_idx)
}

/// The most recent prediction, or `None` for an empty history.
pub fn latest(predictions: &[Prediction]) -> Option<&Prediction> {
    latest_index(predictions).map(|idx| &predictions[idx])
}
