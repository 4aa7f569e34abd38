use std::cmp::Ordering;

use crate::Real;

/// Raise negative scores to zero, in place.
///
/// Applied uniformly to every formula's output before ranking; evaluation
/// itself returns unclamped values. NaN passes through untouched and is
/// handled by the NaN-last rule in [`dense_ranks_desc`].
pub fn clamp_nonnegative<R: Real>(scores: &mut [R]) {
    for score in scores.iter_mut() {
        if *score < R::zero() {
            *score = R::zero();
        }
    }
}

/// Rank rows by descending score: rank 1 is the highest score.
///
/// Ranks are dense (1..=N, no gaps, no shared ranks). Ties keep their input
/// order, so among equal scores the earlier row gets the better rank. NaN
/// scores sort after every real score, deterministically.
pub fn dense_ranks_desc<R: Real>(scores: &[R]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // Stable sort: tied rows stay in input order.
    order.sort_by(|&lhs, &rhs| descending(scores[lhs], scores[rhs]));
    let mut ranks = vec![0; scores.len()];
    for (position, &row) in order.iter().enumerate() {
        ranks[row] = position as u32 + 1;
    }
    ranks
}

fn descending<R: Real>(lhs: R, rhs: R) -> Ordering {
    match (lhs.is_nan(), rhs.is_nan()) {
        (false, false) => rhs.partial_cmp(&lhs).unwrap_or(Ordering::Equal),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

/// Signed rank movement per row, fixed as `rank_b - rank_a`.
///
/// Positive means the second formula ranks the row worse than the first.
pub fn rank_delta(rank_a: &[u32], rank_b: &[u32]) -> Vec<i64> {
    assert_eq!(rank_a.len(), rank_b.len());
    rank_a
        .iter()
        .zip(rank_b.iter())
        .map(|(&a, &b)| i64::from(b) - i64::from(a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_keep_input_order() {
        assert_eq!(dense_ranks_desc(&[5.0, 5.0, 3.0]), vec![1, 2, 3]);
    }

    #[test]
    fn ranks_are_dense_over_distinct_scores() {
        assert_eq!(dense_ranks_desc(&[10.0, 30.0, 20.0]), vec![3, 1, 2]);
    }

    #[test]
    fn nan_sorts_last() {
        assert_eq!(dense_ranks_desc(&[1.0, f64::NAN, 2.0]), vec![2, 3, 1]);
        assert_eq!(dense_ranks_desc(&[f64::NAN, f64::NAN, 2.0]), vec![2, 3, 1]);
    }

    #[test]
    fn infinity_ranks_first() {
        assert_eq!(dense_ranks_desc(&[1.0, f64::INFINITY, 2.0]), vec![3, 1, 2]);
    }

    #[test]
    fn empty_scores_rank_to_nothing() {
        assert_eq!(dense_ranks_desc::<f64>(&[]), Vec::<u32>::new());
    }

    #[test]
    fn clamp_raises_only_negatives() {
        let mut scores = [-1.5, 0.0, 2.0, f64::NEG_INFINITY];
        clamp_nonnegative(&mut scores);
        assert_eq!(scores, [0.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn clamp_leaves_nan_alone() {
        let mut scores = [f64::NAN];
        clamp_nonnegative(&mut scores);
        assert!(scores[0].is_nan());
    }

    #[test]
    fn delta_is_b_minus_a() {
        assert_eq!(rank_delta(&[2, 3, 1], &[3, 2, 1]), vec![1, -1, 0]);
    }
}
