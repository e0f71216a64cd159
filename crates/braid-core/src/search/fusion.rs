// Reciprocal Rank Fusion (RRF)

use std::collections::HashMap;
use std::hash::Hash;

/// Standard RRF k parameter from the original RRF paper
/// ("Reciprocal Rank Fusion outperforms Condorcet and individual Rank
/// Learning Methods", Cormack, Clarke, and Buettcher, SIGIR 2009).
///
/// The k parameter controls how much weight top-ranked items get:
/// smaller k emphasizes the head of each list, larger k flattens the
/// weighting. k=60 is the conventional balance.
pub const RRF_K: usize = 60;

/// Combines two ranked candidate lists using RRF.
///
/// For each item the fused score is the sum, over every list it appears in,
/// of `1 / (k + rank)` with 1-based ranks. Items in only one list get that
/// list's contribution alone. The output is ordered by descending fused
/// score; exact ties are broken by ascending item order so results are
/// deterministic.
///
/// Ranks are all that matter: the input scores are ignored, which is what
/// lets a cosine-similarity list and a dot-product list be merged without a
/// score normalization step.
pub fn reciprocal_rank_fusion<T: Clone + Eq + Hash + Ord>(
    results_a: &[(T, f32)],
    results_b: &[(T, f32)],
    k: usize,
) -> Vec<(T, f32)> {
    let k = k as f32;
    let mut rrf_scores: HashMap<T, f32> = HashMap::new();

    for ranking in [results_a, results_b] {
        for (rank, (item, _score)) in ranking.iter().enumerate() {
            let contribution = 1.0 / (k + (rank + 1) as f32);
            *rrf_scores.entry(item.clone()).or_insert(0.0) += contribution;
        }
    }

    let mut combined: Vec<(T, f32)> = rrf_scores.into_iter().collect();
    combined.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_in_both_lists_outrank_single_list_items() {
        let vector_results = vec![(1, 0.9), (2, 0.8), (3, 0.7)];
        let sparse_results = vec![(3, 10.0), (1, 8.0), (4, 5.0)];

        let fused = reciprocal_rank_fusion(&vector_results, &sparse_results, RRF_K);

        // Docs 1 and 3 appear in both lists, 2 and 4 in one each.
        let top_ids: Vec<i32> = fused.iter().take(2).map(|(id, _)| *id).collect();
        assert!(top_ids.contains(&1));
        assert!(top_ids.contains(&3));
    }

    #[test]
    fn single_list_absence_halves_the_score() {
        // A ranks 1st in the first list only; B ranks 1st in the second list
        // and 3rd in the first. B must outrank A.
        let dense = vec![("a", 0.99), ("c", 0.98), ("b", 0.97)];
        let sparse = vec![("b", 12.0)];

        let fused = reciprocal_rank_fusion(&dense, &sparse, 60);
        let score = |id: &str| {
            fused
                .iter()
                .find(|(i, _)| *i == id)
                .map(|(_, s)| *s)
                .unwrap()
        };

        assert!((score("a") - 1.0 / 61.0).abs() < 1e-6);
        assert!((score("b") - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-6);
        assert_eq!(fused[0].0, "b");
    }

    #[test]
    fn empty_inputs() {
        let empty: Vec<(i32, f32)> = vec![];
        let other = vec![(1, 1.0), (2, 0.9)];

        let fused = reciprocal_rank_fusion(&empty, &other, RRF_K);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].0, 1);

        let fused = reciprocal_rank_fusion(&empty, &empty, RRF_K);
        assert!(fused.is_empty());
    }

    #[test]
    fn single_ranker_preserves_order() {
        let results = vec![(1, 10.0), (2, 8.0), (3, 5.0)];
        let empty: Vec<(i32, f32)> = vec![];

        let fused = reciprocal_rank_fusion(&results, &empty, RRF_K);
        assert_eq!(
            fused.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn scores_are_rank_based_not_score_based() {
        // Wildly different input scores, symmetric ranks: fused scores must match.
        let a = vec![(1, 100.0), (2, 0.01)];
        let b = vec![(2, 0.99), (1, 0.01)];

        let fused = reciprocal_rank_fusion(&a, &b, RRF_K);
        assert!((fused[0].1 - fused[1].1).abs() < 1e-6);
    }

    #[test]
    fn exact_ties_break_by_item_order() {
        // Symmetric ranks give 1 and 2 identical fused scores; the smaller
        // id must come first.
        let a = vec![(2, 0.9), (1, 0.8)];
        let b = vec![(1, 0.9), (2, 0.8)];

        let fused = reciprocal_rank_fusion(&a, &b, RRF_K);
        assert_eq!(fused[0].0, 1);
        assert_eq!(fused[1].0, 2);
    }
}
