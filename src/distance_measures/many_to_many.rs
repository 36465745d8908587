//! Many-to-many distance computations.
//!
//! Efficiently compute pairwise distances between two sets of vectors.

use super::{DistanceMeasure, ThresholdedDistances};
use rayon::prelude::*;

/// Number of query rows before the pairwise kernels go parallel.
const PAIRWISE_PARALLEL_THRESHOLD: usize = 64;

/// Relative widening of early-exit bounds.
const PRUNE_SLACK: f32 = 1e-4;

/// Compute pairwise squared L2 distances between two sets of vectors.
///
/// Returns a matrix where result[i][j] = squared_l2(a[i], b[j]).
pub fn pairwise_squared_l2(a: &[&[f32]], b: &[&[f32]]) -> Vec<Vec<f32>> {
    map_rows(a, |a_vec| b.iter().map(|b_vec| squared_l2_dense(a_vec, b_vec)).collect())
}

/// Compute pairwise L2 distances between two sets of vectors.
pub fn pairwise_l2(a: &[&[f32]], b: &[&[f32]]) -> Vec<Vec<f32>> {
    map_rows(a, |a_vec| {
        b.iter()
            .map(|b_vec| squared_l2_dense(a_vec, b_vec).sqrt())
            .collect()
    })
}

/// Compute pairwise cosine distances between two sets of vectors.
pub fn pairwise_cosine(a: &[&[f32]], b: &[&[f32]]) -> Vec<Vec<f32>> {
    // Precompute norms
    let a_norms: Vec<f32> = a.iter().map(|v| l2_norm(v)).collect();
    let b_norms: Vec<f32> = b.iter().map(|v| l2_norm(v)).collect();

    let rows: Vec<(usize, &&[f32])> = a.iter().enumerate().collect();
    map_rows(&rows, |&(i, a_vec)| {
        b.iter()
            .enumerate()
            .map(|(j, b_vec)| cosine_from_parts(dot_product_dense(a_vec, b_vec), a_norms[i] * b_norms[j]))
            .collect()
    })
}

/// Threshold-pruned pairwise distances.
///
/// A member survives when some query `q` sees it within `thresholds[q]`.
/// For the L2 family the per-pair accumulation stops as soon as the partial
/// sum exceeds that query's bound; surviving columns are then filled with
/// exact distances so kept entries match [`pairwise_squared_l2`] and friends.
pub fn pairwise_with_threshold(
    measure: DistanceMeasure,
    queries: &[&[f32]],
    members: &[&[f32]],
    thresholds: &[f32],
) -> Option<ThresholdedDistances> {
    debug_assert_eq!(queries.len(), thresholds.len());

    // Column-major: one entry per member, holding its distances to every query.
    let columns: Vec<Option<Vec<f32>>> = members
        .par_iter()
        .map(|member| {
            let any_within = queries.iter().zip(thresholds).any(|(query, &t)| match measure {
                DistanceMeasure::Cosine => measure.distance(query, member) <= t,
                DistanceMeasure::SquaredL2 => bounded_squared_l2(query, member, slack(t)).is_some(),
                DistanceMeasure::L2 => bounded_squared_l2(query, member, slack(t * t)).is_some(),
            });
            if !any_within {
                return None;
            }
            Some(queries.iter().map(|query| measure.distance(query, member)).collect())
        })
        .collect();

    let kept: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter_map(|(j, c)| c.as_ref().map(|_| j))
        .collect();
    if kept.is_empty() {
        return None;
    }

    let mut distances = vec![Vec::with_capacity(kept.len()); queries.len()];
    for column in columns.into_iter().flatten() {
        for (row, d) in distances.iter_mut().zip(column) {
            row.push(d);
        }
    }

    Some(ThresholdedDistances { distances, kept })
}

/// Widen a pruning bound so chunked accumulation never drops a member whose
/// exact distance is within the threshold.
#[inline]
fn slack(bound: f32) -> f32 {
    bound + bound.abs() * PRUNE_SLACK
}

/// Squared L2 that gives up once the running sum exceeds `bound`.
#[inline]
fn bounded_squared_l2(a: &[f32], b: &[f32], bound: f32) -> Option<f32> {
    const CHECK_EVERY: usize = 16;
    let mut sum = 0.0f32;
    for (chunk_a, chunk_b) in a.chunks(CHECK_EVERY).zip(b.chunks(CHECK_EVERY)) {
        sum += squared_l2_dense(chunk_a, chunk_b);
        if sum > bound {
            return None;
        }
    }
    Some(sum)
}

#[inline]
fn cosine_from_parts(dot: f32, norm_product: f32) -> f32 {
    if norm_product > 1e-10 {
        (1.0 - dot / norm_product).max(0.0)
    } else {
        1.0
    }
}

/// Cosine distance between two vectors.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    cosine_from_parts(dot_product_dense(a, b), l2_norm(a) * l2_norm(b))
}

#[inline]
fn l2_norm(v: &[f32]) -> f32 {
    dot_product_dense(v, v).sqrt()
}

fn map_rows<T, F>(rows: &[T], f: F) -> Vec<Vec<f32>>
where
    T: Sync,
    F: Fn(&T) -> Vec<f32> + Sync + Send,
{
    if rows.len() >= PAIRWISE_PARALLEL_THRESHOLD {
        rows.par_iter().map(&f).collect()
    } else {
        rows.iter().map(f).collect()
    }
}

/// Dense squared L2 distance.
#[inline]
pub fn squared_l2_dense(a: &[f32], b: &[f32]) -> f32 {
    #[cfg(feature = "simd")]
    {
        squared_l2_dense_simd(a, b)
    }

    #[cfg(not(feature = "simd"))]
    {
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| {
                let diff = x - y;
                diff * diff
            })
            .sum()
    }
}

#[cfg(feature = "simd")]
fn squared_l2_dense_simd(a: &[f32], b: &[f32]) -> f32 {
    use wide::f32x8;

    let len = a.len().min(b.len());
    let chunks = len / 8;
    let remainder = len % 8;

    let mut sum = f32x8::ZERO;

    for i in 0..chunks {
        let offset = i * 8;
        let mut la = [0.0f32; 8];
        let mut lb = [0.0f32; 8];
        la.copy_from_slice(&a[offset..offset + 8]);
        lb.copy_from_slice(&b[offset..offset + 8]);
        let diff = f32x8::new(la) - f32x8::new(lb);
        sum += diff * diff;
    }

    let mut result: f32 = sum.reduce_add();

    for i in (len - remainder)..len {
        let diff = a[i] - b[i];
        result += diff * diff;
    }

    result
}

/// Dense dot product.
#[inline]
pub fn dot_product_dense(a: &[f32], b: &[f32]) -> f32 {
    #[cfg(feature = "simd")]
    {
        dot_product_dense_simd(a, b)
    }

    #[cfg(not(feature = "simd"))]
    {
        a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
    }
}

#[cfg(feature = "simd")]
fn dot_product_dense_simd(a: &[f32], b: &[f32]) -> f32 {
    use wide::f32x8;

    let len = a.len().min(b.len());
    let chunks = len / 8;
    let remainder = len % 8;

    let mut sum = f32x8::ZERO;

    for i in 0..chunks {
        let offset = i * 8;
        let mut la = [0.0f32; 8];
        let mut lb = [0.0f32; 8];
        la.copy_from_slice(&a[offset..offset + 8]);
        lb.copy_from_slice(&b[offset..offset + 8]);
        sum += f32x8::new(la) * f32x8::new(lb);
    }

    let mut result: f32 = sum.reduce_add();

    for i in (len - remainder)..len {
        result += a[i] * b[i];
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairwise_squared_l2() {
        let a: Vec<&[f32]> = vec![&[0.0, 0.0], &[1.0, 1.0]];
        let b: Vec<&[f32]> = vec![&[1.0, 0.0], &[0.0, 1.0], &[1.0, 1.0]];

        let result = pairwise_squared_l2(&a, &b);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].len(), 3);
        assert!((result[0][0] - 1.0).abs() < 1e-6);
        assert!((result[1][2] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_pairwise_cosine_non_negative() {
        let a: Vec<&[f32]> = vec![&[0.3, 0.4, 0.5]];
        let b: Vec<&[f32]> = vec![&[0.3, 0.4, 0.5], &[-0.3, -0.4, -0.5]];

        let result = pairwise_cosine(&a, &b);
        assert!(result[0][0] >= 0.0 && result[0][0] < 1e-6);
        assert!((result[0][1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_prunes_everything() {
        let a: Vec<&[f32]> = vec![&[0.0, 0.0]];
        let b: Vec<&[f32]> = vec![&[5.0, 5.0], &[6.0, 6.0]];
        assert!(pairwise_with_threshold(DistanceMeasure::SquaredL2, &a, &b, &[1.0]).is_none());
    }

    #[test]
    fn test_threshold_keeps_exact_values() {
        let a: Vec<&[f32]> = vec![&[0.0, 0.0], &[10.0, 10.0]];
        let b: Vec<&[f32]> = vec![&[1.0, 0.0], &[9.0, 10.0], &[50.0, 50.0]];
        let pruned =
            pairwise_with_threshold(DistanceMeasure::SquaredL2, &a, &b, &[2.0, 2.0]).unwrap();

        assert_eq!(pruned.kept, vec![0, 1]);
        // Query 0 is far from member 1 but the column survives through query 1,
        // so the entry must hold the exact distance rather than a partial sum.
        assert!((pruned.distances[0][1] - 181.0).abs() < 1e-3);
        assert!((pruned.distances[1][0] - 181.0).abs() < 1e-3);
    }

    #[test]
    fn test_bounded_squared_l2_early_exit() {
        let a = vec![0.0f32; 64];
        let b = vec![1.0f32; 64];
        assert_eq!(bounded_squared_l2(&a, &b, 10.0), None);
        assert_eq!(bounded_squared_l2(&a, &b, 64.0), Some(64.0));
    }
}
