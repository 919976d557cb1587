//! Soft-monotone assignment of summary segments to scenes.
//!
//! Every segment gets exactly one scene. The objective is
//!
//! ```text
//! sum_i s[i][j_i]  -  penalty * |{ i >= 1 : j_i < j_(i-1) }|
//! ```
//!
//! so an out-of-order pick only wins when its similarity advantage exceeds
//! the penalty. Reusing the previous scene is never out of order. The
//! optimum is found exactly by dynamic programming from the last segment
//! backwards; reconstruction then walks forwards taking the lowest scene
//! index among equally good choices.

/// Scores closer than this are treated as equal.
const TIE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub scene_index: usize,
    /// Raw similarity of the chosen pair.
    pub score: f64,
}

/// Solves the assignment for an `n x m` similarity matrix.
///
/// Returns an empty vector when there are no segments or no scenes. Rows
/// shorter than the first row are padded with zero similarity.
pub fn assign(similarity: &[Vec<f64>], penalty: f64) -> Vec<Assignment> {
    let n = similarity.len();
    let m = similarity.first().map(|row| row.len()).unwrap_or(0);
    if n == 0 || m == 0 {
        return Vec::new();
    }
    let penalty = if penalty.is_finite() { penalty.max(0.0) } else { 0.0 };

    let s: Vec<Vec<f64>> = similarity
        .iter()
        .map(|row| {
            (0..m)
                .map(|j| row.get(j).copied().filter(|v| v.is_finite()).unwrap_or(0.0))
                .collect()
        })
        .collect();

    // future[i][j]: best total for segments i.. given segment i takes scene j.
    let mut future = vec![vec![0.0; m]; n];
    future[n - 1].clone_from(&s[n - 1]);

    for i in (0..n - 1).rev() {
        let next = &future[i + 1];

        let mut suffix_max = vec![f64::NEG_INFINITY; m + 1];
        for k in (0..m).rev() {
            suffix_max[k] = suffix_max[k + 1].max(next[k]);
        }

        let mut prefix_max = f64::NEG_INFINITY;
        let mut row = vec![0.0; m];
        for j in 0..m {
            let in_order = suffix_max[j];
            let out_of_order = prefix_max - penalty;
            row[j] = s[i][j] + in_order.max(out_of_order);
            prefix_max = prefix_max.max(next[j]);
        }
        future[i] = row;
    }

    let mut result = Vec::with_capacity(n);
    let mut previous: Option<usize> = None;
    for i in 0..n {
        let value = |k: usize| match previous {
            Some(p) if k < p => future[i][k] - penalty,
            _ => future[i][k],
        };
        let best = (0..m).map(value).fold(f64::NEG_INFINITY, f64::max);
        let chosen = (0..m)
            .find(|&k| value(k) >= best - TIE_EPSILON)
            .unwrap_or(0);
        result.push(Assignment {
            scene_index: chosen,
            score: s[i][chosen],
        });
        previous = Some(chosen);
    }

    result
}
