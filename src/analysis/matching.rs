use itertools::Itertools;
use serde::Serialize;

/// One-to-one pairing of two independently detected event lists by distance.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DistanceMatching {
    /// `(index_a, index_b)` pairs, sorted by `index_a`
    pub pairs: Vec<(usize, usize)>,
    pub unmatched_a: Vec<usize>,
    pub unmatched_b: Vec<usize>,
}

/// Greedy nearest-first matching of event positions `a` and `b`.
///
/// Every pair within `tolerance` is a candidate. Candidates are taken in order of increasing
/// distance gap; on an exact tie the event detected first in `a` wins, then the one detected
/// first in `b`. An event is paired at most once. The result is not guaranteed to be a
/// globally optimal assignment.
pub fn match_by_distance(a: &[f64], b: &[f64], tolerance: f64) -> DistanceMatching {
    let candidates = (0..a.len())
        .cartesian_product(0..b.len())
        .map(|(i, j)| ((a[i] - b[j]).abs(), i, j))
        .filter(|(gap, _, _)| *gap <= tolerance)
        .sorted_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

    let mut used_a = vec![false; a.len()];
    let mut used_b = vec![false; b.len()];
    let mut pairs = Vec::new();
    for (_, i, j) in candidates {
        if used_a[i] || used_b[j] {
            continue;
        }
        used_a[i] = true;
        used_b[j] = true;
        pairs.push((i, j));
    }
    pairs.sort_unstable();

    DistanceMatching {
        pairs,
        unmatched_a: (0..a.len()).filter(|i| !used_a[*i]).collect(),
        unmatched_b: (0..b.len()).filter(|j| !used_b[*j]).collect(),
    }
}
