//! Seeded 2-D projection of utterance vectors.
//!
//! A neighborhood-preserving force layout: each point is attracted to its
//! cosine nearest neighbors and repelled from random samples, starting
//! from a seeded random placement. Deterministic given
//! `(vectors, n_neighbors, min_dist, seed)` — every random draw comes from
//! one seeded generator and iteration order is fixed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::embeddings::cosine_similarity;

const EPOCHS: usize = 200;
const INITIAL_SPREAD: f32 = 10.0;
const ATTRACTION: f32 = 0.12;
const REPULSION: f32 = 0.35;
const NEGATIVE_SAMPLES: usize = 4;

/// Lay out `vectors` on the plane.
///
/// `n_neighbors` controls how much local structure is preserved,
/// `min_dist` how tightly neighbors may pack.
pub fn project(
    vectors: &[&[f32]],
    n_neighbors: usize,
    min_dist: f32,
    seed: u64,
) -> Vec<(f32, f32)> {
    let n = vectors.len();
    if n == 0 {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let mut positions: Vec<(f32, f32)> = (0..n)
        .map(|_| {
            (
                rng.gen_range(-INITIAL_SPREAD..INITIAL_SPREAD),
                rng.gen_range(-INITIAL_SPREAD..INITIAL_SPREAD),
            )
        })
        .collect();

    if n == 1 {
        return positions;
    }

    let neighbors = neighbor_graph(vectors, n_neighbors.max(1).min(n - 1));

    for epoch in 0..EPOCHS {
        let alpha = 1.0 - epoch as f32 / EPOCHS as f32;

        for i in 0..n {
            // Pull toward neighbors, but never inside min_dist.
            for &(j, weight) in &neighbors[i] {
                let dx = positions[j].0 - positions[i].0;
                let dy = positions[j].1 - positions[i].1;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist <= min_dist {
                    continue;
                }
                let pull = alpha * ATTRACTION * weight * (dist - min_dist) / dist;
                positions[i].0 += pull * dx;
                positions[i].1 += pull * dy;
            }

            // Push away from a few random points to spread clusters apart.
            for _ in 0..NEGATIVE_SAMPLES {
                let j = rng.gen_range(0..n);
                if j == i {
                    continue;
                }
                let dx = positions[i].0 - positions[j].0;
                let dy = positions[i].1 - positions[j].1;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq < 1e-8 {
                    // Coincident points get a deterministic nudge.
                    positions[i].0 += alpha * rng.gen_range(-0.1..0.1);
                    positions[i].1 += alpha * rng.gen_range(-0.1..0.1);
                    continue;
                }
                let push = alpha * REPULSION / (1.0 + dist_sq);
                let dist = dist_sq.sqrt();
                positions[i].0 += push * dx / dist;
                positions[i].1 += push * dy / dist;
            }
        }
    }

    positions
}

/// For each vector, its top-k cosine neighbors with similarity weights
/// clamped to `[0, 1]`.
fn neighbor_graph(vectors: &[&[f32]], k: usize) -> Vec<Vec<(usize, f32)>> {
    let n = vectors.len();
    let mut graph = Vec::with_capacity(n);

    for i in 0..n {
        let mut scored: Vec<(usize, f32)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, cosine_similarity(vectors[i], vectors[j])))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        for entry in &mut scored {
            entry.1 = entry.1.clamp(0.0, 1.0);
        }
        graph.push(scored);
    }

    graph
}
