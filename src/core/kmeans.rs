//! Deterministic spherical k-means
//!
//! Used for tag prototypes (small k) and for the coarse quantizer of the IVF
//! index. Seeding is farthest-point from the first input vector, so identical
//! input order always yields identical centroids.

use super::vector::{centroid, cosine_similarity, normalize};

/// One cluster: unit-length centroid and indices into the input slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub centroid: Vec<f32>,
    pub members: Vec<usize>,
}

pub fn spherical_kmeans(vectors: &[Vec<f32>], k: usize, max_iterations: usize) -> Vec<Cluster> {
    if vectors.is_empty() || k == 0 {
        return Vec::new();
    }

    let dimension = vectors[0].len();
    let mut centroids = seed_centroids(vectors, k.min(vectors.len()));
    let mut assignment = assign(vectors, &centroids);

    for _ in 0..max_iterations {
        for (c, slot) in centroids.iter_mut().enumerate() {
            let members = assignment
                .iter()
                .enumerate()
                .filter(|(_, &a)| a == c)
                .map(|(i, _)| vectors[i].as_slice());
            // Empty clusters keep their previous centroid
            if let Some(updated) = centroid(members, dimension) {
                *slot = updated;
            }
        }

        let next = assign(vectors, &centroids);
        if next == assignment {
            break;
        }
        assignment = next;
    }

    centroids
        .into_iter()
        .enumerate()
        .filter_map(|(c, centroid)| {
            let members: Vec<usize> = assignment
                .iter()
                .enumerate()
                .filter(|(_, &a)| a == c)
                .map(|(i, _)| i)
                .collect();
            (!members.is_empty()).then_some(Cluster { centroid, members })
        })
        .collect()
}

fn seed_centroids(vectors: &[Vec<f32>], k: usize) -> Vec<Vec<f32>> {
    let mut first = vectors[0].clone();
    normalize(&mut first);
    let mut centroids = vec![first];

    while centroids.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (i, v) in vectors.iter().enumerate() {
            let nearest = centroids
                .iter()
                .map(|c| 1.0 - cosine_similarity(v, c))
                .fold(f32::INFINITY, f32::min);
            if best.map_or(true, |(_, d)| nearest > d) {
                best = Some((i, nearest));
            }
        }

        match best {
            // Remaining vectors all coincide with a centroid
            Some((_, d)) if d <= 0.0 => break,
            Some((i, _)) => {
                let mut seed = vectors[i].clone();
                normalize(&mut seed);
                centroids.push(seed);
            }
            None => break,
        }
    }

    centroids
}

/// Index of the most similar centroid for each vector; ties go to the lower index.
pub fn assign(vectors: &[Vec<f32>], centroids: &[Vec<f32>]) -> Vec<usize> {
    vectors
        .iter()
        .map(|v| nearest_centroid(v, centroids).map_or(0, |(i, _)| i))
        .collect()
}

pub fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, c) in centroids.iter().enumerate() {
        let sim = cosine_similarity(vector, c);
        if best.map_or(true, |(_, s)| sim > s) {
            best = Some((i, sim));
        }
    }
    best
}
