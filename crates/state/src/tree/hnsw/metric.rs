//! Distance computation for the vector index.
//!
//! Every metric is expressed as a distance: smaller is better, so search
//! results order ascending regardless of the configured metric.

use aifs_types::snapshot::DistanceKind;

/// Distance between two equal-length vectors under a configured metric.
pub trait Distance {
    /// Computes the distance; callers guarantee `a.len() == b.len()`.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;
}

impl Distance for DistanceKind {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceKind::Cosine => cosine_distance(a, b),
            DistanceKind::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            // Negated inner product, so larger dot products rank first.
            DistanceKind::Dot => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
            DistanceKind::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            DistanceKind::Hamming => a
                .iter()
                .zip(b)
                .filter(|(x, y)| x.is_sign_negative() != y.is_sign_negative())
                .count() as f32,
        }
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - (dot / (norm_a * norm_b))
}
