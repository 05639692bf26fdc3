//! Vector math and BLOB encoding shared by the index and the classifier

/// Cosine similarity in `[-1, 1]`; 0.0 for mismatched lengths or zero vectors.
///
/// Accumulates in f64 so that a vector compared with itself scores exactly 1.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a > 0.0 && norm_b > 0.0 {
        (dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

/// Scale to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Normalized mean of the given vectors, `None` when empty.
pub fn centroid<'a, I>(vectors: I, dimension: usize) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut sum = vec![0.0f64; dimension];
    let mut count = 0usize;
    for v in vectors {
        for (acc, &x) in sum.iter_mut().zip(v.iter()) {
            *acc += x as f64;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }

    let mut mean: Vec<f32> = sum.iter().map(|s| (s / count as f64) as f32).collect();
    normalize(&mut mean);
    Some(mean)
}

/// Convert f32 vector to little-endian bytes for storage
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes back to f32 vector
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_conversion() {
        let original = vec![0.1, 0.2, 0.3, -0.5];
        let recovered = bytes_to_embedding(&embedding_to_bytes(&original));
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_self_similarity_is_exactly_one() {
        let v: Vec<f32> = (0..384).map(|i| ((i * 37) % 11) as f32 * 0.013 - 0.05).collect();
        assert_eq!(cosine_similarity(&v, &v), 1.0);
    }

    #[test]
    fn test_orthogonal_and_degenerate() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_centroid_is_normalized_mean() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let c = centroid([&a[..], &b[..]], 2).unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((c[0] - expected).abs() < 1e-6);
        assert!((c[1] - expected).abs() < 1e-6);

        assert!(centroid(std::iter::empty::<&[f32]>(), 2).is_none());
    }
}
