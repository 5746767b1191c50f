//! Cosine similarity over embedding vectors.

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Index and score of the candidate most similar to `query`.
///
/// Ties keep the first-encountered candidate. Candidates without an
/// embedding are skipped. Returns `None` when no candidate has one.
pub fn best_match<'a, I>(query: &[f32], candidates: I) -> Option<(usize, f32)>
where
    I: IntoIterator<Item = Option<&'a [f32]>>,
{
    let mut best: Option<(usize, f32)> = None;
    for (index, candidate) in candidates.into_iter().enumerate() {
        let Some(embedding) = candidate else {
            continue;
        };
        let score = cosine_similarity(query, embedding);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let v = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_opposite_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 1.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_best_match_picks_highest() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let c = [0.7f32, 0.7];
        let candidates = vec![Some(&a[..]), Some(&b[..]), Some(&c[..])];
        let (index, _) = best_match(&[0.0, 1.0], candidates).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_best_match_tie_keeps_first() {
        let a = [1.0f32, 0.0];
        let b = [2.0f32, 0.0];
        let candidates = vec![Some(&a[..]), Some(&b[..])];
        let (index, score) = best_match(&[1.0, 0.0], candidates).unwrap();
        assert_eq!(index, 0);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_best_match_skips_missing() {
        let b = [0.0f32, 1.0];
        let candidates = vec![None, Some(&b[..])];
        assert_eq!(best_match(&[1.0, 0.0], candidates).map(|m| m.0), Some(1));
        assert!(best_match(&[1.0, 0.0], vec![None, None]).is_none());
    }
}
