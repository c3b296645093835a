//! Vector math for semantic search.

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Cosine similarity, or `None` when lengths differ or either vector has no
/// direction (zero or non-finite norm).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let norm_a = norm(a);
    let norm_b = norm(b);
    if !(norm_a > 0.0 && norm_a.is_finite() && norm_b > 0.0 && norm_b.is_finite()) {
        return None;
    }
    let score = dot(a, b) / (norm_a * norm_b);
    score.is_finite().then_some(score)
}

/// Unit-length copy of `v`; `None` for zero or non-finite vectors.
pub fn normalized(v: &[f32]) -> Option<Vec<f32>> {
    let n = norm(v);
    if n > 0.0 && n.is_finite() {
        Some(v.iter().map(|x| x / n).collect())
    } else {
        None
    }
}
