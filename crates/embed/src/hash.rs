use fxhash::hash64;

/// Deterministic bag-of-token embedding.
///
/// Each token hashes to a fixed sinusoid pattern; token patterns are summed
/// so texts sharing tokens land closer in cosine space. Tokens are folded
/// to lowercase ASCII alphanumerics before hashing, keeping punctuation out
/// of the signal. Whitespace-only input yields the zero vector, which the
/// caller rejects as invalid.
pub(crate) fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut v = vec![0f32; dimension];
    for raw in text.split_whitespace() {
        let token: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .flat_map(|c| c.to_lowercase())
            .collect();
        if token.is_empty() {
            continue;
        }
        let h = hash64(token.as_bytes());
        for (idx, value) in v.iter_mut().enumerate() {
            let phase = ((h >> (idx % 32)) & 0xffff) as f32 * 0.0001;
            *value += phase.sin();
        }
    }
    v
}
