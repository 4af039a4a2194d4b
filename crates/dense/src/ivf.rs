//! Coarse quantizer for the IVF index variant.
//!
//! Plain Lloyd k-means with deterministic seeding: centroids start at
//! evenly spaced sample positions and the iteration count is fixed, so
//! training the same sample always yields the same cells. Assignment uses
//! inner product, which on unit vectors is cosine similarity.

/// Trains `nlist` centroids over `sample` with a fixed iteration count.
pub(crate) fn train_centroids(
    sample: &[Vec<f32>],
    nlist: usize,
    iterations: usize,
) -> Result<Vec<Vec<f32>>, String> {
    if nlist == 0 {
        return Err("nlist must be greater than zero".into());
    }
    if sample.len() < nlist {
        return Err(format!(
            "training sample of {} vectors is smaller than nlist {}",
            sample.len(),
            nlist
        ));
    }
    let dimension = sample[0].len();

    // Evenly spaced seeding keeps training deterministic across runs.
    let mut centroids: Vec<Vec<f32>> = (0..nlist)
        .map(|i| sample[i * sample.len() / nlist].clone())
        .collect();

    let mut assignments = vec![0usize; sample.len()];
    for _ in 0..iterations {
        for (vector, slot) in sample.iter().zip(assignments.iter_mut()) {
            *slot = nearest_centroid(vector, &centroids);
        }

        let mut sums = vec![vec![0f32; dimension]; nlist];
        let mut counts = vec![0usize; nlist];
        for (vector, &cell) in sample.iter().zip(assignments.iter()) {
            counts[cell] += 1;
            for (acc, v) in sums[cell].iter_mut().zip(vector.iter()) {
                *acc += v;
            }
        }

        for (cell, (sum, &count)) in sums.into_iter().zip(counts.iter()).enumerate() {
            if count == 0 {
                // Empty cell keeps its previous centroid.
                continue;
            }
            let inv = 1.0 / count as f32;
            centroids[cell] = sum.into_iter().map(|x| x * inv).collect();
        }
    }

    Ok(centroids)
}

/// Index of the centroid with the highest inner product; ties resolve to
/// the lowest index.
pub(crate) fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0usize;
    let mut best_score = f32::NEG_INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let score: f32 = vector.iter().zip(centroid.iter()).map(|(a, b)| a * b).sum();
        if score > best_score {
            best_score = score;
            best = idx;
        }
    }
    best
}

/// The `nprobe` centroids closest to the query, best first, ties by index.
pub(crate) fn probe_order(query: &[f32], centroids: &[Vec<f32>], nprobe: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(idx, centroid)| {
            let score: f32 = query.iter().zip(centroid.iter()).map(|(a, b)| a * b).sum();
            (idx, score)
        })
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(nprobe.min(centroids.len()));
    scored.into_iter().map(|(idx, _)| idx).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.into_iter().map(|x| x / norm).collect()
    }

    fn clustered_sample() -> Vec<Vec<f32>> {
        vec![
            unit(vec![1.0, 0.05, 0.0]),
            unit(vec![1.0, -0.05, 0.0]),
            unit(vec![0.95, 0.0, 0.05]),
            unit(vec![0.0, 1.0, 0.05]),
            unit(vec![0.05, 1.0, 0.0]),
            unit(vec![0.0, 0.95, -0.05]),
        ]
    }

    #[test]
    fn training_is_deterministic() {
        let sample = clustered_sample();
        let a = train_centroids(&sample, 2, 10).unwrap();
        let b = train_centroids(&sample, 2, 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn training_separates_clusters() {
        let sample = clustered_sample();
        let centroids = train_centroids(&sample, 2, 10).unwrap();
        // The two x-heavy and y-heavy groups must land in different cells.
        let cell_x = nearest_centroid(&sample[0], &centroids);
        let cell_y = nearest_centroid(&sample[3], &centroids);
        assert_ne!(cell_x, cell_y);
        assert_eq!(nearest_centroid(&sample[1], &centroids), cell_x);
        assert_eq!(nearest_centroid(&sample[4], &centroids), cell_y);
    }

    #[test]
    fn training_requires_enough_samples() {
        let sample = vec![unit(vec![1.0, 0.0])];
        assert!(train_centroids(&sample, 2, 5).is_err());
        assert!(train_centroids(&sample, 0, 5).is_err());
    }

    #[test]
    fn probe_order_ranks_by_similarity() {
        let centroids = vec![
            unit(vec![1.0, 0.0]),
            unit(vec![0.0, 1.0]),
            unit(vec![1.0, 1.0]),
        ];
        let order = probe_order(&unit(vec![1.0, 0.1]), &centroids, 2);
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], 0);
    }
}
