//! Dense vector index over unit embeddings.
//!
//! Stores L2-normalized vectors aligned with their documents and answers
//! top-`k` queries by inner product, which equals cosine similarity on unit
//! vectors. Two variants:
//!
//! - [`IndexKind::Flat`]: exact scan over every vector. The right choice
//!   for corpora up to the tens of thousands.
//! - [`IndexKind::Ivf`]: a coarse quantizer partitions vectors into
//!   `nlist` cells; queries visit the `nprobe` nearest cells. Must be
//!   trained once before vectors are added.
//!
//! Lifecycle: created empty, populated by one bulk [`add`](DenseIndex::add)
//! (after [`train`](DenseIndex::train) for IVF), then queried read-only and
//! optionally snapshotted. Snapshots round-trip: a loaded index answers
//! queries identically to the one that was saved.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use corpus::Document;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

mod ivf;

/// Bump when the snapshot layout changes.
pub const DENSE_SCHEMA_VERSION: u16 = 1;

/// Tolerance for the unit-norm invariant on stored vectors.
pub const NORM_TOLERANCE: f32 = 1e-5;

const KMEANS_ITERATIONS: usize = 10;

/// Index variant descriptor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexKind {
    Flat,
    Ivf { nlist: usize },
}

/// A single search hit, best-first.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseHit {
    pub doc_id: String,
    /// Inner product in `(0, 1]`; non-positive similarities are not
    /// reported.
    pub score: f32,
}

/// Errors from index construction, mutation, search, and persistence.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DenseIndexError {
    #[error("invalid dense index config: {0}")]
    InvalidConfig(String),
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("ivf index must be trained before use")]
    NotTrained,
    #[error("ivf training failed: {0}")]
    Training(String),
    #[error("snapshot encode error: {0}")]
    Encode(String),
    #[error("snapshot decode error: {0}")]
    Decode(String),
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl From<bincode::error::EncodeError> for DenseIndexError {
    fn from(e: bincode::error::EncodeError) -> Self {
        DenseIndexError::Encode(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for DenseIndexError {
    fn from(e: bincode::error::DecodeError) -> Self {
        DenseIndexError::Decode(e.to_string())
    }
}

/// The dense index proper. Read-only after its bulk add; safe to share
/// behind an `Arc` between concurrent queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseIndex {
    dimension: usize,
    kind: IndexKind,
    trained: bool,
    nprobe: usize,
    vectors: Vec<Vec<f32>>,
    documents: Vec<Document>,
    centroids: Vec<Vec<f32>>,
    cells: Vec<Vec<u32>>,
}

/// Companion metadata blob, serialized next to the vector blob.
#[derive(Debug, Serialize, Deserialize)]
struct DenseMetadata {
    schema_version: u16,
    dimension: usize,
    kind: IndexKind,
    trained: bool,
    nprobe: usize,
    doc_ids: Vec<String>,
    documents: Vec<Document>,
}

/// Vector blob: everything needed to score, nothing about provenance.
#[derive(Debug, Serialize, Deserialize)]
struct DenseVectors {
    schema_version: u16,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    centroids: Vec<Vec<f32>>,
    cells: Vec<Vec<u32>>,
}

impl DenseIndex {
    /// Exact inner-product index.
    pub fn flat(dimension: usize) -> Result<Self, DenseIndexError> {
        if dimension == 0 {
            return Err(DenseIndexError::InvalidConfig(
                "dimension must be greater than zero".into(),
            ));
        }
        Ok(Self {
            dimension,
            kind: IndexKind::Flat,
            trained: true,
            nprobe: 1,
            vectors: Vec::new(),
            documents: Vec::new(),
            centroids: Vec::new(),
            cells: Vec::new(),
        })
    }

    /// IVF index with `nlist` cells. `nprobe` defaults to `min(10, nlist)`.
    pub fn ivf(dimension: usize, nlist: usize) -> Result<Self, DenseIndexError> {
        if dimension == 0 {
            return Err(DenseIndexError::InvalidConfig(
                "dimension must be greater than zero".into(),
            ));
        }
        if nlist == 0 {
            return Err(DenseIndexError::InvalidConfig(
                "nlist must be greater than zero".into(),
            ));
        }
        Ok(Self {
            dimension,
            kind: IndexKind::Ivf { nlist },
            trained: false,
            nprobe: 10.min(nlist),
            vectors: Vec::new(),
            documents: Vec::new(),
            centroids: (0..nlist).map(|_| Vec::new()).collect(),
            cells: vec![Vec::new(); nlist],
        })
    }

    /// Overrides the number of cells visited per IVF query.
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        if let IndexKind::Ivf { nlist } = self.kind {
            self.nprobe = nprobe.clamp(1, nlist);
        }
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Documents stored alongside the vectors, in insertion order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Trains the IVF coarse quantizer. A no-op on flat indexes (they are
    /// born trained), an error when called twice.
    pub fn train(&mut self, sample: &[Vec<f32>]) -> Result<(), DenseIndexError> {
        let IndexKind::Ivf { nlist } = self.kind else {
            return Ok(());
        };
        if self.trained {
            return Err(DenseIndexError::Training("index is already trained".into()));
        }
        for vector in sample {
            if vector.len() != self.dimension {
                return Err(DenseIndexError::DimensionMismatch {
                    expected: self.dimension,
                    got: vector.len(),
                });
            }
        }
        self.centroids = ivf::train_centroids(sample, nlist, KMEANS_ITERATIONS)
            .map_err(DenseIndexError::Training)?;
        self.trained = true;
        info!(nlist, sample = sample.len(), "trained ivf quantizer");
        Ok(())
    }

    /// Bulk-appends `(document, vector)` pairs. Vectors of the wrong
    /// dimension or off the unit sphere are dropped with a warning; the
    /// return value is the number accepted.
    pub fn add(
        &mut self,
        entries: Vec<(Document, Vec<f32>)>,
    ) -> Result<usize, DenseIndexError> {
        if matches!(self.kind, IndexKind::Ivf { .. }) && !self.trained {
            return Err(DenseIndexError::NotTrained);
        }

        let mut accepted = 0usize;
        for (document, vector) in entries {
            if vector.len() != self.dimension {
                warn!(
                    doc_id = %document.id,
                    expected = self.dimension,
                    got = vector.len(),
                    "dropping vector with wrong dimension"
                );
                continue;
            }
            let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if (norm - 1.0).abs() > NORM_TOLERANCE {
                warn!(doc_id = %document.id, norm, "dropping non-unit vector");
                continue;
            }

            let position = self.vectors.len() as u32;
            if matches!(self.kind, IndexKind::Ivf { .. }) {
                let cell = ivf::nearest_centroid(&vector, &self.centroids);
                self.cells[cell].push(position);
            }
            self.vectors.push(vector);
            self.documents.push(document);
            accepted += 1;
        }

        Ok(accepted)
    }

    /// Top-`k` hits for a unit-norm query, in non-increasing score order.
    /// Ties break by ascending insertion position. Scores are clamped to
    /// `[-1, 1]` and only strictly positive hits are returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<DenseHit>, DenseIndexError> {
        if query.len() != self.dimension {
            return Err(DenseIndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = match self.kind {
            IndexKind::Flat => self.score_positions(query, None),
            IndexKind::Ivf { .. } => {
                if !self.trained {
                    return Err(DenseIndexError::NotTrained);
                }
                let probes = ivf::probe_order(query, &self.centroids, self.nprobe);
                let candidates: Vec<u32> = probes
                    .into_iter()
                    .flat_map(|cell| self.cells[cell].iter().copied())
                    .collect();
                self.score_positions(query, Some(&candidates))
            }
        };

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .take(k)
            .map(|(position, score)| DenseHit {
                doc_id: self.documents[position].id.clone(),
                score,
            })
            .collect())
    }

    fn score_positions(&self, query: &[f32], candidates: Option<&[u32]>) -> Vec<(usize, f32)> {
        let score_one = |position: usize| {
            let vector = &self.vectors[position];
            let dot: f32 = query.iter().zip(vector.iter()).map(|(a, b)| a * b).sum();
            (position, dot.clamp(-1.0, 1.0))
        };
        match candidates {
            Some(positions) => positions
                .par_iter()
                .map(|&p| score_one(p as usize))
                .collect(),
            None => (0..self.vectors.len()).into_par_iter().map(score_one).collect(),
        }
    }

    /// Persists the index as a vector blob and a companion metadata blob.
    /// Writes go to a temp file first and are renamed into place.
    pub fn save(&self, vectors_path: &Path, metadata_path: &Path) -> Result<(), DenseIndexError> {
        let vectors = DenseVectors {
            schema_version: DENSE_SCHEMA_VERSION,
            dimension: self.dimension,
            vectors: self.vectors.clone(),
            centroids: self.centroids.clone(),
            cells: self.cells.clone(),
        };
        let metadata = DenseMetadata {
            schema_version: DENSE_SCHEMA_VERSION,
            dimension: self.dimension,
            kind: self.kind,
            trained: self.trained,
            nprobe: self.nprobe,
            doc_ids: self.documents.iter().map(|d| d.id.clone()).collect(),
            documents: self.documents.clone(),
        };

        write_atomic(vectors_path, &encode(&vectors)?)?;
        write_atomic(metadata_path, &encode(&metadata)?)?;
        info!(
            vectors = self.vectors.len(),
            path = %vectors_path.display(),
            "saved dense index"
        );
        Ok(())
    }

    /// Restores an index from its two blobs, cross-checking alignment.
    pub fn load(vectors_path: &Path, metadata_path: &Path) -> Result<Self, DenseIndexError> {
        let vectors: DenseVectors = decode(&fs::read(vectors_path)?)?;
        let metadata: DenseMetadata = decode(&fs::read(metadata_path)?)?;

        if vectors.dimension != metadata.dimension {
            return Err(DenseIndexError::CorruptSnapshot(format!(
                "vector blob dimension {} disagrees with metadata {}",
                vectors.dimension, metadata.dimension
            )));
        }
        if vectors.vectors.len() != metadata.documents.len()
            || metadata.doc_ids.len() != metadata.documents.len()
        {
            return Err(DenseIndexError::CorruptSnapshot(format!(
                "{} vectors vs {} documents vs {} doc ids",
                vectors.vectors.len(),
                metadata.documents.len(),
                metadata.doc_ids.len()
            )));
        }

        Ok(Self {
            dimension: metadata.dimension,
            kind: metadata.kind,
            trained: metadata.trained,
            nprobe: metadata.nprobe,
            vectors: vectors.vectors,
            documents: metadata.documents,
            centroids: vectors.centroids,
            cells: vectors.cells,
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DenseIndexError> {
    let raw = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
    Ok(zstd::encode_all(raw.as_slice(), 3).map_err(DenseIndexError::Io)?)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, DenseIndexError> {
    let raw = zstd::decode_all(bytes).map_err(DenseIndexError::Io)?;
    let (value, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())?;
    Ok(value)
}

/// Write-to-temp-then-rename so readers never observe a half-written blob.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DenseIndexError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
