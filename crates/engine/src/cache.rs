//! Snapshot cache management.
//!
//! Built indexes persist under `<data-dir>/indexes/` as four files that
//! must exist together:
//!
//! - `faiss_index.bin`: dense vector blob
//! - `faiss_metadata.pkl`: dense metadata blob
//! - `bm25_index.pkl`: sparse blob
//! - `cache_info.json`: the manifest
//!
//! A snapshot is fresh when no source JSON file has been modified after the
//! manifest timestamp and the structural document recount stays within the
//! drift tolerance. Manifest writes are atomic (temp file + rename); the
//! index blobs handle their own atomic writes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::EngineError;

pub const INDEX_DIR: &str = "indexes";
pub const DENSE_VECTORS_FILE: &str = "faiss_index.bin";
pub const DENSE_METADATA_FILE: &str = "faiss_metadata.pkl";
pub const SPARSE_FILE: &str = "bm25_index.pkl";
pub const MANIFEST_FILE: &str = "cache_info.json";

/// Allowed absolute drift between the manifest document count and the
/// structural recount before the cache is declared stale.
pub const DOC_COUNT_TOLERANCE: usize = 100;

/// Resolved snapshot file locations for one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    dir: PathBuf,
}

impl IndexPaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(INDEX_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dense_vectors(&self) -> PathBuf {
        self.dir.join(DENSE_VECTORS_FILE)
    }

    pub fn dense_metadata(&self) -> PathBuf {
        self.dir.join(DENSE_METADATA_FILE)
    }

    pub fn sparse(&self) -> PathBuf {
        self.dir.join(SPARSE_FILE)
    }

    pub fn manifest(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn all_exist(&self) -> bool {
        self.dense_vectors().is_file()
            && self.dense_metadata().is_file()
            && self.sparse().is_file()
            && self.manifest().is_file()
    }
}

/// The snapshot manifest. Timestamps are unix seconds so they compare
/// directly against file mtimes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CacheManifest {
    pub timestamp: f64,
    pub document_count: usize,
    pub build_time: f64,
}

impl CacheManifest {
    pub fn new(document_count: usize, build_time: f64) -> Self {
        Self {
            timestamp: unix_seconds(SystemTime::now()),
            document_count,
            build_time,
        }
    }
}

/// Reads and parses the manifest.
pub fn read_manifest(paths: &IndexPaths) -> Result<CacheManifest, EngineError> {
    let raw = fs::read_to_string(paths.manifest())
        .map_err(|e| EngineError::Cache(format!("cannot read manifest: {e}")))?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::Cache(format!("cannot parse manifest: {e}")))
}

/// Writes the manifest atomically. Failures are the caller's to downgrade
/// to a warning; the engine keeps running on in-memory indexes.
pub fn write_manifest(paths: &IndexPaths, manifest: &CacheManifest) -> Result<(), EngineError> {
    fs::create_dir_all(paths.dir())
        .map_err(|e| EngineError::Cache(format!("cannot create index dir: {e}")))?;
    let body = serde_json::to_vec_pretty(manifest)
        .map_err(|e| EngineError::Cache(format!("cannot encode manifest: {e}")))?;
    let target = paths.manifest();
    let tmp = target.with_extension("tmp");
    fs::write(&tmp, &body)
        .and_then(|()| fs::rename(&tmp, &target))
        .map_err(|e| EngineError::Cache(format!("cannot write manifest: {e}")))?;
    Ok(())
}

/// Freshness check for the snapshot under `data_dir`.
///
/// Valid iff: all four files exist, the manifest parses, no source file
/// mtime exceeds the manifest timestamp, and the structural recount is
/// within [`DOC_COUNT_TOLERANCE`] of the recorded count.
pub fn is_cache_valid(data_dir: &Path) -> bool {
    let paths = IndexPaths::new(data_dir);
    if !paths.all_exist() {
        debug!("cache invalid: missing snapshot files");
        return false;
    }

    let manifest = match read_manifest(&paths) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(error = %err, "cache invalid: unreadable manifest");
            return false;
        }
    };

    let sources = match corpus::source_files(data_dir) {
        Ok(sources) => sources,
        Err(err) => {
            warn!(error = %err, "cache invalid: cannot list source files");
            return false;
        }
    };
    for source in &sources {
        let modified = fs::metadata(source)
            .and_then(|m| m.modified())
            .map(unix_seconds)
            .unwrap_or(f64::INFINITY);
        if modified > manifest.timestamp {
            info!(file = %source.display(), "cache invalid: source modified after snapshot");
            return false;
        }
    }

    let current = match corpus::count_documents(data_dir) {
        Ok(current) => current,
        Err(err) => {
            warn!(error = %err, "cache invalid: recount failed");
            return false;
        }
    };
    let drift = current.abs_diff(manifest.document_count);
    if drift > DOC_COUNT_TOLERANCE {
        info!(
            expected = manifest.document_count,
            current, "cache invalid: document count drifted"
        );
        return false;
    }

    debug!(
        documents = manifest.document_count,
        "cache validation passed"
    );
    true
}

fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
