//! Corpus ingestion for the retrieval engine.
//!
//! This is where documents enter the pipeline. The data directory holds
//! JSON files deposited by the acquisition layer in several historical
//! shapes; this crate recognizes all of them at the boundary and
//! immediately normalizes to one [`Document`] struct, so downstream code
//! never sees the variance.
//!
//! Recognized file shapes:
//!
//! - a top-level list of records
//! - `{ "papers": [...] }`
//! - `{ "documents": [...] }`
//! - a single record object
//!
//! A record is valid when it carries a non-empty `content` or `title`.
//! Invalid records and records with malformed precomputed embeddings are
//! dropped and counted; unparseable files are logged and skipped so a few
//! bad inputs never block startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Canonical document record after ingest.
///
/// Ownership note: the loader produces the canonical list once; each index
/// then keeps its own aligned copy for the engine lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier; assigned as `{source_tag}_{sequence}` when the
    /// record carries none.
    pub id: String,
    /// Possibly empty title.
    pub title: String,
    /// Document body. Either `title` or `content` is non-empty.
    pub content: String,
    /// Originating collection, the source file stem.
    pub source_tag: String,
    /// Optional upstream URL.
    pub url: Option<String>,
    /// Optional precomputed embedding, validated at load time.
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    /// Title and content joined with a single space, the text stream both
    /// indexes are built from.
    pub fn full_text(&self) -> String {
        if self.title.is_empty() {
            self.content.clone()
        } else if self.content.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.content)
        }
    }

    /// Provenance reference carried into search results.
    pub fn reference(&self) -> String {
        let label = if self.title.trim().is_empty() {
            self.id.as_str()
        } else {
            self.title.as_str()
        };
        format!("{}:{}", self.source_tag, label)
    }
}

/// Errors fatal to corpus loading. Per-file and per-record problems are
/// counted, not raised.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CorpusError {
    #[error("data directory not found: {0}")]
    MissingDataDir(PathBuf),
    #[error("failed to read data directory {path}: {source}")]
    DirRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result of a corpus load, with per-source bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct CorpusLoad {
    pub documents: Vec<Document>,
    /// Valid record count per source tag.
    pub per_source: BTreeMap<String, usize>,
    pub files_read: usize,
    pub files_skipped: usize,
    /// Records dropped for missing text or malformed embeddings.
    pub dropped_records: usize,
}

/// Raw record as found on disk. Unknown fields are ignored; every known
/// field is optional so the shape probe below stays permissive.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// The tagged variant at the file boundary. Variant order matters: the
/// keyed shapes must be probed before the catch-all single record. Records
/// stay as raw JSON values here so one malformed record drops alone instead
/// of failing its whole file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Records(Vec<serde_json::Value>),
    Papers { papers: Vec<serde_json::Value> },
    Documents { documents: Vec<serde_json::Value> },
    Single(serde_json::Value),
}

impl CorpusFile {
    fn into_records(self) -> (Vec<serde_json::Value>, bool) {
        match self {
            CorpusFile::Records(records) => (records, false),
            CorpusFile::Papers { papers } => (papers, false),
            CorpusFile::Documents { documents } => (documents, false),
            CorpusFile::Single(record) => (vec![record], true),
        }
    }
}

/// Loads every JSON file in `dir` into the canonical document list.
///
/// `expected_dim`, when known, validates precomputed embeddings: a record
/// whose embedding has the wrong length or non-finite values is dropped.
/// Files are visited in filename order so ids and output order are
/// deterministic.
pub fn load_corpus(dir: &Path, expected_dim: Option<usize>) -> Result<CorpusLoad, CorpusError> {
    let mut load = CorpusLoad::default();

    for path in json_files(dir)? {
        let source_tag = file_stem(&path);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping unreadable corpus file");
                load.files_skipped += 1;
                continue;
            }
        };
        let parsed: CorpusFile = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping unparseable corpus file");
                load.files_skipped += 1;
                continue;
            }
        };

        let (records, single_shape) = parsed.into_records();

        let mut accepted = 0usize;
        for (sequence, value) in records.into_iter().enumerate() {
            let outcome = serde_json::from_value::<RawRecord>(value)
                .map_err(|_| "record is not a document object")
                .and_then(|record| normalize_record(record, &source_tag, sequence, expected_dim));
            match outcome {
                Ok(doc) => {
                    accepted += 1;
                    load.documents.push(doc);
                }
                Err(reason) => {
                    if single_shape {
                        // A lone non-record object (config files and the
                        // like) is not an ingest failure.
                        debug!(file = %path.display(), reason, "single-object file is not a document");
                    } else {
                        load.dropped_records += 1;
                        debug!(source = %source_tag, sequence, reason, "dropped invalid record");
                    }
                }
            }
        }

        load.files_read += 1;
        *load.per_source.entry(source_tag.clone()).or_default() += accepted;
        info!(file = %path.display(), accepted, "loaded corpus file");
    }

    info!(
        documents = load.documents.len(),
        files_read = load.files_read,
        files_skipped = load.files_skipped,
        dropped = load.dropped_records,
        "corpus load complete"
    );
    Ok(load)
}

/// Cheap structural recount used by cache validation: counts records with a
/// non-empty `content` or `title`, without touching embeddings. Unreadable
/// files count zero.
pub fn count_documents(dir: &Path) -> Result<usize, CorpusError> {
    let mut count = 0usize;
    for path in json_files(dir)? {
        let Ok(text) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(parsed) = serde_json::from_str::<CorpusFile>(&text) else {
            continue;
        };
        let (records, _) = parsed.into_records();
        count += records
            .into_iter()
            .filter_map(|value| serde_json::from_value::<RawRecord>(value).ok())
            .filter(|r| has_text(r))
            .count();
    }
    Ok(count)
}

fn normalize_record(
    record: RawRecord,
    source_tag: &str,
    sequence: usize,
    expected_dim: Option<usize>,
) -> Result<Document, &'static str> {
    if !has_text(&record) {
        return Err("missing content and title");
    }

    let embedding = match record.embedding {
        Some(values) => {
            if let Some(dim) = expected_dim {
                if values.len() != dim {
                    return Err("precomputed embedding has wrong dimension");
                }
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err("precomputed embedding has non-finite values");
            }
            Some(values)
        }
        None => None,
    };

    let id = match record.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => format!("{source_tag}_{sequence}"),
    };

    Ok(Document {
        id,
        title: record.title,
        content: record.content,
        source_tag: source_tag.to_string(),
        url: record.url,
        embedding,
    })
}

fn has_text(record: &RawRecord) -> bool {
    !record.content.trim().is_empty() || !record.title.trim().is_empty()
}

/// The source JSON files the corpus would be loaded from: dot-prefixed
/// names excluded, sorted by name. Cache freshness checks compare their
/// mtimes against the snapshot manifest.
pub fn source_files(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    json_files(dir)
}

/// JSON files in `dir`, dot-prefixed names excluded, sorted by name.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    if !dir.is_dir() {
        return Err(CorpusError::MissingDataDir(dir.to_path_buf()));
    }
    let entries = fs::read_dir(dir).map_err(|source| CorpusError::DirRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "json")
                && !file_name(path).starts_with('.')
        })
        .collect();
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn loads_top_level_list() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "drive.json",
            r#"[{"id": "d1", "title": "Diabetes", "content": "gula darah"},
                {"title": "Hipertensi", "content": "tekanan darah"}]"#,
        );

        let load = load_corpus(dir.path(), None).unwrap();
        assert_eq!(load.documents.len(), 2);
        assert_eq!(load.documents[0].id, "d1");
        assert_eq!(load.documents[0].source_tag, "drive");
        // Missing id gets the sequential fallback.
        assert_eq!(load.documents[1].id, "drive_1");
    }

    #[test]
    fn loads_papers_and_documents_shapes() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "ncbi.json",
            r#"{"papers": [{"id": "p1", "title": "Paper", "content": "isi"}]}"#,
        );
        write_file(
            dir.path(),
            "misc.json",
            r#"{"documents": [{"id": "m1", "content": "konten"}]}"#,
        );

        let load = load_corpus(dir.path(), None).unwrap();
        assert_eq!(load.documents.len(), 2);
        assert_eq!(load.per_source.get("ncbi"), Some(&1));
        assert_eq!(load.per_source.get("misc"), Some(&1));
    }

    #[test]
    fn loads_single_record_object() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "solo.json",
            r#"{"title": "Satu dokumen", "content": "isi dokumen"}"#,
        );

        let load = load_corpus(dir.path(), None).unwrap();
        assert_eq!(load.documents.len(), 1);
        assert_eq!(load.documents[0].id, "solo_0");
    }

    #[test]
    fn drops_records_without_text() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "mixed.json",
            r#"[{"title": "ok", "content": "isi"}, {"title": "  ", "content": ""}]"#,
        );

        let load = load_corpus(dir.path(), None).unwrap();
        assert_eq!(load.documents.len(), 1);
        assert_eq!(load.dropped_records, 1);
    }

    #[test]
    fn drops_records_with_malformed_embeddings() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "embedded.json",
            r#"[{"title": "short", "content": "a", "embedding": [0.1, 0.2]},
                {"title": "good", "content": "b", "embedding": [0.6, 0.8, 0.0]}]"#,
        );

        let load = load_corpus(dir.path(), Some(3)).unwrap();
        assert_eq!(load.documents.len(), 1);
        assert_eq!(load.documents[0].title, "good");
        assert_eq!(load.dropped_records, 1);
    }

    #[test]
    fn skips_unparseable_files_and_continues() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "broken.json", "{not json");
        write_file(
            dir.path(),
            "valid.json",
            r#"[{"title": "ok", "content": "isi"}]"#,
        );

        let load = load_corpus(dir.path(), None).unwrap();
        assert_eq!(load.documents.len(), 1);
        assert_eq!(load.files_skipped, 1);
        assert_eq!(load.files_read, 1);
    }

    #[test]
    fn ignores_dotfiles_and_non_json() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), ".hidden.json", r#"[{"content": "x"}]"#);
        write_file(dir.path(), "notes.txt", "plain text");
        write_file(dir.path(), "real.json", r#"[{"content": "isi"}]"#);

        let load = load_corpus(dir.path(), None).unwrap();
        assert_eq!(load.documents.len(), 1);
        assert_eq!(load.files_read, 1);
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            load_corpus(&missing, None),
            Err(CorpusError::MissingDataDir(_))
        ));
    }

    #[test]
    fn count_documents_matches_structural_validity() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "a.json",
            r#"[{"content": "satu"}, {"content": ""}, {"title": "dua"}]"#,
        );
        write_file(dir.path(), "b.json", r#"{"papers": [{"content": "tiga"}]}"#);
        write_file(dir.path(), "broken.json", "][");

        assert_eq!(count_documents(dir.path()).unwrap(), 3);
    }

    #[test]
    fn full_text_joins_title_and_content() {
        let doc = Document {
            id: "d".into(),
            title: "Hipertensi".into(),
            content: "tekanan darah tinggi".into(),
            source_tag: "test".into(),
            url: None,
            embedding: None,
        };
        assert_eq!(doc.full_text(), "Hipertensi tekanan darah tinggi");
        assert_eq!(doc.reference(), "test:Hipertensi");
    }

    #[test]
    fn deterministic_file_order() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "b.json", r#"[{"content": "dari b"}]"#);
        write_file(dir.path(), "a.json", r#"[{"content": "dari a"}]"#);

        let load = load_corpus(dir.path(), None).unwrap();
        assert_eq!(load.documents[0].source_tag, "a");
        assert_eq!(load.documents[1].source_tag, "b");
    }
}
