use serde::{Deserialize, Serialize};

/// Whether the text is a corpus document or a user query.
///
/// The remote model distinguishes the two task types; the deterministic
/// hash backend ignores the role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedRole {
    Document,
    Query,
}

impl EmbedRole {
    /// Task-type string expected by the remote embedding endpoint.
    pub(crate) fn task_type(self) -> &'static str {
        match self {
            EmbedRole::Document => "RETRIEVAL_DOCUMENT",
            EmbedRole::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// A validated, unit-normalized embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    /// Identifier of the embedded document or query.
    pub doc_id: String,
    /// Unit-norm vector of the engine-wide dimension.
    pub vector: Vec<f32>,
    /// Dimension of `vector`.
    pub dimension: usize,
    /// Name of the model that produced the vector.
    pub model_name: String,
}
