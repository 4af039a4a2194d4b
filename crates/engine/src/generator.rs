//! The generator boundary.
//!
//! The engine's only obligations toward the generator are (a) a numbered
//! context block with `[source_tag] title` headers and full content, (b) a
//! system prompt selected by tag, and (c) swallowing generator failure into
//! a generic apology so retrieval metadata always survives. The generator
//! itself is replaceable behind the [`Generator`] trait; the default
//! implementation is deterministic and extractive, which keeps the CLI and
//! the test suites hermetic.

use async_trait::async_trait;
use thiserror::Error;

/// Generic apology returned when generation fails.
pub const APOLOGY: &str = "Maaf, terjadi kesalahan saat memproses permintaan Anda. Silakan coba lagi.";

/// Returned by the default generator when no passages were retrieved.
pub const INSUFFICIENT_CONTEXT: &str =
    "Maaf, tidak ditemukan konteks yang cukup untuk menjawab pertanyaan ini.";

/// A ranked passage handed to the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPassage {
    pub source_tag: String,
    pub title: String,
    pub content: String,
    pub reference: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("generator error: {0}")]
pub struct GeneratorError(pub String);

/// External answer composer. Failure never fails the retrieval result.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        query: &str,
        passages: &[ContextPassage],
    ) -> Result<String, GeneratorError>;
}

/// System prompt registry keyed by the facade's `prompt_tag`.
pub fn system_prompt_for_tag(tag: &str) -> &'static str {
    match tag {
        "anamnesis" => {
            "Anda adalah asisten medis AI yang membantu proses anamnesis. \
             Gunakan informasi dari konteks medis yang disediakan, ajukan \
             pertanyaan lanjutan yang relevan, dan fokus pada gejala, \
             riwayat medis, serta faktor risiko."
        }
        "diagnosis" => {
            "Anda adalah asisten medis AI yang membantu proses diagnosis. \
             Gunakan HANYA informasi dari konteks yang disediakan, berikan \
             diagnosis diferensial yang mungkin beserta tingkat keyakinan, \
             dan jangan memberikan diagnosis pasti tanpa pemeriksaan \
             langsung."
        }
        _ => {
            "Anda adalah asisten medis AI yang berpengetahuan luas. Berikan \
             informasi medis yang akurat berdasarkan konteks yang \
             disediakan; jika informasi tidak mencukupi, nyatakan dengan \
             jelas."
        }
    }
}

/// Formats the ranked passages as the numbered context block the generator
/// receives.
pub fn format_context(passages: &[ContextPassage]) -> String {
    let mut block = String::new();
    for (i, passage) in passages.iter().enumerate() {
        block.push_str(&format!(
            "\n--- Referensi {}: [{}] {} ---\n{}\n",
            i + 1,
            passage.source_tag,
            passage.title,
            passage.content
        ));
    }
    block
}

/// Assembles the complete generator prompt.
pub fn build_prompt(system_prompt: &str, query: &str, passages: &[ContextPassage]) -> String {
    let references: Vec<&str> = passages.iter().map(|p| p.reference.as_str()).collect();
    format!(
        "{system_prompt}\n\nKONTEKS DARI SUMBER DATA:\n{}\n\nREFERENSI YANG DIGUNAKAN:\n{}\n\nPERTANYAAN: {query}\n\nBerikan jawaban yang akurat berdasarkan konteks di atas.",
        format_context(passages),
        references.join("; ")
    )
}

/// Deterministic extractive generator: leads with the top passage and lists
/// the references used. Suitable for the CLI and for tests; an LLM-backed
/// client implements [`Generator`] the same way.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveGenerator;

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        query: &str,
        passages: &[ContextPassage],
    ) -> Result<String, GeneratorError> {
        if passages.is_empty() {
            return Ok(INSUFFICIENT_CONTEXT.to_string());
        }

        let top = &passages[0];
        let excerpt: String = top.content.chars().take(300).collect();
        let references: Vec<String> = passages
            .iter()
            .map(|p| format!("[{}] {}", p.source_tag, p.title))
            .collect();

        Ok(format!(
            "Berdasarkan {} referensi untuk \"{}\": {}\n\nReferensi: {}",
            passages.len(),
            query,
            excerpt,
            references.join("; ")
        ))
    }
}

/// Test helper: a generator that always fails, for exercising the apology
/// path.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        _query: &str,
        _passages: &[ContextPassage],
    ) -> Result<String, GeneratorError> {
        Err(GeneratorError("backend unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(source: &str, title: &str, content: &str) -> ContextPassage {
        ContextPassage {
            source_tag: source.into(),
            title: title.into(),
            content: content.into(),
            reference: format!("{source}:{title}"),
        }
    }

    #[test]
    fn context_block_is_numbered_with_source_headers() {
        let passages = vec![
            passage("drive", "Diabetes", "isi satu"),
            passage("ncbi", "Hipertensi", "isi dua"),
        ];
        let block = format_context(&passages);
        assert!(block.contains("--- Referensi 1: [drive] Diabetes ---"));
        assert!(block.contains("--- Referensi 2: [ncbi] Hipertensi ---"));
        assert!(block.contains("isi satu"));
        assert!(block.contains("isi dua"));
    }

    #[test]
    fn prompt_contains_all_sections() {
        let passages = vec![passage("drive", "Diabetes", "isi")];
        let prompt = build_prompt("SISTEM", "apa itu diabetes", &passages);
        assert!(prompt.starts_with("SISTEM"));
        assert!(prompt.contains("KONTEKS DARI SUMBER DATA:"));
        assert!(prompt.contains("REFERENSI YANG DIGUNAKAN:\ndrive:Diabetes"));
        assert!(prompt.contains("PERTANYAAN: apa itu diabetes"));
    }

    #[test]
    fn prompt_registry_covers_tags() {
        assert!(system_prompt_for_tag("anamnesis").contains("anamnesis"));
        assert!(system_prompt_for_tag("diagnosis").contains("diagnosis"));
        // Unknown tags fall back to the general prompt.
        assert_eq!(
            system_prompt_for_tag("unknown"),
            system_prompt_for_tag("general")
        );
    }

    #[tokio::test]
    async fn extractive_generator_reports_insufficient_context() {
        let answer = ExtractiveGenerator
            .generate("s", "query", &[])
            .await
            .unwrap();
        assert_eq!(answer, INSUFFICIENT_CONTEXT);
    }

    #[tokio::test]
    async fn extractive_generator_cites_references() {
        let passages = vec![passage("drive", "Diabetes", "Diabetes melitus adalah ...")];
        let answer = ExtractiveGenerator
            .generate("s", "diabetes", &passages)
            .await
            .unwrap();
        assert!(answer.contains("[drive] Diabetes"));
        assert!(answer.contains("Diabetes melitus"));
    }

    #[tokio::test]
    async fn failing_generator_errors() {
        let err = FailingGenerator.generate("s", "q", &[]).await.unwrap_err();
        assert!(err.0.contains("unavailable"));
    }
}
