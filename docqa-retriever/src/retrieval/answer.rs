//! Answer models: turn a question and retrieved context into an answer.
//!
//! - [`ExtractiveAnswerer`] picks the context sentence closest to the question
//!   in embedding space and reports the cosine similarity as its score.
//! - [`OllamaAnswerer`] asks a local Ollama server to generate an answer from
//!   the context. Generated answers carry no score.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use docqa_embed::EmbeddingProvider;
use half::f16;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Confidence in `[0, 1]`, when the model provides one
    pub score: Option<f32>,
}

#[async_trait]
pub trait AnswerModel: Send + Sync {
    async fn answer(&self, question: &str, context: &str) -> Result<Answer>;

    fn name(&self) -> &str;
}

pub struct ExtractiveAnswerer {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ExtractiveAnswerer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl AnswerModel for ExtractiveAnswerer {
    async fn answer(&self, question: &str, context: &str) -> Result<Answer> {
        let sentences = split_sentences(context);
        if sentences.is_empty() {
            bail!("Context contains no sentences");
        }

        let question_vec = self.embedder.embed_text(question).await?;
        let embedded = self.embedder.embed_texts(&sentences).await?;

        let mut best: Option<(usize, f32)> = None;
        for (i, vector) in embedded.embeddings.iter().enumerate() {
            let similarity = cosine_similarity(&question_vec, vector);
            if best.is_none_or(|(_, score)| similarity > score) {
                best = Some((i, similarity));
            }
        }
        let (i, similarity) = best.context("Embedding provider returned no vectors")?;

        tracing::debug!(
            "Picked sentence {} of {} (similarity {:.3})",
            i + 1,
            sentences.len(),
            similarity
        );
        Ok(Answer {
            text: sentences[i].clone(),
            score: Some(similarity.clamp(0.0, 1.0)),
        })
    }

    fn name(&self) -> &str {
        "extractive"
    }
}

/// Split text into trimmed sentences.
///
/// A sentence ends after `.`, `!` or `?` followed by whitespace or the end of
/// the text, and at every blank line.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let next = chars.peek().copied();
        let boundary = match c {
            '.' | '!' | '?' => next.is_none_or(|n| n.is_whitespace()),
            '\n' => next == Some('\n'),
            _ => false,
        };
        if boundary {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x.to_f32(), y.to_f32());
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Generative answers from an Ollama server (`/api/generate`).
#[derive(Debug, Clone)]
pub struct OllamaAnswerer {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaAnswerer {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn build_prompt(question: &str, context: &str) -> String {
        format!(
            "Answer the question using only the context below. \
             If the context does not contain the answer, say so.\n\n\
             Context:\n{context}\n\nQuestion: {question}\nAnswer:"
        )
    }
}

#[async_trait]
impl AnswerModel for OllamaAnswerer {
    async fn answer(&self, question: &str, context: &str) -> Result<Answer> {
        let prompt = Self::build_prompt(question, context);
        let body = serde_json::to_vec(&GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
        })?;

        let url = format!("{}/api/generate", self.base_url);
        tracing::debug!("Requesting answer from {} ({})", url, self.model);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.base_url))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            bail!("Ollama returned {status}: {text}");
        }
        let parsed: GenerateResponse =
            serde_json::from_str(&text).context("Unexpected Ollama response")?;

        Ok(Answer {
            text: parsed.response.trim().to_string(),
            score: None,
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_embed::HashingProvider;

    #[test]
    fn test_split_sentences() {
        let text = "First one. Second? Third!\n\nA heading\n\nv1.2 is out. Trailing";
        assert_eq!(
            split_sentences(text),
            vec![
                "First one.",
                "Second?",
                "Third!",
                "A heading",
                "v1.2 is out.",
                "Trailing"
            ]
        );
        assert!(split_sentences("  \n\n ").is_empty());
    }

    #[test]
    fn test_cosine_similarity() {
        let a: Vec<f16> = [1.0, 0.0].iter().map(|&x| f16::from_f32(x)).collect();
        let b: Vec<f16> = [0.0, 2.0].iter().map(|&x| f16::from_f32(x)).collect();
        let zero = vec![f16::ZERO; 2];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
    }

    #[tokio::test]
    async fn test_extractive_picks_matching_sentence() -> Result<()> {
        let answerer = ExtractiveAnswerer::new(Arc::new(HashingProvider::new()));
        let context = "The library opens at nine. Bread is baked with flour and water.\n\n\
                       Trains leave the station every hour.";

        let answer = answerer.answer("How is bread baked?", context).await?;
        assert_eq!(answer.text, "Bread is baked with flour and water.");
        let score = answer.score.unwrap();
        assert!(score > 0.0 && score <= 1.0);
        assert_eq!(answerer.name(), "extractive");
        Ok(())
    }

    #[tokio::test]
    async fn test_extractive_rejects_blank_context() {
        let answerer = ExtractiveAnswerer::new(Arc::new(HashingProvider::new()));
        assert!(answerer.answer("anything?", "   ").await.is_err());
    }

    #[test]
    fn test_ollama_prompt_and_url() {
        let prompt = OllamaAnswerer::build_prompt("Who?", "Ada wrote it.");
        assert!(prompt.contains("Context:\nAda wrote it."));
        assert!(prompt.ends_with("Question: Who?\nAnswer:"));

        let answerer =
            OllamaAnswerer::new("http://localhost:11434/", "llama3.2", Duration::from_secs(1)).unwrap();
        assert_eq!(answerer.base_url, "http://localhost:11434");
        assert_eq!(answerer.name(), "llama3.2");
    }

    #[test]
    fn test_ollama_response_parsing() {
        let parsed: GenerateResponse =
            serde_json::from_str(r#"{"model":"m","response":" Paris. ","done":true}"#).unwrap();
        assert_eq!(parsed.response.trim(), "Paris.");
    }

    #[tokio::test]
    async fn test_ollama_unreachable_is_an_error() {
        let answerer =
            OllamaAnswerer::new("http://127.0.0.1:9", "llama3.2", Duration::from_secs(2)).unwrap();
        assert!(answerer.answer("q", "c").await.is_err());
    }
}
