//! Gemini embedding provider.
//!
//! Calls `models/{model}:embedContent` (and `:batchEmbedContents` for
//! batches) with the blocking `reqwest` client.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{check_dimension, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{MentorError, Result};

pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    task_type: String,
    dimension: usize,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'a str,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Embedding,
}

#[derive(Deserialize)]
struct BatchResponse {
    embeddings: Vec<Embedding>,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig, dimension: usize) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        let model = config
            .model
            .strip_prefix("models/")
            .unwrap_or(&config.model)
            .to_string();

        tracing::info!(model = %model, "Gemini embedding provider ready");

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model,
            api_key: config.api_key.clone(),
            task_type: config.task_type.clone(),
            dimension,
        })
    }

    fn request<'a>(&'a self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: [Part { text }],
            },
            task_type: &self.task_type,
        }
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, method: &str, body: &B) -> Result<R> {
        let url = format!("{}/models/{}:{method}", self.endpoint, self.model);
        let body = serde_json::to_vec(body)
            .map_err(|e| MentorError::Embedding(format!("failed to encode request: {e}")))?;

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| MentorError::Embedding(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| MentorError::Embedding(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(MentorError::Embedding(format!(
                "{method} returned {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| MentorError::Embedding(format!("unexpected {method} response: {e}")))
    }
}

impl EmbeddingProvider for GeminiProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response: EmbedResponse = self.post("embedContent", &self.request(text))?;
        check_dimension(self.dimension, &response.embedding.values)?;
        Ok(response.embedding.values)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = BatchRequest {
            requests: texts.iter().map(|t| self.request(t)).collect(),
        };
        let response: BatchResponse = self.post("batchEmbedContents", &body)?;
        if response.embeddings.len() != texts.len() {
            return Err(MentorError::Embedding(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        response
            .embeddings
            .into_iter()
            .map(|e| {
                check_dimension(self.dimension, &e.values)?;
                Ok(e.values)
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> String {
        format!("gemini/{}", self.model)
    }
}
