//! Text-to-vector embedding oracle.
//!
//! Provides the [`EmbeddingProvider`] trait and its implementations:
//! - [`gemini::GeminiProvider`]: Gemini `embedContent` over HTTPS
//! - [`hash::HashProvider`]: deterministic offline token hashing
//! - [`DisabledProvider`]: always fails, leaving items pending
//!
//! The provider is created via [`create_provider`] from configuration.

pub mod gemini;
pub mod hash;

use crate::config::EmbeddingConfig;
use crate::error::{MentorError, Result};

/// Trait for embedding text into vectors.
///
/// All methods are synchronous. Callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched requests.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Identifier recorded alongside the index so a model change can be detected.
    fn model_id(&self) -> String;

    /// Whether this provider can produce embeddings at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Stand-in used when embedding is turned off or unconfigured.
pub struct DisabledProvider {
    dimension: usize,
}

impl DisabledProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingProvider for DisabledProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(MentorError::Embedding("embedding provider is disabled".into()))
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> String {
        "none".into()
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Create an embedding provider from config.
///
/// `dimension` is the index width; every provider must produce exactly that.
/// A Gemini provider without an API key degrades to [`DisabledProvider`] so
/// items can still be written and backfilled later.
pub fn create_provider(
    config: &EmbeddingConfig,
    dimension: usize,
) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "gemini" => {
            if config.api_key.trim().is_empty() {
                tracing::warn!("no Gemini API key configured (set GEMINI_API_KEY), embedding disabled");
                return Ok(Box::new(DisabledProvider::new(dimension)));
            }
            let provider = gemini::GeminiProvider::new(config, dimension)?;
            Ok(Box::new(provider))
        }
        "hash" => Ok(Box::new(hash::HashProvider::new(dimension))),
        "none" => Ok(Box::new(DisabledProvider::new(dimension))),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: gemini, hash, none"),
    }
}

/// Check a provider's output width.
pub(crate) fn check_dimension(expected: usize, values: &[f32]) -> Result<()> {
    if values.len() != expected {
        return Err(MentorError::DimensionMismatch {
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}
