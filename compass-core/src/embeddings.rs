//! Embedding encoders for résumé text
//!
//! Provides an `Encoder` trait with implementations for:
//! - **ONNX** — local `all-MiniLM-L6-v2` inference (384-dim), the production encoder
//! - **Hashing** — deterministic feature hashing, for offline development and tests
//!
//! An encoder is built once at process start by [`create_encoder`]. A failure to
//! load model weights is returned from the constructor and must abort startup.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EmbeddingSettings;
use crate::hashing_embedder::HashingEncoder;
use crate::onnx_embedder::{resolve_onnx_paths, OnnxEncoder};

/// Output width of all-MiniLM-L6-v2 and of the `resumes.embedding` column.
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Name recorded in `resumes.model_name` for the ONNX encoder.
pub const ONNX_MODEL_NAME: &str = "all-MiniLM-L6-v2";

// ============================================================================
// Encoder trait
// ============================================================================

/// Maps text to a fixed-length dense vector.
///
/// Implementations are deterministic for a fixed model version and accept any
/// UTF-8 input, the empty string included.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector returned by [`Encoder::encode`].
    fn dimensions(&self) -> usize;

    /// Model identifier stored next to each embedding.
    fn model_name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("ONNX model not found at {path} — download all-MiniLM-L6-v2 into the model directory")]
    ModelNotFound { path: String },

    #[error("ONNX inference error: {0}")]
    OnnxInference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid embedding: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Unknown embedding backend '{0}' (expected 'onnx' or 'hashing')")]
    UnknownBackend(String),

    #[error("Encoding timed out after {0:?}")]
    Timeout(Duration),
}

// ============================================================================
// Config types
// ============================================================================

/// ONNX backend configuration
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimensions: usize,
}

/// Build the encoder selected by `[embedding] backend`.
pub fn create_encoder(settings: &EmbeddingSettings) -> Result<Box<dyn Encoder>, EmbeddingError> {
    let dimensions = settings.dimensions as usize;
    match settings.backend.as_str() {
        "onnx" => {
            let (model_path, tokenizer_path) = resolve_onnx_paths(&settings.model_path);
            Ok(Box::new(OnnxEncoder::new(OnnxConfig {
                model_path,
                tokenizer_path,
                dimensions,
            })?))
        }
        "hashing" => Ok(Box::new(HashingEncoder::new(dimensions))),
        other => Err(EmbeddingError::UnknownBackend(other.to_string())),
    }
}

/// Encode with an upper bound on wall time.
pub async fn encode_with_timeout(
    encoder: &dyn Encoder,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>, EmbeddingError> {
    match tokio::time::timeout(timeout, encoder.encode(text)).await {
        Ok(result) => result,
        Err(_) => Err(EmbeddingError::Timeout(timeout)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
