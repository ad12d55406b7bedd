//! ONNX encoder — local inference via `all-MiniLM-L6-v2`
//!
//! Uses the `ort` crate for ONNX Runtime and `tokenizers` for WordPiece tokenization.
//! Produces 384-dimensional, L2-normalised embeddings entirely offline.

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokenizers::{Tokenizer, TruncationParams};

use crate::embeddings::{EmbeddingError, Encoder, OnnxConfig, ONNX_MODEL_NAME};

/// Longest word-piece sequence fed to the model; longer résumés are truncated.
pub const MAX_SEQUENCE_TOKENS: usize = 256;

/// Local ONNX encoder using `all-MiniLM-L6-v2`.
pub struct OnnxEncoder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
    model_name: String,
}

impl std::fmt::Debug for OnnxEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEncoder")
            .field("model_name", &self.model_name)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OnnxEncoder {
    /// Load the ONNX model and tokenizer from the paths in `config`.
    ///
    /// Returns `EmbeddingError::ModelNotFound` if either file is missing.
    pub fn new(config: OnnxConfig) -> Result<Self, EmbeddingError> {
        if !config.model_path.exists() {
            return Err(EmbeddingError::ModelNotFound {
                path: config.model_path.display().to_string(),
            });
        }
        if !config.tokenizer_path.exists() {
            return Err(EmbeddingError::ModelNotFound {
                path: config.tokenizer_path.display().to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(&config.model_path))
            .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let model_name = config
            .model_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| ONNX_MODEL_NAME.to_string());

        tracing::info!(
            model = %model_name,
            dimensions = config.dimensions,
            "Loaded ONNX encoder"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions: config.dimensions,
            model_name,
        })
    }
}

#[async_trait]
impl Encoder for OnnxEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        // CPU-bound; keep it off the async workers.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let dimensions = self.dimensions;
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut session_guard = session
                .lock()
                .map_err(|e| EmbeddingError::OnnxInference(format!("session lock poisoned: {e}")))?;
            encode_sync(&mut session_guard, &tokenizer, &text, dimensions)
        })
        .await
        .map_err(|e| EmbeddingError::OnnxInference(format!("spawn_blocking join error: {e}")))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Run ONNX inference synchronously.
fn encode_sync(
    session: &mut Session,
    tokenizer: &Tokenizer,
    text: &str,
    expected_dims: usize,
) -> Result<Vec<f32>, EmbeddingError> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| m as i64)
        .collect();
    let token_type_ids: Vec<i64> = encoding
        .get_type_ids()
        .iter()
        .map(|&t| t as i64)
        .collect();

    let seq_len = input_ids.len();
    let shape = vec![1i64, seq_len as i64];

    let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids))
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;
    let attention_mask_tensor = Tensor::from_array((shape.clone(), attention_mask.clone()))
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;

    let inputs = ort::inputs! {
        "input_ids" => input_ids_tensor,
        "attention_mask" => attention_mask_tensor,
        "token_type_ids" => token_type_ids_tensor,
    };

    let outputs = session
        .run(inputs)
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;

    // Last hidden state, shape [1, seq_len, hidden_dim].
    let (out_shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;

    if out_shape.len() != 3 {
        return Err(EmbeddingError::OnnxInference(format!(
            "Expected 3D output, got {}D",
            out_shape.len()
        )));
    }
    let out_seq_len = out_shape[1] as usize;
    let hidden_dim = out_shape[2] as usize;

    let mask: Vec<f32> = attention_mask.iter().map(|&m| m as f32).collect();
    let mut pooled = mean_pool(data, &mask, out_seq_len, hidden_dim);
    l2_normalize(&mut pooled);

    if pooled.len() != expected_dims {
        return Err(EmbeddingError::InvalidDimensions {
            expected: expected_dims,
            actual: pooled.len(),
        });
    }

    Ok(pooled)
}

/// Mean over the token axis of a flat `[seq_len, hidden_dim]` buffer, weighted
/// by the attention mask.
pub(crate) fn mean_pool(data: &[f32], mask: &[f32], seq_len: usize, hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mask_sum: f32 = mask.iter().take(seq_len).sum();

    for tok_idx in 0..seq_len {
        let mask_val = mask.get(tok_idx).copied().unwrap_or(0.0);
        if mask_val > 0.0 {
            let offset = tok_idx * hidden_dim;
            for (dim, slot) in pooled.iter_mut().enumerate() {
                *slot += data[offset + dim] * mask_val;
            }
        }
    }
    if mask_sum > 0.0 {
        for v in &mut pooled {
            *v /= mask_sum;
        }
    }
    pooled
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Resolve the default model directory.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("career-compass/models")
}

/// Resolve paths for the ONNX model and tokenizer.
///
/// An empty `model_path` means the default location. `~` and `$VARS` are expanded.
pub fn resolve_onnx_paths(model_path: &str) -> (PathBuf, PathBuf) {
    if model_path.is_empty() {
        let dir = default_model_dir();
        (
            dir.join(format!("{ONNX_MODEL_NAME}.onnx")),
            dir.join(format!("{ONNX_MODEL_NAME}-tokenizer.json")),
        )
    } else {
        let expanded = shellexpand::full(model_path)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| model_path.to_string());
        let model = PathBuf::from(expanded);
        let stem = model
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let tokenizer = model.with_file_name(format!("{stem}-tokenizer.json"));
        (model, tokenizer)
    }
}

// ============================================================================
// TESTS
// ============================================================================
