//! Feature-hashing encoder
//!
//! Bag-of-words with signed feature hashing into a fixed number of buckets,
//! L2-normalised. No model files, fully deterministic: SipHash-1-3 with fixed
//! keys is stable across Rust releases, unlike `DefaultHasher`.
//! Changing the keys, the tokenizer or the stopword list changes every vector,
//! so bump [`HASHING_VERSION`] along with them.

use std::hash::Hasher;

use async_trait::async_trait;
use siphasher::sip::SipHasher13;

use crate::embeddings::{EmbeddingError, Encoder};
use crate::onnx_embedder::l2_normalize;

pub const HASHING_VERSION: &str = "v1";

const HASH_KEY_0: u64 = 0x5ca1_ab1e_0ddb_a11d;
const HASH_KEY_1: u64 = 0x0b5e_55ed_c0ff_ee42;

/// Token hashed in place of an input with no usable tokens, so the empty
/// string still maps to a defined, non-zero vector.
const EMPTY_SENTINEL: &str = "\u{0}empty";

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "i", "in",
    "is", "it", "my", "of", "on", "or", "our", "that", "the", "their", "this", "to", "was",
    "we", "were", "with",
];

#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimensions: usize,
    model_name: String,
}

impl HashingEncoder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_name: format!("hashing-{HASHING_VERSION}-{dimensions}"),
        }
    }

    pub fn encode_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = tokenize(text).peekable();

        if tokens.peek().is_none() {
            self.accumulate(&mut vector, EMPTY_SENTINEL, 1.0);
        } else {
            for token in tokens {
                self.accumulate(&mut vector, &token, 1.0);
            }
        }

        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], token: &str, weight: f32) {
        let hash = hash_token(token);
        let idx = (hash % self.dimensions as u64) as usize;
        // top bit picks the sign so collisions tend to cancel instead of pile up
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[idx] += sign * weight;
    }
}

#[async_trait]
impl Encoder for HashingEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.encode_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn hash_token(token: &str) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(HASH_KEY_0, HASH_KEY_1);
    hasher.write(token.as_bytes());
    hasher.finish()
}

/// Lower-cased alphanumeric runs (`+` and `#` kept for C++/C#), stopwords dropped.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EMBEDDING_DIMENSIONS;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_bit_identical() {
        let encoder = HashingEncoder::new(EMBEDDING_DIMENSIONS);
        let text = "Senior data engineer: Spark, Airflow, Python, SQL.";
        let a = encoder.encode_sync(text);
        let b = HashingEncoder::new(EMBEDDING_DIMENSIONS).encode_sync(text);
        assert_eq!(a, b);
    }

    #[test]
    fn test_output_is_unit_length() {
        let encoder = HashingEncoder::new(EMBEDDING_DIMENSIONS);
        let v = encoder.encode_sync("kubernetes terraform ansible");
        assert_eq!(v.len(), EMBEDDING_DIMENSIONS);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }

    #[test]
    fn test_empty_and_degenerate_text_is_defined() {
        let encoder = HashingEncoder::new(EMBEDDING_DIMENSIONS);
        let empty = encoder.encode_sync("");
        let punct = encoder.encode_sync("  --- ... ");
        let stop = encoder.encode_sync("the and of");
        assert_eq!(empty, punct);
        assert_eq!(empty, stop);
        assert!(empty.iter().any(|x| *x != 0.0), "empty text must not be the zero vector");
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let encoder = HashingEncoder::new(EMBEDDING_DIMENSIONS);
        assert_eq!(
            encoder.encode_sync("Python, SQL; ETL!"),
            encoder.encode_sync("python sql etl")
        );
    }

    #[test]
    fn test_shared_vocabulary_scores_closer() {
        let encoder = HashingEncoder::new(EMBEDDING_DIMENSIONS);
        let query = encoder.encode_sync("python machine learning pandas");
        let near = encoder.encode_sync("pandas python scikit machine learning models");
        let far = encoder.encode_sync("kubernetes docker jenkins terraform");
        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[test]
    fn test_model_name_carries_version_and_width() {
        assert_eq!(HashingEncoder::new(384).model_name(), "hashing-v1-384");
    }
}
