pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod hashing_embedder;
pub mod memory_store;
pub mod models;
pub mod onnx_embedder;
pub mod pg_store;
pub mod search;
pub mod store;

pub use config::CompassConfig;
pub use embeddings::{
    create_encoder, encode_with_timeout, EmbeddingError, Encoder, OnnxConfig,
    EMBEDDING_DIMENSIONS, ONNX_MODEL_NAME,
};
pub use error::CompassError;
pub use hashing_embedder::HashingEncoder;
pub use memory_store::MemoryResumeStore;
pub use models::{NeighborSummary, NewResume, RecordError, ResumeAnalysis, ResumeRecord, ScoredResume};
pub use onnx_embedder::OnnxEncoder;
pub use pg_store::PgResumeStore;
pub use search::{SearchError, SimilarityQueryService};
pub use store::{ResumeStore, StoreError};
