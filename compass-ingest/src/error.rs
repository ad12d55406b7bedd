use compass_core::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Another ingestion holds the writer lease")]
    AlreadyRunning,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot read input: {0}")]
    Source(#[from] csv::Error),

    #[error("Input has no {column} column (accepted headers: {accepted})")]
    MissingColumn {
        column: &'static str,
        accepted: String,
    },
}
