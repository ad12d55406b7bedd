//! Batch loader for the résumé store
//!
//! Reads a labeled CSV dataset, encodes every résumé and replaces the store
//! contents under a single-writer lease.

pub mod error;
pub mod pipeline;
pub mod source;

pub use error::IngestError;
pub use pipeline::{IngestPipeline, IngestProgress, IngestReport, Progress, RecordFailure, SilentProgress};
pub use source::{read_csv_file, read_records, RowError, SourceRecord};
