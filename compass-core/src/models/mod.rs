pub mod resume;

pub use resume::{
    NeighborSummary, NewResume, RecordError, ResumeAnalysis, ResumeRecord, ScoredResume,
};
