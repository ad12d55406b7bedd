use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One labeled résumé waiting to be encoded and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResume {
    pub category: String,
    pub text: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("résumé text is empty")]
    EmptyText,

    #[error("résumé text contains a NUL byte at offset {0}")]
    NulByte(usize),

    #[error("category is empty")]
    EmptyCategory,
}

impl NewResume {
    pub fn new(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            text: text.into(),
        }
    }

    /// Checks the store would otherwise enforce with a constraint violation.
    /// Postgres `TEXT` cannot hold `\0`.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.category.trim().is_empty() {
            return Err(RecordError::EmptyCategory);
        }
        if self.text.trim().is_empty() {
            return Err(RecordError::EmptyText);
        }
        if let Some(offset) = self.text.find('\0') {
            return Err(RecordError::NulByte(offset));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResumeRecord {
    pub id: i64,
    pub category: String,
    #[sqlx(rename = "resume_text")]
    pub text: String,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored résumé and its cosine distance to a query; lower is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResume {
    #[serde(flatten)]
    pub record: ResumeRecord,
    pub distance: f64,
}

impl ScoredResume {
    /// `1 - distance`, the usual cosine similarity.
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborSummary {
    pub id: i64,
    pub category: String,
    pub distance: f64,
}

impl From<&ScoredResume> for NeighborSummary {
    fn from(scored: &ScoredResume) -> Self {
        Self {
            id: scored.record.id,
            category: scored.record.category.clone(),
            distance: scored.distance,
        }
    }
}

/// Result of `POST /advise`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeAnalysis {
    pub skills_gap: Vec<String>,
    pub bullet_suggestions: Vec<String>,
    pub career_path: Option<String>,
    #[serde(default)]
    pub neighbors: Vec<NeighborSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_normal_record() {
        assert!(NewResume::new("Data Science", "Python, pandas, SQL").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_text() {
        assert_eq!(
            NewResume::new("DevOps", "   \n\t").validate(),
            Err(RecordError::EmptyText)
        );
    }

    #[test]
    fn test_validate_rejects_nul_byte() {
        assert_eq!(
            NewResume::new("DevOps", "ok\0bad").validate(),
            Err(RecordError::NulByte(2))
        );
    }

    #[test]
    fn test_validate_rejects_blank_category() {
        assert_eq!(
            NewResume::new("", "some text").validate(),
            Err(RecordError::EmptyCategory)
        );
    }

    #[test]
    fn test_analysis_serializes_named_fields() {
        let analysis = ResumeAnalysis {
            skills_gap: vec!["spark".to_string()],
            bullet_suggestions: vec![],
            career_path: None,
            neighbors: vec![],
        };
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["skills_gap"][0], "spark");
        assert!(json["career_path"].is_null());
        assert!(json["bullet_suggestions"].is_array());
    }
}
