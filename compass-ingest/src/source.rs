//! CSV input
//!
//! The dataset is one row per résumé with a category label and the raw
//! résumé text. Quoted multi-line fields are normal in this data.

use std::io::Read;
use std::path::Path;

use compass_core::NewResume;
use thiserror::Error;

use crate::error::IngestError;

const CATEGORY_HEADERS: &[&str] = &["category", "label"];
const TEXT_HEADERS: &[&str] = &["resume", "resume_text", "text"];

/// A row that could not be turned into a [`NewResume`]. Recorded as a
/// per-record failure; it never aborts the load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("line {line}: malformed row: {message}")]
    Malformed { line: u64, message: String },

    #[error("line {line}: missing {field} field")]
    MissingField { line: u64, field: &'static str },
}

pub type SourceRecord = Result<NewResume, RowError>;

pub fn read_csv_file(path: impl AsRef<Path>) -> Result<Vec<SourceRecord>, IngestError> {
    let file = std::fs::File::open(path.as_ref()).map_err(csv::Error::from)?;
    read_records(file)
}

/// Parse every data row. Only an unreadable input or a missing column is an
/// error; bad rows come back as `Err` entries in place.
pub fn read_records<R: Read>(input: R) -> Result<Vec<SourceRecord>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    let category_idx = find_column(&headers, CATEGORY_HEADERS).ok_or_else(|| {
        IngestError::MissingColumn {
            column: "category",
            accepted: CATEGORY_HEADERS.join(", "),
        }
    })?;
    let text_idx =
        find_column(&headers, TEXT_HEADERS).ok_or_else(|| IngestError::MissingColumn {
            column: "résumé text",
            accepted: TEXT_HEADERS.join(", "),
        })?;

    let mut records = Vec::new();
    for row in reader.records() {
        let record = match row {
            Ok(row) => {
                let line = row.position().map(|p| p.line()).unwrap_or(0);
                match (row.get(category_idx), row.get(text_idx)) {
                    (Some(category), Some(text)) => {
                        Ok(NewResume::new(category.trim(), text.to_string()))
                    }
                    (None, _) => Err(RowError::MissingField {
                        line,
                        field: "category",
                    }),
                    (_, None) => Err(RowError::MissingField { line, field: "text" }),
                }
            }
            Err(e) => Err(RowError::Malformed {
                line: e.position().map(|p| p.line()).unwrap_or(0),
                message: e.to_string(),
            }),
        };
        records.push(record);
    }

    tracing::debug!(rows = records.len(), "Read CSV input");
    Ok(records)
}

fn find_column(headers: &csv::StringRecord, accepted: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim().trim_start_matches('\u{feff}').to_lowercase();
        accepted.contains(&h.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_standard_headers() {
        let data = "Category,Resume\nData Science,\"Python, SQL\"\nDevOps,Kubernetes\n";
        let records = read_records(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].as_ref().unwrap(),
            &NewResume::new("Data Science", "Python, SQL")
        );
    }

    #[test]
    fn test_header_aliases_and_column_order() {
        let data = "id,resume_text,LABEL\n1,Figma and CSS,Web Designing\n";
        let records = read_records(data.as_bytes()).unwrap();
        let resume = records[0].as_ref().unwrap();
        assert_eq!(resume.category, "Web Designing");
        assert_eq!(resume.text, "Figma and CSS");
    }

    #[test]
    fn test_multiline_quoted_field() {
        let data = "Category,Resume\nHR,\"line one\nline two\"\n";
        let records = read_records(data.as_bytes()).unwrap();
        assert_eq!(records[0].as_ref().unwrap().text, "line one\nline two");
    }

    #[test]
    fn test_short_row_is_a_row_error() {
        let data = "Category,Resume\nHR\nDevOps,Docker\n";
        let records = read_records(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(
            records[0],
            Err(RowError::MissingField { field: "text", .. })
        ));
        assert!(records[1].is_ok());
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let data = "Category,Body\nHR,text\n";
        assert!(matches!(
            read_records(data.as_bytes()),
            Err(IngestError::MissingColumn { column: "résumé text", .. })
        ));
    }

    #[test]
    fn test_read_csv_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "category,resume\nHR,Payroll\n").unwrap();
        let records = read_csv_file(file.path()).unwrap();
        assert_eq!(records.len(), 1);

        assert!(matches!(
            read_csv_file("/nonexistent/resumes.csv"),
            Err(IngestError::Source(_))
        ));
    }
}
