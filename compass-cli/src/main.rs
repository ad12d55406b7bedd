//! compass-cli — command-line client for the Career Compass HTTP API
//!
//! # Subcommands
//! - `search <query> [-k <n>] [--json]` — nearest résumés to a query text
//! - `advise <FILE> [--json]`           — upload a résumé (PDF or text) for advice
//! - `status`                            — show server health

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_K: u32 = 5;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "compass-cli",
    version,
    about = "Career Compass résumé similarity search and advice"
)]
struct Cli {
    /// Career Compass HTTP server URL (overrides COMPASS_HTTP_URL env var)
    #[arg(long, env = "COMPASS_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Find the stored résumés closest to a query
    Search {
        /// Query text to search for
        query: String,

        /// Number of results to return
        #[arg(short = 'k', long, default_value_t = DEFAULT_K)]
        k: u32,

        /// Print the raw results as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Upload a résumé and print skills gap, suggestions and career path
    Advise {
        /// Résumé file (PDF or plain text)
        file: PathBuf,

        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub category: String,
    pub text: String,
    pub distance: f64,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub query: String,
    pub count: usize,
    pub took_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: i64,
    pub category: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub skills_gap: Vec<String>,
    pub bullet_suggestions: Vec<String>,
    pub career_path: Option<String>,
    #[serde(default)]
    pub neighbors: Vec<Neighbor>,
}

// ============================================================================
// Output formatting
// ============================================================================

/// First non-empty line, capped at `max` characters.
pub fn title_line(text: &str, max: usize) -> String {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .chars()
        .take(max)
        .collect()
}

pub fn format_hit(rank: usize, hit: &SearchHit) -> String {
    format!(
        "{}. [{}] #{}  similarity {:.0}%\n   {}",
        rank,
        hit.category,
        hit.id,
        (1.0 - hit.distance) * 100.0,
        title_line(&hit.text, 100)
    )
}

pub fn format_analysis(analysis: &Analysis) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Career path:  {}\n",
        analysis.career_path.as_deref().unwrap_or("(no data yet)")
    ));

    out.push_str("Skills gap:\n");
    if analysis.skills_gap.is_empty() {
        out.push_str("  (none found)\n");
    }
    for skill in &analysis.skills_gap {
        out.push_str(&format!("  - {}\n", skill));
    }

    out.push_str("Suggestions:\n");
    for suggestion in &analysis.bullet_suggestions {
        out.push_str(&format!("  - {}\n", suggestion));
    }

    if !analysis.neighbors.is_empty() {
        let similar: Vec<String> = analysis
            .neighbors
            .iter()
            .map(|n| format!("{} #{}", n.category, n.id))
            .collect();
        out.push_str(&format!("Most similar: {}\n", similar.join(", ")));
    }
    out
}

/// `{"error":{"message":...}}` from the server, or the raw body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn check_status(resp: reqwest::blocking::Response) -> reqwest::blocking::Response {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("compass-cli: server returned {}: {}", status, error_message(&body));
        std::process::exit(1);
    }
    resp
}

fn do_search(server: &str, query: &str, k: u32, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/search", server);
    let body = serde_json::json!({ "query": query, "k": k });

    let resp = match client(30)?.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("compass-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let search_resp: SearchResponse = match check_status(resp).json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("compass-cli: failed to parse search response: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&search_resp.results)?);
        return Ok(());
    }

    if search_resp.results.is_empty() {
        eprintln!("No results found for: {}", query);
        return Ok(());
    }
    for (i, hit) in search_resp.results.iter().enumerate() {
        println!("{}\n", format_hit(i + 1, hit));
    }
    if let Some(ms) = search_resp.took_ms {
        println!("{} results in {} ms", search_resp.count, ms);
    }
    Ok(())
}

fn do_advise(server: &str, file: &Path, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/advise", server);
    let form = reqwest::blocking::multipart::Form::new().file("resume", file)?;

    let resp = match client(120)?.post(&url).multipart(form).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("compass-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let analysis: Analysis = match check_status(resp).json() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("compass-cli: failed to parse advice response: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print!("{}", format_analysis(&analysis));
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);

    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Career Compass: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("Model:          {}", body["model"].as_str().unwrap_or("?"));
            println!("PostgreSQL:     {}", body["postgresql"].as_str().unwrap_or("?"));
            println!("pgvector:       {}", body["pgvector"].as_str().unwrap_or("?"));
            println!("Résumés:        {}", body["resumes"]);
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("compass-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("compass-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Search { query, k, json } => do_search(&server, &query, k, json),
        Commands::Advise { file, json } => do_advise(&server, &file, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("compass-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: i64, category: &str, text: &str, distance: f64) -> SearchHit {
        SearchHit {
            id,
            category: category.to_string(),
            text: text.to_string(),
            distance,
        }
    }

    // ========================================================================
    // TEST 1: title uses the first non-empty line, truncated
    // ========================================================================
    #[test]
    fn test_title_line() {
        assert_eq!(title_line("\n\n  Senior Engineer  \nmore", 60), "Senior Engineer");
        assert_eq!(title_line(&"A".repeat(100), 60), "A".repeat(60));
        assert_eq!(title_line("", 60), "");
    }

    // ========================================================================
    // TEST 2: hit formatting shows rank, category, id and similarity
    // ========================================================================
    #[test]
    fn test_format_hit() {
        let line = format_hit(1, &hit(42, "Data Science", "Python ETL\nSpark", 0.25));
        assert!(line.starts_with("1. [Data Science] #42"));
        assert!(line.contains("similarity 75%"));
        assert!(line.contains("Python ETL"));
        assert!(!line.contains("Spark"));
    }

    // ========================================================================
    // TEST 3: analysis formatting
    // ========================================================================
    #[test]
    fn test_format_analysis() {
        let analysis = Analysis {
            skills_gap: vec!["spark".to_string(), "airflow".to_string()],
            bullet_suggestions: vec!["Include certifications and continued education".to_string()],
            career_path: Some("Data Science".to_string()),
            neighbors: vec![Neighbor {
                id: 3,
                category: "Data Science".to_string(),
                distance: 0.1,
            }],
        };
        let out = format_analysis(&analysis);
        assert!(out.contains("Career path:  Data Science"));
        assert!(out.contains("  - spark\n"));
        assert!(out.contains("  - Include certifications"));
        assert!(out.contains("Most similar: Data Science #3"));
    }

    #[test]
    fn test_format_analysis_empty_store() {
        let analysis = Analysis {
            skills_gap: vec![],
            bullet_suggestions: vec![],
            career_path: None,
            neighbors: vec![],
        };
        let out = format_analysis(&analysis);
        assert!(out.contains("(no data yet)"));
        assert!(out.contains("(none found)"));
        assert!(!out.contains("Most similar"));
    }

    // ========================================================================
    // TEST 4: server error envelope is unwrapped
    // ========================================================================
    #[test]
    fn test_error_message() {
        let body = r#"{"error":{"code":"bad_request","message":"query field is required"}}"#;
        assert_eq!(error_message(body), "query field is required");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    // ========================================================================
    // TEST 5: server responses deserialize
    // ========================================================================
    #[test]
    fn test_search_response_parses() {
        let body = r#"{"results":[{"id":1,"category":"HR","text":"payroll","distance":0.3}],
                       "query":"payroll","count":1,"took_ms":4}"#;
        let resp: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.count, 1);
        assert_eq!(resp.results[0].category, "HR");
        assert_eq!(resp.took_ms, Some(4));
    }

    #[test]
    fn test_analysis_parses_without_neighbors() {
        let body = r#"{"skills_gap":[],"bullet_suggestions":["x"],"career_path":null}"#;
        let analysis: Analysis = serde_json::from_str(body).unwrap();
        assert!(analysis.career_path.is_none());
        assert!(analysis.neighbors.is_empty());
    }
}
