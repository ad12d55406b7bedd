//! Résumé advice from nearest neighbors
//!
//! Pure functions over the uploaded text and the résumés closest to it.
//! Nothing here touches the store; the HTTP layer runs the search.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use compass_core::{NeighborSummary, ResumeAnalysis, ScoredResume};
use regex::Regex;

const MIN_TERM_LEN: usize = 3;

/// Below this many words a résumé is flagged as thin.
const SHORT_RESUME_WORDS: usize = 150;

const STOPWORDS: &[&str] = &[
    "about", "across", "all", "also", "and", "any", "are", "but", "can", "company", "did",
    "each", "etc", "experience", "for", "from", "good", "has", "have", "her", "his", "into",
    "its", "knowledge", "like", "month", "months", "more", "new", "not", "one", "our", "over",
    "per", "project", "projects", "responsible", "role", "skill", "skills", "such", "team",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "using",
    "various", "was", "were", "which", "while", "who", "will", "with", "work", "worked",
    "working", "year", "years", "you", "your",
];

pub const QUANTIFY_SUGGESTION: &str =
    "Add quantifiable achievements to your experience section (numbers, percentages, scale)";
pub const CERTIFICATION_SUGGESTION: &str = "Include certifications and continued education";
pub const EXPAND_SUGGESTION: &str =
    "Expand your experience section with specific projects, tools and outcomes";

const TERM_PATTERN: &str = r"[a-z][a-z0-9+#]*";

fn term_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(TERM_PATTERN).expect("term pattern is a valid regex"))
}

/// Distinct lower-cased terms worth comparing across résumés.
pub fn terms(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    term_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Category with the largest summed similarity among `neighbors`.
/// Ties go to the alphabetically first category.
pub fn career_path(neighbors: &[ScoredResume]) -> Option<String> {
    let mut votes: BTreeMap<&str, f64> = BTreeMap::new();
    for n in neighbors {
        *votes.entry(n.record.category.as_str()).or_insert(0.0) += n.similarity();
    }

    let mut best: Option<(&str, f64)> = None;
    for (category, score) in votes {
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((category, score));
        }
    }
    best.map(|(category, _)| category.to_string())
}

/// Terms shared by at least half of the `category` neighbors that the
/// résumé lacks, most common first.
pub fn skills_gap(
    resume_text: &str,
    neighbors: &[ScoredResume],
    category: &str,
    max_skills: usize,
) -> Vec<String> {
    let own = terms(resume_text);
    let peers: Vec<&ScoredResume> = neighbors
        .iter()
        .filter(|n| n.record.category == category)
        .collect();
    if peers.is_empty() {
        return Vec::new();
    }

    let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
    for peer in &peers {
        for term in terms(&peer.record.text) {
            *doc_freq.entry(term).or_insert(0) += 1;
        }
    }

    let mut gap: Vec<(String, usize)> = doc_freq
        .into_iter()
        .filter(|(term, df)| 2 * df >= peers.len() && !own.contains(term))
        .collect();
    // BTreeMap order is alphabetical; the stable sort keeps it within equal counts.
    gap.sort_by(|a, b| b.1.cmp(&a.1));
    gap.into_iter()
        .take(max_skills)
        .map(|(term, _)| term)
        .collect()
}

pub fn bullet_suggestions(resume_text: &str, skills_gap: &[String]) -> Vec<String> {
    let mut suggestions = Vec::new();

    if !resume_text.chars().any(|c| c.is_ascii_digit()) {
        suggestions.push(QUANTIFY_SUGGESTION.to_string());
    }
    if !skills_gap.is_empty() {
        suggestions.push(format!(
            "Highlight your experience with {}",
            skills_gap.join(", ")
        ));
    }
    if !resume_text.to_lowercase().contains("certif") {
        suggestions.push(CERTIFICATION_SUGGESTION.to_string());
    }
    if resume_text.split_whitespace().count() < SHORT_RESUME_WORDS {
        suggestions.push(EXPAND_SUGGESTION.to_string());
    }
    suggestions
}

pub fn analyze(resume_text: &str, neighbors: &[ScoredResume], max_skills: usize) -> ResumeAnalysis {
    let career_path = career_path(neighbors);
    let skills_gap = career_path
        .as_deref()
        .map(|category| skills_gap(resume_text, neighbors, category, max_skills))
        .unwrap_or_default();
    let bullet_suggestions = bullet_suggestions(resume_text, &skills_gap);

    ResumeAnalysis {
        skills_gap,
        bullet_suggestions,
        career_path,
        neighbors: neighbors.iter().map(NeighborSummary::from).collect(),
    }
}
