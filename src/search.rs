use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use crate::client::CLIENT;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::preferences::Preferences;

const PROVIDER: &str = "search";
pub const MAX_RESULTS: usize = 8;
pub const DIGEST_CHARS: usize = 4000;

/// Forum, Q&A and aggregator sites rarely carry admissions facts.
pub const EXCLUDED_DOMAINS: &[&str] = &[
    "reddit.com",
    "quora.com",
    "medium.com",
    "pinterest.com",
    "facebook.com",
    "youtube.com",
    "tiktok.com",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub title: String,
    pub url: String,
    pub excerpt: String,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub query: String,
    pub snippets: Vec<Snippet>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    exclude_domains: &'a [&'a str],
}

impl Snippet {
    /// Projects one provider result. Missing or non-string fields become empty.
    fn from_value(raw: &Value) -> Self {
        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        let excerpt = ["snippet", "excerpt", "content"]
            .into_iter()
            .map(text)
            .find(|s| !s.is_empty())
            .unwrap_or_default();

        Snippet {
            title: text("title"),
            url: text("url"),
            excerpt,
        }
    }
}

/// `results` may be absent, null or not an array; all of those mean no hits.
fn project_results(body: &Value) -> Vec<Snippet> {
    body.get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter(|r| r.is_object())
                .map(Snippet::from_value)
                .collect()
        })
        .unwrap_or_default()
}

pub fn build_query(prefs: &Preferences) -> String {
    let location = if prefs.state_is_any() {
        "in the US".to_string()
    } else {
        format!("in {}", prefs.state)
    };
    let stem = if prefs.stem_only { "STEM only" } else { "" };

    let raw = format!(
        "best {} master's programs {} tuition, minimum GPA, GRE/GMAT policy, scholarships {}",
        prefs.field, location, stem
    );
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Numbered snippet blocks, cut at a fixed char budget. The cut can land
/// mid-snippet.
pub fn build_digest(snippets: &[Snippet]) -> String {
    let digest = snippets
        .iter()
        .enumerate()
        .map(|(i, s)| format!("#{} {}\n{}\nURL: {}", i + 1, s.title, s.excerpt, s.url))
        .collect::<Vec<_>>()
        .join("\n\n");

    digest.chars().take(DIGEST_CHARS).collect()
}

pub async fn search(config: &Config, prefs: &Preferences) -> Result<SearchOutcome> {
    let api_key = config
        .search_api_key
        .as_deref()
        .ok_or_else(|| AppError::Config("search provider API key is not configured".to_string()))?;

    let query = build_query(prefs);
    tracing::info!(%query, "querying search provider");
    let started = Instant::now();

    let body = SearchRequest {
        query: &query,
        search_depth: "advanced",
        max_results: MAX_RESULTS,
        exclude_domains: EXCLUDED_DOMAINS,
    };

    let res = CLIENT
        .post(&config.search_url)
        .bearer_auth(api_key)
        .timeout(config.upstream_timeout)
        .json(&body)
        .send()
        .await
        .map_err(|e| AppError::transport(PROVIDER, e))?;

    let status = res.status();
    let text = res
        .text()
        .await
        .map_err(|e| AppError::transport(PROVIDER, e))?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "search provider rejected request");
        return Err(AppError::upstream(PROVIDER, status.as_u16(), &text));
    }

    let parsed: Value = serde_json::from_str(&text).map_err(|e| AppError::Transport {
        provider: PROVIDER,
        message: format!("invalid JSON body: {}", e),
    })?;

    let snippets = project_results(&parsed);
    tracing::info!(
        results = snippets.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "search provider responded"
    );

    if snippets.is_empty() {
        return Err(AppError::NoResults(query));
    }

    Ok(SearchOutcome { query, snippets })
}
