use serde::Serialize;
use serde_json::Value;

use crate::api::models::{ProgramsResponse, QueryEcho};
use crate::error::{AppError, Result};
use crate::extract::Extraction;
use crate::preferences::Preferences;
use crate::search::{SearchOutcome, Snippet};

pub const MAX_PROGRAMS: usize = 3;
pub const FALLBACK_NAME: &str = "(unknown — open page)";
const UNKNOWN: &str = "unknown";

/// The one record shape the service ever returns, whether it came from the
/// model or was synthesized from a search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProgram {
    pub name: String,
    pub school: String,
    pub tuition: Option<f64>,
    pub url: String,
    pub min_gpa: Option<String>,
    pub test_policy: Option<String>,
    pub stem: Option<bool>,
    pub deadline: Option<String>,
    pub why: String,
    pub score: Option<f64>,
}

impl CandidateProgram {
    /// Coerces one loosely-typed model entry. Unknown types become null.
    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| value.get(key).unwrap_or(&Value::Null);

        CandidateProgram {
            name: text(field("name")).unwrap_or_else(|| UNKNOWN.to_string()),
            school: text(field("school")).unwrap_or_else(|| UNKNOWN.to_string()),
            tuition: number(field("tuition")),
            url: text(field("url")).unwrap_or_default(),
            min_gpa: text_or_number(field("minGpa")),
            test_policy: text_or_number(field("testPolicy")),
            stem: field("stem").as_bool(),
            deadline: text_or_number(field("deadline")),
            why: text(field("why")).unwrap_or_default(),
            score: number(field("score")).map(|s| s.clamp(0.0, 100.0)),
        }
    }

    pub fn from_snippet(snippet: &Snippet, field_of_study: &str) -> Self {
        CandidateProgram {
            name: FALLBACK_NAME.to_string(),
            school: snippet.title.clone(),
            tuition: None,
            url: snippet.url.clone(),
            min_gpa: None,
            test_policy: None,
            stem: None,
            deadline: None,
            why: format!(
                "Surfaced by web search for {} master's programs; open the page to verify tuition, GPA and test requirements.",
                field_of_study
            ),
            score: None,
        }
    }
}

fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn text_or_number(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        _ => text(value),
    }
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .replace("USD", "")
                .chars()
                .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

/// Caps and normalizes the model's `programs` array.
pub fn normalize_programs(entries: &[Value]) -> Vec<CandidateProgram> {
    entries
        .iter()
        .take(MAX_PROGRAMS)
        .map(CandidateProgram::from_value)
        .collect()
}

pub fn fallback_programs(snippets: &[Snippet], field_of_study: &str) -> Vec<CandidateProgram> {
    snippets
        .iter()
        .take(MAX_PROGRAMS)
        .map(|s| CandidateProgram::from_snippet(s, field_of_study))
        .collect()
}

/// Turns the search hits and extraction outcome into the response body.
pub fn assemble(
    prefs: &Preferences,
    search: &SearchOutcome,
    extraction: Extraction,
    require_structured: bool,
) -> Result<ProgramsResponse> {
    let (programs, notes) = match extraction {
        Extraction::Structured { programs, notes } => (programs, notes),
        degraded => {
            let note = degraded.note();
            if require_structured && degraded.is_malformed() {
                return Err(AppError::NoStructuredOutput(
                    note.unwrap_or_else(|| "model output was not usable".to_string()),
                ));
            }
            (fallback_programs(&search.snippets, &prefs.field), note)
        }
    };

    let mut programs = programs;
    programs.truncate(MAX_PROGRAMS);

    Ok(ProgramsResponse {
        ok: true,
        query: QueryEcho::new(prefs, &search.query),
        count: programs.len(),
        programs,
        notes,
    })
}
