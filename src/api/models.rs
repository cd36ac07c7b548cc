use serde::Serialize;

use crate::preferences::Preferences;
use crate::programs::CandidateProgram;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEcho {
    pub gpa: String,
    pub budget: String,
    pub program: String,
    pub state: String,
    pub stem_only: bool,
    pub extraction: bool,
    /// The search string actually sent to the provider.
    pub search: String,
}

impl QueryEcho {
    pub fn new(prefs: &Preferences, search: &str) -> Self {
        QueryEcho {
            gpa: prefs.gpa.clone(),
            budget: prefs.budget.clone(),
            program: prefs.field.clone(),
            state: prefs.state.clone(),
            stem_only: prefs.stem_only,
            extraction: prefs.extraction_enabled,
            search: search.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgramsResponse {
    pub ok: bool,
    pub query: QueryEcho,
    pub programs: Vec<CandidateProgram>,
    pub notes: Option<String>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}
