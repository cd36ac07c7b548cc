use std::collections::HashMap;

pub const DEFAULT_GPA: &str = "3.0";
pub const DEFAULT_BUDGET: &str = "25000";
pub const DEFAULT_FIELD: &str = "Computer Science";
pub const ANY_STATE: &str = "Any";

/// Caller preferences for one request. gpa and budget are carried as the
/// caller typed them; they only ever end up inside prompts and the echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub gpa: String,
    pub budget: String,
    pub field: String,
    pub state: String,
    pub stem_only: bool,
    pub extraction_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            gpa: DEFAULT_GPA.to_string(),
            budget: DEFAULT_BUDGET.to_string(),
            field: DEFAULT_FIELD.to_string(),
            state: ANY_STATE.to_string(),
            stem_only: false,
            extraction_enabled: true,
        }
    }
}

impl Preferences {
    /// Never fails: anything absent or blank takes its default.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let defaults = Preferences::default();
        let value = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        Preferences {
            gpa: value("gpa").map(str::to_string).unwrap_or(defaults.gpa),
            budget: value("budget").map(str::to_string).unwrap_or(defaults.budget),
            field: value("program").map(str::to_string).unwrap_or(defaults.field),
            state: value("state").map(str::to_string).unwrap_or(defaults.state),
            stem_only: value("stemOnly").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            extraction_enabled: !value("llm").is_some_and(|v| v.eq_ignore_ascii_case("off")),
        }
    }

    pub fn state_is_any(&self) -> bool {
        self.state.eq_ignore_ascii_case(ANY_STATE)
    }
}
