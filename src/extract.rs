use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use crate::client::CLIENT;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::preferences::Preferences;
use crate::programs::{normalize_programs, CandidateProgram};

const PROVIDER: &str = "llm";
pub const MAX_OUTPUT_TOKENS: u32 = 700;
pub const TEMPERATURE: f32 = 0.2;

const SYSTEM_PROMPT: &str = r#"You extract graduate program facts from web search snippets and rank them for a student.
Reply with a single JSON object and nothing else, exactly in this schema:
{"ok":true,"programs":[{"name":"string","school":"string","tuition":number|null,"url":"string","minGpa":"string"|null,"testPolicy":"string"|null,"stem":true|false|null,"deadline":"string"|null,"why":"string","score":number|null}],"notes":"string"}
Rules:
- At most 3 programs, best match first.
- Only state facts supported by the snippets. If a fact is unknown use null, or "unknown" for name/school.
- tuition is a bare yearly number in USD with no currency symbol or commas.
- score is 0-100 for fit against the student's preferences.
- url must be one of the snippet URLs.
- Put caveats in notes."#;

/// What the extraction stage produced. Everything except `Structured` sends
/// the assembler down the snippet fallback path.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Disabled,
    MissingCredential,
    RateLimited { status: u16 },
    Unparseable,
    UnexpectedShape,
    Structured {
        programs: Vec<CandidateProgram>,
        notes: Option<String>,
    },
}

impl Extraction {
    pub fn note(&self) -> Option<String> {
        let reason = match self {
            Extraction::Disabled => "LLM extraction disabled by caller".to_string(),
            Extraction::MissingCredential => "LLM extraction skipped: missing credential".to_string(),
            Extraction::RateLimited { status } => {
                format!("LLM quota or rate limit hit (status {})", status)
            }
            Extraction::Unparseable => "LLM returned unparseable JSON".to_string(),
            Extraction::UnexpectedShape => "LLM returned non-JSON/unexpected shape".to_string(),
            Extraction::Structured { notes, .. } => return notes.clone(),
        };
        Some(format!("{}; showing raw search results.", reason))
    }

    /// The model answered but nothing usable came out of it.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Extraction::Unparseable | Extraction::UnexpectedShape)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Extraction::Disabled => "disabled",
            Extraction::MissingCredential => "missing_credential",
            Extraction::RateLimited { .. } => "rate_limited",
            Extraction::Unparseable => "unparseable",
            Extraction::UnexpectedShape => "unexpected_shape",
            Extraction::Structured { .. } => "structured",
        }
    }
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

pub fn build_user_prompt(prefs: &Preferences, query: &str, digest: &str) -> String {
    let mut prompt = String::with_capacity(digest.len() + 400);
    prompt.push_str("Student preferences:\n");
    prompt.push_str(&format!("- GPA: {}\n", prefs.gpa));
    prompt.push_str(&format!("- Yearly budget (USD): {}\n", prefs.budget));
    prompt.push_str(&format!("- Field: {}\n", prefs.field));
    prompt.push_str(&format!("- State: {}\n", prefs.state));
    prompt.push_str(&format!("- STEM only: {}\n", prefs.stem_only));
    prompt.push_str(&format!("\nSearch query: {}\n\nSearch snippets:\n", query));
    prompt.push_str(digest);
    prompt
}

/// Runs the extraction stage. Only a non-quota provider failure or a
/// transport failure is an error; every other outcome is an `Extraction`.
pub async fn extract(
    config: &Config,
    prefs: &Preferences,
    query: &str,
    digest: &str,
) -> Result<Extraction> {
    if !prefs.extraction_enabled {
        return Ok(Extraction::Disabled);
    }
    let Some(api_key) = config.llm_api_key.as_deref() else {
        return Ok(Extraction::MissingCredential);
    };

    let body = ChatRequest {
        model: config.llm_model.clone(),
        messages: vec![
            Message {
                role: "system".into(),
                content: SYSTEM_PROMPT.into(),
            },
            Message {
                role: "user".into(),
                content: build_user_prompt(prefs, query, digest),
            },
        ],
        max_tokens: MAX_OUTPUT_TOKENS,
        temperature: TEMPERATURE,
        response_format: ResponseFormat { kind: "json_object" },
    };

    tracing::info!(model = %config.llm_model, digest_chars = digest.chars().count(), "calling LLM provider");
    let started = Instant::now();

    let res = CLIENT
        .post(&config.llm_url)
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
    tracing::info!(
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "LLM provider responded"
    );

    if !status.is_success() {
        if is_rate_limited(status.as_u16(), &text) {
            tracing::warn!(status = status.as_u16(), "LLM provider quota/rate limit, degrading");
            return Ok(Extraction::RateLimited {
                status: status.as_u16(),
            });
        }
        return Err(AppError::upstream(PROVIDER, status.as_u16(), &text));
    }

    let outcome = match serde_json::from_str::<Value>(&text) {
        Ok(body) => interpret(&body),
        Err(e) => {
            tracing::warn!(error = %e, "LLM provider body is not JSON");
            Extraction::Unparseable
        }
    };
    Ok(outcome)
}

pub fn is_rate_limited(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }
    let body = body.to_ascii_lowercase();
    ["quota", "rate limit", "rate_limit", "ratelimit"]
        .iter()
        .any(|needle| body.contains(needle))
}

/// Turns a successful provider body into an extraction outcome.
pub fn interpret(body: &Value) -> Extraction {
    let Some(text) = response_text(body) else {
        return Extraction::Unparseable;
    };
    let Some(payload) = parse_lenient(&text) else {
        return Extraction::Unparseable;
    };
    let Some(entries) = payload.get("programs").and_then(Value::as_array) else {
        return Extraction::UnexpectedShape;
    };

    Extraction::Structured {
        programs: normalize_programs(entries),
        notes: payload.get("notes").and_then(Value::as_str).map(str::to_string),
    }
}

type TextProbe = fn(&Value) -> Option<String>;

/// Known places a provider puts generated text, newest API shape first.
const TEXT_PROBES: &[(&str, TextProbe)] = &[
    ("output_text", probe_output_text),
    ("output[].content[].text", probe_responses_output),
    ("choices[0].message.content", probe_chat_message),
    ("choices[0].text", probe_completion_text),
    ("content[].text", probe_content_blocks),
    ("candidates[0].content.parts[].text", probe_candidate_parts),
];

pub fn response_text(body: &Value) -> Option<String> {
    TEXT_PROBES.iter().find_map(|(path, probe)| {
        let text = probe(body).filter(|t| !t.trim().is_empty())?;
        tracing::debug!(path, "found model text");
        Some(text)
    })
}

fn join_texts<'a>(parts: impl Iterator<Item = &'a Value>) -> Option<String> {
    let joined: String = parts.filter_map(|p| p.get("text")?.as_str()).collect();
    Some(joined)
}

fn probe_output_text(body: &Value) -> Option<String> {
    match body.get("output_text")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(items.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

fn probe_responses_output(body: &Value) -> Option<String> {
    let output = body.get("output")?.as_array()?;
    join_texts(
        output
            .iter()
            .filter_map(|item| item.get("content")?.as_array())
            .flatten(),
    )
}

fn probe_chat_message(body: &Value) -> Option<String> {
    match body.pointer("/choices/0/message/content")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => join_texts(parts.iter()),
        _ => None,
    }
}

fn probe_completion_text(body: &Value) -> Option<String> {
    body.pointer("/choices/0/text")?.as_str().map(str::to_string)
}

fn probe_content_blocks(body: &Value) -> Option<String> {
    join_texts(body.get("content")?.as_array()?.iter())
}

fn probe_candidate_parts(body: &Value) -> Option<String> {
    join_texts(body.pointer("/candidates/0/content/parts")?.as_array()?.iter())
}

/// Strict parse first, then the first balanced `{...}` in the text.
pub fn parse_lenient(text: &str) -> Option<Value> {
    let strict = serde_json::from_str::<Value>(text.trim()).ok();
    if strict.as_ref().is_some_and(Value::is_object) {
        return strict;
    }
    balanced_object(text)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .or(strict)
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chat(content: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    #[test]
    fn probes_chat_completion_shape() {
        assert_eq!(response_text(&chat("hi")).as_deref(), Some("hi"));
    }

    #[test]
    fn probes_responses_api_shape() {
        let body = json!({
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [{"type": "output_text", "text": "{\"programs\":[]}"}]}
            ]
        });
        assert_eq!(response_text(&body).as_deref(), Some("{\"programs\":[]}"));
    }

    #[test]
    fn output_text_wins_over_choices() {
        let mut body = chat("from choices");
        body["output_text"] = json!("from output_text");
        assert_eq!(response_text(&body).as_deref(), Some("from output_text"));
    }

    #[test]
    fn empty_probe_falls_through_to_next() {
        let mut body = chat("from choices");
        body["output_text"] = json!("   ");
        assert_eq!(response_text(&body).as_deref(), Some("from choices"));
    }

    #[test]
    fn probes_content_blocks_and_candidates() {
        let anthropic = json!({"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]});
        assert_eq!(response_text(&anthropic).as_deref(), Some("ab"));
        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "g"}]}}]});
        assert_eq!(response_text(&gemini).as_deref(), Some("g"));
        assert_eq!(response_text(&json!({"id": "x"})), None);
    }

    #[test]
    fn lenient_parse_recovers_fenced_json() {
        let text = "Sure! ```json\n{\"programs\": [{\"name\": \"a } b\"}], \"notes\": \"n\"}\n``` hope it helps {";
        let v = parse_lenient(text).unwrap();
        assert_eq!(v["programs"][0]["name"], "a } b");
    }

    #[test]
    fn lenient_parse_gives_up_on_prose() {
        assert_eq!(parse_lenient("I could not find any programs."), None);
        assert_eq!(parse_lenient("unbalanced { \"a\": 1"), None);
    }

    #[test]
    fn interpret_outcomes() {
        assert_eq!(interpret(&chat("no json here")), Extraction::Unparseable);
        assert_eq!(interpret(&chat("{\"programs\": \"none\"}")), Extraction::UnexpectedShape);
        assert_eq!(interpret(&json!({})), Extraction::Unparseable);

        let body = chat(&json!({
            "ok": true,
            "programs": [{"name": "A", "tuition": 1000}, {"name": "B"}, {"name": "C"}, {"name": "D"}],
            "notes": "checked"
        }).to_string());
        match interpret(&body) {
            Extraction::Structured { programs, notes } => {
                assert_eq!(programs.len(), 3);
                assert_eq!(programs[0].tuition, Some(1000.0));
                assert_eq!(notes.as_deref(), Some("checked"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limited(429, ""));
        assert!(is_rate_limited(403, "{\"error\":{\"code\":\"insufficient_quota\"}}"));
        assert!(is_rate_limited(400, "Rate limit reached for requests"));
        assert!(!is_rate_limited(500, "internal error"));
    }

    #[test]
    fn notes_explain_fallback() {
        assert!(Extraction::Disabled.note().unwrap().contains("disabled by caller"));
        assert!(Extraction::MissingCredential.note().unwrap().contains("missing credential"));
        assert!(Extraction::Unparseable.note().unwrap().contains("unparseable JSON"));
        assert!(Extraction::UnexpectedShape.note().unwrap().contains("unexpected shape"));
        assert!(Extraction::RateLimited { status: 429 }.note().unwrap().contains("429"));
    }

    #[test]
    fn user_prompt_embeds_preferences_and_digest() {
        let prompt = build_user_prompt(&Preferences::default(), "q", "#1 MIT");
        assert!(prompt.contains("GPA: 3.0"));
        assert!(prompt.contains("budget (USD): 25000"));
        assert!(prompt.ends_with("#1 MIT"));
    }

    #[tokio::test]
    async fn disabled_and_missing_key_skip_the_call() {
        let config = Config {
            llm_url: "http://127.0.0.1:9/unreachable".into(),
            ..Config::default()
        };
        let disabled = Preferences {
            extraction_enabled: false,
            ..Preferences::default()
        };
        assert_eq!(extract(&config, &disabled, "q", "d").await.unwrap(), Extraction::Disabled);
        assert_eq!(
            extract(&config, &Preferences::default(), "q", "d").await.unwrap(),
            Extraction::MissingCredential
        );
    }
}
