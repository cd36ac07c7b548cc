use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFAULT_SEARCH_URL: &str = "https://api.tavily.com/search";
pub const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Process-wide settings, resolved once at startup and never mutated.
///
/// Provider credentials are optional here: a missing key is reported per
/// request rather than refusing to boot.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub search_api_key: Option<String>,
    pub search_url: String,
    pub llm_api_key: Option<String>,
    pub llm_url: String,
    pub llm_model: String,
    /// Malformed model output fails the request (424) instead of falling back.
    pub require_structured: bool,
    pub upstream_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
            search_api_key: None,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            llm_api_key: None,
            llm_url: DEFAULT_LLM_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            require_structured: false,
            upstream_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(45),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::Config(format!("Invalid host address: {}", e)))?;

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            search_api_key: credential("TAVILY_API_KEY"),
            search_url: env::var("SEARCH_API_URL").unwrap_or(defaults.search_url),
            llm_api_key: credential("OPENAI_API_KEY"),
            llm_url: env::var("LLM_API_URL").unwrap_or(defaults.llm_url),
            llm_model: env::var("LLM_MODEL").unwrap_or(defaults.llm_model),
            require_structured: env::var("REQUIRE_STRUCTURED")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            upstream_timeout: seconds("UPSTREAM_TIMEOUT_SECS", defaults.upstream_timeout)?,
            request_timeout: seconds("REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
        })
    }
}

fn credential(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn seconds(name: &str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
