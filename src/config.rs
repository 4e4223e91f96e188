use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_EVENTS_API_BASE: &str = "http://localhost:8000/api";
const DEFAULT_GEOCODE_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
const DEFAULT_KNOWLEDGE_BASE_ENDPOINT: &str = "https://www.wikidata.org/wiki/Special:EntityData";
const DEFAULT_IMAGE_FILE_PATH_BASE: &str = "https://commons.wikimedia.org/wiki/Special:FilePath";
const DEFAULT_PLACEHOLDER_IMAGE_BASE: &str = "https://placehold.co";
const DEFAULT_PAGE_SIZE: u32 = 12;
const DEFAULT_ENRICHMENT_DELAY_MS: u64 = 200;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const MAX_GEOCODE_CANDIDATES: usize = 5;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub events_api_base: String,
    pub events_api_token: Option<SecretString>,
    pub page_size: u32,
    pub geocode_endpoint: String,
    pub geocode_candidate_limit: usize,
    pub knowledge_base_endpoint: String,
    pub image_file_path_base: String,
    pub placeholder_image_base: String,
    pub enrichment_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub http_user_agent: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub events_api_base: String,
    pub page_size: u32,
    pub geocode_endpoint: String,
    pub geocode_candidate_limit: usize,
    pub knowledge_base_endpoint: String,
    pub placeholder_image_base: String,
    pub enrichment_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub has_events_api_token: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            events_api_base: env::var("EVENTS_API_BASE")
                .unwrap_or_else(|_| DEFAULT_EVENTS_API_BASE.to_string()),
            events_api_token: env::var("EVENTS_API_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            page_size: parse_u32("EVENTS_PAGE_SIZE", DEFAULT_PAGE_SIZE).max(1),
            geocode_endpoint: env::var("GEOCODE_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_GEOCODE_ENDPOINT.to_string()),
            geocode_candidate_limit: parse_usize(
                "GEOCODE_CANDIDATE_LIMIT",
                MAX_GEOCODE_CANDIDATES,
            )
            .clamp(1, MAX_GEOCODE_CANDIDATES),
            knowledge_base_endpoint: env::var("KNOWLEDGE_BASE_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_KNOWLEDGE_BASE_ENDPOINT.to_string()),
            image_file_path_base: env::var("IMAGE_FILE_PATH_BASE")
                .unwrap_or_else(|_| DEFAULT_IMAGE_FILE_PATH_BASE.to_string()),
            placeholder_image_base: env::var("PLACEHOLDER_IMAGE_BASE")
                .unwrap_or_else(|_| DEFAULT_PLACEHOLDER_IMAGE_BASE.to_string()),
            enrichment_delay_ms: parse_u64("ENRICHMENT_DELAY_MS", DEFAULT_ENRICHMENT_DELAY_MS),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS).max(1),
            http_user_agent: env::var("HTTP_USER_AGENT")
                .unwrap_or_else(|_| format!("event-venues/{}", env!("CARGO_PKG_VERSION"))),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            events_api_base: self.events_api_base.clone(),
            page_size: self.page_size,
            geocode_endpoint: self.geocode_endpoint.clone(),
            geocode_candidate_limit: self.geocode_candidate_limit,
            knowledge_base_endpoint: self.knowledge_base_endpoint.clone(),
            placeholder_image_base: self.placeholder_image_base.clone(),
            enrichment_delay_ms: self.enrichment_delay_ms,
            http_timeout_secs: self.http_timeout_secs,
            has_events_api_token: self.events_api_token.is_some(),
        }
    }

    pub fn enrichment_delay(&self) -> Duration {
        Duration::from_millis(self.enrichment_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Builds the shared HTTP client used by every outbound integration.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.http_user_agent.clone())
            .timeout(self.http_timeout())
            .build()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            events_api_base: DEFAULT_EVENTS_API_BASE.to_string(),
            events_api_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            geocode_endpoint: DEFAULT_GEOCODE_ENDPOINT.to_string(),
            geocode_candidate_limit: MAX_GEOCODE_CANDIDATES,
            knowledge_base_endpoint: DEFAULT_KNOWLEDGE_BASE_ENDPOINT.to_string(),
            image_file_path_base: DEFAULT_IMAGE_FILE_PATH_BASE.to_string(),
            placeholder_image_base: DEFAULT_PLACEHOLDER_IMAGE_BASE.to_string(),
            enrichment_delay_ms: DEFAULT_ENRICHMENT_DELAY_MS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            http_user_agent: format!("event-venues/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}
