use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::models::EventRecord;

/// Backend-side filters; each distinct value defines its own pagination session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilters {
    pub category: Option<String>,
    pub organizer_id: Option<i64>,
}

impl EventFilters {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            organizer_id: None,
        }
    }

    pub fn organizer(organizer_id: i64) -> Self {
        Self {
            category: None,
            organizer_id: Some(organizer_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
    pub filters: EventFilters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub events: Vec<EventRecord>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> AppResult<EventPage>;
}

pub fn http_event_source(config: &AppConfig) -> AppResult<Arc<dyn EventSource>> {
    Ok(Arc::new(HttpEventSource::new(config)?))
}

/// `GET {base}/events?page=&per_page=&category=&organizer=` against the ticketing backend.
pub struct HttpEventSource {
    http: Client,
    base: Url,
    token: Option<SecretString>,
}

impl HttpEventSource {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let base = Url::parse(config.events_api_base.trim_end_matches('/'))
            .map_err(|err| AppError::Config(format!("invalid events API base URL: {err}")))?;
        Ok(Self {
            http: config.http_client()?,
            base,
            token: config.events_api_token.clone(),
        })
    }

    fn events_url(&self, request: &PageRequest) -> AppResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("invalid events API base".into()))?
            .pop_if_empty()
            .push("events");

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &request.page.to_string())
                .append_pair("per_page", &request.page_size.to_string());
            if let Some(category) = request
                .filters
                .category
                .as_deref()
                .filter(|value| !value.is_empty())
            {
                query.append_pair("category", category);
            }
            if let Some(organizer_id) = request.filters.organizer_id {
                query.append_pair("organizer", &organizer_id.to_string());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn fetch_page(&self, request: &PageRequest) -> AppResult<EventPage> {
        let url = self.events_url(request)?;
        let mut builder = self.http.get(url.clone());
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "events",
                page = request.page,
                status = status.as_u16(),
                "event page request rejected"
            );
            return Err(AppError::Status {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
            });
        }

        let page: EventPage = response.json().await?;
        debug!(
            target: "events",
            page = request.page,
            received = page.events.len(),
            total = ?page.total,
            "fetched event page"
        );
        Ok(page)
    }
}
