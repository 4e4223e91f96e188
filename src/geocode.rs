use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::{AppConfig, MAX_GEOCODE_CANDIDATES};
use crate::errors::{AppError, AppResult};

const COMMONS_THUMB_WIDTH: &str = "640";
const IMAGE_CLAIM: &str = "P18";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceRecord {
    pub place_id: Option<String>,
    pub external_id: Option<String>,
    pub display_name: String,
    pub importance: f64,
    pub category: Option<String>,
    pub kind: Option<String>,
    pub address: BTreeMap<String, String>,
    pub knowledge_base_id: Option<String>,
}

impl PlaceRecord {
    pub fn populated_address_fields(&self) -> usize {
        self.address
            .values()
            .filter(|value| !value.trim().is_empty())
            .count()
    }

    pub fn city(&self) -> Option<&str> {
        ["city", "town", "village", "municipality"]
            .iter()
            .find_map(|key| self.address_field(key))
    }

    pub fn country(&self) -> Option<&str> {
        self.address_field("country")
    }

    /// Amenity type, e.g. `theatre` or `nightclub`, when the place is an amenity.
    pub fn amenity_type(&self) -> Option<&str> {
        if self.category.as_deref() == Some("amenity") {
            self.kind.as_deref().filter(|kind| !kind.trim().is_empty())
        } else {
            None
        }
    }

    fn address_field(&self, key: &str) -> Option<&str> {
        self.address
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

#[async_trait]
pub trait GeocodeResolver: Send + Sync {
    /// Ranked candidates for a free-text address; empty when nothing matched.
    async fn search(&self, query: &str) -> AppResult<Vec<PlaceRecord>>;
}

#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn image_for(&self, knowledge_base_id: &str) -> AppResult<Option<String>>;
}

pub struct NominatimGeocoder {
    http: Client,
    endpoint: Url,
    limit: usize,
}

impl NominatimGeocoder {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let endpoint = Url::parse(&config.geocode_endpoint)
            .map_err(|err| AppError::Config(format!("invalid geocode endpoint: {err}")))?;
        Ok(Self {
            http: config.http_client()?,
            endpoint,
            limit: config.geocode_candidate_limit.clamp(1, MAX_GEOCODE_CANDIDATES),
        })
    }
}

#[async_trait]
impl GeocodeResolver for NominatimGeocoder {
    async fn search(&self, query: &str) -> AppResult<Vec<PlaceRecord>> {
        #[derive(Deserialize)]
        struct ResponsePlace {
            place_id: Option<u64>,
            osm_id: Option<u64>,
            #[serde(default)]
            display_name: String,
            importance: Option<f64>,
            #[serde(alias = "class")]
            category: Option<String>,
            #[serde(rename = "type")]
            kind: Option<String>,
            #[serde(default)]
            address: BTreeMap<String, Value>,
            #[serde(default)]
            extratags: Option<BTreeMap<String, Value>>,
        }

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "jsonv2")
            .append_pair("addressdetails", "1")
            .append_pair("extratags", "1")
            .append_pair("limit", &self.limit.to_string());

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                endpoint: self.endpoint.path().to_string(),
                status: status.as_u16(),
            });
        }

        let places: Vec<ResponsePlace> = response.json().await?;
        trace!(target: "geocode", candidates = places.len(), "geocode search returned");
        Ok(places
            .into_iter()
            .map(|place| PlaceRecord {
                place_id: place.place_id.map(|id| id.to_string()),
                external_id: place.osm_id.map(|id| id.to_string()),
                display_name: place.display_name,
                importance: place.importance.unwrap_or(0.0),
                category: place.category,
                kind: place.kind,
                address: string_fields(place.address),
                knowledge_base_id: place
                    .extratags
                    .and_then(|tags| tags.get("wikidata").and_then(Value::as_str).map(str::to_string)),
            })
            .collect())
    }
}

fn string_fields(fields: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    fields
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key, text)),
            Value::Number(number) => Some((key, number.to_string())),
            _ => None,
        })
        .collect()
}

/// Looks up the image claim of a knowledge-base entity and maps its file name
/// onto a file-path URL.
pub struct WikidataImages {
    http: Client,
    entity_endpoint: Url,
    file_path_base: Url,
}

impl WikidataImages {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let entity_endpoint = Url::parse(config.knowledge_base_endpoint.trim_end_matches('/'))
            .map_err(|err| AppError::Config(format!("invalid knowledge base endpoint: {err}")))?;
        let file_path_base = Url::parse(config.image_file_path_base.trim_end_matches('/'))
            .map_err(|err| AppError::Config(format!("invalid image file path base: {err}")))?;
        Ok(Self {
            http: config.http_client()?,
            entity_endpoint,
            file_path_base,
        })
    }

    fn file_url(&self, file_name: &str) -> AppResult<String> {
        let mut url = self.file_path_base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("invalid image file path base".into()))?
            .pop_if_empty()
            .push(file_name);
        url.query_pairs_mut()
            .append_pair("width", COMMONS_THUMB_WIDTH);
        Ok(url.to_string())
    }
}

#[async_trait]
impl ImageResolver for WikidataImages {
    async fn image_for(&self, knowledge_base_id: &str) -> AppResult<Option<String>> {
        if !is_entity_id(knowledge_base_id) {
            debug!(target: "geocode", knowledge_base_id, "ignoring malformed entity id");
            return Ok(None);
        }

        let mut url = self.entity_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("invalid knowledge base endpoint".into()))?
            .pop_if_empty()
            .push(&format!("{knowledge_base_id}.json"));

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::Status {
                endpoint: self.entity_endpoint.path().to_string(),
                status: status.as_u16(),
            });
        }

        let entity: Value = response.json().await?;
        let file_name = entity
            .get("entities")
            .and_then(|entities| entities.get(knowledge_base_id))
            .and_then(|entity| entity.pointer(&format!("/claims/{IMAGE_CLAIM}/0/mainsnak/datavalue/value")))
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty());

        file_name.map(|name| self.file_url(name)).transpose()
    }
}

fn is_entity_id(value: &str) -> bool {
    value
        .strip_prefix('Q')
        .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}
