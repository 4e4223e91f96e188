use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::config::{AppConfig, MAX_GEOCODE_CANDIDATES};
use crate::errors::{AppError, AppResult};
use crate::fallback::{rating_for_key, rating_key, PlaceholderImages};
use crate::geocode::{GeocodeResolver, ImageResolver, NominatimGeocoder, PlaceRecord, WikidataImages};
use crate::models::{EnrichmentOutcome, LocationDetails};

const ADDRESS_FIELD_WEIGHT: f64 = 0.1;

/// Serialises geocoder calls and keeps a fixed minimum gap between their
/// dispatches. The slot is held until the returned guard is dropped.
struct Throttle {
    interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: AsyncMutex::new(None),
        }
    }

    async fn acquire(&self) -> MutexGuard<'_, Option<Instant>> {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
        guard
    }
}

pub struct LocationEnricher {
    geocoder: Arc<dyn GeocodeResolver>,
    images: Arc<dyn ImageResolver>,
    placeholders: PlaceholderImages,
    throttle: Throttle,
    candidate_limit: usize,
}

impl LocationEnricher {
    pub fn new(
        geocoder: Arc<dyn GeocodeResolver>,
        images: Arc<dyn ImageResolver>,
        placeholders: PlaceholderImages,
        delay: Duration,
    ) -> Self {
        Self {
            geocoder,
            images,
            placeholders,
            throttle: Throttle::new(delay),
            candidate_limit: MAX_GEOCODE_CANDIDATES,
        }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let mut enricher = Self::new(
            Arc::new(NominatimGeocoder::new(config)?),
            Arc::new(WikidataImages::new(config)?),
            PlaceholderImages::new(&config.placeholder_image_base)?,
            config.enrichment_delay(),
        );
        enricher.candidate_limit = config.geocode_candidate_limit.clamp(1, MAX_GEOCODE_CANDIDATES);
        Ok(enricher)
    }

    /// Describes the venue at `query`. Returns `None` only for an empty query;
    /// every other path yields details, falling back to locally derived ones
    /// when the external services fail or know nothing.
    pub async fn resolve(&self, query: &str, organizer_id: i64) -> Option<EnrichmentOutcome> {
        let query = query.trim();
        if query.is_empty() {
            debug!(target: "enrichment", organizer_id, "empty location query; skipping");
            return None;
        }

        let outcome = match self.lookup(query, organizer_id).await {
            Ok(Some(details)) => EnrichmentOutcome::Resolved(details),
            Ok(None) => {
                debug!(target: "enrichment", organizer_id, "no geocode match; using fallback");
                EnrichmentOutcome::Fallback(self.placeholders.fallback_details(query, organizer_id))
            }
            Err(err) => {
                warn!(target: "enrichment", ?err, organizer_id, "geocode lookup failed; using fallback");
                EnrichmentOutcome::Fallback(self.placeholders.fallback_details(query, organizer_id))
            }
        };
        Some(outcome)
    }

    async fn lookup(&self, query: &str, organizer_id: i64) -> AppResult<Option<LocationDetails>> {
        let slot = self.throttle.acquire().await;
        let places = self.geocoder.search(query).await;
        drop(slot);
        let places = places?;
        let candidates = &places[..places.len().min(self.candidate_limit)];
        let Some(place) = select_best(candidates) else {
            return Ok(None);
        };

        let anchor = place
            .external_id
            .as_deref()
            .or(place.place_id.as_deref())
            .unwrap_or(query);
        let rating = rating_for_key(&rating_key(anchor, organizer_id));
        let image = match self.knowledge_base_image(place).await {
            Some(image) => image,
            None => self.placeholders.image_url(query, organizer_id),
        };

        Ok(Some(LocationDetails {
            description: describe(query, place),
            image,
            rating,
        }))
    }

    async fn knowledge_base_image(&self, place: &PlaceRecord) -> Option<String> {
        let id = place.knowledge_base_id.as_deref()?;
        match self.images.image_for(id).await {
            Ok(image) => image,
            Err(err) => {
                debug!(target: "enrichment", ?err, knowledge_base_id = id, "image lookup failed");
                None
            }
        }
    }
}

/// Highest `importance + 0.1 * populated address fields`; the earlier
/// candidate wins ties.
pub fn select_best(candidates: &[PlaceRecord]) -> Option<&PlaceRecord> {
    let mut best: Option<(&PlaceRecord, f64)> = None;
    for candidate in candidates {
        let score = candidate_score(candidate);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((candidate, score));
        }
    }
    best.map(|(place, _)| place)
}

fn candidate_score(place: &PlaceRecord) -> f64 {
    place.importance + ADDRESS_FIELD_WEIGHT * place.populated_address_fields() as f64
}

pub fn describe(query: &str, place: &PlaceRecord) -> String {
    let mut parts = vec![format!("{query}.")];
    let display_name = place.display_name.trim();
    if !display_name.is_empty() {
        parts.push(format!("Located at {display_name}."));
    }
    match (place.city(), place.country()) {
        (Some(city), Some(country)) => parts.push(format!("{city}, {country}.")),
        (Some(single), None) | (None, Some(single)) => parts.push(format!("{single}.")),
        (None, None) => {}
    }
    if let Some(amenity) = place.amenity_type() {
        parts.push(format!("A popular {} venue.", amenity.replace('_', " ")));
    }
    parts.join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentJob {
    pub organizer_id: i64,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentReport {
    pub organizer_id: i64,
    pub outcome: Option<EnrichmentOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    pub submitted: usize,
    pub resolved: usize,
    pub fell_back: usize,
    pub skipped: usize,
}

impl EnrichmentStats {
    fn record(&mut self, outcome: Option<&EnrichmentOutcome>) {
        match outcome {
            Some(EnrichmentOutcome::Resolved(_)) => self.resolved += 1,
            Some(EnrichmentOutcome::Fallback(_)) => self.fell_back += 1,
            None => self.skipped += 1,
        }
    }
}

/// Single worker that resolves jobs one at a time, in submission order.
pub struct EnrichmentQueue {
    sender: mpsc::UnboundedSender<EnrichmentJob>,
    stats: Arc<Mutex<EnrichmentStats>>,
    worker: JoinHandle<()>,
}

impl EnrichmentQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(
        enricher: Arc<LocationEnricher>,
    ) -> (Self, mpsc::UnboundedReceiver<EnrichmentReport>) {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<EnrichmentJob>();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(EnrichmentStats::default()));

        let worker_stats = Arc::clone(&stats);
        let worker = tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                let outcome = enricher.resolve(&job.query, job.organizer_id).await;
                worker_stats.lock().record(outcome.as_ref());
                trace!(
                    target: "enrichment",
                    organizer_id = job.organizer_id,
                    fallback = outcome.as_ref().map(EnrichmentOutcome::is_fallback),
                    "enrichment job finished"
                );
                let report = EnrichmentReport {
                    organizer_id: job.organizer_id,
                    outcome,
                };
                if report_tx.send(report).is_err() {
                    debug!(target: "enrichment", "report receiver dropped; stopping worker");
                    break;
                }
            }
        });

        (
            Self {
                sender: job_tx,
                stats,
                worker,
            },
            report_rx,
        )
    }

    pub fn submit(&self, job: EnrichmentJob) -> AppResult<()> {
        self.sender.send(job).map_err(|_| AppError::WorkerStopped)?;
        self.stats.lock().submitted += 1;
        Ok(())
    }

    pub fn stats(&self) -> EnrichmentStats {
        self.stats.lock().clone()
    }
}

impl Drop for EnrichmentQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Scripted geocoder that records call order, timing and overlap.
    #[derive(Default)]
    pub struct ScriptedGeocoder {
        pub responses: Mutex<HashMap<String, AppResult<Vec<PlaceRecord>>>>,
        pub calls: Mutex<Vec<(String, Instant)>>,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub latency: Duration,
    }

    impl ScriptedGeocoder {
        pub fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::default()
            }
        }

        pub fn respond(&self, query: &str, response: AppResult<Vec<PlaceRecord>>) {
            self.responses.lock().insert(query.to_string(), response);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl GeocodeResolver for ScriptedGeocoder {
        async fn search(&self, query: &str) -> AppResult<Vec<PlaceRecord>> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            self.calls.lock().push((query.to_string(), Instant::now()));
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.responses
                .lock()
                .remove(query)
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    pub struct ScriptedImages {
        pub images: Mutex<HashMap<String, String>>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageResolver for ScriptedImages {
        async fn image_for(&self, knowledge_base_id: &str) -> AppResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Status {
                    endpoint: "/entity".into(),
                    status: 500,
                });
            }
            Ok(self.images.lock().get(knowledge_base_id).cloned())
        }
    }

    pub fn place(display_name: &str, importance: f64, address: &[(&str, &str)]) -> PlaceRecord {
        PlaceRecord {
            place_id: Some(format!("{}", display_name.len())),
            external_id: None,
            display_name: display_name.to_string(),
            importance,
            category: None,
            kind: None,
            address: address
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            knowledge_base_id: None,
        }
    }

    pub fn enricher(
        geocoder: Arc<ScriptedGeocoder>,
        images: Arc<ScriptedImages>,
        delay: Duration,
    ) -> LocationEnricher {
        LocationEnricher::new(
            geocoder,
            images,
            PlaceholderImages::new("https://placehold.co").unwrap(),
            delay,
        )
    }
}
