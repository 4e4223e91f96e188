use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::aggregation::{AttachOutcome, VenueCollection};
use crate::config::AppConfig;
use crate::enrichment::{EnrichmentJob, EnrichmentQueue, EnrichmentReport, EnrichmentStats, LocationEnricher};
use crate::errors::AppResult;
use crate::events::{http_event_source, EventFilters, EventSource};
use crate::models::{LocationDetails, VenueGroup};
use crate::pagination::{PageState, ScrollController};
use crate::projection::{VenueTab, ViewQuery};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageLoad {
    Loaded {
        page: u32,
        events: usize,
        new_venues: usize,
        has_more: bool,
    },
    /// The trigger was ignored: a load is running or the context is exhausted.
    Skipped,
}

/// Owns one filter context: fetched venues, scroll state and the enrichment
/// worker that decorates them.
pub struct VenueBrowser {
    source: Arc<dyn EventSource>,
    enricher: Arc<LocationEnricher>,
    queue: EnrichmentQueue,
    reports: mpsc::UnboundedReceiver<EnrichmentReport>,
    controller: ScrollController,
    venues: VenueCollection,
    view: ViewQuery,
    pending: HashSet<i64>,
}

impl VenueBrowser {
    /// Must be called from within a tokio runtime; the enrichment worker is
    /// spawned immediately.
    pub fn new(source: Arc<dyn EventSource>, enricher: Arc<LocationEnricher>, page_size: u32) -> Self {
        let (queue, reports) = EnrichmentQueue::spawn(Arc::clone(&enricher));
        Self {
            source,
            enricher,
            queue,
            reports,
            controller: ScrollController::new(page_size, EventFilters::default()),
            venues: VenueCollection::new(),
            view: ViewQuery::default(),
            pending: HashSet::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let source = http_event_source(config)?;
        let enricher = Arc::new(LocationEnricher::from_config(config)?);
        Ok(Self::new(source, enricher, config.page_size))
    }

    pub fn page_state(&self) -> &PageState {
        self.controller.state()
    }

    pub fn filters(&self) -> &EventFilters {
        self.controller.filters()
    }

    pub fn view(&self) -> &ViewQuery {
        &self.view
    }

    pub fn venues(&self) -> &VenueCollection {
        &self.venues
    }

    pub fn enrichment_stats(&self) -> EnrichmentStats {
        self.queue.stats()
    }

    pub fn has_pending_enrichment(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn visible_venues(&self) -> Vec<&VenueGroup> {
        self.venues.project(&self.view)
    }

    /// Handles the scroll sentinel becoming visible: fetches the next page,
    /// merges it and queues enrichment for venues seen for the first time.
    /// Fetch errors are returned as-is and leave the page cursor in place.
    pub async fn load_next_page(&mut self) -> AppResult<PageLoad> {
        self.apply_enrichment();
        let Some(ticket) = self.controller.on_sentinel_visible() else {
            return Ok(PageLoad::Skipped);
        };

        let page = match self.source.fetch_page(&ticket.request).await {
            Ok(page) => page,
            Err(err) => {
                warn!(target: "browser", ?err, page = ticket.request.page, "event page fetch failed");
                self.controller.fail(&ticket);
                return Err(err);
            }
        };

        if !self.controller.complete(&ticket, page.events.len(), page.total) {
            return Ok(PageLoad::Skipped);
        }

        let created = self.venues.absorb(&page.events);
        for organizer_id in &created {
            self.enqueue(*organizer_id)?;
        }

        let state = self.controller.state();
        info!(
            target: "browser",
            page = ticket.request.page,
            events = page.events.len(),
            new_venues = created.len(),
            has_more = state.has_more,
            "page merged"
        );
        Ok(PageLoad::Loaded {
            page: ticket.request.page,
            events: page.events.len(),
            new_venues: created.len(),
            has_more: state.has_more,
        })
    }

    /// Switches the backend filters, discarding everything fetched under the
    /// previous ones. Returns `false` when nothing changed.
    pub fn set_filters(&mut self, filters: EventFilters) -> bool {
        if &filters == self.controller.filters() {
            return false;
        }
        self.reset_context(filters);
        true
    }

    /// A new search term starts a fresh pagination session. Surrounding
    /// whitespace is not part of the term.
    pub fn set_search(&mut self, term: impl Into<String>) -> bool {
        let term = term.into().trim().to_string();
        if term == self.view.search_term {
            return false;
        }
        self.view.search_term = term;
        let filters = self.controller.filters().clone();
        self.reset_context(filters);
        true
    }

    pub fn set_tab(&mut self, tab: VenueTab) {
        self.view.tab = tab;
    }

    /// Attaches every enrichment result received so far. Results for venues
    /// dropped by a reset are discarded.
    pub fn apply_enrichment(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(report) = self.reports.try_recv() {
            if self.apply_report(report) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits until every enrichment job queued for the current venues has
    /// reported back.
    pub async fn settle_enrichment(&mut self) -> usize {
        let mut applied = self.apply_enrichment();
        while !self.pending.is_empty() {
            let Some(report) = self.reports.recv().await else {
                warn!(target: "browser", "enrichment worker stopped with jobs outstanding");
                break;
            };
            if self.apply_report(report) {
                applied += 1;
            }
        }
        applied
    }

    /// Details for one venue, resolving them on demand when none are attached
    /// yet. A venue already queued for enrichment waits for that job instead.
    /// `None` when the venue is unknown or has no address to resolve.
    pub async fn venue_details(&mut self, organizer_id: i64) -> Option<LocationDetails> {
        self.apply_enrichment();
        if self.venues.contains(organizer_id) && self.pending.contains(&organizer_id) {
            self.await_report(organizer_id).await;
        }
        let group = self.venues.get(organizer_id)?;
        if let Some(details) = group.location_details() {
            return Some(details.clone());
        }

        let query = group.organizer().location_query().to_string();
        let outcome = self.enricher.resolve(&query, organizer_id).await?;
        let details = outcome.details().clone();
        match self.venues.attach(organizer_id, outcome) {
            AttachOutcome::Attached => Some(details),
            AttachOutcome::AlreadyFinal => self
                .venues
                .get(organizer_id)
                .and_then(|group| group.location_details().cloned()),
            AttachOutcome::Stale => None,
        }
    }

    async fn await_report(&mut self, organizer_id: i64) {
        while self.pending.contains(&organizer_id) {
            let Some(report) = self.reports.recv().await else {
                warn!(target: "browser", organizer_id, "enrichment worker stopped before reporting");
                return;
            };
            self.apply_report(report);
        }
    }

    fn enqueue(&mut self, organizer_id: i64) -> AppResult<()> {
        let Some(group) = self.venues.get(organizer_id) else {
            return Ok(());
        };
        let query = group.organizer().location_query().to_string();
        if query.is_empty() {
            trace!(target: "browser", organizer_id, "no address; venue stays unresolved");
            return Ok(());
        }

        self.venues.mark_resolving(organizer_id);
        if !self.pending.insert(organizer_id) {
            // a job from a previous context is still queued for this organizer
            return Ok(());
        }
        self.queue.submit(EnrichmentJob { organizer_id, query })
    }

    fn apply_report(&mut self, report: EnrichmentReport) -> bool {
        self.pending.remove(&report.organizer_id);
        let Some(outcome) = report.outcome else {
            self.venues.mark_unresolved(report.organizer_id);
            return false;
        };
        match self.venues.attach(report.organizer_id, outcome) {
            AttachOutcome::Attached => true,
            AttachOutcome::AlreadyFinal => false,
            AttachOutcome::Stale => {
                trace!(target: "browser", organizer_id = report.organizer_id, "stale enrichment discarded");
                false
            }
        }
    }

    fn reset_context(&mut self, filters: EventFilters) {
        debug!(target: "browser", ?filters, search = %self.view.search_term, "resetting filter context");
        self.controller.reset(filters);
        self.venues.reset();
    }
}
