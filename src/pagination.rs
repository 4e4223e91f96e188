use serde::Serialize;
use tracing::{debug, trace};

use crate::events::{EventFilters, PageRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageState {
    /// Next page to request, 1-based.
    pub current_page: u32,
    pub page_size: u32,
    pub fetched: u64,
    pub total_known: Option<u64>,
    pub has_more: bool,
    pub is_loading_more: bool,
}

impl PageState {
    fn fresh(page_size: u32) -> Self {
        Self {
            current_page: 1,
            page_size,
            fetched: 0,
            total_known: None,
            has_more: true,
            is_loading_more: false,
        }
    }
}

/// Handed out when a load starts; completions must present it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    generation: u64,
    pub request: PageRequest,
}

/// Infinite-scroll state for one filter context at a time.
#[derive(Debug, Clone)]
pub struct ScrollController {
    state: PageState,
    filters: EventFilters,
    generation: u64,
}

impl ScrollController {
    pub fn new(page_size: u32, filters: EventFilters) -> Self {
        Self {
            state: PageState::fresh(page_size.max(1)),
            filters,
            generation: 0,
        }
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn filters(&self) -> &EventFilters {
        &self.filters
    }

    /// Sentinel entered the viewport. Starts a load unless one is running or
    /// the context is exhausted.
    pub fn on_sentinel_visible(&mut self) -> Option<PageTicket> {
        if !self.state.has_more {
            trace!(target: "pagination", "sentinel visible but context exhausted");
            return None;
        }
        if self.state.is_loading_more {
            trace!(target: "pagination", "sentinel visible while loading; ignored");
            return None;
        }

        self.state.is_loading_more = true;
        Some(PageTicket {
            generation: self.generation,
            request: PageRequest {
                page: self.state.current_page,
                page_size: self.state.page_size,
                filters: self.filters.clone(),
            },
        })
    }

    /// Records a successful fetch. Returns `false` when the ticket belongs to a
    /// filter context that has since been reset.
    pub fn complete(&mut self, ticket: &PageTicket, received: usize, total: Option<u64>) -> bool {
        if !self.is_current(ticket) {
            debug!(target: "pagination", page = ticket.request.page, "dropping completion from previous filter context");
            return false;
        }

        let state = &mut self.state;
        state.is_loading_more = false;
        state.fetched += received as u64;
        state.current_page = ticket.request.page + 1;
        if total.is_some() {
            state.total_known = total;
        }

        let short_page = (received as u64) < u64::from(ticket.request.page_size);
        let reached_total = state
            .total_known
            .map(|known| state.fetched >= known)
            .unwrap_or(false);
        if short_page && state.total_known.is_none() {
            state.total_known = Some(state.fetched);
        }
        if short_page || reached_total {
            state.has_more = false;
        }
        debug!(
            target: "pagination",
            page = ticket.request.page,
            received,
            fetched = state.fetched,
            has_more = state.has_more,
            "page completed"
        );
        true
    }

    /// Records a failed fetch; the same page is requested on the next trigger.
    pub fn fail(&mut self, ticket: &PageTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.state.is_loading_more = false;
        true
    }

    /// Starts a new pagination session for `filters`.
    pub fn reset(&mut self, filters: EventFilters) {
        self.generation += 1;
        self.filters = filters;
        self.state = PageState::fresh(self.state.page_size);
    }

    fn is_current(&self, ticket: &PageTicket) -> bool {
        ticket.generation == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(page_size: u32) -> ScrollController {
        ScrollController::new(page_size, EventFilters::default())
    }

    #[test]
    fn ignores_triggers_while_loading() {
        let mut controller = controller(12);
        let ticket = controller.on_sentinel_visible().unwrap();
        assert_eq!(ticket.request.page, 1);
        assert!(controller.state().is_loading_more);
        assert!(controller.on_sentinel_visible().is_none());

        controller.complete(&ticket, 12, None);
        let next = controller.on_sentinel_visible().unwrap();
        assert_eq!(next.request.page, 2);
    }

    #[test]
    fn short_final_page_ends_context_without_total() {
        let mut controller = controller(12);
        for _ in 0..2 {
            let ticket = controller.on_sentinel_visible().unwrap();
            controller.complete(&ticket, 12, None);
        }
        let ticket = controller.on_sentinel_visible().unwrap();
        assert_eq!(ticket.request.page, 3);
        controller.complete(&ticket, 5, None);

        let state = controller.state();
        assert!(!state.has_more);
        assert_eq!(state.total_known, Some(29));
        assert!(controller.on_sentinel_visible().is_none());
    }

    #[test]
    fn reaching_reported_total_ends_context() {
        let mut controller = controller(10);
        let ticket = controller.on_sentinel_visible().unwrap();
        controller.complete(&ticket, 10, Some(20));
        assert!(controller.state().has_more);

        let ticket = controller.on_sentinel_visible().unwrap();
        controller.complete(&ticket, 10, None);
        assert!(!controller.state().has_more);
        assert_eq!(controller.state().total_known, Some(20));
    }

    #[test]
    fn failure_does_not_advance() {
        let mut controller = controller(12);
        let ticket = controller.on_sentinel_visible().unwrap();
        assert!(controller.fail(&ticket));

        let state = controller.state();
        assert_eq!(state.current_page, 1);
        assert!(state.has_more);
        assert!(!state.is_loading_more);
        assert_eq!(controller.on_sentinel_visible().unwrap().request.page, 1);
    }

    #[test]
    fn reset_starts_fresh_and_rejects_stale_tickets() {
        let mut controller = controller(12);
        let first = controller.on_sentinel_visible().unwrap();
        controller.complete(&first, 12, None);
        let in_flight = controller.on_sentinel_visible().unwrap();

        controller.reset(EventFilters::category("music"));
        assert!(!controller.complete(&in_flight, 3, None));
        let state = controller.state();
        assert_eq!(state.current_page, 1);
        assert!(state.has_more);
        assert_eq!(state.fetched, 0);

        let ticket = controller.on_sentinel_visible().unwrap();
        assert_eq!(ticket.request.page, 1);
        assert_eq!(ticket.request.filters.category.as_deref(), Some("music"));
    }

    #[test]
    fn terminates_against_finite_dataset() {
        let dataset = 47_u64;
        let mut controller = controller(10);
        let mut requests = 0;
        while let Some(ticket) = controller.on_sentinel_visible() {
            requests += 1;
            let start = u64::from(ticket.request.page - 1) * 10;
            let received = dataset.saturating_sub(start).min(10) as usize;
            controller.complete(&ticket, received, Some(dataset));
            assert!(requests <= 5);
        }
        assert_eq!(requests, 5);
        assert_eq!(controller.state().fetched, dataset);
    }
}
