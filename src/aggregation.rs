use std::collections::HashMap;

use serde::Serialize;
use tracing::trace;

use crate::models::{EnrichmentOutcome, EnrichmentState, EventRecord, VenueGroup};
use crate::projection::{project, ViewQuery};

/// Folds `new_events` into a copy of `existing`, keyed by organizer id.
///
/// Events without an organizer are skipped. Groups keep first-seen order and
/// events keep fetch order; an event id already present in its group is not
/// appended again, so merging the same batch twice is a no-op.
pub fn merge(existing: &[VenueGroup], new_events: &[EventRecord]) -> Vec<VenueGroup> {
    let mut groups = existing.to_vec();
    let mut index: HashMap<i64, usize> = groups
        .iter()
        .enumerate()
        .map(|(position, group)| (group.organizer_id(), position))
        .collect();

    for event in new_events {
        let Some(organizer) = event.organizer.as_ref() else {
            trace!(event_id = event.id, "skipping event without organizer");
            continue;
        };
        let position = *index.entry(organizer.id).or_insert_with(|| {
            groups.push(VenueGroup::new(organizer.clone()));
            groups.len() - 1
        });
        groups[position].push_event(event.clone());
    }

    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachOutcome {
    Attached,
    AlreadyFinal,
    Stale,
}

/// Venue groups accumulated for one filter context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VenueCollection {
    groups: Vec<VenueGroup>,
}

impl VenueCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_groups(groups: Vec<VenueGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[VenueGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, organizer_id: i64) -> Option<&VenueGroup> {
        self.groups
            .iter()
            .find(|group| group.organizer_id() == organizer_id)
    }

    pub fn contains(&self, organizer_id: i64) -> bool {
        self.get(organizer_id).is_some()
    }

    pub fn total_events(&self) -> usize {
        self.groups.iter().map(VenueGroup::event_count).sum()
    }

    pub fn merged(&self, new_events: &[EventRecord]) -> Self {
        Self {
            groups: merge(&self.groups, new_events),
        }
    }

    /// Replaces the collection with its merge against `new_events` and returns
    /// the organizer ids of groups created by this batch, in creation order.
    pub fn absorb(&mut self, new_events: &[EventRecord]) -> Vec<i64> {
        let before = self.groups.len();
        *self = self.merged(new_events);
        self.groups[before..]
            .iter()
            .map(VenueGroup::organizer_id)
            .collect()
    }

    pub fn reset(&mut self) {
        self.groups.clear();
    }

    pub fn project(&self, query: &ViewQuery) -> Vec<&VenueGroup> {
        project(&self.groups, query)
    }

    pub fn mark_resolving(&mut self, organizer_id: i64) -> bool {
        match self.group_mut(organizer_id) {
            Some(group) if !group.enrichment().is_final() => {
                group.set_enrichment(EnrichmentState::Resolving);
                true
            }
            _ => false,
        }
    }

    /// Puts a group that was waiting on enrichment back to `Unresolved`.
    pub fn mark_unresolved(&mut self, organizer_id: i64) {
        if let Some(group) = self.group_mut(organizer_id) {
            if matches!(group.enrichment(), EnrichmentState::Resolving) {
                group.set_enrichment(EnrichmentState::Unresolved);
            }
        }
    }

    /// Attaches enrichment when the organizer still exists and has no details.
    pub fn attach(&mut self, organizer_id: i64, outcome: EnrichmentOutcome) -> AttachOutcome {
        let Some(group) = self.group_mut(organizer_id) else {
            return AttachOutcome::Stale;
        };
        if group.enrichment().is_final() {
            return AttachOutcome::AlreadyFinal;
        }
        group.set_enrichment(outcome.into());
        AttachOutcome::Attached
    }

    fn group_mut(&mut self, organizer_id: i64) -> Option<&mut VenueGroup> {
        self.groups
            .iter_mut()
            .find(|group| group.organizer_id() == organizer_id)
    }
}
