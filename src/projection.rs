use serde::{Deserialize, Serialize};

use crate::models::VenueGroup;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueTab {
    #[default]
    All,
    Trending,
}

impl VenueTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueTab::All => "all",
            VenueTab::Trending => "trending",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Some(VenueTab::All),
            "trending" => Some(VenueTab::Trending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub search_term: String,
    pub tab: VenueTab,
}

impl ViewQuery {
    pub fn new(search_term: impl Into<String>, tab: VenueTab) -> Self {
        Self {
            search_term: search_term.into(),
            tab,
        }
    }
}

/// Selects the groups matching `query.search_term` and orders them for the tab.
pub fn project<'a>(groups: &'a [VenueGroup], query: &ViewQuery) -> Vec<&'a VenueGroup> {
    let needle = query.search_term.to_lowercase();
    let mut matched: Vec<&VenueGroup> = groups
        .iter()
        .filter(|group| needle.is_empty() || matches_search(group, &needle))
        .collect();

    if query.tab == VenueTab::Trending {
        // sort_by is stable, equal counts keep their prior order
        matched.sort_by(|a, b| b.event_count().cmp(&a.event_count()));
    }
    matched
}

fn matches_search(group: &VenueGroup, needle: &str) -> bool {
    let organizer = group.organizer();
    let details = group.location_details().map(|details| details.description.as_str());
    [
        Some(organizer.company_name.as_str()),
        organizer.description.as_deref(),
        organizer.address.as_deref(),
        details,
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}
