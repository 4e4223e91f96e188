use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    #[serde(default, with = "clock_time")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "clock_time")]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub organizer: Option<OrganizerRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizerRef {
    pub id: i64,
    pub company_name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub social_links: Option<SocialLinks>,
}

impl OrganizerRef {
    /// Free-text query handed to the geocoder; empty when no address is known.
    pub fn location_query(&self) -> &str {
        self.address.as_deref().map(str::trim).unwrap_or("")
    }
}

impl PartialEq for OrganizerRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OrganizerRef {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialLinks {
    #[serde(default)]
    pub facebook: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDetails {
    pub description: String,
    pub image: String,
    pub rating: f64,
}

/// Result of enriching one venue. `Fallback` still carries usable details,
/// it only marks them as locally derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    Resolved(LocationDetails),
    Fallback(LocationDetails),
}

impl EnrichmentOutcome {
    pub fn details(&self) -> &LocationDetails {
        match self {
            EnrichmentOutcome::Resolved(details) | EnrichmentOutcome::Fallback(details) => details,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, EnrichmentOutcome::Fallback(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", content = "details", rename_all = "snake_case")]
pub enum EnrichmentState {
    #[default]
    Unresolved,
    Resolving,
    Resolved(LocationDetails),
    FellBack(LocationDetails),
}

impl EnrichmentState {
    pub fn details(&self) -> Option<&LocationDetails> {
        match self {
            EnrichmentState::Resolved(details) | EnrichmentState::FellBack(details) => {
                Some(details)
            }
            EnrichmentState::Unresolved | EnrichmentState::Resolving => None,
        }
    }

    pub fn is_final(&self) -> bool {
        self.details().is_some()
    }
}

impl From<EnrichmentOutcome> for EnrichmentState {
    fn from(outcome: EnrichmentOutcome) -> Self {
        match outcome {
            EnrichmentOutcome::Resolved(details) => EnrichmentState::Resolved(details),
            EnrichmentOutcome::Fallback(details) => EnrichmentState::FellBack(details),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueGroup {
    organizer: OrganizerRef,
    events: Vec<EventRecord>,
    enrichment: EnrichmentState,
}

impl VenueGroup {
    pub fn new(organizer: OrganizerRef) -> Self {
        Self {
            organizer,
            events: Vec::new(),
            enrichment: EnrichmentState::Unresolved,
        }
    }

    pub fn organizer_id(&self) -> i64 {
        self.organizer.id
    }

    pub fn organizer(&self) -> &OrganizerRef {
        &self.organizer
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn enrichment(&self) -> &EnrichmentState {
        &self.enrichment
    }

    pub fn location_details(&self) -> Option<&LocationDetails> {
        self.enrichment.details()
    }

    pub fn contains_event(&self, event_id: i64) -> bool {
        self.events.iter().any(|event| event.id == event_id)
    }

    /// Appends unless an event with the same id is already present.
    pub(crate) fn push_event(&mut self, event: EventRecord) -> bool {
        if self.contains_event(event.id) {
            return false;
        }
        self.events.push(event);
        true
    }

    pub(crate) fn set_enrichment(&mut self, state: EnrichmentState) {
        self.enrichment = state;
    }
}

mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&time.format("%H:%M:%S").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
            return Ok(None);
        };
        FORMATS
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(raw.trim(), format).ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time of day: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_backend_event_payload() {
        let event: EventRecord = serde_json::from_value(json!({
            "id": 42,
            "name": "Jazz Night",
            "date": "2024-06-01",
            "start_time": "19:30",
            "end_time": "22:00:00",
            "location": "Main hall",
            "image": null,
            "category": "music",
            "organizer": {
                "id": 7,
                "company_name": "Blue Room",
                "address": "  12 Harbour St, Cape Town  ",
                "social_links": { "instagram": "https://instagram.com/blueroom" }
            }
        }))
        .unwrap();

        assert_eq!(event.start_time, NaiveTime::from_hms_opt(19, 30, 0));
        assert_eq!(event.end_time, NaiveTime::from_hms_opt(22, 0, 0));
        let organizer = event.organizer.unwrap();
        assert_eq!(organizer.location_query(), "12 Harbour St, Cape Town");
        assert_eq!(
            organizer.social_links.unwrap().instagram.as_deref(),
            Some("https://instagram.com/blueroom")
        );
    }

    #[test]
    fn organizer_equality_is_by_id() {
        let a = OrganizerRef {
            id: 3,
            company_name: "Old name".into(),
            ..OrganizerRef::default()
        };
        let b = OrganizerRef {
            id: 3,
            company_name: "Renamed".into(),
            ..OrganizerRef::default()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let outcome = EnrichmentOutcome::Fallback(LocationDetails {
            description: "Venue".into(),
            image: "https://placehold.co/x".into(),
            rating: 4.2,
        });
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["kind"], "fallback");
        assert_eq!(value["rating"], 4.2);
    }
}
