use reqwest::Url;
use tracing::warn;

use crate::errors::{AppError, AppResult};
use crate::models::LocationDetails;

pub const PLACEHOLDER_PALETTE: [&str; 6] = ["4F46E5", "059669", "DC2626", "D97706", "7C3AED", "0891B2"];
const PLACEHOLDER_SIZE: &str = "600x400";
const PLACEHOLDER_FOREGROUND: &str = "FFFFFF";
const LABEL_MAX_CHARS: usize = 20;
const RATING_BUCKETS: u32 = 15;
const RATING_FLOOR: f64 = 3.5;

/// Rating derived from a composite key: the UTF-16 code units are summed,
/// reduced modulo 15 and mapped onto `[3.5, 4.9]` in tenths.
pub fn rating_for_key(key: &str) -> f64 {
    let sum: u64 = key.encode_utf16().map(u64::from).sum();
    let bucket = (sum % u64::from(RATING_BUCKETS)) as f64;
    round_tenth(RATING_FLOOR + bucket / 10.0)
}

pub fn rating_key(anchor: &str, organizer_id: i64) -> String {
    format!("{anchor}_{organizer_id}")
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn palette_color(organizer_id: i64) -> &'static str {
    let index = organizer_id.rem_euclid(PLACEHOLDER_PALETTE.len() as i64) as usize;
    PLACEHOLDER_PALETTE[index]
}

pub fn placeholder_label(query: &str) -> String {
    query.trim().chars().take(LABEL_MAX_CHARS).collect()
}

/// Builds placeholder image URLs of the form `{base}/{size}/{bg}/{fg}?text={label}`.
#[derive(Debug, Clone)]
pub struct PlaceholderImages {
    base: Url,
}

impl PlaceholderImages {
    pub fn new(base: &str) -> AppResult<Self> {
        let base = Url::parse(base)
            .map_err(|err| AppError::Config(format!("invalid placeholder image base: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "placeholder image base cannot carry a path: {base}"
            )));
        }
        Ok(Self { base })
    }

    pub fn image_url(&self, query: &str, organizer_id: i64) -> String {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(PLACEHOLDER_SIZE)
                .push(palette_color(organizer_id))
                .push(PLACEHOLDER_FOREGROUND);
        } else {
            warn!(base = %self.base, "placeholder base rejected path segments");
        }
        url.query_pairs_mut()
            .append_pair("text", &placeholder_label(query));
        url.to_string()
    }

    /// Fully local details for a venue, used whenever external data is missing.
    pub fn fallback_details(&self, query: &str, organizer_id: i64) -> LocationDetails {
        let query = query.trim();
        LocationDetails {
            description: fallback_description(query),
            image: self.image_url(query, organizer_id),
            rating: rating_for_key(&rating_key(query, organizer_id)),
        }
    }
}

fn fallback_description(query: &str) -> String {
    if query.is_empty() {
        "Venue details are not available yet.".to_string()
    } else {
        format!("{query}. Venue details are not available yet.")
    }
}
