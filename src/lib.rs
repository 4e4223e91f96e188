mod aggregation;
mod browser;
mod config;
mod enrichment;
mod errors;
mod events;
mod fallback;
mod geocode;
mod models;
mod pagination;
mod projection;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use aggregation::{merge, AttachOutcome, VenueCollection};
pub use browser::{PageLoad, VenueBrowser};
pub use config::{AppConfig, PublicAppConfig};
pub use enrichment::{
    describe, select_best, EnrichmentJob, EnrichmentQueue, EnrichmentReport, EnrichmentStats,
    LocationEnricher,
};
pub use errors::{AppError, AppResult};
pub use events::{http_event_source, EventFilters, EventPage, EventSource, HttpEventSource, PageRequest};
pub use fallback::{palette_color, rating_for_key, rating_key, PlaceholderImages, PLACEHOLDER_PALETTE};
pub use geocode::{GeocodeResolver, ImageResolver, NominatimGeocoder, PlaceRecord, WikidataImages};
pub use models::{
    EnrichmentOutcome, EnrichmentState, EventRecord, LocationDetails, OrganizerRef, SocialLinks,
    VenueGroup,
};
pub use pagination::{PageState, PageTicket, ScrollController};
pub use projection::{project, VenueTab, ViewQuery};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,event_venues=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
