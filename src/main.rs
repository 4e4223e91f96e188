use anyhow::Context;
use event_venues::{init_tracing, AppConfig, EventFilters, PageLoad, VenueBrowser, VenueTab};
use tracing::{info, warn};

const DEFAULT_MAX_PAGES: u32 = 10;

/// Usage: `event-venues [category] [search] [all|trending] [max-pages]`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env();
    info!(config = ?config.public_profile(), "starting venue browser");

    let mut args = std::env::args().skip(1);
    let category = args.next().filter(|value| !value.is_empty() && value != "-");
    let search = args.next().filter(|value| value != "-").unwrap_or_default();
    let tab = match args.next() {
        Some(raw) => VenueTab::parse(&raw).with_context(|| format!("unknown tab: {raw}"))?,
        None => VenueTab::All,
    };
    let max_pages = match args.next() {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("invalid page count: {raw}"))?,
        None => DEFAULT_MAX_PAGES,
    };

    let mut browser = VenueBrowser::from_config(&config).context("failed to build venue browser")?;
    if let Some(category) = category {
        browser.set_filters(EventFilters::category(category));
    }
    browser.set_search(search);
    browser.set_tab(tab);

    for _ in 0..max_pages {
        match browser.load_next_page().await {
            Ok(PageLoad::Loaded { has_more: true, .. }) => continue,
            Ok(_) => break,
            Err(err) => {
                warn!(?err, "stopping after failed page load");
                break;
            }
        }
    }

    let applied = browser.settle_enrichment().await;
    info!(applied, stats = ?browser.enrichment_stats(), "enrichment settled");

    let output = serde_json::to_string_pretty(&browser.visible_venues())?;
    println!("{output}");
    Ok(())
}
