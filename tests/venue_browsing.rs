use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::json_encoded;
use httptest::{Expectation, Server};
use serde_json::{json, Value};

use event_venues::{AppConfig, EnrichmentState, EventFilters, PageLoad, VenueBrowser, VenueTab};

fn organizer(id: i64, address: Option<&str>) -> Value {
    json!({
        "id": id,
        "company_name": format!("Organizer {id}"),
        "description": "Live music and theatre",
        "address": address,
    })
}

fn event(id: i64, organizer: &Value) -> Value {
    json!({
        "id": id,
        "name": format!("Event {id}"),
        "date": "2024-08-01",
        "start_time": "20:00",
        "location": "Main room",
        "organizer": organizer,
    })
}

fn config_for(server: &Server) -> AppConfig {
    AppConfig {
        events_api_base: server.url_str("/api"),
        page_size: 2,
        geocode_endpoint: server.url_str("/geocode/search"),
        knowledge_base_endpoint: server.url_str("/kb"),
        image_file_path_base: "https://commons.example.org/wiki/Special:FilePath".into(),
        placeholder_image_base: "https://placehold.example.org".into(),
        enrichment_delay_ms: 1,
        ..AppConfig::default()
    }
}

fn expect_page(server: &Server, page: &'static str, events: Vec<Value>, total: Option<u64>) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/events"),
            request::query(url_decoded(contains(("page", page)))),
            request::query(url_decoded(contains(("per_page", "2")))),
        ])
        .respond_with(json_encoded(json!({ "events": events, "total": total }))),
    );
}

#[tokio::test]
async fn browses_until_exhausted_and_enriches_venues() {
    let server = Server::run();
    let dock = organizer(1, Some("1 Dock Road"));
    let hill = organizer(2, Some("2 Hill St"));
    let unlisted = organizer(3, None);

    expect_page(&server, "1", vec![event(10, &dock), event(11, &hill)], Some(5));
    expect_page(&server, "2", vec![event(12, &dock), event(13, &unlisted)], Some(5));
    expect_page(&server, "3", vec![event(14, &dock)], Some(5));

    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/geocode/search"),
            request::query(url_decoded(contains(("q", "1 Dock Road")))),
        ])
        .respond_with(json_encoded(json!([{
            "place_id": 9001,
            "osm_id": 77,
            "display_name": "Dock Hall, 1 Dock Road, Bristol",
            "importance": 0.6,
            "category": "amenity",
            "type": "theatre",
            "address": { "road": "Dock Road", "city": "Bristol", "country": "United Kingdom" },
            "extratags": { "wikidata": "Q55" }
        }]))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/geocode/search"),
            request::query(url_decoded(contains(("q", "2 Hill St")))),
        ])
        .respond_with(json_encoded(json!([]))),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/kb/Q55.json")).respond_with(
            json_encoded(json!({
                "entities": { "Q55": { "claims": { "P18": [
                    { "mainsnak": { "datavalue": { "value": "Dock_Hall.jpg" } } }
                ] } } }
            })),
        ),
    );

    let mut browser = VenueBrowser::from_config(&config_for(&server)).expect("browser");

    let mut pages = 0;
    loop {
        match browser.load_next_page().await.expect("page load") {
            PageLoad::Loaded { has_more, .. } => {
                pages += 1;
                if !has_more {
                    break;
                }
            }
            PageLoad::Skipped => break,
        }
    }
    assert_eq!(pages, 3);
    assert!(!browser.page_state().has_more);
    assert_eq!(browser.page_state().total_known, Some(5));
    assert_eq!(browser.load_next_page().await.expect("exhausted"), PageLoad::Skipped);

    browser.settle_enrichment().await;
    let venues = browser.venues();
    assert_eq!(venues.len(), 3);
    assert_eq!(venues.total_events(), 5);

    let EnrichmentState::Resolved(dock_details) = venues.get(1).unwrap().enrichment() else {
        panic!("dock venue should be resolved");
    };
    assert!(dock_details.description.contains("Bristol, United Kingdom"));
    assert_eq!(
        dock_details.image,
        "https://commons.example.org/wiki/Special:FilePath/Dock_Hall.jpg?width=640"
    );
    assert!((3.5..=5.0).contains(&dock_details.rating));

    let EnrichmentState::FellBack(hill_details) = venues.get(2).unwrap().enrichment() else {
        panic!("hill venue should fall back");
    };
    assert!(hill_details.image.starts_with("https://placehold.example.org/600x400/"));
    assert!(matches!(venues.get(3).unwrap().enrichment(), EnrichmentState::Unresolved));

    browser.set_tab(VenueTab::Trending);
    let ordered: Vec<i64> = browser
        .visible_venues()
        .iter()
        .map(|group| group.organizer_id())
        .collect();
    assert_eq!(ordered, vec![1, 2, 3]);

    let stats = browser.enrichment_stats();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.fell_back, 1);
}

#[tokio::test]
async fn category_change_starts_an_independent_session() {
    let server = Server::run();
    let jazz = organizer(1, None);
    let comedy = organizer(2, None);

    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/events"),
            request::query(url_decoded(contains(("category", "jazz")))),
            request::query(url_decoded(contains(("page", "1")))),
        ])
        .respond_with(json_encoded(json!({
            "events": [event(1, &jazz), event(2, &jazz)]
        }))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/events"),
            request::query(url_decoded(contains(("category", "comedy")))),
            request::query(url_decoded(contains(("page", "1")))),
        ])
        .respond_with(json_encoded(json!({
            "events": [event(3, &comedy)]
        }))),
    );

    let mut browser = VenueBrowser::from_config(&config_for(&server)).expect("browser");
    browser.set_filters(EventFilters::category("jazz"));
    browser.load_next_page().await.expect("jazz page");
    assert_eq!(browser.page_state().current_page, 2);
    assert!(browser.page_state().has_more);

    browser.set_filters(EventFilters::category("comedy"));
    assert_eq!(browser.page_state().current_page, 1);
    let load = browser.load_next_page().await.expect("comedy page");
    assert!(matches!(load, PageLoad::Loaded { has_more: false, .. }));

    let ids: Vec<i64> = browser
        .visible_venues()
        .iter()
        .map(|group| group.organizer_id())
        .collect();
    assert_eq!(ids, vec![2]);
}
