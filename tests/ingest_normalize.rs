// tests/ingest_normalize.rs
use chrono::NaiveDate;
use hangar_watch::config::RegionRegistry;
use hangar_watch::config::settings::SEARCH_QUERIES;
use hangar_watch::ingest::providers::StaticSearch;
use hangar_watch::ingest::types::{RawArticle, SearchProvider, SearchWindow};
use hangar_watch::ingest::{build_queries, collect_region, normalize_articles, normalize_text};
use hangar_watch::Region;

fn raw(title: &str, url: &str, published: Option<&str>) -> RawArticle {
    RawArticle {
        title: title.into(),
        summary: "<p>New&nbsp;MRO <b>hangar</b></p>".into(),
        url: url.into(),
        published: published.map(str::to_string),
        source: "static".into(),
    }
}

#[test]
fn strips_html_and_unescapes() {
    let s = "<p>Hello&nbsp;<b>world</b> &ldquo;ok&rdquo;</p>";
    assert_eq!(normalize_text(s), r#"Hello world "ok""#);
    assert_eq!(normalize_text(""), "");
}

#[test]
fn normalized_articles_are_unique_and_dated() {
    let now = NaiveDate::from_ymd_opt(2025, 2, 12)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let out = normalize_articles(
        vec![
            raw("First", "https://a", Some("3d")),
            raw("Dup of first", "https://a", None),
            raw("No url", "  ", None),
            raw("Absolute", "https://b", Some("02/01/2025, 09:03 AM")),
            raw("Garbage date", "https://c", Some("sometime")),
        ],
        now,
    );

    let urls: Vec<_> = out.iter().map(|a| a.source_url.as_str()).collect();
    assert_eq!(urls, vec!["https://a", "https://b", "https://c"]);
    assert_eq!(out[0].project_title, "First");
    assert_eq!(out[0].summary, "New MRO hangar");
    assert_eq!(out[0].date_published, NaiveDate::from_ymd_opt(2025, 2, 9).unwrap());
    assert_eq!(out[1].date_published, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
    assert_eq!(out[2].date_published, now.date());
    assert!(out.iter().all(|a| a.week_collected == "2025-W07"));
}

#[test]
fn queries_cross_base_and_region_terms() {
    let terms = vec!["Europe".to_string(), "Africa".to_string()];
    let q = build_queries(&terms);
    assert_eq!(q.len(), SEARCH_QUERIES.len() * 2);
    assert_eq!(q[0], format!("{} Europe", SEARCH_QUERIES[0]));
    assert_eq!(build_queries(&[]).len(), SEARCH_QUERIES.len());
}

#[tokio::test]
async fn provider_failures_do_not_stop_collection() {
    let registry = RegionRegistry::builtin();
    let def = registry.get(Region::Latam);
    let ok = StaticSearch::new(vec![raw("Hangar", "https://a", None), raw("Hangar", "https://a", None)]);
    let providers: Vec<Box<dyn SearchProvider>> =
        vec![Box::new(StaticSearch::failing()), Box::new(ok)];

    let window = SearchWindow::weekly(NaiveDate::from_ymd_opt(2025, 2, 12).unwrap());
    let hits = collect_region(&providers, def, &window).await;
    assert_eq!(hits.len(), 1);
}
