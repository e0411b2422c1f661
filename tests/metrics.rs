// tests/metrics.rs
// One test per binary: the Prometheus recorder is process-global.
use std::fs;

use chrono::NaiveDate;
use hangar_watch::classify::{Classification, EnrichedArticle};
use hangar_watch::dedup::{DedupScheme, SeenKeys};
use hangar_watch::ingest::types::NormalizedArticle;
use hangar_watch::metrics::{Metrics, TEXTFILE_NAME};

fn item(url: &str) -> EnrichedArticle {
    EnrichedArticle {
        article: NormalizedArticle {
            project_title: "Hangar".into(),
            source_url: url.into(),
            summary: String::new(),
            date_published: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            week_collected: "2025-W01".into(),
        },
        classification: Classification {
            article_id: None,
            is_hangar_related: true,
            country: "N/A".into(),
            region: None,
            completion_status: false,
            patterns: Vec::new(),
        },
    }
}

#[test]
fn textfile_contains_pipeline_series() {
    let metrics = Metrics::init().expect("recorder installs once");

    let mut seen = SeenKeys::new(DedupScheme::Url);
    seen.filter_new(vec![item("https://a"), item("https://a"), item("https://b")]);

    let dir = tempfile::tempdir().unwrap();
    let path = metrics.write_textfile(dir.path()).unwrap();
    assert_eq!(path, dir.path().join(TEXTFILE_NAME));

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("dedup_suppressed_total 1"), "{text}");
    assert!(text.contains("last_run_timestamp_seconds"));
    assert!(text.contains("# HELP dedup_suppressed_total"));

    // a second recorder is refused
    assert!(Metrics::init().is_err());
}
