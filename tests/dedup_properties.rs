// tests/dedup_properties.rs
use std::collections::HashMap;

use chrono::NaiveDate;
use hangar_watch::classify::{Classification, EnrichedArticle};
use hangar_watch::dedup::{DedupScheme, SeenKeys};
use hangar_watch::pipeline::build_writer;
use hangar_watch::Settings;
use hangar_watch::ingest::types::NormalizedArticle;
use hangar_watch::report::{Artifact, Row, Section, COL_PATTERNS, DEFAULT_FIELDS};
use hangar_watch::Region;

fn item(url: &str, title: &str, tags: &[&str]) -> EnrichedArticle {
    EnrichedArticle {
        article: NormalizedArticle {
            project_title: title.into(),
            source_url: url.into(),
            summary: "s".into(),
            date_published: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            week_collected: "2025-W18".into(),
        },
        classification: Classification {
            article_id: None,
            is_hangar_related: true,
            country: "SG".into(),
            region: Some(Region::Apac),
            completion_status: false,
            patterns: tags.iter().map(|t| t.to_string()).collect(),
        },
    }
}

fn batch() -> Vec<EnrichedArticle> {
    vec![
        item("https://a", "SIA Engineering opens hangar", &["sia engineering", "changi"]),
        item("https://b", "ST Engineering breaks ground", &["st engineering"]),
        item("https://a", "SIA Engineering opens hangar", &["sia engineering"]),
        item("https://c", "SIA Engineering adds bay", &["sia engineering", "seletar"]),
        item("https://d", "Untagged story", &[]),
    ]
}

fn urls(v: &[EnrichedArticle]) -> Vec<&str> {
    v.iter().map(|e| e.article.source_url.as_str()).collect()
}

#[test]
fn second_pass_yields_nothing_for_every_scheme() {
    for scheme in [DedupScheme::Url, DedupScheme::Title, DedupScheme::Patterns] {
        let mut seen = SeenKeys::new(scheme);
        let first = seen.filter_new(batch());
        assert!(!first.is_empty());
        let second = seen.filter_new(first.clone());
        assert!(second.is_empty(), "{scheme:?} not idempotent");
        assert!(seen.filter_new(batch()).is_empty());
    }
}

#[test]
fn key_set_only_grows() {
    for scheme in [DedupScheme::Url, DedupScheme::Title, DedupScheme::Patterns] {
        let mut seen = SeenKeys::new(scheme);
        let mut last = 0;
        for e in batch() {
            seen.filter_new(vec![e]);
            assert!(seen.len() >= last);
            last = seen.len();
        }
    }
}

#[test]
fn scheme_specific_outcomes() {
    let mut by_url = SeenKeys::new(DedupScheme::Url);
    assert_eq!(
        urls(&by_url.filter_new(batch())),
        vec!["https://a", "https://b", "https://c", "https://d"]
    );

    // "SIA ..." twice under the same region and country collapses to one key
    let mut by_title = SeenKeys::new(DedupScheme::Title);
    assert_eq!(
        urls(&by_title.filter_new(batch())),
        vec!["https://a", "https://b", "https://d"]
    );

    // c is kept for its unseen "seletar" tag; d falls back to its URL
    let mut by_tag = SeenKeys::new(DedupScheme::Patterns);
    assert_eq!(
        urls(&by_tag.filter_new(batch())),
        vec!["https://a", "https://b", "https://c", "https://d"]
    );
}

#[test]
fn seeded_from_every_section_of_the_artifact() {
    let mut fields: Vec<String> = DEFAULT_FIELDS.iter().map(|s| s.to_string()).collect();
    fields.push(COL_PATTERNS.to_string());
    let old = |e: &EnrichedArticle| Row::from_enriched(e, &fields);

    let artifact = Artifact {
        sections: vec![
            Section {
                name: "2025-W17".into(),
                header: fields.clone(),
                rows: vec![old(&item("https://a", "SIA Engineering opens hangar", &["sia engineering", "changi"]))],
            },
            Section {
                name: "2025-W18".into(),
                header: fields.clone(),
                rows: vec![old(&item("https://b", "ST Engineering breaks ground", &["st engineering"]))],
            },
        ],
    };

    let mut by_url = SeenKeys::from_artifact(DedupScheme::Url, &artifact);
    assert_eq!(urls(&by_url.filter_new(batch())), vec!["https://c", "https://d"]);

    let mut by_tag = SeenKeys::from_artifact(DedupScheme::Patterns, &artifact);
    assert!(by_tag.contains("tag:changi"));
    assert_eq!(urls(&by_tag.filter_new(batch())), vec!["https://c", "https://d"]);
}

#[tokio::test]
async fn narrow_report_fields_still_persist_dedup_keys() {
    for scheme in ["url", "title", "patterns"] {
        let dir = tempfile::tempdir().unwrap();
        let env: HashMap<&str, String> = HashMap::from([
            ("REPORTS_DIR", dir.path().display().to_string()),
            ("REPORT_FIELDS", "Project Title, Summary".to_string()),
            ("DEDUP_SCHEME", scheme.to_string()),
        ]);
        let settings = Settings::from_lookup(|k| env.get(k).cloned()).unwrap();
        let writer = build_writer(&settings);
        assert_eq!(&writer.fields()[..2], ["Project Title", "Summary"]);

        let mut first_run = SeenKeys::new(settings.dedup_scheme);
        let written = first_run.filter_new(batch());
        writer.append(Region::Apac, &written, "2025-W18").await.unwrap();

        // a later run sees everything it wrote
        let artifact = writer.load(Region::Apac).unwrap();
        let mut next_run = SeenKeys::from_artifact(settings.dedup_scheme, &artifact);
        assert!(next_run.filter_new(batch()).is_empty(), "{scheme} re-admitted items");
    }
}
