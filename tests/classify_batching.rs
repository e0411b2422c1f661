// tests/classify_batching.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use hangar_watch::classify::llm::ScriptedLlm;
use hangar_watch::classify::{Classifier, ClassifierOptions, FilterMode};
use hangar_watch::ingest::types::NormalizedArticle;
use hangar_watch::Region;
use serde_json::{json, Value};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 10).unwrap()
}

fn article(i: usize) -> NormalizedArticle {
    NormalizedArticle {
        project_title: format!("Hangar project {i}"),
        source_url: format!("https://news.example/{i}"),
        summary: format!("summary {i}"),
        date_published: today(),
        week_collected: "2025-W28".into(),
    }
}

fn results(n: usize) -> Vec<Value> {
    (1..=n)
        .map(|i| {
            json!({"article_id": i, "is_hangar_related": true, "country": "GB",
                   "region": "UK_NA", "completion_status": false})
        })
        .collect()
}

fn opts(batch_size: usize, filter: FilterMode) -> ClassifierOptions {
    ClassifierOptions {
        batch_size,
        inter_batch_delay: Duration::ZERO,
        filter,
        ..Default::default()
    }
}

#[tokio::test]
async fn one_llm_call_per_batch_and_positional_ids() {
    let n = 23;
    let b = 10;
    let llm = Arc::new(
        ScriptedLlm::new()
            .reply_results(results(10))
            .reply_results(results(10))
            .reply_results(results(3)),
    );
    let classifier = Classifier::new(llm.clone(), opts(b, FilterMode::KeepAll));
    assert_eq!(classifier.batch_count(n), 3);

    let articles: Vec<_> = (0..n).map(article).collect();
    let out = classifier
        .process_all_articles(&articles, Region::UkNa, today())
        .await;

    assert_eq!(llm.calls(), 3);
    assert_eq!(out.len(), n);
    for (i, e) in out.iter().enumerate() {
        let id = e.classification.article_id.unwrap();
        assert!((1..=b as u32).contains(&id));
        assert_eq!(id as usize, i % b + 1);
        assert_eq!(e.article, articles[i]);
    }
    // each prompt numbers only its own batch
    let prompts = llm.prompts();
    assert!(prompts[2].contains("3. Title: Hangar project 22"));
    assert!(!prompts[2].contains("4. Title:"));
}

#[tokio::test]
async fn empty_input_makes_no_calls() {
    let llm = Arc::new(ScriptedLlm::new());
    let classifier = Classifier::new(llm.clone(), opts(10, FilterMode::KeepAll));
    let out = classifier.process_all_articles(&[], Region::UkNa, today()).await;
    assert!(out.is_empty());
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn failed_batches_are_skipped_not_raised() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .reply_results(results(2))
            .fail("503 service unavailable")
            .reply("this is not json")
            .reply(r#"{"answer": []}"#)
            .reply_results(results(2)),
    );
    let classifier = Classifier::new(llm.clone(), opts(2, FilterMode::KeepAll));
    let articles: Vec<_> = (0..10).map(article).collect();
    let out = classifier
        .process_all_articles(&articles, Region::UkNa, today())
        .await;

    assert_eq!(llm.calls(), 5);
    let urls: Vec<_> = out.iter().map(|e| e.article.source_url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://news.example/0",
            "https://news.example/1",
            "https://news.example/8",
            "https://news.example/9",
        ]
    );
}

#[tokio::test]
async fn scenario_mro_groundbreaking_vs_runway_project() {
    let lincoln = NormalizedArticle {
        project_title: "Lincoln Airport gets welcome surprises with runway project, added flights"
            .into(),
        source_url: "https://news.example/lincoln".into(),
        summary: "The airport received bids for one of the largest projects in its history."
            .into(),
        date_published: today(),
        week_collected: "2025-W28".into(),
    };
    let flydubai = NormalizedArticle {
        project_title: "Flydubai Breaks Ground On MRO Facility At Dubai South".into(),
        source_url: "https://news.example/flydubai".into(),
        summary: "Construction is due to be completed in the last quarter of 2026.".into(),
        date_published: today(),
        week_collected: "2025-W28".into(),
    };
    let llm = Arc::new(ScriptedLlm::new().reply_results(vec![
        json!({"article_id": 1, "is_hangar_related": false, "country": "US",
               "region": "UK_NA", "completion_status": false}),
        json!({"article_id": 2, "is_hangar_related": true, "country": "AE",
               "region": "EMEA", "completion_status": false}),
    ]));

    let classifier = Classifier::new(llm.clone(), opts(10, FilterMode::KeepAll));
    let out = classifier
        .process_all_articles(&[lincoln, flydubai], Region::Emea, today())
        .await;

    assert!(llm.prompts()[0].contains("July 10, 2025"));
    assert!(!out[0].classification.is_hangar_related);
    let fd = &out[1].classification;
    assert!(fd.is_hangar_related);
    assert!(!fd.completion_status);
    assert_eq!(fd.country, "AE");
    assert_eq!(fd.region, Some(Region::Emea));
}

#[tokio::test]
async fn in_flight_filter_keeps_target_region_open_projects() {
    let llm = Arc::new(ScriptedLlm::new().reply_results(vec![
        json!({"is_hangar_related": true, "country": "AE", "region": "EMEA", "completion_status": false}),
        json!({"is_hangar_related": true, "country": "GB", "region": "UK_NA", "completion_status": false}),
        json!({"is_hangar_related": true, "country": "FR", "region": "bogus", "completion_status": "yes"}),
        json!({"is_hangar_related": "false", "country": "DE", "region": "EMEA"}),
        json!({"country": "SA"}),
    ]));
    let classifier = Classifier::new(llm, opts(10, FilterMode::InFlight));
    let articles: Vec<_> = (0..5).map(article).collect();
    let out = classifier
        .process_all_articles(&articles, Region::Emea, today())
        .await;

    let urls: Vec<_> = out.iter().map(|e| e.article.source_url.as_str()).collect();
    // the last one relies on the related-by-default option and country re-derivation
    assert_eq!(urls, vec!["https://news.example/0", "https://news.example/4"]);
}
