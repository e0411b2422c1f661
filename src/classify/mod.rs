// src/classify/mod.rs
pub mod llm;
pub mod prompt;
pub mod summary;
pub mod validate;

use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ingest::types::NormalizedArticle;
use crate::region::{Region, NOT_APPLICABLE};
use llm::DynLlm;
use validate::{validate_result, ValidationOptions};

/// Cleaned LLM verdict for one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// 1-based position in the batch once merged; the echoed value before that.
    pub article_id: Option<u32>,
    pub is_hangar_related: bool,
    /// Two-letter upper-case code or "N/A".
    pub country: String,
    /// `None` renders as "N/A".
    pub region: Option<Region>,
    pub completion_status: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
}

impl Classification {
    pub fn region_label(&self) -> &'static str {
        self.region.map(Region::code).unwrap_or(NOT_APPLICABLE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedArticle {
    pub article: NormalizedArticle,
    pub classification: Classification,
}

impl EnrichedArticle {
    /// In-flight project for `target`: related, not yet complete, in the territory.
    pub fn is_in_flight_for(&self, target: Region) -> bool {
        let c = &self.classification;
        c.is_hangar_related && !c.completion_status && c.region == Some(target)
    }
}

/// What `process_all_articles` keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    KeepAll,
    #[default]
    InFlight,
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep_all" | "all" => Ok(FilterMode::KeepAll),
            "in_flight" | "inflight" => Ok(FilterMode::InFlight),
            other => Err(format!("expected keep_all or in_flight, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    pub batch_size: usize,
    /// Pause between consecutive batches. Zero in tests.
    pub inter_batch_delay: Duration,
    pub validation: ValidationOptions,
    pub filter: FilterMode,
    /// Ask the model for project tags (needed by the pattern dedup scheme).
    pub request_patterns: bool,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            inter_batch_delay: Duration::from_secs(1),
            validation: ValidationOptions::default(),
            filter: FilterMode::InFlight,
            request_patterns: false,
        }
    }
}

pub fn ensure_metrics_described() {
    use metrics::{describe_counter, describe_histogram};
    use once_cell::sync::OnceCell;
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("classifier_batches_total", "LLM batches attempted");
        describe_counter!(
            "classifier_batch_failures_total",
            "Batches that produced no results (transport or parse failure)"
        );
        describe_counter!("classifier_articles_total", "Articles that received a classification");
        describe_counter!("classifier_kept_total", "Articles kept after the post-filter");
        describe_histogram!("classifier_batch_ms", "LLM batch latency in milliseconds");
    });
}

pub struct Classifier {
    llm: DynLlm,
    opts: ClassifierOptions,
}

impl Classifier {
    pub fn new(llm: DynLlm, opts: ClassifierOptions) -> Self {
        ensure_metrics_described();
        Self { llm, opts }
    }

    pub fn options(&self) -> &ClassifierOptions {
        &self.opts
    }

    pub fn batch_size(&self) -> usize {
        self.opts.batch_size.max(1)
    }

    /// `ceil(n / batch_size)`.
    pub fn batch_count(&self, n: usize) -> usize {
        n.div_ceil(self.batch_size())
    }

    /// One LLM call for `batch`. Errors on transport failure or an unusable completion;
    /// individual result objects never fail (they are validated, not parsed).
    pub async fn analyze_batch(
        &self,
        batch: &[NormalizedArticle],
        today: NaiveDate,
    ) -> Result<Vec<EnrichedArticle>> {
        let prompt = prompt::build_batch_prompt(batch, today, self.opts.request_patterns);
        let completion = self
            .llm
            .complete(&prompt)
            .await
            .with_context(|| format!("{} completion", self.llm.provider_name()))?;
        let results = parse_results(&completion)?;
        Ok(merge_results(batch, &results, &self.opts.validation))
    }

    /// Classify every article in sequential batches. Never fails: a batch that errors
    /// contributes nothing and the run moves on.
    pub async fn process_all_articles(
        &self,
        articles: &[NormalizedArticle],
        target: Region,
        today: NaiveDate,
    ) -> Vec<EnrichedArticle> {
        let total_batches = self.batch_count(articles.len());
        let mut all = Vec::with_capacity(articles.len());

        for (i, batch) in articles.chunks(self.batch_size()).enumerate() {
            let batch_num = i + 1;
            info!(
                region = target.id(),
                batch = batch_num,
                total_batches,
                size = batch.len(),
                "classifying batch"
            );
            counter!("classifier_batches_total").increment(1);
            let t0 = Instant::now();
            match self.analyze_batch(batch, today).await {
                Ok(mut enriched) => {
                    counter!("classifier_articles_total").increment(enriched.len() as u64);
                    all.append(&mut enriched);
                }
                Err(e) => {
                    warn!(error = ?e, region = target.id(), batch = batch_num, "batch failed, skipping");
                    counter!("classifier_batch_failures_total").increment(1);
                }
            }
            histogram!("classifier_batch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            if batch_num < total_batches && !self.opts.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.opts.inter_batch_delay).await;
            }
        }

        let kept = apply_filter(all, self.opts.filter, target);
        counter!("classifier_kept_total").increment(kept.len() as u64);
        info!(
            region = target.id(),
            input = articles.len(),
            kept = kept.len(),
            filter = ?self.opts.filter,
            "classification finished"
        );
        kept
    }
}

pub fn apply_filter(
    all: Vec<EnrichedArticle>,
    mode: FilterMode,
    target: Region,
) -> Vec<EnrichedArticle> {
    match mode {
        FilterMode::KeepAll => all,
        FilterMode::InFlight => all.into_iter().filter(|e| e.is_in_flight_for(target)).collect(),
    }
}

/// Pull the `results` array out of a completion. Tolerates a fenced code block.
pub fn parse_results(completion: &str) -> Result<Vec<Value>> {
    let body = strip_code_fence(completion);
    let v: Value = serde_json::from_str(body).context("completion is not valid JSON")?;
    match v.get("results") {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(anyhow!("`results` is not an array: {other}")),
        None => Err(anyhow!("completion has no `results` key")),
    }
}

fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    match t.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.trim_start_matches("json");
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => t,
    }
}

/// Positional merge: result `i` belongs to article `i`. Surplus results are dropped,
/// missing ones leave their articles unclassified.
pub fn merge_results(
    batch: &[NormalizedArticle],
    results: &[Value],
    opts: &ValidationOptions,
) -> Vec<EnrichedArticle> {
    if results.len() != batch.len() {
        warn!(
            expected = batch.len(),
            got = results.len(),
            "result count does not match batch size"
        );
    }
    batch
        .iter()
        .zip(results)
        .enumerate()
        .map(|(idx, (article, raw))| {
            let position = (idx + 1) as u32;
            let mut classification = validate_result(raw, opts);
            if let Some(echoed) = classification.article_id.filter(|id| *id != position) {
                debug!(position, echoed, "echoed article_id differs from position");
            }
            classification.article_id = Some(position);
            EnrichedArticle {
                article: article.clone(),
                classification,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article(n: usize) -> NormalizedArticle {
        NormalizedArticle {
            project_title: format!("Article {n}"),
            source_url: format!("https://news/{n}"),
            summary: String::new(),
            date_published: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            week_collected: "2025-W01".into(),
        }
    }

    #[test]
    fn filter_modes_parse() {
        assert_eq!("keep_all".parse::<FilterMode>(), Ok(FilterMode::KeepAll));
        assert_eq!(" IN_FLIGHT ".parse::<FilterMode>(), Ok(FilterMode::InFlight));
        assert!("some".parse::<FilterMode>().is_err());
    }

    #[test]
    fn results_parse_from_plain_and_fenced_json() {
        let plain = r#"{"results": [{"article_id": 1}]}"#;
        assert_eq!(parse_results(plain).unwrap().len(), 1);
        let fenced = "```json\n{\"results\": []}\n```";
        assert!(parse_results(fenced).unwrap().is_empty());
        assert!(parse_results("not json").is_err());
        assert!(parse_results(r#"{"items": []}"#).is_err());
        assert!(parse_results(r#"{"results": {}}"#).is_err());
    }

    #[test]
    fn merge_is_positional_and_ignores_echoed_ids() {
        let batch = vec![article(1), article(2)];
        let results = vec![
            json!({"article_id": 2, "country": "US"}),
            json!({"article_id": 1, "country": "FR"}),
        ];
        let merged = merge_results(&batch, &results, &ValidationOptions::default());
        assert_eq!(merged[0].article.source_url, "https://news/1");
        assert_eq!(merged[0].classification.country, "US");
        assert_eq!(merged[0].classification.article_id, Some(1));
        assert_eq!(merged[1].classification.region, Some(Region::Emea));
        assert_eq!(merged[1].classification.article_id, Some(2));
    }

    #[test]
    fn merge_tolerates_short_and_long_result_lists() {
        let batch = vec![article(1), article(2), article(3)];
        let short = merge_results(&batch, &[json!({})], &ValidationOptions::default());
        assert_eq!(short.len(), 1);
        let long = merge_results(
            &batch[..1],
            &[json!({}), json!({}), json!({})],
            &ValidationOptions::default(),
        );
        assert_eq!(long.len(), 1);
    }

    #[test]
    fn in_flight_filter_keeps_only_open_projects_in_territory() {
        let mk = |related, done, region| EnrichedArticle {
            article: article(0),
            classification: Classification {
                article_id: Some(1),
                is_hangar_related: related,
                country: "GB".into(),
                region,
                completion_status: done,
                patterns: vec![],
            },
        };
        let all = vec![
            mk(true, false, Some(Region::UkNa)),
            mk(false, false, Some(Region::UkNa)),
            mk(true, true, Some(Region::UkNa)),
            mk(true, false, Some(Region::Emea)),
            mk(true, false, None),
        ];
        assert_eq!(apply_filter(all.clone(), FilterMode::InFlight, Region::UkNa).len(), 1);
        assert_eq!(apply_filter(all, FilterMode::KeepAll, Region::UkNa).len(), 5);
    }
}
