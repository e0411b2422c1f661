// src/ingest/providers/serpapi.rs
//! SerpAPI-backed news search (Google News and Bing News engines).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::ingest::dates::{parse_absolute, relative_in_window};
use crate::ingest::is_mro_candidate;
use crate::ingest::types::{RawArticle, SearchProvider, SearchWindow};

/// Hard stop for Bing pagination in case the date cut-off never triggers.
const MAX_BING_PAGES: u32 = 20;

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    news_results: Vec<SerpItem>,
    #[serde(default)]
    organic_results: Vec<SerpItem>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: String,
    /// Google returns `{ "name": .. }`, Bing a plain string.
    #[serde(default)]
    source: serde_json::Value,
}

impl SerpItem {
    fn into_raw(self) -> RawArticle {
        let source = match &self.source {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(o) => o
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };
        RawArticle {
            title: self.title.trim().to_string(),
            summary: self.snippet.trim().to_string(),
            url: self.link,
            published: (!self.date.is_empty()).then_some(self.date),
            source,
        }
    }
}

/// Shared HTTP client + credentials for both engines.
#[derive(Clone)]
pub struct SerpApi {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: u32,
}

impl SerpApi {
    pub fn new(api_key: &str, base_url: &str, max_results: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hangar-watch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building search http client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            max_results: max_results.max(1),
        })
    }

    async fn get(&self, params: &[(&str, String)]) -> Result<SerpResponse> {
        let t0 = std::time::Instant::now();
        let resp = self
            .http
            .get(&self.base_url)
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .context("search request")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("search API error ({status}): {body}"));
        }
        let parsed: SerpResponse = resp.json().await.context("decoding search response")?;
        histogram!("search_request_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        if let Some(err) = &parsed.error {
            // SerpAPI reports "no results" as an error string; callers treat it as empty.
            debug!(error = %err, "search API returned error field");
        }
        Ok(parsed)
    }
}

pub struct GoogleNews {
    api: SerpApi,
}

impl GoogleNews {
    pub fn new(api: SerpApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SearchProvider for GoogleNews {
    async fn search(&self, query: &str, window: &SearchWindow) -> Result<Vec<RawArticle>> {
        let params = [
            ("engine", "google_news".to_string()),
            ("q", query.to_string()),
        ];
        let resp = self.api.get(&params).await?;
        if resp.news_results.is_empty() {
            if let Some(err) = resp.error {
                warn!(%query, error = %err, "google news returned no results");
            }
            return Ok(Vec::new());
        }
        let start = window.start_date();
        Ok(resp
            .news_results
            .into_iter()
            .map(SerpItem::into_raw)
            .filter(|a| is_mro_candidate(&a.title, &a.summary))
            .filter(|a| match (start, a.published.as_deref().and_then(parse_absolute)) {
                (Some(start), Some(date)) => date >= start,
                // no cut-off, or a date we cannot read: keep
                _ => true,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "google_news"
    }
}

pub struct BingNews {
    api: SerpApi,
}

impl BingNews {
    pub fn new(api: SerpApi) -> Self {
        Self { api }
    }
}

/// Take items from one Bing page up to the first one outside the window.
/// Returns the kept items and whether paging must stop.
pub(crate) fn take_page(items: Vec<RawArticle>, backfill: bool) -> (Vec<RawArticle>, bool) {
    let mut kept = Vec::with_capacity(items.len());
    for it in items {
        let in_window = it
            .published
            .as_deref()
            .is_some_and(|d| relative_in_window(d, backfill));
        if !in_window {
            return (kept, true);
        }
        kept.push(it);
    }
    (kept, false)
}

#[async_trait]
impl SearchProvider for BingNews {
    async fn search(&self, query: &str, window: &SearchWindow) -> Result<Vec<RawArticle>> {
        let count = self.api.max_results;
        let qft = if window.backfill {
            r#"sortbydate="1""#
        } else {
            r#"interval="8"+sortbydate="1""#
        };

        let mut all = Vec::new();
        let mut first = 1u32;
        for _ in 0..MAX_BING_PAGES {
            let params = [
                ("engine", "bing_news".to_string()),
                ("q", query.to_string()),
                ("count", count.to_string()),
                ("qft", qft.to_string()),
                ("first", first.to_string()),
            ];
            let resp = self.api.get(&params).await?;
            let page: Vec<RawArticle> = resp
                .organic_results
                .into_iter()
                .map(SerpItem::into_raw)
                .collect();
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            let (mut kept, stop) = take_page(page, window.backfill);
            all.append(&mut kept);
            if stop || page_len < count as usize {
                break;
            }
            first += count;
        }

        Ok(all
            .into_iter()
            .filter(|a| is_mro_candidate(&a.title, &a.summary))
            .collect())
    }

    fn name(&self) -> &'static str {
        "bing_news"
    }
}
