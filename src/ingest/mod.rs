// src/ingest/mod.rs
pub mod dates;
pub mod providers;
pub mod types;

use chrono::NaiveDateTime;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::settings::SEARCH_QUERIES;
use crate::config::RegionDef;
use crate::ingest::types::{NormalizedArticle, RawArticle, SearchProvider, SearchWindow};

/// Content that looks like aviation heritage rather than an MRO project.
const EXCLUDE_KEYWORDS: &[&str] = &[
    "museum", "historic", "vintage", "classic", "antique", "restoration", "exhibition",
    "display", "showcase", "tourist", "visitor center", "air show", "airshow", "festival",
    "celebration", "anniversary", "memorial", "tribute", "heritage", "legacy", "preservation",
];

const MRO_KEYWORDS: &[&str] = &[
    "mro", "maintenance", "repair", "overhaul", "facility", "hangar", "construction",
    "expansion", "renovation", "retrofit", "upgrade", "modernization", "development",
    "project", "investment", "contract",
];

/// Normalize text: decode entities, strip tags, fold typographic quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Keyword pre-filter applied before anything reaches the LLM.
pub fn is_mro_candidate(title: &str, summary: &str) -> bool {
    let content = format!("{} {}", title, summary).to_lowercase();
    if EXCLUDE_KEYWORDS.iter().any(|k| content.contains(k)) {
        return false;
    }
    MRO_KEYWORDS.iter().any(|k| content.contains(k))
}

/// Every base query combined with every additional region term.
/// A region without terms searches the base queries as-is.
pub fn build_queries(terms: &[String]) -> Vec<String> {
    if terms.is_empty() {
        return SEARCH_QUERIES.iter().map(|q| q.to_string()).collect();
    }
    SEARCH_QUERIES
        .iter()
        .flat_map(|q| terms.iter().map(move |t| format!("{q} {t}")))
        .collect()
}

/// Drop articles without a URL and every repeat of a URL already seen. Keeps first occurrence.
pub fn remove_duplicates(articles: Vec<RawArticle>) -> Vec<RawArticle> {
    let mut seen: HashSet<String> = HashSet::new();
    articles
        .into_iter()
        .filter(|a| !a.url.trim().is_empty() && seen.insert(a.url.trim().to_string()))
        .collect()
}

/// Raw search hits → canonical articles for the current ISO week, unique by URL.
pub fn normalize_articles(raw: Vec<RawArticle>, now: NaiveDateTime) -> Vec<NormalizedArticle> {
    let week = dates::iso_week_label(now.date());
    remove_duplicates(raw)
        .into_iter()
        .map(|a| NormalizedArticle {
            project_title: normalize_text(&a.title),
            source_url: a.url.trim().to_string(),
            summary: normalize_text(&a.summary),
            date_published: dates::parse_published(a.published.as_deref(), now),
            week_collected: week.clone(),
        })
        .collect()
}

/// Run every query for a region against every provider. Provider errors are logged and skipped.
pub async fn collect_region(
    providers: &[Box<dyn SearchProvider>],
    def: &RegionDef,
    window: &SearchWindow,
) -> Vec<RawArticle> {
    let mut raw = Vec::new();
    for query in build_queries(&def.additional_query_terms) {
        info!(region = def.id(), %query, "searching");
        for p in providers {
            match p.search(&query, window).await {
                Ok(mut v) => {
                    counter!("search_results_total", "provider" => p.name())
                        .increment(v.len() as u64);
                    raw.append(&mut v);
                }
                Err(e) => {
                    warn!(error = ?e, provider = p.name(), %query, "search provider error");
                    counter!("search_provider_errors_total", "provider" => p.name()).increment(1);
                }
            }
        }
    }
    let unique = remove_duplicates(raw);
    info!(region = def.id(), unique = unique.len(), "collected candidate articles");
    unique
}
