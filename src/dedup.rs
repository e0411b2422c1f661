// src/dedup.rs
//! Cross-run duplicate suppression.
//!
//! A `SeenKeys` set is built once per region run from every section of the existing
//! artifact, then consulted and grown by `filter_new`. Keys are only ever added.

use std::collections::HashSet;
use std::str::FromStr;

use metrics::counter;
use tracing::{debug, info};

use crate::classify::EnrichedArticle;
use crate::report::{Artifact, Row, COL_COUNTRY, COL_PATTERNS, COL_REGION, COL_TITLE, COL_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupScheme {
    /// Exact source URL.
    #[default]
    Url,
    /// `first-word-of-title_region_country`, lower-cased.
    Title,
    /// Free-form project tags from the model; new if any tag is unseen.
    Patterns,
}

impl DedupScheme {
    /// Artifact columns this scheme reads back on the next run. The URL column is
    /// always included since every scheme falls back to it for keyless items.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            DedupScheme::Url => &[COL_URL],
            DedupScheme::Title => &[COL_TITLE, COL_REGION, COL_COUNTRY, COL_URL],
            DedupScheme::Patterns => &[COL_PATTERNS, COL_URL],
        }
    }
}

/// Append any column `scheme` needs that `fields` leaves out, keeping the configured order.
pub fn with_dedup_columns(mut fields: Vec<String>, scheme: DedupScheme) -> Vec<String> {
    for col in scheme.required_columns() {
        if !fields.iter().any(|f| f == col) {
            fields.push((*col).to_string());
        }
    }
    fields
}

impl FromStr for DedupScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(DedupScheme::Url),
            "title" => Ok(DedupScheme::Title),
            "patterns" | "pattern" => Ok(DedupScheme::Patterns),
            other => Err(format!("expected url, title or patterns, got '{other}'")),
        }
    }
}

pub fn title_key(title: &str, region: &str, country: &str) -> String {
    let first = title.split_whitespace().next().unwrap_or_default();
    format!(
        "{}_{}_{}",
        first.to_lowercase(),
        region.trim().to_lowercase(),
        country.trim().to_lowercase()
    )
}

fn url_key(url: &str) -> String {
    format!("url:{}", url.trim())
}

/// Split the "Patterns" cell back into tags.
pub fn split_patterns(cell: &str) -> Vec<String> {
    cell.split([',', ';'])
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct SeenKeys {
    scheme: DedupScheme,
    keys: HashSet<String>,
}

impl SeenKeys {
    pub fn new(scheme: DedupScheme) -> Self {
        Self {
            scheme,
            keys: HashSet::new(),
        }
    }

    /// Seed from every section of an existing artifact.
    pub fn from_artifact(scheme: DedupScheme, artifact: &Artifact) -> Self {
        let mut seen = Self::new(scheme);
        for section in &artifact.sections {
            for row in &section.rows {
                let keys = seen.row_keys(row);
                seen.keys.extend(keys);
            }
        }
        debug!(scheme = ?scheme, keys = seen.keys.len(), "loaded seen keys");
        seen
    }

    pub fn scheme(&self) -> DedupScheme {
        self.scheme
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn row_keys(&self, row: &Row) -> Vec<String> {
        self.keys_from(
            row.get(COL_URL),
            row.get(COL_TITLE),
            row.get(COL_REGION),
            row.get(COL_COUNTRY),
            &split_patterns(row.get(COL_PATTERNS)),
        )
    }

    pub fn article_keys(&self, e: &EnrichedArticle) -> Vec<String> {
        let c = &e.classification;
        self.keys_from(
            &e.article.source_url,
            &e.article.project_title,
            c.region_label(),
            &c.country,
            &c.patterns,
        )
    }

    fn keys_from(
        &self,
        url: &str,
        title: &str,
        region: &str,
        country: &str,
        patterns: &[String],
    ) -> Vec<String> {
        let by_url = || {
            if url.trim().is_empty() {
                Vec::new()
            } else {
                vec![url_key(url)]
            }
        };
        match self.scheme {
            DedupScheme::Url => by_url(),
            // untitled or untagged items fall back to their URL
            DedupScheme::Title if title.trim().is_empty() => by_url(),
            DedupScheme::Title => vec![title_key(title, region, country)],
            DedupScheme::Patterns if patterns.is_empty() => by_url(),
            DedupScheme::Patterns => patterns.iter().map(|p| format!("tag:{p}")).collect(),
        }
    }

    /// Keep items with at least one unseen key, committing all of their keys at once.
    /// Later duplicates in the same input are therefore suppressed too. An item with
    /// no key at all cannot match anything and is kept.
    pub fn filter_new(&mut self, items: Vec<EnrichedArticle>) -> Vec<EnrichedArticle> {
        let total = items.len();
        let mut fresh = Vec::with_capacity(total);
        for item in items {
            let keys = self.article_keys(&item);
            let is_new = keys.is_empty() || keys.iter().any(|k| !self.keys.contains(k));
            if is_new {
                self.keys.extend(keys);
                fresh.push(item);
            }
        }
        let suppressed = total - fresh.len();
        counter!("dedup_suppressed_total").increment(suppressed as u64);
        info!(
            scheme = ?self.scheme,
            input = total,
            kept = fresh.len(),
            suppressed,
            "cross-run dedup"
        );
        fresh
    }
}
