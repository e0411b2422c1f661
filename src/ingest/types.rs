// src/ingest/types.rs
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// A search hit as returned by a provider. Lives only within one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawArticle {
    pub title: String,
    pub summary: String,
    pub url: String,
    /// Absolute ("11/12/2024, 09:03 AM") or relative ("3d") date, as the provider gave it.
    pub published: Option<String>,
    pub source: String,
}

/// Canonical article shape. `source_url` is non-empty and unique within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedArticle {
    pub project_title: String,
    pub source_url: String,
    pub summary: String,
    pub date_published: NaiveDate,
    /// `<ISO year>-W<week>`, e.g. `2025-W07`.
    pub week_collected: String,
}

/// Time window a search run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub backfill: bool,
    pub today: NaiveDate,
    pub backfill_months: u32,
}

impl SearchWindow {
    pub fn weekly(today: NaiveDate) -> Self {
        Self {
            backfill: false,
            today,
            backfill_months: 0,
        }
    }

    pub fn backfill(today: NaiveDate, months: u32) -> Self {
        Self {
            backfill: true,
            today,
            backfill_months: months,
        }
    }

    /// Earliest publication date a backfill accepts (months counted as 30 days).
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.backfill
            .then(|| self.today - Duration::days(i64::from(self.backfill_months) * 30))
    }
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, window: &SearchWindow) -> Result<Vec<RawArticle>>;
    fn name(&self) -> &'static str;
}
