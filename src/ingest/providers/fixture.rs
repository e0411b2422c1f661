// src/ingest/providers/fixture.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;

use crate::ingest::types::{RawArticle, SearchProvider, SearchWindow};

/// Provider that returns the same canned hits for every query (tests, dry runs).
/// Records the queries it was asked.
pub struct StaticSearch {
    articles: Vec<RawArticle>,
    fail: bool,
    pub queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(articles: Vec<RawArticle>) -> Self {
        Self {
            articles,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            articles: Vec::new(),
            fail: true,
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str, _window: &SearchWindow) -> Result<Vec<RawArticle>> {
        if let Ok(mut q) = self.queries.lock() {
            q.push(query.to_string());
        }
        if self.fail {
            return Err(anyhow!("static search configured to fail"));
        }
        Ok(self.articles.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
