// src/classify/summary.rs
use serde::Serialize;
use std::collections::BTreeMap;

use super::EnrichedArticle;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationSummary {
    pub total_articles: usize,
    pub hangar_related: usize,
    pub not_hangar_related: usize,
    pub completed_projects: usize,
    pub in_progress_projects: usize,
    /// Counts over hangar-related articles only.
    pub region_breakdown: BTreeMap<String, usize>,
    pub country_breakdown: BTreeMap<String, usize>,
}

pub fn summarize(results: &[EnrichedArticle]) -> ClassificationSummary {
    let mut s = ClassificationSummary {
        total_articles: results.len(),
        ..Default::default()
    };
    for e in results.iter().filter(|e| e.classification.is_hangar_related) {
        let c = &e.classification;
        s.hangar_related += 1;
        if c.completion_status {
            s.completed_projects += 1;
        }
        *s.region_breakdown.entry(c.region_label().to_string()).or_default() += 1;
        *s.country_breakdown.entry(c.country.clone()).or_default() += 1;
    }
    s.not_hangar_related = s.total_articles - s.hangar_related;
    s.in_progress_projects = s.hangar_related - s.completed_projects;
    s
}
