// src/metrics.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const TEXTFILE_NAME: &str = "metrics.prom";

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe every metric the pipeline emits.
    /// Fails if a recorder is already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow!("prometheus: install recorder: {e}"))?;
        describe_all();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Dump the exposition text for a node-exporter textfile collector.
    pub fn write_textfile(&self, dir: &Path) -> Result<PathBuf> {
        gauge!("last_run_timestamp_seconds").set(chrono::Utc::now().timestamp() as f64);
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(TEXTFILE_NAME);
        let tmp = dir.join(format!(".{TEXTFILE_NAME}.tmp"));
        fs::write(&tmp, self.render()).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("renaming to {}", path.display()))?;
        Ok(path)
    }
}

pub fn describe_all() {
    crate::classify::ensure_metrics_described();
    crate::report::ensure_metrics_described();
    describe_counter!("search_results_total", "Raw search hits per provider");
    describe_counter!("search_provider_errors_total", "Failed provider calls");
    describe_histogram!("search_request_ms", "Search API latency in milliseconds");
    describe_counter!("llm_retries_total", "LLM calls retried after a failure");
    describe_counter!("dedup_suppressed_total", "Articles suppressed as already seen");
    describe_counter!("emails_sent_total", "Report emails delivered");
    describe_counter!("emails_failed_total", "Report emails that could not be delivered");
    describe_counter!("region_runs_total", "Region pipeline runs by outcome");
    describe_gauge!("last_run_timestamp_seconds", "Unix time the last run finished");
}
