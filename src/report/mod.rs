// src/report/mod.rs
//! Region report artifacts: one workbook per region, either a single table that new
//! rows are prepended to, or one section per collection week.

pub mod xlsx;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use metrics::counter;
use tracing::{info, warn};

use crate::classify::EnrichedArticle;
use crate::error::StoreError;
use crate::ingest::types::NormalizedArticle;
use crate::region::Region;

pub const COL_TITLE: &str = "Project Title";
pub const COL_URL: &str = "Source URL";
pub const COL_SUMMARY: &str = "Summary";
pub const COL_COUNTRY: &str = "Country";
pub const COL_REGION: &str = "Region";
pub const COL_DATE: &str = "Date Published";
pub const COL_WEEK: &str = "Week Collected";
pub const COL_RELATED: &str = "Is Hangar Related";
pub const COL_COMPLETED: &str = "Completion Status";
pub const COL_PATTERNS: &str = "Patterns";

pub const DEFAULT_FIELDS: &[&str] = &[
    COL_TITLE,
    COL_URL,
    COL_SUMMARY,
    COL_COUNTRY,
    COL_REGION,
    COL_DATE,
    COL_WEEK,
];

/// Sheet name used by flat mode.
pub const FLAT_SECTION: &str = "Hangar Projects";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    Flat,
    #[default]
    Versioned,
}

impl FromStr for ReportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(ReportMode::Flat),
            "versioned" | "weekly" => Ok(ReportMode::Versioned),
            other => Err(format!("expected flat or versioned, got '{other}'")),
        }
    }
}

/// Audit row colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    /// Region outside the artifact's territory (red).
    OutOfTerritory,
    /// Not hangar related (yellow).
    NotRelated,
    /// Project already completed (blue).
    Completed,
}

impl Highlight {
    pub fn rgb(self) -> u32 {
        match self {
            Highlight::OutOfTerritory => 0xFA0228,
            Highlight::NotRelated => 0xFFE100,
            Highlight::Completed => 0x00F7FF,
        }
    }

    /// First matching rule wins: territory, then relevance, then completion.
    pub fn for_article(e: &EnrichedArticle, target: Region) -> Option<Highlight> {
        let c = &e.classification;
        if c.region != Some(target) {
            Some(Highlight::OutOfTerritory)
        } else if !c.is_hangar_related {
            Some(Highlight::NotRelated)
        } else if c.completion_status {
            Some(Highlight::Completed)
        } else {
            None
        }
    }
}

/// One data row keyed by column name. Unknown columns read as "".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub cells: BTreeMap<String, String>,
    pub highlight: Option<Highlight>,
}

impl Row {
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or_default()
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(column.to_string(), value.into());
    }

    pub fn from_enriched(e: &EnrichedArticle, fields: &[String]) -> Self {
        let cells = fields
            .iter()
            .map(|f| (f.clone(), render_field(e, f)))
            .collect();
        Self {
            cells,
            highlight: None,
        }
    }

    /// Rebuild the article a row was written from. `None` for rows without a title or URL.
    pub fn to_article(&self, today: NaiveDate) -> Option<NormalizedArticle> {
        let title = self.get(COL_TITLE).trim();
        let url = self.get(COL_URL).trim();
        if title.is_empty() && url.is_empty() {
            return None;
        }
        let date_published = NaiveDate::parse_from_str(self.get(COL_DATE).trim(), "%Y-%m-%d")
            .unwrap_or(today);
        Some(NormalizedArticle {
            project_title: title.to_string(),
            source_url: url.to_string(),
            summary: self.get(COL_SUMMARY).trim().to_string(),
            date_published,
            week_collected: self.get(COL_WEEK).trim().to_string(),
        })
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }
}

pub fn render_field(e: &EnrichedArticle, field: &str) -> String {
    let a = &e.article;
    let c = &e.classification;
    match field {
        COL_TITLE => a.project_title.clone(),
        COL_URL => a.source_url.clone(),
        COL_SUMMARY => a.summary.clone(),
        COL_COUNTRY => c.country.clone(),
        COL_REGION => c.region_label().to_string(),
        COL_DATE => a.date_published.format("%Y-%m-%d").to_string(),
        COL_WEEK => a.week_collected.clone(),
        COL_RELATED => c.is_hangar_related.to_string(),
        COL_COMPLETED => c.completion_status.to_string(),
        COL_PATTERNS => c.patterns.join(", "),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    pub sections: Vec<Section>,
}

impl Artifact {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.sections.iter().map(|s| s.rows.len()).sum()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.sections.iter().flat_map(|s| s.rows.iter())
    }

    /// `base`, or `base (2)`, `base (3)`, ... if taken.
    pub fn unique_section_name(&self, base: &str) -> String {
        if self.section(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base} ({n})"))
            .find(|name| self.section(name).is_none())
            .unwrap_or_else(|| base.to_string())
    }
}

/// Persistence for artifacts. Implementations report a busy artifact as `StoreError::Locked`.
pub trait ArtifactStore: Send + Sync {
    fn load(&self, path: &Path) -> Result<Option<Artifact>, StoreError>;
    fn save(&self, path: &Path, artifact: &Artifact) -> Result<(), StoreError>;
}

/// In-memory store for tests. Can be told to report `Locked` for the next N saves.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, Artifact>>,
    locked_saves: AtomicU32,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(self, path: impl Into<PathBuf>, artifact: Artifact) -> Self {
        if let Ok(mut f) = self.files.lock() {
            f.insert(path.into(), artifact);
        }
        self
    }

    pub fn lock_next_saves(&self, n: u32) {
        self.locked_saves.store(n, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, path: &Path) -> Option<Artifact> {
        self.files.lock().ok().and_then(|f| f.get(path).cloned())
    }
}

impl ArtifactStore for MemoryStore {
    fn load(&self, path: &Path) -> Result<Option<Artifact>, StoreError> {
        Ok(self.get(path))
    }

    fn save(&self, path: &Path, artifact: &Artifact) -> Result<(), StoreError> {
        let locked = self
            .locked_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if locked {
            return Err(StoreError::Locked(path.to_path_buf()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().map_err(|_| StoreError::Write {
            path: path.to_path_buf(),
            message: "store mutex poisoned".into(),
        })?;
        files.insert(path.to_path_buf(), artifact.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub new_rows: usize,
    /// Section the new rows went to.
    pub section: String,
    pub total_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
    pub row_count: usize,
}

pub fn ensure_metrics_described() {
    use metrics::describe_counter;
    use once_cell::sync::OnceCell;
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("report_rows_written_total", "New rows written to region artifacts");
        describe_counter!("report_lock_retries_total", "Saves retried because the artifact was locked");
    });
}

pub struct ReportWriter {
    store: Arc<dyn ArtifactStore>,
    dir: PathBuf,
    mode: ReportMode,
    fields: Vec<String>,
    retry: RetryPolicy,
}

impl ReportWriter {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        dir: impl Into<PathBuf>,
        mode: ReportMode,
        fields: Vec<String>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            dir: dir.into(),
            mode,
            fields,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn mode(&self) -> ReportMode {
        self.mode
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn artifact_path(&self, region: Region) -> PathBuf {
        self.dir.join(format!("{}.xlsx", region.code()))
    }

    pub fn audit_path(&self, region: Region) -> PathBuf {
        self.dir.join(format!("{}_audit.xlsx", region.code()))
    }

    /// Existing artifact, or an empty one if there is none yet.
    pub fn load(&self, region: Region) -> Result<Artifact, StoreError> {
        Ok(self
            .store
            .load(&self.artifact_path(region))?
            .unwrap_or_default())
    }

    /// Add `new` to the region artifact per the configured mode. A locked artifact is
    /// retried with exponential backoff; after the last attempt the error is returned.
    pub async fn append(
        &self,
        region: Region,
        new: &[EnrichedArticle],
        week: &str,
    ) -> Result<WriteOutcome, StoreError> {
        let path = self.artifact_path(region);
        let mut attempt = 1;
        loop {
            match self.try_append(&path, new, week) {
                Ok(outcome) => {
                    counter!("report_rows_written_total", "region" => region.id())
                        .increment(outcome.new_rows as u64);
                    info!(
                        region = region.id(),
                        path = %outcome.path.display(),
                        section = %outcome.section,
                        new_rows = outcome.new_rows,
                        total_rows = outcome.total_rows,
                        "artifact updated"
                    );
                    return Ok(outcome);
                }
                Err(e) if e.is_locked() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.base_delay.saturating_mul(1 << (attempt - 1));
                    warn!(
                        region = region.id(),
                        path = %path.display(),
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "artifact locked, close it in other applications; retrying"
                    );
                    counter!("report_lock_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_append(
        &self,
        path: &Path,
        new: &[EnrichedArticle],
        week: &str,
    ) -> Result<WriteOutcome, StoreError> {
        let mut artifact = self.store.load(path)?.unwrap_or_default();
        let new_rows: Vec<Row> = new.iter().map(|e| Row::from_enriched(e, &self.fields)).collect();
        let n = new_rows.len();

        let section = match self.mode {
            ReportMode::Flat => {
                let idx = match artifact.sections.iter().position(|s| s.name == FLAT_SECTION) {
                    Some(i) => i,
                    None if artifact.sections.len() == 1 => 0,
                    None => {
                        artifact.sections.insert(
                            0,
                            Section {
                                name: FLAT_SECTION.to_string(),
                                ..Default::default()
                            },
                        );
                        0
                    }
                };
                let s = &mut artifact.sections[idx];
                let existing = std::mem::take(&mut s.rows);
                s.header = self.fields.clone();
                s.rows = new_rows;
                s.rows.extend(existing);
                s.name.clone()
            }
            ReportMode::Versioned => {
                let name = artifact.unique_section_name(week);
                artifact.sections.push(Section {
                    name: name.clone(),
                    header: self.fields.clone(),
                    rows: new_rows,
                });
                name
            }
        };

        self.store.save(path, &artifact)?;
        Ok(WriteOutcome {
            path: path.to_path_buf(),
            new_rows: n,
            section,
            total_rows: artifact.row_count(),
        })
    }

    /// Write a standalone audit workbook (single section, highlighted rows).
    pub async fn write_audit(&self, region: Region, rows: Vec<Row>) -> Result<PathBuf, StoreError> {
        let path = self.audit_path(region);
        let mut header = self.fields.clone();
        for extra in [COL_RELATED, COL_COMPLETED] {
            if !header.iter().any(|h| h == extra) {
                header.push(extra.to_string());
            }
        }
        let artifact = Artifact {
            sections: vec![Section {
                name: format!("{} audit", region.code()),
                header,
                rows,
            }],
        };
        let mut attempt = 1;
        loop {
            match self.store.save(&path, &artifact) {
                Ok(()) => return Ok(path),
                Err(e) if e.is_locked() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.base_delay.saturating_mul(1 << (attempt - 1));
                    warn!(path = %path.display(), attempt, "audit artifact locked, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn file_info(&self, region: Region) -> FileInfo {
        let path = self.artifact_path(region);
        let meta = std::fs::metadata(&path).ok();
        let row_count = match self.store.load(&path) {
            Ok(Some(a)) => a.row_count(),
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "could not read artifact");
                0
            }
        };
        FileInfo {
            exists: meta.is_some() || row_count > 0,
            size: meta.as_ref().map(|m| m.len()).unwrap_or(0),
            modified: meta
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Local>::from),
            row_count,
            path,
        }
    }
}
