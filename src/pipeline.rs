// src/pipeline.rs
//! Per-region orchestration: search → normalize → classify → dedup → report → email.
//! Regions run sequentially and independently; one failing region does not stop the rest.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use metrics::counter;
use rand::Rng;
use tracing::{error, info, warn};

use crate::classify::llm::{DynLlm, OpenAiClient, RetryLlm};
use crate::classify::summary::summarize;
use crate::classify::{Classifier, ClassifierOptions, FilterMode};
use crate::config::{RegionRegistry, Settings};
use crate::dedup::{with_dedup_columns, DedupScheme, SeenKeys};
use crate::ingest::dates::iso_week_label;
use crate::ingest::providers::{BingNews, GoogleNews, SerpApi};
use crate::ingest::types::{SearchProvider, SearchWindow};
use crate::ingest::{collect_region, normalize_articles};
use crate::notify::{build_mailer, pick_test_report, Notifier};
use crate::region::Region;
use crate::report::xlsx::XlsxStore;
use crate::report::{FileInfo, Highlight, ReportWriter, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Weekly,
    Backfill,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionOutcome {
    /// Search produced no candidates.
    NoArticles,
    /// Everything classified was already in the artifact (or filtered out).
    NothingNew { candidates: usize },
    Written {
        new_rows: usize,
        total_rows: usize,
        emailed: bool,
    },
}

impl RegionOutcome {
    fn label(&self) -> &'static str {
        match self {
            RegionOutcome::NoArticles => "no_articles",
            RegionOutcome::NothingNew { .. } => "nothing_new",
            RegionOutcome::Written { .. } => "written",
        }
    }
}

pub struct Pipeline {
    pub registry: RegionRegistry,
    pub providers: Vec<Box<dyn SearchProvider>>,
    pub llm: DynLlm,
    pub classifier: ClassifierOptions,
    pub writer: ReportWriter,
    /// `None` when mail is not configured; reports are still written.
    pub notifier: Option<Notifier>,
    pub dedup: DedupScheme,
    pub regions: Vec<Region>,
    pub backfill_months: u32,
}

pub fn build_llm(settings: &Settings) -> Result<DynLlm> {
    let client = OpenAiClient::new(
        settings.llm_key()?,
        &settings.openai_model,
        &settings.openai_base_url,
    )?;
    Ok(Arc::new(RetryLlm::new(client, settings.llm_max_retries)))
}

pub fn build_notifier(settings: &Settings) -> Result<Notifier> {
    let transport = settings.mail_transport()?;
    let mailer = build_mailer(transport, &settings.mail.sender_name)?;
    Ok(Notifier::new(mailer, settings.brand.clone()))
}

/// Columns the dedup scheme reads back are always written, whatever `REPORT_FIELDS` says.
pub fn build_writer(settings: &Settings) -> ReportWriter {
    let fields = with_dedup_columns(settings.report_fields.clone(), settings.dedup_scheme);
    ReportWriter::new(
        Arc::new(XlsxStore::new()),
        settings.reports_dir.clone(),
        settings.report_mode,
        fields,
    )
}

impl Pipeline {
    /// Wire production adapters. Search and LLM are required; mail is optional.
    pub fn from_settings(settings: &Settings, registry: RegionRegistry) -> Result<Self> {
        let api = SerpApi::new(
            settings.search_key()?,
            &settings.serpapi_url,
            settings.max_results_per_query,
        )?;
        let providers: Vec<Box<dyn SearchProvider>> = vec![
            Box::new(GoogleNews::new(api.clone())),
            Box::new(BingNews::new(api)),
        ];

        let notifier = match build_notifier(settings) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "email disabled; reports will be written but not sent");
                None
            }
        };

        Ok(Self {
            registry,
            providers,
            llm: build_llm(settings)?,
            classifier: ClassifierOptions {
                batch_size: settings.batch_size,
                inter_batch_delay: settings.batch_delay,
                validation: settings.validation_options(),
                filter: settings.classify_filter,
                request_patterns: settings.dedup_scheme == DedupScheme::Patterns,
            },
            writer: build_writer(settings),
            notifier,
            dedup: settings.dedup_scheme,
            regions: settings.regions.clone(),
            backfill_months: settings.backfill_months,
        })
    }

    fn window(&self, mode: RunMode, today: NaiveDate) -> SearchWindow {
        match mode {
            RunMode::Weekly => SearchWindow::weekly(today),
            RunMode::Backfill => SearchWindow::backfill(today, self.backfill_months),
        }
    }

    pub async fn run_region(
        &self,
        region: Region,
        mode: RunMode,
        now: NaiveDateTime,
    ) -> Result<RegionOutcome> {
        let today = now.date();
        let def = self.registry.get(region);
        info!(region = region.id(), ?mode, "region run started");

        let raw = collect_region(&self.providers, def, &self.window(mode, today)).await;
        if raw.is_empty() {
            warn!(region = region.id(), "no articles found");
            return Ok(RegionOutcome::NoArticles);
        }

        let articles = normalize_articles(raw, now);
        let classifier = Classifier::new(self.llm.clone(), self.classifier.clone());
        let enriched = classifier.process_all_articles(&articles, region, today).await;
        let summary = summarize(&enriched);
        info!(
            region = region.id(),
            total = summary.total_articles,
            hangar_related = summary.hangar_related,
            completed = summary.completed_projects,
            in_progress = summary.in_progress_projects,
            regions = ?summary.region_breakdown,
            "classification summary"
        );

        let existing = self
            .writer
            .load(region)
            .with_context(|| format!("loading {} artifact", region.code()))?;
        let mut seen = SeenKeys::from_artifact(self.dedup, &existing);
        let candidates = enriched.len();
        let fresh = seen.filter_new(enriched);
        if fresh.is_empty() {
            info!(region = region.id(), candidates, "no new articles");
            return Ok(RegionOutcome::NothingNew { candidates });
        }

        let week = iso_week_label(today);
        let written = self
            .writer
            .append(region, &fresh, &week)
            .await
            .with_context(|| format!("writing {} artifact", region.code()))?;

        let emailed = match &self.notifier {
            Some(n) => {
                n.send_report(&written.path, region, written.new_rows, &def.recipients, today)
                    .await
            }
            None => false,
        };

        info!(
            region = region.id(),
            new_rows = written.new_rows,
            total_rows = written.total_rows,
            emailed,
            "region run finished"
        );
        Ok(RegionOutcome::Written {
            new_rows: written.new_rows,
            total_rows: written.total_rows,
            emailed,
        })
    }

    /// Run every enabled region. `true` only if all of them completed.
    pub async fn run_all(&self, mode: RunMode, now: NaiveDateTime) -> bool {
        info!(?mode, regions = self.regions.len(), "run started");
        let mut ok = true;
        for &region in &self.regions {
            match self.run_region(region, mode, now).await {
                Ok(outcome) => {
                    counter!("region_runs_total", "region" => region.id(), "outcome" => outcome.label())
                        .increment(1);
                }
                Err(e) => {
                    ok = false;
                    error!(error = ?e, region = region.id(), "region run failed");
                    counter!("region_runs_total", "region" => region.id(), "outcome" => "failed")
                        .increment(1);
                }
            }
        }
        if ok {
            info!(?mode, "run completed");
        } else {
            error!(?mode, "run completed with errors");
        }
        ok
    }

    /// Reclassify every row of the region artifact and write a highlighted audit copy.
    pub async fn audit(&self, region: Region, now: NaiveDateTime) -> Result<std::path::PathBuf> {
        let today = now.date();
        let artifact = self
            .writer
            .load(region)
            .with_context(|| format!("loading {} artifact", region.code()))?;
        let articles: Vec<_> = artifact.rows().filter_map(|r| r.to_article(today)).collect();
        info!(region = region.id(), rows = articles.len(), "audit started");

        let opts = ClassifierOptions {
            filter: FilterMode::KeepAll,
            ..self.classifier.clone()
        };
        let classified = Classifier::new(self.llm.clone(), opts)
            .process_all_articles(&articles, region, today)
            .await;
        if classified.len() < articles.len() {
            warn!(
                region = region.id(),
                missing = articles.len() - classified.len(),
                "some rows could not be reclassified"
            );
        }

        let mut fields = self.writer.fields().to_vec();
        for extra in [crate::report::COL_RELATED, crate::report::COL_COMPLETED] {
            if !fields.iter().any(|f| f == extra) {
                fields.push(extra.to_string());
            }
        }
        let rows: Vec<Row> = classified
            .iter()
            .map(|e| {
                let mut row = Row::from_enriched(e, &fields);
                row.highlight = Highlight::for_article(e, region);
                row
            })
            .collect();
        let flagged = rows.iter().filter(|r| r.highlight.is_some()).count();
        let path = self.writer.write_audit(region, rows).await?;
        info!(region = region.id(), path = %path.display(), flagged, "audit written");
        Ok(path)
    }
}

/// Capability checks plus artifact file info, for the `test` subcommand.
#[derive(Debug)]
pub struct SelfCheck {
    pub checks: Vec<(&'static str, Result<(), String>)>,
    pub files: Vec<(Region, FileInfo)>,
}

impl SelfCheck {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|(_, r)| r.is_ok())
    }
}

pub fn test_configuration(settings: &Settings) -> SelfCheck {
    let checks = vec![
        ("search", settings.search_key().map(|_| ()).map_err(|e| e.to_string())),
        ("llm", settings.llm_key().map(|_| ()).map_err(|e| e.to_string())),
        (
            "mail",
            build_notifier(settings).map(|_| ()).map_err(|e| format!("{e:#}")),
        ),
        (
            "regions",
            RegionRegistry::load(settings).map(|_| ()).map_err(|e| format!("{e:#}")),
        ),
    ];
    for (name, r) in &checks {
        match r {
            Ok(()) => info!(check = name, "ok"),
            Err(e) => error!(check = name, error = %e, "configuration check failed"),
        }
    }

    let writer = build_writer(settings);
    let files = settings
        .regions
        .iter()
        .map(|&region| {
            let fi = writer.file_info(region);
            info!(
                region = region.id(),
                path = %fi.path.display(),
                exists = fi.exists,
                size = fi.size,
                modified = ?fi.modified,
                rows = fi.row_count,
                "artifact"
            );
            (region, fi)
        })
        .collect();
    SelfCheck { checks, files }
}

/// Send a random existing report with a made-up count, to verify delivery end to end.
pub async fn send_test_email(settings: &Settings, registry: &RegionRegistry) -> Result<bool> {
    let notifier = build_notifier(settings)?;
    let (path, region) = pick_test_report(&settings.reports_dir)?;
    let count = rand::rng().random_range(5..=15);
    info!(path = %path.display(), region = region.id(), count, "sending test email");
    let today = chrono::Local::now().date_naive();
    Ok(notifier
        .send_report(&path, region, count, &registry.get(region).recipients, today)
        .await)
}
