// src/notify/mod.rs
pub mod email;
pub mod mailjet;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::counter;
use tracing::{error, info, warn};

use crate::config::settings::MailTransport;
use crate::region::Region;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<Attachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Build the configured transport.
pub fn build_mailer(transport: MailTransport, sender_name: &str) -> Result<Arc<dyn Mailer>> {
    let mailer: Arc<dyn Mailer> = match transport {
        MailTransport::Smtp {
            server,
            port,
            user,
            password,
            sender,
        } => Arc::new(email::SmtpMailer::new(
            &server,
            port,
            user,
            password,
            &sender,
            sender_name,
        )?),
        MailTransport::Mailjet {
            public_key,
            private_key,
            sender,
        } => Arc::new(mailjet::MailjetMailer::new(
            public_key,
            private_key,
            sender,
            sender_name.to_string(),
        )?),
    };
    Ok(mailer)
}

pub fn subject_for(brand: &str, region: Region) -> String {
    format!("{brand} - {} Hangar Projects Report", region.display_name())
}

pub fn body_for(brand: &str, region: Region, new_items: usize, date: NaiveDate) -> String {
    let region_name = html_escape::encode_text(region.display_name());
    let brand = html_escape::encode_text(brand);
    format!(
        "<h2>{brand} Weekly Report - {region_name}</h2>\n\
         <p>Date: {}</p>\n\
         <p>New articles found: {new_items}</p>\n\
         <p>Please find the attached report.</p>\n",
        date.format("%B %d, %Y")
    )
}

pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    brand: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, brand: impl Into<String>) -> Self {
        Self {
            mailer,
            brand: brand.into(),
        }
    }

    pub fn compose(
        &self,
        artifact: &Path,
        region: Region,
        new_items: usize,
        recipients: &[String],
        date: NaiveDate,
    ) -> Result<OutgoingEmail> {
        if recipients.is_empty() {
            return Err(anyhow!("no recipients configured for {}", region.id()));
        }
        let bytes = std::fs::read(artifact)
            .with_context(|| format!("reading attachment {}", artifact.display()))?;
        let filename = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.xlsx", region.code()));
        Ok(OutgoingEmail {
            to: recipients.to_vec(),
            subject: subject_for(&self.brand, region),
            html_body: body_for(&self.brand, region, new_items, date),
            attachment: Some(Attachment {
                filename,
                content_type: XLSX_CONTENT_TYPE.to_string(),
                bytes,
            }),
        })
    }

    /// Send the region report. Returns whether delivery succeeded; failures are logged.
    pub async fn send_report(
        &self,
        artifact: &Path,
        region: Region,
        new_items: usize,
        recipients: &[String],
        date: NaiveDate,
    ) -> bool {
        let email = match self.compose(artifact, region, new_items, recipients, date) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = ?e, region = region.id(), "report email not composed");
                counter!("emails_failed_total", "region" => region.id()).increment(1);
                return false;
            }
        };
        match self.mailer.send(&email).await {
            Ok(()) => {
                info!(
                    region = region.id(),
                    mailer = self.mailer.name(),
                    recipients = email.to.len(),
                    new_items,
                    "report email sent"
                );
                counter!("emails_sent_total", "region" => region.id()).increment(1);
                true
            }
            Err(e) => {
                error!(error = ?e, region = region.id(), mailer = self.mailer.name(), "report email failed");
                counter!("emails_failed_total", "region" => region.id()).increment(1);
                false
            }
        }
    }
}

/// Pick a report for the test email: a random `.xlsx` in `dir` (audit files excluded)
/// and the region its file name starts with.
pub fn pick_test_report(dir: &Path) -> Result<(PathBuf, Region)> {
    use rand::seq::IndexedRandom;

    let mut candidates: Vec<(PathBuf, Region)> = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter_map(|p| {
            let name = p.file_name()?.to_str()?.to_string();
            if !name.ends_with(".xlsx") || name.contains("_audit") || name.starts_with('.') {
                return None;
            }
            let stem = name.trim_end_matches(".xlsx");
            Region::ALL
                .into_iter()
                .find(|r| stem.eq_ignore_ascii_case(r.code()))
                .map(|r| (p, r))
        })
        .collect();
    candidates.sort();
    candidates
        .choose(&mut rand::rng())
        .cloned()
        .ok_or_else(|| anyhow!("no report files found in {}", dir.display()))
}

/// Mailer that records instead of sending (tests, dry runs).
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        if self.fail {
            return Err(anyhow!("recording mailer configured to fail"));
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("mailer mutex poisoned"))?
            .push(email.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
