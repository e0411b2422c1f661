// src/config/settings.rs
//! Environment-sourced settings. Every value has a default except credentials,
//! which are checked per capability so a missing search key never hides mail config.

use chrono::{NaiveTime, Weekday};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::classify::validate::{RegionFallback, ValidationOptions};
use crate::classify::FilterMode;
use crate::dedup::DedupScheme;
use crate::error::ConfigError;
use crate::region::Region;
use crate::report::{ReportMode, DEFAULT_FIELDS};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SERPAPI_URL: &str = "https://serpapi.com/search.json";

/// Base queries combined with each region's additional terms.
pub const SEARCH_QUERIES: &[&str] = &[
    "aircraft MRO hangar construction",
    "aircraft maintenance hangar retrofit",
    "MRO facility expansion",
    "aircraft hangar renovation",
    "aviation maintenance facility",
];

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub email_user: Option<String>,
    pub email_password: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: String,
    pub mailjet_public: Option<String>,
    pub mailjet_private: Option<String>,
}

/// Resolved delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTransport {
    Smtp {
        server: String,
        port: u16,
        user: String,
        password: String,
        sender: String,
    },
    Mailjet {
        public_key: String,
        private_key: String,
        sender: String,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub serpapi_key: Option<String>,
    pub serpapi_url: String,
    pub openai_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub llm_max_retries: usize,
    pub mail: MailSettings,
    pub recipient_emails: Vec<String>,
    pub region_recipients: BTreeMap<Region, Vec<String>>,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub schedule_day: Weekday,
    pub schedule_time: NaiveTime,
    pub backfill_months: u32,
    pub max_results_per_query: u32,
    pub reports_dir: PathBuf,
    pub report_mode: ReportMode,
    pub report_fields: Vec<String>,
    pub dedup_scheme: DedupScheme,
    pub classify_filter: FilterMode,
    pub hangar_related_default: bool,
    pub region_fallback: RegionFallback,
    pub brand: String,
    pub regions: Vec<Region>,
    pub regions_config_path: Option<PathBuf>,
    pub metrics_textfile: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from any key/value source. Empty strings count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut region_recipients = BTreeMap::new();
        for r in Region::ALL {
            let var = format!("RECIPIENTS_{}", r.code());
            if let Some(v) = get(&var) {
                region_recipients.insert(r, split_list(&v));
            }
        }

        let regions = match get("REGIONS") {
            Some(v) => split_list(&v)
                .iter()
                .map(|s| {
                    Region::parse_id(s).ok_or_else(|| ConfigError::Invalid {
                        var: "REGIONS",
                        message: format!("unknown region '{s}'"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![Region::UkNa, Region::Emea],
        };

        let schedule_day = match get("SCHEDULE_DAY") {
            Some(d) => parse_weekday(&d).unwrap_or_else(|| {
                warn!(day = %d, "unknown SCHEDULE_DAY; defaulting to monday");
                Weekday::Mon
            }),
            None => Weekday::Mon,
        };

        let schedule_time = match get("SCHEDULE_TIME") {
            Some(t) => NaiveTime::parse_from_str(&t, "%H:%M").map_err(|e| {
                ConfigError::Invalid {
                    var: "SCHEDULE_TIME",
                    message: e.to_string(),
                }
            })?,
            None => NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
        };

        let region_fallback = match get("REGION_FALLBACK") {
            Some(v) => v.parse().map_err(|message| ConfigError::Invalid {
                var: "REGION_FALLBACK",
                message,
            })?,
            None => RegionFallback::NotApplicable,
        };

        let report_fields = get("REPORT_FIELDS")
            .map(|v| split_list(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_FIELDS.iter().map(|s| s.to_string()).collect());

        let batch_size = parse_num::<usize>(get("BATCH_SIZE"), "BATCH_SIZE", 10)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                var: "BATCH_SIZE",
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            serpapi_key: get("SERPAPI_KEY"),
            serpapi_url: get("SERPAPI_URL").unwrap_or_else(|| DEFAULT_SERPAPI_URL.to_string()),
            openai_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            llm_max_retries: parse_num(get("LLM_MAX_RETRIES"), "LLM_MAX_RETRIES", 2)?,
            mail: MailSettings {
                smtp_server: get("SMTP_SERVER").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                smtp_port: parse_num(get("SMTP_PORT"), "SMTP_PORT", 587)?,
                email_user: get("EMAIL_USER"),
                email_password: get("EMAIL_PASSWORD"),
                sender_email: get("SENDER_EMAIL"),
                sender_name: get("SENDER_NAME").unwrap_or_else(|| "Hangar Watch Reports".into()),
                mailjet_public: get("MJ_APIKEY_PUBLIC"),
                mailjet_private: get("MJ_APIKEY_PRIVATE"),
            },
            recipient_emails: get("RECIPIENT_EMAILS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            region_recipients,
            batch_size,
            batch_delay: Duration::from_millis(parse_num(
                get("BATCH_DELAY_MS"),
                "BATCH_DELAY_MS",
                1000,
            )?),
            schedule_day,
            schedule_time,
            backfill_months: parse_num(get("BACKFILL_MONTHS"), "BACKFILL_MONTHS", 12)?,
            max_results_per_query: parse_num(
                get("MAX_RESULTS_PER_QUERY"),
                "MAX_RESULTS_PER_QUERY",
                10,
            )?,
            reports_dir: PathBuf::from(get("REPORTS_DIR").unwrap_or_else(|| "reports".into())),
            report_mode: parse_enum(get("REPORT_MODE"), "REPORT_MODE", ReportMode::Versioned)?,
            report_fields,
            dedup_scheme: parse_enum(get("DEDUP_SCHEME"), "DEDUP_SCHEME", DedupScheme::Url)?,
            classify_filter: parse_enum(
                get("CLASSIFY_FILTER"),
                "CLASSIFY_FILTER",
                FilterMode::InFlight,
            )?,
            hangar_related_default: parse_bool(
                get("HANGAR_RELATED_DEFAULT"),
                "HANGAR_RELATED_DEFAULT",
                true,
            )?,
            region_fallback,
            brand: get("REPORT_BRAND").unwrap_or_else(|| "Hangar Watch".to_string()),
            regions,
            regions_config_path: get("REGIONS_CONFIG_PATH").map(PathBuf::from),
            metrics_textfile: parse_bool(get("METRICS_TEXTFILE"), "METRICS_TEXTFILE", true)?,
        })
    }

    pub fn search_key(&self) -> Result<&str, ConfigError> {
        self.serpapi_key
            .as_deref()
            .ok_or(ConfigError::Missing("SERPAPI_KEY"))
    }

    pub fn llm_key(&self) -> Result<&str, ConfigError> {
        self.openai_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    /// Mailjet wins when its public key is present; otherwise SMTP.
    pub fn mail_transport(&self) -> Result<MailTransport, ConfigError> {
        let m = &self.mail;
        if let Some(public_key) = m.mailjet_public.clone() {
            let private_key = m
                .mailjet_private
                .clone()
                .ok_or(ConfigError::Missing("MJ_APIKEY_PRIVATE"))?;
            let sender = m
                .sender_email
                .clone()
                .ok_or(ConfigError::Missing("SENDER_EMAIL"))?;
            return Ok(MailTransport::Mailjet {
                public_key,
                private_key,
                sender,
            });
        }
        let user = m.email_user.clone().ok_or(ConfigError::Missing("EMAIL_USER"))?;
        let password = m
            .email_password
            .clone()
            .ok_or(ConfigError::Missing("EMAIL_PASSWORD"))?;
        let sender = m.sender_email.clone().unwrap_or_else(|| user.clone());
        Ok(MailTransport::Smtp {
            server: m.smtp_server.clone(),
            port: m.smtp_port,
            user,
            password,
            sender,
        })
    }

    /// Region-specific list, else the global `RECIPIENT_EMAILS`.
    pub fn recipients_for(&self, region: Region) -> Vec<String> {
        self.region_recipients
            .get(&region)
            .cloned()
            .unwrap_or_else(|| self.recipient_emails.clone())
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            hangar_related_default: self.hangar_related_default,
            completion_status_default: false,
            region_fallback: self.region_fallback,
        }
    }
}

pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_num<T>(v: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match v {
        Some(s) => s.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_enum<T>(v: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = String>,
{
    match v {
        Some(s) => s
            .parse()
            .map_err(|message| ConfigError::Invalid { var, message }),
        None => Ok(default),
    }
}

fn parse_bool(v: Option<String>, var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match v.as_deref().map(|s| s.to_ascii_lowercase()) {
        None => Ok(default),
        Some(s) => match s.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                message: format!("expected a boolean, got '{s}'"),
            }),
        },
    }
}
