// src/classify/validate.rs
//! Cleans one raw LLM classification object. Total: any JSON value in, a valid
//! `Classification` out. Malformed fields degrade to defaults, nothing is rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use super::Classification;
use crate::region::{region_for_country, Region, NOT_APPLICABLE};

/// What `region` becomes when it is invalid and the country does not map to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegionFallback {
    #[default]
    NotApplicable,
    Region(Region),
}

impl FromStr for RegionFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.eq_ignore_ascii_case(NOT_APPLICABLE) || t.eq_ignore_ascii_case("none") {
            return Ok(RegionFallback::NotApplicable);
        }
        Region::parse_id(t)
            .map(RegionFallback::Region)
            .ok_or_else(|| format!("expected N/A or a region id, got '{t}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    pub hangar_related_default: bool,
    pub completion_status_default: bool,
    pub region_fallback: RegionFallback,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            hangar_related_default: true,
            completion_status_default: false,
            region_fallback: RegionFallback::NotApplicable,
        }
    }
}

pub fn validate_result(raw: &Value, opts: &ValidationOptions) -> Classification {
    let country = normalize_country(raw.get("country"));
    let region = match raw.get("region").and_then(Value::as_str).and_then(Region::from_code) {
        Some(r) => Some(r),
        None => derive_region(&country, opts.region_fallback),
    };

    Classification {
        article_id: raw.get("article_id").and_then(coerce_id),
        is_hangar_related: coerce_bool(raw.get("is_hangar_related"), opts.hangar_related_default),
        country,
        region,
        completion_status: coerce_bool(
            raw.get("completion_status"),
            opts.completion_status_default,
        ),
        patterns: coerce_patterns(raw.get("patterns")),
    }
}

/// Exactly two ASCII letters, upper-cased; anything else is "N/A".
pub fn normalize_country(v: Option<&Value>) -> String {
    match v.and_then(Value::as_str).map(str::trim) {
        Some(c) if c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()) => {
            c.to_ascii_uppercase()
        }
        _ => NOT_APPLICABLE.to_string(),
    }
}

/// Region from the fixed country table, or the configured fallback.
pub fn derive_region(country: &str, fallback: RegionFallback) -> Option<Region> {
    region_for_country(country).or(match fallback {
        RegionFallback::NotApplicable => None,
        RegionFallback::Region(r) => Some(r),
    })
}

fn coerce_bool(v: Option<&Value>, default: bool) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => true,
            "false" | "no" | "n" | "0" => false,
            _ => default,
        },
        _ => default,
    }
}

fn coerce_id(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|x| u32::try_from(x).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_patterns(v: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for it in items {
        if let Some(s) = it.as_str() {
            let t = s.trim().to_lowercase();
            if !t.is_empty() && !out.contains(&t) {
                out.push(t);
            }
        }
    }
    out
}
