// src/config/regions.rs
//! Region registry: static region definitions, optionally overridden from TOML.
//!
//! Lookup order for the file:
//! 1) `$REGIONS_CONFIG_PATH`
//! 2) `config/regions.toml`
//! 3) built-in defaults

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Settings;
use crate::region::Region;

const DEFAULT_PATH: &str = "config/regions.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionDef {
    pub region: Region,
    pub countries: Vec<String>,
    pub additional_query_terms: Vec<String>,
    pub recipients: Vec<String>,
}

impl RegionDef {
    pub fn id(&self) -> &'static str {
        self.region.id()
    }
}

/// Immutable after load; shared read-only across region runs.
#[derive(Debug, Clone)]
pub struct RegionRegistry {
    defs: BTreeMap<Region, RegionDef>,
}

#[derive(Debug, Deserialize)]
struct RegionsFile {
    #[serde(default)]
    regions: Vec<RegionEntry>,
}

#[derive(Debug, Deserialize)]
struct RegionEntry {
    id: String,
    #[serde(default)]
    countries: Vec<String>,
    #[serde(default)]
    additional_query_terms: Vec<String>,
    #[serde(default)]
    recipients: Vec<String>,
}

impl RegionRegistry {
    pub fn builtin() -> Self {
        let defs = Region::ALL
            .into_iter()
            .map(|r| (r, builtin_def(r)))
            .collect();
        Self { defs }
    }

    /// Built-ins, overlaid with the TOML file if one is found, then recipients from settings.
    pub fn load(settings: &Settings) -> Result<Self> {
        let mut reg = match resolve_path(settings.regions_config_path.as_deref())? {
            Some(path) => Self::from_file(&path)?,
            None => Self::builtin(),
        };
        reg.apply_recipients(settings);
        Ok(reg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading region registry from {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let file: RegionsFile = toml::from_str(s).context("parsing region registry")?;
        let mut reg = Self::builtin();
        for entry in file.regions {
            let region = Region::parse_id(&entry.id)
                .ok_or_else(|| anyhow!("unknown region id '{}' in registry", entry.id))?;
            let def = reg
                .defs
                .get_mut(&region)
                .ok_or_else(|| anyhow!("region {} missing from built-ins", region.id()))?;
            if !entry.countries.is_empty() {
                def.countries = clean_list(entry.countries);
            }
            if !entry.additional_query_terms.is_empty() {
                def.additional_query_terms = clean_list(entry.additional_query_terms);
            }
            def.recipients = clean_list(entry.recipients);
        }
        Ok(reg)
    }

    /// Env-specified recipients win; file recipients next; the global list last.
    fn apply_recipients(&mut self, settings: &Settings) {
        for (region, def) in self.defs.iter_mut() {
            if let Some(list) = settings.region_recipients.get(region) {
                def.recipients = list.clone();
            } else if def.recipients.is_empty() {
                def.recipients = settings.recipient_emails.clone();
            }
        }
    }

    pub fn get(&self, region: Region) -> &RegionDef {
        // Built-ins cover every variant, so the map is total.
        &self.defs[&region]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionDef> {
        self.defs.values()
    }
}

fn resolve_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(p) = explicit {
        if p.exists() {
            return Ok(Some(p.to_path_buf()));
        }
        return Err(anyhow!(
            "REGIONS_CONFIG_PATH points to non-existent path {}",
            p.display()
        ));
    }
    let default = PathBuf::from(DEFAULT_PATH);
    Ok(default.exists().then_some(default))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn builtin_def(region: Region) -> RegionDef {
    let (countries, terms): (&[&str], &[&str]) = match region {
        Region::UkNa => (
            &["United States", "Canada", "United Kingdom"],
            &["United States", "Canada", "UK"],
        ),
        Region::Emea => (
            &[
                "Germany", "France", "Italy", "Spain", "Netherlands", "Belgium",
                "Switzerland", "Austria", "Poland", "Czech Republic", "Hungary", "Romania",
                "Bulgaria", "Croatia", "Slovenia", "Slovakia", "Estonia", "Latvia",
                "Lithuania", "Finland", "Sweden", "Norway", "Denmark", "Iceland", "Ireland",
                "United Arab Emirates", "Saudi Arabia", "Qatar", "Kuwait", "Bahrain", "Oman",
                "Jordan", "Lebanon", "Israel", "Turkey", "Egypt", "Morocco", "Algeria",
                "Tunisia", "Libya", "South Africa", "Nigeria", "Kenya", "Ethiopia", "Ghana",
                "Uganda", "Tanzania",
            ],
            &["Europe", "Middle East", "Africa"],
        ),
        Region::Apac => (
            &[
                "Australia", "New Zealand", "Japan", "China", "South Korea", "Singapore",
                "India", "Indonesia", "Malaysia", "Thailand", "Philippines", "Vietnam",
            ],
            &["Asia", "Australia", "India"],
        ),
        Region::Latam => (
            &[
                "Mexico", "Brazil", "Argentina", "Chile", "Colombia", "Peru", "Panama",
                "Costa Rica",
            ],
            &["Latin America", "Mexico", "Brazil"],
        ),
    };
    RegionDef {
        region,
        countries: strings(countries),
        additional_query_terms: strings(terms),
        recipients: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_every_region() {
        let reg = RegionRegistry::builtin();
        for r in Region::ALL {
            let def = reg.get(r);
            assert_eq!(def.region, r);
            assert!(!def.countries.is_empty());
        }
    }

    #[test]
    fn toml_overrides_terms_and_trims_lists() {
        let toml = r#"
[[regions]]
id = "EMEA"
additional_query_terms = [" Germany ", "", "Germany", "UAE"]
recipients = ["ops@example.com"]
"#;
        let reg = RegionRegistry::from_toml(toml).unwrap();
        let emea = reg.get(Region::Emea);
        assert_eq!(emea.additional_query_terms, vec!["Germany", "UAE"]);
        assert_eq!(emea.recipients, vec!["ops@example.com"]);
        // untouched fields keep built-ins
        assert!(emea.countries.contains(&"Germany".to_string()));
    }

    #[test]
    fn unknown_region_id_is_rejected() {
        let toml = r#"
[[regions]]
id = "antarctica"
"#;
        assert!(RegionRegistry::from_toml(toml).is_err());
    }
}
