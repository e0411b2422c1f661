// src/region.rs
//! Coarse geographic buckets used for routing, filtering and LLM output validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Literal used for "unknown" in both the country and region columns.
pub const NOT_APPLICABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "UK_NA")]
    UkNa,
    #[serde(rename = "EMEA")]
    Emea,
    #[serde(rename = "APAC")]
    Apac,
    #[serde(rename = "LATAM")]
    Latam,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::UkNa, Region::Emea, Region::Apac, Region::Latam];

    /// Upper-case code as it appears in LLM output and in the Region column.
    pub fn code(self) -> &'static str {
        match self {
            Region::UkNa => "UK_NA",
            Region::Emea => "EMEA",
            Region::Apac => "APAC",
            Region::Latam => "LATAM",
        }
    }

    /// Lower-case id used on the command line, in env var suffixes and file names.
    pub fn id(self) -> &'static str {
        match self {
            Region::UkNa => "uk_na",
            Region::Emea => "emea",
            Region::Apac => "apac",
            Region::Latam => "latam",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Region::UkNa => "UK & North America",
            Region::Emea => "EMEA (Europe, Middle East, Africa)",
            Region::Apac => "APAC (Asia-Pacific)",
            Region::Latam => "LATAM (Latin America)",
        }
    }

    /// Strict match on the four canonical codes. Anything else is not a region.
    pub fn from_code(s: &str) -> Option<Region> {
        Region::ALL.into_iter().find(|r| r.code() == s)
    }

    /// Lenient lookup for user input: accepts `uk_na`, `UK_NA`, ` emea `.
    pub fn parse_id(s: &str) -> Option<Region> {
        let t = s.trim();
        Region::ALL
            .into_iter()
            .find(|r| r.id().eq_ignore_ascii_case(t))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::parse_id(s).ok_or_else(|| {
            format!("unknown region '{s}' (expected one of uk_na, emea, apac, latam)")
        })
    }
}

const UK_NA_CODES: &[&str] = &["US", "CA", "UK", "GB"];

const EMEA_CODES: &[&str] = &[
    "FR", "DE", "IT", "ES", "NL", "BE", "CH", "AT", "SE", "NO", "DK", "FI", "PL", "CZ", "HU",
    "PT", "IE", "GR", "RO", "BG", "HR", "SI", "SK", "LT", "LV", "EE", "MT", "CY", "LU", "AE",
    "SA", "QA", "KW", "BH", "OM", "JO", "LB", "IL", "TR", "EG", "ZA", "MA", "TN", "DZ", "LY",
    "SD", "ET", "KE", "UG", "TZ", "ZM", "ZW", "BW", "NA", "MZ", "AO", "GH", "NG", "CI", "SN",
    "ML", "BF", "NE", "TD", "CM", "CF", "CG", "CD", "GA", "GQ", "ST", "CV", "GM", "GW", "SL",
    "LR", "GN", "BJ", "TG", "RW", "BI", "DJ", "SO", "ER", "MW", "MG", "MU", "SC", "KM", "YT",
    "RE",
];

const APAC_CODES: &[&str] = &[
    "JP", "CN", "KR", "SG", "TH", "MY", "ID", "PH", "VN", "IN", "PK", "BD", "LK", "MM", "KH",
    "LA", "BN", "TL", "MN", "KZ", "KG", "TJ", "TM", "UZ", "AF", "IR", "IQ", "SY", "YE", "PS",
    "AU", "NZ", "PG", "FJ", "SB", "NC", "PF", "WS", "VU", "TO", "TV", "NR", "KI", "PW", "MH",
    "FM", "GU", "MP", "AS", "CK", "NU", "TK", "WF",
];

const LATAM_CODES: &[&str] = &[
    "MX", "BR", "AR", "CL", "CO", "PE", "VE", "EC", "BO", "PY", "UY", "GY", "SR", "GF", "CR",
    "PA", "NI", "HN", "GT", "BZ", "SV", "CU", "DO", "HT", "JM", "TT", "BB", "GD", "VC", "LC",
    "AG", "DM", "KN", "BS", "BM", "PR", "VI", "AW", "CW", "SX", "BQ", "MQ", "GP", "BL", "MF",
    "PM", "TC", "AI", "VG", "KY", "MS", "FK",
];

/// Fixed country → region table. `code` must already be upper-case.
pub fn region_for_country(code: &str) -> Option<Region> {
    if UK_NA_CODES.contains(&code) {
        Some(Region::UkNa)
    } else if EMEA_CODES.contains(&code) {
        Some(Region::Emea)
    } else if APAC_CODES.contains(&code) {
        Some(Region::Apac)
    } else if LATAM_CODES.contains(&code) {
        Some(Region::Latam)
    } else {
        None
    }
}

/// Every country code the table knows about, with its region.
pub fn country_table() -> impl Iterator<Item = (&'static str, Region)> {
    UK_NA_CODES
        .iter()
        .map(|c| (*c, Region::UkNa))
        .chain(EMEA_CODES.iter().map(|c| (*c, Region::Emea)))
        .chain(APAC_CODES.iter().map(|c| (*c, Region::Apac)))
        .chain(LATAM_CODES.iter().map(|c| (*c, Region::Latam)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn table_has_no_overlapping_codes() {
        let mut seen = HashSet::new();
        for (code, _) in country_table() {
            assert!(seen.insert(code), "duplicate code {code}");
        }
    }

    #[test]
    fn known_codes_map_to_expected_regions() {
        assert_eq!(region_for_country("GB"), Some(Region::UkNa));
        assert_eq!(region_for_country("AE"), Some(Region::Emea));
        assert_eq!(region_for_country("AU"), Some(Region::Apac));
        assert_eq!(region_for_country("BR"), Some(Region::Latam));
        assert_eq!(region_for_country("XX"), None);
        assert_eq!(region_for_country("us"), None);
    }

    #[test]
    fn codes_are_strict_and_ids_are_lenient() {
        assert_eq!(Region::from_code("EMEA"), Some(Region::Emea));
        assert_eq!(Region::from_code("emea"), None);
        assert_eq!(Region::parse_id(" UK_NA "), Some(Region::UkNa));
        assert!("mars".parse::<Region>().is_err());
    }
}
