use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of licensed asset a rating applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Well,
    Facility,
    /// Jurisdiction-specific code that has no dedicated variant.
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Well => "Well",
            Self::Facility => "Facility",
            Self::Other(code) => code.as_str(),
        }
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "well" | "w" => Self::Well,
            "facility" | "f" => Self::Facility,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

impl From<&str> for EntityType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Jurisdiction plus optional owning company; every ledger operation is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub jurisdiction: String,
    pub company: Option<String>,
}

impl Scope {
    pub fn new(jurisdiction: impl Into<String>, company: Option<String>) -> Self {
        Self {
            jurisdiction: jurisdiction.into(),
            company: company.filter(|value| !value.trim().is_empty()),
        }
    }

    /// Value stored in the `company` column; single-tenant scopes use the empty string.
    pub fn company_key(&self) -> &str {
        self.company.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.company {
            Some(company) => write!(f, "{}/{}", self.jurisdiction, company),
            None => f.write_str(&self.jurisdiction),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub entity_type: EntityType,
    pub licence: String,
}

impl NaturalKey {
    pub fn new(entity_type: EntityType, licence: &str) -> Self {
        Self {
            entity_type,
            licence: normalize_licence(licence),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity_type, self.licence)
    }
}

/// Licences are compared by numeric value, so `0012345` and `12345` are one licence.
pub fn normalize_licence(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_zeros = trimmed.trim_start_matches('0');
    if without_zeros.is_empty() && !trimmed.is_empty() {
        "0".to_string()
    } else {
        without_zeros.to_string()
    }
}

/// Named abandonment and reclamation sub-components of a liability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LiabilityComponents {
    pub abandonment_basic: f64,
    pub abandonment_additional_event: f64,
    pub abandonment_gwp: f64,
    pub abandonment_gas_migration: f64,
    pub abandonment_vent_flow: f64,
    pub abandonment_site_specific: f64,
    pub reclamation_basic: f64,
    pub reclamation_site_specific: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiabilityRecord {
    pub report_month: NaiveDate,
    pub entity_type: EntityType,
    pub licence: String,
    pub location: String,
    pub status: String,
    pub calculation_type: Option<String>,
    pub present_value_scheme: String,
    pub asset_value: f64,
    pub liability_value: f64,
    pub components: LiabilityComponents,
}

impl LiabilityRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.entity_type.clone(), &self.licence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedReport {
    pub report_month: NaiveDate,
    pub records: Vec<LiabilityRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub id: i64,
    pub jurisdiction: String,
    pub company: Option<String>,
    pub entity_type: EntityType,
    pub licence: String,
    pub location: String,
    /// Report month the stored location was taken from.
    pub location_month: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSnapshot {
    pub id: i64,
    pub entity_id: i64,
    pub report_month: NaiveDate,
    pub status: String,
    pub calculation_type: Option<String>,
    pub present_value_scheme: String,
    pub asset_value: f64,
    pub liability_value: f64,
    pub components: LiabilityComponents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetbackPoint {
    pub effective_date: NaiveDate,
    pub netback: f64,
    pub shrinkage_factor: f64,
    pub oil_equivalent_conversion: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    #[default]
    Historical,
    BaseForecast,
    AdjustedForecast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub report_date: NaiveDate,
    pub asset_value: f64,
    pub liability_value: f64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub net_value: f64,
    #[serde(default)]
    pub source_type: SourceType,
}

impl ForecastPoint {
    pub fn new(
        report_date: NaiveDate,
        asset_value: f64,
        liability_value: f64,
        source_type: SourceType,
    ) -> Self {
        let mut point = Self {
            report_date,
            asset_value,
            liability_value,
            rating: 0.0,
            net_value: 0.0,
            source_type,
        };
        point.recompute();
        point
    }

    /// Re-derives `rating` and `net_value` after either value changed.
    pub fn recompute(&mut self) {
        self.rating = rating_of(self.asset_value, self.liability_value);
        self.net_value = self.asset_value - self.liability_value;
    }
}

/// Asset to liability ratio; zero liability yields a zero rating.
pub fn rating_of(asset_value: f64, liability_value: f64) -> f64 {
    if liability_value == 0.0 {
        0.0
    } else {
        asset_value / liability_value
    }
}

/// Per-file parse result, in job order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedReport {
    pub name: String,
    pub report_month: NaiveDate,
    pub records: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub records_imported: usize,
    pub entities_created: usize,
    pub report_months: Vec<NaiveDate>,
    #[serde(default)]
    pub reports: Vec<ImportedReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFileEntry {
    pub filename: String,
    pub sha256: String,
    /// Unset when the import did not report back.
    #[serde(default)]
    pub report_month: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub scope: String,
    pub append_mode: bool,
    pub db_path: String,
    pub files: Vec<ReportFileEntry>,
    pub summary: ImportSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn licences_compare_by_numeric_value() {
        assert_eq!(normalize_licence("0012345"), "12345");
        assert_eq!(normalize_licence(" 000 "), "0");
        assert_eq!(normalize_licence(""), "");
        assert_eq!(
            NaturalKey::new(EntityType::Well, "0001"),
            NaturalKey::new(EntityType::from("W"), "1")
        );
    }

    #[test]
    fn entity_type_round_trips_through_its_code() {
        assert_eq!(EntityType::from("facility"), EntityType::Facility);
        assert_eq!(EntityType::from("Pipeline"), EntityType::Other("Pipeline".to_string()));
        let json = serde_json::to_string(&EntityType::Well).expect("serialize");
        assert_eq!(json, "\"Well\"");
    }

    #[test]
    fn zero_liability_rates_zero() {
        assert_eq!(rating_of(100.0, 0.0), 0.0);
        let point = ForecastPoint::new(
            NaiveDate::from_ymd_opt(2017, 1, 1).expect("date"),
            80.0,
            40.0,
            SourceType::Historical,
        );
        assert_eq!(point.rating, 2.0);
        assert_eq!(point.net_value, 40.0);
    }
}
