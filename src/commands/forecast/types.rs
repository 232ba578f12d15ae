use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{EntityType, ForecastPoint, NaturalKey, NetbackPoint};

fn default_active() -> bool {
    true
}

/// One-time liability reduction, e.g. a planned abandonment programme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    #[serde(default)]
    pub description: String,
    pub effective_date: NaiveDate,
    pub reduction_amount: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenceRef {
    pub entity_type: EntityType,
    pub licence: String,
}

impl LicenceRef {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.entity_type.clone(), &self.licence)
    }
}

/// Licences leaving the portfolio; they are removed from pro forma history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disposition {
    #[serde(default)]
    pub description: String,
    pub effective_date: NaiveDate,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub licences: Vec<LicenceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquiredLicence {
    pub entity_type: EntityType,
    pub licence: String,
    pub liability_amount: f64,
}

/// Monthly production volumes as published by the regulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionMonth {
    pub production_month: NaiveDate,
    #[serde(default)]
    pub gas_volume: f64,
    #[serde(default)]
    pub oil_volume: f64,
}

/// Licence package plus its public production, valued from the netback table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionPackage {
    #[serde(default)]
    pub description: String,
    pub effective_date: NaiveDate,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub licences: Vec<AcquiredLicence>,
    #[serde(default)]
    pub production: Vec<ProductionMonth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcquisitionSource {
    /// A series computed elsewhere, applied as-is.
    Forecast {
        #[serde(default)]
        description: String,
        effective_date: NaiveDate,
        points: Vec<ForecastPoint>,
    },
    Package(AcquisitionPackage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthProduction {
    pub entity: String,
    #[serde(default)]
    pub production: Vec<ProductionMonth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrowthSource {
    Forecast {
        entity: String,
        #[serde(default)]
        effective_date: Option<NaiveDate>,
        points: Vec<ForecastPoint>,
    },
    Production(GrowthProduction),
}

/// Adjustment sources as submitted by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentLayers {
    pub remediation_plans: Vec<RemediationPlan>,
    pub dispositions: Vec<Disposition>,
    pub acquisitions: Vec<AcquisitionSource>,
    pub growth: Vec<GrowthSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionForecast {
    pub description: String,
    pub effective_date: NaiveDate,
    pub points: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthForecast {
    pub entity: String,
    pub effective_date: NaiveDate,
    pub points: Vec<ForecastPoint>,
}

/// Adjustment layers reduced to the series the composer consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAdjustments {
    pub remediation_plans: Vec<RemediationPlan>,
    pub acquisitions: Vec<AcquisitionForecast>,
    pub growth: Vec<GrowthForecast>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub history: Vec<ForecastPoint>,
    pub netbacks: Vec<NetbackPoint>,
    pub horizon_months: u32,
    #[serde(default)]
    pub adjustments: AdjustmentLayers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastTrends {
    pub history: Vec<ForecastPoint>,
    pub base_forecast: Vec<ForecastPoint>,
    pub adjusted_forecast: Vec<ForecastPoint>,
}
