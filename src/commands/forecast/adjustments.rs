use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::{Result, TrackerError};
use crate::model::{ForecastPoint, NaturalKey, NetbackPoint, SourceType};
use crate::util::{first_of_month, shift_months};

use super::engine::forecast;
use super::netback::NetbackTable;
use super::types::{
    AcquisitionForecast, AcquisitionPackage, AcquisitionSource, AdjustmentLayers, GrowthForecast,
    GrowthProduction, GrowthSource, ProductionMonth, ResolvedAdjustments,
};

/// Regulator deemed-asset multiplier applied to a year of netback revenue.
const ASSET_MULTIPLIER: f64 = 3.0;
/// Months of trailing history reconstructed for an acquired package.
const TRAILING_MONTHS: i32 = 12;
/// Production is published roughly two months after it is produced.
const PRODUCTION_LAG_MONTHS: i32 = 2;
/// Deemed asset value sums production from the 2nd through 13th month back.
const ASSET_WINDOW: std::ops::RangeInclusive<i32> = 2..=13;

/// Natural keys named by active dispositions.
pub fn excluded_licences(layers: &AdjustmentLayers) -> HashSet<NaturalKey> {
    layers
        .dispositions
        .iter()
        .filter(|disposition| disposition.active)
        .flat_map(|disposition| disposition.licences.iter().map(|licence| licence.natural_key()))
        .collect()
}

/// Reduces every adjustment source to a ready-to-compose series.
///
/// `as_of` is the last historical report month; package and production sources
/// are valued with the netback in force on that date.
pub fn resolve(
    layers: &AdjustmentLayers,
    table: &NetbackTable,
    as_of: NaiveDate,
    horizon_months: u32,
) -> Result<ResolvedAdjustments> {
    let mut acquisitions = Vec::with_capacity(layers.acquisitions.len());
    for source in &layers.acquisitions {
        match source {
            AcquisitionSource::Forecast {
                description,
                effective_date,
                points,
            } => acquisitions.push(AcquisitionForecast {
                description: description.clone(),
                effective_date: *effective_date,
                points: recomputed(points),
            }),
            AcquisitionSource::Package(package) if !package.active => {
                debug!(description = %package.description, "skipping inactive acquisition");
            }
            AcquisitionSource::Package(package) => {
                acquisitions.push(project_package(package, table, as_of, horizon_months)?);
            }
        }
    }

    let mut growth = Vec::with_capacity(layers.growth.len());
    for source in &layers.growth {
        let resolved = match source {
            GrowthSource::Forecast {
                entity,
                effective_date,
                points,
            } => effective_date
                .or_else(|| points.first().map(|point| point.report_date))
                .map(|effective_date| GrowthForecast {
                    entity: entity.clone(),
                    effective_date,
                    points: recomputed(points),
                }),
            GrowthSource::Production(production) => growth_forecast(production, table, as_of)?,
        };

        match resolved {
            Some(series) => growth.push(series),
            None => debug!("skipping growth source without points"),
        }
    }

    Ok(ResolvedAdjustments {
        remediation_plans: layers.remediation_plans.clone(),
        acquisitions,
        growth,
    })
}

fn project_package(
    package: &AcquisitionPackage,
    table: &NetbackTable,
    as_of: NaiveDate,
    horizon_months: u32,
) -> Result<AcquisitionForecast> {
    let history = package_history(package, table, as_of)?;
    let projected = forecast(&history, table, horizon_months).inspect_err(|err| {
        warn!(description = %package.description, error = %err, "acquisition package could not be projected");
    })?;

    let effective_month = first_of_month(package.effective_date);
    let points = projected
        .into_iter()
        .filter(|point| point.report_date >= effective_month)
        .collect::<Vec<_>>();

    // The composer aligns on this date, so it must be the first retained month.
    let effective_date = points
        .first()
        .map(|point| point.report_date)
        .unwrap_or(effective_month);

    Ok(AcquisitionForecast {
        description: package.description.clone(),
        effective_date,
        points,
    })
}

/// Rebuilds the trailing monthly series the package would have shown in our reports.
///
/// Liability is the package's summed licence liability; asset value follows the
/// deemed-asset rule over public production.
pub fn package_history(
    package: &AcquisitionPackage,
    table: &NetbackTable,
    as_of: NaiveDate,
) -> Result<Vec<ForecastPoint>> {
    let netback = table.lookup(as_of)?;
    let monthly = monthly_oil_equivalent(&package.production, netback, true);
    let liability_value = package
        .licences
        .iter()
        .map(|licence| licence.liability_amount)
        .sum::<f64>();

    let anchor = first_of_month(as_of);
    let mut points = Vec::with_capacity(TRAILING_MONTHS as usize + 1);
    for back in (0..=TRAILING_MONTHS).rev() {
        let working_month = month_offset(anchor, -back)?;
        let mut volume = 0.0;
        for lag in ASSET_WINDOW {
            let month = month_offset(working_month, -lag)?;
            volume += monthly.get(&month).copied().unwrap_or(0.0);
        }
        points.push(ForecastPoint::new(
            working_month,
            volume * netback.netback * ASSET_MULTIPLIER,
            liability_value,
            SourceType::Historical,
        ));
    }

    Ok(points)
}

/// Cumulative deemed-asset contribution of a growth entity, dated by publication month.
pub fn growth_forecast(
    source: &GrowthProduction,
    table: &NetbackTable,
    as_of: NaiveDate,
) -> Result<Option<GrowthForecast>> {
    if source.production.is_empty() {
        return Ok(None);
    }

    let netback = table.lookup(as_of)?;
    // Growth volumes are already sales gas; shrinkage does not apply.
    let monthly = monthly_oil_equivalent(&source.production, netback, false);

    let mut cumulative = 0.0;
    let mut points = Vec::with_capacity(monthly.len());
    for (month, volume) in monthly {
        cumulative += volume * netback.netback * ASSET_MULTIPLIER;
        points.push(ForecastPoint::new(
            month_offset(month, PRODUCTION_LAG_MONTHS)?,
            cumulative,
            0.0,
            SourceType::BaseForecast,
        ));
    }

    let Some(effective_date) = points.first().map(|point| point.report_date) else {
        return Ok(None);
    };
    Ok(Some(GrowthForecast {
        entity: source.entity.clone(),
        effective_date,
        points,
    }))
}

/// Barrels of oil equivalent per production month; duplicate months are summed.
fn monthly_oil_equivalent(
    production: &[ProductionMonth],
    netback: &NetbackPoint,
    apply_shrinkage: bool,
) -> BTreeMap<NaiveDate, f64> {
    let shrinkage = if apply_shrinkage {
        netback.shrinkage_factor
    } else {
        1.0
    };

    let mut monthly = BTreeMap::new();
    for month in production {
        let gas = month.gas_volume * shrinkage / netback.oil_equivalent_conversion;
        *monthly
            .entry(first_of_month(month.production_month))
            .or_insert(0.0) += gas + month.oil_volume;
    }
    monthly
}

fn recomputed(points: &[ForecastPoint]) -> Vec<ForecastPoint> {
    points
        .iter()
        .cloned()
        .map(|mut point| {
            point.recompute();
            point
        })
        .collect()
}

fn month_offset(date: NaiveDate, months: i32) -> Result<NaiveDate> {
    shift_months(date, months).ok_or_else(|| {
        TrackerError::InvalidRequest(format!("{date} shifted by {months} months is out of range"))
    })
}
