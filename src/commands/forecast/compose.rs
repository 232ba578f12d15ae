use chrono::NaiveDate;

use crate::model::{ForecastPoint, SourceType};

use super::types::{AcquisitionForecast, GrowthForecast, RemediationPlan};

/// Layers adjustments onto a copy of the base forecast.
///
/// Remediation reductions apply first, then acquisitions, then growth. Series are
/// aligned to the first base point on or after their effective date and added by
/// position until either series runs out.
pub fn compose(
    base: &[ForecastPoint],
    remediation_plans: &[RemediationPlan],
    acquisitions: &[AcquisitionForecast],
    growth: &[GrowthForecast],
) -> Vec<ForecastPoint> {
    let mut combined = base
        .iter()
        .cloned()
        .map(|mut point| {
            point.source_type = SourceType::AdjustedForecast;
            point
        })
        .collect::<Vec<_>>();

    for plan in remediation_plans.iter().filter(|plan| plan.active) {
        for point in combined
            .iter_mut()
            .filter(|point| point.report_date >= plan.effective_date)
        {
            point.liability_value -= plan.reduction_amount;
            point.recompute();
        }
    }

    for acquisition in acquisitions {
        layer_series(&mut combined, acquisition.effective_date, &acquisition.points);
    }

    for entity in growth {
        layer_series(&mut combined, entity.effective_date, &entity.points);
    }

    combined
}

fn layer_series(combined: &mut [ForecastPoint], effective_date: NaiveDate, series: &[ForecastPoint]) {
    if series.is_empty() {
        return;
    }
    let Some(start) = combined
        .iter()
        .position(|point| point.report_date >= effective_date)
    else {
        return;
    };

    for (point, delta) in combined[start..].iter_mut().zip(series) {
        point.asset_value += delta.asset_value;
        point.liability_value += delta.liability_value;
        point.recompute();
    }
}
