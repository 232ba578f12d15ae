use tracing::info;

use crate::error::{Result, TrackerError};
use crate::model::SourceType;

use super::adjustments::resolve;
use super::compose::compose;
use super::engine::forecast;
use super::netback::NetbackTable;
use super::types::{ForecastRequest, ForecastTrends};

/// Runs the full forecast pipeline for one request. Pure; touches no storage.
pub fn build_trends(request: &ForecastRequest) -> Result<ForecastTrends> {
    if request.horizon_months == 0 {
        return Err(TrackerError::InvalidRequest(
            "horizon_months must be at least 1".to_string(),
        ));
    }

    let table = NetbackTable::new(request.netbacks.clone())?;

    let mut history = request.history.clone();
    history.sort_by_key(|point| point.report_date);
    for point in &mut history {
        point.source_type = SourceType::Historical;
        point.recompute();
    }

    let base_forecast = forecast(&history, &table, request.horizon_months)?;
    let Some(as_of) = history.last().map(|point| point.report_date) else {
        return Err(TrackerError::InsufficientHistory { points: 0 });
    };

    let adjustments = resolve(&request.adjustments, &table, as_of, request.horizon_months)?;
    let adjusted_forecast = compose(
        &base_forecast,
        &adjustments.remediation_plans,
        &adjustments.acquisitions,
        &adjustments.growth,
    );

    info!(
        history_points = history.len(),
        horizon_months = request.horizon_months,
        remediation_plans = adjustments.remediation_plans.len(),
        acquisitions = adjustments.acquisitions.len(),
        growth_entities = adjustments.growth.len(),
        "forecast trends built"
    );

    Ok(ForecastTrends {
        history,
        base_forecast,
        adjusted_forecast,
    })
}
