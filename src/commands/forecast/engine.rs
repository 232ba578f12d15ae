use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::model::{ForecastPoint, SourceType};
use crate::util::{first_of_month, shift_months};

use super::netback::{NetbackTable, average_decline, normalize};

/// Projects `horizon_months` monthly points past the last historical report.
///
/// Liability stays at its last observed value; asset value compounds at the
/// average netback-normalized decline rate of the history.
pub fn forecast(
    history: &[ForecastPoint],
    table: &NetbackTable,
    horizon_months: u32,
) -> Result<Vec<ForecastPoint>> {
    if history.len() < 2 {
        return Err(TrackerError::InsufficientHistory {
            points: history.len(),
        });
    }

    let mut ordered = history.to_vec();
    ordered.sort_by_key(|point| point.report_date);

    let rate = average_decline(&normalize(&ordered, table))?;

    let Some(last) = ordered.last() else {
        return Err(TrackerError::InsufficientHistory { points: 0 });
    };
    let anchor = first_of_month(last.report_date);
    let liability_value = last.liability_value;
    let mut asset_value = last.asset_value;

    let mut points = Vec::with_capacity(horizon_months as usize);
    for offset in 1..=horizon_months {
        let report_date = i32::try_from(offset)
            .ok()
            .and_then(|months| shift_months(anchor, months))
            .ok_or_else(|| {
                TrackerError::InvalidRequest(format!(
                    "forecast horizon of {horizon_months} months overflows the calendar"
                ))
            })?;
        asset_value *= 1.0 + rate;
        points.push(ForecastPoint::new(
            report_date,
            asset_value,
            liability_value,
            SourceType::BaseForecast,
        ));
    }

    debug!(rate, horizon_months, anchor = %anchor, "base forecast computed");
    Ok(points)
}
