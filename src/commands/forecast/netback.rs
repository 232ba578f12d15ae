use chrono::NaiveDate;
use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::model::{ForecastPoint, NetbackPoint};

/// Netback price history ordered newest first, validated on construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetbackTable {
    points: Vec<NetbackPoint>,
}

impl NetbackTable {
    pub fn new(mut points: Vec<NetbackPoint>) -> Result<Self> {
        for point in &points {
            validate_point(point)?;
        }
        points.sort_by(|left, right| right.effective_date.cmp(&left.effective_date));
        Ok(Self { points })
    }

    pub fn points(&self) -> &[NetbackPoint] {
        &self.points
    }

    /// Latest point whose effective date is on or before `reference_date`.
    pub fn find(&self, reference_date: NaiveDate) -> Option<&NetbackPoint> {
        self.points
            .iter()
            .find(|point| point.effective_date <= reference_date)
    }

    pub fn lookup(&self, reference_date: NaiveDate) -> Result<&NetbackPoint> {
        self.find(reference_date)
            .ok_or(TrackerError::MissingNetback { reference_date })
    }
}

fn validate_point(point: &NetbackPoint) -> Result<()> {
    let invalid = |reason: &str| TrackerError::InvalidNetback {
        effective_date: point.effective_date,
        reason: reason.to_string(),
    };

    if !point.netback.is_finite() || point.netback <= 0.0 {
        return Err(invalid("netback must be positive"));
    }
    if !point.oil_equivalent_conversion.is_finite() || point.oil_equivalent_conversion <= 0.0 {
        return Err(invalid("oil equivalent conversion must be positive"));
    }
    if !point.shrinkage_factor.is_finite() || point.shrinkage_factor < 0.0 {
        return Err(invalid("shrinkage factor must not be negative"));
    }
    Ok(())
}

/// Asset value expressed as a price-independent volume proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumePoint {
    pub report_date: NaiveDate,
    pub volume: f64,
}

/// Divides each point's asset value by the netback in force at its report date.
/// Points older than the whole table are dropped.
pub fn normalize(history: &[ForecastPoint], table: &NetbackTable) -> Vec<VolumePoint> {
    let mut volumes = history
        .iter()
        .filter_map(|point| {
            let netback = table.find(point.report_date)?;
            Some(VolumePoint {
                report_date: point.report_date,
                volume: point.asset_value / netback.netback,
            })
        })
        .collect::<Vec<_>>();
    volumes.sort_by_key(|point| point.report_date);

    let dropped = history.len() - volumes.len();
    if dropped > 0 {
        debug!(dropped, "history points predate every netback");
    }
    volumes
}

/// Mean month-over-month change `v[i] / v[i-1] - 1` across consecutive volumes.
///
/// Pairs whose earlier volume is zero have no defined ratio and are skipped.
pub fn average_decline(volumes: &[VolumePoint]) -> Result<f64> {
    if volumes.len() < 2 {
        return Err(TrackerError::InsufficientHistory {
            points: volumes.len(),
        });
    }

    let ratios = volumes
        .windows(2)
        .filter(|pair| pair[0].volume != 0.0)
        .map(|pair| pair[1].volume / pair[0].volume - 1.0)
        .collect::<Vec<_>>();

    if ratios.is_empty() {
        return Err(TrackerError::InsufficientHistory {
            points: volumes.iter().filter(|point| point.volume != 0.0).count(),
        });
    }

    Ok(ratios.iter().sum::<f64>() / ratios.len() as f64)
}
