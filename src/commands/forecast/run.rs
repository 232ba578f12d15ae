use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::{ForecastArgs, HistoryMode};
use crate::commands::import::open_connection;
use crate::commands::netbacks::load_netbacks;
use crate::config::AppConfig;
use crate::util::write_json_pretty;
use crate::worker::{JobOutcome, JobRequest, WorkerPool};

use super::adjustments::excluded_licences;
use super::history::{load_history, load_pro_forma_history};
use super::types::{AdjustmentLayers, ForecastRequest};

pub fn run(args: ForecastArgs) -> Result<()> {
    let mut config = AppConfig::resolve(&args.scope)?;
    if let Some(horizon_months) = args.horizon_months {
        config.forecast_horizon_months = horizon_months;
        config.validate()?;
    }

    let adjustments = match &args.adjustments {
        Some(path) => load_adjustments(path)?,
        None => AdjustmentLayers::default(),
    };

    let db_path = config.db_path();
    if !db_path.exists() {
        bail!(
            "database {} does not exist; run `ogliability import` first",
            db_path.display()
        );
    }

    let scope = config.scope();
    let (history, netbacks) = {
        let connection = open_connection(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;

        let history = match args.history {
            HistoryMode::Full => {
                if !adjustments.dispositions.is_empty() {
                    warn!("dispositions only apply to pro-forma history; ignoring them");
                }
                load_history(&connection, &scope)?
            }
            HistoryMode::ProForma => {
                load_pro_forma_history(&connection, &scope, &excluded_licences(&adjustments))?
            }
        };
        let netbacks = load_netbacks(&connection, &scope.jurisdiction)?;
        (history, netbacks)
    };

    info!(
        scope = %scope,
        history_mode = args.history.as_str(),
        history_points = history.len(),
        netbacks = netbacks.len(),
        "forecast inputs loaded"
    );

    let request = ForecastRequest {
        history,
        netbacks,
        horizon_months: config.forecast_horizon_months,
        adjustments,
    };

    let pool = WorkerPool::start(config)?;
    let trends = match pool.execute(JobRequest::Forecast(request))? {
        JobOutcome::Forecast(trends) => trends,
        JobOutcome::Imported(_) => bail!("forecast job returned an import outcome"),
    };

    if let Some(last) = trends.adjusted_forecast.last() {
        info!(
            report_date = %last.report_date,
            rating = last.rating,
            net_value = last.net_value,
            "adjusted forecast horizon end"
        );
    }

    match &args.output {
        Some(path) => {
            write_json_pretty(path, &trends)?;
            info!(path = %path.display(), "wrote forecast trends");
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &trends)
                .context("failed to write forecast trends")?;
            writeln!(stdout).context("failed to write forecast trends")?;
        }
    }

    Ok(())
}

fn load_adjustments(path: &Path) -> Result<AdjustmentLayers> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let layers: AdjustmentLayers = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    info!(
        path = %path.display(),
        remediation_plans = layers.remediation_plans.len(),
        dispositions = layers.dispositions.len(),
        acquisitions = layers.acquisitions.len(),
        growth = layers.growth.len(),
        "loaded adjustment layers"
    );
    Ok(layers)
}
