use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cli::ScopeArgs;
use crate::model::Scope;

pub const DEFAULT_WORK_DIR: &str = ".cache/ogliability";
pub const DEFAULT_JURISDICTION: &str = "AB";
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_FORECAST_HORIZON_MONTHS: u32 = 6;

/// Runtime settings handed by value to every component that needs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub work_dir: PathBuf,
    pub db_path: Option<PathBuf>,
    pub jurisdiction: String,
    pub company: Option<String>,
    /// Zero sizes the pool to the host's available parallelism.
    pub worker_threads: usize,
    pub job_timeout_secs: u64,
    pub forecast_horizon_months: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            db_path: None,
            jurisdiction: DEFAULT_JURISDICTION.to_string(),
            company: None,
            worker_threads: 0,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            forecast_horizon_months: DEFAULT_FORECAST_HORIZON_MONTHS,
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Loads the optional config file, layers CLI flags on top, then validates.
    pub fn resolve(args: &ScopeArgs) -> Result<Self> {
        let mut config = Self::load(args.config.as_deref())?;

        if let Some(work_dir) = &args.work_dir {
            config.work_dir = work_dir.clone();
        }
        if let Some(db_path) = &args.db_path {
            config.db_path = Some(db_path.clone());
        }
        if let Some(jurisdiction) = &args.jurisdiction {
            config.jurisdiction = jurisdiction.clone();
        }
        if let Some(company) = &args.company {
            config.company = Some(company.clone());
        }
        if let Some(worker_threads) = args.worker_threads {
            config.worker_threads = worker_threads;
        }
        if let Some(timeout) = args.job_timeout_secs {
            config.job_timeout_secs = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jurisdiction.trim().is_empty() {
            bail!("jurisdiction must not be empty");
        }
        if self.job_timeout_secs == 0 {
            bail!("job_timeout_secs must be at least 1");
        }
        if self.forecast_horizon_months == 0 {
            bail!("forecast_horizon_months must be at least 1");
        }
        Ok(())
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.jurisdiction.trim(), self.company.clone())
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.work_dir.join("liability_tracker.sqlite"))
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.work_dir.join("manifests")
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)
    }
}
