use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "ogliability",
    version,
    about = "Liability rating report ingestion and forecasting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import one or more regulator rating reports into the ledger.
    Import(ImportArgs),
    /// Replace the jurisdiction's netback table from a CSV file.
    Netbacks(NetbackArgs),
    /// Forecast ratings from stored history plus optional adjustments.
    Forecast(ForecastArgs),
    Status(StatusArgs),
}

/// Config file, storage location and ledger scope shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub jurisdiction: Option<String>,

    #[arg(long)]
    pub company: Option<String>,

    #[arg(long)]
    pub worker_threads: Option<usize>,

    #[arg(long)]
    pub job_timeout_secs: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    #[arg(long = "report", required = true)]
    pub reports: Vec<PathBuf>,

    /// Keep existing ratings instead of replacing the scope's history.
    #[arg(long, default_value_t = false)]
    pub append: bool,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct NetbackArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    #[arg(long)]
    pub csv: PathBuf,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum HistoryMode {
    /// Every stored rating for the scope.
    Full,
    /// Only entities still held at the latest report month.
    ProForma,
}

impl HistoryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::ProForma => "pro-forma",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    #[arg(long, value_enum, default_value_t = HistoryMode::ProForma)]
    pub history: HistoryMode,

    /// JSON document with remediation plans, dispositions, acquisitions and growth sources.
    #[arg(long)]
    pub adjustments: Option<PathBuf>,

    #[arg(long)]
    pub horizon_months: Option<u32>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,
}
