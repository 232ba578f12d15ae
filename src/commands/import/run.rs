use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::ImportArgs;
use crate::config::AppConfig;
use crate::error::TrackerError;
use crate::model::{ImportRunManifest, ImportSummary, ReportFileEntry};
use crate::util::{ensure_directory, now_utc_string, sha256_hex, utc_compact_string, write_json_pretty};
use crate::worker::{JobOutcome, JobRequest, WorkerPool};

use super::DB_SCHEMA_VERSION;
use super::coordinator::{ImportJob, ReportSource};

pub fn run(args: ImportArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("import-{}", utc_compact_string(started_ts));

    let config = AppConfig::resolve(&args.scope)?;
    let manifest_dir = config.manifest_dir();
    ensure_directory(&manifest_dir)?;
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("import_run_{}.json", utc_compact_string(started_ts)))
    });

    let scope = config.scope();
    info!(scope = %scope, run_id = %run_id, reports = args.reports.len(), "starting import");

    let mut reports = Vec::with_capacity(args.reports.len());
    let mut files = Vec::with_capacity(args.reports.len());
    for path in &args.reports {
        let (source, entry) = read_report(path)?;
        reports.push(source);
        files.push(entry);
    }

    let job = ImportJob {
        scope: scope.clone(),
        reports,
        append_mode: args.append,
    };

    let pool = WorkerPool::start(config.clone())?;
    let outcome = pool.execute(JobRequest::Import(job));

    let mut manifest = ImportRunManifest {
        manifest_version: 1,
        run_id,
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at: String::new(),
        command: render_import_command(&args),
        scope: scope.to_string(),
        append_mode: args.append,
        db_path: db_path.display().to_string(),
        files,
        summary: ImportSummary::default(),
    };

    let summary = match outcome {
        Ok(JobOutcome::Imported(summary)) => summary,
        Ok(JobOutcome::Forecast(_)) => bail!("import job returned a forecast outcome"),
        Err(err @ TrackerError::JobTimeout { .. }) => {
            // The worker keeps going and may still commit; leave a trace of that.
            manifest.status = "timed_out".to_string();
            manifest.updated_at = now_utc_string();
            write_json_pretty(&manifest_path, &manifest)?;
            write_json_pretty(&manifest_dir.join("last_import.json"), &manifest)?;
            warn!(
                path = %manifest_path.display(),
                "import timed out; the batch may still be committed by its worker"
            );
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    for (entry, report) in manifest.files.iter_mut().zip(&summary.reports) {
        entry.report_month = Some(report.report_month);
    }
    manifest.summary = summary;
    manifest.updated_at = now_utc_string();

    write_json_pretty(&manifest_path, &manifest)?;
    write_json_pretty(&manifest_dir.join("last_import.json"), &manifest)?;

    info!(path = %manifest_path.display(), "wrote import run manifest");
    info!(
        records = manifest.summary.records_imported,
        entities_created = manifest.summary.entities_created,
        report_months = manifest.summary.report_months.len(),
        "import completed"
    );

    Ok(())
}

/// Reads a report lossily; stray non-UTF-8 bytes in exports must not abort a batch.
fn read_report(path: &Path) -> Result<(ReportSource, ReportFileEntry)> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let entry = ReportFileEntry {
        filename: name.clone(),
        sha256: sha256_hex(&bytes),
        report_month: None,
    };
    let source = ReportSource {
        name,
        text: String::from_utf8_lossy(&bytes).into_owned(),
    };

    Ok((source, entry))
}

pub(super) fn render_import_command(args: &ImportArgs) -> String {
    let mut command = vec!["ogliability".to_string(), "import".to_string()];

    if let Some(jurisdiction) = &args.scope.jurisdiction {
        command.push("--jurisdiction".to_string());
        command.push(jurisdiction.clone());
    }
    if let Some(company) = &args.scope.company {
        command.push("--company".to_string());
        command.push(company.clone());
    }
    if args.append {
        command.push("--append".to_string());
    }
    for report in &args.reports {
        command.push("--report".to_string());
        command.push(report.display().to_string());
    }

    command.join(" ")
}
