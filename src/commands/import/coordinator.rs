use std::collections::BTreeSet;

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, TrackerError};
use crate::model::{ImportSummary, ImportedReport, LiabilityRecord, Scope};

use super::ledger::persist_records;
use super::report_parse::ReportParser;

/// Raw report text plus the name it is reported under in errors and manifests.
#[derive(Debug, Clone)]
pub struct ReportSource {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ImportJob {
    pub scope: Scope,
    pub reports: Vec<ReportSource>,
    pub append_mode: bool,
}

/// Parses every report first, then writes the whole batch through the ledger.
///
/// A malformed file aborts the job before anything touches storage.
pub fn import_batch(connection: &mut Connection, job: &ImportJob) -> Result<ImportSummary> {
    if job.reports.is_empty() {
        return Err(TrackerError::InvalidRequest(
            "import job carries no reports".to_string(),
        ));
    }

    let parser = ReportParser::new()?;
    let mut records = Vec::<LiabilityRecord>::new();
    let mut report_months = BTreeSet::new();
    let mut reports = Vec::with_capacity(job.reports.len());

    for source in &job.reports {
        let parsed = parser.parse(&source.text).map_err(|err| match err {
            TrackerError::MalformedReport(reason) => {
                TrackerError::MalformedReport(format!("{}: {}", source.name, reason))
            }
            other => other,
        })?;

        info!(
            file = %source.name,
            report_month = %parsed.report_month,
            records = parsed.records.len(),
            "parsed rating report"
        );

        report_months.insert(parsed.report_month);
        reports.push(ImportedReport {
            name: source.name.clone(),
            report_month: parsed.report_month,
            records: parsed.records.len(),
        });
        records.extend(parsed.records);
    }

    let outcome = persist_records(connection, &job.scope, &records, job.append_mode)?;

    info!(
        scope = %job.scope,
        append_mode = job.append_mode,
        ratings = outcome.ratings_inserted,
        entities_created = outcome.entities_created,
        ratings_cleared = outcome.ratings_cleared,
        "import batch committed"
    );

    Ok(ImportSummary {
        records_imported: outcome.ratings_inserted,
        entities_created: outcome.entities_created,
        report_months: report_months.into_iter().collect(),
        reports,
    })
}
