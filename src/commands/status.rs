use std::fs;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::import::{load_entities, load_report_months, load_snapshots};
use crate::commands::netbacks::load_netbacks;
use crate::config::AppConfig;
use crate::model::{ImportRunManifest, rating_of};

pub fn run(args: StatusArgs) -> Result<()> {
    let config = AppConfig::resolve(&args.scope)?;
    let scope = config.scope();
    let last_import_path = config.manifest_dir().join("last_import.json");
    let db_path = config.db_path();

    info!(work_dir = %config.work_dir.display(), scope = %scope, "status requested");

    if last_import_path.exists() {
        let raw = fs::read(&last_import_path)
            .with_context(|| format!("failed to read {}", last_import_path.display()))?;
        let manifest: ImportRunManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", last_import_path.display()))?;

        info!(
            run_id = %manifest.run_id,
            status = %manifest.status,
            scope = %manifest.scope,
            append_mode = manifest.append_mode,
            files = manifest.files.len(),
            records = manifest.summary.records_imported,
            entities_created = manifest.summary.entities_created,
            updated_at = %manifest.updated_at,
            "loaded last import manifest"
        );
    } else {
        warn!(path = %last_import_path.display(), "no import manifest found");
    }

    if db_path.exists() {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;

        let schema_version = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'db_schema_version'",
                [],
                |row| row.get::<_, String>(0),
            )
            .unwrap_or_default();
        let entities = load_entities(&conn, &scope)?;
        let months = load_report_months(&conn, &scope)?;
        let snapshots = load_snapshots(&conn, &scope)?;

        if let Some(latest) = months.last() {
            let (asset_value, liability_value) = snapshots
                .iter()
                .filter(|snapshot| snapshot.report_month == *latest)
                .fold((0.0, 0.0), |(asset, liability), snapshot| {
                    (asset + snapshot.asset_value, liability + snapshot.liability_value)
                });
            info!(
                report_month = %latest,
                asset_value,
                liability_value,
                rating = rating_of(asset_value, liability_value),
                "latest reported rating"
            );
        }

        let netbacks = load_netbacks(&conn, &scope.jurisdiction)
            .map(|points| points.len())
            .unwrap_or(0);

        info!(
            path = %db_path.display(),
            schema_version = %schema_version,
            entities = entities.len(),
            ratings = snapshots.len(),
            report_months = months.len(),
            first_month = %months.first().map(|month| month.to_string()).unwrap_or_default(),
            last_month = %months.last().map(|month| month.to_string()).unwrap_or_default(),
            netbacks,
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}
