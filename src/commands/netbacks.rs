use std::fs::File;
use std::io::Read;

use anyhow::{Context, Result as AnyResult};
use csv::{ReaderBuilder, Trim};
use rusqlite::{Connection, params};
use tracing::info;

use crate::cli::NetbackArgs;
use crate::commands::forecast::NetbackTable;
use crate::commands::import::open_connection;
use crate::config::AppConfig;
use crate::error::Result;
use crate::model::NetbackPoint;
use crate::util::ensure_directory;

pub fn run(args: NetbackArgs) -> AnyResult<()> {
    let config = AppConfig::resolve(&args.scope)?;
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let file = File::open(&args.csv)
        .with_context(|| format!("failed to open {}", args.csv.display()))?;
    let points = read_netback_csv(file)
        .with_context(|| format!("failed to load netbacks from {}", args.csv.display()))?;

    let mut connection = open_connection(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    let stored = replace_netbacks(&mut connection, &config.jurisdiction, &points)?;

    info!(
        jurisdiction = %config.jurisdiction,
        path = %args.csv.display(),
        points = stored,
        "netback table replaced"
    );
    Ok(())
}

/// Reads `effective_date,netback,shrinkage_factor,oil_equivalent_conversion` rows.
pub fn read_netback_csv<R: Read>(reader: R) -> Result<Vec<NetbackPoint>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut points = Vec::new();
    for row in reader.deserialize::<NetbackPoint>() {
        points.push(row?);
    }
    Ok(points)
}

/// Swaps the jurisdiction's whole netback table in one transaction.
pub fn replace_netbacks(
    connection: &mut Connection,
    jurisdiction: &str,
    points: &[NetbackPoint],
) -> Result<usize> {
    let table = NetbackTable::new(points.to_vec())?;

    let tx = connection.transaction()?;
    tx.execute(
        "DELETE FROM historical_netbacks WHERE jurisdiction = ?1",
        params![jurisdiction],
    )?;
    {
        let mut statement = tx.prepare(
            "INSERT INTO historical_netbacks(
               jurisdiction, effective_date, netback, shrinkage_factor, oil_equivalent_conversion
             ) VALUES(?1, ?2, ?3, ?4, ?5)",
        )?;
        for point in table.points() {
            statement.execute(params![
                jurisdiction,
                point.effective_date,
                point.netback,
                point.shrinkage_factor,
                point.oil_equivalent_conversion
            ])?;
        }
    }
    tx.commit()?;

    Ok(table.points().len())
}

/// Stored netbacks for the jurisdiction, newest first.
pub fn load_netbacks(connection: &Connection, jurisdiction: &str) -> Result<Vec<NetbackPoint>> {
    let mut statement = connection.prepare(
        "SELECT effective_date, netback, shrinkage_factor, oil_equivalent_conversion
         FROM historical_netbacks
         WHERE jurisdiction = ?1
         ORDER BY effective_date DESC",
    )?;

    let rows = statement.query_map(params![jurisdiction], |row| {
        Ok(NetbackPoint {
            effective_date: row.get(0)?,
            netback: row.get(1)?,
            shrinkage_factor: row.get(2)?,
            oil_equivalent_conversion: row.get(3)?,
        })
    })?;

    let mut points = Vec::new();
    for row in rows {
        points.push(row?);
    }
    Ok(points)
}
