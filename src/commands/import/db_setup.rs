use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::util::now_utc_string;

use super::DB_SCHEMA_VERSION;

/// Opens the tracker database, applying pragmas and creating any missing tables.
pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entities (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          jurisdiction TEXT NOT NULL,
          company TEXT NOT NULL DEFAULT '',
          entity_type TEXT NOT NULL,
          licence TEXT NOT NULL,
          location_identifier TEXT NOT NULL DEFAULT '',
          location_month TEXT
        );

        CREATE TABLE IF NOT EXISTS entity_ratings (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          entity_id INTEGER NOT NULL,
          report_month TEXT NOT NULL,
          entity_status TEXT NOT NULL,
          calculation_type TEXT,
          pvs_value_type TEXT NOT NULL,
          asset_value REAL NOT NULL,
          liability_value REAL NOT NULL,
          abandonment_basic REAL NOT NULL DEFAULT 0,
          abandonment_additional_event REAL NOT NULL DEFAULT 0,
          abandonment_gwp REAL NOT NULL DEFAULT 0,
          abandonment_gas_migration REAL NOT NULL DEFAULT 0,
          abandonment_vent_flow REAL NOT NULL DEFAULT 0,
          abandonment_site_specific REAL NOT NULL DEFAULT 0,
          reclamation_basic REAL NOT NULL DEFAULT 0,
          reclamation_site_specific REAL NOT NULL DEFAULT 0,
          FOREIGN KEY(entity_id) REFERENCES entities(id)
        );

        CREATE TABLE IF NOT EXISTS historical_netbacks (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          jurisdiction TEXT NOT NULL,
          effective_date TEXT NOT NULL,
          netback REAL NOT NULL,
          shrinkage_factor REAL NOT NULL,
          oil_equivalent_conversion REAL NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_natural_key
          ON entities(jurisdiction, company, entity_type, licence);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_entity_ratings_entity_month
          ON entity_ratings(entity_id, report_month);
        CREATE INDEX IF NOT EXISTS idx_entity_ratings_month ON entity_ratings(report_month);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_netbacks_jurisdiction_date
          ON historical_netbacks(jurisdiction, effective_date);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}
