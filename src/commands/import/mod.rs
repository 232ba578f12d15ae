const DB_SCHEMA_VERSION: &str = "1.0.0";

mod coordinator;
mod db_setup;
mod ledger;
mod report_parse;
mod run;
#[cfg(test)]
mod tests;

pub use coordinator::{ImportJob, ReportSource, import_batch};
#[cfg(test)]
pub use db_setup::ensure_schema;
pub use db_setup::open_connection;
pub use ledger::{load_entities, load_report_months, load_snapshots};
pub use run::run;
