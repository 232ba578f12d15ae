use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::Connection;

use super::coordinator::{ImportJob, ReportSource, import_batch};
use super::db_setup::ensure_schema;
use super::ledger::{EntityLedger, clear_ratings, load_entities, load_snapshots, persist_records};
use super::report_parse::ReportParser;
use super::run::render_import_command;
use crate::cli::{ImportArgs, ScopeArgs};
use crate::error::TrackerError;
use crate::model::{EntityType, RatingSnapshot, Scope};

const FEB_REPORT: &str = "\
Licensee Liability Rating Data; ACME Energy Ltd; 28 Feb 2017; 1
Licensee ID; A1B2

W 0001234 ; Active; 01-02-003-04W5; $12,345.67; $2,000.00; PVS-1; A
;;Abandonment;WB Abandonment;Y;$1,500.00
;;Abandonment;GWP;N;$99.00
;;Reclamation;Site Reclamation;Y;500.00
;;Abandonment;Unlisted Extra;Y;$7.00

W 0009999 ; Suspended; 10-11-012-13W4; $0.00; $800.00; PVS-1; I
;;Abandonment;Vent Flow;Y;$125.25

F0005678 ; Operating; 05-06-007-08W4; Program; Calc-B; $4,000.00; $1,250.50; PVS-2; A
;;Abandonment;Fac Abandonment;Y;$1,000.50
;;Reclamation;Site Specific;Y;$250.00
";

const MAR_REPORT: &str = "\
Licensee Liability Rating Data; ACME Energy Ltd; 31 Mar 2017; 1

W 1234 ; Active; 01-02-003-04W6; $11,000.00; $2,000.00; PVS-1; A
;;Abandonment;WB Abandonment;Y;$1,500.00

F0005678 ; Operating; 05-06-007-08W4; Program; Calc-B; $3,900.00; $1,250.50; PVS-2; A
";

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn test_connection() -> Connection {
    let connection = Connection::open_in_memory().expect("in-memory database");
    ensure_schema(&connection).expect("schema");
    connection
}

fn scope() -> Scope {
    Scope::new("AB", None)
}

fn job(reports: &[(&str, &str)], append_mode: bool) -> ImportJob {
    ImportJob {
        scope: scope(),
        reports: reports
            .iter()
            .map(|(name, text)| ReportSource {
                name: (*name).to_string(),
                text: (*text).to_string(),
            })
            .collect(),
        append_mode,
    }
}

fn rating_count(connection: &Connection) -> i64 {
    connection
        .query_row("SELECT COUNT(*) FROM entity_ratings", [], |row| row.get(0))
        .expect("rating count")
}

fn entity_count(connection: &Connection) -> i64 {
    connection
        .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))
        .expect("entity count")
}

fn snapshot_keys(rows: &[RatingSnapshot]) -> Vec<(i64, NaiveDate, u64)> {
    rows.iter()
        .map(|row| (row.entity_id, row.report_month, row.asset_value.to_bits()))
        .collect()
}

#[test]
fn parse_emits_wells_then_facilities_for_one_report_month() {
    let parser = ReportParser::new().expect("parser");
    let report = parser.parse(FEB_REPORT).expect("report parses");

    assert_eq!(report.report_month, date(2017, 2, 1));
    assert_eq!(report.records.len(), 3);
    assert!(report.records.iter().all(|record| record.report_month == date(2017, 2, 1)));

    let kinds = report
        .records
        .iter()
        .map(|record| record.entity_type.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![EntityType::Well, EntityType::Well, EntityType::Facility]
    );

    let well = &report.records[0];
    assert_eq!(well.licence, "1234");
    assert_eq!(well.status, "Active");
    assert_eq!(well.location, "01-02-003-04W5");
    assert_eq!(well.present_value_scheme, "PVS-1");
    assert_eq!(well.calculation_type, None);
    assert!((well.asset_value - 12_345.67).abs() < 1e-9);
    assert!((well.liability_value - 2_000.0).abs() < 1e-9);
}

#[test]
fn parse_routes_only_applicable_detail_rows() {
    let parser = ReportParser::new().expect("parser");
    let report = parser.parse(FEB_REPORT).expect("report parses");

    let well = &report.records[0].components;
    assert!((well.abandonment_basic - 1_500.0).abs() < 1e-9);
    assert!((well.reclamation_basic - 500.0).abs() < 1e-9);
    assert_eq!(well.abandonment_gwp, 0.0);
    assert_eq!(well.abandonment_site_specific, 0.0);

    let suspended = &report.records[1].components;
    assert!((suspended.abandonment_vent_flow - 125.25).abs() < 1e-9);

    let facility = &report.records[2];
    assert_eq!(facility.calculation_type.as_deref(), Some("Calc-B"));
    assert!((facility.components.abandonment_basic - 1_000.5).abs() < 1e-9);
    assert!((facility.components.reclamation_site_specific - 250.0).abs() < 1e-9);
    assert!(facility.asset_value >= 0.0 && facility.liability_value >= 0.0);
}

#[test]
fn parse_is_deterministic_for_identical_text() {
    let parser = ReportParser::new().expect("parser");
    let first = parser.parse(FEB_REPORT).expect("first parse");
    let second = parser.parse(FEB_REPORT).expect("second parse");
    assert_eq!(first, second);
}

#[test]
fn parse_rejects_text_without_report_date() {
    let parser = ReportParser::new().expect("parser");
    let err = parser
        .parse("W 0001234 ; Active; loc; $1.00; $2.00; PVS; A\n")
        .expect_err("missing date header");
    assert!(matches!(err, TrackerError::MalformedReport(_)));
}

#[test]
fn parse_rejects_broken_header_amount() {
    let parser = ReportParser::new().expect("parser");
    let text = "Rating Data; X; 28 Feb 2017; 1\n\nW 0001234 ; Active; loc; $12,34.5; $2.00; PVS; A\n";
    let err = parser.parse(text).expect_err("broken amount grammar");
    match err {
        TrackerError::MalformedReport(reason) => assert!(reason.contains("line 3")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn parse_rejects_unparseable_applicable_detail_amount() {
    let parser = ReportParser::new().expect("parser");
    let text = "Rating Data; X; 28 Feb 2017; 1\n\nW 0001234 ; Active; loc; $1.00; $2.00; PVS; A\n;;Abandonment;GWP;Y;$-5.00\n";
    let err = parser.parse(text).expect_err("negative detail amount");
    assert!(matches!(err, TrackerError::MalformedReport(_)));
}

#[test]
fn parse_ignores_unparseable_amount_on_inapplicable_row() {
    let parser = ReportParser::new().expect("parser");
    let text = "Rating Data; X; 28 Feb 2017; 1\n\nW 0001234 ; Active; loc; $1.00; $2.00; PVS; A\n;;Abandonment;GWP;N;n/a\n";
    let report = parser.parse(text).expect("inapplicable row ignored");
    assert_eq!(report.records[0].components.abandonment_gwp, 0.0);
}

#[test]
fn parse_rejects_duplicate_licence_in_one_report() {
    let parser = ReportParser::new().expect("parser");
    let text = "Rating Data; X; 28 Feb 2017; 1\n\nW 0001234 ; Active; a; $1.00; $2.00; PVS; A\n\nW 1234 ; Active; b; $1.00; $2.00; PVS; A\n";
    let err = parser.parse(text).expect_err("duplicate natural key");
    assert!(matches!(err, TrackerError::MalformedReport(_)));
}

#[test]
fn record_block_stops_at_next_header_without_blank_line() {
    let parser = ReportParser::new().expect("parser");
    let text = "Rating Data; X; 28 Feb 2017; 1\n\nW 0000001 ; Active; a; $1.00; $2.00; PVS; A\nW 0000002 ; Active; b; $1.00; $2.00; PVS; A\n;;Abandonment;GWP;Y;$40.00\n";
    let report = parser.parse(text).expect("adjacent records parse");

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].components.abandonment_gwp, 0.0);
    assert!((report.records[1].components.abandonment_gwp - 40.0).abs() < 1e-9);
}

#[test]
fn parse_uses_first_report_date_header() {
    let parser = ReportParser::new().expect("parser");
    let text = "Rating Data; X; 28 Feb 2017; 1\n\nW 1 ; Active; a; $1.00; $2.00; PVS; A\n\nRating Data; X; 31 Mar 2017; 1\n";
    let report = parser.parse(text).expect("report parses");

    assert_eq!(report.report_month, date(2017, 2, 1));
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].report_month, date(2017, 2, 1));
}

#[test]
fn parse_accepts_report_without_records() {
    let parser = ReportParser::new().expect("parser");
    let text = "Licensee Liability Rating Data; ACME Energy Ltd; 30 Apr 2017; 1\nLicensee ID; A1B2\n";
    let report = parser.parse(text).expect("empty report parses");

    assert_eq!(report.report_month, date(2017, 4, 1));
    assert!(report.records.is_empty());
}

#[test]
fn import_replace_twice_leaves_identical_snapshot_set() {
    let mut connection = test_connection();
    let batch = job(&[("feb.txt", FEB_REPORT), ("mar.txt", MAR_REPORT)], false);

    let first = import_batch(&mut connection, &batch).expect("first import");
    assert_eq!(first.records_imported, 5);
    assert_eq!(first.entities_created, 3);
    assert_eq!(first.report_months, vec![date(2017, 2, 1), date(2017, 3, 1)]);
    let snapshots_once = load_snapshots(&connection, &scope()).expect("snapshots");

    let second = import_batch(&mut connection, &batch).expect("second import");
    assert_eq!(second.records_imported, 5);
    assert_eq!(second.entities_created, 0);
    let snapshots_twice = load_snapshots(&connection, &scope()).expect("snapshots");

    assert_eq!(entity_count(&connection), 3);
    assert_eq!(snapshots_once.len(), snapshots_twice.len());
    assert_eq!(snapshot_keys(&snapshots_once), snapshot_keys(&snapshots_twice));
}

#[test]
fn leading_zeros_resolve_to_the_same_entity_and_update_location() {
    let mut connection = test_connection();
    import_batch(&mut connection, &job(&[("feb.txt", FEB_REPORT)], true)).expect("feb");
    import_batch(&mut connection, &job(&[("mar.txt", MAR_REPORT)], true)).expect("mar");

    let entities = load_entities(&connection, &scope()).expect("entities");
    assert_eq!(entities.len(), 3);
    let well = entities
        .iter()
        .find(|entity| entity.entity_type == EntityType::Well && entity.licence == "1234")
        .expect("well 1234");
    assert_eq!(well.location, "01-02-003-04W6");
    assert_eq!(rating_count(&connection), 5);
}

fn well_1234_location(connection: &Connection) -> String {
    load_entities(connection, &scope())
        .expect("entities")
        .into_iter()
        .find(|entity| entity.entity_type == EntityType::Well && entity.licence == "1234")
        .map(|entity| entity.location)
        .expect("well 1234")
}

#[test]
fn location_follows_newest_month_regardless_of_file_order() {
    let mut connection = test_connection();
    import_batch(
        &mut connection,
        &job(&[("mar.txt", MAR_REPORT), ("feb.txt", FEB_REPORT)], false),
    )
    .expect("out of order batch");

    assert_eq!(well_1234_location(&connection), "01-02-003-04W6");
}

#[test]
fn appending_an_older_month_keeps_the_newer_location() {
    let mut connection = test_connection();
    import_batch(&mut connection, &job(&[("mar.txt", MAR_REPORT)], true)).expect("mar");
    import_batch(&mut connection, &job(&[("feb.txt", FEB_REPORT)], true)).expect("feb");

    assert_eq!(well_1234_location(&connection), "01-02-003-04W6");
    let entities = load_entities(&connection, &scope()).expect("entities");
    let well = entities
        .iter()
        .find(|entity| entity.licence == "1234")
        .expect("well 1234");
    assert_eq!(well.location_month, Some(date(2017, 3, 1)));
}

#[test]
fn append_of_an_already_imported_month_rolls_back() {
    let mut connection = test_connection();
    import_batch(&mut connection, &job(&[("feb.txt", FEB_REPORT)], true)).expect("feb");

    let err = import_batch(
        &mut connection,
        &job(&[("mar.txt", MAR_REPORT), ("feb-again.txt", FEB_REPORT)], true),
    )
    .expect_err("duplicate month must fail");

    assert!(matches!(err, TrackerError::LedgerConsistency(_)));
    assert_eq!(rating_count(&connection), 3);
    assert_eq!(entity_count(&connection), 3);
}

#[test]
fn malformed_file_aborts_the_whole_batch() {
    let mut connection = test_connection();
    let err = import_batch(
        &mut connection,
        &job(&[("feb.txt", FEB_REPORT), ("broken.txt", "no header here")], false),
    )
    .expect_err("broken file");

    match err {
        TrackerError::MalformedReport(reason) => assert!(reason.starts_with("broken.txt")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(rating_count(&connection), 0);
    assert_eq!(entity_count(&connection), 0);
}

#[test]
fn replace_mode_clears_ratings_but_keeps_entities() {
    let mut connection = test_connection();
    import_batch(&mut connection, &job(&[("feb.txt", FEB_REPORT)], false)).expect("feb");
    import_batch(&mut connection, &job(&[("mar.txt", MAR_REPORT)], false)).expect("mar");

    assert_eq!(entity_count(&connection), 3);
    assert_eq!(rating_count(&connection), 2);

    let removed = clear_ratings(&connection, &scope()).expect("clear");
    assert_eq!(removed, 2);
    assert_eq!(entity_count(&connection), 3);
}

#[test]
fn company_scopes_do_not_share_entities_or_ratings() {
    let mut connection = test_connection();
    let mut acme = job(&[("feb.txt", FEB_REPORT)], false);
    acme.scope = Scope::new("AB", Some("acme".to_string()));
    let mut other = job(&[("feb.txt", FEB_REPORT)], false);
    other.scope = Scope::new("AB", Some("other".to_string()));

    import_batch(&mut connection, &acme).expect("acme");
    import_batch(&mut connection, &other).expect("other");
    import_batch(&mut connection, &acme).expect("acme replace");

    assert_eq!(entity_count(&connection), 6);
    assert_eq!(
        load_snapshots(&connection, &other.scope).expect("other").len(),
        3
    );
    assert_eq!(
        load_snapshots(&connection, &acme.scope).expect("acme").len(),
        3
    );
}

#[test]
fn ledger_resolves_existing_entities_without_creating() {
    let mut connection = test_connection();
    let parser = ReportParser::new().expect("parser");
    let records = parser.parse(FEB_REPORT).expect("parse").records;
    persist_records(&mut connection, &scope(), &records, true).expect("persist");

    let tx = connection.transaction().expect("transaction");
    let mut ledger = EntityLedger::load(&tx, &scope()).expect("ledger");
    let first = ledger
        .resolve_or_create(&EntityType::Well, "01234", "", date(2017, 2, 1))
        .expect("resolve");
    let second = ledger
        .resolve_or_create(&EntityType::Well, "1234", "", date(2017, 2, 1))
        .expect("resolve again");
    assert_eq!(first, second);
    assert_eq!(ledger.entities_created(), 0);

    let err = ledger
        .resolve_or_create(&EntityType::Facility, "  ", "x", date(2017, 2, 1))
        .expect_err("empty licence");
    assert!(matches!(err, TrackerError::LedgerConsistency(_)));
}

#[test]
fn summary_reports_month_per_file_in_job_order() {
    let mut connection = test_connection();
    let summary = import_batch(
        &mut connection,
        &job(&[("mar.txt", MAR_REPORT), ("feb.txt", FEB_REPORT)], false),
    )
    .expect("import");

    let per_file = summary
        .reports
        .iter()
        .map(|report| (report.name.as_str(), report.report_month, report.records))
        .collect::<Vec<_>>();
    assert_eq!(
        per_file,
        vec![
            ("mar.txt", date(2017, 3, 1), 2),
            ("feb.txt", date(2017, 2, 1), 3),
        ]
    );
    assert_eq!(summary.report_months, vec![date(2017, 2, 1), date(2017, 3, 1)]);
}

#[test]
fn only_duplicate_months_are_reported_as_existing_ratings() {
    let connection = test_connection();
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .expect("foreign keys");
    let parser = ReportParser::new().expect("parser");
    let record = parser
        .parse(FEB_REPORT)
        .expect("parse")
        .records
        .into_iter()
        .next()
        .expect("first record");

    let ledger = EntityLedger::load(&connection, &scope()).expect("ledger");
    let err = ledger
        .append_rating(999, &record)
        .expect_err("unknown entity id");

    assert!(matches!(err, TrackerError::Storage(_)));
    assert!(!err.to_string().contains("already has a rating"));
}

#[test]
fn empty_job_is_rejected() {
    let mut connection = test_connection();
    let err = import_batch(&mut connection, &job(&[], false)).expect_err("empty job");
    assert!(matches!(err, TrackerError::InvalidRequest(_)));
}

#[test]
fn render_import_command_lists_reports_and_mode() {
    let args = ImportArgs {
        scope: ScopeArgs {
            jurisdiction: Some("AB".to_string()),
            ..ScopeArgs::default()
        },
        reports: vec![PathBuf::from("feb.txt"), PathBuf::from("mar.txt")],
        append: true,
        manifest_path: None,
    };

    let command = render_import_command(&args);
    assert!(command.starts_with("ogliability import --jurisdiction AB"));
    assert!(command.contains("--append"));
    assert!(command.ends_with("--report feb.txt --report mar.txt"));
}
