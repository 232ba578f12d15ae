use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::model::{EntityType, ForecastPoint, NaturalKey, Scope, SourceType};

#[derive(Debug, Clone)]
struct RatingRow {
    key: NaturalKey,
    report_month: NaiveDate,
    asset_value: f64,
    liability_value: f64,
}

/// Scope totals per report month across every stored rating.
pub fn load_history(connection: &Connection, scope: &Scope) -> Result<Vec<ForecastPoint>> {
    let rows = load_rating_rows(connection, scope)?;
    Ok(aggregate(rows.iter()))
}

/// Scope totals restricted to entities still reported in the latest month,
/// minus any explicitly excluded licences.
pub fn load_pro_forma_history(
    connection: &Connection,
    scope: &Scope,
    excluded: &HashSet<NaturalKey>,
) -> Result<Vec<ForecastPoint>> {
    let rows = load_rating_rows(connection, scope)?;
    let Some(latest) = rows.iter().map(|row| row.report_month).max() else {
        return Ok(Vec::new());
    };

    let held = rows
        .iter()
        .filter(|row| row.report_month == latest)
        .map(|row| row.key.clone())
        .filter(|key| !excluded.contains(key))
        .collect::<HashSet<_>>();

    Ok(aggregate(rows.iter().filter(|row| held.contains(&row.key))))
}

fn load_rating_rows(connection: &Connection, scope: &Scope) -> Result<Vec<RatingRow>> {
    let mut statement = connection.prepare(
        "SELECT e.entity_type, e.licence, r.report_month, r.asset_value, r.liability_value
         FROM entity_ratings r
         JOIN entities e ON e.id = r.entity_id
         WHERE e.jurisdiction = ?1 AND e.company = ?2",
    )?;

    let rows = statement.query_map(params![scope.jurisdiction, scope.company_key()], |row| {
        let entity_type = EntityType::from(row.get::<_, String>(0)?);
        let licence = row.get::<_, String>(1)?;
        Ok(RatingRow {
            key: NaturalKey::new(entity_type, &licence),
            report_month: row.get(2)?,
            asset_value: row.get(3)?,
            liability_value: row.get(4)?,
        })
    })?;

    let mut ratings = Vec::new();
    for row in rows {
        ratings.push(row?);
    }
    Ok(ratings)
}

fn aggregate<'a>(rows: impl Iterator<Item = &'a RatingRow>) -> Vec<ForecastPoint> {
    let mut totals = BTreeMap::<NaiveDate, (f64, f64)>::new();
    for row in rows {
        let entry = totals.entry(row.report_month).or_insert((0.0, 0.0));
        entry.0 += row.asset_value;
        entry.1 += row.liability_value;
    }

    totals
        .into_iter()
        .map(|(report_month, (asset_value, liability_value))| {
            ForecastPoint::new(report_month, asset_value, liability_value, SourceType::Historical)
        })
        .collect()
}
