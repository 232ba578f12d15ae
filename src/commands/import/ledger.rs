use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, ffi, params};
use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::model::{
    Entity, EntityType, LiabilityComponents, LiabilityRecord, NaturalKey, RatingSnapshot, Scope,
};

#[derive(Debug, Clone)]
struct IndexedEntity {
    id: i64,
    location: String,
    location_month: Option<NaiveDate>,
}

impl IndexedEntity {
    /// A location only replaces one taken from the same or an earlier report month.
    fn accepts_location(&self, location: &str, report_month: NaiveDate) -> bool {
        !location.is_empty()
            && self
                .location_month
                .is_none_or(|current| report_month >= current)
    }
}

/// Per-scope view of the entity registry, kept in sync with the rows it writes.
///
/// Entities are resolved with a single insert-or-get round trip, so two writers
/// racing on the same natural key converge on the same row.
pub struct EntityLedger<'conn> {
    connection: &'conn Connection,
    scope: Scope,
    index: HashMap<NaturalKey, IndexedEntity>,
    entities_created: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub ratings_inserted: usize,
    pub entities_created: usize,
    pub ratings_cleared: usize,
}

impl<'conn> EntityLedger<'conn> {
    pub fn load(connection: &'conn Connection, scope: &Scope) -> Result<Self> {
        let index = load_entities(connection, scope)?
            .into_iter()
            .map(|entity| {
                (
                    NaturalKey::new(entity.entity_type, &entity.licence),
                    IndexedEntity {
                        id: entity.id,
                        location: entity.location,
                        location_month: entity.location_month,
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        debug!(scope = %scope, entities = index.len(), "entity index loaded");

        Ok(Self {
            connection,
            scope: scope.clone(),
            index,
            entities_created: 0,
        })
    }

    pub fn entities_created(&self) -> usize {
        self.entities_created
    }

    /// Returns the id for the natural key, creating the entity when it is new.
    ///
    /// The stored location tracks the newest report month seen, whatever order
    /// the reports arrive in.
    pub fn resolve_or_create(
        &mut self,
        entity_type: &EntityType,
        licence: &str,
        location: &str,
        report_month: NaiveDate,
    ) -> Result<i64> {
        let key = NaturalKey::new(entity_type.clone(), licence);
        if key.licence.is_empty() {
            return Err(TrackerError::LedgerConsistency(format!(
                "{entity_type} record without a licence in {}",
                self.scope
            )));
        }

        if let Some(entry) = self.index.get_mut(&key) {
            if entry.accepts_location(location, report_month) {
                if entry.location != location || entry.location_month != Some(report_month) {
                    store_location(self.connection, entry.id, location, report_month)?;
                }
                entry.location = location.to_string();
                entry.location_month = Some(report_month);
            }
            return Ok(entry.id);
        }

        let location_month = Some(report_month).filter(|_| !location.is_empty());
        let inserted = self
            .connection
            .prepare_cached(
                "INSERT INTO entities(
                   jurisdiction, company, entity_type, licence, location_identifier, location_month
                 )
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(jurisdiction, company, entity_type, licence) DO NOTHING
                 RETURNING id",
            )?
            .query_row(
                params![
                    self.scope.jurisdiction,
                    self.scope.company_key(),
                    key.entity_type.as_str(),
                    key.licence,
                    location,
                    location_month
                ],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        let entry = match inserted {
            Some(id) => {
                self.entities_created += 1;
                IndexedEntity {
                    id,
                    location: location.to_string(),
                    location_month,
                }
            }
            None => {
                // Written by another connection since the index was loaded.
                let mut existing = self.lookup(&key)?.ok_or_else(|| {
                    TrackerError::LedgerConsistency(format!(
                        "entity {key} in {} neither inserted nor found",
                        self.scope
                    ))
                })?;
                if existing.accepts_location(location, report_month) {
                    store_location(self.connection, existing.id, location, report_month)?;
                    existing.location = location.to_string();
                    existing.location_month = Some(report_month);
                }
                existing
            }
        };

        let id = entry.id;
        self.index.insert(key, entry);
        Ok(id)
    }

    /// Inserts one rating row; a second rating for the same entity and month is rejected.
    pub fn append_rating(&self, entity_id: i64, record: &LiabilityRecord) -> Result<i64> {
        let components = &record.components;
        let result = self
            .connection
            .prepare_cached(
                "INSERT INTO entity_ratings(
                   entity_id, report_month, entity_status, calculation_type, pvs_value_type,
                   asset_value, liability_value,
                   abandonment_basic, abandonment_additional_event, abandonment_gwp,
                   abandonment_gas_migration, abandonment_vent_flow, abandonment_site_specific,
                   reclamation_basic, reclamation_site_specific
                 ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?
            .execute(params![
                entity_id,
                record.report_month,
                record.status,
                record.calculation_type,
                record.present_value_scheme,
                record.asset_value,
                record.liability_value,
                components.abandonment_basic,
                components.abandonment_additional_event,
                components.abandonment_gwp,
                components.abandonment_gas_migration,
                components.abandonment_vent_flow,
                components.abandonment_site_specific,
                components.reclamation_basic,
                components.reclamation_site_specific,
            ]);

        match result {
            Ok(_) => Ok(self.connection.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(TrackerError::LedgerConsistency(format!(
                    "{} already has a rating for {} in {}",
                    record.natural_key(),
                    record.report_month,
                    self.scope
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn lookup(&self, key: &NaturalKey) -> Result<Option<IndexedEntity>> {
        let entity = self
            .connection
            .prepare_cached(
                "SELECT id, location_identifier, location_month FROM entities
                 WHERE jurisdiction = ?1 AND company = ?2 AND entity_type = ?3 AND licence = ?4",
            )?
            .query_row(
                params![
                    self.scope.jurisdiction,
                    self.scope.company_key(),
                    key.entity_type.as_str(),
                    key.licence
                ],
                |row| {
                    Ok(IndexedEntity {
                        id: row.get(0)?,
                        location: row.get(1)?,
                        location_month: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(entity)
    }
}

fn store_location(
    connection: &Connection,
    entity_id: i64,
    location: &str,
    report_month: NaiveDate,
) -> Result<()> {
    connection
        .prepare_cached(
            "UPDATE entities SET location_identifier = ?1, location_month = ?2 WHERE id = ?3",
        )?
        .execute(params![location, report_month, entity_id])?;
    Ok(())
}

/// Removes every rating owned by the scope's entities. Entities themselves are kept.
pub fn clear_ratings(connection: &Connection, scope: &Scope) -> Result<usize> {
    let removed = connection.execute(
        "DELETE FROM entity_ratings
         WHERE entity_id IN (
           SELECT id FROM entities WHERE jurisdiction = ?1 AND company = ?2
         )",
        params![scope.jurisdiction, scope.company_key()],
    )?;
    Ok(removed)
}

/// Writes a batch of parsed records in one transaction.
///
/// Replace mode clears the scope's ratings first; any failure rolls the whole batch back.
pub fn persist_records(
    connection: &mut Connection,
    scope: &Scope,
    records: &[LiabilityRecord],
    append_mode: bool,
) -> Result<LedgerOutcome> {
    let tx = connection.transaction()?;

    let ratings_cleared = if append_mode {
        0
    } else {
        clear_ratings(&tx, scope)?
    };

    let entities_created = {
        let mut ledger = EntityLedger::load(&tx, scope)?;
        for record in records {
            let entity_id = ledger.resolve_or_create(
                &record.entity_type,
                &record.licence,
                &record.location,
                record.report_month,
            )?;
            ledger.append_rating(entity_id, record)?;
        }
        ledger.entities_created()
    };

    tx.commit()?;

    Ok(LedgerOutcome {
        ratings_inserted: records.len(),
        entities_created,
        ratings_cleared,
    })
}

pub fn load_entities(connection: &Connection, scope: &Scope) -> Result<Vec<Entity>> {
    let mut statement = connection.prepare(
        "SELECT id, jurisdiction, company, entity_type, licence, location_identifier, location_month
         FROM entities
         WHERE jurisdiction = ?1 AND company = ?2
         ORDER BY id",
    )?;

    let rows = statement.query_map(params![scope.jurisdiction, scope.company_key()], |row| {
        let company = row.get::<_, String>(2)?;
        Ok(Entity {
            id: row.get(0)?,
            jurisdiction: row.get(1)?,
            company: Some(company).filter(|value| !value.is_empty()),
            entity_type: EntityType::from(row.get::<_, String>(3)?),
            licence: row.get(4)?,
            location: row.get(5)?,
            location_month: row.get(6)?,
        })
    })?;

    let mut entities = Vec::new();
    for row in rows {
        entities.push(row?);
    }
    Ok(entities)
}

pub fn load_snapshots(connection: &Connection, scope: &Scope) -> Result<Vec<RatingSnapshot>> {
    let mut statement = connection.prepare(
        "SELECT r.id, r.entity_id, r.report_month, r.entity_status, r.calculation_type,
                r.pvs_value_type, r.asset_value, r.liability_value,
                r.abandonment_basic, r.abandonment_additional_event, r.abandonment_gwp,
                r.abandonment_gas_migration, r.abandonment_vent_flow,
                r.abandonment_site_specific, r.reclamation_basic, r.reclamation_site_specific
         FROM entity_ratings r
         JOIN entities e ON e.id = r.entity_id
         WHERE e.jurisdiction = ?1 AND e.company = ?2
         ORDER BY r.entity_id, r.report_month",
    )?;

    let rows = statement.query_map(
        params![scope.jurisdiction, scope.company_key()],
        snapshot_from_row,
    )?;

    let mut snapshots = Vec::new();
    for row in rows {
        snapshots.push(row?);
    }
    Ok(snapshots)
}

pub fn load_report_months(connection: &Connection, scope: &Scope) -> Result<Vec<NaiveDate>> {
    let mut statement = connection.prepare(
        "SELECT DISTINCT r.report_month
         FROM entity_ratings r
         JOIN entities e ON e.id = r.entity_id
         WHERE e.jurisdiction = ?1 AND e.company = ?2
         ORDER BY r.report_month",
    )?;
    let rows = statement.query_map(params![scope.jurisdiction, scope.company_key()], |row| {
        row.get::<_, NaiveDate>(0)
    })?;

    let mut months = Vec::new();
    for row in rows {
        months.push(row?);
    }
    Ok(months)
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<RatingSnapshot> {
    Ok(RatingSnapshot {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        report_month: row.get(2)?,
        status: row.get(3)?,
        calculation_type: row.get(4)?,
        present_value_scheme: row.get(5)?,
        asset_value: row.get(6)?,
        liability_value: row.get(7)?,
        components: LiabilityComponents {
            abandonment_basic: row.get(8)?,
            abandonment_additional_event: row.get(9)?,
            abandonment_gwp: row.get(10)?,
            abandonment_gas_migration: row.get(11)?,
            abandonment_vent_flow: row.get(12)?,
            abandonment_site_specific: row.get(13)?,
            reclamation_basic: row.get(14)?,
            reclamation_site_specific: row.get(15)?,
        },
    })
}
