// 📌 Baseline Cache - Most recent active cognizant agency per subject
//
// A subject is matched by ein OR uei. At most one record is active per
// subject; superseded records are deactivated, never deleted.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub id: i64,
    pub ein: String,
    pub uei: String,
    pub cognizant_agency: String,
    pub assigned_date: DateTime<Utc>,
    pub is_active: bool,

    /// When the record was superseded (None while active)
    pub deactivated_at: Option<DateTime<Utc>>,

    pub source: String,
}

impl BaselineRecord {
    pub fn is_current(&self) -> bool {
        self.is_active
    }
}

/// What one `record_assignment` call changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaselineUpdate {
    pub inserted: Option<BaselineRecord>,
    pub deactivated: usize,
}

impl BaselineUpdate {
    pub fn is_noop(&self) -> bool {
        self.inserted.is_none() && self.deactivated == 0
    }
}

// Empty identifiers never match: two subjects that both lack a uei are
// not the same subject.
const SUBJECT_MATCH: &str = "((?1 <> '' AND ein = ?1) OR (?2 <> '' AND uei = ?2))";

pub struct BaselineCache<'a> {
    conn: &'a Connection,
    source: String,
}

impl<'a> BaselineCache<'a> {
    pub fn new(conn: &'a Connection, source: &str) -> Self {
        BaselineCache {
            conn,
            source: source.to_string(),
        }
    }

    /// Make `agency` the subject's active baseline. Idempotent.
    pub fn record_assignment(&self, ein: &str, uei: &str, agency: &str) -> Result<BaselineUpdate> {
        let now = Utc::now();

        let deactivated = self.conn.execute(
            &format!(
                "UPDATE cognizant_baselines
                 SET is_active = 0, deactivated_at = ?4
                 WHERE is_active = 1 AND {} AND cognizant_agency <> ?3",
                SUBJECT_MATCH
            ),
            params![ein, uei, agency, now.to_rfc3339()],
        )?;

        let existing: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM cognizant_baselines
                 WHERE is_active = 1 AND {} AND cognizant_agency = ?3",
                SUBJECT_MATCH
            ),
            params![ein, uei, agency],
            |row| row.get(0),
        )?;

        let inserted = if existing == 0 {
            self.conn.execute(
                "INSERT INTO cognizant_baselines (
                    ein, uei, cognizant_agency, date_assigned, is_active, deactivated_at, source
                ) VALUES (?1, ?2, ?3, ?4, 1, NULL, ?5)",
                params![ein, uei, agency, now.to_rfc3339(), self.source],
            )?;

            Some(BaselineRecord {
                id: self.conn.last_insert_rowid(),
                ein: ein.to_string(),
                uei: uei.to_string(),
                cognizant_agency: agency.to_string(),
                assigned_date: now,
                is_active: true,
                deactivated_at: None,
                source: self.source.clone(),
            })
        } else {
            None
        };

        debug!(
            "baseline for ein {} / uei {}: agency {}, {} deactivated, inserted {}",
            ein,
            uei,
            agency,
            deactivated,
            inserted.is_some()
        );

        Ok(BaselineUpdate { inserted, deactivated })
    }

    /// Active records for the subject
    pub fn active_for(&self, ein: &str, uei: &str) -> Result<Vec<BaselineRecord>> {
        self.query(ein, uei, true)
    }

    /// Every record for the subject, active or not, oldest first
    pub fn history_for(&self, ein: &str, uei: &str) -> Result<Vec<BaselineRecord>> {
        self.query(ein, uei, false)
    }

    fn query(&self, ein: &str, uei: &str, active_only: bool) -> Result<Vec<BaselineRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, ein, uei, cognizant_agency, date_assigned, is_active, deactivated_at, source
             FROM cognizant_baselines
             WHERE {} AND (?3 = 0 OR is_active = 1)
             ORDER BY id",
            SUBJECT_MATCH
        ))?;

        let records = stmt
            .query_map(params![ein, uei, active_only], |row| {
                let assigned_str: String = row.get(4)?;
                let deactivated_str: Option<String> = row.get(6)?;

                Ok(BaselineRecord {
                    id: row.get(0)?,
                    ein: row.get(1)?,
                    uei: row.get(2)?,
                    cognizant_agency: row.get(3)?,
                    assigned_date: parse_timestamp(&assigned_str, 4)?,
                    is_active: row.get(5)?,
                    deactivated_at: deactivated_str
                        .map(|s| parse_timestamp(&s, 6))
                        .transpose()?,
                    source: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

pub(crate) fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ============================================================================
// TESTS
// ============================================================================
