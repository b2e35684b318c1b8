// 📝 Assignment Recorder - Persist decisions + audit trail
//
// Writes the agencies onto the submission. Cognizant assignments also
// refresh the baseline cache and append an immutable history entry;
// oversight assignments touch neither.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::awards::{AwardSet, SubjectIdentity};
use crate::baseline::{parse_timestamp, BaselineCache};
use crate::classifier::{AgencyAssignment, AssignmentBasis, CognizanceClassifier};
use crate::config::AssignmentConfig;
use crate::db;

// ============================================================================
// HISTORY ENTRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentKind {
    Computed,
    Manual,
}

impl AssignmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentKind::Computed => "computed",
            AssignmentKind::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "computed" => Some(AssignmentKind::Computed),
            "manual" => Some(AssignmentKind::Manual),
            _ => None,
        }
    }
}

/// Every cognizant assignment is an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentHistoryEntry {
    pub entry_id: String,
    pub report_id: String,
    pub cognizant_agency: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AssignmentKind,

    /// Free-text justification (manual overrides)
    pub justification: Option<String>,
}

impl AssignmentHistoryEntry {
    pub fn new(
        report_id: &str,
        agency: &str,
        actor: &str,
        kind: AssignmentKind,
        justification: Option<&str>,
    ) -> Self {
        AssignmentHistoryEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            report_id: report_id.to_string(),
            cognizant_agency: agency.to_string(),
            actor: actor.to_string(),
            timestamp: Utc::now(),
            kind,
            justification: justification.map(str::to_string),
        }
    }
}

// ============================================================================
// RECORDER
// ============================================================================

pub struct AssignmentRecorder<'a> {
    conn: &'a Connection,
    config: &'a AssignmentConfig,
}

impl<'a> AssignmentRecorder<'a> {
    pub fn new(conn: &'a Connection, config: &'a AssignmentConfig) -> Self {
        AssignmentRecorder { conn, config }
    }

    /// Persist a computed assignment
    ///
    /// An undetermined assignment writes nothing, so an empty-award run
    /// never clears agencies already on the record.
    pub fn persist(
        &self,
        subject: &SubjectIdentity,
        assignment: &AgencyAssignment,
        actor: &str,
    ) -> Result<Option<AssignmentHistoryEntry>> {
        if assignment.is_undetermined() {
            info!("{}: undetermined, nothing recorded", subject.report_id);
            return Ok(None);
        }

        let kind = match assignment.basis {
            AssignmentBasis::Manual => AssignmentKind::Manual,
            _ => AssignmentKind::Computed,
        };
        self.record(subject, assignment, actor, kind, None)
    }

    /// Administrative override; becomes the baseline for the rest of the
    /// current window
    pub fn override_cognizant(
        &self,
        subject: &SubjectIdentity,
        agency: &str,
        actor: &str,
        justification: &str,
    ) -> Result<AssignmentHistoryEntry> {
        if agency.trim().is_empty() {
            bail!("Override for {} needs a cognizant agency", subject.report_id);
        }

        let assignment =
            AgencyAssignment::cognizant(subject, Some(agency.to_string()), AssignmentBasis::Manual);

        match self.record(subject, &assignment, actor, AssignmentKind::Manual, Some(justification))? {
            Some(entry) => Ok(entry),
            None => bail!("Override for {} was not recorded", subject.report_id),
        }
    }

    fn record(
        &self,
        subject: &SubjectIdentity,
        assignment: &AgencyAssignment,
        actor: &str,
        kind: AssignmentKind,
        justification: Option<&str>,
    ) -> Result<Option<AssignmentHistoryEntry>> {
        db::update_agencies(
            self.conn,
            &subject.report_id,
            assignment.cognizant_agency.as_deref(),
            assignment.oversight_agency.as_deref(),
        )?;

        let Some(agency) = assignment.cognizant_agency.as_deref() else {
            return Ok(None);
        };

        BaselineCache::new(self.conn, &self.config.baseline_source)
            .record_assignment(&subject.ein, &subject.uei, agency)?;

        let entry = AssignmentHistoryEntry::new(&subject.report_id, agency, actor, kind, justification);
        insert_history_entry(self.conn, &entry)?;

        info!(
            "{}: recorded {} cognizant agency {} by {}",
            subject.report_id,
            kind.as_str(),
            agency,
            actor
        );

        Ok(Some(entry))
    }

    /// History for one report, newest first
    pub fn history_for_report(&self, report_id: &str) -> Result<Vec<AssignmentHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, report_id, cognizant_agency, assignor, date_assigned,
                    assignment_type, override_comment
             FROM cognizant_assignments
             WHERE report_id = ?1
             ORDER BY id DESC",
        )?;

        let entries = stmt
            .query_map(params![report_id], |row| {
                let timestamp_str: String = row.get(4)?;
                let kind_str: String = row.get(5)?;

                Ok(AssignmentHistoryEntry {
                    entry_id: row.get(0)?,
                    report_id: row.get(1)?,
                    cognizant_agency: row.get(2)?,
                    actor: row.get(3)?,
                    timestamp: parse_timestamp(&timestamp_str, 4)?,
                    kind: AssignmentKind::parse(&kind_str).ok_or_else(|| {
                        rusqlite::Error::InvalidColumnType(
                            5,
                            "assignment_type".to_string(),
                            rusqlite::types::Type::Text,
                        )
                    })?,
                    justification: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}

fn insert_history_entry(conn: &Connection, entry: &AssignmentHistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO cognizant_assignments (
            entry_id, report_id, cognizant_agency, assignor, date_assigned,
            assignment_type, override_comment
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.entry_id,
            entry.report_id,
            entry.cognizant_agency,
            entry.actor,
            entry.timestamp.to_rfc3339(),
            entry.kind.as_str(),
            entry.justification,
        ],
    )?;

    Ok(())
}

/// Classify and persist one submission inside a single transaction
pub fn assign_and_record(
    conn: &mut Connection,
    config: &AssignmentConfig,
    award_set: &AwardSet,
    subject: &SubjectIdentity,
    actor: &str,
) -> Result<AgencyAssignment> {
    let tx = conn.transaction()?;

    let assignment = CognizanceClassifier::new(&tx, config).classify(award_set, subject)?;
    AssignmentRecorder::new(&tx, config).persist(subject, &assignment, actor)?;

    tx.commit()?;
    Ok(assignment)
}

// ============================================================================
// TESTS
// ============================================================================
