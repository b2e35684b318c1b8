// 🕰️ Historical Resolver - Cognizant continuity within a baseline window
//
// Once a subject has a cognizant agency anywhere in its current window,
// later submissions in the same window keep it. Otherwise the agency is
// re-derived from the window's first (baseline) year.
//
// The first window straddles the switch from per-submission legacy keys
// to ein/uei. For that window only, a transition-year record carrying
// both schemes bridges the subject back to its legacy-keyed history.
//
// Read-only. Never consults the baseline cache.

use anyhow::Result;
use log::{debug, warn};
use rusqlite::Connection;

use crate::awards::{AwardSet, SubjectIdentity};
use crate::config::AssignmentConfig;
use crate::db;
use crate::resolver::AgencyResolver;

pub struct HistoricalResolver<'a> {
    conn: &'a Connection,
    config: &'a AssignmentConfig,
}

impl<'a> HistoricalResolver<'a> {
    pub fn new(conn: &'a Connection, config: &'a AssignmentConfig) -> Self {
        HistoricalResolver { conn, config }
    }

    pub fn resolve(&self, subject: &SubjectIdentity) -> Result<Option<String>> {
        let baseline_year = self.config.baseline_year(subject.audit_year);

        let legacy_key = if self.config.is_legacy_window(baseline_year) {
            self.resolve_legacy_key(&subject.ein, &subject.uei)?
        } else {
            None
        };

        if let Some(agency) = self.search_established_assignment(
            &subject.ein,
            &subject.uei,
            legacy_key.as_deref(),
            baseline_year,
            subject.audit_year,
        )? {
            debug!(
                "{}: keeping cognizant {} established in window {}",
                subject.report_id, agency, baseline_year
            );
            return Ok(Some(agency));
        }

        self.derive_from_baseline_year(&subject.ein, &subject.uei, baseline_year)
    }

    /// Legacy key of the unique transition-year record for ein AND uei
    ///
    /// Zero or several records, zero or several keys on the record, or a
    /// blank key mean no bridge.
    pub fn resolve_legacy_key(&self, ein: &str, uei: &str) -> Result<Option<String>> {
        let transition_year = self.config.legacy_transition_year;
        let records = db::find_submissions_for_year(self.conn, ein, uei, transition_year)?;

        let record = match records.as_slice() {
            [record] => record,
            [] => return Ok(None),
            _ => {
                warn!(
                    "{} records for ein {} / uei {} in {}, no legacy bridge",
                    records.len(),
                    ein,
                    uei,
                    transition_year
                );
                return Ok(None);
            }
        };

        let mut keys = db::get_legacy_keys(self.conn, &record.report_id)?;
        match keys.len() {
            1 => Ok(keys.pop().filter(|key| !key.trim().is_empty())),
            0 => Ok(None),
            n => {
                warn!("{} legacy keys on {}, no legacy bridge", n, record.report_id);
                Ok(None)
            }
        }
    }

    /// Most recent cognizant agency recorded for this subject between
    /// `baseline_year` and `audit_year` inclusive
    pub fn search_established_assignment(
        &self,
        ein: &str,
        uei: &str,
        legacy_key: Option<&str>,
        baseline_year: i32,
        audit_year: i32,
    ) -> Result<Option<String>> {
        match legacy_key {
            Some(key) if self.config.is_legacy_window(baseline_year) => {
                db::latest_cognizant_by_legacy_key(self.conn, ein, key, baseline_year, audit_year)
            }
            _ => db::latest_cognizant_by_uei(self.conn, ein, uei, baseline_year, audit_year),
        }
    }

    /// Recompute from the single baseline-year record's own awards
    fn derive_from_baseline_year(
        &self,
        ein: &str,
        uei: &str,
        baseline_year: i32,
    ) -> Result<Option<String>> {
        let records = db::find_submissions_for_year(self.conn, ein, uei, baseline_year)?;

        let [record] = records.as_slice() else {
            if records.len() > 1 {
                warn!(
                    "{} baseline records for ein {} / uei {} in {}, no historical agency",
                    records.len(),
                    ein,
                    uei,
                    baseline_year
                );
            }
            return Ok(None);
        };

        let lines = db::get_award_lines(self.conn, &record.report_id)?;
        if lines.is_empty() {
            return Ok(None);
        }

        let award_set = AwardSet::new(record.total_amount_expended, lines);
        let agency = AgencyResolver::new(self.config).resolve_award_set(&award_set);
        debug!(
            "derived {:?} from baseline record {}",
            agency, record.report_id
        );

        Ok(agency)
    }
}

// ============================================================================
// TESTS
// ============================================================================
