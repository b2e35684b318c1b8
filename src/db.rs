use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::awards::{AwardLine, SubjectIdentity};

/// One historical (or current) submission row
/// Written by intake and the migration pipeline; the engine only writes
/// the two agency columns
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Submission {
    pub report_id: String,
    pub auditee_ein: String,
    pub auditee_uei: String,
    pub audit_year: i32,
    pub total_amount_expended: i64,

    #[serde(default)]
    pub cognizant_agency: Option<String>,

    #[serde(default)]
    pub oversight_agency: Option<String>,

    /// Identifier carried over from the legacy scheme (contains the
    /// per-submission legacy key)
    #[serde(default)]
    pub legacy_id: Option<String>,

    #[serde(default = "default_data_source")]
    pub data_source: String,
}

fn default_data_source() -> String {
    "GSAFAC".to_string()
}

impl Submission {
    pub fn new(report_id: &str, ein: &str, uei: &str, audit_year: i32, total: i64) -> Self {
        Submission {
            report_id: report_id.to_string(),
            auditee_ein: ein.to_string(),
            auditee_uei: uei.to_string(),
            audit_year,
            total_amount_expended: total,
            cognizant_agency: None,
            oversight_agency: None,
            legacy_id: None,
            data_source: default_data_source(),
        }
    }

    pub fn subject(&self) -> SubjectIdentity {
        SubjectIdentity {
            ein: self.auditee_ein.clone(),
            uei: self.auditee_uei.clone(),
            audit_year: self.audit_year,
            report_id: self.report_id.clone(),
            legacy_key: self.legacy_id.clone(),
        }
    }
}

/// Award line as exported by the migration pipeline
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AwardLineRow {
    pub report_id: String,
    pub line_number: i64,
    pub federal_agency_prefix: String,
    pub amount_expended: i64,
    pub is_direct: bool,
}

/// Legacy key ↔ report pairing from the migration pipeline
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LegacyKeyRow {
    pub report_id: String,
    pub legacy_key: String,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Submissions (historical + current, one row per report)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            report_id TEXT UNIQUE NOT NULL,
            auditee_ein TEXT NOT NULL,
            auditee_uei TEXT NOT NULL,
            audit_year INTEGER NOT NULL,
            total_amount_expended INTEGER NOT NULL,
            cognizant_agency TEXT,
            oversight_agency TEXT,
            legacy_id TEXT,
            data_source TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS award_lines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            report_id TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            federal_agency_prefix TEXT NOT NULL,
            amount_expended INTEGER NOT NULL,
            is_direct INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS legacy_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            report_id TEXT NOT NULL,
            legacy_key TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Baseline cache (rows are deactivated, never deleted)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cognizant_baselines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ein TEXT NOT NULL,
            uei TEXT NOT NULL,
            cognizant_agency TEXT NOT NULL,
            date_assigned TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            deactivated_at TEXT,
            source TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Assignment history (append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cognizant_assignments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            report_id TEXT NOT NULL,
            cognizant_agency TEXT NOT NULL,
            assignor TEXT NOT NULL,
            date_assigned TEXT NOT NULL,
            assignment_type TEXT NOT NULL,
            override_comment TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_subject ON submissions(auditee_ein, auditee_uei, audit_year)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_award_lines_report ON award_lines(report_id, line_number)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_legacy_keys_report ON legacy_keys(report_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_baselines_active ON cognizant_baselines(is_active, ein, uei)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_report ON cognizant_assignments(report_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// Writes
// ============================================================================

pub fn insert_submission(conn: &Connection, submission: &Submission) -> Result<()> {
    conn.execute(
        "INSERT INTO submissions (
            report_id, auditee_ein, auditee_uei, audit_year, total_amount_expended,
            cognizant_agency, oversight_agency, legacy_id, data_source
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            submission.report_id,
            submission.auditee_ein,
            submission.auditee_uei,
            submission.audit_year,
            submission.total_amount_expended,
            submission.cognizant_agency,
            submission.oversight_agency,
            submission.legacy_id,
            submission.data_source,
        ],
    )
    .with_context(|| format!("Failed to insert submission {}", submission.report_id))?;

    Ok(())
}

/// Store award lines in their reported order
pub fn insert_award_lines(conn: &Connection, report_id: &str, lines: &[AwardLine]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO award_lines (
            report_id, line_number, federal_agency_prefix, amount_expended, is_direct
        ) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    for (line_number, line) in lines.iter().enumerate() {
        stmt.execute(params![
            report_id,
            line_number as i64,
            line.agency_prefix,
            line.amount_expended,
            line.is_direct,
        ])?;
    }

    Ok(lines.len())
}

pub fn insert_legacy_key(conn: &Connection, report_id: &str, legacy_key: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO legacy_keys (report_id, legacy_key) VALUES (?1, ?2)",
        params![report_id, legacy_key],
    )?;

    Ok(())
}

/// Write the computed agencies onto the subject's current record
pub fn update_agencies(
    conn: &Connection,
    report_id: &str,
    cognizant_agency: Option<&str>,
    oversight_agency: Option<&str>,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE submissions
         SET cognizant_agency = ?2, oversight_agency = ?3
         WHERE report_id = ?1",
        params![report_id, cognizant_agency, oversight_agency],
    )?;

    if updated == 0 {
        bail!("No submission record for report {}", report_id);
    }

    Ok(())
}

// ============================================================================
// Reads (total over absent data)
// ============================================================================

// A subject with neither ein nor uei is unidentified and matches nothing,
// not every other unidentified row.
const SUBJECT_IDENTIFIED: &str = "(?1 <> '' OR ?2 <> '')";

const SUBMISSION_COLUMNS: &str = "report_id, auditee_ein, auditee_uei, audit_year, total_amount_expended,
                cognizant_agency, oversight_agency, legacy_id, data_source";

fn row_to_submission(row: &rusqlite::Row) -> rusqlite::Result<Submission> {
    Ok(Submission {
        report_id: row.get(0)?,
        auditee_ein: row.get(1)?,
        auditee_uei: row.get(2)?,
        audit_year: row.get(3)?,
        total_amount_expended: row.get(4)?,
        cognizant_agency: row.get(5)?,
        oversight_agency: row.get(6)?,
        legacy_id: row.get(7)?,
        data_source: row.get(8)?,
    })
}

pub fn get_submission(conn: &Connection, report_id: &str) -> Result<Option<Submission>> {
    let submission = conn
        .query_row(
            &format!("SELECT {} FROM submissions WHERE report_id = ?1", SUBMISSION_COLUMNS),
            params![report_id],
            row_to_submission,
        )
        .optional()?;

    Ok(submission)
}

/// Submissions for one audit year matching both ein AND uei
pub fn find_submissions_for_year(
    conn: &Connection,
    ein: &str,
    uei: &str,
    audit_year: i32,
) -> Result<Vec<Submission>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM submissions
         WHERE {} AND auditee_ein = ?1 AND auditee_uei = ?2 AND audit_year = ?3
         ORDER BY id",
        SUBMISSION_COLUMNS, SUBJECT_IDENTIFIED
    ))?;

    let submissions = stmt
        .query_map(params![ein, uei, audit_year], row_to_submission)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(submissions)
}

pub fn get_award_lines(conn: &Connection, report_id: &str) -> Result<Vec<AwardLine>> {
    let mut stmt = conn.prepare(
        "SELECT federal_agency_prefix, amount_expended, is_direct
         FROM award_lines
         WHERE report_id = ?1
         ORDER BY line_number, id",
    )?;

    let lines = stmt
        .query_map(params![report_id], |row| {
            Ok(AwardLine {
                agency_prefix: row.get(0)?,
                amount_expended: row.get(1)?,
                is_direct: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(lines)
}

pub fn get_legacy_keys(conn: &Connection, report_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT legacy_key FROM legacy_keys WHERE report_id = ?1 ORDER BY id")?;

    let keys = stmt
        .query_map(params![report_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(keys)
}

/// Most recent non-empty cognizant agency for ein AND uei within [from, to]
pub fn latest_cognizant_by_uei(
    conn: &Connection,
    ein: &str,
    uei: &str,
    from_year: i32,
    to_year: i32,
) -> Result<Option<String>> {
    let agency = conn
        .query_row(
            &format!(
                "SELECT cognizant_agency FROM submissions
                 WHERE {} AND auditee_ein = ?1 AND auditee_uei = ?2
                   AND audit_year BETWEEN ?3 AND ?4
                   AND cognizant_agency IS NOT NULL AND cognizant_agency <> ''
                 ORDER BY audit_year DESC, id DESC
                 LIMIT 1",
                SUBJECT_IDENTIFIED
            ),
            params![ein, uei, from_year, to_year],
            |row| row.get(0),
        )
        .optional()?;

    Ok(agency)
}

/// Most recent non-empty cognizant agency for ein AND a legacy id
/// containing `legacy_key` within [from, to]
///
/// A blank key matches nothing (`instr` treats '' as found everywhere).
pub fn latest_cognizant_by_legacy_key(
    conn: &Connection,
    ein: &str,
    legacy_key: &str,
    from_year: i32,
    to_year: i32,
) -> Result<Option<String>> {
    if legacy_key.trim().is_empty() {
        return Ok(None);
    }

    let agency = conn
        .query_row(
            "SELECT cognizant_agency FROM submissions
             WHERE auditee_ein = ?1
               AND ?2 <> '' AND legacy_id IS NOT NULL AND instr(legacy_id, ?2) > 0
               AND audit_year BETWEEN ?3 AND ?4
               AND cognizant_agency IS NOT NULL AND cognizant_agency <> ''
             ORDER BY audit_year DESC, id DESC
             LIMIT 1",
            params![ein, legacy_key, from_year, to_year],
            |row| row.get(0),
        )
        .optional()?;

    Ok(agency)
}

// ============================================================================
// CSV import (migration pipeline exports)
// ============================================================================

pub fn load_csv<T: DeserializeOwned>(csv_path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.context("Failed to deserialize CSV row")?;
        rows.push(row);
    }

    Ok(rows)
}

/// Counts of rows written by `import_history`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub submissions: usize,
    pub award_lines: usize,
    pub legacy_keys: usize,
}

/// Seed historical records
///
/// Runs in one transaction (`unchecked_transaction`, so the caller must not
/// already hold one): a failing row leaves nothing behind.
pub fn import_history(
    conn: &Connection,
    submissions: &[Submission],
    award_lines: &[AwardLineRow],
    legacy_keys: &[LegacyKeyRow],
) -> Result<ImportSummary> {
    let tx = conn.unchecked_transaction()?;
    let mut summary = ImportSummary::default();

    for submission in submissions {
        insert_submission(&tx, submission)?;
        summary.submissions += 1;
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO award_lines (
                report_id, line_number, federal_agency_prefix, amount_expended, is_direct
            ) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for row in award_lines {
            stmt.execute(params![
                row.report_id,
                row.line_number,
                row.federal_agency_prefix,
                row.amount_expended,
                row.is_direct,
            ])?;
            summary.award_lines += 1;
        }
    }

    for row in legacy_keys {
        insert_legacy_key(&tx, &row.report_id, &row.legacy_key)?;
        summary.legacy_keys += 1;
    }

    tx.commit()?;

    log::info!(
        "Imported {} submissions, {} award lines, {} legacy keys",
        summary.submissions,
        summary.award_lines,
        summary.legacy_keys
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn with_agency(mut submission: Submission, agency: &str) -> Submission {
        submission.cognizant_agency = Some(agency.to_string());
        submission
    }

    #[test]
    fn test_submission_roundtrip_and_missing() {
        let conn = test_db();
        let submission = Submission::new("2021-06-GSAFAC-0000000001", "123456789", "UEI000000001", 2021, 60_000_000);

        insert_submission(&conn, &submission).unwrap();

        assert_eq!(get_submission(&conn, &submission.report_id).unwrap(), Some(submission));
        assert_eq!(get_submission(&conn, "missing").unwrap(), None);
    }

    #[test]
    fn test_duplicate_report_id_rejected() {
        let conn = test_db();
        let submission = Submission::new("R1", "123456789", "UEI1", 2021, 1);

        insert_submission(&conn, &submission).unwrap();
        assert!(insert_submission(&conn, &submission).is_err());
    }

    #[test]
    fn test_award_lines_keep_order() {
        let conn = test_db();
        let lines = vec![
            AwardLine::new("93", 5, false),
            AwardLine::new("10", 7, true),
            AwardLine::new("93", 1, true),
        ];

        assert_eq!(insert_award_lines(&conn, "R1", &lines).unwrap(), 3);
        assert_eq!(get_award_lines(&conn, "R1").unwrap(), lines);
        assert!(get_award_lines(&conn, "R2").unwrap().is_empty());
    }

    #[test]
    fn test_latest_cognizant_skips_empty_and_picks_latest_year() {
        let conn = test_db();
        insert_submission(&conn, &with_agency(Submission::new("A", "E1", "U1", 2019, 1), "10")).unwrap();
        insert_submission(&conn, &with_agency(Submission::new("B", "E1", "U1", 2021, 1), "93")).unwrap();
        insert_submission(&conn, &with_agency(Submission::new("C", "E1", "U1", 2022, 1), "")).unwrap();
        insert_submission(&conn, &Submission::new("D", "E1", "U1", 2023, 1)).unwrap();
        insert_submission(&conn, &with_agency(Submission::new("E", "E1", "U2", 2022, 1), "84")).unwrap();

        assert_eq!(
            latest_cognizant_by_uei(&conn, "E1", "U1", 2019, 2023).unwrap(),
            Some("93".to_string())
        );
        assert_eq!(
            latest_cognizant_by_uei(&conn, "E1", "U1", 2019, 2020).unwrap(),
            Some("10".to_string())
        );
        assert_eq!(latest_cognizant_by_uei(&conn, "E1", "U1", 2024, 2026).unwrap(), None);
    }

    #[test]
    fn test_latest_cognizant_by_legacy_key() {
        let conn = test_db();
        let mut legacy = with_agency(Submission::new("2019-06-CENSUS-0000123456", "E1", "", 2019, 1), "15");
        legacy.legacy_id = Some("2019-06-CENSUS-0000123456".to_string());
        legacy.data_source = "CENSUS".to_string();
        insert_submission(&conn, &legacy).unwrap();

        assert_eq!(
            latest_cognizant_by_legacy_key(&conn, "E1", "123456", 2019, 2023).unwrap(),
            Some("15".to_string())
        );
        assert_eq!(latest_cognizant_by_legacy_key(&conn, "E2", "123456", 2019, 2023).unwrap(), None);
        assert_eq!(latest_cognizant_by_legacy_key(&conn, "E1", "999999", 2019, 2023).unwrap(), None);
    }

    #[test]
    fn test_update_agencies_requires_existing_record() {
        let conn = test_db();
        insert_submission(&conn, &Submission::new("R1", "E1", "U1", 2023, 1)).unwrap();

        update_agencies(&conn, "R1", None, Some("15")).unwrap();
        let stored = get_submission(&conn, "R1").unwrap().unwrap();
        assert_eq!(stored.oversight_agency, Some("15".to_string()));
        assert_eq!(stored.cognizant_agency, None);

        assert!(update_agencies(&conn, "missing", Some("10"), None).is_err());
    }

    #[test]
    fn test_import_history_from_csv() {
        let conn = test_db();

        let mut submissions_csv = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            submissions_csv,
            "report_id,auditee_ein,auditee_uei,audit_year,total_amount_expended,cognizant_agency,oversight_agency,legacy_id,data_source"
        )
        .unwrap();
        writeln!(submissions_csv, "R2019,E1,U1,2019,60000000,10,,,CENSUS").unwrap();
        writeln!(submissions_csv, "R2020,E1,U1,2020,70000000,,,,GSAFAC").unwrap();

        let mut awards_csv = tempfile::NamedTempFile::new().unwrap();
        writeln!(awards_csv, "report_id,line_number,federal_agency_prefix,amount_expended,is_direct").unwrap();
        writeln!(awards_csv, "R2019,0,10,60000000,true").unwrap();

        let submissions: Vec<Submission> = load_csv(submissions_csv.path()).unwrap();
        let award_lines: Vec<AwardLineRow> = load_csv(awards_csv.path()).unwrap();

        let summary = import_history(&conn, &submissions, &award_lines, &[]).unwrap();

        assert_eq!(summary.submissions, 2);
        assert_eq!(summary.award_lines, 1);
        assert_eq!(
            get_submission(&conn, "R2019").unwrap().unwrap().cognizant_agency,
            Some("10".to_string())
        );
        assert_eq!(get_submission(&conn, "R2020").unwrap().unwrap().cognizant_agency, None);
        assert_eq!(get_award_lines(&conn, "R2019").unwrap().len(), 1);
    }

    #[test]
    fn test_import_history_is_all_or_nothing() {
        let conn = test_db();
        let submissions = vec![
            Submission::new("R1", "E1", "U1", 2019, 1),
            Submission::new("R2", "E1", "U1", 2020, 1),
            Submission::new("R1", "E1", "U1", 2021, 1),
        ];

        assert!(import_history(&conn, &submissions, &[], &[]).is_err());
        assert_eq!(get_submission(&conn, "R1").unwrap(), None);
        assert_eq!(get_submission(&conn, "R2").unwrap(), None);
    }

    #[test]
    fn test_unidentified_subject_matches_nothing() {
        let conn = test_db();
        insert_submission(&conn, &with_agency(Submission::new("A", "", "", 2021, 1), "10")).unwrap();
        insert_submission(&conn, &Submission::new("B", "", "", 2019, 1)).unwrap();

        assert_eq!(latest_cognizant_by_uei(&conn, "", "", 2019, 2023).unwrap(), None);
        assert!(find_submissions_for_year(&conn, "", "", 2019).unwrap().is_empty());

        // An ein alone still identifies the subject
        insert_submission(&conn, &with_agency(Submission::new("C", "E1", "", 2020, 1), "84")).unwrap();
        assert_eq!(
            latest_cognizant_by_uei(&conn, "E1", "", 2019, 2023).unwrap(),
            Some("84".to_string())
        );
    }

    #[test]
    fn test_blank_legacy_key_matches_nothing() {
        let conn = test_db();
        let mut legacy = with_agency(Submission::new("2019-06-CENSUS-0000999999", "E1", "", 2019, 1), "84");
        legacy.legacy_id = Some("2019-06-CENSUS-0000999999".to_string());
        insert_submission(&conn, &legacy).unwrap();

        assert_eq!(latest_cognizant_by_legacy_key(&conn, "E1", "", 2019, 2023).unwrap(), None);
        assert_eq!(latest_cognizant_by_legacy_key(&conn, "E1", "  ", 2019, 2023).unwrap(), None);
    }

    #[test]
    fn test_load_csv_missing_file() {
        let result: Result<Vec<Submission>> = load_csv(Path::new("/nonexistent/history.csv"));
        assert!(result.is_err());
    }
}
