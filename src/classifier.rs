// 🧭 Cognizance Classifier - Cognizant vs. oversight
//
// Above the threshold the subject gets a cognizant agency, preferring
// continuity from its baseline window; at or below it gets an oversight
// agency computed from this year's awards alone.

use anyhow::Result;
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::awards::{AwardSet, SubjectIdentity};
use crate::config::AssignmentConfig;
use crate::historical::HistoricalResolver;
use crate::resolver::AgencyResolver;

// ============================================================================
// ASSIGNMENT
// ============================================================================

/// How an assignment was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentBasis {
    /// No awards to decide on
    Undetermined,

    /// At or below the cognizance threshold
    Oversight,

    /// Carried over from the baseline window
    Historical,

    /// Computed from this submission's awards
    Computed,

    /// Set by an administrator
    Manual,
}

impl AssignmentBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentBasis::Undetermined => "undetermined",
            AssignmentBasis::Oversight => "oversight",
            AssignmentBasis::Historical => "historical",
            AssignmentBasis::Computed => "computed",
            AssignmentBasis::Manual => "manual",
        }
    }
}

/// Cognizant XOR oversight; neither means undetermined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyAssignment {
    pub subject: SubjectIdentity,
    pub cognizant_agency: Option<String>,
    pub oversight_agency: Option<String>,
    pub basis: AssignmentBasis,
}

impl AgencyAssignment {
    pub fn undetermined(subject: &SubjectIdentity) -> Self {
        AgencyAssignment {
            subject: subject.clone(),
            cognizant_agency: None,
            oversight_agency: None,
            basis: AssignmentBasis::Undetermined,
        }
    }

    pub fn oversight(subject: &SubjectIdentity, agency: Option<String>) -> Self {
        AgencyAssignment {
            subject: subject.clone(),
            cognizant_agency: None,
            oversight_agency: agency,
            basis: AssignmentBasis::Oversight,
        }
    }

    pub fn cognizant(subject: &SubjectIdentity, agency: Option<String>, basis: AssignmentBasis) -> Self {
        AgencyAssignment {
            subject: subject.clone(),
            cognizant_agency: agency,
            oversight_agency: None,
            basis,
        }
    }

    pub fn is_undetermined(&self) -> bool {
        self.cognizant_agency.is_none() && self.oversight_agency.is_none()
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct CognizanceClassifier<'a> {
    conn: &'a Connection,
    config: &'a AssignmentConfig,
}

impl<'a> CognizanceClassifier<'a> {
    pub fn new(conn: &'a Connection, config: &'a AssignmentConfig) -> Self {
        CognizanceClassifier { conn, config }
    }

    pub fn classify(&self, award_set: &AwardSet, subject: &SubjectIdentity) -> Result<AgencyAssignment> {
        if award_set.is_empty() {
            info!("{}: no federal awards, assignment undetermined", subject.report_id);
            return Ok(AgencyAssignment::undetermined(subject));
        }

        let candidate = AgencyResolver::new(self.config).resolve_award_set(award_set);

        if !self.config.is_cognizant_total(award_set.total_amount_expended) {
            info!("{}: oversight agency {:?}", subject.report_id, candidate);
            return Ok(AgencyAssignment::oversight(subject, candidate));
        }

        let assignment = match HistoricalResolver::new(self.conn, self.config).resolve(subject)? {
            Some(historical) => {
                AgencyAssignment::cognizant(subject, Some(historical), AssignmentBasis::Historical)
            }
            None => AgencyAssignment::cognizant(subject, candidate, AssignmentBasis::Computed),
        };

        info!(
            "{}: cognizant agency {:?} ({})",
            subject.report_id,
            assignment.cognizant_agency,
            assignment.basis.as_str()
        );

        Ok(assignment)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::awards::AwardLine;
    use crate::db::{insert_award_lines, insert_submission, setup_database, Submission};

    const EIN: &str = "987654321";
    const UEI: &str = "LJKDF7H4KG23";

    fn test_db() -> Connection {
        let _ = env_logger::builder().is_test(true).try_init();
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn subject(year: i32) -> SubjectIdentity {
        SubjectIdentity::new(EIN, UEI, year, &format!("{}-12-GSAFAC-0000000001", year))
    }

    #[test]
    fn test_empty_awards_undetermined() {
        let conn = test_db();
        let config = AssignmentConfig::default();

        let assignment = CognizanceClassifier::new(&conn, &config)
            .classify(&AwardSet::new(0, vec![]), &subject(2023))
            .unwrap();

        assert!(assignment.is_undetermined());
        assert_eq!(assignment.basis, AssignmentBasis::Undetermined);
    }

    #[test]
    fn test_scenario_a_cognizant_without_history() {
        let conn = test_db();
        let config = AssignmentConfig::default();
        let awards = AwardSet::new(
            52_000_200,
            vec![
                AwardLine::new("10", 40_000_000, false),
                AwardLine::new("10", 11_000_000, true),
            ],
        );

        let assignment = CognizanceClassifier::new(&conn, &config)
            .classify(&awards, &subject(2023))
            .unwrap();

        assert_eq!(assignment.cognizant_agency, Some("10".to_string()));
        assert_eq!(assignment.oversight_agency, None);
        assert_eq!(assignment.basis, AssignmentBasis::Computed);
    }

    #[test]
    fn test_scenario_b_oversight() {
        let conn = test_db();
        let config = AssignmentConfig::default();
        let awards = AwardSet::new(11_200_300, vec![AwardLine::new("15", 11_200_300, true)]);

        let assignment = CognizanceClassifier::new(&conn, &config)
            .classify(&awards, &subject(2023))
            .unwrap();

        assert_eq!(assignment.oversight_agency, Some("15".to_string()));
        assert_eq!(assignment.cognizant_agency, None);
    }

    #[test]
    fn test_threshold_boundary() {
        let conn = test_db();
        let config = AssignmentConfig::default();
        let classifier = CognizanceClassifier::new(&conn, &config);

        let at = AwardSet::new(50_000_000, vec![AwardLine::new("84", 50_000_000, true)]);
        let assignment = classifier.classify(&at, &subject(2023)).unwrap();
        assert_eq!(assignment.oversight_agency, Some("84".to_string()));
        assert_eq!(assignment.cognizant_agency, None);

        let above = AwardSet::new(50_000_001, vec![AwardLine::new("84", 50_000_001, true)]);
        let assignment = classifier.classify(&above, &subject(2023)).unwrap();
        assert_eq!(assignment.cognizant_agency, Some("84".to_string()));
        assert_eq!(assignment.oversight_agency, None);
    }

    #[test]
    fn test_history_beats_current_awards() {
        let conn = test_db();
        let config = AssignmentConfig::default();

        let mut earlier = Submission::new("2020-12-GSAFAC-0000000001", EIN, UEI, 2020, 60_000_000);
        earlier.cognizant_agency = Some("93".to_string());
        insert_submission(&conn, &earlier).unwrap();
        insert_award_lines(&conn, &earlier.report_id, &[AwardLine::new("93", 60_000_000, true)]).unwrap();

        let awards = AwardSet::new(90_000_000, vec![AwardLine::new("10", 90_000_000, true)]);
        let assignment = CognizanceClassifier::new(&conn, &config)
            .classify(&awards, &subject(2022))
            .unwrap();

        assert_eq!(assignment.cognizant_agency, Some("93".to_string()));
        assert_eq!(assignment.basis, AssignmentBasis::Historical);

        // Next window starts over
        let assignment = CognizanceClassifier::new(&conn, &config)
            .classify(&awards, &subject(2024))
            .unwrap();
        assert_eq!(assignment.cognizant_agency, Some("10".to_string()));
        assert_eq!(assignment.basis, AssignmentBasis::Computed);
    }

    #[test]
    fn test_oversight_ignores_history() {
        let conn = test_db();
        let config = AssignmentConfig::default();

        let mut earlier = Submission::new("2020-12-GSAFAC-0000000001", EIN, UEI, 2020, 60_000_000);
        earlier.cognizant_agency = Some("93".to_string());
        insert_submission(&conn, &earlier).unwrap();

        let awards = AwardSet::new(1_000_000, vec![AwardLine::new("10", 1_000_000, false)]);
        let assignment = CognizanceClassifier::new(&conn, &config)
            .classify(&awards, &subject(2022))
            .unwrap();

        assert_eq!(assignment.oversight_agency, Some("10".to_string()));
    }
}
