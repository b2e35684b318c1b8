// 📥 Intake Boundary - Typed award data
// Loosely-typed intake JSON becomes AwardSet here, validated once

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// CORE TYPES
// ============================================================================

/// One federal award line, as reported on the submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardLine {
    /// Two-digit federal agency prefix ("10", "84", ...)
    pub agency_prefix: String,

    /// Amount expended (never negative)
    pub amount_expended: i64,

    /// Received directly from the funding agency
    pub is_direct: bool,
}

impl AwardLine {
    pub fn new(agency_prefix: &str, amount_expended: i64, is_direct: bool) -> Self {
        AwardLine {
            agency_prefix: agency_prefix.to_string(),
            amount_expended,
            is_direct,
        }
    }
}

/// All awards of one submission. Line order drives tie-breaking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardSet {
    pub total_amount_expended: i64,
    pub lines: Vec<AwardLine>,
}

impl AwardSet {
    pub fn new(total_amount_expended: i64, lines: Vec<AwardLine>) -> Self {
        AwardSet {
            total_amount_expended,
            lines,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Who the assignment is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectIdentity {
    pub ein: String,
    pub uei: String,
    pub audit_year: i32,
    pub report_id: String,

    /// Per-submission key from before ein/uei became canonical
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_key: Option<String>,
}

impl SubjectIdentity {
    pub fn new(ein: &str, uei: &str, audit_year: i32, report_id: &str) -> Self {
        SubjectIdentity {
            ein: ein.to_string(),
            uei: uei.to_string(),
            audit_year,
            report_id: report_id.to_string(),
            legacy_key: None,
        }
    }
}

// ============================================================================
// PARSE ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AwardParseError {
    #[error("malformed award document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("total_amount_expended must be non-negative, got {0}")]
    NegativeTotal(i64),

    #[error("award {index}: federal_agency_prefix must be two digits, got {value:?}")]
    InvalidAgencyPrefix { index: usize, value: String },

    #[error("award {index}: amount_expended must be non-negative, got {amount}")]
    NegativeAmount { index: usize, amount: i64 },

    #[error("award {index}: is_direct must be \"Y\" or \"N\", got {value:?}")]
    InvalidDirectFlag { index: usize, value: String },
}

// ============================================================================
// INTAKE DOCUMENT SHAPE
// ============================================================================

#[derive(Debug, Deserialize)]
struct IntakeFederalAwards {
    total_amount_expended: i64,
    #[serde(default)]
    federal_awards: Vec<IntakeAward>,
}

#[derive(Debug, Deserialize)]
struct IntakeAward {
    program: IntakeProgram,
    direct_or_indirect_award: IntakeDirectness,
}

#[derive(Debug, Deserialize)]
struct IntakeProgram {
    federal_agency_prefix: String,
    amount_expended: i64,
}

#[derive(Debug, Deserialize)]
struct IntakeDirectness {
    is_direct: String,
}

impl AwardSet {
    /// Parse an intake award document
    pub fn from_intake_json(content: &str) -> Result<Self, AwardParseError> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_intake_value(&value)
    }

    /// Parse an already-decoded intake document, with or without the
    /// `FederalAwards` wrapper object
    pub fn from_intake_value(value: &Value) -> Result<Self, AwardParseError> {
        let inner = value.get("FederalAwards").unwrap_or(value);
        let intake = IntakeFederalAwards::deserialize(inner)?;

        if intake.total_amount_expended < 0 {
            return Err(AwardParseError::NegativeTotal(intake.total_amount_expended));
        }

        let lines = intake
            .federal_awards
            .into_iter()
            .enumerate()
            .map(|(index, award)| award.into_line(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AwardSet::new(intake.total_amount_expended, lines))
    }
}

impl IntakeAward {
    fn into_line(self, index: usize) -> Result<AwardLine, AwardParseError> {
        let prefix = self.program.federal_agency_prefix;
        if prefix.len() != 2 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AwardParseError::InvalidAgencyPrefix {
                index,
                value: prefix,
            });
        }

        if self.program.amount_expended < 0 {
            return Err(AwardParseError::NegativeAmount {
                index,
                amount: self.program.amount_expended,
            });
        }

        let is_direct = match self.direct_or_indirect_award.is_direct.as_str() {
            "Y" => true,
            "N" => false,
            other => {
                return Err(AwardParseError::InvalidDirectFlag {
                    index,
                    value: other.to_string(),
                })
            }
        };

        Ok(AwardLine {
            agency_prefix: prefix,
            amount_expended: self.program.amount_expended,
            is_direct,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
