// Cognizant/Oversight Agency Assignment - Core Library
// Picks one federal agency per audit submission and keeps cognizant
// assignments stable across each baseline window

pub mod config;
pub mod awards;
pub mod aggregation;
pub mod resolver;
pub mod db;
pub mod historical;
pub mod classifier;
pub mod baseline;
pub mod recorder;

// Re-export commonly used types
pub use config::AssignmentConfig;
pub use awards::{AwardLine, AwardParseError, AwardSet, SubjectIdentity};
pub use aggregation::{aggregate, AgencyAggregate, AgencyTotals};
pub use resolver::AgencyResolver;
pub use db::{
    Submission, AwardLineRow, LegacyKeyRow, ImportSummary,
    setup_database, insert_submission, insert_award_lines, insert_legacy_key,
    get_submission, get_award_lines, load_csv, import_history,
};
pub use historical::HistoricalResolver;
pub use classifier::{AgencyAssignment, AssignmentBasis, CognizanceClassifier};
pub use baseline::{BaselineCache, BaselineRecord, BaselineUpdate};
pub use recorder::{
    AssignmentHistoryEntry, AssignmentKind, AssignmentRecorder, assign_and_record,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
