// ➕ Award Aggregation - Per-agency totals in first-seen order
//
// Insertion order is part of the result: the resolver breaks ties by it.

use crate::awards::AwardLine;
use serde::{Deserialize, Serialize};

// ============================================================================
// ORDERED AGENCY TOTALS
// ============================================================================

/// Agency prefix → amount, iterated in the order each agency first appeared
///
/// Sums are kept in `i128` so any set of non-negative `i64` amounts adds up
/// without overflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyTotals {
    entries: Vec<(String, i128)>,
}

impl AgencyTotals {
    pub fn new() -> Self {
        AgencyTotals {
            entries: Vec::new(),
        }
    }

    /// Add to an agency's total; a new agency goes to the end
    pub fn add(&mut self, agency: &str, amount: i128) {
        match self.entries.iter_mut().find(|(a, _)| a == agency) {
            Some((_, total)) => *total += amount,
            None => self.entries.push((agency.to_string(), amount)),
        }
    }

    pub fn get(&self, agency: &str) -> Option<i128> {
        self.entries
            .iter()
            .find(|(a, _)| a == agency)
            .map(|(_, total)| *total)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i128)> {
        self.entries.iter().map(|(a, total)| (a.as_str(), *total))
    }

    /// Earliest-inserted entry
    pub fn first(&self) -> Option<(&str, i128)> {
        self.iter().next()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the entries equal to the maximum, in their original order
    pub fn prune_to_max(&self) -> AgencyTotals {
        let Some(max) = self.entries.iter().map(|(_, total)| *total).max() else {
            return AgencyTotals::new();
        };

        AgencyTotals {
            entries: self
                .entries
                .iter()
                .filter(|(_, total)| *total == max)
                .cloned()
                .collect(),
        }
    }
}

impl<'a> FromIterator<(&'a str, i128)> for AgencyTotals {
    fn from_iter<I: IntoIterator<Item = (&'a str, i128)>>(iter: I) -> Self {
        let mut totals = AgencyTotals::new();
        for (agency, amount) in iter {
            totals.add(agency, amount);
        }
        totals
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Totals per agency, over all lines and over direct lines only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgencyAggregate {
    pub total_by_agency: AgencyTotals,
    pub direct_by_agency: AgencyTotals,
}

pub fn aggregate(lines: &[AwardLine]) -> AgencyAggregate {
    let mut result = AgencyAggregate::default();

    for line in lines {
        result
            .total_by_agency
            .add(&line.agency_prefix, i128::from(line.amount_expended));

        if line.is_direct {
            result
                .direct_by_agency
                .add(&line.agency_prefix, i128::from(line.amount_expended));
        }
    }

    result
}

// ============================================================================
// TESTS
// ============================================================================
