// 🎯 Agency Resolver - One agency from aggregated totals
//
// 1. Direct-award agencies at or above the configured share form a
//    tie-break pool scored by direct + total.
// 2. Highest score wins; ties go to the earliest agency.
// 3. Empty pool → highest overall total, same tie rule.

use crate::aggregation::{aggregate, AgencyAggregate, AgencyTotals};
use crate::awards::AwardSet;
use crate::config::AssignmentConfig;
use log::debug;

pub struct AgencyResolver<'a> {
    config: &'a AssignmentConfig,
}

impl<'a> AgencyResolver<'a> {
    pub fn new(config: &'a AssignmentConfig) -> Self {
        AgencyResolver { config }
    }

    pub fn resolve(
        &self,
        total_expended: i64,
        total_by_agency: &AgencyTotals,
        direct_by_agency: &AgencyTotals,
    ) -> Option<String> {
        let tie_breaker: AgencyTotals = direct_by_agency
            .iter()
            .filter(|(_, direct)| self.config.qualifies_as_direct(*direct, total_expended))
            .map(|(agency, direct)| {
                (agency, direct + total_by_agency.get(agency).unwrap_or(0))
            })
            .collect();

        if let Some((agency, score)) = tie_breaker.prune_to_max().first() {
            debug!("direct-award pool picked {} (score {})", agency, score);
            return Some(agency.to_string());
        }

        let picked = total_by_agency
            .prune_to_max()
            .first()
            .map(|(agency, _)| agency.to_string());
        debug!("largest total picked {:?}", picked);
        picked
    }

    /// Aggregate and resolve in one step
    pub fn resolve_award_set(&self, award_set: &AwardSet) -> Option<String> {
        let AgencyAggregate {
            total_by_agency,
            direct_by_agency,
        } = aggregate(&award_set.lines);

        self.resolve(
            award_set.total_amount_expended,
            &total_by_agency,
            &direct_by_agency,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
