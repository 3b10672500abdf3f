//! # Built-in Fact Resolvers

use std::sync::Arc;

use tracing::{debug, warn};

use crate::rule::{FactFinder, FactMap, FactQuery, FactValue, FinderFn, ResolveError};

use super::errors::AchievementError;
use super::model::USER_ACC_RUN_DISTANCE;
use super::store::{MilestoneRepository, RunRepository};

/// Resolver for `user_acc_run_distance`: meters run inside the milestone
/// active at the query time. A failing sum counts as zero.
pub fn run_distance_finder(
    milestones: Arc<dyn MilestoneRepository>,
    runs: Arc<dyn RunRepository>,
) -> FinderFn {
    Arc::new(
        move |facts: &mut FactMap, query: &FactQuery| -> Result<(), ResolveError> {
            let milestone = milestones
                .current(query.at)?
                .ok_or_else(|| AchievementError::NotFound(format!("milestone at {}", query.at)))?;

            let total = match runs.sum_distance(
                &query.user_id,
                milestone.period_start,
                milestone.period_end,
            ) {
                Ok(total) => total,
                Err(e) => {
                    warn!(user_id = %query.user_id, error = %e, "Run distance sum failed, using 0");
                    0
                }
            };

            debug!(user_id = %query.user_id, milestone_id = %milestone.id, total, "Resolved run distance");
            facts.set(USER_ACC_RUN_DISTANCE, &FactValue::Int(total))?;
            Ok(())
        },
    )
}

/// Finder registry with the built-in resolvers registered
pub fn default_fact_finder(
    milestones: Arc<dyn MilestoneRepository>,
    runs: Arc<dyn RunRepository>,
) -> FactFinder {
    FactFinder::with_finders([(
        USER_ACC_RUN_DISTANCE,
        run_distance_finder(milestones, runs),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::achievement::errors::AchievementResult;
    use crate::achievement::memory::{MemoryMilestoneRepository, MemoryRunRepository};
    use crate::achievement::model::{Milestone, MilestoneStatus, RunSession};
    use crate::rule::{FactParam, IntParam, RuleError};

    #[derive(Debug)]
    struct BrokenRuns;

    impl RunRepository for BrokenRuns {
        fn sum_distance(
            &self,
            _: &str,
            _: chrono::DateTime<Utc>,
            _: chrono::DateTime<Utc>,
        ) -> AchievementResult<i64> {
            Err(AchievementError::Store("connection reset".into()))
        }
    }

    fn milestones() -> Arc<MemoryMilestoneRepository> {
        let repo = MemoryMilestoneRepository::new();
        repo.put_milestone(Milestone {
            id: "m1".into(),
            name: "2020".into(),
            period_start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            period_end: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            period_tz: 0,
            status: MilestoneStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        })
        .unwrap();
        Arc::new(repo)
    }

    fn required() -> Vec<Box<dyn FactParam>> {
        vec![Box::new(IntParam::named(USER_ACC_RUN_DISTANCE))]
    }

    #[test]
    fn test_run_distance_sums_milestone_period() {
        let runs = Arc::new(MemoryRunRepository::new());
        for (distance, month) in [(10000, 2), (12180, 5)] {
            runs.record(RunSession {
                user_id: "u1".into(),
                distance,
                started_at: Utc.with_ymd_and_hms(2020, month, 1, 0, 0, 0).unwrap(),
            })
            .unwrap();
        }

        let finder = default_fact_finder(milestones(), runs);
        let mut facts = FactMap::from_params(required());
        let at = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
        finder
            .find_facts(&mut facts, &required(), &FactQuery::new("u1", at))
            .unwrap();

        assert_eq!(facts.get_int(USER_ACC_RUN_DISTANCE).unwrap(), 22180);
    }

    #[test]
    fn test_failing_sum_counts_as_zero() {
        let finder = default_fact_finder(milestones(), Arc::new(BrokenRuns));
        let mut facts = FactMap::from_params(required());
        let at = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
        finder
            .find_facts(&mut facts, &required(), &FactQuery::new("u1", at))
            .unwrap();

        assert_eq!(facts.get_int(USER_ACC_RUN_DISTANCE).unwrap(), 0);
    }

    #[test]
    fn test_no_milestone_fails_resolution() {
        let finder = default_fact_finder(milestones(), Arc::new(MemoryRunRepository::new()));
        let mut facts = FactMap::from_params(required());
        let at = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let err = finder
            .find_facts(&mut facts, &required(), &FactQuery::new("u1", at))
            .unwrap_err();

        assert!(matches!(err, RuleError::FinderFailed { .. }));
    }
}
