//! # Achievement Repositories
//!
//! Data-access contracts the evaluator depends on. Implementations own
//! their own transactions; every call is one logical unit of work.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::AchievementResult;
use super::model::{
    Challenge, Milestone, UserChallenge, UserChallengeChanges, UserChallengeStatus,
};

/// Milestones, challenges and user challenge rows
pub trait MilestoneRepository: Send + Sync + std::fmt::Debug {
    /// Active milestone whose period contains `at`
    fn current(&self, at: DateTime<Utc>) -> AchievementResult<Option<Milestone>>;

    fn find_milestone(&self, id: &str) -> AchievementResult<Option<Milestone>>;

    fn find_challenge(&self, id: &str) -> AchievementResult<Option<Challenge>>;

    /// Active challenges of active milestones, ordered by (level, sort)
    fn find_current_challenges(&self) -> AchievementResult<Vec<Challenge>>;

    /// All challenges of a milestone, ordered by (level, sort)
    fn milestone_challenges(&self, milestone_id: &str) -> AchievementResult<Vec<Challenge>>;

    /// Active challenges the user has not achieved or claimed yet,
    /// ordered by (level, sort)
    fn find_unaccomplished_challenges(
        &self,
        user_id: &str,
        milestone_id: &str,
    ) -> AchievementResult<Vec<Challenge>>;

    fn find_user_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> AchievementResult<Option<UserChallenge>>;

    fn user_challenges(
        &self,
        user_id: &str,
        milestone_id: &str,
    ) -> AchievementResult<Vec<UserChallenge>>;

    /// Insert a row. An in-progress row for the same (user, challenge) is
    /// replaced; any other existing row is a `Duplicate`.
    fn insert_user_challenge(&self, row: UserChallenge) -> AchievementResult<()>;

    /// Write only the changed fields of a row, provided it is still in
    /// `expected`. A row that moved on fails with the status error matching
    /// its current state.
    fn update_user_challenge(
        &self,
        id: Uuid,
        expected: UserChallengeStatus,
        changes: &UserChallengeChanges,
    ) -> AchievementResult<()>;
}

/// Recorded run sessions
pub trait RunRepository: Send + Sync + std::fmt::Debug {
    /// Total meters run by the user in [start, end)
    fn sum_distance(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AchievementResult<i64>;
}

/// Subscription lookups
pub trait SubscriptionDirectory: Send + Sync + std::fmt::Debug {
    fn is_premium(&self, user_id: &str) -> AchievementResult<bool>;
}
