//! # In-Memory Repositories
//!
//! Back the CLI simulator and the tests. Each repository guards its state
//! with one `RwLock`.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::{AchievementError, AchievementResult};
use super::model::{
    sort_challenges, Challenge, ChallengeStatus, Milestone, MilestoneStatus, RunSession,
    UserChallenge, UserChallengeChanges, UserChallengeStatus,
};
use super::store::{MilestoneRepository, RunRepository, SubscriptionDirectory};

fn poisoned<T>(_: T) -> AchievementError {
    AchievementError::Internal("Lock poisoned".into())
}

#[derive(Debug, Default)]
struct MilestoneState {
    milestones: HashMap<String, Milestone>,
    challenges: HashMap<String, Challenge>,
    user_challenges: Vec<UserChallenge>,
}

#[derive(Debug, Default)]
pub struct MemoryMilestoneRepository {
    state: RwLock<MilestoneState>,
}

impl MemoryMilestoneRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AchievementResult<RwLockReadGuard<'_, MilestoneState>> {
        self.state.read().map_err(poisoned)
    }

    fn write(&self) -> AchievementResult<RwLockWriteGuard<'_, MilestoneState>> {
        self.state.write().map_err(poisoned)
    }

    /// Insert or replace a milestone
    pub fn put_milestone(&self, milestone: Milestone) -> AchievementResult<()> {
        self.write()?
            .milestones
            .insert(milestone.id.clone(), milestone);
        Ok(())
    }

    /// Insert or replace a challenge
    pub fn put_challenge(&self, challenge: Challenge) -> AchievementResult<()> {
        self.write()?
            .challenges
            .insert(challenge.id.clone(), challenge);
        Ok(())
    }
}

impl MilestoneRepository for MemoryMilestoneRepository {
    fn current(&self, at: DateTime<Utc>) -> AchievementResult<Option<Milestone>> {
        let state = self.read()?;
        let mut active: Vec<&Milestone> = state
            .milestones
            .values()
            .filter(|m| m.is_active_at(at))
            .collect();
        // Latest start wins when periods overlap
        active.sort_by_key(|m| std::cmp::Reverse(m.period_start));
        Ok(active.first().map(|m| (*m).clone()))
    }

    fn find_milestone(&self, id: &str) -> AchievementResult<Option<Milestone>> {
        Ok(self.read()?.milestones.get(id).cloned())
    }

    fn find_challenge(&self, id: &str) -> AchievementResult<Option<Challenge>> {
        Ok(self.read()?.challenges.get(id).cloned())
    }

    fn find_current_challenges(&self) -> AchievementResult<Vec<Challenge>> {
        let state = self.read()?;
        let mut challenges: Vec<Challenge> = state
            .challenges
            .values()
            .filter(|c| c.status == ChallengeStatus::Active)
            .filter(|c| {
                state
                    .milestones
                    .get(&c.milestone_id)
                    .is_some_and(|m| m.status == MilestoneStatus::Active)
            })
            .cloned()
            .collect();
        sort_challenges(&mut challenges);
        Ok(challenges)
    }

    fn milestone_challenges(&self, milestone_id: &str) -> AchievementResult<Vec<Challenge>> {
        let state = self.read()?;
        let mut challenges: Vec<Challenge> = state
            .challenges
            .values()
            .filter(|c| c.milestone_id == milestone_id)
            .cloned()
            .collect();
        sort_challenges(&mut challenges);
        Ok(challenges)
    }

    fn find_unaccomplished_challenges(
        &self,
        user_id: &str,
        milestone_id: &str,
    ) -> AchievementResult<Vec<Challenge>> {
        let state = self.read()?;
        let accomplished: HashSet<&str> = state
            .user_challenges
            .iter()
            .filter(|uc| uc.user_id == user_id && uc.status.is_accomplished())
            .map(|uc| uc.challenge_id.as_str())
            .collect();

        let mut challenges: Vec<Challenge> = state
            .challenges
            .values()
            .filter(|c| c.milestone_id == milestone_id && c.status == ChallengeStatus::Active)
            .filter(|c| !accomplished.contains(c.id.as_str()))
            .cloned()
            .collect();
        sort_challenges(&mut challenges);
        Ok(challenges)
    }

    fn find_user_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> AchievementResult<Option<UserChallenge>> {
        Ok(self
            .read()?
            .user_challenges
            .iter()
            .find(|uc| uc.user_id == user_id && uc.challenge_id == challenge_id)
            .cloned())
    }

    fn user_challenges(
        &self,
        user_id: &str,
        milestone_id: &str,
    ) -> AchievementResult<Vec<UserChallenge>> {
        Ok(self
            .read()?
            .user_challenges
            .iter()
            .filter(|uc| uc.user_id == user_id && uc.milestone_id == milestone_id)
            .cloned()
            .collect())
    }

    fn insert_user_challenge(&self, row: UserChallenge) -> AchievementResult<()> {
        let mut state = self.write()?;
        let existing = state
            .user_challenges
            .iter()
            .position(|uc| uc.user_id == row.user_id && uc.challenge_id == row.challenge_id);

        match existing {
            Some(idx) if state.user_challenges[idx].status == UserChallengeStatus::InProgress => {
                state.user_challenges[idx] = row;
            }
            Some(_) => {
                return Err(AchievementError::Duplicate(format!(
                    "user={} challenge={}",
                    row.user_id, row.challenge_id
                )));
            }
            None => state.user_challenges.push(row),
        }
        Ok(())
    }

    fn update_user_challenge(
        &self,
        id: Uuid,
        expected: UserChallengeStatus,
        changes: &UserChallengeChanges,
    ) -> AchievementResult<()> {
        let mut state = self.write()?;
        let row = state
            .user_challenges
            .iter_mut()
            .find(|uc| uc.id == id)
            .ok_or_else(|| AchievementError::NotFound(format!("user challenge {}", id)))?;
        match row.status {
            status if status == expected => {}
            UserChallengeStatus::RewardClaimed => {
                return Err(AchievementError::AlreadyClaimed(row.challenge_id.clone()))
            }
            _ => return Err(AchievementError::NotYetAchieved(row.challenge_id.clone())),
        }
        changes.apply(row);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRunRepository {
    sessions: RwLock<Vec<RunSession>>,
}

impl MemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, session: RunSession) -> AchievementResult<()> {
        self.sessions.write().map_err(poisoned)?.push(session);
        Ok(())
    }
}

impl RunRepository for MemoryRunRepository {
    fn sum_distance(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AchievementResult<i64> {
        self.sessions
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|s| s.user_id == user_id && start <= s.started_at && s.started_at < end)
            .try_fold(0i64, |total, s| total.checked_add(s.distance))
            .ok_or_else(|| AchievementError::Store(format!("distance overflow for user {}", user_id)))
    }
}

/// Premium membership as a plain set of user ids
#[derive(Debug, Default)]
pub struct StaticSubscriptions {
    premium: RwLock<HashSet<String>>,
}

impl StaticSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_premium(&self, user_id: &str, premium: bool) -> AchievementResult<()> {
        let mut set = self.premium.write().map_err(poisoned)?;
        if premium {
            set.insert(user_id.to_string());
        } else {
            set.remove(user_id);
        }
        Ok(())
    }
}

impl SubscriptionDirectory for StaticSubscriptions {
    fn is_premium(&self, user_id: &str) -> AchievementResult<bool> {
        Ok(self.premium.read().map_err(poisoned)?.contains(user_id))
    }
}
