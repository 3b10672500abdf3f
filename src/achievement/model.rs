//! # Achievement Models
//!
//! Milestones, challenges and the per-user achievement rows, plus the
//! request/response shapes exposed to the outer request layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::rule::Rule;

/// Fact holding the reward a challenge rule produces
pub const CREDIT_FACT: &str = "credit";

/// Fact holding the user's accumulated run distance in meters
pub const USER_ACC_RUN_DISTANCE: &str = "user_acc_run_distance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Draft,
    Active,
    Ended,
}

/// A reward period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub name: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Offset from UTC in seconds
    #[serde(default)]
    pub period_tz: i32,
    pub status: MilestoneStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Milestone {
    /// Whether `at` falls inside [period_start, period_end)
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.period_start <= at && at < self.period_end
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.status == MilestoneStatus::Active && self.contains(at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Draft,
    Active,
    Ended,
}

/// A rule-backed goal inside a milestone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub milestone_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub level: i32,
    #[serde(default)]
    pub sort: i32,
    pub status: ChallengeStatus,
    #[serde(rename = "rules")]
    pub rule: Rule,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Challenge {
    /// Evaluation order key
    pub fn order_key(&self) -> (i32, i32) {
        (self.level, self.sort)
    }

    /// Reward advertised by the rule's `credit` action, 0 when absent
    pub fn reward_value(&self) -> i64 {
        let Some(action) = self.rule.actions.find_by_target_name(CREDIT_FACT) else {
            return 0;
        };
        match action.value() {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}

fn default_version() -> u32 {
    1
}

/// Sort challenges into evaluation order
pub fn sort_challenges(challenges: &mut [Challenge]) {
    challenges.sort_by_key(Challenge::order_key);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserChallengeStatus {
    /// Progress row written ahead of achievement
    InProgress,
    Achieved,
    RewardClaimed,
}

impl UserChallengeStatus {
    /// Achieved or claimed rows are excluded from evaluation
    pub fn is_accomplished(&self) -> bool {
        matches!(
            self,
            UserChallengeStatus::Achieved | UserChallengeStatus::RewardClaimed
        )
    }
}

/// A user's achievement of one challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserChallenge {
    pub id: Uuid,
    pub user_id: String,
    pub milestone_id: String,
    pub milestone_snapshot: Value,
    pub milestone_version: u32,
    pub challenge_id: String,
    pub challenge_snapshot: Value,
    pub challenge_version: u32,
    pub challenge_result_snapshot: Value,
    /// Pending ledger transaction holding the reward
    pub reward_ref_id: Uuid,
    pub reward_value: f64,
    pub status: UserChallengeStatus,
    pub updated_at: DateTime<Utc>,
}

/// Changed fields of a user challenge
#[derive(Debug, Clone, PartialEq)]
pub struct UserChallengeChanges {
    pub status: Option<UserChallengeStatus>,
    pub reward_ref_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl UserChallengeChanges {
    /// Fields of `new` that differ from `old`; None when nothing but the
    /// timestamp changed
    pub fn diff(old: &UserChallenge, new: &UserChallenge) -> Option<Self> {
        let changes = Self {
            status: (old.status != new.status).then_some(new.status),
            reward_ref_id: (old.reward_ref_id != new.reward_ref_id).then_some(new.reward_ref_id),
            updated_at: new.updated_at,
        };

        if changes.status.is_none() && changes.reward_ref_id.is_none() {
            None
        } else {
            Some(changes)
        }
    }

    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.status.is_some() {
            fields.push("status");
        }
        if self.reward_ref_id.is_some() {
            fields.push("reward_ref_id");
        }
        fields.push("updated_at");
        fields
    }

    pub fn apply(&self, row: &mut UserChallenge) {
        if let Some(status) = self.status {
            row.status = status;
        }
        if let Some(reward_ref_id) = self.reward_ref_id {
            row.reward_ref_id = reward_ref_id;
        }
        row.updated_at = self.updated_at;
    }
}

/// One recorded run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    pub user_id: String,
    /// Meters
    pub distance: i64,
    pub started_at: DateTime<Utc>,
}

// ==================
// Requests / Responses
// ==================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAchievementReq {
    pub user_id: String,
    /// Evaluation time, now when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl CheckAchievementReq {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AchievementResp {
    pub credit_reward: i64,
    /// Challenges achieved in this pass, in evaluation order
    pub achieved: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResp {
    pub status: UserChallengeStatus,
    pub trx_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MilestoneResp {
    pub milestone: Option<CurrentMilestoneResp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMilestoneResp {
    pub id: String,
    pub name: String,
    /// Unix seconds
    pub period_start: i64,
    pub period_end: i64,
    pub period_tz_offset: i32,
    pub status: MilestoneStatus,
    pub challenges: Vec<MilestoneChallengeResp>,
}

/// Per-user view of a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeProgress {
    Open,
    InProgress,
    Achieved,
    RewardClaimed,
    Ended,
}

impl ChallengeProgress {
    pub fn resolve(challenge: ChallengeStatus, user: Option<UserChallengeStatus>) -> Self {
        match (user, challenge) {
            (Some(UserChallengeStatus::RewardClaimed), _) => ChallengeProgress::RewardClaimed,
            (Some(UserChallengeStatus::Achieved), _) => ChallengeProgress::Achieved,
            (_, ChallengeStatus::Ended) => ChallengeProgress::Ended,
            (Some(UserChallengeStatus::InProgress), _) => ChallengeProgress::InProgress,
            _ => ChallengeProgress::Open,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneChallengeResp {
    pub id: String,
    pub name: String,
    pub reward: ChallengeRewardResp,
    pub status: ChallengeProgress,
    /// Unix seconds
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRewardResp {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: i64,
    pub currency: String,
}

impl ChallengeRewardResp {
    pub fn credit(value: i64) -> Self {
        Self {
            kind: "Credit".to_string(),
            value,
            currency: "dB".to_string(),
        }
    }
}
