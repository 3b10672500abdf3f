//! # Achievement Trigger
//!
//! Decouples "a run was recorded" from evaluating the user's challenges.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::achievement::{AchievementError, AchievementService, CheckAchievementReq};

use super::errors::{TriggerError, TriggerResult};
use super::topic::{spawn_topic, HandlerError, Publisher, TopicHandler, WorkerStats};

pub const CHECK_ACHIEVED_CHALLENGE: &str = "check_achieved_challenge";

/// A user activity that may complete challenges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub user_id: String,
    /// When the activity happened; evaluation time when absent
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl ActivityEvent {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            occurred_at: None,
        }
    }
}

impl From<ActivityEvent> for CheckAchievementReq {
    fn from(event: ActivityEvent) -> Self {
        CheckAchievementReq {
            user_id: event.user_id,
            timestamp: event.occurred_at,
        }
    }
}

impl TopicHandler<CheckAchievementReq> for AchievementService {
    fn handle(&self, req: CheckAchievementReq) -> Result<(), HandlerError> {
        match self.check_achievement(&req) {
            Ok(resp) => {
                info!(
                    user_id = %req.user_id,
                    credit_reward = resp.credit_reward,
                    "Async achievement check done"
                );
                Ok(())
            }
            // Nothing left to evaluate is not a failure
            Err(AchievementError::NotFound(reason)) => {
                debug!(user_id = %req.user_id, reason = %reason, "No achievement to check");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Publishing side of the achievement check topic
#[derive(Debug, Clone)]
pub struct AchievementTrigger {
    publisher: Publisher<CheckAchievementReq>,
}

impl AchievementTrigger {
    /// Start the achievement worker on the current runtime
    pub fn spawn(
        service: Arc<AchievementService>,
        capacity: usize,
    ) -> (Self, JoinHandle<WorkerStats>) {
        let (publisher, worker) = spawn_topic(CHECK_ACHIEVED_CHALLENGE, capacity, service);
        (Self { publisher }, worker)
    }

    /// Queue an achievement check; returns before the check runs
    pub fn trigger_achievement_check(&self, event: ActivityEvent) -> TriggerResult<()> {
        if event.user_id.is_empty() {
            return Err(TriggerError::InvalidEvent("user_id is required".into()));
        }
        self.publisher.publish(event.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::achievement::{
        Challenge, ChallengeStatus, MemoryMilestoneRepository, MemoryRunRepository,
        Milestone, MilestoneRepository, MilestoneStatus, RunSession, StaticSubscriptions,
        UserChallengeStatus,
    };
    use crate::config::RewardsConfig;
    use crate::ledger::{CreditLedger, MemoryLedgerStore};
    use crate::rule::Rule;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_triggered_check_records_achievement() {
        let milestones = Arc::new(MemoryMilestoneRepository::new());
        milestones
            .put_milestone(Milestone {
                id: "m1".into(),
                name: "2020".into(),
                period_start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                period_end: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
                period_tz: 0,
                status: MilestoneStatus::Active,
                created_at: at(),
                updated_at: at(),
                version: 1,
            })
            .unwrap();
        milestones
            .put_challenge(Challenge {
                id: "c1".into(),
                milestone_id: "m1".into(),
                title: "5K".into(),
                description: String::new(),
                level: 1,
                sort: 0,
                status: ChallengeStatus::Active,
                rule: Rule::from_json(
                    r#"{
                        "conditions": [{"type": "int", "options": {"param": "user_acc_run_distance", "operator": "gte", "ref_value": 5000}}],
                        "actions": [{"type": "add", "options": {"target": "credit", "value": 1, "value_type": "int"}}]
                    }"#,
                )
                .unwrap(),
                created_at: at(),
                updated_at: at(),
                version: 1,
            })
            .unwrap();

        let runs = Arc::new(MemoryRunRepository::new());
        runs.record(RunSession {
            user_id: "u1".into(),
            distance: 6000,
            started_at: at(),
        })
        .unwrap();

        let service = Arc::new(AchievementService::new(
            milestones.clone(),
            runs,
            Arc::new(StaticSubscriptions::new()),
            CreditLedger::new(Arc::new(MemoryLedgerStore::new())),
            RewardsConfig::default(),
        ));

        let (trigger, worker) = AchievementTrigger::spawn(service, 8);
        let event = ActivityEvent {
            user_id: "u1".into(),
            occurred_at: Some(at()),
        };
        trigger.trigger_achievement_check(event.clone()).unwrap();
        // Second check finds nothing open and is not counted as a failure
        trigger.trigger_achievement_check(event).unwrap();
        assert!(matches!(
            trigger.trigger_achievement_check(ActivityEvent::new("")),
            Err(TriggerError::InvalidEvent(_))
        ));
        drop(trigger);

        let stats = worker.await.unwrap();
        assert_eq!(stats.handled, 2);
        assert_eq!(stats.failed, 0);

        let row = milestones.find_user_challenge("u1", "c1").unwrap().unwrap();
        assert_eq!(row.status, UserChallengeStatus::Achieved);
    }
}
