//! # Achievement Evaluator
//!
//! Drives a user's challenges through `Unaccomplished -> Achieved ->
//! RewardClaimed`.
//!
//! One evaluation pass resolves the facts every pending challenge needs
//! once, then runs the challenges in (level, sort) order against that
//! shared fact map. The pass stops at the first challenge that yields no
//! credit, on the assumption that thresholds rise with level.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::RewardsConfig;
use crate::engine::{DataContext, Engine};
use crate::ledger::{CreditLedger, EntryType, PendingTrxOpt, SettleOpt, TrxStatus};
use crate::rule::{merge_params, FactFinder, FactMap, FactParam, FactQuery};

use super::compiler::{CompiledRule, RuleCache, RuleCompiler};
use super::errors::{AchievementError, AchievementResult};
use super::facts::default_fact_finder;
use super::model::{
    sort_challenges, AchievementResp, Challenge, ChallengeProgress, ChallengeRewardResp,
    CheckAchievementReq, ClaimResp, CurrentMilestoneResp, Milestone, MilestoneChallengeResp,
    MilestoneResp, UserChallenge, UserChallengeChanges, UserChallengeStatus, CREDIT_FACT,
    USER_ACC_RUN_DISTANCE,
};
use super::store::{MilestoneRepository, RunRepository, SubscriptionDirectory};

/// Input for recording one achieved challenge
#[derive(Debug, Clone)]
pub struct AddUserChallengeReq {
    pub user_id: String,
    pub challenge_id: String,
    pub reward_value: f64,
    pub reward_ref_id: Uuid,
    pub result_snapshot: Value,
}

#[derive(Debug)]
pub struct AchievementService {
    milestones: Arc<dyn MilestoneRepository>,
    subscriptions: Arc<dyn SubscriptionDirectory>,
    ledger: CreditLedger,
    finder: Arc<FactFinder>,
    cache: RuleCache,
    engine: Engine,
    config: RewardsConfig,
}

impl AchievementService {
    /// Service with the built-in fact resolvers
    pub fn new(
        milestones: Arc<dyn MilestoneRepository>,
        runs: Arc<dyn RunRepository>,
        subscriptions: Arc<dyn SubscriptionDirectory>,
        ledger: CreditLedger,
        config: RewardsConfig,
    ) -> Self {
        let finder = Arc::new(default_fact_finder(Arc::clone(&milestones), runs));
        Self::with_fact_finder(milestones, subscriptions, ledger, finder, config)
    }

    pub fn with_fact_finder(
        milestones: Arc<dyn MilestoneRepository>,
        subscriptions: Arc<dyn SubscriptionDirectory>,
        ledger: CreditLedger,
        finder: Arc<FactFinder>,
        config: RewardsConfig,
    ) -> Self {
        Self {
            milestones,
            subscriptions,
            ledger,
            finder,
            cache: RuleCache::new(RuleCompiler::new(config.rule_variable.clone())),
            engine: Engine::new(config.max_engine_cycles),
            config,
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn fact_finder(&self) -> &Arc<FactFinder> {
        &self.finder
    }

    pub fn rule_cache(&self) -> &RuleCache {
        &self.cache
    }

    /// Recompile every active challenge and publish the new cache
    pub fn reload_all(&self) -> AchievementResult<usize> {
        let challenges = self.milestones.find_current_challenges()?;
        self.cache.reload_all(&challenges)
    }

    /// Evaluate the user's open challenges and record the ones achieved
    pub fn check_achievement(&self, req: &CheckAchievementReq) -> AchievementResult<AchievementResp> {
        if req.user_id.is_empty() {
            return Err(AchievementError::Validation("user_id is required".into()));
        }
        let at = req.timestamp.unwrap_or_else(Utc::now);

        let milestone = self
            .milestones
            .current(at)?
            .ok_or_else(|| AchievementError::NotFound(format!("no active milestone at {}", at)))?;

        let mut challenges = self
            .milestones
            .find_unaccomplished_challenges(&req.user_id, &milestone.id)?;
        if challenges.is_empty() {
            return Err(AchievementError::NotFound(format!(
                "no open challenges for user {} in milestone {}",
                req.user_id, milestone.id
            )));
        }
        sort_challenges(&mut challenges);

        let multiplier = if self.subscriptions.is_premium(&req.user_id)? {
            self.config.premium_multiplier
        } else {
            1
        };

        let compiled: Vec<(Challenge, Arc<CompiledRule>)> = challenges
            .into_iter()
            .map(|c| self.cache.get_or_compile(&c).map(|rule| (c, rule)))
            .collect::<AchievementResult<_>>()?;

        let params = compiled
            .iter()
            .fold(Vec::<Box<dyn FactParam>>::new(), |acc, (_, rule)| {
                merge_params(acc, &rule.params)
            });
        let mut facts = FactMap::from_params(params.clone());
        self.finder
            .find_facts(&mut facts, &params, &FactQuery::new(&req.user_id, at))?;

        let mut resp = AchievementResp::default();
        for (challenge, rule) in &compiled {
            for target in &rule.targets {
                facts.assign(target.clone_box());
            }

            {
                let mut ctx = DataContext::new();
                ctx.bind(self.cache.compiler().variable(), &mut facts);
                self.engine.execute(&rule.knowledge_base, &mut ctx)?;
            }

            let reward = facts.get_int(CREDIT_FACT)?;
            if reward == 0 {
                debug!(
                    user_id = %req.user_id,
                    challenge_id = %challenge.id,
                    "Challenge not met, stopping evaluation"
                );
                break;
            }

            let reward = reward.checked_mul(multiplier).ok_or_else(|| {
                AchievementError::Internal(format!("reward overflow for challenge {}", challenge.id))
            })?;

            self.record_achievement(AddUserChallengeReq {
                user_id: req.user_id.clone(),
                challenge_id: challenge.id.clone(),
                reward_value: reward as f64,
                reward_ref_id: Uuid::new_v4(),
                result_snapshot: result_snapshot(&facts),
            })?;

            resp.credit_reward += reward;
            resp.achieved.push(challenge.id.clone());
        }

        info!(
            user_id = %req.user_id,
            milestone_id = %milestone.id,
            credit_reward = resp.credit_reward,
            achieved = resp.achieved.len(),
            "Achievement check finished"
        );
        Ok(resp)
    }

    /// Snapshot the challenge, open the pending reward transaction and
    /// insert the user challenge row.
    ///
    /// Nothing is left behind on failure: a ledger error writes no row, and
    /// a row that cannot be inserted cancels the transaction it was opened
    /// for.
    pub fn record_achievement(&self, req: AddUserChallengeReq) -> AchievementResult<UserChallenge> {
        let row = self.build_user_challenge(&req)?;
        if let Some(existing) = self
            .milestones
            .find_user_challenge(&req.user_id, &req.challenge_id)?
        {
            if existing.status.is_accomplished() {
                return Err(AchievementError::Duplicate(req.challenge_id.clone()));
            }
        }

        let wallet = self.ledger.get_or_create_wallet(&req.user_id)?;
        let now = Utc::now();
        self.ledger.insert_pending_trx(PendingTrxOpt {
            id: Some(req.reward_ref_id),
            wallet_id: wallet.id,
            amount: req.reward_value,
            entry_type: EntryType::Debit,
            notes: Some(format!("Reward from challenge {}", req.challenge_id)),
            expired_at: Some(now + self.config.claim_expiry()),
            timestamp: Some(now),
        })?;

        if let Err(err) = self.milestones.insert_user_challenge(row.clone()) {
            let reason = format!("User challenge for {} not recorded", req.challenge_id);
            if let Err(cancel) = self.ledger.cancel_pending_trx(req.reward_ref_id, &reason) {
                error!(
                    user_id = %req.user_id,
                    trx_id = %req.reward_ref_id,
                    error = %cancel,
                    "Pending reward left open after failed insert"
                );
            }
            return Err(err);
        }

        info!(
            user_id = %req.user_id,
            challenge_id = %req.challenge_id,
            trx_id = %req.reward_ref_id,
            reward = req.reward_value,
            "Challenge achieved"
        );
        Ok(row)
    }

    /// Insert an `Achieved` row carrying milestone and challenge snapshots
    pub fn add_user_challenge(&self, req: &AddUserChallengeReq) -> AchievementResult<UserChallenge> {
        let row = self.build_user_challenge(req)?;
        self.milestones.insert_user_challenge(row.clone())?;
        Ok(row)
    }

    fn build_user_challenge(&self, req: &AddUserChallengeReq) -> AchievementResult<UserChallenge> {
        if req.user_id.is_empty() {
            return Err(AchievementError::Validation("user_id is required".into()));
        }
        if req.challenge_id.is_empty() {
            return Err(AchievementError::Validation("challenge_id is required".into()));
        }

        let challenge = self
            .milestones
            .find_challenge(&req.challenge_id)?
            .ok_or_else(|| AchievementError::NotFound(format!("challenge {}", req.challenge_id)))?;
        let milestone = self
            .milestones
            .find_milestone(&challenge.milestone_id)?
            .ok_or_else(|| {
                AchievementError::NotFound(format!("milestone {}", challenge.milestone_id))
            })?;

        Ok(UserChallenge {
            id: Uuid::new_v4(),
            user_id: req.user_id.clone(),
            milestone_id: milestone.id.clone(),
            milestone_snapshot: snapshot(&milestone)?,
            milestone_version: milestone.version,
            challenge_id: challenge.id.clone(),
            challenge_snapshot: snapshot(&challenge)?,
            challenge_version: challenge.version,
            challenge_result_snapshot: req.result_snapshot.clone(),
            reward_ref_id: req.reward_ref_id,
            reward_value: req.reward_value,
            status: UserChallengeStatus::Achieved,
            updated_at: Utc::now(),
        })
    }

    /// Settle an achieved challenge's pending reward into the wallet.
    ///
    /// The row is moved to `RewardClaimed` first, guarded on `Achieved`, so
    /// two concurrent claims cannot both reach the ledger. A failed
    /// settlement moves the row back unless the reward turns out to be
    /// settled already.
    pub fn claim(&self, user_id: &str, challenge_id: &str) -> AchievementResult<ClaimResp> {
        if user_id.is_empty() {
            return Err(AchievementError::Validation("user_id is required".into()));
        }
        if challenge_id.is_empty() {
            return Err(AchievementError::Validation("challenge_id is required".into()));
        }

        let row = self
            .milestones
            .find_user_challenge(user_id, challenge_id)?
            .ok_or_else(|| AchievementError::NotFound(format!("user challenge {}", challenge_id)))?;

        match row.status {
            UserChallengeStatus::Achieved => {}
            UserChallengeStatus::RewardClaimed => {
                return Err(AchievementError::AlreadyClaimed(challenge_id.to_string()))
            }
            UserChallengeStatus::InProgress => {
                return Err(AchievementError::NotYetAchieved(challenge_id.to_string()))
            }
        }

        let now = Utc::now();
        let claimed = UserChallenge {
            status: UserChallengeStatus::RewardClaimed,
            updated_at: now,
            ..row.clone()
        };
        let changes = UserChallengeChanges::diff(&row, &claimed);
        if let Some(changes) = &changes {
            debug!(fields = ?changes.fields(), "Updating user challenge");
            self.milestones
                .update_user_challenge(row.id, UserChallengeStatus::Achieved, changes)?;
        }

        let settled = self.ledger.settle_pending_trx(SettleOpt {
            trx_id: row.reward_ref_id,
            notes: Some(format!("Claimed credit from challenge {}", challenge_id)),
            expired_at: Some(now + self.config.credit_expiry()),
            timestamp: Some(now),
        });
        let trx_id = match settled {
            Ok(trx_id) => trx_id,
            Err(err) => {
                if self.reward_settled(row.reward_ref_id)? {
                    return Err(AchievementError::AlreadyClaimed(challenge_id.to_string()));
                }
                if let Some(changes) = UserChallengeChanges::diff(&claimed, &row) {
                    if let Err(revert) = self.milestones.update_user_challenge(
                        row.id,
                        UserChallengeStatus::RewardClaimed,
                        &changes,
                    ) {
                        error!(
                            user_id,
                            challenge_id,
                            error = %revert,
                            "Claimed row not restored after failed settlement"
                        );
                    }
                }
                return Err(err.into());
            }
        };

        info!(user_id, challenge_id, trx_id = %trx_id, "Challenge reward claimed");
        Ok(ClaimResp {
            status: claimed.status,
            trx_id,
        })
    }

    fn reward_settled(&self, trx_id: Uuid) -> AchievementResult<bool> {
        let trx = self.ledger.store().find_trx(trx_id)?;
        Ok(matches!(trx, Some(t) if t.status == TrxStatus::Success))
    }

    /// Active milestone right now with the user's progress on it
    pub fn current_milestone(&self, user_id: &str) -> AchievementResult<MilestoneResp> {
        self.current_milestone_at(user_id, Utc::now())
    }

    pub fn current_milestone_at(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> AchievementResult<MilestoneResp> {
        let Some(milestone) = self.milestones.current(at)? else {
            return Ok(MilestoneResp { milestone: None });
        };

        let rows: HashMap<String, UserChallenge> = self
            .milestones
            .user_challenges(user_id, &milestone.id)?
            .into_iter()
            .map(|row| (row.challenge_id.clone(), row))
            .collect();

        let challenges = self
            .milestones
            .milestone_challenges(&milestone.id)?
            .into_iter()
            .map(|c| {
                let row = rows.get(&c.id);
                MilestoneChallengeResp {
                    reward: ChallengeRewardResp::credit(c.reward_value()),
                    status: ChallengeProgress::resolve(c.status, row.map(|r| r.status)),
                    updated_at: row.map_or(c.updated_at, |r| r.updated_at).timestamp(),
                    id: c.id,
                    name: c.title,
                }
            })
            .collect();

        Ok(MilestoneResp {
            milestone: Some(current_milestone_resp(milestone, challenges)),
        })
    }
}

fn current_milestone_resp(
    milestone: Milestone,
    challenges: Vec<MilestoneChallengeResp>,
) -> CurrentMilestoneResp {
    CurrentMilestoneResp {
        id: milestone.id,
        name: milestone.name,
        period_start: milestone.period_start.timestamp(),
        period_end: milestone.period_end.timestamp(),
        period_tz_offset: milestone.period_tz,
        status: milestone.status,
        challenges,
    }
}

fn snapshot<T: serde::Serialize>(value: &T) -> AchievementResult<Value> {
    serde_json::to_value(value).map_err(|e| AchievementError::Internal(e.to_string()))
}

fn result_snapshot(facts: &FactMap) -> Value {
    match facts.get_int(USER_ACC_RUN_DISTANCE) {
        Ok(distance) => json!({ USER_ACC_RUN_DISTANCE: distance }),
        Err(_) => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::achievement::memory::{
        MemoryMilestoneRepository, MemoryRunRepository, StaticSubscriptions,
    };
    use crate::achievement::model::{ChallengeStatus, MilestoneStatus, RunSession};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::ledger::{
        CreditWallet, LedgerError, LedgerResult, LedgerStore, LedgerWrite, MemoryLedgerStore,
        TrxStatus, WalletTransaction,
    };
    use crate::rule::Rule;

    /// Memory ledger whose `fail_on`-th commit loses a version race
    #[derive(Debug)]
    struct FlakyLedgerStore {
        inner: MemoryLedgerStore,
        commits: AtomicUsize,
        fail_on: usize,
    }

    impl FlakyLedgerStore {
        fn failing_commit(fail_on: usize) -> Self {
            Self {
                inner: MemoryLedgerStore::new(),
                commits: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    impl LedgerStore for FlakyLedgerStore {
        fn find_wallet_by_user(&self, user_id: &str) -> LedgerResult<Option<CreditWallet>> {
            self.inner.find_wallet_by_user(user_id)
        }

        fn find_wallet(&self, wallet_id: Uuid) -> LedgerResult<Option<CreditWallet>> {
            self.inner.find_wallet(wallet_id)
        }

        fn find_trx(&self, trx_id: Uuid) -> LedgerResult<Option<WalletTransaction>> {
            self.inner.find_trx(trx_id)
        }

        fn is_trx_referenced(&self, wallet_id: Uuid, trx_id: Uuid) -> LedgerResult<bool> {
            self.inner.is_trx_referenced(wallet_id, trx_id)
        }

        fn list_trx(&self, wallet_id: Uuid) -> LedgerResult<Vec<WalletTransaction>> {
            self.inner.list_trx(wallet_id)
        }

        fn insert_wallet(
            &self,
            wallet: CreditWallet,
            init: WalletTransaction,
        ) -> LedgerResult<CreditWallet> {
            self.inner.insert_wallet(wallet, init)
        }

        fn commit(&self, write: LedgerWrite) -> LedgerResult<()> {
            if self.commits.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(LedgerError::ConcurrencyConflict {
                    wallet_id: write.wallet.id,
                    expected: write.expected_version,
                });
            }
            self.inner.commit(write)
        }
    }

    /// Memory repository that refuses new user challenge rows
    #[derive(Debug)]
    struct RowsUnavailable(Arc<MemoryMilestoneRepository>);

    impl MilestoneRepository for RowsUnavailable {
        fn current(&self, at: DateTime<Utc>) -> AchievementResult<Option<Milestone>> {
            self.0.current(at)
        }

        fn find_milestone(&self, id: &str) -> AchievementResult<Option<Milestone>> {
            self.0.find_milestone(id)
        }

        fn find_challenge(&self, id: &str) -> AchievementResult<Option<Challenge>> {
            self.0.find_challenge(id)
        }

        fn find_current_challenges(&self) -> AchievementResult<Vec<Challenge>> {
            self.0.find_current_challenges()
        }

        fn milestone_challenges(&self, milestone_id: &str) -> AchievementResult<Vec<Challenge>> {
            self.0.milestone_challenges(milestone_id)
        }

        fn find_unaccomplished_challenges(
            &self,
            user_id: &str,
            milestone_id: &str,
        ) -> AchievementResult<Vec<Challenge>> {
            self.0.find_unaccomplished_challenges(user_id, milestone_id)
        }

        fn find_user_challenge(
            &self,
            user_id: &str,
            challenge_id: &str,
        ) -> AchievementResult<Option<UserChallenge>> {
            self.0.find_user_challenge(user_id, challenge_id)
        }

        fn user_challenges(
            &self,
            user_id: &str,
            milestone_id: &str,
        ) -> AchievementResult<Vec<UserChallenge>> {
            self.0.user_challenges(user_id, milestone_id)
        }

        fn insert_user_challenge(&self, _row: UserChallenge) -> AchievementResult<()> {
            Err(AchievementError::Store("user_challenges unavailable".into()))
        }

        fn update_user_challenge(
            &self,
            id: Uuid,
            expected: UserChallengeStatus,
            changes: &UserChallengeChanges,
        ) -> AchievementResult<()> {
            self.0.update_user_challenge(id, expected, changes)
        }
    }

    struct World {
        milestones: Arc<MemoryMilestoneRepository>,
        runs: Arc<MemoryRunRepository>,
        subs: Arc<StaticSubscriptions>,
        service: AchievementService,
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()
    }

    fn challenge(id: &str, level: i32, threshold: i64) -> Challenge {
        let rules = format!(
            r#"{{
                "conditions": [{{"type": "int", "options": {{"param": "user_acc_run_distance", "operator": "gte", "ref_value": {threshold}}}}}],
                "actions": [{{"type": "add", "options": {{"target": "credit", "value": 1, "value_type": "int"}}}}]
            }}"#
        );
        Challenge {
            id: id.into(),
            milestone_id: "m1".into(),
            title: format!("{}m", threshold),
            description: String::new(),
            level,
            sort: 0,
            status: ChallengeStatus::Active,
            rule: Rule::from_json(&rules).unwrap(),
            created_at: at(),
            updated_at: at(),
            version: 1,
        }
    }

    fn world() -> World {
        world_with(Arc::new(MemoryLedgerStore::new()))
    }

    fn world_with(ledger_store: Arc<dyn LedgerStore>) -> World {
        let milestones = Arc::new(MemoryMilestoneRepository::new());
        milestones
            .put_milestone(Milestone {
                id: "m1".into(),
                name: "2020".into(),
                period_start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                period_end: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
                period_tz: 25200,
                status: MilestoneStatus::Active,
                created_at: at(),
                updated_at: at(),
                version: 1,
            })
            .unwrap();
        for (level, threshold) in [(1, 10000), (2, 20000), (3, 30000)] {
            milestones
                .put_challenge(challenge(&format!("c{}", level), level, threshold))
                .unwrap();
        }

        let runs = Arc::new(MemoryRunRepository::new());
        let subs = Arc::new(StaticSubscriptions::new());
        let ledger = CreditLedger::new(ledger_store);
        let service = AchievementService::new(
            milestones.clone(),
            runs.clone(),
            subs.clone(),
            ledger,
            RewardsConfig::default(),
        );
        World {
            milestones,
            runs,
            subs,
            service,
        }
    }

    fn run(world: &World, distance: i64) {
        world
            .runs
            .record(RunSession {
                user_id: "u1".into(),
                distance,
                started_at: at(),
            })
            .unwrap();
    }

    #[test]
    fn test_stops_at_first_unmet_challenge() {
        let w = world();
        run(&w, 22180);

        let resp = w
            .service
            .check_achievement(&CheckAchievementReq::new("u1").at(at()))
            .unwrap();
        assert_eq!(resp.credit_reward, 2);
        assert_eq!(resp.achieved, vec!["c1", "c2"]);

        let row = w.milestones.find_user_challenge("u1", "c2").unwrap().unwrap();
        assert_eq!(row.status, UserChallengeStatus::Achieved);
        assert_eq!(row.challenge_result_snapshot, json!({"user_acc_run_distance": 22180}));
        assert_eq!(row.challenge_snapshot["id"], "c2");
        assert!(w.milestones.find_user_challenge("u1", "c3").unwrap().is_none());

        let balance = w.service.ledger().get_balance("u1").unwrap();
        assert_eq!(balance.pending_balance, 2.0);
        assert_eq!(balance.balance, 0.0);
    }

    #[test]
    fn test_second_pass_only_sees_open_challenges() {
        let w = world();
        run(&w, 12000);
        let req = CheckAchievementReq::new("u1").at(at());
        assert_eq!(w.service.check_achievement(&req).unwrap().achieved, vec!["c1"]);

        run(&w, 20000);
        let resp = w.service.check_achievement(&req).unwrap();
        assert_eq!(resp.achieved, vec!["c2", "c3"]);

        let err = w.service.check_achievement(&req).unwrap_err();
        assert!(matches!(err, AchievementError::NotFound(_)));
    }

    #[test]
    fn test_premium_multiplier() {
        let w = world();
        w.subs.set_premium("u1", true).unwrap();
        run(&w, 10500);

        let resp = w
            .service
            .check_achievement(&CheckAchievementReq::new("u1").at(at()))
            .unwrap();
        assert_eq!(resp.credit_reward, 2);
    }

    #[test]
    fn test_no_active_milestone() {
        let w = world();
        let req = CheckAchievementReq::new("u1").at(Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap());
        let err = w.service.check_achievement(&req).unwrap_err();
        assert_eq!(err.code(), "CLG001");
    }

    #[test]
    fn test_validation() {
        let w = world();
        let err = w
            .service
            .check_achievement(&CheckAchievementReq::new(""))
            .unwrap_err();
        assert!(matches!(err, AchievementError::Validation(_)));

        let err = w.service.claim("u1", "").unwrap_err();
        assert!(matches!(err, AchievementError::Validation(_)));
    }

    #[test]
    fn test_claim_settles_once() {
        let w = world();
        run(&w, 10000);
        w.service
            .check_achievement(&CheckAchievementReq::new("u1").at(at()))
            .unwrap();

        let resp = w.service.claim("u1", "c1").unwrap();
        assert_eq!(resp.status, UserChallengeStatus::RewardClaimed);

        let settled = w.service.ledger().store().find_trx(resp.trx_id).unwrap().unwrap();
        assert_eq!(settled.status, TrxStatus::Success);

        let balance = w.service.ledger().get_balance("u1").unwrap();
        assert_eq!(balance.balance, 1.0);
        assert_eq!(balance.pending_balance, 0.0);

        let err = w.service.claim("u1", "c1").unwrap_err();
        assert!(matches!(err, AchievementError::AlreadyClaimed(_)));
        assert_eq!(w.service.ledger().get_balance("u1").unwrap().balance, 1.0);
    }

    #[test]
    fn test_claim_missing_and_in_progress() {
        let w = world();
        assert_eq!(w.service.claim("u1", "c1").unwrap_err().code(), "CLG001");

        w.milestones
            .insert_user_challenge(UserChallenge {
                id: Uuid::new_v4(),
                user_id: "u1".into(),
                milestone_id: "m1".into(),
                milestone_snapshot: Value::Null,
                milestone_version: 1,
                challenge_id: "c1".into(),
                challenge_snapshot: Value::Null,
                challenge_version: 1,
                challenge_result_snapshot: Value::Null,
                reward_ref_id: Uuid::new_v4(),
                reward_value: 0.0,
                status: UserChallengeStatus::InProgress,
                updated_at: at(),
            })
            .unwrap();
        assert_eq!(w.service.claim("u1", "c1").unwrap_err().code(), "CLG002");
    }

    #[test]
    fn test_current_milestone() {
        let w = world();
        run(&w, 10000);
        w.service
            .check_achievement(&CheckAchievementReq::new("u1").at(at()))
            .unwrap();

        let resp = w.service.current_milestone_at("u1", at()).unwrap();
        let milestone = resp.milestone.unwrap();
        assert_eq!(milestone.id, "m1");
        assert_eq!(milestone.period_tz_offset, 25200);
        assert_eq!(milestone.period_start, 1577836800);
        assert_eq!(milestone.challenges.len(), 3);
        assert_eq!(milestone.challenges[0].status, ChallengeProgress::Achieved);
        assert_eq!(milestone.challenges[0].reward.value, 1);
        assert_eq!(milestone.challenges[0].reward.currency, "dB");
        assert_eq!(milestone.challenges[1].status, ChallengeProgress::Open);

        let none = w
            .service
            .current_milestone_at("u1", Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert!(none.milestone.is_none());
    }

    #[test]
    fn test_reload_all() {
        let w = world();
        assert_eq!(w.service.reload_all().unwrap(), 3);
        assert_eq!(w.service.rule_cache().len(), 3);
    }

    #[test]
    fn test_ledger_conflict_records_nothing() {
        let w = world_with(Arc::new(FlakyLedgerStore::failing_commit(1)));
        run(&w, 10000);

        let err = w
            .service
            .check_achievement(&CheckAchievementReq::new("u1").at(at()))
            .unwrap_err();
        assert_eq!(err.code(), "CRD011");
        assert!(w.milestones.find_user_challenge("u1", "c1").unwrap().is_none());
        assert_eq!(w.service.ledger().get_balance("u1").unwrap().pending_balance, 0.0);

        // The challenge is still open, so the next pass records it
        let resp = w
            .service
            .check_achievement(&CheckAchievementReq::new("u1").at(at()))
            .unwrap();
        assert_eq!(resp.achieved, vec!["c1"]);
        let claimed = w.service.claim("u1", "c1").unwrap();
        assert_eq!(claimed.status, UserChallengeStatus::RewardClaimed);
        assert_eq!(w.service.ledger().get_balance("u1").unwrap().balance, 1.0);
    }

    #[test]
    fn test_failed_settlement_keeps_claim_open() {
        // Commit 1 opens the pending reward, commit 2 is the first claim
        let w = world_with(Arc::new(FlakyLedgerStore::failing_commit(2)));
        run(&w, 10000);
        w.service
            .check_achievement(&CheckAchievementReq::new("u1").at(at()))
            .unwrap();

        let err = w.service.claim("u1", "c1").unwrap_err();
        assert_eq!(err.code(), "CRD011");

        let row = w.milestones.find_user_challenge("u1", "c1").unwrap().unwrap();
        assert_eq!(row.status, UserChallengeStatus::Achieved);
        let trx = w.service.ledger().store().find_trx(row.reward_ref_id).unwrap().unwrap();
        assert_eq!(trx.status, TrxStatus::Pending);

        let resp = w.service.claim("u1", "c1").unwrap();
        assert_eq!(resp.status, UserChallengeStatus::RewardClaimed);
        let err = w.service.claim("u1", "c1").unwrap_err();
        assert!(matches!(err, AchievementError::AlreadyClaimed(_)));
        assert_eq!(w.service.ledger().get_balance("u1").unwrap().balance, 1.0);
    }

    #[test]
    fn test_rejected_row_cancels_pending_reward() {
        let w = world();
        let service = AchievementService::new(
            Arc::new(RowsUnavailable(w.milestones.clone())),
            w.runs.clone(),
            w.subs.clone(),
            w.service.ledger().clone(),
            RewardsConfig::default(),
        );
        let reward_ref_id = Uuid::new_v4();

        let err = service
            .record_achievement(AddUserChallengeReq {
                user_id: "u1".into(),
                challenge_id: "c1".into(),
                reward_value: 1.0,
                reward_ref_id,
                result_snapshot: Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, AchievementError::Store(_)));

        let trx = service.ledger().store().find_trx(reward_ref_id).unwrap().unwrap();
        assert_eq!(trx.status, TrxStatus::Failed);
        let balance = service.ledger().get_balance("u1").unwrap();
        assert_eq!(balance.pending_balance, 0.0);
        assert_eq!(balance.balance, 0.0);
    }

    #[test]
    fn test_record_rejects_accomplished_before_ledger() {
        let w = world();
        run(&w, 10000);
        w.service
            .check_achievement(&CheckAchievementReq::new("u1").at(at()))
            .unwrap();

        let err = w
            .service
            .record_achievement(AddUserChallengeReq {
                user_id: "u1".into(),
                challenge_id: "c1".into(),
                reward_value: 1.0,
                reward_ref_id: Uuid::new_v4(),
                result_snapshot: Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, AchievementError::Duplicate(_)));
        assert_eq!(w.service.ledger().get_balance("u1").unwrap().pending_balance, 1.0);
    }
}
