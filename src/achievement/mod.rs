//! # Achievement Module
//!
//! Milestone challenges evaluated by compiled rules, with rewards paid out
//! through the credit ledger.

pub mod compiler;
pub mod errors;
pub mod evaluator;
pub mod facts;
pub mod memory;
pub mod model;
pub mod store;

pub use compiler::{default_rule_code, CompiledRule, RuleCache, RuleCompiler};
pub use errors::{AchievementError, AchievementResult};
pub use evaluator::{AchievementService, AddUserChallengeReq};
pub use facts::{default_fact_finder, run_distance_finder};
pub use memory::{MemoryMilestoneRepository, MemoryRunRepository, StaticSubscriptions};
pub use model::{
    AchievementResp, Challenge, ChallengeProgress, ChallengeStatus, CheckAchievementReq,
    ClaimResp, CurrentMilestoneResp, Milestone, MilestoneChallengeResp, MilestoneResp,
    MilestoneStatus, RunSession, UserChallenge, UserChallengeChanges, UserChallengeStatus,
    CREDIT_FACT, USER_ACC_RUN_DISTANCE,
};
pub use store::{MilestoneRepository, RunRepository, SubscriptionDirectory};
