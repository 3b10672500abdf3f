//! Fixture files for the `compile` and `simulate` commands
//!
//! A fixture seeds an in-memory world:
//!
//! ```json
//! {
//!   "milestones": [...],
//!   "challenges": [...],
//!   "runs": [{"user_id": "u1", "distance": 12000, "started_at": "2020-03-01T00:00:00Z"}],
//!   "premium_users": ["u1"]
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::achievement::{
    AchievementService, Challenge, MemoryMilestoneRepository, MemoryRunRepository, Milestone,
    RunSession, StaticSubscriptions,
};
use crate::config::RewardsConfig;
use crate::ledger::{CreditLedger, MemoryLedgerStore};

use super::errors::{CliError, CliResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(default)]
    pub runs: Vec<RunSession>,
    #[serde(default)]
    pub premium_users: Vec<String>,
}

impl Fixture {
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::io_error(format!("Failed to read fixture {:?}: {}", path, e)))?;
        serde_json::from_str(&content)
            .map_err(|e| CliError::invalid_input(format!("Invalid fixture JSON: {}", e)))
    }

    /// Build an achievement service over in-memory repositories
    pub fn into_service(self, config: RewardsConfig) -> CliResult<AchievementService> {
        let milestones = Arc::new(MemoryMilestoneRepository::new());
        for milestone in self.milestones {
            milestones.put_milestone(milestone)?;
        }
        for challenge in self.challenges {
            milestones.put_challenge(challenge)?;
        }

        let runs = Arc::new(MemoryRunRepository::new());
        for run in self.runs {
            runs.record(run)?;
        }

        let subscriptions = Arc::new(StaticSubscriptions::new());
        for user in &self.premium_users {
            subscriptions.set_premium(user, true)?;
        }

        Ok(AchievementService::new(
            milestones,
            runs,
            subscriptions,
            CreditLedger::new(Arc::new(MemoryLedgerStore::new())),
            config,
        ))
    }
}
