//! CLI command implementations
//!
//! Commands run against in-memory repositories seeded from files; nothing
//! is persisted between invocations.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::achievement::{default_rule_code, CheckAchievementReq};
use crate::config::RewardsConfig;
use crate::logging;
use crate::rule::Rule;
use crate::trigger::{AchievementTrigger, ActivityEvent};

use super::args::{Cli, Command};
use super::errors::{CliError, CliErrorCode, CliResult};
use super::fixture::Fixture;
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args())
}

/// Load configuration, install logging and run the command
pub fn run_command(cli: Cli) -> CliResult<()> {
    let config = match &cli.config {
        Some(path) => RewardsConfig::load(path)?,
        None => RewardsConfig::default(),
    };
    logging::init(&config.logging);

    match cli.command {
        Command::Render { rule } => render(&rule, &config),
        Command::Compile { fixture } => compile(&fixture, &config),
        Command::Simulate {
            fixture,
            user,
            at,
            claim,
        } => simulate(&fixture, &config, &user, at.as_deref(), claim),
        Command::Replay { fixture, events } => replay(&fixture, &events, &config),
    }
}

/// Render a rule document
pub fn render(rule_path: &Path, config: &RewardsConfig) -> CliResult<()> {
    let content = fs::read_to_string(rule_path)?;
    let mut rule = Rule::from_json(&content)?;
    if rule.code.is_empty() {
        rule.code = default_rule_code("");
    }
    rule.variable_name = config.rule_variable.clone();

    let source = rule.render()?;

    write_response(json!({
        "code": rule.code,
        "params": rule.params().iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
        "targets": rule.targets().iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
        "source": source,
    }))
}

/// Compile every active challenge in a fixture
pub fn compile(fixture_path: &Path, config: &RewardsConfig) -> CliResult<()> {
    let service = Fixture::load(fixture_path)?.into_service(config.clone())?;
    let compiled = service.reload_all()?;

    let mut challenges: Vec<String> = service
        .rule_cache()
        .snapshot()?
        .keys()
        .cloned()
        .collect();
    challenges.sort();

    info!(compiled, "Fixture compiled");
    write_response(json!({
        "compiled": compiled,
        "challenges": challenges,
    }))
}

/// Check achievements for one user and optionally claim the rewards
pub fn simulate(
    fixture_path: &Path,
    config: &RewardsConfig,
    user_id: &str,
    at: Option<&str>,
    claim: bool,
) -> CliResult<()> {
    let at = match at {
        Some(s) => parse_time(s)?,
        None => Utc::now(),
    };
    let service = Fixture::load(fixture_path)?.into_service(config.clone())?;
    service.reload_all()?;

    let achievement = service.check_achievement(&CheckAchievementReq::new(user_id).at(at))?;

    let mut claims = Vec::new();
    if claim {
        for challenge_id in &achievement.achieved {
            let resp = service.claim(user_id, challenge_id)?;
            claims.push(json!({
                "challenge_id": challenge_id,
                "status": resp.status,
                "trx_id": resp.trx_id,
            }));
        }
    }

    let balance = service.ledger().get_balance(user_id)?;
    let milestone = service.current_milestone_at(user_id, at)?;

    write_response(json!({
        "achievement": achievement,
        "claims": claims,
        "balance": balance,
        "milestone": milestone.milestone,
    }))
}

/// Publish recorded activity through the achievement trigger and wait for
/// the worker to drain
pub fn replay(fixture_path: &Path, events_path: &Path, config: &RewardsConfig) -> CliResult<()> {
    let content = fs::read_to_string(events_path)?;
    let events: Vec<ActivityEvent> = serde_json::from_str(&content)?;

    let service = Arc::new(Fixture::load(fixture_path)?.into_service(config.clone())?);
    service.reload_all()?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))?;

    let users: BTreeSet<String> = events.iter().map(|e| e.user_id.clone()).collect();
    let (published, rejected, stats) = rt.block_on(async {
        let (trigger, worker) =
            AchievementTrigger::spawn(Arc::clone(&service), config.trigger_queue_capacity);

        let mut published = 0u64;
        let mut rejected = 0u64;
        for event in events {
            match trigger.trigger_achievement_check(event) {
                Ok(()) => published += 1,
                Err(e) => {
                    warn!(error = %e, code = e.code(), "Event not published");
                    rejected += 1;
                }
            }
        }
        drop(trigger);

        let stats = worker.await.map_err(|e| {
            CliError::new(
                CliErrorCode::CommandFailed,
                format!("Trigger worker failed: {}", e),
            )
        })?;
        Ok::<_, CliError>((published, rejected, stats))
    })?;

    let mut balances = serde_json::Map::new();
    for user in users.iter().filter(|u| !u.is_empty()) {
        let balance = service.ledger().get_balance(user)?;
        balances.insert(user.clone(), serde_json::to_value(balance)?);
    }

    info!(published, rejected, handled = stats.handled, "Replay finished");
    write_response(json!({
        "published": published,
        "rejected": rejected,
        "worker": stats,
        "balances": balances,
    }))
}

fn parse_time(s: &str) -> CliResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CliError::invalid_input(format!("Invalid --at '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        let t = parse_time("2020-06-01T07:00:00+07:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2020-06-01T00:00:00+00:00");
        assert!(parse_time("yesterday").is_err());
    }
}
