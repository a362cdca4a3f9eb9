//! Merging per-source facts into one [`Agent`] per roster member.
//!
//! Sources overlap: the main agent's sessions, secondary agent directories
//! and the run registry can all say something about the same agent. Each
//! source is turned into [`AgentFact`]s, then for every agent:
//!
//! - counters are summed over all facts
//! - each descriptive field is taken from the best-ranked fact that has one
//! - status comes from running runs first, then from recency
//!
//! A fact ranks by (is a running run, time), where time is `created_at` for
//! running runs and the fact timestamp otherwise. Facts without a time rank
//! below every fact with one.

use crate::config::{DefaultsConfig, StatusConfig};
use crate::format::format_relative_time_opt;
use crate::roster::Roster;
use crate::scan::runs::{active_run, run_summary};
use crate::scan::sessions::SessionScan;
use crate::types::{
    ActiveRun, Agent, AgentStatus, FleetEvent, FleetEventKind, RunRecord, RunStatus, RunSummary,
    SessionsSnapshot,
};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Most sub-agent runs listed in a sessions snapshot
pub const MAX_SUBAGENTS: usize = 20;

/// Most events listed in a sessions snapshot
pub const MAX_EVENTS: usize = 10;

/// One source's claim about an agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentFact {
    pub agent: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub current_task: String,
    pub model_used: String,
    pub session_id: String,
    pub label: String,
    pub tokens: u64,
    pub api_calls: u64,
    /// Comes from a run without an outcome
    pub running: bool,
    /// Start of the run, for run facts
    pub created_at: Option<DateTime<Utc>>,
}

impl AgentFact {
    /// Fact from one summarized session file
    pub fn from_session(
        agent: &str,
        session_key: &str,
        summary: &crate::types::SessionTailSummary,
        default_model: Option<&str>,
    ) -> Self {
        let model_used = if summary.model_used.is_empty() {
            default_model.unwrap_or_default().to_string()
        } else {
            summary.model_used.clone()
        };

        Self {
            agent: agent.to_string(),
            timestamp: summary.last_timestamp,
            current_task: summary.last_task.clone(),
            model_used,
            session_id: session_key.to_string(),
            label: String::new(),
            tokens: summary.tokens_total(),
            api_calls: summary.api_calls,
            running: false,
            created_at: None,
        }
    }

    /// Fact from one run attributed to `agent`
    pub fn from_run(agent: &str, run: &RunRecord, now: DateTime<Utc>, model: &str) -> Self {
        let running = run.is_running();
        let timestamp = run
            .ended_at
            .or(running.then_some(now))
            .or(run.created_at);

        let current_task = match (running, run.label.is_empty()) {
            (_, true) => String::new(),
            (true, false) => run.label.clone(),
            (false, false) => format!("Completed: {}", run.label),
        };

        Self {
            agent: agent.to_string(),
            timestamp,
            current_task,
            model_used: model.to_string(),
            session_id: run.child_session_key.clone(),
            label: run.label.clone(),
            tokens: 0,
            api_calls: 0,
            running,
            created_at: run.created_at,
        }
    }

    fn rank(&self) -> (bool, Option<DateTime<Utc>>) {
        if self.running {
            (true, self.created_at)
        } else {
            (false, self.timestamp)
        }
    }
}

/// Turn scanned sources into facts.
///
/// Runs whose label prefix names no known agent contribute no fact.
pub fn collect_facts(
    roster: &Roster,
    sessions: &SessionScan,
    runs: &[RunRecord],
    now: DateTime<Utc>,
    defaults: &DefaultsConfig,
) -> Vec<AgentFact> {
    let main_agent = roster.default_owner();
    let mut facts: Vec<AgentFact> = sessions
        .facts
        .iter()
        .map(|fact| {
            let default_model =
                (fact.agent == main_agent).then_some(defaults.main_model.as_str());
            AgentFact::from_session(&fact.agent, &fact.session_key, &fact.summary, default_model)
        })
        .collect();

    facts.extend(runs.iter().filter_map(|run| {
        let agent = roster.agent_for_label(&run.label)?;
        Some(AgentFact::from_run(
            &agent.id,
            run,
            now,
            &defaults.subagent_model,
        ))
    }));

    facts
}

/// Best-ranked non-empty value of one field
fn resolve_field<'a>(facts: &[&'a AgentFact], field: fn(&AgentFact) -> &str) -> Option<&'a str> {
    facts
        .iter()
        .filter(|f| !field(f).is_empty())
        .max_by_key(|f| f.rank())
        .copied()
        .map(field)
}

/// One agent per roster member, in roster order.
pub fn reconcile(
    roster: &Roster,
    facts: &[AgentFact],
    now: DateTime<Utc>,
    thresholds: &StatusConfig,
) -> Vec<Agent> {
    roster
        .agents
        .iter()
        .map(|profile| {
            let own: Vec<&AgentFact> = facts.iter().filter(|f| f.agent == profile.id).collect();

            let last_seen = own.iter().filter_map(|f| f.timestamp).max();
            let status = if own.iter().any(|f| f.running) {
                AgentStatus::Running
            } else {
                AgentStatus::from_last_seen(last_seen, now, thresholds)
            };

            let text = |field: fn(&AgentFact) -> &str| {
                resolve_field(&own, field).unwrap_or_default().to_string()
            };

            Agent {
                id: profile.id.clone(),
                name: profile.name.clone(),
                role: profile.role.clone(),
                emoji: profile.emoji.clone(),
                status,
                current_task: text(|f| f.current_task.as_str()),
                last_seen,
                last_seen_relative: format_relative_time_opt(last_seen, now, "never"),
                model_used: text(|f| f.model_used.as_str()),
                tokens_used: own.iter().map(|f| f.tokens).fold(0, u64::saturating_add),
                api_calls: own.iter().map(|f| f.api_calls).fold(0, u64::saturating_add),
                session_id: text(|f| f.session_id.as_str()),
                label: resolve_field(&own, |f| f.label.as_str()).map(str::to_string),
            }
        })
        .collect()
}

/// Events implied by the current state: live agents and running sub-agents.
///
/// Ids name the agent or run and the state reported, so an unchanged fleet
/// yields the same ids on every scan.
pub fn events(agents: &[Agent], subagents: &[RunSummary]) -> Vec<FleetEvent> {
    let agent_events = agents.iter().filter(|a| a.status.is_live()).map(|a| FleetEvent {
        id: format!("evt-{}-{}", a.id, a.status),
        kind: FleetEventKind::AgentStatus,
        timestamp: a.last_seen,
        data: json!({
            "agentId": a.id,
            "oldStatus": AgentStatus::Idle,
            "newStatus": a.status,
            "task": a.current_task,
        }),
    });

    let spawn_events = subagents
        .iter()
        .filter(|s| s.status == RunStatus::Running)
        .map(|s| FleetEvent {
            id: format!("evt-{}-spawn", s.id),
            kind: FleetEventKind::SubagentSpawn,
            timestamp: s.start_time,
            data: json!({
                "subagentId": s.id,
                "parentAgent": s.parent_agent,
                "task": s.task,
            }),
        });

    agent_events.chain(spawn_events).take(MAX_EVENTS).collect()
}

/// Full sessions view from scanned sources
pub fn sessions_snapshot(
    roster: &Roster,
    sessions: SessionScan,
    runs: &[RunRecord],
    now: DateTime<Utc>,
    thresholds: &StatusConfig,
    defaults: &DefaultsConfig,
) -> SessionsSnapshot {
    let facts = collect_facts(roster, &sessions, runs, now, defaults);
    let agents = reconcile(roster, &facts, now, thresholds);

    let all_runs: Vec<RunSummary> = runs.iter().map(|r| run_summary(r, roster, now)).collect();
    let events = events(&agents, &all_runs);
    let subagents = all_runs.into_iter().take(MAX_SUBAGENTS).collect();

    tracing::debug!(
        facts = facts.len(),
        runs = runs.len(),
        live = agents.iter().filter(|a| a.status.is_live()).count(),
        "Reconciled fleet"
    );

    SessionsSnapshot {
        agents,
        subagents,
        events,
        sources: sessions.stats,
    }
}

/// Runs without an outcome, longest-running first
pub fn active_runs(roster: &Roster, runs: &[RunRecord], now: DateTime<Utc>) -> Vec<ActiveRun> {
    let mut active: Vec<ActiveRun> = runs
        .iter()
        .filter_map(|r| active_run(r, roster, now))
        .collect();
    active.sort_by(|a, b| b.duration_ms.cmp(&a.duration_ms).then_with(|| a.id.cmp(&b.id)));
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::sessions::SessionFact;
    use crate::types::{RunOutcome, SessionTailSummary};
    use chrono::Duration;
    use std::path::PathBuf;

    fn session_fact(agent: &str, key: &str, summary: SessionTailSummary) -> SessionFact {
        SessionFact {
            agent: agent.to_string(),
            session_key: key.to_string(),
            path: PathBuf::from("/x.jsonl"),
            summary,
        }
    }

    fn run(id: &str, label: &str, created: DateTime<Utc>, outcome: Option<&str>) -> RunRecord {
        RunRecord {
            run_id: id.to_string(),
            label: label.to_string(),
            child_session_key: format!("agent:main:subagent:{}", id),
            created_at: Some(created),
            ended_at: outcome.map(|_| created + Duration::minutes(1)),
            outcome: outcome.map(|s| RunOutcome {
                status: Some(s.to_string()),
            }),
            ..Default::default()
        }
    }

    fn snapshot(sessions: SessionScan, runs: &[RunRecord], now: DateTime<Utc>) -> SessionsSnapshot {
        sessions_snapshot(
            &Roster::default(),
            sessions,
            runs,
            now,
            &StatusConfig::default(),
            &DefaultsConfig::default(),
        )
    }

    fn agent<'a>(snap: &'a SessionsSnapshot, id: &str) -> &'a Agent {
        snap.agents.iter().find(|a| a.id == id).unwrap()
    }

    #[test]
    fn test_no_sources_all_offline() {
        let snap = snapshot(SessionScan::default(), &[], Utc::now());
        assert_eq!(snap.agents.len(), 6);
        for agent in &snap.agents {
            assert_eq!(agent.status, AgentStatus::Offline);
            assert_eq!(agent.tokens_used, 0);
            assert_eq!(agent.api_calls, 0);
            assert_eq!(agent.last_seen_relative, "never");
            assert_eq!(agent.current_task, "");
            assert!(agent.label.is_none());
        }
        assert!(snap.events.is_empty());
    }

    #[test]
    fn test_running_run_wins_regardless_of_age() {
        let now = Utc::now();
        let runs = [run("r1", "forge-migrate", now - Duration::hours(5), None)];
        let snap = snapshot(SessionScan::default(), &runs, now);

        let forge = agent(&snap, "forge");
        assert_eq!(forge.status, AgentStatus::Running);
        assert_eq!(forge.current_task, "forge-migrate");
        assert_eq!(forge.model_used, DefaultsConfig::default().subagent_model);
        assert_eq!(forge.session_id, "agent:main:subagent:r1");
        assert_eq!(forge.label.as_deref(), Some("forge-migrate"));
        assert_eq!(snap.subagents.len(), 1);
        assert!(snap
            .events
            .iter()
            .any(|e| e.kind == FleetEventKind::SubagentSpawn));
    }

    #[test]
    fn test_counters_are_summed() {
        let now = Utc::now();
        let summary = |tokens_in, calls, mins| SessionTailSummary {
            last_timestamp: Some(now - Duration::minutes(mins)),
            tokens_in,
            tokens_out: 10,
            api_calls: calls,
            ..Default::default()
        };
        let sessions = SessionScan {
            facts: vec![
                session_fact("kira", "agent:main:main", summary(100, 2, 1)),
                session_fact("kira", "agent:main:main", summary(50, 3, 60)),
                session_fact("hunter", "agent:hunter", summary(7, 1, 10)),
            ],
            ..Default::default()
        };
        let snap = snapshot(sessions, &[], now);

        let kira = agent(&snap, "kira");
        assert_eq!(kira.tokens_used, 170);
        assert_eq!(kira.api_calls, 5);
        assert_eq!(kira.status, AgentStatus::Active);
        assert_eq!(kira.model_used, DefaultsConfig::default().main_model);

        let hunter = agent(&snap, "hunter");
        assert_eq!(hunter.tokens_used, 17);
        assert_eq!(hunter.status, AgentStatus::Idle);
        // Secondary agents get no default model
        assert_eq!(hunter.model_used, "");
    }

    #[test]
    fn test_fields_resolve_independently() {
        let now = Utc::now();
        let sessions = SessionScan {
            facts: vec![
                session_fact(
                    "hunter",
                    "agent:hunter",
                    SessionTailSummary {
                        last_timestamp: Some(now - Duration::minutes(1)),
                        model_used: "m-session".to_string(),
                        ..Default::default()
                    },
                ),
                session_fact(
                    "hunter",
                    "agent:hunter",
                    SessionTailSummary {
                        last_timestamp: Some(now - Duration::minutes(20)),
                        last_task: "qualify inbound leads".to_string(),
                        ..Default::default()
                    },
                ),
            ],
            ..Default::default()
        };
        let runs = [run("r2", "hunter-outreach", now - Duration::hours(3), Some("ok"))];
        let snap = snapshot(sessions, &runs, now);

        let hunter = agent(&snap, "hunter");
        // Newest fact has no task, so the older session's task wins over the
        // even older completed run
        assert_eq!(hunter.current_task, "qualify inbound leads");
        assert_eq!(hunter.model_used, "m-session");
        assert_eq!(hunter.label.as_deref(), Some("hunter-outreach"));
        assert_eq!(hunter.status, AgentStatus::Active);
    }

    #[test]
    fn test_completed_run_uses_recency() {
        let now = Utc::now();
        let runs = [run("r3", "echo-post", now - Duration::minutes(3), Some("ok"))];
        let snap = snapshot(SessionScan::default(), &runs, now);
        let echo = agent(&snap, "echo");
        // ended one minute after creation, two minutes ago
        assert_eq!(echo.status, AgentStatus::Active);
        assert_eq!(echo.current_task, "Completed: echo-post");
    }

    #[test]
    fn test_unknown_label_contributes_nothing() {
        let now = Utc::now();
        let runs = [run("r4", "mystery-job", now, None)];
        let snap = snapshot(SessionScan::default(), &runs, now);
        assert!(snap.agents.iter().all(|a| a.status == AgentStatus::Offline));
        assert_eq!(snap.subagents[0].parent_agent, "kira");
    }

    #[test]
    fn test_untimestamped_facts_rank_last() {
        let now = Utc::now();
        let facts = [
            AgentFact {
                agent: "atlas".to_string(),
                current_task: "undated".to_string(),
                ..Default::default()
            },
            AgentFact {
                agent: "atlas".to_string(),
                timestamp: Some(now - Duration::days(3)),
                current_task: "dated".to_string(),
                ..Default::default()
            },
        ];
        let agents = reconcile(&Roster::default(), &facts, now, &StatusConfig::default());
        let atlas = agents.iter().find(|a| a.id == "atlas").unwrap();
        assert_eq!(atlas.current_task, "dated");
        assert_eq!(atlas.status, AgentStatus::Offline);
    }

    #[test]
    fn test_caps_on_subagents_and_events() {
        let now = Utc::now();
        let runs: Vec<_> = (0..30)
            .map(|i| run(&format!("run{:02}", i), "", now - Duration::seconds(i), None))
            .collect();
        let snap = snapshot(SessionScan::default(), &runs, now);
        assert_eq!(snap.subagents.len(), MAX_SUBAGENTS);
        assert_eq!(snap.events.len(), MAX_EVENTS);
        // Unlabeled runs belong to the main agent
        assert_eq!(agent(&snap, "kira").status, AgentStatus::Running);
    }

    #[test]
    fn test_event_ids_do_not_depend_on_scan_time() {
        let now = Utc::now();
        let runs = [run("a1b2c3d4-run", "forge-build", now - Duration::minutes(3), None)];
        let ids = |snap: &SessionsSnapshot| -> Vec<String> {
            snap.events.iter().map(|e| e.id.clone()).collect()
        };

        let first = snapshot(SessionScan::default(), &runs, now);
        let later = snapshot(SessionScan::default(), &runs, now + Duration::seconds(7));
        assert_eq!(ids(&first), ["evt-forge-running", "evt-sa-a1b2c3d4-spawn"]);
        assert_eq!(ids(&first), ids(&later));
    }

    #[test]
    fn test_active_runs_sorted_by_duration() {
        let now = Utc::now();
        let roster = Roster::default();
        let runs = [
            run("young", "atlas-standup", now - Duration::minutes(1), None),
            run("done", "atlas-report", now - Duration::minutes(50), Some("ok")),
            run("old", "forge-build", now - Duration::minutes(10), None),
        ];
        let active = active_runs(&roster, &runs, now);
        let ids: Vec<_> = active.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["old", "young"]);
    }
}
