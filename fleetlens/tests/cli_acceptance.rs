use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    root: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");
        let root = base.join("fleet");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        seed_fleet_fixture(&root);

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
            root,
        }
    }

    fn root_arg(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }
}

fn ago_rfc3339(minutes: i64) -> String {
    (Utc::now() - Duration::minutes(minutes)).to_rfc3339()
}

fn write_lines(path: &Path, lines: &[Value]) {
    fs::create_dir_all(path.parent().expect("missing fixture parent"))
        .expect("failed to create fixture directories");
    let body: Vec<String> = lines.iter().map(Value::to_string).collect();
    fs::write(path, body.join("\n") + "\n").expect("failed to write fixture");
}

fn seed_fleet_fixture(root: &Path) {
    write_lines(
        &root.join("agents/main/sessions/boot-2026-02-18_08-00-00-000.jsonl"),
        &[
            json!({"type": "session", "timestamp": ago_rfc3339(60)}),
            json!({
                "type": "message",
                "timestamp": ago_rfc3339(2),
                "message": {"role": "user", "content": "check the deploy pipeline"},
            }),
            json!({
                "type": "message",
                "timestamp": ago_rfc3339(1),
                "message": {
                    "role": "assistant",
                    "content": [{"type": "text", "text": "Pipeline is green."}],
                    "usage": {"input": 400, "output": 100},
                    "model": "claude-opus-4-6",
                },
            }),
        ],
    );

    write_lines(
        &root.join("agents/cto-forge/sessions/forge.jsonl"),
        &[json!({
            "type": "message",
            "timestamp": ago_rfc3339(240),
            "message": {
                "role": "assistant",
                "content": [{"type": "text", "text": "Refactor merged."}],
                "usage": {"input": 10, "output": 5},
            },
        })],
    );

    let runs = json!({"runs": {
        "9f8e7d6c-run": {
            "label": "atlas-nightly-sync",
            "childSessionKey": "agent:main:subagent:9f8e7d6c",
            "task": "sync inventories",
            "createdAt": (Utc::now() - Duration::minutes(5)).timestamp_millis(),
        },
    }});
    fs::create_dir_all(root.join("subagents")).expect("failed to create subagents dir");
    fs::write(root.join("subagents/runs.json"), runs.to_string()).expect("failed to write runs");

    let jobs = json!({"jobs": [
        {"id": "j1", "name": "Weekly security audit", "enabled": true,
         "schedule": {"expr": "0 9 * * 1", "tz": "UTC"},
         "state": {"lastStatus": "ok"}},
    ]});
    fs::create_dir_all(root.join("cron")).expect("failed to create cron dir");
    fs::write(root.join("cron/jobs.json"), jobs.to_string()).expect("failed to write jobs");
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("fleetlens"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("OPENCLAW_HOME")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute fleetlens: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "fleetlens {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn query_json(env: &CliTestEnv, args: &[&str]) -> Value {
    let root = env.root_arg();
    let mut full_args = vec!["--root", root.as_str()];
    full_args.extend_from_slice(args);

    let output = run_bin(env, &full_args);
    assert_success(&full_args, &output);

    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}):\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn sessions_reports_every_roster_agent() {
    let env = CliTestEnv::new();
    let sessions = query_json(&env, &["sessions"]);

    let agents = sessions["agents"].as_array().expect("agents array");
    assert_eq!(agents.len(), 6);

    let kira = &agents[0];
    assert_eq!(kira["id"], "kira");
    assert_eq!(kira["status"], "active");
    assert_eq!(kira["tokensUsed"], 500);
    assert_eq!(kira["modelUsed"], "claude-opus-4-6");

    let forge = agents
        .iter()
        .find(|a| a["id"] == "forge")
        .expect("forge agent");
    assert_eq!(forge["status"], "offline");
    assert_eq!(forge["currentTask"], "Refactor merged");

    let atlas = agents
        .iter()
        .find(|a| a["id"] == "atlas")
        .expect("atlas agent");
    assert_eq!(atlas["status"], "running");

    let subagents = sessions["subagents"].as_array().expect("subagents array");
    assert_eq!(subagents.len(), 1);
    assert_eq!(subagents[0]["parentAgent"], "atlas");
    assert_eq!(subagents[0]["status"], "running");
}

#[test]
fn crons_report_owner_and_schedule() {
    let env = CliTestEnv::new();
    let crons = query_json(&env, &["crons"]);

    let crons = crons.as_array().expect("cron array");
    assert_eq!(crons.len(), 1);
    assert_eq!(crons[0]["owner"], "sentinel");
    assert_eq!(crons[0]["schedule"], "0 9 * * 1");
    assert_eq!(crons[0]["lastStatus"], "ok");
}

#[test]
fn metrics_and_agent_queries_agree() {
    let env = CliTestEnv::new();
    let metrics = query_json(&env, &["metrics"]);
    assert_eq!(metrics["tokensTotal"], 515);
    assert_eq!(metrics["totalCrons"], 1);
    assert_eq!(metrics["runningSubagents"], 1);

    let kira = query_json(&env, &["agent", "kira"]);
    assert_eq!(kira["agentId"], "kira");
    assert_eq!(kira["tokens"], 500);

    let nobody = query_json(&env, &["agent", "nobody"]);
    assert_eq!(nobody["status"], "offline");
    assert_eq!(nobody["lastActive"], "never");
}

#[test]
fn runs_lists_unfinished_runs() {
    let env = CliTestEnv::new();
    let runs = query_json(&env, &["runs"]);

    let runs = runs.as_array().expect("run array");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["id"], "9f8e7d6c-run");
    assert_eq!(runs[0]["parentAgent"], "atlas");
}

#[test]
fn transcript_shows_recent_turns() {
    let env = CliTestEnv::new();
    let turns = query_json(&env, &["transcript", "agent:main:main", "--limit", "1"]);

    let turns = turns.as_array().expect("turn array");
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0]["role"], "assistant");
    assert_eq!(turns[0]["text"], "Pipeline is green.");
}

#[test]
fn snapshot_contains_every_view() {
    let env = CliTestEnv::new();
    let snapshot = query_json(&env, &["--compact", "snapshot"]);

    assert_eq!(snapshot["agents"].as_array().map(Vec::len), Some(6));
    assert_eq!(snapshot["crons"].as_array().map(Vec::len), Some(1));
    assert_eq!(snapshot["activeRuns"].as_array().map(Vec::len), Some(1));
    assert_eq!(snapshot["meta"]["mode"], "live");
}

#[test]
fn watch_mode_stops_after_count() {
    let env = CliTestEnv::new();
    let root = env.root_arg();
    let args = [
        "--root",
        root.as_str(),
        "--compact",
        "--watch",
        "--poll",
        "10",
        "--count",
        "2",
        "metrics",
    ];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    // Unchanged results are printed once
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "stdout:\n{stdout}");
}

#[test]
fn missing_root_answers_with_empty_values() {
    let env = CliTestEnv::new();
    let args = ["crons"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let crons: Value = serde_json::from_slice(&output.stdout).expect("stdout is not JSON");
    assert_eq!(crons, json!([]));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No fleet data root"));
}

#[test]
fn unknown_subcommand_fails() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["explode"]);
    assert!(!output.status.success());
}
