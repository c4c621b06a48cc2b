use super::*;
use arena_core::{MatchStatus, Outcome};
use std::fs;
use tempfile::TempDir;

struct Harness {
    root: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    /// Roots relative to the test's working directory
    fn relative() -> Self {
        let root = tempfile::Builder::new()
            .prefix("executor-rel-")
            .tempdir_in(".")
            .unwrap();
        assert!(root.path().is_relative());
        Self { root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Executor whose simulator is `sh <script> <result> <replay> <cmd> <name>...`
    fn executor(&self, script: &str, wall_clock_secs: u64) -> SimulatorExecutor {
        let script_path = self.path("simulator.sh");
        fs::write(&script_path, script).unwrap();
        let script_path = std::path::absolute(script_path).unwrap();

        let config = SimulatorConfig {
            executable: PathBuf::from("sh"),
            args: vec![
                script_path.to_string_lossy().into_owned(),
                "{result}".to_string(),
                "{replay}".to_string(),
            ],
            launch_template: "{dir}/run.sh 2> {stderr}".to_string(),
            wall_clock_secs,
            cleanup_grace_secs: 2,
            ..SimulatorConfig::default()
        };
        SimulatorExecutor::new(
            config,
            self.path("bots"),
            self.path("work"),
            ArtifactStore::new(self.path("replays"), self.path("errors")),
        )
        .unwrap()
    }

    fn files_in(&self, dir: &str) -> Vec<PathBuf> {
        match fs::read_dir(self.path(dir)) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn plan() -> MatchPlan {
    MatchPlan {
        participants: vec!["alice".to_string(), "bob".to_string()],
        map_size: None,
    }
}

#[tokio::test]
async fn test_clean_match_is_ranked_and_archived() {
    let harness = Harness::new();
    let executor = harness.executor(
        r#"
echo "replay bytes" > "$2"
cat > "$1" <<EOF
{"players": [{"slot": 0, "rank": 2, "status": "finished", "last_frame_alive": 90},
             {"slot": 1, "rank": 1, "status": "finished", "last_frame_alive": 100}],
 "seed": "abc", "width": 30, "height": 30}
EOF
"#,
        10,
    );

    let record = executor.execute(plan()).await;

    assert_eq!(record.status, MatchStatus::Pending);
    assert_eq!(record.participants, vec!["alice", "bob"]);
    let order: Vec<&str> = record.ranking.iter().map(|p| p.bot.as_str()).collect();
    assert_eq!(order, ["bob", "alice"]);
    assert_eq!(record.ranking[1].last_frame_alive, Some(90));
    assert_eq!(record.seed.as_deref(), Some("abc"));
    assert_eq!(record.map_size, Some((30, 30)));

    let replay = record.replay.clone().unwrap();
    assert!(replay.exists());
    assert!(replay.to_string_lossy().ends_with(".hlt.gz"));
    assert!(harness.files_in("errors").is_empty());
    assert!(harness.files_in("work").is_empty());
}

#[tokio::test]
async fn test_timed_out_bot_gets_error_log() {
    let harness = Harness::new();
    let executor = harness.executor(
        r#"
echo "bob exceeded turn budget at frame 12" > bob.log
cat > "$1" <<EOF
{"players": [{"slot": 0, "rank": 2, "status": "finished"},
             {"slot": 1, "rank": 1, "status": "timed_out", "log": "bob.log"}]}
EOF
"#,
        10,
    );

    let record = executor.execute(plan()).await;

    assert_eq!(record.status, MatchStatus::Pending);
    assert_eq!(record.ranking[0].bot, "alice");
    assert_eq!(record.ranking[1].bot, "bob");
    assert_eq!(record.outcome_of("bob"), Some(Outcome::TimedOut));
    assert!(record.ranking[0].error_log.is_none());

    let log = record.ranking[1].error_log.clone().unwrap();
    assert_eq!(
        fs::read_to_string(log).unwrap().trim(),
        "bob exceeded turn budget at frame 12"
    );
    assert_eq!(harness.files_in("errors").len(), 1);
    // No replay written
    assert!(record.replay.is_none());
}

#[tokio::test]
async fn test_crash_log_falls_back_to_stderr_capture() {
    let harness = Harness::new();
    let executor = harness.executor(
        r#"
echo "segfault in alice" > 0.stderr
cat > "$1" <<EOF
{"players": [{"slot": 0, "rank": 1, "status": "crashed"},
             {"slot": 1, "rank": 2, "status": "finished"}]}
EOF
"#,
        10,
    );

    let record = executor.execute(plan()).await;
    let alice = record.ranking.iter().find(|p| p.bot == "alice").unwrap();
    let log = fs::read_to_string(alice.error_log.as_ref().unwrap()).unwrap();
    assert_eq!(log.trim(), "segfault in alice");
}

#[tokio::test]
async fn test_crash_without_any_log_gets_synthesized_note() {
    let harness = Harness::new();
    let executor = harness.executor(
        r#"
echo "player 2 died" >&2
cat > "$1" <<EOF
{"players": [{"slot": 0, "rank": 1, "status": "finished"},
             {"slot": 1, "rank": 2, "status": "crashed"}]}
EOF
"#,
        10,
    );

    let record = executor.execute(plan()).await;
    let bob = record.ranking.iter().find(|p| p.bot == "bob").unwrap();
    let log = fs::read_to_string(bob.error_log.as_ref().unwrap()).unwrap();
    assert!(log.contains("bob crashed"));
    assert!(log.contains("player 2 died"));
}

#[tokio::test]
async fn test_wall_clock_ceiling_voids_match() {
    let harness = Harness::new();
    let executor = harness.executor("sleep 30\n", 1);

    let started = Instant::now();
    let record = executor.execute(plan()).await;

    assert!(record.is_voided());
    assert!(record.error.as_deref().unwrap().contains("wall-clock"));
    assert!(record.ranking.iter().all(|p| p.outcome == Outcome::SimulatorError));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(harness.files_in("work").is_empty());
}

#[tokio::test]
async fn test_missing_executable_voids_match() {
    let harness = Harness::new();
    let mut executor = harness.executor("", 10);
    executor.config.executable = PathBuf::from("/nonexistent/halite");

    let record = executor.execute(plan()).await;
    assert!(record.is_voided());
    assert!(record.error.as_deref().unwrap().contains("failed to spawn"));
}

#[tokio::test]
async fn test_clean_exit_without_result_voids_match() {
    let harness = Harness::new();
    let executor = harness.executor("echo 'forgot the results'\n", 10);

    let record = executor.execute(plan()).await;
    assert!(record.is_voided());
    assert!(record.error.as_deref().unwrap().contains("result file"));
}

#[tokio::test]
async fn test_malformed_result_voids_match_and_drops_replay() {
    let harness = Harness::new();
    let executor = harness.executor(
        r#"
echo "replay" > "$2"
echo '{"players": [{"slot": 0, "rank": 1, "status": "finished"}]}' > "$1"
"#,
        10,
    );

    let record = executor.execute(plan()).await;
    assert!(record.is_voided());
    assert!(record.replay.is_none());
    assert!(harness.files_in("replays").is_empty());
}

#[tokio::test]
async fn test_nonzero_exit_voids_match() {
    let harness = Harness::new();
    let executor = harness.executor("echo 'bad map size' >&2\nexit 2\n", 10);

    let record = executor.execute(plan()).await;
    assert!(record.is_voided());
    assert!(record.error.as_deref().unwrap().contains("bad map size"));
}

#[tokio::test]
async fn test_invalid_bot_name_voids_match() {
    let harness = Harness::new();
    let executor = harness.executor("exit 0\n", 10);

    let record = executor
        .execute(MatchPlan {
            participants: vec!["alice".to_string(), "../escape".to_string()],
            map_size: None,
        })
        .await;
    assert!(record.is_voided());
    assert!(record.error.as_deref().unwrap().contains("invalid bot name"));
}

#[test]
fn test_build_args_substitutes_everything() {
    let harness = Harness::new();
    let mut executor = harness.executor("", 10);
    executor.config.args = vec!["-d".to_string(), "{width} {height}".to_string(), "-o".to_string()];

    let scratch = harness.path("work/m1");
    let args = executor
        .build_args(
            &MatchPlan {
                participants: vec!["alice".to_string(), "bob".to_string()],
                map_size: Some((25, 30)),
            },
            &scratch,
        )
        .unwrap();

    let bots = harness.path("bots");
    assert_eq!(
        args,
        vec![
            "-d".to_string(),
            "25 30".to_string(),
            "-o".to_string(),
            format!("{}/run.sh 2> {}/0.stderr", bots.join("alice").display(), scratch.display()),
            "alice".to_string(),
            format!("{}/run.sh 2> {}/1.stderr", bots.join("bob").display(), scratch.display()),
            "bob".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_relative_roots_resolve_against_worker_cwd() {
    let harness = Harness::relative();
    let executor = harness.executor(
        r#"
echo "replay bytes" > "$2"
cat > "$1" <<EOF
{"players": [{"slot": 0, "rank": 1, "status": "finished"},
             {"slot": 1, "rank": 2, "status": "finished"}]}
EOF
"#,
        10,
    );
    assert!(executor.bot_root.is_absolute());
    assert!(executor.work_dir.is_absolute());

    let record = executor.execute(plan()).await;

    assert_eq!(record.status, MatchStatus::Pending, "{:?}", record.error);
    let replay = record.replay.clone().unwrap();
    assert!(replay.is_absolute());
    assert!(replay.exists());
    assert_eq!(harness.files_in("replays").len(), 1);
    assert!(harness.files_in("work").is_empty());
}

#[test]
fn test_relative_executable_is_made_absolute() {
    let harness = Harness::relative();
    let config = SimulatorConfig {
        executable: PathBuf::from("./simulator"),
        ..SimulatorConfig::default()
    };
    let executor = SimulatorExecutor::new(
        config,
        harness.path("bots"),
        harness.path("work"),
        ArtifactStore::new(harness.path("replays"), harness.path("errors")),
    )
    .unwrap();
    assert!(executor.config.executable.is_absolute());
    assert!(executor.config.executable.ends_with("simulator"));

    // Bare names are left to PATH lookup
    assert_eq!(harness.executor("", 10).config.executable, PathBuf::from("sh"));
}

#[tokio::test]
async fn test_replay_outside_match_dir_is_left_alone() {
    let harness = Harness::new();
    let outside = harness.path("operator.txt");
    fs::write(&outside, "keep me").unwrap();
    let executor = harness.executor(
        &format!(
            r#"
cat > "$1" <<EOF
{{"players": [{{"slot": 0, "rank": 1, "status": "finished"}},
              {{"slot": 1, "rank": 2, "status": "finished"}}],
 "replay": "{}"}}
EOF
"#,
            outside.display()
        ),
        10,
    );

    let record = executor.execute(plan()).await;

    assert!(record.is_voided());
    assert!(record.error.as_deref().unwrap().contains("match directory"));
    assert_eq!(fs::read_to_string(&outside).unwrap(), "keep me");
    assert!(harness.files_in("replays").is_empty());
}
