//! Shared integration-test harness: temporary workspaces, a mock Discord
//! REST API, and helpers for spawning the `timebomb` binary.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

pub const GUILD: u64 = 1_198_697_252_374_462_564;
pub const LOG_CHANNEL: u64 = 1_198_697_252_374_462_565;
pub const FIRST_SUCCESS: u64 = 1_198_697_252_374_462_570;
pub const SECOND_SUCCESS: u64 = 1_198_697_252_374_462_571;
pub const FIRST_JAIL: u64 = 1_198_697_252_374_462_572;
pub const SECOND_JAIL: u64 = 1_198_697_252_374_462_573;

/// Environment variables the binary reads that must not leak in from the
/// developer's shell.
const SCRUBBED_ENV: &[&str] = &[
    "DISCORD_TOKEN",
    "DISCORD_API_BASE",
    "TIMEBOMB_CONFIG",
    "TIMEBOMB_BIND",
    "TIMEBOMB_API_TOKEN",
    "TIMEBOMB_METRICS_PORT",
    "TIMEBOMB_LOG_LEVEL",
    "TIMEBOMB_LOG_FORMAT",
];

/// Absolute path of a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

// ============================================================================
// Workspace
// ============================================================================

/// A temporary directory holding a valid config whose data file lives in
/// the same directory.
pub struct Workspace {
    dir: TempDir,
    pub config: PathBuf,
    pub data_file: PathBuf,
}

impl Workspace {
    /// Creates a workspace with no data file yet.
    #[allow(clippy::missing_panics_doc)]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let data_file = dir.path().join("data").join("user_data.json");
        let config = dir.path().join("timebomb.yaml");
        let yaml = format!(
            "guild_id: {GUILD}\n\
             log_channel: {LOG_CHANNEL}\n\
             roles:\n  \
               first_success: {FIRST_SUCCESS}\n  \
               second_success: {SECOND_SUCCESS}\n  \
               first_jail: {FIRST_JAIL}\n  \
               second_jail: {SECOND_JAIL}\n\
             timers:\n  \
               sweep_interval: 1h\n\
             data_file: {}\n",
            data_file.display()
        );
        std::fs::write(&config, yaml).expect("failed to write config");
        Self {
            dir,
            config,
            data_file,
        }
    }

    /// Creates a workspace seeded with the legacy data file fixture.
    #[allow(clippy::missing_panics_doc)]
    pub fn with_legacy_data() -> Self {
        let workspace = Self::new();
        workspace.write_data(
            &std::fs::read_to_string(fixture("legacy_user_data.json"))
                .expect("missing legacy fixture"),
        );
        workspace
    }

    /// Overwrites the data file.
    #[allow(clippy::missing_panics_doc)]
    pub fn write_data(&self, json: &str) {
        std::fs::create_dir_all(self.data_file.parent().expect("data file has a parent"))
            .expect("failed to create data dir");
        std::fs::write(&self.data_file, json).expect("failed to write data file");
    }

    /// Parses the data file.
    #[allow(clippy::missing_panics_doc)]
    pub fn read_data(&self) -> Value {
        let raw = std::fs::read_to_string(&self.data_file).expect("data file missing");
        serde_json::from_str(&raw).expect("data file is not JSON")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

// ============================================================================
// One-shot commands
// ============================================================================

/// Runs the binary to completion with a scrubbed environment.
#[allow(clippy::missing_panics_doc)]
pub fn run_cli(args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut command = std::process::Command::new(env!("CARGO_BIN_EXE_timebomb"));
    for var in SCRUBBED_ENV {
        command.env_remove(var);
    }
    command
        .args(args)
        .envs(envs.iter().copied())
        .env("NO_COLOR", "1")
        .stdin(Stdio::null())
        .output()
        .expect("failed to spawn timebomb")
}

/// Stdout as a string.
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr as a string.
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// Mock Discord
// ============================================================================

/// In-process stand-in for the Discord REST API. Records one line per
/// request: `dm <user>`, `message <channel> <title>`,
/// `add <user> <role>`, `remove <user> <role>`.
#[derive(Clone, Default)]
pub struct MockDiscord {
    requests: Arc<Mutex<Vec<String>>>,
    members: Arc<Vec<Value>>,
}

impl MockDiscord {
    /// Starts the mock with the given guild members and returns its base URL.
    #[allow(clippy::missing_panics_doc)]
    pub async fn start(members: Vec<Value>) -> (Self, String) {
        let mock = Self {
            requests: Arc::default(),
            members: Arc::new(members),
        };

        async fn dm_channel(
            State(mock): State<MockDiscord>,
            axum::Json(body): axum::Json<Value>,
        ) -> axum::Json<Value> {
            let user = body["recipient_id"].as_str().unwrap_or_default().to_string();
            mock.record(format!("dm {user}"));
            // Channel id mirrors the user id so messages can be attributed.
            axum::Json(json!({ "id": user }))
        }

        async fn message(
            State(mock): State<MockDiscord>,
            UrlPath(channel): UrlPath<String>,
            axum::Json(body): axum::Json<Value>,
        ) -> StatusCode {
            let title = body["embeds"][0]["title"].as_str().unwrap_or_default();
            mock.record(format!("message {channel} {title}"));
            StatusCode::OK
        }

        async fn add_role(
            State(mock): State<MockDiscord>,
            UrlPath((_guild, user, role)): UrlPath<(String, String, String)>,
        ) -> StatusCode {
            mock.record(format!("add {user} {role}"));
            StatusCode::NO_CONTENT
        }

        async fn remove_role(
            State(mock): State<MockDiscord>,
            UrlPath((_guild, user, role)): UrlPath<(String, String, String)>,
        ) -> StatusCode {
            mock.record(format!("remove {user} {role}"));
            StatusCode::NO_CONTENT
        }

        async fn list_members(State(mock): State<MockDiscord>) -> axum::Json<Value> {
            axum::Json(Value::Array(mock.members.as_ref().clone()))
        }

        let app = Router::new()
            .route("/users/@me/channels", post(dm_channel))
            .route("/channels/{channel}/messages", post(message))
            .route(
                "/guilds/{guild}/members/{user}/roles/{role}",
                put(add_role).delete(remove_role),
            )
            .route("/guilds/{guild}/members", get(list_members))
            .with_state(mock.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock");
        let addr = listener.local_addr().expect("mock has no address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (mock, format!("http://{addr}"))
    }

    fn record(&self, line: String) {
        self.requests.lock().expect("mock lock poisoned").push(line);
    }

    /// Every request recorded so far.
    #[allow(clippy::missing_panics_doc)]
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }

    /// Waits until a recorded request satisfies `pred`.
    #[allow(clippy::missing_panics_doc)]
    pub async fn wait_for(&self, pred: impl Fn(&str) -> bool) -> String {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(found) = self.requests().into_iter().find(|r| pred(r)) {
                return found;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for request; saw {:?}",
                self.requests()
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// A guild member entry in Discord's wire shape.
pub fn member(id: u64, roles: &[u64]) -> Value {
    json!({
        "user": { "id": id.to_string() },
        "roles": roles.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}

/// A bot account entry in Discord's wire shape.
pub fn bot_member(id: u64) -> Value {
    json!({ "user": { "id": id.to_string(), "bot": true }, "roles": [] })
}

// ============================================================================
// Long-running bot
// ============================================================================

pub const API_TOKEN: &str = "integration-secret";

/// A running `timebomb run` process. Killed on drop.
pub struct BotProcess {
    child: Child,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl BotProcess {
    /// Spawns `timebomb run` against `discord_base`, binding the admin API on
    /// an ephemeral port discovered from the JSON log stream.
    #[allow(clippy::missing_panics_doc)]
    pub async fn start(workspace: &Workspace, discord_base: &str) -> Self {
        let mut command = Command::new(env!("CARGO_BIN_EXE_timebomb"));
        for var in SCRUBBED_ENV {
            command.env_remove(var);
        }
        let mut child = command
            .args([
                "run",
                "--config",
                workspace.config.to_str().expect("non-UTF-8 config path"),
                "--bind",
                "127.0.0.1:0",
                "--log-format",
                "json",
            ])
            .env("DISCORD_TOKEN", "test-token")
            .env("DISCORD_API_BASE", discord_base)
            .env("TIMEBOMB_API_TOKEN", API_TOKEN)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn timebomb");

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut lines = BufReader::new(stderr).lines();

        let addr = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(line) = lines.next_line().await.expect("failed to read stderr") {
                let Ok(entry) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                if entry["fields"]["message"] == "admin API listening" {
                    return entry["fields"]["addr"]
                        .as_str()
                        .expect("listening line has no addr")
                        .to_string();
                }
            }
            panic!("bot exited before the admin API started");
        })
        .await
        .expect("timed out waiting for the admin API");

        // Keep draining so the child never blocks on a full pipe.
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

        Self {
            child,
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    /// An authenticated request builder for `path`.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(API_TOKEN)
    }

    /// Posts a platform event.
    #[allow(clippy::missing_panics_doc)]
    pub async fn send_event(&self, event: Value) -> reqwest::Response {
        self.request(reqwest::Method::POST, "/events")
            .json(&event)
            .send()
            .await
            .expect("event request failed")
    }

    /// Sends SIGTERM-equivalent shutdown by killing the process and waits.
    #[allow(clippy::missing_panics_doc)]
    pub async fn stop(mut self) {
        self.child.kill().await.expect("failed to kill bot");
    }
}
