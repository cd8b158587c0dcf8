//! Shared test harness: an in-process gateway on an ephemeral port,
//! supervising a scripted stand-in child.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use analytics_gateway::bridge::Bridge;
use analytics_gateway::child::ChildHandle;
use analytics_gateway::config::Config;
use analytics_gateway::web::{self, AppState};

pub struct TestGateway {
    pub base_url: String,
    pub stream_url: String,
    pub bridge: Bridge,
    child: Option<ChildHandle>,
    server: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestGateway {
    /// Start a gateway whose child is the given command line.
    pub async fn start(
        child_command: &str,
        api_key: Option<&str>,
        response_timeout_secs: u64,
    ) -> Self {
        let mut argv = vec![
            "analytics-gateway".to_string(),
            "--child-command".to_string(),
            child_command.to_string(),
            "--response-timeout-secs".to_string(),
            response_timeout_secs.to_string(),
        ];
        if let Some(key) = api_key {
            argv.push("--api-key".to_string());
            argv.push(key.to_string());
        }
        let config = Config::try_parse_from(argv).expect("test config parses");

        let (bridge, child) = Bridge::connect(&config).await.expect("child spawns");
        let state = AppState::new(bridge.clone(), &config);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server = tokio::spawn(async move {
            web::serve_on(listener, state, async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("serve");
        });

        Self {
            base_url: format!("http://{addr}"),
            stream_url: format!("http://{addr}/mcp"),
            bridge,
            child: Some(child),
            server,
            shutdown: Some(shutdown_tx),
        }
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.server).await;
        if let Some(child) = self.child.take() {
            child.shutdown().await;
        }
    }
}

/// Write an executable shell script into `dir` and return its path as a
/// child command line.
pub fn script_child(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path.display().to_string()
}

/// Poll `/ping` until it returns the expected status or the deadline passes.
pub async fn wait_for_ping(
    client: &reqwest::Client,
    base_url: &str,
    expected: reqwest::StatusCode,
    deadline: Duration,
) -> bool {
    let started = std::time::Instant::now();
    while started.elapsed() < deadline {
        if let Ok(resp) = client.get(format!("{base_url}/ping")).send().await {
            if resp.status() == expected {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
