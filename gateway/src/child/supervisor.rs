//! Spawning and supervising the tool-server child

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::bridge::{self, CorrelationTable, SessionRegistry};
use crate::error::GatewayError;

/// How long after spawn the child must stay alive before the gateway
/// considers it started. Bounded above by the configured startup timeout.
const STARTUP_PROBE: Duration = Duration::from_millis(200);

/// Outbound frame queue depth between sessions and the stdin writer.
const OUTBOUND_QUEUE: usize = 64;

/// Resolved child command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl std::fmt::Display for ChildSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Handle to the single supervised child process.
#[derive(Debug)]
pub struct ChildHandle {
    pid: Option<u32>,
    alive: Arc<AtomicBool>,
    outbound: mpsc::Sender<String>,
    shutdown: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
}

impl ChildHandle {
    /// Start the child with piped stdin/stdout and begin supervising it.
    ///
    /// stderr is inherited so the tool server's own logs reach the container
    /// log stream. Fails if the executable cannot be launched or the process
    /// exits during the startup probe.
    pub async fn spawn(
        spec: &ChildSpec,
        startup_timeout: Duration,
        table: Arc<CorrelationTable>,
        sessions: Arc<SessionRegistry>,
    ) -> Result<ChildHandle, GatewayError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| GatewayError::ChildSpawn {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        tracing::info!(command = %spec, pid, "tool server started");

        // Instant-exit probe: a child that dies right away (missing module,
        // bad arguments) must fail startup, not the first request.
        tokio::time::sleep(STARTUP_PROBE.min(startup_timeout)).await;
        if let Some(status) = child
            .try_wait()
            .map_err(|_| GatewayError::ChildIo("could not poll child status"))?
        {
            return Err(GatewayError::ChildStartup {
                program: spec.program.clone(),
                status,
            });
        }

        let stdin = child
            .stdin
            .take()
            .ok_or(GatewayError::ChildIo("child stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(GatewayError::ChildIo("child stdout was not piped"))?;

        let alive = Arc::new(AtomicBool::new(true));

        // Writer task: sole owner of stdin. One queued line per frame keeps
        // messages from different sessions from interleaving mid-frame.
        let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = outbound_rx.recv().await {
                let write = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                };
                if let Err(e) = write.await {
                    tracing::warn!(error = %e, "tool server stdin closed");
                    break;
                }
            }
        });

        // Reader task: sole owner of stdout, routes each line back to the
        // originating session or the SSE broadcast.
        let reader_table = Arc::clone(&table);
        let reader_sessions = Arc::clone(&sessions);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => bridge::route_line(&line, &reader_table, &reader_sessions),
                    Ok(None) => {
                        tracing::info!("tool server closed stdout");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "error reading tool server stdout");
                        break;
                    }
                }
            }
        });

        // Exit watcher: flips liveness and fails in-flight requests on an
        // unexpected exit; performs the kill/reap on graceful shutdown.
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let watcher_alive = Arc::clone(&alive);
        let watcher = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    watcher_alive.store(false, Ordering::SeqCst);
                    match status {
                        Ok(status) => {
                            tracing::error!(%status, "tool server exited unexpectedly")
                        }
                        Err(e) => tracing::error!(error = %e, "failed to reap tool server"),
                    }
                    table.fail_all();
                }
                _ = &mut shutdown_rx => {
                    watcher_alive.store(false, Ordering::SeqCst);
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(error = %e, "failed to signal tool server");
                    }
                    match child.wait().await {
                        Ok(status) => tracing::info!(%status, "tool server stopped"),
                        Err(e) => tracing::warn!(error = %e, "failed to reap tool server"),
                    }
                    table.fail_all();
                }
            }
        });

        Ok(ChildHandle {
            pid,
            alive,
            outbound,
            shutdown: Some(shutdown_tx),
            watcher,
        })
    }

    /// OS process id, if the child is still attached.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Shared liveness flag; false once the child has exited.
    pub fn liveness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    /// Sender feeding the stdin writer task.
    pub fn outbound(&self) -> mpsc::Sender<String> {
        self.outbound.clone()
    }

    /// Whether the child is currently running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop the child and wait until it has been reaped.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.watcher).await;
    }
}
