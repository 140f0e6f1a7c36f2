// Process supervisor - owns the server child process from spawn to kill

use crate::commands::server::ServerStatus;
use crate::error::{SyncError, SyncResult};
use crate::launch::LaunchCommand;
use futures_util::future::join_all;
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub server_id: String,
    pub stream: OutputStream,
    pub line: String,
}

/// Receives console lines of a running server.
/// Lines of one stream arrive in order; stdout and stderr interleave freely.
pub trait ConsoleSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

impl ConsoleSink for tokio::sync::mpsc::UnboundedSender<LogEvent> {
    fn emit(&self, event: LogEvent) {
        // Receiver gone means nobody is watching the console anymore
        let _ = self.send(event);
    }
}

/// Forwards console lines to the log
pub struct TracingSink;

impl ConsoleSink for TracingSink {
    fn emit(&self, event: LogEvent) {
        match event.stream {
            OutputStream::Stdout => tracing::info!("[{}] {}", event.server_id, event.line),
            OutputStream::Stderr => tracing::warn!("[{}] {}", event.server_id, event.line),
        }
    }
}

pub struct ProcessSupervisor {
    server_id: String,
    status: ServerStatus,
    child: Option<Child>,
    readers: Vec<JoinHandle<()>>,
}

impl ProcessSupervisor {
    pub fn new(server_id: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            status: ServerStatus::Stopped,
            child: None,
            readers: Vec::new(),
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Spawn the server. With a console sink, stdout and stderr are read
    /// line by line on two tasks and forwarded to it.
    pub fn start(
        &mut self,
        command: &LaunchCommand,
        console: Option<Arc<dyn ConsoleSink>>,
    ) -> SyncResult<u32> {
        if self.child.is_some() {
            return Err(SyncError::ProcessStart(format!(
                "server {} is already running",
                self.server_id
            )));
        }

        self.status = ServerStatus::Starting;
        tracing::info!(
            "Starting server {}: {:?} {}",
            self.server_id,
            command.executable,
            command.render_args()
        );

        let mut cmd = tokio::process::Command::new(&command.executable);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null());

        if console.is_some() {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.status = ServerStatus::Stopped;
                tracing::error!("Failed to start server {}: {}", self.server_id, e);
                return Err(SyncError::ProcessStart(e.to_string()));
            }
        };

        if let Some(sink) = console {
            if let Some(stdout) = child.stdout.take() {
                self.readers.push(spawn_reader(
                    stdout,
                    self.server_id.clone(),
                    OutputStream::Stdout,
                    sink.clone(),
                ));
            }
            if let Some(stderr) = child.stderr.take() {
                self.readers.push(spawn_reader(
                    stderr,
                    self.server_id.clone(),
                    OutputStream::Stderr,
                    sink,
                ));
            }
        }

        let pid = child.id().unwrap_or_default();
        self.child = Some(child);
        self.status = ServerStatus::Running;
        tracing::info!("Server {} running with pid {}", self.server_id, pid);
        Ok(pid)
    }

    /// Hard kill. Returns once the process is gone.
    pub async fn stop(&mut self) -> SyncResult<()> {
        let Some(mut child) = self.child.take() else {
            return Err(SyncError::NotRunning(self.server_id.clone()));
        };

        self.status = ServerStatus::Stopping;
        tracing::info!("Killing server {}", self.server_id);

        let already_exited = matches!(child.try_wait(), Ok(Some(_)));
        if !already_exited {
            if let Err(e) = child.kill().await {
                tracing::error!("Failed to kill server {}: {}", self.server_id, e);
                self.child = Some(child);
                self.status = ServerStatus::Running;
                return Err(SyncError::ProcessKill(e.to_string()));
            }
        }

        self.drain_readers().await;
        self.status = ServerStatus::Stopped;
        tracing::info!("Server {} stopped", self.server_id);
        Ok(())
    }

    /// Check whether the process exited on its own. Returns the exit code
    /// (`None` inside when killed by a signal) once it has.
    pub async fn try_exit(&mut self) -> Option<Option<i32>> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!("Server {} exited with {:?}", self.server_id, status.code());
                self.child = None;
                self.drain_readers().await;
                self.status = ServerStatus::Stopped;
                Some(status.code())
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to poll server {}: {}", self.server_id, e);
                None
            }
        }
    }

    async fn drain_readers(&mut self) {
        let readers = std::mem::take(&mut self.readers);
        if readers.is_empty() {
            return;
        }

        let aborts: Vec<_> = readers.iter().map(|r| r.abort_handle()).collect();
        // Grandchildren can keep the pipes open after the server is gone
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, join_all(readers)).await.is_err() {
            tracing::debug!("Console readers for {} still open, aborting", self.server_id);
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

fn spawn_reader<R>(
    reader: R,
    server_id: String,
    stream: OutputStream,
    sink: Arc<dyn ConsoleSink>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(['\r', '\n']);
                    if !line.is_empty() {
                        sink.emit(LogEvent {
                            server_id: server_id.clone(),
                            stream,
                            line: line.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("Console stream for {} closed: {}", server_id, e);
                    break;
                }
            }
        }
    })
}
