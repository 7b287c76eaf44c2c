//! Background game process with captured console output.
//!
//! Spawned from inside a [`WorkingDirGuard`] so relative entry files resolve
//! against the game directory; the guard is released as soon as the child
//! exists. stdout/stderr are read line by line into a ring-buffered console.

use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, watch, Mutex};

use super::workdir::WorkingDirGuard;
use super::LaunchError;
use crate::log::{parse_log_level, LogBuffer, LogLevel, LogSource, DEFAULT_CONSOLE_BUFFER};
use crate::utils::{apply_creation_flags, current_timestamp};

pub type SharedConsole = Arc<Mutex<LogBuffer>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exit code, when the platform reports one
    Exited(Option<i32>),
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

pub struct GameProcess {
    pid: Option<u32>,
    command: Vec<String>,
    started_at: u64,
    console: SharedConsole,
    kill_tx: Option<oneshot::Sender<()>>,
    status_rx: watch::Receiver<ProcessStatus>,
}

impl GameProcess {
    /// Spawn `command` (program followed by its arguments) in `working_dir`.
    pub async fn spawn(
        command: &[String],
        working_dir: &Path,
        log_pattern: Option<Arc<Regex>>,
    ) -> Result<Self, LaunchError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| LaunchError::Unsupported("empty launch command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        apply_creation_flags(&mut cmd);

        let mut child = {
            let _cwd = WorkingDirGuard::enter(working_dir)
                .await
                .map_err(|source| LaunchError::WorkingDir {
                    path: working_dir.to_path_buf(),
                    source,
                })?;
            cmd.spawn().map_err(|source| LaunchError::SpawnFailure {
                program: program.clone(),
                source,
            })?
        };

        let pid = child.id();
        let console: SharedConsole = Arc::new(Mutex::new(LogBuffer::bounded(DEFAULT_CONSOLE_BUFFER)));
        console.lock().await.push(
            LogSource::System,
            LogLevel::Info,
            format!("Started '{}' (pid {})", command.join(" "), pid.unwrap_or(0)),
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, LogSource::Stdout, console.clone(), log_pattern.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, LogSource::Stderr, console.clone(), log_pattern));
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (status_tx, status_rx) = watch::channel(ProcessStatus::Running);

        // ── waiter ───────────────────────────────────────────
        // A dropped kill sender also counts as a kill request.
        {
            let console = console.clone();
            tokio::spawn(async move {
                let result = tokio::select! {
                    status = child.wait() => status,
                    _ = kill_rx => {
                        if let Err(e) = child.start_kill() {
                            tracing::debug!("kill failed: {}", e);
                        }
                        child.wait().await
                    }
                };
                let (code, msg) = match result {
                    Ok(status) => (status.code(), format!("Process exited with {}", status)),
                    Err(e) => (None, format!("Failed to wait for process: {}", e)),
                };
                tracing::info!("{}", msg);
                console.lock().await.push(LogSource::System, LogLevel::Info, msg);
                let _ = status_tx.send(ProcessStatus::Exited(code));
            });
        }

        tracing::info!("Spawned '{}' in {} (pid {:?})", program, working_dir.display(), pid);
        Ok(Self {
            pid,
            command: command.to_vec(),
            started_at: current_timestamp(),
            console,
            kill_tx: Some(kill_tx),
            status_rx,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn status(&self) -> ProcessStatus {
        *self.status_rx.borrow()
    }

    pub fn console(&self) -> SharedConsole {
        self.console.clone()
    }

    /// Wait for the process to exit on its own.
    pub async fn wait(&self) -> ProcessStatus {
        let mut rx = self.status_rx.clone();
        let status = match rx.wait_for(|s| !s.is_running()).await {
            Ok(status) => *status,
            Err(_) => ProcessStatus::Exited(None),
        };
        status
    }

    /// Kill the process and wait until it has been reaped.
    pub async fn stop(&mut self) -> ProcessStatus {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
        self.wait().await
    }
}

async fn pump_lines<R>(reader: R, source: LogSource, console: SharedConsole, pattern: Option<Arc<Regex>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut level = parse_log_level(&line, pattern.as_deref());
        // stderr lines default to at least Warn
        if source == LogSource::Stderr && level == LogLevel::Info {
            level = LogLevel::Warn;
        }
        console.lock().await.push(source, level, line);
    }
}
