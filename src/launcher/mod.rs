//! Lifecycle manager - owns the single live launch (static listener or child
//! process) and runs games in the foreground for the standalone CLI.

pub mod process;
pub mod server;
pub mod strategy;
pub mod workdir;

pub use process::{GameProcess, ProcessStatus};
pub use server::StaticServer;
pub use strategy::{select, LaunchStrategy, NODE_INSTALL_MARKER};
pub use workdir::WorkingDirGuard;

use regex::Regex;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{watch, Mutex};

use crate::collaborators::{DependencyInstaller, InstallPlan};
use crate::config::LaunchConfig;
use crate::detector::RuntimeType;
use crate::log::LogLine;
use crate::utils::{apply_creation_flags, current_timestamp};
use process::SharedConsole;

#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("unsupported game: {0}")]
    Unsupported(String),

    #[error("failed to start '{program}': {source}")]
    SpawnFailure {
        program: String,
        source: std::io::Error,
    },

    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("cannot enter working directory {}: {source}", path.display())]
    WorkingDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ─── Launch info ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchKind {
    Server,
    Process,
}

/// Read-only snapshot of the live launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchInfo {
    pub kind: LaunchKind,
    pub pid: Option<u32>,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub command: Option<Vec<String>>,
    pub running: bool,
    pub exit_code: Option<i32>,
    pub started_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub info: LaunchInfo,
    /// Non-fatal problems, e.g. a failed dependency install
    pub warnings: Vec<String>,
}

pub enum LaunchHandle {
    Server {
        server: StaticServer,
        started_at: u64,
    },
    Process(GameProcess),
}

impl LaunchHandle {
    pub fn info(&self) -> LaunchInfo {
        match self {
            Self::Server { server, started_at } => LaunchInfo {
                kind: LaunchKind::Server,
                pid: None,
                port: Some(server.port()),
                url: Some(server.url()),
                command: None,
                running: server.is_running(),
                exit_code: None,
                started_at: *started_at,
            },
            Self::Process(process) => {
                let status = process.status();
                LaunchInfo {
                    kind: LaunchKind::Process,
                    pid: process.pid(),
                    port: None,
                    url: None,
                    command: Some(process.command().to_vec()),
                    running: status.is_running(),
                    exit_code: match status {
                        ProcessStatus::Exited(code) => code,
                        ProcessStatus::Running => None,
                    },
                    started_at: process.started_at(),
                }
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        match self {
            Self::Server { server, .. } => server.is_running(),
            Self::Process(process) => process.status().is_running(),
        }
    }

    /// Close the listener or kill the child. Returns the final snapshot.
    pub async fn shutdown(self, drain: Duration) -> LaunchInfo {
        let mut info = self.info();
        match self {
            Self::Server { server, .. } => server.shutdown(drain).await,
            Self::Process(mut process) => {
                let stopped = tokio::time::timeout(drain, process.stop()).await;
                match stopped {
                    Ok(ProcessStatus::Exited(code)) => info.exit_code = code,
                    Ok(ProcessStatus::Running) => {}
                    Err(_) => tracing::warn!(
                        "Game process {:?} not reaped within {}s",
                        process.pid(),
                        drain.as_secs()
                    ),
                }
            }
        }
        info.running = false;
        info
    }
}

// ─── Manager ─────────────────────────────────────────────────

/// Owns at most one live [`LaunchHandle`]. Launch operations are serialized;
/// snapshots are published on a watch channel so readers never wait on them.
pub struct LaunchManager {
    port: u16,
    drain_timeout: Duration,
    log_pattern: Option<Arc<Regex>>,
    installer: Arc<dyn DependencyInstaller>,
    active: Mutex<Option<LaunchHandle>>,
    info_tx: watch::Sender<Option<LaunchInfo>>,
    /// Console of the most recent process, kept readable after it exits
    console: RwLock<Option<SharedConsole>>,
}

impl LaunchManager {
    pub fn new(config: &LaunchConfig, installer: Arc<dyn DependencyInstaller>) -> Self {
        let log_pattern = config
            .console_log_pattern
            .as_deref()
            .and_then(|pat| match Regex::new(pat) {
                Ok(re) => Some(Arc::new(re)),
                Err(e) => {
                    tracing::warn!("Invalid console_log_pattern '{}': {}, levels default to info", pat, e);
                    None
                }
            });
        let (info_tx, _) = watch::channel(None);
        Self {
            port: config.port,
            drain_timeout: config.drain_timeout(),
            log_pattern,
            installer,
            active: Mutex::new(None),
            info_tx,
            console: RwLock::new(None),
        }
    }

    /// Start `strategy`, stopping whatever was live before.
    pub async fn start(&self, strategy: &LaunchStrategy) -> Result<LaunchReport, LaunchError> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            tracing::info!("Stopping previous launch before starting a new one");
            previous.shutdown(self.drain_timeout).await;
        }
        self.info_tx.send_replace(None);

        let mut warnings = Vec::new();
        let handle = match strategy {
            LaunchStrategy::Unsupported { reason } => {
                return Err(LaunchError::Unsupported(reason.clone()))
            }
            LaunchStrategy::ServeDirectory { root, main_file } => LaunchHandle::Server {
                server: StaticServer::bind(root, main_file.as_deref(), self.port).await?,
                started_at: current_timestamp(),
            },
            LaunchStrategy::RunChildProcess {
                working_dir,
                command,
                install_marker,
            } => {
                if let Some(marker) = install_marker {
                    if let Some(warning) =
                        ensure_installed(self.installer.as_ref(), working_dir, marker).await
                    {
                        warnings.push(warning);
                    }
                }
                let process = GameProcess::spawn(command, working_dir, self.log_pattern.clone()).await?;
                *self.console.write().unwrap_or_else(|e| e.into_inner()) = Some(process.console());
                LaunchHandle::Process(process)
            }
        };

        let info = handle.info();
        self.info_tx.send_replace(Some(info.clone()));
        *active = Some(handle);
        Ok(LaunchReport { info, warnings })
    }

    /// Stop the live launch, if any, and return its final snapshot.
    pub async fn stop(&self) -> Option<LaunchInfo> {
        let mut active = self.active.lock().await;
        let stopped = match active.take() {
            Some(handle) => Some(handle.shutdown(self.drain_timeout).await),
            None => None,
        };
        self.info_tx.send_replace(None);
        stopped
    }

    /// Current launch snapshot. Reaps a handle whose process or listener has
    /// ended; the last snapshot (with `running: false`) stays visible until
    /// the next start or stop.
    pub fn snapshot(&self) -> Option<LaunchInfo> {
        if let Ok(mut active) = self.active.try_lock() {
            if active.as_ref().is_some_and(|h| !h.is_alive()) {
                if let Some(dead) = active.take() {
                    let info = dead.info();
                    tracing::info!("Reaped finished launch (exit code {:?})", info.exit_code);
                    self.info_tx.send_replace(Some(info));
                }
            }
        }
        self.info_tx.borrow().clone()
    }

    /// Console lines of the current or most recent process with id > `since`,
    /// limited to the last `count` when given.
    pub async fn console(&self, since: u64, count: Option<usize>) -> Vec<LogLine> {
        let console = self.console.read().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(console) = console else {
            return Vec::new();
        };
        let buffer = console.lock().await;
        match count {
            // ids only grow, so the tail filtered by `since` is the tail of the filtered lines
            Some(count) => buffer
                .get_recent(count)
                .into_iter()
                .filter(|l| l.id > since)
                .collect(),
            None => buffer.get_since(since),
        }
    }
}

/// Install node dependencies when `marker` is missing from `working_dir`.
/// Returns a warning on failure; the launch goes ahead regardless.
pub async fn ensure_installed(
    installer: &dyn DependencyInstaller,
    working_dir: &Path,
    marker: &str,
) -> Option<String> {
    if working_dir.join(marker).exists() {
        return None;
    }
    tracing::info!("{} missing in {}, installing dependencies", marker, working_dir.display());
    let plan = InstallPlan {
        runtime_type: RuntimeType::Node,
        dependencies: Vec::new(),
        working_dir: working_dir.to_path_buf(),
    };
    match installer.install(&plan).await {
        Ok(()) => None,
        Err(e) => {
            let warning = format!("Dependency install failed: {}", e);
            tracing::warn!("{}", warning);
            Some(warning)
        }
    }
}

// ─── Foreground ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ForegroundOptions {
    pub port: u16,
    pub drain_timeout: Duration,
    pub open_browser: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundExit {
    ServerStopped,
    ProcessExited(Option<i32>),
    Interrupted,
}

/// Run a game until it ends or `shutdown` resolves. A child process runs with
/// inherited stdio, with the working directory held on the game directory for
/// its whole lifetime.
pub async fn run_foreground<F>(
    strategy: &LaunchStrategy,
    options: &ForegroundOptions,
    installer: &dyn DependencyInstaller,
    shutdown: F,
) -> Result<ForegroundExit, LaunchError>
where
    F: Future<Output = ()>,
{
    match strategy {
        LaunchStrategy::Unsupported { reason } => Err(LaunchError::Unsupported(reason.clone())),

        LaunchStrategy::ServeDirectory { root, main_file } => {
            let server = StaticServer::bind(root, main_file.as_deref(), options.port).await?;
            let url = server.url();
            tracing::info!("Game available at {}", url);
            if options.open_browser {
                if let Err(e) = open::that(&url) {
                    tracing::warn!("Could not open browser: {}", e);
                }
            }

            let exit = tokio::select! {
                _ = shutdown => ForegroundExit::Interrupted,
                _ = server.stopped() => ForegroundExit::ServerStopped,
            };
            server.shutdown(options.drain_timeout).await;
            Ok(exit)
        }

        LaunchStrategy::RunChildProcess {
            working_dir,
            command,
            install_marker,
        } => {
            if let Some(marker) = install_marker {
                ensure_installed(installer, working_dir, marker).await;
            }
            let (program, args) = command
                .split_first()
                .ok_or_else(|| LaunchError::Unsupported("empty launch command".to_string()))?;

            let _cwd = WorkingDirGuard::enter(working_dir)
                .await
                .map_err(|source| LaunchError::WorkingDir {
                    path: working_dir.clone(),
                    source,
                })?;

            let mut cmd = Command::new(program);
            cmd.args(args)
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .kill_on_drop(true);
            apply_creation_flags(&mut cmd);

            let mut child = cmd.spawn().map_err(|source| LaunchError::SpawnFailure {
                program: program.clone(),
                source,
            })?;
            tracing::info!("Running '{}' (pid {:?})", command.join(" "), child.id());

            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    tracing::info!("Game exited with {}", status);
                    Ok(ForegroundExit::ProcessExited(status.code()))
                }
                _ = shutdown => {
                    tracing::info!("Interrupted, stopping game");
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill game process: {}", e);
                    }
                    Ok(ForegroundExit::Interrupted)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{BoxFuture, InstallError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingInstaller {
        calls: AtomicUsize,
        fail: bool,
    }

    impl DependencyInstaller for CountingInstaller {
        fn install<'a>(&'a self, _plan: &'a InstallPlan) -> BoxFuture<'a, Result<(), InstallError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(InstallError::Failed {
                        tool: "npm".into(),
                        status: "exit status: 1".into(),
                        stderr: "ERR!".into(),
                    })
                } else {
                    Ok(())
                }
            })
        }
    }

    fn manager(installer: Arc<dyn DependencyInstaller>) -> LaunchManager {
        let config = LaunchConfig {
            port: 0,
            drain_timeout_secs: 2,
            ..LaunchConfig::default()
        };
        LaunchManager::new(&config, installer)
    }

    #[tokio::test]
    async fn test_ensure_installed_skips_when_marker_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(NODE_INSTALL_MARKER)).unwrap();
        let installer = CountingInstaller::default();
        assert!(ensure_installed(&installer, dir.path(), NODE_INSTALL_MARKER).await.is_none());
        assert_eq!(installer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ensure_installed_failure_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let installer = CountingInstaller {
            fail: true,
            ..Default::default()
        };
        let warning = ensure_installed(&installer, dir.path(), NODE_INSTALL_MARKER).await;
        assert!(warning.unwrap().contains("npm exited"));
        assert_eq!(installer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_creates_no_handle() {
        let mgr = manager(Arc::new(CountingInstaller::default()));
        let err = mgr
            .start(&LaunchStrategy::Unsupported { reason: "nothing".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Unsupported(_)));
        assert!(mgr.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_second_server_launch_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "hi").unwrap();
        let strategy = LaunchStrategy::ServeDirectory {
            root: dir.path().to_path_buf(),
            main_file: Some("index.html".into()),
        };
        let mgr = manager(Arc::new(CountingInstaller::default()));

        let first = mgr.start(&strategy).await.unwrap();
        let second = mgr.start(&strategy).await.unwrap();
        assert_eq!(mgr.snapshot().unwrap().port, second.info.port);

        // the first listener is closed unless the OS handed its port out again
        let first_port = first.info.port.unwrap();
        if Some(first_port) != second.info.port {
            assert!(tokio::net::TcpStream::connect(("127.0.0.1", first_port)).await.is_err());
        }

        let stopped = mgr.stop().await.unwrap();
        assert!(!stopped.running);
        assert!(mgr.snapshot().is_none());
        assert!(mgr.stop().await.is_none());
    }

    #[tokio::test]
    async fn test_console_empty_without_process() {
        let mgr = manager(Arc::new(CountingInstaller::default()));
        assert!(mgr.console(0, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_foreground_unsupported() {
        let options = ForegroundOptions {
            port: 0,
            drain_timeout: Duration::from_secs(1),
            open_browser: false,
        };
        let result = run_foreground(
            &LaunchStrategy::Unsupported { reason: "x".into() },
            &options,
            &CountingInstaller::default(),
            std::future::ready(()),
        )
        .await;
        assert!(matches!(result, Err(LaunchError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_foreground_server_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "hi").unwrap();
        let options = ForegroundOptions {
            port: 0,
            drain_timeout: Duration::from_secs(1),
            open_browser: false,
        };
        let strategy = LaunchStrategy::ServeDirectory {
            root: dir.path().to_path_buf(),
            main_file: Some("index.html".into()),
        };
        let exit = run_foreground(
            &strategy,
            &options,
            &CountingInstaller::default(),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await
        .unwrap();
        assert_eq!(exit, ForegroundExit::Interrupted);
    }
}
