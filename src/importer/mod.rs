//! Import orchestrator - drives fetch → detect → install → ready and owns the
//! launch manager for the imported game.
//!
//! All session state sits behind one `RwLock` that is never held across an
//! `.await`: fetch, detection, install and launch run unlocked, and the busy
//! states keep a second import out in the meantime.

pub mod error;
pub mod state;

pub use error::ImportError;
pub use state::{ImportState, StateMachine};

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::collaborators::{
    CommandInstaller, DependencyInstaller, GitFetcher, InstallPlan, SourceFetcher,
};
use crate::config::{GlobalConfig, ImporterConfig};
use crate::detector::{Detector, GameDescriptor, RuntimeType};
use crate::launcher::{self, LaunchInfo, LaunchManager, LaunchReport, NODE_INSTALL_MARKER};
use crate::log::{LogBuffer, LogLevel, LogLine, LogSource};

#[derive(Debug)]
struct ImportSession {
    machine: StateMachine,
    source_url: Option<String>,
    game_path: Option<PathBuf>,
    descriptor: Option<GameDescriptor>,
    /// Kept for the life of the process; reset does not clear it
    log: LogBuffer,
}

impl ImportSession {
    fn new() -> Self {
        Self {
            machine: StateMachine::new(),
            source_url: None,
            game_path: None,
            descriptor: None,
            log: LogBuffer::unbounded(),
        }
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => tracing::error!("[import] {}", message),
            LogLevel::Warn => tracing::warn!("[import] {}", message),
            LogLevel::Debug => tracing::debug!("[import] {}", message),
            LogLevel::Info => tracing::info!("[import] {}", message),
        }
        self.log.push(LogSource::System, level, message);
    }

    /// Back to Idle with everything but the log cleared.
    fn clear(&mut self) -> Result<(), ImportError> {
        self.machine.transition(ImportState::Idle)?;
        self.source_url = None;
        self.game_path = None;
        self.descriptor = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportStatus {
    pub status: ImportState,
    pub logs: Vec<LogLine>,
    pub game_path: Option<PathBuf>,
    pub source_url: Option<String>,
    pub git_available: bool,
    pub launch: Option<LaunchInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameInfo {
    #[serde(flatten)]
    pub descriptor: GameDescriptor,
    pub strategy: &'static str,
    pub game_path: PathBuf,
}

pub struct GameImporter {
    config: ImporterConfig,
    detector: Detector,
    fetcher: Arc<dyn SourceFetcher>,
    installer: Arc<dyn DependencyInstaller>,
    launcher: LaunchManager,
    session: RwLock<ImportSession>,
}

impl GameImporter {
    pub fn new(
        config: &GlobalConfig,
        fetcher: Arc<dyn SourceFetcher>,
        installer: Arc<dyn DependencyInstaller>,
    ) -> Self {
        Self {
            config: config.importer.clone(),
            detector: Detector::from_config(&config.launch),
            launcher: LaunchManager::new(&config.launch, installer.clone()),
            fetcher,
            installer,
            session: RwLock::new(ImportSession::new()),
        }
    }

    /// Wire up the command-backed collaborators (`git`, `pip`, `npm`).
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            config,
            Arc::new(GitFetcher::new(&config.launch.git)),
            Arc::new(CommandInstaller::from_config(&config.launch)),
        )
    }

    fn read(&self) -> RwLockReadGuard<'_, ImportSession> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ImportSession> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.write().log(level, message);
    }

    // ─── Import ──────────────────────────────────────────────

    /// Import the repository at `url` and run it through detection and
    /// dependency setup. Returns once the session is Ready or Failed.
    pub async fn import(&self, url: &str) -> Result<GameDescriptor, ImportError> {
        let url = url.trim();
        if let Err(e) = self.validate_source(url) {
            self.log(LogLevel::Error, e.to_string());
            return Err(e);
        }

        let had_previous = {
            let mut session = self.write();
            let current = session.machine.state();
            if current.is_busy() {
                let err = ImportError::Busy(current);
                session.log(LogLevel::Warn, format!("Import refused: {}", err));
                return Err(err);
            }
            let had_previous = current != ImportState::Idle;
            if had_previous {
                session.clear()?;
                session.log(LogLevel::Info, "Previous import discarded");
            }
            session.machine.transition(ImportState::Fetching)?;
            session.source_url = Some(url.to_string());
            session.log(LogLevel::Info, format!("Fetching {}", url));
            had_previous
        };

        if had_previous {
            self.launcher.stop().await;
        }

        let dest = self.config.game_dir.clone();
        if let Err(message) = self.fetch(url, &dest).await {
            self.fail(message.clone());
            return Err(ImportError::FetchFailure(message));
        }

        match self.inspect_and_configure(&dest).await {
            Ok(descriptor) => Ok(descriptor),
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    fn validate_source(&self, url: &str) -> Result<(), ImportError> {
        if url.is_empty() {
            return Err(ImportError::InvalidSource("repository URL is required".to_string()));
        }
        let prefix = &self.config.allowed_source_prefix;
        if !url.starts_with(prefix.as_str()) {
            return Err(ImportError::InvalidSource(format!(
                "URL must start with {}",
                prefix
            )));
        }
        Ok(())
    }

    /// Clear `dest` and fetch into it. On failure `dest` is removed again.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), String> {
        remove_dir_if_exists(dest)
            .await
            .map_err(|e| format!("Cannot clear {}: {}", dest.display(), e))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Cannot create {}: {}", parent.display(), e))?;
        }

        let timeout = self.config.fetch_timeout();
        match self.fetcher.fetch(url, dest, timeout).await {
            Ok(()) => {
                let mut session = self.write();
                session.log(LogLevel::Info, "Repository fetched");
                session.game_path = Some(dest.to_path_buf());
                Ok(())
            }
            Err(e) => {
                if let Err(rm) = remove_dir_if_exists(dest).await {
                    tracing::warn!("Failed to clean up {}: {}", dest.display(), rm);
                }
                Err(format!("Fetch of {} failed: {}", url, e))
            }
        }
    }

    async fn inspect_and_configure(&self, dest: &Path) -> Result<GameDescriptor, ImportError> {
        self.write().machine.transition(ImportState::Inspecting)?;

        let descriptor = self.detect(dest).await?;
        {
            let mut session = self.write();
            session.log(
                LogLevel::Info,
                format!("Detected game type: {}", descriptor.runtime_type),
            );
            match &descriptor.main_file {
                Some(main) => session.log(LogLevel::Info, format!("Main file: {}", main)),
                None => session.log(
                    LogLevel::Warn,
                    format!(
                        "No launchable entry found; files: {}",
                        descriptor.structure.join(", ")
                    ),
                ),
            }
            session.descriptor = Some(descriptor.clone());
            session.machine.transition(ImportState::Configuring)?;
        }

        self.install_dependencies(&descriptor, dest).await;

        let mut session = self.write();
        session.machine.transition(ImportState::Ready)?;
        session.log(LogLevel::Info, "Game is ready");
        Ok(descriptor)
    }

    /// Best-effort; failures become warnings in the log.
    async fn install_dependencies(&self, descriptor: &GameDescriptor, dest: &Path) {
        let plan = match descriptor.runtime_type {
            RuntimeType::Python if !descriptor.dependencies.is_empty() => {
                self.log(
                    LogLevel::Info,
                    format!("Installing Python dependencies: {}", descriptor.dependencies.join(" ")),
                );
                InstallPlan {
                    runtime_type: RuntimeType::Python,
                    dependencies: descriptor.dependencies.clone(),
                    working_dir: dest.to_path_buf(),
                }
            }
            RuntimeType::Node if !dest.join(NODE_INSTALL_MARKER).exists() => {
                self.log(LogLevel::Info, "Installing node dependencies");
                InstallPlan {
                    runtime_type: RuntimeType::Node,
                    dependencies: Vec::new(),
                    working_dir: dest.to_path_buf(),
                }
            }
            _ => return,
        };

        match self.installer.install(&plan).await {
            Ok(()) => self.log(LogLevel::Info, "Dependencies installed"),
            Err(e) => self.log(LogLevel::Warn, format!("Dependency install failed: {}", e)),
        }
    }

    async fn detect(&self, dir: &Path) -> Result<GameDescriptor, ImportError> {
        let detector = self.detector.clone();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || detector.detect(&dir))
            .await
            .map_err(|e| ImportError::Internal(format!("Detection task failed: {}", e)))
    }

    fn fail(&self, message: String) {
        let mut session = self.write();
        if let Err(e) = session.machine.transition(ImportState::Failed) {
            tracing::error!("{}", e);
        }
        session.log(LogLevel::Error, message);
    }

    /// Back to Idle: stops the live launch and forgets the imported game.
    /// The log survives.
    pub async fn reset(&self) -> Result<(), ImportError> {
        {
            let mut session = self.write();
            let current = session.machine.state();
            if current.is_busy() {
                let err = ImportError::Busy(current);
                session.log(LogLevel::Warn, format!("Reset refused: {}", err));
                return Err(err);
            }
            session.clear()?;
            session.log(LogLevel::Info, "Reset");
        }
        self.launcher.stop().await;
        Ok(())
    }

    // ─── Read side ───────────────────────────────────────────

    pub fn state(&self) -> ImportState {
        self.read().machine.state()
    }

    pub fn game_path(&self) -> Option<PathBuf> {
        self.read().game_path.clone()
    }

    pub fn descriptor(&self) -> Option<GameDescriptor> {
        self.read().descriptor.clone()
    }

    /// Import log lines with id > `since`.
    pub fn logs(&self, since: u64) -> Vec<LogLine> {
        self.read().log.get_since(since)
    }

    pub async fn status(&self) -> ImportStatus {
        let git_available = self.fetcher.is_available().await;
        let launch = self.launcher.snapshot();
        let session = self.read();
        ImportStatus {
            status: session.machine.state(),
            logs: session.log.all(),
            game_path: session.game_path.clone(),
            source_url: session.source_url.clone(),
            git_available,
            launch,
        }
    }

    /// A fresh detection pass over the imported directory.
    pub async fn game_info(&self) -> Result<GameInfo, ImportError> {
        let game_path = self.game_path().ok_or(ImportError::NoGame)?;
        let descriptor = self.detect(&game_path).await?;
        let strategy = launcher::select(&descriptor, &game_path).name();
        Ok(GameInfo {
            descriptor,
            strategy,
            game_path,
        })
    }

    // ─── Launch ──────────────────────────────────────────────

    pub async fn start_launch(&self) -> Result<LaunchReport, ImportError> {
        let (descriptor, game_path) = {
            let session = self.read();
            match (
                session.machine.state(),
                &session.descriptor,
                &session.game_path,
            ) {
                (ImportState::Ready, Some(d), Some(p)) => (d.clone(), p.clone()),
                _ => return Err(ImportError::NoGame),
            }
        };

        let strategy = launcher::select(&descriptor, &game_path);
        if let launcher::LaunchStrategy::Unsupported { reason } = &strategy {
            self.log(
                LogLevel::Error,
                format!(
                    "Cannot launch: {}; files: {}",
                    reason,
                    descriptor.structure.join(", ")
                ),
            );
            return Err(ImportError::UnsupportedType(reason.clone()));
        }

        match self.launcher.start(&strategy).await {
            Ok(report) => {
                let mut session = self.write();
                for warning in &report.warnings {
                    session.log(LogLevel::Warn, warning.clone());
                }
                let target = match (&report.info.url, &report.info.command) {
                    (Some(url), _) => url.clone(),
                    (None, Some(cmd)) => cmd.join(" "),
                    (None, None) => strategy.name().to_string(),
                };
                session.log(LogLevel::Info, format!("Game launched: {}", target));
                Ok(report)
            }
            Err(e) => {
                let e = ImportError::from(e);
                self.log(LogLevel::Error, e.to_string());
                Err(e)
            }
        }
    }

    pub async fn stop_launch(&self) -> Option<LaunchInfo> {
        let stopped = self.launcher.stop().await;
        if stopped.is_some() {
            self.log(LogLevel::Info, "Game stopped");
        }
        stopped
    }

    pub fn launch_info(&self) -> Option<LaunchInfo> {
        self.launcher.snapshot()
    }

    pub async fn console(&self, since: u64, count: Option<usize>) -> Vec<LogLine> {
        self.launcher.console(since, count).await
    }

    /// Stop whatever is running; called once on process exit.
    pub async fn shutdown(&self) {
        if let Some(info) = self.launcher.stop().await {
            tracing::info!("Stopped {:?} launch during shutdown", info.kind);
        }
    }
}

async fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
