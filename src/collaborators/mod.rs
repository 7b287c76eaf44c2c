//! External collaborators the importer drives but does not own: fetching a
//! repository into a directory and installing a game's dependencies.
//!
//! Both sit behind object-safe traits so the orchestrator can be exercised
//! with in-process fakes; the command-backed implementations shell out to
//! `git`, `pip` and `npm`.

mod git;
mod install;

pub use git::GitFetcher;
pub use install::CommandInstaller;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use crate::detector::RuntimeType;

/// Boxed future so the collaborator traits stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),

    #[error("could not run fetch tool: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum InstallError {
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("could not run {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },
}

/// Fetches a source repository into a directory.
pub trait SourceFetcher: Send + Sync {
    /// Populate `dest` from `url`, giving up after `timeout`. The caller clears
    /// `dest` beforehand.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), FetchError>>;

    /// Whether the underlying tool exists on this host. Must not have side effects.
    fn is_available(&self) -> BoxFuture<'_, bool>;
}

/// What to install and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub runtime_type: RuntimeType,
    pub dependencies: Vec<String>,
    pub working_dir: PathBuf,
}

/// Installs dependencies for a game. Callers treat every failure as a warning.
pub trait DependencyInstaller: Send + Sync {
    fn install<'a>(&'a self, plan: &'a InstallPlan) -> BoxFuture<'a, Result<(), InstallError>>;
}
