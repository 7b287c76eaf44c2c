use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{BoxFuture, FetchError, SourceFetcher};
use crate::utils::{apply_creation_flags, tool_available};

/// `git clone` into the destination directory.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    git: String,
}

impl GitFetcher {
    pub fn new(git: &str) -> Self {
        Self {
            git: git.to_string(),
        }
    }

    async fn clone_repo(&self, url: &str, dest: &Path, timeout: Duration) -> Result<(), FetchError> {
        let mut cmd = Command::new(&self.git);
        cmd.arg("clone")
            .arg("--")
            .arg(url)
            .arg(dest)
            // never block on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        apply_creation_flags(&mut cmd);

        tracing::info!("git clone {} -> {}", url, dest.display());

        // dropping the output future on timeout kills the clone
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("git clone timed out after {}s", timeout.as_secs());
                return Err(FetchError::Timeout(timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("git exited with {}", output.status)
            } else {
                stderr
            };
            return Err(FetchError::Failed(reason));
        }
        Ok(())
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new("git")
    }
}

impl SourceFetcher for GitFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), FetchError>> {
        Box::pin(self.clone_repo(url, dest, timeout))
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(tool_available(&self.git))
    }
}
