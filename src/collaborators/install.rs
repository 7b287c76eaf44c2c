use std::process::Stdio;
use tokio::process::Command;

use super::{BoxFuture, DependencyInstaller, InstallError, InstallPlan};
use crate::config::LaunchConfig;
use crate::detector::RuntimeType;
use crate::utils::apply_creation_flags;

/// Installs dependencies with the host's package managers:
/// `<python> -m pip install <deps…>` for Python games, `npm install` for node ones.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    python: String,
    npm: String,
}

impl CommandInstaller {
    pub fn new(python: &str, npm: &str) -> Self {
        Self {
            python: python.to_string(),
            npm: npm.to_string(),
        }
    }

    pub fn from_config(launch: &LaunchConfig) -> Self {
        Self::new(&launch.python, &launch.npm)
    }

    async fn run(&self, plan: &InstallPlan) -> Result<(), InstallError> {
        let mut cmd = match plan.runtime_type {
            RuntimeType::Python => {
                if plan.dependencies.is_empty() {
                    return Ok(());
                }
                let mut cmd = Command::new(&self.python);
                cmd.args(["-m", "pip", "install"]).args(&plan.dependencies);
                cmd
            }
            RuntimeType::Node | RuntimeType::JavaScript => {
                let mut cmd = Command::new(&self.npm);
                cmd.arg("install");
                cmd
            }
            RuntimeType::Web | RuntimeType::Unknown => return Ok(()),
        };

        let tool = plan_tool_name(plan.runtime_type);
        cmd.current_dir(&plan.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        apply_creation_flags(&mut cmd);

        tracing::info!("{} install in {}", tool, plan.working_dir.display());
        let output = cmd.output().await.map_err(|source| InstallError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(InstallError::Failed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn plan_tool_name(runtime_type: RuntimeType) -> &'static str {
    match runtime_type {
        RuntimeType::Python => "pip",
        _ => "npm",
    }
}

impl DependencyInstaller for CommandInstaller {
    fn install<'a>(&'a self, plan: &'a InstallPlan) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(self.run(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(runtime_type: RuntimeType, deps: &[&str], dir: &std::path::Path) -> InstallPlan {
        InstallPlan {
            runtime_type,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            working_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_nothing_to_install_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let installer = CommandInstaller::new("definitely-not-python", "definitely-not-npm");
        assert!(installer.install(&plan(RuntimeType::Python, &[], dir.path())).await.is_ok());
        assert!(installer.install(&plan(RuntimeType::Web, &["x"], dir.path())).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_tool_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let installer = CommandInstaller::new("definitely-not-python", "definitely-not-npm");
        let err = installer
            .install(&plan(RuntimeType::Node, &[], dir.path()))
            .await
            .unwrap_err();
        match err {
            InstallError::Spawn { tool, .. } => assert_eq!(tool, "npm"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
