//! Maps a detection result to the action that runs it.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::detector::{GameDescriptor, RuntimeType};

/// Directory whose presence means node dependencies are already installed.
pub const NODE_INSTALL_MARKER: &str = "node_modules";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LaunchStrategy {
    /// Serve the directory over HTTP; never execute anything.
    ServeDirectory {
        root: PathBuf,
        main_file: Option<String>,
    },
    RunChildProcess {
        working_dir: PathBuf,
        command: Vec<String>,
        /// Checked before spawning; when absent, dependencies are installed first
        install_marker: Option<String>,
    },
    Unsupported {
        reason: String,
    },
}

impl LaunchStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ServeDirectory { .. } => "serve_directory",
            Self::RunChildProcess { .. } => "run_child_process",
            Self::Unsupported { .. } => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }
}

/// Pure mapping; never touches the filesystem.
pub fn select(descriptor: &GameDescriptor, game_dir: &Path) -> LaunchStrategy {
    match descriptor.runtime_type {
        RuntimeType::Unknown => LaunchStrategy::Unsupported {
            reason: "no recognizable game entry point".to_string(),
        },
        RuntimeType::Web => match &descriptor.main_file {
            Some(main) => LaunchStrategy::ServeDirectory {
                root: game_dir.to_path_buf(),
                main_file: Some(main.clone()),
            },
            None => LaunchStrategy::Unsupported {
                reason: "web game without an entry document".to_string(),
            },
        },
        rt @ (RuntimeType::Python | RuntimeType::JavaScript | RuntimeType::Node) => {
            match descriptor.launch_command.as_ref().filter(|c| !c.is_empty()) {
                Some(command) => LaunchStrategy::RunChildProcess {
                    working_dir: game_dir.to_path_buf(),
                    command: command.clone(),
                    install_marker: (rt == RuntimeType::Node)
                        .then(|| NODE_INSTALL_MARKER.to_string()),
                },
                None => LaunchStrategy::Unsupported {
                    reason: format!("{} game without a launch command", rt),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(rt: RuntimeType, main: Option<&str>, cmd: Option<&[&str]>) -> GameDescriptor {
        GameDescriptor {
            runtime_type: rt,
            main_file: main.map(String::from),
            launch_command: cmd.map(|c| c.iter().map(|s| s.to_string()).collect()),
            dependencies: vec![],
            structure: vec![],
        }
    }

    #[test]
    fn test_unknown_is_unsupported() {
        let s = select(&GameDescriptor::unknown(), Path::new("/games/x"));
        assert!(!s.is_supported());
        assert_eq!(s.name(), "unsupported");
    }

    #[test]
    fn test_web_serves_directory() {
        let s = select(
            &descriptor(RuntimeType::Web, Some("index.html"), None),
            Path::new("/games/x"),
        );
        assert_eq!(
            s,
            LaunchStrategy::ServeDirectory {
                root: PathBuf::from("/games/x"),
                main_file: Some("index.html".into()),
            }
        );
    }

    #[test]
    fn test_web_without_main_is_unsupported() {
        let s = select(&descriptor(RuntimeType::Web, None, None), Path::new("/g"));
        assert!(!s.is_supported());
    }

    #[test]
    fn test_node_carries_install_marker() {
        let s = select(
            &descriptor(RuntimeType::Node, Some("server.js"), Some(&["node", "server.js"])),
            Path::new("/g"),
        );
        match s {
            LaunchStrategy::RunChildProcess { command, install_marker, .. } => {
                assert_eq!(command, vec!["node", "server.js"]);
                assert_eq!(install_marker.as_deref(), Some(NODE_INSTALL_MARKER));
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_python_has_no_install_marker() {
        let s = select(
            &descriptor(RuntimeType::Python, Some("main.py"), Some(&["python3", "main.py"])),
            Path::new("/g"),
        );
        assert!(matches!(
            s,
            LaunchStrategy::RunChildProcess { install_marker: None, .. }
        ));
    }

    #[test]
    fn test_empty_command_is_unsupported() {
        let s = select(
            &descriptor(RuntimeType::Python, Some("main.py"), Some(&[])),
            Path::new("/g"),
        );
        assert!(!s.is_supported());
    }

    #[test]
    fn test_strategy_serializes_with_tag() {
        let s = LaunchStrategy::Unsupported { reason: "x".into() };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["strategy"], "unsupported");
    }
}
