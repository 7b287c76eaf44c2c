//! Type detector - classifies an unknown game directory by file-name heuristics.
//!
//! The tree is walked in lexicographic pre-order (entries of every directory
//! sorted by file name), so the same tree always produces the same descriptor
//! regardless of how the filesystem orders its entries. Every file is tested
//! against [`RULES`] in order; the first file matching any rule decides the
//! runtime type.
//!
//! Detection is read-only and keeps no state between calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use walkdir::{DirEntry, WalkDir};

/// Entry documents served as a web game.
const WEB_ENTRY_NAMES: &[&str] = &["index.html", "game.html", "main.html"];
/// Entry scripts run with the Python interpreter.
const PYTHON_ENTRY_NAMES: &[&str] = &["main.py", "game.py", "app.py"];
/// Standalone scripts run with the node binary when there is no manifest.
const SCRIPT_ENTRY_NAMES: &[&str] = &["main.js"];
const NODE_MANIFEST: &str = "package.json";
/// `main` used when package.json does not name one
const NODE_DEFAULT_MAIN: &str = "index.js";
const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Directories never descended into: VCS metadata and installed dependencies
/// would otherwise shadow the project's own entry files.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "__pycache__"];

/// How a game's files indicate it should be launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    /// Static HTML/JS served over HTTP
    Web,
    Python,
    /// Standalone script executed by node
    JavaScript,
    /// Node project described by package.json
    Node,
    Unknown,
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Web => "web",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Node => "node",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Result of one detection pass. Never mutated after creation; detect again
/// to observe changes on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDescriptor {
    #[serde(rename = "type")]
    pub runtime_type: RuntimeType,
    /// Entry file, relative to the game root, `/`-separated
    pub main_file: Option<String>,
    pub launch_command: Option<Vec<String>>,
    /// Collected from every requirements.txt in walk order
    pub dependencies: Vec<String>,
    /// Every file under the root, relative and sorted in walk order
    pub structure: Vec<String>,
}

impl GameDescriptor {
    pub fn unknown() -> Self {
        Self {
            runtime_type: RuntimeType::Unknown,
            main_file: None,
            launch_command: None,
            dependencies: Vec::new(),
            structure: Vec::new(),
        }
    }

    /// Whether the fields this runtime type needs in order to launch are present.
    pub fn is_launchable(&self) -> bool {
        match self.runtime_type {
            RuntimeType::Unknown => false,
            RuntimeType::Web => self.main_file.is_some(),
            RuntimeType::Python | RuntimeType::JavaScript | RuntimeType::Node => self
                .launch_command
                .as_ref()
                .is_some_and(|cmd| !cmd.is_empty()),
        }
    }
}

// ─── Rules ───────────────────────────────────────────────────

/// A file under consideration.
struct Candidate<'a> {
    path: &'a Path,
    /// Relative path, `/`-separated
    rel: &'a str,
    /// Lowercase basename
    name: &'a str,
}

struct RuleMatch {
    runtime_type: RuntimeType,
    main_file: String,
    launch_command: Option<Vec<String>>,
}

type Probe = fn(&Detector, &Candidate<'_>) -> Option<RuleMatch>;

struct Rule {
    name: &'static str,
    probe: Probe,
}

/// Evaluated top to bottom for every file; the first probe that matches wins.
const RULES: &[Rule] = &[
    Rule { name: "web-entry", probe: probe_web_entry },
    Rule { name: "python-entry", probe: probe_python_entry },
    Rule { name: "node-manifest", probe: probe_node_manifest },
    Rule { name: "script-entry", probe: probe_script_entry },
];

fn probe_web_entry(_: &Detector, c: &Candidate<'_>) -> Option<RuleMatch> {
    WEB_ENTRY_NAMES.contains(&c.name).then(|| RuleMatch {
        runtime_type: RuntimeType::Web,
        main_file: c.rel.to_string(),
        launch_command: None,
    })
}

fn probe_python_entry(d: &Detector, c: &Candidate<'_>) -> Option<RuleMatch> {
    PYTHON_ENTRY_NAMES.contains(&c.name).then(|| RuleMatch {
        runtime_type: RuntimeType::Python,
        main_file: c.rel.to_string(),
        launch_command: Some(vec![d.python.clone(), c.rel.to_string()]),
    })
}

/// Unparseable manifests are skipped, as if the file were not there.
fn probe_node_manifest(d: &Detector, c: &Candidate<'_>) -> Option<RuleMatch> {
    if c.name != NODE_MANIFEST {
        return None;
    }
    let content = match std::fs::read_to_string(c.path) {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!("Skipping unreadable {}: {}", c.rel, e);
            return None;
        }
    };
    let manifest: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Skipping invalid {}: {}", c.rel, e);
            return None;
        }
    };
    let obj = manifest.as_object()?;
    let main = obj
        .get("main")
        .and_then(|v| v.as_str())
        .map(|s| s.trim_start_matches("./"))
        .filter(|s| !s.is_empty())
        .unwrap_or(NODE_DEFAULT_MAIN);

    // main is relative to the manifest, the game runs from the root
    let main_file = match c.rel.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, main),
        None => main.to_string(),
    };

    Some(RuleMatch {
        runtime_type: RuntimeType::Node,
        launch_command: Some(vec![d.node.clone(), main_file.clone()]),
        main_file,
    })
}

fn probe_script_entry(d: &Detector, c: &Candidate<'_>) -> Option<RuleMatch> {
    SCRIPT_ENTRY_NAMES.contains(&c.name).then(|| RuleMatch {
        runtime_type: RuntimeType::JavaScript,
        main_file: c.rel.to_string(),
        launch_command: Some(vec![d.node.clone(), c.rel.to_string()]),
    })
}

// ─── Detector ────────────────────────────────────────────────

/// Classifies game directories. Holds only the interpreter names that end up
/// in launch commands.
#[derive(Debug, Clone)]
pub struct Detector {
    python: String,
    node: String,
}

impl Default for Detector {
    fn default() -> Self {
        let launch = crate::config::LaunchConfig::default();
        Self::new(&launch.python, &launch.node)
    }
}

impl Detector {
    pub fn new(python: &str, node: &str) -> Self {
        Self {
            python: python.to_string(),
            node: node.to_string(),
        }
    }

    pub fn from_config(launch: &crate::config::LaunchConfig) -> Self {
        Self::new(&launch.python, &launch.node)
    }

    /// Classify the tree under `root`. A missing or empty root yields `Unknown`.
    pub fn detect(&self, root: &Path) -> GameDescriptor {
        let files = walk_files(root);

        let mut descriptor = GameDescriptor::unknown();
        descriptor.dependencies = collect_dependencies(&files);
        descriptor.structure = files.iter().map(|(_, rel)| rel.clone()).collect();

        let matched = files
            .iter()
            .find_map(|(entry, rel)| self.classify(entry.path(), rel));

        if let Some(m) = matched {
            descriptor.runtime_type = m.runtime_type;
            descriptor.main_file = Some(m.main_file);
            descriptor.launch_command = m.launch_command;
        }

        tracing::debug!(
            "Detected {} in {} (main: {:?}, {} files)",
            descriptor.runtime_type,
            root.display(),
            descriptor.main_file,
            descriptor.structure.len()
        );
        descriptor
    }

    fn classify(&self, path: &Path, rel: &str) -> Option<RuleMatch> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        let candidate = Candidate { path, rel, name: &name };
        RULES.iter().find_map(|rule| {
            let m = (rule.probe)(self, &candidate)?;
            tracing::debug!("Rule '{}' matched {}", rule.name, rel);
            Some(m)
        })
    }
}

/// Dependency-scan mode: the contents of every requirements.txt under `root`.
pub fn scan_dependencies(root: &Path) -> Vec<String> {
    collect_dependencies(&walk_files(root))
}

fn collect_dependencies(files: &[(DirEntry, String)]) -> Vec<String> {
    let mut deps = Vec::new();
    for (entry, rel) in files {
        if !entry.file_name().eq_ignore_ascii_case(REQUIREMENTS_FILE) {
            continue;
        }
        match std::fs::read_to_string(entry.path()) {
            Ok(content) => deps.extend(parse_requirements(&content)),
            Err(e) => tracing::debug!("Ignoring unreadable {}: {}", rel, e),
        }
    }
    deps
}

/// One dependency per non-empty line; comment lines are dropped.
fn parse_requirements(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Every regular file under `root` paired with its `/`-separated relative path,
/// in lexicographic pre-order.
fn walk_files(root: &Path) -> Vec<(DirEntry, String)> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::debug!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let rel = relative_path(root, e.path())?;
            Some((e, rel))
        })
        .collect()
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && SKIPPED_DIRS
            .iter()
            .any(|d| entry.file_name().to_string_lossy() == *d)
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
