use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file, relative to the working directory the daemon starts in.
const DEFAULT_CONFIG_PATH: &str = "config/global.toml";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GlobalConfig {
    pub importer: ImporterConfig,
    pub control: ControlConfig,
    pub launch: LaunchConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ImporterConfig {
    /// Well-known directory the imported game is cloned into
    pub game_dir: PathBuf,
    /// Import URLs must start with this prefix
    pub allowed_source_prefix: String,
    pub fetch_timeout_secs: u64,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            game_dir: PathBuf::from("./imported_game"),
            allowed_source_prefix: "https://github.com/".to_string(),
            fetch_timeout_secs: 300,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ControlConfig {
    pub listen_addr: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LaunchConfig {
    /// Port for the static game server (0 = ephemeral)
    pub port: u16,
    /// How long in-flight requests may drain after shutdown is requested
    pub drain_timeout_secs: u64,
    pub python: String,
    pub node: String,
    pub npm: String,
    pub git: String,
    /// Regex with a `level` capture group used to classify console lines
    pub console_log_pattern: Option<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            drain_timeout_secs: 5,
            python: default_python().to_string(),
            node: "node".to_string(),
            npm: default_npm().to_string(),
            git: "git".to_string(),
            console_log_pattern: Some(
                r"(?i)\b(?P<level>error|fatal|warn(?:ing)?|debug|trace|info)\b".to_string(),
            ),
        }
    }
}

impl LaunchConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl ImporterConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl GlobalConfig {
    /// Load `config/global.toml` (or `$GAME_IMPORTER_CONFIG`), then apply env overrides.
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("GAME_IMPORTER_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_path(Path::new(&path))
    }

    /// Like [`GlobalConfig::load`] with an explicit file, e.g. from `--config`.
    pub fn load_path(path: &Path) -> anyhow::Result<Self> {
        let mut cfg = Self::load_from(path)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)?;
        Self::from_toml(&s)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("GAME_IMPORTER_GAME_DIR") {
            self.importer.game_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("GAME_IMPORTER_LISTEN") {
            self.control.listen_addr = addr;
        }
    }

    /// Make the game directory absolute so later working-directory changes
    /// cannot redirect it.
    pub fn resolve_paths(&mut self) -> std::io::Result<()> {
        if self.importer.game_dir.is_relative() {
            self.importer.game_dir = std::env::current_dir()?.join(&self.importer.game_dir);
        }
        Ok(())
    }
}

fn default_python() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}

fn default_npm() -> &'static str {
    if cfg!(target_os = "windows") {
        "npm.cmd"
    } else {
        "npm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default() {
        let cfg = GlobalConfig::default();
        assert_eq!(cfg.importer.allowed_source_prefix, "https://github.com/");
        assert_eq!(cfg.importer.fetch_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.launch.port, 8000);
        assert_eq!(cfg.control.listen_addr, "0.0.0.0:5000");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = GlobalConfig::from_toml(
            r#"
            [importer]
            game_dir = "./ninja"

            [launch]
            port = 9001
            "#,
        )
        .unwrap();
        assert_eq!(cfg.importer.game_dir, PathBuf::from("./ninja"));
        assert_eq!(cfg.importer.fetch_timeout_secs, 300);
        assert_eq!(cfg.launch.port, 9001);
        assert_eq!(cfg.launch.node, "node");
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let cfg = GlobalConfig::from_toml(include_str!("../../config/global.toml")).unwrap();
        let defaults = LaunchConfig::default();
        assert_eq!(cfg.launch.port, defaults.port);
        assert_eq!(cfg.launch.console_log_pattern, defaults.console_log_pattern);
        assert_eq!(cfg.importer.fetch_timeout_secs, 300);
        assert_eq!(cfg.control.listen_addr, "0.0.0.0:5000");
    }

    #[test]
    fn test_malformed_toml_is_error() {
        assert!(GlobalConfig::from_toml("[launch]\nport = \"eighty\"").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GlobalConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.launch.drain_timeout_secs, 5);
    }

    #[test]
    fn test_resolve_paths_makes_game_dir_absolute() {
        let mut cfg = GlobalConfig::default();
        cfg.resolve_paths().unwrap();
        assert!(cfg.importer.game_dir.is_absolute());
    }
}
