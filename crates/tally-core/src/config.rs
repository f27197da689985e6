use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::model::{DEFAULT_ID_PREFIX, normalize_agent_name};

/// Project-local settings directory.
pub const CONFIG_DIR: &str = ".tally";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub write: WriteConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

impl ProjectConfig {
    /// Ledger file location under `project_root`.
    #[must_use]
    pub fn ledger_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.ledger.file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_file")]
    pub file: PathBuf,
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            file: default_ledger_file(),
            id_prefix: default_id_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConfig {
    /// Refuse to write when the file changed since it was read.
    #[serde(default = "default_true")]
    pub check_fingerprint: bool,
    /// Log validation findings after each mutation.
    #[serde(default = "default_true")]
    pub validate: bool,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            check_fingerprint: default_true(),
            validate: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Defaults to `.tally-backups/` next to the ledger.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(CONFIG_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("tally/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write a project config, creating `.tally/` if needed.
pub fn save_project_config(project_root: &Path, config: &ProjectConfig) -> Result<PathBuf> {
    let dir = project_root.join(CONFIG_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join("config.toml");
    let content = toml::to_string_pretty(config).context("Failed to encode project config")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format)?;
    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// First non-blank of flag, environment, user config and login name,
/// normalized to `@name`.
#[must_use]
pub fn resolve_actor(
    cli: Option<&str>,
    env_actor: Option<&str>,
    user: Option<&str>,
    login: Option<&str>,
) -> Option<String> {
    [cli, env_actor, user, login]
        .into_iter()
        .flatten()
        .map(normalize_agent_name)
        .find(|name| !name.is_empty())
}

fn resolve_output(
    cli_json: bool,
    user_output: Option<String>,
    env_format: Option<String>,
) -> Result<String> {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return Ok("json".to_string());
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return Ok(mode.to_string());
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return Ok(mode.to_string());
    }

    if std::io::stdout().is_terminal() {
        Ok("pretty".to_string())
    } else {
        Ok("text".to_string())
    }
}

const fn default_true() -> bool {
    true
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from("TASKS.md")
}

fn default_id_prefix() -> String {
    DEFAULT_ID_PREFIX.to_string()
}

const fn default_retention() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = TempDir::new().expect("temp dir must be created");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.ledger.file, PathBuf::from("TASKS.md"));
        assert_eq!(cfg.ledger.id_prefix, "TASK");
        assert!(cfg.write.check_fingerprint);
        assert!(cfg.write.validate);
        assert_eq!(cfg.backup.retention, 10);
        assert!(cfg.backup.dir.is_none());
        assert_eq!(cfg.ledger_path(root.path()), root.path().join("TASKS.md"));
    }

    #[test]
    fn partial_project_config_keeps_other_defaults() {
        let root = TempDir::new().expect("temp dir must be created");
        std::fs::create_dir_all(root.path().join(CONFIG_DIR)).expect("create .tally");
        std::fs::write(
            root.path().join(".tally/config.toml"),
            "[ledger]\nfile = \"docs/BOARD.md\"\n\n[backup]\nretention = 3\n",
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.ledger.file, PathBuf::from("docs/BOARD.md"));
        assert_eq!(cfg.ledger.id_prefix, "TASK");
        assert_eq!(cfg.backup.retention, 3);
        assert!(cfg.write.validate);
    }

    #[test]
    fn broken_project_config_is_an_error() {
        let root = TempDir::new().expect("temp dir must be created");
        std::fs::create_dir_all(root.path().join(CONFIG_DIR)).expect("create .tally");
        std::fs::write(root.path().join(".tally/config.toml"), "[ledger\n").expect("write");
        let err = load_project_config(root.path()).expect_err("must fail");
        assert!(format!("{err:#}").contains("Failed to parse"));
    }

    #[test]
    fn saved_config_reloads() {
        let root = TempDir::new().expect("temp dir must be created");
        let mut cfg = ProjectConfig::default();
        cfg.ledger.id_prefix = "WEB".into();
        cfg.backup.dir = Some(PathBuf::from("snapshots"));
        save_project_config(root.path(), &cfg).expect("save");
        assert_eq!(load_project_config(root.path()).expect("load"), cfg);
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        let output = resolve_output(true, Some("pretty".to_string()), Some("text".to_string()))
            .expect("resolve should succeed");
        assert_eq!(output, "json");
    }

    #[test]
    fn env_format_beats_user_config() {
        let output = resolve_output(false, Some("json".to_string()), Some("plain".to_string()))
            .expect("resolve should succeed");
        assert_eq!(output, "text");
    }

    #[test]
    fn actor_resolution_order() {
        assert_eq!(
            resolve_actor(Some("cli"), Some("env"), Some("user"), Some("login")).as_deref(),
            Some("@cli")
        );
        assert_eq!(
            resolve_actor(None, Some(" "), Some("@user"), Some("login")).as_deref(),
            Some("@user")
        );
        assert_eq!(resolve_actor(None, None, None, Some("login")).as_deref(), Some("@login"));
        assert_eq!(resolve_actor(None, None, None, None), None);
    }

    #[test]
    fn user_config_parses_actor() {
        let cfg: UserConfig = toml::from_str("output = \"json\"\nactor = \"claude\"\n").expect("parse");
        assert_eq!(cfg.output.as_deref(), Some("json"));
        assert_eq!(cfg.actor.as_deref(), Some("claude"));
    }
}
