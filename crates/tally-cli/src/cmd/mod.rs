//! Command handlers. Each module owns its clap args and a `run_*` entry point.

pub mod agents;
pub mod archive;
pub mod backup;
pub mod claim;
pub mod comment;
pub mod create;
pub mod delete;
pub mod done;
pub mod init;
pub mod list;
pub mod next;
pub mod reopen;
pub mod show;
pub mod update;
pub mod validate;

use std::path::{Path, PathBuf};

use tally_core::config::{EffectiveConfig, ProjectConfig};
use tally_core::{Ledger, LedgerError, LedgerOptions};

use crate::agent;
use crate::output::{CliError, OutputMode, fail, render_error};

/// Everything a handler needs besides its own args.
pub struct Context {
    pub project_root: PathBuf,
    pub output: OutputMode,
    pub config: EffectiveConfig,
    actor_flag: Option<String>,
    file_override: Option<PathBuf>,
}

impl Context {
    pub fn new(
        project_root: PathBuf,
        output: OutputMode,
        config: EffectiveConfig,
        actor_flag: Option<String>,
        file_override: Option<PathBuf>,
    ) -> Self {
        Self {
            project_root,
            output,
            config,
            actor_flag,
            file_override,
        }
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.config.project
    }

    /// Ledger path: `--file` if given, else the project config's.
    pub fn ledger_path(&self) -> PathBuf {
        self.file_override.as_ref().map_or_else(
            || self.project().ledger_path(&self.project_root),
            |file| absolute(&self.project_root, file),
        )
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::open(self.ledger_path(), LedgerOptions::from(self.project()))
    }

    /// The acting agent, or a rendered `missing_actor` error.
    pub fn actor(&self) -> anyhow::Result<String> {
        match agent::require_actor(self.actor_flag.as_deref(), self.config.user.actor.as_deref()) {
            Ok(actor) => Ok(actor),
            Err(e) => {
                render_error(
                    self.output,
                    &CliError::with_details(&e.message, "Pass --actor @name", e.code),
                )?;
                anyhow::bail!("{}", e.message)
            }
        }
    }

    /// Render a ledger error and convert it for `main`.
    pub fn fail(&self, err: &LedgerError) -> anyhow::Error {
        fail(self.output, err)
    }
}

fn absolute(root: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        root.join(file)
    }
}

/// Split `a,b, c` style values and drop blanks.
pub fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_handles_commas_and_repeats() {
        let values = vec!["a, b".to_string(), "c".to_string(), " ,".to_string()];
        assert_eq!(split_list(&values), vec!["a", "b", "c"]);
    }

    #[test]
    fn relative_file_override_is_rooted() {
        let root = Path::new("/work");
        assert_eq!(absolute(root, Path::new("BOARD.md")), PathBuf::from("/work/BOARD.md"));
        assert_eq!(absolute(root, Path::new("/tmp/X.md")), PathBuf::from("/tmp/X.md"));
    }
}
