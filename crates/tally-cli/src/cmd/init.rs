//! `tally init` — create an empty ledger and the project config.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use tally_core::config::{CONFIG_DIR, save_project_config};

use super::Context;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project name for the front matter. Defaults to the directory name.
    #[arg(long)]
    pub project: Option<String>,

    /// Task id prefix (`TASK` gives `TASK-001`).
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
struct InitResult {
    ledger: String,
    config: Option<String>,
    project: String,
    id_prefix: String,
}

/// Write the ledger and, if absent, `.tally/config.toml`.
///
/// # Errors
///
/// Fails if the ledger already exists or any write fails.
pub fn run_init(args: &InitArgs, ctx: &Context) -> Result<()> {
    let project = args.project.clone().unwrap_or_else(|| {
        ctx.project_root
            .file_name()
            .map_or_else(|| "tally".to_string(), |n| n.to_string_lossy().into_owned())
    });
    let prefix = args
        .prefix
        .clone()
        .unwrap_or_else(|| ctx.project().ledger.id_prefix.clone());

    let ledger = ctx.ledger();
    ledger
        .init(&project, &prefix, Utc::now())
        .map_err(|e| ctx.fail(&e))?;

    let config = if ctx.project_root.join(CONFIG_DIR).join("config.toml").exists() {
        None
    } else {
        let mut cfg = ctx.project().clone();
        cfg.ledger.id_prefix.clone_from(&prefix);
        Some(save_project_config(&ctx.project_root, &cfg)?)
    };

    let result = InitResult {
        ledger: ledger.path().display().to_string(),
        config: config.map(|p| p.display().to_string()),
        project,
        id_prefix: prefix,
    };
    render_mode(
        ctx.output,
        &result,
        |r, w| writeln!(w, "initialized {}", r.ledger),
        |r, w| {
            writeln!(w, "✓ Initialized task ledger.")?;
            writeln!(w)?;
            pretty_kv(w, "Ledger", &r.ledger)?;
            if let Some(config) = &r.config {
                pretty_kv(w, "Config", config)?;
            }
            pretty_kv(w, "Project", &r.project)?;
            pretty_kv(w, "Ids", format!("{}-001, {}-002, ...", r.id_prefix, r.id_prefix))?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  export TALLY_ACTOR=@your-name")?;
            writeln!(w, "  tally create --title \"First task\"")
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_args_default_to_none() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: InitArgs,
        }
        let w = Wrapper::parse_from(["test"]);
        assert!(w.args.project.is_none());
        assert!(w.args.prefix.is_none());

        let w = Wrapper::parse_from(["test", "--prefix", "WEB"]);
        assert_eq!(w.args.prefix.as_deref(), Some("WEB"));
    }
}
