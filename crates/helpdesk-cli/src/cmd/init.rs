//! `hd init`: create or upgrade the helpdesk database.

use crate::app::{GlobalOpts, database_path};
use crate::output::{OutputMode, pretty_kv};
use anyhow::{Context as _, Result};
use clap::Args;
use helpdesk_core::HelpdeskConfig;
use helpdesk_core::db::{self, migrations};
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Also write a default config file to this path.
    #[arg(long, value_name = "PATH")]
    pub write_config: Option<std::path::PathBuf>,
}

#[derive(Debug, Serialize)]
struct InitReport {
    database: String,
    schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<String>,
}

/// Open the database, run pending migrations and report the schema version.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated, or the
/// config file cannot be written.
pub fn run_init(
    args: &InitArgs,
    opts: &GlobalOpts,
    config: &HelpdeskConfig,
    output: OutputMode,
) -> Result<()> {
    let path = database_path(opts, config);
    let conn = db::open_database(&path, config.database.busy_timeout())?;
    let schema_version = migrations::current_schema_version(&conn)?;
    tracing::info!(path = %path.display(), schema_version, "database ready");

    let written = match &args.write_config {
        Some(target) => {
            if target.exists() {
                anyhow::bail!(
                    "{} already exists; refusing to overwrite",
                    target.display()
                );
            }
            if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let text = toml::to_string_pretty(config)?;
            std::fs::write(target, text)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            Some(target.display().to_string())
        }
        None => None,
    };

    let report = InitReport {
        database: path.display().to_string(),
        schema_version,
        config: written,
    };
    crate::output::render_value(output, &report, |r, w| {
        pretty_kv(w, "Database", &r.database)?;
        pretty_kv(w, "Schema", r.schema_version.to_string())?;
        if let Some(config) = &r.config {
            pretty_kv(w, "Config", config)?;
        }
        writeln!(w, "✓ helpdesk initialized")
    })
}
