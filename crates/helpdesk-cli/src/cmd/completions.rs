//! `hd completions`: shell completion scripts.

use anyhow::{Context as _, Result};
use clap::Args;
use clap_complete::{Shell, generate};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
    /// Write the script here instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// # Errors
///
/// Returns an error if the output file cannot be created or written.
pub fn run_completions(args: &CompletionsArgs, command: &mut clap::Command) -> Result<()> {
    let name = command.get_name().to_string();
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            generate(args.shell, command, name, &mut out);
            out.flush()
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), shell = %args.shell, "completions written");
        }
        None => generate(args.shell, command, name, &mut io::stdout().lock()),
    }
    Ok(())
}
