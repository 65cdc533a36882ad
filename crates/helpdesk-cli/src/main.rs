#![forbid(unsafe_code)]

mod app;
mod cmd;
mod identity;
mod output;

use app::{App, GlobalOpts};
use clap::{CommandFactory, Parser, Subcommand};
use helpdesk_core::config::{LoggingConfig, resolve_config};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "hd",
    author,
    version,
    about = "hd: helpdesk ticket lifecycle and assignment",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides --json and HELPDESK_FORMAT).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Database file (overrides the configured path).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (overrides HELPDESK_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as this staff member.
    #[arg(long, global = true)]
    as_staff: Option<String>,

    /// Act as this requester.
    #[arg(long, global = true)]
    as_user: Option<String>,

    /// Abort the command once this many milliseconds have passed.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }

    fn global_opts(&self) -> GlobalOpts {
        GlobalOpts {
            db: self.db.clone(),
            as_staff: self.as_staff.clone(),
            as_user: self.as_user.clone(),
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Create or migrate the helpdesk database",
        long_about = "Open the database, apply pending migrations and report the schema version.",
        after_help = "EXAMPLES:\n    # Initialize the configured database\n    hd init\n\n    # Use a specific file and save the effective config\n    hd --db ./desk.db init --write-config ./helpdesk.toml"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        subcommand,
        next_help_heading = "Setup",
        about = "Manage departments, teams and staff",
        after_help = "EXAMPLES:\n    # Build a small org\n    hd org dept add d-it --name IT\n    hd org team add net --department d-it --name Network\n    hd org staff add s-ana --name Ana --email ana@corp.io --role team-lead --team net\n\n    # List active staff of a team\n    hd org staff list --team net --active"
    )]
    Org(cmd::org::OrgCommand),

    #[command(
        subcommand,
        next_help_heading = "Tickets",
        about = "Create, inspect and move tickets",
        after_help = "EXAMPLES:\n    # Open a ticket as a requester\n    hd --as-user u-1 ticket create --title \"VPN drops\" --department d-it\n\n    # Resolve it as staff\n    hd --as-staff s-ana ticket status TCK-ABC12345 resolved --comment \"router swapped\"\n\n    # Reply with an internal note\n    hd --as-staff s-ana ticket message TCK-ABC12345 --internal --body \"check logs\""
    )]
    Ticket(cmd::ticket::TicketCommand),

    #[command(
        subcommand,
        next_help_heading = "Tickets",
        about = "Assign tickets to staff or teams",
        after_help = "EXAMPLES:\n    # Take a ticket\n    hd --as-staff s-bo assign self TCK-ABC12345\n\n    # Route to a team and pick an assignee\n    hd assign auto TCK-ABC12345 net"
    )]
    Assign(cmd::assign::AssignCommand),

    #[command(
        next_help_heading = "Tickets",
        about = "Show a ticket's audit history",
        long_about = "Show history newest first. Requesters see status, assignee and team changes only.",
        after_help = "EXAMPLES:\n    # Full trail as staff\n    hd --as-staff s-ana history TCK-ABC12345\n\n    # Requester view as JSON\n    hd --as-user u-1 history TCK-ABC12345 --json"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Bash\n    hd completions bash > ~/.local/share/bash-completion/completions/hd"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

/// `HELPDESK_LOG`/`HELPDESK_LOG_FORMAT` override the config file.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_env("HELPDESK_LOG").unwrap_or_else(|_| {
        if env::var("DEBUG").is_ok() {
            EnvFilter::new("helpdesk=debug,hd=debug,info")
        } else {
            EnvFilter::new(&logging.filter)
        }
    });

    let format = env::var("HELPDESK_LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let output = cli.output_mode();

    let config = match resolve_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            render_error(output, &CliError::new(format!("{err:#}")))?;
            return Err(err);
        }
    };
    init_tracing(&config.logging);

    let opts = cli.global_opts();
    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, &opts, &config, output),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args, &mut command)
        }
        Commands::Org(ref command) => {
            let app = App::open(opts, &config, output)?;
            cmd::org::run_org(&app, command)
        }
        Commands::Ticket(command) => {
            let app = App::open(opts, &config, output)?;
            cmd::ticket::run_ticket(&app, command)
        }
        Commands::Assign(ref command) => {
            let app = App::open(opts, &config, output)?;
            cmd::assign::run_assign(&app, command)
        }
        Commands::History(ref args) => {
            let app = App::open(opts, &config, output)?;
            cmd::history::run_history(&app, args)
        }
    }
}
