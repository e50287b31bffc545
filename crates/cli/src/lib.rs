pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "rfpdesk",
    about = "rfpdesk operator CLI",
    long_about = "Operate rfpdesk readiness, migrations, the demo vendor directory, and one-shot reply sync, scoring and dashboard runs.",
    after_help = "Examples:\n  rfpdesk doctor --json\n  rfpdesk seed\n  rfpdesk sync --template-id <id>\n  rfpdesk dashboard --template-id <id> --top 3"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo vendor directory (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model and mail readiness, DB connectivity and schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Sync vendor replies into quotations once")]
    Sync {
        #[arg(long)]
        template_id: String,
        #[arg(long, help = "Only this vendor's thread")]
        vendor_id: Option<i64>,
    },
    #[command(about = "Recompute the vendor ranking for a template")]
    Score {
        #[arg(long)]
        template_id: String,
    },
    #[command(about = "Show the top vendors and response counts for a template")]
    Dashboard {
        #[arg(long)]
        template_id: String,
        #[arg(long, help = "Number of vendors to show (defaults to rfp.default_top_n)")]
        top: Option<usize>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Sync { template_id, vendor_id } => commands::sync::run(&template_id, vendor_id),
        Command::Score { template_id } => commands::score::run(&template_id),
        Command::Dashboard { template_id, top } => commands::dashboard::run(&template_id, top),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
