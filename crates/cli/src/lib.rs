pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "slotwise",
    about = "Slotwise operator CLI",
    long_about = "Operate Slotwise migrations, demo fixtures, config inspection, readiness checks, and optimization passes.",
    after_help = "Examples:\n  slotwise doctor --json\n  slotwise migrate\n  slotwise optimize --warehouse wh-main"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo fixture dataset and verify it")]
    Seed,
    #[command(about = "Inspect effective configuration values as JSON")]
    Config,
    #[command(about = "Validate configuration and database connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Create and execute an optimization job for one warehouse")]
    Optimize {
        #[arg(long, help = "Warehouse to optimize")]
        warehouse: String,
        #[arg(long, default_value = "layout", help = "Job type: layout or picking_route")]
        job_type: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Optimize { warehouse, job_type } => {
            commands::optimize::run(&warehouse, &job_type)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
