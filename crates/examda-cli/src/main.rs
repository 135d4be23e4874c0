//! Examda CLI - exam reminders that keep working offline
//!
//! Every exam command runs against the local store first and reconciles with
//! the Examda API when the network is reachable.

mod cli;
mod commands;
mod config_file;
mod credentials;
mod error;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::App;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::edit::{run_complete, run_delete, run_edit, EditArgs};
use crate::commands::list::{run_list, run_show};
use crate::commands::profile::{run_inventory, run_password, run_profile, run_shop};
use crate::commands::sync::{run_status, run_sync};
use crate::config_file::CliConfig;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "examda=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
            return Ok(());
        }
        Some(Commands::Config { command }) => return run_config(command, cli.db_path),
        Some(Commands::Completions { shell, output }) => {
            return run_completions(shell, output.as_deref());
        }
        Some(command) => command,
    };

    let settings = CliConfig::load()
        .map_err(CliError::Config)?
        .with_env_overrides();
    let db_path = settings.resolve_db_path(cli.db_path);
    let app = App::open(&db_path, &settings).await?;

    match command {
        Commands::List { filter, json } => run_list(filter, json, &app).await?,
        Commands::Show { id, json } => run_show(&id, json, &app).await?,
        Commands::Add {
            name,
            at,
            description,
            remind,
        } => run_add(&name, &at, description, &remind, &app).await?,
        Commands::Edit {
            id,
            name,
            at,
            description,
            clear_description,
            remind,
            clear_reminders,
        } => {
            let args = EditArgs {
                name,
                at,
                description,
                clear_description,
                remind,
                clear_reminders,
            };
            run_edit(&id, args, &app).await?;
        }
        Commands::Complete { id } => run_complete(&id, &app).await?,
        Commands::Delete { id } => run_delete(&id, &app).await?,
        Commands::Sync { json } => run_sync(json, &app).await?,
        Commands::Status => run_status(&app).await?,
        Commands::Profile { json } => run_profile(json, &app).await?,
        Commands::Password { new_password } => run_password(&new_password, &app).await?,
        Commands::Shop { command } => run_shop(command, &app).await?,
        Commands::Inventory { command } => run_inventory(command, &app).await?,
        Commands::Auth { command } => run_auth(command, &app).await?,
        Commands::Config { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}
