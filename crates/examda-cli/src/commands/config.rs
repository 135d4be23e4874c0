use std::path::PathBuf;

use crate::cli::ConfigCommands;
use crate::config_file::{default_config_path, CliConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, cli_db_path: Option<PathBuf>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            default_db_path,
            sync_interval_secs,
        } => run_config_init(api_base_url, default_db_path, sync_interval_secs),
        ConfigCommands::Show => run_config_show(cli_db_path),
    }
}

pub fn run_config_init(
    api_base_url: Option<String>,
    db_path: Option<PathBuf>,
    sync_interval_secs: Option<u64>,
) -> Result<(), CliError> {
    let config = merge_config(
        CliConfig::load().map_err(CliError::Config)?,
        api_base_url,
        db_path,
        sync_interval_secs,
    )?;

    let path = config.save().map_err(CliError::Config)?;
    println!("Config written to {}", path.display());
    println!("API: {}", config.api_base_url());
    Ok(())
}

/// Apply explicit `config init` flags over the stored file.
pub fn merge_config(
    mut config: CliConfig,
    api_base_url: Option<String>,
    db_path: Option<PathBuf>,
    sync_interval_secs: Option<u64>,
) -> Result<CliConfig, CliError> {
    if let Some(url) = examda_core::util::normalize_text_option(api_base_url) {
        config.api_base_url = Some(url.trim_end_matches('/').to_string());
    }
    if let Some(path) = db_path {
        config.db_path = Some(path);
    }
    if let Some(secs) = sync_interval_secs {
        config.sync_interval_secs = Some(secs);
    }
    config.validate().map_err(CliError::Config)?;
    Ok(config)
}

fn run_config_show(cli_db_path: Option<PathBuf>) -> Result<(), CliError> {
    let config = CliConfig::load()
        .map_err(CliError::Config)?
        .with_env_overrides();
    let client = config.client_config().map_err(CliError::Config)?;

    let file = default_config_path()
        .map_or_else(|| "(unavailable)".to_string(), |path| path.display().to_string());
    println!("config file:   {file}");
    println!("api:           {}", client.api_base_url);
    println!("database:      {}", config.resolve_db_path(cli_db_path).display());
    println!("sync interval: {}s", client.sync_interval_secs);
    println!("timeout:       {}s", client.request_timeout_secs);
    Ok(())
}
