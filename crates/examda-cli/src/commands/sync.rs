use examda_core::sync::SyncOutcome;

use crate::commands::common::{format_report_lines, format_sync_timestamp, App};
use crate::error::CliError;

pub async fn run_sync(as_json: bool, app: &App) -> Result<(), CliError> {
    if !app.probe().await {
        return Err(examda_core::Error::OfflineRequired("Sync".to_string()).into());
    }

    let outcome = app.exams.sync_now().await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        SyncOutcome::Completed(report) => {
            for line in format_report_lines(&report) {
                println!("{line}");
            }
        }
        SyncOutcome::Skipped => println!("Sync already in progress."),
    }
    Ok(())
}

pub async fn run_status(app: &App) -> Result<(), CliError> {
    let online = app.probe().await;
    let pending = app.exams.pending_count().await?;
    let last_sync = app.exams.last_sync_time().await?;
    let signed_in = app.tokens.load().map_err(CliError::Credentials)?.is_some();

    println!("api:        {}", app.config.api_base_url);
    println!("network:    {}", if online { "online" } else { "offline" });
    println!("signed in:  {}", if signed_in { "yes" } else { "no" });
    println!("pending:    {pending}");
    println!("last sync:  {}", format_sync_timestamp(last_sync));
    Ok(())
}
