use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use examda_core::config::ClientConfig;
use examda_core::connectivity::{ConnectivityOracle, HttpProbe};
use examda_core::gateway::{HttpGateway, RemoteGateway};
use examda_core::models::{ExamRef, ExamView, ExamWindow, SyncState};
use examda_core::reminders::{LogNotifier, ReminderScheduler};
use examda_core::sync::{SyncEngine, SyncReport};
use examda_core::{ExamService, LocalStore, ProfileService};

use crate::cli::ListFilter;
use crate::config_file::CliConfig;
use crate::credentials::KeyringTokenStore;
use crate::error::CliError;

/// Everything a command needs, wired against one local database.
pub struct App {
    pub config: ClientConfig,
    pub store: LocalStore,
    pub tokens: Arc<KeyringTokenStore>,
    pub connectivity: Arc<ConnectivityOracle>,
    pub exams: ExamService,
    pub profiles: ProfileService,
}

impl App {
    pub async fn open(db_path: &Path, settings: &CliConfig) -> Result<Self, CliError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config = settings.client_config().map_err(CliError::Config)?;
        let store = LocalStore::uninitialized();
        store.initialize(db_path).await?;

        let tokens = Arc::new(KeyringTokenStore::for_api(&config.api_base_url));
        let gateway: Arc<dyn RemoteGateway> = Arc::new(HttpGateway::new(&config, tokens.clone())?);
        let connectivity = Arc::new(ConnectivityOracle::new(Arc::new(HttpProbe::new(&config)?)));
        let reminders = ReminderScheduler::new(store.clone(), Arc::new(LogNotifier::default()));
        let engine = SyncEngine::new(store.clone(), gateway.clone(), reminders.clone());
        let exams = ExamService::new(
            store.clone(),
            engine,
            connectivity.clone(),
            reminders.clone(),
        );
        let profiles = ProfileService::new(store.clone(), gateway, connectivity.clone(), reminders);

        Ok(Self {
            config,
            store,
            tokens,
            connectivity,
            exams,
            profiles,
        })
    }

    /// Probe once so façade calls know whether to confirm inline.
    pub async fn probe(&self) -> bool {
        let online = self.connectivity.is_online_now().await;
        tracing::debug!(online, "Connectivity probed");
        online
    }

    /// Wait for background confirmation before the process exits.
    pub async fn finish(&self) {
        self.exams.drain_background().await;
    }
}

pub fn parse_exam_ref(id: &str) -> Result<ExamRef, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyExamId);
    }
    Ok(trimmed.parse::<ExamRef>()?)
}

pub fn parse_exam_time(value: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| CliError::InvalidDateTime(value.trim().to_string()))
}

pub const fn exam_window(filter: ListFilter) -> ExamWindow {
    match filter {
        ListFilter::ThisWeek => ExamWindow::ThisWeek,
        ListFilter::ThisMonth => ExamWindow::ThisMonth,
    }
}

pub fn format_exam_lines(exams: &[ExamView], now: DateTime<Utc>) -> Vec<String> {
    exams
        .iter()
        .map(|exam| {
            let id = exam.id.to_string();
            let name = truncate(&exam.name, 32);
            let when = format_exam_time(exam.exam_date_time);
            let relative = format_time_until(exam.exam_date_time, now);
            let flags = exam_flags(exam);

            if flags.is_empty() {
                format!("{id:<6}  {name:<32}  {when}  {relative}")
            } else {
                format!("{id:<6}  {name:<32}  {when}  {relative:<12}  {flags}")
            }
        })
        .collect()
}

pub fn format_exam_detail(exam: &ExamView, now: DateTime<Utc>) -> Vec<String> {
    let mut lines = vec![
        format!("id:          {}", exam.id),
        format!("name:        {}", exam.name),
        format!(
            "when:        {} ({})",
            format_exam_time(exam.exam_date_time),
            format_time_until(exam.exam_date_time, now)
        ),
    ];
    if let Some(description) = exam.description.as_deref() {
        lines.push(format!("description: {description}"));
    }
    lines.push(format!("reminders:   {}", format_reminders(&exam.remind_before_minutes)));
    lines.push(format!("complete:    {}", if exam.is_complete { "yes" } else { "no" }));
    lines.push(format!("sync:        {}", exam.sync_state));
    lines
}

fn exam_flags(exam: &ExamView) -> String {
    let mut flags = Vec::new();
    if exam.is_complete {
        flags.push("done");
    }
    if exam.sync_state != SyncState::Synced {
        flags.push(exam.sync_state.as_str());
    }
    flags.join(" ")
}

pub fn format_reminders(offsets: &[u32]) -> String {
    if offsets.is_empty() {
        return "none".to_string();
    }
    offsets
        .iter()
        .map(|minutes| format_offset(*minutes))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_offset(minutes: u32) -> String {
    if minutes > 0 && minutes % 1440 == 0 {
        format!("{}d", minutes / 1440)
    } else if minutes > 0 && minutes % 60 == 0 {
        format!("{}h", minutes / 60)
    } else {
        format!("{minutes}m")
    }
}

pub fn format_exam_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub fn format_sync_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "never".to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Coarse distance to an exam: `in 3d`, `in 2h`, `5m ago`.
pub fn format_time_until(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = at.signed_duration_since(now).num_minutes();
    let magnitude = diff.unsigned_abs();
    let hour = 60;
    let day = 24 * hour;

    if magnitude < 1 {
        return "now".to_string();
    }
    let amount = if magnitude < hour {
        format!("{magnitude}m")
    } else if magnitude < day {
        format!("{}h", magnitude / hour)
    } else {
        format!("{}d", magnitude / day)
    };

    if diff > 0 {
        format!("in {amount}")
    } else {
        format!("{amount} ago")
    }
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync completed: {} pushed, {} pulled, {} removed",
        report.pushed, report.pulled, report.purged
    )];
    for failure in &report.errors {
        let subject = failure
            .exam
            .map_or_else(|| "all".to_string(), |exam| exam.to_string());
        lines.push(format!(
            "  {:?} failed for {subject}: {}",
            failure.phase, failure.message
        ));
    }
    lines
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
