use examda_core::models::{ExamDraft, ExamRef};

use crate::commands::common::{parse_exam_time, App};
use crate::error::CliError;

pub async fn run_add(
    name: &str,
    at: &str,
    description: Option<String>,
    remind: &[u32],
    app: &App,
) -> Result<(), CliError> {
    let mut draft = ExamDraft::new(name, parse_exam_time(at)?).with_reminders(remind.iter().copied());
    draft.description = description;

    app.probe().await;
    let exam = app.exams.create(draft).await?;
    app.finish().await;

    let confirmed = app.exams.get(ExamRef::Local(exam.local_id)).await?;
    println!("{}", confirmed.id);
    Ok(())
}
