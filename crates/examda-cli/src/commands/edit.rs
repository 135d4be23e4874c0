use examda_core::models::{ExamPatch, ExamRef, FieldPatch};

use crate::commands::common::{parse_exam_ref, parse_exam_time, App};
use crate::error::CliError;

/// Field flags of `examda edit`.
#[derive(Debug, Default)]
pub struct EditArgs {
    pub name: Option<String>,
    pub at: Option<String>,
    pub description: Option<String>,
    pub clear_description: bool,
    pub remind: Vec<u32>,
    pub clear_reminders: bool,
}

pub fn build_patch(args: EditArgs) -> Result<ExamPatch, CliError> {
    let description = if args.clear_description {
        FieldPatch::Clear
    } else {
        args.description.map_or(FieldPatch::Keep, FieldPatch::Set)
    };
    let reminder_offsets = if args.clear_reminders {
        Some(std::collections::BTreeSet::new())
    } else if args.remind.is_empty() {
        None
    } else {
        Some(args.remind.into_iter().collect())
    };

    let patch = ExamPatch {
        name: args.name,
        description,
        exam_date_time: args.at.as_deref().map(parse_exam_time).transpose()?,
        reminder_offsets,
        ..ExamPatch::default()
    };
    if patch.is_empty() {
        return Err(CliError::EmptyEdit);
    }
    Ok(patch)
}

pub async fn run_edit(id: &str, args: EditArgs, app: &App) -> Result<(), CliError> {
    let exam = parse_exam_ref(id)?;
    let patch = build_patch(args)?;

    app.probe().await;
    let updated = app.exams.update(exam, patch).await?;
    app.finish().await;

    let confirmed = app.exams.get(ExamRef::Local(updated.local_id)).await?;
    println!("{}", confirmed.id);
    Ok(())
}

pub async fn run_complete(id: &str, app: &App) -> Result<(), CliError> {
    let exam = parse_exam_ref(id)?;
    let coins_before = cached_coins(app).await?;

    app.probe().await;
    let completed = app.exams.complete(exam).await?;
    app.finish().await;

    match app.exams.get(ExamRef::Local(completed.local_id)).await {
        Ok(pending) => println!("{} completed (waiting to sync)", pending.id),
        Err(examda_core::Error::RecordNotFound(_)) => {
            let earned = match (coins_before, cached_coins(app).await?) {
                (Some(before), Some(after)) if after > before => format!(" (+{} coins)", after - before),
                _ => String::new(),
            };
            println!("{} completed{earned}", completed.id);
        }
        Err(error) => return Err(error.into()),
    }
    Ok(())
}

pub async fn run_delete(id: &str, app: &App) -> Result<(), CliError> {
    let exam = parse_exam_ref(id)?;

    app.probe().await;
    app.exams.delete(exam).await?;
    app.finish().await;

    println!("{exam}");
    Ok(())
}

async fn cached_coins(app: &App) -> Result<Option<i64>, CliError> {
    Ok(app
        .store
        .cached_profile()
        .await?
        .map(|cached| cached.profile.coin))
}
