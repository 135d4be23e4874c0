use chrono::Utc;

use crate::cli::ListFilter;
use crate::commands::common::{exam_window, format_exam_detail, format_exam_lines, parse_exam_ref, App};
use crate::error::CliError;

pub async fn run_list(filter: Option<ListFilter>, as_json: bool, app: &App) -> Result<(), CliError> {
    app.probe().await;
    let exams = app.exams.list(filter.map(exam_window)).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&exams)?);
    } else if exams.is_empty() {
        println!("No exams.");
    } else {
        for line in format_exam_lines(&exams, Utc::now()) {
            println!("{line}");
        }
    }

    app.finish().await;
    Ok(())
}

pub async fn run_show(id: &str, as_json: bool, app: &App) -> Result<(), CliError> {
    let exam = app.exams.get(parse_exam_ref(id)?).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&exam)?);
    } else {
        for line in format_exam_detail(&exam, Utc::now()) {
            println!("{line}");
        }
    }
    Ok(())
}
