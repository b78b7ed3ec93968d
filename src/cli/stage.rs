//! shelf stage command implementations.

use serde::Serialize;

use crate::cli::{mark, CompletionChange, GlobalOptions, Session, StageCommands};
use crate::error::Result;
use crate::model::{Level, Stage, StagePatch};
use crate::output::{emit_success, HumanOutput};

#[derive(Serialize)]
struct StageListOutput {
    book_id: String,
    total: usize,
    stages: Vec<Stage>,
}

#[derive(Serialize)]
struct StageDeletedOutput {
    id: String,
    book_id: String,
    title: String,
}

pub fn run(command: StageCommands, globals: &GlobalOptions) -> Result<()> {
    let mut session = Session::open(globals)?;
    match command {
        StageCommands::New { book, title } => run_new(&mut session, &book, &title),
        StageCommands::List { book } => run_list(&session, &book),
        StageCommands::Rename { id, title } => run_rename(&mut session, &id, title),
        StageCommands::Done { id } => run_completion(&mut session, &id, CompletionChange::Done),
        StageCommands::Undone { id } => {
            run_completion(&mut session, &id, CompletionChange::Undone)
        }
        StageCommands::Toggle { id } => {
            run_completion(&mut session, &id, CompletionChange::Toggle)
        }
        StageCommands::Rm { id } => run_rm(&mut session, &id),
        StageCommands::Move { book, from, to } => run_move(&mut session, &book, from, to),
    }
}

fn run_new(session: &mut Session, book: &str, title: &str) -> Result<()> {
    let stage = session.coordinator.create_stage(book, title)?;

    let mut human = HumanOutput::new("Stage created");
    push_stage_summary(&mut human, &stage);
    human.push_next_step(format!("shelf task new {} <title>", stage.id));

    emit_success(session.output, "stage new", &stage, Some(&human))
}

fn run_list(session: &Session, book: &str) -> Result<()> {
    let book_id = session.resolve(Level::Book, book)?;
    let stages = session.coordinator.stages(&book_id)?;

    let mut human = HumanOutput::new("Stages");
    human.push_summary("Book", book_id.clone());
    human.push_summary("Total", stages.len().to_string());
    for stage in &stages {
        human.push_detail(stage_line(stage));
    }

    let output = StageListOutput {
        book_id,
        total: stages.len(),
        stages,
    };
    emit_success(session.output, "stage list", &output, Some(&human))
}

fn run_rename(session: &mut Session, id: &str, title: String) -> Result<()> {
    let stage = session
        .coordinator
        .update_stage(id, StagePatch { title: Some(title) })?;

    let mut human = HumanOutput::new("Stage renamed");
    push_stage_summary(&mut human, &stage);
    emit_success(session.output, "stage rename", &stage, Some(&human))
}

fn run_completion(session: &mut Session, id: &str, change: CompletionChange) -> Result<()> {
    let stage = match change {
        CompletionChange::Done => session.coordinator.set_stage_completed(id, true)?,
        CompletionChange::Undone => session.coordinator.set_stage_completed(id, false)?,
        CompletionChange::Toggle => session.coordinator.toggle_stage(id)?,
    };
    let book = session.coordinator.book(&stage.book_id)?;

    let header = if stage.is_completed {
        "Stage marked completed"
    } else {
        "Stage marked not completed"
    };
    let mut human = HumanOutput::new(header);
    push_stage_summary(&mut human, &stage);
    human.push_summary("Book progress", format!("{}%", book.progress));

    let command = format!("stage {}", change.command());
    emit_success(session.output, &command, &stage, Some(&human))
}

fn run_rm(session: &mut Session, id: &str) -> Result<()> {
    let stage = session.coordinator.delete_stage(id)?;

    let mut human = HumanOutput::new("Stage deleted");
    human.push_summary("ID", stage.id.clone());
    human.push_summary("Title", stage.title.clone());
    human.push_summary("Book", stage.book_id.clone());

    let output = StageDeletedOutput {
        id: stage.id,
        book_id: stage.book_id,
        title: stage.title,
    };
    emit_success(session.output, "stage rm", &output, Some(&human))
}

fn run_move(session: &mut Session, book: &str, from: usize, to: usize) -> Result<()> {
    let stages = session.coordinator.reorder_stages(book, from, to)?;
    let book_id = session.resolve(Level::Book, book)?;

    let mut human = HumanOutput::new("Stages reordered");
    for stage in &stages {
        human.push_detail(stage_line(stage));
    }

    let output = StageListOutput {
        book_id,
        total: stages.len(),
        stages,
    };
    emit_success(session.output, "stage move", &output, Some(&human))
}

fn push_stage_summary(human: &mut HumanOutput, stage: &Stage) {
    human.push_summary("ID", stage.id.clone());
    human.push_summary("Book", stage.book_id.clone());
    human.push_summary("Title", stage.title.clone());
    human.push_summary("Progress", format!("{}%", stage.progress));
    human.push_summary("Completed", stage.is_completed.to_string());
    human.push_summary("Position", stage.order_position.to_string());
}

fn stage_line(stage: &Stage) -> String {
    format!(
        "{}. {} {} {}% ({})",
        stage.order_position,
        mark(stage.is_completed),
        stage.title,
        stage.progress,
        stage.id
    )
}
