//! shelf task command implementations.

use serde::Serialize;

use crate::cli::{mark, parse_reference, CompletionChange, GlobalOptions, Session, TaskCommands};
use crate::error::Result;
use crate::model::{Level, ReferenceKind, Task, TaskPatch, TaskReference};
use crate::output::{emit_success, HumanOutput};

#[derive(Serialize)]
struct TaskListOutput {
    stage_id: String,
    total: usize,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct TaskDeletedOutput {
    id: String,
    stage_id: String,
    title: String,
}

/// A task plus the derived state of its parents after a completion change.
#[derive(Serialize)]
struct TaskCompletionOutput {
    task: Task,
    stage_progress: u8,
    stage_completed: bool,
    book_progress: u8,
    book_completed: bool,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub links: Vec<String>,
    pub files: Vec<String>,
    pub clear_references: bool,
}

pub fn run(command: TaskCommands, globals: &GlobalOptions) -> Result<()> {
    let mut session = Session::open(globals)?;
    match command {
        TaskCommands::New { stage, title } => run_new(&mut session, &stage, &title),
        TaskCommands::List { stage } => run_list(&session, &stage),
        TaskCommands::Show { id } => run_show(&session, &id),
        TaskCommands::Edit {
            id,
            title,
            description,
            links,
            files,
            clear_references,
        } => run_edit(
            &mut session,
            EditOptions {
                id,
                title,
                description,
                links,
                files,
                clear_references,
            },
        ),
        TaskCommands::Toggle { id } => {
            run_completion(&mut session, &id, CompletionChange::Toggle)
        }
        TaskCommands::Done { id } => run_completion(&mut session, &id, CompletionChange::Done),
        TaskCommands::Undone { id } => {
            run_completion(&mut session, &id, CompletionChange::Undone)
        }
        TaskCommands::Rm { id } => run_rm(&mut session, &id),
        TaskCommands::Move { stage, from, to } => run_move(&mut session, &stage, from, to),
    }
}

fn run_new(session: &mut Session, stage: &str, title: &str) -> Result<()> {
    let task = session.coordinator.create_task(stage, title)?;

    let mut human = HumanOutput::new("Task created");
    push_task_summary(&mut human, &task);
    human.push_next_step(format!("shelf task done {}", task.id));

    emit_success(session.output, "task new", &task, Some(&human))
}

fn run_list(session: &Session, stage: &str) -> Result<()> {
    let stage_id = session.resolve(Level::Stage, stage)?;
    let tasks = session.coordinator.tasks(&stage_id)?;

    let mut human = HumanOutput::new("Tasks");
    human.push_summary("Stage", stage_id.clone());
    human.push_summary("Total", tasks.len().to_string());
    for task in &tasks {
        human.push_detail(task_line(task));
    }

    let output = TaskListOutput {
        stage_id,
        total: tasks.len(),
        tasks,
    };
    emit_success(session.output, "task list", &output, Some(&human))
}

fn run_show(session: &Session, id: &str) -> Result<()> {
    let id = session.resolve(Level::Task, id)?;
    let task = session.coordinator.task(&id)?;

    let mut human = HumanOutput::new(format!("Task: {}", task.title));
    push_task_summary(&mut human, &task);
    if let Some(description) = &task.description {
        human.push_summary("Description", description.clone());
    }
    for reference in &task.task_references {
        human.push_detail(reference_line(reference));
    }

    emit_success(session.output, "task show", &task, Some(&human))
}

fn run_edit(session: &mut Session, options: EditOptions) -> Result<()> {
    let EditOptions {
        id,
        title,
        description,
        links,
        files,
        clear_references,
    } = options;

    let task = session.coordinator.update_task_with(&id, |task| {
        let references = if clear_references || !links.is_empty() || !files.is_empty() {
            let mut references = if clear_references {
                Vec::new()
            } else {
                task.task_references.clone()
            };
            for raw in &links {
                let (name, url) = parse_reference(raw)?;
                references.push(TaskReference::new(ReferenceKind::Link, name, url));
            }
            for raw in &files {
                let (name, url) = parse_reference(raw)?;
                references.push(TaskReference::new(ReferenceKind::File, name, url));
            }
            Some(references)
        } else {
            None
        };
        Ok(TaskPatch {
            title,
            description,
            references,
        })
    })?;

    let mut human = HumanOutput::new("Task updated");
    push_task_summary(&mut human, &task);
    human.push_summary("References", task.task_references.len().to_string());
    emit_success(session.output, "task edit", &task, Some(&human))
}

fn run_completion(session: &mut Session, id: &str, change: CompletionChange) -> Result<()> {
    let task = match change {
        CompletionChange::Done => session.coordinator.set_task_completed(id, true)?,
        CompletionChange::Undone => session.coordinator.set_task_completed(id, false)?,
        CompletionChange::Toggle => session.coordinator.toggle_task(id)?,
    };
    let stage = session.coordinator.stage(&task.stage_id)?;
    let book = session.coordinator.book(&stage.book_id)?;

    let header = if task.is_completed {
        "Task marked completed"
    } else {
        "Task marked not completed"
    };
    let mut human = HumanOutput::new(header);
    push_task_summary(&mut human, &task);
    human.push_summary("Stage progress", format!("{}%", stage.progress));
    human.push_summary("Book progress", format!("{}%", book.progress));

    let output = TaskCompletionOutput {
        task,
        stage_progress: stage.progress,
        stage_completed: stage.is_completed,
        book_progress: book.progress,
        book_completed: book.is_completed,
    };
    let command = format!("task {}", change.command());
    emit_success(session.output, &command, &output, Some(&human))
}

fn run_rm(session: &mut Session, id: &str) -> Result<()> {
    let task = session.coordinator.delete_task(id)?;

    let mut human = HumanOutput::new("Task deleted");
    human.push_summary("ID", task.id.clone());
    human.push_summary("Title", task.title.clone());
    human.push_summary("Stage", task.stage_id.clone());

    let output = TaskDeletedOutput {
        id: task.id,
        stage_id: task.stage_id,
        title: task.title,
    };
    emit_success(session.output, "task rm", &output, Some(&human))
}

fn run_move(session: &mut Session, stage: &str, from: usize, to: usize) -> Result<()> {
    let tasks = session.coordinator.reorder_tasks(stage, from, to)?;
    let stage_id = session.resolve(Level::Stage, stage)?;

    let mut human = HumanOutput::new("Tasks reordered");
    for task in &tasks {
        human.push_detail(task_line(task));
    }

    let output = TaskListOutput {
        stage_id,
        total: tasks.len(),
        tasks,
    };
    emit_success(session.output, "task move", &output, Some(&human))
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("ID", task.id.clone());
    human.push_summary("Stage", task.stage_id.clone());
    human.push_summary("Title", task.title.clone());
    human.push_summary("Completed", task.is_completed.to_string());
    human.push_summary("Position", task.order_position.to_string());
}

fn task_line(task: &Task) -> String {
    format!(
        "{}. {} {} ({})",
        task.order_position,
        mark(task.is_completed),
        task.title,
        task.id
    )
}

fn reference_line(reference: &TaskReference) -> String {
    format!("{} {}: {}", reference.kind, reference.title, reference.url)
}
