//! shelf book command implementations.

use serde::Serialize;

use crate::cli::{mark, BookCommands, CompletionChange, GlobalOptions, Session};
use crate::error::Result;
use crate::model::{Book, BookPatch, Level};
use crate::output::{emit_success, HumanOutput};

#[derive(Serialize)]
struct BookListOutput {
    total: usize,
    books: Vec<Book>,
}

#[derive(Serialize)]
struct BookDeletedOutput {
    id: String,
    title: String,
}

pub fn run(command: BookCommands, globals: &GlobalOptions) -> Result<()> {
    let mut session = Session::open(globals)?;
    match command {
        BookCommands::New { title } => run_new(&mut session, &title),
        BookCommands::List => run_list(&session),
        BookCommands::Show { id } => run_show(&session, &id),
        BookCommands::Rename { id, title } => run_rename(&mut session, &id, title),
        BookCommands::Done { id } => run_completion(&mut session, &id, CompletionChange::Done),
        BookCommands::Undone { id } => {
            run_completion(&mut session, &id, CompletionChange::Undone)
        }
        BookCommands::Toggle { id } => {
            run_completion(&mut session, &id, CompletionChange::Toggle)
        }
        BookCommands::Rm { id } => run_rm(&mut session, &id),
        BookCommands::Move { from, to } => run_move(&mut session, from, to),
    }
}

fn run_new(session: &mut Session, title: &str) -> Result<()> {
    let book = session.coordinator.create_book(title)?;

    let mut human = HumanOutput::new("Book created");
    push_book_summary(&mut human, &book);
    human.push_next_step(format!("shelf stage new {} <title>", book.id));

    emit_success(session.output, "book new", &book, Some(&human))
}

fn run_list(session: &Session) -> Result<()> {
    let books = session.coordinator.books()?;

    let mut human = HumanOutput::new("Books");
    human.push_summary("Total", books.len().to_string());
    for book in &books {
        human.push_detail(book_line(book));
    }
    if books.is_empty() {
        human.push_next_step("shelf book new <title>");
    }

    let output = BookListOutput {
        total: books.len(),
        books,
    };
    emit_success(session.output, "book list", &output, Some(&human))
}

fn run_show(session: &Session, id: &str) -> Result<()> {
    let id = session.resolve(Level::Book, id)?;
    let tree = session.coordinator.book_tree(&id)?;

    let mut human = HumanOutput::new(format!("Book: {}", tree.book.title));
    push_book_summary(&mut human, &tree.book);
    human.push_summary("Stages", tree.stages.len().to_string());
    for stage in &tree.stages {
        human.push_detail(format!(
            "{}. {} {} {}% ({})",
            stage.stage.order_position,
            mark(stage.stage.is_completed),
            stage.stage.title,
            stage.stage.progress,
            stage.stage.id
        ));
        for task in &stage.tasks {
            human.push_detail(format!(
                "    {}. {} {} ({})",
                task.order_position,
                mark(task.is_completed),
                task.title,
                task.id
            ));
        }
    }

    emit_success(session.output, "book show", &tree, Some(&human))
}

fn run_rename(session: &mut Session, id: &str, title: String) -> Result<()> {
    let book = session
        .coordinator
        .update_book(id, BookPatch { title: Some(title) })?;

    let mut human = HumanOutput::new("Book renamed");
    push_book_summary(&mut human, &book);
    emit_success(session.output, "book rename", &book, Some(&human))
}

fn run_completion(session: &mut Session, id: &str, change: CompletionChange) -> Result<()> {
    let book = match change {
        CompletionChange::Done => session.coordinator.set_book_completed(id, true)?,
        CompletionChange::Undone => session.coordinator.set_book_completed(id, false)?,
        CompletionChange::Toggle => session.coordinator.toggle_book(id)?,
    };

    let header = if book.is_completed {
        "Book marked completed"
    } else {
        "Book marked not completed"
    };
    let mut human = HumanOutput::new(header);
    push_book_summary(&mut human, &book);

    let command = format!("book {}", change.command());
    emit_success(session.output, &command, &book, Some(&human))
}

fn run_rm(session: &mut Session, id: &str) -> Result<()> {
    let book = session.coordinator.delete_book(id)?;

    let mut human = HumanOutput::new("Book deleted");
    human.push_summary("ID", book.id.clone());
    human.push_summary("Title", book.title.clone());

    let output = BookDeletedOutput {
        id: book.id,
        title: book.title,
    };
    emit_success(session.output, "book rm", &output, Some(&human))
}

fn run_move(session: &mut Session, from: usize, to: usize) -> Result<()> {
    let books = session.coordinator.reorder_books(from, to)?;

    let mut human = HumanOutput::new("Books reordered");
    for book in &books {
        human.push_detail(book_line(book));
    }

    let output = BookListOutput {
        total: books.len(),
        books,
    };
    emit_success(session.output, "book move", &output, Some(&human))
}

fn push_book_summary(human: &mut HumanOutput, book: &Book) {
    human.push_summary("ID", book.id.clone());
    human.push_summary("Title", book.title.clone());
    human.push_summary("Progress", format!("{}%", book.progress));
    human.push_summary("Completed", book.is_completed.to_string());
    human.push_summary("Position", book.order_position.to_string());
}

fn book_line(book: &Book) -> String {
    format!(
        "{}. {} {} {}% ({})",
        book.order_position,
        mark(book.is_completed),
        book.title,
        book.progress,
        book.id
    )
}
