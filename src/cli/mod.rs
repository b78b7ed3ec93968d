//! Command-line interface for shelf
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{resolve_library_dir, Config};
use crate::coordinator::HierarchyCoordinator;
use crate::error::{Error, Result};
use crate::model::Level;
use crate::notify::{JsonlNotifier, NotificationDestination, TracingNotifier};
use crate::output::OutputOptions;
use crate::storage::FileStore;

mod book;
mod init;
mod stage;
mod stats;
mod task;

/// shelf - track books, their stages and tasks
///
/// Progress rolls up from tasks to stages to books; every list keeps a
/// gapless manual order.
#[derive(Parser, Debug)]
#[command(name = "shelf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Library directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "SHELF_DIR")]
    pub dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write notifications as JSON lines to a file, or `-` for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the library directory, configuration and library file
    Init,

    /// Book management
    #[command(subcommand)]
    Book(BookCommands),

    /// Stage management within a book
    #[command(subcommand)]
    Stage(StageCommands),

    /// Task management within a stage
    #[command(subcommand)]
    Task(TaskCommands),

    /// Library statistics
    Stats {
        /// Only books updated within: all, month, week, day
        #[arg(long)]
        period: Option<String>,

        /// Sort books by: name, progress, date
        #[arg(long)]
        sort: Option<String>,

        /// Leave completed books out
        #[arg(long)]
        hide_completed: bool,

        /// Period summary buckets: week (last 4) or month (last 6)
        #[arg(long)]
        by: Option<String>,
    },
}

/// Book subcommands
#[derive(Subcommand, Debug)]
pub enum BookCommands {
    /// Add a book at the end of the list
    New {
        /// Book title
        title: String,
    },

    /// List books in order
    List,

    /// Show a book with its stages and tasks
    Show {
        /// Book id or unique prefix
        id: String,
    },

    /// Change a book's title
    Rename {
        /// Book id or unique prefix
        id: String,

        /// New title
        title: String,
    },

    /// Mark a book completed
    Done {
        /// Book id or unique prefix
        id: String,
    },

    /// Mark a book not completed
    Undone {
        /// Book id or unique prefix
        id: String,
    },

    /// Flip a book's completed flag
    Toggle {
        /// Book id or unique prefix
        id: String,
    },

    /// Delete a book with all its stages and tasks
    Rm {
        /// Book id or unique prefix
        id: String,
    },

    /// Move a book from one zero-based index to another
    Move {
        /// Current index
        from: usize,

        /// Target index
        to: usize,
    },
}

/// Stage subcommands
#[derive(Subcommand, Debug)]
pub enum StageCommands {
    /// Add a stage at the end of a book
    New {
        /// Book id or unique prefix
        book: String,

        /// Stage title
        title: String,
    },

    /// List a book's stages in order
    List {
        /// Book id or unique prefix
        book: String,
    },

    /// Change a stage's title
    Rename {
        /// Stage id or unique prefix
        id: String,

        /// New title
        title: String,
    },

    /// Mark a stage completed
    Done {
        /// Stage id or unique prefix
        id: String,
    },

    /// Mark a stage not completed
    Undone {
        /// Stage id or unique prefix
        id: String,
    },

    /// Flip a stage's completed flag
    Toggle {
        /// Stage id or unique prefix
        id: String,
    },

    /// Delete a stage with all its tasks
    Rm {
        /// Stage id or unique prefix
        id: String,
    },

    /// Move a stage within its book
    Move {
        /// Book id or unique prefix
        book: String,

        /// Current index
        from: usize,

        /// Target index
        to: usize,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Add a task at the end of a stage
    New {
        /// Stage id or unique prefix
        stage: String,

        /// Task title
        title: String,
    },

    /// List a stage's tasks in order
    List {
        /// Stage id or unique prefix
        stage: String,
    },

    /// Show one task with its references
    Show {
        /// Task id or unique prefix
        id: String,
    },

    /// Edit a task's title, description or references
    Edit {
        /// Task id or unique prefix
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description (empty clears it)
        #[arg(long)]
        description: Option<String>,

        /// Link reference as TITLE=URL (repeatable)
        #[arg(long = "link", value_name = "TITLE=URL")]
        links: Vec<String>,

        /// File reference as TITLE=URL (repeatable)
        #[arg(long = "file", value_name = "TITLE=URL")]
        files: Vec<String>,

        /// Drop every existing reference
        #[arg(long)]
        clear_references: bool,
    },

    /// Flip a task's completed flag
    Toggle {
        /// Task id or unique prefix
        id: String,
    },

    /// Mark a task completed
    Done {
        /// Task id or unique prefix
        id: String,
    },

    /// Mark a task not completed
    Undone {
        /// Task id or unique prefix
        id: String,
    },

    /// Delete a task
    Rm {
        /// Task id or unique prefix
        id: String,
    },

    /// Move a task within its stage
    Move {
        /// Stage id or unique prefix
        stage: String,

        /// Current index
        from: usize,

        /// Target index
        to: usize,
    },
}

/// Flags shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
    pub events: Option<String>,
}

impl GlobalOptions {
    pub fn library_dir(&self) -> PathBuf {
        resolve_library_dir(self.dir.as_deref())
    }
}

/// Notification sinks used by the CLI: tracing always, JSONL on request.
pub(crate) type CliNotifier = (TracingNotifier, Option<JsonlNotifier>);

/// An opened library ready for one command.
pub(crate) struct Session {
    pub coordinator: HierarchyCoordinator<FileStore, CliNotifier>,
    pub config: Config,
    pub output: OutputOptions,
}

impl Session {
    pub fn open(globals: &GlobalOptions) -> Result<Self> {
        let dir = globals.library_dir();
        let config = Config::load_from_dir(&dir);
        let store = FileStore::new(config.library_path(&dir), config.storage.lock_timeout_ms);

        let destination = NotificationDestination::parse(globals.events.as_deref());
        let sink = destination.as_ref().map(|dest| dest.open()).transpose()?;
        let events_to_stdout = matches!(destination, Some(NotificationDestination::Stdout));

        tracing::debug!(dir = %dir.display(), "opened library");
        let coordinator = HierarchyCoordinator::new(store, (TracingNotifier, sink))
            .with_aggregator(config.progress.aggregator());

        Ok(Self {
            coordinator,
            config,
            output: OutputOptions {
                json: globals.json && !events_to_stdout,
                quiet: globals.quiet || events_to_stdout,
            },
        })
    }

    /// Resolve an id argument at `level`.
    pub fn resolve(&self, level: Level, input: &str) -> Result<String> {
        self.coordinator.resolve(level, input)
    }
}

/// What a done / undone / toggle command does to the completed flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionChange {
    Done,
    Undone,
    Toggle,
}

impl CompletionChange {
    pub fn command(self) -> &'static str {
        match self {
            CompletionChange::Done => "done",
            CompletionChange::Undone => "undone",
            CompletionChange::Toggle => "toggle",
        }
    }
}

/// Render a checkbox-style completion marker.
pub(crate) fn mark(completed: bool) -> &'static str {
    if completed {
        "[x]"
    } else {
        "[ ]"
    }
}

/// Split a `TITLE=URL` argument.
pub(crate) fn parse_reference(raw: &str) -> Result<(String, String)> {
    let (title, url) = raw.split_once('=').ok_or_else(|| {
        Error::InvalidArgument(format!("reference '{raw}' must look like TITLE=URL"))
    })?;
    let title = title.trim();
    let url = url.trim();
    if title.is_empty() || url.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "reference '{raw}' needs both a title and a url"
        )));
    }
    Ok((title.to_string(), url.to_string()))
}

impl Cli {
    /// Errors render as JSON only when stdout is not carrying the event stream.
    pub fn json_errors(&self) -> bool {
        let destination = NotificationDestination::parse(self.events.as_deref());
        self.json && !matches!(destination, Some(NotificationDestination::Stdout))
    }

    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let globals = GlobalOptions {
            dir: self.dir,
            json: self.json,
            quiet: self.quiet,
            events: self.events,
        };

        match self.command {
            Commands::Init => init::run(&globals),
            Commands::Book(cmd) => book::run(cmd, &globals),
            Commands::Stage(cmd) => stage::run(cmd, &globals),
            Commands::Task(cmd) => task::run(cmd, &globals),
            Commands::Stats {
                period,
                sort,
                hide_completed,
                by,
            } => stats::run(
                stats::StatsOptions {
                    period,
                    sort,
                    hide_completed,
                    by,
                },
                &globals,
            ),
        }
    }
}
