//! Records of the book / stage / task hierarchy.
//!
//! Every record is owned by its parent collection and carries a 1-based
//! `order_position` that is unique among its siblings. Field names are the
//! canonical snake_case ones; legacy camelCase names are accepted on input.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Hierarchy level of a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Book,
    Stage,
    Task,
}

impl Level {
    /// Lowercase noun used in messages ("book", "stage", "task").
    pub fn noun(self) -> &'static str {
        match self {
            Level::Book => "book",
            Level::Stage => "stage",
            Level::Task => "task",
        }
    }

    /// Prefix used for generated ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            Level::Book => "bk",
            Level::Stage => "st",
            Level::Task => "tk",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Book => "Book",
            Level::Stage => "Stage",
            Level::Task => "Task",
        };
        f.write_str(name)
    }
}

/// Common surface of the three record types.
pub trait Ordered: Clone {
    const LEVEL: Level;

    fn id(&self) -> &str;

    /// Owning record id; `None` for books, which sit at the root.
    fn parent_id(&self) -> Option<&str>;

    fn order_position(&self) -> u32;

    fn set_order_position(&mut self, position: u32);

    fn is_completed(&self) -> bool;

    fn updated_at(&self) -> DateTime<Utc>;

    /// Refresh `updated_at` after a mutation.
    fn touch(&mut self, now: DateTime<Utc>);
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Book {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "clamped_progress")]
    pub progress: u8,
    #[serde(default, alias = "isCompleted")]
    pub is_completed: bool,
    #[serde(alias = "orderPosition")]
    pub order_position: u32,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            progress: 0,
            is_completed: false,
            order_position: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stage {
    pub id: String,
    #[serde(alias = "bookId")]
    pub book_id: String,
    pub title: String,
    #[serde(default, deserialize_with = "clamped_progress")]
    pub progress: u8,
    #[serde(default, alias = "isCompleted")]
    pub is_completed: bool,
    #[serde(alias = "orderPosition")]
    pub order_position: u32,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Stage {
    pub fn new(
        id: impl Into<String>,
        book_id: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            book_id: book_id.into(),
            title: title.into(),
            progress: 0,
            is_completed: false,
            order_position: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Link,
    File,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Link => f.write_str("link"),
            ReferenceKind::File => f.write_str("file"),
        }
    }
}

impl std::str::FromStr for ReferenceKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "link" => Ok(ReferenceKind::Link),
            "file" => Ok(ReferenceKind::File),
            _ => Err(crate::error::Error::InvalidArgument(format!(
                "invalid reference type '{}': must be link or file",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskReference {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    pub title: String,
    pub url: String,
}

impl TaskReference {
    pub fn new(kind: ReferenceKind, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    #[serde(alias = "stageId")]
    pub stage_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "isCompleted")]
    pub is_completed: bool,
    #[serde(
        default,
        alias = "taskReferences",
        deserialize_with = "null_as_empty"
    )]
    pub task_references: Vec<TaskReference>,
    #[serde(alias = "orderPosition")]
    pub order_position: u32,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        stage_id: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            stage_id: stage_id.into(),
            title: title.into(),
            description: None,
            is_completed: false,
            task_references: Vec::new(),
            order_position: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

macro_rules! impl_ordered {
    ($ty:ty, $level:expr, |$rec:ident| $parent:expr) => {
        impl Ordered for $ty {
            const LEVEL: Level = $level;

            fn id(&self) -> &str {
                &self.id
            }

            fn parent_id(&self) -> Option<&str> {
                let $rec = self;
                $parent
            }

            fn order_position(&self) -> u32 {
                self.order_position
            }

            fn set_order_position(&mut self, position: u32) {
                self.order_position = position;
            }

            fn is_completed(&self) -> bool {
                self.is_completed
            }

            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }

            fn touch(&mut self, now: DateTime<Utc>) {
                self.updated_at = now;
            }
        }
    };
}

impl_ordered!(Book, Level::Book, |_book| None);
impl_ordered!(Stage, Level::Stage, |stage| Some(stage.book_id.as_str()));
impl_ordered!(Task, Level::Task, |task| Some(task.stage_id.as_str()));

/// Field edits for a book.
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    pub title: Option<String>,
}

/// Field edits for a stage.
#[derive(Debug, Clone, Default)]
pub struct StagePatch {
    pub title: Option<String>,
}

/// Field edits for a task. `references`, when set, replaces the whole list;
/// an empty `description` clears it.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub references: Option<Vec<TaskReference>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.references.is_none()
    }
}

/// Trim a title and reject it when nothing is left.
pub fn normalize_title(level: Level, title: &str) -> crate::error::Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(crate::error::Error::InvalidArgument(format!(
            "{} title cannot be empty",
            level.noun()
        )));
    }
    Ok(trimmed.to_string())
}

fn clamped_progress<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
