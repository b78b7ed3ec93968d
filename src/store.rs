//! Storage collaborator boundary.
//!
//! The hierarchy engine never talks to persistence directly; it reads sibling
//! lists through `RecordStore` and hands every mutation over as one
//! `WriteBatch`, which a store applies all-or-nothing.
//!
//! `MemoryStore` keeps everything in a `LibrarySnapshot`; `FileStore`
//! (in `storage`) persists the same snapshot as JSON.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Book, Level, Ordered, Stage, Task};
use crate::reorder::PositionUpdate;

pub const LIBRARY_SCHEMA_VERSION: &str = "shelf.library.v1";

/// A full record of any level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "level", content = "record", rename_all = "lowercase")]
pub enum Record {
    Book(Book),
    Stage(Stage),
    Task(Task),
}

impl Record {
    pub fn level(&self) -> Level {
        match self {
            Record::Book(_) => Level::Book,
            Record::Stage(_) => Level::Stage,
            Record::Task(_) => Level::Task,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Book(book) => &book.id,
            Record::Stage(stage) => &stage.id,
            Record::Task(task) => &task.id,
        }
    }
}

impl From<Book> for Record {
    fn from(book: Book) -> Self {
        Record::Book(book)
    }
}

impl From<Stage> for Record {
    fn from(stage: Stage) -> Self {
        Record::Stage(stage)
    }
}

impl From<Task> for Record {
    fn from(task: Task) -> Self {
        Record::Task(task)
    }
}

/// One storage operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Write {
    /// Add a new record; the id must be unused.
    Insert { record: Record },
    /// Replace an existing record wholesale.
    Update { record: Record },
    /// Remove one record. Descendants are not touched.
    Delete { level: Level, id: String },
    /// Rewrite positions of existing records.
    Positions {
        level: Level,
        updates: Vec<PositionUpdate>,
    },
}

/// Ordered set of writes applied as one unit.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(write: Write) -> Self {
        Self {
            writes: vec![write],
        }
    }

    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    pub fn insert(&mut self, record: impl Into<Record>) {
        self.push(Write::Insert {
            record: record.into(),
        });
    }

    pub fn update(&mut self, record: impl Into<Record>) {
        self.push(Write::Update {
            record: record.into(),
        });
    }

    pub fn delete(&mut self, level: Level, id: impl Into<String>) {
        self.push(Write::Delete {
            level,
            id: id.into(),
        });
    }

    pub fn positions(&mut self, level: Level, updates: Vec<PositionUpdate>) {
        if updates.is_empty() {
            return;
        }
        self.push(Write::Positions { level, updates });
    }

    /// Append every write of `other`, keeping its order.
    pub fn extend(&mut self, other: WriteBatch) {
        self.writes.extend(other.writes);
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// The opaque ordered-record store behind the hierarchy.
///
/// Lists come back sorted by `order_position` ascending. `apply` must either
/// commit the whole batch or leave the store unchanged.
pub trait RecordStore {
    fn list_books(&self) -> Result<Vec<Book>>;

    fn list_stages(&self, book_id: &str) -> Result<Vec<Stage>>;

    fn list_tasks(&self, stage_id: &str) -> Result<Vec<Task>>;

    fn find_book(&self, id: &str) -> Result<Option<Book>>;

    fn find_stage(&self, id: &str) -> Result<Option<Stage>>;

    fn find_task(&self, id: &str) -> Result<Option<Task>>;

    /// Every id stored at `level`, for id resolution.
    fn ids(&self, level: Level) -> Result<Vec<String>>;

    fn apply(&mut self, batch: WriteBatch) -> Result<()>;

    /// Enter a section in which no other writer can touch the store: reads
    /// and `apply` calls made before `end_exclusive` all see one state.
    /// Stores without outside writers have nothing to do.
    fn begin_exclusive(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_exclusive(&mut self) {}

    fn insert(&mut self, record: Record) -> Result<Record> {
        self.apply(WriteBatch::single(Write::Insert {
            record: record.clone(),
        }))?;
        Ok(record)
    }

    fn update(&mut self, record: Record) -> Result<Record> {
        self.apply(WriteBatch::single(Write::Update {
            record: record.clone(),
        }))?;
        Ok(record)
    }

    fn delete(&mut self, level: Level, id: &str) -> Result<()> {
        self.apply(WriteBatch::single(Write::Delete {
            level,
            id: id.to_string(),
        }))
    }

    fn batch_upsert(&mut self, level: Level, updates: Vec<PositionUpdate>) -> Result<()> {
        self.apply(WriteBatch::single(Write::Positions { level, updates }))
    }
}

/// Everything a store holds, in the shape persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibrarySnapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Default for LibrarySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl LibrarySnapshot {
    pub fn empty() -> Self {
        Self {
            schema_version: LIBRARY_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            books: Vec::new(),
            stages: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn books(&self) -> Vec<Book> {
        sorted(self.books.iter().cloned().collect())
    }

    pub fn stages_of(&self, book_id: &str) -> Vec<Stage> {
        sorted(
            self.stages
                .iter()
                .filter(|stage| stage.book_id == book_id)
                .cloned()
                .collect(),
        )
    }

    pub fn tasks_of(&self, stage_id: &str) -> Vec<Task> {
        sorted(
            self.tasks
                .iter()
                .filter(|task| task.stage_id == stage_id)
                .cloned()
                .collect(),
        )
    }

    pub fn book(&self, id: &str) -> Option<&Book> {
        self.books.iter().find(|book| book.id == id)
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn ids(&self, level: Level) -> Vec<String> {
        match level {
            Level::Book => self.books.iter().map(|book| book.id.clone()).collect(),
            Level::Stage => self.stages.iter().map(|stage| stage.id.clone()).collect(),
            Level::Task => self.tasks.iter().map(|task| task.id.clone()).collect(),
        }
    }

    /// Apply `batch` to a copy and swap it in only if every write succeeds
    /// and the result passes `validate`.
    pub fn apply(&mut self, batch: &WriteBatch) -> Result<()> {
        let mut staged = self.clone();
        for write in batch.writes() {
            staged.apply_one(write)?;
        }
        staged.validate()?;
        staged.generated_at = Utc::now();
        *self = staged;
        Ok(())
    }

    fn apply_one(&mut self, write: &Write) -> Result<()> {
        match write {
            Write::Insert { record } => match record {
                Record::Book(book) => insert_into(&mut self.books, book.clone()),
                Record::Stage(stage) => insert_into(&mut self.stages, stage.clone()),
                Record::Task(task) => insert_into(&mut self.tasks, task.clone()),
            },
            Write::Update { record } => match record {
                Record::Book(book) => update_in(&mut self.books, book.clone()),
                Record::Stage(stage) => update_in(&mut self.stages, stage.clone()),
                Record::Task(task) => update_in(&mut self.tasks, task.clone()),
            },
            Write::Delete { level, id } => match level {
                Level::Book => delete_from(&mut self.books, id),
                Level::Stage => delete_from(&mut self.stages, id),
                Level::Task => delete_from(&mut self.tasks, id),
            },
            Write::Positions { level, updates } => match level {
                Level::Book => reposition(&mut self.books, updates),
                Level::Stage => reposition(&mut self.stages, updates),
                Level::Task => reposition(&mut self.tasks, updates),
            },
        }
    }

    /// Storage-level constraints: unique ids, existing parents, and unique
    /// positions per parent.
    pub fn validate(&self) -> Result<()> {
        check_unique_ids(&self.books)?;
        check_unique_ids(&self.stages)?;
        check_unique_ids(&self.tasks)?;

        let book_ids: HashSet<&str> = self.books.iter().map(|book| book.id.as_str()).collect();
        for stage in &self.stages {
            if !book_ids.contains(stage.book_id.as_str()) {
                return Err(Error::ConstraintViolation(format!(
                    "stage {} references missing book {}",
                    stage.id, stage.book_id
                )));
            }
        }
        let stage_ids: HashSet<&str> = self.stages.iter().map(|stage| stage.id.as_str()).collect();
        for task in &self.tasks {
            if !stage_ids.contains(task.stage_id.as_str()) {
                return Err(Error::ConstraintViolation(format!(
                    "task {} references missing stage {}",
                    task.id, task.stage_id
                )));
            }
        }

        check_unique_positions(&self.books)?;
        check_unique_positions(&self.stages)?;
        check_unique_positions(&self.tasks)?;
        Ok(())
    }
}

fn sorted<T: Ordered>(mut records: Vec<T>) -> Vec<T> {
    records.sort_by_key(|record| record.order_position());
    records
}

fn insert_into<T: Ordered>(records: &mut Vec<T>, record: T) -> Result<()> {
    if records.iter().any(|existing| existing.id() == record.id()) {
        return Err(Error::ConstraintViolation(format!(
            "{} {} already exists",
            T::LEVEL.noun(),
            record.id()
        )));
    }
    records.push(record);
    Ok(())
}

fn update_in<T: Ordered>(records: &mut [T], record: T) -> Result<()> {
    let slot = records
        .iter_mut()
        .find(|existing| existing.id() == record.id())
        .ok_or_else(|| Error::not_found(T::LEVEL, record.id()))?;
    *slot = record;
    Ok(())
}

fn delete_from<T: Ordered>(records: &mut Vec<T>, id: &str) -> Result<()> {
    let index = records
        .iter()
        .position(|existing| existing.id() == id)
        .ok_or_else(|| Error::not_found(T::LEVEL, id))?;
    records.remove(index);
    Ok(())
}

fn reposition<T: Ordered>(records: &mut [T], updates: &[PositionUpdate]) -> Result<()> {
    for update in updates {
        let slot = records
            .iter_mut()
            .find(|existing| existing.id() == update.id)
            .ok_or_else(|| Error::not_found(T::LEVEL, update.id.clone()))?;
        slot.set_order_position(update.order_position);
        if let Some(at) = update.updated_at {
            slot.touch(at);
        }
    }
    Ok(())
}

fn check_unique_ids<T: Ordered>(records: &[T]) -> Result<()> {
    let mut seen = HashSet::new();
    for record in records {
        if !seen.insert(record.id()) {
            return Err(Error::ConstraintViolation(format!(
                "duplicate {} id {}",
                T::LEVEL.noun(),
                record.id()
            )));
        }
    }
    Ok(())
}

fn check_unique_positions<T: Ordered>(records: &[T]) -> Result<()> {
    let mut seen: HashMap<(Option<&str>, u32), &str> = HashMap::new();
    for record in records {
        if record.order_position() == 0 {
            return Err(Error::ConstraintViolation(format!(
                "{} {} has no position",
                T::LEVEL.noun(),
                record.id()
            )));
        }
        let key = (record.parent_id(), record.order_position());
        if let Some(other) = seen.insert(key, record.id()) {
            return Err(Error::ConstraintViolation(format!(
                "{} {} and {} share position {}",
                T::LEVEL.noun(),
                other,
                record.id(),
                record.order_position()
            )));
        }
    }
    Ok(())
}

/// In-process store over a `LibrarySnapshot`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: LibrarySnapshot,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing data; it must already satisfy storage constraints.
    pub fn from_snapshot(snapshot: LibrarySnapshot) -> Result<Self> {
        snapshot.validate()?;
        Ok(Self { snapshot })
    }

    pub fn snapshot(&self) -> &LibrarySnapshot {
        &self.snapshot
    }
}

impl RecordStore for MemoryStore {
    fn list_books(&self) -> Result<Vec<Book>> {
        Ok(self.snapshot.books())
    }

    fn list_stages(&self, book_id: &str) -> Result<Vec<Stage>> {
        Ok(self.snapshot.stages_of(book_id))
    }

    fn list_tasks(&self, stage_id: &str) -> Result<Vec<Task>> {
        Ok(self.snapshot.tasks_of(stage_id))
    }

    fn find_book(&self, id: &str) -> Result<Option<Book>> {
        Ok(self.snapshot.book(id).cloned())
    }

    fn find_stage(&self, id: &str) -> Result<Option<Stage>> {
        Ok(self.snapshot.stage(id).cloned())
    }

    fn find_task(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.snapshot.task(id).cloned())
    }

    fn ids(&self, level: Level) -> Result<Vec<String>> {
        Ok(self.snapshot.ids(level))
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<()> {
        self.snapshot.apply(&batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: &str, position: u32) -> Book {
        let mut book = Book::new(id, id, Utc::now());
        book.order_position = position;
        book
    }

    fn stage(id: &str, book_id: &str, position: u32) -> Stage {
        let mut stage = Stage::new(id, book_id, id, Utc::now());
        stage.order_position = position;
        stage
    }

    #[test]
    fn lists_are_sorted_by_position() {
        let mut store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.insert(book("b2", 2));
        batch.insert(book("b1", 1));
        store.apply(batch).expect("apply");
        let ids: Vec<String> = store
            .list_books()
            .expect("list")
            .into_iter()
            .map(|book| book.id)
            .collect();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[test]
    fn failed_batch_leaves_store_unchanged() {
        let mut store = MemoryStore::new();
        store.insert(book("b1", 1).into()).expect("insert");

        let mut batch = WriteBatch::new();
        batch.insert(book("b2", 2));
        batch.insert(stage("s1", "missing", 1));
        let err = store.apply(batch).expect_err("orphan stage");
        assert!(matches!(err, Error::ConstraintViolation(_)));
        assert_eq!(store.list_books().expect("list").len(), 1);
    }

    #[test]
    fn duplicate_position_is_rejected() {
        let mut store = MemoryStore::new();
        store.insert(book("b1", 1).into()).expect("insert");
        let err = store.insert(book("b2", 1).into()).expect_err("duplicate");
        assert!(matches!(err, Error::ConstraintViolation(_)));
    }

    #[test]
    fn positions_may_swap_within_one_batch() {
        let mut store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.insert(book("b1", 1));
        batch.insert(book("b2", 2));
        store.apply(batch).expect("seed");

        store
            .batch_upsert(
                Level::Book,
                vec![
                    PositionUpdate {
                        id: "b1".to_string(),
                        order_position: 2,
                        updated_at: None,
                    },
                    PositionUpdate {
                        id: "b2".to_string(),
                        order_position: 1,
                        updated_at: None,
                    },
                ],
            )
            .expect("swap");
        let first = store.list_books().expect("list").remove(0);
        assert_eq!(first.id, "b2");
    }

    #[test]
    fn update_and_delete_require_existing_records() {
        let mut store = MemoryStore::new();
        let err = store.update(book("b1", 1).into()).expect_err("missing");
        assert!(matches!(err, Error::NotFound { .. }));
        let err = store.delete(Level::Book, "b1").expect_err("missing");
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.insert(book("b1", 1));
        batch.insert(stage("s1", "b1", 1));
        store.apply(batch).expect("seed");
        let json = serde_json::to_string(store.snapshot()).expect("serialize");
        let back: LibrarySnapshot = serde_json::from_str(&json).expect("parse");
        let restored = MemoryStore::from_snapshot(back).expect("valid");
        assert_eq!(restored.list_stages("b1").expect("list").len(), 1);
    }
}
