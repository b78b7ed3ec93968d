//! Cross-level propagation and the top-level actions built on it.
//!
//! Every action plans its whole write set against the current store state,
//! using `OrderedCollection` for sibling bookkeeping and `ProgressAggregator`
//! for roll-ups, then hands one `WriteBatch` to the store. Roll-ups always run
//! over the post-mutation sibling lists built in memory, never over a re-read
//! of the store. Exactly one notification is emitted per action.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ids;
use crate::model::{
    normalize_title, Book, BookPatch, Level, Ordered, Stage, StagePatch, Task, TaskPatch,
};
use crate::notify::{Notification, Notifier};
use crate::ordered::OrderedCollection;
use crate::progress::ProgressAggregator;
use crate::reorder::position_batch;
use crate::stats::{library_stats, LibraryStats, StatsFilter};
use crate::store::{Record, RecordStore, WriteBatch};

/// A stage with its tasks in display order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StageTree {
    #[serde(flatten)]
    pub stage: Stage,
    pub tasks: Vec<Task>,
}

/// A book with its stages and their tasks in display order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BookTree {
    #[serde(flatten)]
    pub book: Book,
    pub stages: Vec<StageTree>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
    Delete,
    Reorder,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Reorder => "reorder",
        }
    }

    fn past(self) -> &'static str {
        match self {
            Action::Create => "created",
            Action::Update => "updated",
            Action::Delete => "deleted",
            Action::Reorder => "reordered",
        }
    }

    fn success_message(self, level: Level) -> String {
        match self {
            Action::Reorder => format!("{level}s {} successfully", self.past()),
            _ => format!("{level} {} successfully", self.past()),
        }
    }

    fn failure_message(self, level: Level) -> String {
        match self {
            Action::Reorder => format!("Failed to {} {}s", self.verb(), level.noun()),
            _ => format!("Failed to {} {}", self.verb(), level.noun()),
        }
    }
}

pub struct HierarchyCoordinator<S, N> {
    store: S,
    notifier: N,
    aggregator: ProgressAggregator,
}

impl<S: RecordStore, N: Notifier> HierarchyCoordinator<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            aggregator: ProgressAggregator::default(),
        }
    }

    pub fn with_aggregator(mut self, aggregator: ProgressAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn aggregator(&self) -> ProgressAggregator {
        self.aggregator
    }

    pub fn into_parts(self) -> (S, N) {
        (self.store, self.notifier)
    }

    /// Resolve a full id or unique id prefix at `level`.
    pub fn resolve(&self, level: Level, input: &str) -> Result<String> {
        let candidates = self.store.ids(level)?;
        ids::resolve(level, input, candidates.iter().map(String::as_str))
    }

    pub fn book(&self, id: &str) -> Result<Book> {
        self.store
            .find_book(id)?
            .ok_or_else(|| Error::not_found(Level::Book, id))
    }

    pub fn stage(&self, id: &str) -> Result<Stage> {
        self.store
            .find_stage(id)?
            .ok_or_else(|| Error::not_found(Level::Stage, id))
    }

    pub fn task(&self, id: &str) -> Result<Task> {
        self.store
            .find_task(id)?
            .ok_or_else(|| Error::not_found(Level::Task, id))
    }

    pub fn books(&self) -> Result<Vec<Book>> {
        Ok(self.book_list()?.into_items())
    }

    pub fn stages(&self, book_id: &str) -> Result<Vec<Stage>> {
        self.book(book_id)?;
        Ok(self.stage_list(book_id)?.into_items())
    }

    pub fn tasks(&self, stage_id: &str) -> Result<Vec<Task>> {
        self.stage(stage_id)?;
        Ok(self.task_list(stage_id)?.into_items())
    }

    pub fn book_tree(&self, id: &str) -> Result<BookTree> {
        let book = self.book(id)?;
        self.tree_of(book)
    }

    /// Every book with its descendants, in display order.
    pub fn library(&self) -> Result<Vec<BookTree>> {
        self.books()?
            .into_iter()
            .map(|book| self.tree_of(book))
            .collect()
    }

    pub fn stats(&self, filter: StatsFilter) -> Result<LibraryStats> {
        let trees = self.library()?;
        Ok(library_stats(&trees, filter, Utc::now()))
    }

    fn tree_of(&self, book: Book) -> Result<BookTree> {
        let stages = self
            .stage_list(&book.id)?
            .into_items()
            .into_iter()
            .map(|stage| {
                let tasks = self.task_list(&stage.id)?.into_items();
                Ok(StageTree { stage, tasks })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BookTree { book, stages })
    }

    fn resolved_book(&self, input: &str) -> Result<Book> {
        self.book(&self.resolve(Level::Book, input)?)
    }

    fn resolved_stage(&self, input: &str) -> Result<Stage> {
        self.stage(&self.resolve(Level::Stage, input)?)
    }

    fn resolved_task(&self, input: &str) -> Result<Task> {
        self.task(&self.resolve(Level::Task, input)?)
    }

    fn book_list(&self) -> Result<OrderedCollection<Book>> {
        OrderedCollection::from_records(None, self.store.list_books()?)
    }

    fn stage_list(&self, book_id: &str) -> Result<OrderedCollection<Stage>> {
        OrderedCollection::from_records(Some(book_id), self.store.list_stages(book_id)?)
    }

    fn task_list(&self, stage_id: &str) -> Result<OrderedCollection<Task>> {
        OrderedCollection::from_records(Some(stage_id), self.store.list_tasks(stage_id)?)
    }

    /// Writes that bring `task`'s stage and book in line with `task` as given.
    pub fn on_task_changed(&self, task: &Task, now: DateTime<Utc>) -> Result<WriteBatch> {
        let tasks = self.task_list(&task.stage_id)?.replace(task.clone())?;
        let batch = self.roll_up_stage(&task.stage_id, tasks.items(), now)?;
        Ok(batch)
    }

    /// Writes that bring `stage`'s book in line with `stage` as given.
    pub fn on_stage_changed(&self, stage: &Stage, now: DateTime<Utc>) -> Result<WriteBatch> {
        let stages = self.stage_list(&stage.book_id)?.replace(stage.clone())?;
        let batch = self.roll_up_book(&stage.book_id, stages.items(), now)?;
        Ok(batch)
    }

    /// Writes that delete `task`, close the gap it leaves and roll up.
    pub fn on_task_deleted(&self, task: &Task, now: DateTime<Utc>) -> Result<WriteBatch> {
        let before = self.task_list(&task.stage_id)?;
        let (after, removed) = before.remove(&task.id, now)?;

        let mut batch = WriteBatch::new();
        batch.delete(Level::Task, removed.id);
        batch.positions(Level::Task, position_batch(after.repositioned_since(&before)));
        let rollup = self.roll_up_stage(&task.stage_id, after.items(), now)?;
        batch.extend(rollup);
        Ok(batch)
    }

    /// Writes that delete `stage` with its tasks, close the gap and roll up.
    pub fn on_stage_deleted(&self, stage: &Stage, now: DateTime<Utc>) -> Result<WriteBatch> {
        let before = self.stage_list(&stage.book_id)?;
        let (after, removed) = before.remove(&stage.id, now)?;

        let mut batch = WriteBatch::new();
        for task in self.task_list(&removed.id)?.iter() {
            batch.delete(Level::Task, task.id.clone());
        }
        batch.delete(Level::Stage, removed.id);
        batch.positions(Level::Stage, position_batch(after.repositioned_since(&before)));
        let rollup = self.roll_up_book(&stage.book_id, after.items(), now)?;
        batch.extend(rollup);
        Ok(batch)
    }

    fn roll_up_stage(
        &self,
        stage_id: &str,
        tasks: &[Task],
        now: DateTime<Utc>,
    ) -> Result<WriteBatch> {
        let stage = self.stage(stage_id)?;
        let next = self.aggregator.recompute_stage(&stage, tasks, now);
        debug!(
            stage = %next.id,
            progress = next.progress,
            completed = next.is_completed,
            "recomputed stage"
        );

        let mut batch = WriteBatch::new();
        batch.update(next.clone());
        batch.extend(self.on_stage_changed(&next, now)?);
        Ok(batch)
    }

    fn roll_up_book(
        &self,
        book_id: &str,
        stages: &[Stage],
        now: DateTime<Utc>,
    ) -> Result<WriteBatch> {
        let book = self.book(book_id)?;
        let next = self.aggregator.recompute_book(&book, stages, now);
        debug!(
            book = %next.id,
            progress = next.progress,
            completed = next.is_completed,
            "recomputed book"
        );

        Ok(update_batch(next))
    }

    // Actions take ids as typed by a user: a full id or a unique prefix.
    // Resolution runs inside the action; an unresolvable id fails it like
    // any other error.

    pub fn create_book(&mut self, title: &str) -> Result<Book> {
        self.commit(Level::Book, Action::Create, |coord, now| {
            coord.plan_create_book(title, now)
        })
    }

    pub fn create_stage(&mut self, book: &str, title: &str) -> Result<Stage> {
        self.commit(Level::Stage, Action::Create, |coord, now| {
            coord.plan_create_stage(book, title, now)
        })
    }

    pub fn create_task(&mut self, stage: &str, title: &str) -> Result<Task> {
        self.commit(Level::Task, Action::Create, |coord, now| {
            coord.plan_create_task(stage, title, now)
        })
    }

    pub fn update_book(&mut self, id: &str, patch: BookPatch) -> Result<Book> {
        self.commit(Level::Book, Action::Update, |coord, now| {
            coord.plan_update_book(id, patch, now)
        })
    }

    pub fn update_stage(&mut self, id: &str, patch: StagePatch) -> Result<Stage> {
        self.commit(Level::Stage, Action::Update, |coord, now| {
            coord.plan_update_stage(id, patch, now)
        })
    }

    pub fn update_task(&mut self, id: &str, patch: TaskPatch) -> Result<Task> {
        self.update_task_with(id, |_| Ok(patch))
    }

    /// Edit a task with a patch built from its current state.
    ///
    /// `edit` runs inside the action; an error from it fails the action.
    pub fn update_task_with<F>(&mut self, id: &str, edit: F) -> Result<Task>
    where
        F: FnOnce(&Task) -> Result<TaskPatch>,
    {
        self.commit(Level::Task, Action::Update, |coord, now| {
            let task = coord.resolved_task(id)?;
            let patch = edit(&task)?;
            coord.plan_update_task(&task.id, patch, now)
        })
    }

    pub fn set_book_completed(&mut self, id: &str, completed: bool) -> Result<Book> {
        self.commit(Level::Book, Action::Update, |coord, now| {
            coord.plan_book_completion(id, |_| completed, now)
        })
    }

    pub fn toggle_book(&mut self, id: &str) -> Result<Book> {
        self.commit(Level::Book, Action::Update, |coord, now| {
            coord.plan_book_completion(id, |current| !current, now)
        })
    }

    pub fn set_stage_completed(&mut self, id: &str, completed: bool) -> Result<Stage> {
        self.commit(Level::Stage, Action::Update, |coord, now| {
            coord.plan_stage_completion(id, |_| completed, now)
        })
    }

    pub fn toggle_stage(&mut self, id: &str) -> Result<Stage> {
        self.commit(Level::Stage, Action::Update, |coord, now| {
            coord.plan_stage_completion(id, |current| !current, now)
        })
    }

    pub fn set_task_completed(&mut self, id: &str, completed: bool) -> Result<Task> {
        self.commit(Level::Task, Action::Update, |coord, now| {
            coord.plan_task_completion(id, |_| completed, now)
        })
    }

    pub fn toggle_task(&mut self, id: &str) -> Result<Task> {
        self.commit(Level::Task, Action::Update, |coord, now| {
            coord.plan_task_completion(id, |current| !current, now)
        })
    }

    /// Delete a book with every stage and task under it.
    pub fn delete_book(&mut self, id: &str) -> Result<Book> {
        self.commit(Level::Book, Action::Delete, |coord, now| {
            coord.plan_delete_book(id, now)
        })
    }

    pub fn delete_stage(&mut self, id: &str) -> Result<Stage> {
        self.commit(Level::Stage, Action::Delete, |coord, now| {
            let stage = coord.resolved_stage(id)?;
            let batch = coord.on_stage_deleted(&stage, now)?;
            Ok((stage, batch))
        })
    }

    pub fn delete_task(&mut self, id: &str) -> Result<Task> {
        self.commit(Level::Task, Action::Delete, |coord, now| {
            let task = coord.resolved_task(id)?;
            let batch = coord.on_task_deleted(&task, now)?;
            Ok((task, batch))
        })
    }

    pub fn reorder_books(&mut self, source: usize, destination: usize) -> Result<Vec<Book>> {
        self.commit(Level::Book, Action::Reorder, |coord, now| {
            plan_reorder(coord.book_list()?, source, destination, now)
        })
    }

    pub fn reorder_stages(
        &mut self,
        book: &str,
        source: usize,
        destination: usize,
    ) -> Result<Vec<Stage>> {
        self.commit(Level::Stage, Action::Reorder, |coord, now| {
            let book_id = coord.resolved_book(book)?.id;
            plan_reorder(coord.stage_list(&book_id)?, source, destination, now)
        })
    }

    pub fn reorder_tasks(
        &mut self,
        stage: &str,
        source: usize,
        destination: usize,
    ) -> Result<Vec<Task>> {
        self.commit(Level::Task, Action::Reorder, |coord, now| {
            let stage_id = coord.resolved_stage(stage)?.id;
            plan_reorder(coord.task_list(&stage_id)?, source, destination, now)
        })
    }

    /// Run one action: plan and apply its batch while the store is held
    /// exclusively, then emit exactly one notification.
    fn commit<T, F>(&mut self, level: Level, action: Action, plan: F) -> Result<T>
    where
        F: FnOnce(&Self, DateTime<Utc>) -> Result<(T, WriteBatch)>,
    {
        let result = self
            .store
            .begin_exclusive()
            .and_then(|()| self.plan_and_apply(level, action, plan));
        self.store.end_exclusive();

        match &result {
            Ok(_) => {
                info!(level = %level, action = action.verb(), "action committed");
                self.notifier
                    .notify(Notification::success(action.success_message(level)));
            }
            Err(err) => {
                warn!(level = %level, action = action.verb(), error = %err, "action failed");
                self.notifier
                    .notify(Notification::error(action.failure_message(level)));
            }
        }
        result
    }

    fn plan_and_apply<T, F>(&mut self, level: Level, action: Action, plan: F) -> Result<T>
    where
        F: FnOnce(&Self, DateTime<Utc>) -> Result<(T, WriteBatch)>,
    {
        let (value, batch) = plan(&*self, Utc::now())?;
        let writes = batch.len();
        if !batch.is_empty() {
            self.store.apply(batch)?;
        }
        debug!(level = %level, action = action.verb(), writes, "applied batch");
        Ok(value)
    }

    fn plan_create_book(&self, title: &str, now: DateTime<Utc>) -> Result<(Book, WriteBatch)> {
        let title = normalize_title(Level::Book, title)?;
        let book = Book::new(ids::generate(Level::Book), title, now);
        let id = book.id.clone();
        let books = self.book_list()?.append(book)?;
        let book = books
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(Level::Book, id))?;

        let mut batch = WriteBatch::new();
        batch.insert(book.clone());
        Ok((book, batch))
    }

    fn plan_create_stage(
        &self,
        book: &str,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<(Stage, WriteBatch)> {
        let title = normalize_title(Level::Stage, title)?;
        let book_id = self.resolved_book(book)?.id;
        let stage = Stage::new(ids::generate(Level::Stage), &book_id, title, now);
        let id = stage.id.clone();
        let stages = self.stage_list(&book_id)?.append(stage)?;
        let stage = stages
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(Level::Stage, id))?;

        let mut batch = WriteBatch::new();
        batch.insert(stage.clone());
        let rollup = self.roll_up_book(&book_id, stages.items(), now)?;
        batch.extend(rollup);
        Ok((stage, batch))
    }

    fn plan_create_task(
        &self,
        stage: &str,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<(Task, WriteBatch)> {
        let title = normalize_title(Level::Task, title)?;
        let stage_id = self.resolved_stage(stage)?.id;
        let task = Task::new(ids::generate(Level::Task), &stage_id, title, now);
        let id = task.id.clone();
        let tasks = self.task_list(&stage_id)?.append(task)?;
        let task = tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(Level::Task, id))?;

        let mut batch = WriteBatch::new();
        batch.insert(task.clone());
        let rollup = self.roll_up_stage(&stage_id, tasks.items(), now)?;
        batch.extend(rollup);
        Ok((task, batch))
    }

    fn plan_update_book(
        &self,
        id: &str,
        patch: BookPatch,
        now: DateTime<Utc>,
    ) -> Result<(Book, WriteBatch)> {
        let title = patch
            .title
            .ok_or_else(|| Error::InvalidArgument("nothing to update".to_string()))?;
        let mut book = self.resolved_book(id)?;
        book.title = normalize_title(Level::Book, &title)?;
        book.touch(now);
        Ok((book.clone(), update_batch(book)))
    }

    fn plan_update_stage(
        &self,
        id: &str,
        patch: StagePatch,
        now: DateTime<Utc>,
    ) -> Result<(Stage, WriteBatch)> {
        let title = patch
            .title
            .ok_or_else(|| Error::InvalidArgument("nothing to update".to_string()))?;
        let mut stage = self.resolved_stage(id)?;
        stage.title = normalize_title(Level::Stage, &title)?;
        stage.touch(now);
        Ok((stage.clone(), update_batch(stage)))
    }

    fn plan_update_task(
        &self,
        id: &str,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<(Task, WriteBatch)> {
        if patch.is_empty() {
            return Err(Error::InvalidArgument("nothing to update".to_string()));
        }
        let mut task = self.resolved_task(id)?;
        if let Some(title) = patch.title {
            task.title = normalize_title(Level::Task, &title)?;
        }
        if let Some(description) = patch.description {
            let trimmed = description.trim();
            task.description = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        if let Some(references) = patch.references {
            task.task_references = references;
        }
        task.touch(now);
        Ok((task.clone(), update_batch(task)))
    }

    fn plan_book_completion<F>(
        &self,
        id: &str,
        next: F,
        now: DateTime<Utc>,
    ) -> Result<(Book, WriteBatch)>
    where
        F: FnOnce(bool) -> bool,
    {
        let mut book = self.resolved_book(id)?;
        book.is_completed = next(book.is_completed);
        book.touch(now);
        Ok((book.clone(), update_batch(book)))
    }

    fn plan_stage_completion<F>(
        &self,
        id: &str,
        next: F,
        now: DateTime<Utc>,
    ) -> Result<(Stage, WriteBatch)>
    where
        F: FnOnce(bool) -> bool,
    {
        let mut stage = self.resolved_stage(id)?;
        stage.is_completed = next(stage.is_completed);
        stage.touch(now);

        let mut batch = WriteBatch::new();
        batch.update(stage.clone());
        batch.extend(self.on_stage_changed(&stage, now)?);
        Ok((stage, batch))
    }

    fn plan_task_completion<F>(
        &self,
        id: &str,
        next: F,
        now: DateTime<Utc>,
    ) -> Result<(Task, WriteBatch)>
    where
        F: FnOnce(bool) -> bool,
    {
        let mut task = self.resolved_task(id)?;
        task.is_completed = next(task.is_completed);
        task.touch(now);

        let mut batch = WriteBatch::new();
        batch.update(task.clone());
        batch.extend(self.on_task_changed(&task, now)?);
        Ok((task, batch))
    }

    fn plan_delete_book(&self, id: &str, now: DateTime<Utc>) -> Result<(Book, WriteBatch)> {
        let id = self.resolve(Level::Book, id)?;
        let before = self.book_list()?;
        let (after, removed) = before.remove(&id, now)?;

        let mut batch = WriteBatch::new();
        for stage in self.stage_list(&removed.id)?.iter() {
            for task in self.task_list(&stage.id)?.iter() {
                batch.delete(Level::Task, task.id.clone());
            }
            batch.delete(Level::Stage, stage.id.clone());
        }
        batch.delete(Level::Book, removed.id.clone());
        batch.positions(Level::Book, position_batch(after.repositioned_since(&before)));
        Ok((removed, batch))
    }
}

fn plan_reorder<T>(
    list: OrderedCollection<T>,
    source: usize,
    destination: usize,
    now: DateTime<Utc>,
) -> Result<(Vec<T>, WriteBatch)>
where
    T: Ordered,
{
    let after = list.reorder(source, destination, now)?;
    let mut batch = WriteBatch::new();
    if source != destination {
        batch.positions(T::LEVEL, position_batch(after.iter()));
    }
    Ok((after.into_items(), batch))
}

fn update_batch(record: impl Into<Record>) -> WriteBatch {
    let mut batch = WriteBatch::new();
    batch.update(record);
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReferenceKind, TaskReference};
    use crate::notify::NotificationKind;
    use crate::progress::{CompletionMode, ProgressFormula};
    use crate::store::MemoryStore;

    type TestCoordinator = HierarchyCoordinator<MemoryStore, Vec<Notification>>;

    fn coordinator() -> TestCoordinator {
        HierarchyCoordinator::new(MemoryStore::new(), Vec::new())
    }

    fn messages(coord: &TestCoordinator) -> Vec<String> {
        coord
            .notifier()
            .iter()
            .map(|notification| notification.message.clone())
            .collect()
    }

    /// Store whose writes always fail.
    struct RejectingStore(MemoryStore);

    impl RecordStore for RejectingStore {
        fn list_books(&self) -> Result<Vec<Book>> {
            self.0.list_books()
        }
        fn list_stages(&self, book_id: &str) -> Result<Vec<Stage>> {
            self.0.list_stages(book_id)
        }
        fn list_tasks(&self, stage_id: &str) -> Result<Vec<Task>> {
            self.0.list_tasks(stage_id)
        }
        fn find_book(&self, id: &str) -> Result<Option<Book>> {
            self.0.find_book(id)
        }
        fn find_stage(&self, id: &str) -> Result<Option<Stage>> {
            self.0.find_stage(id)
        }
        fn find_task(&self, id: &str) -> Result<Option<Task>> {
            self.0.find_task(id)
        }
        fn ids(&self, level: Level) -> Result<Vec<String>> {
            self.0.ids(level)
        }
        fn apply(&mut self, _batch: WriteBatch) -> Result<()> {
            Err(Error::StorageFailure("backend unavailable".to_string()))
        }
    }

    #[test]
    fn toggling_last_task_completes_stage_and_recomputes_book() {
        let mut coord = coordinator();
        let b1 = coord.create_book("B1").expect("book");
        let s1 = coord.create_stage(&b1.id, "S1").expect("stage");
        let t1 = coord.create_task(&s1.id, "T1").expect("t1");
        let t2 = coord.create_task(&s1.id, "T2").expect("t2");
        coord.set_task_completed(&t1.id, true).expect("t1 done");

        let mid = coord.stage(&s1.id).expect("stage");
        assert_eq!(mid.progress, 50);
        assert!(!mid.is_completed);

        let toggled = coord.toggle_task(&t2.id).expect("toggle t2");
        assert!(toggled.is_completed);

        let s1 = coord.stage(&s1.id).expect("stage");
        assert_eq!(s1.progress, 100);
        assert!(s1.is_completed);
        let b1 = coord.book(&b1.id).expect("book");
        assert_eq!(b1.progress, 100);
        assert!(b1.is_completed);
        assert_eq!(b1.updated_at, s1.updated_at);
    }

    #[test]
    fn book_progress_uses_completed_stage_ratio() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let done = coord.create_stage(&book.id, "Done").expect("stage");
        let open = coord.create_stage(&book.id, "Open").expect("stage");
        let task = coord.create_task(&done.id, "Only").expect("task");
        let half = coord.create_task(&open.id, "Half").expect("task");
        coord.create_task(&open.id, "Rest").expect("task");
        coord.set_task_completed(&task.id, true).expect("done");
        coord.set_task_completed(&half.id, true).expect("half");

        assert_eq!(coord.book(&book.id).expect("book").progress, 50);
    }

    #[test]
    fn average_formula_uses_stage_progress() {
        let mut coord = coordinator().with_aggregator(ProgressAggregator::new(
            ProgressFormula::Average,
            CompletionMode::Auto,
            CompletionMode::Auto,
        ));
        let book = coord.create_book("Book").expect("book");
        let first = coord.create_stage(&book.id, "First").expect("stage");
        coord.create_stage(&book.id, "Second").expect("stage");
        let task = coord.create_task(&first.id, "One").expect("task");
        coord.create_task(&first.id, "Two").expect("task");
        coord.set_task_completed(&task.id, true).expect("done");

        // (50 + 0) / 2
        assert_eq!(coord.book(&book.id).expect("book").progress, 25);
    }

    #[test]
    fn creating_a_task_reopens_a_completed_stage() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        let task = coord.create_task(&stage.id, "One").expect("task");
        coord.set_task_completed(&task.id, true).expect("done");
        assert!(coord.stage(&stage.id).expect("stage").is_completed);

        coord.create_task(&stage.id, "Two").expect("task");
        let stage = coord.stage(&stage.id).expect("stage");
        assert_eq!(stage.progress, 50);
        assert!(!stage.is_completed);
        assert!(!coord.book(&book.id).expect("book").is_completed);
    }

    #[test]
    fn explicit_stage_flag_holds_until_next_task_change() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        let task = coord.create_task(&stage.id, "One").expect("task");
        coord.create_task(&stage.id, "Two").expect("task");

        let flagged = coord.set_stage_completed(&stage.id, true).expect("flag");
        assert!(flagged.is_completed);
        assert_eq!(flagged.progress, 0);
        // the only stage is complete, so the book follows
        assert!(coord.book(&book.id).expect("book").is_completed);

        coord.set_task_completed(&task.id, true).expect("task");
        let stage = coord.stage(&stage.id).expect("stage");
        assert!(!stage.is_completed);
        assert_eq!(stage.progress, 50);
    }

    #[test]
    fn manual_mode_never_derives_flags() {
        let mut coord = coordinator().with_aggregator(ProgressAggregator::new(
            ProgressFormula::CompletedRatio,
            CompletionMode::Manual,
            CompletionMode::Manual,
        ));
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        let task = coord.create_task(&stage.id, "Only").expect("task");
        coord.set_task_completed(&task.id, true).expect("done");

        let stage = coord.stage(&stage.id).expect("stage");
        assert_eq!(stage.progress, 100);
        assert!(!stage.is_completed);
        assert!(!coord.book(&book.id).expect("book").is_completed);
    }

    #[test]
    fn book_flag_changes_alone() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        coord.create_stage(&book.id, "Stage").expect("stage");
        let toggled = coord.toggle_book(&book.id).expect("toggle");
        assert!(toggled.is_completed);
        assert_eq!(toggled.progress, 0);
    }

    #[test]
    fn deleting_a_book_cascades() {
        let mut coord = coordinator();
        let keep = coord.create_book("Keep").expect("book");
        let doomed = coord.create_book("Doomed").expect("book");
        let last = coord.create_book("Last").expect("book");
        let stage = coord.create_stage(&doomed.id, "Stage").expect("stage");
        coord.create_task(&stage.id, "Task").expect("task");

        coord.delete_book(&doomed.id).expect("delete");
        let snapshot = coord.store().snapshot();
        assert!(snapshot.stages.is_empty());
        assert!(snapshot.tasks.is_empty());

        let books = coord.books().expect("books");
        let ids: Vec<&str> = books.iter().map(|book| book.id.as_str()).collect();
        assert_eq!(ids, vec![keep.id.as_str(), last.id.as_str()]);
        assert_eq!(books[1].order_position, 2);
    }

    #[test]
    fn deleting_a_stage_compacts_and_recomputes() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let first = coord.create_stage(&book.id, "First").expect("stage");
        let middle = coord.create_stage(&book.id, "Middle").expect("stage");
        let last = coord.create_stage(&book.id, "Last").expect("stage");
        coord.create_task(&middle.id, "Task").expect("task");
        let first_task = coord.create_task(&first.id, "Done").expect("task");
        let last_task = coord.create_task(&last.id, "Done").expect("task");
        coord.set_task_completed(&first_task.id, true).expect("done");
        coord.set_task_completed(&last_task.id, true).expect("done");
        assert_eq!(coord.book(&book.id).expect("book").progress, 67);

        coord.delete_stage(&middle.id).expect("delete");
        let stages = coord.stages(&book.id).expect("stages");
        let positions: Vec<u32> = stages.iter().map(|stage| stage.order_position).collect();
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(stages[1].id, last.id);
        assert!(coord.store().snapshot().tasks_of(&middle.id).is_empty());

        let book = coord.book(&book.id).expect("book");
        assert_eq!(book.progress, 100);
        assert!(book.is_completed);
    }

    #[test]
    fn deleting_the_last_task_empties_stage_progress() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        let task = coord.create_task(&stage.id, "Only").expect("task");
        coord.set_task_completed(&task.id, true).expect("done");

        coord.delete_task(&task.id).expect("delete");
        let stage = coord.stage(&stage.id).expect("stage");
        assert_eq!(stage.progress, 0);
        assert!(!stage.is_completed);
    }

    #[test]
    fn reorder_rewrites_positions() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        for title in ["A", "B", "C"] {
            coord.create_task(&stage.id, title).expect("task");
        }

        let moved = coord.reorder_tasks(&stage.id, 0, 2).expect("reorder");
        let titles: Vec<&str> = moved.iter().map(|task| task.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "C", "A"]);

        let stored: Vec<(String, u32)> = coord
            .tasks(&stage.id)
            .expect("tasks")
            .into_iter()
            .map(|task| (task.title, task.order_position))
            .collect();
        assert_eq!(
            stored,
            vec![
                ("B".to_string(), 1),
                ("C".to_string(), 2),
                ("A".to_string(), 3)
            ]
        );
    }

    #[test]
    fn invalid_reorder_changes_nothing_and_reports_once() {
        let mut coord = coordinator();
        for title in ["A", "B", "C"] {
            coord.create_book(title).expect("book");
        }
        let before = coord.store().snapshot().books.clone();

        let err = coord.reorder_books(5, 0).expect_err("out of range");
        assert!(matches!(err, Error::InvalidIndex { index: 5, len: 3 }));
        assert_eq!(coord.store().snapshot().books, before);
        let last = coord.notifier().last().expect("notification");
        assert_eq!(last.kind, NotificationKind::Error);
        assert_eq!(last.message, "Failed to reorder books");
        assert_eq!(coord.notifier().len(), 4);
    }

    #[test]
    fn rejected_write_aborts_whole_cascade() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        let task = coord.create_task(&stage.id, "Task").expect("task");
        let (store, _) = coord.into_parts();
        let before = store.snapshot().clone();

        let mut failing = HierarchyCoordinator::new(RejectingStore(store), Vec::new());
        let err = failing.toggle_task(&task.id).expect_err("rejected");
        assert!(matches!(err, Error::StorageFailure(_)));

        let (store, notes) = failing.into_parts();
        assert_eq!(store.0.snapshot(), &before);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Error);
        assert_eq!(notes[0].message, "Failed to update task");
    }

    #[test]
    fn one_notification_per_action() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        let task = coord.create_task(&stage.id, "Task").expect("task");
        coord.toggle_task(&task.id).expect("toggle");
        coord.delete_stage(&stage.id).expect("delete");

        assert_eq!(
            messages(&coord),
            vec![
                "Book created successfully",
                "Stage created successfully",
                "Task created successfully",
                "Task updated successfully",
                "Stage deleted successfully",
            ]
        );
    }

    #[test]
    fn task_patch_edits_fields() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        let task = coord.create_task(&stage.id, "Task").expect("task");

        let edited = coord
            .update_task(
                &task.id,
                TaskPatch {
                    title: Some("  Read chapter 1 ".to_string()),
                    description: Some("Take notes".to_string()),
                    references: Some(vec![TaskReference::new(
                        ReferenceKind::Link,
                        "Docs",
                        "https://example.com",
                    )]),
                },
            )
            .expect("edit");
        assert_eq!(edited.title, "Read chapter 1");
        assert_eq!(edited.description.as_deref(), Some("Take notes"));
        assert_eq!(edited.task_references.len(), 1);
        assert_eq!(edited.order_position, 1);

        let cleared = coord
            .update_task(
                &task.id,
                TaskPatch {
                    description: Some(String::new()),
                    ..TaskPatch::default()
                },
            )
            .expect("clear");
        assert_eq!(cleared.description, None);
        assert_eq!(cleared.task_references.len(), 1);
    }

    #[test]
    fn blank_titles_are_rejected() {
        let mut coord = coordinator();
        let err = coord.create_book("   ").expect_err("blank");
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(coord.books().expect("books").is_empty());
        assert_eq!(messages(&coord), vec!["Failed to create book"]);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let mut coord = coordinator();
        let err = coord.create_stage("bk-missing", "Stage").expect_err("missing");
        assert!(matches!(err, Error::NotFound { level: Level::Book, .. }));
        let err = coord.delete_task("tk-missing").expect_err("missing");
        assert!(matches!(err, Error::NotFound { level: Level::Task, .. }));
    }

    #[test]
    fn library_view_nests_records() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        coord.create_task(&stage.id, "Task").expect("task");

        let library = coord.library().expect("library");
        assert_eq!(library.len(), 1);
        assert_eq!(library[0].stages.len(), 1);
        assert_eq!(library[0].stages[0].tasks[0].title, "Task");

        let json = serde_json::to_value(&library[0]).expect("json");
        assert_eq!(json["title"], "Book");
        assert_eq!(json["stages"][0]["tasks"][0]["title"], "Task");
    }

    #[test]
    fn resolves_unique_prefixes() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let suffix = book.id.trim_start_matches("bk-");
        let resolved = coord
            .resolve(Level::Book, &suffix[..suffix.len() - 2])
            .expect("resolve");
        assert_eq!(resolved, book.id);
    }

    #[test]
    fn actions_accept_prefixes_and_report_stale_ids() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let suffix = book.id.trim_start_matches("bk-").to_string();

        let stage = coord.create_stage(&suffix, "Stage").expect("stage by prefix");
        assert_eq!(stage.book_id, book.id);

        let err = coord.set_book_completed("zzzz", true).expect_err("stale");
        assert!(matches!(err, Error::NotFound { level: Level::Book, .. }));
        let err = coord
            .update_task_with("tk-gone", |_| Ok(TaskPatch::default()))
            .expect_err("stale");
        assert!(matches!(err, Error::NotFound { level: Level::Task, .. }));
        let err = coord
            .update_task_with(&stage.id, |_| {
                Err(Error::InvalidArgument("bad reference".to_string()))
            })
            .expect_err("wrong level");
        assert!(matches!(err, Error::NotFound { .. }));

        assert_eq!(
            messages(&coord),
            vec![
                "Book created successfully",
                "Stage created successfully",
                "Failed to update book",
                "Failed to update task",
                "Failed to update task",
            ]
        );
    }

    #[test]
    fn edit_errors_fail_the_action() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let stage = coord.create_stage(&book.id, "Stage").expect("stage");
        let task = coord.create_task(&stage.id, "Task").expect("task");

        let err = coord
            .update_task_with(&task.id, |_| {
                Err(Error::InvalidArgument("bad reference".to_string()))
            })
            .expect_err("edit error");
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(coord.task(&task.id).expect("task"), task);
        assert_eq!(
            messages(&coord).last().map(String::as_str),
            Some("Failed to update task")
        );
    }

    #[test]
    fn last_of_three_tasks_completes_stage_and_feeds_book() {
        let mut coord = coordinator();
        let book = coord.create_book("Book").expect("book");
        let s1 = coord.create_stage(&book.id, "S1").expect("s1");
        let s2 = coord.create_stage(&book.id, "S2").expect("s2");
        let tasks: Vec<Task> = ["T1", "T2", "T3"]
            .iter()
            .map(|title| coord.create_task(&s1.id, title).expect("task"))
            .collect();
        coord.create_task(&s2.id, "Other").expect("other");
        coord.set_task_completed(&tasks[0].id, true).expect("t1");
        coord.set_task_completed(&tasks[1].id, true).expect("t2");

        let before = coord.stage(&s1.id).expect("stage");
        assert_eq!(before.progress, 67);
        assert!(!before.is_completed);
        assert_eq!(coord.book(&book.id).expect("book").progress, 0);

        let last = coord.toggle_task(&tasks[2].id).expect("t3");
        let s1 = coord.stage(&s1.id).expect("stage");
        assert_eq!(s1.progress, 100);
        assert!(s1.is_completed);
        assert_eq!(s1.updated_at, last.updated_at);

        let book = coord.book(&book.id).expect("book");
        assert_eq!(book.progress, 50);
        assert!(!book.is_completed);
        assert_eq!(book.updated_at, s1.updated_at);
    }

    /// Memory store that records the order of exclusive sections and writes.
    struct TrackingStore {
        inner: MemoryStore,
        log: Vec<&'static str>,
    }

    impl RecordStore for TrackingStore {
        fn list_books(&self) -> Result<Vec<Book>> {
            self.inner.list_books()
        }
        fn list_stages(&self, book_id: &str) -> Result<Vec<Stage>> {
            self.inner.list_stages(book_id)
        }
        fn list_tasks(&self, stage_id: &str) -> Result<Vec<Task>> {
            self.inner.list_tasks(stage_id)
        }
        fn find_book(&self, id: &str) -> Result<Option<Book>> {
            self.inner.find_book(id)
        }
        fn find_stage(&self, id: &str) -> Result<Option<Stage>> {
            self.inner.find_stage(id)
        }
        fn find_task(&self, id: &str) -> Result<Option<Task>> {
            self.inner.find_task(id)
        }
        fn ids(&self, level: Level) -> Result<Vec<String>> {
            self.inner.ids(level)
        }
        fn apply(&mut self, batch: WriteBatch) -> Result<()> {
            self.log.push("apply");
            self.inner.apply(batch)
        }
        fn begin_exclusive(&mut self) -> Result<()> {
            self.log.push("begin");
            Ok(())
        }
        fn end_exclusive(&mut self) {
            self.log.push("end");
        }
    }

    #[test]
    fn actions_plan_and_apply_inside_one_exclusive_section() {
        let store = TrackingStore {
            inner: MemoryStore::new(),
            log: Vec::new(),
        };
        let mut coord = HierarchyCoordinator::new(store, Vec::<Notification>::new());
        coord.create_book("Book").expect("book");
        coord.reorder_books(0, 4).expect_err("out of range");

        assert_eq!(
            coord.store().log,
            vec!["begin", "apply", "end", "begin", "end"]
        );
    }
}
