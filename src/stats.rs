//! Library statistics: period and completion filters, sorting, and totals.
//!
//! Besides the totals, a report carries a period summary (books bucketed by
//! `updated_at` into the last 4 weeks or the last 6 months, most recent
//! first) and the most active stages and most recently updated tasks.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinator::BookTree;
use crate::error::Error;
use crate::model::{Book, Stage, Task};
use crate::progress::{average_progress, estimate_completion, CompletionEstimate};

/// Recency window on a book's `updated_at`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    All,
    Month,
    Week,
    Day,
}

impl Period {
    pub fn window(self) -> Option<Duration> {
        match self {
            Period::All => None,
            Period::Month => Some(Duration::days(30)),
            Period::Week => Some(Duration::days(7)),
            Period::Day => Some(Duration::hours(24)),
        }
    }
}

impl std::str::FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Period::All),
            "month" => Ok(Period::Month),
            "week" => Ok(Period::Week),
            "day" => Ok(Period::Day),
            _ => Err(Error::InvalidArgument(format!(
                "invalid period '{}': must be all, month, week, or day",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Name,
    #[default]
    Progress,
    Date,
}

impl std::str::FromStr for SortBy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(SortBy::Name),
            "progress" => Ok(SortBy::Progress),
            "date" => Ok(SortBy::Date),
            _ => Err(Error::InvalidArgument(format!(
                "invalid sort '{}': must be name, progress, or date",
                s
            ))),
        }
    }
}

/// Bucket width for the period summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bucketing {
    #[default]
    Week,
    Month,
}

impl std::str::FromStr for Bucketing {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(Bucketing::Week),
            "month" => Ok(Bucketing::Month),
            _ => Err(Error::InvalidArgument(format!(
                "invalid bucket '{}': must be week or month",
                s
            ))),
        }
    }
}

const WEEK_BUCKETS: i64 = 4;
const MONTH_BUCKETS: i32 = 6;

/// Entries kept in each most-active list.
pub const ACTIVE_LIMIT: usize = 5;

struct Bucket {
    label: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Bucketing {
    /// Buckets ending with the one holding `now`, most recent first. Weeks
    /// start on Sunday; all bounds are UTC midnights and `end` is exclusive.
    fn buckets(self, now: DateTime<Utc>) -> Vec<Bucket> {
        let today = now.date_naive();
        match self {
            Bucketing::Week => {
                let sunday =
                    today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
                (0..WEEK_BUCKETS)
                    .map(|i| {
                        let first = sunday - Duration::days(7 * i);
                        let last = first + Duration::days(6);
                        Bucket {
                            label: format!("{} - {}", first.format("%m/%d"), last.format("%m/%d")),
                            start: midnight(first),
                            end: midnight(first + Duration::days(7)),
                        }
                    })
                    .collect()
            }
            Bucketing::Month => {
                let current = today.year() * 12 + today.month0() as i32;
                (0..MONTH_BUCKETS)
                    .filter_map(|i| {
                        let first = month_start(current - i)?;
                        let next = month_start(current - i + 1)?;
                        Some(Bucket {
                            label: first.format("%b %Y").to_string(),
                            start: midnight(first),
                            end: midnight(next),
                        })
                    })
                    .collect()
            }
        }
    }
}

/// First day of the month `index` months after January of year 0.
fn month_start(index: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StatsFilter {
    pub period: Period,
    pub sort: SortBy,
    pub show_completed: bool,
    pub by: Bucketing,
}

impl Default for StatsFilter {
    fn default() -> Self {
        Self {
            period: Period::All,
            sort: SortBy::Progress,
            show_completed: true,
            by: Bucketing::Week,
        }
    }
}

impl StatsFilter {
    pub fn keeps(&self, book: &Book, now: DateTime<Utc>) -> bool {
        if !self.show_completed && book.is_completed {
            return false;
        }
        match self.period.window() {
            Some(window) => now - book.updated_at < window,
            None => true,
        }
    }

    /// Filter then stable-sort `trees` by their books.
    pub fn apply<'a>(&self, trees: &'a [BookTree], now: DateTime<Utc>) -> Vec<&'a BookTree> {
        let mut kept: Vec<&BookTree> = trees
            .iter()
            .filter(|tree| self.keeps(&tree.book, now))
            .collect();
        match self.sort {
            SortBy::Name => kept.sort_by(|a, b| {
                a.book
                    .title
                    .to_lowercase()
                    .cmp(&b.book.title.to_lowercase())
            }),
            SortBy::Progress => kept.sort_by(|a, b| b.book.progress.cmp(&a.book.progress)),
            SortBy::Date => kept.sort_by(|a, b| b.book.updated_at.cmp(&a.book.updated_at)),
        }
        kept
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BookSummary {
    pub id: String,
    pub title: String,
    pub progress: u8,
    pub is_completed: bool,
    pub stages: usize,
    pub completed_stages: usize,
    pub tasks: usize,
    pub completed_tasks: usize,
    pub estimate: CompletionEstimate,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LibraryStats {
    pub filter: StatsFilter,
    pub total_books: usize,
    pub completed_books: usize,
    pub total_stages: usize,
    pub completed_stages: usize,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub overall_progress: u8,
    pub books: Vec<BookSummary>,
    pub periods: Vec<PeriodSummary>,
    pub most_active_stages: Vec<StageActivity>,
    pub recent_tasks: Vec<Task>,
}

/// Books whose last update falls in `[start, end)`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PeriodSummary {
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_books: usize,
    pub completed_books: usize,
    pub average_progress: u8,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StageActivity {
    #[serde(flatten)]
    pub stage: Stage,
    /// `progress`, plus 100 once the stage is completed
    pub score: u16,
}

impl StageActivity {
    pub fn new(stage: Stage) -> Self {
        let bonus = if stage.is_completed { 100 } else { 0 };
        Self {
            score: u16::from(stage.progress) + bonus,
            stage,
        }
    }
}

pub fn library_stats(trees: &[BookTree], filter: StatsFilter, now: DateTime<Utc>) -> LibraryStats {
    let kept = filter.apply(trees, now);
    let books: Vec<BookSummary> = kept.iter().map(|tree| summarize(tree, now)).collect();
    let kept_books: Vec<Book> = kept.iter().map(|tree| tree.book.clone()).collect();

    LibraryStats {
        filter,
        total_books: books.len(),
        completed_books: books.iter().filter(|book| book.is_completed).count(),
        total_stages: books.iter().map(|book| book.stages).sum(),
        completed_stages: books.iter().map(|book| book.completed_stages).sum(),
        total_tasks: books.iter().map(|book| book.tasks).sum(),
        completed_tasks: books.iter().map(|book| book.completed_tasks).sum(),
        overall_progress: average_progress(&kept_books),
        books,
        periods: period_summaries(&kept_books, filter.by, now),
        most_active_stages: most_active_stages(&kept),
        recent_tasks: recent_tasks(&kept),
    }
}

pub fn period_summaries(books: &[Book], by: Bucketing, now: DateTime<Utc>) -> Vec<PeriodSummary> {
    by.buckets(now)
        .into_iter()
        .map(|bucket| {
            let inside: Vec<Book> = books
                .iter()
                .filter(|book| bucket.start <= book.updated_at && book.updated_at < bucket.end)
                .cloned()
                .collect();
            PeriodSummary {
                label: bucket.label,
                start: bucket.start,
                end: bucket.end,
                total_books: inside.len(),
                completed_books: inside.iter().filter(|book| book.is_completed).count(),
                average_progress: average_progress(&inside),
            }
        })
        .collect()
}

/// Highest-scoring stages first; ties keep library order.
pub fn most_active_stages(trees: &[&BookTree]) -> Vec<StageActivity> {
    let mut stages: Vec<StageActivity> = trees
        .iter()
        .flat_map(|tree| tree.stages.iter())
        .map(|stage| StageActivity::new(stage.stage.clone()))
        .collect();
    stages.sort_by(|a, b| b.score.cmp(&a.score));
    stages.truncate(ACTIVE_LIMIT);
    stages
}

pub fn recent_tasks(trees: &[&BookTree]) -> Vec<Task> {
    let mut tasks: Vec<Task> = trees
        .iter()
        .flat_map(|tree| tree.stages.iter())
        .flat_map(|stage| stage.tasks.iter().cloned())
        .collect();
    tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    tasks.truncate(ACTIVE_LIMIT);
    tasks
}

fn summarize(tree: &BookTree, now: DateTime<Utc>) -> BookSummary {
    let book = &tree.book;
    BookSummary {
        id: book.id.clone(),
        title: book.title.clone(),
        progress: book.progress,
        is_completed: book.is_completed,
        stages: tree.stages.len(),
        completed_stages: tree
            .stages
            .iter()
            .filter(|stage| stage.stage.is_completed)
            .count(),
        tasks: tree.stages.iter().map(|stage| stage.tasks.len()).sum(),
        completed_tasks: tree
            .stages
            .iter()
            .flat_map(|stage| stage.tasks.iter())
            .filter(|task| task.is_completed)
            .count(),
        estimate: estimate_completion(book.progress, book.created_at, now),
        updated_at: book.updated_at,
    }
}
