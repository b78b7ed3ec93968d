//! Progress roll-up from children to parents.
//!
//! A task's `is_completed` is the only leaf truth. A stage's progress is the
//! completed share of its tasks; a book's progress comes from its stages using
//! the configured `ProgressFormula`. Completion flags on stages and books are
//! user-settable; in `CompletionMode::Auto` every child change re-derives them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Book, Ordered, Stage, Task};

/// Anything that can feed a parent's progress.
pub trait Completion {
    fn is_completed(&self) -> bool;

    /// Progress on the 0-100 scale; binary for leaves.
    fn progress(&self) -> u8 {
        if self.is_completed() {
            100
        } else {
            0
        }
    }
}

impl Completion for bool {
    fn is_completed(&self) -> bool {
        *self
    }
}

impl Completion for Task {
    fn is_completed(&self) -> bool {
        self.is_completed
    }
}

impl Completion for Stage {
    fn is_completed(&self) -> bool {
        self.is_completed
    }

    fn progress(&self) -> u8 {
        self.progress
    }
}

impl Completion for Book {
    fn is_completed(&self) -> bool {
        self.is_completed
    }

    fn progress(&self) -> u8 {
        self.progress
    }
}

/// How a book's progress is derived from its stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressFormula {
    /// round(100 * completed stages / stages)
    #[default]
    CompletedRatio,
    /// round(mean of stage progress)
    Average,
}

/// Whether child changes re-derive a parent's `is_completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Each child change sets the flag to "all children completed".
    #[default]
    Auto,
    /// Only explicit user actions change the flag.
    Manual,
}

/// `round(100 * completed / len)`, half-up; 0 for no children.
pub fn compute_progress<C: Completion>(children: &[C]) -> u8 {
    let total = children.len() as u64;
    if total == 0 {
        return 0;
    }
    let completed = children.iter().filter(|child| child.is_completed()).count() as u64;
    round_ratio(100 * completed, total)
}

/// Mean of child progress values, half-up; 0 for no children.
pub fn average_progress<C: Completion>(children: &[C]) -> u8 {
    let total = children.len() as u64;
    if total == 0 {
        return 0;
    }
    let sum: u64 = children.iter().map(|child| u64::from(child.progress())).sum();
    round_ratio(sum, total)
}

/// Whether every child is completed. An empty list is not complete.
pub fn compute_completion_cascade<C: Completion>(children: &[C]) -> bool {
    !children.is_empty() && children.iter().all(Completion::is_completed)
}

fn round_ratio(numerator: u64, denominator: u64) -> u8 {
    let rounded = (2 * numerator + denominator) / (2 * denominator);
    rounded.min(100) as u8
}

/// Derived values for one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rollup {
    pub progress: u8,
    pub all_completed: bool,
}

/// Roll-up rules, built from `[progress]` configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressAggregator {
    pub book_formula: ProgressFormula,
    pub stage_completion: CompletionMode,
    pub book_completion: CompletionMode,
}

impl ProgressAggregator {
    pub fn new(
        book_formula: ProgressFormula,
        stage_completion: CompletionMode,
        book_completion: CompletionMode,
    ) -> Self {
        Self {
            book_formula,
            stage_completion,
            book_completion,
        }
    }

    pub fn stage_rollup(&self, tasks: &[Task]) -> Rollup {
        Rollup {
            progress: compute_progress(tasks),
            all_completed: compute_completion_cascade(tasks),
        }
    }

    pub fn book_rollup(&self, stages: &[Stage]) -> Rollup {
        let progress = match self.book_formula {
            ProgressFormula::CompletedRatio => compute_progress(stages),
            ProgressFormula::Average => average_progress(stages),
        };
        Rollup {
            progress,
            all_completed: compute_completion_cascade(stages),
        }
    }

    /// A copy of `stage` with derived fields recomputed over `tasks`.
    pub fn recompute_stage(&self, stage: &Stage, tasks: &[Task], now: DateTime<Utc>) -> Stage {
        let rollup = self.stage_rollup(tasks);
        let mut next = stage.clone();
        next.progress = rollup.progress;
        if self.stage_completion == CompletionMode::Auto {
            next.is_completed = rollup.all_completed;
        }
        next.touch(now);
        next
    }

    /// A copy of `book` with derived fields recomputed over `stages`.
    pub fn recompute_book(&self, book: &Book, stages: &[Stage], now: DateTime<Utc>) -> Book {
        let rollup = self.book_rollup(stages);
        let mut next = book.clone();
        next.progress = rollup.progress;
        if self.book_completion == CompletionMode::Auto {
            next.is_completed = rollup.all_completed;
        }
        next.touch(now);
        next
    }
}

/// Rough time-to-finish guess from the average progress rate so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum CompletionEstimate {
    Completed,
    NotStarted,
    Soon,
    Tomorrow,
    Days(u64),
    Weeks(u64),
    Months(u64),
}

impl fmt::Display for CompletionEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionEstimate::Completed => f.write_str("Completed"),
            CompletionEstimate::NotStarted => f.write_str("Not started"),
            CompletionEstimate::Soon => f.write_str("Soon"),
            CompletionEstimate::Tomorrow => f.write_str("Tomorrow"),
            CompletionEstimate::Days(n) => write!(f, "{n} days"),
            CompletionEstimate::Weeks(n) => write!(f, "{n} weeks"),
            CompletionEstimate::Months(n) => write!(f, "{n} months"),
        }
    }
}

pub fn estimate_completion(
    progress: u8,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CompletionEstimate {
    if progress >= 100 {
        return CompletionEstimate::Completed;
    }
    if progress == 0 {
        return CompletionEstimate::NotStarted;
    }

    let days_passed = (now - created_at).num_days().max(1) as f64;
    let per_day = f64::from(progress) / days_passed;
    let days_remaining = (f64::from(100 - progress) / per_day).ceil() as u64;

    match days_remaining {
        0 => CompletionEstimate::Soon,
        1 => CompletionEstimate::Tomorrow,
        n if n < 7 => CompletionEstimate::Days(n),
        n if n < 30 => CompletionEstimate::Weeks(n.div_ceil(7)),
        n => CompletionEstimate::Months(n.div_ceil(30)),
    }
}
