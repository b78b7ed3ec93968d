//! shelf stats command implementation.

use crate::cli::{mark, GlobalOptions, Session};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::stats::{Bucketing, Period, SortBy, StatsFilter};

pub struct StatsOptions {
    pub period: Option<String>,
    pub sort: Option<String>,
    pub hide_completed: bool,
    pub by: Option<String>,
}

pub fn run(options: StatsOptions, globals: &GlobalOptions) -> Result<()> {
    let session = Session::open(globals)?;
    let defaults = session.config.stats.filter();
    let filter = StatsFilter {
        period: match options.period.as_deref() {
            Some(raw) => raw.parse::<Period>()?,
            None => defaults.period,
        },
        sort: match options.sort.as_deref() {
            Some(raw) => raw.parse::<SortBy>()?,
            None => defaults.sort,
        },
        show_completed: defaults.show_completed && !options.hide_completed,
        by: match options.by.as_deref() {
            Some(raw) => raw.parse::<Bucketing>()?,
            None => defaults.by,
        },
    };

    let stats = session.coordinator.stats(filter)?;

    let mut human = HumanOutput::new("Library stats");
    human.push_summary("Overall progress", format!("{}%", stats.overall_progress));
    human.push_summary(
        "Books",
        format!("{}/{} completed", stats.completed_books, stats.total_books),
    );
    human.push_summary(
        "Stages",
        format!("{}/{} completed", stats.completed_stages, stats.total_stages),
    );
    human.push_summary(
        "Tasks",
        format!("{}/{} completed", stats.completed_tasks, stats.total_tasks),
    );
    for book in &stats.books {
        human.push_detail(format!(
            "{} {}% ({}/{} tasks, estimate: {})",
            book.title, book.progress, book.completed_tasks, book.tasks, book.estimate
        ));
    }
    if stats.books.is_empty() {
        human.push_warning("no books match the current filter");
    }
    for period in &stats.periods {
        human.push_detail(format!(
            "{}: {} updated, {} completed, {}% average",
            period.label, period.total_books, period.completed_books, period.average_progress
        ));
    }
    for activity in &stats.most_active_stages {
        human.push_detail(format!(
            "active stage: {} {}% (score {})",
            activity.stage.title, activity.stage.progress, activity.score
        ));
    }
    for task in &stats.recent_tasks {
        human.push_detail(format!(
            "recent task: {} {} ({})",
            mark(task.is_completed),
            task.title,
            task.updated_at.format("%Y-%m-%d %H:%M")
        ));
    }

    emit_success(session.output, "stats", &stats, Some(&human))
}
