mod support;

use predicates::str::contains;
use serde_json::Value;

use support::TestLibrary;

/// Three books: "Alpha" half way through its only stage, "Beta" finished,
/// "Gamma" empty.
fn seeded_library() -> TestLibrary {
    let library = TestLibrary::new();

    let alpha = library.new_book("Alpha");
    let alpha_stage = library.new_stage(&alpha, "Part I");
    let first = library.new_task(&alpha_stage, "Chapter 1");
    library.new_task(&alpha_stage, "Chapter 2");
    library.json(&["task", "done", &first]);

    let beta = library.new_book("Beta");
    let beta_stage = library.new_stage(&beta, "Part I");
    let only = library.new_task(&beta_stage, "Chapter 1");
    library.json(&["task", "done", &only]);

    library.new_book("Gamma");
    library
}

fn titles(stats: &Value) -> Vec<String> {
    stats["books"]
        .as_array()
        .expect("books")
        .iter()
        .map(|book| book["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn stats_totals_cover_whole_library() -> Result<(), Box<dyn std::error::Error>> {
    let library = seeded_library();
    let stats = library.json(&["stats"]);

    assert_eq!(stats["total_books"], 3);
    assert_eq!(stats["completed_books"], 1);
    assert_eq!(stats["total_stages"], 2);
    assert_eq!(stats["completed_stages"], 1);
    assert_eq!(stats["total_tasks"], 3);
    assert_eq!(stats["completed_tasks"], 2);
    assert_eq!(stats["overall_progress"], 33);
    assert_eq!(stats["filter"]["sort"], "progress");
    assert_eq!(stats["filter"]["period"], "all");
    Ok(())
}

#[test]
fn stats_sorts_by_progress_then_name() {
    let library = seeded_library();

    let by_progress = library.json(&["stats"]);
    assert_eq!(titles(&by_progress), vec!["Beta", "Alpha", "Gamma"]);
    assert_eq!(by_progress["books"][0]["estimate"]["status"], "completed");
    assert_eq!(by_progress["books"][2]["estimate"]["status"], "not_started");

    let by_name = library.json(&["stats", "--sort", "name"]);
    assert_eq!(titles(&by_name), vec!["Alpha", "Beta", "Gamma"]);
}

#[test]
fn stats_hide_completed_filters_totals() {
    let library = seeded_library();
    let stats = library.json(&["stats", "--hide-completed", "--sort", "name"]);

    assert_eq!(titles(&stats), vec!["Alpha", "Gamma"]);
    assert_eq!(stats["total_books"], 2);
    assert_eq!(stats["completed_books"], 0);
    assert_eq!(stats["total_tasks"], 2);
    assert_eq!(stats["completed_tasks"], 1);
    assert_eq!(stats["overall_progress"], 0);
    assert_eq!(stats["filter"]["show_completed"], false);
}

#[test]
fn stats_recent_period_keeps_fresh_books() {
    let library = seeded_library();
    let stats = library.json(&["stats", "--period", "day"]);
    assert_eq!(stats["total_books"], 3);
}

#[test]
fn stats_rejects_unknown_period() {
    let library = seeded_library();
    let err = library.json_error(&["stats", "--period", "decade"], 2);
    assert_eq!(err["error"]["kind"], "user_error");
    assert_eq!(err["command"], "stats");
}

#[test]
fn stats_empty_library_warns() {
    let library = TestLibrary::new();
    library
        .cmd()
        .arg("stats")
        .assert()
        .success()
        .stdout(contains("Overall progress: 0%"))
        .stdout(contains("no books match the current filter"));
}

#[test]
fn stats_period_summary_buckets_recent_updates() -> Result<(), Box<dyn std::error::Error>> {
    let library = seeded_library();

    let weekly = library.json(&["stats"]);
    assert_eq!(weekly["filter"]["by"], "week");
    let weeks = weekly["periods"].as_array().expect("periods");
    assert_eq!(weeks.len(), 4);
    assert_eq!(weeks[0]["total_books"], 3);
    assert_eq!(weeks[0]["completed_books"], 1);
    assert_eq!(weeks[0]["average_progress"], 33);
    assert!(weeks[1..].iter().all(|week| week["total_books"] == 0));

    let monthly = library.json(&["stats", "--by", "month"]);
    let months = monthly["periods"].as_array().expect("periods");
    assert_eq!(months.len(), 6);
    assert_eq!(months[0]["total_books"], 3);
    assert!(months[0]["label"].as_str().unwrap_or_default().contains(' '));

    let err = library.json_error(&["stats", "--by", "year"], 2);
    assert_eq!(err["error"]["kind"], "user_error");
    Ok(())
}

#[test]
fn stats_lists_most_active_stages_and_recent_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let library = seeded_library();
    let stats = library.json(&["stats"]);

    let stages = stats["most_active_stages"].as_array().expect("stages");
    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0]["score"], 200);
    assert_eq!(stages[0]["is_completed"], true);
    assert_eq!(stages[1]["score"], 50);
    assert_eq!(stages[1]["progress"], 50);

    let tasks = stats["recent_tasks"].as_array().expect("tasks");
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0]["title"], "Chapter 1");
    assert_eq!(tasks[0]["is_completed"], true);

    library
        .cmd()
        .arg("stats")
        .assert()
        .success()
        .stdout(contains("active stage: Part I 100% (score 200)"))
        .stdout(contains("recent task: [x] Chapter 1"));
    Ok(())
}
