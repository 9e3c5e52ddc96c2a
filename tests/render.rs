#[path = "common/mod.rs"]
mod common;

use common::*;
use threadscope::{
    from_record, from_records, to_filter_text, to_prompt_text, to_record, to_records, write_json_pretty, read_json,
    BuildOptions, Thread, ThreadBuilder,
};

fn sample_thread() -> Thread {
    let forest = vec![
        comment("a", 10, vec![comment("a1", 4, vec![]), comment("a2", 6, vec![])]),
        comment_with("b", None, "line one\nline two", 3, vec![]),
    ];
    let src = FixtureSource::new().with_thread(post("p1", 42), forest);
    ThreadBuilder::new(BuildOptions::default().with_max_depth(2)).attach_comments(&src, src.posts["p1"].clone())
}

/// A thread survives record form unchanged.
#[test]
fn record_round_trip() {
    let thread = sample_thread();
    let rec = to_record(&thread).unwrap();
    assert_eq!(rec["id"], "p1");
    assert_eq!(rec["created_utc"], "2023-11-14T22:13:20Z");
    assert_eq!(rec["comments"][0]["replies"][0]["depth"], 1);
    let back = from_record(rec).unwrap();
    assert_eq!(back, thread);
}

/// Collections round-trip through a pretty JSON file on disk.
#[test]
fn records_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("threads.json");
    let threads = vec![sample_thread()];
    write_json_pretty(&path, &to_records(&threads).unwrap()).unwrap();
    let loaded: Vec<serde_json::Value> = read_json(&path).unwrap();
    assert_eq!(from_records(loaded).unwrap(), threads);
}

/// Malformed records are rejected with an error, not a panic.
#[test]
fn bad_record_is_an_error() {
    let mut rec = to_record(&sample_thread()).unwrap();
    rec["created_utc"] = serde_json::json!("yesterday");
    assert!(from_record(rec).is_err());
}

/// Prompt text lists comments in pre-order, indented four spaces per level,
/// indenting every body line.
#[test]
fn prompt_text_is_pre_order() {
    let text = to_prompt_text(&sample_thread());
    let expected = "\
POST TITLE: Title p1
POST BODY: Body of p1

--- COMMENTS ---

Comment (Score: 10):
comment a
---
    Comment (Score: 6):
    comment a2
    ---
    Comment (Score: 4):
    comment a1
    ---
Comment (Score: 3):
line one
line two
---
";
    assert_eq!(text, expected);
}

/// An empty body renders as a marker rather than a blank line.
#[test]
fn prompt_text_marks_missing_body() {
    let mut p = post("p2", 1);
    p.selftext = String::new();
    let src = FixtureSource::new().with_thread(p, vec![]);
    let thread = ThreadBuilder::new(quick_build()).attach_comments(&src, src.posts["p2"].clone());
    assert!(to_prompt_text(&thread).contains("POST BODY: [no body]\n"));
}

/// The filter input is title and body only.
#[test]
fn filter_text_has_title_and_body() {
    let thread = sample_thread();
    assert_eq!(to_filter_text(&thread), "Title: Title p1\nBody: Body of p1");
}
