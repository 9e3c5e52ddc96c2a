//! Thread rendering: the persisted record form and the indented text form
//! fed to the language model.

use crate::thread::{CommentNode, Thread};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt::Write as _;

/// Indent unit per comment depth in prompt text.
pub const INDENT_UNIT: &str = "    ";

/// Self-describing record for persistence (timestamps as RFC 3339).
pub fn to_record(thread: &Thread) -> Result<Value> {
    serde_json::to_value(thread).with_context(|| format!("serializing thread {}", thread.id))
}

/// Inverse of [`to_record`].
pub fn from_record(record: Value) -> Result<Thread> {
    let id = record.get("id").and_then(Value::as_str).unwrap_or("<no id>").to_string();
    serde_json::from_value(record).with_context(|| format!("reading thread record {id}"))
}

/// Records for a whole collection, in the given order.
pub fn to_records(threads: &[Thread]) -> Result<Vec<Value>> {
    threads.iter().map(to_record).collect()
}

pub fn from_records(records: Vec<Value>) -> Result<Vec<Thread>> {
    records.into_iter().map(from_record).collect()
}

/// Title and body only; the cheap input of the relevance filter.
pub fn to_filter_text(thread: &Thread) -> String {
    format!("Title: {}\nBody: {}", thread.title, thread.selftext)
}

/// Full thread for deep analysis: title, body, then every comment in
/// pre-order (a reply directly follows its parent, before the parent's next
/// sibling), indented by depth and annotated with its score.
pub fn to_prompt_text(thread: &Thread) -> String {
    let body = if thread.selftext.is_empty() { "[no body]" } else { thread.selftext.as_str() };
    let mut out = String::new();
    let _ = write!(out, "POST TITLE: {}\nPOST BODY: {}\n\n--- COMMENTS ---\n\n", thread.title, body);
    for comment in thread.walk_comments() {
        write_comment(&mut out, comment);
    }
    out
}

fn write_comment(out: &mut String, comment: &CommentNode) {
    let indent = INDENT_UNIT.repeat(comment.depth as usize);
    let _ = writeln!(out, "{indent}Comment (Score: {}):", comment.score);
    if comment.body.is_empty() {
        let _ = writeln!(out, "{indent}");
    }
    for line in comment.body.lines() {
        let _ = writeln!(out, "{indent}{line}");
    }
    let _ = writeln!(out, "{indent}---");
}
