//! Text reports returned to the delegating caller.
//!
//! Every report ends with a `<task_metadata>` trailer so the caller can
//! address the same session later.

use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use taskrelay_traits::{DelegatedTask, TaskMetadata};

static TRAILER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<task_metadata>(.*?)</task_metadata>").expect("Invalid regex")
});

static SESSION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*session_id:\s*(\S+)\s*$").expect("Invalid regex"));

/// `850ms`, `42s`, `3m 5s`, `1h 2m`.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1_000 {
        return format!("{ms}ms");
    }
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (hours, minutes, seconds) {
        (0, 0, s) => format!("{s}s"),
        (0, m, 0) => format!("{m}m"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, 0, _) => format!("{h}h"),
        (h, m, _) => format!("{h}h {m}m"),
    }
}

/// The machine-readable trailer. Falls back to the task id when no session
/// exists yet.
pub fn trailer(session_id: Option<&str>, task_id: Option<&str>) -> String {
    let mut out = String::from("<task_metadata>\n");
    match (session_id, task_id) {
        (Some(session_id), _) => {
            let _ = writeln!(out, "session_id: {session_id}");
        }
        (None, Some(task_id)) => {
            let _ = writeln!(out, "task_id: {task_id}");
        }
        (None, None) => {}
    }
    out.push_str("</task_metadata>");
    out
}

/// Session id from the last trailer in `text`.
pub fn parse_session_id(text: &str) -> Option<String> {
    let block = TRAILER_PATTERN.captures_iter(text).last()?;
    let body = block.get(1)?.as_str();
    SESSION_LINE
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

fn identity_lines(out: &mut String, metadata: &TaskMetadata) {
    match &metadata.category {
        Some(category) => {
            let _ = writeln!(out, "Agent: {} (category: {})", metadata.agent, category);
        }
        None => {
            let _ = writeln!(out, "Agent: {}", metadata.agent);
        }
    }
    if let Some(model) = &metadata.model {
        match metadata.provenance {
            Some(provenance) => {
                let _ = writeln!(out, "Model: {model} ({provenance})");
            }
            None => {
                let _ = writeln!(out, "Model: {model}");
            }
        }
    }
}

fn finish(mut out: String, metadata: &TaskMetadata) -> String {
    if !out.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str(&trailer(
        metadata.session_id.as_deref(),
        metadata.task_id.as_deref(),
    ));
    out
}

/// A synchronous run that produced a result.
pub fn render_completed(metadata: &TaskMetadata, elapsed: Duration, result: &str) -> String {
    let mut out = format!("Task completed in {}.\n\n", format_duration(elapsed));
    identity_lines(&mut out, metadata);
    out.push_str("\n---\n\n");
    if result.trim().is_empty() {
        out.push_str("(No text output)");
    } else {
        out.push_str(result.trim_end());
    }
    out.push('\n');
    finish(out, metadata)
}

/// A background launch. The caller checks back for results.
pub fn render_launched(task: &DelegatedTask, metadata: &TaskMetadata) -> String {
    let mut out = String::from("Background task launched.\n\n");
    let _ = writeln!(out, "Task ID: {}", task.id);
    let _ = writeln!(out, "Description: {}", task.description);
    identity_lines(&mut out, metadata);
    let _ = writeln!(out, "Status: {}", task.status.as_str());
    out.push('\n');
    if metadata.session_id.is_some() {
        out.push_str(
            "The task runs in the background. Continue with other work and check back \
             for its result using the session id below.\n",
        );
    } else {
        out.push_str(
            "The task has not opened a session yet. Continue with other work and look \
             it up by task id later.\n",
        );
    }
    finish(out, metadata)
}

/// A prompt sent to an existing session without waiting.
pub fn render_continued_in_background(task: &DelegatedTask, metadata: &TaskMetadata) -> String {
    let mut out = String::from("Background continuation started.\n\n");
    let _ = writeln!(out, "Task ID: {}", task.id);
    let _ = writeln!(out, "Description: {}", task.description);
    identity_lines(&mut out, metadata);
    out.push('\n');
    out.push_str("The session keeps running in the background. Check back for its result.\n");
    finish(out, metadata)
}

pub fn render_aborted(metadata: &TaskMetadata, elapsed: Duration) -> String {
    let mut out = String::from("Task aborted.\n\n");
    let _ = writeln!(out, "Description: {}", metadata.title);
    identity_lines(&mut out, metadata);
    let _ = writeln!(out, "Ran for: {}", format_duration(elapsed));
    finish(out, metadata)
}

pub fn render_timed_out(metadata: &TaskMetadata, budget: Duration) -> String {
    let mut out = format!("Task timed out after {}.\n\n", format_duration(budget));
    let _ = writeln!(out, "Description: {}", metadata.title);
    identity_lines(&mut out, metadata);
    out.push_str(
        "\nThe session may still be working. Continue it with the session id below to \
         collect its result.\n",
    );
    finish(out, metadata)
}
