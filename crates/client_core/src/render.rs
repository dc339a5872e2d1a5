//! Plain-text rendering of a run for terminal front ends.

use std::fmt::Write as _;

use chrono::{Local, TimeZone};
use shared::{
    domain::{PendingInteraction, RunId, RunOutcome, Step},
    protocol::RunEvent,
};

use crate::reducer::RunView;

const PROGRESS_BAR_WIDTH: usize = 24;

pub fn format_timestamp(ts_ms: i64) -> String {
    match Local.timestamp_millis_opt(ts_ms).single() {
        Some(at) => at.format("%H:%M:%S%.3f").to_string(),
        None => ts_ms.to_string(),
    }
}

pub fn progress_bar(progress: f64, width: usize) -> String {
    let clamped = if progress.is_finite() {
        progress.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (clamped * width as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        clamped * 100.0
    )
}

pub fn render_pending(pending: &PendingInteraction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "?? {}", pending.ui.title);
    if !pending.ui.description.is_empty() {
        let _ = writeln!(out, "   {}", pending.ui.description);
    }
    for (index, button) in pending.ui.buttons.iter().enumerate() {
        let label = if button.label.is_empty() {
            button.id.as_str()
        } else {
            button.label.as_str()
        };
        let _ = writeln!(out, "   [{}] {} ({})", index + 1, label, button.id);
    }
    out
}

pub fn render_step(step: &Step) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== {} ({}) [{}]",
        step.title,
        step.step_id,
        step.status.label()
    );
    if let Some(progress) = step.progress {
        let _ = write!(out, "   {}", progress_bar(progress, PROGRESS_BAR_WIDTH));
        if let Some(message) = &step.message {
            let _ = write!(out, " {message}");
        }
        out.push('\n');
    }
    if let Some(error) = &step.error {
        let _ = writeln!(out, "   error: {error}");
    }
    if let Some(output) = &step.output {
        let pretty = serde_json::to_string_pretty(output).unwrap_or_else(|_| output.to_string());
        for line in pretty.lines() {
            let _ = writeln!(out, "   | {line}");
        }
    }
    out
}

pub fn render_log_entry(event: &RunEvent) -> String {
    format!(
        "{} #{:<3} {:<15} {:<10} {}",
        event.ts.map(format_timestamp).unwrap_or_else(|| "-".into()),
        event.seq,
        event.event_type,
        event.span_id.as_ref().map(|s| s.as_str()).unwrap_or("-"),
        event.payload
    )
}

pub fn render_outcome(outcome: &RunOutcome) -> Option<String> {
    match outcome {
        RunOutcome::Running => None,
        RunOutcome::Completed { summary } => Some(match summary {
            Some(summary) => format!("run completed: {summary}"),
            None => "run completed".to_string(),
        }),
        RunOutcome::Failed { message } => Some(match message {
            Some(message) => format!("run failed: {message}"),
            None => "run failed".to_string(),
        }),
        RunOutcome::Canceled { reason } => Some(match reason {
            Some(reason) => format!("run canceled: {reason}"),
            None => "run canceled".to_string(),
        }),
    }
}

pub fn render_run(run_id: Option<&RunId>, view: &RunView, log: &[RunEvent]) -> String {
    let mut out = String::new();
    match run_id {
        Some(run_id) => {
            let _ = writeln!(out, "run: {run_id}");
        }
        None => out.push_str("run: (none)\n"),
    }
    if let Some(pending) = &view.pending {
        out.push('\n');
        out.push_str(&render_pending(pending));
    }
    for step in view.steps.values() {
        out.push('\n');
        out.push_str(&render_step(step));
    }
    if let Some(outcome) = render_outcome(&view.outcome) {
        let _ = write!(out, "\n{outcome}\n");
    }
    if !log.is_empty() {
        out.push_str("\n-- events --\n");
        for event in log {
            out.push_str(&render_log_entry(event));
            out.push('\n');
        }
    }
    out
}
