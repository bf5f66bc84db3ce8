//! Plain-text rendering for terminal output.

use miles_core::{Goal, Message, ProgressSummary, RitualCompletion, RitualKind, Role, Timeframe};
use std::fmt::Write;

const BAR_WIDTH: usize = 20;

pub fn progress_bar(progress: u8) -> String {
    let filled = usize::from(progress.min(100)) * BAR_WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

pub fn goal_line(goal: &Goal) -> String {
    format!(
        "{} {} {:>3}%  {}",
        goal.id,
        progress_bar(goal.progress),
        goal.progress,
        goal.title
    )
}

pub fn goal_detail(goal: &Goal) -> String {
    let mut out = format!("{}\n", goal_line(goal));
    if let Some(description) = &goal.description {
        let _ = writeln!(out, "  {}", description);
    }
    let _ = writeln!(out, "  updated {}", goal.updated_at.format("%Y-%m-%d %H:%M"));
    for m in &goal.milestones {
        let mark = if m.completed { "x" } else { " " };
        let _ = writeln!(out, "  [{}] {} {:>3}%  {}", mark, m.id, m.progress, m.title);
    }
    out
}

pub fn message(message: &Message) -> String {
    match message.role {
        Role::Assistant => format!("Miles: {}", message.content),
        Role::User => format!("You: {}", message.content),
        Role::System => format!("[system] {}", message.content),
    }
}

pub fn ritual_line(kind: RitualKind, done: Option<&RitualCompletion>) -> String {
    match done {
        Some(c) => {
            let mut line = format!("[x] {:<7} done at {}", kind.as_str(), c.completed_at.format("%H:%M UTC"));
            if let Some(note) = &c.reflection {
                let _ = write!(line, "  \"{}\"", note);
            }
            line
        }
        None => format!("[ ] {:<7} not done yet", kind.as_str()),
    }
}

pub fn summary(s: &ProgressSummary, timeframe: Timeframe) -> String {
    let mut out = format!("[{}] {}\n", timeframe.as_str(), s.headline());
    if s.total > 0 {
        let _ = writeln!(out, "  {} {:>3}% average", progress_bar(s.average), s.average);
        let _ = writeln!(
            out,
            "  {} completed, {} in progress, {} not started",
            s.completed, s.in_progress, s.not_started
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use miles_core::summarize;

    #[test]
    fn test_ritual_line() {
        let done = RitualCompletion {
            id: "r".into(),
            owner_id: "u".into(),
            kind: RitualKind::Evening,
            completed_at: Utc.with_ymd_and_hms(2024, 5, 1, 21, 5, 0).unwrap(),
            reflection: Some("Good day".into()),
        };
        assert_eq!(
            ritual_line(RitualKind::Evening, Some(&done)),
            "[x] evening done at 21:05 UTC  \"Good day\""
        );
        assert_eq!(ritual_line(RitualKind::Morning, None), "[ ] morning not done yet");
    }

    #[test]
    fn test_empty_summary_is_headline_only() {
        let s = summarize(&[], Timeframe::All, Utc::now());
        assert_eq!(
            summary(&s, Timeframe::All),
            "[all] No goals set yet. Create your first goal to start tracking progress!\n"
        );
    }

    #[test]
    fn test_progress_bar_bounds() {
        assert_eq!(progress_bar(0), format!("[{}]", "-".repeat(20)));
        assert_eq!(progress_bar(100), format!("[{}]", "#".repeat(20)));
        assert_eq!(progress_bar(50).matches('#').count(), 10);
    }
}
