//! Boundary checks.
//!
//! Two directions: user input entering the services (`CoachError::Validation`)
//! and stored rows/documents entering the domain (`anyhow` errors, so the
//! adapter can attach the row id as context).

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};

use crate::error::{CoachError, CoachResult};
use crate::model::{MilestonePatch, NewGoal, NewMilestone, Role};

pub const MAX_PROGRESS: u8 = 100;

// ============================================================================
// Input validation
// ============================================================================

pub fn require_text(field: &str, value: &str) -> CoachResult<()> {
    if value.trim().is_empty() {
        return Err(CoachError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

pub fn require_progress(value: u8) -> CoachResult<()> {
    if value > MAX_PROGRESS {
        return Err(CoachError::validation(format!(
            "progress must be between 0 and {MAX_PROGRESS}, got {value}"
        )));
    }
    Ok(())
}

pub fn validate_new_milestone(milestone: &NewMilestone) -> CoachResult<()> {
    require_text("milestone title", &milestone.title)?;
    require_progress(milestone.progress)
}

pub fn validate_new_goal(goal: &NewGoal) -> CoachResult<()> {
    require_text("goal title", &goal.title)?;
    goal.milestones.iter().try_for_each(validate_new_milestone)
}

pub fn validate_milestone_patch(patch: &MilestonePatch) -> CoachResult<()> {
    if let Some(title) = &patch.title {
        require_text("milestone title", title)?;
    }
    if let Some(progress) = patch.progress {
        require_progress(progress)?;
    }
    Ok(())
}

// ============================================================================
// Stored-data parsing
// ============================================================================

/// Accept a stored numeric progress only if it is within 0-100.
pub fn parse_progress(raw: i64) -> Result<u8> {
    if !(0..=MAX_PROGRESS as i64).contains(&raw) {
        bail!("progress out of range: {}", raw);
    }
    Ok(raw as u8)
}

pub fn parse_role(raw: &str) -> Result<Role> {
    match Role::parse_str(raw) {
        Some(role) => Ok(role),
        None => bail!("unknown message role: {}", raw),
    }
}

pub fn parse_millis(raw: i64) -> Result<DateTime<Utc>> {
    match Utc.timestamp_millis_opt(raw).single() {
        Some(ts) => Ok(ts),
        None => bail!("invalid epoch-millisecond timestamp: {}", raw),
    }
}

pub fn parse_iso8601(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| anyhow::anyhow!("invalid ISO-8601 timestamp {:?}: {}", raw, e))?
        .with_timezone(&Utc))
}
