//! Reminder-tier rules for overdue invoices.
//!
//! Everything here is a pure function over persisted invoice fields, so tier
//! eligibility never depends on when the sweep actually fires: a sweep run
//! twice in a row computes the same answer, and the spacing check alone makes
//! re-runs self-limiting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::invoice::InvoiceStatus;

/// Highest escalation tier; invoices at this tier receive no further reminders.
pub const MAX_REMINDER_TIER: u8 = 4;

/// Escalation tier of an overdue reminder.
///
/// Tiers fire at J+1, J+7, J+15 and J+30 relative to the due date, each
/// additionally requiring a minimum spacing since the previous reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderTier {
    First,
    Second,
    Third,
    Fourth,
}

impl ReminderTier {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(ReminderTier::First),
            2 => Some(ReminderTier::Second),
            3 => Some(ReminderTier::Third),
            4 => Some(ReminderTier::Fourth),
            _ => None,
        }
    }

    /// 1-based tier index (equals the invoice's reminder_count after sending).
    pub fn index(&self) -> u8 {
        match self {
            ReminderTier::First => 1,
            ReminderTier::Second => 2,
            ReminderTier::Third => 3,
            ReminderTier::Fourth => 4,
        }
    }

    /// Minimum days past the due date before this tier may fire.
    pub fn min_days_overdue(&self) -> i64 {
        match self {
            ReminderTier::First => 1,
            ReminderTier::Second => 7,
            ReminderTier::Third => 15,
            ReminderTier::Fourth => 30,
        }
    }

    /// Minimum days since the previous reminder before this tier may fire.
    ///
    /// The gap to the previous tier's overdue threshold, so an invoice that
    /// went straight to a late tier is still throttled.
    pub fn min_days_since_previous(&self) -> i64 {
        match self {
            ReminderTier::First => 0,
            ReminderTier::Second => 6,
            ReminderTier::Third => 8,
            ReminderTier::Fourth => 15,
        }
    }
}

/// Per-account dunning configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningSettings {
    /// Master switch for automatic reminders.
    pub auto_enabled: bool,
    /// One enable flag per tier (index 0 = tier 1).
    pub tier_enabled: [bool; MAX_REMINDER_TIER as usize],
}

impl Default for DunningSettings {
    fn default() -> Self {
        Self {
            auto_enabled: true,
            tier_enabled: [true; MAX_REMINDER_TIER as usize],
        }
    }
}

impl DunningSettings {
    pub fn disabled() -> Self {
        Self {
            auto_enabled: false,
            ..Self::default()
        }
    }

    pub fn tier_is_enabled(&self, tier: ReminderTier) -> bool {
        self.tier_enabled[(tier.index() - 1) as usize]
    }
}

/// The persisted invoice fields tier eligibility is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DunningSnapshot {
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    pub reminder_count: u8,
    pub last_reminder_at: Option<NaiveDate>,
}

/// Determine which tier (if any) fires for an invoice today.
///
/// Returns `None` when the invoice is not a reminder candidate, the maximum
/// tier is reached, the tier is disabled, or either the overdue-age or the
/// spacing threshold is not yet met.
pub fn next_eligible_tier(
    snapshot: &DunningSnapshot,
    settings: &DunningSettings,
    today: NaiveDate,
) -> Option<ReminderTier> {
    if !settings.auto_enabled {
        return None;
    }
    if !snapshot.status.allows_reminder() {
        return None;
    }
    if snapshot.reminder_count >= MAX_REMINDER_TIER {
        return None;
    }

    let days_overdue = (today - snapshot.due_date).num_days();
    if days_overdue < 1 {
        return None;
    }

    let tier = ReminderTier::from_index(snapshot.reminder_count + 1)?;
    if !settings.tier_is_enabled(tier) {
        return None;
    }
    if days_overdue < tier.min_days_overdue() {
        return None;
    }

    // Spacing check — the sole idempotency guard for the sweep.
    if let Some(last) = snapshot.last_reminder_at {
        if (today - last).num_days() < tier.min_days_since_previous() {
            return None;
        }
    }

    Some(tier)
}
