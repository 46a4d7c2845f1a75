//! Streak tiers shown alongside the counter.

use serde::{Deserialize, Serialize};

/// Days of streak that fill the progress bar.
pub const STREAK_GOAL_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakMilestone {
    Starting,
    GreatStart,
    KeepingUp,
    OverAWeek,
    Wonderful,
    Legendary,
}

impl StreakMilestone {
    pub fn for_streak(streak: u32) -> Self {
        match streak {
            0 => StreakMilestone::Starting,
            1..=2 => StreakMilestone::GreatStart,
            3..=6 => StreakMilestone::KeepingUp,
            7..=13 => StreakMilestone::OverAWeek,
            14..=29 => StreakMilestone::Wonderful,
            _ => StreakMilestone::Legendary,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            StreakMilestone::Starting => "Do your best!",
            StreakMilestone::GreatStart => "Great start!",
            StreakMilestone::KeepingUp => "You're keeping it up well!",
            StreakMilestone::OverAWeek => "More than a week! Amazing!",
            StreakMilestone::Wonderful => "You are truly wonderful!",
            StreakMilestone::Legendary => "Legendary level achieved!",
        }
    }
}

/// Percent of the way to [`STREAK_GOAL_DAYS`], capped at 100.
pub fn progress_percent(streak: u32) -> u8 {
    let capped = streak.min(STREAK_GOAL_DAYS);
    ((capped * 100) / STREAK_GOAL_DAYS) as u8
}
