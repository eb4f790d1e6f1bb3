use crate::models::Learner;
use chrono::{NaiveDate, offset::Utc};

/// Supplies "today" for streak bookkeeping.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Calendar days are UTC days.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().naive_utc().date()
    }
}

/// Updates the streak for a practice interaction on `today` and returns the new streak.
///
/// Same day: unchanged. Next day: +1. Anything else, including a first practice
/// or a clock that went backwards: back to 1.
pub fn touch(learner: &mut Learner, today: NaiveDate) -> i32 {
    let streak = match learner.last_practice {
        Some(last) if last == today => learner.streak_days,
        Some(last) if (today - last).num_days() == 1 => learner.streak_days + 1,
        _ => 1,
    };
    if streak != learner.streak_days || learner.last_practice != Some(today) {
        debug!("Streak of learner {}: {} -> {}", learner.id, learner.streak_days, streak);
    }
    learner.streak_days = streak;
    learner.last_practice = Some(today);
    streak
}
