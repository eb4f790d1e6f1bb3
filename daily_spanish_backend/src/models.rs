use crate::errors::*;
use chrono::{DateTime, NaiveDate, offset::Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Chat-side identity of a learner. Opaque to the engine.
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Beginner, Level::Intermediate, Level::Advanced];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }

    /// How many exercises count as "the whole level" in the progress percentage.
    pub fn baseline(self) -> i32 {
        match self {
            Level::Beginner => 50,
            Level::Intermediate => 100,
            Level::Advanced => 150,
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Beginner
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Level> {
        match s.trim().to_lowercase().as_str() {
            "beginner" | "principiante" => Ok(Level::Beginner),
            "intermediate" | "intermedio" => Ok(Level::Intermediate),
            "advanced" | "avanzado" => Ok(Level::Advanced),
            _ => Err(ErrorKind::InvalidLevel(s.trim().into()).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grant {
    pub name: String,
    pub earned_at: DateTime<Utc>,
}

/// The durable progress record of one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Learner {
    pub id: UserId,
    pub display_name: String,
    pub level: Level,
    pub exercise_count: i32,
    pub referral_count: i32,
    pub challenge_score: i32,
    pub streak_days: i32,
    pub last_practice: Option<NaiveDate>,
    pub joined: DateTime<Utc>,
    /// Ids of exercises answered correctly at the current level.
    pub completed: BTreeSet<String>,
    /// In the order they were earned.
    pub achievements: Vec<Grant>,
}

impl Learner {
    pub fn new(id: UserId, display_name: &str, joined: DateTime<Utc>) -> Learner {
        Learner {
            id,
            display_name: display_name.into(),
            level: Level::default(),
            exercise_count: 0,
            referral_count: 0,
            challenge_score: 0,
            streak_days: 0,
            last_practice: None,
            joined,
            completed: BTreeSet::new(),
            achievements: vec![],
        }
    }

    pub fn has_achievement(&self, name: &str) -> bool {
        self.achievements.iter().any(|g| g.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub level: Level,
    pub exercise_count: i32,
    pub streak_days: i32,
    pub referral_count: i32,
    pub challenge_score: i32,
    pub achievement_count: usize,
    pub completion_percent: i32,
}

impl<'a> From<&'a Learner> for Progress {
    fn from(learner: &Learner) -> Progress {
        Progress {
            level: learner.level,
            exercise_count: learner.exercise_count,
            streak_days: learner.streak_days,
            referral_count: learner.referral_count,
            challenge_score: learner.challenge_score,
            achievement_count: learner.achievements.len(),
            completion_percent: completion_percent(learner.exercise_count, learner.level),
        }
    }
}

/// `min(100, round(100 * count / baseline))`, rounding halves up.
pub fn completion_percent(exercise_count: i32, level: Level) -> i32 {
    let count = i64::from(exercise_count.max(0));
    let baseline = i64::from(level.baseline());
    let percent = (200 * count + baseline) / (2 * baseline);
    percent.min(100) as i32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub user_id: UserId,
    pub message: String,
    pub created: DateTime<Utc>,
}
