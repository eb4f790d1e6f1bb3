use crate::achievement::{self, Trigger};
use crate::catalog::Catalog;
use crate::errors::*;
use crate::models::Learner;
use crate::session::ActiveExercise;
use crate::streak;
use chrono::{DateTime, NaiveDate, offset::Utc};
use unicode_normalization::UnicodeNormalization;

pub const MAX_ANSWER_LEN: usize = 1000;

/// Wrong answers allowed after the first miss before the exercise is abandoned.
pub const RETRY_BUDGET: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Graded {
    Correct {
        /// The exercise count, or the challenge score for challenges.
        new_total: i32,
        challenge: bool,
        unlocked: Vec<String>,
    },
    Incorrect {
        correct_text: String,
        /// The exercise was dropped; a new one has to be requested.
        abandoned: bool,
        attempts_left: u32,
    },
    NoActiveSession,
}

pub fn check_length(raw_answer: &str) -> Result<()> {
    if raw_answer.chars().count() > MAX_ANSWER_LEN {
        bail!(ErrorKind::AnswerTooLong);
    }
    Ok(())
}

fn fold(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

/// Maps what the user typed to an option index.
///
/// Digits are a 1-based option number; anything else must equal an option,
/// ignoring case. `None` never matches.
pub fn resolve_answer(raw_answer: &str, options: &[String]) -> Option<usize> {
    let answer = raw_answer.trim();
    if !answer.is_empty() && answer.chars().all(|c| c.is_ascii_digit()) {
        return answer.parse::<usize>().ok().and_then(|n| n.checked_sub(1));
    }
    let answer = fold(answer);
    options.iter().position(|option| fold(option) == answer)
}

/// Applies a correct answer to the learner's progress and returns the outcome.
pub fn record_correct(learner: &mut Learner,
                      active: &ActiveExercise,
                      catalog: &Catalog,
                      today: NaiveDate,
                      now: DateTime<Utc>)
                      -> Graded {
    if active.challenge {
        learner.challenge_score += 1;
        return Graded::Correct {
            new_total: learner.challenge_score,
            challenge: true,
            unlocked: vec![],
        };
    }

    learner.exercise_count += 1;
    // The level may have changed while the exercise was open.
    if active.level == learner.level {
        learner.completed.insert(active.exercise_id.clone());
    }
    streak::touch(learner, today);
    let unlocked = achievement::evaluate(learner, catalog, Trigger::ExerciseCount(learner.exercise_count), now);

    Graded::Correct {
        new_total: learner.exercise_count,
        challenge: false,
        unlocked,
    }
}
