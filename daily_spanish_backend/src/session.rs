//! The one exercise each user is currently answering.
//!
//! Sessions live only in memory and expire after a while; a new exercise
//! request simply overwrites the previous one.

use crate::catalog::Exercise;
use crate::errors::*;
use crate::grader::{self, RETRY_BUDGET};
use crate::models::{Level, UserId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveExercise {
    pub exercise_id: String,
    /// The level the exercise was served from.
    pub level: Level,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub attempts: u32,
    pub challenge: bool,
}

impl ActiveExercise {
    pub fn new(exercise: &Exercise, level: Level, challenge: bool) -> Self {
        ActiveExercise {
            exercise_id: exercise.id.clone(),
            level,
            options: exercise.options.clone(),
            correct_index: exercise.correct_index,
            attempts: 0,
            challenge,
        }
    }

    pub fn correct_text(&self) -> &str {
        &self.options[self.correct_index]
    }
}

#[derive(Debug, PartialEq)]
pub enum Attempt {
    /// The session was closed; the caller records the progress.
    Correct(ActiveExercise),
    Incorrect {
        correct_text: String,
        abandoned: bool,
        attempts_left: u32,
    },
}

pub struct SessionTable {
    expires: Duration,
    sessions: Mutex<HashMap<UserId, (Instant, ActiveExercise)>>,
}

impl SessionTable {

    pub fn new(expires: Duration) -> Self {
        SessionTable {
            expires,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<UserId, (Instant, ActiveExercise)>>> {
        self.sessions.lock().map_err(|_| "Poisoned locks?".into())
    }

    /// Replaces whatever the user had open.
    pub fn start(&self, user_id: UserId, active: ActiveExercise) -> Result<()> {
        let mut sessions = self.lock()?;
        if let Some((_, old)) = sessions.insert(user_id, (Instant::now() + self.expires, active)) {
            debug!("Exercise {} of user {} was superseded.", old.exercise_id, user_id);
        }
        Ok(())
    }

    /// Puts a session back after its progress couldn't be recorded, unless a newer one exists.
    pub fn restore(&self, user_id: UserId, active: ActiveExercise) -> Result<()> {
        let mut sessions = self.lock()?;
        sessions.entry(user_id).or_insert((Instant::now() + self.expires, active));
        Ok(())
    }

    pub fn get(&self, user_id: UserId) -> Result<Option<ActiveExercise>> {
        let sessions = self.lock()?;
        Ok(match sessions.get(&user_id) {
            Some(&(expires, ref active)) if Instant::now() <= expires => Some(active.clone()),
            _ => None,
        })
    }

    pub fn discard(&self, user_id: UserId) -> Result<Option<ActiveExercise>> {
        Ok(self.lock()?.remove(&user_id).map(|(_, active)| active))
    }

    /// Checks an answer against the user's open exercise. `None` means nothing is open.
    ///
    /// The lookup and the state change happen under one lock, so two
    /// simultaneous correct answers can't both close the same session.
    pub fn attempt(&self, user_id: UserId, raw_answer: &str) -> Result<Option<Attempt>> {
        let mut sessions = self.lock()?;

        let expired = match sessions.get(&user_id) {
            Some(&(expires, _)) => Instant::now() > expires,
            None => return Ok(None),
        };
        if expired {
            sessions.remove(&user_id);
            debug!("The open exercise of user {} had expired.", user_id);
            return Ok(None);
        }

        let correct = match sessions.get(&user_id) {
            Some(&(_, ref active)) => grader::resolve_answer(raw_answer, &active.options) == Some(active.correct_index),
            None => return Ok(None),
        };

        if correct {
            return Ok(sessions.remove(&user_id).map(|(_, active)| Attempt::Correct(active)));
        }

        let (correct_text, attempts) = match sessions.get_mut(&user_id) {
            Some(&mut (_, ref mut active)) => {
                active.attempts += 1;
                (active.correct_text().to_string(), active.attempts)
            }
            None => return Ok(None),
        };

        let abandoned = attempts > RETRY_BUDGET;
        if abandoned {
            sessions.remove(&user_id);
            debug!("User {} ran out of attempts.", user_id);
        }
        Ok(Some(Attempt::Incorrect {
            correct_text,
            abandoned,
            attempts_left: (RETRY_BUDGET + 1).saturating_sub(attempts),
        }))
    }

    /// Drops expired sessions; returns how many are left and how many were removed.
    pub fn clean_expired(&self) -> Result<(usize, usize)> {
        let mut sessions = self.lock()?;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, &mut (expires, _)| expires >= now);
        Ok((sessions.len(), before - sessions.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample;

    fn table() -> SessionTable {
        let table = SessionTable::new(Duration::from_secs(60));
        let catalog = sample();
        let exercise = catalog.exercise(Level::Beginner, "animals_0").unwrap();
        table.start(7, ActiveExercise::new(exercise, Level::Beginner, false)).unwrap();
        table
    }

    #[test]
    fn correct_answer_closes_the_session_once() {
        let table = table();
        match table.attempt(7, "perro").unwrap() {
            Some(Attempt::Correct(active)) => assert_eq!(active.exercise_id, "animals_0"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(table.attempt(7, "perro").unwrap(), None);
    }

    #[test]
    fn three_misses_abandon_the_exercise() {
        let table = table();
        for left in &[2, 1] {
            assert_eq!(table.attempt(7, "3").unwrap(), Some(Attempt::Incorrect {
                correct_text: "perro".into(),
                abandoned: false,
                attempts_left: *left,
            }));
        }
        assert_eq!(table.attempt(7, "gato").unwrap(), Some(Attempt::Incorrect {
            correct_text: "perro".into(),
            abandoned: true,
            attempts_left: 0,
        }));
        assert_eq!(table.attempt(7, "2").unwrap(), None);
    }

    #[test]
    fn retry_after_a_miss_can_still_succeed() {
        let table = table();
        table.attempt(7, "1").unwrap();
        assert!(match table.attempt(7, "2").unwrap() { Some(Attempt::Correct(_)) => true, _ => false });
    }

    #[test]
    fn expired_sessions_are_gone() {
        let table = SessionTable::new(Duration::from_secs(0));
        let catalog = sample();
        let exercise = catalog.exercise(Level::Beginner, "animals_0").unwrap();
        table.start(7, ActiveExercise::new(exercise, Level::Beginner, false)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(table.get(7).unwrap(), None);
        assert_eq!(table.clean_expired().unwrap(), (0, 1));
        assert_eq!(table.attempt(7, "2").unwrap(), None);
    }

    #[test]
    fn restore_does_not_clobber_a_newer_session() {
        let table = table();
        let catalog = sample();
        let newer = ActiveExercise::new(catalog.exercise(Level::Beginner, "colors_0").unwrap(), Level::Beginner, false);
        let older = table.discard(7).unwrap().unwrap();
        table.start(7, newer.clone()).unwrap();
        table.restore(7, older).unwrap();
        assert_eq!(table.get(7).unwrap(), Some(newer));
    }
}
