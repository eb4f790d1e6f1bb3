//! The operations a chat transport calls.
//!
//! `Practice` owns the injected store, the shared catalog, the clock and the
//! table of open exercises. Every progress mutation goes through
//! `ProgressStore::modify`, so it is applied whole or not at all.

use crate::catalog::{AchievementInfo, Catalog, Curiosity};
use crate::errors::*;
use crate::grader::{self, Graded};
use crate::models::{Learner, Level, Progress, UserId};
use crate::selector;
use crate::session::{ActiveExercise, Attempt, SessionTable};
use crate::store::ProgressStore;
use crate::streak::{self, Clock, SystemClock};
use crate::user::{self, Registration};
use chrono::offset::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// An exercise handed to the transport for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Served {
    pub exercise_id: String,
    pub category: String,
    pub level: Level,
    pub prompt: String,
    pub options: Vec<String>,
    pub streak: i32,
    /// The learner had completed the whole level, which now starts over.
    pub level_complete: bool,
    pub challenge: bool,
}

impl Served {
    fn new(active: &ActiveExercise, category: &str, prompt: &str, streak: i32, level_complete: bool) -> Served {
        Served {
            exercise_id: active.exercise_id.clone(),
            category: category.into(),
            level: active.level,
            prompt: prompt.into(),
            options: active.options.clone(),
            streak,
            level_complete,
            challenge: active.challenge,
        }
    }
}

pub struct Practice<S, C = SystemClock> {
    store: S,
    catalog: Arc<Catalog>,
    sessions: SessionTable,
    clock: C,
}

impl<S: ProgressStore> Practice<S, SystemClock> {
    pub fn with_system_clock(store: S, catalog: Arc<Catalog>, session_lifetime: Duration) -> Self {
        Practice::new(store, catalog, session_lifetime, SystemClock)
    }
}

impl<S: ProgressStore, C: Clock> Practice<S, C> {

    pub fn new(store: S, catalog: Arc<Catalog>, session_lifetime: Duration, clock: C) -> Self {
        Practice {
            store,
            catalog,
            sessions: SessionTable::new(session_lifetime),
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn register(&self, user_id: UserId, display_name: &str, referrer: Option<&str>) -> Result<Registration> {
        user::register(&self.store, &self.catalog, user_id, display_name, referrer, Utc::now())
    }

    /// Runs `f` on the learner's row, registering the learner first if the row is missing.
    fn modify_learner<T, F>(&self, user_id: UserId, mut f: F) -> Result<T>
        where F: FnMut(&mut Learner) -> Result<T>
    {
        let first = self.store.modify(user_id, &mut f);
        match first {
            Err(Error(ErrorKind::NoSuchUser(_), _)) => {
                warn!("No progress for user {}; registering them on demand.", user_id);
                self.register(user_id, &user_id.to_string(), None)?;
                self.store.modify(user_id, f)
            }
            other => other,
        }
    }

    fn learner(&self, user_id: UserId) -> Result<Learner> {
        if let Some(learner) = self.store.load(user_id)? {
            return Ok(learner);
        }
        warn!("No progress for user {}; registering them on demand.", user_id);
        self.register(user_id, &user_id.to_string(), None)?;
        self.store.load(user_id)?
            .ok_or_else(|| ErrorKind::NoSuchUser(user_id).into())
    }

    /// Serves an unseen exercise of the learner's level and opens it as the active one.
    pub fn request_exercise(&self, user_id: UserId) -> Result<Served> {
        let today = self.clock.today();
        let catalog = &self.catalog;

        let (active, served) = self.modify_learner(user_id, |learner| {
            let streak = streak::touch(learner, today);
            let selection = selector::choose(&mut rand::thread_rng(), catalog, learner)?;
            let exercise = selection.exercise;
            let active = ActiveExercise::new(exercise, learner.level, false);
            let served = Served::new(&active, &exercise.category, &exercise.prompt, streak, selection.pool_reset);
            Ok((active, served))
        })?;

        self.sessions.start(user_id, active)?;
        Ok(served)
    }

    /// Serves an advanced exercise that scores toward the challenge score.
    pub fn request_challenge(&self, user_id: UserId) -> Result<Served> {
        let learner = self.learner(user_id)?;
        let exercise = selector::choose_challenge(&mut rand::thread_rng(), &self.catalog)?;
        let active = ActiveExercise::new(exercise, Level::Advanced, true);
        let served = Served::new(&active, &exercise.category, &exercise.prompt, learner.streak_days, false);
        self.sessions.start(user_id, active)?;
        Ok(served)
    }

    pub fn submit_answer(&self, user_id: UserId, raw_answer: &str) -> Result<Graded> {
        grader::check_length(raw_answer)?;

        let active = match self.sessions.attempt(user_id, raw_answer)? {
            None => return Ok(Graded::NoActiveSession),
            Some(Attempt::Incorrect { correct_text, abandoned, attempts_left }) => {
                return Ok(Graded::Incorrect { correct_text, abandoned, attempts_left });
            }
            Some(Attempt::Correct(active)) => active,
        };

        let today = self.clock.today();
        let now = Utc::now();
        let catalog = &self.catalog;
        let result = self.modify_learner(user_id, |learner| {
            Ok(grader::record_correct(learner, &active, catalog, today, now))
        });

        if result.is_err() {
            // Nothing was recorded, so the learner may answer again.
            if let Err(e) = self.sessions.restore(user_id, active) {
                error!("Couldn't restore the exercise of user {}: {}", user_id, e);
            }
        }
        result
    }

    pub fn progress(&self, user_id: UserId) -> Result<Progress> {
        Ok(Progress::from(&self.learner(user_id)?))
    }

    /// The earned achievements in the order they were earned.
    pub fn achievements(&self, user_id: UserId) -> Result<Vec<AchievementInfo>> {
        let learner = self.learner(user_id)?;
        Ok(learner.achievements.iter()
            .filter_map(|grant| self.catalog.achievement(&grant.name))
            .cloned()
            .collect())
    }

    /// Parses `level_name` and moves the learner there. An open non-challenge
    /// exercise belongs to the old level and is dropped.
    pub fn set_level(&self, user_id: UserId, level_name: &str) -> Result<Level> {
        let level: Level = level_name.parse()?;
        self.modify_learner(user_id, |learner| {
            user::change_level(learner, level);
            Ok(())
        })?;

        if let Some(active) = self.sessions.get(user_id)? {
            if !active.challenge {
                self.sessions.discard(user_id)?;
            }
        }
        Ok(level)
    }

    pub fn user_ids(&self) -> Result<Vec<UserId>> {
        self.store.user_ids()
    }

    pub fn submit_feedback(&self, user_id: UserId, message: &str) -> Result<()> {
        self.store.save_feedback(user_id, message.trim())?;
        info!("Feedback from user {} saved.", user_id);
        Ok(())
    }

    pub fn is_blocked(&self, user_id: UserId) -> Result<bool> {
        self.store.is_blocked(user_id)
    }

    pub fn curiosity(&self) -> Option<Curiosity> {
        self.catalog.random_curiosity(&mut rand::thread_rng()).cloned()
    }

    /// Returns how many expired exercises were dropped.
    pub fn clean_expired_sessions(&self) -> Result<usize> {
        let (left, removed) = self.sessions.clean_expired()?;
        if removed > 0 {
            debug!("Dropped {} expired exercises, {} still open.", removed, left);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixed(NaiveDate);

    impl Clock for Fixed {
        fn today(&self) -> NaiveDate {
            self.0
        }
    }

    fn practice() -> Practice<MemoryStore, Fixed> {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        Practice::new(MemoryStore::new(), Arc::new(sample()), Duration::from_secs(600), Fixed(today))
    }

    #[test]
    fn unknown_users_are_registered_on_demand() {
        let practice = practice();
        let served = practice.request_exercise(5).unwrap();
        assert_eq!(served.level, Level::Beginner);
        assert_eq!(served.streak, 1);
        assert_eq!(practice.progress(5).unwrap().achievement_count, 1);
    }

    #[test]
    fn answers_of_unregistered_users_are_recorded() {
        let practice = practice();
        let exercise = practice.catalog().exercise(Level::Beginner, "animals_0").unwrap().clone();
        practice.sessions.start(9, ActiveExercise::new(&exercise, Level::Beginner, false)).unwrap();

        match practice.submit_answer(9, "perro").unwrap() {
            Graded::Correct { new_total, .. } => assert_eq!(new_total, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(practice.progress(9).unwrap().exercise_count, 1);
    }

    /// Fails every `modify` while `failing` is set.
    #[derive(Default)]
    struct Flaky {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl ProgressStore for Flaky {
        fn register(&self, learner: &Learner) -> Result<bool> {
            self.inner.register(learner)
        }
        fn load(&self, user_id: UserId) -> Result<Option<Learner>> {
            self.inner.load(user_id)
        }
        fn modify<T, F>(&self, user_id: UserId, f: F) -> Result<T>
            where F: FnMut(&mut Learner) -> Result<T>
        {
            if self.failing.load(Ordering::SeqCst) {
                bail!(ErrorKind::ConcurrencyConflict);
            }
            self.inner.modify(user_id, f)
        }
        fn user_ids(&self) -> Result<Vec<UserId>> {
            self.inner.user_ids()
        }
        fn is_blocked(&self, user_id: UserId) -> Result<bool> {
            self.inner.is_blocked(user_id)
        }
        fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<()> {
            self.inner.set_blocked(user_id, blocked)
        }
        fn save_feedback(&self, user_id: UserId, message: &str) -> Result<()> {
            self.inner.save_feedback(user_id, message)
        }
    }

    #[test]
    fn failed_write_keeps_the_exercise_open() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let practice = Practice::new(Flaky::default(), Arc::new(sample()), Duration::from_secs(600), Fixed(today));
        practice.register(1, "ana", None).unwrap();
        let served = practice.request_exercise(1).unwrap();
        let answer = (practice.catalog().exercise(Level::Beginner, &served.exercise_id).unwrap().correct_index + 1).to_string();

        practice.store().failing.store(true, Ordering::SeqCst);
        match practice.submit_answer(1, &answer) {
            Err(Error(ErrorKind::ConcurrencyConflict, _)) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(practice.progress(1).unwrap().exercise_count, 0);

        practice.store().failing.store(false, Ordering::SeqCst);
        match practice.submit_answer(1, &answer).unwrap() {
            Graded::Correct { new_total, .. } => assert_eq!(new_total, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn a_failed_referral_credit_still_registers() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let practice = Practice::new(Flaky::default(), Arc::new(sample()), Duration::from_secs(600), Fixed(today));
        practice.register(1, "ana", None).unwrap();

        practice.store().failing.store(true, Ordering::SeqCst);
        let reg = practice.register(2, "bea", Some("ref_1")).unwrap();
        assert!(reg.is_new);
        assert!(!reg.referred);
        practice.store().failing.store(false, Ordering::SeqCst);

        assert_eq!(practice.progress(1).unwrap().referral_count, 0);
        assert!(practice.store().load(2).unwrap().is_some());
    }

    #[test]
    fn set_level_drops_the_open_exercise() {
        let practice = practice();
        practice.register(1, "ana", None).unwrap();
        practice.request_exercise(1).unwrap();
        assert_eq!(practice.set_level(1, "avanzado").unwrap(), Level::Advanced);
        assert_eq!(practice.submit_answer(1, "1").unwrap(), Graded::NoActiveSession);

        match practice.set_level(1, "experto") {
            Err(Error(ErrorKind::InvalidLevel(_), _)) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(practice.progress(1).unwrap().level, Level::Advanced);
    }

    #[test]
    fn overlong_answers_leave_the_session_alone() {
        let practice = practice();
        practice.register(1, "ana", None).unwrap();
        practice.request_exercise(1).unwrap();
        assert!(practice.submit_answer(1, &"a".repeat(grader::MAX_ANSWER_LEN + 1)).is_err());
        assert!(practice.sessions.get(1).unwrap().is_some());
    }
}
