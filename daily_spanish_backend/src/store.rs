use crate::errors::*;
use crate::models::{Feedback, Learner, UserId};
use chrono::offset::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

pub const MAX_FEEDBACK_LEN: usize = 1000;

/// Durable per-user progress.
///
/// A learner row is the unit of mutual exclusion: `modify` holds the row for
/// the whole read-modify-write, and either every change the closure made is
/// stored or none is.
pub trait ProgressStore: Send + Sync {
    /// Inserts the learner unless the id exists already. Returns whether it was inserted.
    fn register(&self, learner: &Learner) -> Result<bool>;

    fn load(&self, user_id: UserId) -> Result<Option<Learner>>;

    /// Fails with `NoSuchUser` if the row doesn't exist. `f` may run more than
    /// once if the backend retries a conflicting transaction.
    fn modify<T, F>(&self, user_id: UserId, f: F) -> Result<T>
        where F: FnMut(&mut Learner) -> Result<T>;

    fn user_ids(&self) -> Result<Vec<UserId>>;

    fn is_blocked(&self, user_id: UserId) -> Result<bool>;

    fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<()>;

    fn save_feedback(&self, user_id: UserId, message: &str) -> Result<()>;
}

pub fn check_feedback(message: &str) -> Result<()> {
    if message.chars().count() > MAX_FEEDBACK_LEN {
        bail!(ErrorKind::FeedbackTooLong);
    }
    Ok(())
}

/// Keeps everything in process memory. One mutex per learner stands in for row locks.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<UserId, Arc<Mutex<Learner>>>>,
    blocked: Mutex<HashSet<UserId>>,
    feedback: Mutex<Vec<Feedback>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn row(&self, user_id: UserId) -> Result<Option<Arc<Mutex<Learner>>>> {
        let rows = self.rows.read().map_err(|_| Error::from("Poisoned locks?"))?;
        Ok(rows.get(&user_id).cloned())
    }

    pub fn feedback(&self) -> Result<Vec<Feedback>> {
        let feedback = self.feedback.lock().map_err(|_| Error::from("Poisoned locks?"))?;
        Ok(feedback.clone())
    }
}

impl ProgressStore for MemoryStore {

    fn register(&self, learner: &Learner) -> Result<bool> {
        let mut rows = self.rows.write().map_err(|_| Error::from("Poisoned locks?"))?;
        if rows.contains_key(&learner.id) {
            return Ok(false);
        }
        rows.insert(learner.id, Arc::new(Mutex::new(learner.clone())));
        Ok(true)
    }

    fn load(&self, user_id: UserId) -> Result<Option<Learner>> {
        match self.row(user_id)? {
            Some(row) => {
                let learner = row.lock().map_err(|_| Error::from("Poisoned locks?"))?;
                Ok(Some(learner.clone()))
            }
            None => Ok(None),
        }
    }

    fn modify<T, F>(&self, user_id: UserId, mut f: F) -> Result<T>
        where F: FnMut(&mut Learner) -> Result<T>
    {
        let row = match self.row(user_id)? {
            Some(row) => row,
            None => bail!(ErrorKind::NoSuchUser(user_id)),
        };
        let mut learner = row.lock().map_err(|_| Error::from("Poisoned locks?"))?;

        let mut draft = learner.clone();
        let out = f(&mut draft)?;
        *learner = draft;
        Ok(out)
    }

    fn user_ids(&self) -> Result<Vec<UserId>> {
        let rows = self.rows.read().map_err(|_| Error::from("Poisoned locks?"))?;
        let mut ids: Vec<UserId> = rows.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn is_blocked(&self, user_id: UserId) -> Result<bool> {
        let blocked = self.blocked.lock().map_err(|_| Error::from("Poisoned locks?"))?;
        Ok(blocked.contains(&user_id))
    }

    fn set_blocked(&self, user_id: UserId, block: bool) -> Result<()> {
        let mut blocked = self.blocked.lock().map_err(|_| Error::from("Poisoned locks?"))?;
        if block {
            blocked.insert(user_id);
        } else {
            blocked.remove(&user_id);
        }
        Ok(())
    }

    fn save_feedback(&self, user_id: UserId, message: &str) -> Result<()> {
        check_feedback(message)?;
        let mut feedback = self.feedback.lock().map_err(|_| Error::from("Poisoned locks?"))?;
        feedback.push(Feedback { user_id, message: message.into(), created: Utc::now() });
        Ok(())
    }
}
