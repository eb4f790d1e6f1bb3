use crate::achievement::{self, Trigger};
use crate::catalog::Catalog;
use crate::errors::*;
use crate::models::{Learner, Level, UserId};
use crate::store::ProgressStore;
use chrono::{DateTime, offset::Utc};
use error_chain::ChainedError;

/// Deep-link payloads carry the referrer as `ref_<id>`.
pub const REFERRAL_PREFIX: &str = "ref_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub is_new: bool,
    /// A referrer was credited for this registration.
    pub referred: bool,
}

/// Reads a referrer id from `ref_<id>` or a bare id. Malformed and
/// self-referential ids are ignored.
pub fn parse_referrer(raw: &str, user_id: UserId) -> Option<UserId> {
    let raw = raw.trim();
    let digits = if raw.starts_with(REFERRAL_PREFIX) {
        &raw[REFERRAL_PREFIX.len()..]
    } else {
        raw
    };
    match digits.parse::<UserId>() {
        Ok(id) if id > 0 && id != user_id => Some(id),
        Ok(id) => {
            debug!("Ignoring referrer {} for user {}.", id, user_id);
            None
        }
        Err(_) => {
            debug!("Ignoring malformed referral payload {:?} of user {}.", raw, user_id);
            None
        }
    }
}

pub fn invite_link(bot_username: &str, user_id: UserId) -> String {
    format!("https://t.me/{}?start={}{}", bot_username, REFERRAL_PREFIX, user_id)
}

/// Creates the learner on first contact; re-entry changes nothing.
///
/// Referral credit is only given when the learner was actually created, so
/// repeating `/start ref_<id>` can't inflate anyone's count.
pub fn register<S: ProgressStore>(store: &S,
                                  catalog: &Catalog,
                                  user_id: UserId,
                                  display_name: &str,
                                  referrer: Option<&str>,
                                  now: DateTime<Utc>)
                                  -> Result<Registration> {
    let mut learner = Learner::new(user_id, display_name, now);
    achievement::evaluate(&mut learner, catalog, Trigger::Registered, now);

    if !store.register(&learner)? {
        debug!("User {} is already registered.", user_id);
        return Ok(Registration { is_new: false, referred: false });
    }
    info!("New learner {} ({:?}).", user_id, display_name);

    let referred = match referrer.and_then(|raw| parse_referrer(raw, user_id)) {
        Some(referrer_id) => credit_referral(store, catalog, referrer_id, now),
        None => false,
    };
    Ok(Registration { is_new: true, referred })
}

/// The new learner is already stored at this point, so a failure here is
/// logged instead of failing the whole registration.
fn credit_referral<S: ProgressStore>(store: &S, catalog: &Catalog, referrer_id: UserId, now: DateTime<Utc>) -> bool {
    let result = store.modify(referrer_id, |referrer| {
        referrer.referral_count += 1;
        Ok(achievement::evaluate(referrer, catalog, Trigger::Referral, now))
    });
    match result {
        Ok(unlocked) => {
            info!("Credited a referral to {}; unlocked {:?}.", referrer_id, unlocked);
            true
        }
        Err(Error(ErrorKind::NoSuchUser(_), _)) => {
            warn!("Referrer {} doesn't exist; no credit given.", referrer_id);
            false
        }
        Err(e) => {
            error!("Couldn't credit a referral to {}: {}", referrer_id, e.display_chain());
            false
        }
    }
}

/// Moves the learner to another level. The completed set belongs to the old
/// level, so it is cleared.
pub fn change_level(learner: &mut Learner, level: Level) {
    if learner.level != level {
        info!("Learner {} moves from {} to {}.", learner.id, learner.level, level);
    }
    learner.level = level;
    learner.completed.clear();
}
