//! The daily "come practice" sweep over every known learner.

use crate::errors::*;
use crate::models::UserId;
use crate::store::ProgressStore;

pub const DEFAULT_TEXT: &str = "📚 ¡Hora de practicar español! Send /exercise to keep your streak going.";

/// Delivers text to a user over whatever transport the bot runs on.
pub trait Messenger {
    fn deliver(&self, user_id: UserId, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub delivered: usize,
    pub skipped_blocked: usize,
    pub failed: usize,
}

/// Sends `text` to every learner that isn't blocked. A failure for one user is
/// logged and the sweep moves on; only failing to list the users is an error.
pub fn sweep<S, M>(store: &S, messenger: &M, text: &str) -> Result<SweepReport>
    where S: ProgressStore,
          M: Messenger + ?Sized
{
    let user_ids = store.user_ids()?;
    info!("Sending reminders to {} learners.", user_ids.len());

    let mut report = SweepReport::default();
    for user_id in user_ids {
        match store.is_blocked(user_id) {
            Ok(true) => {
                report.skipped_blocked += 1;
                continue;
            }
            Ok(false) => (),
            Err(e) => {
                warn!("Couldn't check whether {} is blocked, skipping: {}", user_id, e);
                report.failed += 1;
                continue;
            }
        }
        match messenger.deliver(user_id, text) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Reminder to {} failed: {}", user_id, e);
                report.failed += 1;
            }
        }
    }

    info!("Reminder sweep done: {:?}", report);
    Ok(report)
}
