use crate::catalog::Catalog;
use crate::models::{Grant, Learner};
use chrono::{DateTime, offset::Utc};

pub const NEW_STUDENT: &str = "New Student";
pub const APPRENTICE: &str = "Apprentice";
pub const EXPERT: &str = "Expert";
pub const AMBASSADOR: &str = "Ambassador";

/// Something that just happened to a learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Registered,
    /// The exercise count just became this value.
    ExerciseCount(i32),
    /// Someone joined through this learner's invite.
    Referral,
}

pub struct Rule {
    pub trigger: Trigger,
    pub achievement: &'static str,
}

/// Milestones are matched by equality: a count that jumps past 10 never grants Apprentice.
pub const RULES: &[Rule] = &[
    Rule { trigger: Trigger::Registered, achievement: NEW_STUDENT },
    Rule { trigger: Trigger::ExerciseCount(10), achievement: APPRENTICE },
    Rule { trigger: Trigger::ExerciseCount(50), achievement: EXPERT },
    Rule { trigger: Trigger::Referral, achievement: AMBASSADOR },
];

/// Records the achievement on the learner unless it's unknown or already earned.
pub fn grant(learner: &mut Learner, catalog: &Catalog, name: &str, now: DateTime<Utc>) -> bool {
    if catalog.achievement(name).is_none() {
        warn!("Achievement {:?} isn't in the catalog; not granting it to {}.", name, learner.id);
        return false;
    }
    if learner.has_achievement(name) {
        return false;
    }
    learner.achievements.push(Grant { name: name.into(), earned_at: now });
    info!("Learner {} earned {:?}.", learner.id, name);
    true
}

/// Runs every rule keyed on `trigger` and returns the names of the newly earned achievements.
pub fn evaluate(learner: &mut Learner, catalog: &Catalog, trigger: Trigger, now: DateTime<Utc>) -> Vec<String> {
    RULES.iter()
        .filter(|rule| rule.trigger == trigger)
        .filter(|rule| grant(learner, catalog, rule.achievement, now))
        .map(|rule| rule.achievement.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample;

    #[test]
    fn grant_is_idempotent() {
        let catalog = sample();
        let now = Utc::now();
        let mut learner = Learner::new(1, "ana", now);
        assert!(grant(&mut learner, &catalog, APPRENTICE, now));
        assert!(!grant(&mut learner, &catalog, APPRENTICE, now));
        assert_eq!(learner.achievements.len(), 1);
    }

    #[test]
    fn unknown_achievement_is_a_no_op() {
        let catalog = sample();
        let now = Utc::now();
        let mut learner = Learner::new(1, "ana", now);
        assert!(!grant(&mut learner, &catalog, "Polyglot", now));
        assert!(learner.achievements.is_empty());
    }

    #[test]
    fn milestones_match_exactly() {
        let catalog = sample();
        let now = Utc::now();
        let mut learner = Learner::new(1, "ana", now);
        assert!(evaluate(&mut learner, &catalog, Trigger::ExerciseCount(9), now).is_empty());
        assert_eq!(evaluate(&mut learner, &catalog, Trigger::ExerciseCount(10), now), vec![APPRENTICE]);
        assert!(evaluate(&mut learner, &catalog, Trigger::ExerciseCount(11), now).is_empty());
        assert!(evaluate(&mut learner, &catalog, Trigger::ExerciseCount(51), now).is_empty());
        assert_eq!(evaluate(&mut learner, &catalog, Trigger::ExerciseCount(50), now), vec![EXPERT]);
    }
}
