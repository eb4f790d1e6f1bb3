use crate::catalog::{Catalog, Exercise};
use crate::errors::*;
use crate::models::{Learner, Level};
use rand::Rng;
use rand::seq::SliceRandom;

#[derive(Debug)]
pub struct Selection<'c> {
    pub exercise: &'c Exercise,
    /// Every exercise of the level had been completed, so the completed set was cleared first.
    pub pool_reset: bool,
}

/// Picks an exercise of the learner's level that they haven't completed yet.
///
/// When nothing is left the learner's completed set is cleared and the whole
/// level is drawn from again.
pub fn choose<'c, R: Rng>(rng: &mut R, catalog: &'c Catalog, learner: &mut Learner) -> Result<Selection<'c>> {
    let all = catalog.exercises(learner.level);
    if all.is_empty() {
        error!("Can't serve an exercise: level {} has no exercises in the catalog!", learner.level);
        bail!(ErrorKind::EmptyLevel(learner.level.to_string()));
    }

    let mut available: Vec<&Exercise> = all.iter()
        .filter(|e| !learner.completed.contains(&e.id))
        .collect();

    let pool_reset = available.is_empty();
    if pool_reset {
        info!("Learner {} has completed every {} exercise; starting over.", learner.id, learner.level);
        learner.completed.clear();
        available = all.iter().collect();
    }

    let exercise = *available.choose(rng)
        .ok_or_else(|| Error::from(ErrorKind::EmptyLevel(learner.level.to_string())))?;

    debug!("Chose exercise {} for learner {} ({} available).", exercise.id, learner.id, available.len());
    Ok(Selection { exercise, pool_reset })
}

/// Challenges come from the advanced tier and ignore the completed set.
pub fn choose_challenge<'c, R: Rng>(rng: &mut R, catalog: &'c Catalog) -> Result<&'c Exercise> {
    catalog.exercises(Level::Advanced)
        .choose(rng)
        .ok_or_else(|| ErrorKind::EmptyLevel(Level::Advanced.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeSet;

    #[test]
    fn serves_every_exercise_before_repeating() {
        let catalog = sample();
        let mut rng = StdRng::seed_from_u64(7);
        let mut learner = Learner::new(1, "ana", Utc::now());

        let mut seen = BTreeSet::new();
        for _ in 0..3 {
            let selection = choose(&mut rng, &catalog, &mut learner).unwrap();
            assert!(!selection.pool_reset);
            assert!(seen.insert(selection.exercise.id.clone()));
            learner.completed.insert(selection.exercise.id.clone());
        }

        let selection = choose(&mut rng, &catalog, &mut learner).unwrap();
        assert!(selection.pool_reset);
        assert!(learner.completed.is_empty());
    }

    #[test]
    fn empty_level_is_a_configuration_error() {
        let catalog = Catalog::from_json(r#"{"beginner": {"a": [{"question": "?", "options": ["x"], "answer": 0}]}}"#).unwrap();
        let mut learner = Learner::new(1, "ana", Utc::now());
        learner.level = Level::Intermediate;
        match choose(&mut rand::thread_rng(), &catalog, &mut learner) {
            Err(Error(ErrorKind::EmptyLevel(level), _)) => assert_eq!(level, "intermediate"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(choose_challenge(&mut rand::thread_rng(), &catalog).is_err());
    }

    #[test]
    fn challenges_are_advanced() {
        let catalog = sample();
        let exercise = choose_challenge(&mut rand::thread_rng(), &catalog).unwrap();
        assert!(exercise.id.starts_with("subjunctive_"));
    }
}
