//! PostgreSQL-backed progress store.

use crate::errors::*;
use crate::models::{Grant, Learner, Level, UserId};
use crate::schema::{learners, completed_exercises, achievement_grants, blocked_users, feedback};
use crate::store::{self, ProgressStore};
use chrono::{DateTime, NaiveDate, offset::Utc};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl};
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::BTreeSet;

pub use diesel::pg::PgConnection;

pub type ConnManager = ConnectionManager<PgConnection>;
pub type Connection = PooledConnection<ConnManager>;

embed_migrations!("migrations");

#[derive(Queryable, Debug)]
struct LearnerRow {
    id: i64,
    display_name: String,
    level: String,
    exercise_count: i32,
    referral_count: i32,
    challenge_score: i32,
    streak_days: i32,
    last_practice: Option<NaiveDate>,
    joined: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name="learners"]
struct NewLearner<'a> {
    id: i64,
    display_name: &'a str,
    level: &'a str,
    exercise_count: i32,
    referral_count: i32,
    challenge_score: i32,
    streak_days: i32,
    last_practice: Option<NaiveDate>,
    joined: DateTime<Utc>,
}

#[derive(AsChangeset)]
#[table_name="learners"]
#[changeset_options(treat_none_as_null = "true")]
struct LearnerChanges<'a> {
    level: &'a str,
    exercise_count: i32,
    referral_count: i32,
    challenge_score: i32,
    streak_days: i32,
    last_practice: Option<NaiveDate>,
}

#[derive(Insertable)]
#[table_name="completed_exercises"]
struct NewCompleted<'a> {
    user_id: i64,
    exercise_id: &'a str,
}

#[derive(Queryable, Insertable, Debug)]
#[table_name="achievement_grants"]
struct GrantRow {
    user_id: i64,
    achievement: String,
    earned_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name="blocked_users"]
struct NewBlock {
    user_id: i64,
    blocked_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name="feedback"]
struct NewFeedback<'a> {
    user_id: i64,
    message: &'a str,
}

impl<'a> From<&'a Learner> for NewLearner<'a> {
    fn from(l: &'a Learner) -> Self {
        NewLearner {
            id: l.id,
            display_name: &l.display_name,
            level: l.level.as_str(),
            exercise_count: l.exercise_count,
            referral_count: l.referral_count,
            challenge_score: l.challenge_score,
            streak_days: l.streak_days,
            last_practice: l.last_practice,
            joined: l.joined,
        }
    }
}

impl<'a> From<&'a Learner> for LearnerChanges<'a> {
    fn from(l: &'a Learner) -> Self {
        LearnerChanges {
            level: l.level.as_str(),
            exercise_count: l.exercise_count,
            referral_count: l.referral_count,
            challenge_score: l.challenge_score,
            streak_days: l.streak_days,
            last_practice: l.last_practice,
        }
    }
}

impl LearnerRow {
    fn into_learner(self, completed: Vec<String>, grants: Vec<GrantRow>) -> Result<Learner> {
        let level: Level = self.level.parse()
            .chain_err(|| ErrorKind::DatabaseOdd(format!("learner {} has level {:?}", self.id, self.level)))?;
        Ok(Learner {
            id: self.id,
            display_name: self.display_name,
            level,
            exercise_count: self.exercise_count,
            referral_count: self.referral_count,
            challenge_score: self.challenge_score,
            streak_days: self.streak_days,
            last_practice: self.last_practice,
            joined: self.joined,
            completed: completed.into_iter().collect(),
            achievements: grants.into_iter()
                .map(|g| Grant { name: g.achievement, earned_at: g.earned_at })
                .collect(),
        })
    }
}

pub fn connect(database_url: &str, pool_size: u32) -> Result<Pool<ConnManager>> {
    let manager = ConnManager::new(database_url);
    Pool::builder()
        .max_size(pool_size)
        .build(manager)
        .chain_err(|| "Error connecting to database!")
}

pub fn check(conn: &PgConnection) -> Result<()> {
    embedded_migrations::run(conn).chain_err(|| "Couldn't run the migrations.")?;
    info!("Migrations checked.");
    Ok(())
}

fn is_serialization_failure(err: &Error) -> bool {
    match err.kind() {
        ErrorKind::Diesel(DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _)) => true,
        _ => false,
    }
}

/// Runs `attempt`, and once more if it hit a serialization failure.
/// A second serialization failure is a `ConcurrencyConflict`.
fn retry_once<T, F>(mut attempt: F) -> Result<T>
    where F: FnMut() -> Result<T>
{
    match attempt() {
        Err(ref e) if is_serialization_failure(e) => {
            warn!("Serialization failure, retrying the transaction once: {}", e);
        }
        other => return other,
    }
    match attempt() {
        Err(ref e) if is_serialization_failure(e) => bail!(ErrorKind::ConcurrencyConflict),
        other => other,
    }
}

fn load_learner(conn: &PgConnection, user_id: UserId, for_update: bool) -> Result<Option<Learner>> {
    let query = learners::table.find(user_id);
    let row: Option<LearnerRow> = if for_update {
        query.for_update().get_result(conn).optional()?
    } else {
        query.get_result(conn).optional()?
    };
    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let completed: Vec<String> = completed_exercises::table
        .filter(completed_exercises::user_id.eq(user_id))
        .select(completed_exercises::exercise_id)
        .load(conn)?;

    let grants: Vec<GrantRow> = achievement_grants::table
        .filter(achievement_grants::user_id.eq(user_id))
        .order((achievement_grants::earned_at.asc(), achievement_grants::achievement.asc()))
        .load(conn)?;

    Ok(Some(row.into_learner(completed, grants)?))
}

#[derive(Debug, PartialEq)]
struct SetChanges<'a> {
    removed: Vec<&'a str>,
    added: Vec<&'a str>,
    /// Grants are append-only, so there is no removed counterpart.
    earned: Vec<&'a Grant>,
}

fn set_changes<'a>(before: &'a Learner, after: &'a Learner) -> SetChanges<'a> {
    SetChanges {
        removed: before.completed.difference(&after.completed).map(String::as_str).collect(),
        added: after.completed.difference(&before.completed).map(String::as_str).collect(),
        earned: after.achievements.iter()
            .filter(|g| !before.has_achievement(&g.name))
            .collect(),
    }
}

/// Writes the completed-set difference and the newly earned grants.
fn write_sets(conn: &PgConnection, before: &Learner, after: &Learner) -> Result<()> {
    let changes = set_changes(before, after);

    if !changes.removed.is_empty() {
        diesel::delete(completed_exercises::table
                .filter(completed_exercises::user_id.eq(after.id))
                .filter(completed_exercises::exercise_id.eq_any(changes.removed)))
            .execute(conn)?;
    }

    let added: Vec<NewCompleted> = changes.added.into_iter()
        .map(|id| NewCompleted { user_id: after.id, exercise_id: id })
        .collect();
    if !added.is_empty() {
        diesel::insert_into(completed_exercises::table)
            .values(&added)
            .on_conflict_do_nothing()
            .execute(conn)?;
    }

    let earned: Vec<GrantRow> = changes.earned.into_iter()
        .map(|g| GrantRow { user_id: after.id, achievement: g.name.clone(), earned_at: g.earned_at })
        .collect();
    if !earned.is_empty() {
        diesel::insert_into(achievement_grants::table)
            .values(&earned)
            .on_conflict_do_nothing()
            .execute(conn)?;
    }

    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<ConnManager>,
}

impl PgStore {

    pub fn new(pool: Pool<ConnManager>) -> PgStore {
        PgStore { pool }
    }

    /// Connects and brings the schema up to date.
    pub fn connect(database_url: &str, pool_size: u32) -> Result<PgStore> {
        let pool = connect(database_url, pool_size)?;
        check(&*pool.get()?)?;
        Ok(PgStore { pool })
    }

    pub fn conn(&self) -> Result<Connection> {
        self.pool.get().chain_err(|| "DB timeout")
    }

    /// Runs `f` in a serializable transaction, retrying once on a serialization failure.
    fn in_transaction<T, F>(&self, mut f: F) -> Result<T>
        where F: FnMut(&PgConnection) -> Result<T>
    {
        let pooled = self.conn()?;
        let conn: &PgConnection = &pooled;
        retry_once(|| conn.build_transaction().serializable().run(|| f(conn)))
    }
}

impl ProgressStore for PgStore {

    fn register(&self, learner: &Learner) -> Result<bool> {
        self.in_transaction(|conn| {
            let inserted = diesel::insert_into(learners::table)
                .values(&NewLearner::from(learner))
                .on_conflict_do_nothing()
                .execute(conn)?;
            if inserted == 0 {
                return Ok(false);
            }
            let blank = Learner {
                completed: BTreeSet::new(),
                achievements: vec![],
                ..learner.clone()
            };
            write_sets(conn, &blank, learner)?;
            info!("Registered learner {}.", learner.id);
            Ok(true)
        })
    }

    fn load(&self, user_id: UserId) -> Result<Option<Learner>> {
        let conn = self.conn()?;
        load_learner(&conn, user_id, false)
    }

    fn modify<T, F>(&self, user_id: UserId, mut f: F) -> Result<T>
        where F: FnMut(&mut Learner) -> Result<T>
    {
        self.in_transaction(|conn| {
            let before = match load_learner(conn, user_id, true)? {
                Some(learner) => learner,
                None => bail!(ErrorKind::NoSuchUser(user_id)),
            };
            let mut after = before.clone();
            let out = f(&mut after)?;

            if after.id != before.id {
                bail!(ErrorKind::DatabaseOdd("a learner's id can't change".into()));
            }
            diesel::update(learners::table.find(user_id))
                .set(&LearnerChanges::from(&after))
                .execute(conn)?;
            write_sets(conn, &before, &after)?;
            Ok(out)
        })
    }

    fn user_ids(&self) -> Result<Vec<UserId>> {
        let conn = self.conn()?;
        let ids = learners::table
            .select(learners::id)
            .order(learners::id.asc())
            .load::<i64>(&*conn)?;
        Ok(ids)
    }

    fn is_blocked(&self, user_id: UserId) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = blocked_users::table
            .find(user_id)
            .select(blocked_users::user_id)
            .get_result(&*conn)
            .optional()?;
        Ok(found.is_some())
    }

    fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<()> {
        let conn = self.conn()?;
        if blocked {
            diesel::insert_into(blocked_users::table)
                .values(&NewBlock { user_id, blocked_at: Utc::now() })
                .on_conflict_do_nothing()
                .execute(&*conn)?;
            info!("Blocked user {}.", user_id);
        } else {
            diesel::delete(blocked_users::table.find(user_id))
                .execute(&*conn)?;
            info!("Unblocked user {}.", user_id);
        }
        Ok(())
    }

    fn save_feedback(&self, user_id: UserId, message: &str) -> Result<()> {
        store::check_feedback(message)?;
        let conn = self.conn()?;
        diesel::insert_into(feedback::table)
            .values(&NewFeedback { user_id, message })
            .execute(&*conn)?;
        Ok(())
    }
}
