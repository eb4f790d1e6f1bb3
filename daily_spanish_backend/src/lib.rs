//! The practice engine behind the Daily Spanish bot.
//!
//! Everything that owns state lives here: the exercise catalog, the progress
//! store, exercise selection, grading, streaks, achievements and referrals.
//! Chat transports talk to the engine through [`practice::Practice`].

#![recursion_limit = "512"]

#[cfg(feature = "postgres")]
#[macro_use]
pub extern crate diesel;
#[cfg(feature = "postgres")]
#[macro_use]
extern crate diesel_migrations;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;

pub extern crate chrono;

pub mod errors {

    error_chain! {
        foreign_links {
            Io(::std::io::Error);
            Json(::serde_json::Error);
            ParseInt(::std::num::ParseIntError);
            Diesel(::diesel::result::Error) #[cfg(feature = "postgres")];
            Pool(::diesel::r2d2::PoolError) #[cfg(feature = "postgres")];
            Migration(::diesel::migration::RunMigrationsError) #[cfg(feature = "postgres")];
        }
        errors {
            EmptyLevel(level: String) {
                description("No exercises for level")
                display("The catalog has no exercises for level {}.", level)
            }
            BadCatalog(reason: String) {
                description("Malformed catalog")
                display("The exercise catalog is malformed: {}", reason)
            }
            NoSuchUser(user_id: i64) {
                description("No such user exists")
                display("No learner with id {} exists.", user_id)
            }
            AnswerTooLong {
                description("Answer too long")
                display("An answer can be 1000 characters at maximum.")
            }
            FeedbackTooLong {
                description("Feedback too long")
                display("Feedback can be 1000 characters at maximum.")
            }
            InvalidLevel(name: String) {
                description("Invalid level")
                display("{:?} isn't a level. Valid levels: beginner, intermediate, advanced.", name)
            }
            ConcurrencyConflict {
                description("Transaction conflict")
                display("The progress row was modified concurrently; try again.")
            }
            DeliveryFailed(user_id: i64, status: u16) {
                description("Message delivery failed")
                display("Couldn't deliver a message to user {} (status {}).", user_id, status)
            }
            DatabaseOdd(reason: String) {
                description("There's something wrong with the contents of the DB vs. how it should be!")
                display("There's something wrong with the contents of the DB vs. how it should be! {}", reason)
            }
        }
    }

    impl ErrorKind {
        /// Errors caused by what the user typed, as opposed to what went wrong on our side.
        pub fn is_invalid_input(&self) -> bool {
            match *self {
                ErrorKind::AnswerTooLong
                | ErrorKind::FeedbackTooLong
                | ErrorKind::InvalidLevel(_) => true,
                _ => false,
            }
        }
    }
}

pub use crate::errors::*;

pub mod models;
pub mod catalog;
pub mod store;
#[cfg(feature = "postgres")]
pub mod schema;
#[cfg(feature = "postgres")]
pub mod db;
pub mod session;
pub mod selector;
pub mod grader;
pub mod streak;
pub mod achievement;
pub mod user;
pub mod practice;
pub mod reminder;

pub use crate::models::*;
pub use crate::catalog::Catalog;
pub use crate::store::{ProgressStore, MemoryStore};
pub use crate::practice::Practice;
pub use crate::streak::{Clock, SystemClock};

#[cfg(feature = "postgres")]
pub use crate::db::{PgStore, ConnManager, Connection, PgConnection};
