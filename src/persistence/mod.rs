//! Optional local ledger of forks and published reproductions.
//!
//! The ledger is a `SQLite` database managed with Diesel migrations. The
//! engine works without it; when configured it short-circuits fork lookups
//! and records each review pull request.

mod error;
mod ledger;
mod migrator;

pub use error::PersistenceError;
pub use ledger::{ForkRecord, ReproductionLedger, ReproductionRecord, SqliteReproductionLedger};
pub use migrator::{INITIAL_SCHEMA_VERSION, SchemaVersion, migrate_database};
