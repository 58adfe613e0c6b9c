//! Record of known forks and published reproductions.
//!
//! The engine consults the ledger to skip the fork lookup for repositories
//! it has already forked, and records each published review pull request
//! afterwards. Reuse of an open review pull request is always decided on
//! GitHub, by its head branch.

use diesel::OptionalExtension;
use diesel::QueryableByName;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::SqliteConnection;

use super::PersistenceError;
use super::migrator::connect;

const FORKS_TABLE: &str = "forks";
const REPRODUCTIONS_TABLE: &str = "reproductions";

/// Fork known to belong to a source repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkRecord {
    /// Source repository key, `owner/name`.
    pub source: String,
    /// Fork `owner/name`.
    pub fork: String,
    /// Browser URL of the fork.
    pub fork_url: String,
}

/// Review pull request published for a source reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReproductionRecord {
    /// `owner/name#n` or `owner/name@sha`.
    pub source_ref: String,
    /// Fork `owner/name`.
    pub fork: String,
    /// Review branch used as the pull request head.
    pub head_branch: String,
    /// Browser URL of the review pull request.
    pub pr_url: String,
    /// Pull request number on the fork.
    pub pr_number: u64,
}

/// Persistence collaborator consulted by the reproduction engine.
///
/// Implementations are synchronous; the engine calls them from a blocking
/// task.
pub trait ReproductionLedger: Send + Sync {
    /// Fork recorded for the source repository `source_key`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the ledger cannot be read.
    fn fork_for(&self, source_key: &str) -> Result<Option<ForkRecord>, PersistenceError>;

    /// Records or replaces the fork for `record.source`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn record_fork(&self, record: &ForkRecord) -> Result<(), PersistenceError>;

    /// Records or replaces the reproduction for `record.source_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    fn record_reproduction(&self, record: &ReproductionRecord) -> Result<(), PersistenceError>;
}

/// SQLite-backed ledger. Each call opens its own connection.
#[derive(Debug, Clone)]
pub struct SqliteReproductionLedger {
    database_url: String,
}

impl SqliteReproductionLedger {
    /// Creates a ledger targeting `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::BlankDatabaseUrl`] when the URL is blank.
    pub fn new(database_url: impl Into<String>) -> Result<Self, PersistenceError> {
        let url = database_url.into();
        if url.trim().is_empty() {
            return Err(PersistenceError::BlankDatabaseUrl);
        }
        Ok(Self { database_url: url })
    }

    fn map_error<F>(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
        create_error: F,
    ) -> PersistenceError
    where
        F: Fn(String) -> PersistenceError,
    {
        match tables_exist(connection) {
            Ok(false) => PersistenceError::SchemaNotInitialised,
            Ok(true) => create_error(error.to_string()),
            Err(check_error) => create_error(format!(
                "schema presence check failed: {check_error}; original error: {error}"
            )),
        }
    }

    fn query_error(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
    ) -> PersistenceError {
        Self::map_error(connection, error, |message| PersistenceError::QueryFailed {
            message,
        })
    }

    fn write_error(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
    ) -> PersistenceError {
        Self::map_error(connection, error, |message| PersistenceError::WriteFailed {
            message,
        })
    }
}

impl ReproductionLedger for SqliteReproductionLedger {
    fn fork_for(&self, source_key: &str) -> Result<Option<ForkRecord>, PersistenceError> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = Text)]
            fork_full_name: String,
            #[diesel(sql_type = Text)]
            fork_url: String,
        }

        let mut connection = connect(&self.database_url)?;
        let row: Option<Row> = sql_query(
            "SELECT fork_full_name, fork_url FROM forks WHERE source_key = ? LIMIT 1;",
        )
        .bind::<Text, _>(source_key)
        .get_result(&mut connection)
        .optional()
        .map_err(|error| Self::query_error(&mut connection, &error))?;

        Ok(row.map(|found| ForkRecord {
            source: source_key.to_owned(),
            fork: found.fork_full_name,
            fork_url: found.fork_url,
        }))
    }

    fn record_fork(&self, record: &ForkRecord) -> Result<(), PersistenceError> {
        let mut connection = connect(&self.database_url)?;
        sql_query(
            "INSERT INTO forks (source_key, fork_full_name, fork_url) VALUES (?, ?, ?) \
             ON CONFLICT(source_key) DO UPDATE SET \
               fork_full_name = excluded.fork_full_name, \
               fork_url = excluded.fork_url, \
               updated_at = CURRENT_TIMESTAMP;",
        )
        .bind::<Text, _>(&record.source)
        .bind::<Text, _>(&record.fork)
        .bind::<Text, _>(&record.fork_url)
        .execute(&mut connection)
        .map(drop)
        .map_err(|error| Self::write_error(&mut connection, &error))
    }

    fn record_reproduction(&self, record: &ReproductionRecord) -> Result<(), PersistenceError> {
        let mut connection = connect(&self.database_url)?;
        sql_query(
            "INSERT INTO reproductions \
             (source_ref, fork_full_name, head_branch, pr_url, pr_number) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(source_ref) DO UPDATE SET \
               fork_full_name = excluded.fork_full_name, \
               head_branch = excluded.head_branch, \
               pr_url = excluded.pr_url, \
               pr_number = excluded.pr_number, \
               updated_at = CURRENT_TIMESTAMP;",
        )
        .bind::<Text, _>(&record.source_ref)
        .bind::<Text, _>(&record.fork)
        .bind::<Text, _>(&record.head_branch)
        .bind::<Text, _>(&record.pr_url)
        .bind::<BigInt, _>(i64::try_from(record.pr_number).unwrap_or(i64::MAX))
        .execute(&mut connection)
        .map(drop)
        .map_err(|error| Self::write_error(&mut connection, &error))
    }
}

#[cfg(test)]
impl SqliteReproductionLedger {
    /// Reproduction recorded for `source_ref`.
    pub(crate) fn recorded_reproduction(
        &self,
        source_ref: &str,
    ) -> Result<Option<ReproductionRecord>, PersistenceError> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = Text)]
            fork_full_name: String,
            #[diesel(sql_type = Text)]
            head_branch: String,
            #[diesel(sql_type = Text)]
            pr_url: String,
            #[diesel(sql_type = BigInt)]
            pr_number: i64,
        }

        let mut connection = connect(&self.database_url)?;
        let row: Option<Row> = sql_query(
            "SELECT fork_full_name, head_branch, pr_url, pr_number \
             FROM reproductions WHERE source_ref = ? LIMIT 1;",
        )
        .bind::<Text, _>(source_ref)
        .get_result(&mut connection)
        .optional()
        .map_err(|error| Self::query_error(&mut connection, &error))?;

        Ok(row.map(|found| ReproductionRecord {
            source_ref: source_ref.to_owned(),
            fork: found.fork_full_name,
            head_branch: found.head_branch,
            pr_url: found.pr_url,
            pr_number: u64::try_from(found.pr_number).unwrap_or_default(),
        }))
    }
}

fn tables_exist(connection: &mut SqliteConnection) -> Result<bool, diesel::result::Error> {
    #[derive(Debug, QueryableByName)]
    struct Row {
        #[diesel(sql_type = BigInt)]
        tables: i64,
    }

    let row: Row = sql_query(
        "SELECT COUNT(*) AS tables FROM sqlite_master WHERE type = 'table' AND name IN (?, ?);",
    )
    .bind::<Text, _>(FORKS_TABLE)
    .bind::<Text, _>(REPRODUCTIONS_TABLE)
    .get_result(connection)?;

    Ok(row.tables == 2)
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
