use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use registrar_core::domain::request::RequestId;
use registrar_core::store::StoreError;

use crate::DbPool;

pub mod allotment;
pub mod principal;
pub mod request;

pub const DEFAULT_LEAVE_ALLOWANCE: u32 = 15;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request {request_id} no longer at version {expected_version}")]
    Conflict { request_id: RequestId, expected_version: u32 },
    #[error("missing record: {0}")]
    Missing(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::Database(database))
                if database.is_unique_violation() =>
            {
                StoreError::Duplicate(database.message().to_string())
            }
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::Conflict { request_id, expected_version } => {
                StoreError::Conflict { request_id, expected_version }
            }
            RepositoryError::Missing(message) => StoreError::Backend(message),
        }
    }
}

/// SQLite implementation of every workflow persistence port.
///
/// Writes that touch more than one table run inside a single transaction.
#[derive(Clone)]
pub struct SqlWorkflowStore {
    pool: DbPool,
    default_allowance: u32,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_default_allowance(pool, DEFAULT_LEAVE_ALLOWANCE)
    }

    pub fn with_default_allowance(pool: DbPool, default_allowance: u32) -> Self {
        Self { pool, default_allowance }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

fn format_date(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}
