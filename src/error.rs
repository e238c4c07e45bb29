use thiserror::Error;

use crate::value::{EntryId, Kind};

#[derive(Error, Debug)]
pub enum HoldallError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not implemented: {0}")]
    Unsupported(String),
    #[error("Incomparable value of kind {0}")]
    Incomparable(Kind),
    #[error("Reference cycle detected at entry {0}")]
    ReferenceCycle(EntryId),
    #[error("Dangling reference to entry {0}")]
    DanglingReference(EntryId),
    #[error("Could not initialize storage schema for table {table}: {source}")]
    Schema {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Persistence error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("Data corruption: {message}")]
    Corrupt { message: String },
}

pub type Result<T> = std::result::Result<T, HoldallError>;

impl From<config::ConfigError> for HoldallError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
