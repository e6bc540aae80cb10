use thiserror::Error;

use crate::providers::ProviderError;

pub type Result<T> = std::result::Result<T, BookragError>;

#[derive(Error, Debug)]
pub enum BookragError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod database;
pub mod ingest;
pub mod providers;
pub mod recommend;
pub mod retrieval;
pub mod reviews;

#[cfg(test)]
pub(crate) mod test_support;
