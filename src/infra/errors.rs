// src/infra/errors.rs — Error types for funsearch

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    // Sampling backend errors (retriable)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    // Startup
    #[error("The template program must evaluate to a score, got none")]
    SeedScore,

    #[error("Template program could not be parsed: {0}")]
    Template(String),

    // Run control
    #[error("Search interrupted")]
    Interrupted,

    #[error("Evaluation pool is shut down")]
    PoolClosed,

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SearchError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SearchError::Provider {
                retriable: true,
                ..
            } | SearchError::RateLimited { .. }
        )
    }

    /// True for errors that mean "stop producing", not "something broke".
    pub fn is_interruption(&self) -> bool {
        matches!(self, SearchError::Interrupted | SearchError::PoolClosed)
    }
}
