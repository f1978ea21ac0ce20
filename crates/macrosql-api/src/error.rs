//! Route errors
//!
//! Every variant is reported through the response envelope with its
//! `Display` text, so messages are kept as the underlying error words them.

use macrosql_core::DurationError;
use macrosql_sql::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Body is not valid JSON or does not match the route's payload
    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Duration(#[from] DurationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Sql(#[from] macrosql_sql::Error),
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Sql(e) if e.is_cancelled())
    }
}
