//! Errors raised while building a client
//!
//! Capability calls never return these: every request outcome, including
//! transport failure, is reported through `ApiResponse`.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("client configuration error: {0}")]
    Config(String),

    #[error("HTTP client construction failed: {0}")]
    Http(String),
}

pub type Result<T> = std::result::Result<T, Error>;
