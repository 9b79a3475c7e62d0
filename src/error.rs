// src/error.rs
use thiserror::Error;
use warp::reject::Reject;

/// Failures surfaced by a stock or user store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stock entry {0} not found")]
    NotFound(i64),

    #[error("username already taken: {0}")]
    DuplicateUser(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("malformed row: {0}")]
    MalformedRow(String),
}

/// Why the market data provider could not answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Unavailable {
    #[error("no data for {0}")]
    NoData(String),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("could not decode provider response: {0}")]
    Decode(String),

    #[error("provider terms of use have not been accepted")]
    ConsentRequired,
}

impl From<reqwest::Error> for Unavailable {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Unavailable::Decode(e.to_string())
        } else {
            Unavailable::Transport(e.to_string())
        }
    }
}

/// Errors raised by request handlers that terminate the request.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AppError::NotFound,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl Reject for AppError {}
