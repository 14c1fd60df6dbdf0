//! Crate-wide error type.

use std::io;

use hickory_proto::error::ProtoError;
use thiserror::Error;

/// Errors produced while building or running the resolver.
///
/// Only construction-time errors ever reach the caller of [`crate::server::run`].
/// Errors raised by an individual upstream attempt are logged and turned into
/// an unusable answer inside the race.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cache capacity must be a positive integer")]
    InvalidCapacity,

    #[error("invalid upstream address: {0}")]
    InvalidUpstream(String),

    #[error("invalid zone: {0}")]
    InvalidZone(String),

    #[error("invalid override: {0}")]
    InvalidOverride(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("dns protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("invalid record data: {0}")]
    RData(String),

    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid tls server name: {0}")]
    ServerName(String),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid http request: {0}")]
    HttpRequest(String),

    #[error("https request returned status {0}")]
    HttpStatus(u16),

    #[error("invalid json response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("could not determine ips for https dns host {0}")]
    Bootstrap(String),

    #[error("upstream {0} timed out")]
    Timeout(String),

    #[error("upstream {0} failed to answer")]
    ServerFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;
