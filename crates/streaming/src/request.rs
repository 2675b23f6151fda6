use std::fmt;

use thiserror::Error;

use crate::protocol::JobStatus;

/// Identifies one dispatched fetch.
///
/// Small and copyable so completions can be routed back without cloning URLs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchId(pub u64);

impl fmt::Display for FetchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The server knows the tile but has not generated it yet.
    #[error("content not yet available")]
    NotYetAvailable(Option<JobStatus>),
    #[error("http status {status}")]
    Http { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("undecodable content: {0}")]
    Decode(String),
}

pub type FetchResult = Result<Vec<u8>, FetchError>;

/// Asynchronous byte fetcher.
///
/// `begin` must return without blocking; results are collected on the
/// caller's thread through `poll`, each id exactly once.
pub trait Fetcher {
    fn begin(&mut self, id: FetchId, url: &str);
    fn poll(&mut self) -> Vec<(FetchId, FetchResult)>;
}
