use std::collections::{BTreeMap, VecDeque};

use crate::request::{FetchError, FetchId, FetchResult, Fetcher};

/// Deterministic in-process fetcher.
///
/// Every fetch of a URL yields the scripted result for it; unscripted URLs
/// fail with a transport error. Fetches complete on the next `poll` unless
/// the fetcher is held.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    responses: BTreeMap<String, FetchResult>,
    started: Vec<String>,
    in_flight: VecDeque<(FetchId, String)>,
    held: bool,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&mut self, url: impl Into<String>, result: FetchResult) {
        self.responses.insert(url.into(), result);
    }

    /// While held, `poll` completes nothing.
    pub fn hold(&mut self, held: bool) {
        self.held = held;
    }

    /// URLs in the order they were started.
    pub fn started(&self) -> Vec<&str> {
        self.started.iter().map(String::as_str).collect()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.started.iter().filter(|u| *u == url).count()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl Fetcher for ScriptedFetcher {
    fn begin(&mut self, id: FetchId, url: &str) {
        self.started.push(url.to_string());
        self.in_flight.push_back((id, url.to_string()));
    }

    fn poll(&mut self) -> Vec<(FetchId, FetchResult)> {
        if self.held {
            return Vec::new();
        }
        self.in_flight
            .drain(..)
            .map(|(id, url)| {
                let result = self.responses.get(&url).cloned().unwrap_or_else(|| {
                    Err(FetchError::Transport(format!("no scripted response for {url}")))
                });
                (id, result)
            })
            .collect()
    }
}
