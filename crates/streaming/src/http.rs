//! HTTP fetcher backed by a private tokio runtime.
//!
//! Requests run on the runtime's worker threads; results travel back over a
//! channel and are picked up by [`Fetcher::poll`] on the caller's thread.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::JobStatus;
use crate::request::{FetchError, FetchId, FetchResult, Fetcher};

type Delivery = (FetchId, FetchResult);

pub struct HttpFetcher {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
    tx: mpsc::UnboundedSender<Delivery>,
    rx: mpsc::UnboundedReceiver<Delivery>,
    ready: Vec<Delivery>,
}

impl HttpFetcher {
    pub fn new(worker_threads: usize) -> Result<Self, FetchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("tile-fetch")
            .enable_all()
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            runtime,
            client,
            tx,
            rx,
            ready: Vec::new(),
        })
    }

    /// Blocks until a fetch completes or `timeout` passes. Returns whether a
    /// completion is ready for the next `poll`.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if !self.ready.is_empty() {
            return true;
        }
        let rx = &mut self.rx;
        let first = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, rx.recv()).await.ok().flatten() });
        match first {
            Some(delivery) => {
                self.ready.push(delivery);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}

impl Fetcher for HttpFetcher {
    fn begin(&mut self, id: FetchId, url: &str) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        let url = url.to_string();
        self.runtime.spawn(async move {
            let result = fetch(&client, &url).await;
            debug!(%id, %url, ok = result.is_ok(), "fetch finished");
            // The receiver lives as long as the fetcher; a send error means
            // the fetcher is being dropped.
            let _ = tx.send((id, result));
        });
    }

    fn poll(&mut self) -> Vec<Delivery> {
        let mut out = std::mem::take(&mut self.ready);
        while let Ok(delivery) = self.rx.try_recv() {
            out.push(delivery);
        }
        out
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> FetchResult {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = resp
        .bytes()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    classify_response(status, &body)
}

/// Maps a response to a fetch result. A `404` means the tile is still being
/// generated; its body, when JSON, is the job status. Any other body is
/// passed on as-is.
pub fn classify_response(status: u16, body: &[u8]) -> FetchResult {
    match status {
        200..=299 => Ok(body.to_vec()),
        404 => {
            let job = JobStatus::from_slice(body).unwrap_or_else(|err| {
                debug!(%err, "not-found response without a JSON job status");
                JobStatus::unparsed(status, body)
            });
            Err(FetchError::NotYetAvailable(Some(job)))
        }
        status => Err(FetchError::Http { status }),
    }
}
