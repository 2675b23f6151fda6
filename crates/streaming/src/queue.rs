use std::collections::BTreeMap;

use runtime::Metrics;
use tracing::trace;

use crate::request::{FetchId, FetchResult, Fetcher};

pub const DEFAULT_CONCURRENT_TASKS: usize = 2;

/// A fetch waiting in, or dispatched by, a [`LoadQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTask<T> {
    pub url: String,
    /// Routes the completion back to its owner.
    pub token: T,
}

/// A finished task; produced exactly once per dispatched task.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<T> {
    pub url: String,
    pub token: T,
    pub result: FetchResult,
}

/// Bounded-concurrency fetch dispatcher.
///
/// Waiting tasks form a stack: the most recently enqueued task is dispatched
/// first, so older requests can wait indefinitely under sustained load.
/// Dispatch happens in [`LoadQueue::pump`], which the owner runs right after
/// enqueueing and after every batch of completions.
#[derive(Debug)]
pub struct LoadQueue<T> {
    waiting: Vec<LoadTask<T>>,
    in_flight: BTreeMap<FetchId, LoadTask<T>>,
    limit: usize,
    next_id: u64,
    metrics: Metrics,
}

impl<T> Default for LoadQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENT_TASKS)
    }
}

impl<T> LoadQueue<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            waiting: Vec::new(),
            in_flight: BTreeMap::new(),
            limit: limit.max(1),
            next_id: 0,
            metrics: Metrics::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.waiting.is_empty() && self.in_flight.is_empty()
    }

    /// Counters `queue.enqueued`, `queue.dispatched`, `queue.completed`,
    /// `queue.failed` and the `queue.peak_in_flight` gauge.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn enqueue(&mut self, url: impl Into<String>, token: T) {
        let url = url.into();
        trace!(%url, waiting = self.waiting.len() + 1, "enqueue");
        self.waiting.push(LoadTask { url, token });
        self.metrics.inc_counter("queue.enqueued", 1);
    }

    /// Dispatches waiting tasks, newest first, while below the limit.
    /// Returns how many were dispatched.
    pub fn pump<F: Fetcher + ?Sized>(&mut self, fetcher: &mut F) -> usize {
        let mut dispatched = 0;
        while self.in_flight.len() < self.limit {
            let Some(task) = self.waiting.pop() else {
                break;
            };
            let id = FetchId(self.next_id);
            self.next_id += 1;
            trace!(%id, url = %task.url, in_flight = self.in_flight.len() + 1, "dispatch");
            fetcher.begin(id, &task.url);
            self.in_flight.insert(id, task);
            dispatched += 1;
        }
        if dispatched > 0 {
            self.metrics.inc_counter("queue.dispatched", dispatched as u64);
            let peak = self.metrics.gauge("queue.peak_in_flight").unwrap_or(0);
            self.metrics
                .set_gauge("queue.peak_in_flight", peak.max(self.in_flight.len() as i64));
        }
        dispatched
    }

    /// Releases the slot held by `id`. Unknown ids yield `None`.
    pub fn complete(&mut self, id: FetchId, result: FetchResult) -> Option<Completion<T>> {
        let task = self.in_flight.remove(&id)?;
        let counter = if result.is_ok() { "queue.completed" } else { "queue.failed" };
        self.metrics.inc_counter(counter, 1);
        trace!(%id, url = %task.url, ok = result.is_ok(), "complete");
        Some(Completion {
            url: task.url,
            token: task.token,
            result,
        })
    }

    /// Collects finished fetches and refills the freed slots.
    pub fn poll<F: Fetcher + ?Sized>(&mut self, fetcher: &mut F) -> Vec<Completion<T>> {
        let done: Vec<Completion<T>> = fetcher
            .poll()
            .into_iter()
            .filter_map(|(id, result)| self.complete(id, result))
            .collect();
        self.pump(fetcher);
        done
    }
}

#[cfg(test)]
mod tests {
    use super::LoadQueue;
    use crate::mock::ScriptedFetcher;
    use crate::request::FetchError;
    use pretty_assertions::assert_eq;

    #[test]
    fn dispatch_order_is_lifo() {
        let mut fetcher = ScriptedFetcher::new();
        let mut q = LoadQueue::new(1);
        for name in ["a", "b", "c"] {
            q.enqueue(name, name);
        }
        q.pump(&mut fetcher);

        let mut order = Vec::new();
        while !q.is_idle() {
            for done in q.poll(&mut fetcher) {
                order.push(done.token);
            }
        }
        assert_eq!(order, vec!["c", "b", "a"]);
        assert_eq!(fetcher.started(), vec!["c", "b", "a"]);
    }

    #[test]
    fn never_exceeds_limit() {
        let mut fetcher = ScriptedFetcher::new();
        fetcher.hold(true);
        let mut q = LoadQueue::new(2);
        for i in 0..5 {
            q.enqueue(format!("t{i}"), i);
        }
        assert_eq!(q.pump(&mut fetcher), 2);
        assert_eq!(q.in_flight(), 2);
        assert_eq!(q.waiting(), 3);
        assert_eq!(fetcher.started(), vec!["t4", "t3"]);

        fetcher.hold(false);
        let mut seen = 0;
        while !q.is_idle() {
            seen += q.poll(&mut fetcher).len();
            assert!(q.in_flight() <= 2);
        }
        assert_eq!(seen, 5);
        assert_eq!(q.metrics().gauge("queue.peak_in_flight"), Some(2));
    }

    #[test]
    fn each_task_completes_once() {
        let mut fetcher = ScriptedFetcher::new();
        fetcher.respond("bad", Err(FetchError::Http { status: 500 }));
        fetcher.respond("good", Ok(b"ok".to_vec()));
        let mut q = LoadQueue::default();
        q.enqueue("bad", 1);
        q.enqueue("good", 2);
        q.pump(&mut fetcher);

        let mut done = q.poll(&mut fetcher);
        done.sort_by_key(|c| c.token);
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].result, Err(FetchError::Http { status: 500 }));
        assert!(done[1].result.is_ok());
        assert!(q.poll(&mut fetcher).is_empty());
        assert_eq!(q.metrics().counter("queue.failed"), 1);
        assert_eq!(q.metrics().counter("queue.completed"), 1);
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        let q: LoadQueue<()> = LoadQueue::new(0);
        assert_eq!(q.limit(), 1);
    }
}
