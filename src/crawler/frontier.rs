//! Shared crawl frontier
//!
//! This module handles:
//! - FIFO queueing of article titles waiting to be fetched
//! - Exactly-once admission of every title (atomic check-and-insert)
//! - In-flight accounting so workers can tell "empty for now" from "done"
//! - Closing the frontier on exhaustion, quota or cancellation

use std::collections::{HashSet, VecDeque};
use tokio::sync::{Mutex, Notify};

/// A title waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// The article title
    pub title: String,

    /// Link distance from the seed that led here
    pub depth: u32,

    /// Category the entry was expanded from, if any
    pub origin: Option<String>,
}

impl FrontierEntry {
    /// Creates a seed entry at depth zero
    pub fn seed(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            depth: 0,
            origin: None,
        }
    }
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    in_flight: usize,
    closed: bool,
}

/// Work queue shared by all crawl workers
///
/// A title is admitted at most once for the lifetime of the frontier,
/// whether it was enqueued, dequeued or merely marked visited.
#[derive(Debug)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    changed: Notify,
    max_queue: usize,
}

impl Frontier {
    /// Creates an empty frontier holding at most `max_queue` pending titles
    pub fn new(max_queue: usize) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            changed: Notify::new(),
            max_queue,
        }
    }

    /// Admits a title if it has never been seen
    ///
    /// # Returns
    ///
    /// `true` if the entry was queued. `false` if the title was already
    /// seen, the queue is full, or the frontier is closed.
    pub async fn enqueue(&self, entry: FrontierEntry) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.closed
                || state.queue.len() >= self.max_queue
                || state.seen.contains(&entry.title)
            {
                return false;
            }
            state.seen.insert(entry.title.clone());
            state.queue.push_back(entry);
        }
        self.changed.notify_waiters();
        true
    }

    /// Takes the next title, waiting while other workers may still add more
    ///
    /// Returns `None` once the frontier is closed, or when the queue is empty
    /// and nothing is in flight (which closes it).
    pub async fn dequeue(&self) -> Option<FrontierEntry> {
        loop {
            // Registered before inspecting state so no wakeup is missed
            let notified = self.changed.notified();
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return None;
                }
                if let Some(entry) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(entry);
                }
                if state.in_flight == 0 {
                    state.closed = true;
                    drop(state);
                    self.changed.notify_waiters();
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Marks a dequeued title as fully processed
    pub async fn complete(&self) {
        {
            let mut state = self.state.lock().await;
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    /// Records a title as visited without queueing it
    ///
    /// Idempotent. Returns `true` only the first time a title is seen.
    pub async fn mark_visited(&self, title: &str) -> bool {
        let mut state = self.state.lock().await;
        state.seen.insert(title.to_string())
    }

    /// Records many titles as visited, returning how many were new
    pub async fn mark_all_visited<I>(&self, titles: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut state = self.state.lock().await;
        titles
            .into_iter()
            .filter(|title| state.seen.insert(title.clone()))
            .count()
    }

    /// Stops handing out work; pending entries are abandoned
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            state.closed = true;
        }
        self.changed.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Number of pending titles
    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.queue.is_empty()
    }

    /// Number of distinct titles ever admitted or marked visited
    pub async fn seen_count(&self) -> usize {
        self.state.lock().await.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let frontier = Frontier::new(100);
        frontier.enqueue(FrontierEntry::seed("A")).await;
        frontier.enqueue(FrontierEntry::seed("B")).await;
        frontier.enqueue(FrontierEntry::seed("C")).await;

        assert_eq!(frontier.dequeue().await.unwrap().title, "A");
        assert_eq!(frontier.dequeue().await.unwrap().title, "B");
        assert_eq!(frontier.dequeue().await.unwrap().title, "C");
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let frontier = Frontier::new(100);
        assert!(frontier.enqueue(FrontierEntry::seed("Physics")).await);
        assert!(!frontier.enqueue(FrontierEntry::seed("Physics")).await);
        assert_eq!(frontier.len().await, 1);
    }

    #[tokio::test]
    async fn test_dequeued_title_not_readmitted() {
        let frontier = Frontier::new(100);
        frontier.enqueue(FrontierEntry::seed("Physics")).await;
        frontier.dequeue().await.unwrap();
        frontier.complete().await;

        assert!(!frontier.enqueue(FrontierEntry::seed("Physics")).await);
    }

    #[tokio::test]
    async fn test_visited_titles_not_admitted() {
        let frontier = Frontier::new(100);
        assert!(frontier.mark_visited("Physics").await);
        assert!(!frontier.mark_visited("Physics").await);
        assert!(!frontier.enqueue(FrontierEntry::seed("Physics")).await);

        let new = frontier
            .mark_all_visited(vec!["Physics".to_string(), "Chemistry".to_string()])
            .await;
        assert_eq!(new, 1);
        assert_eq!(frontier.seen_count().await, 2);
    }

    #[tokio::test]
    async fn test_queue_bound() {
        let frontier = Frontier::new(2);
        assert!(frontier.enqueue(FrontierEntry::seed("A")).await);
        assert!(frontier.enqueue(FrontierEntry::seed("B")).await);
        assert!(!frontier.enqueue(FrontierEntry::seed("C")).await);

        // a dropped title was never admitted, so it may come back later
        frontier.dequeue().await.unwrap();
        assert!(frontier.enqueue(FrontierEntry::seed("C")).await);
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_admits_once() {
        let frontier = Arc::new(Frontier::new(10_000));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let frontier = frontier.clone();
            handles.push(tokio::spawn(async move {
                let mut admitted = 0;
                for i in 0..100 {
                    if frontier.enqueue(FrontierEntry::seed(format!("T{}", i))).await {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }

        assert_eq!(total, 100);
        assert_eq!(frontier.len().await, 100);
    }

    #[tokio::test]
    async fn test_empty_frontier_closes() {
        let frontier = Frontier::new(10);
        assert!(frontier.dequeue().await.is_none());
        assert!(frontier.is_closed().await);
        assert!(!frontier.enqueue(FrontierEntry::seed("Late")).await);
    }

    #[tokio::test]
    async fn test_waiter_woken_by_enqueue() {
        let frontier = Arc::new(Frontier::new(10));
        frontier.enqueue(FrontierEntry::seed("A")).await;
        frontier.dequeue().await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier
            .enqueue(FrontierEntry {
                title: "B".to_string(),
                depth: 1,
                origin: None,
            })
            .await;
        frontier.complete().await;

        let entry = waiter.await.unwrap().unwrap();
        assert_eq!(entry.title, "B");
        assert_eq!(entry.depth, 1);
    }

    #[tokio::test]
    async fn test_waiter_released_when_work_runs_out() {
        let frontier = Arc::new(Frontier::new(10));
        frontier.enqueue(FrontierEntry::seed("A")).await;
        frontier.dequeue().await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier.complete().await;

        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let frontier = Arc::new(Frontier::new(10));
        frontier.enqueue(FrontierEntry::seed("A")).await;
        frontier.enqueue(FrontierEntry::seed("B")).await;
        frontier.dequeue().await.unwrap();

        frontier.close().await;

        assert!(frontier.dequeue().await.is_none());
        assert!(!frontier.enqueue(FrontierEntry::seed("C")).await);
    }
}
