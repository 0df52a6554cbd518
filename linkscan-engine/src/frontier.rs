//! The deduplicated, depth-aware work queue shared by the fetch workers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;
use tracing::debug;

use crate::config::{FollowPolicy, ScanConfiguration};
use crate::result::LinkRecord;

/// Lifecycle phase shared between the controller and the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Running = 0,
    Paused = 1,
    Stopping = 2,
    Stopped = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Phase {
        match value {
            0 => Phase::Running,
            1 => Phase::Paused,
            2 => Phase::Stopping,
            _ => Phase::Stopped,
        }
    }
}

/// What `offer` decided about a discovered link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Enqueued for fetching.
    Accepted,
    /// Already seen this scan; only the extra source page is recorded.
    Duplicate,
    /// The per-origin policy is `ignore`. The caller reports it as skipped.
    PolicyIgnored,
    /// External link past the depth bound; dropped without a report.
    DepthExceeded,
}

struct Inner {
    queue: VecDeque<LinkRecord>,
    visited: HashSet<String>,
    /// Extra source pages for URLs rediscovered after their first offer.
    rediscoveries: HashMap<String, Vec<String>>,
    /// Links taken by a worker and not yet marked done.
    in_flight: usize,
}

pub struct Frontier {
    inner: Mutex<Inner>,
    notify: Notify,
    phase: AtomicU8,
    internal_policy: FollowPolicy,
    external_policy: FollowPolicy,
    max_external_depth: usize,
}

impl Frontier {
    pub fn new(config: &ScanConfiguration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                visited: HashSet::new(),
                rediscoveries: HashMap::new(),
                in_flight: 0,
            }),
            notify: Notify::new(),
            phase: AtomicU8::new(Phase::Running as u8),
            internal_policy: config.internal_policy,
            external_policy: config.external_policy,
            max_external_depth: config.max_external_depth,
        }
    }

    /// Enqueues the seed unconditionally. The start URL is fetched and
    /// followed regardless of the internal-links policy.
    pub fn seed(&self, record: LinkRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.visited.insert(record.target.clone());
        inner.queue.push_back(record);
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Admission control for a discovered link.
    ///
    /// Every offered URL lands in the visited set on first sight, so a URL
    /// rejected here (and any skip report the caller emits for it) appears
    /// at most once per scan no matter how many pages link to it.
    pub fn offer(&self, record: LinkRecord) -> Offer {
        let mut inner = self.inner.lock().unwrap();

        if inner.visited.contains(record.target.as_str()) {
            if !record.source_page.is_empty() {
                inner
                    .rediscoveries
                    .entry(record.target)
                    .or_default()
                    .push(record.source_page);
            }
            return Offer::Duplicate;
        }
        inner.visited.insert(record.target.clone());

        let policy = match record.origin.is_external() {
            false => self.internal_policy,
            true => self.external_policy,
        };
        if policy == FollowPolicy::Ignore {
            return Offer::PolicyIgnored;
        }

        if record.origin.is_external() && record.depth > self.max_external_depth {
            debug!(
                "rejecting {} at external depth {} (limit {})",
                record.target, record.depth, self.max_external_depth
            );
            return Offer::DepthExceeded;
        }

        inner.queue.push_back(record);
        drop(inner);
        self.notify.notify_waiters();
        Offer::Accepted
    }

    /// Marks a URL as seen without enqueueing it, so one-off skip reports
    /// (e.g. unsupported schemes) stay deduplicated too. Returns false if
    /// the URL was already known.
    pub fn note_skip(&self, url: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.visited.insert(url.to_string())
    }

    /// Dequeues the next pending link. Suspends while the queue is empty
    /// and the scan is running, or while the scan is paused; returns `None`
    /// once the scan is stopping or the frontier has fully drained.
    pub async fn take(&self) -> Option<LinkRecord> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().unwrap();
                match self.phase() {
                    Phase::Stopping | Phase::Stopped => return None,
                    Phase::Paused => {}
                    Phase::Running => {
                        if let Some(record) = inner.queue.pop_front() {
                            inner.in_flight += 1;
                            return Some(record);
                        }
                        if inner.in_flight == 0 {
                            return None;
                        }
                    }
                }
            }

            notified.as_mut().await;
        }
    }

    /// Marks a taken link as fully processed: fetched (or skipped) and all
    /// of its outbound links offered. The frontier is drained once the
    /// queue is empty and no worker holds an in-flight link.
    pub fn task_done(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        let drained = inner.in_flight == 0 && inner.queue.is_empty();
        drop(inner);
        if drained {
            self.notify.notify_waiters();
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn visited_len(&self) -> usize {
        self.inner.lock().unwrap().visited.len()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Source pages that rediscovered an already-offered URL, for reporting.
    pub fn rediscoveries(&self) -> HashMap<String, Vec<String>> {
        self.inner.lock().unwrap().rediscoveries.clone()
    }
}
