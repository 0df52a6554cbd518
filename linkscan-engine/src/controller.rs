//! Scan lifecycle control and the aggregation sink.
//!
//! The controller owns the configuration and rules between scans and the
//! live session while one runs. Results are delivered to the front end as
//! an asynchronous stream of [`ScanEvent`]s in fetch-completion order,
//! which is not the order links were discovered in.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ScanConfiguration;
use crate::error::{Result, ScanError};
use crate::frontier::{Frontier, Phase};
use crate::result::{LinkRecord, Origin};
use crate::rules::{Rule, RuleSet};
use crate::urls::{self, StartOrigin};
use crate::worker;

/// Lifecycle state visible to the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Paused,
    Stopping,
    Stopped,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Idle => "idle",
            ScanState::Running => "running",
            ScanState::Paused => "paused",
            ScanState::Stopping => "stopping",
            ScanState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// One entry of the asynchronous result stream.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A link reached a terminal status.
    Link(LinkRecord),
    /// The frontier drained and every worker went idle. Not sent when the
    /// scan is stopped by the caller.
    Finished,
}

/// Aggregate tallies for one session.
#[derive(Debug, Default)]
pub struct ScanCounters {
    pub discovered: AtomicUsize,
    pub fetched: AtomicUsize,
    pub skipped: AtomicUsize,
    pub timeouts: AtomicUsize,
    pub errors: AtomicUsize,
    pub duplicates: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CounterSnapshot {
    pub discovered: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub timeouts: usize,
    pub errors: usize,
    pub duplicates: usize,
}

impl ScanCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            discovered: self.discovered.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the controller, the workers, and the monitor task.
pub(crate) struct SessionShared {
    pub(crate) config: ScanConfiguration,
    pub(crate) rules: RuleSet,
    pub(crate) start_origin: StartOrigin,
    pub(crate) frontier: Frontier,
    pub(crate) counters: ScanCounters,
}

/// One scan from start to stopped: the configuration snapshot, the
/// frontier, and the worker pool. Replaced wholesale on the next start.
pub struct ScanSession {
    shared: Arc<SessionShared>,
    monitor: Option<JoinHandle<()>>,
}

pub struct ScanController {
    config: ScanConfiguration,
    rules: Vec<Rule>,
    session: Option<ScanSession>,
}

impl ScanController {
    pub fn new() -> Self {
        Self {
            config: ScanConfiguration::default(),
            rules: Vec::new(),
            session: None,
        }
    }

    pub fn state(&self) -> ScanState {
        match &self.session {
            None => ScanState::Idle,
            Some(session) => match session.shared.frontier.phase() {
                Phase::Running => ScanState::Running,
                Phase::Paused => ScanState::Paused,
                Phase::Stopping => ScanState::Stopping,
                Phase::Stopped => ScanState::Stopped,
            },
        }
    }

    pub fn config(&self) -> &ScanConfiguration {
        &self.config
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Aggregate counters of the current or most recent session.
    pub fn counters(&self) -> Option<CounterSnapshot> {
        self.session
            .as_ref()
            .map(|session| session.shared.counters.snapshot())
    }

    fn ensure_settled(&self, action: &'static str) -> Result<()> {
        match self.state() {
            ScanState::Idle | ScanState::Stopped => Ok(()),
            state => Err(ScanError::IllegalTransition {
                action,
                state: state.to_string(),
            }),
        }
    }

    /// Replaces the configuration used by the next start. Rejected while a
    /// scan is in progress; a running session keeps its snapshot.
    pub fn configure(&mut self, config: ScanConfiguration) -> Result<()> {
        self.ensure_settled("configure")?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Replaces the rule list used by the next start. Patterns are compiled
    /// eagerly so bad regexes surface here rather than mid-scan.
    pub fn set_rules(&mut self, rules: Vec<Rule>) -> Result<()> {
        self.ensure_settled("set rules")?;
        RuleSet::compile(&rules)?;
        self.rules = rules;
        Ok(())
    }

    /// Starts a scan from `seed_url` and returns the result stream.
    ///
    /// Snapshots the configuration and rules, resets the frontier and
    /// counters, seeds the frontier, and spawns the worker pool. The stream
    /// closes when the session ends; a [`ScanEvent::Finished`] precedes the
    /// close only when the frontier drained naturally.
    pub fn start(&mut self, seed_url: &str) -> Result<UnboundedReceiver<ScanEvent>> {
        self.ensure_settled("start")?;
        self.config.validate()?;

        let seed = urls::normalize_seed(seed_url)?;
        let seed = if self.config.follow_query_strings {
            seed
        } else {
            urls::strip_query(&seed)
        };

        let rules = RuleSet::compile(&self.rules)?;
        let client = worker::build_http_client(&self.config)?;

        let shared = Arc::new(SessionShared {
            start_origin: StartOrigin::of(&seed),
            frontier: Frontier::new(&self.config),
            rules,
            counters: ScanCounters::default(),
            config: self.config.clone(),
        });

        let seed_record = LinkRecord::new(seed.to_string(), String::new(), Origin::Internal, 0);
        shared.frontier.seed(seed_record);
        shared.counters.discovered.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut workers = Vec::with_capacity(self.config.thread_count);
        for worker_id in 0..self.config.thread_count {
            workers.push(tokio::spawn(worker::run_worker(
                worker_id,
                shared.clone(),
                client.clone(),
                tx.clone(),
            )));
        }
        let monitor = tokio::spawn(monitor_session(shared.clone(), workers, tx));

        info!(
            "scan started: {} ({} workers)",
            seed, self.config.thread_count
        );
        self.session = Some(ScanSession {
            shared,
            monitor: Some(monitor),
        });
        Ok(rx)
    }

    /// Lets workers finish their in-flight fetches, then parks them before
    /// they take new frontier entries.
    pub fn pause(&mut self) -> Result<()> {
        match self.state() {
            ScanState::Running => {
                self.phase_session(Phase::Paused);
                info!("scan paused");
                Ok(())
            }
            state => Err(ScanError::IllegalTransition {
                action: "pause",
                state: state.to_string(),
            }),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        match self.state() {
            ScanState::Paused => {
                self.phase_session(Phase::Running);
                info!("scan resumed");
                Ok(())
            }
            state => Err(ScanError::IllegalTransition {
                action: "resume",
                state: state.to_string(),
            }),
        }
    }

    /// Cooperative stop: no new frontier draws, in-flight fetches finish or
    /// hit their own timeout, pending entries are discarded unreported.
    pub fn stop(&mut self) -> Result<()> {
        match self.state() {
            ScanState::Running | ScanState::Paused => {
                self.phase_session(Phase::Stopping);
                info!("scan stopping");
                Ok(())
            }
            state => Err(ScanError::IllegalTransition {
                action: "stop",
                state: state.to_string(),
            }),
        }
    }

    /// Waits until the current session's workers have exited. No-op when
    /// nothing is running.
    pub async fn join(&mut self) -> Result<()> {
        if let Some(session) = self.session.as_mut()
            && let Some(monitor) = session.monitor.take()
        {
            monitor.await?;
        }
        Ok(())
    }

    fn phase_session(&self, phase: Phase) {
        if let Some(session) = &self.session {
            session.shared.frontier.set_phase(phase);
        }
    }
}

impl Default for ScanController {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins the worker pool, closes out the session, and delivers the
/// finished signal when the frontier drained on its own.
async fn monitor_session(
    shared: Arc<SessionShared>,
    workers: Vec<JoinHandle<()>>,
    events: UnboundedSender<ScanEvent>,
) {
    for result in join_all(workers).await {
        if let Err(e) = result {
            warn!("worker task failed: {}", e);
        }
    }

    let was_stopped = shared.frontier.phase() == Phase::Stopping;
    shared.frontier.set_phase(Phase::Stopped);

    if was_stopped {
        info!("scan stopped; {} links checked", shared.counters.snapshot().fetched);
    } else {
        info!(
            "scan finished; {} links checked",
            shared.counters.snapshot().fetched
        );
        let _ = events.send(ScanEvent::Finished);
    }
    // dropping the last sender closes the stream
}
