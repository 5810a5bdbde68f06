//! crates/flashcard_core/src/polling.rs
//!
//! The client side of a generation session: repeatedly asks "do proposals exist for
//! this session yet?" until they do, an error occurs, or the wall-clock timeout hits.
//!
//! [`PollState`] is the pure state machine; every transition takes the current
//! instant as an argument. [`spawn_poll`] drives it from tokio timers and delivers
//! updates over a channel. Completion and timeout are mutually exclusive and each is
//! delivered at most once.

use crate::domain::{Proposal, SessionId};
use crate::ports::{PortError, PortResult, SessionCheck};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between "do proposals exist yet?" queries.
    pub check_interval: Duration,
    /// Time between progress estimate updates.
    pub progress_interval: Duration,
    /// How long a generation is assumed to take, for the progress estimate only.
    pub estimated_duration: Duration,
    /// Wall-clock limit after which the poll gives up.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(2_500),
            progress_interval: Duration::from_secs(1),
            estimated_duration: Duration::from_secs(20),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PollError {
    #[error("generation did not finish within {0:?}")]
    Timeout(Duration),
    #[error("checking for proposals failed: {0}")]
    Check(PortError),
}

/// One update delivered to the poll's consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct PollStatus {
    pub done: bool,
    pub proposals: Option<Vec<Proposal>>,
    pub progress: u8,
    pub status_message: String,
    pub error: Option<PollError>,
}

impl PollStatus {
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }
}

fn status_message_for(progress: u8) -> &'static str {
    match progress {
        0..=29 => "Analyzing text...",
        30..=69 => "Generating flashcards...",
        _ => "Finalizing...",
    }
}

//=========================================================================================
// State Machine
//=========================================================================================

#[derive(Debug)]
pub struct PollState {
    config: PollConfig,
    started: Instant,
    progress: u8,
    finished: bool,
}

impl PollState {
    pub fn new(config: PollConfig, started: Instant) -> Self {
        Self {
            config,
            started,
            progress: 0,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn deadline(&self) -> Instant {
        self.started + self.config.timeout
    }

    /// Time-based estimate, never moving backwards.
    fn estimate(&mut self, now: Instant) -> u8 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let estimated = self.config.estimated_duration.as_secs_f64().max(f64::EPSILON);
        let pct = ((elapsed / estimated) * 100.0).min(100.0) as u8;
        self.progress = self.progress.max(pct);
        self.progress
    }

    fn in_progress(&mut self, now: Instant) -> PollStatus {
        let progress = self.estimate(now);
        PollStatus {
            done: false,
            proposals: None,
            progress,
            status_message: status_message_for(progress).to_string(),
            error: None,
        }
    }

    fn fail(&mut self, error: PollError) -> PollStatus {
        self.finished = true;
        let message = match &error {
            PollError::Timeout(_) => "Generation is taking longer than expected".to_string(),
            PollError::Check(e) => e.to_string(),
        };
        PollStatus {
            done: false,
            proposals: None,
            progress: self.progress,
            status_message: message,
            error: Some(error),
        }
    }

    pub fn on_progress_tick(&mut self, now: Instant) -> Option<PollStatus> {
        if self.finished {
            return None;
        }
        if now >= self.deadline() {
            return self.on_deadline();
        }
        Some(self.in_progress(now))
    }

    pub fn on_check(&mut self, now: Instant, result: PortResult<Vec<Proposal>>) -> Option<PollStatus> {
        if self.finished {
            return None;
        }
        match result {
            Err(e) => Some(self.fail(PollError::Check(e))),
            Ok(proposals) if !proposals.is_empty() => {
                self.finished = true;
                self.progress = 100;
                Some(PollStatus {
                    done: true,
                    proposals: Some(proposals),
                    progress: 100,
                    status_message: "Flashcards ready".to_string(),
                    error: None,
                })
            }
            Ok(_) if now >= self.deadline() => self.on_deadline(),
            Ok(_) => Some(self.in_progress(now)),
        }
    }

    pub fn on_deadline(&mut self) -> Option<PollStatus> {
        if self.finished {
            return None;
        }
        Some(self.fail(PollError::Timeout(self.config.timeout)))
    }
}

//=========================================================================================
// Timer-driven Task
//=========================================================================================

/// A running poll. Dropping the handle without calling [`PollHandle::cancel`] also
/// stops the task the next time it tries to deliver an update.
pub struct PollHandle {
    updates: mpsc::UnboundedReceiver<PollStatus>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub async fn next(&mut self) -> Option<PollStatus> {
        self.updates.recv().await
    }

    /// Waits for the terminal update, passing intermediate ones to `on_update`.
    /// Returns `None` only if the poll was cancelled.
    pub async fn wait_with<F>(mut self, mut on_update: F) -> Option<PollStatus>
    where
        F: FnMut(&PollStatus),
    {
        while let Some(status) = self.updates.recv().await {
            if status.is_terminal() {
                return Some(status);
            }
            on_update(&status);
        }
        None
    }

    /// Stops every timer. Once this returns no further update is sent and no check
    /// is in flight.
    pub async fn cancel(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

pub fn spawn_poll(
    check: Arc<dyn SessionCheck>,
    session_id: SessionId,
    config: PollConfig,
) -> PollHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_poll(check, session_id, config, tx, cancel.clone()));
    PollHandle {
        updates: rx,
        cancel,
        task,
    }
}

async fn run_poll(
    check: Arc<dyn SessionCheck>,
    session_id: SessionId,
    config: PollConfig,
    tx: mpsc::UnboundedSender<PollStatus>,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let mut state = PollState::new(config, started);
    let deadline = sleep_until(state.deadline());
    tokio::pin!(deadline);

    let mut check_tick = interval_at(started + config.check_interval, config.check_interval);
    check_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut progress_tick =
        interval_at(started + config.progress_interval, config.progress_interval);
    progress_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Polling generation session {}.", session_id);
    while !state.is_finished() {
        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Polling for session {} cancelled.", session_id);
                return;
            }
            _ = &mut deadline => state.on_deadline(),
            _ = check_tick.tick() => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = &mut deadline => state.on_deadline(),
                    result = check.fetch_proposals(&session_id) => {
                        state.on_check(Instant::now(), result)
                    }
                }
            }
            _ = progress_tick.tick() => state.on_progress_tick(Instant::now()),
        };

        if let Some(status) = update {
            if let Some(error) = &status.error {
                warn!("Polling for session {} stopped: {}", session_id, error);
            }
            if tx.send(status).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProposalStatus;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingCheck {
        calls: AtomicUsize,
        ready_after: Option<usize>,
        fail_with: Option<PortError>,
    }

    impl CountingCheck {
        fn new(ready_after: Option<usize>, fail_with: Option<PortError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                ready_after,
                fail_with,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn proposal(session_id: &SessionId) -> Proposal {
        let now = Utc::now();
        Proposal {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            question: "Which organelle hosts photosynthesis in plant cells?".to_string(),
            answer: "The chloroplast".to_string(),
            image_url: None,
            domain: None,
            session_id: session_id.clone(),
            status: ProposalStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl SessionCheck for CountingCheck {
        async fn fetch_proposals(&self, session_id: &SessionId) -> PortResult<Vec<Proposal>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            match self.ready_after {
                Some(n) if call >= n => Ok(vec![proposal(session_id)]),
                _ => Ok(Vec::new()),
            }
        }
    }

    fn session() -> SessionId {
        SessionId::parse("gen_poll_test").unwrap()
    }

    async fn drain(handle: &mut PollHandle) -> Vec<PollStatus> {
        let mut seen = Vec::new();
        while let Some(status) = handle.next().await {
            seen.push(status);
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_proposals_exactly_once_with_rising_progress() {
        let check = CountingCheck::new(Some(3), None);
        let mut handle = spawn_poll(check.clone(), session(), PollConfig::default());

        let updates = drain(&mut handle).await;

        let done: Vec<&PollStatus> = updates.iter().filter(|s| s.done).collect();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].proposals.as_ref().map(Vec::len), Some(1));
        assert!(updates.last().unwrap().done);
        assert!(updates
            .windows(2)
            .all(|pair| pair[0].progress <= pair[1].progress));
        assert_eq!(check.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_wall_clock_timeout() {
        let check = CountingCheck::new(None, None);
        let started = Instant::now();
        let mut handle = spawn_poll(check.clone(), session(), PollConfig::default());

        let updates = drain(&mut handle).await;

        let timeouts = updates
            .iter()
            .filter(|s| matches!(s.error, Some(PollError::Timeout(_))))
            .count();
        assert_eq!(timeouts, 1);
        assert!(updates.iter().all(|s| !s.done));
        assert!(started.elapsed() >= Duration::from_secs(60));

        let calls_at_timeout = check.calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(check.calls(), calls_at_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_the_first_check_error() {
        let check = CountingCheck::new(None, Some(PortError::Unauthorized));
        let mut handle = spawn_poll(check.clone(), session(), PollConfig::default());

        let updates = drain(&mut handle).await;

        let last = updates.last().unwrap();
        assert_eq!(last.error, Some(PollError::Check(PortError::Unauthorized)));
        assert_eq!(check.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_all_ticks() {
        let check = CountingCheck::new(None, None);
        let mut handle = spawn_poll(check.clone(), session(), PollConfig::default());

        // Let two checks happen.
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        while let Ok(Some(_)) =
            tokio::time::timeout(Duration::from_millis(1), handle.next()).await
        {}
        handle.cancel().await;

        let calls = check.calls();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(check.calls(), calls);
    }

    #[test]
    fn state_machine_never_delivers_after_finishing() {
        let started = Instant::now();
        let mut state = PollState::new(PollConfig::default(), started);
        let session = session();

        let first = state
            .on_check(started + Duration::from_secs(5), Ok(vec![proposal(&session)]))
            .unwrap();
        assert!(first.done);

        assert!(state
            .on_check(started + Duration::from_secs(8), Ok(vec![proposal(&session)]))
            .is_none());
        assert!(state.on_deadline().is_none());
        assert!(state
            .on_progress_tick(started + Duration::from_secs(9))
            .is_none());
    }

    #[test]
    fn progress_estimate_is_capped_and_labelled() {
        let started = Instant::now();
        let mut state = PollState::new(PollConfig::default(), started);

        let early = state.on_progress_tick(started + Duration::from_secs(2)).unwrap();
        assert_eq!(early.progress, 10);
        assert_eq!(early.status_message, "Analyzing text...");

        let late = state.on_progress_tick(started + Duration::from_secs(45)).unwrap();
        assert_eq!(late.progress, 100);
        assert_eq!(late.status_message, "Finalizing...");
        assert!(!late.done);
    }
}
