//! Usage monitor
//!
//! The single owner of all mutable monitoring state. Each polling cycle
//! tries the OAuth usage API first (authoritative when healthy), falls back
//! to session-log aggregation, fuses the result into one canonical
//! [`UsageSnapshot`] and broadcasts it to subscribers.
//!
//! # Cycle serialization
//!
//! Cycles never overlap: an async mutex guards the whole cycle, so a
//! concurrent trigger is deferred until the in-flight cycle commits. On top
//! of that, every cycle carries a monotonically increasing id and a commit
//! is discarded if a newer id has already committed - a late automatic cycle
//! cannot clobber the result of a manual refresh that was triggered after it.
//!
//! # Failure policy
//!
//! Transient OAuth failures are retried silently for up to
//! [`MAX_RETRY_ATTEMPTS`] consecutive cycles; after that automatic cycles
//! stop attempting OAuth until [`UsageMonitor::manual_refresh`] clears the
//! flag. Auth-fatal failures (expired token, missing scope) never count
//! toward that budget - retrying cannot fix them. Session-log failures are
//! reported immediately and never retried within a cycle: the read is
//! deterministic, so retrying without a filesystem change is pointless. A
//! cycle always commits some snapshot; total failure commits the empty
//! snapshot with [`MonitorError::BothSourcesFailed`] and polling continues.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::source::UsageSource;
use crate::error::{MonitorError, SourceError};
use crate::models::{
    prune_history, HistoryPoint, MonitorSettings, SourceKind, SourceState, UsageSnapshot,
};

/// Consecutive generic OAuth failures before manual retry is required
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Broadcast channel capacity for monitor events
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Events
// ============================================================================

/// Events broadcast once per completed cycle, in this fixed order
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// The canonical snapshot changed (first)
    UsageChanged(UsageSnapshot),
    /// Consumers should evaluate alert thresholds (second)
    AlertCheck(UsageSnapshot),
    /// Consumers should re-render statusline exports (third)
    StatuslineExport(UsageSnapshot),
}

/// What initiated a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleTrigger {
    /// Interval timer
    Automatic,
    /// User-initiated refresh
    Manual,
    /// Active profile changed externally
    ProfileChanged,
}

impl CycleTrigger {
    fn label(&self) -> &'static str {
        match self {
            CycleTrigger::Automatic => "automatic",
            CycleTrigger::Manual => "manual",
            CycleTrigger::ProfileChanged => "profile_changed",
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Mutable monitoring state; written only by the monitor
struct MonitorState {
    current: UsageSnapshot,
    history: Vec<HistoryPoint>,
    error: Option<MonitorError>,
    oauth_state: SourceState,
    session_logs_state: SourceState,
    consecutive_oauth_failures: u32,
    requires_manual_retry: bool,
    is_refreshing: bool,
    last_updated: Option<DateTime<Utc>>,
    last_committed_cycle: u64,
}

impl MonitorState {
    fn new(settings: &MonitorSettings) -> Self {
        Self {
            current: UsageSnapshot::empty(),
            history: Vec::new(),
            error: None,
            oauth_state: initial_source_state(settings.oauth_enabled),
            session_logs_state: initial_source_state(settings.session_logs_enabled),
            consecutive_oauth_failures: 0,
            requires_manual_retry: false,
            is_refreshing: false,
            last_updated: None,
            last_committed_cycle: 0,
        }
    }
}

fn initial_source_state(enabled: bool) -> SourceState {
    if enabled {
        SourceState::NotConfigured
    } else {
        SourceState::Disabled
    }
}

/// Outcome of one source attempt within a cycle
enum AttemptOutcome {
    Skipped,
    Succeeded(UsageSnapshot),
    Failed(SourceError),
}

// ============================================================================
// Monitor
// ============================================================================

/// Polling orchestrator over the two usage sources.
///
/// Cheap to clone; all state is shared behind `Arc`s. External layers hold
/// read-only access through the getter methods and the event channel - the
/// monitor is the only writer.
#[derive(Clone)]
pub struct UsageMonitor {
    state: Arc<RwLock<MonitorState>>,
    settings: Arc<RwLock<MonitorSettings>>,
    oauth: Arc<dyn UsageSource>,
    session_logs: Arc<dyn UsageSource>,
    cycle_guard: Arc<Mutex<()>>,
    cycle_counter: Arc<AtomicU64>,
    events: broadcast::Sender<MonitorEvent>,
    poll_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl UsageMonitor {
    /// Create a monitor over the given sources
    pub fn new(
        oauth: Arc<dyn UsageSource>,
        session_logs: Arc<dyn UsageSource>,
        settings: MonitorSettings,
    ) -> Self {
        let settings = settings.validate();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state: Arc::new(RwLock::new(MonitorState::new(&settings))),
            settings: Arc::new(RwLock::new(settings)),
            oauth,
            session_logs,
            cycle_guard: Arc::new(Mutex::new(())),
            cycle_counter: Arc::new(AtomicU64::new(0)),
            events,
            poll_task: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Run one full cycle. Never fails; every failure is captured into the
    /// cycle's [`MonitorError`] and some snapshot is always committed.
    pub async fn refresh(&self) {
        self.run_cycle(CycleTrigger::Automatic).await;
    }

    /// User-triggered refresh: clears the manual-retry flag and the failure
    /// counter, then runs a cycle that is allowed to attempt OAuth again.
    pub async fn manual_refresh(&self) {
        {
            let mut state = self.state.write().await;
            state.requires_manual_retry = false;
            state.consecutive_oauth_failures = 0;
        }
        self.run_cycle(CycleTrigger::Manual).await;
    }

    /// External "active profile changed" hook: retry state from the previous
    /// profile is meaningless, so reset it and fetch fresh.
    pub async fn notify_profile_changed(&self) {
        {
            let mut state = self.state.write().await;
            state.requires_manual_retry = false;
            state.consecutive_oauth_failures = 0;
            state.error = None;
        }
        self.run_cycle(CycleTrigger::ProfileChanged).await;
    }

    /// Arm (or re-arm) the polling timer at the given interval.
    ///
    /// The interval is validated against the preset list and stored in
    /// settings. Re-arming cancels a pending timer but not an in-flight
    /// fetch: cycles run as detached tasks, so an aborted timer never kills
    /// a fetch that already started.
    pub async fn start_polling(&self, interval_secs: u64) {
        {
            let mut settings = self.settings.write().await;
            settings.refresh_interval_secs = interval_secs;
            *settings = settings.validate();
        }
        self.arm_timer().await;
    }

    /// Cancel the polling timer. Best-effort: an in-flight cycle completes
    /// and still commits its result.
    pub async fn stop_polling(&self) {
        if let Some(handle) = self.poll_task.lock().await.take() {
            handle.abort();
            log::debug!("[monitor] polling stopped");
        }
    }

    /// Replace the monitor settings (validated). Re-arms the timer when
    /// polling is active so a changed interval takes effect.
    pub async fn update_settings(&self, new_settings: MonitorSettings) {
        let validated = new_settings.validate();
        {
            let mut settings = self.settings.write().await;
            *settings = validated;
        }
        let polling = self.poll_task.lock().await.is_some();
        if polling {
            self.arm_timer().await;
        }
    }

    async fn arm_timer(&self) {
        self.stop_polling().await;

        let interval_secs = self.settings.read().await.refresh_interval_secs;
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;
                // Detached so aborting the timer never cancels a cycle
                let cycle_monitor = monitor.clone();
                tokio::spawn(async move {
                    cycle_monitor.refresh().await;
                });
            }
        });

        *self.poll_task.lock().await = Some(handle);
        log::info!("[monitor] polling every {}s", interval_secs);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The canonical snapshot from the latest committed cycle
    pub async fn current_usage(&self) -> UsageSnapshot {
        self.state.read().await.current.clone()
    }

    /// The bounded percentage history, oldest first
    pub async fn usage_history(&self) -> Vec<HistoryPoint> {
        self.state.read().await.history.clone()
    }

    /// The latest cycle's failure, if any
    pub async fn error(&self) -> Option<MonitorError> {
        self.state.read().await.error.clone()
    }

    /// Whether a cycle is currently in flight
    pub async fn is_refreshing(&self) -> bool {
        self.state.read().await.is_refreshing
    }

    /// When the last cycle committed
    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_updated
    }

    /// Whether automatic OAuth recovery is suspended pending a manual refresh
    pub async fn requires_manual_retry(&self) -> bool {
        self.state.read().await.requires_manual_retry
    }

    /// Health of one source as of its last attempt
    pub async fn source_state(&self, kind: SourceKind) -> SourceState {
        let state = self.state.read().await;
        match kind {
            SourceKind::Oauth => state.oauth_state.clone(),
            SourceKind::SessionLogs => state.session_logs_state.clone(),
        }
    }

    /// Current validated settings
    pub async fn settings(&self) -> MonitorSettings {
        self.settings.read().await.clone()
    }

    /// Subscribe to per-cycle events. Every subscriber observes the three
    /// events of a cycle in fixed order: `UsageChanged`, `AlertCheck`,
    /// `StatuslineExport`.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    async fn run_cycle(&self, trigger: CycleTrigger) {
        // Ids are assigned at trigger time; commits of superseded ids are
        // discarded even if their fetch finishes later.
        let cycle_id = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.cycle_guard.lock().await;

        let settings = self.settings.read().await.clone();
        log::debug!("[monitor] cycle {} start ({})", cycle_id, trigger.label());

        {
            let mut state = self.state.write().await;
            state.is_refreshing = true;
        }

        // --- OAuth attempt -------------------------------------------------
        let oauth_outcome = if !settings.oauth_enabled {
            AttemptOutcome::Skipped
        } else if trigger == CycleTrigger::Automatic && self.state.read().await.requires_manual_retry
        {
            log::debug!(
                "[monitor] cycle {}: OAuth suspended, waiting for manual retry",
                cycle_id
            );
            AttemptOutcome::Skipped
        } else {
            match self.oauth.fetch().await {
                Ok(snapshot) => AttemptOutcome::Succeeded(snapshot),
                Err(err) => {
                    log::warn!("[monitor] {} failed: {}", self.oauth.display_name(), err);
                    AttemptOutcome::Failed(err)
                }
            }
        };

        let oauth_succeeded = matches!(oauth_outcome, AttemptOutcome::Succeeded(_));

        // --- Session-log attempt (only when OAuth did not settle the cycle)
        let jsonl_outcome = if !settings.session_logs_enabled {
            AttemptOutcome::Skipped
        } else if oauth_succeeded {
            // OAuth is authoritative when healthy; skip the fallback entirely
            AttemptOutcome::Skipped
        } else {
            match self.session_logs.fetch().await {
                Ok(snapshot) => AttemptOutcome::Succeeded(snapshot),
                Err(err) => {
                    log::warn!(
                        "[monitor] {} failed: {}",
                        self.session_logs.display_name(),
                        err
                    );
                    AttemptOutcome::Failed(err)
                }
            }
        };

        self.commit_cycle(cycle_id, &settings, oauth_outcome, jsonl_outcome)
            .await;
    }

    /// Fuse the two attempt outcomes into the canonical snapshot + error and
    /// commit them atomically.
    async fn commit_cycle(
        &self,
        cycle_id: u64,
        settings: &MonitorSettings,
        oauth_outcome: AttemptOutcome,
        jsonl_outcome: AttemptOutcome,
    ) {
        let now = Utc::now();
        let mut state = self.state.write().await;

        if state.last_committed_cycle > cycle_id {
            // A newer cycle already committed; this result is stale.
            log::warn!(
                "[monitor] discarding stale cycle {} (newest committed: {})",
                cycle_id,
                state.last_committed_cycle
            );
            state.is_refreshing = false;
            return;
        }
        state.last_committed_cycle = cycle_id;

        // Per-source state + retry bookkeeping
        let mut oauth_error: Option<MonitorError> = None;
        let mut oauth_snapshot: Option<UsageSnapshot> = None;
        match oauth_outcome {
            AttemptOutcome::Skipped => {
                if !settings.oauth_enabled {
                    state.oauth_state = SourceState::Disabled;
                }
                // Suspended attempts keep the previous failed state visible
            }
            AttemptOutcome::Succeeded(snapshot) => {
                state.oauth_state = SourceState::Available;
                state.consecutive_oauth_failures = 0;
                state.requires_manual_retry = false;
                oauth_snapshot = Some(snapshot);
            }
            AttemptOutcome::Failed(err) => {
                state.oauth_state = match &err {
                    SourceError::NotConfigured(_) => SourceState::NotConfigured,
                    other => SourceState::Failed(other.to_string()),
                };
                // Only generic transient failures consume the retry budget;
                // auth-fatal and not-configured outcomes are deterministic.
                if !err.is_auth_fatal() && !matches!(err, SourceError::NotConfigured(_)) {
                    state.consecutive_oauth_failures += 1;
                    if state.consecutive_oauth_failures >= MAX_RETRY_ATTEMPTS {
                        state.requires_manual_retry = true;
                        log::warn!(
                            "[monitor] {} consecutive OAuth failures - manual retry required",
                            state.consecutive_oauth_failures
                        );
                    }
                }
                oauth_error = Some(MonitorError::from_oauth(&err));
            }
        }

        let mut jsonl_error: Option<MonitorError> = None;
        let mut jsonl_snapshot: Option<UsageSnapshot> = None;
        match jsonl_outcome {
            AttemptOutcome::Skipped => {
                if !settings.session_logs_enabled {
                    state.session_logs_state = SourceState::Disabled;
                }
            }
            AttemptOutcome::Succeeded(snapshot) => {
                state.session_logs_state = SourceState::Available;
                jsonl_snapshot = Some(snapshot);
            }
            AttemptOutcome::Failed(err) => {
                state.session_logs_state = match &err {
                    SourceError::NoProjectsDirectory(_) | SourceError::NotConfigured(_) => {
                        SourceState::NotConfigured
                    }
                    other => SourceState::Failed(other.to_string()),
                };
                jsonl_error = Some(MonitorError::from_jsonl(&err));
            }
        }

        // Canonical selection: OAuth wins when present, then session logs,
        // then the empty snapshot with a total-failure error.
        let (canonical, error) = match (oauth_snapshot, jsonl_snapshot) {
            (Some(snapshot), _) => (snapshot, None),
            (None, Some(snapshot)) => (snapshot, oauth_error),
            (None, None) => {
                let error = match (oauth_error, jsonl_error) {
                    (Some(oauth), Some(jsonl)) => Some(MonitorError::BothSourcesFailed(format!(
                        "{}; {}",
                        oauth, jsonl
                    ))),
                    (Some(oauth), None) => Some(oauth),
                    (None, Some(jsonl)) => Some(jsonl),
                    // Degenerate cycle: nothing was attempted (both disabled,
                    // or OAuth suspended with session logs disabled)
                    (None, None) => Some(MonitorError::BothSourcesFailed(
                        "no usage source produced a reading".to_string(),
                    )),
                };
                (UsageSnapshot::empty(), error)
            }
        };

        // History only accumulates percentage-bearing readings
        if canonical.has_percentage() {
            let mut point =
                HistoryPoint::new(canonical.captured_at, canonical.primary_percent, canonical.source);
            if let Some(seven_day) = canonical.seven_day_percent {
                point = point.with_seven_day(seven_day);
            }
            state.history.push(point);
            prune_history(&mut state.history, now);
        }

        log::info!(
            "[monitor] cycle {} settled: source={} percent={:.1} error={:?}",
            cycle_id,
            canonical.source,
            canonical.primary_percent,
            error.as_ref().map(|e| e.to_string())
        );

        state.current = canonical.clone();
        state.error = error;
        state.last_updated = Some(now);
        state.is_refreshing = false;
        drop(state);

        // Fixed emission order; send errors just mean nobody is listening
        let _ = self.events.send(MonitorEvent::UsageChanged(canonical.clone()));
        let _ = self.events.send(MonitorEvent::AlertCheck(canonical.clone()));
        let _ = self.events.send(MonitorEvent::StatuslineExport(canonical));
    }
}

// ============================================================================
// Tests
// ============================================================================
