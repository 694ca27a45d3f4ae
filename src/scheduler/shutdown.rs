//! Shutdown timer set and the cancellable countdown.
//!
//! [`ShutdownScheduler::rebuild`] turns the configured rules into one tokio
//! task per (rule, weekday). Each task sleeps until its instant, starts the
//! countdown, then re-arms itself for the following week. Rebuilding bumps a
//! generation counter; a task that wakes up under an older generation exits
//! without firing.
//!
//! The countdown runs in its own task so that a rebuild during the countdown
//! does not abort it. Only one countdown runs at a time.

use crate::config::ConfigStore;
use crate::error::Result;
use crate::events::{EngineEvent, EventSender, emit};
use crate::scheduler::executor::ShutdownExecutor;
use crate::scheduler::recurrence::{expand_rule, next_occurrence, parse_rule_time};
use chrono::{DateTime, Local, NaiveTime, TimeDelta, Weekday};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default delay between a timer firing and the shutdown command.
pub const DEFAULT_COUNTDOWN_SECS: u64 = 60;

/// One pending shutdown timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTimer {
    pub fires_at: DateTime<Local>,
    /// Index into the document's shutdown rules.
    pub rule_index: usize,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: u8,
}

/// Coarse scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "pending", rename_all = "snake_case")]
pub enum SchedulerPhase {
    /// No timers armed and no countdown running.
    Idle,
    /// This many timers are armed.
    Scheduled(usize),
    /// A countdown is running.
    Firing,
}

struct TimerSlot {
    timer: ScheduledTimer,
    handle: JoinHandle<()>,
}

struct ActiveCountdown {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct SchedulerState {
    generation: u64,
    timers: Vec<TimerSlot>,
    countdown: Option<ActiveCountdown>,
    next_countdown_id: u64,
}

/// Owns the armed shutdown timers and the running countdown, if any.
pub struct ShutdownScheduler {
    store: Arc<dyn ConfigStore>,
    executor: Arc<dyn ShutdownExecutor>,
    events: EventSender,
    countdown: Duration,
    state: Mutex<SchedulerState>,
}

impl ShutdownScheduler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        executor: Arc<dyn ShutdownExecutor>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            executor,
            events,
            countdown: Duration::from_secs(DEFAULT_COUNTDOWN_SECS),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Override the countdown length.
    pub fn with_countdown(mut self, countdown: Duration) -> Self {
        self.countdown = countdown;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace every armed timer with timers for the current rules.
    ///
    /// Returns the number of armed timers.
    pub fn rebuild(self: &Arc<Self>) -> usize {
        self.rebuild_at(Local::now())
    }

    /// [`rebuild`](Self::rebuild) with an explicit notion of "now".
    ///
    /// Timers keep measuring against that clock: a `now` six hours in the
    /// past makes every wait six hours longer than under [`rebuild`](Self::rebuild).
    pub fn rebuild_at(self: &Arc<Self>, now: DateTime<Local>) -> usize {
        let clock_offset = now - Local::now();
        let document = self.store.load();

        let mut planned: Vec<(ScheduledTimer, Weekday, NaiveTime)> = Vec::new();
        for (rule_index, rule) in document.shutdown_rules.iter().enumerate() {
            let Some(time) = parse_rule_time(&rule.time) else {
                if rule.active {
                    warn!("skipping shutdown rule {rule_index}: bad time {:?}", rule.time);
                }
                continue;
            };
            for (weekday, fires_at) in expand_rule(rule, &now) {
                let timer = ScheduledTimer {
                    fires_at,
                    rule_index,
                    weekday: weekday.num_days_from_sunday() as u8,
                };
                planned.push((timer, weekday, time));
            }
        }

        let pending = {
            let mut state = self.lock();
            state.generation += 1;
            let generation = state.generation;
            for slot in state.timers.drain(..) {
                slot.handle.abort();
            }
            for (slot_index, (timer, weekday, time)) in planned.into_iter().enumerate() {
                debug!(
                    "arming shutdown timer for rule {} at {}",
                    timer.rule_index, timer.fires_at
                );
                let handle = tokio::spawn(Arc::clone(self).run_timer(
                    generation,
                    slot_index,
                    clock_offset,
                    timer.fires_at,
                    weekday,
                    time,
                ));
                state.timers.push(TimerSlot { timer, handle });
            }
            snapshot(&state)
        };

        info!("shutdown schedule rebuilt with {} timers", pending.len());
        let count = pending.len();
        emit(&self.events, EngineEvent::ScheduleRebuilt { pending });
        count
    }

    async fn run_timer(
        self: Arc<Self>,
        generation: u64,
        slot: usize,
        clock_offset: TimeDelta,
        mut fires_at: DateTime<Local>,
        weekday: Weekday,
        time: NaiveTime,
    ) {
        let clock = || Local::now() + clock_offset;
        loop {
            let wait = (fires_at - clock()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            if self.lock().generation != generation {
                return;
            }

            info!("shutdown timer fired ({weekday} {time})");
            self.trigger_now();

            let base = std::cmp::max(clock(), fires_at);
            let Some(next) = next_occurrence(&base, weekday, time) else {
                warn!("no next occurrence for {weekday} {time}; timer retired");
                return;
            };
            fires_at = next;

            {
                let mut state = self.lock();
                if state.generation != generation {
                    return;
                }
                if let Some(entry) = state.timers.get_mut(slot) {
                    entry.timer.fires_at = next;
                }
            }
            debug!("shutdown timer re-armed for {next}");
        }
    }

    /// Start the countdown now. Returns `false` when one is already running.
    pub fn trigger_now(self: &Arc<Self>) -> bool {
        let (id, token) = {
            let mut state = self.lock();
            if state.countdown.is_some() {
                info!("shutdown countdown already running; ignoring trigger");
                return false;
            }
            state.next_countdown_id += 1;
            let id = state.next_countdown_id;
            let token = CancellationToken::new();
            state.countdown = Some(ActiveCountdown {
                id,
                token: token.clone(),
            });
            (id, token)
        };
        tokio::spawn(Arc::clone(self).run_countdown(id, token));
        true
    }

    async fn run_countdown(self: Arc<Self>, id: u64, token: CancellationToken) {
        self.update_stats(|stats| stats.total_scheduled += 1);

        let deadline = Local::now()
            + chrono::Duration::from_std(self.countdown).unwrap_or(chrono::Duration::zero());
        info!("shutdown in {}s (at {deadline})", self.countdown.as_secs());
        emit(
            &self.events,
            EngineEvent::ShutdownCountdownStarted {
                fires_at: deadline.to_rfc3339(),
                countdown_secs: self.countdown.as_secs(),
            },
        );

        let cancelled = tokio::select! {
            _ = token.cancelled() => true,
            _ = tokio::time::sleep(self.countdown) => false,
        };

        {
            let mut state = self.lock();
            if state.countdown.as_ref().is_some_and(|c| c.id == id) {
                state.countdown = None;
            }
        }

        if cancelled {
            info!("shutdown countdown cancelled");
            self.update_stats(|stats| stats.total_canceled += 1);
            emit(&self.events, EngineEvent::ShutdownCancelled);
            return;
        }

        match self.executor.execute_shutdown().await {
            Ok(()) => {
                let at = Local::now().to_rfc3339();
                self.update_stats(|stats| stats.last_shutdown = Some(at));
                emit(&self.events, EngineEvent::ShutdownExecuted);
            }
            Err(e) => {
                error!("shutdown command failed: {e}");
                emit(
                    &self.events,
                    EngineEvent::ShutdownFailed {
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    /// Abort the running countdown, or revoke an already-issued OS shutdown.
    pub async fn cancel_pending_shutdown(&self) -> Result<()> {
        let token = self.lock().countdown.as_ref().map(|c| c.token.clone());
        match token {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => self.executor.cancel_shutdown().await,
        }
    }

    /// Disarm every timer and abort any countdown without shutting down.
    pub fn cancel_all(&self) {
        let mut state = self.lock();
        state.generation += 1;
        for slot in state.timers.drain(..) {
            slot.handle.abort();
        }
        if let Some(countdown) = state.countdown.take() {
            countdown.token.cancel();
        }
        debug!("all shutdown timers cleared");
    }

    /// Armed timers, soonest first.
    pub fn pending(&self) -> Vec<ScheduledTimer> {
        snapshot(&self.lock())
    }

    pub fn phase(&self) -> SchedulerPhase {
        let state = self.lock();
        if state.countdown.is_some() {
            SchedulerPhase::Firing
        } else if state.timers.is_empty() {
            SchedulerPhase::Idle
        } else {
            SchedulerPhase::Scheduled(state.timers.len())
        }
    }

    fn update_stats(&self, update: impl FnOnce(&mut crate::config::ShutdownStats)) {
        let mut document = self.store.load();
        update(document.stats_mut());
        if let Err(e) = self.store.save(&document) {
            warn!("cannot record shutdown stats: {e}");
        }
    }
}

fn snapshot(state: &SchedulerState) -> Vec<ScheduledTimer> {
    let mut timers: Vec<ScheduledTimer> = state.timers.iter().map(|s| s.timer.clone()).collect();
    timers.sort_by_key(|t| t.fires_at);
    timers
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::{ConfigDocument, MemoryConfigStore, ShutdownRule};
    use crate::test_utils::RecordingShutdown;
    use chrono::{Datelike, TimeZone};
    use tokio::sync::broadcast;

    fn scheduler_with(
        rules: Vec<ShutdownRule>,
        executor: Arc<RecordingShutdown>,
    ) -> (Arc<ShutdownScheduler>, Arc<MemoryConfigStore>, broadcast::Receiver<EngineEvent>) {
        scheduler_with_countdown(rules, executor, Duration::from_secs(60))
    }

    fn scheduler_with_countdown(
        rules: Vec<ShutdownRule>,
        executor: Arc<RecordingShutdown>,
        countdown: Duration,
    ) -> (Arc<ShutdownScheduler>, Arc<MemoryConfigStore>, broadcast::Receiver<EngineEvent>) {
        let store = Arc::new(MemoryConfigStore::new(ConfigDocument {
            shutdown_rules: rules,
            ..Default::default()
        }));
        let (tx, rx) = broadcast::channel(64);
        let scheduler = Arc::new(
            ShutdownScheduler::new(store.clone(), executor, tx).with_countdown(countdown),
        );
        (scheduler, store, rx)
    }

    fn wednesday_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).earliest().unwrap()
    }

    #[tokio::test]
    async fn no_active_rules_means_no_timers() {
        let mut inactive = ShutdownRule::new("22:00:00", [1, 2]);
        inactive.active = false;
        let (scheduler, _store, _rx) =
            scheduler_with(vec![inactive], Arc::new(RecordingShutdown::new()));

        assert_eq!(scheduler.rebuild(), 0);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[tokio::test]
    async fn one_timer_per_rule_and_weekday() {
        let (scheduler, _store, mut rx) = scheduler_with(
            vec![
                ShutdownRule::new("22:00:00", [1, 3, 5]),
                ShutdownRule::new("08:00", [3]),
            ],
            Arc::new(RecordingShutdown::new()),
        );

        assert_eq!(scheduler.rebuild_at(wednesday_noon()), 4);
        assert_eq!(scheduler.phase(), SchedulerPhase::Scheduled(4));

        let pending = scheduler.pending();
        assert!(pending.windows(2).all(|w| w[0].fires_at <= w[1].fires_at));
        // Wednesday 22:00 is still ahead today; Wednesday 08:00 is next week.
        let days_until = |t: &ScheduledTimer| (t.fires_at.date_naive() - wednesday_noon().date_naive()).num_days();
        assert_eq!(pending[0].weekday, 3);
        assert_eq!(days_until(&pending[0]), 0);
        assert_eq!(pending.last().unwrap().rule_index, 1);
        assert_eq!(days_until(pending.last().unwrap()), 7);

        match rx.recv().await.unwrap() {
            EngineEvent::ScheduleRebuilt { pending } => assert_eq!(pending.len(), 4),
            other => panic!("unexpected event {other:?}"),
        }
        scheduler.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn timers_wait_relative_to_the_given_now() {
        let executor = Arc::new(RecordingShutdown::new());
        let (scheduler, _store, _rx) = scheduler_with(
            vec![
                ShutdownRule::new("12:00:02", [3]),
                ShutdownRule::new("22:00:00", [3]),
            ],
            executor.clone(),
        );

        assert_eq!(scheduler.rebuild_at(wednesday_noon()), 2);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.phase(), SchedulerPhase::Scheduled(2));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scheduler.phase(), SchedulerPhase::Firing);
        let pending = scheduler.pending();
        assert_eq!(pending[0].fires_at.format("%H:%M").to_string(), "22:00");
        assert_eq!(
            (pending[1].fires_at.date_naive() - wednesday_noon().date_naive()).num_days(),
            7
        );

        scheduler.cancel_pending_shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(executor.executed(), 0);
        scheduler.cancel_all();
    }

    #[tokio::test]
    async fn rebuild_is_idempotent_and_replaces_timers() {
        let (scheduler, store, _rx) = scheduler_with(
            vec![ShutdownRule::new("22:00:00", [1, 2])],
            Arc::new(RecordingShutdown::new()),
        );
        assert_eq!(scheduler.rebuild(), 2);
        assert_eq!(scheduler.rebuild(), 2);
        assert_eq!(scheduler.pending().len(), 2);

        let mut doc = store.load();
        doc.shutdown_rules.clear();
        store.save(&doc).unwrap();
        assert_eq!(scheduler.rebuild(), 0);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_runs_shutdown_and_records_stats() {
        let executor = Arc::new(RecordingShutdown::new());
        let (scheduler, store, mut rx) = scheduler_with(Vec::new(), executor.clone());

        assert!(scheduler.trigger_now());
        assert!(!scheduler.trigger_now());
        assert_eq!(scheduler.phase(), SchedulerPhase::Firing);

        match rx.recv().await.unwrap() {
            EngineEvent::ShutdownCountdownStarted { countdown_secs, .. } => {
                assert_eq!(countdown_secs, 60)
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::ShutdownExecuted));

        assert_eq!(executor.executed(), 1);
        let stats = store.load().shutdown_stats.unwrap();
        assert_eq!(stats.total_scheduled, 1);
        assert_eq!(stats.total_canceled, 0);
        assert!(stats.last_shutdown.is_some());
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_never_shuts_down() {
        let executor = Arc::new(RecordingShutdown::new());
        let (scheduler, store, mut rx) = scheduler_with(Vec::new(), executor.clone());

        scheduler.trigger_now();
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::ShutdownCountdownStarted { .. }
        ));
        tokio::time::sleep(Duration::from_secs(10)).await;
        scheduler.cancel_pending_shutdown().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::ShutdownCancelled));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(executor.executed(), 0);
        assert_eq!(executor.cancelled(), 0);
        assert_eq!(store.load().shutdown_stats.unwrap().total_canceled, 1);
    }

    #[tokio::test]
    async fn cancel_without_countdown_revokes_os_shutdown() {
        let executor = Arc::new(RecordingShutdown::new());
        let (scheduler, _store, _rx) = scheduler_with(Vec::new(), executor.clone());
        scheduler.cancel_pending_shutdown().await.unwrap();
        assert_eq!(executor.cancelled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_shutdown_is_reported_not_retried() {
        let executor = Arc::new(RecordingShutdown::failing());
        let (scheduler, store, mut rx) = scheduler_with(Vec::new(), executor.clone());

        scheduler.trigger_now();
        let _started = rx.recv().await.unwrap();
        match rx.recv().await.unwrap() {
            EngineEvent::ShutdownFailed { error } => assert!(error.contains("permission denied")),
            other => panic!("unexpected event {other:?}"),
        }
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(executor.executed(), 1);
        assert!(store.load().shutdown_stats.unwrap().last_shutdown.is_none());
    }

    #[tokio::test]
    async fn armed_timer_fires_and_rearms_for_next_week() {
        let executor = Arc::new(RecordingShutdown::new());
        let target = Local::now() + chrono::Duration::seconds(2);
        let rule = ShutdownRule::new(
            target.format("%H:%M:%S").to_string(),
            [target.weekday().num_days_from_sunday() as u8],
        );
        let (scheduler, _store, mut rx) =
            scheduler_with_countdown(vec![rule], executor.clone(), Duration::from_millis(50));

        assert_eq!(scheduler.rebuild(), 1);
        let first = scheduler.pending()[0].fires_at;

        let executed = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let EngineEvent::ShutdownExecuted = rx.recv().await.unwrap() {
                    break;
                }
            }
        })
        .await;
        assert!(executed.is_ok(), "timer never fired");
        assert_eq!(executor.executed(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let pending = scheduler.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!((pending[0].fires_at - first).num_days(), 7);
        scheduler.cancel_all();
    }

    #[tokio::test]
    async fn stale_generation_never_fires() {
        let executor = Arc::new(RecordingShutdown::new());
        let target = Local::now() + chrono::Duration::seconds(1);
        let rule = ShutdownRule::new(
            target.format("%H:%M:%S").to_string(),
            [target.weekday().num_days_from_sunday() as u8],
        );
        let (scheduler, _store, _rx) = scheduler_with(vec![rule], executor.clone());

        assert_eq!(scheduler.rebuild(), 1);
        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(executor.executed(), 0);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }
}
