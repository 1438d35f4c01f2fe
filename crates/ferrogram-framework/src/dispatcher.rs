//! The dispatch loop.
//!
//! [`Dispatcher::run`] pulls updates from the queue one at a time, routes each
//! through the [`HandlerRegistry`] and spawns every matching handler as its own
//! task. Handler tasks are fire-and-forget: the loop never waits for them
//! except to respect the in-flight cap and, on shutdown, the drain timeout.
//!
//! ```text
//!   Idle ──run()──▶ Running ──cancel / queue closed──▶ Draining ──▶ Stopped
//! ```
//!
//! No ordering is guaranteed between the side effects of different handler
//! tasks, even for handlers of the same update.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use ferrogram_core::{DEFAULT_QUEUE_CAPACITY, Update, UpdateKind, UpdateReceiver};

use crate::registry::HandlerRegistry;

// ============================================================================
// Configuration
// ============================================================================

/// Dispatch loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Capacity of the update queue feeding the loop.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum number of handler tasks running at once.
    #[serde(default = "default_max_concurrent_handlers")]
    pub max_concurrent_handlers: usize,
    /// How long shutdown waits for in-flight handlers.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_max_concurrent_handlers() -> usize {
    256
}

fn default_drain_timeout_secs() -> u64 {
    3
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_concurrent_handlers: default_max_concurrent_handlers(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl DispatcherConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchState {
    /// Constructed, `run` not called yet.
    Idle,
    /// Pulling and routing updates.
    Running,
    /// No longer pulling; waiting for in-flight handlers.
    Draining,
    /// Done. Handlers still running past the drain timeout are abandoned.
    Stopped,
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counters collected by one [`Dispatcher::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Updates pulled from the queue.
    pub received: u64,
    /// Handler tasks spawned.
    pub spawned: u64,
    /// Updates with no decodable variant.
    pub unroutable: u64,
    /// Handler tasks still running when the drain timeout elapsed.
    pub abandoned: usize,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes updates to handlers and tracks the spawned handler tasks.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    config: DispatcherConfig,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    state: watch::Sender<DispatchState>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    pub fn new(registry: Arc<HandlerRegistry>, config: DispatcherConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_handlers.max(1)));
        Self {
            registry,
            config,
            tracker: TaskTracker::new(),
            permits,
            state: watch::Sender::new(DispatchState::Idle),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DispatchState {
        *self.state.borrow()
    }

    /// Watches lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<DispatchState> {
        self.state.subscribe()
    }

    /// Number of handler tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Routes one update and spawns its handlers.
    ///
    /// Waits for in-flight capacity when the cap is reached. Returns the
    /// number of handler tasks spawned.
    pub async fn dispatch(&self, update: Update) -> usize {
        self.route_and_spawn(update, &CancellationToken::new()).await
    }

    /// Runs the loop until `shutdown` fires or every producer is gone, then
    /// drains in-flight handlers for at most the drain timeout.
    ///
    /// Only the first call runs; later calls return an empty report.
    pub async fn run(&self, mut updates: UpdateReceiver, shutdown: CancellationToken) -> DispatchReport {
        let started = self.state.send_if_modified(|state| {
            if *state == DispatchState::Idle {
                *state = DispatchState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            warn!(state = %self.state(), "Dispatcher already ran, ignoring");
            return DispatchReport::default();
        }
        info!(
            max_concurrent_handlers = self.config.max_concurrent_handlers,
            "Dispatcher running"
        );

        let mut report = DispatchReport::default();
        loop {
            let update = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = updates.recv() => match next {
                    Some(update) => update,
                    None => {
                        debug!("Update queue closed");
                        break;
                    }
                },
            };

            report.received += 1;
            if update.kind.is_unknown() {
                report.unroutable += 1;
            }
            report.spawned += self.route_and_spawn(update, &shutdown).await as u64;
        }

        self.state.send_replace(DispatchState::Draining);
        report.abandoned = self.drain().await;
        self.state.send_replace(DispatchState::Stopped);
        info!(
            received = report.received,
            spawned = report.spawned,
            abandoned = report.abandoned,
            "Dispatcher stopped"
        );
        report
    }

    async fn drain(&self) -> usize {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending == 0 {
            return 0;
        }

        let timeout = self.config.drain_timeout();
        debug!(pending, ?timeout, "Draining in-flight handlers");
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => 0,
            Err(_) => {
                let abandoned = self.tracker.len();
                warn!(abandoned, ?timeout, "Drain timeout elapsed, abandoning handlers");
                abandoned
            }
        }
    }

    async fn route_and_spawn(&self, update: Update, shutdown: &CancellationToken) -> usize {
        let Update { update_id, kind } = update;

        let routed = std::panic::catch_unwind(AssertUnwindSafe(|| self.registry.route(&kind)));
        let jobs = match routed {
            Ok(Some(jobs)) => jobs,
            Err(panic) => {
                error!(
                    update_id,
                    kind = kind.name(),
                    panic_msg = %panic_message(&*panic),
                    "Filter panicked, dropping update"
                );
                return 0;
            }
            Ok(None) => {
                if let UpdateKind::Unknown { fields } = &kind {
                    warn!(update_id, ?fields, "Dropping update with no known kind");
                }
                return 0;
            }
        };
        if jobs.is_empty() {
            debug!(update_id, kind = kind.name(), "No handler matched");
            return 0;
        }

        let span = info_span!("update", update_id, kind = kind.name());
        let mut spawned = 0;
        for job in jobs {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(update_id, "Shutdown while waiting for handler capacity");
                    break;
                }
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            self.tracker.spawn(
                async move {
                    if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
                        error!(panic_msg = %panic_message(&*panic), "Handler panicked");
                    }
                    drop(permit);
                }
                .instrument(span.clone()),
            );
            spawned += 1;
        }
        spawned
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, text_equals};
    use ferrogram_core::{CallbackQuery, CancellationToken, Message, update_queue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio_test::assert_ok;

    fn counter_handler(
        hits: &Arc<AtomicUsize>,
    ) -> impl Fn(Arc<Message>) -> std::future::Ready<()> + Send + Sync + 'static {
        let hits = Arc::clone(hits);
        move |_message: Arc<Message>| {
            hits.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    fn dispatcher(registry: HandlerRegistry, config: DispatcherConfig) -> Dispatcher {
        Dispatcher::new(Arc::new(registry), config)
    }

    #[tokio::test]
    async fn dispatch_spawns_matching_handlers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::new();
        registry.on_message(vec![text_equals("a")], counter_handler(&hits));
        registry.on_message(vec![], counter_handler(&hits));
        let dispatcher = dispatcher(registry, DispatcherConfig::default());

        assert_eq!(dispatcher.dispatch(Update::text_message(1, 1, "a")).await, 2);
        assert_eq!(dispatcher.dispatch(Update::text_message(2, 1, "b")).await, 1);

        let unknown = Update::new(3, UpdateKind::Unknown { fields: vec![] });
        assert_eq!(dispatcher.dispatch(unknown).await, 0);

        let query = Update::new(4, UpdateKind::CallbackQuery(Arc::new(CallbackQuery::default())));
        assert_eq!(dispatcher.dispatch(query).await, 0);

        dispatcher.tracker.close();
        dispatcher.tracker.wait().await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_processes_queue_until_senders_drop() {
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::new();
        registry.on_message(vec![], counter_handler(&hits));
        let dispatcher = dispatcher(registry, DispatcherConfig::default());

        let (tx, rx) = update_queue(8);
        let token = CancellationToken::new();
        for id in 1..=5 {
            assert_ok!(tx.push(Update::text_message(id, 1, "x"), &token).await);
        }
        tx.push(Update::new(6, UpdateKind::Unknown { fields: vec![] }), &token)
            .await
            .unwrap();
        drop(tx);

        let report = dispatcher.run(rx, token).await;
        assert_eq!(report.received, 6);
        assert_eq!(report.spawned, 5);
        assert_eq!(report.unroutable, 1);
        assert_eq!(report.abandoned, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(dispatcher.state(), DispatchState::Stopped);
    }

    #[tokio::test]
    async fn state_transitions_are_observable() {
        let dispatcher = Arc::new(dispatcher(HandlerRegistry::new(), DispatcherConfig::default()));
        let mut states = dispatcher.subscribe();
        assert_eq!(*states.borrow(), DispatchState::Idle);

        let (_tx, rx) = update_queue(1);
        let token = CancellationToken::new();
        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            let token = token.clone();
            tokio::spawn(async move { dispatcher.run(rx, token).await })
        };

        states
            .wait_for(|state| *state == DispatchState::Running)
            .await
            .unwrap();
        token.cancel();
        task.await.unwrap();
        assert_eq!(dispatcher.state(), DispatchState::Stopped);

        let (_tx, rx) = update_queue(1);
        let again = dispatcher.run(rx, CancellationToken::new()).await;
        assert_eq!(again, DispatchReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_abandons_stuck_handlers() {
        let registry = HandlerRegistry::new();
        registry.on_message(vec![], |_: Arc<Message>| std::future::pending::<()>());
        let config = DispatcherConfig {
            drain_timeout_secs: 3,
            ..Default::default()
        };
        let dispatcher = dispatcher(registry, config);

        let (tx, rx) = update_queue(4);
        let token = CancellationToken::new();
        assert_ok!(tx.push(Update::text_message(1, 1, "x"), &token).await);
        drop(tx);

        let started = tokio::time::Instant::now();
        let report = dispatcher.run(rx, token).await;
        assert_eq!(report.abandoned, 1);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_the_loop() {
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::new();
        registry.on_message(vec![text_equals("boom")], |_: Arc<Message>| {
            let parsed: i64 = "not a number".parse().unwrap();
            async move { assert_eq!(parsed, 0) }
        });
        registry.on_message(vec![text_equals("late")], |msg: Arc<Message>| async move {
            assert!(msg.text.is_none(), "late failure");
        });
        registry.on_message(vec![], counter_handler(&hits));
        let dispatcher = dispatcher(registry, DispatcherConfig::default());

        let (tx, rx) = update_queue(8);
        let token = CancellationToken::new();
        assert_ok!(tx.push(Update::text_message(1, 1, "boom"), &token).await);
        assert_ok!(tx.push(Update::text_message(2, 1, "late"), &token).await);
        assert_ok!(tx.push(Update::text_message(3, 1, "fine"), &token).await);
        drop(tx);

        let report = dispatcher.run(rx, token).await;
        assert_eq!(report.received, 3);
        assert_eq!(report.abandoned, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.state(), DispatchState::Stopped);
    }

    #[tokio::test]
    async fn panicking_filter_drops_only_its_update() {
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::new();
        let exploding = Filter::labeled("exploding", |msg: &Message| {
            if msg.text.as_deref() == Some("boom") {
                panic!("filter failure");
            }
            true
        });
        registry.on_message(vec![exploding], counter_handler(&hits));
        let dispatcher = dispatcher(registry, DispatcherConfig::default());

        let (tx, rx) = update_queue(8);
        let token = CancellationToken::new();
        assert_ok!(tx.push(Update::text_message(1, 1, "boom"), &token).await);
        assert_ok!(tx.push(Update::text_message(2, 1, "fine"), &token).await);
        drop(tx);

        let report = dispatcher.run(rx, token).await;
        assert_eq!(report.received, 2);
        assert_eq!(report.spawned, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_pulling() {
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::new();
        registry.on_message(vec![], counter_handler(&hits));
        let dispatcher = dispatcher(registry, DispatcherConfig::default());

        let (tx, rx) = update_queue(4);
        let token = CancellationToken::new();
        assert_ok!(tx.push(Update::text_message(1, 1, "x"), &token).await);
        token.cancel();

        let report = dispatcher.run(rx, token).await;
        assert_eq!(report.received, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrency_cap_limits_in_flight_handlers() {
        let gate = Arc::new(Notify::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let registry = HandlerRegistry::new();
        {
            let (gate, running, peak) = (Arc::clone(&gate), Arc::clone(&running), Arc::clone(&peak));
            registry.on_message(vec![], move |_: Arc<Message>| {
                let (gate, running, peak) = (Arc::clone(&gate), Arc::clone(&running), Arc::clone(&peak));
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    gate.notified().await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }
        let config = DispatcherConfig {
            max_concurrent_handlers: 2,
            ..Default::default()
        };
        let dispatcher = Arc::new(dispatcher(registry, config));

        let (tx, rx) = update_queue(8);
        let token = CancellationToken::new();
        for id in 1..=4 {
            assert_ok!(tx.push(Update::text_message(id, 1, "x"), &token).await);
        }
        drop(tx);

        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(rx, token).await })
        };

        while !task.is_finished() {
            tokio::task::yield_now().await;
            gate.notify_waiters();
        }
        let report = task.await.unwrap();
        assert_eq!(report.spawned, 4);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
