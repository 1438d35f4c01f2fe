//! Long polling acquisition strategy.
//!
//! The [`Poller`] repeatedly calls `getUpdates` with an advancing offset and
//! pushes every received update onto the queue in ascending `update_id`
//! order. Fetch errors are logged and retried after a back-off; nothing but
//! cancellation or a closed queue ends the loop.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ferrogram_core::{ApiResult, BoxedBotApi, GetUpdatesParams, PushError, UpdateSender};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Long polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Long poll timeout passed to `getUpdates`, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,
    /// Batch size limit, 1-100. `None` uses the remote default.
    #[serde(default)]
    pub limit: Option<u8>,
    /// Update kinds to receive; empty uses the remote default.
    #[serde(default)]
    pub allowed_updates: Vec<String>,
    /// Drop updates queued on the remote while the bot was offline.
    #[serde(default)]
    pub drop_pending_updates: bool,
    /// Wait after a failed fetch, in milliseconds.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Wait after an empty batch, in milliseconds.
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
}

fn default_timeout_secs() -> u32 {
    3600
}

fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_idle_delay_ms() -> u64 {
    200
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            limit: None,
            allowed_updates: Vec::new(),
            drop_pending_updates: false,
            error_backoff_ms: default_error_backoff_ms(),
            idle_delay_ms: default_idle_delay_ms(),
        }
    }
}

impl PollingConfig {
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}

// ─── Poller ───────────────────────────────────────────────────────────────────

/// Counters collected by one [`Poller::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollingReport {
    /// `getUpdates` calls that returned, successfully or not.
    pub fetches: u64,
    /// Failed fetches.
    pub errors: u64,
    /// Updates pushed onto the queue.
    pub delivered: u64,
    /// Offset the next fetch would have used.
    pub next_offset: i64,
}

/// The long polling loop.
pub struct Poller {
    api: BoxedBotApi,
    config: PollingConfig,
    next_offset: AtomicI64,
    polling: AtomicBool,
}

impl Poller {
    pub fn new(api: BoxedBotApi, config: PollingConfig) -> Self {
        Self {
            api,
            config,
            next_offset: AtomicI64::new(0),
            polling: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Offset the next `getUpdates` call will use.
    pub fn next_offset(&self) -> i64 {
        self.next_offset.load(Ordering::Acquire)
    }

    /// Returns true while [`run`](Self::run) is looping.
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    fn params(&self) -> GetUpdatesParams {
        GetUpdatesParams::new(self.next_offset())
            .with_timeout(self.config.timeout_secs)
            .with_limit(self.config.limit)
            .with_allowed_updates(self.config.allowed_updates.clone())
    }

    /// Validates the fetch parameters and removes any webhook registration,
    /// since the remote refuses `getUpdates` while a webhook is set.
    pub async fn prepare(&self) -> ApiResult<()> {
        self.params().validate()?;
        let description = self
            .api
            .delete_webhook(self.config.drop_pending_updates)
            .await?;
        info!(
            drop_pending_updates = self.config.drop_pending_updates,
            %description,
            "Webhook cleared for polling"
        );
        Ok(())
    }

    fn advance(&self, update_id: i64) {
        self.next_offset
            .fetch_max(update_id.saturating_add(1), Ordering::AcqRel);
    }

    /// Polls until `shutdown` fires or the queue closes.
    ///
    /// Each batch is sorted by `update_id` and the offset is advanced past
    /// an update before it is pushed, so a given update is fetched at most
    /// once. No fetch is started after `shutdown` fires.
    pub async fn run(&self, sender: UpdateSender, shutdown: CancellationToken) -> PollingReport {
        self.polling.store(true, Ordering::Release);
        info!(
            offset = self.next_offset(),
            timeout_secs = self.config.timeout_secs,
            "Polling started"
        );

        let mut report = PollingReport::default();
        'poll: while !shutdown.is_cancelled() {
            let params = self.params();
            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                fetched = self.api.get_updates(&params) => fetched,
            };
            report.fetches += 1;

            let mut updates = match fetched {
                Ok(updates) => updates,
                Err(error) => {
                    report.errors += 1;
                    let delay = error.retry_after().unwrap_or(self.config.error_backoff());
                    warn!(offset = params.offset, %error, ?delay, "Failed to fetch updates");
                    if !sleep_or_cancel(delay, &shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if updates.is_empty() {
                if !sleep_or_cancel(self.config.idle_delay(), &shutdown).await {
                    break;
                }
                continue;
            }

            updates.sort_by_key(|update| update.update_id);
            debug!(count = updates.len(), offset = params.offset, "Fetched updates");

            for update in updates {
                let update_id = update.update_id;
                self.advance(update_id);
                match sender.push(update, &shutdown).await {
                    Ok(()) => report.delivered += 1,
                    Err(PushError::Cancelled) => break 'poll,
                    Err(error) => {
                        warn!(update_id, %error, "Update queue unavailable, stopping polling");
                        break 'poll;
                    }
                }
            }
        }

        self.polling.store(false, Ordering::Release);
        report.next_offset = self.next_offset();
        info!(
            fetches = report.fetches,
            delivered = report.delivered,
            offset = report.next_offset,
            "Polling stopped"
        );
        report
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("next_offset", &self.next_offset())
            .field("polling", &self.is_polling())
            .field("config", &self.config)
            .finish()
    }
}

/// Sleeps for `delay` unless `shutdown` fires first. Returns false on shutdown.
async fn sleep_or_cancel(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ferrogram_core::{ApiError, BotApi, Update, WebhookInfo, WebhookOptions, update_queue};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio_test::assert_ok;

    /// Serves scripted `getUpdates` results, then blocks like an idle long poll.
    #[derive(Default)]
    struct ScriptedApi {
        batches: Mutex<VecDeque<ApiResult<Vec<Update>>>>,
        offsets: Mutex<Vec<i64>>,
        deleted: Mutex<Vec<bool>>,
    }

    impl ScriptedApi {
        fn new(batches: Vec<ApiResult<Vec<Update>>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl BotApi for ScriptedApi {
        async fn get_updates(&self, params: &GetUpdatesParams) -> ApiResult<Vec<Update>> {
            self.offsets.lock().push(params.offset);
            let next = self.batches.lock().pop_front();
            match next {
                Some(batch) => batch,
                None => std::future::pending().await,
            }
        }

        async fn set_webhook(&self, _options: &WebhookOptions) -> ApiResult<String> {
            Ok("Webhook was set".into())
        }

        async fn delete_webhook(&self, drop_pending_updates: bool) -> ApiResult<String> {
            self.deleted.lock().push(drop_pending_updates);
            Ok("Webhook was deleted".into())
        }

        async fn get_webhook_info(&self) -> ApiResult<WebhookInfo> {
            Ok(WebhookInfo::default())
        }
    }

    fn batch(ids: &[i64]) -> ApiResult<Vec<Update>> {
        Ok(ids
            .iter()
            .map(|id| Update::text_message(*id, 1, format!("u{id}")))
            .collect())
    }

    #[tokio::test]
    async fn prepare_clears_webhook() {
        let api = ScriptedApi::new(vec![]);
        let config = PollingConfig {
            drop_pending_updates: true,
            ..Default::default()
        };
        let poller = Poller::new(api.clone(), config);
        assert_ok!(poller.prepare().await);
        assert_eq!(*api.deleted.lock(), vec![true]);
    }

    #[tokio::test]
    async fn prepare_rejects_bad_limit() {
        let api = ScriptedApi::new(vec![]);
        let config = PollingConfig {
            limit: Some(0),
            ..Default::default()
        };
        let poller = Poller::new(api.clone(), config);
        assert!(matches!(poller.prepare().await, Err(ApiError::InvalidRequest(_))));
        assert!(api.deleted.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn offset_advances_past_highest_id_in_order() {
        let api = ScriptedApi::new(vec![batch(&[12, 10, 11]), batch(&[13])]);
        let poller = Arc::new(Poller::new(api.clone(), PollingConfig::default()));
        let (tx, mut rx) = update_queue(16);
        let token = CancellationToken::new();

        let task = {
            let (poller, token) = (Arc::clone(&poller), token.clone());
            tokio::spawn(async move { poller.run(tx, token).await })
        };

        let mut received = Vec::new();
        for _ in 0..4 {
            received.push(rx.recv().await.unwrap().update_id);
        }
        assert_eq!(received, vec![10, 11, 12, 13]);

        token.cancel();
        let report = task.await.unwrap();
        assert_eq!(report.delivered, 4);
        assert_eq!(report.next_offset, 14);
        // A third fetch at offset 14 may or may not have started before the cancel.
        assert_eq!(api.offsets.lock()[..2], [0, 13]);
        assert!(!poller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn errors_back_off_and_retry() {
        let api = ScriptedApi::new(vec![
            Err(ApiError::Transport("connection reset".into())),
            Err(ApiError::Api {
                code: 429,
                description: "Too Many Requests".into(),
                retry_after: Some(5),
            }),
            batch(&[1]),
        ]);
        let poller = Poller::new(api.clone(), PollingConfig::default());
        let (tx, mut rx) = update_queue(4);
        let token = CancellationToken::new();

        let started = tokio::time::Instant::now();
        let run = poller.run(tx, token.clone());
        tokio::pin!(run);

        let first = tokio::select! {
            _ = &mut run => panic!("poller exited early"),
            update = rx.recv() => update.unwrap(),
        };
        assert_eq!(first.update_id, 1);
        // 1s default back-off, then the 5s the remote asked for.
        assert!(started.elapsed() >= Duration::from_secs(6));

        token.cancel();
        let report = run.await;
        assert_eq!(report.errors, 2);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batches_wait_idle_delay() {
        let api = ScriptedApi::new(vec![batch(&[]), batch(&[]), batch(&[5])]);
        let poller = Poller::new(api.clone(), PollingConfig::default());
        let (tx, mut rx) = update_queue(4);
        let token = CancellationToken::new();

        let started = tokio::time::Instant::now();
        let run = poller.run(tx, token.clone());
        tokio::pin!(run);
        let update = tokio::select! {
            _ = &mut run => panic!("poller exited early"),
            update = rx.recv() => update.unwrap(),
        };
        assert_eq!(update.update_id, 5);
        assert!(started.elapsed() >= Duration::from_millis(400));

        token.cancel();
        assert_eq!(run.await.fetches, 3);
    }

    #[tokio::test]
    async fn cancelled_token_means_no_fetch() {
        let api = ScriptedApi::new(vec![batch(&[1])]);
        let poller = Poller::new(api.clone(), PollingConfig::default());
        let (tx, _rx) = update_queue(4);
        let token = CancellationToken::new();
        token.cancel();

        let report = poller.run(tx, token).await;
        assert_eq!(report.fetches, 0);
        assert!(api.offsets.lock().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_blocked_push() {
        let api = ScriptedApi::new(vec![batch(&[1, 2, 3])]);
        let poller = Poller::new(api.clone(), PollingConfig::default());
        let (tx, _rx) = update_queue(1);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let report = tokio::time::timeout(Duration::from_secs(1), poller.run(tx, token))
            .await
            .expect("poller should stop promptly");
        assert_eq!(report.delivered, 1);
        // The blocked update was already consumed from the remote's view.
        assert_eq!(report.next_offset, 3);
    }
}
