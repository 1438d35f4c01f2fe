//! Bounded FIFO between acquisition strategies and the dispatch loop.
//!
//! Producers block while the queue is full, which propagates backpressure to
//! the remote: the polling loop stops fetching and the webhook listener answers
//! 503 so the remote redelivers later.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::PushError;
use crate::types::Update;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Creates a bounded update queue. A capacity of zero is raised to one.
pub fn update_queue(capacity: usize) -> (UpdateSender, UpdateReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UpdateSender { tx }, UpdateReceiver { rx })
}

/// Producer half of the update queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<Update>,
}

impl UpdateSender {
    /// Enqueues `update`, waiting as long as the queue is full.
    ///
    /// Gives up with [`PushError::Cancelled`] as soon as `shutdown` fires.
    pub async fn push(&self, update: Update, shutdown: &CancellationToken) -> Result<(), PushError> {
        if shutdown.is_cancelled() {
            return Err(PushError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(PushError::Cancelled),
            sent = self.tx.send(update) => sent.map_err(|_| PushError::Closed),
        }
    }

    /// Enqueues `update`, waiting at most `timeout` for capacity.
    pub async fn push_timeout(
        &self,
        update: Update,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Result<(), PushError> {
        if shutdown.is_cancelled() {
            return Err(PushError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(PushError::Cancelled),
            sent = tokio::time::timeout(timeout, self.tx.send(update)) => match sent {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(PushError::Closed),
                Err(_) => Err(PushError::Timeout),
            },
        }
    }

    /// Remaining free slots.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    /// Returns true once the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the update queue.
#[derive(Debug)]
pub struct UpdateReceiver {
    rx: mpsc::Receiver<Update>,
}

impl UpdateReceiver {
    /// Pops the oldest update. Returns `None` once every sender is gone and
    /// the queue is empty.
    pub async fn recv(&mut self) -> Option<Update> {
        self.rx.recv().await
    }

    /// Number of queued updates.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Stops accepting new updates; already queued ones can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn fifo_order() {
        let (tx, mut rx) = update_queue(4);
        let token = CancellationToken::new();
        for id in 1..=3 {
            assert_ok!(tx.push(Update::text_message(id, 1, "x"), &token).await);
        }
        assert_eq!(rx.len(), 3);
        for id in 1..=3 {
            assert_eq!(rx.recv().await.map(|u| u.update_id), Some(id));
        }
        assert!(rx.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn push_timeout_on_full_queue() {
        let (tx, _rx) = update_queue(1);
        let token = CancellationToken::new();
        assert_ok!(tx.push(Update::text_message(1, 1, "a"), &token).await);

        let result = tx
            .push_timeout(Update::text_message(2, 1, "b"), Duration::from_secs(5), &token)
            .await;
        assert_eq!(result, Err(PushError::Timeout));
    }

    #[tokio::test]
    async fn push_cancelled_while_full() {
        let (tx, _rx) = update_queue(1);
        let token = CancellationToken::new();
        assert_ok!(tx.push(Update::text_message(1, 1, "a"), &token).await);

        let canceller = token.clone();
        tokio::spawn(async move { canceller.cancel() });
        let result = tx.push(Update::text_message(2, 1, "b"), &token).await;
        assert_eq!(result, Err(PushError::Cancelled));
    }

    #[tokio::test]
    async fn push_after_cancel_is_rejected_even_with_room() {
        let (tx, rx) = update_queue(8);
        let token = CancellationToken::new();
        token.cancel();

        assert_err!(tx.push(Update::text_message(1, 1, "a"), &token).await);
        assert_eq!(rx.len(), 0);
    }

    #[tokio::test]
    async fn push_to_closed_queue() {
        let (tx, rx) = update_queue(2);
        drop(rx);
        let token = CancellationToken::new();

        assert!(tx.is_closed());
        let result = tx
            .push_timeout(Update::text_message(1, 1, "a"), Duration::from_secs(1), &token)
            .await;
        assert_eq!(result, Err(PushError::Closed));
    }

    #[tokio::test]
    async fn recv_returns_none_after_senders_drop() {
        let (tx, mut rx) = update_queue(2);
        let token = CancellationToken::new();
        assert_ok!(tx.push(Update::text_message(9, 1, "last"), &token).await);
        drop(tx);

        assert_eq!(rx.recv().await.map(|u| u.update_id), Some(9));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn zero_capacity_is_raised() {
        let (tx, _rx) = update_queue(0);
        assert_eq!(tx.capacity(), 1);
    }
}
