//! Handler trait and outcome reporting.
//!
//! Any `Fn(Arc<T>) -> impl Future` is a handler for payload `T`, provided the
//! future resolves to a [`HandlerOutcome`]: either `()` or a
//! `Result<(), E: Display>`.
//!
//! ```rust,ignore
//! async fn echo(message: Arc<Message>) {
//!     println!("{:?}", message.text);
//! }
//!
//! async fn checked(message: Arc<Message>) -> Result<(), String> {
//!     if message.text.is_none() {
//!         return Err("no text".into());
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::error;

// ============================================================================
// Outcome
// ============================================================================

/// What a handler's future may resolve to.
///
/// Failures are logged at `error` level inside the update span, which carries
/// the update id and kind.
pub trait HandlerOutcome: Send + 'static {
    /// Returns a description of the failure, if the handler failed.
    fn into_failure(self) -> Option<String>;
}

impl HandlerOutcome for () {
    fn into_failure(self) -> Option<String> {
        None
    }
}

impl<E> HandlerOutcome for Result<(), E>
where
    E: Display + Send + 'static,
{
    fn into_failure(self) -> Option<String> {
        self.err().map(|err| err.to_string())
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// A callback for payloads of type `T`.
pub trait Handler<T>: Send + Sync + 'static {
    /// Invokes the callback. The returned future reports its own outcome.
    fn call(&self, payload: Arc<T>) -> BoxFuture<'static, ()>;
}

impl<T, F, Fut> Handler<T> for F
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerOutcome,
{
    fn call(&self, payload: Arc<T>) -> BoxFuture<'static, ()> {
        let fut = self(payload);
        Box::pin(async move {
            if let Some(failure) = fut.await.into_failure() {
                error!(error = %failure, "Handler failed");
            }
        })
    }
}

/// A type-erased handler as stored in the registry.
pub type BoxedHandler<T> = Arc<dyn Handler<T>>;

/// Boxes a handler.
pub fn into_handler<T, H>(handler: H) -> BoxedHandler<T>
where
    T: Send + Sync + 'static,
    H: Handler<T>,
{
    Arc::new(handler)
}
