//! Bot lifecycle orchestration.
//!
//! [`BotRuntime`] owns one bot: its API client, handler registry, update
//! queue and dispatcher. Starting a strategy spawns a producer (poll loop or
//! webhook listener) and the dispatch loop; [`BotRuntime::shutdown`] is the
//! single way to stop them.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ferrogram_runtime::BotRuntime;
//!
//! let runtime = BotRuntime::builder().config_file("ferrogram.toml").build()?;
//! runtime.on_command("/start", |msg: Arc<Message>| async move { /* ... */ });
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ferrogram_core::{
    ApiResult, BoxedBotApi, BusinessConnection, BusinessMessagesDeleted, CallbackQuery,
    ChatBoostRemoved, ChatBoostUpdated, ChatJoinRequest, ChatMemberUpdated, ChosenInlineResult,
    InlineQuery, Message, MessageReactionCountUpdated, MessageReactionUpdated, PaidMediaPurchased,
    Poll, PollAnswer, PreCheckoutQuery, ShippingQuery, UpdateReceiver, UpdateSender, update_queue,
};
use ferrogram_framework::{DispatchState, Dispatcher, Filter, Handler, HandlerRegistry};
use ferrogram_transport::{HttpBotApi, Poller, WebhookConfig, WebhookServer};

use crate::config::{ConfigLoader, FerrogramConfig, Mode, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Time shutdown allows on top of the dispatcher's drain timeout.
pub const DRAIN_MARGIN: Duration = Duration::from_millis(500);

/// Where the runtime is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    /// A start is waiting on the remote; the lifecycle lock is free.
    Starting,
    Started,
    ShutDown,
}

/// Mutable lifecycle state. Start and shutdown may race, so it lives behind
/// an async mutex.
struct Lifecycle {
    phase: Phase,
    receiver: Option<UpdateReceiver>,
    webhook: Option<WebhookServer>,
    tasks: Vec<JoinHandle<()>>,
}

/// One bot instance.
pub struct BotRuntime {
    config: FerrogramConfig,
    api: BoxedBotApi,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<Dispatcher>,
    sender: UpdateSender,
    shutdown: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

/// Generates a delegating registration method for one list kind.
macro_rules! delegate_registration {
    ($($method:ident: $payload:ty),* $(,)?) => {
        $(
            pub fn $method<H>(&self, filters: Vec<Filter<$payload>>, handler: H)
            where
                H: Handler<$payload>,
            {
                self.registry.$method(filters, handler);
            }
        )*
    };
}

impl BotRuntime {
    /// Creates a runtime around an existing API implementation.
    ///
    /// Does not validate `config` or touch logging; see
    /// [`from_config`](Self::from_config) for that.
    pub fn new(api: BoxedBotApi, config: FerrogramConfig) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            config.dispatcher.clone(),
        ));
        let (sender, receiver) = update_queue(config.dispatcher.queue_capacity);

        Self {
            config,
            api,
            registry,
            dispatcher,
            sender,
            shutdown: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Created,
                receiver: Some(receiver),
                webhook: None,
                tasks: Vec::new(),
            }),
        }
    }

    /// Validates `config`, initializes logging and creates an HTTP API client.
    pub fn from_config(config: FerrogramConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let api = HttpBotApi::new(config.bot.clone())?;
        info!(
            mode = %config.mode,
            api_url = %config.bot.api_url,
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );
        Ok(Self::new(Arc::new(api), config))
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &FerrogramConfig {
        &self.config
    }

    pub fn api(&self) -> &BoxedBotApi {
        &self.api
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Current dispatch loop state.
    pub fn state(&self) -> DispatchState {
        self.dispatcher.state()
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Address of the active webhook listener.
    pub async fn webhook_addr(&self) -> Option<SocketAddr> {
        self.lifecycle
            .lock()
            .await
            .webhook
            .as_ref()
            .map(WebhookServer::local_addr)
    }

    // =========================================================================
    // Handler Registration
    // =========================================================================

    delegate_registration! {
        on_message: Message,
        on_edited_message: Message,
        on_channel_post: Message,
        on_edited_channel_post: Message,
        on_business_connection: BusinessConnection,
        on_business_message: Message,
        on_edited_business_message: Message,
        on_deleted_business_messages: BusinessMessagesDeleted,
        on_message_reaction: MessageReactionUpdated,
        on_message_reaction_count: MessageReactionCountUpdated,
        on_inline_query: InlineQuery,
        on_chosen_inline_result: ChosenInlineResult,
        on_callback_query: CallbackQuery,
        on_purchased_paid_media: PaidMediaPurchased,
        on_poll: Poll,
        on_poll_answer: PollAnswer,
        on_my_chat_member: ChatMemberUpdated,
        on_chat_member: ChatMemberUpdated,
        on_chat_join_request: ChatJoinRequest,
        on_chat_boost: ChatBoostUpdated,
        on_removed_chat_boost: ChatBoostRemoved,
    }

    /// Registers a handler for messages whose text is exactly `command`.
    pub fn on_command<H>(&self, command: impl Into<String>, handler: H)
    where
        H: Handler<Message>,
    {
        self.registry.on_command(command, handler);
    }

    /// Sets the shipping query handler. The last registration wins.
    pub fn on_shipping_query<H>(&self, handler: H)
    where
        H: Handler<ShippingQuery>,
    {
        self.registry.on_shipping_query(handler);
    }

    /// Sets the pre-checkout query handler. The last registration wins.
    pub fn on_pre_checkout_query<H>(&self, handler: H)
    where
        H: Handler<PreCheckoutQuery>,
    {
        self.registry.on_pre_checkout_query(handler);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn check_startable(lifecycle: &Lifecycle) -> RuntimeResult<()> {
        match lifecycle.phase {
            Phase::Created => Ok(()),
            Phase::Starting | Phase::Started => Err(RuntimeError::AlreadyStarted),
            Phase::ShutDown => Err(RuntimeError::ShutDown),
        }
    }

    /// Claims the start slot. The lock is not held across the remote calls
    /// that follow, so [`shutdown`](Self::shutdown) can interrupt them.
    async fn begin_start(&self) -> RuntimeResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        Self::check_startable(&lifecycle)?;
        lifecycle.phase = Phase::Starting;
        Ok(())
    }

    /// Releases the start slot after a failed start, unless shutdown took it.
    async fn abort_start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.phase == Phase::Starting {
            lifecycle.phase = Phase::Created;
        }
    }

    /// Locks the lifecycle to record a successful start.
    async fn commit_start(&self) -> RuntimeResult<MutexGuard<'_, Lifecycle>> {
        let lifecycle = self.lifecycle.lock().await;
        match lifecycle.phase {
            Phase::Starting => Ok(lifecycle),
            _ => Err(RuntimeError::ShutDown),
        }
    }

    /// Awaits a startup call to the remote, giving up once shutdown begins.
    async fn until_shutdown<T, F>(&self, call: F) -> RuntimeResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(RuntimeError::ShutDown),
            result = call => Ok(result?),
        }
    }

    fn spawn_dispatcher(&self, lifecycle: &mut Lifecycle) -> RuntimeResult<()> {
        let receiver = lifecycle.receiver.take().ok_or(RuntimeError::AlreadyStarted)?;
        let dispatcher = Arc::clone(&self.dispatcher);
        let shutdown = self.shutdown.clone();
        lifecycle.tasks.push(tokio::spawn(async move {
            let report = dispatcher.run(receiver, shutdown).await;
            debug!(?report, "Dispatch loop exited");
        }));
        Ok(())
    }

    /// Clears any webhook registration and starts long polling.
    ///
    /// Fails with [`RuntimeError::AlreadyStarted`] if a strategy is running or
    /// starting, and with [`RuntimeError::ShutDown`] if shutdown began first.
    pub async fn start_polling(&self) -> RuntimeResult<()> {
        self.begin_start().await?;

        let poller = Arc::new(Poller::new(
            Arc::clone(&self.api),
            self.config.polling.clone(),
        ));
        if let Err(e) = self.until_shutdown(poller.prepare()).await {
            self.abort_start().await;
            return Err(e);
        }

        let mut lifecycle = self.commit_start().await?;
        self.spawn_dispatcher(&mut lifecycle)?;
        let sender = self.sender.clone();
        let shutdown = self.shutdown.clone();
        lifecycle.tasks.push(tokio::spawn(async move {
            let report = poller.run(sender, shutdown).await;
            debug!(?report, "Poll loop exited");
        }));

        lifecycle.phase = Phase::Started;
        info!("Runtime started in polling mode");
        Ok(())
    }

    /// Binds the webhook listener described by `config` and registers it
    /// with the remote.
    pub async fn start_webhook(&self, config: &WebhookConfig) -> RuntimeResult<()> {
        config.validate()?;
        self.begin_start().await?;

        let server =
            match WebhookServer::bind(config, self.sender.clone(), self.shutdown.clone()).await {
                Ok(server) => server,
                Err(e) => {
                    self.abort_start().await;
                    return Err(e.into());
                }
            };
        self.finish_webhook_start(config, server).await
    }

    /// Like [`start_webhook`](Self::start_webhook), on an already bound
    /// listener. `config.host` and `config.port` are ignored.
    pub async fn start_webhook_on(
        &self,
        listener: TcpListener,
        config: &WebhookConfig,
    ) -> RuntimeResult<()> {
        self.begin_start().await?;

        let server =
            match WebhookServer::serve(listener, config, self.sender.clone(), self.shutdown.clone())
            {
                Ok(server) => server,
                Err(e) => {
                    self.abort_start().await;
                    return Err(e.into());
                }
            };
        self.finish_webhook_start(config, server).await
    }

    async fn finish_webhook_start(
        &self,
        config: &WebhookConfig,
        server: WebhookServer,
    ) -> RuntimeResult<()> {
        match self.until_shutdown(self.api.set_webhook(&config.webhook_options())).await {
            Ok(description) => info!(url = %config.url, %description, "Webhook registered"),
            Err(e) => {
                error!(url = %config.url, error = %e, "Failed to register webhook");
                server.shutdown().await;
                self.abort_start().await;
                return Err(e);
            }
        }

        let mut lifecycle = match self.commit_start().await {
            Ok(lifecycle) => lifecycle,
            Err(e) => {
                server.shutdown().await;
                return Err(e);
            }
        };
        self.spawn_dispatcher(&mut lifecycle)?;
        lifecycle.webhook = Some(server);
        lifecycle.phase = Phase::Started;
        info!("Runtime started in webhook mode");
        Ok(())
    }

    /// Stops the runtime.
    ///
    /// The webhook listener (if any) is shut down first so no request is left
    /// half answered, then the root token is cancelled, which also interrupts
    /// a start still waiting on the remote. The producer and the dispatch loop
    /// then get the longer of `shutdown_grace` and the drain timeout plus
    /// [`DRAIN_MARGIN`] to finish. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.phase == Phase::ShutDown {
            debug!("Runtime already shut down");
            return;
        }
        lifecycle.phase = Phase::ShutDown;
        info!("Shutting down runtime");

        if let Some(server) = lifecycle.webhook.take() {
            server.shutdown().await;
        }
        self.shutdown.cancel();

        let mut tasks = std::mem::take(&mut lifecycle.tasks);
        let grace = self.shutdown_budget();
        let finished = tokio::time::timeout(grace, join_all(tasks.iter_mut())).await;
        if finished.is_err() {
            let pending = tasks.iter().filter(|task| !task.is_finished()).count();
            warn!(pending, ?grace, "Tasks still running after shutdown grace, aborting");
            for task in &tasks {
                task.abort();
            }
        }
        info!("Runtime stopped");
    }

    /// How long shutdown waits before aborting. Always leaves the dispatch
    /// loop room to finish its drain.
    fn shutdown_budget(&self) -> Duration {
        let drain = self.config.dispatcher.drain_timeout() + DRAIN_MARGIN;
        self.config.runtime.shutdown_grace().max(drain)
    }

    /// Starts the strategy selected by `config.mode`.
    pub async fn start(&self) -> RuntimeResult<()> {
        match self.config.mode {
            Mode::Polling => self.start_polling().await,
            Mode::Webhook => {
                let webhook = self.config.webhook.clone();
                self.start_webhook(&webhook).await
            }
        }
    }

    /// Starts the configured strategy and runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_signal()).await
    }

    /// Polls until Ctrl+C or SIGTERM.
    pub async fn run_polling(&self) -> RuntimeResult<()> {
        self.start_polling().await?;
        self.serve_until(wait_for_signal()).await;
        Ok(())
    }

    /// Serves the webhook until Ctrl+C or SIGTERM.
    pub async fn run_webhook(&self, config: &WebhookConfig) -> RuntimeResult<()> {
        self.start_webhook(config).await?;
        self.serve_until(wait_for_signal()).await;
        Ok(())
    }

    /// Starts the configured strategy and runs until `signal` resolves.
    pub async fn run_until<F>(&self, signal: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        self.serve_until(signal).await;
        Ok(())
    }

    async fn serve_until<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        info!("Ferrogram runtime is now running. Press Ctrl+C to stop.");
        tokio::select! {
            _ = signal => {}
            _ = self.shutdown.cancelled() => {}
        }
        self.shutdown().await;
    }
}

impl std::fmt::Debug for BotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotRuntime")
            .field("mode", &self.config.mode)
            .field("state", &self.state())
            .finish()
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C, waiting forever");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builds a [`BotRuntime`] from layered configuration.
///
/// ```rust,ignore
/// let runtime = BotRuntime::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: FerrogramConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads, validates and builds.
    pub fn build(self) -> RuntimeResult<BotRuntime> {
        let config = self.config_loader.load()?;
        BotRuntime::from_config(config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
