//! Handler registry.
//!
//! Handlers are registered per update kind. List kinds keep every
//! registration in insertion order and carry filters; the two payment query
//! kinds hold at most one handler each, where the last registration wins.
//!
//! The registry is behind a read-write lock, so handlers may be registered
//! while the dispatch loop is running.

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, trace};

use ferrogram_core::{
    BusinessConnection, BusinessMessagesDeleted, CallbackQuery, ChatBoostRemoved, ChatBoostUpdated,
    ChatJoinRequest, ChatMemberUpdated, ChosenInlineResult, InlineQuery, Message,
    MessageReactionCountUpdated, MessageReactionUpdated, PaidMediaPurchased, Poll, PollAnswer,
    PreCheckoutQuery, ShippingQuery, UpdateKind,
};

use crate::filter::{Filter, all_match, is_command};
use crate::handler::{BoxedHandler, Handler, into_handler};

/// A handler invocation ready to be spawned.
///
/// The handler itself is not called until the job is first polled, so none of
/// its code runs on the task that routed the update.
pub type Job = BoxFuture<'static, ()>;

fn deferred<T>(handler: BoxedHandler<T>, payload: Arc<T>) -> Job
where
    T: Send + Sync + 'static,
{
    Box::pin(async move { handler.call(payload).await })
}

// ============================================================================
// Handler lists
// ============================================================================

struct Registration<T> {
    filters: Vec<Filter<T>>,
    handler: BoxedHandler<T>,
}

/// Ordered registrations for one update kind.
pub struct HandlerList<T> {
    entries: Vec<Registration<T>>,
}

impl<T> Default for HandlerList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> HandlerList<T> {
    fn push(&mut self, filters: Vec<Filter<T>>, handler: BoxedHandler<T>) {
        self.entries.push(Registration { filters, handler });
    }

    /// Handlers whose filters all pass, in registration order.
    fn matching(&self, payload: &T) -> Vec<BoxedHandler<T>> {
        self.entries
            .iter()
            .filter(|entry| all_match(&entry.filters, payload))
            .map(|entry| Arc::clone(&entry.handler))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct Handlers {
    message: HandlerList<Message>,
    edited_message: HandlerList<Message>,
    channel_post: HandlerList<Message>,
    edited_channel_post: HandlerList<Message>,
    business_connection: HandlerList<BusinessConnection>,
    business_message: HandlerList<Message>,
    edited_business_message: HandlerList<Message>,
    deleted_business_messages: HandlerList<BusinessMessagesDeleted>,
    message_reaction: HandlerList<MessageReactionUpdated>,
    message_reaction_count: HandlerList<MessageReactionCountUpdated>,
    inline_query: HandlerList<InlineQuery>,
    chosen_inline_result: HandlerList<ChosenInlineResult>,
    callback_query: HandlerList<CallbackQuery>,
    purchased_paid_media: HandlerList<PaidMediaPurchased>,
    poll: HandlerList<Poll>,
    poll_answer: HandlerList<PollAnswer>,
    my_chat_member: HandlerList<ChatMemberUpdated>,
    chat_member: HandlerList<ChatMemberUpdated>,
    chat_join_request: HandlerList<ChatJoinRequest>,
    chat_boost: HandlerList<ChatBoostUpdated>,
    removed_chat_boost: HandlerList<ChatBoostRemoved>,
    shipping_query: Option<BoxedHandler<ShippingQuery>>,
    pre_checkout_query: Option<BoxedHandler<PreCheckoutQuery>>,
}

impl Handlers {
    fn count(&self) -> usize {
        self.message.len()
            + self.edited_message.len()
            + self.channel_post.len()
            + self.edited_channel_post.len()
            + self.business_connection.len()
            + self.business_message.len()
            + self.edited_business_message.len()
            + self.deleted_business_messages.len()
            + self.message_reaction.len()
            + self.message_reaction_count.len()
            + self.inline_query.len()
            + self.chosen_inline_result.len()
            + self.callback_query.len()
            + self.purchased_paid_media.len()
            + self.poll.len()
            + self.poll_answer.len()
            + self.my_chat_member.len()
            + self.chat_member.len()
            + self.chat_join_request.len()
            + self.chat_boost.len()
            + self.removed_chat_boost.len()
            + usize::from(self.shipping_query.is_some())
            + usize::from(self.pre_checkout_query.is_some())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Generates a filtered registration method for one list kind.
macro_rules! list_registration {
    ($(#[$doc:meta])* $method:ident => $field:ident: $payload:ty) => {
        $(#[$doc])*
        pub fn $method<H>(&self, filters: Vec<Filter<$payload>>, handler: H)
        where
            H: Handler<$payload>,
        {
            let handler = into_handler(handler);
            self.handlers.write().$field.push(filters, handler);
            debug!(kind = stringify!($field), "Registered handler");
        }
    };
}

/// Per-kind handler storage shared by the runtime and the dispatch loop.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Handlers>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    list_registration!(
        /// Registers a handler for new messages.
        on_message => message: Message
    );
    list_registration!(on_edited_message => edited_message: Message);
    list_registration!(on_channel_post => channel_post: Message);
    list_registration!(on_edited_channel_post => edited_channel_post: Message);
    list_registration!(on_business_connection => business_connection: BusinessConnection);
    list_registration!(on_business_message => business_message: Message);
    list_registration!(on_edited_business_message => edited_business_message: Message);
    list_registration!(
        on_deleted_business_messages => deleted_business_messages: BusinessMessagesDeleted
    );
    list_registration!(on_message_reaction => message_reaction: MessageReactionUpdated);
    list_registration!(
        on_message_reaction_count => message_reaction_count: MessageReactionCountUpdated
    );
    list_registration!(on_inline_query => inline_query: InlineQuery);
    list_registration!(on_chosen_inline_result => chosen_inline_result: ChosenInlineResult);
    list_registration!(
        /// Registers a handler for callback queries from inline keyboards.
        on_callback_query => callback_query: CallbackQuery
    );
    list_registration!(on_purchased_paid_media => purchased_paid_media: PaidMediaPurchased);
    list_registration!(on_poll => poll: Poll);
    list_registration!(on_poll_answer => poll_answer: PollAnswer);
    list_registration!(
        /// Registers a handler for changes of the bot's own membership.
        on_my_chat_member => my_chat_member: ChatMemberUpdated
    );
    list_registration!(on_chat_member => chat_member: ChatMemberUpdated);
    list_registration!(on_chat_join_request => chat_join_request: ChatJoinRequest);
    list_registration!(on_chat_boost => chat_boost: ChatBoostUpdated);
    list_registration!(on_removed_chat_boost => removed_chat_boost: ChatBoostRemoved);

    /// Registers a message handler for an exact command text such as `"/start"`.
    pub fn on_command<H>(&self, command: impl Into<String>, handler: H)
    where
        H: Handler<Message>,
    {
        self.on_message(vec![is_command(command)], handler);
    }

    /// Sets the shipping query handler, replacing any previous one.
    pub fn on_shipping_query<H>(&self, handler: H)
    where
        H: Handler<ShippingQuery>,
    {
        let previous = self.handlers.write().shipping_query.replace(into_handler(handler));
        if previous.is_some() {
            debug!("Replaced shipping_query handler");
        }
    }

    /// Sets the pre-checkout query handler, replacing any previous one.
    pub fn on_pre_checkout_query<H>(&self, handler: H)
    where
        H: Handler<PreCheckoutQuery>,
    {
        let previous = self
            .handlers
            .write()
            .pre_checkout_query
            .replace(into_handler(handler));
        if previous.is_some() {
            debug!("Replaced pre_checkout_query handler");
        }
    }

    /// Total number of registered handlers across all kinds.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().count()
    }

    /// Builds the jobs for every handler that accepts `kind`.
    ///
    /// Returns `None` for [`UpdateKind::Unknown`]. Filters run on the calling
    /// task; handlers run only once their job is polled.
    pub fn route(&self, kind: &UpdateKind) -> Option<Vec<Job>> {
        let jobs = match kind {
            UpdateKind::Message(p) => self.select(|h| &h.message, p),
            UpdateKind::EditedMessage(p) => self.select(|h| &h.edited_message, p),
            UpdateKind::ChannelPost(p) => self.select(|h| &h.channel_post, p),
            UpdateKind::EditedChannelPost(p) => self.select(|h| &h.edited_channel_post, p),
            UpdateKind::BusinessConnection(p) => self.select(|h| &h.business_connection, p),
            UpdateKind::BusinessMessage(p) => self.select(|h| &h.business_message, p),
            UpdateKind::EditedBusinessMessage(p) => {
                self.select(|h| &h.edited_business_message, p)
            }
            UpdateKind::DeletedBusinessMessages(p) => {
                self.select(|h| &h.deleted_business_messages, p)
            }
            UpdateKind::MessageReaction(p) => self.select(|h| &h.message_reaction, p),
            UpdateKind::MessageReactionCount(p) => self.select(|h| &h.message_reaction_count, p),
            UpdateKind::InlineQuery(p) => self.select(|h| &h.inline_query, p),
            UpdateKind::ChosenInlineResult(p) => self.select(|h| &h.chosen_inline_result, p),
            UpdateKind::CallbackQuery(p) => self.select(|h| &h.callback_query, p),
            UpdateKind::ShippingQuery(p) => self.select_single(|h| &h.shipping_query, p),
            UpdateKind::PreCheckoutQuery(p) => self.select_single(|h| &h.pre_checkout_query, p),
            UpdateKind::PurchasedPaidMedia(p) => self.select(|h| &h.purchased_paid_media, p),
            UpdateKind::Poll(p) => self.select(|h| &h.poll, p),
            UpdateKind::PollAnswer(p) => self.select(|h| &h.poll_answer, p),
            UpdateKind::MyChatMember(p) => self.select(|h| &h.my_chat_member, p),
            UpdateKind::ChatMember(p) => self.select(|h| &h.chat_member, p),
            UpdateKind::ChatJoinRequest(p) => self.select(|h| &h.chat_join_request, p),
            UpdateKind::ChatBoost(p) => self.select(|h| &h.chat_boost, p),
            UpdateKind::RemovedChatBoost(p) => self.select(|h| &h.removed_chat_boost, p),
            UpdateKind::Unknown { .. } => return None,
        };
        trace!(kind = kind.name(), matched = jobs.len(), "Routed update");
        Some(jobs)
    }

    fn select<T, F>(&self, list: F, payload: &Arc<T>) -> Vec<Job>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&Handlers) -> &HandlerList<T>,
    {
        // The lock is released before any handler code runs.
        let matched = {
            let guard = self.handlers.read();
            list(&*guard).matching(payload)
        };
        matched
            .into_iter()
            .map(|handler| deferred(handler, Arc::clone(payload)))
            .collect()
    }

    fn select_single<T, F>(&self, slot: F, payload: &Arc<T>) -> Vec<Job>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&Handlers) -> &Option<BoxedHandler<T>>,
    {
        let handler = {
            let guard = self.handlers.read();
            slot(&*guard).clone()
        };
        handler
            .map(|handler| deferred(handler, Arc::clone(payload)))
            .into_iter()
            .collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.handler_count())
            .finish()
    }
}
