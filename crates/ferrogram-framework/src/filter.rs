//! Filter predicates.
//!
//! A [`Filter`] is a cloneable, thread-safe predicate over a payload type.
//! Registrations carry a list of filters that must all pass (logical AND,
//! short-circuit, empty list always matches).
//!
//! ```rust,ignore
//! use ferrogram_framework::filter::{self, fields};
//!
//! let greeting = filter::text_equals("hi").or(filter::text_equals("hello"));
//! let in_groups = filter::equals(fields::chat_type, "group");
//!
//! registry.on_message(vec![greeting, in_groups], reply_hello);
//! ```

use std::fmt;
use std::sync::Arc;

use ferrogram_core::{CallbackQuery, Message};
use regex::Regex;
use tracing::warn;

/// Extracts an optional string field from a payload.
pub type Field<T> = fn(&T) -> Option<&str>;

type CheckFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A predicate over payloads of type `T`.
pub struct Filter<T> {
    check: CheckFn<T>,
    label: Arc<str>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            check: Arc::clone(&self.check),
            label: Arc::clone(&self.label),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.label).finish()
    }
}

impl<T: 'static> Filter<T> {
    /// Creates a filter from a closure.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::labeled("custom", check)
    }

    /// Creates a filter with a label shown in debug output.
    pub fn labeled<F>(label: impl Into<Arc<str>>, check: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
            label: label.into(),
        }
    }

    /// A filter that always passes.
    pub fn any() -> Self {
        Self::labeled("any", |_| true)
    }

    /// A filter that never passes.
    pub fn none() -> Self {
        Self::labeled("none", |_| false)
    }

    /// Evaluates the filter.
    pub fn matches(&self, value: &T) -> bool {
        (self.check)(value)
    }

    /// Passes when both filters pass.
    pub fn and(self, other: Filter<T>) -> Self {
        let label = format!("({} && {})", self.label, other.label);
        Self::labeled(label, move |value| self.matches(value) && other.matches(value))
    }

    /// Passes when either filter passes.
    pub fn or(self, other: Filter<T>) -> Self {
        let label = format!("({} || {})", self.label, other.label);
        Self::labeled(label, move |value| self.matches(value) || other.matches(value))
    }

    /// Inverts the filter.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        let label = format!("!{}", self.label);
        Self::labeled(label, move |value| !self.matches(value))
    }

    /// Returns the label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Returns true if every filter passes. An empty slice always matches.
pub fn all_match<T>(filters: &[Filter<T>], value: &T) -> bool {
    filters.iter().all(|filter| (filter.check)(value))
}

// ============================================================================
// Generic field filters
// ============================================================================

/// Passes when `field` is present and exactly equal to `expected`.
pub fn equals<T: 'static>(field: Field<T>, expected: impl Into<String>) -> Filter<T> {
    let expected = expected.into();
    Filter::labeled(format!("== {expected:?}"), move |value| {
        field(value) == Some(expected.as_str())
    })
}

/// Passes when `field` is present and contains `needle`.
pub fn contains<T: 'static>(field: Field<T>, needle: impl Into<String>) -> Filter<T> {
    let needle = needle.into();
    Filter::labeled(format!("contains {needle:?}"), move |value| {
        field(value).is_some_and(|s| s.contains(needle.as_str()))
    })
}

/// Passes when `field` is present and matches the regular expression.
///
/// The pattern is compiled once. A malformed pattern is logged and produces
/// a filter that never passes.
pub fn matches_pattern<T: 'static>(field: Field<T>, pattern: &str) -> Filter<T> {
    match Regex::new(pattern) {
        Ok(regex) => Filter::labeled(format!("=~ /{pattern}/"), move |value| {
            field(value).is_some_and(|s| regex.is_match(s))
        }),
        Err(error) => {
            warn!(pattern, %error, "Invalid filter pattern, filter will never match");
            Filter::labeled(format!("invalid /{pattern}/"), |_| false)
        }
    }
}

/// Passes when `field` is present and starts with `prefix`.
pub fn starts_with<T: 'static>(field: Field<T>, prefix: impl Into<String>) -> Filter<T> {
    let prefix = prefix.into();
    Filter::labeled(format!("starts_with {prefix:?}"), move |value| {
        field(value).is_some_and(|s| s.starts_with(prefix.as_str()))
    })
}

// ============================================================================
// Message and query shorthands
// ============================================================================

/// Passes when the message text is exactly `command`, e.g. `"/start"`.
///
/// Arguments and bot mentions are not parsed: `"/start foo"` does not match.
pub fn is_command(command: impl Into<String>) -> Filter<Message> {
    let command = command.into();
    Filter::labeled(format!("command {command}"), move |message: &Message| {
        message.text.as_deref() == Some(command.as_str())
    })
}

pub fn text_equals(text: impl Into<String>) -> Filter<Message> {
    equals(fields::text, text)
}

pub fn text_contains(needle: impl Into<String>) -> Filter<Message> {
    contains(fields::text, needle)
}

pub fn text_matches(pattern: &str) -> Filter<Message> {
    matches_pattern(fields::text, pattern)
}

pub fn callback_data_equals(data: impl Into<String>) -> Filter<CallbackQuery> {
    equals(fields::callback_data, data)
}

pub fn callback_data_prefix(prefix: impl Into<String>) -> Filter<CallbackQuery> {
    starts_with(fields::callback_data, prefix)
}

/// Field accessors usable with [`equals`], [`contains`] and [`matches_pattern`].
pub mod fields {
    use ferrogram_core::{CallbackQuery, InlineQuery, Message};

    pub fn text(message: &Message) -> Option<&str> {
        message.text.as_deref()
    }

    pub fn caption(message: &Message) -> Option<&str> {
        message.caption.as_deref()
    }

    /// `private`, `group`, `supergroup` or `channel`.
    pub fn chat_type(message: &Message) -> Option<&str> {
        Some(message.chat.kind.as_str()).filter(|kind| !kind.is_empty())
    }

    pub fn sender_username(message: &Message) -> Option<&str> {
        message.from.as_ref().and_then(|user| user.username.as_deref())
    }

    pub fn callback_data(query: &CallbackQuery) -> Option<&str> {
        query.data.as_deref()
    }

    pub fn inline_query(query: &InlineQuery) -> Option<&str> {
        Some(query.query.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrogram_core::{Chat, User};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn text(text: &str) -> Message {
        Message::text_in(1, text)
    }

    #[test]
    fn equals_requires_presence() {
        let filter = text_equals("hi");
        assert!(filter.matches(&text("hi")));
        assert!(!filter.matches(&text("hi there")));

        let no_text = Message {
            caption: Some("hi".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&no_text));
        assert!(equals(fields::caption, "hi").matches(&no_text));
    }

    #[test]
    fn contains_substring() {
        let filter = text_contains("ell");
        assert!(filter.matches(&text("hello")));
        assert!(!filter.matches(&text("help")));
    }

    #[test]
    fn pattern_matching() {
        let filter = text_matches(r"^order #\d+$");
        assert!(filter.matches(&text("order #42")));
        assert!(!filter.matches(&text("order #x")));
    }

    #[test]
    fn invalid_pattern_fails_closed() {
        let filter = text_matches("(unclosed");
        assert!(!filter.matches(&text("(unclosed")));
        assert!(!filter.matches(&text("")));
    }

    #[test]
    fn command_is_literal() {
        let filter = is_command("/start");
        assert!(filter.matches(&text("/start")));
        assert!(!filter.matches(&text("/start now")));
        assert!(!filter.matches(&text("/stop")));
    }

    #[test]
    fn callback_data_filters() {
        let query = CallbackQuery {
            id: "1".into(),
            data: Some("buy:42".into()),
            ..Default::default()
        };
        assert!(callback_data_equals("buy:42").matches(&query));
        assert!(callback_data_prefix("buy:").matches(&query));
        assert!(!callback_data_prefix("sell:").matches(&query));

        let empty = CallbackQuery::default();
        assert!(!callback_data_prefix("").matches(&empty));
    }

    #[test]
    fn message_field_accessors() {
        let message = Message {
            chat: Chat {
                id: 9,
                kind: "supergroup".into(),
                ..Default::default()
            },
            from: Some(User {
                id: 3,
                username: Some("ada".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(equals(fields::chat_type, "supergroup").matches(&message));
        assert!(equals(fields::sender_username, "ada").matches(&message));
        assert_eq!(fields::chat_type(&Message::default()), None);
    }

    #[test]
    fn combinators() {
        let hi_or_hello = text_equals("hi").or(text_equals("hello"));
        assert!(hi_or_hello.matches(&text("hi")));
        assert!(hi_or_hello.matches(&text("hello")));
        assert!(!hi_or_hello.matches(&text("hey")));

        let not_hi = text_equals("hi").not();
        assert!(!not_hi.matches(&text("hi")));
        assert!(not_hi.matches(&text("yo")));

        let both = text_contains("a").and(text_contains("b"));
        assert!(both.matches(&text("ab")));
        assert!(!both.matches(&text("a")));
        assert_eq!(both.label(), "(contains \"a\" && contains \"b\")");
    }

    #[test]
    fn all_match_is_and_with_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = {
            let calls = Arc::clone(&calls);
            Filter::new(move |_: &Message| {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            })
        };

        let filters = vec![text_equals("x"), counted.clone()];
        assert!(!all_match(&filters, &text("y")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(all_match(&filters, &text("x")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(all_match::<Message>(&[], &text("anything")));
        assert!(Filter::<Message>::any().matches(&text("")));
        assert!(!Filter::<Message>::none().matches(&text("")));
    }
}
