//! DispatchEvent - 診断用イベント
//!
//! EventSink に送られます。振る舞いには影響しません。

use std::time::Duration;

use super::context::ContextError;
use super::key::MessageKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A handler was bound to `key`, replacing any previous binding.
    Registered { key: MessageKey, handler: &'static str },
    /// About to invoke the handler bound to `key`.
    Dispatching { key: MessageKey },
    /// A deferred dispatch of `messages` entries was scheduled.
    Scheduled { delay: Duration, messages: usize },
    /// A deferred dispatch lost the race against its context.
    Abandoned { reason: ContextError },
}
