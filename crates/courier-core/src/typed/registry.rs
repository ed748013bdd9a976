//! Registry - メッセージ型と Handler の対応表、および dispatch
//!
//! # 設計
//! - MessageKey → `Arc<dyn DynHandler>` の HashMap を RwLock で保護
//! - 登録は初期化時に行う前提（後勝ちで上書き）
//! - dispatch は読むだけ。Handler を Arc で取り出してからロックを外し、await する
//! - 遅延 dispatch だけが tokio::spawn を使う。それ以外は呼び出し元のタスクで完結
//!
//! `Registry` は Arc を包んでいるので clone は安価で、clone 同士は同じ表を共有します。

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::{JoinError, JoinHandle};

use super::handler::{DynHandler, Handler, TypedHandler};
use crate::domain::{
    AnyMessage, Batch, Context, DispatchError, DispatchEvent, Envelope, Message, MessageKey,
};
use crate::ports::{Clock, EventSink, SystemClock, TracingEventSink};

/// Receives the outcome of a deferred dispatch.
pub type ResultCallback = Box<dyn FnOnce(Result<(), DispatchError>) + Send + 'static>;

/// A handler ready to be bound, with its message key already derived.
pub struct Registration {
    key: MessageKey,
    handler: Arc<dyn DynHandler>,
}

impl Registration {
    /// # Panics
    /// If `M` has no derivable key (a reference, tuple, array, or other
    /// structural type). That is a defect in the calling code, not a runtime
    /// condition.
    pub fn new<M: Message, H: Handler<M> + 'static>(handler: H) -> Self {
        let key = routable_key::<M>();
        Self {
            key,
            handler: Arc::new(TypedHandler::new(handler, key)),
        }
    }

    pub fn key(&self) -> MessageKey {
        self.key
    }
}

pub(crate) fn routable_key<M: Message>() -> MessageKey {
    match MessageKey::of::<M>() {
        Some(key) => key,
        None => panic!(
            "courier: '{}' is not a routable message type",
            type_name::<M>()
        ),
    }
}

struct Inner {
    handlers: RwLock<HashMap<MessageKey, Arc<dyn DynHandler>>>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(TracingEventSink), Arc::new(SystemClock))
    }

    pub(crate) fn with_parts(sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(HashMap::new()),
                sink,
                clock,
            }),
        }
    }

    /// Binds `handler` to message type `M`, replacing any previous binding.
    ///
    /// # Panics
    /// See [`Registration::new`].
    pub fn register<M: Message, H: Handler<M> + 'static>(&self, handler: H) -> &Self {
        self.insert(Registration::new(handler));
        self
    }

    /// Binds several handlers, in order. Later entries win on duplicate keys.
    pub fn register_all(&self, registrations: impl IntoIterator<Item = Registration>) -> &Self {
        for registration in registrations {
            self.insert(registration);
        }
        self
    }

    pub(crate) fn insert(&self, registration: Registration) {
        let Registration { key, handler } = registration;
        let name = handler.handler_name();
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, handler);
        self.inner
            .sink
            .emit(&DispatchEvent::Registered { key, handler: name });
    }

    fn lookup(&self, key: MessageKey) -> Option<Arc<dyn DynHandler>> {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Handler bound to the message's concrete type.
    pub fn handler(&self, message: &dyn AnyMessage) -> Option<Arc<dyn DynHandler>> {
        MessageKey::of_val(message).and_then(|key| self.lookup(key))
    }

    pub fn handler_for<M: Message>(&self) -> Option<Arc<dyn DynHandler>> {
        MessageKey::of::<M>().and_then(|key| self.lookup(key))
    }

    pub fn contains<M: Message>(&self) -> bool {
        self.handler_for::<M>().is_some()
    }

    /// Bound keys, sorted.
    pub fn registered_keys(&self) -> Vec<MessageKey> {
        let mut keys: Vec<MessageKey> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatches messages in order, flattening nested batches in place.
    ///
    /// Stops at the first failure and returns it; later messages are not
    /// handled. Runs on the caller's task.
    pub async fn dispatch<'a>(
        &self,
        ctx: &Context,
        messages: impl Into<Batch<'a>>,
    ) -> Result<(), DispatchError> {
        let mut pending = vec![messages.into().into_iter()];
        while let Some(current) = pending.last_mut() {
            let Some(envelope) = current.next() else {
                pending.pop();
                continue;
            };
            match envelope {
                Envelope::Batch(batch) => pending.push(batch.into_iter()),
                Envelope::Borrowed(message) => self.dispatch_one(ctx, message).await?,
                Envelope::Owned(mut message) => self.dispatch_one(ctx, &mut *message).await?,
            }
        }
        Ok(())
    }

    /// Dispatches a single message.
    pub async fn send<M: Message>(&self, ctx: &Context, message: &mut M) -> Result<(), DispatchError> {
        self.dispatch_one(ctx, message).await
    }

    async fn dispatch_one(
        &self,
        ctx: &Context,
        message: &mut dyn AnyMessage,
    ) -> Result<(), DispatchError> {
        let key = MessageKey::of_val(&*message)
            .ok_or(DispatchError::InvalidMessage(message.type_name()))?;
        self.inner.sink.emit(&DispatchEvent::Dispatching { key });

        let handler = self
            .lookup(key)
            .ok_or(DispatchError::HandlerNotFound(key))?;
        handler.handle_dyn(ctx, message).await
    }

    /// Dispatches `messages` on a separate task once `delay` has elapsed.
    ///
    /// Races the timer against `ctx`: if the context is done first the
    /// handlers never run and `on_result` receives the context's error.
    /// Otherwise `on_result` receives the dispatch result. `None` discards the
    /// outcome. Always asynchronous, even for a zero delay.
    ///
    /// # Panics
    /// Outside a Tokio runtime.
    pub fn dispatch_after(
        &self,
        ctx: &Context,
        delay: Duration,
        on_result: Option<ResultCallback>,
        messages: impl Into<Batch<'static>>,
    ) -> Deferred {
        let registry = self.clone();
        let ctx = ctx.clone();
        let messages = messages.into();
        let on_result: ResultCallback = match on_result {
            Some(callback) => callback,
            None => Box::new(|_: Result<(), DispatchError>| {}),
        };

        self.inner.sink.emit(&DispatchEvent::Scheduled {
            delay,
            messages: messages.len(),
        });

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                reason = ctx.done() => {
                    registry.inner.sink.emit(&DispatchEvent::Abandoned { reason });
                    Err(DispatchError::Context(reason))
                }
                () = tokio::time::sleep(delay) => registry.dispatch(&ctx, messages).await,
            };
            on_result(result);
        });

        Deferred { handle }
    }

    /// [`dispatch_after`](Self::dispatch_after) with the delay measured from
    /// the registry's clock. A time in the past dispatches immediately, still
    /// on a separate task.
    pub fn dispatch_at(
        &self,
        ctx: &Context,
        at: DateTime<Utc>,
        on_result: Option<ResultCallback>,
        messages: impl Into<Batch<'static>>,
    ) -> Deferred {
        let delay = delay_until(at, self.inner.clock.now());
        self.dispatch_after(ctx, delay, on_result, messages)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("keys", &self.registered_keys())
            .finish()
    }
}

/// Negative gaps clamp to zero.
pub(crate) fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Handle to a scheduled dispatch. Dropping it does not cancel the dispatch.
#[derive(Debug)]
pub struct Deferred {
    handle: JoinHandle<()>,
}

impl Deferred {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the task; neither handlers nor the callback run if it had not started them yet.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Waits until the dispatch and its callback have run.
    pub async fn join(self) -> Result<(), JoinError> {
        self.handle.await
    }
}
