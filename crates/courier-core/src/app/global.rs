//! Default registry - プロセス全体で共有されるデフォルトの Registry
//!
//! 最初のアクセスで一度だけ初期化され、プロセスが終わるまで生きます。
//! 便利関数は全てこの Registry に転送するだけで、契約は `Registry` と同じです。
//! 明示的に作った `Registry` を渡せば、いつでも差し替えられます。

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{Batch, Context, DispatchError, Message};
use crate::typed::{Deferred, Handler, Registry, ResultCallback};

static DEFAULT_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

/// Binds `handler` in the default registry.
pub fn register<M: Message, H: Handler<M> + 'static>(handler: H) {
    DEFAULT_REGISTRY.register(handler);
}

pub async fn dispatch<'a>(
    ctx: &Context,
    messages: impl Into<Batch<'a>>,
) -> Result<(), DispatchError> {
    DEFAULT_REGISTRY.dispatch(ctx, messages).await
}

pub async fn send<M: Message>(ctx: &Context, message: &mut M) -> Result<(), DispatchError> {
    DEFAULT_REGISTRY.send(ctx, message).await
}

pub fn dispatch_after(
    ctx: &Context,
    delay: Duration,
    on_result: Option<ResultCallback>,
    messages: impl Into<Batch<'static>>,
) -> Deferred {
    DEFAULT_REGISTRY.dispatch_after(ctx, delay, on_result, messages)
}

pub fn dispatch_at(
    ctx: &Context,
    at: DateTime<Utc>,
    on_result: Option<ResultCallback>,
    messages: impl Into<Batch<'static>>,
) -> Deferred {
    DEFAULT_REGISTRY.dispatch_at(ctx, at, on_result, messages)
}
