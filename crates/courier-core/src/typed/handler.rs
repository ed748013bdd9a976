//! Handler trait - Message を処理する Handler の定義
//!
//! # 二層構造
//! - ジェネリック trait (`Handler<M>`) - 型安全、ユーザーが実装
//! - Object-safe trait (`DynHandler`) - Registry の HashMap に格納
//! - Type erasure (`TypedHandler<M, H>` → `DynHandler`)
//!
//! Handler の「形」（context と `&mut M` を受け取り、エラーを 1 つ返す）は
//! trait のシグネチャそのものなので、形の誤りはコンパイルエラーになります。

use std::any::type_name;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::domain::{AnyMessage, BoxError, Context, DispatchError, Message, MessageKey};

/// Handles one message type.
///
/// ```ignore
/// struct PlaceOrderHandler;
///
/// #[async_trait]
/// impl Handler<PlaceOrder> for PlaceOrderHandler {
///     async fn handle(&self, ctx: &Context, order: &mut PlaceOrder) -> Result<(), BoxError> {
///         order.result = Some(OrderId::new());
///         Ok(())
///     }
/// }
/// ```
///
/// Handlers may run on any Tokio worker and must guard their own state.
/// Cancellation of `ctx` is advisory: observing it mid-handler is up to the handler.
#[async_trait]
pub trait Handler<M: Message>: Send + Sync {
    async fn handle(&self, ctx: &Context, message: &mut M) -> Result<(), BoxError>;
}

/// Object-safe handler stored by the registry.
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(
        &self,
        ctx: &Context,
        message: &mut dyn AnyMessage,
    ) -> Result<(), DispatchError>;

    fn message_key(&self) -> MessageKey;

    /// Type name of the wrapped handler, for diagnostics.
    fn handler_name(&self) -> &'static str;
}

pub struct TypedHandler<M: Message, H: Handler<M>> {
    handler: H,
    key: MessageKey,
    _marker: PhantomData<fn(&mut M)>,
}

impl<M: Message, H: Handler<M>> TypedHandler<M, H> {
    pub(crate) fn new(handler: H, key: MessageKey) -> Self {
        Self {
            handler,
            key,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<M: Message, H: Handler<M>> DynHandler for TypedHandler<M, H> {
    async fn handle_dyn(
        &self,
        ctx: &Context,
        message: &mut dyn AnyMessage,
    ) -> Result<(), DispatchError> {
        let actual = message.type_name();
        let message = message
            .downcast_mut::<M>()
            .ok_or(DispatchError::InvalidMessage(actual))?;
        self.handler
            .handle(ctx, message)
            .await
            .map_err(DispatchError::Handler)
    }

    fn message_key(&self) -> MessageKey {
        self.key
    }

    fn handler_name(&self) -> &'static str {
        type_name::<H>()
    }
}

/// Handler backed by a plain closure. See [`handler_fn`].
pub struct FnHandler<M, F> {
    f: F,
    _marker: PhantomData<fn(&mut M)>,
}

/// Wraps a synchronous closure as a [`Handler`].
///
/// ```ignore
/// registry.register(handler_fn(|_ctx, ping: &mut Ping| {
///     ping.count += 1;
///     Ok(())
/// }));
/// ```
pub fn handler_fn<M, F>(f: F) -> FnHandler<M, F>
where
    M: Message,
    F: Fn(&Context, &mut M) -> Result<(), BoxError> + Send + Sync,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<M, F> Handler<M> for FnHandler<M, F>
where
    M: Message,
    F: Fn(&Context, &mut M) -> Result<(), BoxError> + Send + Sync,
{
    async fn handle(&self, ctx: &Context, message: &mut M) -> Result<(), BoxError> {
        (self.f)(ctx, message)
    }
}
