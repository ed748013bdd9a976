//! courier-core
//!
//! プロセス内の型付きメッセージ dispatch。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（key, message, context, errors, events）
//! - **ports**: 抽象化レイヤー（Clock, EventSink）
//! - **typed**: 型付き Handler API（Handler trait, Registry, 遅延 dispatch）
//! - **app**: 外側の入口（builder, デフォルト Registry, RPC binding）

pub mod app;
pub mod domain;
pub mod ports;
pub mod typed;

pub use app::global::{dispatch, dispatch_after, dispatch_at, register, send};
pub use app::{
    BuildError, Codec, JsonCodec, RegistryBuilder, Reply, RpcBinder, RpcError, default_registry,
};
pub use domain::{
    AnyMessage, Batch, BoxError, CancelHandle, Context, ContextError, DispatchError, Envelope,
    Message, MessageKey,
};
pub use typed::{Deferred, Handler, Registry, ResultCallback, handler_fn};
