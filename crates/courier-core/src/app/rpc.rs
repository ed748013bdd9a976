//! RpcBinder - 外部リクエストとメッセージの変換
//!
//! path ごとにメッセージ型を 1 つ結び付けます。
//!
//! # フロー
//! 1. path から Route（型ごとの小さな factory）を引く
//! 2. Codec で body を中間表現（`serde_json::Value`）に変換し、新しいメッセージ値へ
//! 3. Registry で dispatch
//! 4. Handler が書き込んだ `Reply::reply()` を Codec でエンコード
//!
//! Codec（デフォルトは JSON）とエラー → ステータスの対応付けはこの層の責務で、
//! どちらも差し替え可能です。

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::global::default_registry;
use crate::domain::{BoxError, Context, DispatchError, Message};
use crate::typed::Registry;

/// Names the member a handler writes its result into.
///
/// Only messages implementing `Reply` can be bound to a path.
pub trait Reply {
    type Output: Serialize;

    fn reply(&self) -> &Self::Output;
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("courier/rpc: no message bound to path '{0}'")]
    RouteNotFound(String),

    #[error("courier/rpc: decode request: {0}")]
    Decode(#[source] BoxError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("courier/rpc: encode reply: {0}")]
    Encode(#[source] BoxError),
}

/// Wire format of request and reply bodies.
///
/// Bodies pass through `serde_json::Value`, so any format that maps onto the
/// serde data model can be plugged in.
pub trait Codec: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<Value, BoxError>;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, BoxError>;
}

/// Default codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, body: &[u8]) -> Result<Value, BoxError> {
        Ok(serde_json::from_slice(body)?)
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, BoxError> {
        Ok(serde_json::to_vec(value)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RpcResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

pub type ErrorEncoder = Arc<dyn Fn(&RpcError) -> RpcResponse + Send + Sync>;

/// 404 for unknown routes and unbound messages, 400 for undecodable input,
/// 500 for everything else. The body is the error text.
pub fn default_error_encoder(err: &RpcError) -> RpcResponse {
    let status = match err {
        RpcError::RouteNotFound(_) => 404,
        RpcError::Dispatch(DispatchError::HandlerNotFound(_)) => 404,
        RpcError::Decode(_) => 400,
        _ => 500,
    };
    RpcResponse::new(status, err.to_string())
}

#[async_trait]
trait Route: Send + Sync {
    async fn invoke(
        &self,
        registry: &Registry,
        codec: &dyn Codec,
        ctx: &Context,
        body: &[u8],
    ) -> Result<Vec<u8>, RpcError>;
}

struct TypedRoute<M> {
    _marker: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M> Route for TypedRoute<M>
where
    M: Message + DeserializeOwned + Reply,
{
    async fn invoke(
        &self,
        registry: &Registry,
        codec: &dyn Codec,
        ctx: &Context,
        body: &[u8],
    ) -> Result<Vec<u8>, RpcError> {
        let value = codec.decode(body).map_err(RpcError::Decode)?;
        let mut message: M =
            serde_json::from_value(value).map_err(|e| RpcError::Decode(e.into()))?;
        registry.send(ctx, &mut message).await?;
        let reply = serde_json::to_value(message.reply()).map_err(|e| RpcError::Encode(e.into()))?;
        codec.encode(&reply).map_err(RpcError::Encode)
    }
}

pub struct RpcBinder {
    registry: Registry,
    routes: HashMap<String, Arc<dyn Route>>,
    codec: Arc<dyn Codec>,
    error_encoder: ErrorEncoder,
}

impl RpcBinder {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            routes: HashMap::new(),
            codec: Arc::new(JsonCodec),
            error_encoder: Arc::new(default_error_encoder),
        }
    }

    /// Binds `path` to message type `M`.
    ///
    /// # Panics
    /// If `path` is already bound.
    pub fn bind<M>(&mut self, path: impl Into<String>) -> &mut Self
    where
        M: Message + DeserializeOwned + Reply,
    {
        let path = path.into();
        if self.routes.contains_key(&path) {
            panic!("courier/rpc: path '{path}' is already bound");
        }
        self.routes.insert(
            path,
            Arc::new(TypedRoute::<M> {
                _marker: PhantomData,
            }),
        );
        self
    }

    /// Replaces the JSON codec for every bound path.
    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn with_error_encoder(
        mut self,
        encoder: impl Fn(&RpcError) -> RpcResponse + Send + Sync + 'static,
    ) -> Self {
        self.error_encoder = Arc::new(encoder);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Bound paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Decodes `body` into the message bound to `path`, dispatches it, and
    /// returns its encoded reply.
    pub async fn call(&self, ctx: &Context, path: &str, body: &[u8]) -> Result<Vec<u8>, RpcError> {
        let route = self
            .routes
            .get(path)
            .cloned()
            .ok_or_else(|| RpcError::RouteNotFound(path.to_string()))?;
        route.invoke(&self.registry, self.codec.as_ref(), ctx, body).await
    }

    /// Like [`call`](Self::call), with errors translated by the error encoder.
    pub async fn serve(&self, ctx: &Context, path: &str, body: &[u8]) -> RpcResponse {
        match self.call(ctx, path, body).await {
            Ok(body) => RpcResponse::new(200, body),
            Err(err) => (self.error_encoder)(&err),
        }
    }
}

impl Default for RpcBinder {
    /// Bound to the process-wide default registry.
    fn default() -> Self {
        Self::new(default_registry().clone())
    }
}
