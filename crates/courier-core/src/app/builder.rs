//! RegistryBuilder - Registry の構築とワイヤリング
//!
//! # 設計
//! - 初期化フェーズで全 Handler を登録してから Registry を組み立てる
//! - 起動時検証（Fail-fast）: 期待されるメッセージ型が全て登録されているか
//! - EventSink / Clock の差し替え

use std::sync::Arc;

use crate::domain::{Message, MessageKey};
use crate::ports::{Clock, EventSink, SystemClock, TracingEventSink};
use crate::typed::registry::routable_key;
use crate::typed::{Handler, Registration, Registry};

/// RegistryBuilder は Registry を構築
///
/// # 使用例
/// ```ignore
/// let registry = RegistryBuilder::new()
///     .register(PlaceOrderHandler)
///     .expect::<PlaceOrder>()
///     .event_sink(NoopEventSink)
///     .build()?;
/// ```
pub struct RegistryBuilder {
    registrations: Vec<Registration>,
    expected: Vec<MessageKey>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

/// BuildError は Registry 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing handlers for message types: {}", join_keys(.0))]
    MissingMessageTypes(Vec<MessageKey>),
}

fn join_keys(keys: &[MessageKey]) -> String {
    keys.iter()
        .map(MessageKey::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            expected: Vec::new(),
            sink: Arc::new(TracingEventSink),
            clock: Arc::new(SystemClock),
        }
    }

    /// Handler を登録
    ///
    /// # Panics
    /// `M` がルーティング可能な型でない場合（[`Registration::new`] を参照）
    pub fn register<M: Message, H: Handler<M> + 'static>(mut self, handler: H) -> Self {
        self.registrations.push(Registration::new(handler));
        self
    }

    /// build() 時に `M` の Handler が登録済みであることを要求
    pub fn expect<M: Message>(mut self) -> Self {
        let key = routable_key::<M>();
        if !self.expected.contains(&key) {
            self.expected.push(key);
        }
        self
    }

    pub fn event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// # 検証
    /// - expect() で指定された型が全て登録されているかチェック
    /// - 不足があれば BuildError::MissingMessageTypes を返す
    pub fn build(self) -> Result<Registry, BuildError> {
        let missing: Vec<MessageKey> = self
            .expected
            .iter()
            .filter(|key| !self.registrations.iter().any(|r| r.key() == **key))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingMessageTypes(missing));
        }

        let registry = Registry::with_parts(self.sink, self.clock);
        registry.register_all(self.registrations);
        Ok(registry)
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
