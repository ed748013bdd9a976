//! EventSink port - 診断イベントの出力先
//!
//! Registry は登録と dispatch のたびに DispatchEvent を送ります。
//! 出力先が無くても振る舞いは変わりません（観測性だけが変わる）。
//!
//! # 実装
//! - TracingEventSink: `tracing` に debug レベルで出力（デフォルト）
//! - NoopEventSink: 何もしない

use tracing::{debug, warn};

use crate::domain::DispatchEvent;

/// Write-only sink for registry diagnostics.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DispatchEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::Registered { key, handler } => {
                debug!(message_key = %key, handler = %handler, "courier: register");
            }
            DispatchEvent::Dispatching { key } => {
                debug!(message_key = %key, "courier: dispatching");
            }
            DispatchEvent::Scheduled { delay, messages } => {
                debug!(?delay, messages, "courier: deferred dispatch scheduled");
            }
            DispatchEvent::Abandoned { reason } => {
                warn!(reason = %reason, "courier: deferred dispatch abandoned");
            }
        }
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &DispatchEvent) {}
}
