//! Ports - 抽象化レイヤー
//!
//! Registry が外部に依存する部分（時刻・診断出力）を trait で切り出します。

pub mod clock;
pub mod event_sink;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, NoopEventSink, TracingEventSink};
