//! Typed - 型付き Handler API と Registry
//!
//! このモジュールはメッセージ型と Handler の対応付けを型で保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Message` trait, `Handler<M>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod handler;
pub mod registry;

// 主要な trait/型 を再エクスポート
pub use self::handler::{DynHandler, FnHandler, Handler, TypedHandler, handler_fn};
pub use self::registry::{Deferred, Registration, Registry, ResultCallback};
