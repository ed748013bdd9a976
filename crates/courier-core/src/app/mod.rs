//! App - アプリケーション層
//!
//! このモジュールは、typed の Registry を組み合わせて外側から使う入口を提供します。
//!
//! # 主要コンポーネント
//! - **RegistryBuilder**: Registry の構築と起動時検証
//! - **global**: プロセス全体で共有されるデフォルト Registry と便利関数
//! - **RpcBinder**: path ↔ メッセージ型の対応付けと Codec（デフォルト JSON）による変換

pub mod builder;
pub mod global;
pub mod rpc;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, RegistryBuilder};
pub use self::global::default_registry;
pub use self::rpc::{
    Codec, ErrorEncoder, JsonCodec, Reply, RpcBinder, RpcError, RpcResponse, default_error_encoder,
};
