//! Errors - dispatch のエラー分類
//!
//! - InvalidMessage: キーを導出できない値（メッセージではない）
//! - HandlerNotFound: 有効なメッセージだが Handler が未登録
//! - Handler: Handler が返したエラー（そのまま透過）
//! - Context: 遅延 dispatch がキャンセル / deadline 超過で中止された
//!
//! 登録時の形状エラーは値ではなく panic です（コードの欠陥なので）。

use std::error::Error;

use thiserror::Error;

use super::context::ContextError;
use super::key::MessageKey;

/// Error type handlers report. Carried through dispatch untouched.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("courier: invalid message type '{0}'")]
    InvalidMessage(&'static str),

    #[error("courier: handler not found for message={0}")]
    HandlerNotFound(MessageKey),

    #[error("{0}")]
    Handler(BoxError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl DispatchError {
    pub fn is_invalid_message(&self) -> bool {
        matches!(self, Self::InvalidMessage(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HandlerNotFound(_))
    }

    /// The error a handler reported, if this is one.
    pub fn handler_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Self::Handler(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Takes the handler's error back out, or returns `self` for errors the
    /// registry raised itself.
    pub fn into_handler_error(self) -> Result<BoxError, Self> {
        match self {
            Self::Handler(err) => Ok(err),
            other => Err(other),
        }
    }
}
