//! Context - キャンセル可能な実行コンテキスト
//!
//! Handler に渡され、遅延 dispatch ではタイマーと競合します。
//!
//! # 実装
//! - キャンセルは `watch` チャネルで通知（worker の shutdown と同じ方式）
//! - deadline は `tokio::time::Instant`
//! - 親がキャンセルされると子もキャンセルされる

use std::future::{Future, pending};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

struct Scope {
    parent: Option<Context>,
    cancel: Option<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

/// Cancellation-aware context passed to every handler.
///
/// Cheap to clone; clones observe the same cancellation.
#[derive(Clone)]
pub struct Context {
    scope: Arc<Scope>,
}

/// Cancels the context it was created with, and all of that context's children.
///
/// Dropping the handle does not cancel.
pub struct CancelHandle {
    scope: Arc<Scope>,
}

impl Context {
    /// A context that is never done.
    pub fn background() -> Self {
        Self {
            scope: Arc::new(Scope {
                parent: None,
                cancel: None,
                deadline: None,
            }),
        }
    }

    pub fn with_cancel(parent: &Context) -> (Context, CancelHandle) {
        Self::child(parent, None)
    }

    /// Child context that is done at `deadline`, or earlier if canceled.
    pub fn with_deadline(parent: &Context, deadline: Instant) -> (Context, CancelHandle) {
        Self::child(parent, Some(deadline))
    }

    pub fn with_timeout(parent: &Context, timeout: Duration) -> (Context, CancelHandle) {
        Self::with_deadline(parent, Instant::now() + timeout)
    }

    fn child(parent: &Context, deadline: Option<Instant>) -> (Context, CancelHandle) {
        let (cancel, _) = watch::channel(false);
        let scope = Arc::new(Scope {
            parent: Some(parent.clone()),
            cancel: Some(cancel),
            deadline,
        });
        (
            Context {
                scope: Arc::clone(&scope),
            },
            CancelHandle { scope },
        )
    }

    /// Earliest deadline along the parent chain.
    pub fn deadline(&self) -> Option<Instant> {
        let own = self.scope.deadline;
        let inherited = self.scope.parent.as_ref().and_then(Context::deadline);
        match (own, inherited) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// `None` while the context is live, otherwise the reason it is done.
    pub fn err(&self) -> Option<ContextError> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            let scope = &ctx.scope;
            if scope.cancel.as_ref().is_some_and(|tx| *tx.borrow()) {
                return Some(ContextError::Canceled);
            }
            if scope.deadline.is_some_and(|d| Instant::now() >= d) {
                return Some(ContextError::DeadlineExceeded);
            }
            current = scope.parent.as_ref();
        }
        None
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is canceled or its deadline passes.
    ///
    /// Never resolves for [`Context::background`].
    pub fn done(&self) -> Pin<Box<dyn Future<Output = ContextError> + Send + '_>> {
        Box::pin(async move {
            if let Some(err) = self.err() {
                return err;
            }

            let scope = &self.scope;
            let canceled = async {
                let Some(tx) = &scope.cancel else {
                    return pending::<()>().await;
                };
                let mut rx = tx.subscribe();
                loop {
                    let canceled = *rx.borrow_and_update();
                    if canceled {
                        return;
                    }
                    // The sender lives in `scope`, so this only fails if it is gone for good.
                    if rx.changed().await.is_err() {
                        return pending::<()>().await;
                    }
                }
            };
            let expired = async {
                match scope.deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => pending::<()>().await,
                }
            };
            let inherited = async {
                match &scope.parent {
                    Some(parent) => parent.done().await,
                    None => pending::<ContextError>().await,
                }
            };

            tokio::select! {
                () = canceled => ContextError::Canceled,
                () = expired => ContextError::DeadlineExceeded,
                err = inherited => err,
            }
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("err", &self.err())
            .field("deadline", &self.deadline())
            .finish()
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        if let Some(tx) = &self.scope.cancel {
            tx.send_replace(true);
        }
    }
}
