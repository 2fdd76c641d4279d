//! # Delayed dispatch.
//!
//! A thin layer over the tokio timer: [`TimerPool::schedule`] arms a oneshot
//! delay that runs a boxed future unless its [`TimerHandle`] is revoked
//! first. Revocation is advisory: once the delay elapses and the future has
//! started, it runs to completion.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Handle to one armed timer entry.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    /// Revokes the entry. No-op when the dispatch already started.
    pub fn revoke(&self) {
        self.token.cancel();
    }

    /// True when [`revoke`](Self::revoke) was called.
    pub fn is_revoked(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Scheduler of delayed one-shot dispatches on the tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct TimerPool;

impl TimerPool {
    pub fn new() -> Self {
        Self
    }

    /// Arms `dispatch` to run after `delay`, unless revoked first.
    pub fn schedule(&self, delay: Duration, dispatch: BoxFuture<'static, ()>) -> TimerHandle {
        let token = CancellationToken::new();
        let guard = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(delay) => dispatch.await,
            }
        });
        TimerHandle { token }
    }

    /// Runs `dispatch` immediately (zero delay).
    pub fn submit(&self, dispatch: BoxFuture<'static, ()>) -> TimerHandle {
        self.schedule(Duration::ZERO, dispatch)
    }
}
