//! 幂等记录的周期清理
//!
//! 每隔 `cleanup_interval` 调用一次 `IdempotencyGuard::cleanup_old_events`，
//! 清理失败只记录日志，下个周期继续。

use crate::background::{TaskHandle, spawn_periodic};
use crate::idempotent::IdempotencyGuard;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub(crate) fn start(
    runtime: &Handle,
    guard: Arc<IdempotencyGuard>,
    retention: Duration,
    interval: Duration,
) -> TaskHandle {
    let token = CancellationToken::new();

    let task = spawn_periodic(runtime, token.clone(), interval, move || {
        let guard = guard.clone();
        async move {
            match guard.cleanup_old_events(retention).await {
                Ok(removed) => debug!(removed, "idempotency maintenance finished"),
                Err(err) => error!(error = %err, "idempotency maintenance failed"),
            }
        }
    });

    TaskHandle::new(token, vec![task])
}
