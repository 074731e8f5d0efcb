//! 本地分发后端（LocalBackend）
//!
//! 同步投递在调用方任务内执行；异步投递提交到 `WorkerPool`。
//! 未配置工作池时，异步投递同步返回配置错误，不会静默丢弃。

use super::{BackendKind, DeliveryHandle, DispatchBackend};
use crate::error::{EventError, EventResult};
use crate::event::SharedEvent;
use crate::listener::EventListener;
use crate::transaction::TransactionPhase;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// 异步执行器：tokio 运行时句柄 + 可选的并发上限
#[derive(Clone, Debug)]
pub struct WorkerPool {
    runtime: Handle,
    permits: Option<Arc<Semaphore>>,
}

impl WorkerPool {
    /// `concurrency` 为 `None` 时不限并发，其余取值收敛到 `1..=Semaphore::MAX_PERMITS`
    pub fn new(runtime: Handle, concurrency: Option<usize>) -> Self {
        Self {
            runtime,
            permits: concurrency
                .map(|n| Arc::new(Semaphore::new(n.clamp(1, Semaphore::MAX_PERMITS)))),
        }
    }

    /// 使用当前所在的 tokio 运行时
    pub fn current(concurrency: Option<usize>) -> EventResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| EventError::configuration(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(runtime, concurrency))
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = self.permits.clone();
        self.runtime.spawn(async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            task.await
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct LocalBackend {
    pool: Option<WorkerPool>,
}

impl LocalBackend {
    pub fn new(pool: Option<WorkerPool>) -> Self {
        Self { pool }
    }

    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }
}

#[async_trait]
impl DispatchBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn deliver(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
    ) -> EventResult<()> {
        debug!(
            event_id = event.event_id(),
            event_type = event.event_type(),
            listener = listener.name(),
            "delivering inline"
        );
        listener.invoke(event).await
    }

    async fn deliver_async(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
        phase: Option<TransactionPhase>,
    ) -> EventResult<DeliveryHandle> {
        let Some(pool) = &self.pool else {
            return Err(EventError::configuration(format!(
                "async delivery of {} to {} requested but no worker pool is configured",
                event.event_type(),
                listener.name()
            )));
        };

        let event = event.clone();
        let listener = listener.clone();
        let handle = pool.spawn(async move {
            let result = listener.invoke(&event).await;
            if let Err(err) = &result {
                error!(
                    event_id = event.event_id(),
                    event_type = event.event_type(),
                    listener = listener.name(),
                    phase = phase.map(|p| p.name()),
                    error = %err,
                    "async listener failed"
                );
            }
            result
        });

        Ok(DeliveryHandle::spawned(handle))
    }
}
