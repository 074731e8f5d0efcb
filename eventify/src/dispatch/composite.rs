//! 组合分发器（CompositeDispatcher）
//!
//! 每次调用都重新经 `DispatchPolicy` 选择后端，后端替换对下一次分发立即生效。
//! 非默认后端报告不可用时记录告警，并在默认后端上重新分发。
//! 事务性入口交给 `TransactionalScheduler` 缓冲或立即执行。

use super::{DeliveryHandle, DispatchBackend, DispatchPolicy};
use crate::error::{EventError, EventResult};
use crate::event::SharedEvent;
use crate::listener::EventListener;
use crate::scheduler::{PendingDelivery, TransactionalScheduler};
use crate::transaction::{Transaction, TransactionPhase};
use std::sync::Arc;
use tracing::warn;

pub struct CompositeDispatcher {
    policy: Arc<DispatchPolicy>,
    scheduler: Arc<TransactionalScheduler>,
}

impl CompositeDispatcher {
    pub fn new(policy: Arc<DispatchPolicy>, scheduler: Arc<TransactionalScheduler>) -> Self {
        Self { policy, scheduler }
    }

    pub fn policy(&self) -> &Arc<DispatchPolicy> {
        &self.policy
    }

    pub async fn dispatch(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
    ) -> EventResult<()> {
        let backend = self.policy.select(event.as_ref(), listener)?;
        match backend.deliver(event, listener).await {
            Err(err) if err.is_backend_unavailable() => {
                let fallback = self.fallback(backend.as_ref(), err, event, listener)?;
                fallback.deliver(event, listener).await
            }
            other => other,
        }
    }

    pub async fn dispatch_async(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
        phase: Option<TransactionPhase>,
    ) -> EventResult<DeliveryHandle> {
        let backend = self.policy.select(event.as_ref(), listener)?;
        match backend.deliver_async(event, listener, phase).await {
            Err(err) if err.is_backend_unavailable() => {
                let fallback = self.fallback(backend.as_ref(), err, event, listener)?;
                fallback.deliver_async(event, listener, phase).await
            }
            other => other,
        }
    }

    pub async fn dispatch_transactional(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
        phase: TransactionPhase,
        tx: Option<&dyn Transaction>,
    ) -> EventResult<()> {
        let delivery = PendingDelivery::targeted(event.clone(), listener.clone(), false);
        self.scheduler.schedule(delivery, phase, tx).await
    }

    pub async fn dispatch_async_transactional(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
        phase: TransactionPhase,
        tx: Option<&dyn Transaction>,
    ) -> EventResult<()> {
        let delivery = PendingDelivery::targeted(event.clone(), listener.clone(), true);
        self.scheduler.schedule(delivery, phase, tx).await
    }

    fn fallback(
        &self,
        failed: &dyn DispatchBackend,
        err: EventError,
        event: &SharedEvent,
        listener: &EventListener,
    ) -> EventResult<Arc<dyn DispatchBackend>> {
        let default = self.policy.default_backend()?;
        if default.kind() == failed.kind() {
            return Err(err);
        }

        warn!(
            event_id = event.event_id(),
            event_type = event.event_type(),
            listener = listener.name(),
            backend = %failed.kind(),
            fallback = %default.kind(),
            error = %err,
            "backend unavailable, falling back to default"
        );
        Ok(default)
    }
}
