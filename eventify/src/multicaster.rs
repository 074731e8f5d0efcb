//! 事件多播器（EventMulticaster）
//!
//! 持有 `EventType → [EventListener]` 注册表，把一个事件扇出给所有匹配的监听器：
//! - 桶键与事件类型相同或是其祖先（经 `EventTypeRegistry`）即匹配；
//! - 同一桶内按注册顺序调用，桶之间不保证顺序；
//! - 对每个监听器：幂等且已处理则跳过；否则按投递模式交给 `CompositeDispatcher`；
//!   成功后若为幂等监听器则标记已处理。
//!
//! 注册表采用写时复制：每个桶是 `Arc<Vec<_>>`，分发前先取快照。

use crate::dispatch::CompositeDispatcher;
use crate::error::{EventError, EventResult};
use crate::event::{EventType, EventTypeRegistry, SharedEvent};
use crate::idempotent::IdempotencyGuard;
use crate::listener::{DeliveryMode, EventListener};
use crate::scheduler::PhaseProcessor;
use crate::transaction::{Transaction, TransactionPhase};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error};

type Bucket = Arc<Vec<Arc<EventListener>>>;

pub struct EventMulticaster {
    buckets: DashMap<EventType, Bucket>,
    by_name: DashMap<String, Arc<EventListener>>,
    types: Arc<EventTypeRegistry>,
    guard: Arc<IdempotencyGuard>,
    dispatcher: Arc<CompositeDispatcher>,
}

impl EventMulticaster {
    pub fn new(
        types: Arc<EventTypeRegistry>,
        guard: Arc<IdempotencyGuard>,
        dispatcher: Arc<CompositeDispatcher>,
    ) -> Self {
        Self {
            buckets: DashMap::new(),
            by_name: DashMap::new(),
            types,
            guard,
            dispatcher,
        }
    }

    /// 追加到监听器声明类型的桶，不去重
    pub fn add_listener(&self, listener: EventListener) -> Arc<EventListener> {
        let listener = Arc::new(listener);

        self.buckets
            .entry(listener.event_type().clone())
            .and_modify(|bucket| {
                let mut next = Vec::with_capacity(bucket.len() + 1);
                next.extend(bucket.iter().cloned());
                next.push(listener.clone());
                *bucket = Arc::new(next);
            })
            .or_insert_with(|| Arc::new(vec![listener.clone()]));

        self.by_name
            .insert(listener.name().to_string(), listener.clone());

        debug!(
            listener = listener.name(),
            event_type = %listener.event_type(),
            mode = ?listener.mode().delivery(),
            "listener registered"
        );
        listener
    }

    /// 按名称查找（同名时为最后注册者）
    pub fn listener(&self, name: &str) -> Option<Arc<EventListener>> {
        self.by_name.get(name).map(|l| l.value().clone())
    }

    /// 所有已注册监听器的快照
    pub fn listeners(&self) -> Vec<Arc<EventListener>> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.value().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn types(&self) -> &Arc<EventTypeRegistry> {
        &self.types
    }

    /// 与事件运行时类型匹配的监听器快照
    pub fn matching(&self, event: &SharedEvent) -> Vec<Arc<EventListener>> {
        let event_type = EventType::from_static(event.event_type());
        let buckets: Vec<(EventType, Bucket)> = self
            .buckets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        buckets
            .into_iter()
            .filter(|(key, _)| self.types.is_assignable(key, &event_type))
            .flat_map(|(_, bucket)| bucket.iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// 扇出给所有匹配的监听器
    ///
    /// 每个监听器都会被尝试。同步非事务监听器的失败，以及非监听器自身的失败
    /// （配置、存储、事务状态）在全部尝试后以第一个错误返回；
    /// 其余形态的监听器失败只记录日志。
    pub async fn multicast(
        &self,
        event: &SharedEvent,
        tx: Option<&dyn Transaction>,
    ) -> EventResult<()> {
        let listeners = self.matching(event);
        if listeners.is_empty() {
            debug!(
                event_id = event.event_id(),
                event_type = event.event_type(),
                "no matching listener"
            );
            return Ok(());
        }

        let mut first_error: Option<EventError> = None;
        for listener in listeners {
            let Err(err) = self.process_event(event, &listener, tx).await else {
                continue;
            };

            error!(
                event_id = event.event_id(),
                event_type = event.event_type(),
                listener = listener.name(),
                error = %err,
                "listener delivery failed"
            );

            let surfaces = !err.is_listener_failure()
                || listener.mode().delivery() == DeliveryMode::Synchronous;
            if surfaces && first_error.is_none() {
                first_error = Some(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 已知目标监听器时的单点投递，所有错误原样返回
    pub async fn process_event(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
        tx: Option<&dyn Transaction>,
    ) -> EventResult<()> {
        let mode = listener.mode();

        if mode.is_idempotent() && self.guard.is_processed(event.as_ref()).await? {
            debug!(
                event_id = event.event_id(),
                listener = listener.name(),
                "already processed, skipped"
            );
            return Ok(());
        }

        match mode.delivery() {
            DeliveryMode::Synchronous => self.dispatcher.dispatch(event, listener).await?,
            DeliveryMode::Asynchronous => {
                // 入队即返回，完成情况由工作任务自行记录
                let _detached = self.dispatcher.dispatch_async(event, listener, None).await?;
            }
            DeliveryMode::Transactional(phase) => {
                self.dispatcher
                    .dispatch_transactional(event, listener, phase, tx)
                    .await?
            }
            DeliveryMode::AsyncTransactional(phase) => {
                self.dispatcher
                    .dispatch_async_transactional(event, listener, phase, tx)
                    .await?
            }
        }

        if mode.is_idempotent() {
            self.guard.mark_processed(event.as_ref()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PhaseProcessor for EventMulticaster {
    async fn deliver(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
    ) -> EventResult<()> {
        self.dispatcher.dispatch(event, listener).await
    }

    async fn deliver_async(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
        phase: Option<TransactionPhase>,
    ) -> EventResult<()> {
        let _detached = self.dispatcher.dispatch_async(event, listener, phase).await?;
        Ok(())
    }

    async fn multicast(&self, event: &SharedEvent) -> EventResult<()> {
        EventMulticaster::multicast(self, event, None).await
    }
}
