//! 事务阶段调度器（TransactionalScheduler）
//!
//! 按事务、按阶段缓冲投递，在事务到达对应阶段时统一冲刷：
//! - 无活跃事务或阶段为 `Immediate`：立即执行，不缓冲；
//! - 某阶段的第一条投递向事务注册一次阶段回调，之后的投递只追加缓冲；
//! - 冲刷先把该阶段置为已冲刷再取出缓冲，重入的冲刷是空操作；
//!   已冲刷阶段新到的投递直接执行；
//! - `after_completion` 时冲刷 `AfterCompletion` 缓冲并移除整个事务条目，
//!   未到达的阶段（如提交路径上的 `AfterRollback`）被丢弃。
//!
//! 冲刷中的单条失败只记录日志，不影响同批其余投递。

use crate::error::{EventError, EventResult};
use crate::event::SharedEvent;
use crate::listener::EventListener;
use crate::transaction::{
    Transaction, TransactionId, TransactionPhase, TransactionSynchronization,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, error};

/// 冲刷时真正执行投递的一方（通常是多播器）
#[async_trait]
pub trait PhaseProcessor: Send + Sync {
    async fn deliver(&self, event: &SharedEvent, listener: &Arc<EventListener>)
    -> EventResult<()>;

    async fn deliver_async(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
        phase: Option<TransactionPhase>,
    ) -> EventResult<()>;

    /// 无目标监听器的投递：扇出给所有匹配的监听器
    async fn multicast(&self, event: &SharedEvent) -> EventResult<()>;
}

/// 某阶段缓冲中的一条投递
#[derive(Clone, Debug)]
pub struct PendingDelivery {
    event: SharedEvent,
    listener: Option<Arc<EventListener>>,
    asynchronous: bool,
}

impl PendingDelivery {
    pub fn targeted(event: SharedEvent, listener: Arc<EventListener>, asynchronous: bool) -> Self {
        Self {
            event,
            listener: Some(listener),
            asynchronous,
        }
    }

    pub fn broadcast(event: SharedEvent) -> Self {
        Self {
            event,
            listener: None,
            asynchronous: false,
        }
    }

    pub fn event(&self) -> &SharedEvent {
        &self.event
    }

    pub fn listener(&self) -> Option<&Arc<EventListener>> {
        self.listener.as_ref()
    }

    pub fn is_async(&self) -> bool {
        self.asynchronous
    }
}

#[derive(Debug)]
enum PhaseState {
    Buffering(Vec<PendingDelivery>),
    Flushed,
}

enum Admission {
    Buffered,
    FirstInPhase,
    AlreadyFlushed(PendingDelivery),
}

#[derive(Default)]
pub struct TransactionalScheduler {
    buffers: DashMap<TransactionId, HashMap<TransactionPhase, PhaseState>>,
    processor: OnceLock<Weak<dyn PhaseProcessor>>,
}

impl TransactionalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定执行方，只能绑定一次
    pub fn bind(&self, processor: Weak<dyn PhaseProcessor>) -> EventResult<()> {
        self.processor
            .set(processor)
            .map_err(|_| EventError::configuration("scheduler is already bound"))
    }

    fn processor(&self) -> EventResult<Arc<dyn PhaseProcessor>> {
        self.processor
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| EventError::configuration("scheduler is not bound to a processor"))
    }

    /// 当前持有缓冲的事务数
    pub fn active_transactions(&self) -> usize {
        self.buffers.len()
    }

    /// 某事务某阶段尚未冲刷的投递数
    pub fn pending(&self, tx: TransactionId, phase: TransactionPhase) -> usize {
        self.buffers
            .get(&tx)
            .and_then(|states| match states.get(&phase) {
                Some(PhaseState::Buffering(list)) => Some(list.len()),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub async fn schedule(
        self: &Arc<Self>,
        delivery: PendingDelivery,
        phase: TransactionPhase,
        tx: Option<&dyn Transaction>,
    ) -> EventResult<()> {
        let tx = match tx {
            Some(tx) if phase != TransactionPhase::Immediate && tx.is_active() => tx,
            _ => return self.execute(delivery, phase).await,
        };
        let tx_id = tx.id();

        let admission = {
            let mut states = self.buffers.entry(tx_id).or_default();
            match states.get_mut(&phase) {
                Some(PhaseState::Buffering(list)) => {
                    list.push(delivery);
                    Admission::Buffered
                }
                Some(PhaseState::Flushed) => Admission::AlreadyFlushed(delivery),
                None => {
                    states.insert(phase, PhaseState::Buffering(vec![delivery]));
                    Admission::FirstInPhase
                }
            }
        };

        match admission {
            Admission::Buffered => {
                debug!(%tx_id, phase = phase.name(), "delivery buffered");
                Ok(())
            }
            Admission::FirstInPhase => {
                let synchronization = Arc::new(PhaseSynchronization {
                    scheduler: Arc::downgrade(self),
                    tx: tx_id,
                    phase,
                });
                if let Err(err) = tx.register_synchronization(synchronization) {
                    self.forget(tx_id, phase);
                    return Err(err);
                }
                debug!(%tx_id, phase = phase.name(), "phase synchronization registered");
                Ok(())
            }
            Admission::AlreadyFlushed(delivery) => self.execute(delivery, phase).await,
        }
    }

    fn forget(&self, tx_id: TransactionId, phase: TransactionPhase) {
        let now_empty = match self.buffers.get_mut(&tx_id) {
            Some(mut states) => {
                states.remove(&phase);
                states.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.buffers.remove_if(&tx_id, |_, states| states.is_empty());
        }
    }

    async fn execute(&self, delivery: PendingDelivery, phase: TransactionPhase) -> EventResult<()> {
        let processor = self.processor()?;
        let PendingDelivery {
            event,
            listener,
            asynchronous,
        } = delivery;

        match listener {
            Some(listener) if asynchronous => {
                let phase = Some(phase).filter(|p| *p != TransactionPhase::Immediate);
                processor.deliver_async(&event, &listener, phase).await
            }
            Some(listener) => processor.deliver(&event, &listener).await,
            None => processor.multicast(&event).await,
        }
    }

    async fn run_isolated(
        &self,
        tx_id: TransactionId,
        phase: TransactionPhase,
        list: Vec<PendingDelivery>,
    ) {
        for delivery in list {
            let event_id = delivery.event().event_id().to_string();
            let listener = delivery
                .listener()
                .map(|l| l.name().to_string())
                .unwrap_or_else(|| "*".to_string());

            if let Err(err) = self.execute(delivery, phase).await {
                error!(
                    %tx_id,
                    phase = phase.name(),
                    event_id = %event_id,
                    listener = %listener,
                    error = %err,
                    "phase delivery failed"
                );
            }
        }
    }

    async fn flush(&self, tx_id: TransactionId, phase: TransactionPhase) {
        let drained = match self.buffers.get_mut(&tx_id) {
            Some(mut states) => match states.insert(phase, PhaseState::Flushed) {
                Some(PhaseState::Buffering(list)) => list,
                _ => Vec::new(),
            },
            None => Vec::new(),
        };

        if drained.is_empty() {
            return;
        }
        debug!(%tx_id, phase = phase.name(), count = drained.len(), "flushing phase");
        self.run_isolated(tx_id, phase, drained).await;
    }

    async fn complete(&self, tx_id: TransactionId) {
        let Some((_, states)) = self.buffers.remove(&tx_id) else {
            return;
        };

        let mut completion = Vec::new();
        for (phase, state) in states {
            match state {
                PhaseState::Buffering(list) if phase == TransactionPhase::AfterCompletion => {
                    completion = list;
                }
                PhaseState::Buffering(list) => {
                    debug!(
                        %tx_id,
                        phase = phase.name(),
                        count = list.len(),
                        "phase not reached, buffered deliveries discarded"
                    );
                }
                PhaseState::Flushed => {}
            }
        }

        if !completion.is_empty() {
            debug!(%tx_id, count = completion.len(), "flushing AFTER_COMPLETION");
            self.run_isolated(tx_id, TransactionPhase::AfterCompletion, completion)
                .await;
        }
    }
}

/// 每个 (事务, 阶段) 注册一次的回调
///
/// 自身阶段的钩子触发冲刷；`after_completion` 总会收尾整个事务。
struct PhaseSynchronization {
    scheduler: Weak<TransactionalScheduler>,
    tx: TransactionId,
    phase: TransactionPhase,
}

impl PhaseSynchronization {
    async fn on_phase(&self, reached: TransactionPhase) {
        if reached != self.phase {
            return;
        }
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.flush(self.tx, reached).await;
        }
    }
}

#[async_trait]
impl TransactionSynchronization for PhaseSynchronization {
    async fn before_commit(&self) {
        self.on_phase(TransactionPhase::BeforeCommit).await;
    }

    async fn after_commit(&self) {
        self.on_phase(TransactionPhase::AfterCommit).await;
    }

    async fn after_rollback(&self) {
        self.on_phase(TransactionPhase::AfterRollback).await;
    }

    async fn after_completion(&self) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.complete(self.tx).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventHeader};
    use crate::listener::{EventHandler, ListenerMode};
    use crate::transaction::LocalTransactionManager;
    use serde::Serialize;
    use std::sync::Mutex;

    #[derive(Debug, Serialize)]
    struct Noted {
        header: EventHeader,
    }
    impl Event for Noted {
        fn header(&self) -> &EventHeader {
            &self.header
        }
        fn event_type(&self) -> &'static str {
            "Noted"
        }
    }

    struct Noop;
    #[async_trait]
    impl EventHandler<dyn Event> for Noop {
        async fn on_event(&self, _: &dyn Event) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// 记录执行轨迹的执行方
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PhaseProcessor for Recorder {
        async fn deliver(&self, _: &SharedEvent, listener: &Arc<EventListener>) -> EventResult<()> {
            self.calls.lock().unwrap().push(format!("sync:{}", listener.name()));
            if listener.name() == "failing" {
                return Err(EventError::Listener {
                    listener: listener.name().to_string(),
                    reason: "boom".to_string(),
                });
            }
            Ok(())
        }
        async fn deliver_async(
            &self,
            _: &SharedEvent,
            listener: &Arc<EventListener>,
            phase: Option<TransactionPhase>,
        ) -> EventResult<()> {
            self.calls.lock().unwrap().push(format!(
                "async:{}:{}",
                listener.name(),
                phase.map(|p| p.name()).unwrap_or("-")
            ));
            Ok(())
        }
        async fn multicast(&self, _: &SharedEvent) -> EventResult<()> {
            self.calls.lock().unwrap().push("multicast".to_string());
            Ok(())
        }
    }

    fn bound() -> (Arc<TransactionalScheduler>, Arc<Recorder>) {
        let scheduler = Arc::new(TransactionalScheduler::new());
        let recorder = Arc::new(Recorder::default());
        let processor: Arc<dyn PhaseProcessor> = recorder.clone();
        scheduler.bind(Arc::downgrade(&processor)).unwrap();
        (scheduler, recorder)
    }

    fn event() -> SharedEvent {
        Arc::new(Noted {
            header: EventHeader::new(),
        })
    }

    fn listener(name: &str) -> Arc<EventListener> {
        Arc::new(EventListener::dynamic(name, "Noted", Noop, ListenerMode::default()))
    }

    fn calls(recorder: &Recorder) -> Vec<String> {
        recorder.calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn without_transaction_executes_immediately() {
        let (scheduler, recorder) = bound();
        scheduler
            .schedule(
                PendingDelivery::targeted(event(), listener("a"), false),
                TransactionPhase::AfterCommit,
                None,
            )
            .await
            .unwrap();
        assert_eq!(calls(&recorder), vec!["sync:a"]);
        assert_eq!(scheduler.active_transactions(), 0);
    }

    #[tokio::test]
    async fn immediate_phase_ignores_active_transaction() {
        let (scheduler, recorder) = bound();
        let manager = LocalTransactionManager::new();
        let tx = manager.begin();

        scheduler
            .schedule(
                PendingDelivery::targeted(event(), listener("a"), true),
                TransactionPhase::Immediate,
                Some(&*tx),
            )
            .await
            .unwrap();
        assert_eq!(calls(&recorder), vec!["async:a:-"]);
        assert_eq!(tx.synchronization_count(), 0);
        manager.rollback(&tx).await.unwrap();
    }

    #[tokio::test]
    async fn registers_once_per_phase_and_flushes_in_order() {
        let (scheduler, recorder) = bound();
        let manager = LocalTransactionManager::new();
        let tx = manager.begin();

        for (name, phase) in [
            ("after-1", TransactionPhase::AfterCommit),
            ("before", TransactionPhase::BeforeCommit),
            ("after-2", TransactionPhase::AfterCommit),
            ("done", TransactionPhase::AfterCompletion),
        ] {
            scheduler
                .schedule(
                    PendingDelivery::targeted(event(), listener(name), false),
                    phase,
                    Some(&*tx),
                )
                .await
                .unwrap();
        }
        assert_eq!(tx.synchronization_count(), 3);
        assert_eq!(scheduler.pending(tx.id(), TransactionPhase::AfterCommit), 2);
        assert!(calls(&recorder).is_empty());

        manager.commit(&tx).await.unwrap();

        assert_eq!(
            calls(&recorder),
            vec!["sync:before", "sync:after-1", "sync:after-2", "sync:done"]
        );
        assert_eq!(scheduler.active_transactions(), 0);
    }

    #[tokio::test]
    async fn rollback_discards_commit_phases() {
        let (scheduler, recorder) = bound();
        let manager = LocalTransactionManager::new();
        let tx = manager.begin();

        for (name, phase) in [
            ("committed", TransactionPhase::AfterCommit),
            ("rolled-back", TransactionPhase::AfterRollback),
            ("done", TransactionPhase::AfterCompletion),
        ] {
            scheduler
                .schedule(
                    PendingDelivery::targeted(event(), listener(name), false),
                    phase,
                    Some(&*tx),
                )
                .await
                .unwrap();
        }
        manager.rollback(&tx).await.unwrap();

        assert_eq!(calls(&recorder), vec!["sync:rolled-back", "sync:done"]);
        assert_eq!(scheduler.active_transactions(), 0);
    }

    #[tokio::test]
    async fn flush_isolates_failures_and_keeps_async_phase() {
        let (scheduler, recorder) = bound();
        let manager = LocalTransactionManager::new();
        let tx = manager.begin();

        for (name, asynchronous) in [("failing", false), ("worker", true)] {
            scheduler
                .schedule(
                    PendingDelivery::targeted(event(), listener(name), asynchronous),
                    TransactionPhase::AfterCommit,
                    Some(&*tx),
                )
                .await
                .unwrap();
        }
        scheduler
            .schedule(
                PendingDelivery::broadcast(event()),
                TransactionPhase::AfterCommit,
                Some(&*tx),
            )
            .await
            .unwrap();

        manager.commit(&tx).await.unwrap();

        assert_eq!(
            calls(&recorder),
            vec!["sync:failing", "async:worker:AFTER_COMMIT", "multicast"]
        );
    }

    #[tokio::test]
    async fn unbound_scheduler_reports_configuration_error() {
        let scheduler = Arc::new(TransactionalScheduler::new());
        let err = scheduler
            .schedule(PendingDelivery::broadcast(event()), TransactionPhase::AfterCommit, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Configuration { .. }));
    }
}
