//! 进程内事务管理器
//!
//! 不绑定任何存储资源，仅负责事务状态与阶段回调的驱动：
//! - `commit`：`before_commit` → 标记已提交 → `after_commit` → `after_completion`；
//! - `rollback`：标记已回滚 → `after_rollback` → `after_completion`；
//! - 标记为仅回滚（rollback-only）的事务在提交时被回滚并返回错误。
//!
//! 适用于测试、示例，以及业务侧自行管理资源、只需要阶段通知的场景。
use super::synchronization::fire;
use super::{Transaction, TransactionId, TransactionPhase, TransactionSynchronization};
use crate::error::{EventError, EventResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
}

pub struct LocalTransaction {
    id: TransactionId,
    status: Mutex<TransactionStatus>,
    rollback_only: AtomicBool,
    synchronizations: Mutex<Vec<Arc<dyn TransactionSynchronization>>>,
}

impl LocalTransaction {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: Mutex::new(TransactionStatus::Active),
            rollback_only: AtomicBool::new(false),
            synchronizations: Mutex::new(Vec::new()),
        }
    }

    pub fn status(&self) -> TransactionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    pub fn synchronization_count(&self) -> usize {
        self.synchronizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 仅当事务仍活跃时切换状态
    fn finish(&self, to: TransactionStatus) -> EventResult<()> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status != TransactionStatus::Active {
            return Err(EventError::illegal_state(format!(
                "transaction {} is not active",
                self.id
            )));
        }
        *status = to;
        Ok(())
    }

    /// 逐个调用回调；回合中新注册的回调同样会被调用
    async fn fire_round(&self, phase: TransactionPhase) {
        let mut index = 0;
        loop {
            let next = self
                .synchronizations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(index)
                .cloned();
            let Some(sync) = next else { break };
            fire(sync.as_ref(), phase).await;
            index += 1;
        }
    }

    fn clear(&self) {
        self.synchronizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Transaction for LocalTransaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    fn register_synchronization(
        &self,
        synchronization: Arc<dyn TransactionSynchronization>,
    ) -> EventResult<()> {
        if !self.is_active() {
            return Err(EventError::illegal_state(format!(
                "cannot register synchronization: transaction {} is not active",
                self.id
            )));
        }
        self.synchronizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(synchronization);
        Ok(())
    }
}

/// 进程内事务管理器
#[derive(Default)]
pub struct LocalTransactionManager {
    active: DashMap<TransactionId, Arc<LocalTransaction>>,
}

impl LocalTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Arc<LocalTransaction> {
        let tx = Arc::new(LocalTransaction::new());
        self.active.insert(tx.id, tx.clone());
        debug!(tx = %tx.id, "transaction begun");
        tx
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub async fn commit(&self, tx: &LocalTransaction) -> EventResult<()> {
        if !tx.is_active() {
            return Err(EventError::illegal_state(format!(
                "transaction {} is not active",
                tx.id
            )));
        }
        if tx.is_rollback_only() {
            self.rollback(tx).await?;
            return Err(EventError::illegal_state(format!(
                "transaction {} is marked rollback-only",
                tx.id
            )));
        }

        tx.fire_round(TransactionPhase::BeforeCommit).await;
        tx.finish(TransactionStatus::Committed)?;
        tx.fire_round(TransactionPhase::AfterCommit).await;
        self.complete(tx).await;
        debug!(tx = %tx.id, "transaction committed");
        Ok(())
    }

    pub async fn rollback(&self, tx: &LocalTransaction) -> EventResult<()> {
        tx.finish(TransactionStatus::RolledBack)?;
        tx.fire_round(TransactionPhase::AfterRollback).await;
        self.complete(tx).await;
        debug!(tx = %tx.id, "transaction rolled back");
        Ok(())
    }

    async fn complete(&self, tx: &LocalTransaction) {
        tx.fire_round(TransactionPhase::AfterCompletion).await;
        tx.clear();
        self.active.remove(&tx.id);
    }
}
