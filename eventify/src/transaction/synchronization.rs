use super::TransactionPhase;
use crate::error::EventResult;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// 事务标识
pub type TransactionId = Uuid;

/// 事务阶段回调，四个钩子默认均为空操作
#[async_trait]
pub trait TransactionSynchronization: Send + Sync {
    async fn before_commit(&self) {}

    async fn after_commit(&self) {}

    async fn after_rollback(&self) {}

    async fn after_completion(&self) {}
}

/// 显式传递的事务上下文
///
/// 事件总线只依赖这一窄接口：判断事务是否活跃，以及注册阶段回调。
/// 实现方需保证按真实的提交/回滚结果调用对应钩子，并总以 `after_completion` 收尾。
pub trait Transaction: Send + Sync {
    fn id(&self) -> TransactionId;

    fn is_active(&self) -> bool;

    fn register_synchronization(
        &self,
        synchronization: Arc<dyn TransactionSynchronization>,
    ) -> EventResult<()>;
}

/// 按钩子调用某个阶段
pub(crate) async fn fire(sync: &dyn TransactionSynchronization, phase: TransactionPhase) {
    match phase {
        TransactionPhase::BeforeCommit => sync.before_commit().await,
        TransactionPhase::AfterCommit => sync.after_commit().await,
        TransactionPhase::AfterRollback => sync.after_rollback().await,
        TransactionPhase::AfterCompletion => sync.after_completion().await,
        TransactionPhase::Immediate => {}
    }
}
