use crate::transaction::TransactionPhase;
use bon::Builder;

/// 监听器的投递模式，在注册时确定
///
/// `phase` 为 `Some` 即为事务性监听器。
#[derive(Builder, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenerMode {
    #[builder(default)]
    asynchronous: bool,
    phase: Option<TransactionPhase>,
    #[builder(default)]
    idempotent: bool,
}

impl ListenerMode {
    pub fn synchronous() -> Self {
        Self::default()
    }

    pub fn asynchronous() -> Self {
        Self::builder().asynchronous(true).build()
    }

    pub fn transactional(phase: TransactionPhase) -> Self {
        Self::builder().phase(phase).build()
    }

    pub fn is_async(&self) -> bool {
        self.asynchronous
    }

    pub fn is_transactional(&self) -> bool {
        self.phase.is_some()
    }

    pub fn phase(&self) -> Option<TransactionPhase> {
        self.phase
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn delivery(&self) -> DeliveryMode {
        match (self.asynchronous, self.phase) {
            (false, None) => DeliveryMode::Synchronous,
            (true, None) => DeliveryMode::Asynchronous,
            (false, Some(p)) => DeliveryMode::Transactional(p),
            (true, Some(p)) => DeliveryMode::AsyncTransactional(p),
        }
    }
}

/// 同步/异步 × 事务/非事务 四种投递形态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    Synchronous,
    Asynchronous,
    Transactional(TransactionPhase),
    AsyncTransactional(TransactionPhase),
}

impl DeliveryMode {
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Asynchronous | Self::AsyncTransactional(_))
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, Self::Transactional(_) | Self::AsyncTransactional(_))
    }
}
