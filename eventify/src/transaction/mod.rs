//! 事务协作（transaction）
//!
//! - `TransactionPhase`：投递可以绑定的事务阶段；
//! - `Transaction`/`TransactionSynchronization`：事件总线依赖的最小事务契约，
//!   以显式句柄传入发布调用，而非依赖线程局部状态；
//! - `LocalTransactionManager`：进程内实现，驱动阶段回调。

mod local;
mod phase;
mod synchronization;

pub use local::{LocalTransaction, LocalTransactionManager, TransactionStatus};
pub use phase::TransactionPhase;
pub use synchronization::{Transaction, TransactionId, TransactionSynchronization};
