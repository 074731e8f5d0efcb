//! 事件处理器（EventHandler）
//!
//! 监听器的业务逻辑。`E` 可以是具体事件类型，也可以是 `dyn Event`
//! （用于订阅父类型、需要处理多种具体事件的监听器）。
use async_trait::async_trait;

#[async_trait]
pub trait EventHandler<E: ?Sized + Sync>: Send + Sync + 'static {
    async fn on_event(&self, event: &E) -> anyhow::Result<()>;
}
