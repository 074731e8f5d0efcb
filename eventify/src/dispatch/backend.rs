use crate::error::EventResult;
use crate::event::SharedEvent;
use crate::listener::EventListener;
use crate::transaction::TransactionPhase;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// 分发后端种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 异步投递的完成句柄
///
/// `deliver_async` 在入队成功后即返回；`wait` 在排队的工作真正完成后才就绪。
/// 丢弃句柄不会取消已入队的工作。
#[must_use = "drop the handle to detach, or call `wait` to observe completion"]
pub struct DeliveryHandle {
    inner: HandleInner,
}

enum HandleInner {
    Spawned(JoinHandle<EventResult<()>>),
    Published,
}

impl DeliveryHandle {
    pub(crate) fn spawned(handle: JoinHandle<EventResult<()>>) -> Self {
        Self {
            inner: HandleInner::Spawned(handle),
        }
    }

    /// 已交给远程传输，本地没有待完成的工作
    pub(crate) fn published() -> Self {
        Self {
            inner: HandleInner::Published,
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            HandleInner::Spawned(h) => h.is_finished(),
            HandleInner::Published => true,
        }
    }

    pub async fn wait(self) -> EventResult<()> {
        match self.inner {
            HandleInner::Spawned(h) => h.await?,
            HandleInner::Published => Ok(()),
        }
    }
}

impl fmt::Debug for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// 统一的分发能力：同步投递与异步投递
#[async_trait]
pub trait DispatchBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// 在调用方任务内执行监听器，失败原样返回
    async fn deliver(&self, event: &SharedEvent, listener: &Arc<EventListener>)
    -> EventResult<()>;

    /// 入队后立即返回；无法入队时同步返回错误
    async fn deliver_async(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
        phase: Option<TransactionPhase>,
    ) -> EventResult<DeliveryHandle>;
}
