//! 分发策略（DispatchPolicy）
//!
//! 为 (事件, 监听器) 选择后端，优先级：
//! 1. 事件类型声明的后端；
//! 2. 监听器声明的后端；
//! 3. 进程级默认后端。
//!
//! 声明的后端未注册时静默回落到默认后端。后端表可在运行时替换。

use super::{BackendKind, DispatchBackend};
use crate::error::{EventError, EventResult};
use crate::event::Event;
use crate::listener::EventListener;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

pub struct DispatchPolicy {
    backends: DashMap<BackendKind, Arc<dyn DispatchBackend>>,
    default_kind: BackendKind,
}

impl DispatchPolicy {
    pub fn new(default_kind: BackendKind) -> Self {
        Self {
            backends: DashMap::new(),
            default_kind,
        }
    }

    pub fn default_kind(&self) -> BackendKind {
        self.default_kind
    }

    /// 注册（或替换）同种类的后端，返回被替换的旧后端
    pub fn register(&self, backend: Arc<dyn DispatchBackend>) -> Option<Arc<dyn DispatchBackend>> {
        self.backends.insert(backend.kind(), backend)
    }

    pub fn deregister(&self, kind: BackendKind) -> Option<Arc<dyn DispatchBackend>> {
        self.backends.remove(&kind).map(|(_, backend)| backend)
    }

    pub fn backend(&self, kind: BackendKind) -> Option<Arc<dyn DispatchBackend>> {
        self.backends.get(&kind).map(|b| b.value().clone())
    }

    pub fn default_backend(&self) -> EventResult<Arc<dyn DispatchBackend>> {
        self.backend(self.default_kind).ok_or_else(|| {
            EventError::configuration(format!(
                "default backend {} is not registered",
                self.default_kind
            ))
        })
    }

    pub fn select(
        &self,
        event: &dyn Event,
        listener: &EventListener,
    ) -> EventResult<Arc<dyn DispatchBackend>> {
        let declared = event.backend().or(listener.backend());

        if let Some(kind) = declared {
            if let Some(backend) = self.backend(kind) {
                return Ok(backend);
            }
            debug!(
                event_type = event.event_type(),
                listener = listener.name(),
                backend = %kind,
                "declared backend not registered, using default"
            );
        }

        self.default_backend()
    }
}
