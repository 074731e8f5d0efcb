//! 远程分发后端（RemoteBackend）
//!
//! 适配外部的消息代理：
//! - 同步投递总在本地执行；
//! - 异步投递把事件封装为 `RemoteEnvelope` 交给 `RemoteTransport`，
//!   路由键为 `async.<EventType>` 或 `async.<phase>.<EventType>`；
//! - 传输失败统一转换为 `BackendUnavailable`，由组合分发器降级到默认后端。

use super::{BackendKind, DeliveryHandle, DispatchBackend};
use crate::error::{EventError, EventResult};
use crate::event::{SharedEvent, headers};
use crate::listener::EventListener;
use crate::transaction::TransactionPhase;
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// 跨进程传输的事件信封：事件 + 目标监听器 + 可选阶段
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteEnvelope {
    #[builder(into)]
    pub event_id: String,
    #[builder(into)]
    pub event_type: String,
    pub issued_at: DateTime<Utc>,
    #[builder(into)]
    pub listener: String,
    pub phase: Option<TransactionPhase>,
    #[builder(into)]
    pub routing_key: String,
    #[builder(default)]
    pub headers: HashMap<String, String>,
    pub payload: serde_json::Value,
}

impl RemoteEnvelope {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// 路由键：`async.<EventType>` / `async.<phase>.<EventType>`
pub fn routing_key(event_type: &str, phase: Option<TransactionPhase>) -> String {
    match phase {
        Some(phase) => format!("async.{}.{}", phase.as_str(), event_type),
        None => format!("async.{event_type}"),
    }
}

/// 消息代理适配协议
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn publish(&self, envelope: RemoteEnvelope) -> EventResult<()>;

    /// 返回一个 'static 生命周期的信封流，便于在 tokio::spawn 中消费
    async fn subscribe(&self) -> BoxStream<'static, EventResult<RemoteEnvelope>>;
}

/// 基于 `tokio::sync::broadcast` 的内存传输，用于测试与单进程部署
///
/// 没有任何订阅者时发布失败，以便触发降级而不是丢失事件。
#[derive(Clone)]
pub struct InMemoryTransport {
    tx: broadcast::Sender<RemoteEnvelope>,
}

impl InMemoryTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl RemoteTransport for InMemoryTransport {
    async fn publish(&self, envelope: RemoteEnvelope) -> EventResult<()> {
        self.tx
            .send(envelope)
            .map(|_| ())
            .map_err(|_| EventError::BackendUnavailable {
                backend: BackendKind::Remote.to_string(),
                reason: "no active subscriber".to_string(),
            })
    }

    async fn subscribe(&self) -> BoxStream<'static, EventResult<RemoteEnvelope>> {
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).map(|r| {
            r.map_err(|e| EventError::BackendUnavailable {
                backend: BackendKind::Remote.to_string(),
                reason: e.to_string(),
            })
        });
        Box::pin(stream)
    }
}

pub struct RemoteBackend {
    transport: Arc<dyn RemoteTransport>,
    source: String,
}

impl RemoteBackend {
    /// `source` 写入 `X-Event-Source`，通常为交换机名
    pub fn new(transport: Arc<dyn RemoteTransport>, source: impl Into<String>) -> Self {
        Self {
            transport,
            source: source.into(),
        }
    }

    fn envelope(
        &self,
        event: &SharedEvent,
        listener: &EventListener,
        phase: Option<TransactionPhase>,
    ) -> EventResult<RemoteEnvelope> {
        let payload = serde_json::to_value(event.as_ref())?;

        let mut header_map = HashMap::from([
            (headers::EVENT_ID.to_string(), event.event_id().to_string()),
            (
                headers::EVENT_TIMESTAMP.to_string(),
                event.issued_at().to_rfc3339(),
            ),
            (headers::EVENT_TYPE.to_string(), "async".to_string()),
            (
                headers::ASYNC_EVENT_TYPE.to_string(),
                event.event_type().to_string(),
            ),
            (headers::EVENT_SOURCE.to_string(), self.source.clone()),
        ]);
        if let Some(phase) = phase {
            header_map.insert(
                headers::TRANSACTION_PHASE.to_string(),
                phase.name().to_string(),
            );
        }

        Ok(RemoteEnvelope::builder()
            .event_id(event.event_id())
            .event_type(event.event_type())
            .issued_at(event.issued_at())
            .listener(listener.name())
            .maybe_phase(phase)
            .routing_key(routing_key(event.event_type(), phase))
            .headers(header_map)
            .payload(payload)
            .build())
    }
}

#[async_trait]
impl DispatchBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn deliver(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
    ) -> EventResult<()> {
        listener.invoke(event).await
    }

    async fn deliver_async(
        &self,
        event: &SharedEvent,
        listener: &Arc<EventListener>,
        phase: Option<TransactionPhase>,
    ) -> EventResult<DeliveryHandle> {
        let envelope = self.envelope(event, listener, phase)?;
        let routing_key = envelope.routing_key.clone();

        self.transport
            .publish(envelope)
            .await
            .map_err(|e| match e {
                unavailable @ EventError::BackendUnavailable { .. } => unavailable,
                other => EventError::BackendUnavailable {
                    backend: BackendKind::Remote.to_string(),
                    reason: other.to_string(),
                },
            })?;

        debug!(
            event_id = event.event_id(),
            listener = listener.name(),
            routing_key = %routing_key,
            "published to remote transport"
        );
        Ok(DeliveryHandle::published())
    }
}
