//! 远程消费（RemoteConsumer）
//!
//! 订阅 `RemoteTransport`，对每个信封：
//! 按事件类型找到已注册的解码器还原事件，按名称找到目标监听器并在本地执行。
//! 任何失败只记录日志，不会中断消费循环。

use crate::background::TaskHandle;
use crate::dispatch::{RemoteEnvelope, RemoteTransport};
use crate::error::{EventError, EventResult};
use crate::event::{SharedEvent, TypedEvent};
use crate::multicaster::EventMulticaster;
use dashmap::DashMap;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

type Decoder = Arc<dyn Fn(serde_json::Value) -> EventResult<SharedEvent> + Send + Sync>;

/// 事件类型名 → 反序列化函数
#[derive(Clone, Default)]
pub struct EventDecoders {
    decoders: Arc<DashMap<String, Decoder>>,
}

impl EventDecoders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E>(&self)
    where
        E: TypedEvent + DeserializeOwned,
    {
        let decoder: Decoder = Arc::new(|payload: serde_json::Value| -> EventResult<SharedEvent> {
            let event: E = serde_json::from_value(payload).map_err(|e| EventError::Decode {
                event_type: E::EVENT_TYPE.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Arc::new(event) as SharedEvent)
        });
        self.decoders.insert(E::EVENT_TYPE.to_string(), decoder);
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn decode(&self, event_type: &str, payload: serde_json::Value) -> EventResult<SharedEvent> {
        let decoder = self
            .decoders
            .get(event_type)
            .map(|d| d.value().clone())
            .ok_or_else(|| EventError::Decode {
                event_type: event_type.to_string(),
                reason: "no decoder registered".to_string(),
            })?;
        decoder(payload)
    }
}

pub(crate) struct RemoteConsumer {
    transport: Arc<dyn RemoteTransport>,
    decoders: EventDecoders,
    multicaster: Arc<EventMulticaster>,
}

impl RemoteConsumer {
    pub(crate) fn new(
        transport: Arc<dyn RemoteTransport>,
        decoders: EventDecoders,
        multicaster: Arc<EventMulticaster>,
    ) -> Self {
        Self {
            transport,
            decoders,
            multicaster,
        }
    }

    /// 先完成订阅再返回，之后发布的信封都会被消费
    pub(crate) async fn start(self, runtime: &Handle) -> TaskHandle {
        let stream = self.transport.subscribe().await;
        let token = CancellationToken::new();
        let task = runtime.spawn(self.consume_loop(stream, token.clone()));
        TaskHandle::new(token, vec![task])
    }

    async fn consume_loop(
        self,
        mut stream: BoxStream<'static, EventResult<RemoteEnvelope>>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(envelope)) => self.handle(envelope).await,
                    Some(Err(err)) => warn!(error = %err, "remote stream error"),
                    None => break,
                },
            }
        }
    }

    async fn handle(&self, envelope: RemoteEnvelope) {
        let RemoteEnvelope {
            event_id,
            event_type,
            listener,
            routing_key,
            payload,
            ..
        } = envelope;

        let event = match self.decoders.decode(&event_type, payload) {
            Ok(event) => event,
            Err(err) => {
                error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    routing_key = %routing_key,
                    error = %err,
                    "remote event dropped"
                );
                return;
            }
        };

        let Some(target) = self.multicaster.listener(&listener) else {
            let err = EventError::ListenerNotFound(listener);
            error!(
                event_id = %event_id,
                event_type = %event_type,
                routing_key = %routing_key,
                error = %err,
                "remote event dropped"
            );
            return;
        };

        match target.invoke(&event).await {
            Ok(()) => debug!(
                event_id = %event_id,
                listener = target.name(),
                routing_key = %routing_key,
                "remote event handled"
            ),
            Err(err) => error!(
                event_id = %event_id,
                listener = target.name(),
                routing_key = %routing_key,
                error = %err,
                "remote listener failed"
            ),
        }
    }
}
