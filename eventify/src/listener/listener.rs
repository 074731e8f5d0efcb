use super::{EventHandler, ListenerMode};
use crate::dispatch::BackendKind;
use crate::error::{EventError, EventResult};
use crate::event::{AsAny, Event, EventType, SharedEvent, TypedEvent};
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

type ListenerFuture = BoxFuture<'static, EventResult<()>>;

type ErasedHandler = Arc<dyn Fn(SharedEvent) -> ListenerFuture + Send + Sync>;

/// 已解析好投递模式的监听器
///
/// - 注册到唯一的事件类型桶（`event_type`）；
/// - 处理器以类型擦除方式保存，调用时还原具体事件类型。
pub struct EventListener {
    name: Arc<str>,
    event_type: EventType,
    mode: ListenerMode,
    backend: Option<BackendKind>,
    handler: ErasedHandler,
}

impl EventListener {
    /// 订阅具体事件类型 `E`
    pub fn typed<E, H>(name: impl Into<Arc<str>>, handler: H, mode: ListenerMode) -> Self
    where
        E: TypedEvent,
        H: EventHandler<E>,
    {
        let name: Arc<str> = name.into();
        let handler = Arc::new(handler);
        let listener_name = name.clone();

        let f: ErasedHandler = Arc::new(move |event: SharedEvent| -> ListenerFuture {
            let handler = handler.clone();
            let listener_name = listener_name.clone();

            Box::pin(async move {
                let Some(typed) = AsAny::as_any(event.as_ref()).downcast_ref::<E>() else {
                    return Err(EventError::TypeMismatch {
                        expected: E::EVENT_TYPE.to_string(),
                        found: event.event_type().to_string(),
                    });
                };
                handler
                    .on_event(typed)
                    .await
                    .map_err(|e| EventError::Listener {
                        listener: listener_name.to_string(),
                        reason: format!("{e:#}"),
                    })
            })
        });

        Self {
            name,
            event_type: EventType::from_static(E::EVENT_TYPE),
            mode,
            backend: None,
            handler: f,
        }
    }

    /// 订阅某个（通常是父级）类型，处理器接收 `dyn Event`
    pub fn dynamic<H>(
        name: impl Into<Arc<str>>,
        event_type: impl Into<EventType>,
        handler: H,
        mode: ListenerMode,
    ) -> Self
    where
        H: EventHandler<dyn Event>,
    {
        let name: Arc<str> = name.into();
        let handler = Arc::new(handler);
        let listener_name = name.clone();

        let f: ErasedHandler = Arc::new(move |event: SharedEvent| -> ListenerFuture {
            let handler = handler.clone();
            let listener_name = listener_name.clone();

            Box::pin(async move {
                handler
                    .on_event(event.as_ref())
                    .await
                    .map_err(|e| EventError::Listener {
                        listener: listener_name.to_string(),
                        reason: format!("{e:#}"),
                    })
            })
        });

        Self {
            name,
            event_type: event_type.into(),
            mode,
            backend: None,
            handler: f,
        }
    }

    /// 声明监听器级别的分发后端
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn mode(&self) -> ListenerMode {
        self.mode
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    /// 在当前任务内调用处理器
    pub async fn invoke(&self, event: &SharedEvent) -> EventResult<()> {
        (self.handler)(event.clone()).await
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .field("mode", &self.mode)
            .field("backend", &self.backend)
            .finish()
    }
}
