use super::EventHeader;
use crate::dispatch::BackendKind;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 类型擦除辅助：允许从 `dyn Event` 还原具体事件类型
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 领域事件
///
/// - `header`：身份、发布时间、元数据；
/// - `event_type`：注册表中的类型名（监听器按此分桶）；
/// - `backend`：事件类型级别声明的分发后端（优先级最高）。
///
/// 一般通过 `#[event(...)]` 宏生成实现。
pub trait Event: AsAny + erased_serde::Serialize + fmt::Debug {
    fn header(&self) -> &EventHeader;

    fn event_type(&self) -> &'static str;

    fn backend(&self) -> Option<BackendKind> {
        None
    }

    fn event_id(&self) -> &str {
        self.header().event_id()
    }

    fn issued_at(&self) -> DateTime<Utc> {
        self.header().issued_at()
    }
}

erased_serde::serialize_trait_object!(Event);

/// 具备静态类型名的事件，用于按类型注册监听器
pub trait TypedEvent: Event + Sized {
    const EVENT_TYPE: &'static str;
}

/// 在进程内共享的事件引用
pub type SharedEvent = Arc<dyn Event>;

impl dyn Event {
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        AsAny::as_any(self).downcast_ref::<E>()
    }
}
