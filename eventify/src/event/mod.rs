//! 事件模型（event）
//!
//! - `EventHeader`：事件身份（`event_id`）、发布时间（`issued_at`）与元数据；
//! - `Event`/`TypedEvent`：事件需要实现的最小接口，可经 erased-serde 序列化；
//! - `EventType`/`EventTypeRegistry`：类型名与显式的父子类型链接；
//! - `headers`：远程传输使用的头部常量。

mod event_trait;
mod event_type;
mod header;
pub mod headers;

pub use event_trait::{AsAny, Event, SharedEvent, TypedEvent};
pub use event_type::{EventType, EventTypeRegistry};
pub use header::EventHeader;
