//! 分发（dispatch）
//!
//! - `DispatchBackend`：统一的同步/异步投递能力，`LocalBackend` 与 `RemoteBackend` 两种实现；
//! - `DispatchPolicy`：按事件、监听器与默认值选择后端；
//! - `CompositeDispatcher`：每次调用重新选择后端，远程不可用时降级到默认后端。

mod backend;
mod composite;
mod local;
mod policy;
mod remote;

pub use backend::{BackendKind, DeliveryHandle, DispatchBackend};
pub use composite::CompositeDispatcher;
pub use local::{LocalBackend, WorkerPool};
pub use policy::DispatchPolicy;
pub use remote::{InMemoryTransport, RemoteBackend, RemoteEnvelope, RemoteTransport, routing_key};
