//! 事务感知的进程内事件总线（eventify）
//!
//! 把事件生产者与监听器解耦，同时遵循外围事务的生命周期：
//! 监听器可以要求同步投递、异步投递，或绑定到某个事务阶段
//! （提交前、提交后、回滚后、完成后）投递，并可选择幂等（至多一次）处理
//! 与本地/远程执行后端。
//!
//! 组成（自底向上）：
//! - `idempotent`：按事件身份去重的幂等守卫与可插拔存储；
//! - `dispatch`：本地/远程分发后端、后端选择策略与组合分发器；
//! - `scheduler`：按事务、按阶段缓冲投递并在阶段到达时冲刷；
//! - `multicaster`：监听器注册表与扇出；
//! - `publisher`：组装上述组件的门面 `Eventify`。
//!
//! 事务上下文通过 `Option<&dyn Transaction>` 显式传递；`transaction` 模块提供
//! 一个不绑定存储资源的 `LocalTransactionManager`。
//!
//! 典型用法：
//! 1. 用 `#[event(...)]` 定义事件；
//! 2. 实现 `EventHandler`，以 `EventListener::typed` 与 `ListenerMode` 注册；
//! 3. `Eventify::builder().build()?` 后调用 `publish` / `publish_with`。
//!
mod background;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod idempotent;
pub mod listener;
mod maintenance;
pub mod multicaster;
pub mod publisher;
pub mod scheduler;
pub mod transaction;

pub use background::TaskHandle;
pub use error::{EventError, EventResult};
pub use eventify_macros::event;
pub use publisher::{Eventify, EventifyConfig};

// 允许在本 crate 内部通过 ::eventify 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::eventify 路径。
extern crate self as eventify;
