//! 监听器（listener）
//!
//! 显式注册 API：以处理器与模式标志构造 `EventListener`，
//! 不做任何运行时反射查找。

mod handler;
mod listener;
mod mode;

pub use handler::EventHandler;
pub use listener::EventListener;
pub use mode::{DeliveryMode, ListenerMode};
