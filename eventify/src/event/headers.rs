//! 传输层头部名称

pub const EVENT_ID: &str = "X-Event-ID";
pub const EVENT_TIMESTAMP: &str = "X-Event-Timestamp";
pub const EVENT_TYPE: &str = "X-Event-Type";
pub const EVENT_SOURCE: &str = "X-Event-Source";
pub const ASYNC_EVENT_TYPE: &str = "X-Async-Event-Type";
pub const TRANSACTION_PHASE: &str = "X-Transaction-Phase";
