//! 幂等处理（idempotent）
//!
//! 以事件身份（`event_id`）做尽力而为的“至多一次”准入控制。

mod guard;
mod inmemory;
mod repository;

pub use guard::IdempotencyGuard;
pub use inmemory::InMemoryEventRepository;
pub use repository::EventRepository;
