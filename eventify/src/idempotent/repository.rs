use crate::error::EventResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;

/// 幂等记录的持久化存储：`event_id → processed_at`
///
/// 默认实现为 `InMemoryEventRepository`，可替换为持久化存储。
/// 存储不可用时必须返回错误，调用方不会把错误当作“未处理”。
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> EventResult<bool>;

    async fn mark_as_processed(
        &self,
        event_id: &str,
        processed_at: DateTime<Utc>,
    ) -> EventResult<()>;

    /// 清理早于 `now - older_than` 的记录，返回清理条数
    async fn cleanup_old_events(&self, older_than: Duration) -> EventResult<usize>;

    /// 批量查询：返回 `event_ids` 中已处理的子集
    ///
    /// 缓存整理在每个清理周期调用一次。默认实现逐条调用 `is_processed`，
    /// 远程存储应覆盖为单次批量查询。
    async fn processed_ids(&self, event_ids: &[String]) -> EventResult<HashSet<String>> {
        let mut known = HashSet::new();
        for event_id in event_ids {
            if self.is_processed(event_id).await? {
                known.insert(event_id.clone());
            }
        }
        Ok(known)
    }
}
