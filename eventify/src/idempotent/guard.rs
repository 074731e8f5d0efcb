//! 幂等守卫（IdempotencyGuard）
//!
//! 两级结构：进程内缓存集合 + 可插拔的存储。
//! - `is_processed`：先查缓存；未命中再查存储，存储确认已处理时回填缓存；
//! - `mark_processed`：同时写入存储与缓存，处理时间取事件自身的 `issued_at`；
//! - `cleanup_old_events`：委托存储清理，并剔除存储已不再认识的缓存项。

use super::EventRepository;
use crate::error::EventResult;
use crate::event::Event;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct IdempotencyGuard {
    cache: DashSet<String>,
    repository: Arc<dyn EventRepository>,
}

impl IdempotencyGuard {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self {
            cache: DashSet::new(),
            repository,
        }
    }

    pub async fn is_processed(&self, event: &dyn Event) -> EventResult<bool> {
        let event_id = event.event_id();
        if self.cache.contains(event_id) {
            return Ok(true);
        }

        let processed = self.repository.is_processed(event_id).await?;
        if processed {
            self.cache.insert(event_id.to_string());
        }
        Ok(processed)
    }

    pub async fn mark_processed(&self, event: &dyn Event) -> EventResult<()> {
        let event_id = event.event_id();
        self.repository
            .mark_as_processed(event_id, event.issued_at())
            .await?;
        self.cache.insert(event_id.to_string());
        Ok(())
    }

    /// 返回存储清理掉的记录条数
    pub async fn cleanup_old_events(&self, retention: Duration) -> EventResult<usize> {
        let removed = self.repository.cleanup_old_events(retention).await?;

        let cached: Vec<String> = self.cache.iter().map(|id| id.key().clone()).collect();
        let known = self.repository.processed_ids(&cached).await?;
        let mut evicted = 0usize;
        for event_id in cached.iter().filter(|id| !known.contains(*id)) {
            self.cache.remove(event_id);
            evicted += 1;
        }

        debug!(removed, evicted, "idempotency records cleaned up");
        Ok(removed)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
