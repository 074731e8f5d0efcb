//! 内存版幂等存储（InMemoryEventRepository）
//!
//! 进程重启后记录丢失，适用于测试、示例与单实例部署。

use super::EventRepository;
use crate::error::EventResult;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    records: DashMap<String, DateTime<Utc>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn is_processed(&self, event_id: &str) -> EventResult<bool> {
        Ok(self.records.contains_key(event_id))
    }

    async fn mark_as_processed(
        &self,
        event_id: &str,
        processed_at: DateTime<Utc>,
    ) -> EventResult<()> {
        self.records.insert(event_id.to_string(), processed_at);
        Ok(())
    }

    async fn cleanup_old_events(&self, older_than: Duration) -> EventResult<usize> {
        // 超出可表示范围的保留期视为“永久保留”
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return Ok(0);
        };

        let before = self.records.len();
        self.records.retain(|_, processed_at| *processed_at >= cutoff);
        Ok(before.saturating_sub(self.records.len()))
    }

    async fn processed_ids(&self, event_ids: &[String]) -> EventResult<HashSet<String>> {
        Ok(event_ids
            .iter()
            .filter(|id| self.records.contains_key(id.as_str()))
            .cloned()
            .collect())
    }
}
