use crate::error::{EventError, EventResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件头：身份、发布时间与可变元数据
///
/// `event_id`/`issued_at` 在创建后不可变；`metadata` 可在共享引用上并发写入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHeader {
    event_id: String,
    issued_at: DateTime<Utc>,
    #[serde(default)]
    metadata: DashMap<String, Value>,
}

impl EventHeader {
    /// 生成随机 ID（uuid v4）并以当前时间作为发布时间
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(event_id: impl Into<String>) -> Self {
        Self::with_id_at(event_id, Utc::now())
    }

    pub fn with_id_at(event_id: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.into(),
            issued_at,
            metadata: DashMap::new(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// 写入元数据；键不能为空
    pub fn put_metadata(&self, key: impl Into<String>, value: impl Into<Value>) -> EventResult<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(EventError::configuration("metadata key must not be empty"));
        }
        self.metadata.insert(key, value.into());
        Ok(())
    }

    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.get(key).map(|v| v.value().clone())
    }

    /// 元数据快照（复制）
    pub fn metadata_snapshot(&self) -> Vec<(String, Value)> {
        self.metadata
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

impl Default for EventHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = EventHeader::new();
        let b = EventHeader::new();
        assert_ne!(a.event_id(), b.event_id());
    }

    #[test]
    fn metadata_is_mutable_through_shared_reference() {
        let header = std::sync::Arc::new(EventHeader::with_id("e1"));
        header.put_metadata("source", "orders").unwrap();
        assert_eq!(header.metadata("source"), Some(Value::from("orders")));
        assert_eq!(header.event_id(), "e1");
    }

    #[test]
    fn empty_metadata_key_is_rejected() {
        let header = EventHeader::new();
        let err = header.put_metadata("", 1).unwrap_err();
        assert!(matches!(err, EventError::Configuration { .. }));
    }
}
