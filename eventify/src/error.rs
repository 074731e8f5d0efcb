//! 事件总线统一错误定义
//!
//! 按“类型不匹配 / 监听器失败 / 后端不可用 / 幂等存储 / 配置 / 事务状态”分组，
//! 便于调用方区分是注册或分发策略的缺陷，还是监听器自身的业务失败。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventError {
    // --- 分发 ---
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },
    #[error("listener failed: listener={listener}, reason={reason}")]
    Listener { listener: String, reason: String },
    #[error("listener not found: {0}")]
    ListenerNotFound(String),
    #[error("backend unavailable: backend={backend}, reason={reason}")]
    BackendUnavailable { backend: String, reason: String },
    #[error("executor error: {reason}")]
    Executor { reason: String },

    // --- 幂等存储 ---
    #[error("event store error: {reason}")]
    Store { reason: String },

    // --- 配置/事务 ---
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
    #[error("illegal transaction state: {reason}")]
    IllegalTransactionState { reason: String },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("decode failed: type={event_type}, reason={reason}")]
    Decode { event_type: String, reason: String },
}

impl EventError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    pub fn illegal_state(reason: impl Into<String>) -> Self {
        Self::IllegalTransactionState {
            reason: reason.into(),
        }
    }

    /// 是否为可降级到默认后端的错误
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// 是否为监听器自身（业务逻辑或类型还原）的失败
    pub fn is_listener_failure(&self) -> bool {
        matches!(self, Self::Listener { .. } | Self::TypeMismatch { .. })
    }
}

impl From<tokio::task::JoinError> for EventError {
    fn from(err: tokio::task::JoinError) -> Self {
        EventError::Executor {
            reason: err.to_string(),
        }
    }
}

/// 统一 Result 类型别名
pub type EventResult<T> = Result<T, EventError>;
