use serde::{Deserialize, Serialize};
use std::fmt;

/// 事务阶段
///
/// `Immediate` 不受事务约束，总是在发布调用内同步投递。
/// `AfterCompletion` 在提交或回滚之后都会触发，且晚于对应的提交/回滚阶段。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionPhase {
    BeforeCommit,
    #[default]
    AfterCommit,
    AfterRollback,
    AfterCompletion,
    Immediate,
}

impl TransactionPhase {
    /// 是否为提交相关阶段
    pub fn is_commit_phase(&self) -> bool {
        matches!(self, Self::BeforeCommit | Self::AfterCommit)
    }

    /// 小写下划线形式，用于路由键
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeCommit => "before_commit",
            Self::AfterCommit => "after_commit",
            Self::AfterRollback => "after_rollback",
            Self::AfterCompletion => "after_completion",
            Self::Immediate => "immediate",
        }
    }

    /// 大写形式，用于传输头部
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeforeCommit => "BEFORE_COMMIT",
            Self::AfterCommit => "AFTER_COMMIT",
            Self::AfterRollback => "AFTER_ROLLBACK",
            Self::AfterCompletion => "AFTER_COMPLETION",
            Self::Immediate => "IMMEDIATE",
        }
    }
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
