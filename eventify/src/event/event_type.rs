use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

/// 事件类型名
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    /// 所有事件类型的根
    pub const ANY: EventType = EventType(Cow::Borrowed("*"));

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for EventType {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 事件类型层级注册表
///
/// 以显式的“子类型 → 父类型”链接描述继承关系，替代运行时类型层级。
/// 一个类型可以声明多个父类型。
#[derive(Default, Debug)]
pub struct EventTypeRegistry {
    parents: DashMap<EventType, Vec<EventType>>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明 `child` 是 `parent` 的子类型（重复声明忽略）
    pub fn declare(&self, child: impl Into<EventType>, parent: impl Into<EventType>) {
        let parent = parent.into();
        let mut entry = self.parents.entry(child.into()).or_default();
        if !entry.contains(&parent) {
            entry.push(parent);
        }
    }

    /// `ancestor` 是否与 `child` 相同或为其祖先
    pub fn is_assignable(&self, ancestor: &EventType, child: &EventType) -> bool {
        if ancestor == child || *ancestor == EventType::ANY {
            return true;
        }

        let mut visited: HashSet<EventType> = HashSet::new();
        let mut stack = vec![child.clone()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            // 复制父列表后立即释放分片锁
            let parents = match self.parents.get(&current) {
                Some(list) => list.clone(),
                None => continue,
            };
            for p in parents {
                if &p == ancestor {
                    return true;
                }
                stack.push(p);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_root_match() {
        let reg = EventTypeRegistry::new();
        let placed = EventType::from("OrderPlaced");
        assert!(reg.is_assignable(&placed, &placed));
        assert!(reg.is_assignable(&EventType::ANY, &placed));
        assert!(!reg.is_assignable(&placed, &EventType::from("OrderCancelled")));
    }

    #[test]
    fn transitive_supertypes() {
        let reg = EventTypeRegistry::new();
        reg.declare("OrderPlaced", "OrderEvent");
        reg.declare("OrderEvent", "DomainEvent");

        let placed = EventType::from("OrderPlaced");
        assert!(reg.is_assignable(&EventType::from("OrderEvent"), &placed));
        assert!(reg.is_assignable(&EventType::from("DomainEvent"), &placed));
        // 父类型不能匹配到子类型的桶
        assert!(!reg.is_assignable(&placed, &EventType::from("OrderEvent")));
    }

    #[test]
    fn cycles_terminate() {
        let reg = EventTypeRegistry::new();
        reg.declare("A", "B");
        reg.declare("B", "A");
        assert!(!reg.is_assignable(&EventType::from("C"), &EventType::from("A")));
        assert!(reg.is_assignable(&EventType::from("B"), &EventType::from("A")));
    }
}
