/// 事务阶段事件示例
/// 展示同步、异步幂等、事务阶段监听器在提交与回滚下的执行时机
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use eventify::event;
use eventify::event::{Event, EventHeader};
use eventify::listener::{EventHandler, EventListener, ListenerMode};
use eventify::transaction::{LocalTransactionManager, TransactionPhase};
use eventify::{Eventify, EventifyConfig};
use std::sync::Arc;
use std::time::Duration;

#[event(type = "account.opened")]
struct AccountOpened {
    account_id: String,
    owner: String,
}

#[event(type = "account.closed")]
struct AccountClosed {
    account_id: String,
}

// ============================================================================
// 监听器
// ============================================================================

struct Printer {
    name: &'static str,
}

#[async_trait]
impl EventHandler<AccountOpened> for Printer {
    async fn on_event(&self, event: &AccountOpened) -> AnyResult<()> {
        println!(
            "  [{}] account {} opened for {} (event {})",
            self.name,
            event.account_id,
            event.owner,
            event.event_id()
        );
        Ok(())
    }
}

struct Auditor;

#[async_trait]
impl EventHandler<dyn Event> for Auditor {
    async fn on_event(&self, event: &dyn Event) -> AnyResult<()> {
        println!("  [audit] {} {}", event.event_type(), event.event_id());
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AnyResult<()> {
    let bus = Eventify::builder()
        .config(EventifyConfig {
            worker_concurrency: Some(4),
            ..Default::default()
        })
        .build()?;

    bus.declare_subtype("account.opened", "account");
    bus.declare_subtype("account.closed", "account");

    bus.add_listener(EventListener::typed::<AccountOpened, _>(
        "welcome-mail",
        Printer {
            name: "welcome-mail",
        },
        ListenerMode::builder()
            .asynchronous(true)
            .idempotent(true)
            .build(),
    ));
    bus.add_listener(EventListener::typed::<AccountOpened, _>(
        "ledger",
        Printer { name: "ledger" },
        ListenerMode::transactional(TransactionPhase::BeforeCommit),
    ));
    bus.add_listener(EventListener::typed::<AccountOpened, _>(
        "search-index",
        Printer {
            name: "search-index",
        },
        ListenerMode::transactional(TransactionPhase::AfterCommit),
    ));
    bus.add_listener(EventListener::dynamic(
        "audit",
        "account",
        Auditor,
        ListenerMode::transactional(TransactionPhase::AfterCompletion),
    ));

    let manager = LocalTransactionManager::new();

    // 提交：ledger → search-index → audit
    println!("✅ commit");
    let tx = manager.begin();
    let opened = Arc::new(AccountOpened {
        header: EventHeader::with_id("acc-1-opened"),
        account_id: "acc-1".to_string(),
        owner: "alice".to_string(),
    });
    bus.publish_with(opened.clone(), &*tx).await?;
    manager.commit(&tx).await?;

    // 重复发布：幂等监听器不再执行
    println!("✅ republish");
    bus.publish(opened).await?;

    // 回滚：只有 AFTER_COMPLETION 的 audit 执行
    println!("✅ rollback");
    let tx = manager.begin();
    let closed = Arc::new(AccountClosed {
        header: EventHeader::new(),
        account_id: "acc-1".to_string(),
    });
    bus.publish_with(closed, &*tx).await?;
    manager.rollback(&tx).await?;

    let maintenance = bus.start_maintenance()?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    maintenance.shutdown();
    maintenance.join().await;

    println!("\n✅ 完成");
    Ok(())
}
