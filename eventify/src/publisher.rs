//! 事件总线门面（Eventify）
//!
//! 负责组装各组件并提供发布入口：
//! - 注册监听器、声明父子类型、注册远程解码器；
//! - `publish*`：按监听器模式直接分发，或绑定到事务阶段；
//! - 运行期替换后端、启动周期维护与远程消费。
//!
//! 组装顺序：调度器先于多播器创建，多播器创建后再回绑到调度器。

use crate::background::TaskHandle;
use crate::consumer::{EventDecoders, RemoteConsumer};
use crate::dispatch::{
    BackendKind, CompositeDispatcher, DispatchBackend, DispatchPolicy, LocalBackend,
    RemoteBackend, RemoteTransport, WorkerPool,
};
use crate::error::{EventError, EventResult};
use crate::event::{EventType, EventTypeRegistry, SharedEvent, TypedEvent};
use crate::idempotent::{EventRepository, IdempotencyGuard, InMemoryEventRepository};
use crate::listener::EventListener;
use crate::maintenance;
use crate::multicaster::EventMulticaster;
use crate::scheduler::{PendingDelivery, PhaseProcessor, TransactionalScheduler};
use crate::transaction::{Transaction, TransactionPhase};
use bon::bon;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::debug;

/// 事件总线配置
#[derive(Clone, Debug)]
pub struct EventifyConfig {
    /// 是否启用异步执行器；关闭后异步投递返回配置错误
    pub async_enabled: bool,
    /// 异步执行的并发上限，`None` 表示不限
    pub worker_concurrency: Option<usize>,
    /// 进程级默认后端
    pub default_backend: BackendKind,
    /// 幂等记录保留时长
    pub idempotency_retention: Duration,
    /// 周期清理间隔
    pub cleanup_interval: Duration,
    /// 远程传输的交换机名，写入 `X-Event-Source`
    pub exchange: String,
}

impl Default for EventifyConfig {
    fn default() -> Self {
        Self {
            async_enabled: true,
            worker_concurrency: None,
            default_backend: BackendKind::Local,
            idempotency_retention: Duration::from_secs(7 * 24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
            exchange: "events".to_string(),
        }
    }
}

pub struct Eventify {
    config: EventifyConfig,
    types: Arc<EventTypeRegistry>,
    guard: Arc<IdempotencyGuard>,
    policy: Arc<DispatchPolicy>,
    scheduler: Arc<TransactionalScheduler>,
    multicaster: Arc<EventMulticaster>,
    decoders: EventDecoders,
    transport: Option<Arc<dyn RemoteTransport>>,
    runtime: Option<Handle>,
}

#[bon]
impl Eventify {
    /// 未提供 `runtime` 时使用当前所在的 tokio 运行时；两者都没有则不启用异步执行器
    #[builder]
    pub fn new(
        #[builder(default)] config: EventifyConfig,
        event_repository: Option<Arc<dyn EventRepository>>,
        remote_transport: Option<Arc<dyn RemoteTransport>>,
        runtime: Option<Handle>,
    ) -> EventResult<Self> {
        if let Some(concurrency) = config.worker_concurrency {
            if concurrency == 0 || concurrency > Semaphore::MAX_PERMITS {
                return Err(EventError::configuration(format!(
                    "worker_concurrency must be within 1..={}, got {concurrency}",
                    Semaphore::MAX_PERMITS
                )));
            }
        }
        if config.cleanup_interval.is_zero() {
            return Err(EventError::configuration(
                "cleanup_interval must be greater than zero",
            ));
        }

        let runtime = runtime.or_else(|| Handle::try_current().ok());
        let pool = match &runtime {
            Some(handle) if config.async_enabled => {
                Some(WorkerPool::new(handle.clone(), config.worker_concurrency))
            }
            _ => None,
        };

        let policy = Arc::new(DispatchPolicy::new(config.default_backend));
        policy.register(Arc::new(LocalBackend::new(pool)));
        if let Some(transport) = &remote_transport {
            policy.register(Arc::new(RemoteBackend::new(
                transport.clone(),
                config.exchange.clone(),
            )));
        }
        policy.default_backend()?;

        let repository =
            event_repository.unwrap_or_else(|| Arc::new(InMemoryEventRepository::new()));
        let guard = Arc::new(IdempotencyGuard::new(repository));
        let types = Arc::new(EventTypeRegistry::new());

        let scheduler = Arc::new(TransactionalScheduler::new());
        let dispatcher = Arc::new(CompositeDispatcher::new(policy.clone(), scheduler.clone()));
        let multicaster = Arc::new(EventMulticaster::new(
            types.clone(),
            guard.clone(),
            dispatcher,
        ));
        let processor: Arc<dyn PhaseProcessor> = multicaster.clone();
        scheduler.bind(Arc::downgrade(&processor))?;

        Ok(Self {
            config,
            types,
            guard,
            policy,
            scheduler,
            multicaster,
            decoders: EventDecoders::new(),
            transport: remote_transport,
            runtime,
        })
    }
}

impl Eventify {
    pub fn config(&self) -> &EventifyConfig {
        &self.config
    }

    pub fn guard(&self) -> &Arc<IdempotencyGuard> {
        &self.guard
    }

    pub fn scheduler(&self) -> &Arc<TransactionalScheduler> {
        &self.scheduler
    }

    pub fn multicaster(&self) -> &Arc<EventMulticaster> {
        &self.multicaster
    }

    pub fn add_listener(&self, listener: EventListener) -> Arc<EventListener> {
        self.multicaster.add_listener(listener)
    }

    pub fn listeners(&self) -> Vec<Arc<EventListener>> {
        self.multicaster.listeners()
    }

    /// 声明 `child` 是 `parent` 的子类型，订阅 `parent` 的监听器也会收到 `child`
    pub fn declare_subtype(&self, child: impl Into<EventType>, parent: impl Into<EventType>) {
        self.types.declare(child, parent);
    }

    /// 注册远程消费时使用的解码器
    pub fn register_event<E>(&self)
    where
        E: TypedEvent + DeserializeOwned,
    {
        self.decoders.register::<E>();
    }

    /// 注册（或替换）后端，下一次分发即生效
    pub fn register_backend(&self, backend: Arc<dyn DispatchBackend>) {
        let kind = backend.kind();
        self.policy.register(backend);
        debug!(backend = %kind, "backend registered");
    }

    pub fn deregister_backend(&self, kind: BackendKind) -> Option<Arc<dyn DispatchBackend>> {
        self.policy.deregister(kind)
    }

    /// 无事务上下文发布：事务性监听器立即执行
    pub async fn publish(&self, event: SharedEvent) -> EventResult<()> {
        self.multicaster.multicast(&event, None).await
    }

    /// 在给定事务上下文中发布：事务性监听器按各自阶段缓冲
    pub async fn publish_with(&self, event: SharedEvent, tx: &dyn Transaction) -> EventResult<()> {
        self.multicaster.multicast(&event, Some(tx)).await
    }

    /// 只投递给指定名称的监听器
    pub async fn publish_to(
        &self,
        event: SharedEvent,
        listener: &str,
        tx: Option<&dyn Transaction>,
    ) -> EventResult<()> {
        let target = self.resolve(listener)?;
        self.multicaster.process_event(&event, &target, tx).await
    }

    /// 在 `phase` 到达时把事件扇出给所有匹配的监听器
    pub async fn publish_in_transaction(
        &self,
        event: SharedEvent,
        phase: TransactionPhase,
        tx: &dyn Transaction,
    ) -> EventResult<()> {
        self.scheduler
            .schedule(PendingDelivery::broadcast(event), phase, Some(tx))
            .await
    }

    /// 在 `phase` 到达时投递给指定监听器，同步/异步取决于监听器模式
    pub async fn publish_to_in_transaction(
        &self,
        event: SharedEvent,
        phase: TransactionPhase,
        listener: &str,
        tx: &dyn Transaction,
    ) -> EventResult<()> {
        let target = self.resolve(listener)?;
        let asynchronous = target.mode().is_async();
        self.scheduler
            .schedule(
                PendingDelivery::targeted(event, target, asynchronous),
                phase,
                Some(tx),
            )
            .await
    }

    /// 启动幂等记录的周期清理
    pub fn start_maintenance(&self) -> EventResult<TaskHandle> {
        let runtime = self.runtime()?;
        Ok(maintenance::start(
            runtime,
            self.guard.clone(),
            self.config.idempotency_retention,
            self.config.cleanup_interval,
        ))
    }

    /// 订阅远程传输，在本地执行信封指向的监听器
    pub async fn start_remote_consumer(&self) -> EventResult<TaskHandle> {
        let runtime = self.runtime()?;
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| EventError::configuration("no remote transport configured"))?;

        let consumer =
            RemoteConsumer::new(transport, self.decoders.clone(), self.multicaster.clone());
        Ok(consumer.start(runtime).await)
    }

    fn resolve(&self, listener: &str) -> EventResult<Arc<EventListener>> {
        self.multicaster
            .listener(listener)
            .ok_or_else(|| EventError::ListenerNotFound(listener.to_string()))
    }

    fn runtime(&self) -> EventResult<&Handle> {
        self.runtime
            .as_ref()
            .ok_or_else(|| EventError::configuration("no tokio runtime available"))
    }
}
