use std::sync::Arc;

use chrono::{DateTime, Utc};
use ept_core::config::{BrokerConfig, ManagerConfig};
use ept_core::models::{
    ManagerCommand, ManagerInfo, ManagerRequest, ManagerResponse, ManagerStatus, StatsDirection,
    WorkMessage, WorkMessageType, WorkerHello,
};
use ept_core::traits::{
    Broker, ChannelMessage, FabricRepository, ProcessLauncher, StatsStore, Subscription,
};
use ept_core::{AppConfig, EptError, EptResult};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::fabric_supervisor::FabricSupervisor;
use crate::queue_stats::QueueStatsTracker;
use crate::router::{Delivery, WorkRouter};
use crate::worker_tracker::{SweepOutcome, WorkerTracker};

const DEFAULT_MANAGER_ID: &str = "ept-manager";
const BROKER_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

/// Manager主循环
///
/// 一个实例消费共享工作队列，同时运行三个后台任务：
/// - 控制通道订阅（Worker hello 与管理请求）
/// - 统计采集定时器
/// - 存活检查定时器（Worker激活/移除以及fabric健康检查）
///
/// 后台任务都挂在 `run` 创建的子取消令牌上，无论主循环以何种方式结束都会被取消，
/// 随后终止所有fabric订阅进程。
#[derive(Clone)]
pub struct Manager {
    id: String,
    channels: BrokerConfig,
    config: ManagerConfig,
    broker: Arc<dyn Broker>,
    stats: Arc<QueueStatsTracker>,
    tracker: Arc<WorkerTracker>,
    router: Arc<WorkRouter>,
    supervisor: Arc<FabricSupervisor>,
}

impl Manager {
    pub fn new(
        config: &AppConfig,
        broker: Arc<dyn Broker>,
        stats_store: Arc<dyn StatsStore>,
        repository: Arc<dyn FabricRepository>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let id = if config.manager.manager_id.is_empty() {
            DEFAULT_MANAGER_ID.to_string()
        } else {
            config.manager.manager_id.clone()
        };

        let stats = Arc::new(QueueStatsTracker::new(
            id.clone(),
            stats_store,
            config.stats.clone(),
        ));
        let tracker = Arc::new(WorkerTracker::new(
            config.manager.hello_timeout(),
            config.manager.required_roles.clone(),
        ));
        let router = Arc::new(WorkRouter::new(
            broker.clone(),
            tracker.clone(),
            stats.clone(),
        ));
        let supervisor = Arc::new(FabricSupervisor::new(
            repository,
            launcher,
            tracker.clone(),
            router.clone(),
        ));

        Self {
            id,
            channels: config.broker.clone(),
            config: config.manager.clone(),
            broker,
            stats,
            tracker,
            router,
            supervisor,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn work_queue(&self) -> &str {
        &self.channels.work_queue
    }

    pub fn stats(&self) -> &Arc<QueueStatsTracker> {
        &self.stats
    }

    pub fn tracker(&self) -> &Arc<WorkerTracker> {
        &self.tracker
    }

    pub fn router(&self) -> &Arc<WorkRouter> {
        &self.router
    }

    pub fn supervisor(&self) -> &Arc<FabricSupervisor> {
        &self.supervisor
    }

    /// 运行直到 `shutdown` 被取消或发生致命错误
    pub async fn run(&self, shutdown: CancellationToken) -> EptResult<()> {
        info!("Manager {} 启动，工作队列: {}", self.id, self.channels.work_queue);

        let tasks = shutdown.child_token();
        let mut handles = Vec::new();
        let result = self.run_inner(&shutdown, &tasks, &mut handles).await;

        // 清理与退出原因无关
        tasks.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台任务异常退出: {}", e);
            }
        }
        self.supervisor.shutdown().await;

        match &result {
            Ok(()) => info!("Manager {} 已停止", self.id),
            Err(e) => error!("Manager {} 因错误退出: {}", self.id, e),
        }
        result
    }

    async fn run_inner(
        &self,
        shutdown: &CancellationToken,
        tasks: &CancellationToken,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> EptResult<()> {
        self.stats.init(&self.channels.work_queue).await?;

        let subscription = self
            .broker
            .subscribe(&[
                self.channels.worker_control_channel.clone(),
                self.channels.manager_control_channel.clone(),
            ])
            .await?;

        let manager = self.clone();
        let token = tasks.clone();
        handles.push(tokio::spawn(async move {
            manager.control_loop(subscription, token).await
        }));

        let manager = self.clone();
        let token = tasks.clone();
        handles.push(tokio::spawn(async move { manager.stats_loop(token).await }));

        let manager = self.clone();
        let token = tasks.clone();
        handles.push(tokio::spawn(async move { manager.liveness_loop(token).await }));

        self.supervisor.start_auto().await?;

        self.work_loop(shutdown, tasks).await
    }

    async fn work_loop(
        &self,
        shutdown: &CancellationToken,
        tasks: &CancellationToken,
    ) -> EptResult<()> {
        let queue = self.channels.work_queue.clone();
        let pop_timeout = self.config.work_pop_timeout();

        loop {
            if shutdown.is_cancelled() {
                info!("收到关闭信号，停止消费工作队列");
                return Ok(());
            }
            if tasks.is_cancelled() {
                return Err(EptError::Broker("控制通道订阅已中断".to_string()));
            }

            let popped = tokio::select! {
                _ = tasks.cancelled() => continue,
                popped = self.broker.pop(&queue, pop_timeout) => popped,
            };

            match popped {
                Ok(Some(payload)) => self.process_work(&payload).await,
                Ok(None) => {}
                Err(e) if e.is_retryable() => {
                    warn!("读取工作队列 {} 失败，稍后重试: {}", queue, e);
                    tokio::select! {
                        _ = tasks.cancelled() => {}
                        _ = sleep(BROKER_RETRY_DELAY) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn process_work(&self, payload: &str) {
        match self.handle_work(payload).await {
            Ok(deliveries) => {
                for delivery in deliveries {
                    debug!(
                        "消息已投递: worker={}, queue={}, seq={}",
                        delivery.worker_id, delivery.queue, delivery.seq
                    );
                }
            }
            Err(EptError::Serialization(e)) => warn!("丢弃无法解析的工作消息: {}", e),
            Err(e) => warn!("工作消息分发失败，已丢弃: {}", e),
        }
    }

    /// 处理共享工作队列上的一条消息
    ///
    /// 先计入接收统计再分发；非工作类型的消息被丢弃。
    pub async fn handle_work(&self, payload: &str) -> EptResult<Vec<Delivery>> {
        self.stats
            .increment(&self.channels.work_queue, StatsDirection::Rx)
            .await;

        let message = WorkMessage::parse(payload)?;
        if message.msg_type != WorkMessageType::Work {
            warn!(
                "工作队列上出现非工作消息 {:?} (fabric={})，已丢弃",
                message.msg_type, message.fabric
            );
            return Ok(Vec::new());
        }
        self.router.dispatch(&message).await
    }

    async fn control_loop(&self, mut subscription: Subscription, token: CancellationToken) {
        loop {
            let message = tokio::select! {
                _ = token.cancelled() => break,
                message = subscription.recv() => message,
            };
            match message {
                Some(message) => self.handle_control(message).await,
                None => {
                    error!("控制通道订阅已关闭");
                    token.cancel();
                    break;
                }
            }
        }
        debug!("控制通道任务退出");
    }

    async fn handle_control(&self, message: ChannelMessage) {
        if message.channel == self.channels.worker_control_channel {
            match WorkerHello::parse(&message.payload) {
                Ok(hello) => self.handle_hello(&hello).await,
                Err(e) => warn!("忽略无法解析的Worker hello: {}", e),
            }
        } else if message.channel == self.channels.manager_control_channel {
            let request = match ManagerRequest::parse(&message.payload) {
                Ok(request) => request,
                Err(e) => {
                    warn!("忽略无法解析的控制请求: {}", e);
                    return;
                }
            };
            let response = self.handle_request(&request).await;
            if let Err(e) = self.publish_response(&response).await {
                warn!("发送控制响应 seq={} 失败: {}", response.seq, e);
            }
        } else {
            debug!("忽略来自通道 {} 的消息", message.channel);
        }
    }

    pub async fn handle_hello(&self, hello: &WorkerHello) {
        match self.tracker.handle_hello(hello).await {
            Ok(Some(worker)) => {
                for queue in worker.queues() {
                    if let Err(e) = self.stats.init(queue).await {
                        warn!("初始化队列 {} 的统计失败: {}", queue, e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!("忽略无效的Worker hello: {}", e),
        }
    }

    async fn publish_response(&self, response: &ManagerResponse) -> EptResult<()> {
        let payload = response.serialize()?;
        self.broker
            .publish(&self.channels.manager_response_channel, &payload)
            .await
    }

    /// 执行控制请求并构造响应，响应回显请求的 `seq`
    pub async fn handle_request(&self, request: &ManagerRequest) -> ManagerResponse {
        info!("收到控制请求 {} (seq={})", request.command.name(), request.seq);

        let result: Result<Value, String> = match &request.command {
            ManagerCommand::GetManagerStatus => self
                .status()
                .await
                .and_then(|status| serde_json::to_value(status).map_err(EptError::from))
                .map_err(|e| e.to_string()),
            ManagerCommand::FabricStart { fabric, reason } => {
                let reason = reason.as_deref().unwrap_or("控制请求启动");
                match self.supervisor.start(fabric, reason).await {
                    Ok(outcome) if outcome.is_success() => {
                        Ok(json!({"fabric": fabric, "outcome": outcome.to_string()}))
                    }
                    Ok(outcome) => Err(format!("fabric {fabric} 未启动: {outcome}")),
                    Err(e) => Err(e.to_string()),
                }
            }
            ManagerCommand::FabricStop { fabric, reason } => {
                let reason = reason.as_deref().unwrap_or("控制请求停止");
                self.supervisor
                    .stop(fabric, reason)
                    .await
                    .map(|tracked| json!({"fabric": fabric, "was_tracked": tracked}))
                    .map_err(|e| e.to_string())
            }
            ManagerCommand::FabricRestart { fabric, reason } => {
                let reason = reason.as_deref().unwrap_or("控制请求重启");
                match self.supervisor.restart(fabric, reason).await {
                    Ok(outcome) if outcome.is_success() => {
                        Ok(json!({"fabric": fabric, "outcome": outcome.to_string()}))
                    }
                    Ok(outcome) => Err(format!("fabric {fabric} 未启动: {outcome}")),
                    Err(e) => Err(e.to_string()),
                }
            }
        };

        match result {
            Ok(data) => ManagerResponse::ok(request.seq, &self.id, data),
            Err(error) => {
                warn!("控制请求 {} 失败: {}", request.command.name(), error);
                ManagerResponse::failed(request.seq, &self.id, error)
            }
        }
    }

    /// Worker名册、队列长度和fabric存活状态
    pub async fn status(&self) -> EptResult<ManagerStatus> {
        let work_queue_len = self.broker.len(&self.channels.work_queue).await?;

        let mut workers = Vec::new();
        for worker in self.tracker.workers().await {
            let mut queue_len = Vec::with_capacity(worker.queues().len());
            for queue in worker.queues() {
                queue_len.push(self.broker.len(queue).await?);
            }
            workers.push(worker.record(queue_len).await);
        }

        Ok(ManagerStatus {
            manager: ManagerInfo {
                id: self.id.clone(),
                queues: vec![self.channels.work_queue.clone()],
                queue_len: vec![work_queue_len],
            },
            workers,
            fabrics: self.supervisor.status().await,
        })
    }

    async fn stats_loop(&self, token: CancellationToken) {
        let period = self.config.stats_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.collect_stats().await,
            }
        }
        debug!("统计采集任务退出");
    }

    /// 采集所有已注册队列的统计
    pub async fn collect_stats(&self) {
        for queue in self.stats.queues().await {
            let queue_len = match self.broker.len(&queue).await {
                Ok(len) => len,
                Err(e) => {
                    warn!("读取队列 {} 长度失败: {}", queue, e);
                    continue;
                }
            };
            if let Err(e) = self.stats.collect(&queue, queue_len).await {
                warn!("保存队列 {} 的统计失败: {}", queue, e);
            }
        }
    }

    async fn liveness_loop(&self, token: CancellationToken) {
        let period = self.config.worker_update_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.liveness_sweep_at(Utc::now()).await {
                        error!("存活检查失败: {}", e);
                    }
                }
            }
        }
        debug!("存活检查任务退出");
    }

    /// 一次存活检查
    ///
    /// 被移除的Worker：清空其队列并重启所有fabric。有Worker被激活时重试等待中的fabric。
    /// 最后检查fabric订阅进程是否存活。
    pub async fn liveness_sweep_at(&self, now: DateTime<Utc>) -> EptResult<SweepOutcome> {
        let outcome = self.tracker.sweep_at(now).await;

        for worker in &outcome.removed {
            if let Err(e) = self.router.purge_worker(worker).await {
                warn!("清空Worker {} 的队列失败: {}", worker.worker_id(), e);
            }
            for queue in worker.queues() {
                self.stats.forget(queue).await;
            }
        }

        if !outcome.removed.is_empty() {
            let removed: Vec<&str> = outcome
                .removed
                .iter()
                .map(|worker| worker.worker_id())
                .collect();
            let failed = self
                .supervisor
                .restart_all(&format!("Worker {removed:?} 已移除"))
                .await;
            if !failed.is_empty() {
                warn!("以下fabric重启失败，等待健康检查处理: {:?}", failed);
            }
        }

        if !outcome.promoted.is_empty() {
            match self.supervisor.retry_waiting().await {
                Ok(results) => {
                    for (fabric, result) in results {
                        info!("fabric {} 重试启动结果: {}", fabric, result);
                    }
                }
                Err(e) => error!("重试等待中的fabric失败: {}", e),
            }
        }

        if let Err(e) = self.supervisor.health_check().await {
            error!("fabric健康检查失败: {}", e);
        }
        Ok(outcome)
    }
}
