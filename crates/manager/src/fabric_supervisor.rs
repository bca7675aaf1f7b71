use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ept_core::models::{FabricEventStatus, FabricStatus};
use ept_core::traits::{FabricProcess, FabricRepository, ProcessLauncher};
use ept_core::EptResult;
use metrics::gauge;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::router::WorkRouter;
use crate::worker_tracker::WorkerTracker;

/// `start` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// 已有存活的订阅进程
    AlreadyRunning,
    /// 必需角色未就绪或启动失败，等待下次重试
    WaitingForRetry,
    /// 不再追踪（未开启自动启动或配置已删除）
    Dropped,
}

impl StartOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StartOutcome::Started)
    }
}

impl fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StartOutcome::Started => "started",
            StartOutcome::AlreadyRunning => "already running",
            StartOutcome::WaitingForRetry => "waiting for retry",
            StartOutcome::Dropped => "dropped",
        };
        f.write_str(text)
    }
}

/// Manager对单个fabric的记录
#[derive(Default)]
struct FabricRuntime {
    process: Option<Box<dyn FabricProcess>>,
    waiting_for_retry: bool,
}

impl FabricRuntime {
    fn is_alive(&mut self) -> bool {
        self.process.as_mut().is_some_and(|process| process.is_alive())
    }
}

/// fabric订阅进程监管
///
/// 每个fabric最多一个存活的子进程。所有操作串行执行，持有fabric表锁期间
/// 会等待子进程启动或终止。
pub struct FabricSupervisor {
    repository: Arc<dyn FabricRepository>,
    launcher: Arc<dyn ProcessLauncher>,
    tracker: Arc<WorkerTracker>,
    router: Arc<WorkRouter>,
    fabrics: Mutex<BTreeMap<String, FabricRuntime>>,
}

impl FabricSupervisor {
    pub fn new(
        repository: Arc<dyn FabricRepository>,
        launcher: Arc<dyn ProcessLauncher>,
        tracker: Arc<WorkerTracker>,
        router: Arc<WorkRouter>,
    ) -> Self {
        Self {
            repository,
            launcher,
            tracker,
            router,
            fabrics: Mutex::new(BTreeMap::new()),
        }
    }

    /// 启动所有配置为自动启动的fabric，单个fabric失败只记录日志
    pub async fn start_auto(&self) -> EptResult<()> {
        for definition in self.repository.find_auto_start().await? {
            if let Err(e) = self.start(&definition.name, "manager启动").await {
                error!("启动fabric {} 失败: {}", definition.name, e);
            }
        }
        Ok(())
    }

    pub async fn start(&self, fabric: &str, reason: &str) -> EptResult<StartOutcome> {
        let definition = self.repository.load(fabric).await?;
        let mut fabrics = self.fabrics.lock().await;

        let Some(definition) = definition else {
            warn!("fabric {} 不存在于配置中，不再追踪", fabric);
            fabrics.remove(fabric);
            update_running_gauge(&mut fabrics);
            return Ok(StartOutcome::Dropped);
        };

        if let Some(runtime) = fabrics.get_mut(fabric) {
            if runtime.is_alive() {
                info!("fabric {} 的订阅进程已在运行", fabric);
                return Ok(StartOutcome::AlreadyRunning);
            }
            // 回收已退出的进程
            if let Some(mut process) = runtime.process.take() {
                if let Err(e) = process.terminate().await {
                    error!("回收fabric {} 的旧订阅进程失败: {}", fabric, e);
                }
            }
        }

        if !self.tracker.is_ready().await {
            let missing = self.tracker.missing_roles().await;
            let outcome = if definition.auto_start {
                fabrics.entry(fabric.to_string()).or_default().waiting_for_retry = true;
                self.repository
                    .record_event(
                        fabric,
                        FabricEventStatus::WaitingToStart,
                        &format!("等待必需角色 {missing:?} 上线 ({reason})"),
                    )
                    .await?;
                StartOutcome::WaitingForRetry
            } else {
                fabrics.remove(fabric);
                warn!(
                    "fabric {} 未开启自动启动且必需角色 {:?} 未就绪，不再追踪",
                    fabric, missing
                );
                StartOutcome::Dropped
            };
            update_running_gauge(&mut fabrics);
            return Ok(outcome);
        }

        let outcome = match self.launcher.spawn(fabric).await {
            Ok(process) => {
                info!(
                    "fabric {} 的订阅进程已启动 (pid={:?}): {}",
                    fabric,
                    process.id(),
                    reason
                );
                fabrics.insert(
                    fabric.to_string(),
                    FabricRuntime {
                        process: Some(process),
                        waiting_for_retry: false,
                    },
                );
                self.repository
                    .record_event(fabric, FabricEventStatus::Starting, reason)
                    .await?;
                StartOutcome::Started
            }
            Err(e) => {
                error!("启动fabric {} 的订阅进程失败: {}", fabric, e);
                if definition.auto_start {
                    fabrics.entry(fabric.to_string()).or_default().waiting_for_retry = true;
                    self.repository
                        .record_event(
                            fabric,
                            FabricEventStatus::WaitingToStart,
                            &format!("订阅进程启动失败: {e}"),
                        )
                        .await?;
                    StartOutcome::WaitingForRetry
                } else {
                    fabrics.remove(fabric);
                    StartOutcome::Dropped
                }
            }
        };
        update_running_gauge(&mut fabrics);
        Ok(outcome)
    }

    /// 终止订阅进程并清理Worker队列中该fabric的消息，返回此前是否在追踪
    pub async fn stop(&self, fabric: &str, reason: &str) -> EptResult<bool> {
        let definition = self.repository.load(fabric).await?;
        let mut fabrics = self.fabrics.lock().await;

        let tracked = match fabrics.get_mut(fabric) {
            Some(runtime) => {
                if let Some(mut process) = runtime.process.take() {
                    if let Err(e) = process.terminate().await {
                        error!("终止fabric {} 的订阅进程失败: {}", fabric, e);
                    }
                }
                true
            }
            None => false,
        };

        if let Err(e) = self.router.flush_fabric(fabric).await {
            warn!("清理fabric {} 的排队消息失败: {}", fabric, e);
        }
        if let Err(e) = self
            .repository
            .record_event(fabric, FabricEventStatus::Stopped, reason)
            .await
        {
            error!("记录fabric {} 的停止事件失败: {}", fabric, e);
        }

        match definition {
            Some(definition) if definition.auto_start => {
                if let Some(runtime) = fabrics.get_mut(fabric) {
                    runtime.waiting_for_retry = true;
                }
            }
            _ => {
                fabrics.remove(fabric);
            }
        }
        update_running_gauge(&mut fabrics);
        info!("fabric {} 已停止: {}", fabric, reason);
        Ok(tracked)
    }

    pub async fn restart(&self, fabric: &str, reason: &str) -> EptResult<StartOutcome> {
        self.stop(fabric, reason).await?;
        self.start(fabric, reason).await
    }

    /// 检查订阅进程是否意外退出
    ///
    /// 自动启动的fabric会被重启，其余的不再追踪。返回处理的fabric。
    pub async fn health_check(&self) -> EptResult<Vec<String>> {
        let dead: Vec<String> = {
            let mut fabrics = self.fabrics.lock().await;
            fabrics
                .iter_mut()
                .filter(|(_, runtime)| runtime.process.is_some())
                .filter_map(|(name, runtime)| (!runtime.is_alive()).then(|| name.clone()))
                .collect()
        };

        for fabric in &dead {
            warn!("fabric {} 的订阅进程意外退出", fabric);
            if let Err(e) = self.recover_dead(fabric).await {
                error!("处理fabric {} 的退出进程失败: {}", fabric, e);
            }
        }
        Ok(dead)
    }

    async fn recover_dead(&self, fabric: &str) -> EptResult<()> {
        match self.repository.load(fabric).await? {
            Some(definition) if definition.auto_start => {
                let outcome = self.restart(fabric, "订阅进程意外退出").await?;
                info!("fabric {} 重启结果: {}", fabric, outcome);
            }
            Some(_) => {
                self.stop(fabric, "订阅进程退出，未开启自动启动").await?;
            }
            None => {
                warn!("fabric {} 已从配置中删除，不再追踪", fabric);
                self.stop(fabric, "fabric配置已删除").await?;
            }
        }
        Ok(())
    }

    /// 尝试启动所有等待重试的fabric
    pub async fn retry_waiting(&self) -> EptResult<Vec<(String, StartOutcome)>> {
        let waiting: Vec<String> = self
            .fabrics
            .lock()
            .await
            .iter()
            .filter(|(_, runtime)| runtime.waiting_for_retry)
            .map(|(name, _)| name.clone())
            .collect();

        let mut results = Vec::with_capacity(waiting.len());
        for fabric in waiting {
            match self.start(&fabric, "必需角色已就绪，重试启动").await {
                Ok(outcome) => results.push((fabric, outcome)),
                Err(e) => error!("重试启动fabric {} 失败: {}", fabric, e),
            }
        }
        Ok(results)
    }

    /// 停止并重新启动所有追踪中的fabric
    ///
    /// 逐个处理，某个fabric出错不影响其余fabric；返回出错的fabric。
    pub async fn restart_all(&self, reason: &str) -> Vec<String> {
        let names: Vec<String> = self.fabrics.lock().await.keys().cloned().collect();
        let mut failed = Vec::new();
        for fabric in names {
            match self.restart(&fabric, reason).await {
                Ok(outcome) => info!("fabric {} 重启结果: {}", fabric, outcome),
                Err(e) => {
                    error!("重启fabric {} 失败: {}", fabric, e);
                    failed.push(fabric);
                }
            }
        }
        failed
    }

    /// 终止所有订阅进程并清空追踪表
    pub async fn shutdown(&self) {
        let mut fabrics = self.fabrics.lock().await;
        for (fabric, runtime) in fabrics.iter_mut() {
            if let Some(mut process) = runtime.process.take() {
                match process.terminate().await {
                    Ok(()) => info!("已终止fabric {} 的订阅进程", fabric),
                    Err(e) => error!("终止fabric {} 的订阅进程失败: {}", fabric, e),
                }
            }
        }
        fabrics.clear();
        gauge!("ept_fabrics_running").set(0.0);
    }

    pub async fn status(&self) -> Vec<FabricStatus> {
        let mut fabrics = self.fabrics.lock().await;
        fabrics
            .iter_mut()
            .map(|(name, runtime)| FabricStatus {
                fabric: name.clone(),
                alive: runtime.is_alive(),
                waiting_for_retry: runtime.waiting_for_retry,
            })
            .collect()
    }

    pub async fn is_waiting(&self, fabric: &str) -> bool {
        self.fabrics
            .lock()
            .await
            .get(fabric)
            .is_some_and(|runtime| runtime.waiting_for_retry)
    }

    pub async fn is_tracked(&self, fabric: &str) -> bool {
        self.fabrics.lock().await.contains_key(fabric)
    }
}

fn update_running_gauge(fabrics: &mut BTreeMap<String, FabricRuntime>) {
    let mut running = 0;
    for runtime in fabrics.values_mut() {
        if runtime.is_alive() {
            running += 1;
        }
    }
    gauge!("ept_fabrics_running").set(running as f64);
}
