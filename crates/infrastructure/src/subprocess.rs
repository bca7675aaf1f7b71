use std::process::Stdio;

use async_trait::async_trait;
use ept_core::config::FabricConfig;
use ept_core::traits::{FabricProcess, ProcessLauncher};
use ept_core::{EptError, EptResult};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// 以子进程方式运行fabric订阅程序
#[derive(Debug, Clone)]
pub struct SubprocessLauncher {
    config: FabricConfig,
}

impl SubprocessLauncher {
    pub fn new(config: FabricConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProcessLauncher for SubprocessLauncher {
    async fn spawn(&self, fabric: &str) -> EptResult<Box<dyn FabricProcess>> {
        let args = self.config.args_for(fabric);
        info!(
            "启动fabric订阅进程: fabric={}, command={}, args={:?}",
            fabric, self.config.subscriber_command, args
        );

        let mut cmd = Command::new(&self.config.subscriber_command);
        cmd.args(&args)
            .env("EPT_FABRIC", fabric)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            EptError::Process(format!("启动fabric {fabric} 的订阅进程失败: {e}"))
        })?;

        Ok(Box::new(SubscriberProcess {
            fabric: fabric.to_string(),
            child,
        }))
    }
}

/// 一个正在运行的订阅子进程
#[derive(Debug)]
pub struct SubscriberProcess {
    fabric: String,
    child: Child,
}

#[async_trait]
impl FabricProcess for SubscriberProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("fabric {} 的订阅进程已退出: {}", self.fabric, status);
                false
            }
            Err(e) => {
                warn!("检查fabric {} 的订阅进程状态失败: {}", self.fabric, e);
                false
            }
        }
    }

    async fn terminate(&mut self) -> EptResult<()> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }

        self.child.start_kill().map_err(|e| {
            EptError::Process(format!("终止fabric {} 的订阅进程失败: {e}", self.fabric))
        })?;
        let status = self.child.wait().await.map_err(|e| {
            EptError::Process(format!("等待fabric {} 的订阅进程退出失败: {e}", self.fabric))
        })?;
        debug!("fabric {} 的订阅进程已终止: {}", self.fabric, status);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn launcher(command: &str, args: &[&str]) -> SubprocessLauncher {
        SubprocessLauncher::new(FabricConfig {
            subscriber_command: command.to_string(),
            subscriber_args: args.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_spawn_and_terminate() {
        let mut process = launcher("sleep", &["30"]).spawn("fab1").await.unwrap();
        assert!(process.id().is_some());
        assert!(process.is_alive());

        process.terminate().await.unwrap();
        assert!(!process.is_alive());
        // 重复终止是安全的
        process.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_exited_process_is_not_alive() {
        let mut process = launcher("sh", &["-c", "exit 0", "{fabric}"])
            .spawn("fab1")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_missing_command() {
        let result = launcher("/nonexistent/ept-subscriber", &[]).spawn("fab1").await;
        assert!(matches!(result, Err(EptError::Process(_))));
    }
}
