use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 优雅关闭管理器
///
/// 持有根取消令牌；各组件从这里派生子令牌，关闭时一次性全部取消。
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根令牌的克隆
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭，重复调用无副作用
    pub fn shutdown(&self) {
        if self.token.is_cancelled() {
            return;
        }
        info!("触发系统关闭");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 在后台等待 SIGINT/SIGTERM 并触发关闭
    pub fn listen_for_signals(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_shutdown_signal() => manager.shutdown(),
                _ = manager.token.cancelled() => {}
            }
        })
    }
}

/// 等待关闭信号
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_cancels_child_tokens() {
        let manager = ShutdownManager::new();
        let child = manager.token().child_token();
        assert!(!manager.is_shutdown());

        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_shutdown());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_signal_listener_exits_on_shutdown() {
        let manager = ShutdownManager::new();
        let listener = manager.listen_for_signals();
        manager.shutdown();
        listener.await.unwrap();
    }
}
