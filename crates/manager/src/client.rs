use std::sync::Arc;
use std::time::Duration;

use ept_core::config::{BrokerConfig, ManagerConfig};
use ept_core::models::{ManagerCommand, ManagerRequest, ManagerResponse, ManagerStatus};
use ept_core::traits::Broker;
use ept_core::{EptError, EptResult};
use tokio::time::timeout_at;
use tracing::debug;

/// Manager控制通道客户端
///
/// 先订阅响应通道再发布请求，等待 `seq` 相同的响应。
pub struct ManagerClient {
    broker: Arc<dyn Broker>,
    control_channel: String,
    response_channel: String,
    timeout: Duration,
}

impl ManagerClient {
    pub fn new(
        broker: Arc<dyn Broker>,
        control_channel: impl Into<String>,
        response_channel: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            broker,
            control_channel: control_channel.into(),
            response_channel: response_channel.into(),
            timeout,
        }
    }

    pub fn from_config(broker: Arc<dyn Broker>, channels: &BrokerConfig, manager: &ManagerConfig) -> Self {
        Self::new(
            broker,
            channels.manager_control_channel.clone(),
            channels.manager_response_channel.clone(),
            manager.control_timeout(),
        )
    }

    /// 发送请求并等待响应
    pub async fn request(&self, command: ManagerCommand) -> EptResult<ManagerResponse> {
        let mut subscription = self
            .broker
            .subscribe(std::slice::from_ref(&self.response_channel))
            .await?;

        let request = ManagerRequest::new(rand::random::<u32>() as u64, command);
        let name = request.command.name();
        self.broker
            .publish(&self.control_channel, &request.serialize()?)
            .await?;
        debug!("已发送控制请求 {} (seq={})", name, request.seq);

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let message = timeout_at(deadline, subscription.recv())
                .await
                .map_err(|_| EptError::Timeout(format!("等待 {name} 的响应超时")))?
                .ok_or_else(|| EptError::Broker("响应通道订阅已关闭".to_string()))?;

            match ManagerResponse::parse(&message.payload) {
                Ok(response) if response.seq == request.seq => return Ok(response),
                Ok(response) => debug!("忽略其他请求的响应 seq={}", response.seq),
                Err(e) => debug!("忽略无法解析的响应: {}", e),
            }
        }
    }

    pub async fn status(&self) -> EptResult<ManagerStatus> {
        let response = self.request(ManagerCommand::GetManagerStatus).await?;
        if !response.success {
            return Err(EptError::Internal(
                response.error.unwrap_or_else(|| "状态查询失败".to_string()),
            ));
        }
        serde_json::from_value(response.data).map_err(EptError::from)
    }

    pub async fn start_fabric(&self, fabric: &str, reason: Option<String>) -> EptResult<ManagerResponse> {
        self.request(ManagerCommand::FabricStart {
            fabric: fabric.to_string(),
            reason,
        })
        .await
    }

    pub async fn stop_fabric(&self, fabric: &str, reason: Option<String>) -> EptResult<ManagerResponse> {
        self.request(ManagerCommand::FabricStop {
            fabric: fabric.to_string(),
            reason,
        })
        .await
    }

    pub async fn restart_fabric(
        &self,
        fabric: &str,
        reason: Option<String>,
    ) -> EptResult<ManagerResponse> {
        self.request(ManagerCommand::FabricRestart {
            fabric: fabric.to_string(),
            reason,
        })
        .await
    }
}
