use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use ept_core::config::FabricConfig;
use ept_core::models::{FabricDefinition, FabricEvent, FabricEventStatus};
use ept_core::traits::FabricRepository;
use ept_core::EptResult;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// 基于配置的fabric仓库
///
/// fabric定义来自配置文件，生命周期事件保存在内存中，每个fabric最多保留
/// `history` 条，最新的在末尾。
#[derive(Debug)]
pub struct ConfigFabricRepository {
    fabrics: RwLock<HashMap<String, FabricDefinition>>,
    events: Mutex<HashMap<String, VecDeque<FabricEvent>>>,
    history: usize,
}

impl ConfigFabricRepository {
    pub fn new(definitions: Vec<FabricDefinition>, history: usize) -> Self {
        let fabrics = definitions
            .into_iter()
            .map(|definition| (definition.name.clone(), definition))
            .collect();
        Self {
            fabrics: RwLock::new(fabrics),
            events: Mutex::new(HashMap::new()),
            history: history.max(1),
        }
    }

    pub fn from_config(config: &FabricConfig) -> Self {
        Self::new(config.fabrics.clone(), config.event_history)
    }

    /// 新增或替换fabric定义
    pub async fn upsert(&self, definition: FabricDefinition) {
        self.fabrics
            .write()
            .await
            .insert(definition.name.clone(), definition);
    }

    /// 删除fabric定义，事件历史保留
    pub async fn remove(&self, name: &str) -> Option<FabricDefinition> {
        self.fabrics.write().await.remove(name)
    }
}

#[async_trait]
impl FabricRepository for ConfigFabricRepository {
    async fn find_auto_start(&self) -> EptResult<Vec<FabricDefinition>> {
        let mut fabrics: Vec<FabricDefinition> = self
            .fabrics
            .read()
            .await
            .values()
            .filter(|definition| definition.auto_start)
            .cloned()
            .collect();
        fabrics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(fabrics)
    }

    async fn load(&self, name: &str) -> EptResult<Option<FabricDefinition>> {
        Ok(self.fabrics.read().await.get(name).cloned())
    }

    async fn record_event(
        &self,
        fabric: &str,
        status: FabricEventStatus,
        description: &str,
    ) -> EptResult<()> {
        info!(fabric = fabric, status = status.as_str(), "{}", description);

        let mut events = self.events.lock().await;
        let history = events.entry(fabric.to_string()).or_default();
        history.push_back(FabricEvent {
            fabric: fabric.to_string(),
            status,
            description: description.to_string(),
            ts: Utc::now(),
        });
        while history.len() > self.history {
            history.pop_front();
        }
        Ok(())
    }

    async fn events(&self, fabric: &str) -> EptResult<Vec<FabricEvent>> {
        Ok(self
            .events
            .lock()
            .await
            .get(fabric)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> ConfigFabricRepository {
        ConfigFabricRepository::new(
            vec![
                FabricDefinition::new("fab2", true),
                FabricDefinition::new("fab1", true),
                FabricDefinition::new("manual", false),
            ],
            3,
        )
    }

    #[tokio::test]
    async fn test_find_auto_start() {
        let repo = repository();
        let names: Vec<String> = repo
            .find_auto_start()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["fab1", "fab2"]);
    }

    #[tokio::test]
    async fn test_load_and_remove() {
        let repo = repository();
        assert!(!repo.load("manual").await.unwrap().unwrap().auto_start);

        repo.remove("manual").await;
        assert!(repo.load("manual").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_history_is_bounded() {
        let repo = repository();
        for i in 0..5 {
            repo.record_event("fab1", FabricEventStatus::Starting, &format!("start {i}"))
                .await
                .unwrap();
        }
        repo.record_event("fab1", FabricEventStatus::Stopped, "stop")
            .await
            .unwrap();

        let events = repo.events("fab1").await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].description, "start 3");
        assert_eq!(events[2].status, FabricEventStatus::Stopped);
        assert!(repo.events("fab2").await.unwrap().is_empty());
    }
}
