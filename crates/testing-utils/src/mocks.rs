//! Fake implementations of the process ports
//!
//! The fake launcher never creates OS processes. Every spawned fake shares an
//! `alive` flag with the launcher so tests can simulate a crash.

use async_trait::async_trait;
use ept_core::traits::{FabricProcess, ProcessLauncher};
use ept_core::{EptError, EptResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Fake subscriber process
#[derive(Debug)]
pub struct FakeProcess {
    pid: u32,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl FabricProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn terminate(&mut self) -> EptResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Fake launcher that records every spawn per fabric
#[derive(Debug, Default)]
pub struct FakeProcessLauncher {
    spawned: Mutex<HashMap<String, Vec<Arc<AtomicBool>>>>,
    next_pid: AtomicU32,
    failing: AtomicBool,
}

impl FakeProcessLauncher {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            ..Default::default()
        }
    }

    /// Make subsequent spawns fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of processes ever spawned for the fabric
    pub fn spawn_count(&self, fabric: &str) -> usize {
        self.spawned
            .lock()
            .unwrap()
            .get(fabric)
            .map_or(0, |processes| processes.len())
    }

    /// Number of processes for the fabric that are still alive
    pub fn live_count(&self, fabric: &str) -> usize {
        self.spawned.lock().unwrap().get(fabric).map_or(0, |processes| {
            processes
                .iter()
                .filter(|alive| alive.load(Ordering::SeqCst))
                .count()
        })
    }

    /// Total live processes across all fabrics
    pub fn total_live(&self) -> usize {
        self.spawned
            .lock()
            .unwrap()
            .values()
            .flatten()
            .filter(|alive| alive.load(Ordering::SeqCst))
            .count()
    }

    /// Simulate an unexpected exit of every process of the fabric
    pub fn crash(&self, fabric: &str) {
        if let Some(processes) = self.spawned.lock().unwrap().get(fabric) {
            for alive in processes {
                alive.store(false, Ordering::SeqCst);
            }
        }
    }
}

#[async_trait]
impl ProcessLauncher for FakeProcessLauncher {
    async fn spawn(&self, fabric: &str) -> EptResult<Box<dyn FabricProcess>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EptError::Process(format!(
                "fake launcher refused to spawn {fabric}"
            )));
        }

        let alive = Arc::new(AtomicBool::new(true));
        self.spawned
            .lock()
            .unwrap()
            .entry(fabric.to_string())
            .or_default()
            .push(alive.clone());

        Ok(Box::new(FakeProcess {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            alive,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_launcher_tracks_processes() {
        let launcher = FakeProcessLauncher::new();
        let mut first = launcher.spawn("fab1").await.unwrap();
        let _second = launcher.spawn("fab2").await.unwrap();
        assert_eq!(launcher.total_live(), 2);

        launcher.crash("fab1");
        assert!(!first.is_alive());
        assert_eq!(launcher.live_count("fab1"), 0);
        assert_eq!(launcher.spawn_count("fab1"), 1);

        launcher.set_failing(true);
        assert!(launcher.spawn("fab1").await.is_err());
    }
}
