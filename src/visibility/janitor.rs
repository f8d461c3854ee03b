//! Stale entry janitor
//!
//! Periodically evicts protected items whose entity no longer exists in any
//! world. One task runs per tracked map since each map uses its own identity
//! scheme.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::host::world::WorldView;

/// Default sweep interval for the registry and the fallback backend
pub const DEFAULT_REGISTRY_INTERVAL: Duration = Duration::from_secs(5);

/// Default sweep interval for the packet backends
pub const DEFAULT_PACKET_INTERVAL: Duration = Duration::from_secs(10);

/// A map the janitor can clean
pub trait SweepTarget: Send + Sync {
    /// Name used in logs
    fn label(&self) -> &str;

    /// Evict entries whose entity is gone; returns how many were evicted
    fn sweep(&self, world: &dyn WorldView) -> usize;

    /// Number of tracked entries
    fn tracked(&self) -> usize;
}

/// Background sweep over one target
pub struct JanitorTask {
    target: Arc<dyn SweepTarget>,
    world: Arc<dyn WorldView>,
    period: Duration,
}

impl JanitorTask {
    pub fn new(target: Arc<dyn SweepTarget>, world: Arc<dyn WorldView>, period: Duration) -> Self {
        Self {
            target,
            world,
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one sweep now
    pub fn sweep(&self) -> usize {
        self.target.sweep(self.world.as_ref())
    }

    /// Sweep on every tick until shutdown
    pub async fn run(&self, shutdown_rx: &mut broadcast::Receiver<()>) {
        info!(
            target_map = self.target.label(),
            period_ms = self.period.as_millis() as u64,
            "Janitor started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep();
                    if evicted > 0 {
                        debug!(
                            target_map = self.target.label(),
                            evicted,
                            tracked = self.target.tracked(),
                            "Janitor sweep"
                        );
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(target_map = self.target.label(), "Janitor stopped");
                    break;
                }
            }
        }
    }

    /// Spawn the sweep loop on the runtime
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(&mut shutdown_rx).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::entity::{EntityUuid, ItemStack, Location, PlayerId};
    use crate::host::world::{WorldSet, DEFAULT_WORLD};
    use crate::visibility::items::ProtectedItems;

    fn setup() -> (Arc<WorldSet>, Arc<ProtectedItems<EntityUuid>>, EntityUuid) {
        let worlds = Arc::new(WorldSet::new());
        let item = worlds.spawn_item(DEFAULT_WORLD, ItemStack::new(1, 1), Location::default());
        let map = Arc::new(ProtectedItems::<EntityUuid>::new("registry"));
        map.insert(item.uuid, PlayerId::from_name("alice"));
        (worlds, map, item.uuid)
    }

    #[test]
    fn test_sweep_keeps_live_items() {
        let (worlds, map, uuid) = setup();
        let janitor = JanitorTask::new(map.clone(), worlds.clone(), DEFAULT_REGISTRY_INTERVAL);

        assert_eq!(janitor.sweep(), 0);
        assert!(map.contains(uuid));

        worlds.remove_item(uuid);
        assert_eq!(janitor.sweep(), 1);
        assert!(map.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_and_stops_on_shutdown() {
        let (worlds, map, uuid) = setup();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = JanitorTask::new(map.clone(), worlds.clone(), Duration::from_secs(5)).spawn(shutdown_rx);

        worlds.remove_item(uuid);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(map.is_empty());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
