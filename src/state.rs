//! Guard state module
//!
//! Contains the shared context built once at startup and handed to every
//! event handler, command and background task.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::GuardConfig;
use crate::error::BackendError;
use crate::host::entity::{ItemEntity, PlayerId};
use crate::host::HostServices;
use crate::protection::registry::RegistryStats;
use crate::protection::{GlowEffect, NotificationThrottle, OwnershipRegistry, PickupArbiter};
use crate::visibility::janitor::JanitorTask;
use crate::visibility::{self, BackendKind, DecisionStats, VisibilityBackend, VisibilitySettings};

/// Snapshot reported by the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardStatus {
    pub backend: BackendKind,
    pub visible_to_others: bool,
    pub registry: RegistryStats,
    pub backend_tracked: usize,
    pub decisions: DecisionStats,
    pub online_players: usize,
}

/// Protection state shared across the host
pub struct GuardContext {
    /// Host services (worlds, sessions, plugins)
    pub host: HostServices,
    /// Item ownership and preferences
    pub registry: Arc<OwnershipRegistry>,
    /// Pickup decisions
    pub arbiter: PickupArbiter,
    /// Denied-pickup message throttle
    pub throttle: Arc<NotificationThrottle>,
    /// Cosmetic glow
    pub glow: GlowEffect,
    config: RwLock<GuardConfig>,
    backend: Arc<dyn VisibilityBackend>,
    /// Serializes reloads and visibility flips
    reconfigure_lock: Mutex<()>,
}

impl GuardContext {
    /// Build the context and select the visibility backend
    pub fn new(host: HostServices, config: GuardConfig) -> Arc<Self> {
        let registry = Arc::new(OwnershipRegistry::new(config.protection.default_enabled));
        let backend = visibility::select_backend(&host, config.visibility_settings());
        let glow = GlowEffect::new(config.protection.glow.enabled, config.glow_color());

        info!(
            backend = %backend.kind(),
            default_enabled = config.protection.default_enabled,
            visible_to_others = config.protection.visibility.visible_to_others,
            "Item protection initialized"
        );

        Arc::new(Self {
            host,
            arbiter: PickupArbiter::new(registry.clone()),
            registry,
            throttle: Arc::new(NotificationThrottle::default()),
            glow,
            config: RwLock::new(config),
            backend,
            reconfigure_lock: Mutex::new(()),
        })
    }

    /// Snapshot of the active configuration
    pub fn config(&self) -> GuardConfig {
        self.config.read().clone()
    }

    pub fn debug(&self) -> bool {
        self.config.read().debug
    }

    pub fn visible_to_others(&self) -> bool {
        self.config.read().protection.visibility.visible_to_others
    }

    pub fn notify_on_drop(&self) -> bool {
        self.config.read().notifications.notify_on_drop
    }

    /// The active visibility backend
    pub fn backend(&self) -> &Arc<dyn VisibilityBackend> {
        &self.backend
    }

    /// Protect a freshly dropped item
    pub fn mark_protected(&self, item: &ItemEntity, owner: PlayerId) {
        self.registry.register(item.uuid, owner);
        self.backend.register_protected_item(item, owner);
        if let Err(e) = self.glow.apply(item.uuid) {
            if self.debug() {
                debug!(entity = %item.uuid, error = %e, "Glow not applied");
            }
        }
    }

    /// Forget a protected item (owner pickup)
    pub fn release(&self, item: &ItemEntity) {
        self.registry.unregister(item.uuid);
        self.backend.unregister_protected_item(item);
        self.glow.remove(item.uuid);
    }

    /// Flip the visible-to-others flag in memory and reinstall the listener.
    /// Returns the new value.
    pub fn toggle_visibility(&self) -> Result<bool, BackendError> {
        let _guard = self.reconfigure_lock.lock();
        let settings = {
            let config = self.config.read();
            VisibilitySettings {
                visible_to_others: !config.protection.visibility.visible_to_others,
                debug: config.debug,
            }
        };

        self.backend.reinitialize(settings)?;
        self.config.write().protection.visibility.visible_to_others = settings.visible_to_others;
        info!(visible_to_others = settings.visible_to_others, "Visibility setting changed");
        Ok(settings.visible_to_others)
    }

    /// Re-read the configuration file and apply it. Returns false and keeps
    /// the previous configuration on any failure.
    pub async fn reload(&self) -> bool {
        let path = self.config.read().config_path.clone();
        match GuardConfig::reload_from(&path).await {
            Ok(config) => match self.apply_config(config) {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, "Reload failed, previous configuration kept");
                    false
                }
            },
            Err(e) => {
                error!(error = %format!("{:#}", e), "Reload failed, previous configuration kept");
                false
            }
        }
    }

    /// Apply an already validated configuration
    pub fn apply_config(&self, config: GuardConfig) -> Result<(), BackendError> {
        let _guard = self.reconfigure_lock.lock();

        self.backend.reinitialize(config.visibility_settings())?;

        self.registry.clear_preferences();
        self.registry.set_default_enabled(config.protection.default_enabled);
        self.glow.reconfigure(config.protection.glow.enabled, config.glow_color());
        self.throttle.clear();

        info!(
            path = %config.config_path.display(),
            debug = config.debug,
            visible_to_others = config.protection.visibility.visible_to_others,
            "Configuration reloaded"
        );
        *self.config.write() = config;
        Ok(())
    }

    /// One janitor for the registry, one for the active backend and one
    /// pruning expired notification cooldowns
    pub fn janitors(&self) -> Vec<JanitorTask> {
        let config = self.config.read();
        let backend_interval = visibility::sweep_interval(
            self.backend.kind(),
            config.registry_interval(),
            config.packet_interval(),
        );
        vec![
            JanitorTask::new(self.registry.clone(), self.host.worlds.clone(), config.registry_interval()),
            JanitorTask::new(self.backend.sweep_target(), self.host.worlds.clone(), backend_interval),
            JanitorTask::new(self.throttle.clone(), self.host.worlds.clone(), config.registry_interval()),
        ]
    }

    /// Spawn every janitor on the runtime
    pub fn spawn_janitors(&self, shutdown_tx: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        self.janitors()
            .into_iter()
            .map(|janitor| janitor.spawn(shutdown_tx.subscribe()))
            .collect()
    }

    pub fn status(&self) -> GuardStatus {
        GuardStatus {
            backend: self.backend.kind(),
            visible_to_others: self.visible_to_others(),
            registry: self.registry.stats(),
            backend_tracked: self.backend.tracked_count(),
            decisions: self.backend.decision_stats(),
            online_players: self.host.sessions.player_count(),
        }
    }

    /// Remove the backend listener
    pub fn shutdown(&self) {
        self.backend.shutdown();
        info!("Item protection stopped");
    }
}
