//! Player-facing messages

use std::fmt;

use tracing::debug;

use crate::host::entity::PlayerId;
use crate::net::session::SessionManager;
use crate::protocol::packets::{OutboundPacket, SystemMessagePacket};
use crate::state::GuardStatus;

/// A message shown to a player or the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ItemProtected,
    PickupDenied,
    ProtectionEnabled,
    ProtectionDisabled,
    VisibilityChanged { visible_to_others: bool },
    VisibilityFailed,
    ReloadSucceeded,
    ReloadFailed,
    NoPermission,
    PlayersOnly,
    UnknownCommand(String),
    Help(&'static str),
    Version(&'static str),
    Status(GuardStatus),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::ItemProtected => f.write_str("Your dropped item is protected. Only you can pick it up."),
            Notice::PickupDenied => f.write_str("This item belongs to another player."),
            Notice::ProtectionEnabled => f.write_str("Drop protection enabled."),
            Notice::ProtectionDisabled => f.write_str("Drop protection disabled."),
            Notice::VisibilityChanged { visible_to_others: true } => {
                f.write_str("Protected items are now visible to other players.")
            }
            Notice::VisibilityChanged { visible_to_others: false } => {
                f.write_str("Protected items are now hidden from other players.")
            }
            Notice::VisibilityFailed => f.write_str("Failed to change visibility! Check console for errors."),
            Notice::ReloadSucceeded => f.write_str("Configuration reloaded."),
            Notice::ReloadFailed => f.write_str("Reload failed! Check console for errors."),
            Notice::NoPermission => f.write_str("You do not have permission to do that."),
            Notice::PlayersOnly => f.write_str("This command can only be used by players!"),
            Notice::UnknownCommand(name) => write!(f, "Unknown command '{}'. Try 'help'.", name),
            Notice::Help(line) => f.write_str(line),
            Notice::Version(version) => write!(f, "Lootguard v{}", version),
            Notice::Status(status) => write!(
                f,
                "backend={} visible-to-others={} protected={} tracked={} suppressed={} allowed={} online={}",
                status.backend,
                status.visible_to_others,
                status.registry.protected_items,
                status.backend_tracked,
                status.decisions.suppressed,
                status.decisions.allowed,
                status.online_players
            ),
        }
    }
}

/// Deliver a notice to an online player as a system message
pub fn send_notice(sessions: &SessionManager, player: PlayerId, notice: &Notice) {
    let packet = OutboundPacket::from(SystemMessagePacket::new(notice.to_string()));
    if let Err(e) = sessions.send_packet(player, &packet) {
        debug!(player = %player, error = %e, "Notice not delivered");
    }
}
