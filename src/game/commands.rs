//! Plugin commands
//!
//! - `help`, `version`: anyone
//! - `toggle`: players only, flips their own drop protection
//! - `visibility`, `reload`, `status`: admins and the console

use std::sync::Arc;

use tracing::{debug, info};

use crate::host::entity::PlayerId;
use crate::state::GuardContext;

use super::notice::{send_notice, Notice};

/// Sub-commands offered for completion
pub const SUBCOMMANDS: [&str; 6] = ["help", "reload", "status", "toggle", "version", "visibility"];

const HELP_LINES: [&str; 7] = [
    "Lootguard commands:",
    "  help        show this help",
    "  version     show the plugin version",
    "  toggle      turn protection of your drops on or off",
    "  visibility  show or hide protected items from other players (admin)",
    "  reload      reload the configuration file (admin)",
    "  status      show the active backend and counters (admin)",
];

/// Who issued a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSender {
    Console,
    Player { id: PlayerId, name: String, admin: bool },
}

impl CommandSender {
    pub fn name(&self) -> &str {
        match self {
            CommandSender::Console => "console",
            CommandSender::Player { name, .. } => name,
        }
    }

    pub fn is_admin(&self) -> bool {
        match self {
            CommandSender::Console => true,
            CommandSender::Player { admin, .. } => *admin,
        }
    }
}

/// Parses and runs commands
#[derive(Clone)]
pub struct CommandDispatcher {
    ctx: Arc<GuardContext>,
}

impl CommandDispatcher {
    pub fn new(ctx: Arc<GuardContext>) -> Self {
        Self { ctx }
    }

    /// Run a command line and return the replies for the sender
    pub async fn execute(&self, sender: &CommandSender, line: &str) -> Vec<Notice> {
        if self.ctx.debug() {
            debug!(sender = %sender.name(), command = %line, "Command executed");
        }

        let subcommand = line.split_whitespace().next().unwrap_or("help").to_lowercase();
        match subcommand.as_str() {
            "help" => HELP_LINES.iter().copied().map(Notice::Help).collect(),
            "version" => vec![Notice::Version(crate::VERSION)],
            "toggle" => vec![self.toggle(sender)],
            "visibility" => vec![self.visibility(sender)],
            "reload" => vec![self.reload(sender).await],
            "status" => vec![self.status(sender)],
            _ => vec![Notice::UnknownCommand(subcommand)],
        }
    }

    /// Run a command and deliver the replies (system messages for players,
    /// log lines for the console)
    pub async fn dispatch(&self, sender: &CommandSender, line: &str) -> Vec<Notice> {
        let replies = self.execute(sender, line).await;
        for reply in &replies {
            match sender {
                CommandSender::Console => info!(reply = %reply, "Command reply"),
                CommandSender::Player { id, .. } => send_notice(&self.ctx.host.sessions, *id, reply),
            }
        }
        replies
    }

    /// Sub-commands matching a typed prefix
    pub fn complete(prefix: &str) -> Vec<&'static str> {
        let prefix = prefix.to_lowercase();
        SUBCOMMANDS
            .iter()
            .copied()
            .filter(|name| name.starts_with(&prefix))
            .collect()
    }

    fn toggle(&self, sender: &CommandSender) -> Notice {
        let CommandSender::Player { id, name, .. } = sender else {
            return Notice::PlayersOnly;
        };

        let enabled = self.ctx.registry.toggle_preference(*id);
        if self.ctx.debug() {
            debug!(player = %name, enabled, "Protection toggled");
        }
        if enabled {
            Notice::ProtectionEnabled
        } else {
            Notice::ProtectionDisabled
        }
    }

    fn visibility(&self, sender: &CommandSender) -> Notice {
        if !sender.is_admin() {
            return Notice::NoPermission;
        }
        match self.ctx.toggle_visibility() {
            Ok(visible_to_others) => Notice::VisibilityChanged { visible_to_others },
            Err(_) => Notice::VisibilityFailed,
        }
    }

    async fn reload(&self, sender: &CommandSender) -> Notice {
        if !sender.is_admin() {
            return Notice::NoPermission;
        }
        if self.ctx.reload().await {
            Notice::ReloadSucceeded
        } else {
            Notice::ReloadFailed
        }
    }

    fn status(&self, sender: &CommandSender) -> Notice {
        if !sender.is_admin() {
            return Notice::NoPermission;
        }
        Notice::Status(self.ctx.status())
    }
}
