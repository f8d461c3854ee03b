//! Protected item glow
//!
//! Cosmetic outline for protected items. Items are grouped into a single
//! render team whose color comes from configuration. Nothing here affects
//! whether an item is protected.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GlowError;
use crate::host::entity::EntityUuid;

/// Name of the render team holding glowing items
pub const GLOW_TEAM_NAME: &str = "lootguard_protected";

/// Outline colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlowColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    #[default]
    White,
}

impl GlowColor {
    pub const ALL: [GlowColor; 16] = [
        GlowColor::Black,
        GlowColor::DarkBlue,
        GlowColor::DarkGreen,
        GlowColor::DarkAqua,
        GlowColor::DarkRed,
        GlowColor::DarkPurple,
        GlowColor::Gold,
        GlowColor::Gray,
        GlowColor::DarkGray,
        GlowColor::Blue,
        GlowColor::Green,
        GlowColor::Aqua,
        GlowColor::Red,
        GlowColor::LightPurple,
        GlowColor::Yellow,
        GlowColor::White,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GlowColor::Black => "BLACK",
            GlowColor::DarkBlue => "DARK_BLUE",
            GlowColor::DarkGreen => "DARK_GREEN",
            GlowColor::DarkAqua => "DARK_AQUA",
            GlowColor::DarkRed => "DARK_RED",
            GlowColor::DarkPurple => "DARK_PURPLE",
            GlowColor::Gold => "GOLD",
            GlowColor::Gray => "GRAY",
            GlowColor::DarkGray => "DARK_GRAY",
            GlowColor::Blue => "BLUE",
            GlowColor::Green => "GREEN",
            GlowColor::Aqua => "AQUA",
            GlowColor::Red => "RED",
            GlowColor::LightPurple => "LIGHT_PURPLE",
            GlowColor::Yellow => "YELLOW",
            GlowColor::White => "WHITE",
        }
    }

    /// Parse a configured color, falling back to white
    pub fn parse_or_default(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|e: GlowError| {
            warn!(error = %e, fallback = GlowColor::default().name(), "Invalid glow color");
            GlowColor::default()
        })
    }
}

impl FromStr for GlowColor {
    type Err = GlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace([' ', '-'], "_");
        GlowColor::ALL
            .into_iter()
            .find(|color| color.name() == wanted)
            .ok_or_else(|| GlowError::UnknownColor(s.to_string()))
    }
}

impl fmt::Display for GlowColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render team of glowing items
#[derive(Debug)]
pub struct GlowTeam {
    pub name: &'static str,
    pub color: GlowColor,
    members: HashSet<EntityUuid>,
}

impl GlowTeam {
    fn new(color: GlowColor) -> Self {
        Self {
            name: GLOW_TEAM_NAME,
            color,
            members: HashSet::new(),
        }
    }
}

/// Glow collaborator used on registration and pickup
pub struct GlowEffect {
    enabled: AtomicBool,
    team: RwLock<GlowTeam>,
}

impl GlowEffect {
    pub fn new(enabled: bool, color: GlowColor) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            team: RwLock::new(GlowTeam::new(color)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Outline an item
    pub fn apply(&self, item: EntityUuid) -> Result<(), GlowError> {
        if !self.is_enabled() {
            return Err(GlowError::Disabled);
        }
        self.team.write().members.insert(item);
        debug!(entity = %item, "Glow applied");
        Ok(())
    }

    /// Remove an item's outline; returns whether it was outlined
    pub fn remove(&self, item: EntityUuid) -> bool {
        self.team.write().members.remove(&item)
    }

    pub fn contains(&self, item: EntityUuid) -> bool {
        self.team.read().members.contains(&item)
    }

    pub fn color(&self) -> GlowColor {
        self.team.read().color
    }

    pub fn member_count(&self) -> usize {
        self.team.read().members.len()
    }

    /// Apply reloaded settings. Disabling clears every outline.
    pub fn reconfigure(&self, enabled: bool, color: GlowColor) {
        let mut team = self.team.write();
        team.color = color;
        if !enabled {
            team.members.clear();
        }
        self.enabled.store(enabled, Ordering::Release);
        debug!(enabled, color = %color, "Glow reconfigured");
    }
}
