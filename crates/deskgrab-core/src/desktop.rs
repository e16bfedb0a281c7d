//! Desktop session classification

use serde::{Deserialize, Serialize};

/// Window manager / compositor family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowManager {
    Gnome,
    Kde,
    Cosmic,
    Qtile,
    Wlroots,
    Hyprland,
    Other,
}

impl WindowManager {
    /// Families whose compositor only offers screenshots through the portal
    pub fn requires_portal(&self) -> bool {
        matches!(self, Self::Gnome | Self::Kde | Self::Cosmic)
    }

    /// Classify an `XDG_CURRENT_DESKTOP` value (colon separated list)
    pub fn from_desktop_name(value: &str) -> Option<Self> {
        value
            .split(':')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .find_map(|name| name.parse().ok())
    }
}

impl std::str::FromStr for WindowManager {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gnome" | "ubuntu" | "unity" => Ok(Self::Gnome),
            "kde" | "plasma" => Ok(Self::Kde),
            "cosmic" => Ok(Self::Cosmic),
            "qtile" => Ok(Self::Qtile),
            "wlroots" | "sway" | "river" | "wayfire" => Ok(Self::Wlroots),
            "hyprland" => Ok(Self::Hyprland),
            "other" => Ok(Self::Other),
            _ => Err(format!(
                "Unknown desktop: {}. Use: gnome, kde, cosmic, qtile, wlroots, hyprland, other",
                s
            )),
        }
    }
}

impl std::fmt::Display for WindowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Gnome => "GNOME",
            Self::Kde => "KDE",
            Self::Cosmic => "COSMIC",
            Self::Qtile => "Qtile",
            Self::Wlroots => "wlroots",
            Self::Hyprland => "Hyprland",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Read-only description of the running session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesktopSession {
    /// Running under a session-brokered (Wayland) compositor
    pub wayland: bool,
    /// Detected family, `None` when nothing could be identified
    pub window_manager: Option<WindowManager>,
}

impl DesktopSession {
    pub fn new(wayland: bool, window_manager: Option<WindowManager>) -> Self {
        Self {
            wayland,
            window_manager,
        }
    }

    /// A native X11 session
    pub fn x11() -> Self {
        Self::new(false, None)
    }

    /// A Wayland session with a known family
    pub fn wayland(window_manager: WindowManager) -> Self {
        Self::new(true, Some(window_manager))
    }

    /// Classify the current process environment
    pub fn detect() -> Self {
        Self::detect_with(|key| std::env::var(key).ok())
    }

    /// Classify using an arbitrary variable lookup
    pub fn detect_with(var: impl Fn(&str) -> Option<String>) -> Self {
        let wayland = var("XDG_SESSION_TYPE")
            .map(|v| v == "wayland")
            .unwrap_or(false)
            || var("WAYLAND_DISPLAY").is_some();

        let window_manager = if var("HYPRLAND_INSTANCE_SIGNATURE").is_some() {
            Some(WindowManager::Hyprland)
        } else if var("SWAYSOCK").is_some() {
            Some(WindowManager::Wlroots)
        } else {
            var("XDG_CURRENT_DESKTOP")
                .as_deref()
                .and_then(WindowManager::from_desktop_name)
        };

        Self {
            wayland,
            window_manager,
        }
    }

    /// Whether this session runs Hyprland under Wayland
    pub fn is_hyprland(&self) -> bool {
        self.wayland && self.window_manager == Some(WindowManager::Hyprland)
    }
}
