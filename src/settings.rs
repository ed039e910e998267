//! Host-provided settings and the device gate.
//!
//! The playground only reads these. Settings are handed to the controller at
//! mount time; nothing here is looked up globally.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Editor/preview split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Horizontal,
    Vertical,
}

impl LayoutMode {
    pub fn toggled(self) -> Self {
        match self {
            LayoutMode::Horizontal => LayoutMode::Vertical,
            LayoutMode::Vertical => LayoutMode::Horizontal,
        }
    }
}

/// Simulated device width for the preview surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    #[default]
    Desktop,
    Tablet,
    Mobile,
}

impl PreviewMode {
    /// CSS width of the preview surface.
    pub fn surface_width(self) -> &'static str {
        match self {
            PreviewMode::Desktop => "100%",
            PreviewMode::Tablet => "768px",
            PreviewMode::Mobile => "375px",
        }
    }
}

/// The portfolio's persisted settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub animations: bool,
    pub glow_effects: bool,
    pub blur_effects: bool,
    pub font_size: String,
    pub border_radius: String,
    pub compact_mode: bool,
    pub mouse_effects: bool,
    pub cursor_style: String,
    pub cursor_trail: bool,
    pub cursor_size: String,
    pub cursor_color: String,
    pub particle_effects: bool,
    /// Preferred playground split, if the host stores one.
    pub playground_layout: Option<LayoutMode>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            animations: true,
            glow_effects: true,
            blur_effects: true,
            font_size: "medium".into(),
            border_radius: "medium".into(),
            compact_mode: false,
            mouse_effects: true,
            cursor_style: "modern".into(),
            cursor_trail: true,
            cursor_size: "medium".into(),
            cursor_color: "#64ffda".into(),
            particle_effects: true,
            playground_layout: None,
        }
    }
}

impl Settings {
    /// Parse a stored settings value, falling back to defaults.
    ///
    /// The sentinels `undefined` and `default` count as "nothing stored".
    pub fn from_json_lenient(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "undefined" || trimmed == "default" {
            return Self::default();
        }
        match serde_json::from_str(trimmed) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn layout_preference(&self) -> Option<LayoutMode> {
        self.playground_layout
    }
}

static MOBILE_USER_AGENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)android|webos|iphone|ipad|ipod|blackberry|iemobile|opera mini")
        .expect("Invalid mobile user agent regex")
});

/// Viewports this narrow or narrower get the desktop-only notice.
pub const MAX_MOBILE_WIDTH: u32 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

/// Coarse capability check evaluated once before mounting.
#[derive(Debug, Clone, Default)]
pub struct DeviceGate {
    pub user_agent: Option<String>,
    pub viewport_width: Option<u32>,
}

impl DeviceGate {
    pub fn classify(&self) -> DeviceClass {
        let mobile_agent = self
            .user_agent
            .as_deref()
            .is_some_and(|ua| MOBILE_USER_AGENT.is_match(ua));
        let small_screen = self
            .viewport_width
            .is_some_and(|width| width <= MAX_MOBILE_WIDTH);

        if mobile_agent || small_screen {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }
}

pub const DESKTOP_ONLY_NOTICE: &str = "Desktop Only\n\n\
    The Code Playground requires a desktop environment for the best experience.\n\
    Please open this page from a PC or laptop to access the full coding interface.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_settings() {
        assert_eq!(Settings::from_json_lenient("undefined"), Settings::default());
        assert_eq!(Settings::from_json_lenient("{not json"), Settings::default());

        let settings =
            Settings::from_json_lenient(r#"{"compactMode":true,"playgroundLayout":"vertical"}"#);
        assert!(settings.compact_mode);
        assert!(settings.animations);
        assert_eq!(settings.layout_preference(), Some(LayoutMode::Vertical));
    }

    #[test]
    fn test_device_gate() {
        let phone = DeviceGate {
            user_agent: Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)".into()),
            viewport_width: Some(1200),
        };
        assert_eq!(phone.classify(), DeviceClass::Mobile);

        let narrow = DeviceGate {
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".into()),
            viewport_width: Some(768),
        };
        assert_eq!(narrow.classify(), DeviceClass::Mobile);

        assert_eq!(DeviceGate::default().classify(), DeviceClass::Desktop);
    }

    #[test]
    fn test_preview_widths() {
        assert_eq!(PreviewMode::Desktop.surface_width(), "100%");
        assert_eq!(PreviewMode::Tablet.surface_width(), "768px");
        assert_eq!(PreviewMode::Mobile.surface_width(), "375px");
        assert_eq!(LayoutMode::Horizontal.toggled(), LayoutMode::Vertical);
    }
}
