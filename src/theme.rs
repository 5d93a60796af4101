use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub mode: ThemeMode,
    pub background: String,
    pub muted_color: String,
    pub primary_color: String,
    pub error_color: String,
}

impl Theme {
    pub fn light() -> Self {
        Self {
            mode: ThemeMode::Light,
            background: "#FFFFFF".to_string(),
            muted_color: "#7A8AA6".to_string(),
            primary_color: "#6366F1".to_string(),
            error_color: "#DC2626".to_string(),
        }
    }

    pub fn dark() -> Self {
        Self {
            mode: ThemeMode::Dark,
            background: "#1E1E1E".to_string(),
            muted_color: "#9CA3AF".to_string(),
            primary_color: "#818CF8".to_string(),
            error_color: "#F87171".to_string(),
        }
    }

    pub fn for_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Light => Self::light(),
            ThemeMode::Dark => Self::dark(),
        }
    }

    pub fn toggled(&self) -> Self {
        Self::for_mode(self.mode.toggled())
    }
}

/// Parses `#RRGGBB` (or `RRGGBB`) into its components.
pub fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

pub const ZOOM_MIN: f32 = 0.25;
pub const ZOOM_MAX: f32 = 4.0;
pub const ZOOM_STEP: f32 = 0.25;

/// Preview zoom factor, applied when rasterizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom(f32);

impl Default for Zoom {
    fn default() -> Self {
        Zoom(1.0)
    }
}

impl Zoom {
    pub fn new(level: f32) -> Self {
        if level.is_finite() {
            Zoom(level.clamp(ZOOM_MIN, ZOOM_MAX))
        } else {
            Zoom::default()
        }
    }

    pub fn level(self) -> f32 {
        self.0
    }

    pub fn zoom_in(self) -> Self {
        Zoom::new(self.0 + ZOOM_STEP)
    }

    pub fn zoom_out(self) -> Self {
        Zoom::new(self.0 - ZOOM_STEP)
    }

    pub fn percent(self) -> u32 {
        (self.0 * 100.0).round() as u32
    }
}
