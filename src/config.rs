use crate::export::ExportFormat;
use crate::pipeline::{Endpoint, RemoteFormat};
use crate::storage::default_storage_path;
use crate::style::StyleDetection;
use crate::theme::ThemeMode;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "plantuml-live";

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Quiet period after the last edit before re-rendering.
    pub debounce_ms: u64,
    /// Where the latest ready image is written, if anywhere.
    pub preview_path: Option<PathBuf>,
    pub theme: ThemeMode,
    pub zoom: f32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            preview_path: None,
            theme: ThemeMode::Light,
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub app_name: String,
    pub download_dir: PathBuf,
    pub format: ExportFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            format: ExportFormat::Raw,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpConfig {
    /// Global request timeout; `None` leaves it to the platform.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Endpoint,
    pub style_detection: StyleDetection,
    pub preview: PreviewConfig,
    pub export: ExportConfig,
    pub http: HttpConfig,
    pub storage_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            style_detection: StyleDetection::default(),
            preview: PreviewConfig::default(),
            export: ExportConfig::default(),
            http: HttpConfig::default(),
            storage_path: default_storage_path(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    server: Option<String>,
    format: Option<RemoteFormat>,
    style_detection: Option<StyleDetection>,
    debounce_ms: Option<u64>,
    timeout_secs: Option<u64>,
    app_name: Option<String>,
    download_dir: Option<PathBuf>,
    export_format: Option<ExportFormat>,
    preview_path: Option<PathBuf>,
    storage_path: Option<PathBuf>,
    theme: Option<ThemeMode>,
    zoom: Option<f32>,
}

fn parse_config_file(contents: &str) -> anyhow::Result<ConfigFile> {
    match serde_json::from_str(contents) {
        Ok(parsed) => Ok(parsed),
        // JSON5 accepts comments and trailing commas.
        Err(json_err) => json5::from_str(contents).map_err(|_| json_err.into()),
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let parsed = parse_config_file(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    if let Some(server) = parsed.server {
        let server = server.trim().trim_end_matches('/').to_string();
        if server.is_empty() {
            anyhow::bail!("Config field `server` must not be empty");
        }
        config.endpoint.server = server;
    }
    if let Some(format) = parsed.format {
        config.endpoint.format = format;
    }
    if let Some(detection) = parsed.style_detection {
        config.style_detection = detection;
    }
    if let Some(v) = parsed.debounce_ms {
        config.preview.debounce_ms = v;
    }
    if let Some(v) = parsed.timeout_secs {
        config.http.timeout_secs = (v > 0).then_some(v);
    }
    if let Some(v) = parsed.app_name {
        config.export.app_name = v;
    }
    if let Some(v) = parsed.download_dir {
        config.export.download_dir = v;
    }
    if let Some(v) = parsed.export_format {
        config.export.format = v;
    }
    if let Some(v) = parsed.preview_path {
        config.preview.preview_path = Some(v);
    }
    if let Some(v) = parsed.storage_path {
        config.storage_path = v;
    }
    if let Some(v) = parsed.theme {
        config.preview.theme = v;
    }
    if let Some(v) = parsed.zoom {
        config.preview.zoom = v;
    }

    tracing::debug!(path = %path.display(), server = %config.endpoint.server, "loaded config");
    Ok(config)
}
