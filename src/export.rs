use crate::config::ExportConfig;
use crate::pipeline::RemoteFormat;
use crate::theme::{Theme, Zoom};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Bytes exactly as the server sent them.
    #[default]
    Raw,
    /// Rasterized locally at the current zoom on the theme background.
    Png,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write to stdout: {0}")]
    Stdout(std::io::Error),
    #[error("image is not valid SVG: {0}")]
    Svg(String),
    #[error("failed to rasterize diagram: {0}")]
    Raster(String),
    #[error("PNG export needs the `png` feature")]
    PngUnsupported,
}

pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `<app>-diagram-<timestamp>.<ext>`
pub fn download_file_name(app_name: &str, timestamp_ms: i64, extension: &str) -> String {
    format!("{app_name}-diagram-{timestamp_ms}.{extension}")
}

pub fn write_output(bytes: &[u8], output: Option<&Path>) -> Result<(), ExportError> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|source| ExportError::Write {
                        path: path.to_path_buf(),
                        source,
                    })?;
                }
            }
            std::fs::write(path, bytes).map_err(|source| ExportError::Write {
                path: path.to_path_buf(),
                source,
            })
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(bytes)
                .and_then(|_| stdout.flush())
                .map_err(ExportError::Stdout)
        }
    }
}

/// Image bytes in the requested export format. A PNG fetched from the
/// server is passed through untouched.
pub fn encode_for_export(
    image: &[u8],
    remote: RemoteFormat,
    format: ExportFormat,
    theme: &Theme,
    zoom: Zoom,
) -> Result<(Vec<u8>, &'static str), ExportError> {
    match (format, remote) {
        (ExportFormat::Raw, _) | (ExportFormat::Png, RemoteFormat::Png) => {
            Ok((image.to_vec(), remote.extension()))
        }
        (ExportFormat::Png, RemoteFormat::Svg) => Ok((svg_to_png(image, zoom, theme)?, "png")),
    }
}

/// Saves a downloaded image into the download directory under a generated
/// name and returns the path written.
pub fn save_download(
    image: &[u8],
    remote: RemoteFormat,
    config: &ExportConfig,
    theme: &Theme,
    zoom: Zoom,
    timestamp_ms: i64,
) -> Result<PathBuf, ExportError> {
    let (bytes, extension) = encode_for_export(image, remote, config.format, theme, zoom)?;
    let path = config
        .download_dir
        .join(download_file_name(&config.app_name, timestamp_ms, extension));
    write_output(&bytes, Some(&path))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "diagram exported");
    Ok(path)
}

#[cfg(feature = "png")]
pub fn svg_to_png(svg: &[u8], zoom: Zoom, theme: &Theme) -> Result<Vec<u8>, ExportError> {
    let mut opt = usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_data(svg, &opt).map_err(|err| ExportError::Svg(err.to_string()))?;
    let scale = zoom.level();
    let size = tree.size();
    let width = (size.width() * scale).ceil().max(1.0) as u32;
    let height = (size.height() * scale).ceil().max(1.0) as u32;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ExportError::Raster(format!("cannot allocate {width}x{height} pixmap")))?;

    if let Some((r, g, b)) = crate::theme::parse_hex_color(&theme.background) {
        pixmap.fill(resvg::tiny_skia::Color::from_rgba8(r, g, b, 255));
    }
    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap_mut,
    );
    pixmap
        .encode_png()
        .map_err(|err| ExportError::Raster(err.to_string()))
}

#[cfg(not(feature = "png"))]
pub fn svg_to_png(_svg: &[u8], _zoom: Zoom, _theme: &Theme) -> Result<Vec<u8>, ExportError> {
    Err(ExportError::PngUnsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20" viewBox="0 0 40 20"><rect width="10" height="10" fill="#ff0000"/></svg>"##;

    fn export_config(dir: &Path, format: ExportFormat) -> ExportConfig {
        ExportConfig {
            app_name: "plantuml-live".to_string(),
            download_dir: dir.to_path_buf(),
            format,
        }
    }

    #[test]
    fn download_name_pattern() {
        assert_eq!(
            download_file_name("plantuml-live", 1_700_000_000_123, "svg"),
            "plantuml-live-diagram-1700000000123.svg"
        );
    }

    #[test]
    fn raw_export_keeps_server_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let config = export_config(dir.path(), ExportFormat::Raw);
        let path = save_download(
            SQUARE.as_bytes(),
            RemoteFormat::Svg,
            &config,
            &Theme::light(),
            Zoom::default(),
            42,
        )
        .unwrap();
        assert_eq!(path, dir.path().join("plantuml-live-diagram-42.svg"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SQUARE);
    }

    #[test]
    fn png_from_server_is_passed_through() {
        let fake_png = b"\x89PNG\r\n\x1a\nnot really".to_vec();
        let (bytes, ext) = encode_for_export(
            &fake_png,
            RemoteFormat::Png,
            ExportFormat::Png,
            &Theme::dark(),
            Zoom::new(2.0),
        )
        .unwrap();
        assert_eq!(bytes, fake_png);
        assert_eq!(ext, "png");
    }

    #[cfg(feature = "png")]
    #[test]
    fn rasterizes_svg_at_zoom() {
        let png = svg_to_png(SQUARE.as_bytes(), Zoom::new(2.0), &Theme::dark()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        // IHDR width/height live at bytes 16..24.
        let width = u32::from_be_bytes(png[16..20].try_into().unwrap());
        let height = u32::from_be_bytes(png[20..24].try_into().unwrap());
        assert_eq!((width, height), (80, 40));
    }

    #[cfg(feature = "png")]
    #[test]
    fn garbage_is_not_svg() {
        let err = svg_to_png(b"Failed", Zoom::default(), &Theme::light()).unwrap_err();
        assert!(matches!(err, ExportError::Svg(_)));
    }
}
