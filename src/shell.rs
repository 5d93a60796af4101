//! Live preview shell.
//!
//! One thread owns the buffer, pipeline and view state and drains a channel
//! of [`ShellEvent`]s. File-watch notifications, key presses and finished
//! preloads all arrive through that channel, so no state is shared between
//! threads.

use crate::buffer::SourceBuffer;
use crate::clipboard::{ClipboardSink, SystemClipboard};
use crate::config::{Config, ExportConfig, PreviewConfig};
use crate::export::{ExportFormat, encode_for_export, save_download, timestamp_millis, write_output};
use crate::http::HttpFetcher;
use crate::pipeline::{FetchError, ImageFetcher, RenderPipeline, RenderState};
use crate::shortcuts::{Chord, Key, ShellCommand, dispatch, help_line};
use crate::storage::{FileStore, KeyValueStore};
use crate::style::{next_style, style_id_for};
use crate::theme::{Theme, Zoom, parse_hex_color};
use crate::watcher::SourceWatcher;
use anyhow::{Context, Result};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::time::{Duration, Instant};

const NOTICE_TTL: Duration = Duration::from_secs(2);
const IDLE_TICK: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum ShellEvent {
    SourceTouched,
    Key(Chord),
    Rendered {
        generation: u64,
        outcome: Result<Vec<u8>, FetchError>,
    },
    /// Image bytes fetched again from a ready URL for an export.
    Downloaded {
        url: String,
        outcome: Result<Vec<u8>, FetchError>,
    },
    InputClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Muted,
    Good,
    Bad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub tone: Tone,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// File to edit; a scratch file next to the storage file when absent.
    pub source_path: Option<PathBuf>,
    pub template: Option<String>,
    pub style: Option<String>,
}

pub struct Controller<S, C> {
    buffer: SourceBuffer<S>,
    pipeline: RenderPipeline,
    fetcher: Arc<dyn ImageFetcher>,
    clipboard: C,
    preview: PreviewConfig,
    export: ExportConfig,
    theme: Theme,
    zoom: Zoom,
    style_id: &'static str,
    source_path: PathBuf,
    image: Option<Vec<u8>>,
    notice: Option<(String, Instant)>,
    events: Sender<ShellEvent>,
}

impl<S: KeyValueStore, C: ClipboardSink> Controller<S, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        buffer: SourceBuffer<S>,
        pipeline: RenderPipeline,
        fetcher: Arc<dyn ImageFetcher>,
        clipboard: C,
        preview: PreviewConfig,
        export: ExportConfig,
        source_path: PathBuf,
        events: Sender<ShellEvent>,
    ) -> Self {
        let style_id = style_id_for(buffer.style()).unwrap_or("custom");
        Self {
            theme: Theme::for_mode(preview.theme),
            zoom: Zoom::new(preview.zoom),
            buffer,
            pipeline,
            fetcher,
            clipboard,
            preview,
            export,
            style_id,
            source_path,
            image: None,
            notice: None,
            events,
        }
    }

    pub fn buffer(&self) -> &SourceBuffer<S> {
        &self.buffer
    }

    pub fn state(&self) -> &RenderState {
        self.pipeline.state()
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn clipboard(&self) -> &C {
        &self.clipboard
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Re-renders the current buffer. The preload runs on its own thread and
    /// reports back as [`ShellEvent::Rendered`].
    pub fn refresh(&mut self) {
        self.image = None;
        let Some(request) = self.pipeline.submit(self.buffer.source(), self.buffer.style()) else {
            return;
        };
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events.clone();
        std::thread::spawn(move || {
            let outcome = fetcher.fetch(&request.url);
            let _ = events.send(ShellEvent::Rendered {
                generation: request.generation,
                outcome,
            });
        });
    }

    /// Writes the buffer out to the edited file.
    pub fn write_source_file(&self) -> Result<()> {
        if let Some(parent) = self.source_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        std::fs::write(&self.source_path, self.buffer.source())
            .with_context(|| format!("Failed to write {}", self.source_path.display()))
    }

    /// Re-reads the edited file and re-renders if the text changed.
    pub fn reload_source(&mut self) {
        let text = match std::fs::read_to_string(&self.source_path) {
            Ok(text) => text,
            // Mid atomic save the file can briefly be missing.
            Err(err) => {
                tracing::debug!(error = %err, "diagram file not readable yet");
                return;
            }
        };
        let changed = persisted(self.buffer.set_source(&text));
        if changed {
            self.refresh();
        }
    }

    /// Replaces the source with a template and overwrites the edited file.
    pub fn apply_template(&mut self, id: &str) -> Result<()> {
        if crate::template::select_template(id).is_none() {
            anyhow::bail!("Unknown template `{id}`");
        }
        if persisted(self.buffer.apply_template(id)) {
            self.write_source_file()?;
            self.refresh();
        }
        Ok(())
    }

    pub fn select_style(&mut self, id: &str) {
        self.style_id = style_id_for(crate::style::select_style(id)).unwrap_or("default");
        if persisted(self.buffer.select_style(id)) {
            self.refresh();
        }
    }

    pub fn handle(&mut self, event: ShellEvent) -> Flow {
        match event {
            ShellEvent::SourceTouched => self.reload_source(),
            ShellEvent::Key(chord) => {
                if let Some(command) = dispatch(chord) {
                    return self.execute(command);
                }
            }
            ShellEvent::Rendered {
                generation,
                outcome,
            } => self.on_rendered(generation, outcome),
            ShellEvent::Downloaded { url, outcome } => self.on_downloaded(&url, outcome),
            ShellEvent::InputClosed => return Flow::Quit,
        }
        Flow::Continue
    }

    pub fn execute(&mut self, command: ShellCommand) -> Flow {
        match command {
            ShellCommand::Export => self.export(),
            ShellCommand::CopySource => self.copy_source(),
            ShellCommand::ZoomIn => self.set_zoom(self.zoom.zoom_in()),
            ShellCommand::ZoomOut => self.set_zoom(self.zoom.zoom_out()),
            ShellCommand::ZoomReset => self.set_zoom(Zoom::default()),
            ShellCommand::ToggleTheme => {
                self.theme = self.theme.toggled();
                self.write_preview();
            }
            ShellCommand::NextStyle => {
                let next = next_style(self.style_id);
                self.select_style(next);
                self.notify(format!("Style: {next}"));
            }
            ShellCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    pub fn status(&self) -> Status {
        if let Some((text, at)) = &self.notice {
            if at.elapsed() < NOTICE_TTL {
                return Status {
                    tone: Tone::Good,
                    text: text.clone(),
                };
            }
        }
        let tone = match self.pipeline.state() {
            RenderState::Ready { .. } => Tone::Good,
            RenderState::Error { .. } => Tone::Bad,
            RenderState::Idle | RenderState::Loading => Tone::Muted,
        };
        Status {
            tone,
            text: format!(
                "[{}] [{}%] [{:?}] {}",
                self.style_id,
                self.zoom.percent(),
                self.theme.mode,
                self.pipeline.state()
            ),
        }
    }

    fn on_rendered(&mut self, generation: u64, outcome: Result<Vec<u8>, FetchError>) {
        if !self.pipeline.resolve(generation, &outcome) {
            return;
        }
        if let Ok(image) = outcome {
            self.image = Some(image);
            self.write_preview();
        }
    }

    fn set_zoom(&mut self, zoom: Zoom) {
        self.zoom = zoom;
        self.notify(format!("Zoom {}%", zoom.percent()));
        self.write_preview();
    }

    fn export(&mut self) {
        let Some(url) = self.pipeline.state().ready_url().map(str::to_string) else {
            self.notify("Nothing to export yet");
            return;
        };
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events.clone();
        std::thread::spawn(move || {
            let outcome = fetcher.fetch(&url);
            let _ = events.send(ShellEvent::Downloaded { url, outcome });
        });
    }

    fn on_downloaded(&mut self, url: &str, outcome: Result<Vec<u8>, FetchError>) {
        let image = match outcome {
            Ok(image) => image,
            Err(err) => {
                tracing::error!(error = %err, "export download failed");
                self.notify(format!("Export failed: {err}"));
                return;
            }
        };
        let result = save_download(
            &image,
            self.pipeline.endpoint().format,
            &self.export,
            &self.theme,
            self.zoom,
            timestamp_millis(),
        );
        match result {
            Ok(path) if self.pipeline.state().ready_url() == Some(url) => {
                self.notify(format!("Saved {}", path.display()))
            }
            // The source changed while the download was in flight.
            Ok(path) => {
                tracing::info!(path = %path.display(), url, "exported an earlier revision");
                self.notify(format!("Saved {} (earlier revision)", path.display()))
            }
            Err(err) => {
                tracing::error!(error = %err, "export failed");
                self.notify(format!("Export failed: {err}"));
            }
        }
    }

    fn copy_source(&mut self) {
        match self.clipboard.set_text(self.buffer.source()) {
            Ok(()) => self.notify("Copied"),
            Err(err) => {
                tracing::warn!(error = %err, "copy failed");
                self.notify(format!("Copy failed: {err}"));
            }
        }
    }

    fn write_preview(&self) {
        let (Some(path), Some(image)) = (&self.preview.preview_path, &self.image) else {
            return;
        };
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("png") => ExportFormat::Png,
            _ => ExportFormat::Raw,
        };
        let written = encode_for_export(
            image,
            self.pipeline.endpoint().format,
            format,
            &self.theme,
            self.zoom,
        )
        .and_then(|(bytes, _)| write_output(&bytes, Some(path)));
        if let Err(err) = written {
            tracing::warn!(error = %err, "failed to update preview file");
        }
    }

    fn notify(&mut self, text: impl Into<String>) {
        self.notice = Some((text.into(), Instant::now()));
    }
}

/// `Ok(changed)` passes through; a failed write is logged and counts as a
/// change because the in-memory value was already updated.
fn persisted(result: std::result::Result<bool, crate::storage::StorageError>) -> bool {
    match result {
        Ok(changed) => changed,
        Err(err) => {
            tracing::warn!(error = %err, "failed to persist editor state");
            true
        }
    }
}

/// Runs the event loop until a quit command or until input closes.
/// `SourceTouched` events are debounced: the file is re-read once edits have
/// been quiet for `debounce`.
pub fn event_loop<S, C, F>(
    controller: &mut Controller<S, C>,
    events: &Receiver<ShellEvent>,
    debounce: Duration,
    mut draw: F,
) -> Result<()>
where
    S: KeyValueStore,
    C: ClipboardSink,
    F: FnMut(&Controller<S, C>) -> Result<()>,
{
    let mut deadline: Option<Instant> = None;
    draw(controller)?;
    loop {
        let timeout = deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_TICK);
        match events.recv_timeout(timeout) {
            Ok(ShellEvent::SourceTouched) => deadline = Some(Instant::now() + debounce),
            Ok(event) => {
                if controller.handle(event) == Flow::Quit {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if deadline.is_some_and(|at| at <= Instant::now()) {
            deadline = None;
            controller.reload_source();
        }
        draw(controller)?;
    }
    Ok(())
}

fn chord_from_key(key: crossterm::event::KeyEvent) -> Chord {
    use crossterm::event::{KeyCode, KeyModifiers};
    let code = match key.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Esc => Key::Esc,
        _ => Key::Other,
    };
    Chord::new(
        code,
        key.modifiers.contains(KeyModifiers::CONTROL),
        key.modifiers.contains(KeyModifiers::SHIFT),
        key.modifiers.contains(KeyModifiers::ALT),
    )
}

fn spawn_key_reader(events: Sender<ShellEvent>) {
    use crossterm::event::{self, Event, KeyEventKind};
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if events.send(ShellEvent::Key(chord_from_key(key))).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "terminal input failed");
                    let _ = events.send(ShellEvent::InputClosed);
                    break;
                }
            }
        }
    });
}

/// Single status line, redrawn in place when the terminal is interactive.
///
/// Must be created before the key reader starts: probing for keyboard
/// enhancement reads the terminal's reply from stdin.
struct StatusLine {
    interactive: bool,
    enhanced: bool,
    last: Option<Status>,
}

impl StatusLine {
    fn new(interactive: bool) -> Result<Self> {
        use crossterm::event::{KeyboardEnhancementFlags, PushKeyboardEnhancementFlags};

        let mut enhanced = false;
        if interactive {
            crossterm::terminal::enable_raw_mode().context("Failed to enable raw mode")?;
            // Without it Ctrl+Shift+C arrives as plain Ctrl+C.
            if crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false) {
                enhanced = crossterm::execute!(
                    std::io::stdout(),
                    PushKeyboardEnhancementFlags(
                        KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    )
                )
                .is_ok();
            }
            tracing::debug!(enhanced, "terminal keyboard mode");
        }
        Ok(Self {
            interactive,
            enhanced,
            last: None,
        })
    }

    fn draw(&mut self, status: Status, theme: &Theme) -> Result<()> {
        use crossterm::cursor::MoveToColumn;
        use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
        use crossterm::terminal::{Clear, ClearType};

        if self.last.as_ref() == Some(&status) {
            return Ok(());
        }
        let mut stderr = std::io::stderr().lock();
        if self.interactive {
            let hex = match status.tone {
                Tone::Muted => &theme.muted_color,
                Tone::Good => &theme.primary_color,
                Tone::Bad => &theme.error_color,
            };
            let color = parse_hex_color(hex)
                .map(|(r, g, b)| Color::Rgb { r, g, b })
                .unwrap_or(Color::Reset);
            crossterm::queue!(
                stderr,
                MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                SetForegroundColor(color),
                Print(&status.text),
                ResetColor
            )?;
        } else {
            writeln!(stderr, "{}", status.text)?;
        }
        stderr.flush()?;
        self.last = Some(status);
        Ok(())
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = crossterm::execute!(
                std::io::stdout(),
                crossterm::event::PopKeyboardEnhancementFlags
            );
        }
        if self.interactive {
            let _ = crossterm::terminal::disable_raw_mode();
            eprintln!();
        }
    }
}

fn scratch_path(config: &Config) -> PathBuf {
    config
        .storage_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scratch.puml")
}

/// Starts the interactive preview session.
pub fn run(config: &Config, options: ShellOptions) -> Result<()> {
    let store = FileStore::open(&config.storage_path).context("Failed to open editor storage")?;
    let mut buffer = SourceBuffer::load(store);

    let source_path = options
        .source_path
        .clone()
        .unwrap_or_else(|| scratch_path(config));
    let existing = if source_path.exists() {
        Some(
            std::fs::read_to_string(&source_path)
                .with_context(|| format!("Failed to read {}", source_path.display()))?,
        )
    } else {
        None
    };
    if let Some(text) = &existing {
        persisted(buffer.set_source(text));
    }

    let (tx, rx) = channel();
    let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpFetcher::new(&config.http));
    let pipeline = RenderPipeline::new(config.endpoint.clone(), config.style_detection);
    let mut controller = Controller::new(
        buffer,
        pipeline,
        fetcher,
        SystemClipboard::new(),
        config.preview.clone(),
        config.export.clone(),
        source_path,
        tx.clone(),
    );
    if existing.is_none() {
        controller.write_source_file()?;
    }
    if let Some(id) = options.style.as_deref() {
        controller.select_style(id);
    }
    if let Some(id) = options.template.as_deref() {
        controller.apply_template(id)?;
    }

    let watch_tx = tx.clone();
    let _watcher = SourceWatcher::new(controller.source_path(), POLL_INTERVAL, move || {
        let _ = watch_tx.send(ShellEvent::SourceTouched);
    })?;

    let interactive = std::io::stdin().is_terminal() && std::io::stderr().is_terminal();
    eprintln!("Editing {}", controller.source_path().display());
    if interactive {
        eprintln!("{}", help_line());
    }
    let mut line = StatusLine::new(interactive)?;
    if interactive {
        spawn_key_reader(tx.clone());
    }
    drop(tx);

    controller.refresh();
    event_loop(
        &mut controller,
        &rx,
        Duration::from_millis(config.preview.debounce_ms),
        |controller| line.draw(controller.status(), controller.theme()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::pipeline::{Endpoint, RENDER_FAILED_MESSAGE};
    use crate::storage::{MemoryStore, SOURCE_KEY, STYLE_KEY};
    use crate::style::{StyleDetection, select_style};
    use crate::template::select_template;
    use std::sync::Mutex;

    struct StubFetcher {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ImageFetcher for StubFetcher {
        fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.fail {
                Err(FetchError::Status(500))
            } else {
                Ok(b"<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"10\" height=\"10\"/>".to_vec())
            }
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        controller: Controller<MemoryStore, MemoryClipboard>,
        rx: Receiver<ShellEvent>,
        fetcher: Arc<StubFetcher>,
    }

    fn harness(fail: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("diagram.puml");
        let (tx, rx) = channel();
        let fetcher = Arc::new(StubFetcher {
            calls: Mutex::new(Vec::new()),
            fail,
        });
        let export = ExportConfig {
            app_name: "plantuml-live".to_string(),
            download_dir: dir.path().join("downloads"),
            format: ExportFormat::Raw,
        };
        let preview = PreviewConfig {
            preview_path: Some(dir.path().join("preview.svg")),
            ..PreviewConfig::default()
        };
        let controller = Controller::new(
            SourceBuffer::load(MemoryStore::new()),
            RenderPipeline::new(Endpoint::default(), StyleDetection::Substring),
            fetcher.clone(),
            MemoryClipboard::default(),
            preview,
            export,
            source_path,
            tx,
        );
        controller.write_source_file().unwrap();
        Harness {
            dir,
            controller,
            rx,
            fetcher,
        }
    }

    fn settle(h: &mut Harness) {
        let event = h.rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, ShellEvent::Rendered { .. }));
        h.controller.handle(event);
    }

    #[test]
    fn refresh_renders_and_writes_preview() {
        let mut h = harness(false);
        h.controller.refresh();
        assert_eq!(h.controller.state(), &RenderState::Loading);
        settle(&mut h);
        assert!(h.controller.state().ready_url().is_some());
        assert!(h.dir.path().join("preview.svg").exists());
        assert_eq!(h.controller.status().tone, Tone::Good);
    }

    #[test]
    fn failed_render_is_reported() {
        let mut h = harness(true);
        h.controller.refresh();
        settle(&mut h);
        assert_eq!(
            h.controller.state(),
            &RenderState::Error {
                message: RENDER_FAILED_MESSAGE.to_string()
            }
        );
        assert_eq!(h.controller.status().tone, Tone::Bad);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_render_stays_off_the_default_log() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
            .with_writer(move || writer.clone())
            .finish();

        let fetcher = StubFetcher {
            calls: Mutex::new(Vec::new()),
            fail: true,
        };
        let mut pipeline = RenderPipeline::new(Endpoint::default(), StyleDetection::Substring);
        tracing::subscriber::with_default(subscriber, || {
            assert!(
                pipeline
                    .render_blocking("@startuml\nA -> B\n@enduml", "", &fetcher)
                    .is_none()
            );
        });
        assert_eq!(
            pipeline.state(),
            &RenderState::Error {
                message: RENDER_FAILED_MESSAGE.to_string()
            }
        );
        assert!(log.0.lock().unwrap().is_empty());
    }

    #[test]
    fn file_edits_flow_into_buffer_and_storage() {
        let mut h = harness(false);
        let path = h.controller.source_path().to_path_buf();
        std::fs::write(&path, "@startuml\nA -> B: edited\n@enduml").unwrap();
        h.controller.handle(ShellEvent::SourceTouched);
        assert_eq!(h.controller.buffer().source(), "@startuml\nA -> B: edited\n@enduml");
        assert_eq!(
            h.controller.buffer().store().get(SOURCE_KEY).as_deref(),
            Some("@startuml\nA -> B: edited\n@enduml")
        );
        settle(&mut h);

        // Touching the file without changing it does not re-render.
        h.controller.handle(ShellEvent::SourceTouched);
        assert!(h.rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(h.fetcher.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn emptied_file_goes_idle_without_request() {
        let mut h = harness(false);
        std::fs::write(h.controller.source_path(), "   \n").unwrap();
        h.controller.handle(ShellEvent::SourceTouched);
        assert_eq!(h.controller.state(), &RenderState::Idle);
        assert!(h.fetcher.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn save_chord_exports_only_when_ready() {
        let mut h = harness(false);
        h.controller.handle(ShellEvent::Key(Chord::ctrl('s')));
        let downloads = h.dir.path().join("downloads");
        assert!(!downloads.exists());
        assert_eq!(h.controller.status().text, "Nothing to export yet");

        h.controller.refresh();
        settle(&mut h);
        h.controller.handle(ShellEvent::Key(Chord::ctrl('s')));
        let event = h.rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            event,
            ShellEvent::Downloaded { outcome: Ok(_), .. }
        ));
        h.controller.handle(event);
        assert_eq!(h.fetcher.calls.lock().unwrap().len(), 2);
        let saved: Vec<_> = std::fs::read_dir(&downloads)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].starts_with("plantuml-live-diagram-"));
        assert!(saved[0].ends_with(".svg"));
    }

    #[test]
    fn export_finishing_after_an_edit_is_flagged() {
        let mut h = harness(false);
        h.controller.refresh();
        settle(&mut h);
        h.controller.handle(ShellEvent::Key(Chord::ctrl('s')));
        let download = h.rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let ShellEvent::Downloaded { url, .. } = &download else {
            panic!("expected a download");
        };
        assert_eq!(h.controller.state().ready_url(), Some(url.as_str()));

        std::fs::write(h.controller.source_path(), "@startuml\nA -> C\n@enduml").unwrap();
        h.controller.handle(ShellEvent::SourceTouched);
        settle(&mut h);
        h.controller.handle(download);

        let status = h.controller.status().text;
        assert!(status.starts_with("Saved "), "{status}");
        assert!(status.ends_with("(earlier revision)"), "{status}");
        assert_eq!(
            std::fs::read_dir(h.dir.path().join("downloads")).unwrap().count(),
            1
        );
    }

    #[test]
    fn copy_chord_copies_source() {
        let mut h = harness(false);
        let flow = h.controller.handle(ShellEvent::Key(Chord::ctrl_shift('c')));
        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            h.controller.clipboard().contents.as_deref(),
            Some(h.controller.buffer().source())
        );
        assert_eq!(h.controller.status().text, "Copied");
    }

    #[test]
    fn terminal_key_events_reach_copy() {
        use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

        let dispatched = |code, modifiers| dispatch(chord_from_key(KeyEvent::new(code, modifiers)));

        // Legacy encoding: Ctrl+Shift+C is indistinguishable from Ctrl+C.
        assert_eq!(dispatched(KeyCode::Char('c'), KeyModifiers::CONTROL), None);
        assert_eq!(
            dispatched(KeyCode::Char('c'), KeyModifiers::ALT),
            Some(ShellCommand::CopySource)
        );
        // Disambiguated encodings report shift either way.
        assert_eq!(
            dispatched(
                KeyCode::Char('c'),
                KeyModifiers::CONTROL | KeyModifiers::SHIFT
            ),
            Some(ShellCommand::CopySource)
        );
        assert_eq!(
            dispatched(KeyCode::Char('C'), KeyModifiers::CONTROL),
            Some(ShellCommand::CopySource)
        );
        assert_eq!(
            dispatched(KeyCode::Char('s'), KeyModifiers::CONTROL),
            Some(ShellCommand::Export)
        );
        assert_eq!(
            dispatched(KeyCode::Esc, KeyModifiers::NONE),
            Some(ShellCommand::Quit)
        );

        let mut h = harness(false);
        let chord = chord_from_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::ALT));
        h.controller.handle(ShellEvent::Key(chord));
        assert_eq!(
            h.controller.clipboard().contents.as_deref(),
            Some(h.controller.buffer().source())
        );
    }

    #[test]
    fn template_overwrites_file_and_buffer() {
        let mut h = harness(false);
        h.controller.apply_template("websocket").unwrap();
        let expected = select_template("websocket").unwrap();
        assert_eq!(h.controller.buffer().source(), expected);
        assert_eq!(
            std::fs::read_to_string(h.controller.source_path()).unwrap(),
            expected
        );
        assert!(h.controller.apply_template("nope").is_err());
    }

    #[test]
    fn style_cycle_and_view_controls() {
        let mut h = harness(false);
        h.controller.execute(ShellCommand::NextStyle);
        assert_eq!(h.controller.buffer().style(), select_style("blueprint"));
        assert_eq!(
            h.controller.buffer().store().get(STYLE_KEY).as_deref(),
            Some(select_style("blueprint"))
        );
        settle(&mut h);

        h.controller.execute(ShellCommand::ZoomIn);
        assert_eq!(h.controller.zoom().percent(), 125);
        h.controller.execute(ShellCommand::ZoomReset);
        assert_eq!(h.controller.zoom(), Zoom::default());

        let before = h.controller.theme().mode;
        h.controller.execute(ShellCommand::ToggleTheme);
        assert_ne!(h.controller.theme().mode, before);

        assert_eq!(h.controller.execute(ShellCommand::Quit), Flow::Quit);
    }

    #[test]
    fn event_loop_debounces_and_quits() {
        let mut h = harness(false);
        let (tx, rx) = channel();
        std::fs::write(h.controller.source_path(), "@startuml\nX -> Y\n@enduml").unwrap();
        for _ in 0..5 {
            tx.send(ShellEvent::SourceTouched).unwrap();
        }
        tx.send(ShellEvent::Key(Chord::plain('q'))).unwrap();

        let mut draws = 0;
        event_loop(&mut h.controller, &rx, Duration::ZERO, |_| {
            draws += 1;
            Ok(())
        })
        .unwrap();
        assert!(draws >= 2);
        assert_eq!(h.controller.buffer().source(), "@startuml\nX -> Y\n@enduml");
    }
}
