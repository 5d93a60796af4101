use crate::config::{Config, load_config};
use crate::encoder::decode;
use crate::export::{ExportFormat, encode_for_export, write_output};
use crate::http::HttpFetcher;
use crate::pipeline::{INVALID_SYNTAX_MESSAGE, RemoteFormat, RenderPipeline, RenderState};
use crate::shell::{self, ShellOptions};
use crate::style::{STYLES, StyleDetection, select_style};
use crate::template::{TEMPLATES, select_template};
use crate::theme::{Theme, ThemeMode, Zoom};
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pumlive",
    version,
    about = "Live PlantUML preview, rendered by a PlantUML server"
)]
pub struct Args {
    /// Config JSON file
    #[arg(short = 'c', long = "configFile", global = true)]
    pub config: Option<PathBuf>,

    /// PlantUML server base URL (e.g. https://www.plantuml.com/plantuml)
    #[arg(long = "server", global = true)]
    pub server: Option<String>,

    /// Image format requested from the server
    #[arg(short = 'f', long = "format", value_enum, global = true)]
    pub format: Option<RemoteFormat>,

    /// How to detect style directives already present in the source
    #[arg(long = "styleDetection", value_enum, global = true)]
    pub style_detection: Option<StyleDetection>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render diagrams once and write the images
    Render(RenderArgs),
    /// Print the render URL without contacting the server
    Url(SourceArgs),
    /// Edit a file in any editor and keep the preview live
    Watch(WatchArgs),
    /// List the available styles
    Styles,
    /// List the available templates
    Templates,
    /// Print the source of a template
    Template {
        id: String,
        /// Write to a file instead of stdout
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Turn an encoded diagram or a render URL back into source text
    Decode { encoded: String },
}

#[derive(clap::Args, Debug)]
pub struct SourceArgs {
    /// Input file (.puml, .md) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Style to apply (see `pumlive styles`)
    #[arg(short = 's', long = "style", default_value = "default")]
    pub style: String,
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output file. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum)]
    pub output_format: Option<ExportFormat>,

    /// Zoom factor for PNG output
    #[arg(short = 'z', long = "zoom")]
    pub zoom: Option<f32>,

    /// Background theme for PNG output
    #[arg(long = "theme", value_enum)]
    pub theme: Option<ThemeMode>,
}

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Diagram file to edit; defaults to a scratch file
    pub file: Option<PathBuf>,

    /// Style to start with
    #[arg(short = 's', long = "style")]
    pub style: Option<String>,

    /// Replace the file contents with a template first (discards the file's text)
    #[arg(short = 't', long = "template")]
    pub template: Option<String>,

    /// Keep the latest image at this path (.png is rasterized)
    #[arg(short = 'p', long = "preview")]
    pub preview: Option<PathBuf>,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(server) = args.server {
        config.endpoint.server = server.trim_end_matches('/').to_string();
    }
    if let Some(format) = args.format {
        config.endpoint.format = format;
    }
    if let Some(detection) = args.style_detection {
        config.style_detection = detection;
    }

    match args.command {
        Command::Render(render) => run_render(config, render),
        Command::Url(source) => run_url(&config, &source),
        Command::Watch(watch) => {
            if let Some(preview) = watch.preview {
                config.preview.preview_path = Some(preview);
            }
            shell::run(
                &config,
                ShellOptions {
                    source_path: watch.file,
                    template: watch.template,
                    style: watch.style,
                },
            )
        }
        Command::Styles => {
            for entry in STYLES {
                println!("{:<12} {}", entry.id, entry.label);
            }
            Ok(())
        }
        Command::Templates => {
            for entry in TEMPLATES {
                println!("{:<14} {}", entry.id, entry.label);
            }
            Ok(())
        }
        Command::Template { id, output } => {
            let code = select_template(&id)
                .ok_or_else(|| anyhow::anyhow!("Unknown template `{id}`"))?;
            write_output(format!("{code}\n").as_bytes(), output.as_deref())?;
            Ok(())
        }
        Command::Decode { encoded } => {
            let payload = encoded.rsplit('/').next().unwrap_or(&encoded);
            println!("{}", decode(payload)?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn run_render(mut config: Config, args: RenderArgs) -> Result<()> {
    if let Some(format) = args.output_format {
        config.export.format = format;
    }
    if let Some(theme) = args.theme {
        config.preview.theme = theme;
    }
    if let Some(zoom) = args.zoom {
        config.preview.zoom = zoom;
    }
    let theme = Theme::for_mode(config.preview.theme);
    let zoom = Zoom::new(config.preview.zoom);
    let style = select_style(&args.source.style);

    let diagrams = load_diagrams(args.source.input.as_deref())?;
    let outputs = if diagrams.len() == 1 {
        if config.export.format == ExportFormat::Png {
            ensure_output(&args.output, "png")?;
        }
        vec![args.output.clone()]
    } else {
        let extension = match config.export.format {
            ExportFormat::Png => "png",
            ExportFormat::Raw => config.endpoint.format.extension(),
        };
        resolve_multi_outputs(args.output.as_deref(), extension, diagrams.len())?
            .into_iter()
            .map(Some)
            .collect()
    };

    let fetcher = HttpFetcher::new(&config.http);
    let mut pipeline = RenderPipeline::new(config.endpoint.clone(), config.style_detection);
    for (idx, (diagram, output)) in diagrams.iter().zip(outputs).enumerate() {
        let Some(image) = pipeline.render_blocking(diagram, style, &fetcher) else {
            return Err(render_failure(pipeline.state(), idx, diagrams.len()));
        };
        let (bytes, _) = encode_for_export(
            &image,
            config.endpoint.format,
            config.export.format,
            &theme,
            zoom,
        )?;
        write_output(&bytes, output.as_deref())?;
        if let Some(path) = &output {
            tracing::info!(path = %path.display(), "wrote diagram");
        }
    }
    Ok(())
}

fn render_failure(state: &RenderState, idx: usize, total: usize) -> anyhow::Error {
    let reason = match state {
        RenderState::Error { message } => message.clone(),
        _ => "Diagram source is empty".to_string(),
    };
    if total > 1 {
        anyhow::anyhow!("Diagram {}: {}", idx + 1, reason)
    } else {
        anyhow::anyhow!(reason)
    }
}

fn run_url(config: &Config, args: &SourceArgs) -> Result<()> {
    let style = select_style(&args.style);
    let pipeline = RenderPipeline::new(config.endpoint.clone(), config.style_detection);
    for diagram in load_diagrams(args.input.as_deref())? {
        match pipeline.request_url(&diagram, style) {
            Ok(Some(url)) => println!("{url}"),
            Ok(None) => anyhow::bail!("Diagram source is empty"),
            Err(err) => {
                tracing::debug!(error = %err, "encoding failed");
                anyhow::bail!(INVALID_SYNTAX_MESSAGE);
            }
        }
    }
    Ok(())
}

fn load_diagrams(path: Option<&Path>) -> Result<Vec<String>> {
    let (input, is_markdown) = read_input(path)?;
    let diagrams = if is_markdown {
        extract_plantuml_blocks(&input)
    } else {
        vec![input]
    };
    if diagrams.is_empty() {
        return Err(anyhow::anyhow!("No PlantUML diagrams found in input"));
    }
    Ok(diagrams)
}

fn read_input(path: Option<&Path>) -> Result<(String, bool)> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok((buf, false));
        }
        let content = std::fs::read_to_string(path)?;
        let is_md = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| matches!(ext, "md" | "markdown"))
            .unwrap_or(false);
        return Ok((content, is_md));
    }

    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok((buf, false))
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

/// Fenced `plantuml`/`puml`/`uml` blocks plus bare `@startuml`..`@enduml`
/// blocks outside any fence. A fenced block without its own `@startuml`
/// line gets one wrapped around it.
fn extract_plantuml_blocks(input: &str) -> Vec<String> {
    enum Block {
        None,
        Fenced(String),
        Foreign(String),
        Bare,
    }

    let mut blocks = Vec::new();
    let mut block = Block::None;
    let mut current: Vec<&str> = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim();
        match &block {
            Block::None => {
                if let Some(fence) = detect_plantuml_fence(trimmed) {
                    block = Block::Fenced(fence);
                } else if let Some(fence) = detect_any_fence(trimmed) {
                    block = Block::Foreign(fence);
                } else if starts_with_ignore_case(trimmed, "@startuml") {
                    block = Block::Bare;
                    current.push(line);
                }
            }
            Block::Fenced(fence) => {
                if is_fence_end(trimmed, fence) {
                    blocks.push(wrap_diagram(current.join("\n")));
                    current.clear();
                    block = Block::None;
                } else {
                    current.push(line);
                }
            }
            Block::Foreign(fence) => {
                if is_fence_end(trimmed, fence) {
                    block = Block::None;
                }
            }
            Block::Bare => {
                current.push(line);
                if starts_with_ignore_case(trimmed, "@enduml") {
                    blocks.push(current.join("\n"));
                    current.clear();
                    block = Block::None;
                }
            }
        }
    }

    blocks
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn detect_any_fence(line: &str) -> Option<String> {
    ["```", "~~~"]
        .into_iter()
        .find(|fence| line.starts_with(fence))
        .map(str::to_string)
}

fn wrap_diagram(body: String) -> String {
    if body.to_ascii_lowercase().contains("@startuml") {
        body
    } else {
        format!("@startuml\n{body}\n@enduml")
    }
}

fn detect_plantuml_fence(line: &str) -> Option<String> {
    for fence in ["```", "~~~"] {
        if let Some(rest) = line.strip_prefix(fence) {
            let tag = rest.trim_start_matches(fence.chars().next()?).trim();
            let tag = tag.split_whitespace().next().unwrap_or("");
            if matches!(tag, "plantuml" | "puml" | "uml") {
                return Some(fence.to_string());
            }
        }
    }
    None
}

fn is_fence_end(line: &str, fence: &str) -> bool {
    if !line.starts_with(fence) {
        return false;
    }
    line[fence.len()..].trim().is_empty()
}

fn resolve_multi_outputs(output: Option<&Path>, ext: &str, count: usize) -> Result<Vec<PathBuf>> {
    let base = output.ok_or_else(|| anyhow::anyhow!("Output path required for markdown input"))?;
    if base.is_dir() {
        let mut outputs = Vec::new();
        for idx in 0..count {
            outputs.push(base.join(format!("diagram-{}.{}", idx + 1, ext)));
        }
        return Ok(outputs);
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("diagram");
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    let mut outputs = Vec::new();
    for idx in 0..count {
        outputs.push(parent.join(format!("{}-{}.{}", stem, idx + 1, ext)));
    }
    Ok(outputs)
}
