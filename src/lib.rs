pub mod buffer;
pub mod config;
pub mod encoder;
pub mod export;
pub mod pipeline;
pub mod shortcuts;
pub mod storage;
pub mod style;
pub mod template;
pub mod theme;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod clipboard;
#[cfg(feature = "cli")]
pub mod http;
#[cfg(feature = "cli")]
pub mod shell;
#[cfg(feature = "cli")]
pub mod watcher;

pub use buffer::SourceBuffer;
pub use config::{Config, load_config};
pub use encoder::{PlantUmlEncoder, TextEncoder, decode, encode};
pub use pipeline::{Endpoint, FetchError, ImageFetcher, RemoteFormat, RenderPipeline, RenderState};
pub use style::{StyleDetection, effective_source};

#[cfg(feature = "cli")]
pub use cli::run;
