//! Render pipeline: source + style → effective source → encoded URL →
//! preload → visible state.
//!
//! Preloads happen outside the pipeline. `submit` hands out a
//! [`RenderRequest`] tagged with a generation number and `resolve` only
//! accepts the outcome of the most recent submission, so a slow response for
//! old text can never replace the state of newer text.

use crate::encoder::{EncodeError, PlantUmlEncoder, TextEncoder};
use crate::style::{StyleDetection, effective_source};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_SERVER: &str = "https://www.plantuml.com/plantuml";

pub const INVALID_SYNTAX_MESSAGE: &str = "Invalid PlantUML syntax";
pub const RENDER_FAILED_MESSAGE: &str = "Failed to render diagram";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("server returned an empty image")]
    Empty,
}

/// Loads the image behind a render URL.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum RemoteFormat {
    #[default]
    Svg,
    Png,
}

impl RemoteFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RemoteFormat::Svg => "svg",
            RemoteFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub server: String,
    pub format: RemoteFormat,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            format: RemoteFormat::Svg,
        }
    }
}

impl Endpoint {
    pub fn url_for(&self, encoded: &str) -> String {
        format!(
            "{}/{}/{}",
            self.server.trim_end_matches('/'),
            self.format.extension(),
            encoded
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RenderState {
    #[default]
    Idle,
    Loading,
    Ready {
        url: String,
    },
    Error {
        message: String,
    },
}

impl RenderState {
    pub fn ready_url(&self) -> Option<&str> {
        match self {
            RenderState::Ready { url } => Some(url),
            _ => None,
        }
    }

    fn error(message: &str) -> Self {
        RenderState::Error {
            message: message.to_string(),
        }
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderState::Idle => write!(f, "Start typing to see the diagram..."),
            RenderState::Loading => write!(f, "Rendering..."),
            RenderState::Ready { url } => write!(f, "Ready {url}"),
            RenderState::Error { message } => write!(f, "{message}"),
        }
    }
}

/// A preload the caller must perform and report back through
/// [`RenderPipeline::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub generation: u64,
    pub url: String,
}

#[derive(Debug)]
pub struct RenderPipeline<E = PlantUmlEncoder> {
    encoder: E,
    endpoint: Endpoint,
    detection: StyleDetection,
    state: RenderState,
    generation: u64,
    pending: Option<RenderRequest>,
}

impl RenderPipeline<PlantUmlEncoder> {
    pub fn new(endpoint: Endpoint, detection: StyleDetection) -> Self {
        Self::with_encoder(PlantUmlEncoder, endpoint, detection)
    }
}

impl<E: TextEncoder> RenderPipeline<E> {
    pub fn with_encoder(encoder: E, endpoint: Endpoint, detection: StyleDetection) -> Self {
        Self {
            encoder,
            endpoint,
            detection,
            state: RenderState::Idle,
            generation: 0,
            pending: None,
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// URL the server would be asked for, or `None` for blank source.
    pub fn request_url(&self, source: &str, style: &str) -> Result<Option<String>, EncodeError> {
        if source.trim().is_empty() {
            return Ok(None);
        }
        let effective = effective_source(source, style, self.detection);
        let encoded = self.encoder.encode(&effective)?;
        Ok(Some(self.endpoint.url_for(&encoded)))
    }

    /// Starts a render for new input. Any earlier request is superseded
    /// whether or not this one produces a request of its own.
    pub fn submit(&mut self, source: &str, style: &str) -> Option<RenderRequest> {
        self.generation += 1;
        self.pending = None;
        match self.request_url(source, style) {
            Ok(None) => {
                self.state = RenderState::Idle;
                None
            }
            Ok(Some(url)) => {
                tracing::debug!(generation = self.generation, %url, "render submitted");
                self.state = RenderState::Loading;
                let request = RenderRequest {
                    generation: self.generation,
                    url,
                };
                self.pending = Some(request.clone());
                Some(request)
            }
            Err(err) => {
                tracing::debug!(generation = self.generation, error = %err, "encoding failed");
                self.state = RenderState::error(INVALID_SYNTAX_MESSAGE);
                None
            }
        }
    }

    /// Applies a preload outcome. Returns `false` when the outcome belongs to
    /// a superseded request and was dropped.
    pub fn resolve<T>(&mut self, generation: u64, outcome: &Result<T, FetchError>) -> bool {
        let Some(request) = self.pending.take_if(|pending| pending.generation == generation) else {
            tracing::debug!(
                generation,
                latest = self.generation,
                "dropping stale render result"
            );
            return false;
        };
        self.state = match outcome {
            Ok(_) => RenderState::Ready { url: request.url },
            Err(err) => {
                tracing::debug!(error = %err, "diagram preload failed");
                RenderState::error(RENDER_FAILED_MESSAGE)
            }
        };
        true
    }

    /// Submit, fetch and resolve on the calling thread. Returns the image
    /// when the render ends up ready.
    pub fn render_blocking(
        &mut self,
        source: &str,
        style: &str,
        fetcher: &dyn ImageFetcher,
    ) -> Option<Vec<u8>> {
        let request = self.submit(source, style)?;
        let outcome = fetcher.fetch(&request.url);
        self.resolve(request.generation, &outcome);
        outcome.ok()
    }
}
