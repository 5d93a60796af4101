use crate::storage::{KeyValueStore, SOURCE_KEY, STYLE_KEY, StorageError};
use crate::style::select_style;
use crate::template::{DEFAULT_SOURCE, select_template};

/// Current diagram text and active style block, mirrored to storage on
/// every change.
#[derive(Debug)]
pub struct SourceBuffer<S> {
    store: S,
    source: String,
    style: String,
}

impl<S: KeyValueStore> SourceBuffer<S> {
    /// Reads both keys once; missing keys fall back to the built-in diagram
    /// and no style.
    pub fn load(store: S) -> Self {
        let source = store
            .get(SOURCE_KEY)
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let style = store.get(STYLE_KEY).unwrap_or_default();
        Self {
            store,
            source,
            style,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns `Ok(true)` when the text actually changed. The in-memory value
    /// is updated even if the write fails.
    pub fn set_source(&mut self, source: &str) -> Result<bool, StorageError> {
        if self.source == source {
            return Ok(false);
        }
        self.source = source.to_string();
        self.store.set(SOURCE_KEY, &self.source)?;
        Ok(true)
    }

    pub fn set_style(&mut self, style: &str) -> Result<bool, StorageError> {
        if self.style == style {
            return Ok(false);
        }
        self.style = style.to_string();
        self.store.set(STYLE_KEY, &self.style)?;
        Ok(true)
    }

    /// Replaces the active style with the catalog entry for `id`.
    pub fn select_style(&mut self, id: &str) -> Result<bool, StorageError> {
        self.set_style(select_style(id))
    }

    /// Replaces the whole source with a template. Unsaved edits are dropped;
    /// unknown ids leave the buffer untouched.
    pub fn apply_template(&mut self, id: &str) -> Result<bool, StorageError> {
        match select_template(id) {
            Some(code) => self.set_source(code),
            None => {
                tracing::warn!(template = id, "unknown template");
                Ok(false)
            }
        }
    }
}
