//! Session configuration.

use serde::{Deserialize, Serialize};

/// Options accepted by [`SyncSession::new`](super::SyncSession::new).
///
/// ```
/// # use ymirror::SyncOptions;
/// let options = SyncOptions::from_json(r#"{ "syncIgnore": ["data.*.draft"], "debug": true }"#)?;
/// assert_eq!(options, SyncOptions::default().ignore("data.*.draft").with_debug(true));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncOptions {
    /// Dotted ignore patterns; `*` matches any key or list position.
    pub sync_ignore: Vec<String>,
    /// Emit debug events for this session.
    pub debug: bool,
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Adds an ignore pattern.
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.sync_ignore.push(pattern.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
