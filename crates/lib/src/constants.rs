//! Constants shared across the sync core.

/// Prefix of the transaction origin tagging a session's own writes. The
/// session id is appended to it.
pub const LOCAL_ORIGIN_PREFIX: &str = "ymirror:";

/// Pattern segment matching any key or list position.
pub const WILDCARD: &str = "*";

/// Separator between segments of dotted paths and ignore patterns.
pub const PATH_SEPARATOR: char = '.';
