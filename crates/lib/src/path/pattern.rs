//! Ignore patterns.
//!
//! Patterns are dotted strings such as `data.*.name`. A `*` segment matches
//! any key or list position. Empty segments are kept as literals that only
//! match an empty key, so `data..name` never matches `data.name`.

use std::{fmt, str::FromStr, sync::Arc};

use super::{ContainerHierarchy, PathSegment, PatternError, display_path, get_path};
use crate::{
    constants::{PATH_SEPARATOR, WILDCARD},
    logger::Logger,
};

/// One segment of an ignore pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    Literal(Arc<str>),
    Wildcard,
}

impl PatternSegment {
    fn matches(&self, segment: &PathSegment) -> bool {
        match (self, segment) {
            (PatternSegment::Wildcard, _) => true,
            (_, PathSegment::Item) => true,
            (PatternSegment::Literal(literal), PathSegment::Key(key)) => literal == key,
        }
    }
}

/// A parsed, immutable ignore pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnorePattern {
    segments: Vec<PatternSegment>,
}

impl IgnorePattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty {
                pattern: pattern.to_string(),
            });
        }
        let segments = pattern
            .split(PATH_SEPARATOR)
            .map(|segment| {
                if segment == WILDCARD {
                    PatternSegment::Wildcard
                } else {
                    PatternSegment::Literal(segment.into())
                }
            })
            .collect();
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    /// True if the pattern has the same length as `path` and every
    /// position matches.
    pub fn matches(&self, path: &[PathSegment]) -> bool {
        self.segments.len() == path.len()
            && self
                .segments
                .iter()
                .zip(path)
                .all(|(pattern, segment)| pattern.matches(segment))
    }
}

impl FromStr for IgnorePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for IgnorePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            match segment {
                PatternSegment::Literal(literal) => f.write_str(literal)?,
                PatternSegment::Wildcard => f.write_str(WILDCARD)?,
            }
        }
        Ok(())
    }
}

/// The compiled set of ignore patterns of one session.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let patterns = patterns
            .iter()
            .map(|pattern| IgnorePattern::parse(pattern.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[IgnorePattern] {
        &self.patterns
    }

    /// True if any pattern matches `path`.
    pub fn matches(&self, path: &[PathSegment]) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(path))
    }

    /// Decides whether an operation on `key` inside `container` is synced.
    ///
    /// Always true without patterns. An unknown path syncs as well, with a
    /// warning, so that data is never dropped silently.
    pub fn should_sync<T: ContainerHierarchy>(
        &self,
        hierarchy: &T,
        container: T::Handle,
        key: &str,
        log: &Logger,
    ) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        match get_path(hierarchy, container, key) {
            Some(path) => {
                let ignored = self.matches(&path);
                if ignored {
                    log.debug(format_args!("ignoring operation at '{}'", display_path(&path)));
                }
                !ignored
            }
            None => {
                log.warn(format_args!(
                    "could not resolve path of key '{key}', syncing it anyway"
                ));
                true
            }
        }
    }
}
