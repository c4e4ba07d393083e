//! Structured attribute paths.
//!
//! Paths address values inside nested models and collections:
//! `"user.email"`, `"links[0].url"`, or, relative to a collection,
//! `"[3].name"`. The same type is the subscription key for attribute
//! change topics, so handlers never re-parse strings on the emit path.

use std::fmt;

use crate::error::{Error, Result};

/// One step of an [`AttributePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// A named attribute.
    Name(String),
    /// A position inside a collection.
    Index(usize),
}

impl PathSegment {
    /// The attribute name, if this is a name segment.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Index(_) => None,
        }
    }

    /// The position, if this is an index segment.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Name(_) => None,
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A parsed attribute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributePath {
    segments: Vec<PathSegment>,
}

impl AttributePath {
    /// The empty path.
    pub fn root() -> Self {
        Self::default()
    }

    /// A single-name path.
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Name(name.into())],
        }
    }

    /// Build a path from already-split segments.
    pub fn from_segments(segments: impl IntoIterator<Item = PathSegment>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
        }
    }

    /// Parse a dotted/indexed path such as `links[0].data.value` or `[3].name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParam`] for empty input, empty names,
    /// unterminated or non-numeric indices, and stray brackets.
    pub fn parse(input: &str) -> Result<Self> {
        let malformed = |why: &str| Error::invalid_param(format!("Malformed attribute path `{input}`: {why}"));

        if input.is_empty() {
            return Err(malformed("empty path"));
        }

        let mut segments = Vec::new();
        let mut rest = input;
        let mut after_dot = false;

        loop {
            if let Some(body) = rest.strip_prefix('[') {
                if after_dot {
                    return Err(malformed("expected a name after `.`"));
                }
                let close = body.find(']').ok_or_else(|| malformed("unterminated index"))?;
                let index = body[..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| malformed("index is not a non-negative integer"))?;
                segments.push(PathSegment::Index(index));
                rest = &body[close + 1..];
            } else {
                let end = rest
                    .find(|c: char| matches!(c, '.' | '[' | ']'))
                    .unwrap_or(rest.len());
                if end == 0 {
                    return Err(malformed("empty attribute name"));
                }
                segments.push(PathSegment::Name(rest[..end].to_string()));
                rest = &rest[end..];
            }

            after_dot = false;
            if rest.is_empty() {
                break;
            }
            if let Some(tail) = rest.strip_prefix('.') {
                if tail.is_empty() {
                    return Err(malformed("trailing `.`"));
                }
                rest = tail;
                after_dot = true;
            } else if !rest.starts_with('[') {
                return Err(malformed("unexpected `]`"));
            }
        }

        Ok(Self { segments })
    }

    /// The segments in order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The first segment.
    pub fn first(&self) -> Option<&PathSegment> {
        self.segments.first()
    }

    /// The first segment and the remaining path.
    pub fn split_first(&self) -> Option<(&PathSegment, AttributePath)> {
        self.segments
            .split_first()
            .map(|(head, tail)| (head, Self::from_segments(tail.iter().cloned())))
    }

    /// Whether any segment is an index.
    pub fn has_index(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, PathSegment::Index(_)))
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// A new path with `other` appended.
    pub fn join(&self, other: &AttributePath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Name(name) if i == 0 => write!(f, "{name}")?,
                PathSegment::Name(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for AttributePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(path: &AttributePath) -> Vec<String> {
        path.segments()
            .iter()
            .map(|s| match s {
                PathSegment::Name(n) => n.clone(),
                PathSegment::Index(i) => format!("#{i}"),
            })
            .collect()
    }

    #[test]
    fn test_parse_nested_paths() {
        let path = AttributePath::parse("links[0].data.value").unwrap();
        assert_eq!(names(&path), vec!["links", "#0", "data", "value"]);
        assert!(path.has_index());

        let path = AttributePath::parse("[3].name").unwrap();
        assert_eq!(names(&path), vec!["#3", "name"]);

        let path = AttributePath::parse("matrix[1][2]").unwrap();
        assert_eq!(names(&path), vec!["matrix", "#1", "#2"]);

        let path = AttributePath::parse("title").unwrap();
        assert_eq!(path, AttributePath::name("title"));
        assert!(!path.has_index());
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        for bad in ["", "a..b", "a.", ".a", "a[", "a[x]", "a[-1]", "a]", "a.[0]"] {
            assert!(
                matches!(AttributePath::parse(bad), Err(Error::InvalidParam(_))),
                "expected `{bad}` to be rejected"
            );
        }
    }

    #[test]
    fn test_display_round_trips_text() {
        for text in ["user.email", "links[0].url", "[3].name", "a[1][2].b"] {
            assert_eq!(AttributePath::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_child_join_and_split() {
        let base = AttributePath::name("links").child(1usize);
        let full = base.join(&AttributePath::name("url"));
        assert_eq!(full.to_string(), "links[1].url");

        let (head, tail) = full.split_first().unwrap();
        assert_eq!(head.as_name(), Some("links"));
        assert_eq!(tail.to_string(), "[1].url");
        assert_eq!(tail.first().and_then(PathSegment::as_index), Some(1));
        assert!(AttributePath::root().split_first().is_none());
    }
}
