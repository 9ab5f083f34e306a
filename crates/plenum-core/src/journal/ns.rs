//! Typed path namespaces.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{GovError, Result};

/// An ordered sequence of path segments under a repository root.
///
/// Namespaces are assembled from string literals and from identifier types
/// (user handles, ballot ids, ...) that validate their segments at
/// construction, so joining is infallible. External input entering a segment
/// position must pass [`validate_segment`] first.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace(Vec<String>);

impl Namespace {
    /// The repository root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds a namespace from the given segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns a child namespace with `segment` appended.
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Returns this namespace extended with every segment of `other`.
    pub fn extend(&self, other: &Namespace) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// The segments of this namespace.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True for the repository root.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the namespace as a relative filesystem path.
    pub fn rel_path(&self) -> PathBuf {
        self.0.iter().collect()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Validates one externally supplied path segment.
///
/// Segments must be non-empty, must not be `.` or `..`, and may only contain
/// ASCII alphanumerics plus `.`, `_`, `@` and `-`.
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(GovError::invariant("path segment is empty"));
    }
    if segment == "." || segment == ".." {
        return Err(GovError::invariant(format!(
            "path segment {segment:?} is reserved"
        )));
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-'))
    {
        return Err(GovError::invariant(format!(
            "path segment {segment:?} contains forbidden characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_segment, Namespace};

    #[test]
    fn renders_as_slash_joined_path() {
        let ns = Namespace::new(["ballot", "p1"]).join("ad.json");
        assert_eq!(ns.to_string(), "ballot/p1/ad.json");
        assert_eq!(ns.segments().len(), 3);
    }

    #[test]
    fn rejects_traversal_segments() {
        assert!(validate_segment("..").is_err());
        assert!(validate_segment(".").is_err());
        assert!(validate_segment("").is_err());
        assert!(validate_segment("a/b").is_err());
        assert!(validate_segment("a\\b").is_err());
    }

    #[test]
    fn accepts_identifier_segments() {
        assert!(validate_segment("alice").is_ok());
        assert!(validate_segment("pp-c1.json").is_ok());
        assert!(validate_segment("user@host").is_ok());
    }
}
