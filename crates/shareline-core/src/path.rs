//! Share-relative path model
//!
//! A [`SharePath`] is an ordered list of validated segments. The empty list is
//! the share root and renders as `""`. Paths are plain values: every derivation
//! (parent, child, sibling) builds a new one.
//!
//! Segment rules:
//! 1. Segments are non-empty
//! 2. `.` and `..` are rejected, there is no relative navigation
//! 3. Neither `/` nor `\` may appear inside a segment
//! 4. Null bytes and names longer than [`MAX_FILENAME_LEN`] are rejected

use std::fmt;

use crate::error::ShareError;
use crate::{MAX_FILENAME_LEN, MAX_PATH_LEN, PATH_SEPARATOR, UNC_SEPARATOR};

/// Validated path inside a share
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharePath {
    // Ordering is derived from the segment list, which sorts a directory
    // directly before its own children.
    segments: Vec<String>,
}

impl SharePath {
    /// The share root (`""`)
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a share-relative path.
    ///
    /// Both `/` and `\` separate segments. `""` is the root; any other input
    /// must consist of valid segments only, so `"/"`, `"a//b"` and `"a/./b"`
    /// are all rejected.
    pub fn parse(path: &str) -> Result<Self, ShareError> {
        if path.is_empty() {
            return Ok(Self::root());
        }

        if path.len() > MAX_PATH_LEN {
            return Err(ShareError::InvalidName {
                path: path.to_string(),
                name: path.to_string(),
                reason: "path too long",
            });
        }

        let mut segments = Vec::new();
        for segment in path.split([PATH_SEPARATOR, UNC_SEPARATOR]) {
            if let Err(reason) = validate_segment(segment) {
                return Err(ShareError::InvalidName {
                    path: path.to_string(),
                    name: segment.to_string(),
                    reason,
                });
            }
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    /// Build a path from already separated segments
    pub fn from_segments<I, S>(segments: I) -> Result<Self, ShareError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        segments.into_iter().try_fold(Self::root(), |path, segment| {
            let segment: String = segment.into();
            path.child(&segment)
        })
    }

    /// The path of an entry named `name` inside this path
    pub fn child(&self, name: &str) -> Result<Self, ShareError> {
        if let Err(reason) = validate_segment(name) {
            return Err(ShareError::InvalidName {
                path: self.join_with(name),
                name: name.to_string(),
                reason,
            });
        }

        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// The path of an entry named `name` next to this one
    pub fn sibling(&self, name: &str) -> Result<Self, ShareError> {
        self.parent().child(name)
    }

    /// One segment up. The root is its own parent.
    pub fn parent(&self) -> Self {
        match self.segments.split_last() {
            Some((_, rest)) => Self {
                segments: rest.to_vec(),
            },
            None => Self::root(),
        }
    }

    /// True only for the share root itself
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments; 0 for the root
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, or `""` for the root
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True if `self` equals `ancestor` or lies beneath it
    pub fn starts_with(&self, ancestor: &SharePath) -> bool {
        self.segments.starts_with(&ancestor.segments)
    }

    /// Move `self` from beneath `from` to beneath `to`.
    ///
    /// Returns `None` when `self` is not `from` or one of its descendants.
    pub fn rebase(&self, from: &SharePath, to: &SharePath) -> Option<SharePath> {
        let rest = self.segments.strip_prefix(from.segments.as_slice())?;
        let mut segments = to.segments.clone();
        segments.extend_from_slice(rest);
        Some(Self { segments })
    }

    /// Render with `/` separators (`""` for the root)
    pub fn as_string(&self) -> String {
        self.segments.join(&PATH_SEPARATOR.to_string())
    }

    /// Render with the share's native `\` separators
    pub fn to_unc(&self) -> String {
        self.segments.join(&UNC_SEPARATOR.to_string())
    }

    fn join_with(&self, name: &str) -> String {
        if self.is_root() {
            name.to_string()
        } else {
            format!("{}{}{}", self.as_string(), PATH_SEPARATOR, name)
        }
    }
}

impl fmt::Display for SharePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Validate a single path segment (one entry name).
///
/// Returns the reason the name is rejected.
pub fn validate_segment(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }

    if name == "." || name == ".." {
        return Err("special directory names not allowed");
    }

    if name.contains(PATH_SEPARATOR) || name.contains(UNC_SEPARATOR) {
        return Err("name contains path separator");
    }

    if name.contains('\0') {
        return Err("name contains null byte");
    }

    if name.len() > MAX_FILENAME_LEN {
        return Err("name too long");
    }

    Ok(())
}

/// Whether a listed entry name maps to an item.
///
/// Listings report `.` and `..` (and some servers a bare separator); those
/// are skipped rather than failing the listing.
pub fn is_listable_name(name: &str) -> bool {
    validate_segment(name).is_ok()
}
