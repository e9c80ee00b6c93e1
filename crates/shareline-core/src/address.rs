//! Fully-qualified share addresses (`\\server\share\path`)

use std::fmt;
use std::str::FromStr;

use crate::error::ShareError;
use crate::path::{validate_segment, SharePath};
use crate::{PATH_SEPARATOR, UNC_SEPARATOR};

/// Server, share, and share-relative path of one entry
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShareAddress {
    pub server: String,
    pub share: String,
    pub path: SharePath,
}

impl ShareAddress {
    pub fn new(server: impl Into<String>, share: impl Into<String>, path: SharePath) -> Self {
        Self {
            server: server.into(),
            share: share.into(),
            path,
        }
    }

    /// Parse `\\server\share\path...` (forward slashes are accepted too).
    ///
    /// A trailing separator after the share name is tolerated so that
    /// `\\server\share\` addresses the root.
    pub fn parse(address: &str) -> Result<Self, ShareError> {
        let resolution_error = |reason: &str| ShareError::PathResolution {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let rest = address
            .strip_prefix("\\\\")
            .or_else(|| address.strip_prefix("//"))
            .ok_or_else(|| resolution_error("address must start with \\\\"))?;

        let mut parts = rest.splitn(3, [PATH_SEPARATOR, UNC_SEPARATOR]);
        let server = parts.next().unwrap_or("");
        if server.is_empty() {
            return Err(resolution_error("missing server name"));
        }

        let share = parts.next().unwrap_or("");
        if validate_segment(share).is_err() {
            return Err(resolution_error("missing or invalid share name"));
        }

        let path = match parts.next() {
            Some(path) => SharePath::parse(path.trim_end_matches([PATH_SEPARATOR, UNC_SEPARATOR]))?,
            None => SharePath::root(),
        };

        Ok(Self::new(server, share, path))
    }

    /// UNC form of the address
    pub fn to_unc(&self) -> String {
        if self.path.is_root() {
            format!("\\\\{}\\{}", self.server, self.share)
        } else {
            format!("\\\\{}\\{}\\{}", self.server, self.share, self.path.to_unc())
        }
    }
}

impl fmt::Display for ShareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_unc())
    }
}

impl FromStr for ShareAddress {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
