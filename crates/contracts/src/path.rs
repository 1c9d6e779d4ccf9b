//! InstancePath - Instance identifier into the hierarchical store
//!
//! A `/`-separated list of container names addressing a subtree.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::ContractError;

/// Path to a subtree of the data store.
///
/// The empty path (`/`) addresses the partition root.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct InstancePath(Vec<String>);

impl InstancePath {
    /// Partition root
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build from segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Path segments, root first
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append one segment
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// True if `self` equals `other` or is an ancestor of it
    pub fn contains(&self, other: &InstancePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// True if either path contains the other
    pub fn overlaps(&self, other: &InstancePath) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl FromStr for InstancePath {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.starts_with('/') {
            return Err(ContractError::invalid_parameter(
                "path",
                format!("instance path must be absolute, got '{trimmed}'"),
            ));
        }

        let segments: Vec<String> = trimmed
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        if let Some(bad) = segments.iter().find(|segment| segment.trim() != segment.as_str()) {
            return Err(ContractError::invalid_parameter(
                "path",
                format!("segment '{bad}' contains surrounding whitespace"),
            ));
        }

        Ok(Self(segments))
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstancePath({self})")
    }
}

impl Serialize for InstancePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InstancePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
