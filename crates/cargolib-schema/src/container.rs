//! Container records and the path/mount-state predicates used to select them.

use crate::template::Storage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Not;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub uuid: Uuid,
    pub name: String,
    pub paths: BTreeSet<String>,
    #[serde(default)]
    pub mounted: bool,
    #[serde(default)]
    pub storages: Vec<Storage>,
}

/// Container paths are absolute, slash-separated and contain no empty or
/// relative segments.
pub fn is_valid_container_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    rest.split('/')
        .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountState {
    Mounted,
    Unmounted,
    #[default]
    MountedOrUnmounted,
}

impl MountState {
    pub fn admits(self, mounted: bool) -> bool {
        match self {
            Self::Mounted => mounted,
            Self::Unmounted => !mounted,
            Self::MountedOrUnmounted => true,
        }
    }
}

/// Predicate tree over a container's path set.
///
/// Leaf predicates hold when any path in the set satisfies them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerFilter {
    HasExactPath(String),
    PathStartsWith(String),
    And(Box<ContainerFilter>, Box<ContainerFilter>),
    Or(Box<ContainerFilter>, Box<ContainerFilter>),
    Not(Box<ContainerFilter>),
}

impl ContainerFilter {
    pub fn has_exact_path(path: impl Into<String>) -> Self {
        Self::HasExactPath(path.into())
    }

    pub fn path_starts_with(prefix: impl Into<String>) -> Self {
        Self::PathStartsWith(prefix.into())
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    pub fn matches<'a, I>(&self, paths: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
        I::IntoIter: Clone,
    {
        self.eval(paths.into_iter())
    }

    fn eval<'a, I>(&self, paths: I) -> bool
    where
        I: Iterator<Item = &'a String> + Clone,
    {
        match self {
            Self::HasExactPath(exact) => paths.clone().any(|p| p == exact),
            Self::PathStartsWith(prefix) => paths.clone().any(|p| has_path_prefix(p, prefix)),
            Self::And(a, b) => a.eval(paths.clone()) && b.eval(paths),
            Self::Or(a, b) => a.eval(paths.clone()) || b.eval(paths),
            Self::Not(f) => !f.eval(paths),
        }
    }
}

impl Not for ContainerFilter {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

/// Segment-aware prefix test: `/a` covers `/a` and `/a/b` but not `/ab`.
fn has_path_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        None => false,
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
    }
}
