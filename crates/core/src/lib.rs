//! Synctrack core types: resource identifiers shared by the sync engine.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

/// Errors produced when parsing the canonical text form of a [`ResourceId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid resource id {0:?}: expected \"Kind.group, namespace/name\"")]
    Malformed(String),
    #[error("invalid resource id {0:?}: kind is empty")]
    EmptyKind(String),
    #[error("invalid resource id {0:?}: name is empty")]
    EmptyName(String),
}

/// API group plus kind. An empty group is the core API group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), kind: kind.into() }
    }

    /// Derive the group from an `apiVersion` string (`v1` or `apps/v1`).
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        let group = match api_version.split_once('/') {
            Some((g, _version)) => g.to_string(),
            None => String::new(),
        };
        Self { group, kind: kind.into() }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Uniquely names one object in the cluster for the duration of a sync pass.
///
/// Rendered as `Kind.group, namespace/name` (`ConfigMap, default/cfg`,
/// `ClusterRole.rbac.authorization.k8s.io, /admin`). Reports sort ids by this
/// text so output is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub group_kind: GroupKind,
    /// Empty for cluster-scoped objects.
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(group_kind: GroupKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { group_kind, namespace: namespace.into(), name: name.into() }
    }

    /// Shorthand for a cluster-scoped id.
    pub fn cluster_scoped(group_kind: GroupKind, name: impl Into<String>) -> Self {
        Self::new(group_kind, String::new(), name)
    }

    pub fn is_namespaced(&self) -> bool { !self.namespace.is_empty() }

    /// Build an id from a kube `DynamicObject`. Type meta must be populated.
    pub fn from_dynamic(obj: &DynamicObject) -> Result<Self> {
        let types = obj.types.as_ref().ok_or_else(|| anyhow!("object missing apiVersion/kind"))?;
        if types.kind.is_empty() {
            return Err(anyhow!("object missing kind"));
        }
        let name = obj
            .metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow!("object missing metadata.name"))?;
        let namespace = obj.metadata.namespace.clone().unwrap_or_default();
        Ok(Self::new(GroupKind::from_api_version(&types.api_version, types.kind.clone()), namespace, name))
    }

    /// Build an id from a raw JSON manifest.
    pub fn from_manifest(manifest: &Json) -> Result<Self> {
        let api_version = manifest
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("manifest missing apiVersion"))?;
        let kind = manifest
            .get("kind")
            .and_then(|v| v.as_str())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("manifest missing kind"))?;
        let meta = manifest.get("metadata").context("manifest missing metadata")?;
        let name = meta
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow!("manifest missing metadata.name"))?;
        let namespace = meta.get("namespace").and_then(|v| v.as_str()).unwrap_or("");
        Ok(Self::new(GroupKind::from_api_version(api_version, kind), namespace, name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}/{}", self.group_kind, self.namespace, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (gk, key) = s.split_once(", ").ok_or_else(|| IdError::Malformed(s.to_string()))?;
        let (namespace, name) = key.split_once('/').ok_or_else(|| IdError::Malformed(s.to_string()))?;
        // Kinds never contain dots; everything after the first one is the group.
        let (kind, group) = gk.split_once('.').unwrap_or((gk, ""));
        if kind.is_empty() {
            return Err(IdError::EmptyKind(s.to_string()));
        }
        if name.contains('/') {
            return Err(IdError::Malformed(s.to_string()));
        }
        if name.is_empty() {
            return Err(IdError::EmptyName(s.to_string()));
        }
        Ok(Self::new(GroupKind::new(group, kind), namespace, name))
    }
}

pub mod prelude {
    pub use super::{GroupKind, IdError, ResourceId};
}
