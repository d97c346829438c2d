//! Sparse per-document patches.
//!
//! Operations never mutate shared state in place: they compute the new
//! value, compare it to the prior one, and emit a `NodePatch` only when
//! something actually changed. `NodePatch::apply` merges the patch into
//! a `Node`, which is how both the in-memory view and the persistence
//! backends consume it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    now_millis, InheritancePolicy, LinkMap, Node, NodeId, PropertyValue,
};

/// Field-level update set for one node document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generalizations: Option<LinkMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specializations: Option<LinkMap>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub property_type: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub property_of: BTreeMap<String, LinkMap>,
    /// `Some(id)` re-points the reference, `None` clears it.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inheritance_refs: BTreeMap<String, Option<NodeId>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inheritance_policies: BTreeMap<String, InheritancePolicy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inheritance_titles: BTreeMap<String, String>,
    /// Properties removed together with their type tag and inheritance
    /// record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_properties: Vec<String>,
}

impl NodePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = Some(deleted);
        self
    }

    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = Some(locked);
        self
    }

    pub fn generalizations(mut self, map: LinkMap) -> Self {
        self.generalizations = Some(map);
        self
    }

    pub fn specializations(mut self, map: LinkMap) -> Self {
        self.specializations = Some(map);
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn property_type(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.property_type.insert(name.into(), kind.into());
        self
    }

    pub fn property_of(mut self, name: impl Into<String>, map: LinkMap) -> Self {
        self.property_of.insert(name.into(), map);
        self
    }

    pub fn inheritance_ref(mut self, name: impl Into<String>, target: Option<NodeId>) -> Self {
        self.inheritance_refs.insert(name.into(), target);
        self
    }

    pub fn inheritance_policy(mut self, name: impl Into<String>, policy: InheritancePolicy) -> Self {
        self.inheritance_policies.insert(name.into(), policy);
        self
    }

    pub fn inheritance_title(mut self, name: impl Into<String>, title: impl Into<String>) -> Self {
        self.inheritance_titles.insert(name.into(), title.into());
        self
    }

    pub fn remove_property(mut self, name: impl Into<String>) -> Self {
        self.removed_properties.push(name.into());
        self
    }

    /// True when applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.deleted.is_none()
            && self.locked.is_none()
            && self.generalizations.is_none()
            && self.specializations.is_none()
            && self.properties.is_empty()
            && self.property_type.is_empty()
            && self.property_of.is_empty()
            && self.inheritance_refs.is_empty()
            && self.inheritance_policies.is_empty()
            && self.inheritance_titles.is_empty()
            && self.removed_properties.is_empty()
    }

    /// Merge the patch into `node`, refreshing `updated_at`.
    pub fn apply(&self, node: &mut Node) {
        if self.is_empty() {
            return;
        }
        if let Some(title) = &self.title {
            node.title = title.clone();
        }
        if let Some(deleted) = self.deleted {
            node.deleted = deleted;
        }
        if let Some(locked) = self.locked {
            node.locked = locked;
        }
        if let Some(map) = &self.generalizations {
            node.generalizations = map.clone();
        }
        if let Some(map) = &self.specializations {
            node.specializations = map.clone();
        }
        for (name, value) in &self.properties {
            node.properties.insert(name.clone(), value.clone());
        }
        for (name, kind) in &self.property_type {
            node.property_type.insert(name.clone(), kind.clone());
        }
        for (name, map) in &self.property_of {
            node.property_of.insert(name.clone(), map.clone());
        }
        for (name, target) in &self.inheritance_refs {
            node.inheritance.entry(name.clone()).or_default().reference = target.clone();
        }
        for (name, policy) in &self.inheritance_policies {
            node.inheritance.entry(name.clone()).or_default().policy = *policy;
        }
        for (name, title) in &self.inheritance_titles {
            node.inheritance.entry(name.clone()).or_default().title = title.clone();
        }
        for name in &self.removed_properties {
            node.properties.remove(name);
            node.property_type.remove(name);
            node.inheritance.remove(name);
        }
        node.updated_at = now_millis();
    }
}
