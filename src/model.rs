//! Ontology document model.
//!
//! One `Node` per document in the `nodes` collection. Link lists are
//! partitioned into named collections ("categories"); `main` is the
//! implicit default partition that always conceptually exists.

use std::collections::{BTreeMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Document id in the `nodes` collection.
pub type NodeId = String;

/// The default category every link list and value list falls back to.
pub const MAIN_CATEGORY: &str = "main";

/// One entry of an ordered link list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub id: NodeId,
}

impl LinkRef {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self { id: id.into() }
    }
}

/// Category name → ordered link list.
pub type LinkMap = BTreeMap<String, Vec<LinkRef>>;

/// A property value: either plain text or a categorized link list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Links(LinkMap),
}

impl PropertyValue {
    /// Empty link-list value with the default category present.
    pub fn empty_links() -> Self {
        let mut map = LinkMap::new();
        map.insert(MAIN_CATEGORY.to_string(), Vec::new());
        PropertyValue::Links(map)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Links(_) => None,
        }
    }

    pub fn as_links(&self) -> Option<&LinkMap> {
        match self {
            PropertyValue::Text(_) => None,
            PropertyValue::Links(map) => Some(map),
        }
    }
}

/// How a property responds to ancestor value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InheritancePolicy {
    /// Permanently diverged: the value is a materialized local copy.
    #[serde(rename = "neverInherit")]
    NeverInherit,
    /// Always mirrors the ancestor, even over a local edit.
    #[serde(rename = "alwaysInherit")]
    AlwaysInherit,
    /// Mirrors the ancestor until the node overrides the value locally.
    #[serde(rename = "inheritUnlessAlreadyOverRidden")]
    InheritUnlessOverridden,
}

impl Default for InheritancePolicy {
    fn default() -> Self {
        InheritancePolicy::InheritUnlessOverridden
    }
}

/// Per-property inheritance record.
///
/// `reference` names the ancestor currently supplying the value (`None`
/// when the node is an override point or permanently diverged); `title`
/// caches that ancestor's title for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inheritance {
    #[serde(rename = "ref")]
    pub reference: Option<NodeId>,
    #[serde(rename = "inheritanceType", default)]
    pub policy: InheritancePolicy,
    #[serde(default)]
    pub title: String,
}

/// A vertex of the ontology graph.
///
/// `deleted` is a tombstone: documents are never physically removed so
/// that back-references stay resolvable for audit/undo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub title: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub locked: bool,
    /// Id of the top-level ancestor; empty for roots themselves.
    #[serde(default)]
    pub root: NodeId,
    #[serde(default)]
    pub generalizations: LinkMap,
    #[serde(default)]
    pub specializations: LinkMap,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    /// Declared type tag per property (e.g. "string", "actor").
    #[serde(default)]
    pub property_type: BTreeMap<String, String>,
    /// Back-links: property name → category → nodes referencing this
    /// node through that property.
    #[serde(default)]
    pub property_of: BTreeMap<String, LinkMap>,
    #[serde(default)]
    pub inheritance: BTreeMap<String, Inheritance>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl Node {
    /// Fresh node with empty relation maps and current timestamps.
    pub fn new(id: impl Into<NodeId>, title: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            title: title.into(),
            deleted: false,
            locked: false,
            root: String::new(),
            generalizations: LinkMap::new(),
            specializations: LinkMap::new(),
            properties: BTreeMap::new(),
            property_type: BTreeMap::new(),
            property_of: BTreeMap::new(),
            inheritance: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Specialization ids flattened across categories, deduplicated,
    /// in encounter order.
    pub fn specialization_ids(&self) -> Vec<NodeId> {
        flatten_unique(&self.specializations)
    }

    /// Generalization ids flattened across categories, deduplicated.
    pub fn generalization_ids(&self) -> Vec<NodeId> {
        flatten_unique(&self.generalizations)
    }
}

/// True if `id` appears under any category of the map.
pub fn link_map_contains(map: &LinkMap, id: &str) -> bool {
    map.values().flatten().any(|l| l.id == id)
}

/// Remove every occurrence of `id` across all categories.
/// Returns true if anything was removed.
pub fn remove_link_everywhere(map: &mut LinkMap, id: &str) -> bool {
    let mut removed = false;
    for list in map.values_mut() {
        let before = list.len();
        list.retain(|l| l.id != id);
        removed |= list.len() != before;
    }
    removed
}

fn flatten_unique(map: &LinkMap) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for link in map.values().flatten() {
        if seen.insert(link.id.as_str()) {
            out.push(link.id.clone());
        }
    }
    out
}

/// Kind of mutation recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "change text")]
    ChangeText,
    #[serde(rename = "sort elements")]
    SortElements,
    #[serde(rename = "remove element")]
    RemoveElement,
    #[serde(rename = "modify elements")]
    ModifyElements,
    #[serde(rename = "delete node")]
    DeleteNode,
    #[serde(rename = "add node")]
    AddNode,
    #[serde(rename = "add collection")]
    AddCollection,
    #[serde(rename = "delete collection")]
    DeleteCollection,
    #[serde(rename = "edit collection")]
    EditCollection,
}

/// Append-only audit entry in the `change-log` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub node_id: NodeId,
    pub modified_by: String,
    pub modified_property: Option<String>,
    pub previous_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub modified_at: u64,
    pub change_type: ChangeType,
}

impl ChangeRecord {
    pub fn new(
        node_id: impl Into<NodeId>,
        modified_by: impl Into<String>,
        change_type: ChangeType,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            modified_by: modified_by.into(),
            modified_property: None,
            previous_value: serde_json::Value::Null,
            new_value: serde_json::Value::Null,
            modified_at: now_millis(),
            change_type,
        }
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.modified_property = Some(property.into());
        self
    }

    pub fn previous(mut self, value: serde_json::Value) -> Self {
        self.previous_value = value;
        self
    }

    pub fn new_value(mut self, value: serde_json::Value) -> Self {
        self.new_value = value;
        self
    }
}

/// Cooperative "someone is editing this" signal for one node field.
///
/// Released locks are flagged `deleted` rather than removed, matching
/// the `locks` collection contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSignal {
    pub node: NodeId,
    pub field: String,
    pub actor: String,
    pub created_at: u64,
    #[serde(default)]
    pub deleted: bool,
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_untagged_serde() {
        let text: PropertyValue = serde_json::from_str(r#""some notes""#).unwrap();
        assert_eq!(text.as_text(), Some("some notes"));

        let links: PropertyValue =
            serde_json::from_str(r#"{"main":[{"id":"n1"},{"id":"n2"}]}"#).unwrap();
        let map = links.as_links().unwrap();
        assert_eq!(map["main"].len(), 2);
        assert_eq!(map["main"][0].id, "n1");
    }

    #[test]
    fn test_inheritance_policy_wire_names() {
        let json = serde_json::to_string(&InheritancePolicy::InheritUnlessOverridden).unwrap();
        assert_eq!(json, r#""inheritUnlessAlreadyOverRidden""#);
        let back: InheritancePolicy = serde_json::from_str(r#""neverInherit""#).unwrap();
        assert_eq!(back, InheritancePolicy::NeverInherit);
    }

    #[test]
    fn test_change_type_wire_names() {
        let json = serde_json::to_string(&ChangeType::AddCollection).unwrap();
        assert_eq!(json, r#""add collection""#);
    }

    #[test]
    fn test_flatten_unique_dedups_across_categories() {
        let mut node = Node::new("root", "Root");
        node.specializations.insert(
            "main".into(),
            vec![LinkRef::new("a"), LinkRef::new("b")],
        );
        node.specializations
            .insert("extra".into(), vec![LinkRef::new("a"), LinkRef::new("c")]);

        assert_eq!(node.specialization_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_link_everywhere() {
        let mut map = LinkMap::new();
        map.insert("main".into(), vec![LinkRef::new("x"), LinkRef::new("y")]);
        map.insert("other".into(), vec![LinkRef::new("x")]);

        assert!(remove_link_everywhere(&mut map, "x"));
        assert!(!link_map_contains(&map, "x"));
        assert!(link_map_contains(&map, "y"));
        assert!(!remove_link_everywhere(&mut map, "x"));
    }

    #[test]
    fn test_node_serde_round_trip() {
        let mut node = Node::new("n1", "Task");
        node.properties
            .insert("notes".into(), PropertyValue::Text("x".into()));
        node.inheritance.insert(
            "notes".into(),
            Inheritance {
                reference: Some("root".into()),
                policy: InheritancePolicy::AlwaysInherit,
                title: "Root".into(),
            },
        );

        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains(r#""inheritanceType":"alwaysInherit""#));
        assert!(json.contains(r#""ref":"root""#));
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
