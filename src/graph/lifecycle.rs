//! Node lifecycle: creation by specialization/cloning, tombstone
//! deletion.
//!
//! A new node is always born as a specialization of an existing one,
//! deep-copying the parent's property shape and re-pointing every
//! inheritable record at the parent. Deletion only flags the tombstone:
//! documents are never physically removed, so back-references stay
//! resolvable for audit/undo.

use serde_json::json;
use tracing::warn;

use crate::engine::OntologyEngine;
use crate::error::{OntologyError, Result};
use crate::id_gen::new_node_id;
use crate::model::{
    link_map_contains, remove_link_everywhere, ChangeRecord, ChangeType, InheritancePolicy,
    LinkRef, Node, PropertyValue, MAIN_CATEGORY,
};
use crate::patch::NodePatch;

impl OntologyEngine {
    /// Create a new specialization of `parent` under `category`.
    pub fn add_specialization(&self, parent_id: &str, category: &str, actor: &str) -> Result<Node> {
        let parent = self.node(parent_id)?;

        let sibling_titles: Vec<String> = parent
            .specialization_ids()
            .iter()
            .filter_map(|id| self.store().get(id))
            .map(|n| n.title)
            .collect();
        let title = unique_title(&format!("New {}", parent.title), &sibling_titles);

        let mut child = Node::new(new_node_id(&format!("{parent_id}:{title}")), title);
        child.root = if parent.root.is_empty() {
            parent.id.clone()
        } else {
            parent.root.clone()
        };
        child.properties = parent.properties.clone();
        child.property_type = parent.property_type.clone();
        child.inheritance = parent.inheritance.clone();
        for record in child.inheritance.values_mut() {
            if record.policy == InheritancePolicy::NeverInherit {
                record.reference = None;
                record.title.clear();
            } else {
                // The value flows in through the parent from now on.
                record.reference = Some(parent.id.clone());
                record.title = parent.title.clone();
            }
        }
        child
            .generalizations
            .insert(MAIN_CATEGORY.to_string(), vec![LinkRef::new(parent_id)]);
        child
            .specializations
            .insert(MAIN_CATEGORY.to_string(), Vec::new());

        let mut parent_specializations = parent.specializations.clone();
        parent_specializations
            .entry(category.to_string())
            .or_default()
            .push(LinkRef::new(&child.id));

        let mut batch = self.writer();
        batch.put(child.clone())?;
        batch.enqueue(
            parent_id,
            NodePatch::new().specializations(parent_specializations),
        )?;
        self.record_change(
            ChangeRecord::new(&child.id, actor, ChangeType::AddNode)
                .new_value(json!({ "id": child.id, "title": child.title })),
        );
        batch.flush()?;
        Ok(child)
    }

    /// Clone `source` as a fresh specialization under its `main`
    /// category.
    pub fn clone_node(&self, source_id: &str, actor: &str) -> Result<Node> {
        self.add_specialization(source_id, MAIN_CATEGORY, actor)
    }

    /// Tombstone a node. Refused while any specialization would be
    /// orphaned; returns false when the user declined the
    /// confirmation.
    pub fn delete_node(&self, id: &str, actor: &str) -> Result<bool> {
        let node = self.node(id)?;
        if !self
            .collaborator()
            .confirm_destructive_action("Are you sure you want to delete this Node?")
        {
            return Ok(false);
        }

        for spec_id in node.specialization_ids() {
            if let Some(spec) = self.store().get(&spec_id) {
                let generalizations = spec.generalization_ids();
                if generalizations.len() == 1 && generalizations[0] == id {
                    return Err(OntologyError::WouldOrphanNode(spec_id));
                }
            }
        }

        let mut batch = self.writer();
        self.strip_value_reciprocals(&mut batch, &node)?;
        batch.enqueue(id, NodePatch::new().deleted(true))?;
        self.record_change(
            ChangeRecord::new(id, actor, ChangeType::DeleteNode).previous(json!(node.title)),
        );
        batch.flush()?;
        Ok(true)
    }

    /// Remove this node from parts/isPartOf lists and propertyOf
    /// back-links of its neighbors. Hierarchy links are deliberately
    /// left in place — they resolve against the tombstone.
    fn strip_value_reciprocals(
        &self,
        batch: &mut crate::batch::BoundedBatchWriter<'_>,
        node: &Node,
    ) -> Result<()> {
        for (field, back_field) in [("parts", "isPartOf"), ("isPartOf", "parts")] {
            let Some(PropertyValue::Links(map)) = node.properties.get(field) else {
                continue;
            };
            for link in map.values().flatten() {
                let Some(other) = self.store().get(&link.id) else {
                    warn!(node = %node.id, to = %link.id, "dangling part link at deletion");
                    continue;
                };
                if let Some(PropertyValue::Links(other_map)) = other.properties.get(back_field) {
                    let mut cleaned = other_map.clone();
                    if remove_link_everywhere(&mut cleaned, &node.id) {
                        batch.enqueue(
                            &other.id,
                            NodePatch::new().property(back_field, PropertyValue::Links(cleaned)),
                        )?;
                    }
                }
            }
        }

        // Nodes referencing this one through a property drop the link.
        for (property, referrers) in &node.property_of {
            for link in referrers.values().flatten() {
                let Some(referrer) = self.store().get(&link.id) else {
                    continue;
                };
                if let Some(PropertyValue::Links(list)) = referrer.properties.get(property) {
                    if link_map_contains(list, &node.id) {
                        let mut cleaned = list.clone();
                        remove_link_everywhere(&mut cleaned, &node.id);
                        batch.enqueue(
                            &referrer.id,
                            NodePatch::new().property(property, PropertyValue::Links(cleaned)),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// First title in `base`, `base (2)`, `base (3)`, ... not yet taken.
fn unique_title(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == base) {
        return base.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{base} ({counter})");
        if !taken.iter().any(|t| t == &candidate) {
            return candidate;
        }
        counter += 1;
    }
}
