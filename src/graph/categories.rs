//! Collection ("category") management within a link or value list.
//!
//! Categories partition one node's link list for a property. `main` is
//! the implicit default partition: it always conceptually exists, is
//! never renamed or deleted, and absorbs the members of any deleted
//! category. Reorganizing a non-hierarchy property makes the list a
//! local edit — its inheritance reference is cleared and descendants
//! are refreshed.

use serde_json::json;

use crate::engine::OntologyEngine;
use crate::error::{OntologyError, Result};
use crate::model::{ChangeRecord, ChangeType, LinkMap, Node, PropertyValue, MAIN_CATEGORY};
use crate::patch::NodePatch;

/// Which list a category operation targets.
enum Target {
    Specializations,
    Generalizations,
    Value(String),
}

impl Target {
    fn of(property: &str) -> Target {
        match property {
            "specializations" => Target::Specializations,
            "generalizations" => Target::Generalizations,
            other => Target::Value(other.to_string()),
        }
    }

}

impl OntologyEngine {
    /// Create an empty category. Fails on name collision.
    pub fn add_category(&self, id: &str, property: &str, name: &str, actor: &str) -> Result<()> {
        let node = self.node(id)?;
        let target = Target::of(property);
        let mut map = self.target_map(&node, &target)?;
        if map.contains_key(name) {
            return Err(OntologyError::DuplicateCategory {
                property: property.to_string(),
                category: name.to_string(),
            });
        }
        map.insert(name.to_string(), Vec::new());

        self.record_change(
            ChangeRecord::new(id, actor, ChangeType::AddCollection)
                .property(property)
                .new_value(json!(name)),
        );
        self.store_target(id, property, &target, map)
    }

    /// Rename a category, preserving member order.
    pub fn rename_category(
        &self,
        id: &str,
        property: &str,
        old: &str,
        new: &str,
        actor: &str,
    ) -> Result<()> {
        if old == MAIN_CATEGORY {
            return Err(OntologyError::ReservedCategory(old.to_string()));
        }
        let node = self.node(id)?;
        let target = Target::of(property);
        let mut map = self.target_map(&node, &target)?;
        if map.contains_key(new) {
            return Err(OntologyError::DuplicateCategory {
                property: property.to_string(),
                category: new.to_string(),
            });
        }
        let members = map
            .remove(old)
            .ok_or_else(|| OntologyError::CategoryNotFound {
                property: property.to_string(),
                category: old.to_string(),
            })?;
        map.insert(new.to_string(), members);

        self.record_change(
            ChangeRecord::new(id, actor, ChangeType::EditCollection)
                .property(property)
                .previous(json!(old))
                .new_value(json!(new)),
        );
        self.store_target(id, property, &target, map)
    }

    /// Delete a category, merging its members onto `main`. Returns
    /// false when the user declined the confirmation.
    pub fn delete_category(
        &self,
        id: &str,
        property: &str,
        name: &str,
        actor: &str,
    ) -> Result<bool> {
        if name == MAIN_CATEGORY {
            return Err(OntologyError::ReservedCategory(name.to_string()));
        }
        if !self
            .collaborator()
            .confirm_destructive_action("Are you sure you want to delete this Collection?")
        {
            return Ok(false);
        }
        let node = self.node(id)?;
        let target = Target::of(property);
        let mut map = self.target_map(&node, &target)?;
        let members = map
            .remove(name)
            .ok_or_else(|| OntologyError::CategoryNotFound {
                property: property.to_string(),
                category: name.to_string(),
            })?;
        map.entry(MAIN_CATEGORY.to_string())
            .or_default()
            .extend(members);

        self.record_change(
            ChangeRecord::new(id, actor, ChangeType::DeleteCollection)
                .property(property)
                .previous(json!(name)),
        );
        self.store_target(id, property, &target, map)?;
        Ok(true)
    }

    /// Relocate one item between categories, inserting at `to_index`.
    /// Remove-then-insert, never a copy.
    pub fn move_item(
        &self,
        id: &str,
        property: &str,
        item_id: &str,
        from: &str,
        to: &str,
        to_index: usize,
        actor: &str,
    ) -> Result<()> {
        let node = self.node(id)?;
        let target = Target::of(property);
        let mut map = self.target_map(&node, &target)?;

        let source = map
            .get_mut(from)
            .ok_or_else(|| OntologyError::CategoryNotFound {
                property: property.to_string(),
                category: from.to_string(),
            })?;
        let position = source
            .iter()
            .position(|l| l.id == item_id)
            .ok_or_else(|| OntologyError::LinkNotFound {
                node: id.to_string(),
                property: property.to_string(),
                id: item_id.to_string(),
            })?;
        let moved = source.remove(position);

        let destination = map.entry(to.to_string()).or_default();
        let index = to_index.min(destination.len());
        destination.insert(index, moved);

        self.record_change(
            ChangeRecord::new(id, actor, ChangeType::SortElements)
                .property(property)
                .previous(json!(from))
                .new_value(json!(to)),
        );
        self.store_target(id, property, &target, map)
    }

    /// The current category map for a target list; value lists come
    /// back materialized when still inherited.
    fn target_map(&self, node: &Node, target: &Target) -> Result<LinkMap> {
        match target {
            Target::Specializations => Ok(node.specializations.clone()),
            Target::Generalizations => Ok(node.generalizations.clone()),
            Target::Value(property) => self.materialized_links(node, property),
        }
    }

    /// Persist the reorganized map. A value list is now a local edit:
    /// its inheritance reference is cleared and descendants refreshed.
    fn store_target(&self, id: &str, property: &str, target: &Target, map: LinkMap) -> Result<()> {
        let mut batch = self.writer();
        match target {
            Target::Specializations => {
                batch.enqueue(id, NodePatch::new().specializations(map))?;
                batch.flush()
            }
            Target::Generalizations => {
                batch.enqueue(id, NodePatch::new().generalizations(map))?;
                batch.flush()
            }
            Target::Value(_) => {
                batch.enqueue(
                    id,
                    NodePatch::new()
                        .property(property, PropertyValue::Links(map))
                        .inheritance_ref(property, None)
                        .inheritance_title(property, ""),
                )?;
                let walk = self.propagate_value(&mut batch, id, property);
                self.finish_walk(batch, walk, "system")
            }
        }
    }
}
