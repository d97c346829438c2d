//! Bidirectional link maintenance.
//!
//! Every relational edge is mirrored on both endpoints: a
//! specialization entry implies a generalization entry back, a part
//! implies an isPartOf, and a property-value link implies a propertyOf
//! back-link. `link`/`unlink` keep that closure; removal follows the
//! last-reference-wins rule — the reciprocal entry survives as long as
//! the target is still linked under ANY category of the relation.

use serde_json::json;
use tracing::warn;

use crate::engine::OntologyEngine;
use crate::error::{OntologyError, Result};
use crate::model::{
    link_map_contains, remove_link_everywhere, ChangeRecord, ChangeType, LinkMap, LinkRef,
    PropertyValue, MAIN_CATEGORY,
};
use crate::patch::NodePatch;

/// Relations an edge can be linked under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    Specialization,
    Generalization,
    Part,
    IsPartOf,
    /// Any other link-valued property, by name.
    Property(String),
}

impl Relation {
    /// Specialization/generalization form the identity hierarchy; the
    /// rest are value links.
    pub fn is_hierarchy(&self) -> bool {
        matches!(self, Relation::Specialization | Relation::Generalization)
    }

    /// Name of the field holding this relation's link list.
    pub fn field(&self) -> &str {
        match self {
            Relation::Specialization => "specializations",
            Relation::Generalization => "generalizations",
            Relation::Part => "parts",
            Relation::IsPartOf => "isPartOf",
            Relation::Property(name) => name,
        }
    }

    fn hierarchy_reciprocal(&self) -> Relation {
        match self {
            Relation::Specialization => Relation::Generalization,
            Relation::Generalization => Relation::Specialization,
            Relation::Part => Relation::IsPartOf,
            Relation::IsPartOf => Relation::Part,
            Relation::Property(name) => Relation::Property(name.clone()),
        }
    }

    /// True when edits to this relation participate in inheritance
    /// (isPartOf is the back-link side and never does).
    fn refreshes_inheritance(&self) -> bool {
        !self.is_hierarchy() && !matches!(self, Relation::IsPartOf)
    }
}

impl OntologyEngine {
    /// Link `b` under `category` of `a`'s relation list and mirror the
    /// reciprocal entry on `b`.
    pub fn link(
        &self,
        a_id: &str,
        relation: &Relation,
        b_id: &str,
        category: &str,
        actor: &str,
    ) -> Result<()> {
        let a = self.node(a_id)?;
        let b = self.node(b_id)?;
        let mut batch = self.writer();

        if relation.is_hierarchy() {
            let mut map = match relation {
                Relation::Specialization => a.specializations.clone(),
                _ => a.generalizations.clone(),
            };
            if link_map_contains(&map, b_id) {
                return Ok(());
            }
            map.entry(category.to_string())
                .or_default()
                .push(LinkRef::new(b_id));
            let patch = match relation {
                Relation::Specialization => NodePatch::new().specializations(map.clone()),
                _ => NodePatch::new().generalizations(map.clone()),
            };
            batch.enqueue(a_id, patch)?;

            // Reciprocal entry lands under the target's main category.
            let reciprocal = relation.hierarchy_reciprocal();
            let mut back = match reciprocal {
                Relation::Specialization => b.specializations.clone(),
                _ => b.generalizations.clone(),
            };
            if !link_map_contains(&back, a_id) {
                back.entry(MAIN_CATEGORY.to_string())
                    .or_default()
                    .push(LinkRef::new(a_id));
                let patch = match reciprocal {
                    Relation::Specialization => NodePatch::new().specializations(back),
                    _ => NodePatch::new().generalizations(back),
                };
                batch.enqueue(b_id, patch)?;
            }

            self.record_change(
                ChangeRecord::new(a_id, actor, ChangeType::ModifyElements)
                    .property(relation.field())
                    .new_value(json!(map)),
            );
            return batch.flush();
        }

        let field = relation.field();
        let mut list = self.materialized_links(&a, field)?;
        if link_map_contains(&list, b_id) {
            return Ok(());
        }
        list.entry(category.to_string())
            .or_default()
            .push(LinkRef::new(b_id));

        let mut patch = NodePatch::new().property(field, PropertyValue::Links(list.clone()));
        if relation.refreshes_inheritance() {
            patch = patch
                .inheritance_ref(field, None)
                .inheritance_title(field, "");
        }
        batch.enqueue(a_id, patch)?;
        self.enqueue_reciprocal_add(&mut batch, relation, a_id, &b)?;

        self.record_change(
            ChangeRecord::new(a_id, actor, ChangeType::ModifyElements)
                .property(field)
                .new_value(json!(list)),
        );

        let walk = if relation.refreshes_inheritance() {
            self.propagate_value(&mut batch, a_id, field)
        } else {
            Ok(())
        };
        self.finish_walk(batch, walk, actor)
    }

    /// Remove `b` from `a`'s relation list — from one category, or from
    /// every category when none is given. The reciprocal entry on `b`
    /// is removed only once `b` no longer appears under any category.
    /// Returns false when the user declined the confirmation.
    pub fn unlink(
        &self,
        a_id: &str,
        relation: &Relation,
        b_id: &str,
        category: Option<&str>,
        actor: &str,
    ) -> Result<bool> {
        let a = self.node(a_id)?;
        let prompt = format!("Are you sure you want to unlink this item from '{}'?", a.title);
        if !self.collaborator().confirm_destructive_action(&prompt) {
            return Ok(false);
        }
        let mut batch = self.writer();

        if relation.is_hierarchy() {
            let mut map = match relation {
                Relation::Specialization => a.specializations.clone(),
                _ => a.generalizations.clone(),
            };
            let previous = json!(map);
            remove_from(&mut map, a_id, relation.field(), b_id, category)?;

            // A node must keep at least one generalization until deleted.
            if matches!(relation, Relation::Generalization)
                && map.values().all(|list| list.is_empty())
            {
                return Err(OntologyError::WouldOrphanNode(a_id.to_string()));
            }

            let patch = match relation {
                Relation::Specialization => NodePatch::new().specializations(map.clone()),
                _ => NodePatch::new().generalizations(map.clone()),
            };
            batch.enqueue(a_id, patch)?;

            if !link_map_contains(&map, b_id) {
                self.enqueue_hierarchy_reciprocal_removal(&mut batch, relation, a_id, b_id)?;
            }
            self.record_change(
                ChangeRecord::new(a_id, actor, ChangeType::RemoveElement)
                    .property(relation.field())
                    .previous(previous)
                    .new_value(json!(map)),
            );
            batch.flush()?;
            return Ok(true);
        }

        let field = relation.field();
        let mut list = self.materialized_links(&a, field)?;
        let previous = json!(list);
        remove_from(&mut list, a_id, field, b_id, category)?;

        let mut patch = NodePatch::new().property(field, PropertyValue::Links(list.clone()));
        if relation.refreshes_inheritance() {
            patch = patch
                .inheritance_ref(field, None)
                .inheritance_title(field, "");
        }
        batch.enqueue(a_id, patch)?;

        if !link_map_contains(&list, b_id) {
            self.enqueue_value_reciprocal_removal(&mut batch, relation, a_id, b_id)?;
        }
        self.record_change(
            ChangeRecord::new(a_id, actor, ChangeType::RemoveElement)
                .property(field)
                .previous(previous)
                .new_value(json!(list)),
        );

        let walk = if relation.refreshes_inheritance() {
            self.propagate_value(&mut batch, a_id, field)
        } else {
            Ok(())
        };
        self.finish_walk(batch, walk, actor)?;
        Ok(true)
    }

    /// Mirror a freshly-added value link onto the target node.
    fn enqueue_reciprocal_add(
        &self,
        batch: &mut crate::batch::BoundedBatchWriter<'_>,
        relation: &Relation,
        a_id: &str,
        b: &crate::model::Node,
    ) -> Result<()> {
        match relation {
            Relation::Part | Relation::IsPartOf => {
                let reciprocal = relation.hierarchy_reciprocal();
                let back_field = reciprocal.field();
                let mut back = match b.properties.get(back_field) {
                    Some(PropertyValue::Links(map)) => map.clone(),
                    _ => LinkMap::new(),
                };
                if !link_map_contains(&back, a_id) {
                    back.entry(MAIN_CATEGORY.to_string())
                        .or_default()
                        .push(LinkRef::new(a_id));
                    batch.enqueue(
                        &b.id,
                        NodePatch::new().property(back_field, PropertyValue::Links(back)),
                    )?;
                }
            }
            Relation::Property(name) => {
                let mut back = b.property_of.get(name).cloned().unwrap_or_default();
                if !link_map_contains(&back, a_id) {
                    back.entry(MAIN_CATEGORY.to_string())
                        .or_default()
                        .push(LinkRef::new(a_id));
                    batch.enqueue(&b.id, NodePatch::new().property_of(name, back))?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn enqueue_hierarchy_reciprocal_removal(
        &self,
        batch: &mut crate::batch::BoundedBatchWriter<'_>,
        relation: &Relation,
        a_id: &str,
        b_id: &str,
    ) -> Result<()> {
        let b = match self.store().get(b_id) {
            Some(b) => b,
            None => {
                warn!(node = %b_id, "reciprocal endpoint missing, nothing to clean");
                return Ok(());
            }
        };
        let reciprocal = relation.hierarchy_reciprocal();
        let mut back = match reciprocal {
            Relation::Specialization => b.specializations.clone(),
            _ => b.generalizations.clone(),
        };
        if remove_link_everywhere(&mut back, a_id) {
            let patch = match reciprocal {
                Relation::Specialization => NodePatch::new().specializations(back),
                _ => NodePatch::new().generalizations(back),
            };
            batch.enqueue(b_id, patch)?;
        }
        Ok(())
    }

    fn enqueue_value_reciprocal_removal(
        &self,
        batch: &mut crate::batch::BoundedBatchWriter<'_>,
        relation: &Relation,
        a_id: &str,
        b_id: &str,
    ) -> Result<()> {
        let b = match self.store().get(b_id) {
            Some(b) => b,
            None => {
                warn!(node = %b_id, "reciprocal endpoint missing, nothing to clean");
                return Ok(());
            }
        };
        match relation {
            Relation::Part | Relation::IsPartOf => {
                let reciprocal = relation.hierarchy_reciprocal();
                let back_field = reciprocal.field();
                if let Some(PropertyValue::Links(map)) = b.properties.get(back_field) {
                    let mut back = map.clone();
                    if remove_link_everywhere(&mut back, a_id) {
                        batch.enqueue(
                            b_id,
                            NodePatch::new().property(back_field, PropertyValue::Links(back)),
                        )?;
                    }
                }
            }
            Relation::Property(name) => {
                if let Some(map) = b.property_of.get(name) {
                    let mut back = map.clone();
                    if remove_link_everywhere(&mut back, a_id) {
                        batch.enqueue(b_id, NodePatch::new().property_of(name, back))?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Remove `id` from one category or from every category of the map.
fn remove_from(
    map: &mut LinkMap,
    node: &str,
    field: &str,
    id: &str,
    category: Option<&str>,
) -> Result<()> {
    match category {
        Some(category) => {
            let list = map.get_mut(category).ok_or_else(|| {
                OntologyError::CategoryNotFound {
                    property: field.to_string(),
                    category: category.to_string(),
                }
            })?;
            let before = list.len();
            list.retain(|l| l.id != id);
            if list.len() == before {
                return Err(OntologyError::LinkNotFound {
                    node: node.to_string(),
                    property: field.to_string(),
                    id: id.to_string(),
                });
            }
            Ok(())
        }
        None => {
            if !remove_link_everywhere(map, id) {
                return Err(OntologyError::LinkNotFound {
                    node: node.to_string(),
                    property: field.to_string(),
                    id: id.to_string(),
                });
            }
            Ok(())
        }
    }
}
