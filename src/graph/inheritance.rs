//! Inheritance propagation over the specialization DAG.
//!
//! Value propagation pushes an override point's value down to every
//! descendant still inheriting it; policy propagation rewrites the
//! inheritance policy itself, unconditionally. Both walks carry an
//! explicit visited set keyed by node id — the specialization relation
//! is a DAG, not a tree, so the same node can be reached along multiple
//! paths and a malformed graph can contain cycles.
//!
//! A failure inside one descendant's subtree is logged and does not
//! unwind writes already enqueued for siblings: partial propagation is
//! a tolerated outcome, surfaced to the user as retryable.

use std::collections::HashSet;

use serde_json::json;
use tracing::{debug, warn};

use crate::batch::BoundedBatchWriter;
use crate::engine::OntologyEngine;
use crate::error::{OntologyError, Result};
use crate::model::{
    ChangeRecord, ChangeType, Inheritance, InheritancePolicy, LinkMap, Node, NodeId,
    PropertyValue, MAIN_CATEGORY,
};
use crate::patch::NodePatch;

/// Book-keeping shared by one propagation walk.
struct Walk {
    visited: HashSet<NodeId>,
    on_stack: HashSet<NodeId>,
}

impl Walk {
    fn starting_at(origin: &str) -> Self {
        let mut visited = HashSet::new();
        visited.insert(origin.to_string());
        let mut on_stack = HashSet::new();
        on_stack.insert(origin.to_string());
        Self { visited, on_stack }
    }

    /// True when the child should be descended into. A node still on
    /// the recursion stack is a cycle: warn and truncate. A node seen
    /// through another DAG path was already handled: skip silently.
    fn admit(&mut self, child: &str) -> bool {
        if self.on_stack.contains(child) {
            warn!(
                error = %OntologyError::CycleDetected(child.to_string()),
                "data-integrity warning, truncating walk"
            );
            return false;
        }
        self.visited.insert(child.to_string())
    }
}

impl OntologyEngine {
    /// Resolve the value a node currently presents for `property`:
    /// the local value, or the referenced ancestor's when inheriting.
    /// A dangling reference degrades to the local value.
    pub fn effective_value(&self, id: &str, property: &str) -> Result<Option<PropertyValue>> {
        let node = self.node(id)?;
        if let Some(reference) = node
            .inheritance
            .get(property)
            .and_then(|inh| inh.reference.as_deref())
        {
            match self.store().get(reference) {
                Some(ancestor) => return Ok(ancestor.properties.get(property).cloned()),
                None => warn!(
                    error = %OntologyError::DanglingReference {
                        from: id.to_string(),
                        to: reference.to_string(),
                    },
                    "inheriting nothing"
                ),
            }
        }
        Ok(node.properties.get(property).cloned())
    }

    /// Set a text property, making the node an override point, and
    /// propagate the new value to inheriting descendants.
    pub fn update_text_property(
        &self,
        id: &str,
        property: &str,
        value: &str,
        actor: &str,
    ) -> Result<()> {
        let node = self.node(id)?;
        let previous = node.properties.get(property).cloned();
        let new_value = PropertyValue::Text(value.to_string());
        if previous.as_ref() == Some(&new_value) {
            return Ok(());
        }

        let mut patch = NodePatch::new().property(property, new_value.clone());
        if node.inheritance.contains_key(property) {
            patch = patch
                .inheritance_ref(property, None)
                .inheritance_title(property, "");
        }

        let mut batch = self.writer();
        batch.enqueue(id, patch)?;
        self.record_change(
            ChangeRecord::new(id, actor, ChangeType::ChangeText)
                .property(property)
                .previous(json!(previous))
                .new_value(json!(new_value)),
        );

        let walk = self.propagate_value(&mut batch, id, property);
        self.finish_walk(batch, walk, actor)
    }

    /// Re-derive descendants after anything changed the node's
    /// `property`: self-heal a dangling inheritance reference, then
    /// re-run value propagation from here.
    pub fn refresh_inheritance(&self, id: &str, property: &str) -> Result<()> {
        let node = self.node(id)?;
        let mut batch = self.writer();

        if let Some(reference) = node
            .inheritance
            .get(property)
            .and_then(|inh| inh.reference.as_deref())
        {
            if !self.store().contains(reference) {
                warn!(
                    error = %OntologyError::DanglingReference {
                        from: id.to_string(),
                        to: reference.to_string(),
                    },
                    "clearing stale inheritance reference"
                );
                batch.enqueue(
                    id,
                    NodePatch::new()
                        .inheritance_ref(property, None)
                        .inheritance_title(property, ""),
                )?;
            }
        }

        let walk = self.propagate_value(&mut batch, id, property);
        self.finish_walk(batch, walk, "system")
    }

    /// Change the inheritance policy of `property` on this node and
    /// rewrite it on every reachable descendant. Policy propagation is
    /// authoritative: it does not honor override short-circuits.
    pub fn propagate_policy(
        &self,
        id: &str,
        property: &str,
        policy: InheritancePolicy,
        actor: &str,
    ) -> Result<()> {
        let node = self.node(id)?;
        let current = node.inheritance.get(property).ok_or_else(|| {
            OntologyError::PropertyNotFound {
                node: id.to_string(),
                property: property.to_string(),
            }
        })?;

        let mut batch = self.writer();
        if current.policy != policy {
            batch.enqueue(id, NodePatch::new().inheritance_policy(property, policy))?;
        }
        self.collaborator().record_audit_entry(json!({
            "action": "changed inheritance policy",
            "node": id,
            "property": property,
            "policy": policy,
            "modifiedBy": actor,
        }));

        let mut walk = Walk::starting_at(id);
        let result = self.walk_policy(&mut batch, &node, property, policy, &mut walk);
        self.finish_walk(batch, result, actor)
    }

    /// Retitle a node and rewrite the cached ancestor title on every
    /// descendant record that references it.
    pub fn update_title(&self, id: &str, new_title: &str, actor: &str) -> Result<()> {
        let node = self.node(id)?;
        if node.title == new_title {
            return Ok(());
        }
        if self
            .store()
            .all()
            .iter()
            .any(|n| n.id != id && n.title == new_title)
        {
            return Err(OntologyError::DuplicateTitle(new_title.to_string()));
        }

        let mut batch = self.writer();
        batch.enqueue(id, NodePatch::new().title(new_title))?;
        self.record_change(
            ChangeRecord::new(id, actor, ChangeType::ChangeText)
                .property("title")
                .previous(json!(node.title))
                .new_value(json!(new_title)),
        );

        let mut retitled = node;
        retitled.title = new_title.to_string();
        let mut walk = Walk::starting_at(id);
        let result = self.walk_title(&mut batch, &retitled, &mut walk);
        self.finish_walk(batch, result, actor)
    }

    /// Declare a new property on a node and seed it down the whole
    /// specialization subtree as inheritable.
    pub fn add_property(&self, id: &str, name: &str, kind: &str, actor: &str) -> Result<()> {
        let node = self.node(id)?;
        if node.properties.contains_key(name) {
            return Err(OntologyError::DuplicateProperty(name.to_string()));
        }

        let kind = kind.to_lowercase();
        let value = if kind == "string" {
            PropertyValue::Text(String::new())
        } else {
            PropertyValue::empty_links()
        };

        let mut batch = self.writer();
        batch.enqueue(
            id,
            NodePatch::new()
                .property(name, value.clone())
                .property_type(name, kind.clone())
                .inheritance_ref(name, None)
                .inheritance_policy(name, InheritancePolicy::InheritUnlessOverridden),
        )?;
        self.collaborator().record_audit_entry(json!({
            "action": "added property",
            "node": id,
            "property": name,
            "propertyType": kind,
            "modifiedBy": actor,
        }));

        let mut walk = Walk::starting_at(id);
        let result = self.walk_new_property(&mut batch, &node, name, &kind, &value, &mut walk);
        self.finish_walk(batch, result, actor)
    }

    /// Remove a property, its type tag and its inheritance record from
    /// this node. Descendant copies are left in place.
    pub fn remove_property(&self, id: &str, name: &str, actor: &str) -> Result<bool> {
        let node = self.node(id)?;
        if !node.properties.contains_key(name) {
            return Err(OntologyError::PropertyNotFound {
                node: id.to_string(),
                property: name.to_string(),
            });
        }
        let prompt = format!("Are you sure you want to delete the property '{name}'?");
        if !self.collaborator().confirm_destructive_action(&prompt) {
            return Ok(false);
        }

        let mut batch = self.writer();
        batch.enqueue(id, NodePatch::new().remove_property(name))?;
        batch.flush()?;
        self.collaborator().record_audit_entry(json!({
            "action": "removed property",
            "node": id,
            "property": name,
            "modifiedBy": actor,
        }));
        Ok(true)
    }

    /// Push the origin's current value of `property` down the DAG.
    pub(crate) fn propagate_value(
        &self,
        batch: &mut BoundedBatchWriter<'_>,
        origin: &str,
        property: &str,
    ) -> Result<()> {
        let node = self.node(origin)?;
        let value = match node.properties.get(property) {
            Some(v) => v.clone(),
            None => {
                debug!(node = %origin, property, "no local value, nothing to propagate");
                return Ok(());
            }
        };
        let mut walk = Walk::starting_at(origin);
        self.walk_value(batch, &node, property, &value, &mut walk)
    }

    /// Returns the link map `property` presents on `node`, deep-copying
    /// the referenced ancestor's list when the node still inherits it.
    /// Editing an inherited list must start from this materialized
    /// copy.
    pub(crate) fn materialized_links(&self, node: &Node, property: &str) -> Result<LinkMap> {
        if let Some(reference) = node
            .inheritance
            .get(property)
            .and_then(|inh| inh.reference.as_deref())
        {
            match self.store().get(reference) {
                Some(ancestor) => {
                    if let Some(PropertyValue::Links(map)) = ancestor.properties.get(property) {
                        return Ok(map.clone());
                    }
                }
                None => warn!(
                    error = %OntologyError::DanglingReference {
                        from: node.id.clone(),
                        to: reference.to_string(),
                    },
                    "materializing local list instead"
                ),
            }
        }
        match node.properties.get(property) {
            Some(PropertyValue::Links(map)) => Ok(map.clone()),
            Some(PropertyValue::Text(_)) => Err(OntologyError::PropertyKindMismatch {
                node: node.id.clone(),
                property: property.to_string(),
            }),
            None => {
                let mut map = LinkMap::new();
                map.insert(MAIN_CATEGORY.to_string(), Vec::new());
                Ok(map)
            }
        }
    }

    // ── Walks ──────────────────────────────────────────────────────

    fn walk_value(
        &self,
        batch: &mut BoundedBatchWriter<'_>,
        source: &Node,
        property: &str,
        value: &PropertyValue,
        walk: &mut Walk,
    ) -> Result<()> {
        let mut first_err = None;
        for child_id in source.specialization_ids() {
            if !walk.admit(&child_id) {
                continue;
            }
            if let Err(e) = self.visit_value(batch, source, &child_id, property, value, walk) {
                warn!(node = %child_id, error = %e, "subtree propagation failed, continuing");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn visit_value(
        &self,
        batch: &mut BoundedBatchWriter<'_>,
        source: &Node,
        child_id: &str,
        property: &str,
        value: &PropertyValue,
        walk: &mut Walk,
    ) -> Result<()> {
        let child = match self.store().get(child_id) {
            Some(c) => c,
            None => {
                warn!(
                    error = %OntologyError::DanglingReference {
                        from: source.id.clone(),
                        to: child_id.to_string(),
                    },
                    "skipping missing specialization"
                );
                return Ok(());
            }
        };
        let inh = match child.inheritance.get(property) {
            Some(inh) => inh,
            None => {
                debug!(node = %child_id, property, "property not declared, branch stops");
                return Ok(());
            }
        };

        let inherits = match inh.policy {
            // Permanently diverged: leave this node and its subtree alone.
            InheritancePolicy::NeverInherit => false,
            InheritancePolicy::AlwaysInherit => true,
            // Inheriting iff the reference still points at the current source.
            InheritancePolicy::InheritUnlessOverridden => {
                inh.reference.as_deref() == Some(source.id.as_str())
            }
        };
        if !inherits {
            return Ok(());
        }

        let mut patch = NodePatch::new();
        if child.properties.get(property) != Some(value) {
            patch = patch.property(property, value.clone());
        }
        if inh.reference.as_deref() != Some(source.id.as_str()) {
            patch = patch.inheritance_ref(property, Some(source.id.clone()));
        }
        if inh.title != source.title {
            patch = patch.inheritance_title(property, source.title.clone());
        }
        batch.enqueue(child_id, patch)?;

        // The child becomes the propagation source for its own subtree,
        // still forwarding the ORIGINAL value, not its own.
        walk.on_stack.insert(child_id.to_string());
        let result = self.walk_value(batch, &child, property, value, walk);
        walk.on_stack.remove(child_id);
        result
    }

    fn walk_policy(
        &self,
        batch: &mut BoundedBatchWriter<'_>,
        source: &Node,
        property: &str,
        policy: InheritancePolicy,
        walk: &mut Walk,
    ) -> Result<()> {
        let mut first_err = None;
        for child_id in source.specialization_ids() {
            if !walk.admit(&child_id) {
                continue;
            }
            if let Err(e) = self.visit_policy(batch, source, &child_id, property, policy, walk) {
                warn!(node = %child_id, error = %e, "subtree policy rewrite failed, continuing");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn visit_policy(
        &self,
        batch: &mut BoundedBatchWriter<'_>,
        source: &Node,
        child_id: &str,
        property: &str,
        policy: InheritancePolicy,
        walk: &mut Walk,
    ) -> Result<()> {
        let child = match self.store().get(child_id) {
            Some(c) => c,
            None => {
                warn!(
                    error = %OntologyError::DanglingReference {
                        from: source.id.clone(),
                        to: child_id.to_string(),
                    },
                    "skipping missing specialization"
                );
                return Ok(());
            }
        };
        let current = child.inheritance.get(property).cloned().unwrap_or_default();

        let mut patch = NodePatch::new();
        if current.policy != policy {
            patch = patch.inheritance_policy(property, policy);
        }
        match policy {
            InheritancePolicy::NeverInherit => {
                // Materialize the referenced value before detaching.
                if let Some(reference) = &current.reference {
                    match self.store().get(reference) {
                        Some(ancestor) => {
                            if let Some(value) = ancestor.properties.get(property) {
                                if child.properties.get(property) != Some(value) {
                                    patch = patch.property(property, value.clone());
                                }
                            }
                        }
                        None => warn!(
                            error = %OntologyError::DanglingReference {
                                from: child_id.to_string(),
                                to: reference.clone(),
                            },
                            "detaching without a value to materialize"
                        ),
                    }
                    patch = patch.inheritance_ref(property, None);
                }
                if !current.title.is_empty() {
                    patch = patch.inheritance_title(property, "");
                }
            }
            _ => {
                // Re-point at the walk source so future value
                // propagation resumes from it.
                if current.reference.as_deref() != Some(source.id.as_str()) {
                    patch = patch.inheritance_ref(property, Some(source.id.clone()));
                }
                if current.title != source.title {
                    patch = patch.inheritance_title(property, source.title.clone());
                }
            }
        }
        batch.enqueue(child_id, patch)?;

        walk.on_stack.insert(child_id.to_string());
        let result = self.walk_policy(batch, &child, property, policy, walk);
        walk.on_stack.remove(child_id);
        result
    }

    fn walk_title(
        &self,
        batch: &mut BoundedBatchWriter<'_>,
        source: &Node,
        walk: &mut Walk,
    ) -> Result<()> {
        let mut first_err = None;
        for child_id in source.specialization_ids() {
            if !walk.admit(&child_id) {
                continue;
            }
            let child = match self.store().get(&child_id) {
                Some(c) => c,
                None => continue,
            };

            let mut patch = NodePatch::new();
            for (name, record) in &child.inheritance {
                if record.reference.as_deref() == Some(source.id.as_str())
                    && record.title != source.title
                {
                    patch = patch.inheritance_title(name, source.title.clone());
                }
            }
            if let Err(e) = batch.enqueue(&child_id, patch) {
                first_err.get_or_insert(e);
                continue;
            }

            walk.on_stack.insert(child_id.clone());
            if let Err(e) = self.walk_title(batch, &child, walk) {
                first_err.get_or_insert(e);
            }
            walk.on_stack.remove(&child_id);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn walk_new_property(
        &self,
        batch: &mut BoundedBatchWriter<'_>,
        source: &Node,
        name: &str,
        kind: &str,
        value: &PropertyValue,
        walk: &mut Walk,
    ) -> Result<()> {
        let mut first_err = None;
        for child_id in source.specialization_ids() {
            if !walk.admit(&child_id) {
                continue;
            }
            let child = match self.store().get(&child_id) {
                Some(c) => c,
                None => continue,
            };

            let expected = Inheritance {
                reference: Some(source.id.clone()),
                policy: InheritancePolicy::InheritUnlessOverridden,
                title: source.title.clone(),
            };
            let mut patch = NodePatch::new();
            if child.properties.get(name) != Some(value) {
                patch = patch.property(name, value.clone());
            }
            if child.property_type.get(name).map(String::as_str) != Some(kind) {
                patch = patch.property_type(name, kind);
            }
            if child.inheritance.get(name) != Some(&expected) {
                patch = patch
                    .inheritance_ref(name, expected.reference.clone())
                    .inheritance_policy(name, expected.policy)
                    .inheritance_title(name, expected.title.clone());
            }
            if let Err(e) = batch.enqueue(&child_id, patch) {
                first_err.get_or_insert(e);
                continue;
            }

            walk.on_stack.insert(child_id.clone());
            if let Err(e) = self.walk_new_property(batch, &child, name, kind, value, walk) {
                first_err.get_or_insert(e);
            }
            walk.on_stack.remove(&child_id);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
