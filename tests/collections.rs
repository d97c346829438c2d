//! Integration tests: collection (category) management — creation,
//! rename, delete-merge-into-main, ordered moves, and the inheritance
//! side effects of reorganizing a value list.

use std::sync::Arc;

use proptest::prelude::*;

use ontograph::{
    AutoConfirm, DocumentStore, Inheritance, InheritancePolicy, LinkMap, LinkRef, MemoryBackend,
    Node, OntologyEngine, PropertyValue, MAIN_CATEGORY,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine_with(nodes: Vec<Node>) -> (Arc<MemoryBackend>, OntologyEngine) {
    let backend = Arc::new(MemoryBackend::with_nodes(nodes));
    let engine = OntologyEngine::new(backend.clone(), Arc::new(AutoConfirm)).unwrap();
    (backend, engine)
}

fn links(ids: &[&str]) -> Vec<LinkRef> {
    ids.iter().map(|id| LinkRef::new(*id)).collect()
}

fn node_with_actor_links(categories: &[(&str, &[&str])]) -> Node {
    let mut map = LinkMap::new();
    for (category, ids) in categories {
        map.insert(category.to_string(), links(ids));
    }
    let mut node = Node::new("task", "Task");
    node.properties
        .insert("actor".into(), PropertyValue::Links(map));
    node.inheritance
        .insert("actor".into(), Inheritance::default());
    node
}

fn actor_map(engine: &OntologyEngine) -> LinkMap {
    match &engine.store().get("task").unwrap().properties["actor"] {
        PropertyValue::Links(map) => map.clone(),
        PropertyValue::Text(_) => panic!("actor should be a link list"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn add_category_rejects_duplicates_before_any_write() {
    let (backend, engine) = engine_with(vec![node_with_actor_links(&[("crew", &["a"])])]);

    engine.add_category("task", "actor", "guests", "editor").unwrap();
    let commits = backend.commit_count();

    let err = engine
        .add_category("task", "actor", "crew", "editor")
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_COLLECTION");
    assert_eq!(backend.commit_count(), commits);
}

#[test]
fn rename_preserves_member_order() {
    let (_, engine) = engine_with(vec![node_with_actor_links(&[("crew", &["c", "a", "b"])])]);

    engine
        .rename_category("task", "actor", "crew", "staff", "editor")
        .unwrap();

    let map = actor_map(&engine);
    assert!(!map.contains_key("crew"));
    assert_eq!(map["staff"], links(&["c", "a", "b"]));
}

#[test]
fn rename_onto_existing_name_fails() {
    let (_, engine) = engine_with(vec![node_with_actor_links(&[
        ("crew", &["a"]),
        ("staff", &["b"]),
    ])]);

    let err = engine
        .rename_category("task", "actor", "crew", "staff", "editor")
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_COLLECTION");
}

#[test]
fn delete_merges_members_onto_main() {
    let (_, engine) = engine_with(vec![node_with_actor_links(&[
        (MAIN_CATEGORY, &["m1", "m2"]),
        ("crew", &["c1", "c2", "c3"]),
    ])]);

    assert!(engine
        .delete_category("task", "actor", "crew", "editor")
        .unwrap());

    let map = actor_map(&engine);
    assert!(!map.contains_key("crew"));
    assert_eq!(map[MAIN_CATEGORY], links(&["m1", "m2", "c1", "c2", "c3"]));
}

#[test]
fn main_category_is_reserved() {
    let (_, engine) = engine_with(vec![node_with_actor_links(&[(MAIN_CATEGORY, &["a"])])]);

    let err = engine
        .delete_category("task", "actor", MAIN_CATEGORY, "editor")
        .unwrap_err();
    assert_eq!(err.code(), "RESERVED_COLLECTION");

    let err = engine
        .rename_category("task", "actor", MAIN_CATEGORY, "other", "editor")
        .unwrap_err();
    assert_eq!(err.code(), "RESERVED_COLLECTION");
}

#[test]
fn move_item_relocates_at_index() {
    let (_, engine) = engine_with(vec![node_with_actor_links(&[
        (MAIN_CATEGORY, &["m1", "m2"]),
        ("crew", &["c1", "c2"]),
    ])]);

    engine
        .move_item("task", "actor", "c2", "crew", MAIN_CATEGORY, 1, "editor")
        .unwrap();

    let map = actor_map(&engine);
    assert_eq!(map["crew"], links(&["c1"]));
    assert_eq!(map[MAIN_CATEGORY], links(&["m1", "c2", "m2"]));
}

#[test]
fn move_item_reports_missing_member() {
    let (_, engine) = engine_with(vec![node_with_actor_links(&[(MAIN_CATEGORY, &["m1"])])]);

    let err = engine
        .move_item("task", "actor", "ghost", MAIN_CATEGORY, MAIN_CATEGORY, 0, "editor")
        .unwrap_err();
    assert_eq!(err.code(), "LINK_NOT_FOUND");
}

#[test]
fn reorganizing_value_list_clears_inheritance_ref() {
    let mut node = node_with_actor_links(&[(MAIN_CATEGORY, &["m1"])]);
    node.inheritance.insert(
        "actor".into(),
        Inheritance {
            reference: Some("template".into()),
            policy: InheritancePolicy::InheritUnlessOverridden,
            title: "Template".into(),
        },
    );
    let template = Node::new("template", "Template");

    let (_, engine) = engine_with(vec![node, template]);
    engine.add_category("task", "actor", "crew", "editor").unwrap();

    let record = &engine.store().get("task").unwrap().inheritance["actor"];
    assert_eq!(record.reference, None);
    assert_eq!(record.title, "");
}

#[test]
fn hierarchy_category_ops_leave_inheritance_alone() {
    let mut root = Node::new("root", "Root");
    root.specializations
        .insert(MAIN_CATEGORY.into(), links(&["a"]));
    root.inheritance
        .insert("notes".into(), Inheritance::default());
    let mut a = Node::new("a", "A");
    a.generalizations
        .insert(MAIN_CATEGORY.into(), links(&["root"]));

    let (_, engine) = engine_with(vec![root, a]);
    engine
        .add_category("root", "specializations", "variants", "editor")
        .unwrap();

    let root = engine.store().get("root").unwrap();
    assert!(root.specializations.contains_key("variants"));
    // reorganizing the hierarchy is not a property edit
    assert_eq!(root.inheritance["notes"], Inheritance::default());
}

#[test]
fn category_ops_append_audit_entries() {
    let (backend, engine) = engine_with(vec![node_with_actor_links(&[(MAIN_CATEGORY, &["a"])])]);

    engine.add_category("task", "actor", "crew", "editor").unwrap();
    engine
        .rename_category("task", "actor", "crew", "staff", "editor")
        .unwrap();
    engine
        .delete_category("task", "actor", "staff", "editor")
        .unwrap();

    let kinds: Vec<String> = backend
        .changes()
        .unwrap()
        .iter()
        .map(|c| serde_json::to_string(&c.change_type).unwrap())
        .collect();
    assert_eq!(
        kinds,
        [
            "\"add collection\"",
            "\"edit collection\"",
            "\"delete collection\""
        ]
    );
}

// ---------------------------------------------------------------------------
// Property: merge safety
// ---------------------------------------------------------------------------

proptest! {
    /// Deleting a category moves every member onto main: no member
    /// lost, none duplicated.
    #[test]
    fn prop_delete_category_merge_safety(
        main_size in 0usize..12,
        doomed_size in 0usize..12,
    ) {
        let main_ids: Vec<String> = (0..main_size).map(|i| format!("m{i}")).collect();
        let doomed_ids: Vec<String> = (0..doomed_size).map(|i| format!("d{i}")).collect();

        let mut map = LinkMap::new();
        map.insert(
            MAIN_CATEGORY.to_string(),
            main_ids.iter().map(|id| LinkRef::new(id.clone())).collect(),
        );
        map.insert(
            "doomed".to_string(),
            doomed_ids.iter().map(|id| LinkRef::new(id.clone())).collect(),
        );
        let mut node = Node::new("task", "Task");
        node.properties.insert("actor".into(), PropertyValue::Links(map));
        node.inheritance.insert("actor".into(), Inheritance::default());

        let (_, engine) = engine_with(vec![node]);
        engine.delete_category("task", "actor", "doomed", "editor").unwrap();

        let map = actor_map(&engine);
        prop_assert!(!map.contains_key("doomed"));
        prop_assert_eq!(map[MAIN_CATEGORY].len(), main_size + doomed_size);

        let expected: Vec<LinkRef> = main_ids
            .iter()
            .chain(doomed_ids.iter())
            .map(|id| LinkRef::new(id.clone()))
            .collect();
        prop_assert_eq!(&map[MAIN_CATEGORY], &expected);
    }
}
