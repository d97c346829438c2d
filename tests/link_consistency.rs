//! Integration tests: reciprocal link maintenance — symmetric closure,
//! last-reference-wins removal, orphan guards, audit records.

use std::sync::Arc;
use std::sync::Mutex;

use ontograph::{
    AutoConfirm, ChangeType, Collaborator, DocumentStore, Inheritance, InheritancePolicy, LinkRef,
    MemoryBackend, Node, OntologyEngine, PropertyValue, Relation,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine_with(nodes: Vec<Node>) -> (Arc<MemoryBackend>, OntologyEngine) {
    let backend = Arc::new(MemoryBackend::with_nodes(nodes));
    let engine = OntologyEngine::new(backend.clone(), Arc::new(AutoConfirm)).unwrap();
    (backend, engine)
}

fn specialized(parent: &str, children: &[&str]) -> Vec<Node> {
    let mut parent_node = Node::new(parent, parent);
    let mut out = Vec::new();
    for child in children {
        let mut child_node = Node::new(*child, *child);
        parent_node
            .specializations
            .entry("main".into())
            .or_default()
            .push(LinkRef::new(*child));
        child_node
            .generalizations
            .entry("main".into())
            .or_default()
            .push(LinkRef::new(parent));
        out.push(child_node);
    }
    out.insert(0, parent_node);
    out
}

/// Collaborator that refuses every destructive action.
struct DeclineAll;

impl Collaborator for DeclineAll {
    fn confirm_destructive_action(&self, _prompt: &str) -> bool {
        false
    }
    fn record_audit_entry(&self, _entry: serde_json::Value) {}
    fn notify_users(&self, _title: &str, _body: &str, _audience: &str) {}
}

/// Collaborator capturing notifications.
#[derive(Default)]
struct CaptureNotifications {
    notified: Mutex<Vec<String>>,
}

impl Collaborator for CaptureNotifications {
    fn confirm_destructive_action(&self, _prompt: &str) -> bool {
        true
    }
    fn record_audit_entry(&self, _entry: serde_json::Value) {}
    fn notify_users(&self, title: &str, _body: &str, _audience: &str) {
        self.notified.lock().unwrap().push(title.to_string());
    }
}

// ---------------------------------------------------------------------------
// Hierarchy links
// ---------------------------------------------------------------------------

#[test]
fn linking_specialization_mirrors_generalization() {
    let (_, engine) = engine_with(vec![Node::new("root", "Root"), Node::new("a", "A")]);
    engine
        .link("root", &Relation::Specialization, "a", "main", "editor")
        .unwrap();

    let root = engine.store().get("root").unwrap();
    assert_eq!(root.specializations["main"], vec![LinkRef::new("a")]);
    let a = engine.store().get("a").unwrap();
    assert_eq!(a.generalizations["main"], vec![LinkRef::new("root")]);
}

#[test]
fn relinking_same_target_is_a_noop() {
    let (backend, engine) = engine_with(specialized("root", &["a"]));
    let commits = backend.commit_count();

    engine
        .link("root", &Relation::Specialization, "a", "extra", "editor")
        .unwrap();
    // a already appears under main — nothing written
    assert_eq!(backend.commit_count(), commits);
}

#[test]
fn last_reference_wins_across_categories() {
    let mut nodes = specialized("root", &["a"]);
    nodes[0]
        .specializations
        .entry("alt".into())
        .or_default()
        .push(LinkRef::new("a"));
    let (_, engine) = engine_with(nodes);

    // removing from main keeps the reciprocal: a is still linked under alt
    engine
        .unlink("root", &Relation::Specialization, "a", Some("main"), "editor")
        .unwrap();
    let a = engine.store().get("a").unwrap();
    assert_eq!(a.generalizations["main"], vec![LinkRef::new("root")]);

    // removing the last occurrence strips the reciprocal too
    engine
        .unlink("root", &Relation::Specialization, "a", Some("alt"), "editor")
        .unwrap();
    let a = engine.store().get("a").unwrap();
    assert!(a.generalizations.values().all(|list| list.is_empty()));
}

#[test]
fn unlink_without_category_removes_every_occurrence() {
    let mut nodes = specialized("root", &["a"]);
    nodes[0]
        .specializations
        .entry("alt".into())
        .or_default()
        .push(LinkRef::new("a"));
    let (_, engine) = engine_with(nodes);

    engine
        .unlink("root", &Relation::Specialization, "a", None, "editor")
        .unwrap();

    let root = engine.store().get("root").unwrap();
    assert!(root.specializations.values().all(|list| list.is_empty()));
    let a = engine.store().get("a").unwrap();
    assert!(a.generalizations.values().all(|list| list.is_empty()));
}

#[test]
fn removing_last_generalization_is_refused() {
    let (_, engine) = engine_with(specialized("root", &["a"]));
    let err = engine
        .unlink("a", &Relation::Generalization, "root", None, "editor")
        .unwrap_err();
    assert_eq!(err.code(), "WOULD_ORPHAN_NODE");

    // the reciprocal entry survives the refused removal
    let root = engine.store().get("root").unwrap();
    assert_eq!(root.specializations["main"], vec![LinkRef::new("a")]);
}

#[test]
fn declined_confirmation_aborts_before_any_write() {
    let backend = Arc::new(MemoryBackend::with_nodes(specialized("root", &["a"])));
    let engine = OntologyEngine::new(backend.clone(), Arc::new(DeclineAll)).unwrap();

    let removed = engine
        .unlink("root", &Relation::Specialization, "a", None, "editor")
        .unwrap();
    assert!(!removed);
    assert_eq!(backend.commit_count(), 0);
    assert_eq!(
        engine.store().get("root").unwrap().specializations["main"],
        vec![LinkRef::new("a")]
    );
}

// ---------------------------------------------------------------------------
// Parts / isPartOf
// ---------------------------------------------------------------------------

#[test]
fn parts_and_is_part_of_stay_symmetric() {
    let (_, engine) = engine_with(vec![Node::new("engine", "Engine"), Node::new("car", "Car")]);

    engine
        .link("car", &Relation::Part, "engine", "main", "editor")
        .unwrap();
    let car = engine.store().get("car").unwrap();
    let engine_node = engine.store().get("engine").unwrap();
    assert!(matches!(
        &car.properties["parts"],
        PropertyValue::Links(map) if map["main"] == vec![LinkRef::new("engine")]
    ));
    assert!(matches!(
        &engine_node.properties["isPartOf"],
        PropertyValue::Links(map) if map["main"] == vec![LinkRef::new("car")]
    ));

    engine
        .unlink("car", &Relation::Part, "engine", None, "editor")
        .unwrap();
    let engine_node = engine.store().get("engine").unwrap();
    assert!(matches!(
        &engine_node.properties["isPartOf"],
        PropertyValue::Links(map) if map.values().all(|l| l.is_empty())
    ));
}

// ---------------------------------------------------------------------------
// Property links / propertyOf
// ---------------------------------------------------------------------------

#[test]
fn property_link_mirrors_property_of_and_clears_inheritance() {
    let mut a = Node::new("task", "Task");
    a.inheritance.insert(
        "actor".into(),
        Inheritance {
            reference: Some("template".into()),
            policy: InheritancePolicy::InheritUnlessOverridden,
            title: "Template".into(),
        },
    );
    let (_, engine) = engine_with(vec![a, Node::new("alice", "Alice")]);

    engine
        .link("task", &Relation::Property("actor".into()), "alice", "main", "editor")
        .unwrap();

    let task = engine.store().get("task").unwrap();
    assert!(matches!(
        &task.properties["actor"],
        PropertyValue::Links(map) if map["main"] == vec![LinkRef::new("alice")]
    ));
    // a locally edited list is no longer an inherited mirror
    assert_eq!(task.inheritance["actor"].reference, None);

    let alice = engine.store().get("alice").unwrap();
    assert_eq!(alice.property_of["actor"]["main"], vec![LinkRef::new("task")]);
}

#[test]
fn unlinking_property_link_cleans_back_reference() {
    let mut task = Node::new("task", "Task");
    let mut map = ontograph::LinkMap::new();
    map.insert("main".into(), vec![LinkRef::new("alice")]);
    task.properties
        .insert("actor".into(), PropertyValue::Links(map));
    let mut alice = Node::new("alice", "Alice");
    let mut back = ontograph::LinkMap::new();
    back.insert("main".into(), vec![LinkRef::new("task")]);
    alice.property_of.insert("actor".into(), back);

    let (_, engine) = engine_with(vec![task, alice]);
    engine
        .unlink("task", &Relation::Property("actor".into()), "alice", None, "editor")
        .unwrap();

    let alice = engine.store().get("alice").unwrap();
    assert!(alice.property_of["actor"].values().all(|l| l.is_empty()));
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[test]
fn unlink_appends_change_record() {
    let (backend, engine) = engine_with(specialized("root", &["a"]));
    engine
        .unlink("root", &Relation::Specialization, "a", None, "editor")
        .unwrap();

    let changes = backend.changes().unwrap();
    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change.change_type, ChangeType::RemoveElement);
    assert_eq!(change.node_id, "root");
    assert_eq!(change.modified_by, "editor");
    assert_eq!(change.modified_property.as_deref(), Some("specializations"));
    assert_ne!(change.previous_value, change.new_value);
}

#[test]
fn double_commit_failure_notifies_user_and_keeps_partial_state() {
    let mut nodes = specialized("root", &["a"]);
    for node in &mut nodes {
        node.properties
            .insert("notes".into(), PropertyValue::Text("".into()));
        node.inheritance.insert(
            "notes".into(),
            Inheritance {
                reference: (node.id != "root").then(|| "root".to_string()),
                policy: InheritancePolicy::InheritUnlessOverridden,
                title: String::new(),
            },
        );
    }
    let backend = Arc::new(MemoryBackend::with_nodes(nodes));
    let collaborator = Arc::new(CaptureNotifications::default());
    let engine = OntologyEngine::new(backend.clone(), collaborator.clone()).unwrap();

    backend.fail_next_commits(2);
    let err = engine
        .update_text_property("root", "notes", "x", "editor")
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
        collaborator.notified.lock().unwrap().as_slice(),
        ["Update incomplete"]
    );
    // the view already reflects the edit — partial state is tolerated
    assert_eq!(
        engine.store().get("a").unwrap().properties["notes"],
        PropertyValue::Text("x".into())
    );
}
