use rustc_hash::{FxHashMap, FxHashSet};
use xforms_controls::{
    ClientUpdate, ControlDescriptor, ControlKind, ControlScope, ControlTree, ControlsDiffer, RepeatIndexes,
    StaticState, SwitchState, TextSource, TreeBuilder, adjust_indexes, adjust_indexes_after_insert,
    adjust_indexes_for_delete,
};
use xforms_dom::{InstanceKey, MipView, NodeRef, XmlTree};
use xforms_xpath::{BindingContext, BindingScope, DocumentView, SimpleEvaluator, XPathEvaluator};

const KEY: InstanceKey = InstanceKey::new(0, 0);

/// A single-instance document with some nodes marked non-relevant.
struct Form {
    tree: XmlTree,
    evaluator: SimpleEvaluator,
    hidden: Vec<NodeRef>,
}

impl Form {
    fn new(xml: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            tree: XmlTree::parse(xml).unwrap(),
            evaluator: SimpleEvaluator::new(),
            hidden: Vec::new(),
        }
    }

    fn lines(&self) -> Vec<NodeRef> {
        let root = self.tree.document_element().unwrap();
        self.tree
            .element_children(root)
            .into_iter()
            .filter(|node| self.tree.name(*node) == Some("line"))
            .map(|node| NodeRef::new(KEY, node))
            .collect()
    }

    fn build(&self, state: &StaticState, switches: &mut SwitchState) -> ControlTree {
        let dialogs = FxHashMap::default();
        let base = BindingContext::for_model("main", self.model_root("main"));
        TreeBuilder::new(self, switches, &dialogs).build(state, base).unwrap()
    }
}

impl DocumentView for Form {
    fn tree(&self, instance: InstanceKey) -> Option<&XmlTree> {
        (instance == KEY).then_some(&self.tree)
    }

    fn instance_root(&self, _model: Option<&str>, _id: Option<&str>) -> Option<NodeRef> {
        self.tree.document_element().map(|node| NodeRef::new(KEY, node))
    }

    fn repeat_index(&self, _repeat_id: &str) -> Option<usize> {
        None
    }
}

impl BindingScope for Form {
    fn view(&self) -> &dyn DocumentView {
        self
    }

    fn evaluator(&self) -> &dyn XPathEvaluator {
        &self.evaluator
    }

    fn lenient(&self) -> bool {
        true
    }

    fn default_model(&self) -> Option<&str> {
        Some("main")
    }

    fn model_root(&self, _model: &str) -> Option<NodeRef> {
        self.instance_root(None, None)
    }

    fn bind_nodes(&self, _bind_id: &str) -> Option<(String, Vec<NodeRef>)> {
        None
    }
}

impl ControlScope for Form {
    fn mips(&self, node: NodeRef) -> MipView {
        MipView {
            relevant: !self.hidden.contains(&node),
            ..MipView::default()
        }
    }
}

fn order(lines: usize) -> String {
    let mut xml = String::from("<order><note>rush</note>");
    for line in 1..=lines {
        xml.push_str(&format!("<line><qty>{line}</qty></line>"));
    }
    xml.push_str("</order>");
    xml
}

fn controls() -> StaticState {
    StaticState::new(vec![
        ControlDescriptor::new(ControlKind::Repeat, "lines").bound("line").child(
            ControlDescriptor::new(ControlKind::Input, "qty")
                .bound("qty")
                .label(TextSource::Literal("Quantity".to_owned())),
        ),
        ControlDescriptor::new(ControlKind::Switch, "tabs")
            .child(ControlDescriptor::new(ControlKind::Case, "view"))
            .child(
                ControlDescriptor::new(ControlKind::Case, "edit")
                    .child(ControlDescriptor::new(ControlKind::Input, "note").bound("note")),
            ),
    ])
}

fn diff(before: Option<&ControlTree>, after: &ControlTree) -> Vec<ClientUpdate> {
    let mut updates = Vec::new();
    let value_changed = FxHashSet::default();
    ControlsDiffer::new(&mut updates, &value_changed)
        .diff_trees(before, after)
        .unwrap();
    updates
}

#[test]
fn shrinking_node_set_clamps_index() {
    let state = controls();
    let mut switches = SwitchState::default();
    let mut indexes = RepeatIndexes::initial(&state);
    indexes.set("lines", 3);

    let tree = Form::new(&order(3)).build(&state, &mut switches);
    adjust_indexes(&tree, &mut indexes);
    assert_eq!(indexes.get("lines"), Some(3));

    let tree = Form::new(&order(1)).build(&state, &mut switches);
    adjust_indexes(&tree, &mut indexes);
    assert_eq!(indexes.get("lines"), Some(1));

    let tree = Form::new(&order(0)).build(&state, &mut switches);
    adjust_indexes(&tree, &mut indexes);
    assert_eq!(indexes.get("lines"), Some(0));
}

#[test]
fn insertion_indexes_the_last_inserted_node() {
    let state = controls();
    let mut switches = SwitchState::default();
    let mut indexes = RepeatIndexes::initial(&state);

    let form = Form::new(&order(4));
    let lines = form.lines();
    let tree = form.build(&state, &mut switches);
    adjust_indexes_after_insert(&tree, &state, &mut indexes, &[lines[1], lines[2]]);
    assert_eq!(indexes.get("lines"), Some(3));
}

#[test]
fn deletion_keeps_index_on_the_same_line() {
    let state = controls();
    let mut switches = SwitchState::default();
    let mut indexes = RepeatIndexes::initial(&state);
    indexes.set("lines", 2);

    let form = Form::new(&order(3));
    let lines = form.lines();
    let tree = form.build(&state, &mut switches);

    let updates = adjust_indexes_for_delete(&tree, &state, &indexes, lines[0]);
    assert_eq!(updates.updates, vec![("lines".to_owned(), 1)]);
    let updates = adjust_indexes_for_delete(&tree, &state, &indexes, lines[2]);
    assert_eq!(updates.updates, vec![("lines".to_owned(), 2)]);

    updates.apply(&mut indexes);
    assert_eq!(indexes.get("lines"), Some(2));
}

#[test]
fn identical_snapshots_produce_no_updates() {
    let state = controls();
    let mut switches = SwitchState::default();
    let form = Form::new(&order(2));
    let before = form.build(&state, &mut switches);
    let after = form.build(&state, &mut switches);
    assert!(diff(Some(&before), &after).is_empty());
}

#[test]
fn grown_repeat_materializes_new_iterations() {
    let state = controls();
    let mut switches = SwitchState::default();
    let before = Form::new(&order(2)).build(&state, &mut switches);
    let after = Form::new(&order(5)).build(&state, &mut switches);

    let updates = diff(Some(&before), &after);
    let mut expected = vec![ClientUpdate::CopyRepeatTemplate {
        id: "lines".to_owned(),
        parent_indexes: String::new(),
        start: 3,
        end: 5,
    }];
    for line in 3..=5 {
        expected.push(ClientUpdate::Control {
            id: format!("qty\u{b7}{line}"),
            attributes: vec![("label".to_owned(), "Quantity".to_owned())],
            value: Some(line.to_string()),
        });
    }
    assert_eq!(updates, expected);
}

#[test]
fn shrunk_repeat_deletes_trailing_iterations() {
    let state = controls();
    let mut switches = SwitchState::default();
    let before = Form::new(&order(3)).build(&state, &mut switches);
    let after = Form::new(&order(1)).build(&state, &mut switches);
    assert_eq!(
        diff(Some(&before), &after),
        vec![ClientUpdate::DeleteRepeatElements {
            id: "lines".to_owned(),
            parent_indexes: String::new(),
            count: 2,
        }]
    );
}

#[test]
fn non_relevant_iteration_is_reported_when_it_appears() {
    let state = controls();
    let mut switches = SwitchState::default();
    let before = Form::new(&order(1)).build(&state, &mut switches);
    let mut form = Form::new(&order(2));
    let second = form.lines()[1];
    form.hidden.push(second);
    let after = form.build(&state, &mut switches);

    let updates = diff(Some(&before), &after);
    assert!(updates.contains(&ClientUpdate::RepeatIteration {
        id: "lines".to_owned(),
        iteration: 2,
        relevant: false,
    }));
    // A non-relevant control is shown empty, whatever its node holds.
    assert!(updates.contains(&ClientUpdate::Control {
        id: "qty\u{b7}2".to_owned(),
        attributes: vec![("relevant".to_owned(), "false".to_owned())],
        value: Some(String::new()),
    }));
}

#[test]
fn toggled_case_is_materialized() {
    let state = controls();
    let mut switches = SwitchState::default();
    let form = Form::new(&order(1));
    let before = form.build(&state, &mut switches);
    assert_eq!(switches.selected("tabs"), Some("view"));

    switches.select("tabs", "edit");
    let after = form.build(&state, &mut switches);
    assert_eq!(
        diff(Some(&before), &after),
        vec![
            ClientUpdate::Control {
                id: "tabs".to_owned(),
                attributes: vec![("case".to_owned(), "edit".to_owned())],
                value: None,
            },
            ClientUpdate::Control {
                id: "note".to_owned(),
                attributes: Vec::new(),
                value: Some("rush".to_owned()),
            },
        ]
    );
}

#[test]
fn updates_serialize_with_kebab_case_tags() {
    let update = ClientUpdate::CopyRepeatTemplate {
        id: "lines".to_owned(),
        parent_indexes: "2".to_owned(),
        start: 3,
        end: 5,
    };
    assert_eq!(
        serde_json::to_value(&update).unwrap(),
        serde_json::json!({
            "type": "copy-repeat-template",
            "id": "lines",
            "parent_indexes": "2",
            "start": 3,
            "end": 5
        })
    );
}

/// Lines whose quantities are themselves shown through a repeat.
fn nested_controls() -> StaticState {
    StaticState::new(vec![
        ControlDescriptor::new(ControlKind::Repeat, "lines").bound("line").child(
            ControlDescriptor::new(ControlKind::Repeat, "parts")
                .bound("qty")
                .child(ControlDescriptor::new(ControlKind::Output, "part").bound(".")),
        ),
    ])
}

#[test]
fn deleting_the_indexed_line_restarts_nested_repeats() {
    let state = nested_controls();
    let mut switches = SwitchState::default();
    let mut indexes = RepeatIndexes::initial(&state);
    indexes.set("lines", 2);

    let form = Form::new(&order(4));
    let lines = form.lines();
    let tree = form.build(&state, &mut switches);

    let updates = adjust_indexes_for_delete(&tree, &state, &indexes, lines[1]);
    assert_eq!(
        updates.updates,
        vec![("lines".to_owned(), 2), ("parts".to_owned(), 0)]
    );
    assert!(updates.reinitialized.contains("parts"));
}

#[test]
fn deleting_the_indexed_last_line_moves_back_one() {
    let state = nested_controls();
    let mut switches = SwitchState::default();
    let mut indexes = RepeatIndexes::initial(&state);
    indexes.set("lines", 4);

    let form = Form::new(&order(4));
    let lines = form.lines();
    let tree = form.build(&state, &mut switches);

    let updates = adjust_indexes_for_delete(&tree, &state, &indexes, lines[3]);
    assert_eq!(
        updates.updates,
        vec![("lines".to_owned(), 3), ("parts".to_owned(), 0)]
    );
    assert!(updates.reinitialized.contains("parts"));

    updates.apply(&mut indexes);
    assert_eq!(indexes.get("lines"), Some(3));
    assert_eq!(indexes.get("parts"), Some(0));
}

#[test]
fn deleting_the_only_line_empties_the_index() {
    let state = nested_controls();
    let mut switches = SwitchState::default();
    let indexes = RepeatIndexes::initial(&state);

    let form = Form::new(&order(1));
    let lines = form.lines();
    let tree = form.build(&state, &mut switches);

    let updates = adjust_indexes_for_delete(&tree, &state, &indexes, lines[0]);
    assert_eq!(updates.updates, vec![("lines".to_owned(), 0)]);
    assert!(updates.reinitialized.is_empty());
}
